//! Partial-score accumulator tables with O(1) between-query reset
//!
//! Densely zeroing N 16-bit cells per query dominates short queries, so both
//! tables here defer the zeroing. [`DirtyRowTable`] keeps one clean byte per
//! row of ~√N accumulators and zeroes a row the first time the query touches
//! it. [`EpochTable`] interleaves a query counter with every score; a cell
//! whose counter differs from the table's is dead, and reset is a counter
//! increment that only re-zeroes storage when the counter wraps.

/// Seam between the query processor and its score storage.
pub trait AccumulatorTable {
    /// Number of document ids the table can score (ids run 1..=capacity-1,
    /// id 0 is the reserved invalid slot).
    fn capacity(&self) -> usize;

    /// Add `delta` into `docid`'s accumulator, saturating at `u16::MAX`.
    /// Returns the value the accumulator held before the add.
    fn add(&mut self, docid: u32, delta: u16) -> u16;

    /// Current value, zero for untouched cells.
    fn get(&self, docid: u32) -> u16;

    /// Forget every score, in (amortized) constant or O(√N) time.
    fn rewind(&mut self);
}

/// Row-of-dirty-flags accumulator table.
pub struct DirtyRowTable {
    shift: u32,
    width: usize,
    height: usize,
    dirty: Vec<u8>,
    cells: Vec<u16>,
    documents: usize,
}

impl DirtyRowTable {
    /// Size for a collection of `documents` real documents (ids 1..=documents).
    pub fn new(documents: usize) -> Self {
        let slots = documents + 1;
        let shift = ((slots as f64).sqrt().log2()).floor().max(0.0) as u32;
        let width = 1usize << shift;
        // One row of slack so width * height covers every id.
        let height = slots / width + 1;
        DirtyRowTable {
            shift,
            width,
            height,
            dirty: vec![0; height],
            cells: vec![0; width * height],
            documents,
        }
    }

    /// The row geometry, exposed for the stats line.
    pub fn geometry(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

impl AccumulatorTable for DirtyRowTable {
    fn capacity(&self) -> usize {
        self.documents + 1
    }

    #[inline]
    fn add(&mut self, docid: u32, delta: u16) -> u16 {
        let id = docid as usize;
        let row = id >> self.shift;
        if self.dirty[row] == 0 {
            self.dirty[row] = 1;
            let start = row << self.shift;
            self.cells[start..start + self.width].fill(0);
        }
        let old = self.cells[id];
        self.cells[id] = old.saturating_add(delta);
        old
    }

    #[inline]
    fn get(&self, docid: u32) -> u16 {
        let id = docid as usize;
        if self.dirty[id >> self.shift] == 0 {
            0
        } else {
            self.cells[id]
        }
    }

    fn rewind(&mut self) {
        self.dirty.fill(0);
    }
}

/// One interleaved (score, epoch) cell.
#[derive(Clone, Copy, Default)]
struct Cell {
    score: u16,
    epoch: u16,
}

/// Query-epoch accumulator table.
pub struct EpochTable {
    cells: Vec<Cell>,
    epoch: u16,
}

impl EpochTable {
    pub fn new(documents: usize) -> Self {
        EpochTable {
            cells: vec![Cell::default(); documents + 1],
            epoch: 1,
        }
    }
}

impl AccumulatorTable for EpochTable {
    fn capacity(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    fn add(&mut self, docid: u32, delta: u16) -> u16 {
        let cell = &mut self.cells[docid as usize];
        let old = if cell.epoch == self.epoch { cell.score } else { 0 };
        cell.score = old.saturating_add(delta);
        cell.epoch = self.epoch;
        old
    }

    #[inline]
    fn get(&self, docid: u32) -> u16 {
        let cell = self.cells[docid as usize];
        if cell.epoch == self.epoch {
            cell.score
        } else {
            0
        }
    }

    fn rewind(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        if self.epoch == 0 {
            // Counter wrapped: every stale cell would look current again.
            self.cells.fill(Cell::default());
            self.epoch = 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn geometry_covers_every_docid() {
        for documents in [1usize, 9, 10, 100, 1_000, 65_536, 1_000_000] {
            let table = DirtyRowTable::new(documents);
            let (width, height) = table.geometry();
            assert!(width * height > documents, "N = {documents}");
        }
    }

    #[test]
    fn lazy_rows_start_clean() {
        let mut table = DirtyRowTable::new(100);
        assert_eq!(table.get(55), 0);
        assert_eq!(table.add(55, 7), 0);
        assert_eq!(table.get(55), 7);
        // A neighbour in the same row was zeroed by the add above.
        assert_eq!(table.get(54), 0);
    }

    #[test]
    fn rewind_clears_without_touching_cells() {
        let mut table = DirtyRowTable::new(100);
        table.add(3, 10);
        table.rewind();
        assert_eq!(table.get(3), 0);
        assert_eq!(table.add(3, 4), 0);
        assert_eq!(table.get(3), 4);
    }

    #[test]
    fn saturation_clamps() {
        let mut table = DirtyRowTable::new(10);
        table.add(1, u16::MAX - 1);
        assert_eq!(table.add(1, 5), u16::MAX - 1);
        assert_eq!(table.get(1), u16::MAX);
    }

    #[test]
    fn epoch_wrap_rewinds_storage() {
        let mut table = EpochTable::new(4);
        table.add(1, 3);
        for _ in 0..u16::MAX {
            table.rewind();
        }
        // One full lap of the counter later, the cell must still read clean.
        assert_eq!(table.get(1), 0);
        table.add(1, 9);
        assert_eq!(table.get(1), 9);
    }

    proptest! {
        /// Both tables agree with a plainly re-zeroed model under a random
        /// script of adds and rewinds.
        #[test]
        fn tables_match_dense_model(
            script in proptest::collection::vec((1u32..200, 0u16..2000, prop::bool::weighted(0.05)), 1..400)
        ) {
            let mut dirty = DirtyRowTable::new(200);
            let mut epoch = EpochTable::new(200);
            let mut model = vec![0u16; 201];
            for (docid, delta, reset) in script {
                if reset {
                    dirty.rewind();
                    epoch.rewind();
                    model.fill(0);
                }
                let expected_old = model[docid as usize];
                model[docid as usize] = expected_old.saturating_add(delta);
                prop_assert_eq!(dirty.add(docid, delta), expected_old);
                prop_assert_eq!(epoch.add(docid, delta), expected_old);
                prop_assert_eq!(dirty.get(docid), model[docid as usize]);
                prop_assert_eq!(epoch.get(docid), model[docid as usize]);
            }
        }
    }
}
