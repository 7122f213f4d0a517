//! Fixed-capacity min-heap over accumulator slots
//!
//! The heap stores document ids and reads their scores through a callback
//! into the accumulator table, so a score update in the table is visible to
//! the heap without any copying. Capacity is K+1: the extra slot keeps the
//! (K+1)-th best score on hand for the early-termination predicate.
//!
//! Ordering is (score, then descending docid), so the root is the lowest
//! score with the largest document id among the current residents. On a
//! score tie the larger id is the one evicted, and an arriving candidate
//! that ties the root's score replaces it only when its own id is smaller,
//! so tied survivors settle on the smallest ids regardless of arrival
//! order. Extraction breaks score ties on ascending id.

pub struct ResultHeap {
    slots: Vec<u32>,
    capacity: usize,
    built: bool,
}

/// Does `a` order strictly below `b` in the min-heap?
#[inline]
fn below(a: (u16, u32), b: (u16, u32)) -> bool {
    a.0 < b.0 || (a.0 == b.0 && a.1 > b.1)
}

impl ResultHeap {
    pub fn new(capacity: usize) -> Self {
        ResultHeap {
            slots: Vec::with_capacity(capacity),
            capacity,
            built: false,
        }
    }

    /// Distinct documents seen so far, clamped at capacity.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    pub fn slots(&self) -> &[u32] {
        &self.slots
    }

    /// Forget everything between queries; capacity is unchanged.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.built = false;
    }

    /// Growth phase: remember a docid without ordering. The caller builds
    /// the heap once the slots fill up.
    pub fn push(&mut self, docid: u32) {
        debug_assert!(!self.is_full());
        self.slots.push(docid);
    }

    /// Establish the heap property over every slot.
    pub fn build<F: Fn(u32) -> u16>(&mut self, score: F) {
        for at in (0..self.slots.len() / 2).rev() {
            self.sift_down(at, &score);
        }
        self.built = true;
    }

    /// A docid already in the heap grew its score: restore order from its
    /// position. Returns false if the docid is not present.
    pub fn promote<F: Fn(u32) -> u16>(&mut self, docid: u32, score: F) -> bool {
        debug_assert!(self.built);
        match self.slots.iter().position(|&slot| slot == docid) {
            Some(at) => {
                self.sift_down(at, &score);
                true
            }
            None => false,
        }
    }

    /// Replace the minimum with `docid` if it orders strictly above it.
    pub fn offer<F: Fn(u32) -> u16>(&mut self, docid: u32, score: F) {
        debug_assert!(self.built);
        let root = self.slots[0];
        if below((score(root), root), (score(docid), docid)) {
            self.slots[0] = docid;
            self.sift_down(0, &score);
        }
    }

    fn sift_down<F: Fn(u32) -> u16>(&mut self, mut at: usize, score: &F) {
        let len = self.slots.len();
        loop {
            let left = 2 * at + 1;
            let right = 2 * at + 2;
            let mut smallest = at;
            let mut smallest_key = (score(self.slots[at]), self.slots[at]);
            if left < len {
                let key = (score(self.slots[left]), self.slots[left]);
                if below(key, smallest_key) {
                    smallest = left;
                    smallest_key = key;
                }
            }
            if right < len {
                let key = (score(self.slots[right]), self.slots[right]);
                if below(key, smallest_key) {
                    smallest = right;
                }
            }
            if smallest == at {
                break;
            }
            self.slots.swap(at, smallest);
            at = smallest;
        }
    }

    /// Every slot, best first: descending score, ascending docid on ties.
    pub fn extract_sorted<F: Fn(u32) -> u16>(&self, score: F) -> Vec<u32> {
        let mut out = self.slots.clone();
        out.sort_unstable_by(|&a, &b| score(b).cmp(&score(a)).then(a.cmp(&b)));
        out
    }
}
