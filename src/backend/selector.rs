use std::sync::Arc;

use parking_lot::Mutex;

use super::Backend;

/// Smooth weighted round-robin over UP replicas.
///
/// The cursor state is the classic `(max_weight, cur_weight, next_index)`
/// triple: each pass over the backend list only admits backends whose weight
/// reaches the current threshold, and the threshold decays by one per full
/// pass, wrapping back to the maximum. Heavier backends are therefore admitted
/// in more passes, producing an interleaved (not clustered) schedule.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin {
    state: Mutex<Cursor>,
}

#[derive(Debug, Default)]
struct Cursor {
    max_weight: u32,
    cur_weight: u32,
    next_index: usize,
}

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the next backend, skipping any that is DOWN.
    ///
    /// Returns None when the list is empty or nothing is UP. The lock is held
    /// for a bounded integer scan and never across I/O.
    pub fn select(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        if backends.is_empty() {
            return None;
        }

        let mut cursor = self.state.lock();
        if cursor.max_weight == 0 {
            cursor.max_weight = backends
                .iter()
                .map(|b| b.weight)
                .max()
                .unwrap_or(1)
                .max(1);
            cursor.cur_weight = cursor.max_weight;
        }

        // one full weight cycle is enough to visit every admissible slot
        let attempts = backends.len() * cursor.max_weight as usize;
        for _ in 0..attempts {
            let idx = cursor.next_index.min(backends.len() - 1);
            let candidate = &backends[idx];
            let admitted = candidate.weight >= cursor.cur_weight && candidate.is_up();

            cursor.next_index += 1;
            if cursor.next_index >= backends.len() {
                cursor.next_index = 0;
                cursor.cur_weight -= 1;
                if cursor.cur_weight == 0 {
                    cursor.cur_weight = cursor.max_weight;
                }
            }

            if admitted {
                return Some(candidate.clone());
            }
        }
        None
    }
}
