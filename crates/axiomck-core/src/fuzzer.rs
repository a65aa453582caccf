//! Pluggable scheduling-decision source, grounded on C11Tester's
//! `fuzzer.h`/`newfuzzer.h` `Fuzzer` interface: a small set of callbacks
//! the execution engine consults whenever it has a choice to make
//! (which ready thread runs next, which candidate write a relaxed read
//! should observe). A fixed default (`RandomFuzzer`) is provided; swapping
//! in a coverage-guided or exhaustive-search fuzzer is the external
//! collaborator's job (spec.md's plugin registration is out of scope
//! here), so this module only defines the seam.

use crate::action::{ActionId, ThreadId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// The decisions the execution engine delegates to a pluggable fuzzing
/// strategy. Every method takes a non-empty candidate slice and must
/// return one of its elements.
pub trait Fuzzer: Send {
    /// Pick which ready thread runs next.
    fn choose_thread(&mut self, ready: &[ThreadId]) -> ThreadId;

    /// Pick which candidate write a read should observe, out of the set
    /// of writes that are legal reads-from candidates (mo-consistent, not
    /// shadowed by a later write the reading thread has synchronized
    /// with). C11Tester's default fuzzer weights recent writes more
    /// heavily to favor finding races quickly; `RandomFuzzer` picks
    /// uniformly instead, favoring simplicity and reproducibility via a
    /// fixed seed over that bias.
    fn choose_write(&mut self, candidates: &[ActionId]) -> ActionId;
}

/// The bundled reference `Fuzzer`: uniform random choice from a
/// seeded RNG, so a run is exactly reproducible given its seed.
pub struct RandomFuzzer {
    rng: StdRng,
}

impl RandomFuzzer {
    pub fn with_seed(seed: u64) -> Self {
        RandomFuzzer { rng: StdRng::seed_from_u64(seed) }
    }

    pub fn from_entropy() -> Self {
        RandomFuzzer { rng: StdRng::from_os_rng() }
    }
}

impl Fuzzer for RandomFuzzer {
    fn choose_thread(&mut self, ready: &[ThreadId]) -> ThreadId {
        debug_assert!(!ready.is_empty(), "choose_thread called with no ready threads");
        let idx = self.rng.random_range(0..ready.len());
        ready[idx]
    }

    fn choose_write(&mut self, candidates: &[ActionId]) -> ActionId {
        debug_assert!(!candidates.is_empty(), "choose_write called with no candidates");
        let idx = self.rng.random_range(0..candidates.len());
        candidates[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choose_thread_always_returns_a_candidate() {
        let mut f = RandomFuzzer::with_seed(42);
        let ready = vec![ThreadId::new(0), ThreadId::new(1), ThreadId::new(2)];
        for _ in 0..20 {
            let chosen = f.choose_thread(&ready);
            assert!(ready.contains(&chosen));
        }
    }

    #[test]
    fn same_seed_is_deterministic() {
        let ready = vec![ThreadId::new(0), ThreadId::new(1), ThreadId::new(2), ThreadId::new(3)];
        let mut a = RandomFuzzer::with_seed(7);
        let mut b = RandomFuzzer::with_seed(7);
        let seq_a: Vec<_> = (0..10).map(|_| a.choose_thread(&ready)).collect();
        let seq_b: Vec<_> = (0..10).map(|_| b.choose_thread(&ready)).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn single_candidate_is_always_chosen() {
        let mut f = RandomFuzzer::with_seed(1);
        let candidates = vec![ActionId::new(5)];
        assert_eq!(f.choose_write(&candidates), ActionId::new(5));
    }
}
