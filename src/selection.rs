use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ulid::Ulid;

use crate::config::BaySelection;
use crate::model::Ms;

/// A bay that is free for the whole candidate window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BayCandidate {
    pub bay_id: Ulid,
    /// Time already reserved on the bay within the scheduling horizon.
    pub reserved_ms: Ms,
}

/// Tie-break among free bays. `candidates` is never empty and is sorted by bay id;
/// the return value is an index into it.
pub trait BaySelector: Send + Sync {
    fn select(&self, candidates: &[BayCandidate]) -> usize;
}

/// Always the first free bay.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstFit;

impl BaySelector for FirstFit {
    fn select(&self, _candidates: &[BayCandidate]) -> usize {
        0
    }
}

/// The free bay with the least reserved time; ties go to the lowest id.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastUtilized;

impl BaySelector for LeastUtilized {
    fn select(&self, candidates: &[BayCandidate]) -> usize {
        candidates
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| (c.reserved_ms, c.bay_id))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

/// Uniform random choice. Seeded for reproducible runs.
pub struct RandomPick {
    rng: Mutex<StdRng>,
}

impl RandomPick {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_os() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }
}

impl BaySelector for RandomPick {
    fn select(&self, candidates: &[BayCandidate]) -> usize {
        match self.rng.lock() {
            Ok(mut rng) => rng.random_range(0..candidates.len()),
            // poisoned: fall back to deterministic
            Err(_) => 0,
        }
    }
}

pub fn selector_for(selection: BaySelection) -> Box<dyn BaySelector> {
    match selection {
        BaySelection::LeastUtilized => Box::new(LeastUtilized),
        BaySelection::FirstFit => Box::new(FirstFit),
        BaySelection::Random { seed: Some(seed) } => Box::new(RandomPick::seeded(seed)),
        BaySelection::Random { seed: None } => Box::new(RandomPick::from_os()),
    }
}
