//! Placement strategies
//!
//! A placement policy picks one volume out of the currently eligible set.
//! The directory does its own bookkeeping and only hands the policy a list of
//! candidate ids, so policies never see liveness or addresses.

use crate::common::{PlacementKind, VolumeId};
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicUsize, Ordering};

pub trait PlacementPolicy: Send + Sync {
    /// Choose one of `eligible`, or `None` when it is empty
    fn choose(&self, eligible: &[VolumeId]) -> Option<VolumeId>;

    fn name(&self) -> &'static str;
}

/// Uniformly random choice; ignores load entirely
#[derive(Debug, Default)]
pub struct RandomPlacement;

impl PlacementPolicy for RandomPlacement {
    fn choose(&self, eligible: &[VolumeId]) -> Option<VolumeId> {
        eligible.choose(&mut rand::thread_rng()).copied()
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Cycles through the eligible set in id order
#[derive(Debug, Default)]
pub struct RoundRobinPlacement {
    next: AtomicUsize,
}

impl PlacementPolicy for RoundRobinPlacement {
    fn choose(&self, eligible: &[VolumeId]) -> Option<VolumeId> {
        if eligible.is_empty() {
            return None;
        }
        let mut sorted = eligible.to_vec();
        sorted.sort_unstable();
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        Some(sorted[n % sorted.len()])
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

pub fn policy_for(kind: PlacementKind) -> Box<dyn PlacementPolicy> {
    match kind {
        PlacementKind::Random => Box::new(RandomPlacement),
        PlacementKind::RoundRobin => Box::new(RoundRobinPlacement::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ids(n: u8) -> Vec<VolumeId> {
        (0..n).map(|i| VolumeId::from_bytes([i; 16])).collect()
    }

    #[test]
    fn test_empty_set() {
        assert!(RandomPlacement.choose(&[]).is_none());
        assert!(RoundRobinPlacement::default().choose(&[]).is_none());
    }

    #[test]
    fn test_random_covers_all_candidates() {
        let candidates = ids(4);
        let mut seen: HashMap<VolumeId, usize> = HashMap::new();
        for _ in 0..2000 {
            let chosen = RandomPlacement.choose(&candidates).unwrap();
            *seen.entry(chosen).or_default() += 1;
        }
        assert_eq!(seen.len(), 4);
        // 500 expected per bucket; this bound is very loose
        assert!(seen.values().all(|&count| count > 300));
    }

    #[test]
    fn test_round_robin_cycles() {
        let candidates = ids(3);
        let mut shuffled = candidates.clone();
        shuffled.reverse();

        let policy = RoundRobinPlacement::default();
        let picks: Vec<_> = (0..6).map(|_| policy.choose(&shuffled).unwrap()).collect();
        assert_eq!(picks[..3], candidates[..]);
        assert_eq!(picks[3..], candidates[..]);
    }

    #[test]
    fn test_policy_for() {
        assert_eq!(policy_for(PlacementKind::Random).name(), "random");
        assert_eq!(policy_for(PlacementKind::RoundRobin).name(), "round_robin");
    }
}
