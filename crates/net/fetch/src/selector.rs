use quarry_interfaces::peers::PeerId;
use rand::seq::IndexedRandom;
use std::collections::HashSet;

/// Chooses the peer to target for the next attempt.
///
/// Selection operates on an immutable snapshot of the connected set taken per
/// call and must be free of side effects beyond the selector's own
/// bookkeeping. Implementations are not expected to fall back to excluded
/// peers; the task decides whether exclusions may be lifted when no other
/// peer is available.
pub trait PeerSelector: Send + Unpin + 'static {
    /// Returns a peer from `connected` that is not in `excluded`, or `None`
    /// if no eligible peer exists.
    fn select_peer(&mut self, connected: &[PeerId], excluded: &HashSet<PeerId>) -> Option<PeerId>;
}

/// Deterministic rotation over the connected set.
///
/// Consecutive selections walk the snapshot in order, so retries naturally
/// move on to the next peer instead of thrashing a single one.
#[derive(Debug, Clone, Default)]
pub struct RoundRobin {
    cursor: usize,
}

impl PeerSelector for RoundRobin {
    fn select_peer(&mut self, connected: &[PeerId], excluded: &HashSet<PeerId>) -> Option<PeerId> {
        if connected.is_empty() {
            return None
        }
        for offset in 0..connected.len() {
            let idx = (self.cursor + offset) % connected.len();
            let peer = connected[idx];
            if !excluded.contains(&peer) {
                self.cursor = idx + 1;
                return Some(peer)
            }
        }
        None
    }
}

/// Uniform random choice among eligible peers.
#[derive(Debug, Clone, Default)]
pub struct RandomSelector;

impl PeerSelector for RandomSelector {
    fn select_peer(&mut self, connected: &[PeerId], excluded: &HashSet<PeerId>) -> Option<PeerId> {
        let eligible =
            connected.iter().filter(|peer| !excluded.contains(*peer)).copied().collect::<Vec<_>>();
        eligible.choose(&mut rand::rng()).copied()
    }
}
