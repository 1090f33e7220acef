//! # Bucket Router
//!
//! Deterministic digest → (leader responsibility, lane) mapping for the first
//! job of a digest. The dispatcher keeps the digest on that lane afterwards,
//! which is what lets a lane own its aggregation states without locking.

use super::primitives::Digest;

/// Routing decision for one digest on this node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Route {
    pub is_leader: bool,
    pub lane: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketRouter {
    num_priority_lanes: usize,
    num_total_lanes: usize,
    leader_filtering: bool,
}

impl BucketRouter {
    /// Lane counts must satisfy `num_total_lanes > num_priority_lanes >= 1`;
    /// [`ProcessorConfig::validate`](super::ProcessorConfig::validate)
    /// enforces this before a router is built.
    pub fn new(num_priority_lanes: usize, num_total_lanes: usize, leader_filtering: bool) -> Self {
        Self {
            num_priority_lanes,
            num_total_lanes,
            leader_filtering,
        }
    }

    pub fn num_total_lanes(&self) -> usize {
        self.num_total_lanes
    }

    pub fn route(&self, digest: &Digest, my_index: usize, set_size: usize) -> Route {
        let h = digest.bucket_key();
        let n = set_size.max(1) as u64;

        let target = h % n;
        let rotated = (target + my_index as u64) % n;

        let leader_set_size = n / 3 + 1;
        let is_leader = !self.leader_filtering || rotated < leader_set_size;

        let priority = self.num_priority_lanes as u64;
        let lane = if rotated == 0 {
            h % priority
        } else {
            h % (self.num_total_lanes as u64 - priority) + priority
        };

        Route {
            is_leader,
            lane: lane as usize,
        }
    }
}
