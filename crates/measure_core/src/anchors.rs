use crate::ar::Anchor;
use glam::Vec3;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// How many anchors make up one measurement group before the next tap
/// starts a fresh one. Groups smaller than one pair are rejected when
/// loaded from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGroupPolicy")]
pub struct GroupPolicy {
    pub size: usize,
}

#[derive(Deserialize)]
struct RawGroupPolicy {
    size: usize,
}

impl TryFrom<RawGroupPolicy> for GroupPolicy {
    type Error = String;

    fn try_from(raw: RawGroupPolicy) -> Result<Self, Self::Error> {
        if raw.size < 2 {
            return Err(format!("group size must be at least 2, got {}", raw.size));
        }
        Ok(Self { size: raw.size })
    }
}

impl Default for GroupPolicy {
    fn default() -> Self {
        Self::FOUR_POINT
    }
}

impl GroupPolicy {
    /// Two independent distances: (0,1) and (2,3).
    pub const FOUR_POINT: Self = Self { size: 4 };
    /// A single distance, restarted every third tap.
    pub const TWO_POINT: Self = Self { size: 2 };

    /// A policy of `size` anchors, raised to at least one pair.
    pub fn new(size: usize) -> Self {
        Self { size: size.max(2) }
    }

    /// Whether reaching `count` anchors completes a pair to measure.
    pub fn measures_at(&self, count: usize) -> bool {
        count >= 2 && count % 2 == 0 && count <= self.size
    }
}

/// Result of [`AnchorGroup::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    /// Anchors held after the push.
    pub count: usize,
    /// Anchors detached because the group was already full.
    pub evicted: usize,
}

/// The placed anchors, guarded by a single lock.
///
/// Every read-modify-write happens inside one critical section and callers
/// only ever see copies, so a concurrent reader never observes a group that
/// is half cleared.
pub struct AnchorGroup<A> {
    policy: GroupPolicy,
    anchors: Mutex<Vec<A>>,
}

impl<A: Anchor> AnchorGroup<A> {
    /// An empty group. Policies below one pair are raised to two anchors.
    pub fn new(policy: GroupPolicy) -> Self {
        let policy = GroupPolicy::new(policy.size);
        Self {
            policy,
            anchors: Mutex::new(Vec::with_capacity(policy.size)),
        }
    }

    /// The effective overflow policy.
    pub fn policy(&self) -> GroupPolicy {
        self.policy
    }

    /// Number of anchors currently held.
    pub fn len(&self) -> usize {
        self.anchors.lock().len()
    }

    /// Whether no anchors are held.
    pub fn is_empty(&self) -> bool {
        self.anchors.lock().is_empty()
    }

    /// Copies the current anchors in placement order.
    pub fn snapshot(&self) -> Vec<A> {
        self.anchors.lock().clone()
    }

    /// World positions of the current anchors in placement order.
    pub fn positions(&self) -> Vec<Vec3> {
        self.anchors
            .lock()
            .iter()
            .map(|a| a.pose().translation)
            .collect()
    }

    /// Appends `anchor`, first detaching the whole group if it is full.
    pub fn push(&self, anchor: A) -> PushOutcome {
        let mut anchors = self.anchors.lock();
        let evicted = if anchors.len() >= self.policy.size {
            detach_all(&mut anchors)
        } else {
            0
        };
        anchors.push(anchor);
        PushOutcome {
            count: anchors.len(),
            evicted,
        }
    }

    /// Detaches and drops every anchor. Returns how many were removed.
    pub fn clear(&self) -> usize {
        detach_all(&mut self.anchors.lock())
    }
}

fn detach_all<A: Anchor>(anchors: &mut Vec<A>) -> usize {
    for anchor in anchors.iter() {
        anchor.detach();
    }
    let n = anchors.len();
    anchors.clear();
    n
}
