//! Usage tracking.
//!
//! Every tracked pass appends one [`UsageRecord`] per accessed view. Per
//! resource the records form its usage timeline, kept in exact append order.

use crate::graph::{ResourceRef, ViewRef, ViewUsage};

/// One access of a resource by a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsageRecord {
    /// The accessed resource.
    pub resource: ResourceRef,
    /// Index of the accessing pass.
    pub pass: u32,
    /// View the access goes through.
    pub view: ViewRef,
    /// How the resource is used.
    pub usage: ViewUsage,
}

/// Per-resource usage timelines of one frame.
#[derive(Debug, Default, Clone)]
pub struct UsageTracker {
    timelines: Vec<Vec<UsageRecord>>,
}

impl UsageTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking one more resource.
    pub fn add_resource(&mut self) {
        self.timelines.push(Vec::new());
    }

    /// Append a record to its resource's timeline.
    ///
    /// Returns `false` if an identical record was already appended.
    pub fn record(&mut self, record: UsageRecord) -> bool {
        let Some(timeline) = self.timelines.get_mut(record.resource.index()) else {
            return false;
        };
        let duplicate = timeline
            .iter()
            .rev()
            .take_while(|existing| existing.pass == record.pass)
            .any(|existing| *existing == record);
        if duplicate {
            return false;
        }
        timeline.push(record);
        true
    }

    /// Usage timeline of a resource.
    pub fn timeline(&self, resource: ResourceRef) -> &[UsageRecord] {
        self.timelines
            .get(resource.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns true if the resource has no usages.
    pub fn is_unused(&self, resource: ResourceRef) -> bool {
        self.timeline(resource).is_empty()
    }

    /// Position of the record of `view` in `pass` within the resource's timeline.
    pub fn position(&self, resource: ResourceRef, pass: u32, view: ViewRef) -> Option<usize> {
        self.timeline(resource)
            .iter()
            .position(|record| record.pass == pass && record.view == view)
    }

    /// Total number of records.
    pub fn record_count(&self) -> usize {
        self.timelines.iter().map(Vec::len).sum()
    }

    /// Forget all resources and records.
    pub fn clear(&mut self) {
        self.timelines.clear();
    }
}
