//! Transition synthesis and attachment load/store policy.

use crate::device::{Barrier, DeviceResource};
use crate::error::{GraphError, GraphResult};
use crate::graph::{LoadOp, ResourceRef, StoreOp, ViewRef};
use crate::types::{ClearValue, SubresourceRange};

use super::state::{transition_policy, ResourceState};
use super::usage::UsageRecord;

/// A state transition of one resource.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    /// The transitioned resource.
    pub resource: ResourceRef,
    /// Barrier handed to the recorder.
    pub barrier: Barrier,
}

impl Transition {
    /// State before the transition.
    pub fn before(&self) -> ResourceState {
        self.barrier.before
    }

    /// State after the transition.
    pub fn after(&self) -> ResourceState {
        self.barrier.after
    }
}

/// Current state of every resource while commands are synthesized.
#[derive(Debug, Default)]
pub(crate) struct StateTracker {
    states: Vec<ResourceState>,
}

impl StateTracker {
    pub(crate) fn new(initial: Vec<ResourceState>) -> Self {
        Self { states: initial }
    }

    /// Register a resource appended after construction (staging buffers).
    pub(crate) fn push(&mut self, state: ResourceState) {
        self.states.push(state);
    }

    #[cfg(test)]
    pub(crate) fn current(&self, resource: ResourceRef) -> Option<ResourceState> {
        self.states.get(resource.index()).copied()
    }

    /// Move `resource` into `required`.
    ///
    /// Returns `None` when it already is in that state.
    pub(crate) fn transition(
        &mut self,
        resource: ResourceRef,
        name: &str,
        handle: DeviceResource,
        required: ResourceState,
    ) -> GraphResult<Option<Transition>> {
        let Some(current) = self.states.get_mut(resource.index()) else {
            return Err(GraphError::UnknownResource(resource.id()));
        };
        if *current == required {
            return Ok(None);
        }
        let policy =
            transition_policy(*current, required).ok_or_else(|| GraphError::UndefinedTransition {
                resource: name.to_string(),
                from: *current,
                to: required,
            })?;
        let transition = Transition {
            resource,
            barrier: Barrier {
                resource: handle,
                before: *current,
                after: required,
                policy,
            },
        };
        *current = required;
        Ok(Some(transition))
    }
}

/// Load operation of the attachment usage at `position` in `timeline`.
///
/// Clears on the first usage overall and whenever the sub-range differs from
/// the preceding usage; loads otherwise. An upload counts as a preceding
/// full-range usage.
pub(crate) fn attachment_load_op(
    timeline: &[UsageRecord],
    position: usize,
    uploaded: bool,
    full_range: Option<SubresourceRange>,
    range_of: impl Fn(ViewRef) -> Option<SubresourceRange>,
    clear_value: ClearValue,
) -> LoadOp {
    let resolve = |view: ViewRef| range_of(view).or(full_range);
    let current = timeline.get(position).map(|record| resolve(record.view));
    let previous = match position.checked_sub(1) {
        Some(prev) => timeline.get(prev).map(|record| resolve(record.view)),
        None if uploaded => Some(full_range),
        None => None,
    };
    match (previous, current) {
        (Some(previous), Some(current)) if previous == current => LoadOp::Load,
        _ => LoadOp::Clear(clear_value),
    }
}

/// Store operation of the attachment usage at `position` in `timeline`.
///
/// Contents of the last usage of a graph-owned resource are discarded.
pub(crate) fn attachment_store_op(
    timeline: &[UsageRecord],
    position: usize,
    external: bool,
) -> StoreOp {
    if !external && position + 1 >= timeline.len() {
        StoreOp::DontCare
    } else {
        StoreOp::Store
    }
}
