//! Frame graph error types.

use thiserror::Error;

use crate::compiler::ResourceState;
use crate::device::DeviceError;

/// Fatal configuration errors raised while declaring or compiling a frame.
///
/// Any of these aborts compilation; no partial graph is produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// `compile` was called without any declared pass.
    #[error("frame graph has no passes")]
    NoPasses,
    /// A view names a resource that is not declared in this frame.
    #[error("unknown resource id {0}")]
    UnknownResource(u32),
    /// A pass names a view that is not declared in this frame.
    #[error("unknown view index {0}")]
    UnknownView(usize),
    /// The policy table has no entry for a required transition.
    #[error("no transition from {from:?} to {to:?} for resource '{resource}'")]
    UndefinedTransition {
        resource: String,
        from: ResourceState,
        to: ResourceState,
    },
    /// A framebuffer has no attachments or an attachment with an empty extent.
    #[error("pass '{pass}' has a zero-sized framebuffer")]
    ZeroSizedFramebuffer { pass: String },
    /// A pass exceeds the per-pass access-record capacity.
    #[error("pass '{pass}' has {count} resource accesses, limit is {limit}")]
    TooManyAccesses {
        pass: String,
        count: usize,
        limit: usize,
    },
    /// A framebuffer exceeds the color attachment capacity.
    #[error("pass '{pass}' has {count} color attachments, limit is {limit}")]
    TooManyAttachments {
        pass: String,
        count: usize,
        limit: usize,
    },
    /// A view usage the resource kind cannot have (e.g. a buffer attachment).
    #[error("view usage {usage} is not valid for resource '{resource}'")]
    InvalidViewUsage { resource: String, usage: String },
    /// A view sub-range or format override does not fit its resource.
    #[error("invalid subresource range for resource '{resource}'")]
    InvalidSubresourceRange { resource: String },
    /// One pass uses a resource in two ways that need different states.
    #[error("pass '{pass}' accesses resource '{resource}' in conflicting states")]
    ConflictingAccess { pass: String, resource: String },
    /// A framebuffer attachment is not an attachment view.
    #[error("pass '{pass}' attaches a view that was not created for attachment")]
    InvalidAttachment { pass: String },
    /// `end_marker` without a matching `begin_marker`, or markers left open.
    #[error("unbalanced debug markers")]
    UnbalancedMarkers,
    /// The device failed while realizing the frame.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
}

/// Result type for frame graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphError::NoPasses;
        assert_eq!(err.to_string(), "frame graph has no passes");

        let err = GraphError::TooManyAccesses {
            pass: "gbuffer".to_string(),
            count: 65,
            limit: 64,
        };
        assert_eq!(
            err.to_string(),
            "pass 'gbuffer' has 65 resource accesses, limit is 64"
        );
    }

    #[test]
    fn test_device_error_conversion() {
        let err: GraphError = DeviceError::OutOfMemory.into();
        assert_eq!(err, GraphError::Device(DeviceError::OutOfMemory));
        assert_eq!(err.to_string(), "device error: out of GPU memory");
    }
}
