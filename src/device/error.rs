//! Device error types.

use thiserror::Error;

/// Errors reported by the graphics device boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Failed to create a resource.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// Failed to create a view on a resource.
    #[error("view creation failed: {0}")]
    ViewCreationFailed(String),
    /// Failed to allocate backing memory.
    #[error("memory allocation failed: {0}")]
    AllocationFailed(String),
    /// The memory is not host visible and cannot be written by the CPU.
    #[error("memory is not host visible")]
    NotHostVisible,
    /// Out of GPU memory.
    #[error("out of GPU memory")]
    OutOfMemory,
    /// The device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// Invalid parameter.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;
