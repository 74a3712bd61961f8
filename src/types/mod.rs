//! Common types and descriptors for frame graph resources.
//!
//! This module contains format enums, usage flags, and descriptor structs
//! used by the declaration API and by the device boundary.

mod buffer;
mod common;
mod texture;

pub use buffer::{AccelerationStructureDescriptor, BufferDescriptor, BufferUsage, MemoryLocation};
pub use common::{ClearValue, Extent3d};
pub use texture::{SubresourceRange, TextureDescriptor, TextureFormat, TextureUsage};
