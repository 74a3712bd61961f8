//! Graphics device boundary.
//!
//! The frame graph never talks to a GPU API directly. Everything it needs from
//! the outside world goes through two traits:
//!
//! - [`GraphicsDevice`] - resource and view creation, memory requirements,
//!   backing-memory allocation and binding, idle waits
//! - [`CommandRecorder`] - the command stream a compiled graph is replayed into
//!
//! The device is injected into [`FrameGraph`](crate::FrameGraph) and
//! [`MemoryContext`](crate::MemoryContext) at construction. There is no
//! process-wide device.
//!
//! # Available Implementations
//!
//! - [`DummyDevice`] - records every call, performs no GPU work (tests, tools)

pub mod dummy;
mod error;

pub use dummy::{DeviceCall, DummyDevice, RecordedCommand, RecordingCommandList};
pub use error::{DeviceError, DeviceResult};

use crate::compiler::{ResourceState, TransitionPolicy};
use crate::graph::{LoadOp, StoreOp};
use crate::types::{
    AccelerationStructureDescriptor, BufferDescriptor, Extent3d, MemoryLocation,
    SubresourceRange, TextureDescriptor, TextureFormat,
};

/// Handle to a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Handle to a device image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub u64);

/// Handle to a device acceleration structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccelerationStructureHandle(pub u64);

/// Handle to a resource view (SRV/UAV/CBV/RTV/DSV).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewHandle(pub u64);

/// Handle to a resource group (descriptor set layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceGroupHandle(pub u64);

/// Handle to a device memory allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryHandle(pub u64);

/// Any device resource the graph can place into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceResource {
    /// A buffer.
    Buffer(BufferHandle),
    /// An image.
    Image(ImageHandle),
    /// An acceleration structure.
    AccelerationStructure(AccelerationStructureHandle),
}

impl DeviceResource {
    /// Get the buffer handle, if this is a buffer.
    pub fn as_buffer(&self) -> Option<BufferHandle> {
        match self {
            Self::Buffer(handle) => Some(*handle),
            Self::Image(_) | Self::AccelerationStructure(_) => None,
        }
    }

    /// Get the image handle, if this is an image.
    pub fn as_image(&self) -> Option<ImageHandle> {
        match self {
            Self::Image(handle) => Some(*handle),
            Self::Buffer(_) | Self::AccelerationStructure(_) => None,
        }
    }
}

/// Memory requirements reported by the device for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemoryRequirements {
    /// Required size in bytes.
    pub size: u64,
    /// Required alignment in bytes (power of two).
    pub alignment: u64,
}

/// Kind of view created on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    /// Shader resource view (sampled / read-only).
    ShaderResource,
    /// Unordered access view (storage read/write).
    UnorderedAccess,
    /// Constant buffer view.
    Constant,
    /// Render target view.
    RenderTarget,
    /// Depth/stencil view.
    DepthStencil,
    /// Source of a copy.
    CopySource,
    /// Destination of a copy.
    CopyDestination,
}

/// Descriptor for creating a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewDescriptor {
    /// Kind of view.
    pub kind: ViewKind,
    /// Sub-range of an image, `None` for the whole resource.
    pub range: Option<SubresourceRange>,
    /// Format override for image views.
    pub format: Option<TextureFormat>,
}

/// Ordered binding kinds of one pass; structural key of the resource-group cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ResourceGroupLayout {
    /// Binding kind per slot, in declaration order.
    pub bindings: Vec<ViewKind>,
}

/// A device memory allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceMemory {
    /// Device handle of the allocation.
    pub handle: MemoryHandle,
    /// Size in bytes.
    pub size: u64,
    /// Where the memory lives.
    pub location: MemoryLocation,
}

/// Placement of one resource inside an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryBinding {
    /// The resource being bound.
    pub resource: DeviceResource,
    /// Byte offset inside the allocation.
    pub offset: u64,
}

/// Trait implemented by graphics device abstractions.
///
/// All methods take `&self`; implementations provide their own interior
/// synchronization so several frame graphs may share one device.
pub trait GraphicsDevice: Send + Sync {
    /// Human-readable device name.
    fn name(&self) -> &str;

    /// Create a buffer without backing memory.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> DeviceResult<BufferHandle>;

    /// Create an image without backing memory.
    fn create_image(&self, descriptor: &TextureDescriptor) -> DeviceResult<ImageHandle>;

    /// Create an acceleration structure without backing memory.
    fn create_acceleration_structure(
        &self,
        descriptor: &AccelerationStructureDescriptor,
    ) -> DeviceResult<AccelerationStructureHandle>;

    /// Get the memory requirements of a resource.
    fn memory_requirements(&self, resource: DeviceResource) -> MemoryRequirements;

    /// Create a view on a resource.
    fn create_view(
        &self,
        resource: DeviceResource,
        descriptor: &ViewDescriptor,
    ) -> DeviceResult<ViewHandle>;

    /// Create a resource group for a binding layout.
    fn create_resource_group(
        &self,
        layout: &ResourceGroupLayout,
    ) -> DeviceResult<ResourceGroupHandle>;

    /// Allocate backing memory.
    fn allocate_memory(&self, size: u64, location: MemoryLocation) -> DeviceResult<DeviceMemory>;

    /// Free backing memory.
    fn free_memory(&self, memory: DeviceMemory);

    /// Bind a set of resources into one allocation at the given offsets.
    fn bind_memory(&self, memory: &DeviceMemory, bindings: &[MemoryBinding]) -> DeviceResult<()>;

    /// Write bytes into host-visible memory through its CPU mapping.
    fn write_memory(&self, memory: &DeviceMemory, offset: u64, data: &[u8]) -> DeviceResult<()>;

    /// Destroy a view.
    fn destroy_view(&self, view: ViewHandle);

    /// Destroy a resource created by this device.
    fn destroy_resource(&self, resource: DeviceResource);

    /// Block until the device has finished all submitted work.
    fn wait_idle(&self);
}

/// A single resolved state transition handed to the recorder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Barrier {
    /// The transitioned resource, as a whole.
    pub resource: DeviceResource,
    /// State before the barrier.
    pub before: ResourceState,
    /// State after the barrier.
    pub after: ResourceState,
    /// Access and stage masks for the transition.
    pub policy: TransitionPolicy,
}

/// Layout of image data inside a buffer for buffer-to-image copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferImageLayout {
    /// Byte offset of the first row.
    pub offset: u64,
    /// Byte distance between consecutive rows.
    pub row_pitch: u64,
    /// Number of rows per 2D slice.
    pub rows_per_image: u32,
}

/// One attachment of a render pass, with resolved load/store ops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderAttachment {
    /// View to render into.
    pub view: ViewHandle,
    /// Load operation.
    pub load_op: LoadOp,
    /// Store operation.
    pub store_op: StoreOp,
}

/// Parameters for beginning a render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassBegin {
    /// Color attachments in slot order.
    pub color: Vec<RenderAttachment>,
    /// Optional depth/stencil attachment.
    pub depth_stencil: Option<RenderAttachment>,
    /// Framebuffer extent.
    pub extent: Extent3d,
}

/// Command stream a compiled graph is replayed into.
pub trait CommandRecorder {
    /// Open a named debug region.
    fn begin_marker(&mut self, name: &str);

    /// Close the innermost debug region.
    fn end_marker(&mut self);

    /// Record a batch of state transitions.
    fn pipeline_barrier(&mut self, barriers: &[Barrier]);

    /// Copy bytes between buffers.
    fn copy_buffer(
        &mut self,
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    );

    /// Copy buffer contents into mip 0 of an image.
    fn copy_buffer_to_image(
        &mut self,
        src: BufferHandle,
        layout: BufferImageLayout,
        dst: ImageHandle,
        extent: Extent3d,
        array_layers: u32,
    );

    /// Begin a render pass.
    fn begin_render_pass(&mut self, begin: &RenderPassBegin);

    /// End the current render pass.
    fn end_render_pass(&mut self);
}
