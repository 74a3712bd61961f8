//! Dummy device for testing and development.
//!
//! This device doesn't perform actual GPU operations. It hands out unique
//! handles, reports plausible memory requirements, keeps the bytes of
//! host-visible allocations so uploads can be inspected, and records every
//! call it receives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::compiler::align_up;
use crate::types::{
    AccelerationStructureDescriptor, BufferDescriptor, BufferUsage, Extent3d, MemoryLocation,
    TextureDescriptor, TextureFormat, TextureUsage,
};

use super::{
    AccelerationStructureHandle, Barrier, BufferHandle, BufferImageLayout, CommandRecorder,
    DeviceError, DeviceMemory, DeviceResource, DeviceResult, GraphicsDevice, ImageHandle,
    MemoryBinding, MemoryHandle, MemoryRequirements, RenderPassBegin, ResourceGroupHandle,
    ResourceGroupLayout, ViewDescriptor, ViewHandle, ViewKind,
};

/// Row pitch alignment the dummy device uses for image memory.
const IMAGE_ROW_ALIGNMENT: u64 = 256;

/// A call received by [`DummyDevice`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    /// A buffer was created.
    CreateBuffer {
        handle: BufferHandle,
        size: u64,
        usage: BufferUsage,
        location: MemoryLocation,
    },
    /// An image was created.
    CreateImage {
        handle: ImageHandle,
        size: Extent3d,
        format: TextureFormat,
        usage: TextureUsage,
    },
    /// An acceleration structure was created.
    CreateAccelerationStructure {
        handle: AccelerationStructureHandle,
        size: u64,
    },
    /// A view was created.
    CreateView {
        view: ViewHandle,
        resource: DeviceResource,
        kind: ViewKind,
    },
    /// A resource group was created.
    CreateResourceGroup {
        group: ResourceGroupHandle,
        bindings: usize,
    },
    /// Backing memory was allocated.
    AllocateMemory {
        memory: MemoryHandle,
        size: u64,
        location: MemoryLocation,
    },
    /// Backing memory was freed.
    FreeMemory(MemoryHandle),
    /// Resources were bound into an allocation.
    BindMemory {
        memory: MemoryHandle,
        bindings: Vec<MemoryBinding>,
    },
    /// Bytes were written into host-visible memory.
    WriteMemory {
        memory: MemoryHandle,
        offset: u64,
        len: usize,
    },
    /// A view was destroyed.
    DestroyView(ViewHandle),
    /// A resource was destroyed.
    DestroyResource(DeviceResource),
    /// The device was drained.
    WaitIdle,
}

#[derive(Debug, Default)]
struct DummyState {
    calls: Vec<DeviceCall>,
    requirements: HashMap<DeviceResource, MemoryRequirements>,
    views: HashMap<ViewHandle, DeviceResource>,
    memory: HashMap<MemoryHandle, DummyMemory>,
}

#[derive(Debug)]
struct DummyMemory {
    location: MemoryLocation,
    bytes: Vec<u8>,
}

/// Dummy graphics device.
#[derive(Debug)]
pub struct DummyDevice {
    next_id: AtomicU64,
    buffer_alignment: u64,
    image_alignment: u64,
    memory_limit: Option<u64>,
    state: Mutex<DummyState>,
}

impl DummyDevice {
    /// Create a new dummy device.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            buffer_alignment: 256,
            image_alignment: 4096,
            memory_limit: None,
            state: Mutex::new(DummyState::default()),
        }
    }

    /// Set the alignment reported for buffers and acceleration structures.
    pub fn with_buffer_alignment(mut self, alignment: u64) -> Self {
        self.buffer_alignment = alignment.max(1);
        self
    }

    /// Set the alignment reported for images.
    pub fn with_image_alignment(mut self, alignment: u64) -> Self {
        self.image_alignment = alignment.max(1);
        self
    }

    /// Fail allocations larger than `limit` bytes with [`DeviceError::OutOfMemory`].
    pub fn with_memory_limit(mut self, limit: u64) -> Self {
        self.memory_limit = Some(limit);
        self
    }

    /// Get a snapshot of every call received so far.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().calls.clone()
    }

    /// Forget the recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Number of resources currently alive.
    pub fn live_resource_count(&self) -> usize {
        self.state.lock().requirements.len()
    }

    /// Number of views currently alive.
    pub fn live_view_count(&self) -> usize {
        self.state.lock().views.len()
    }

    /// Number of allocations currently alive.
    pub fn live_memory_count(&self) -> usize {
        self.state.lock().memory.len()
    }

    /// Read bytes back from a host-visible allocation.
    pub fn read_memory(&self, memory: MemoryHandle, offset: u64, len: usize) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let memory = state.memory.get(&memory)?;
        let start = usize::try_from(offset).ok()?;
        memory.bytes.get(start..start.checked_add(len)?).map(<[u8]>::to_vec)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn record(&self, state: &mut DummyState, call: DeviceCall) {
        state.calls.push(call);
    }

    fn image_requirements(&self, descriptor: &TextureDescriptor) -> MemoryRequirements {
        let block = u64::from(descriptor.format.block_size());
        let layers = u64::from(descriptor.array_layer_count);
        let samples = u64::from(descriptor.sample_count.max(1));
        let size: u64 = (0..descriptor.mip_level_count.max(1))
            .map(|level| {
                let extent = descriptor.size.mip(level);
                let pitch = align_up(u64::from(extent.width) * block, IMAGE_ROW_ALIGNMENT);
                pitch * u64::from(extent.height) * u64::from(extent.depth) * layers * samples
            })
            .sum();
        MemoryRequirements {
            size: align_up(size.max(1), self.image_alignment),
            alignment: self.image_alignment,
        }
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsDevice for DummyDevice {
    fn name(&self) -> &str {
        "Dummy Device"
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> DeviceResult<BufferHandle> {
        if descriptor.size == 0 {
            return Err(DeviceError::ResourceCreationFailed(format!(
                "buffer {:?} has zero size",
                descriptor.label
            )));
        }
        let handle = BufferHandle(self.next_id());
        log::trace!(
            "DummyDevice: creating buffer {:?} (size: {}, location: {:?})",
            descriptor.label,
            descriptor.size,
            descriptor.location
        );
        let mut state = self.state.lock();
        state.requirements.insert(
            DeviceResource::Buffer(handle),
            MemoryRequirements {
                size: align_up(descriptor.size, self.buffer_alignment),
                alignment: self.buffer_alignment,
            },
        );
        self.record(
            &mut state,
            DeviceCall::CreateBuffer {
                handle,
                size: descriptor.size,
                usage: descriptor.usage,
                location: descriptor.location,
            },
        );
        Ok(handle)
    }

    fn create_image(&self, descriptor: &TextureDescriptor) -> DeviceResult<ImageHandle> {
        if descriptor.size.is_empty() {
            return Err(DeviceError::ResourceCreationFailed(format!(
                "image {:?} has an empty extent",
                descriptor.label
            )));
        }
        let handle = ImageHandle(self.next_id());
        log::trace!(
            "DummyDevice: creating image {:?} ({}x{}x{}, {:?})",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth,
            descriptor.format
        );
        let requirements = self.image_requirements(descriptor);
        let mut state = self.state.lock();
        state
            .requirements
            .insert(DeviceResource::Image(handle), requirements);
        self.record(
            &mut state,
            DeviceCall::CreateImage {
                handle,
                size: descriptor.size,
                format: descriptor.format,
                usage: descriptor.usage,
            },
        );
        Ok(handle)
    }

    fn create_acceleration_structure(
        &self,
        descriptor: &AccelerationStructureDescriptor,
    ) -> DeviceResult<AccelerationStructureHandle> {
        let handle = AccelerationStructureHandle(self.next_id());
        log::trace!(
            "DummyDevice: creating acceleration structure {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        let mut state = self.state.lock();
        state.requirements.insert(
            DeviceResource::AccelerationStructure(handle),
            MemoryRequirements {
                size: align_up(descriptor.size.max(1), self.buffer_alignment),
                alignment: self.buffer_alignment,
            },
        );
        self.record(
            &mut state,
            DeviceCall::CreateAccelerationStructure {
                handle,
                size: descriptor.size,
            },
        );
        Ok(handle)
    }

    fn memory_requirements(&self, resource: DeviceResource) -> MemoryRequirements {
        self.state
            .lock()
            .requirements
            .get(&resource)
            .copied()
            .unwrap_or_default()
    }

    fn create_view(
        &self,
        resource: DeviceResource,
        descriptor: &ViewDescriptor,
    ) -> DeviceResult<ViewHandle> {
        let mut state = self.state.lock();
        if !state.requirements.contains_key(&resource) {
            return Err(DeviceError::ViewCreationFailed(format!(
                "unknown resource {resource:?}"
            )));
        }
        let view = ViewHandle(self.next_id());
        log::trace!(
            "DummyDevice: creating {:?} view on {:?}",
            descriptor.kind,
            resource
        );
        state.views.insert(view, resource);
        self.record(
            &mut state,
            DeviceCall::CreateView {
                view,
                resource,
                kind: descriptor.kind,
            },
        );
        Ok(view)
    }

    fn create_resource_group(
        &self,
        layout: &ResourceGroupLayout,
    ) -> DeviceResult<ResourceGroupHandle> {
        let group = ResourceGroupHandle(self.next_id());
        log::trace!(
            "DummyDevice: creating resource group with {} bindings",
            layout.bindings.len()
        );
        let mut state = self.state.lock();
        self.record(
            &mut state,
            DeviceCall::CreateResourceGroup {
                group,
                bindings: layout.bindings.len(),
            },
        );
        Ok(group)
    }

    fn allocate_memory(&self, size: u64, location: MemoryLocation) -> DeviceResult<DeviceMemory> {
        if self.memory_limit.is_some_and(|limit| size > limit) {
            return Err(DeviceError::OutOfMemory);
        }
        let handle = MemoryHandle(self.next_id());
        log::trace!(
            "DummyDevice: allocating {} bytes of {:?} memory",
            size,
            location
        );
        let bytes = match location {
            MemoryLocation::HostVisible => {
                let len = usize::try_from(size).map_err(|_| DeviceError::OutOfMemory)?;
                vec![0u8; len]
            }
            MemoryLocation::DeviceLocal => Vec::new(),
        };
        let mut state = self.state.lock();
        state.memory.insert(handle, DummyMemory { location, bytes });
        self.record(
            &mut state,
            DeviceCall::AllocateMemory {
                memory: handle,
                size,
                location,
            },
        );
        Ok(DeviceMemory {
            handle,
            size,
            location,
        })
    }

    fn free_memory(&self, memory: DeviceMemory) {
        log::trace!("DummyDevice: freeing memory {:?}", memory.handle);
        let mut state = self.state.lock();
        state.memory.remove(&memory.handle);
        self.record(&mut state, DeviceCall::FreeMemory(memory.handle));
    }

    fn bind_memory(&self, memory: &DeviceMemory, bindings: &[MemoryBinding]) -> DeviceResult<()> {
        let mut state = self.state.lock();
        if !state.memory.contains_key(&memory.handle) {
            return Err(DeviceError::InvalidParameter(format!(
                "unknown memory {:?}",
                memory.handle
            )));
        }
        for binding in bindings {
            let requirements = state
                .requirements
                .get(&binding.resource)
                .copied()
                .ok_or_else(|| {
                    DeviceError::InvalidParameter(format!(
                        "unknown resource {:?}",
                        binding.resource
                    ))
                })?;
            if binding.offset % requirements.alignment.max(1) != 0
                || binding.offset + requirements.size > memory.size
            {
                return Err(DeviceError::InvalidParameter(format!(
                    "binding of {:?} at offset {} does not fit {} bytes",
                    binding.resource, binding.offset, memory.size
                )));
            }
        }
        log::trace!(
            "DummyDevice: binding {} resources into {:?}",
            bindings.len(),
            memory.handle
        );
        self.record(
            &mut state,
            DeviceCall::BindMemory {
                memory: memory.handle,
                bindings: bindings.to_vec(),
            },
        );
        Ok(())
    }

    fn write_memory(&self, memory: &DeviceMemory, offset: u64, data: &[u8]) -> DeviceResult<()> {
        let mut state = self.state.lock();
        let target = state
            .memory
            .get_mut(&memory.handle)
            .ok_or_else(|| DeviceError::InvalidParameter(format!("unknown memory {:?}", memory.handle)))?;
        if target.location != MemoryLocation::HostVisible {
            return Err(DeviceError::NotHostVisible);
        }
        let start = usize::try_from(offset)
            .map_err(|_| DeviceError::InvalidParameter(format!("offset {offset} out of range")))?;
        let end = start
            .checked_add(data.len())
            .filter(|&end| end <= target.bytes.len())
            .ok_or_else(|| {
                DeviceError::InvalidParameter(format!(
                    "write of {} bytes at offset {} exceeds allocation",
                    data.len(),
                    offset
                ))
            })?;
        target.bytes[start..end].copy_from_slice(data);
        log::trace!(
            "DummyDevice: write_memory offset={} len={}",
            offset,
            data.len()
        );
        self.record(
            &mut state,
            DeviceCall::WriteMemory {
                memory: memory.handle,
                offset,
                len: data.len(),
            },
        );
        Ok(())
    }

    fn destroy_view(&self, view: ViewHandle) {
        log::trace!("DummyDevice: destroying view {:?}", view);
        let mut state = self.state.lock();
        state.views.remove(&view);
        self.record(&mut state, DeviceCall::DestroyView(view));
    }

    fn destroy_resource(&self, resource: DeviceResource) {
        log::trace!("DummyDevice: destroying {:?}", resource);
        let mut state = self.state.lock();
        state.requirements.remove(&resource);
        self.record(&mut state, DeviceCall::DestroyResource(resource));
    }

    fn wait_idle(&self) {
        log::trace!("DummyDevice: wait_idle");
        let mut state = self.state.lock();
        self.record(&mut state, DeviceCall::WaitIdle);
    }
}

// ============================================================================
// Recording command list
// ============================================================================

/// A command captured by [`RecordingCommandList`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    /// A debug region was opened.
    BeginMarker(String),
    /// A debug region was closed.
    EndMarker,
    /// A batch of barriers.
    Barriers(Vec<Barrier>),
    /// A buffer-to-buffer copy.
    CopyBuffer {
        src: BufferHandle,
        dst: BufferHandle,
        size: u64,
    },
    /// A buffer-to-image copy.
    CopyBufferToImage {
        src: BufferHandle,
        layout: BufferImageLayout,
        dst: ImageHandle,
        extent: Extent3d,
    },
    /// A render pass was opened.
    BeginRenderPass(RenderPassBegin),
    /// A render pass was closed.
    EndRenderPass,
}

/// Command recorder that stores every command it receives.
#[derive(Debug, Default)]
pub struct RecordingCommandList {
    commands: Vec<RecordedCommand>,
}

impl RecordingCommandList {
    /// Create an empty command list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the recorded commands.
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Names of all opened debug regions, in order.
    pub fn marker_names(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                RecordedCommand::BeginMarker(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl CommandRecorder for RecordingCommandList {
    fn begin_marker(&mut self, name: &str) {
        self.commands.push(RecordedCommand::BeginMarker(name.to_string()));
    }

    fn end_marker(&mut self) {
        self.commands.push(RecordedCommand::EndMarker);
    }

    fn pipeline_barrier(&mut self, barriers: &[Barrier]) {
        log::trace!("RecordingCommandList: {} barriers", barriers.len());
        self.commands.push(RecordedCommand::Barriers(barriers.to_vec()));
    }

    fn copy_buffer(
        &mut self,
        src: BufferHandle,
        _src_offset: u64,
        dst: BufferHandle,
        _dst_offset: u64,
        size: u64,
    ) {
        self.commands
            .push(RecordedCommand::CopyBuffer { src, dst, size });
    }

    fn copy_buffer_to_image(
        &mut self,
        src: BufferHandle,
        layout: BufferImageLayout,
        dst: ImageHandle,
        extent: Extent3d,
        _array_layers: u32,
    ) {
        self.commands.push(RecordedCommand::CopyBufferToImage {
            src,
            layout,
            dst,
            extent,
        });
    }

    fn begin_render_pass(&mut self, begin: &RenderPassBegin) {
        self.commands
            .push(RecordedCommand::BeginRenderPass(begin.clone()));
    }

    fn end_render_pass(&mut self) {
        self.commands.push(RecordedCommand::EndRenderPass);
    }
}
