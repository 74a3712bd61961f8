//! Buffer types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used as a uniform (constant) buffer.
        const UNIFORM = 1 << 2;
        /// Buffer can be used as a storage buffer.
        const STORAGE = 1 << 3;
        /// Buffer can be used as an indirect buffer.
        const INDIRECT = 1 << 4;
        /// Buffer can be copied from.
        const COPY_SRC = 1 << 5;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 6;
        /// Buffer backs an acceleration structure.
        const ACCELERATION_STRUCTURE = 1 << 7;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Where the memory backing a resource lives.
///
/// The frame graph aliases each location in its own independent pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryLocation {
    /// GPU-only memory for transient render resources.
    #[default]
    DeviceLocal,
    /// CPU-mappable memory used for staging uploads.
    HostVisible,
}

impl MemoryLocation {
    /// All memory locations, in pool order.
    pub const ALL: [MemoryLocation; 2] = [MemoryLocation::DeviceLocal, MemoryLocation::HostVisible];

    /// Index of the pool backing this location.
    pub fn index(self) -> usize {
        match self {
            Self::DeviceLocal => 0,
            Self::HostVisible => 1,
        }
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Element stride in bytes (0 for raw buffers).
    pub stride: u32,
    /// Usage flags. The frame graph adds the flags implied by declared views.
    pub usage: BufferUsage,
    /// Memory location of the buffer.
    pub location: MemoryLocation,
    /// CPU-supplied initial content, uploaded before the first use.
    pub initial_data: Option<Vec<u8>>,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            stride: 0,
            usage,
            location: MemoryLocation::DeviceLocal,
            initial_data: None,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the element stride.
    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = stride;
        self
    }

    /// Set the memory location.
    pub fn with_location(mut self, location: MemoryLocation) -> Self {
        self.location = location;
        self
    }

    /// Attach raw initial content.
    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.initial_data = Some(data.into());
        self
    }

    /// Attach initial content from a slice of plain-old-data values.
    pub fn with_pod_data<T: bytemuck::Pod>(self, data: &[T]) -> Self {
        self.with_data(bytemuck::cast_slice::<T, u8>(data).to_vec())
    }

    /// Number of elements, if the buffer is structured.
    pub fn element_count(&self) -> Option<u64> {
        (self.stride > 0).then(|| self.size / u64::from(self.stride))
    }
}

/// Descriptor for creating an acceleration structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AccelerationStructureDescriptor {
    /// Debug label for the acceleration structure.
    pub label: Option<String>,
    /// Size in bytes of the structure storage.
    pub size: u64,
}

impl AccelerationStructureDescriptor {
    /// Create a new acceleration structure descriptor.
    pub fn new(size: u64) -> Self {
        Self { label: None, size }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
