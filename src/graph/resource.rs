//! Declared resources.
//!
//! Resources live in an arena owned by the [`FrameGraph`](super::FrameGraph)
//! and are referenced by [`ResourceRef`] handles. A handle carries the
//! resource kind so state selection can match on it without a lookup.

use bitflags::bitflags;

use crate::compiler::ResourceState;
use crate::device::DeviceResource;
use crate::types::{
    AccelerationStructureDescriptor, BufferDescriptor, BufferUsage, MemoryLocation,
    TextureDescriptor, TextureFormat, TextureUsage,
};

/// Kind of a declared resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A linear buffer.
    Buffer,
    /// An image (texture).
    Image,
    /// A ray tracing acceleration structure.
    AccelerationStructure,
}

/// Handle to a resource declared on a [`FrameGraph`](super::FrameGraph).
///
/// Handles are unique within one frame; the value space is reused after
/// [`FrameGraph::reset`](super::FrameGraph::reset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    id: u32,
    kind: ResourceKind,
}

impl ResourceRef {
    pub(crate) fn new(id: u32, kind: ResourceKind) -> Self {
        Self { id, kind }
    }

    /// Numeric id of the resource.
    pub fn id(self) -> u32 {
        self.id
    }

    /// Kind of the resource.
    pub fn kind(self) -> ResourceKind {
        self.kind
    }

    pub(crate) fn index(self) -> usize {
        self.id as usize
    }
}

bitflags! {
    /// Usage kinds accumulated on a resource over one frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceUsage: u32 {
        /// Read in shaders.
        const READ = 1 << 0;
        /// Read and written in shaders.
        const READ_WRITE = 1 << 1;
        /// Used as a render attachment.
        const ATTACHMENT = 1 << 2;
        /// Read as constant data.
        const CONSTANT_READ = 1 << 3;
        /// Source of a copy.
        const COPY_SRC = 1 << 4;
        /// Destination of a copy.
        const COPY_DST = 1 << 5;
    }
}

impl ResourceUsage {
    /// Device buffer usage flags implied by these usages.
    pub fn buffer_usage(self) -> BufferUsage {
        let mut usage = BufferUsage::empty();
        if self.intersects(Self::READ | Self::READ_WRITE) {
            usage |= BufferUsage::STORAGE;
        }
        if self.contains(Self::CONSTANT_READ) {
            usage |= BufferUsage::UNIFORM;
        }
        if self.contains(Self::COPY_SRC) {
            usage |= BufferUsage::COPY_SRC;
        }
        if self.contains(Self::COPY_DST) {
            usage |= BufferUsage::COPY_DST;
        }
        usage
    }

    /// Device texture usage flags implied by these usages.
    pub fn texture_usage(self) -> TextureUsage {
        let mut usage = TextureUsage::empty();
        if self.intersects(Self::READ | Self::CONSTANT_READ) {
            usage |= TextureUsage::TEXTURE_BINDING;
        }
        if self.contains(Self::READ_WRITE) {
            usage |= TextureUsage::STORAGE_BINDING;
        }
        if self.contains(Self::ATTACHMENT) {
            usage |= TextureUsage::RENDER_ATTACHMENT;
        }
        if self.contains(Self::COPY_SRC) {
            usage |= TextureUsage::COPY_SRC;
        }
        if self.contains(Self::COPY_DST) {
            usage |= TextureUsage::COPY_DST;
        }
        usage
    }
}

/// Shape of a resource: its kind together with its descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceShape {
    /// A buffer.
    Buffer(BufferDescriptor),
    /// An image.
    Image(TextureDescriptor),
    /// An acceleration structure.
    AccelerationStructure(AccelerationStructureDescriptor),
}

impl ResourceShape {
    /// Kind of the resource.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Buffer(_) => ResourceKind::Buffer,
            Self::Image(_) => ResourceKind::Image,
            Self::AccelerationStructure(_) => ResourceKind::AccelerationStructure,
        }
    }

    /// Debug label of the descriptor.
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Buffer(desc) => desc.label.as_deref(),
            Self::Image(desc) => desc.label.as_deref(),
            Self::AccelerationStructure(desc) => desc.label.as_deref(),
        }
    }

    /// CPU content to upload before the first use.
    pub fn initial_data(&self) -> Option<&[u8]> {
        match self {
            Self::Buffer(desc) => desc.initial_data.as_deref(),
            Self::Image(desc) => desc.initial_data.as_deref(),
            Self::AccelerationStructure(_) => None,
        }
    }

    pub(crate) fn take_initial_data(&mut self) -> Option<Vec<u8>> {
        match self {
            Self::Buffer(desc) => desc.initial_data.take(),
            Self::Image(desc) => desc.initial_data.take(),
            Self::AccelerationStructure(_) => None,
        }
    }

    /// Memory pool the resource is placed in.
    pub fn location(&self) -> MemoryLocation {
        match self {
            Self::Buffer(desc) => desc.location,
            Self::Image(_) | Self::AccelerationStructure(_) => MemoryLocation::DeviceLocal,
        }
    }

    /// Format of an image resource.
    pub fn format(&self) -> Option<TextureFormat> {
        match self {
            Self::Image(desc) => Some(desc.format),
            Self::Buffer(_) | Self::AccelerationStructure(_) => None,
        }
    }

    /// Get the texture descriptor, if this is an image.
    pub fn as_image(&self) -> Option<&TextureDescriptor> {
        match self {
            Self::Image(desc) => Some(desc),
            Self::Buffer(_) | Self::AccelerationStructure(_) => None,
        }
    }
}

/// Inclusive range of pass indices a resource is used in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassSpan {
    /// First pass using the resource.
    pub first: u32,
    /// Last pass using the resource.
    pub last: u32,
}

impl PassSpan {
    /// Span of a single pass.
    pub fn single(pass: u32) -> Self {
        Self {
            first: pass,
            last: pass,
        }
    }

    /// Widen the span to include `pass`.
    pub fn widen(&mut self, pass: u32) {
        self.first = self.first.min(pass);
        self.last = self.last.max(pass);
    }

    /// Returns true if the two spans share at least one pass.
    pub fn overlaps(&self, other: &PassSpan) -> bool {
        self.first <= other.last && other.first <= self.last
    }
}

/// Binding of an externally owned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExternalBinding {
    /// The device object owned by the caller.
    pub resource: DeviceResource,
    /// State the resource is in when the frame starts.
    pub input_state: ResourceState,
    /// State the resource must be left in when the frame ends.
    pub output_state: ResourceState,
}

/// A resource declared for the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDescription {
    /// Debug name used in diagnostics and the aliasing map.
    pub name: String,
    /// Kind and descriptor.
    pub shape: ResourceShape,
    /// Usage kinds seen so far; only ever grows.
    pub usage: ResourceUsage,
    /// Passes the resource is used in, `None` while unused.
    pub span: Option<PassSpan>,
    /// Present for resources owned outside the graph.
    pub external: Option<ExternalBinding>,
}

impl ResourceDescription {
    pub(crate) fn new(id: u32, shape: ResourceShape, external: Option<ExternalBinding>) -> Self {
        let name = match shape.label() {
            Some(label) => label.to_string(),
            None => {
                let prefix = match shape.kind() {
                    ResourceKind::Buffer => "buffer",
                    ResourceKind::Image => "image",
                    ResourceKind::AccelerationStructure => "acceleration_structure",
                };
                format!("{prefix}#{id}")
            }
        };
        Self {
            name,
            shape,
            usage: ResourceUsage::empty(),
            span: None,
            external,
        }
    }

    /// Kind of the resource.
    pub fn kind(&self) -> ResourceKind {
        self.shape.kind()
    }

    /// Returns true if the resource is owned outside the graph.
    pub fn is_external(&self) -> bool {
        self.external.is_some()
    }

    /// Record a usage in `pass`.
    pub(crate) fn mark_used(&mut self, pass: u32, usage: ResourceUsage) {
        self.usage |= usage;
        match &mut self.span {
            Some(span) => span.widen(pass),
            None => self.span = Some(PassSpan::single(pass)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_widening() {
        let mut desc = ResourceDescription::new(
            0,
            ResourceShape::Buffer(BufferDescriptor::new(64, BufferUsage::empty())),
            None,
        );
        assert!(desc.span.is_none());
        desc.mark_used(3, ResourceUsage::READ);
        desc.mark_used(1, ResourceUsage::COPY_DST);
        desc.mark_used(5, ResourceUsage::READ);
        assert_eq!(desc.span, Some(PassSpan { first: 1, last: 5 }));
        assert_eq!(desc.usage, ResourceUsage::READ | ResourceUsage::COPY_DST);
    }

    #[test]
    fn test_span_overlap() {
        let a = PassSpan { first: 0, last: 2 };
        let b = PassSpan { first: 2, last: 4 };
        let c = PassSpan::single(3);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(b.overlaps(&c));
    }

    #[test]
    fn test_default_names() {
        let desc = ResourceDescription::new(
            7,
            ResourceShape::AccelerationStructure(AccelerationStructureDescriptor::new(1024)),
            None,
        );
        assert_eq!(desc.name, "acceleration_structure#7");

        let desc = ResourceDescription::new(
            1,
            ResourceShape::Buffer(
                BufferDescriptor::new(64, BufferUsage::empty()).with_label("lights"),
            ),
            None,
        );
        assert_eq!(desc.name, "lights");
    }

    #[test]
    fn test_usage_conversion() {
        let usage = ResourceUsage::READ | ResourceUsage::ATTACHMENT | ResourceUsage::COPY_DST;
        assert_eq!(
            usage.texture_usage(),
            TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_DST
        );
        assert_eq!(
            ResourceUsage::CONSTANT_READ.buffer_usage(),
            BufferUsage::UNIFORM
        );
        assert_eq!(
            (ResourceUsage::READ_WRITE | ResourceUsage::COPY_SRC).buffer_usage(),
            BufferUsage::STORAGE | BufferUsage::COPY_SRC
        );
    }
}
