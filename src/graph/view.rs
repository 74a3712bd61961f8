//! Resource views.
//!
//! A view couples a resource with *how* a pass touches it. The usage kind
//! decides the state the resource must be in, the usage bits accumulated on
//! the resource and the kind of device view created for it.

use crate::device::ViewKind;
use crate::types::{SubresourceRange, TextureFormat};

use super::{ResourceRef, ResourceUsage};

/// How a pass uses the resource behind a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewUsage {
    /// Read in shaders.
    Read,
    /// Read and written in shaders.
    ReadWrite,
    /// Rendered into as a color or depth/stencil attachment.
    Attachment,
    /// Read as constant data.
    ConstantRead,
    /// Source of a copy.
    CopySrc,
    /// Destination of a copy.
    CopyDst,
}

impl ViewUsage {
    /// Usage bit accumulated on the resource.
    pub fn usage_bit(self) -> ResourceUsage {
        match self {
            Self::Read => ResourceUsage::READ,
            Self::ReadWrite => ResourceUsage::READ_WRITE,
            Self::Attachment => ResourceUsage::ATTACHMENT,
            Self::ConstantRead => ResourceUsage::CONSTANT_READ,
            Self::CopySrc => ResourceUsage::COPY_SRC,
            Self::CopyDst => ResourceUsage::COPY_DST,
        }
    }

    /// Kind of device view realized for this usage.
    ///
    /// `depth` selects a depth/stencil view for attachments.
    pub fn view_kind(self, depth: bool) -> ViewKind {
        match self {
            Self::Read => ViewKind::ShaderResource,
            Self::ReadWrite => ViewKind::UnorderedAccess,
            Self::ConstantRead => ViewKind::Constant,
            Self::CopySrc => ViewKind::CopySource,
            Self::CopyDst => ViewKind::CopyDestination,
            Self::Attachment if depth => ViewKind::DepthStencil,
            Self::Attachment => ViewKind::RenderTarget,
        }
    }
}

/// Description of a view: usage plus optional sub-range and format override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewDesc {
    /// How the view is used.
    pub usage: ViewUsage,
    /// Mip/layer window, `None` for the whole resource.
    pub range: Option<SubresourceRange>,
    /// Format override for image views.
    pub format: Option<TextureFormat>,
}

impl ViewDesc {
    /// Create a view description covering the whole resource.
    pub fn new(usage: ViewUsage) -> Self {
        Self {
            usage,
            range: None,
            format: None,
        }
    }

    /// Restrict the view to a sub-range.
    pub fn with_range(mut self, range: SubresourceRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Override the view format.
    pub fn with_format(mut self, format: TextureFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// Handle to a view declared on a [`FrameGraph`](super::FrameGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewRef(u32);

impl ViewRef {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    /// Index of the view in declaration order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A declared view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceView {
    /// The viewed resource.
    pub resource: ResourceRef,
    /// Usage, range and format.
    pub desc: ViewDesc,
}
