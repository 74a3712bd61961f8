//! Resource states and the transition policy table.
//!
//! Every usage of a resource requires it to be in a particular state. Moving
//! between two states is only legal when the policy table has an entry for the
//! `(old, new)` pair; the entry carries the access and pipeline-stage masks the
//! recorder needs to build the barrier.
//!
//! Any state may move to any other state except:
//! - nothing transitions *into* `Undefined`
//! - color and depth/stencil attachment states never convert into each other

use bitflags::bitflags;

use crate::graph::{ResourceKind, ViewUsage};
use crate::types::TextureFormat;

bitflags! {
    /// Memory access types covered by a barrier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        /// Read by a transfer operation.
        const TRANSFER_READ = 1 << 0;
        /// Written by a transfer operation.
        const TRANSFER_WRITE = 1 << 1;
        /// Read by a shader.
        const SHADER_READ = 1 << 2;
        /// Written by a shader.
        const SHADER_WRITE = 1 << 3;
        /// Read as uniform data.
        const UNIFORM_READ = 1 << 4;
        /// Read as a color attachment (blending).
        const COLOR_ATTACHMENT_READ = 1 << 5;
        /// Written as a color attachment.
        const COLOR_ATTACHMENT_WRITE = 1 << 6;
        /// Read as a depth/stencil attachment.
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 7;
        /// Written as a depth/stencil attachment.
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 8;
        /// Read by the presentation engine.
        const MEMORY_READ = 1 << 9;
    }
}

bitflags! {
    /// Pipeline stages covered by a barrier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        /// Start of the pipeline.
        const TOP_OF_PIPE = 1 << 0;
        /// Vertex shading.
        const VERTEX_SHADER = 1 << 1;
        /// Early depth/stencil tests.
        const EARLY_FRAGMENT_TESTS = 1 << 2;
        /// Fragment shading.
        const FRAGMENT_SHADER = 1 << 3;
        /// Late depth/stencil tests.
        const LATE_FRAGMENT_TESTS = 1 << 4;
        /// Color attachment output.
        const COLOR_ATTACHMENT_OUTPUT = 1 << 5;
        /// Compute shading.
        const COMPUTE_SHADER = 1 << 6;
        /// Ray tracing shading.
        const RAY_TRACING_SHADER = 1 << 7;
        /// Copy operations.
        const TRANSFER = 1 << 8;
        /// End of the pipeline.
        const BOTTOM_OF_PIPE = 1 << 9;
    }
}

/// States an image can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageState {
    /// Contents undefined.
    #[default]
    Undefined,
    /// Source of a copy.
    TransferSrc,
    /// Destination of a copy.
    TransferDst,
    /// Sampled or read in shaders.
    ShaderReadOnly,
    /// Written as a color attachment.
    ColorAttachment,
    /// Written as a depth/stencil attachment.
    DepthStencilAttachment,
    /// Read and written as a storage image.
    UnorderedAccess,
    /// Ready for presentation.
    Present,
}

impl ImageState {
    fn access(self) -> AccessFlags {
        match self {
            Self::Undefined => AccessFlags::empty(),
            Self::TransferSrc => AccessFlags::TRANSFER_READ,
            Self::TransferDst => AccessFlags::TRANSFER_WRITE,
            Self::ShaderReadOnly => AccessFlags::SHADER_READ,
            Self::ColorAttachment => {
                AccessFlags::COLOR_ATTACHMENT_READ | AccessFlags::COLOR_ATTACHMENT_WRITE
            }
            Self::DepthStencilAttachment => {
                AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
            }
            Self::UnorderedAccess => AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE,
            Self::Present => AccessFlags::MEMORY_READ,
        }
    }

    fn stages(self) -> PipelineStages {
        match self {
            Self::Undefined => PipelineStages::TOP_OF_PIPE,
            Self::TransferSrc | Self::TransferDst => PipelineStages::TRANSFER,
            Self::ShaderReadOnly => {
                PipelineStages::FRAGMENT_SHADER
                    | PipelineStages::COMPUTE_SHADER
                    | PipelineStages::RAY_TRACING_SHADER
            }
            Self::ColorAttachment => PipelineStages::COLOR_ATTACHMENT_OUTPUT,
            Self::DepthStencilAttachment => {
                PipelineStages::EARLY_FRAGMENT_TESTS | PipelineStages::LATE_FRAGMENT_TESTS
            }
            Self::UnorderedAccess => {
                PipelineStages::FRAGMENT_SHADER
                    | PipelineStages::COMPUTE_SHADER
                    | PipelineStages::RAY_TRACING_SHADER
            }
            Self::Present => PipelineStages::BOTTOM_OF_PIPE,
        }
    }

    fn allows(self, new: Self) -> bool {
        use ImageState::*;
        !matches!(
            (self, new),
            (_, Undefined)
                | (ColorAttachment, DepthStencilAttachment)
                | (DepthStencilAttachment, ColorAttachment)
        )
    }
}

/// States a buffer (or acceleration structure) can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferState {
    /// Contents undefined.
    #[default]
    Undefined,
    /// Source of a copy.
    TransferSrc,
    /// Destination of a copy.
    TransferDst,
    /// Read in shaders.
    ShaderReadOnly,
    /// Read and written as a storage buffer.
    UnorderedAccess,
    /// Read as constant (uniform) data.
    ConstantRead,
}

impl BufferState {
    fn access(self) -> AccessFlags {
        match self {
            Self::Undefined => AccessFlags::empty(),
            Self::TransferSrc => AccessFlags::TRANSFER_READ,
            Self::TransferDst => AccessFlags::TRANSFER_WRITE,
            Self::ShaderReadOnly => AccessFlags::SHADER_READ,
            Self::UnorderedAccess => AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE,
            Self::ConstantRead => AccessFlags::UNIFORM_READ,
        }
    }

    fn stages(self) -> PipelineStages {
        match self {
            Self::Undefined => PipelineStages::TOP_OF_PIPE,
            Self::TransferSrc | Self::TransferDst => PipelineStages::TRANSFER,
            Self::ShaderReadOnly | Self::UnorderedAccess | Self::ConstantRead => {
                PipelineStages::VERTEX_SHADER
                    | PipelineStages::FRAGMENT_SHADER
                    | PipelineStages::COMPUTE_SHADER
                    | PipelineStages::RAY_TRACING_SHADER
            }
        }
    }

    fn allows(self, new: Self) -> bool {
        new != Self::Undefined
    }
}

/// State of any resource the graph tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// State of an image.
    Image(ImageState),
    /// State of a buffer or acceleration structure.
    Buffer(BufferState),
}

impl ResourceState {
    /// The undefined state for a resource of the given kind.
    pub fn undefined(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Image => Self::Image(ImageState::Undefined),
            ResourceKind::Buffer | ResourceKind::AccelerationStructure => {
                Self::Buffer(BufferState::Undefined)
            }
        }
    }

    /// The copy-destination state for a resource of the given kind.
    pub fn transfer_dst(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Image => Self::Image(ImageState::TransferDst),
            ResourceKind::Buffer | ResourceKind::AccelerationStructure => {
                Self::Buffer(BufferState::TransferDst)
            }
        }
    }

    /// The copy-source state for a resource of the given kind.
    pub fn transfer_src(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Image => Self::Image(ImageState::TransferSrc),
            ResourceKind::Buffer | ResourceKind::AccelerationStructure => {
                Self::Buffer(BufferState::TransferSrc)
            }
        }
    }

    /// Returns true if this state belongs to the given resource kind.
    pub fn matches_kind(&self, kind: ResourceKind) -> bool {
        match self {
            Self::Image(_) => kind == ResourceKind::Image,
            Self::Buffer(_) => kind != ResourceKind::Image,
        }
    }

    /// State a usage requires.
    ///
    /// `format` is the effective format of the view (override or resource
    /// format), used to pick between color and depth attachment states.
    /// Returns `None` for usages that leave the current state untouched
    /// (constant reads of images) and for usages the kind cannot have
    /// (attachments on buffers).
    pub fn required(
        kind: ResourceKind,
        usage: ViewUsage,
        format: Option<TextureFormat>,
    ) -> Option<Self> {
        match kind {
            ResourceKind::Image => {
                let state = match usage {
                    ViewUsage::Read => ImageState::ShaderReadOnly,
                    ViewUsage::ReadWrite => ImageState::UnorderedAccess,
                    ViewUsage::CopySrc => ImageState::TransferSrc,
                    ViewUsage::CopyDst => ImageState::TransferDst,
                    ViewUsage::Attachment => {
                        if format.is_some_and(|format| format.is_depth_stencil()) {
                            ImageState::DepthStencilAttachment
                        } else {
                            ImageState::ColorAttachment
                        }
                    }
                    ViewUsage::ConstantRead => return None,
                };
                Some(Self::Image(state))
            }
            ResourceKind::Buffer | ResourceKind::AccelerationStructure => {
                let state = match usage {
                    ViewUsage::Read => BufferState::ShaderReadOnly,
                    ViewUsage::ReadWrite => BufferState::UnorderedAccess,
                    ViewUsage::ConstantRead => BufferState::ConstantRead,
                    ViewUsage::CopySrc => BufferState::TransferSrc,
                    ViewUsage::CopyDst => BufferState::TransferDst,
                    ViewUsage::Attachment => return None,
                };
                Some(Self::Buffer(state))
            }
        }
    }
}

/// Access and stage masks of one legal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransitionPolicy {
    /// Accesses that must complete before the transition.
    pub src_access: AccessFlags,
    /// Accesses that wait for the transition.
    pub dst_access: AccessFlags,
    /// Stages that must complete before the transition.
    pub src_stages: PipelineStages,
    /// Stages that wait for the transition.
    pub dst_stages: PipelineStages,
}

/// Look up the policy for moving a resource from `old` to `new`.
///
/// Returns `None` when the table has no entry for the pair, including pairs
/// that mix image and buffer states.
pub fn transition_policy(old: ResourceState, new: ResourceState) -> Option<TransitionPolicy> {
    match (old, new) {
        (ResourceState::Image(old), ResourceState::Image(new)) if old.allows(new) => {
            Some(TransitionPolicy {
                src_access: old.access(),
                dst_access: new.access(),
                src_stages: old.stages(),
                dst_stages: new.stages(),
            })
        }
        (ResourceState::Buffer(old), ResourceState::Buffer(new)) if old.allows(new) => {
            Some(TransitionPolicy {
                src_access: old.access(),
                dst_access: new.access(),
                src_stages: old.stages(),
                dst_stages: new.stages(),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_policy_entries() {
        let policy = transition_policy(
            ResourceState::Image(ImageState::ColorAttachment),
            ResourceState::Image(ImageState::ShaderReadOnly),
        )
        .unwrap();
        assert!(policy
            .src_access
            .contains(AccessFlags::COLOR_ATTACHMENT_WRITE));
        assert_eq!(policy.dst_access, AccessFlags::SHADER_READ);
        assert_eq!(policy.src_stages, PipelineStages::COLOR_ATTACHMENT_OUTPUT);
    }

    #[test]
    fn test_undefined_source_has_no_access() {
        let policy = transition_policy(
            ResourceState::Image(ImageState::Undefined),
            ResourceState::Image(ImageState::TransferDst),
        )
        .unwrap();
        assert!(policy.src_access.is_empty());
        assert_eq!(policy.src_stages, PipelineStages::TOP_OF_PIPE);
        assert_eq!(policy.dst_access, AccessFlags::TRANSFER_WRITE);
    }

    #[test]
    fn test_missing_entries() {
        // Nothing goes back to undefined
        assert!(transition_policy(
            ResourceState::Image(ImageState::ShaderReadOnly),
            ResourceState::Image(ImageState::Undefined),
        )
        .is_none());
        assert!(transition_policy(
            ResourceState::Buffer(BufferState::ConstantRead),
            ResourceState::Buffer(BufferState::Undefined),
        )
        .is_none());
        // Color and depth attachments are not interchangeable
        assert!(transition_policy(
            ResourceState::Image(ImageState::ColorAttachment),
            ResourceState::Image(ImageState::DepthStencilAttachment),
        )
        .is_none());
        // Mixed kinds
        assert!(transition_policy(
            ResourceState::Buffer(BufferState::TransferDst),
            ResourceState::Image(ImageState::ShaderReadOnly),
        )
        .is_none());
    }

    #[test]
    fn test_required_state_for_attachments() {
        assert_eq!(
            ResourceState::required(
                ResourceKind::Image,
                ViewUsage::Attachment,
                Some(TextureFormat::Depth32Float)
            ),
            Some(ResourceState::Image(ImageState::DepthStencilAttachment))
        );
        assert_eq!(
            ResourceState::required(
                ResourceKind::Image,
                ViewUsage::Attachment,
                Some(TextureFormat::Rgba16Float)
            ),
            Some(ResourceState::Image(ImageState::ColorAttachment))
        );
        assert_eq!(
            ResourceState::required(ResourceKind::Buffer, ViewUsage::Attachment, None),
            None
        );
    }

    #[test]
    fn test_constant_read_does_not_constrain_images() {
        assert_eq!(
            ResourceState::required(ResourceKind::Image, ViewUsage::ConstantRead, None),
            None
        );
        assert_eq!(
            ResourceState::required(ResourceKind::Buffer, ViewUsage::ConstantRead, None),
            Some(ResourceState::Buffer(BufferState::ConstantRead))
        );
    }

    #[test]
    fn test_acceleration_structures_use_buffer_states() {
        assert_eq!(
            ResourceState::required(ResourceKind::AccelerationStructure, ViewUsage::Read, None),
            Some(ResourceState::Buffer(BufferState::ShaderReadOnly))
        );
        assert!(ResourceState::undefined(ResourceKind::AccelerationStructure)
            .matches_kind(ResourceKind::AccelerationStructure));
        assert!(!ResourceState::undefined(ResourceKind::Image).matches_kind(ResourceKind::Buffer));
    }
}
