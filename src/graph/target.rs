//! Framebuffer types for raster passes.
//!
//! A raster pass may attach a [`Framebuffer`]: an ordered list of color
//! attachments plus an optional depth/stencil attachment, each naming a view
//! created with [`ViewUsage::Attachment`](super::ViewUsage::Attachment).
//! Load and store operations are not chosen by the caller; the compiler
//! derives them from the attachment's usage timeline.

use crate::types::ClearValue;

use super::ViewRef;

/// Operation to perform when loading an attachment at the start of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LoadOp {
    /// Clear the attachment with a specified value.
    Clear(ClearValue),
    /// Load the existing contents of the attachment.
    #[default]
    Load,
    /// Don't care about the existing contents (may be undefined).
    DontCare,
}

impl LoadOp {
    /// Returns true if this is a clear operation.
    pub fn is_clear(&self) -> bool {
        matches!(self, Self::Clear(_))
    }
}

/// Operation to perform when storing an attachment at the end of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreOp {
    /// Store the attachment contents for later use.
    #[default]
    Store,
    /// Don't care about the contents after the pass (may be discarded).
    DontCare,
}

/// One framebuffer attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttachmentDesc {
    /// The attached view.
    pub view: ViewRef,
    /// Clear value used when the attachment is cleared.
    ///
    /// `None` picks the configured color or depth clear value.
    pub clear_value: Option<ClearValue>,
}

impl AttachmentDesc {
    /// Create an attachment with the default clear value.
    pub fn new(view: ViewRef) -> Self {
        Self {
            view,
            clear_value: None,
        }
    }

    /// Set the clear value.
    pub fn with_clear_value(mut self, clear_value: ClearValue) -> Self {
        self.clear_value = Some(clear_value);
        self
    }
}

/// Attachment list of a raster pass.
///
/// # Example
///
/// ```ignore
/// let fb = Framebuffer::new()
///     .with_color(albedo)
///     .with_color_clear(normals, ClearValue::color(0.5, 0.5, 1.0, 0.0))
///     .with_depth_stencil(depth);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Framebuffer {
    /// Color attachments, in slot order.
    pub color: Vec<AttachmentDesc>,
    /// Depth/stencil attachment.
    pub depth_stencil: Option<AttachmentDesc>,
}

impl Framebuffer {
    /// Create an empty framebuffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a color attachment.
    pub fn with_color(mut self, view: ViewRef) -> Self {
        self.color.push(AttachmentDesc::new(view));
        self
    }

    /// Add a color attachment with an explicit clear value.
    pub fn with_color_clear(mut self, view: ViewRef, clear_value: ClearValue) -> Self {
        self.color
            .push(AttachmentDesc::new(view).with_clear_value(clear_value));
        self
    }

    /// Set the depth/stencil attachment.
    pub fn with_depth_stencil(mut self, view: ViewRef) -> Self {
        self.depth_stencil = Some(AttachmentDesc::new(view));
        self
    }

    /// Set the depth/stencil attachment with an explicit clear value.
    pub fn with_depth_stencil_clear(mut self, view: ViewRef, clear_value: ClearValue) -> Self {
        self.depth_stencil = Some(AttachmentDesc::new(view).with_clear_value(clear_value));
        self
    }

    /// Returns true if there are no attachments.
    pub fn is_empty(&self) -> bool {
        self.color.is_empty() && self.depth_stencil.is_none()
    }

    /// Iterate over all attachments, color first.
    pub fn attachments(&self) -> impl Iterator<Item = &AttachmentDesc> {
        self.color.iter().chain(self.depth_stencil.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framebuffer_builder() {
        let fb = Framebuffer::new()
            .with_color(ViewRef::new(0))
            .with_color_clear(ViewRef::new(1), ClearValue::color(1.0, 0.0, 0.0, 1.0))
            .with_depth_stencil(ViewRef::new(2));

        assert_eq!(fb.color.len(), 2);
        assert!(fb.color[0].clear_value.is_none());
        assert!(fb.color[1].clear_value.is_some());
        let views: Vec<_> = fb.attachments().map(|a| a.view).collect();
        assert_eq!(views, vec![ViewRef::new(0), ViewRef::new(1), ViewRef::new(2)]);
    }

    #[test]
    fn test_empty_framebuffer() {
        assert!(Framebuffer::new().is_empty());
        assert!(!Framebuffer::new().with_depth_stencil(ViewRef::new(0)).is_empty());
    }

    #[test]
    fn test_load_op_default() {
        assert_eq!(LoadOp::default(), LoadOp::Load);
        assert!(LoadOp::Clear(ClearValue::depth(1.0)).is_clear());
        assert_eq!(StoreOp::default(), StoreOp::Store);
    }
}
