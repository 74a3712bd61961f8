//! Frame graph configuration.

use crate::types::ClearValue;

/// Tunables of a [`FrameGraph`](crate::FrameGraph).
///
/// # Example
///
/// ```ignore
/// let config = FrameGraphConfig::default()
///     .with_max_pass_accesses(32)
///     .with_color_clear_value(ClearValue::color(0.0, 0.0, 0.0, 1.0));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FrameGraphConfig {
    /// Maximum number of access records (views plus attachments) per pass.
    pub max_pass_accesses: usize,
    /// Maximum number of color attachments per framebuffer.
    pub max_color_attachments: usize,
    /// Row pitch alignment of image data in staging buffers.
    pub upload_row_alignment: u64,
    /// Clear value for color attachments without an explicit one.
    pub color_clear_value: ClearValue,
    /// Clear value for depth/stencil attachments without an explicit one.
    pub depth_clear_value: ClearValue,
    /// Log the aliasing map at debug level after every compile.
    pub log_aliasing_map: bool,
}

impl Default for FrameGraphConfig {
    fn default() -> Self {
        Self {
            max_pass_accesses: 64,
            max_color_attachments: 8,
            upload_row_alignment: 256,
            color_clear_value: ClearValue::color(0.0, 0.0, 0.0, 0.0),
            depth_clear_value: ClearValue::depth_stencil(1.0, 0),
            log_aliasing_map: true,
        }
    }
}

impl FrameGraphConfig {
    /// Set the per-pass access-record capacity.
    pub fn with_max_pass_accesses(mut self, limit: usize) -> Self {
        self.max_pass_accesses = limit;
        self
    }

    /// Set the color attachment capacity.
    pub fn with_max_color_attachments(mut self, limit: usize) -> Self {
        self.max_color_attachments = limit;
        self
    }

    /// Set the staging row pitch alignment.
    pub fn with_upload_row_alignment(mut self, alignment: u64) -> Self {
        self.upload_row_alignment = alignment.max(1);
        self
    }

    /// Set the default color clear value.
    pub fn with_color_clear_value(mut self, value: ClearValue) -> Self {
        self.color_clear_value = value;
        self
    }

    /// Set the default depth/stencil clear value.
    pub fn with_depth_clear_value(mut self, value: ClearValue) -> Self {
        self.depth_clear_value = value;
        self
    }

    /// Enable or disable the aliasing map log.
    pub fn with_aliasing_map_log(mut self, enabled: bool) -> Self {
        self.log_aliasing_map = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FrameGraphConfig::default();
        assert_eq!(config.max_pass_accesses, 64);
        assert_eq!(config.max_color_attachments, 8);
        assert_eq!(config.upload_row_alignment, 256);
        assert_eq!(config.depth_clear_value, ClearValue::depth_stencil(1.0, 0));
    }

    #[test]
    fn test_builder() {
        let config = FrameGraphConfig::default()
            .with_max_pass_accesses(4)
            .with_upload_row_alignment(0)
            .with_aliasing_map_log(false);
        assert_eq!(config.max_pass_accesses, 4);
        assert_eq!(config.upload_row_alignment, 1);
        assert!(!config.log_aliasing_map);
    }
}
