//! Staging uploads of CPU initial content.
//!
//! A resource declared with initial content gets a host-visible staging
//! buffer. The content is written into staging while the frame compiles
//! (images row by row at an aligned pitch) and copied into the destination
//! right before its first use.

use crate::device::{BufferImageLayout, DeviceResult, GraphicsDevice, MemoryRequirements};
use crate::graph::ResourceRef;
use crate::types::{Extent3d, TextureDescriptor};

use super::align_up;
use super::memory::MemoryPool;

/// How the staged bytes map onto the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadLayout {
    /// Plain byte copy into a buffer.
    Buffer {
        /// Bytes copied.
        size: u64,
    },
    /// Row-pitched copy into mip 0 of an image.
    Image {
        /// Bytes in one tightly packed row.
        row_bytes: u64,
        /// Bytes between rows in staging.
        row_pitch: u64,
        /// Rows per 2D slice.
        rows_per_image: u32,
        /// Number of rows across all slices and layers.
        row_count: u64,
        /// Extent of mip 0.
        extent: Extent3d,
        /// Array layers.
        array_layers: u32,
    },
}

impl UploadLayout {
    /// Layout of a buffer upload.
    pub fn buffer(data_len: usize, buffer_size: u64) -> Self {
        Self::Buffer {
            size: (data_len as u64).min(buffer_size),
        }
    }

    /// Layout of an image upload with rows aligned to `row_alignment`.
    pub fn image(desc: &TextureDescriptor, row_alignment: u64) -> Self {
        let row_bytes = desc.row_bytes();
        Self::Image {
            row_bytes,
            row_pitch: align_up(row_bytes, row_alignment),
            rows_per_image: desc.size.height,
            row_count: desc.row_count(),
            extent: desc.size,
            array_layers: desc.array_layer_count,
        }
    }

    /// Bytes the layout occupies in staging.
    pub fn staging_bytes(&self) -> u64 {
        match *self {
            Self::Buffer { size } => size,
            Self::Image {
                row_pitch,
                row_count,
                ..
            } => row_pitch * row_count,
        }
    }

    /// Staging buffer size: the destination's requirements, grown to fit the layout.
    pub fn staging_size(&self, destination: MemoryRequirements) -> u64 {
        destination.size.max(self.staging_bytes()).max(1)
    }

    /// Copy layout handed to the recorder for image uploads.
    pub fn buffer_image_layout(&self) -> Option<BufferImageLayout> {
        match *self {
            Self::Buffer { .. } => None,
            Self::Image {
                row_pitch,
                rows_per_image,
                ..
            } => Some(BufferImageLayout {
                offset: 0,
                row_pitch,
                rows_per_image,
            }),
        }
    }
}

/// One pending upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Upload {
    /// Destination resource.
    pub resource: ResourceRef,
    /// Staging buffer resource.
    pub staging: ResourceRef,
    /// First pass using the destination.
    pub first_pass: u32,
    /// Content to upload.
    pub data: Vec<u8>,
    /// Layout of the content in staging.
    pub layout: UploadLayout,
    /// Bytes written into staging.
    pub staged: u64,
}

/// Write upload content into staging memory at `base`.
///
/// Returns the number of bytes written.
pub(crate) fn write_staging(
    device: &dyn GraphicsDevice,
    pool: &MemoryPool,
    base: u64,
    data: &[u8],
    layout: &UploadLayout,
) -> DeviceResult<u64> {
    match *layout {
        UploadLayout::Buffer { size } => {
            let len = usize::try_from(size).unwrap_or(usize::MAX).min(data.len());
            pool.write(device, base, &data[..len])?;
            Ok(len as u64)
        }
        UploadLayout::Image {
            row_bytes,
            row_pitch,
            row_count,
            ..
        } => {
            let row_len = usize::try_from(row_bytes).unwrap_or(usize::MAX).max(1);
            let rows = usize::try_from(row_count).unwrap_or(usize::MAX);
            let mut written = 0u64;
            for (row, bytes) in data.chunks(row_len).take(rows).enumerate() {
                pool.write(device, base + row as u64 * row_pitch, bytes)?;
                written += bytes.len() as u64;
            }
            Ok(written)
        }
    }
}
