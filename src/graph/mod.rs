//! Frame declaration.
//!
//! A [`FrameGraph`] collects one frame of resources, views and passes. Passes
//! run in the order they are added; the graph derives everything else:
//!
//! - Resource lifetimes and usage bits from the views each pass touches
//! - Memory placement with aliasing of non-overlapping lifetimes
//! - State transitions and staging uploads in front of each pass
//! - Load/store operations of framebuffer attachments
//!
//! # Example
//!
//! ```ignore
//! use redlilium_framegraph::*;
//!
//! let mut graph = FrameGraph::new(device.clone(), FrameGraphConfig::default());
//! let hdr = graph.create_texture(TextureDescriptor::new_2d(
//!     1280,
//!     720,
//!     TextureFormat::Rgba16Float,
//!     TextureUsage::empty(),
//! ));
//! let target = graph.create_view(hdr, ViewUsage::Attachment)?;
//! graph.add_pass(
//!     "forward",
//!     PassParams::new().with_framebuffer(Framebuffer::new().with_color(target)),
//!     PassHint::Raster,
//!     |ctx| { /* record draws through ctx.recorder() */ },
//! )?;
//!
//! let mut executable = ExecutableGraph::new();
//! graph.compile(&mut executable, &mut memory)?;
//! executable.execute(&mut command_list);
//! ```

mod pass;
mod resource;
mod target;
mod view;

pub use pass::{Pass, PassFn, PassHint, PassIndex, PassParams};
pub use resource::{
    ExternalBinding, PassSpan, ResourceDescription, ResourceKind, ResourceRef, ResourceShape,
    ResourceUsage,
};
pub use target::{AttachmentDesc, Framebuffer, LoadOp, StoreOp};
pub use view::{ResourceView, ViewDesc, ViewRef, ViewUsage};

use std::fmt;
use std::sync::Arc;

use crate::compiler::{
    compile_frame, BufferState, ExecutableGraph, FrameDeclarations, ImageState, MemoryContext,
    PassContext, ResourceGroupCache, ResourceState, UsageRecord, UsageTracker,
};
use crate::config::FrameGraphConfig;
use crate::device::{BufferHandle, DeviceResource, GraphicsDevice, ImageHandle};
use crate::error::{GraphError, GraphResult};
use crate::types::{AccelerationStructureDescriptor, BufferDescriptor, TextureDescriptor};

/// Declarations of one frame.
///
/// Build the frame with the `create_*`, `add_pass` and marker calls, then
/// [`compile`](Self::compile) it. Compiling consumes the declarations and
/// leaves the graph empty for the next frame.
pub struct FrameGraph {
    device: Arc<dyn GraphicsDevice>,
    config: FrameGraphConfig,
    resources: Vec<ResourceDescription>,
    views: Vec<ResourceView>,
    passes: Vec<Pass>,
    usages: UsageTracker,
    open_markers: u32,
    /// First declaration error of the frame, reported again by `compile`.
    poisoned: Option<GraphError>,
    groups: ResourceGroupCache,
}

impl FrameGraph {
    /// Create an empty graph realizing resources on `device`.
    pub fn new(device: Arc<dyn GraphicsDevice>, config: FrameGraphConfig) -> Self {
        Self {
            device,
            config,
            resources: Vec::new(),
            views: Vec::new(),
            passes: Vec::new(),
            usages: UsageTracker::new(),
            open_markers: 0,
            poisoned: None,
            groups: ResourceGroupCache::new(),
        }
    }

    /// The device resources are realized on.
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    /// The graph configuration.
    pub fn config(&self) -> &FrameGraphConfig {
        &self.config
    }

    /// Drop all declarations of the current frame.
    ///
    /// Cached resource groups are kept.
    pub fn reset(&mut self) {
        self.resources.clear();
        self.views.clear();
        self.passes.clear();
        self.usages.clear();
        self.open_markers = 0;
        self.poisoned = None;
    }

    /// Number of declared passes, markers included.
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Number of declared resources.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Number of cached resource groups.
    pub fn resource_group_count(&self) -> usize {
        self.groups.len()
    }

    /// Get a declared resource.
    pub fn resource(&self, resource: ResourceRef) -> Option<&ResourceDescription> {
        self.resources
            .get(resource.index())
            .filter(|desc| desc.kind() == resource.kind())
    }

    /// Get a declared view.
    pub fn view(&self, view: ViewRef) -> Option<&ResourceView> {
        self.views.get(view.index())
    }

    /// Usage timeline of a resource so far.
    pub fn usages(&self, resource: ResourceRef) -> &[UsageRecord] {
        self.usages.timeline(resource)
    }

    // ========================================================================
    // Resources
    // ========================================================================

    /// Declare a graph-owned buffer.
    pub fn create_buffer(&mut self, desc: BufferDescriptor) -> ResourceRef {
        self.declare(ResourceShape::Buffer(desc), None)
    }

    /// Declare a graph-owned texture.
    pub fn create_texture(&mut self, desc: TextureDescriptor) -> ResourceRef {
        self.declare(ResourceShape::Image(desc), None)
    }

    /// Declare a graph-owned acceleration structure.
    pub fn create_acceleration_structure(
        &mut self,
        desc: AccelerationStructureDescriptor,
    ) -> ResourceRef {
        self.declare(ResourceShape::AccelerationStructure(desc), None)
    }

    /// Register a buffer owned outside the graph.
    ///
    /// The buffer is assumed to be in `input` on first use and is returned to
    /// `output` after its last use. Initial content on `desc` is ignored.
    pub fn register_external_buffer(
        &mut self,
        handle: BufferHandle,
        mut desc: BufferDescriptor,
        input: BufferState,
        output: BufferState,
    ) -> ResourceRef {
        desc.initial_data = None;
        self.declare(
            ResourceShape::Buffer(desc),
            Some(ExternalBinding {
                resource: DeviceResource::Buffer(handle),
                input_state: ResourceState::Buffer(input),
                output_state: ResourceState::Buffer(output),
            }),
        )
    }

    /// Register an image owned outside the graph, such as a swapchain image.
    pub fn register_external_image(
        &mut self,
        handle: ImageHandle,
        mut desc: TextureDescriptor,
        input: ImageState,
        output: ImageState,
    ) -> ResourceRef {
        desc.initial_data = None;
        self.declare(
            ResourceShape::Image(desc),
            Some(ExternalBinding {
                resource: DeviceResource::Image(handle),
                input_state: ResourceState::Image(input),
                output_state: ResourceState::Image(output),
            }),
        )
    }

    fn declare(&mut self, shape: ResourceShape, external: Option<ExternalBinding>) -> ResourceRef {
        let id = self.resources.len() as u32;
        let resource = ResourceRef::new(id, shape.kind());
        self.resources
            .push(ResourceDescription::new(id, shape, external));
        self.usages.add_resource();
        resource
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// Declare a view covering the whole resource.
    pub fn create_view(&mut self, resource: ResourceRef, usage: ViewUsage) -> GraphResult<ViewRef> {
        self.create_view_with(resource, ViewDesc::new(usage))
    }

    /// Declare a view with an optional sub-range or format override.
    pub fn create_view_with(
        &mut self,
        resource: ResourceRef,
        desc: ViewDesc,
    ) -> GraphResult<ViewRef> {
        let result = self.validate_view(resource, &desc);
        self.check(result)?;

        let view = ViewRef::new(self.views.len() as u32);
        self.views.push(ResourceView { resource, desc });
        Ok(view)
    }

    fn validate_view(&self, resource: ResourceRef, desc: &ViewDesc) -> GraphResult<()> {
        let declared = self
            .resource(resource)
            .ok_or(GraphError::UnknownResource(resource.id()))?;
        let image = declared.shape.as_image();

        let usage_fits = match desc.usage {
            ViewUsage::Attachment => image.is_some(),
            ViewUsage::ConstantRead => image.is_none(),
            _ => true,
        };
        if !usage_fits {
            return Err(GraphError::InvalidViewUsage {
                resource: declared.name.clone(),
                usage: format!("{:?}", desc.usage),
            });
        }

        let range_fits = match (desc.range, image) {
            (None, _) => true,
            (Some(range), Some(image)) => range.fits(image),
            (Some(_), None) => false,
        };
        let format_fits = desc.format.is_none() || image.is_some();
        if !range_fits || !format_fits {
            return Err(GraphError::InvalidSubresourceRange {
                resource: declared.name.clone(),
            });
        }
        Ok(())
    }

    // ========================================================================
    // Passes
    // ========================================================================

    /// Append a pass.
    ///
    /// Every view in `params` (bindings and framebuffer attachments) is
    /// recorded on its resource's usage timeline. `execute` runs when the
    /// compiled graph is replayed.
    pub fn add_pass(
        &mut self,
        name: impl Into<String>,
        params: PassParams,
        hint: PassHint,
        execute: impl FnMut(&mut PassContext<'_>) + Send + 'static,
    ) -> GraphResult<PassIndex> {
        let name = name.into();
        if hint.is_tracked() {
            let result = self.validate_pass(&name, &params);
            self.check(result)?;
        }

        let index = self.passes.len() as u32;
        if hint.is_tracked() {
            for view_ref in params.all_views() {
                let view = self.views[view_ref.index()];
                let recorded = self.usages.record(UsageRecord {
                    resource: view.resource,
                    pass: index,
                    view: view_ref,
                    usage: view.desc.usage,
                });
                if recorded {
                    self.resources[view.resource.index()]
                        .mark_used(index, view.desc.usage.usage_bit());
                }
            }
        }

        log::trace!("Added pass '{}' ({:?}) at index {}", name, hint, index);
        self.passes
            .push(Pass::new(name, params, hint, Box::new(execute)));
        Ok(PassIndex(index))
    }

    fn validate_pass(&self, name: &str, params: &PassParams) -> GraphResult<()> {
        let mut views = Vec::new();
        for view_ref in params.all_views() {
            let view = self
                .view(view_ref)
                .ok_or(GraphError::UnknownView(view_ref.index()))?;
            views.push(view);
        }

        if views.len() > self.config.max_pass_accesses {
            return Err(GraphError::TooManyAccesses {
                pass: name.to_string(),
                count: views.len(),
                limit: self.config.max_pass_accesses,
            });
        }

        if let Some(framebuffer) = &params.framebuffer {
            self.validate_framebuffer(name, framebuffer)?;
        }

        // One required state per resource within a pass
        let mut required: Vec<(ResourceRef, ResourceState)> = Vec::with_capacity(views.len());
        for view in views {
            let Some(desc) = self.resource(view.resource) else {
                return Err(GraphError::UnknownResource(view.resource.id()));
            };
            let format = view.desc.format.or_else(|| desc.shape.format());
            let Some(state) = ResourceState::required(desc.kind(), view.desc.usage, format) else {
                continue;
            };
            match required.iter().find(|(r, _)| *r == view.resource) {
                Some((_, existing)) if *existing != state => {
                    return Err(GraphError::ConflictingAccess {
                        pass: name.to_string(),
                        resource: desc.name.clone(),
                    });
                }
                Some(_) => {}
                None => required.push((view.resource, state)),
            }
        }
        Ok(())
    }

    fn validate_framebuffer(&self, name: &str, framebuffer: &Framebuffer) -> GraphResult<()> {
        if framebuffer.color.len() > self.config.max_color_attachments {
            return Err(GraphError::TooManyAttachments {
                pass: name.to_string(),
                count: framebuffer.color.len(),
                limit: self.config.max_color_attachments,
            });
        }
        if framebuffer.is_empty() {
            return Err(GraphError::ZeroSizedFramebuffer {
                pass: name.to_string(),
            });
        }

        let color_count = framebuffer.color.len();
        for (slot, attachment) in framebuffer.attachments().enumerate() {
            let view = self
                .view(attachment.view)
                .ok_or(GraphError::UnknownView(attachment.view.index()))?;
            let image = self
                .resource(view.resource)
                .and_then(|desc| desc.shape.as_image());
            let Some(image) = image.filter(|_| view.desc.usage == ViewUsage::Attachment) else {
                return Err(GraphError::InvalidAttachment {
                    pass: name.to_string(),
                });
            };

            let depth = view.desc.format.unwrap_or(image.format).is_depth_stencil();
            let depth_slot = slot >= color_count;
            if depth != depth_slot {
                return Err(GraphError::InvalidAttachment {
                    pass: name.to_string(),
                });
            }

            let mip = view.desc.range.map_or(0, |range| range.base_mip_level);
            if image.size.mip(mip).is_empty() {
                return Err(GraphError::ZeroSizedFramebuffer {
                    pass: name.to_string(),
                });
            }
        }
        Ok(())
    }

    // ========================================================================
    // Markers
    // ========================================================================

    /// Open a debug marker region.
    pub fn begin_marker(&mut self, name: impl Into<String>) -> PassIndex {
        let name = name.into();
        let label = name.clone();
        self.open_markers += 1;
        let index = self.passes.len() as u32;
        self.passes.push(Pass::new(
            name,
            PassParams::new(),
            PassHint::Immediate,
            Box::new(move |ctx: &mut PassContext<'_>| ctx.recorder().begin_marker(&label)),
        ));
        PassIndex(index)
    }

    /// Close the innermost debug marker region.
    pub fn end_marker(&mut self) -> GraphResult<PassIndex> {
        if self.open_markers == 0 {
            return self.check(Err(GraphError::UnbalancedMarkers));
        }
        self.open_markers -= 1;
        let index = self.passes.len() as u32;
        self.passes.push(Pass::new(
            String::new(),
            PassParams::new(),
            PassHint::Immediate,
            Box::new(|ctx: &mut PassContext<'_>| ctx.recorder().end_marker()),
        ));
        Ok(PassIndex(index))
    }

    // ========================================================================
    // Compilation
    // ========================================================================

    /// Compile the declared frame into `output`.
    ///
    /// Whatever `output` held before is released first. The declarations are
    /// consumed whether or not compilation succeeds; on failure `output` is
    /// left empty.
    pub fn compile(
        &mut self,
        output: &mut ExecutableGraph,
        memory: &mut MemoryContext,
    ) -> GraphResult<()> {
        output.release();

        let frame = FrameDeclarations {
            resources: std::mem::take(&mut self.resources),
            views: std::mem::take(&mut self.views),
            passes: std::mem::take(&mut self.passes),
            usages: std::mem::take(&mut self.usages),
        };
        let poisoned = self.poisoned.take();
        let open_markers = std::mem::take(&mut self.open_markers);

        let result = match poisoned {
            Some(err) => Err(err),
            None if open_markers > 0 => Err(GraphError::UnbalancedMarkers),
            None => compile_frame(
                &self.device,
                &self.config,
                &mut self.groups,
                frame,
                output,
                memory,
            ),
        };

        if let Err(err) = &result {
            log::error!("Frame graph compilation failed: {}", err);
            output.release();
        }
        result
    }

    /// Remember the first declaration error so `compile` reports it too.
    fn check<T>(&mut self, result: GraphResult<T>) -> GraphResult<T> {
        if let Err(err) = &result {
            if self.poisoned.is_none() {
                self.poisoned = Some(err.clone());
            }
        }
        result
    }
}

impl fmt::Debug for FrameGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameGraph")
            .field("device", &self.device.name())
            .field("resources", &self.resources.len())
            .field("views", &self.views.len())
            .field("passes", &self.passes)
            .field("open_markers", &self.open_markers)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}
