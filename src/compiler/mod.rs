//! Frame compilation.
//!
//! Turns one frame of declarations into an [`ExecutableGraph`]:
//!
//! 1. **Usage tracking** - per-resource timelines, recorded while passes are added
//! 2. **Realization** - device objects for every used resource, staging for uploads
//! 3. **Aliasing** - offsets inside the per-location memory pools
//! 4. **Synthesis** - uploads, transitions and render pass setup around each pass
//! 5. **Assembly** - the linear command list, in declaration order
//!
//! Passes are never reordered; synthesized commands are inserted immediately
//! before the pass that needs them.

mod aliasing;
mod executable;
mod groups;
mod memory;
mod state;
mod transition;
mod upload;
mod usage;

pub use aliasing::{alias_lifetimes, AliasingEntry, AliasingReport, PoolReport, ResourceLifetime};
pub use executable::{Command, ExecutableGraph, PassContext, RealizedResource};
pub use groups::ResourceGroupCache;
pub use memory::{MemoryContext, MemoryPool};
pub use state::{
    transition_policy, AccessFlags, BufferState, ImageState, PipelineStages, ResourceState,
    TransitionPolicy,
};
pub use transition::Transition;
pub use upload::UploadLayout;
pub use usage::{UsageRecord, UsageTracker};

use std::sync::Arc;

use crate::config::FrameGraphConfig;
use crate::device::{
    DeviceResource, GraphicsDevice, MemoryBinding, RenderAttachment, RenderPassBegin,
    ResourceGroupLayout, ViewDescriptor,
};
use crate::error::{GraphError, GraphResult};
use crate::graph::{
    Framebuffer, Pass, PassHint, PassIndex, PassSpan, ResourceDescription, ResourceKind,
    ResourceRef, ResourceShape, ResourceUsage, ResourceView, ViewRef,
};
use crate::types::{
    BufferDescriptor, BufferUsage, MemoryLocation, SubresourceRange, TextureFormat,
};

use executable::CompiledPass;
use transition::{attachment_load_op, attachment_store_op, StateTracker};
use upload::{write_staging, Upload};

/// Round `value` up to a multiple of `alignment`.
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    value.div_ceil(alignment) * alignment
}

/// Everything declared for one frame, moved out of the frame graph.
pub(crate) struct FrameDeclarations {
    pub resources: Vec<ResourceDescription>,
    pub views: Vec<ResourceView>,
    pub passes: Vec<Pass>,
    pub usages: UsageTracker,
}

impl FrameDeclarations {
    fn resource_ref(&self, index: usize) -> ResourceRef {
        ResourceRef::new(index as u32, self.resources[index].kind())
    }

    fn view(&self, view: ViewRef) -> GraphResult<&ResourceView> {
        self.views
            .get(view.index())
            .ok_or(GraphError::UnknownView(view.index()))
    }

    fn resource(&self, resource: ResourceRef) -> GraphResult<&ResourceDescription> {
        self.resources
            .get(resource.index())
            .ok_or(GraphError::UnknownResource(resource.id()))
    }

    /// Format a view is interpreted with: override first, then the resource format.
    fn view_format(&self, view: &ResourceView) -> Option<TextureFormat> {
        view.desc.format.or_else(|| {
            self.resources
                .get(view.resource.index())
                .and_then(|resource| resource.shape.format())
        })
    }
}

/// Shared state of one compile call.
struct FrameCompiler<'a> {
    device: &'a Arc<dyn GraphicsDevice>,
    config: &'a FrameGraphConfig,
    frame: &'a FrameDeclarations,
    output: &'a mut ExecutableGraph,
    spans: Vec<Option<PassSpan>>,
    uploads: Vec<Upload>,
}

/// Compile `frame` into `output`.
///
/// `output` must be empty; on error it may hold partially realized objects
/// the caller releases.
pub(crate) fn compile_frame(
    device: &Arc<dyn GraphicsDevice>,
    config: &FrameGraphConfig,
    groups: &mut ResourceGroupCache,
    mut frame: FrameDeclarations,
    output: &mut ExecutableGraph,
    memory: &mut MemoryContext,
) -> GraphResult<()> {
    if frame.passes.is_empty() {
        return Err(GraphError::NoPasses);
    }
    output.device = Some(device.clone());

    let initial_data: Vec<Option<Vec<u8>>> = frame
        .resources
        .iter_mut()
        .map(|resource| resource.shape.take_initial_data())
        .collect();
    let passes = std::mem::take(&mut frame.passes);
    let last_pass = (passes.len() - 1) as u32;

    let mut compiler = FrameCompiler {
        device,
        config,
        frame: &frame,
        output: &mut *output,
        spans: Vec::new(),
        uploads: Vec::new(),
    };

    let mut tracker = StateTracker::new(compiler.realize_resources(initial_data, last_pass)?);
    for _ in &compiler.uploads {
        tracker.push(ResourceState::undefined(ResourceKind::Buffer));
    }
    compiler.place_resources(memory)?;
    compiler.write_uploads(memory)?;
    compiler.realize_views()?;
    let commands = compiler.synthesize(&passes, tracker)?;

    let mut compiled = Vec::with_capacity(passes.len());
    for pass in passes {
        let group = if pass.hint.is_tracked() && !pass.params.views.is_empty() {
            let bindings = pass
                .params
                .views
                .iter()
                .map(|&view| {
                    let view = frame.view(view)?;
                    let depth = frame
                        .view_format(view)
                        .is_some_and(|format| format.is_depth_stencil());
                    Ok(view.desc.usage.view_kind(depth))
                })
                .collect::<GraphResult<Vec<_>>>()?;
            Some(groups.get_or_create(device.as_ref(), &ResourceGroupLayout { bindings })?)
        } else {
            None
        };
        compiled.push(CompiledPass {
            name: pass.name,
            hint: pass.hint,
            group,
            execute: pass.execute,
        });
    }

    let command_count = commands.len();
    output.commands = commands;
    output.passes = compiled;

    log::debug!(
        "Compiled frame: {} passes, {} resources, {} commands",
        output.passes.len(),
        output.resources.iter().flatten().count(),
        command_count
    );
    if config.log_aliasing_map {
        log::debug!("Aliasing map:\n{}", output.report);
    }
    Ok(())
}

impl FrameCompiler<'_> {
    /// Create device objects for used resources and staging buffers for uploads.
    ///
    /// Returns the state every resource enters the frame in.
    fn realize_resources(
        &mut self,
        mut initial_data: Vec<Option<Vec<u8>>>,
        last_pass: u32,
    ) -> GraphResult<Vec<ResourceState>> {
        let frame = self.frame;
        let mut states = Vec::with_capacity(frame.resources.len());

        for (index, resource) in frame.resources.iter().enumerate() {
            let rref = frame.resource_ref(index);
            states.push(match &resource.external {
                Some(external) => external.input_state,
                None => ResourceState::undefined(resource.kind()),
            });

            let Some(span) = resource.span.filter(|_| !frame.usages.is_unused(rref)) else {
                log::warn!(
                    "Resource '{}' is declared but never used; it gets no memory",
                    resource.name
                );
                self.push_resource(None, None);
                continue;
            };

            let (handle, owned) = match &resource.external {
                Some(external) => (external.resource, false),
                None => {
                    let has_data = initial_data[index].is_some();
                    (self.create_resource(resource, has_data)?, true)
                }
            };
            self.push_resource(
                Some(RealizedResource {
                    name: resource.name.clone(),
                    handle,
                    owned,
                    location: resource.shape.location(),
                    offset: None,
                }),
                Some(span),
            );

            if let Some(data) = initial_data[index].take().filter(|_| owned) {
                let layout = match &resource.shape {
                    ResourceShape::Image(desc) => {
                        UploadLayout::image(desc, self.config.upload_row_alignment)
                    }
                    ResourceShape::Buffer(desc) => UploadLayout::buffer(data.len(), desc.size),
                    ResourceShape::AccelerationStructure(_) => continue,
                };
                self.uploads.push(Upload {
                    resource: rref,
                    staging: rref,
                    first_pass: span.first,
                    data,
                    layout,
                    staged: 0,
                });
            }
        }

        for index in 0..self.uploads.len() {
            let upload = &self.uploads[index];
            let name = format!("{}.staging", frame.resources[upload.resource.index()].name);
            let destination = self
                .output
                .resource(upload.resource)
                .map(|handle| self.device.memory_requirements(handle))
                .unwrap_or_default();
            let size = upload.layout.staging_size(destination);
            let descriptor = BufferDescriptor::new(size, BufferUsage::COPY_SRC)
                .with_label(name.clone())
                .with_location(MemoryLocation::HostVisible);
            let handle = self.device.create_buffer(&descriptor)?;

            let staging = ResourceRef::new(self.output.resources.len() as u32, ResourceKind::Buffer);
            self.push_resource(
                Some(RealizedResource {
                    name,
                    handle: DeviceResource::Buffer(handle),
                    owned: true,
                    location: MemoryLocation::HostVisible,
                    offset: None,
                }),
                // Staging is written on the CPU before any pass runs
                Some(PassSpan {
                    first: 0,
                    last: last_pass,
                }),
            );
            self.uploads[index].staging = staging;
        }

        Ok(states)
    }

    fn push_resource(&mut self, realized: Option<RealizedResource>, span: Option<PassSpan>) {
        self.output.resources.push(realized);
        self.spans.push(span);
    }

    fn create_resource(
        &self,
        resource: &ResourceDescription,
        has_data: bool,
    ) -> GraphResult<DeviceResource> {
        let copy_dst = if has_data {
            ResourceUsage::COPY_DST
        } else {
            ResourceUsage::empty()
        };
        let usage = resource.usage | copy_dst;
        let handle = match &resource.shape {
            ResourceShape::Buffer(desc) => {
                let mut desc = desc.clone().with_label(resource.name.clone());
                desc.usage |= usage.buffer_usage();
                DeviceResource::Buffer(self.device.create_buffer(&desc)?)
            }
            ResourceShape::Image(desc) => {
                let mut desc = desc.clone().with_label(resource.name.clone());
                desc.usage |= usage.texture_usage();
                DeviceResource::Image(self.device.create_image(&desc)?)
            }
            ResourceShape::AccelerationStructure(desc) => {
                let desc = desc.clone().with_label(resource.name.clone());
                DeviceResource::AccelerationStructure(
                    self.device.create_acceleration_structure(&desc)?,
                )
            }
        };
        Ok(handle)
    }

    /// Alias owned resources per pool, grow the pools and bind.
    fn place_resources(&mut self, memory: &mut MemoryContext) -> GraphResult<()> {
        for location in MemoryLocation::ALL {
            let mut lifetimes = Vec::new();
            for (index, realized) in self.output.resources.iter().enumerate() {
                let (Some(realized), Some(span)) = (realized, self.spans[index]) else {
                    continue;
                };
                if !realized.owned || realized.location != location {
                    continue;
                }
                let requirements = self.device.memory_requirements(realized.handle);
                lifetimes.push(ResourceLifetime::new(
                    index as u32,
                    span.first,
                    span.last,
                    requirements.size,
                    requirements.alignment,
                ));
            }
            if lifetimes.is_empty() {
                continue;
            }

            let total = alias_lifetimes(&mut lifetimes);
            let (device, pool) = memory.pool_mut(location);
            pool.reserve(device, total)?;

            let mut bindings = Vec::with_capacity(lifetimes.len());
            let mut entries = Vec::with_capacity(lifetimes.len());
            for lifetime in &lifetimes {
                let Some(realized) = self.output.resources[lifetime.key as usize].as_mut() else {
                    continue;
                };
                realized.offset = Some(lifetime.offset);
                bindings.push(MemoryBinding {
                    resource: realized.handle,
                    offset: lifetime.offset,
                });
                entries.push(AliasingEntry {
                    name: realized.name.clone(),
                    size: lifetime.size,
                    alignment: lifetime.alignment,
                    offset: lifetime.offset,
                    first_pass: lifetime.begin,
                    last_pass: lifetime.end,
                });
            }
            pool.bind(device, &bindings)?;

            entries.sort_by(|a, b| a.offset.cmp(&b.offset).then_with(|| a.name.cmp(&b.name)));
            self.output.report.pools.push(PoolReport {
                location,
                total_size: total,
                entries,
            });
        }
        Ok(())
    }

    /// Copy initial content into the bound staging buffers.
    fn write_uploads(&mut self, memory: &mut MemoryContext) -> GraphResult<()> {
        let (device, pool) = memory.pool_mut(MemoryLocation::HostVisible);
        for upload in &mut self.uploads {
            let base = self
                .output
                .resource_offset(upload.staging)
                .unwrap_or_default();
            let written = write_staging(device, pool, base, &upload.data, &upload.layout)?;
            log::trace!(
                "Staged {} bytes for '{}'",
                written,
                self.frame.resources[upload.resource.index()].name
            );
            upload.data = Vec::new();
            upload.staged = written;
        }
        Ok(())
    }

    /// Create a device view for every view some tracked pass uses.
    fn realize_views(&mut self) -> GraphResult<()> {
        let frame = self.frame;
        let mut used = vec![false; frame.views.len()];
        for (index, _) in frame.resources.iter().enumerate() {
            for record in frame.usages.timeline(frame.resource_ref(index)) {
                if let Some(flag) = used.get_mut(record.view.index()) {
                    *flag = true;
                }
            }
        }

        self.output.views = vec![None; frame.views.len()];
        for (index, view) in frame.views.iter().enumerate() {
            if !used[index] {
                continue;
            }
            let Some(handle) = self.output.resource(view.resource) else {
                continue;
            };
            let depth = frame
                .view_format(view)
                .is_some_and(|format| format.is_depth_stencil());
            let descriptor = ViewDescriptor {
                kind: view.desc.usage.view_kind(depth),
                range: view.desc.range,
                format: view.desc.format,
            };
            self.output.views[index] = Some(self.device.create_view(handle, &descriptor)?);
        }
        Ok(())
    }

    /// Build the linear command list.
    fn synthesize(&self, passes: &[Pass], mut tracker: StateTracker) -> GraphResult<Vec<Command>> {
        let frame = self.frame;
        let mut commands = Vec::new();

        for (index, pass) in passes.iter().enumerate() {
            let pass_index = index as u32;
            if !pass.hint.is_tracked() {
                commands.push(Command::Execute(PassIndex(pass_index)));
                continue;
            }

            for upload in self.uploads.iter().filter(|u| u.first_pass == pass_index) {
                self.emit_upload(upload, &mut tracker, &mut commands)?;
            }

            for view_ref in pass.params.all_views() {
                let view = frame.view(view_ref)?;
                let resource = frame.resource(view.resource)?;
                let required = ResourceState::required(
                    resource.kind(),
                    view.desc.usage,
                    frame.view_format(view),
                );
                let (Some(required), Some(handle)) =
                    (required, self.output.resource(view.resource))
                else {
                    continue;
                };
                if let Some(transition) =
                    tracker.transition(view.resource, &resource.name, handle, required)?
                {
                    commands.push(Command::Transition(transition));
                }
            }

            let render_pass = match (&pass.params.framebuffer, pass.hint) {
                (Some(framebuffer), PassHint::Raster) => {
                    Some(self.render_pass(pass_index, framebuffer)?)
                }
                _ => None,
            };
            let marked = !pass.name.is_empty();
            if marked {
                commands.push(Command::BeginMarker(pass.name.clone()));
            }
            if let Some(begin) = render_pass {
                commands.push(Command::BeginRenderPass(begin));
                commands.push(Command::Execute(PassIndex(pass_index)));
                commands.push(Command::EndRenderPass);
            } else {
                commands.push(Command::Execute(PassIndex(pass_index)));
            }
            if marked {
                commands.push(Command::EndMarker);
            }
        }

        // Hand external resources back in the state their owner expects
        for (index, resource) in frame.resources.iter().enumerate() {
            let Some(external) = &resource.external else {
                continue;
            };
            let rref = frame.resource_ref(index);
            if frame.usages.is_unused(rref) {
                continue;
            }
            if let Some(transition) =
                tracker.transition(rref, &resource.name, external.resource, external.output_state)?
            {
                commands.push(Command::Transition(transition));
            }
        }

        Ok(commands)
    }

    fn emit_upload(
        &self,
        upload: &Upload,
        tracker: &mut StateTracker,
        commands: &mut Vec<Command>,
    ) -> GraphResult<()> {
        let frame = self.frame;
        let resource = frame.resource(upload.resource)?;
        let (Some(staging), Some(destination)) = (
            self.output.realized(upload.staging),
            self.output.realized(upload.resource),
        ) else {
            return Ok(());
        };
        let size = self
            .device
            .memory_requirements(staging.handle)
            .size;

        commands.push(Command::StagingAlloc {
            resource: upload.resource,
            staging: upload.staging,
            size,
        });
        commands.push(Command::StagingWrite {
            staging: upload.staging,
            bytes: upload.staged,
        });
        let kind = upload.resource.kind();
        for (rref, name, handle, state) in [
            (
                upload.staging,
                staging.name.as_str(),
                staging.handle,
                ResourceState::transfer_src(ResourceKind::Buffer),
            ),
            (
                upload.resource,
                resource.name.as_str(),
                destination.handle,
                ResourceState::transfer_dst(kind),
            ),
        ] {
            if let Some(transition) = tracker.transition(rref, name, handle, state)? {
                commands.push(Command::Transition(transition));
            }
        }

        match upload.layout {
            UploadLayout::Buffer { size } => commands.push(Command::CopyBuffer {
                src: upload.staging,
                dst: upload.resource,
                size,
            }),
            UploadLayout::Image {
                extent,
                array_layers,
                ..
            } => {
                if let Some(layout) = upload.layout.buffer_image_layout() {
                    commands.push(Command::CopyBufferToImage {
                        src: upload.staging,
                        dst: upload.resource,
                        layout,
                        extent,
                        array_layers,
                    });
                }
            }
        }
        Ok(())
    }

    /// Attachment list of a raster pass with derived load/store operations.
    fn render_pass(&self, pass: u32, framebuffer: &Framebuffer) -> GraphResult<RenderPassBegin> {
        let frame = self.frame;
        let mut begin = RenderPassBegin {
            color: Vec::with_capacity(framebuffer.color.len()),
            depth_stencil: None,
            extent: Default::default(),
        };

        for (slot, attachment) in framebuffer.attachments().enumerate() {
            let view = frame.view(attachment.view)?;
            let resource = frame.resource(view.resource)?;
            let full_range = resource.shape.as_image().map(SubresourceRange::full);
            let depth = frame
                .view_format(view)
                .is_some_and(|format| format.is_depth_stencil());

            if slot == 0 {
                if let Some(desc) = resource.shape.as_image() {
                    let mip = view.desc.range.map_or(0, |range| range.base_mip_level);
                    begin.extent = desc.size.mip(mip);
                }
            }

            let timeline = frame.usages.timeline(view.resource);
            let position = frame
                .usages
                .position(view.resource, pass, attachment.view)
                .unwrap_or_default();
            let uploaded = self.uploads.iter().any(|u| u.resource == view.resource);
            let clear_value = attachment.clear_value.unwrap_or(if depth {
                self.config.depth_clear_value
            } else {
                self.config.color_clear_value
            });

            let rendered = RenderAttachment {
                view: self
                    .output
                    .view(attachment.view)
                    .ok_or(GraphError::UnknownView(attachment.view.index()))?,
                load_op: attachment_load_op(
                    timeline,
                    position,
                    uploaded,
                    full_range,
                    |other| frame.views.get(other.index()).and_then(|v| v.desc.range),
                    clear_value,
                ),
                store_op: attachment_store_op(timeline, position, resource.is_external()),
            };
            if slot < framebuffer.color.len() {
                begin.color.push(rendered);
            } else {
                begin.depth_stencil = Some(rendered);
            }
        }
        Ok(begin)
    }
}
