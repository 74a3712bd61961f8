//! Compiled, replayable frames.

use std::fmt;
use std::sync::Arc;

use crate::device::{
    AccelerationStructureHandle, Barrier, BufferHandle, BufferImageLayout, CommandRecorder,
    DeviceResource, GraphicsDevice, ImageHandle, RenderPassBegin, ResourceGroupHandle, ViewHandle,
};
use crate::graph::{PassFn, PassHint, PassIndex, ResourceRef, ViewRef};
use crate::types::{Extent3d, MemoryLocation};

use super::aliasing::AliasingReport;
use super::transition::Transition;

/// One entry of the linear command list.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// A staging buffer was placed for the upload of `resource`.
    StagingAlloc {
        resource: ResourceRef,
        staging: ResourceRef,
        size: u64,
    },
    /// Initial content was written into staging while compiling.
    StagingWrite { staging: ResourceRef, bytes: u64 },
    /// A state transition.
    Transition(Transition),
    /// Buffer-to-buffer copy.
    CopyBuffer {
        src: ResourceRef,
        dst: ResourceRef,
        size: u64,
    },
    /// Buffer-to-image copy into mip 0.
    CopyBufferToImage {
        src: ResourceRef,
        dst: ResourceRef,
        layout: BufferImageLayout,
        extent: Extent3d,
        array_layers: u32,
    },
    /// Open a debug region.
    BeginMarker(String),
    /// Close a debug region.
    EndMarker,
    /// Open a render pass.
    BeginRenderPass(RenderPassBegin),
    /// Close a render pass.
    EndRenderPass,
    /// Run a pass closure.
    Execute(PassIndex),
}

impl Command {
    /// Get the transition, if this is one.
    pub fn as_transition(&self) -> Option<&Transition> {
        match self {
            Self::Transition(transition) => Some(transition),
            _ => None,
        }
    }
}

/// A resource that exists on the device for the compiled frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RealizedResource {
    /// Debug name.
    pub name: String,
    /// Device object.
    pub handle: DeviceResource,
    /// False for external resources.
    pub owned: bool,
    /// Pool the resource is placed in.
    pub location: MemoryLocation,
    /// Byte offset inside the pool (owned resources only).
    pub offset: Option<u64>,
}

pub(crate) struct CompiledPass {
    pub name: String,
    pub hint: PassHint,
    pub group: Option<ResourceGroupHandle>,
    pub execute: Option<PassFn>,
}

/// Context handed to pass closures during replay.
pub struct PassContext<'a> {
    recorder: &'a mut dyn CommandRecorder,
    pass: PassIndex,
    name: &'a str,
    group: Option<ResourceGroupHandle>,
    resources: &'a [Option<RealizedResource>],
    views: &'a [Option<ViewHandle>],
}

impl<'a> PassContext<'a> {
    /// Index of the running pass.
    pub fn pass_index(&self) -> PassIndex {
        self.pass
    }

    /// Name of the running pass.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Command recorder to emit work into.
    pub fn recorder(&mut self) -> &mut dyn CommandRecorder {
        &mut *self.recorder
    }

    /// Resource group created for the pass's binding layout.
    pub fn resource_group(&self) -> Option<ResourceGroupHandle> {
        self.group
    }

    /// Device view realized for a declared view.
    pub fn view(&self, view: ViewRef) -> Option<ViewHandle> {
        self.views.get(view.index()).copied().flatten()
    }

    /// Device object of a declared resource.
    pub fn resource(&self, resource: ResourceRef) -> Option<DeviceResource> {
        self.resources
            .get(resource.index())
            .and_then(Option::as_ref)
            .map(|realized| realized.handle)
    }

    /// Device buffer of a declared buffer.
    pub fn buffer(&self, resource: ResourceRef) -> Option<BufferHandle> {
        self.resource(resource)?.as_buffer()
    }

    /// Device image of a declared image.
    pub fn image(&self, resource: ResourceRef) -> Option<ImageHandle> {
        self.resource(resource)?.as_image()
    }

    /// Device acceleration structure of a declared acceleration structure.
    pub fn acceleration_structure(
        &self,
        resource: ResourceRef,
    ) -> Option<AccelerationStructureHandle> {
        match self.resource(resource)? {
            DeviceResource::AccelerationStructure(handle) => Some(handle),
            DeviceResource::Buffer(_) | DeviceResource::Image(_) => None,
        }
    }
}

/// A compiled frame: device resources plus the linear command list.
///
/// Owns every graph-created device object of its frame; they are destroyed
/// when the graph is recompiled or dropped.
#[derive(Default)]
pub struct ExecutableGraph {
    pub(crate) device: Option<Arc<dyn GraphicsDevice>>,
    pub(crate) commands: Vec<Command>,
    pub(crate) passes: Vec<CompiledPass>,
    pub(crate) resources: Vec<Option<RealizedResource>>,
    pub(crate) views: Vec<Option<ViewHandle>>,
    pub(crate) report: AliasingReport,
}

impl ExecutableGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if nothing is compiled into this graph.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Linear command list.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Aliasing map of the compiled frame.
    pub fn aliasing_report(&self) -> &AliasingReport {
        &self.report
    }

    /// Number of passes, markers included.
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Byte offset of a graph-owned resource inside its pool.
    pub fn resource_offset(&self, resource: ResourceRef) -> Option<u64> {
        self.realized(resource)?.offset
    }

    /// Realized resource of a declared (or staging) resource.
    pub fn realized(&self, resource: ResourceRef) -> Option<&RealizedResource> {
        self.resources.get(resource.index())?.as_ref()
    }

    /// Device object of a resource.
    pub fn resource(&self, resource: ResourceRef) -> Option<DeviceResource> {
        self.realized(resource).map(|realized| realized.handle)
    }

    /// Device view of a declared view.
    pub fn view(&self, view: ViewRef) -> Option<ViewHandle> {
        self.views.get(view.index()).copied().flatten()
    }

    /// Resource group bound for a pass.
    pub fn resource_group(&self, pass: PassIndex) -> Option<ResourceGroupHandle> {
        self.passes.get(pass.get() as usize)?.group
    }

    /// Replay the command list into `recorder`.
    ///
    /// Consecutive transitions are handed over as one barrier batch.
    pub fn execute(&mut self, recorder: &mut dyn CommandRecorder) {
        let Self {
            commands,
            passes,
            resources,
            views,
            ..
        } = self;
        let resources: &[Option<RealizedResource>] = resources;
        let views: &[Option<ViewHandle>] = views;
        let mut batch: Vec<Barrier> = Vec::new();

        for command in commands.iter() {
            if let Command::Transition(transition) = command {
                batch.push(transition.barrier);
                continue;
            }
            if !batch.is_empty() {
                recorder.pipeline_barrier(&batch);
                batch.clear();
            }

            let handle_of = |resource: ResourceRef| {
                resources
                    .get(resource.index())
                    .and_then(Option::as_ref)
                    .map(|realized| realized.handle)
            };

            match command {
                Command::StagingAlloc { .. }
                | Command::StagingWrite { .. }
                | Command::Transition(_) => {}
                Command::CopyBuffer { src, dst, size } => {
                    match (
                        handle_of(*src).and_then(|h| h.as_buffer()),
                        handle_of(*dst).and_then(|h| h.as_buffer()),
                    ) {
                        (Some(src), Some(dst)) => recorder.copy_buffer(src, 0, dst, 0, *size),
                        _ => log::error!("Copy between unrealized buffers skipped"),
                    }
                }
                Command::CopyBufferToImage {
                    src,
                    dst,
                    layout,
                    extent,
                    array_layers,
                } => {
                    match (
                        handle_of(*src).and_then(|h| h.as_buffer()),
                        handle_of(*dst).and_then(|h| h.as_image()),
                    ) {
                        (Some(src), Some(dst)) => {
                            recorder.copy_buffer_to_image(src, *layout, dst, *extent, *array_layers)
                        }
                        _ => log::error!("Copy into unrealized image skipped"),
                    }
                }
                Command::BeginMarker(name) => recorder.begin_marker(name),
                Command::EndMarker => recorder.end_marker(),
                Command::BeginRenderPass(begin) => recorder.begin_render_pass(begin),
                Command::EndRenderPass => recorder.end_render_pass(),
                Command::Execute(index) => {
                    let Some(pass) = passes.get_mut(index.get() as usize) else {
                        continue;
                    };
                    log::trace!("Executing pass '{}' ({:?})", pass.name, pass.hint);
                    if let Some(execute) = pass.execute.as_mut() {
                        let mut context = PassContext {
                            recorder: &mut *recorder,
                            pass: *index,
                            name: &pass.name,
                            group: pass.group,
                            resources,
                            views,
                        };
                        execute(&mut context);
                    }
                }
            }
        }

        if !batch.is_empty() {
            recorder.pipeline_barrier(&batch);
        }
    }

    /// Destroy every graph-owned device object and clear the graph.
    pub fn release(&mut self) {
        if let Some(device) = &self.device {
            for view in self.views.drain(..).flatten() {
                device.destroy_view(view);
            }
            for realized in self.resources.drain(..).flatten() {
                if realized.owned {
                    device.destroy_resource(realized.handle);
                }
            }
        }
        self.commands.clear();
        self.passes.clear();
        self.resources.clear();
        self.views.clear();
        self.report = AliasingReport::default();
    }
}

impl fmt::Debug for ExecutableGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutableGraph")
            .field("commands", &self.commands.len())
            .field("passes", &self.passes.len())
            .field("resources", &self.resources.len())
            .finish_non_exhaustive()
    }
}

impl Drop for ExecutableGraph {
    fn drop(&mut self) {
        self.release();
    }
}
