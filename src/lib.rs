//! RedLilium Frame Graph
//!
//! Declarative per-frame GPU work description. A frame declares resources,
//! views onto them and an ordered list of passes; compiling the frame derives
//! resource lifetimes, places transient resources in shared memory pools
//! with aliasing, and synthesizes uploads, state transitions and render pass
//! setup around the passes.
//!
//! # Architecture
//!
//! | Module | Type | Purpose |
//! |--------|------|---------|
//! | [`graph`] | [`FrameGraph`] | Declaration store and usage recording |
//! | [`compiler`] | [`ExecutableGraph`] | Aliasing, synthesis and replay |
//! | [`compiler`] | [`MemoryContext`] | Backing memory pools, kept across frames |
//! | [`device`] | [`GraphicsDevice`] | Boundary to the graphics API |
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use redlilium_framegraph::*;
//!
//! let device: Arc<dyn GraphicsDevice> = Arc::new(DummyDevice::new());
//! let mut memory = MemoryContext::new(device.clone());
//! let mut graph = FrameGraph::new(device, FrameGraphConfig::default());
//! let mut executable = ExecutableGraph::new();
//!
//! loop {
//!     let particles = graph.create_buffer(BufferDescriptor::new(4096, BufferUsage::empty()));
//!     let simulate = graph.create_view(particles, ViewUsage::ReadWrite)?;
//!     graph.add_pass(
//!         "simulate",
//!         PassParams::new().with_view(simulate),
//!         PassHint::Compute,
//!         |_ctx| {},
//!     )?;
//!     graph.compile(&mut executable, &mut memory)?;
//!     executable.execute(&mut command_list);
//! }
//! ```

pub mod compiler;
pub mod config;
pub mod device;
pub mod error;
pub mod graph;
pub mod types;

pub use compiler::{
    alias_lifetimes, AccessFlags, AliasingEntry, AliasingReport, BufferState, Command,
    ExecutableGraph, ImageState, MemoryContext, MemoryPool, PassContext, PipelineStages,
    PoolReport, RealizedResource, ResourceLifetime, ResourceState, Transition, TransitionPolicy,
    UploadLayout, UsageRecord,
};
pub use config::FrameGraphConfig;
pub use device::{
    AccelerationStructureHandle, Barrier, BufferHandle, CommandRecorder, DeviceError,
    DeviceResource, DeviceResult, DummyDevice, GraphicsDevice, ImageHandle,
    RecordedCommand, RecordingCommandList, RenderAttachment, RenderPassBegin, ViewHandle,
};
pub use error::{GraphError, GraphResult};
pub use graph::{
    AttachmentDesc, FrameGraph, Framebuffer, LoadOp, PassHint, PassIndex, PassParams, ResourceKind,
    ResourceRef, ResourceUsage, StoreOp, ViewDesc, ViewRef, ViewUsage,
};
pub use types::*;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static_assertions::assert_impl_all!(FrameGraph: Send);
static_assertions::assert_impl_all!(ExecutableGraph: Send);
static_assertions::assert_impl_all!(MemoryContext: Send, Sync);
