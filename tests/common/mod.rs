//! Common utilities for frame graph integration tests.
//!
//! Every test runs against [`DummyDevice`], which records device calls and
//! hands out fake handles, so no GPU is needed.

#![allow(dead_code)]

use std::sync::Arc;

use redlilium_framegraph::{
    BufferDescriptor, BufferUsage, Command, DummyDevice, ExecutableGraph, FrameGraph,
    FrameGraphConfig, GraphResult, GraphicsDevice, MemoryContext, MemoryLocation, PassHint,
    PassParams, ResourceRef, TextureDescriptor, TextureFormat, TextureUsage, Transition,
    ViewUsage,
};

/// Device, graph, memory and output of one test.
pub struct TestContext {
    pub device: Arc<DummyDevice>,
    pub graph: FrameGraph,
    pub memory: MemoryContext,
    pub executable: ExecutableGraph,
}

impl TestContext {
    /// Context with the default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameGraphConfig::default())
    }

    /// Context with a custom configuration.
    pub fn with_config(config: FrameGraphConfig) -> Self {
        Self::with_device(DummyDevice::new(), config)
    }

    /// Context around a preconfigured device.
    pub fn with_device(device: DummyDevice, config: FrameGraphConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let device = Arc::new(device);
        let shared: Arc<dyn GraphicsDevice> = device.clone();
        Self {
            graph: FrameGraph::new(shared.clone(), config),
            memory: MemoryContext::new(shared),
            executable: ExecutableGraph::new(),
            device,
        }
    }

    /// Compile the declared frame into `executable`.
    pub fn compile(&mut self) -> GraphResult<()> {
        self.graph.compile(&mut self.executable, &mut self.memory)
    }

    /// Device-local pool watermark.
    pub fn device_watermark(&self) -> u64 {
        self.memory.watermark(MemoryLocation::DeviceLocal)
    }

    /// Declare a device-local buffer of `size` bytes.
    pub fn buffer(&mut self, name: &str, size: u64) -> ResourceRef {
        self.graph
            .create_buffer(BufferDescriptor::new(size, BufferUsage::empty()).with_label(name))
    }

    /// Declare a 2D color texture.
    pub fn color_texture(&mut self, name: &str, width: u32, height: u32) -> ResourceRef {
        self.graph.create_texture(
            TextureDescriptor::new_2d(width, height, TextureFormat::Rgba8Unorm, TextureUsage::empty())
                .with_label(name),
        )
    }

    /// Declare a 2D depth texture.
    pub fn depth_texture(&mut self, name: &str, width: u32, height: u32) -> ResourceRef {
        self.graph.create_texture(
            TextureDescriptor::new_2d(
                width,
                height,
                TextureFormat::Depth32Float,
                TextureUsage::empty(),
            )
            .with_label(name),
        )
    }

    /// Add a compute pass touching `resource` once with `usage`.
    pub fn touch(&mut self, name: &str, resource: ResourceRef, usage: ViewUsage) {
        let view = self.graph.create_view(resource, usage).unwrap();
        self.graph
            .add_pass(name, PassParams::new().with_view(view), PassHint::Compute, |_| {})
            .unwrap();
    }

    /// Transitions of the compiled command list.
    pub fn transitions(&self) -> Vec<Transition> {
        self.executable
            .commands()
            .iter()
            .filter_map(Command::as_transition)
            .copied()
            .collect()
    }

    /// Transitions of one resource.
    pub fn transitions_of(&self, resource: ResourceRef) -> Vec<Transition> {
        self.transitions()
            .into_iter()
            .filter(|transition| transition.resource == resource)
            .collect()
    }
}

/// Byte ranges of two placements overlap.
pub fn ranges_overlap(a: (u64, u64), b: (u64, u64)) -> bool {
    a.0 < b.0 + b.1 && b.0 < a.0 + a.1
}
