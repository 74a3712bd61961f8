//! Integration tests for frame compilation.
//!
//! # Test Categories
//!
//! - **Aliasing Tests**: placement, alignment, determinism and pool growth
//! - **Upload Tests**: staging, copies and the transitions around them
//! - **Transition Tests**: external resources and state tracking
//! - **Attachment Tests**: derived load/store operations
//! - **Error Tests**: fatal configuration errors
//! - **Replay Tests**: markers, resource groups and pass closures

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rstest::rstest;

use common::{ranges_overlap, TestContext};
use redlilium_framegraph::device::DeviceCall;
use redlilium_framegraph::{
    AccelerationStructureDescriptor, BufferDescriptor, BufferState, BufferUsage, ClearValue,
    Command, DeviceResource, DummyDevice, FrameGraphConfig, Framebuffer, GraphError,
    GraphicsDevice, ImageState, LoadOp, MemoryLocation, PassHint, PassParams, RecordedCommand,
    RecordingCommandList, RenderPassBegin, ResourceState, StoreOp, SubresourceRange,
    TextureDescriptor, TextureFormat, TextureUsage, ViewDesc, ViewUsage,
};

// ============================================================================
// Aliasing Tests
// ============================================================================

#[test]
fn test_sequential_buffers_share_memory() {
    let mut ctx = TestContext::new();
    let a = ctx.buffer("a", 256);
    let b = ctx.buffer("b", 256);
    ctx.touch("first", a, ViewUsage::ReadWrite);
    ctx.touch("second", b, ViewUsage::ReadWrite);

    ctx.compile().unwrap();

    assert_eq!(ctx.device_watermark(), 256);
    assert_eq!(ctx.executable.resource_offset(a), Some(0));
    assert_eq!(ctx.executable.resource_offset(b), Some(0));
}

#[test]
fn test_concurrent_buffers_are_disjoint() {
    let mut ctx = TestContext::new();
    let a = ctx.buffer("a", 256);
    let b = ctx.buffer("b", 256);
    let va = ctx.graph.create_view(a, ViewUsage::ReadWrite).unwrap();
    let vb = ctx.graph.create_view(b, ViewUsage::ReadWrite).unwrap();
    ctx.graph
        .add_pass("both", PassParams::new().with_views([va, vb]), PassHint::Compute, |_| {})
        .unwrap();

    ctx.compile().unwrap();

    assert!(ctx.device_watermark() >= 512);
    let oa = ctx.executable.resource_offset(a).unwrap();
    let ob = ctx.executable.resource_offset(b).unwrap();
    assert!(!ranges_overlap((oa, 256), (ob, 256)));
}

/// Declare a frame of mixed buffers and textures with staggered lifetimes.
fn declare_mixed_frame(ctx: &mut TestContext) {
    let sizes = [1000u64, 256, 4096, 64, 777, 2048];
    let mut buffers = Vec::new();
    for (i, size) in sizes.iter().enumerate() {
        buffers.push(ctx.buffer(&format!("buffer{i}"), *size));
    }
    let texture = ctx.color_texture("texture", 30, 17);

    for (i, buffer) in buffers.iter().enumerate() {
        ctx.touch(&format!("write{i}"), *buffer, ViewUsage::ReadWrite);
        if i % 2 == 0 {
            ctx.touch(&format!("texture{i}"), texture, ViewUsage::ReadWrite);
        }
    }
    for buffer in buffers.iter().step_by(3) {
        ctx.touch("late_read", *buffer, ViewUsage::Read);
    }
}

#[rstest]
#[case::default_alignment(DummyDevice::new())]
#[case::large_buffer_alignment(DummyDevice::new().with_buffer_alignment(1024))]
#[case::small_image_alignment(DummyDevice::new().with_image_alignment(512))]
fn test_placement_properties(#[case] device: DummyDevice) {
    let mut ctx = TestContext::with_device(device, FrameGraphConfig::default());
    declare_mixed_frame(&mut ctx);
    ctx.compile().unwrap();

    let pool = ctx
        .executable
        .aliasing_report()
        .pool(MemoryLocation::DeviceLocal)
        .unwrap();
    assert_eq!(pool.entries.len(), 7);

    for entry in &pool.entries {
        assert_eq!(entry.offset % entry.alignment, 0, "{} misaligned", entry.name);
        assert!(entry.offset + entry.size <= pool.total_size);
    }
    for (i, a) in pool.entries.iter().enumerate() {
        for b in &pool.entries[i + 1..] {
            let lifetimes_overlap = a.first_pass <= b.last_pass && b.first_pass <= a.last_pass;
            if lifetimes_overlap {
                assert!(
                    !ranges_overlap((a.offset, a.size), (b.offset, b.size)),
                    "{} and {} share bytes",
                    a.name,
                    b.name
                );
            }
        }
    }
}

#[test]
fn test_placement_is_deterministic() {
    let mut first = TestContext::new();
    let mut second = TestContext::new();
    declare_mixed_frame(&mut first);
    declare_mixed_frame(&mut second);
    first.compile().unwrap();
    second.compile().unwrap();

    let offsets = |ctx: &TestContext| {
        ctx.executable
            .aliasing_report()
            .pool(MemoryLocation::DeviceLocal)
            .unwrap()
            .entries
            .iter()
            .map(|entry| (entry.name.clone(), entry.offset))
            .collect::<Vec<_>>()
    };
    assert_eq!(offsets(&first), offsets(&second));
    assert_eq!(first.device_watermark(), second.device_watermark());
}

#[test]
fn test_recompile_keeps_watermark() {
    let mut ctx = TestContext::new();
    declare_mixed_frame(&mut ctx);
    ctx.compile().unwrap();
    let watermark = ctx.device_watermark();

    ctx.device.clear_calls();
    declare_mixed_frame(&mut ctx);
    ctx.compile().unwrap();

    assert_eq!(ctx.device_watermark(), watermark);
    assert_eq!(ctx.memory.pool(MemoryLocation::DeviceLocal).reallocations(), 1);
    let calls = ctx.device.calls();
    assert!(!calls.iter().any(|call| matches!(call, DeviceCall::AllocateMemory { .. })));
    assert!(!calls.contains(&DeviceCall::WaitIdle));
}

#[test]
fn test_growth_waits_for_idle_before_reallocating() {
    let mut ctx = TestContext::new();
    let small = ctx.buffer("small", 256);
    ctx.touch("small", small, ViewUsage::ReadWrite);
    ctx.compile().unwrap();

    ctx.device.clear_calls();
    let large = ctx.buffer("large", 8192);
    ctx.touch("large", large, ViewUsage::ReadWrite);
    ctx.compile().unwrap();

    assert_eq!(ctx.device_watermark(), 8192);
    let calls = ctx.device.calls();
    let wait = calls.iter().position(|c| *c == DeviceCall::WaitIdle).unwrap();
    let free = calls
        .iter()
        .position(|c| matches!(c, DeviceCall::FreeMemory(_)))
        .unwrap();
    let alloc = calls
        .iter()
        .position(|c| matches!(c, DeviceCall::AllocateMemory { size: 8192, .. }))
        .unwrap();
    assert!(wait < free && free < alloc);
}

#[test]
fn test_unused_resource_gets_no_memory() {
    let mut ctx = TestContext::new();
    let unused = ctx.buffer("unused", 4096);
    ctx.graph
        .add_pass("empty", PassParams::new(), PassHint::Compute, |_| {})
        .unwrap();

    ctx.compile().unwrap();

    assert!(ctx.executable.realized(unused).is_none());
    assert_eq!(ctx.device_watermark(), 0);
    assert!(!ctx
        .device
        .calls()
        .iter()
        .any(|call| matches!(call, DeviceCall::CreateBuffer { .. })));
}

#[test]
fn test_usage_bits_reach_the_device() {
    let mut ctx = TestContext::new();
    let texture = ctx.color_texture("target", 8, 8);
    let target = ctx.graph.create_view(texture, ViewUsage::Attachment).unwrap();
    let sample = ctx.graph.create_view(texture, ViewUsage::Read).unwrap();
    ctx.graph
        .add_pass(
            "draw",
            PassParams::new().with_framebuffer(Framebuffer::new().with_color(target)),
            PassHint::Raster,
            |_| {},
        )
        .unwrap();
    ctx.graph
        .add_pass("sample", PassParams::new().with_view(sample), PassHint::Compute, |_| {})
        .unwrap();

    ctx.compile().unwrap();

    let usage = ctx
        .device
        .calls()
        .into_iter()
        .find_map(|call| match call {
            DeviceCall::CreateImage { usage, .. } => Some(usage),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        usage,
        TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING
    );
}

// ============================================================================
// Upload Tests
// ============================================================================

#[test]
fn test_buffer_upload_sequence() {
    let mut ctx = TestContext::new();
    let data: Vec<u8> = (0..64).collect();
    let constants = ctx.graph.create_buffer(
        BufferDescriptor::new(64, BufferUsage::empty())
            .with_label("constants")
            .with_data(data.clone()),
    );
    ctx.touch("shade", constants, ViewUsage::Read);

    ctx.compile().unwrap();

    let commands = ctx.executable.commands();
    let Command::StagingAlloc {
        resource, staging, ..
    } = &commands[0]
    else {
        panic!("expected staging allocation, got {:?}", commands[0]);
    };
    assert_eq!(*resource, constants);
    let staging = *staging;
    assert_eq!(
        commands[1],
        Command::StagingWrite {
            staging,
            bytes: 64
        }
    );

    let transition = commands[2].as_transition().unwrap();
    assert_eq!(transition.resource, staging);
    assert_eq!(transition.before(), ResourceState::Buffer(BufferState::Undefined));
    assert_eq!(transition.after(), ResourceState::Buffer(BufferState::TransferSrc));

    let transition = commands[3].as_transition().unwrap();
    assert_eq!(transition.resource, constants);
    assert_eq!(transition.before(), ResourceState::Buffer(BufferState::Undefined));
    assert_eq!(transition.after(), ResourceState::Buffer(BufferState::TransferDst));

    assert_eq!(
        commands[4],
        Command::CopyBuffer {
            src: staging,
            dst: constants,
            size: 64
        }
    );

    let transition = commands[5].as_transition().unwrap();
    assert_eq!(transition.resource, constants);
    assert_eq!(transition.before(), ResourceState::Buffer(BufferState::TransferDst));
    assert_eq!(transition.after(), ResourceState::Buffer(BufferState::ShaderReadOnly));

    assert_eq!(commands[6], Command::BeginMarker("shade".to_string()));

    // Content is already in host memory
    let host = ctx.memory.pool(MemoryLocation::HostVisible);
    let offset = ctx.executable.resource_offset(staging).unwrap();
    let handle = host.memory().unwrap().handle;
    assert_eq!(ctx.device.read_memory(handle, offset, 64), Some(data));
}

#[test]
fn test_image_upload_uses_row_pitch() {
    let mut ctx = TestContext::new();
    let pixels: Vec<u8> = (0..160).map(|i| i as u8).collect();
    let texture = ctx.graph.create_texture(
        TextureDescriptor::new_2d(10, 4, TextureFormat::Rgba8Unorm, TextureUsage::empty())
            .with_label("albedo")
            .with_data(pixels.clone()),
    );
    ctx.touch("sample", texture, ViewUsage::Read);

    ctx.compile().unwrap();

    let (staging, layout) = ctx
        .executable
        .commands()
        .iter()
        .find_map(|command| match command {
            Command::CopyBufferToImage {
                src, dst, layout, ..
            } if *dst == texture => Some((*src, *layout)),
            _ => None,
        })
        .unwrap();
    assert_eq!(layout.row_pitch, 256);
    assert_eq!(layout.rows_per_image, 4);

    let host = ctx.memory.pool(MemoryLocation::HostVisible);
    let handle = host.memory().unwrap().handle;
    let base = ctx.executable.resource_offset(staging).unwrap();
    for row in 0..4u64 {
        let start = row as usize * 40;
        assert_eq!(
            ctx.device.read_memory(handle, base + row * 256, 40),
            Some(pixels[start..start + 40].to_vec())
        );
    }

    let created = ctx.device.calls().into_iter().any(|call| {
        matches!(call, DeviceCall::CreateImage { usage, .. }
            if usage.contains(TextureUsage::COPY_DST | TextureUsage::TEXTURE_BINDING))
    });
    assert!(created);
}

#[test]
fn test_uploaded_attachment_loads() {
    let mut ctx = TestContext::new();
    let texture = ctx.graph.create_texture(
        TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUsage::empty())
            .with_data(vec![255u8; 64]),
    );
    let target = ctx.graph.create_view(texture, ViewUsage::Attachment).unwrap();
    ctx.graph
        .add_pass(
            "overlay",
            PassParams::new().with_framebuffer(Framebuffer::new().with_color(target)),
            PassHint::Raster,
            |_| {},
        )
        .unwrap();

    ctx.compile().unwrap();

    let begin = render_passes(&ctx).remove(0);
    assert_eq!(begin.color[0].load_op, LoadOp::Load);
}

// ============================================================================
// Transition Tests
// ============================================================================

#[test]
fn test_external_image_restores_output_state() {
    let mut ctx = TestContext::new();
    let desc = TextureDescriptor::new_2d(
        640,
        480,
        TextureFormat::Bgra8Unorm,
        TextureUsage::TEXTURE_BINDING,
    );
    let handle = ctx.device.create_image(&desc).unwrap();
    let swapchain = ctx.graph.register_external_image(
        handle,
        desc,
        ImageState::Present,
        ImageState::Present,
    );
    ctx.touch("read", swapchain, ViewUsage::Read);

    ctx.compile().unwrap();

    let commands = ctx.executable.commands();
    let last = commands.last().unwrap().as_transition().unwrap();
    assert_eq!(last.resource, swapchain);
    assert_eq!(last.after(), ResourceState::Image(ImageState::Present));

    let transitions = ctx.transitions_of(swapchain);
    assert_eq!(transitions.len(), 2);
    assert_eq!(transitions[0].before(), ResourceState::Image(ImageState::Present));
    assert_eq!(
        transitions[0].after(),
        ResourceState::Image(ImageState::ShaderReadOnly)
    );

    // External resources are never placed or destroyed by the graph
    assert!(ctx.executable.resource_offset(swapchain).is_none());
    ctx.executable.release();
    assert!(!ctx
        .device
        .calls()
        .contains(&DeviceCall::DestroyResource(DeviceResource::Image(handle))));
}

#[test]
fn test_external_already_in_output_state() {
    let mut ctx = TestContext::new();
    let desc = BufferDescriptor::new(512, BufferUsage::STORAGE);
    let handle = ctx.device.create_buffer(&desc).unwrap();
    let history = ctx.graph.register_external_buffer(
        handle,
        desc,
        BufferState::ShaderReadOnly,
        BufferState::ShaderReadOnly,
    );
    ctx.touch("read", history, ViewUsage::Read);

    ctx.compile().unwrap();

    assert!(ctx.transitions_of(history).is_empty());
}

#[rstest]
#[case::read_after_write(ViewUsage::ReadWrite, ViewUsage::Read, Some(BufferState::ShaderReadOnly))]
#[case::write_after_read(ViewUsage::Read, ViewUsage::ReadWrite, Some(BufferState::UnorderedAccess))]
#[case::repeated_read(ViewUsage::Read, ViewUsage::Read, None)]
#[case::constant_after_copy(ViewUsage::CopyDst, ViewUsage::ConstantRead, Some(BufferState::ConstantRead))]
fn test_buffer_state_sequence(
    #[case] first: ViewUsage,
    #[case] second: ViewUsage,
    #[case] expected: Option<BufferState>,
) {
    let mut ctx = TestContext::new();
    let buffer = ctx.buffer("data", 1024);
    ctx.touch("first", buffer, first);
    ctx.touch("second", buffer, second);

    ctx.compile().unwrap();

    let transitions = ctx.transitions_of(buffer);
    let second_transition = transitions.get(1).map(|t| t.after());
    assert_eq!(second_transition, expected.map(ResourceState::Buffer));
}

#[test]
fn test_acceleration_structure_uses_buffer_states() {
    let mut ctx = TestContext::new();
    let tlas = ctx
        .graph
        .create_acceleration_structure(AccelerationStructureDescriptor::new(1000).with_label("tlas"));
    ctx.touch("build", tlas, ViewUsage::ReadWrite);
    let view = ctx.graph.create_view(tlas, ViewUsage::Read).unwrap();
    ctx.graph
        .add_pass("trace", PassParams::new().with_view(view), PassHint::RayTracing, |_| {})
        .unwrap();

    ctx.compile().unwrap();

    let states: Vec<_> = ctx.transitions_of(tlas).iter().map(|t| t.after()).collect();
    assert_eq!(
        states,
        vec![
            ResourceState::Buffer(BufferState::UnorderedAccess),
            ResourceState::Buffer(BufferState::ShaderReadOnly),
        ]
    );
    assert_eq!(ctx.executable.resource_offset(tlas), Some(0));
    assert_eq!(ctx.device_watermark(), 1024);
}

// ============================================================================
// Attachment Tests
// ============================================================================

fn render_passes(ctx: &TestContext) -> Vec<RenderPassBegin> {
    ctx.executable
        .commands()
        .iter()
        .filter_map(|command| match command {
            Command::BeginRenderPass(begin) => Some(begin.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_attachment_clear_then_load() {
    let mut ctx = TestContext::new();
    let hdr = ctx.color_texture("hdr", 64, 32);
    let target = ctx.graph.create_view(hdr, ViewUsage::Attachment).unwrap();
    let sample = ctx.graph.create_view(hdr, ViewUsage::Read).unwrap();
    let clear = ClearValue::color(0.1, 0.2, 0.3, 1.0);

    ctx.graph
        .add_pass(
            "opaque",
            PassParams::new().with_framebuffer(Framebuffer::new().with_color_clear(target, clear)),
            PassHint::Raster,
            |_| {},
        )
        .unwrap();
    ctx.graph
        .add_pass("blur", PassParams::new().with_view(sample), PassHint::Compute, |_| {})
        .unwrap();
    ctx.graph
        .add_pass(
            "transparent",
            PassParams::new().with_framebuffer(Framebuffer::new().with_color(target)),
            PassHint::Raster,
            |_| {},
        )
        .unwrap();

    ctx.compile().unwrap();

    let passes = render_passes(&ctx);
    assert_eq!(passes.len(), 2);
    assert_eq!(passes[0].color[0].load_op, LoadOp::Clear(clear));
    assert_eq!(passes[0].color[0].store_op, StoreOp::Store);
    assert_eq!(passes[1].color[0].load_op, LoadOp::Load);
    assert_eq!(passes[1].color[0].store_op, StoreOp::DontCare);
    assert_eq!(passes[0].extent.width, 64);
    assert_eq!(passes[0].extent.height, 32);
    assert_eq!(
        Some(passes[0].color[0].view),
        ctx.executable.view(target)
    );
}

#[test]
fn test_depth_read_between_attachments_loads() {
    let mut ctx = TestContext::new();
    let color = ctx.color_texture("color", 16, 16);
    let depth = ctx.depth_texture("depth", 16, 16);
    let color_target = ctx.graph.create_view(color, ViewUsage::Attachment).unwrap();
    let depth_target = ctx.graph.create_view(depth, ViewUsage::Attachment).unwrap();
    let depth_read = ctx.graph.create_view(depth, ViewUsage::Read).unwrap();
    let framebuffer = Framebuffer::new()
        .with_color(color_target)
        .with_depth_stencil(depth_target);

    ctx.graph
        .add_pass(
            "prepass",
            PassParams::new().with_framebuffer(Framebuffer::new().with_depth_stencil(depth_target)),
            PassHint::Raster,
            |_| {},
        )
        .unwrap();
    ctx.graph
        .add_pass("ssao", PassParams::new().with_view(depth_read), PassHint::Compute, |_| {})
        .unwrap();
    ctx.graph
        .add_pass(
            "forward",
            PassParams::new().with_framebuffer(framebuffer),
            PassHint::Raster,
            |_| {},
        )
        .unwrap();

    ctx.compile().unwrap();

    let passes = render_passes(&ctx);
    let prepass = passes[0].depth_stencil.as_ref().unwrap();
    assert_eq!(
        prepass.load_op,
        LoadOp::Clear(ClearValue::depth_stencil(1.0, 0))
    );
    assert_eq!(prepass.store_op, StoreOp::Store);

    let forward = passes[1].depth_stencil.as_ref().unwrap();
    assert_eq!(forward.load_op, LoadOp::Load);
    assert_eq!(forward.store_op, StoreOp::DontCare);
    assert!(passes[1].color[0].load_op.is_clear());

    let states: Vec<_> = ctx.transitions_of(depth).iter().map(|t| t.after()).collect();
    assert_eq!(
        states,
        vec![
            ResourceState::Image(ImageState::DepthStencilAttachment),
            ResourceState::Image(ImageState::ShaderReadOnly),
            ResourceState::Image(ImageState::DepthStencilAttachment),
        ]
    );
}

#[test]
fn test_mip_range_change_clears() {
    let mut ctx = TestContext::new();
    let chain = ctx.graph.create_texture(
        TextureDescriptor::new_2d(64, 64, TextureFormat::Rgba16Float, TextureUsage::empty())
            .with_mip_levels(2),
    );
    let mip0 = ctx
        .graph
        .create_view_with(
            chain,
            ViewDesc::new(ViewUsage::Attachment).with_range(SubresourceRange::single(0, 0)),
        )
        .unwrap();
    let mip1 = ctx
        .graph
        .create_view_with(
            chain,
            ViewDesc::new(ViewUsage::Attachment).with_range(SubresourceRange::single(1, 0)),
        )
        .unwrap();
    for (name, view) in [("mip0", mip0), ("mip1", mip1)] {
        ctx.graph
            .add_pass(
                name,
                PassParams::new().with_framebuffer(Framebuffer::new().with_color(view)),
                PassHint::Raster,
                |_| {},
            )
            .unwrap();
    }

    ctx.compile().unwrap();

    let passes = render_passes(&ctx);
    assert!(passes[1].color[0].load_op.is_clear());
    assert_eq!(passes[1].extent.width, 32);
}

// ============================================================================
// Error Tests
// ============================================================================

#[test]
fn test_compile_without_passes() {
    let mut ctx = TestContext::new();
    ctx.buffer("lonely", 64);
    assert_eq!(ctx.compile(), Err(GraphError::NoPasses));
    assert!(ctx.executable.is_empty());
}

#[rstest]
#[case::within_limit(2, true)]
#[case::over_limit(1, false)]
fn test_access_capacity(#[case] limit: usize, #[case] accepted: bool) {
    let mut ctx = TestContext::with_config(FrameGraphConfig::default().with_max_pass_accesses(limit));
    let a = ctx.buffer("a", 64);
    let b = ctx.buffer("b", 64);
    let va = ctx.graph.create_view(a, ViewUsage::Read).unwrap();
    let vb = ctx.graph.create_view(b, ViewUsage::Read).unwrap();
    let result = ctx.graph.add_pass(
        "pair",
        PassParams::new().with_views([va, vb]),
        PassHint::Compute,
        |_| {},
    );
    assert_eq!(result.is_ok(), accepted);
    if !accepted {
        assert!(matches!(
            ctx.compile(),
            Err(GraphError::TooManyAccesses { count: 2, limit: 1, .. })
        ));
    }
}

#[test]
fn test_attachment_capacity() {
    let mut ctx =
        TestContext::with_config(FrameGraphConfig::default().with_max_color_attachments(1));
    let a = ctx.color_texture("a", 8, 8);
    let b = ctx.color_texture("b", 8, 8);
    let va = ctx.graph.create_view(a, ViewUsage::Attachment).unwrap();
    let vb = ctx.graph.create_view(b, ViewUsage::Attachment).unwrap();
    let err = ctx
        .graph
        .add_pass(
            "mrt",
            PassParams::new().with_framebuffer(Framebuffer::new().with_color(va).with_color(vb)),
            PassHint::Raster,
            |_| {},
        )
        .unwrap_err();
    assert!(matches!(err, GraphError::TooManyAttachments { count: 2, .. }));
}

#[test]
fn test_declaration_error_fails_compile() {
    let mut ctx = TestContext::new();
    let buffer = ctx.buffer("data", 64);
    let stale = ctx.graph.create_view(buffer, ViewUsage::Read).unwrap();

    // Views do not survive a reset
    ctx.graph.reset();
    let buffer = ctx.buffer("data", 64);
    let err = ctx
        .graph
        .add_pass("stale", PassParams::new().with_view(stale), PassHint::Compute, |_| {})
        .unwrap_err();
    assert_eq!(err, GraphError::UnknownView(0));

    ctx.touch("fine", buffer, ViewUsage::Read);
    assert_eq!(ctx.compile(), Err(GraphError::UnknownView(0)));
    assert!(ctx.executable.is_empty());
    assert_eq!(ctx.device.live_resource_count(), 0);

    // The next frame starts clean
    let buffer = ctx.buffer("data", 64);
    ctx.touch("fine", buffer, ViewUsage::Read);
    assert!(ctx.compile().is_ok());
}

#[test]
fn test_undefined_transition_releases_everything() {
    let mut ctx = TestContext::new();
    let target = ctx.color_texture("target", 16, 16);
    let as_color = ctx.graph.create_view(target, ViewUsage::Attachment).unwrap();
    let as_depth = ctx
        .graph
        .create_view_with(
            target,
            ViewDesc::new(ViewUsage::Attachment).with_format(TextureFormat::Depth32Float),
        )
        .unwrap();
    ctx.graph
        .add_pass(
            "color",
            PassParams::new().with_framebuffer(Framebuffer::new().with_color(as_color)),
            PassHint::Raster,
            |_| {},
        )
        .unwrap();
    ctx.graph
        .add_pass(
            "depth",
            PassParams::new().with_framebuffer(Framebuffer::new().with_depth_stencil(as_depth)),
            PassHint::Raster,
            |_| {},
        )
        .unwrap();

    let err = ctx.compile().unwrap_err();
    assert!(matches!(
        err,
        GraphError::UndefinedTransition {
            from: ResourceState::Image(ImageState::ColorAttachment),
            to: ResourceState::Image(ImageState::DepthStencilAttachment),
            ..
        }
    ));
    assert!(ctx.executable.is_empty());
    assert_eq!(ctx.device.live_resource_count(), 0);
    assert_eq!(ctx.device.live_view_count(), 0);
}

#[test]
fn test_device_failure_is_reported() {
    let mut ctx = TestContext::with_device(
        DummyDevice::new().with_memory_limit(1024),
        FrameGraphConfig::default(),
    );
    let big = ctx.buffer("big", 4096);
    ctx.touch("use", big, ViewUsage::ReadWrite);

    assert!(matches!(ctx.compile(), Err(GraphError::Device(_))));
    assert!(ctx.executable.is_empty());
    assert_eq!(ctx.device.live_resource_count(), 0);
}

// ============================================================================
// Replay Tests
// ============================================================================

#[test]
fn test_markers_and_closures_replay_in_order() {
    let mut ctx = TestContext::new();
    let counter = Arc::new(AtomicU32::new(0));
    let buffer = ctx.buffer("particles", 2048);
    let view = ctx.graph.create_view(buffer, ViewUsage::ReadWrite).unwrap();

    ctx.graph.begin_marker("simulation");
    let seen = counter.clone();
    ctx.graph
        .add_pass(
            "integrate",
            PassParams::new().with_view(view),
            PassHint::Compute,
            move |pass| {
                assert!(pass.buffer(buffer).is_some());
                assert!(pass.view(view).is_some());
                assert!(pass.resource_group().is_some());
                seen.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();
    ctx.graph.end_marker().unwrap();

    ctx.compile().unwrap();
    let mut recorder = RecordingCommandList::new();
    ctx.executable.execute(&mut recorder);

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.marker_names(), vec!["simulation", "integrate"]);
    let commands = recorder.commands();
    assert_eq!(commands[0], RecordedCommand::BeginMarker("simulation".to_string()));
    assert!(matches!(&commands[1], RecordedCommand::Barriers(b) if b.len() == 1));
    assert_eq!(commands[2], RecordedCommand::BeginMarker("integrate".to_string()));
    assert_eq!(commands[3], RecordedCommand::EndMarker);
    assert_eq!(commands[4], RecordedCommand::EndMarker);
}

#[test]
fn test_open_marker_fails_compile() {
    let mut ctx = TestContext::new();
    ctx.graph.begin_marker("never closed");
    ctx.graph
        .add_pass("work", PassParams::new(), PassHint::Compute, |_| {})
        .unwrap();
    assert_eq!(ctx.compile(), Err(GraphError::UnbalancedMarkers));
}

#[test]
fn test_resource_groups_survive_reset() {
    let mut ctx = TestContext::new();
    for _ in 0..3 {
        let a = ctx.buffer("a", 256);
        let b = ctx.buffer("b", 256);
        let va = ctx.graph.create_view(a, ViewUsage::Read).unwrap();
        let vb = ctx.graph.create_view(b, ViewUsage::ConstantRead).unwrap();
        ctx.graph
            .add_pass("bind", PassParams::new().with_views([va, vb]), PassHint::Compute, |_| {})
            .unwrap();
        ctx.compile().unwrap();
        ctx.graph.reset();
    }

    assert_eq!(ctx.graph.resource_group_count(), 1);
    let created = ctx
        .device
        .calls()
        .iter()
        .filter(|call| matches!(call, DeviceCall::CreateResourceGroup { bindings: 2, .. }))
        .count();
    assert_eq!(created, 1);
}

#[test]
fn test_recompile_releases_previous_frame() {
    let mut ctx = TestContext::new();
    declare_mixed_frame(&mut ctx);
    ctx.compile().unwrap();
    assert_eq!(ctx.device.live_resource_count(), 7);

    let only = ctx.buffer("only", 128);
    ctx.touch("only", only, ViewUsage::Read);
    ctx.compile().unwrap();
    assert_eq!(ctx.device.live_resource_count(), 1);
    assert_eq!(ctx.device.live_view_count(), 1);

    drop(ctx.executable);
    assert_eq!(ctx.device.live_resource_count(), 0);
}
