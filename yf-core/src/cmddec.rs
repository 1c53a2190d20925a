//! Decoder: replays a recorded [`CommandBuffer`]'s [`Cmd`] list against the
//! GPU, managing the state the encode stage left implicit: render pass
//! lifetime, descriptor bindings, deferred clears, and image layout
//! transitions.
//!
//! Grounded on `cmdbuf.c`'s `decode_*` family (`decode_graph`, `decode_comp`,
//! plus the shared `decode_copy*`/`decode_sync` helpers): a single pass over
//! the command list tracking "currently bound" state and a handful of
//! deferred operations (descriptor binds, clears) that only take effect when
//! a `Draw`/`Dispatch`, or end of stream, forces them. Thread re-entry is
//! rejected the same way `cmdbuf.c` detects it, through `gdec`/`cdec` being
//! non-null: a thread-local flag, set for the duration of one decode.

use std::cell::Cell;
use std::thread::LocalKey;

use ash::vk;
use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::buffer::Buffer;
use crate::cmd::{Cmd, Color, KindTag};
use crate::cmdbuf::CommandBuffer;
use crate::cmdpool::CommandPool;
use crate::context::Context;
use crate::cstate::CState;
use crate::error::{bail, err, Result};
use crate::gstate::GState;
use crate::image::Image;
use crate::pass::{Pass, Target};

thread_local! {
    static GDEC_BUSY: Cell<bool> = const { Cell::new(false) };
    static CDEC_BUSY: Cell<bool> = const { Cell::new(false) };
}

/// Marks a thread-local decoder slot busy for the lifetime of one `decode`
/// call, refusing re-entry with `InUse` the way `gdec`/`cdec` do in the
/// original.
struct ReentryGuard(&'static LocalKey<Cell<bool>>);

impl ReentryGuard {
    fn acquire(slot: &'static LocalKey<Cell<bool>>) -> Result<Self> {
        let already_busy = slot.with(|busy| busy.replace(true));
        if already_busy {
            bail!(InUse);
        }
        Ok(ReentryGuard(slot))
    }
}

impl Drop for ReentryGuard {
    fn drop(&mut self) {
        self.0.with(|busy| busy.set(false));
    }
}

/// Entry point called by [`CommandBuffer::end`]. Dispatches to the
/// graphics or compute decode loop and, on success, hands the closed
/// recorder to the execution queue.
pub(crate) fn decode(buf: CommandBuffer) -> Result<()> {
    let (ctx, kind, cmds) = buf.into_parts();

    let _guard = match kind {
        KindTag::Graphics => ReentryGuard::acquire(&GDEC_BUSY)?,
        KindTag::Compute => ReentryGuard::acquire(&CDEC_BUSY)?,
    };

    let pool = ctx.command_pool().ok_or_else(|| err!(Unsupported))?;
    let exec = ctx.exec_queue().ok_or_else(|| err!(Unsupported))?;

    let cmdr = pool.obtain(kind)?;
    let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    if unsafe { ctx.device().begin_command_buffer(cmdr.buffer(), &begin_info) }.is_err() {
        pool.yield_res(&cmdr);
        bail!(DeviceGeneric);
    }

    let loop_result = match kind {
        KindTag::Graphics => decode_graphics(&ctx, &pool, cmdr.buffer(), &cmds),
        KindTag::Compute => decode_compute(&ctx, &pool, cmdr.buffer(), &cmds),
    };

    let end_result = unsafe { ctx.device().end_command_buffer(cmdr.buffer()) };
    let final_result = match (loop_result, end_result) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), _) => Err(e),
        (Ok(()), Err(_)) => Err(err!(DeviceGeneric)),
    };

    match final_result {
        Ok(()) => match exec.enqueue(cmdr, None) {
            Ok(()) => Ok(()),
            Err(e) => {
                pool.yield_res(&cmdr);
                Err(e)
            }
        },
        Err(e) => {
            pool.yield_res(&cmdr);
            Err(e)
        }
    }
}

bitflags::bitflags! {
    /// Which pieces of per-draw state have been bound at least once since
    /// the decode loop started. Mirrors the original's `YF_STATEBIT_*` set.
    #[derive(Clone, Copy, PartialEq, Eq)]
    struct Bits: u8 {
        const GST   = 1 << 0;
        const TGT   = 1 << 1;
        const VPORT = 1 << 2;
        const SCISS = 1 << 3;
        const VBUF  = 1 << 4;
        const IBUF  = 1 << 5;
        const CST   = 1 << 6;
    }
}

/// Sparse index → allocation map for `SetDTable`, deferred until the next
/// `Draw`/`Dispatch`.
#[derive(Default)]
struct DTableBindings {
    allocs: HashMap<u32, u32>,
    pending: bool,
}

impl DTableBindings {
    fn set(&mut self, index: u32, alloc: u32) {
        self.allocs.insert(index, alloc);
        self.pending = true;
    }
}

/// Deferred color/depth/stencil clear values, applied either at the next
/// `Draw` (via `vkCmdClearAttachments`) or, failing that, at end of stream
/// (via `vkCmdClear{Color,DepthStencil}Image`).
#[derive(Default)]
struct ClearState {
    colors: HashMap<u32, Color>,
    depth: Option<f32>,
    stencil: Option<u32>,
}

impl ClearState {
    fn is_pending(&self) -> bool {
        !self.colors.is_empty() || self.depth.is_some() || self.stencil.is_some()
    }

    fn reset(&mut self) {
        self.colors.clear();
        self.depth = None;
        self.stencil = None;
    }
}

/// Per-decode state tracked while replaying a graphics command list.
/// Grounded on `cmdbuf.c`'s `T_graph` local to `decode_graph`.
#[derive(Default)]
struct GraphicsState {
    gst: Option<GState>,
    tgt: Option<Target>,
    /// The render pass currently begun on the GPU, distinct from `gst`'s
    /// declared pass: a pass stays begun across several draws that share one
    /// state, and is torn down lazily, not the moment `gst` changes.
    pass: Option<Pass>,
    bits: Bits,
    dtb: DTableBindings,
    clear: ClearState,
}

fn decode_graphics(ctx: &Context, pool: &CommandPool, cmdbuf: vk::CommandBuffer, cmds: &[Cmd]) -> Result<()> {
    let limits = ctx.limits();
    let mut st = GraphicsState::default();

    for cmd in cmds {
        match cmd {
            Cmd::SetGState(gst) => {
                if st.gst.as_ref() != Some(gst) {
                    if let Some(pass) = &st.pass {
                        if pass != gst.pass() {
                            unsafe { ctx.device().cmd_end_render_pass(cmdbuf) };
                            st.pass = None;
                        }
                    }
                    unsafe {
                        ctx.device()
                            .cmd_bind_pipeline(cmdbuf, vk::PipelineBindPoint::GRAPHICS, gst.handle())
                    };
                    st.gst = Some(gst.clone());
                    st.bits.insert(Bits::GST);
                }
            }

            Cmd::SetTarget(tgt) => {
                if st.tgt.as_ref() != Some(tgt) {
                    if st.pass.take().is_some() {
                        unsafe { ctx.device().cmd_end_render_pass(cmdbuf) };
                    }
                    st.tgt = Some(tgt.clone());
                    st.bits.insert(Bits::TGT);
                }
            }

            Cmd::SetViewport { index, viewport } => {
                if *index >= limits.viewport.max {
                    bail!(InvalidArgument);
                }
                if viewport.width <= 0.0 || viewport.height <= 0.0 {
                    bail!(InvalidArgument);
                }
                if viewport.x < limits.viewport.bounds_min
                    || viewport.y < limits.viewport.bounds_min
                    || viewport.x + viewport.width > limits.viewport.bounds_max
                    || viewport.y + viewport.height > limits.viewport.bounds_max
                {
                    bail!(InvalidArgument);
                }
                if !(0.0..=1.0).contains(&viewport.min_depth) || !(0.0..=1.0).contains(&viewport.max_depth) {
                    bail!(InvalidArgument);
                }
                if viewport.width > limits.viewport.dim_max.0 || viewport.height > limits.viewport.dim_max.1 {
                    bail!(InvalidArgument);
                }
                let vp = vk::Viewport {
                    x: viewport.x,
                    y: viewport.y,
                    width: viewport.width,
                    height: viewport.height,
                    min_depth: viewport.min_depth,
                    max_depth: viewport.max_depth,
                };
                unsafe { ctx.device().cmd_set_viewport(cmdbuf, *index, &[vp]) };
                st.bits.insert(Bits::VPORT);
            }

            Cmd::SetScissor { index, rect } => {
                let sc = vk::Rect2D {
                    offset: vk::Offset2D { x: rect.x, y: rect.y },
                    extent: vk::Extent2D {
                        width: rect.width,
                        height: rect.height,
                    },
                };
                unsafe { ctx.device().cmd_set_scissor(cmdbuf, *index, &[sc]) };
                st.bits.insert(Bits::SCISS);
            }

            Cmd::SetDTable { index, alloc } => {
                if *index >= limits.state.dtable_max {
                    bail!(InvalidArgument);
                }
                st.dtb.set(*index, *alloc);
            }

            Cmd::SetVertexBuffer { index, buffer, offset } => {
                if *index >= limits.state.vinput_max {
                    bail!(InvalidArgument);
                }
                unsafe {
                    ctx.device()
                        .cmd_bind_vertex_buffers(cmdbuf, *index, &[buffer.handle()], &[*offset])
                };
                st.bits.insert(Bits::VBUF);
            }

            Cmd::SetIndexBuffer { buffer, offset, stride } => {
                let index_type = match stride {
                    2 => vk::IndexType::UINT16,
                    4 => vk::IndexType::UINT32,
                    _ => bail!(InvalidArgument),
                };
                unsafe {
                    ctx.device()
                        .cmd_bind_index_buffer(cmdbuf, buffer.handle(), *offset, index_type)
                };
                st.bits.insert(Bits::IBUF);
            }

            Cmd::ClearColor { index, value } => {
                if *index >= limits.pass.color_max {
                    bail!(InvalidArgument);
                }
                st.clear.colors.insert(*index, *value);
            }

            Cmd::ClearDepth { value } => {
                st.clear.depth = Some(value.clamp(0.0, 1.0));
            }

            Cmd::ClearStencil { value } => {
                st.clear.stencil = Some(*value);
            }

            Cmd::Draw {
                indexed,
                index_base,
                vert_n,
                inst_n,
                vert_id,
                inst_id,
            } => {
                let mut required = Bits::GST | Bits::TGT | Bits::VPORT | Bits::SCISS | Bits::VBUF;
                if *indexed {
                    required |= Bits::IBUF;
                }
                if !st.bits.contains(required) {
                    bail!(InvalidCommand);
                }
                let gst = st.gst.as_ref().expect("GST bit implies gst is set");
                let tgt = st.tgt.as_ref().expect("TGT bit implies tgt is set");
                if tgt.pass() != gst.pass() {
                    bail!(InvalidArgument);
                }

                if st.pass.as_ref() != Some(gst.pass()) {
                    if st.pass.take().is_some() {
                        unsafe { ctx.device().cmd_end_render_pass(cmdbuf) };
                    }
                    begin_render_pass(ctx, cmdbuf, gst.pass(), tgt);
                    st.pass = Some(gst.pass().clone());
                }

                if st.dtb.pending {
                    bind_dtables(ctx, cmdbuf, vk::PipelineBindPoint::GRAPHICS, gst, &st.dtb)?;
                    st.dtb.pending = false;
                }

                if st.clear.is_pending() {
                    emit_clear_attachments(ctx, cmdbuf, tgt, &st.clear);
                    st.clear.reset();
                }

                if *indexed {
                    unsafe {
                        ctx.device()
                            .cmd_draw_indexed(cmdbuf, *vert_n, *inst_n, *index_base, *vert_id, *inst_id as u32)
                    };
                } else {
                    unsafe {
                        ctx.device()
                            .cmd_draw(cmdbuf, *vert_n, *inst_n, *vert_id as u32, *inst_id as u32)
                    };
                }
            }

            Cmd::Dispatch { .. } => bail!(InvalidArgument),

            Cmd::CopyBuffer {
                dst,
                dst_offset,
                src,
                src_offset,
                size,
            } => emit_copy_buffer(ctx, cmdbuf, dst, *dst_offset, src, *src_offset, *size),

            Cmd::CopyImage {
                dst,
                dst_off,
                dst_layer,
                dst_level,
                src,
                src_off,
                src_layer,
                src_level,
                dim,
                layer_n,
            } => emit_copy_image(
                ctx, pool, cmdbuf, dst, *dst_off, *dst_layer, *dst_level, src, *src_off, *src_layer,
                *src_level, *dim, *layer_n,
            )?,

            Cmd::Sync => {
                if st.pass.take().is_some() {
                    unsafe { ctx.device().cmd_end_render_pass(cmdbuf) };
                }
                emit_sync(ctx, cmdbuf);
            }

            Cmd::SetCState(_) => bail!(InvalidArgument),
        }
    }

    if st.pass.take().is_some() {
        unsafe { ctx.device().cmd_end_render_pass(cmdbuf) };
    }

    if st.clear.is_pending() {
        let Some(tgt) = &st.tgt else { bail!(InvalidCommand) };
        emit_clear_images(ctx, cmdbuf, tgt, &st.clear);
        st.clear.reset();
    }

    Ok(())
}

/// Per-decode state tracked while replaying a compute command list.
/// Grounded on `cmdbuf.c`'s `T_comp`.
#[derive(Default)]
struct ComputeState {
    cst: Option<CState>,
    bits: Bits,
    dtb: DTableBindings,
}

fn decode_compute(ctx: &Context, pool: &CommandPool, cmdbuf: vk::CommandBuffer, cmds: &[Cmd]) -> Result<()> {
    let limits = ctx.limits();
    let mut st = ComputeState::default();

    for cmd in cmds {
        match cmd {
            Cmd::SetCState(cst) => {
                if st.cst.as_ref() != Some(cst) {
                    unsafe {
                        ctx.device()
                            .cmd_bind_pipeline(cmdbuf, vk::PipelineBindPoint::COMPUTE, cst.handle())
                    };
                    st.cst = Some(cst.clone());
                    st.bits.insert(Bits::CST);
                }
            }

            Cmd::SetDTable { index, alloc } => {
                if *index >= limits.state.dtable_max {
                    bail!(InvalidArgument);
                }
                st.dtb.set(*index, *alloc);
            }

            Cmd::Dispatch { dim } => {
                let (w, h, d) = *dim;
                if w == 0 || h == 0 || d == 0 {
                    bail!(InvalidArgument);
                }
                let max = limits.cmdbuf.disp_dim_max;
                if w > max.0 || h > max.1 || d > max.2 {
                    bail!(Limit);
                }
                if st.dtb.pending {
                    let Some(cst) = &st.cst else { bail!(InvalidCommand) };
                    bind_dtables_compute(ctx, cmdbuf, cst, &st.dtb)?;
                    st.dtb.pending = false;
                }
                if !st.bits.contains(Bits::CST) {
                    bail!(InvalidCommand);
                }
                unsafe { ctx.device().cmd_dispatch(cmdbuf, w, h, d) };
            }

            Cmd::CopyBuffer {
                dst,
                dst_offset,
                src,
                src_offset,
                size,
            } => emit_copy_buffer(ctx, cmdbuf, dst, *dst_offset, src, *src_offset, *size),

            Cmd::CopyImage {
                dst,
                dst_off,
                dst_layer,
                dst_level,
                src,
                src_off,
                src_layer,
                src_level,
                dim,
                layer_n,
            } => emit_copy_image(
                ctx, pool, cmdbuf, dst, *dst_off, *dst_layer, *dst_level, src, *src_off, *src_layer,
                *src_level, *dim, *layer_n,
            )?,

            Cmd::Sync => emit_sync(ctx, cmdbuf),

            _ => bail!(InvalidArgument),
        }
    }

    Ok(())
}

fn begin_render_pass(ctx: &Context, cmdbuf: vk::CommandBuffer, pass: &Pass, tgt: &Target) {
    let (w, h) = tgt.dim();
    let begin_info = vk::RenderPassBeginInfo::builder()
        .render_pass(pass.handle())
        .framebuffer(tgt.handle())
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D { width: w, height: h },
        })
        .clear_values(&[]);
    unsafe {
        ctx.device()
            .cmd_begin_render_pass(cmdbuf, &begin_info, vk::SubpassContents::INLINE)
    };
}

fn bind_dtables(
    ctx: &Context,
    cmdbuf: vk::CommandBuffer,
    bind_point: vk::PipelineBindPoint,
    gst: &GState,
    dtb: &DTableBindings,
) -> Result<()> {
    let mut indices: SmallVec<[u32; 8]> = dtb.allocs.keys().copied().collect();
    indices.sort_unstable();
    for index in indices {
        if index >= gst.dtable_count() {
            bail!(InvalidArgument);
        }
        let table = gst.dtable(index).expect("index checked above");
        let alloc = dtb.allocs[&index];
        if alloc >= table.set_count() {
            bail!(InvalidArgument);
        }
        let set = table.set(alloc).expect("alloc checked above");
        unsafe {
            ctx.device()
                .cmd_bind_descriptor_sets(cmdbuf, bind_point, gst.layout(), index, &[set], &[])
        };
    }
    Ok(())
}

fn bind_dtables_compute(
    ctx: &Context,
    cmdbuf: vk::CommandBuffer,
    cst: &CState,
    dtb: &DTableBindings,
) -> Result<()> {
    let mut indices: SmallVec<[u32; 8]> = dtb.allocs.keys().copied().collect();
    indices.sort_unstable();
    for index in indices {
        if index >= cst.dtable_count() {
            bail!(InvalidArgument);
        }
        let table = cst.dtable(index).expect("index checked above");
        let alloc = dtb.allocs[&index];
        if alloc >= table.set_count() {
            bail!(InvalidArgument);
        }
        let set = table.set(alloc).expect("alloc checked above");
        unsafe {
            ctx.device()
                .cmd_bind_descriptor_sets(cmdbuf, vk::PipelineBindPoint::COMPUTE, cst.layout(), index, &[set], &[])
        };
    }
    Ok(())
}

/// Applies deferred clears through `vkCmdClearAttachments`, covering the
/// full target rectangle across all of its layers. Used when a `Draw`
/// consumes the pending clear inside an already-begun render pass.
fn emit_clear_attachments(ctx: &Context, cmdbuf: vk::CommandBuffer, tgt: &Target, clear: &ClearState) {
    let mut attachments: SmallVec<[vk::ClearAttachment; 8]> = SmallVec::new();

    let mut indices: SmallVec<[u32; 8]> = clear.colors.keys().copied().collect();
    indices.sort_unstable();
    for index in indices {
        let c = clear.colors[&index];
        attachments.push(vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            color_attachment: index,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [c.r, c.g, c.b, c.a],
                },
            },
        });
    }

    if clear.depth.is_some() || clear.stencil.is_some() {
        let mut aspect = vk::ImageAspectFlags::empty();
        if clear.depth.is_some() {
            aspect |= vk::ImageAspectFlags::DEPTH;
        }
        if clear.stencil.is_some() {
            aspect |= vk::ImageAspectFlags::STENCIL;
        }
        attachments.push(vk::ClearAttachment {
            aspect_mask: aspect,
            color_attachment: 0,
            clear_value: vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: clear.depth.unwrap_or(0.0),
                    stencil: clear.stencil.unwrap_or(0),
                },
            },
        });
    }

    if attachments.is_empty() {
        return;
    }

    let (w, h) = tgt.dim();
    let rect = vk::ClearRect {
        rect: vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D { width: w, height: h },
        },
        base_array_layer: 0,
        layer_count: tgt.layers(),
    };
    unsafe { ctx.device().cmd_clear_attachments(cmdbuf, &attachments, &[rect]) };
}

/// Applies deferred clears directly to the target's backing images, used at
/// end of stream when no `Draw` ever consumed them (and so no render pass
/// was ever begun to clear them through).
fn emit_clear_images(ctx: &Context, cmdbuf: vk::CommandBuffer, tgt: &Target, clear: &ClearState) {
    let mut indices: SmallVec<[u32; 8]> = clear.colors.keys().copied().collect();
    indices.sort_unstable();
    for index in indices {
        let Some(image) = tgt.images().get(index as usize) else { continue };
        let c = clear.colors[&index];
        let base_layer = tgt.base_layers().get(index as usize).copied().unwrap_or(0);
        let range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: base_layer,
            layer_count: tgt.layers(),
        };
        let value = vk::ClearColorValue {
            float32: [c.r, c.g, c.b, c.a],
        };
        unsafe {
            ctx.device()
                .cmd_clear_color_image(cmdbuf, image.handle(), vk::ImageLayout::GENERAL, &value, &[range])
        };
    }

    if clear.depth.is_some() || clear.stencil.is_some() {
        if let Some(image) = tgt.images().last() {
            let base_layer = tgt.base_layers().last().copied().unwrap_or(0);
            let mut aspect = vk::ImageAspectFlags::empty();
            if clear.depth.is_some() {
                aspect |= vk::ImageAspectFlags::DEPTH;
            }
            if clear.stencil.is_some() {
                aspect |= vk::ImageAspectFlags::STENCIL;
            }
            let range = vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: base_layer,
                layer_count: tgt.layers(),
            };
            let value = vk::ClearDepthStencilValue {
                depth: clear.depth.unwrap_or(0.0),
                stencil: clear.stencil.unwrap_or(0),
            };
            unsafe {
                ctx.device()
                    .cmd_clear_depth_stencil_image(cmdbuf, image.handle(), vk::ImageLayout::GENERAL, &value, &[range])
            };
        }
    }
}

fn emit_sync(ctx: &Context, cmdbuf: vk::CommandBuffer) {
    let barrier = vk::MemoryBarrier::builder()
        .src_access_mask(vk::AccessFlags::MEMORY_WRITE)
        .dst_access_mask(vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE);
    unsafe {
        ctx.device().cmd_pipeline_barrier(
            cmdbuf,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::DependencyFlags::BY_REGION,
            &[*barrier],
            &[],
            &[],
        )
    };
}

fn emit_copy_buffer(
    ctx: &Context,
    cmdbuf: vk::CommandBuffer,
    dst: &Buffer,
    dst_offset: u64,
    src: &Buffer,
    src_offset: u64,
    size: u64,
) {
    let region = vk::BufferCopy {
        src_offset,
        dst_offset,
        size,
    };
    unsafe {
        ctx.device()
            .cmd_copy_buffer(cmdbuf, src.handle(), dst.handle(), &[region])
    };
}

#[allow(clippy::too_many_arguments)]
fn emit_copy_image(
    ctx: &Context,
    pool: &CommandPool,
    cmdbuf: vk::CommandBuffer,
    dst: &Image,
    dst_off: (i32, i32, i32),
    dst_layer: u32,
    dst_level: u32,
    src: &Image,
    src_off: (i32, i32, i32),
    src_layer: u32,
    src_level: u32,
    dim: (u32, u32, u32),
    layer_n: u32,
) -> Result<()> {
    ensure_general_layout(ctx, pool, dst)?;
    ensure_general_layout(ctx, pool, src)?;

    let src_sub = vk::ImageSubresourceLayers {
        aspect_mask: src.format().aspect(),
        mip_level: src_level,
        base_array_layer: src_layer,
        layer_count: layer_n,
    };
    let dst_sub = vk::ImageSubresourceLayers {
        aspect_mask: dst.format().aspect(),
        mip_level: dst_level,
        base_array_layer: dst_layer,
        layer_count: layer_n,
    };
    let region = vk::ImageCopy {
        src_subresource: src_sub,
        src_offset: vk::Offset3D {
            x: src_off.0,
            y: src_off.1,
            z: src_off.2,
        },
        dst_subresource: dst_sub,
        dst_offset: vk::Offset3D {
            x: dst_off.0,
            y: dst_off.1,
            z: dst_off.2,
        },
        extent: vk::Extent3D {
            width: dim.0,
            height: dim.1,
            depth: dim.2,
        },
    };
    unsafe {
        ctx.device().cmd_copy_image(
            cmdbuf,
            src.handle(),
            vk::ImageLayout::GENERAL,
            dst.handle(),
            vk::ImageLayout::GENERAL,
            &[region],
        )
    };
    Ok(())
}

/// Stages a priority layout transition to `GENERAL` if `image` isn't already
/// headed there. Records the transition into the singleton priority
/// recorder; the actual submission happens the next time the execution
/// queue's priority lane is drained.
fn ensure_general_layout(ctx: &Context, pool: &CommandPool, image: &Image) -> Result<()> {
    const TARGET: vk::ImageLayout = vk::ImageLayout::GENERAL;
    if image.next_layout() == TARGET {
        return Ok(());
    }

    let old_layout = image.layout();
    let image_for_callback = image.clone();
    let cmdr = pool.get_priority(
        KindTag::Graphics,
        Some(Box::new(move |result: Result<()>| {
            if result.is_ok() {
                image_for_callback.set_layout(TARGET);
            }
        })),
    )?;
    image.set_next_layout(TARGET);

    let barrier = vk::ImageMemoryBarrier::builder()
        .src_access_mask(vk::AccessFlags::MEMORY_WRITE)
        .dst_access_mask(vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE)
        .old_layout(old_layout)
        .new_layout(TARGET)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image.handle())
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: image.format().aspect(),
            base_mip_level: 0,
            level_count: image.levels(),
            base_array_layer: 0,
            layer_count: image.layers(),
        });
    unsafe {
        ctx.device().cmd_pipeline_barrier(
            cmdr.buffer(),
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[*barrier],
        )
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_required_for_indexed_draw_include_ibuf() {
        let required = Bits::GST | Bits::TGT | Bits::VPORT | Bits::SCISS | Bits::VBUF | Bits::IBUF;
        assert!(required.contains(Bits::IBUF));
        let non_indexed = Bits::GST | Bits::TGT | Bits::VPORT | Bits::SCISS | Bits::VBUF;
        assert!(!non_indexed.contains(Bits::IBUF));
    }

    #[test]
    fn clear_state_pending_tracks_any_field() {
        let mut clear = ClearState::default();
        assert!(!clear.is_pending());
        clear.colors.insert(0, Color { r: 1.0, g: 0.0, b: 0.0, a: 1.0 });
        assert!(clear.is_pending());
        clear.reset();
        assert!(!clear.is_pending());

        clear.depth = Some(0.5);
        assert!(clear.is_pending());
        clear.reset();
        assert!(!clear.is_pending());
    }

    #[test]
    fn reentry_guard_rejects_nested_acquire() {
        thread_local! {
            static FLAG: Cell<bool> = const { Cell::new(false) };
        }
        let _first = ReentryGuard::acquire(&FLAG).unwrap();
        let second = ReentryGuard::acquire(&FLAG);
        assert!(second.is_err());
    }
}
