//! Command buffer encode API: a typed, validated sequence of [`Cmd`]s built
//! up without touching the GPU, later replayed by [`crate::cmddec`].
//!
//! Grounded on `cmdbuf.c`'s `YF_cmdbuf_o` and its `yf_cmdbuf_set*`/`draw`/
//! `dispatch`/`copy*`/`sync` family: a `calloc`'d, `realloc`-grown command
//! list (`YF_CMDCAP` = 128 initial capacity, doubling with a `+1` fallback
//! when the doubled size can't be allocated, and a hard ceiling at
//! `UINT_MAX`) plus an `invalid` flag that, once set by a kind mismatch or
//! an allocation failure, makes every further call into a no-op.
//!
//! `cmdbuf.c`'s setters return `void` and record the error in a
//! thread-local for the caller to query later with `yf_geterr`; here they
//! return [`Result`] directly. The `invalid` flag is kept for its other
//! purpose, tripping it turns `decode` into a no-op too, but callers find
//! out about it through the `Result` of the call that tripped it, not by
//! polling afterwards.

use std::sync::Arc;

use crate::cmd::{Cmd, Color, KindTag, Rect, Viewport};
use crate::context::Context;
use crate::cstate::CState;
use crate::error::{bail, Result};
use crate::gstate::GState;
use crate::pass::Target;
use crate::{buffer::Buffer, image::Image};

const INITIAL_CAP: usize = 128;

/// A recorder in the encode stage: commands are appended here and never
/// touch the GPU until [`CommandBuffer::end`] hands them to the decoder.
/// Grounded on `yf_cmdbuf_get`, which allocates the command list up front
/// but does not reach into the command pool at all; a pool resource is
/// only obtained once decoding actually starts.
pub struct CommandBuffer {
    ctx: Arc<Context>,
    kind: KindTag,
    cmds: Vec<Cmd>,
    cap: usize,
    invalid: bool,
}

impl CommandBuffer {
    pub(crate) fn new(ctx: Arc<Context>, kind: KindTag) -> Self {
        CommandBuffer {
            ctx,
            kind,
            cmds: Vec::with_capacity(INITIAL_CAP),
            cap: INITIAL_CAP,
            invalid: false,
        }
    }

    pub fn kind(&self) -> KindTag {
        self.kind
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    pub(crate) fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    pub(crate) fn commands(&self) -> &[Cmd] {
        &self.cmds
    }

    /// Consumes the buffer, handing its context, kind and recorded list to
    /// the decoder. There is no reuse after this; `end` is a terminal call.
    pub(crate) fn into_parts(self) -> (Arc<Context>, KindTag, Vec<Cmd>) {
        (self.ctx, self.kind, self.cmds)
    }

    fn push(&mut self, cmd: Cmd) -> Result<()> {
        if self.invalid {
            bail!(InvalidCommand);
        }
        if self.cmds.len() == self.cap {
            self.grow()?;
        }
        self.cmds.push(cmd);
        Ok(())
    }

    /// Doubles capacity, falling back to a single extra slot if the
    /// doubled reservation can't be satisfied, and refusing to grow once
    /// the hard ceiling is hit. Mirrors `grow_cmds` in `cmdbuf.c`.
    fn grow(&mut self) -> Result<()> {
        if self.cap == u32::MAX as usize {
            self.invalid = true;
            bail!(Limit);
        }
        let doubled = self.cap.saturating_mul(2).min(u32::MAX as usize);
        let target = doubled.max(self.cap + 1);
        if self.cmds.try_reserve_exact(target - self.cmds.len()).is_err() {
            let fallback = self.cap + 1;
            if self.cmds.try_reserve_exact(fallback - self.cmds.len()).is_err() {
                self.invalid = true;
                bail!(NoMemory);
            }
            self.cap = fallback;
        } else {
            self.cap = target;
        }
        Ok(())
    }

    fn require(&mut self, kind: KindTag) -> Result<()> {
        if self.invalid {
            bail!(InvalidCommand);
        }
        if self.kind != kind {
            self.invalid = true;
            bail!(InvalidArgument);
        }
        Ok(())
    }

    pub fn set_gstate(&mut self, gst: GState) -> Result<()> {
        self.require(KindTag::Graphics)?;
        self.push(Cmd::SetGState(gst))
    }

    pub fn set_cstate(&mut self, cst: CState) -> Result<()> {
        self.require(KindTag::Compute)?;
        self.push(Cmd::SetCState(cst))
    }

    pub fn set_target(&mut self, tgt: Target) -> Result<()> {
        self.require(KindTag::Graphics)?;
        self.push(Cmd::SetTarget(tgt))
    }

    pub fn set_viewport(&mut self, index: u32, viewport: Viewport) -> Result<()> {
        self.require(KindTag::Graphics)?;
        self.push(Cmd::SetViewport { index, viewport })
    }

    pub fn set_scissor(&mut self, index: u32, rect: Rect) -> Result<()> {
        self.require(KindTag::Graphics)?;
        self.push(Cmd::SetScissor { index, rect })
    }

    /// Valid for either kind; `cmdbuf.c`'s `yf_cmdbuf_setdtable` does not
    /// gate this one on `cmdbuf` kind either.
    pub fn set_dtable(&mut self, index: u32, alloc: u32) -> Result<()> {
        if self.invalid {
            bail!(InvalidCommand);
        }
        self.push(Cmd::SetDTable { index, alloc })
    }

    pub fn set_vertex_buffer(&mut self, index: u32, buffer: Buffer, offset: u64) -> Result<()> {
        self.require(KindTag::Graphics)?;
        self.push(Cmd::SetVertexBuffer { index, buffer, offset })
    }

    pub fn set_index_buffer(&mut self, buffer: Buffer, offset: u64, stride: u32) -> Result<()> {
        self.require(KindTag::Graphics)?;
        self.push(Cmd::SetIndexBuffer { buffer, offset, stride })
    }

    pub fn clear_color(&mut self, index: u32, value: Color) -> Result<()> {
        self.require(KindTag::Graphics)?;
        self.push(Cmd::ClearColor { index, value })
    }

    pub fn clear_depth(&mut self, value: f32) -> Result<()> {
        self.require(KindTag::Graphics)?;
        self.push(Cmd::ClearDepth { value })
    }

    pub fn clear_stencil(&mut self, value: u32) -> Result<()> {
        self.require(KindTag::Graphics)?;
        self.push(Cmd::ClearStencil { value })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn draw(
        &mut self,
        indexed: bool,
        index_base: u32,
        vert_n: u32,
        inst_n: u32,
        vert_id: i32,
        inst_id: i32,
    ) -> Result<()> {
        self.require(KindTag::Graphics)?;
        self.push(Cmd::Draw {
            indexed,
            index_base,
            vert_n,
            inst_n,
            vert_id,
            inst_id,
        })
    }

    pub fn dispatch(&mut self, dim: (u32, u32, u32)) -> Result<()> {
        self.require(KindTag::Compute)?;
        self.push(Cmd::Dispatch { dim })
    }

    pub fn copy_buffer(
        &mut self,
        dst: Buffer,
        dst_offset: u64,
        src: Buffer,
        src_offset: u64,
        size: u64,
    ) -> Result<()> {
        if self.invalid {
            bail!(InvalidCommand);
        }
        self.push(Cmd::CopyBuffer {
            dst,
            dst_offset,
            src,
            src_offset,
            size,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn copy_image(
        &mut self,
        dst: Image,
        dst_off: (i32, i32, i32),
        dst_layer: u32,
        dst_level: u32,
        src: Image,
        src_off: (i32, i32, i32),
        src_layer: u32,
        src_level: u32,
        dim: (u32, u32, u32),
        layer_n: u32,
    ) -> Result<()> {
        if self.invalid {
            bail!(InvalidCommand);
        }
        self.push(Cmd::CopyImage {
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
        })
    }

    pub fn sync(&mut self) -> Result<()> {
        if self.invalid {
            bail!(InvalidCommand);
        }
        self.push(Cmd::Sync)
    }

    /// Ends recording, decoding and enqueueing for execution unless the
    /// buffer was invalidated somewhere along the way. Either way the
    /// recorder slot is consumed; there is no reuse after `end`.
    pub fn end(self) -> Result<()> {
        if self.invalid {
            bail!(InvalidCommand);
        }
        crate::cmddec::decode(self)
    }
}
