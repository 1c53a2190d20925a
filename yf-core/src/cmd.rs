//! The recorded command list.
//!
//! Grounded on `cmd.h`, which tags a union with an `int cmd` using
//! `YF_CMD_*` constants; here each command carries its own payload as an
//! enum variant, so the compiler enforces that every match is exhaustive.

use crate::buffer::Buffer;
use crate::cstate::CState;
use crate::dtable::DTable;
use crate::gstate::GState;
use crate::image::Image;
use crate::pass::Target;

/// Which pipeline bind point a command buffer records against. Corresponds
/// to `cmdbuf.h`'s `YF_CMDBUF_GRAPH`/`YF_CMDBUF_COMP`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KindTag {
    Graphics,
    Compute,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

/// A single recorded command, as appended by the encode API in
/// [`crate::cmdbuf`] and replayed by the decoder in [`crate::cmddec`].
#[derive(Clone, Debug)]
pub enum Cmd {
    SetGState(GState),
    SetCState(CState),
    SetTarget(Target),
    SetViewport { index: u32, viewport: Viewport },
    SetScissor { index: u32, rect: Rect },
    SetDTable { index: u32, alloc: u32 },
    SetVertexBuffer { index: u32, buffer: Buffer, offset: u64 },
    SetIndexBuffer { buffer: Buffer, offset: u64, stride: u32 },
    ClearColor { index: u32, value: Color },
    ClearDepth { value: f32 },
    ClearStencil { value: u32 },
    Draw {
        indexed: bool,
        index_base: u32,
        vert_n: u32,
        inst_n: u32,
        vert_id: i32,
        inst_id: i32,
    },
    Dispatch { dim: (u32, u32, u32) },
    CopyBuffer {
        dst: Buffer,
        dst_offset: u64,
        src: Buffer,
        src_offset: u64,
        size: u64,
    },
    CopyImage {
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
    },
    /// A pipeline barrier synchronizing prior writes with subsequent reads.
    /// No payload: `YF_CMD_SYNC` is a full execution + memory barrier, not
    /// a fine-grained one.
    Sync,
}
