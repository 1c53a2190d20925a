//! Low-level graphics core: device/queue façade, limits, and the command
//! buffer subsystem (encode, decode, pool, execution queue).
//!
//! Grounded on the original's `yf-core/src` layer, scoped here to the
//! subsystem that sits between a user-facing recording API and raw Vulkan
//! submission: [`Context`] exposes the device and its managed slots,
//! [`cmdbuf::CommandBuffer`] records a typed, validated command list,
//! [`cmddec`] replays it against the GPU, [`cmdpool::CommandPool`] owns the
//! recorders being replayed into, and [`cmdexec::ExecQueue`] batches and
//! submits them. Resource creation (buffers, images, passes, pipelines,
//! descriptor tables) and the window-system/scene layers above this are out
//! of scope; the types here wrap already-built handles.

pub mod buffer;
pub mod cmd;
pub mod cmdbuf;
mod cmddec;
pub mod cmdexec;
pub mod cmdpool;
pub mod context;
pub mod cstate;
pub mod dtable;
pub mod error;
pub mod gstate;
pub mod image;
pub mod limits;
pub mod pass;

pub use buffer::Buffer;
pub use cmd::{Cmd, Color, KindTag, Rect, Viewport};
pub use cmdbuf::CommandBuffer;
pub use cmdexec::ExecQueue;
pub use cmdpool::{CmdRes, CommandPool};
pub use context::{Context, ContextShared, QueueMask};
pub use cstate::CState;
pub use dtable::DTable;
pub use error::{Error, ErrorKind, Result};
pub use gstate::GState;
pub use image::{Image, PixelFormat};
pub use limits::Limits;
pub use pass::{Pass, Target};
