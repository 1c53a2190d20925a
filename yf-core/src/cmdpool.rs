//! Command pool: a fixed-capacity, round-robin pool of `VkCommandBuffer`
//! recorders, plus a single distinguished priority recorder for out-of-band
//! work (layout changes, staged uploads).
//!
//! Grounded on `cmdpool.c`'s `T_cmdp`/`T_priv`: a `calloc`'d array of
//! `{pool, buffer, in_use}` entries searched round-robin from `last_i`, and
//! a `prio` resource lazily obtained and kept in the recording state across
//! calls until [`CommandPool::notify_priority`] yields it back.

use parking_lot::Mutex;

use ash::vk;

use crate::cmd::KindTag;
use crate::context::ContextShared;
use crate::error::{bail, err, Result};

const CAP_MIN: u32 = 1;
const CAP_MAX: u32 = 32;

/// A resource obtained from the pool: the raw recorder plus enough to route
/// it to the right execution sub-queue and to yield it back later.
#[derive(Clone, Copy, Debug)]
pub struct CmdRes {
    pub(crate) buffer: vk::CommandBuffer,
    pub(crate) res_id: u32,
    pub(crate) kind: KindTag,
}

impl CmdRes {
    pub fn buffer(&self) -> vk::CommandBuffer {
        self.buffer
    }

    pub fn kind(&self) -> KindTag {
        self.kind
    }
}

struct Entry {
    pool: vk::CommandPool,
    buffer: vk::CommandBuffer,
    in_use: bool,
}

/// Pending callback registered through [`CommandPool::get_priority`], run
/// once the priority recorder this call contributed to has executed.
type PrioCallback = Box<dyn FnOnce(Result<()>) + Send>;

struct State {
    entries: Vec<Entry>,
    last_i: u32,
    cur_n: u32,
    prio: Option<CmdRes>,
    callbacks: Vec<PrioCallback>,
}

pub struct CommandPool {
    device: ash::Device,
    cap: u32,
    state: Mutex<State>,
}

impl CommandPool {
    pub fn new(ctx: &ContextShared, capacity: u32) -> Result<Self> {
        let cap = capacity.clamp(CAP_MIN, CAP_MAX);
        let family = ctx
            .queue_for(KindTag::Graphics)
            .or_else(|| ctx.queue_for(KindTag::Compute))
            .map(|(_, family)| family)
            .ok_or_else(|| err!(Unsupported))?;

        let mut entries = Vec::with_capacity(cap as usize);
        for _ in 0..cap {
            let pool_info = vk::CommandPoolCreateInfo::builder()
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
                .queue_family_index(family);
            let pool = unsafe { ctx.device().create_command_pool(&pool_info, None) }
                .map_err(|_| err!(DeviceGeneric))?;

            let alloc_info = vk::CommandBufferAllocateInfo::builder()
                .command_pool(pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let buffer = match unsafe { ctx.device().allocate_command_buffers(&alloc_info) } {
                Ok(mut bufs) => bufs.remove(0),
                Err(_) => {
                    unsafe { ctx.device().destroy_command_pool(pool, None) };
                    bail!(DeviceGeneric);
                }
            };

            entries.push(Entry {
                pool,
                buffer,
                in_use: false,
            });
        }

        Ok(CommandPool {
            device: ctx.device().clone(),
            cap,
            state: Mutex::new(State {
                entries,
                last_i: 0,
                cur_n: 0,
                prio: None,
                callbacks: Vec::new(),
            }),
        })
    }

    pub fn capacity(&self) -> u32 {
        self.cap
    }

    /// Obtains a free recorder for `kind`, searching round-robin from the
    /// last yielded slot.
    pub fn obtain(&self, kind: KindTag) -> Result<CmdRes> {
        let mut state = self.state.lock();
        if state.cur_n == self.cap {
            bail!(InUse);
        }
        for _ in 0..self.cap {
            let i = state.last_i;
            if !state.entries[i as usize].in_use {
                state.entries[i as usize].in_use = true;
                state.cur_n += 1;
                let buffer = state.entries[i as usize].buffer;
                return Ok(CmdRes {
                    buffer,
                    res_id: i,
                    kind,
                });
            }
            state.last_i = (state.last_i + 1) % self.cap;
        }
        bail!(InUse);
    }

    pub fn yield_res(&self, cmdr: &CmdRes) {
        let mut state = self.state.lock();
        debug_assert!(state.entries[cmdr.res_id as usize].in_use);
        state.entries[cmdr.res_id as usize].in_use = false;
        state.last_i = cmdr.res_id;
        state.cur_n -= 1;
        if state.prio.map(|p| p.res_id) == Some(cmdr.res_id) {
            state.prio = None;
        }
    }

    /// Resets the underlying `VkCommandPool` (releasing its resources) and
    /// yields the entry back to the round robin.
    pub fn reset_res(&self, cmdr: &CmdRes) {
        {
            let state = self.state.lock();
            let pool = state.entries[cmdr.res_id as usize].pool;
            unsafe {
                let _ = self
                    .device
                    .reset_command_pool(pool, vk::CommandPoolResetFlags::RELEASE_RESOURCES);
            }
        }
        self.yield_res(cmdr);
    }

    /// Gets the priority recorder, obtaining and beginning one if none is
    /// currently in use, and registers `callb` to run once it executes.
    pub fn get_priority(&self, kind: KindTag, callb: Option<PrioCallback>) -> Result<CmdRes> {
        let cmdr = {
            let mut state = self.state.lock();
            match state.prio {
                Some(cmdr) => cmdr,
                None => {
                    drop(state);
                    let cmdr = self.obtain(kind)?;
                    let begin_info = vk::CommandBufferBeginInfo::builder()
                        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
                    if unsafe { self.device.begin_command_buffer(cmdr.buffer, &begin_info) }
                        .is_err()
                    {
                        self.yield_res(&cmdr);
                        bail!(DeviceGeneric);
                    }
                    state = self.state.lock();
                    state.prio = Some(cmdr);
                    cmdr
                }
            }
        };

        if let Some(callb) = callb {
            self.state.lock().callbacks.push(callb);
        }

        Ok(cmdr)
    }

    /// The priority resource pending execution, if any.
    pub fn check_priority(&self) -> Option<CmdRes> {
        self.state.lock().prio
    }

    /// Yields the priority resource and runs every callback registered
    /// against it since the last notification, in registration order.
    pub fn notify_priority(&self, result: Result<()>) {
        let prio = self.state.lock().prio;
        if let Some(cmdr) = prio {
            self.yield_res(&cmdr);
        }
        let callbacks = std::mem::take(&mut self.state.lock().callbacks);
        for callb in callbacks {
            callb(result.clone());
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for entry in &state.entries {
            unsafe { self.device.destroy_command_pool(entry.pool, None) };
        }
    }
}
