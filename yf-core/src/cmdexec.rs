//! Execution queue: batches command pool resources for submission, waits on
//! their completion fence, and runs per-submission callbacks.
//!
//! Grounded on `cmdexec.c`'s `L_cmde`/`L_priv`: up to two sub-queues (`q1`,
//! `q2`) keyed by queue family (graphics and compute may share one), each
//! with a bounded ring of pending entries, a dedicated fence and a
//! `VkSubmitInfo` template; a second, always-minimum-capacity `L_cmde` for
//! priority work; and a list of externally supplied fences that must be
//! waited on before the next priority flush (`yf_cmdexec_waitfor`).
//!
//! Semaphores could replace the double-submission dance between priority
//! and regular work, but nothing observable depends on the difference, so
//! this keeps the fence-only hand-off between the two.

use parking_lot::Mutex;

use ash::vk;
use tracing::warn;

use crate::cmd::KindTag;
use crate::cmdpool::{CmdRes, CommandPool};
use crate::context::ContextShared;
use crate::error::{bail, err, Result};

const CAP_MIN: u32 = 2;
const CAP_MAX: u32 = 32;
const WAIT_NS: u64 = 16_666_666;

type Callback = Box<dyn FnOnce(Result<()>) + Send>;

struct Entry {
    cmdr: CmdRes,
    callb: Option<Callback>,
}

struct SubQueue {
    queue: vk::Queue,
    family: u32,
    fence: vk::Fence,
    entries: Vec<Entry>,
    cap: u32,
}

impl SubQueue {
    fn new(device: &ash::Device, queue: vk::Queue, family: u32, cap: u32) -> Result<Self> {
        let fence_info = vk::FenceCreateInfo::builder();
        let fence = unsafe { device.create_fence(&fence_info, None) }.map_err(|_| err!(DeviceGeneric))?;
        Ok(SubQueue {
            queue,
            family,
            fence,
            entries: Vec::with_capacity(cap as usize),
            cap,
        })
    }
}

#[derive(Default)]
struct Lanes {
    q1: Option<SubQueue>,
    q2: Option<SubQueue>,
}

impl Lanes {
    fn new(ctx: &ContextShared, cap: u32) -> Result<Self> {
        let graph = ctx.queue_for(KindTag::Graphics);
        let comp = ctx.queue_for(KindTag::Compute);

        let mut lanes = Lanes::default();
        match (graph, comp) {
            (Some((q, f)), Some((cq, cf))) if f == cf => {
                lanes.q1 = Some(SubQueue::new(&ctx.device, q, f, cap)?);
                let _ = cq;
            }
            (Some((q, f)), Some((cq, cf))) => {
                lanes.q1 = Some(SubQueue::new(&ctx.device, q, f, cap)?);
                lanes.q2 = Some(SubQueue::new(&ctx.device, cq, cf, cap)?);
            }
            (Some((q, f)), None) => {
                lanes.q1 = Some(SubQueue::new(&ctx.device, q, f, cap)?);
            }
            (None, Some((q, f))) => {
                lanes.q1 = Some(SubQueue::new(&ctx.device, q, f, cap)?);
            }
            (None, None) => bail!(Unsupported),
        }
        Ok(lanes)
    }

    fn lane_for(&mut self, family: u32) -> Option<&mut SubQueue> {
        if self.q1.as_ref().is_some_and(|q| q.family == family) {
            self.q1.as_mut()
        } else if self.q2.as_ref().is_some_and(|q| q.family == family) {
            self.q2.as_mut()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_lane(family: u32, cap: u32) -> SubQueue {
        SubQueue {
            queue: vk::Queue::null(),
            family,
            fence: vk::Fence::null(),
            entries: Vec::new(),
            cap,
        }
    }

    #[test]
    fn lane_for_matches_q1_family() {
        let mut lanes = Lanes {
            q1: Some(fake_lane(0, 4)),
            q2: Some(fake_lane(1, 4)),
        };
        assert_eq!(lanes.lane_for(0).map(|l| l.family), Some(0));
    }

    #[test]
    fn lane_for_matches_q2_family() {
        let mut lanes = Lanes {
            q1: Some(fake_lane(0, 4)),
            q2: Some(fake_lane(1, 4)),
        };
        assert_eq!(lanes.lane_for(1).map(|l| l.family), Some(1));
    }

    #[test]
    fn lane_for_unknown_family_is_none() {
        let mut lanes = Lanes {
            q1: Some(fake_lane(0, 4)),
            q2: None,
        };
        assert!(lanes.lane_for(7).is_none());
    }

    #[test]
    fn enqueue_into_routes_by_kind_and_respects_capacity() {
        let mut lanes = Lanes {
            q1: Some(fake_lane(0, 1)),
            q2: Some(fake_lane(1, 1)),
        };
        let cmdr = CmdRes {
            buffer: vk::CommandBuffer::null(),
            res_id: 0,
            kind: KindTag::Graphics,
        };
        ExecQueue::enqueue_into(&mut lanes, cmdr, None).unwrap();
        assert_eq!(lanes.q1.as_ref().unwrap().entries.len(), 1);

        let overflow = CmdRes {
            buffer: vk::CommandBuffer::null(),
            res_id: 1,
            kind: KindTag::Graphics,
        };
        let err = ExecQueue::enqueue_into(&mut lanes, overflow, None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::QueueFull);
    }

    #[test]
    fn enqueue_into_falls_back_to_shared_lane_for_compute() {
        let mut lanes = Lanes {
            q1: Some(fake_lane(0, 2)),
            q2: None,
        };
        let cmdr = CmdRes {
            buffer: vk::CommandBuffer::null(),
            res_id: 0,
            kind: KindTag::Compute,
        };
        ExecQueue::enqueue_into(&mut lanes, cmdr, None).unwrap();
        assert_eq!(lanes.q1.as_ref().unwrap().entries.len(), 1);
    }
}

/// The command execution queue, owning the main and priority lane pairs and
/// the fence wait-list fed by [`ExecQueue::wait_for`].
pub struct ExecQueue {
    device: ash::Device,
    main: Mutex<Lanes>,
    prio: Mutex<Lanes>,
    wait_fences: Mutex<Vec<vk::Fence>>,
}

impl ExecQueue {
    pub fn new(ctx: &ContextShared, capacity: u32) -> Result<Self> {
        let cap = capacity.clamp(CAP_MIN, CAP_MAX);
        Ok(ExecQueue {
            device: ctx.device.clone(),
            main: Mutex::new(Lanes::new(ctx, cap)?),
            prio: Mutex::new(Lanes::new(ctx, CAP_MIN)?),
            wait_fences: Mutex::new(Vec::new()),
        })
    }

    /// Enqueues a resource obtained from the command pool for the next
    /// [`ExecQueue::execute`].
    pub fn enqueue(&self, cmdr: CmdRes, callb: Option<Callback>) -> Result<()> {
        Self::enqueue_into(&mut self.main.lock(), cmdr, callb)
    }

    fn enqueue_into(lanes: &mut Lanes, cmdr: CmdRes, callb: Option<Callback>) -> Result<()> {
        let family = match cmdr.kind() {
            KindTag::Graphics => lanes.q1.as_ref().map(|q| q.family),
            KindTag::Compute => lanes
                .q2
                .as_ref()
                .map(|q| q.family)
                .or_else(|| lanes.q1.as_ref().map(|q| q.family)),
        };
        let family = family.ok_or_else(|| err!(Unsupported))?;
        let lane = lanes.lane_for(family).ok_or_else(|| err!(Unsupported))?;
        if lane.entries.len() as u32 == lane.cap {
            bail!(QueueFull);
        }
        lane.entries.push(Entry { cmdr, callb });
        Ok(())
    }

    /// Registers an externally produced fence that must signal before the
    /// next priority flush is submitted.
    pub fn wait_for(&self, fence: vk::Fence) {
        self.wait_fences.lock().push(fence);
    }

    /// Submits everything pending in the priority lanes, first draining and
    /// waiting on the externally fed fence list.
    pub fn execute_priority(&self, pool: &CommandPool) -> Result<()> {
        let _span = tracing::trace_span!("cmdexec.execute_priority").entered();
        let pending: Vec<vk::Fence> = std::mem::take(&mut *self.wait_fences.lock());
        let mut wait_err = false;
        if !pending.is_empty() {
            loop {
                let res = unsafe { self.device.wait_for_fences(&pending, true, WAIT_NS) };
                match res {
                    Ok(()) => break,
                    Err(vk::Result::TIMEOUT) => {
                        warn!("wait_for list fence wait timed out, retrying");
                        continue;
                    }
                    Err(_) => {
                        wait_err = true;
                        break;
                    }
                }
            }
        }

        let mut result = if wait_err { Err(err!(DeviceGeneric)) } else { Ok(()) };

        if let Some(cmdr) = pool.check_priority() {
            if result.is_ok() {
                if unsafe { self.device.end_command_buffer(cmdr.buffer()) }.is_err() {
                    result = Err(err!(DeviceGeneric));
                } else {
                    let mut prio = self.prio.lock();
                    if let Err(e) = Self::enqueue_into(&mut prio, cmdr, None) {
                        result = Err(e);
                    }
                }
            }

            if result.is_ok() {
                result = self.exec_lanes(&mut self.prio.lock(), pool);
            } else {
                self.reset_lanes(&mut self.prio.lock(), pool);
            }

            pool.notify_priority(result.clone());
        }

        result
    }

    /// Submits everything pending in the main lanes after first flushing
    /// priority work, mirroring the original's "priority always goes first"
    /// ordering.
    pub fn execute(&self, pool: &CommandPool) -> Result<()> {
        let _span = tracing::trace_span!("cmdexec.execute").entered();
        if let Err(e) = self.execute_priority(pool) {
            self.reset_lanes(&mut self.main.lock(), pool);
            return Err(e);
        }
        self.exec_lanes(&mut self.main.lock(), pool)
    }

    fn exec_lanes(&self, lanes: &mut Lanes, pool: &CommandPool) -> Result<()> {
        let mut result = Ok(());
        let mut fences = Vec::with_capacity(2);

        for lane in [lanes.q1.as_mut(), lanes.q2.as_mut()] {
            let Some(lane) = lane else { continue };
            if lane.entries.is_empty() {
                continue;
            }
            let buffers: Vec<vk::CommandBuffer> = lane.entries.iter().map(|e| e.cmdr.buffer()).collect();
            let submit = vk::SubmitInfo::builder().command_buffers(&buffers);
            if unsafe { self.device.queue_submit(lane.queue, &[*submit], lane.fence) }.is_err() {
                result = Err(err!(DeviceGeneric));
            } else {
                fences.push(lane.fence);
            }
        }

        if !fences.is_empty() {
            loop {
                match unsafe { self.device.wait_for_fences(&fences, true, WAIT_NS) } {
                    Ok(()) => break,
                    Err(vk::Result::TIMEOUT) => {
                        warn!("main lane fence wait timed out, retrying");
                        continue;
                    }
                    Err(_) => {
                        result = Err(err!(DeviceGeneric));
                        break;
                    }
                }
            }
            for &fence in &fences {
                let _ = unsafe { self.device.reset_fences(&[fence]) };
            }
        }

        for lane in [lanes.q1.as_mut(), lanes.q2.as_mut()] {
            let Some(lane) = lane else { continue };
            for entry in lane.entries.drain(..) {
                pool.yield_res(&entry.cmdr);
                if let Some(callb) = entry.callb {
                    callb(result.clone());
                }
            }
        }

        result
    }

    fn reset_lanes(&self, lanes: &mut Lanes, pool: &CommandPool) {
        for lane in [lanes.q1.as_mut(), lanes.q2.as_mut()] {
            let Some(lane) = lane else { continue };
            for entry in lane.entries.drain(..) {
                pool.reset_res(&entry.cmdr);
                if let Some(callb) = entry.callb {
                    callb(Err(err!(DeviceGeneric)));
                }
            }
        }
    }

    pub fn reset(&self, pool: &CommandPool) {
        self.reset_lanes(&mut self.main.lock(), pool);
    }

    pub fn reset_priority(&self, pool: &CommandPool) {
        self.reset_lanes(&mut self.prio.lock(), pool);
    }
}

impl Drop for ExecQueue {
    fn drop(&mut self) {
        for lanes in [self.main.get_mut(), self.prio.get_mut()] {
            for lane in [lanes.q1.as_ref(), lanes.q2.as_ref()] {
                if let Some(lane) = lane {
                    unsafe { self.device.destroy_fence(lane.fence, None) };
                }
            }
        }
    }
}
