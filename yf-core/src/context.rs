//! The device/queue/limits façade, and the managed-slot mechanism other
//! subsystems hang their private state off of.
//!
//! Grounded on `context.h`'s `YF_context_o` (instance/physical device/device,
//! queue mask and per-kind queue handles, cached device properties) and its
//! `YF_ctxmgd` slots (`cmdp`, `cmde`, `lim`, `stg`): each holds an opaque
//! private pointer plus a teardown callback, invoked in reverse registration
//! order when the context goes away. Here the four slots are typed fields
//! instead of `void*` + function pointer, but [`Context::drop`] still tears
//! them down in the reverse of the order they were registered in, since nix's
//! device teardown (`nix/src/vulkan/device.rs`) is itself just an ordered
//! sequence of `vkDestroy*` calls guarded by `Drop`.

use std::any::Any;
use std::sync::Arc;

use ash::vk;
use bitflags::bitflags;
use tracing::debug;

use crate::cmdexec::ExecQueue;
use crate::cmdpool::CommandPool;
use crate::limits::Limits;

bitflags! {
    /// Which queue families this context exposes, mirroring `YF_QUEUE_GRAPH`
    /// / `YF_QUEUE_COMP`. A single family satisfying both is common and is
    /// reported by setting both bits while `comp_family == graph_family`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct QueueMask: u32 {
        const GRAPHICS = 0x1;
        const COMPUTE  = 0x2;
    }
}

/// Device-level state shared by every subsystem hanging off a [`Context`].
///
/// Kept separate from `Context` itself so that [`CommandPool`] and
/// [`ExecQueue`] can borrow it without also borrowing the managed-slot
/// machinery that owns them.
pub struct ContextShared {
    pub(crate) device: ash::Device,
    physical_device: vk::PhysicalDevice,
    device_properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    queue_mask: QueueMask,
    graph_queue: Option<(vk::Queue, u32)>,
    comp_queue: Option<(vk::Queue, u32)>,
}

impl ContextShared {
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn queue_mask(&self) -> QueueMask {
        self.queue_mask
    }

    /// The queue and family index backing `kind`, if this context exposes
    /// one. Graphics and compute may resolve to the same family.
    pub fn queue_for(&self, kind: crate::cmd::KindTag) -> Option<(vk::Queue, u32)> {
        match kind {
            crate::cmd::KindTag::Graphics => self.graph_queue,
            crate::cmd::KindTag::Compute => self.comp_queue,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SlotKind {
    CommandPool,
    ExecQueue,
    Limits,
    Stage,
}

#[derive(Default)]
struct ManagedSlots {
    order: Vec<SlotKind>,
    cmdpool: Option<Arc<CommandPool>>,
    cmdexec: Option<Arc<ExecQueue>>,
    limits: Option<Limits>,
    stage: Option<Box<dyn Any + Send + Sync>>,
}

impl ManagedSlots {
    fn register(&mut self, kind: SlotKind) {
        if !self.order.contains(&kind) {
            self.order.push(kind);
        }
    }

    fn teardown_one(&mut self, kind: SlotKind) {
        match kind {
            SlotKind::CommandPool => {
                if self.cmdpool.take().is_some() {
                    debug!("tearing down command pool");
                }
            }
            SlotKind::ExecQueue => {
                if self.cmdexec.take().is_some() {
                    debug!("tearing down execution queue");
                }
            }
            SlotKind::Limits => {
                self.limits = None;
            }
            SlotKind::Stage => {
                if self.stage.take().is_some() {
                    debug!("tearing down stage buffer");
                }
            }
        }
    }
}

/// Read-only device/queue/limits view, and owner of the command pool,
/// execution queue, cached limits and staging-buffer slots.
pub struct Context {
    shared: Arc<ContextShared>,
    managed: parking_lot::Mutex<ManagedSlots>,
}

impl Context {
    /// Builds a façade over an already-created logical device.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: ash::Device,
        physical_device: vk::PhysicalDevice,
        device_properties: vk::PhysicalDeviceProperties,
        memory_properties: vk::PhysicalDeviceMemoryProperties,
        graph_queue: Option<(vk::Queue, u32)>,
        comp_queue: Option<(vk::Queue, u32)>,
    ) -> Self {
        let mut mask = QueueMask::empty();
        if graph_queue.is_some() {
            mask |= QueueMask::GRAPHICS;
        }
        if comp_queue.is_some() {
            mask |= QueueMask::COMPUTE;
        }
        Context {
            shared: Arc::new(ContextShared {
                device,
                physical_device,
                device_properties,
                memory_properties,
                queue_mask: mask,
                graph_queue,
                comp_queue,
            }),
            managed: parking_lot::Mutex::new(ManagedSlots::default()),
        }
    }

    pub fn shared(&self) -> &Arc<ContextShared> {
        &self.shared
    }

    pub fn device(&self) -> &ash::Device {
        &self.shared.device
    }

    pub fn queue_mask(&self) -> QueueMask {
        self.shared.queue_mask
    }

    /// Device limits, queried and cached on first access. Corresponds to the
    /// `lim` managed slot.
    pub fn limits(&self) -> Limits {
        let mut managed = self.managed.lock();
        if managed.limits.is_none() {
            let limits = Limits::from_physical_device(
                &self.shared.device_properties.limits,
                &self.shared.memory_properties,
            );
            managed.limits = Some(limits);
            managed.register(SlotKind::Limits);
        }
        managed.limits.unwrap()
    }

    /// Initializes the command pool slot, replacing any existing one.
    pub fn init_command_pool(&self, capacity: u32) -> crate::error::Result<()> {
        let pool = CommandPool::new(&self.shared, capacity)?;
        let mut managed = self.managed.lock();
        managed.cmdpool = Some(Arc::new(pool));
        managed.register(SlotKind::CommandPool);
        Ok(())
    }

    /// The command pool slot, cloned out from behind the lock so the caller
    /// can hold it across GPU calls without serializing on `managed`.
    pub fn command_pool(&self) -> Option<Arc<CommandPool>> {
        self.managed.lock().cmdpool.clone()
    }

    /// Initializes the execution queue slot, replacing any existing one.
    pub fn init_exec_queue(&self, capacity: u32) -> crate::error::Result<()> {
        let exec = ExecQueue::new(&self.shared, capacity)?;
        let mut managed = self.managed.lock();
        managed.cmdexec = Some(Arc::new(exec));
        managed.register(SlotKind::ExecQueue);
        Ok(())
    }

    pub fn exec_queue(&self) -> Option<Arc<ExecQueue>> {
        self.managed.lock().cmdexec.clone()
    }

    /// Starts recording a new command buffer of the given kind. Grounded on
    /// `yf_cmdbuf_get`: this only allocates the encode-side command list, it
    /// does not touch the command pool or the device at all.
    pub fn command_buffer(self: &Arc<Self>, kind: crate::cmd::KindTag) -> crate::cmdbuf::CommandBuffer {
        crate::cmdbuf::CommandBuffer::new(self.clone(), kind)
    }

    /// Drives the execution queue: submits everything recorded against this
    /// context's command pool since the last call. Forwards to
    /// [`ExecQueue::execute`].
    pub fn exec(&self) -> crate::error::Result<()> {
        let pool = self
            .command_pool()
            .ok_or_else(|| crate::error::Error::new(crate::error::ErrorKind::Unsupported, "Context::exec"))?;
        let exec = self
            .exec_queue()
            .ok_or_else(|| crate::error::Error::new(crate::error::ErrorKind::Unsupported, "Context::exec"))?;
        exec.execute(&pool)
    }

    /// Discards everything pending in the main execution lanes without
    /// submitting it, invoking each entry's callback with failure.
    pub fn reset_exec(&self) {
        if let (Some(pool), Some(exec)) = (self.command_pool(), self.exec_queue()) {
            exec.reset(&pool);
        }
    }

    /// Installs arbitrary data in the staging slot. The command subsystem
    /// never reads this itself; it exists so the fourth managed slot keeps
    /// the same teardown-ordering guarantee as the other three.
    pub fn set_stage<T: Any + Send + Sync>(&self, value: T) {
        let mut managed = self.managed.lock();
        managed.stage = Some(Box::new(value));
        managed.register(SlotKind::Stage);
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let mut managed = self.managed.lock();
        let order = std::mem::take(&mut managed.order);
        for kind in order.into_iter().rev() {
            managed.teardown_one(kind);
        }
    }
}
