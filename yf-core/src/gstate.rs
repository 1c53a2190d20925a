//! Graphics pipeline state handle.
//!
//! Grounded on `gstate.h`'s `YF_gstate_o` (owning pass, stages, the
//! `dtbs`/`dtb_n` descriptor table array, `VkPipelineLayout`/`VkPipeline`).
//! Shader/pipeline construction is a non-goal; [`GState`] wraps an
//! already-built `vk::Pipeline` and records which [`Pass`](crate::pass::Pass)
//! it was built for and which [`DTable`]s it declares, so the decoder can
//! resolve a `SetDTable { index, alloc }` command (which carries no table
//! reference of its own, per `cmd.h`'s `YF_cmd_dtb`) against whichever
//! state is currently bound.

use std::sync::Arc;

use ash::vk;

use crate::dtable::DTable;
use crate::pass::Pass;

struct Inner {
    pass: Pass,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    dtables: Vec<DTable>,
}

/// A graphics pipeline bound to a particular [`Pass`].
#[derive(Clone)]
pub struct GState {
    inner: Arc<Inner>,
}

impl PartialEq for GState {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for GState {}

impl std::fmt::Debug for GState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GState")
            .field("pipeline", &self.inner.pipeline)
            .finish()
    }
}

impl GState {
    pub fn from_raw(pass: Pass, layout: vk::PipelineLayout, pipeline: vk::Pipeline, dtables: Vec<DTable>) -> Self {
        GState {
            inner: Arc::new(Inner {
                pass,
                layout,
                pipeline,
                dtables,
            }),
        }
    }

    pub fn pass(&self) -> &Pass {
        &self.inner.pass
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.inner.layout
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.inner.pipeline
    }

    /// Number of descriptor table slots this pipeline layout declares; a
    /// `SetDTable` naming an index beyond this is an `InvalidArgument`.
    pub fn dtable_count(&self) -> u32 {
        self.inner.dtables.len() as u32
    }

    pub fn dtable(&self, index: u32) -> Option<&DTable> {
        self.inner.dtables.get(index as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtable_lookup_is_bounds_checked() {
        let pass = crate::pass::Pass::from_raw(vk::RenderPass::null(), 1, 0, false);
        let dtb = DTable::from_raw(vk::DescriptorSetLayout::null(), vec![vk::DescriptorSet::null()]);
        let gst = GState::from_raw(pass, vk::PipelineLayout::null(), vk::Pipeline::null(), vec![dtb]);
        assert_eq!(gst.dtable_count(), 1);
        assert!(gst.dtable(0).is_some());
        assert!(gst.dtable(1).is_none());
    }
}
