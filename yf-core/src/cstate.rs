//! Compute pipeline state handle.
//!
//! Grounded on `cstate.h`'s `YF_cstate_o` (single stage, `dtbs`/`dtb_n`
//! descriptor table array, `VkPipelineLayout`/`VkPipeline`). Mirrors
//! [`GState`](crate::gstate::GState) but carries no [`Pass`](crate::pass::Pass),
//! since compute work is never recorded inside a render pass.

use std::sync::Arc;

use ash::vk;

use crate::dtable::DTable;

struct Inner {
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    dtables: Vec<DTable>,
}

/// A compute pipeline.
#[derive(Clone)]
pub struct CState {
    inner: Arc<Inner>,
}

impl PartialEq for CState {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for CState {}

impl std::fmt::Debug for CState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CState")
            .field("pipeline", &self.inner.pipeline)
            .finish()
    }
}

impl CState {
    pub fn from_raw(layout: vk::PipelineLayout, pipeline: vk::Pipeline, dtables: Vec<DTable>) -> Self {
        CState {
            inner: Arc::new(Inner {
                layout,
                pipeline,
                dtables,
            }),
        }
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.inner.layout
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.inner.pipeline
    }

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
        let dtb = DTable::from_raw(vk::DescriptorSetLayout::null(), vec![vk::DescriptorSet::null()]);
        let cst = CState::from_raw(vk::PipelineLayout::null(), vk::Pipeline::null(), vec![dtb]);
        assert_eq!(cst.dtable_count(), 1);
        assert!(cst.dtable(0).is_some());
        assert!(cst.dtable(1).is_none());
    }
}
