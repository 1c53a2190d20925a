//! Descriptor table handle.
//!
//! Grounded on `dtable.h`'s `YF_dtable_o` (per-type entry counts, descriptor
//! set layout, pool, and the set array indexed by allocation number).
//! Descriptor writes and allocation are a non-goal; a [`DTable`] wraps an
//! already-built `vk::DescriptorSet` array and exposes just enough for the
//! decoder to bind one by index.

use std::sync::Arc;

use ash::vk;

struct Inner {
    layout: vk::DescriptorSetLayout,
    sets: Vec<vk::DescriptorSet>,
}

/// A descriptor table: a set of descriptor sets sharing one layout, indexed
/// by allocation ("which copy of this table" in the original's terms).
#[derive(Clone)]
pub struct DTable {
    inner: Arc<Inner>,
}

impl PartialEq for DTable {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for DTable {}

impl std::fmt::Debug for DTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DTable")
            .field("layout", &self.inner.layout)
            .field("set_count", &self.inner.sets.len())
            .finish()
    }
}

impl DTable {
    pub fn from_raw(layout: vk::DescriptorSetLayout, sets: Vec<vk::DescriptorSet>) -> Self {
        DTable {
            inner: Arc::new(Inner { layout, sets }),
        }
    }

    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.inner.layout
    }

    pub fn set_count(&self) -> u32 {
        self.inner.sets.len() as u32
    }

    pub fn set(&self, alloc: u32) -> Option<vk::DescriptorSet> {
        self.inner.sets.get(alloc as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_count_matches_constructed_allocation_array() {
        let sets = vec![vk::DescriptorSet::null(), vk::DescriptorSet::null(), vk::DescriptorSet::null()];
        let dtb = DTable::from_raw(vk::DescriptorSetLayout::null(), sets);
        assert_eq!(dtb.set_count(), 3);
        assert!(dtb.set(2).is_some());
        assert!(dtb.set(3).is_none());
    }
}
