//! Device limits queried from the physical device and cached on the context.
//!
//! Grounded on `limits.c`: every field here is read once from
//! `VkPhysicalDeviceLimits` (plus memory properties for the heap size) and
//! never recomputed.

use ash::vk;

/// Limits relevant to memory allocation strategy. Buffer/image allocation
/// itself is not implemented here (non-goal), but the subsystem still
/// reports what the device would allow.
#[derive(Clone, Copy, Debug)]
pub struct MemoryLimits {
    pub obj_max: u32,
    pub heap_size_max: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct ImageLimits {
    pub dim_1d_max: u32,
    pub dim_2d_max: u32,
    pub dim_3d_max: u32,
    pub layer_max: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct DTableLimits {
    pub stg_res_max: u32,
    pub unif_max: u32,
    pub mut_max: u32,
    pub img_max: u32,
    pub sampd_max: u32,
    pub sampr_max: u32,
    pub isamp_max: u32,
    pub cpy_unif_align_min: u64,
    pub cpy_unif_sz_max: u32,
    pub cpy_mut_align_min: u64,
    pub cpy_mut_sz_max: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct VertexInputLimits {
    pub attr_max: u32,
    pub off_max: u32,
    pub strd_max: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct PassLimits {
    pub color_max: u32,
    pub dim_max: (u32, u32),
    pub layer_max: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct ViewportLimits {
    pub max: u32,
    pub dim_max: (f32, f32),
    pub bounds_min: f32,
    pub bounds_max: f32,
}

#[derive(Clone, Copy, Debug)]
pub struct StateLimits {
    pub dtable_max: u32,
    pub vinput_max: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct CmdBufLimits {
    pub draw_idx_max: u32,
    pub disp_dim_max: (u32, u32, u32),
}

/// Query-able device constraints, cached in the [`Context`](crate::context::Context)
/// on first access.
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    pub memory: MemoryLimits,
    pub image: ImageLimits,
    pub dtable: DTableLimits,
    pub vinput: VertexInputLimits,
    pub pass: PassLimits,
    pub viewport: ViewportLimits,
    pub state: StateLimits,
    pub cmdbuf: CmdBufLimits,
}

impl Limits {
    pub(crate) fn from_physical_device(
        dl: &vk::PhysicalDeviceLimits,
        mem_prop: &vk::PhysicalDeviceMemoryProperties,
    ) -> Self {
        let req_mem =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let opt_mem = req_mem | vk::MemoryPropertyFlags::DEVICE_LOCAL;

        let mut heap_size_max = 0u64;
        for i in 0..mem_prop.memory_type_count as usize {
            let ty = mem_prop.memory_types[i];
            if ty.property_flags.contains(opt_mem) {
                heap_size_max = mem_prop.memory_heaps[ty.heap_index as usize].size;
                break;
            }
            if ty.property_flags.contains(req_mem) && heap_size_max == 0 {
                heap_size_max = mem_prop.memory_heaps[ty.heap_index as usize].size;
            }
        }

        Limits {
            memory: MemoryLimits {
                obj_max: dl.max_memory_allocation_count,
                heap_size_max,
            },
            image: ImageLimits {
                dim_1d_max: dl.max_image_dimension1_d,
                dim_2d_max: dl.max_image_dimension2_d,
                dim_3d_max: dl.max_image_dimension3_d,
                layer_max: dl.max_image_array_layers,
            },
            dtable: DTableLimits {
                stg_res_max: dl.max_per_stage_resources,
                unif_max: dl.max_per_stage_descriptor_uniform_buffers,
                mut_max: dl.max_per_stage_descriptor_storage_buffers,
                img_max: dl.max_per_stage_descriptor_storage_images,
                sampd_max: dl.max_per_stage_descriptor_sampled_images,
                sampr_max: dl.max_per_stage_descriptor_samplers,
                isamp_max: dl
                    .max_per_stage_descriptor_sampled_images
                    .min(dl.max_per_stage_descriptor_samplers),
                cpy_unif_align_min: dl.min_uniform_buffer_offset_alignment,
                cpy_unif_sz_max: dl.max_uniform_buffer_range,
                cpy_mut_align_min: dl.min_storage_buffer_offset_alignment,
                cpy_mut_sz_max: dl.max_storage_buffer_range,
            },
            vinput: VertexInputLimits {
                attr_max: dl.max_vertex_input_attributes,
                off_max: dl.max_vertex_input_attribute_offset,
                strd_max: dl.max_vertex_input_binding_stride,
            },
            pass: PassLimits {
                color_max: dl.max_color_attachments,
                dim_max: (dl.max_framebuffer_width, dl.max_framebuffer_height),
                layer_max: dl.max_framebuffer_layers,
            },
            viewport: ViewportLimits {
                max: dl.max_viewports,
                dim_max: (dl.max_viewport_dimensions[0] as f32, dl.max_viewport_dimensions[1] as f32),
                bounds_min: dl.viewport_bounds_range[0],
                bounds_max: dl.viewport_bounds_range[1],
            },
            state: StateLimits {
                dtable_max: dl.max_bound_descriptor_sets,
                vinput_max: dl.max_vertex_input_bindings,
            },
            cmdbuf: CmdBufLimits {
                draw_idx_max: dl.max_draw_indexed_index_value,
                disp_dim_max: (
                    dl.max_compute_work_group_count[0],
                    dl.max_compute_work_group_count[1],
                    dl.max_compute_work_group_count[2],
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_props_with_heap(flags: vk::MemoryPropertyFlags, size: u64) -> vk::PhysicalDeviceMemoryProperties {
        let mut mem_prop = vk::PhysicalDeviceMemoryProperties::default();
        mem_prop.memory_type_count = 1;
        mem_prop.memory_types[0] = vk::MemoryType {
            property_flags: flags,
            heap_index: 0,
        };
        mem_prop.memory_heap_count = 1;
        mem_prop.memory_heaps[0] = vk::MemoryHeap {
            size,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        mem_prop
    }

    #[test]
    fn heap_size_prefers_device_local_host_visible_type() {
        let dl = vk::PhysicalDeviceLimits {
            max_memory_allocation_count: 4096,
            ..Default::default()
        };
        let mem_prop = mem_props_with_heap(
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::DEVICE_LOCAL,
            1 << 30,
        );
        let limits = Limits::from_physical_device(&dl, &mem_prop);
        assert_eq!(limits.memory.obj_max, 4096);
        assert_eq!(limits.memory.heap_size_max, 1 << 30);
    }

    #[test]
    fn heap_size_falls_back_to_host_visible_only_type() {
        let dl = vk::PhysicalDeviceLimits::default();
        let mem_prop = mem_props_with_heap(
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            1 << 20,
        );
        let limits = Limits::from_physical_device(&dl, &mem_prop);
        assert_eq!(limits.memory.heap_size_max, 1 << 20);
    }

    #[test]
    fn per_stage_descriptor_maxima_are_copied_verbatim() {
        let dl = vk::PhysicalDeviceLimits {
            max_per_stage_descriptor_uniform_buffers: 12,
            max_per_stage_descriptor_storage_buffers: 4,
            max_per_stage_descriptor_sampled_images: 16,
            max_per_stage_descriptor_samplers: 16,
            ..Default::default()
        };
        let mem_prop = vk::PhysicalDeviceMemoryProperties::default();
        let limits = Limits::from_physical_device(&dl, &mem_prop);
        assert_eq!(limits.dtable.unif_max, 12);
        assert_eq!(limits.dtable.mut_max, 4);
        // isamp_max is the min of the sampled-image and sampler maxima.
        assert_eq!(limits.dtable.isamp_max, 16);
    }

    #[test]
    fn dispatch_dim_max_reads_all_three_axes() {
        let dl = vk::PhysicalDeviceLimits {
            max_compute_work_group_count: [65535, 65535, 1024],
            ..Default::default()
        };
        let mem_prop = vk::PhysicalDeviceMemoryProperties::default();
        let limits = Limits::from_physical_device(&dl, &mem_prop);
        assert_eq!(limits.cmdbuf.disp_dim_max, (65535, 65535, 1024));
    }
}
