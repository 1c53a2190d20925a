//! Render pass and target (framebuffer) handles.
//!
//! Grounded on `pass.h`'s `YF_pass_o`/`YF_target_o` (attachment counts,
//! `VkRenderPass`, and per-target `VkFramebuffer` plus the images backing
//! it). Render pass and target creation are a non-goal; these types wrap
//! already-built `vk::RenderPass`/`vk::Framebuffer` handles and expose the
//! attachment bookkeeping the decoder needs to begin a pass and resolve
//! deferred clears.

use std::sync::Arc;

use ash::vk;

use crate::image::Image;

struct PassInner {
    handle: vk::RenderPass,
    color_n: u32,
    resolve_n: u32,
    has_depth_stencil: bool,
}

/// A render pass, describing attachment layout but not any particular
/// framebuffer.
#[derive(Clone)]
pub struct Pass {
    inner: Arc<PassInner>,
}

impl PartialEq for Pass {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Pass {}

impl std::fmt::Debug for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pass")
            .field("handle", &self.inner.handle)
            .field("color_n", &self.inner.color_n)
            .finish()
    }
}

impl Pass {
    pub fn from_raw(handle: vk::RenderPass, color_n: u32, resolve_n: u32, has_depth_stencil: bool) -> Self {
        Pass {
            inner: Arc::new(PassInner {
                handle,
                color_n,
                resolve_n,
                has_depth_stencil,
            }),
        }
    }

    pub fn handle(&self) -> vk::RenderPass {
        self.inner.handle
    }

    /// Number of color attachments (excluding resolve attachments).
    pub fn color_count(&self) -> u32 {
        self.inner.color_n
    }

    pub fn resolve_count(&self) -> u32 {
        self.inner.resolve_n
    }

    pub fn has_depth_stencil(&self) -> bool {
        self.inner.has_depth_stencil
    }

    /// Total attachment count, used to size clear-value arrays: color
    /// attachments, their resolves, and an optional depth/stencil slot.
    pub fn attachment_count(&self) -> u32 {
        self.inner.color_n + self.inner.resolve_n + self.inner.has_depth_stencil as u32
    }
}

struct TargetInner {
    pass: Pass,
    framebuffer: vk::Framebuffer,
    dim: (u32, u32),
    layers: u32,
    /// Images backing each attachment, in the same order the render pass
    /// declares them, used by the decoder to apply a deferred clear
    /// directly (`vkCmdClearColorImage`/`vkCmdClearDepthStencilImage`) when
    /// the pass ends without an intervening `Draw`.
    images: Vec<Image>,
    /// First array layer of `images[i]` that belongs to this target, parallel
    /// to `images`: a target built over a layered image may only own a slice
    /// of its layers.
    base_layers: Vec<u32>,
}

/// A framebuffer compatible with a particular [`Pass`].
#[derive(Clone)]
pub struct Target {
    inner: Arc<TargetInner>,
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Target {}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("framebuffer", &self.inner.framebuffer)
            .field("dim", &self.inner.dim)
            .finish()
    }
}

impl Target {
    pub fn from_raw(
        pass: Pass,
        framebuffer: vk::Framebuffer,
        dim: (u32, u32),
        layers: u32,
        images: Vec<Image>,
        base_layers: Vec<u32>,
    ) -> Self {
        debug_assert_eq!(images.len(), base_layers.len());
        Target {
            inner: Arc::new(TargetInner {
                pass,
                framebuffer,
                dim,
                layers,
                images,
                base_layers,
            }),
        }
    }

    pub fn pass(&self) -> &Pass {
        &self.inner.pass
    }

    pub fn handle(&self) -> vk::Framebuffer {
        self.inner.framebuffer
    }

    pub fn dim(&self) -> (u32, u32) {
        self.inner.dim
    }

    pub fn layers(&self) -> u32 {
        self.inner.layers
    }

    pub fn images(&self) -> &[Image] {
        &self.inner.images
    }

    /// First array layer within `images()[i]` owned by this target, used
    /// when the decoder applies a deferred clear directly to the image
    /// instead of through the render pass.
    pub fn base_layers(&self) -> &[u32] {
        &self.inner.base_layers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_count_sums_color_resolve_and_depth_stencil() {
        let pass = Pass::from_raw(vk::RenderPass::null(), 2, 1, true);
        assert_eq!(pass.attachment_count(), 4);

        let no_ds = Pass::from_raw(vk::RenderPass::null(), 2, 0, false);
        assert_eq!(no_ds.attachment_count(), 2);
    }

    #[test]
    fn distinct_passes_are_not_equal_even_with_same_fields() {
        let a = Pass::from_raw(vk::RenderPass::null(), 1, 0, false);
        let b = Pass::from_raw(vk::RenderPass::null(), 1, 0, false);
        assert_ne!(a, b);
        assert_eq!(a.clone(), a);
    }

    #[test]
    fn target_exposes_parallel_images_and_base_layers() {
        let pass = Pass::from_raw(vk::RenderPass::null(), 1, 0, false);
        let img = Image::from_raw(
            vk::Image::null(),
            crate::image::PixelFormat::Rgba8Unorm,
            (128, 128, 1),
            4,
            1,
            vk::SampleCountFlags::TYPE_1,
            vk::ImageUsageFlags::empty(),
            vk::ImageLayout::UNDEFINED,
        );
        let tgt = Target::from_raw(pass.clone(), vk::Framebuffer::null(), (128, 128), 2, vec![img], vec![1]);
        assert_eq!(tgt.pass(), &pass);
        assert_eq!(tgt.images().len(), 1);
        assert_eq!(tgt.base_layers(), &[1]);
        assert_eq!(tgt.layers(), 2);
    }
}
