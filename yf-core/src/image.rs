//! Image handle and pixel format.
//!
//! Grounded on `image.h`'s `struct yf_image` (dimensions, layer/level
//! counts, format, current/next layout) and its `YF_PIXFMT_FROM`/`_TO`/
//! `_ASPECT` conversion tables. Image creation, views and memory allocation
//! are a non-goal; [`Image`] wraps an already-allocated `vk::Image` and
//! tracks the one piece of mutable state the command subsystem needs:
//! the layout the resource is currently in.

use std::sync::Arc;

use parking_lot::Mutex;

use ash::vk;

/// Pixel format, mirroring the original's `YF_PIXFMT_*` enumerators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum PixelFormat {
    R8Unorm,
    Rg8Unorm,
    Rgb8Unorm,
    Rgba8Unorm,
    Bgr8Unorm,
    Bgra8Unorm,
    R8Srgb,
    Rgba8Srgb,
    Bgra8Srgb,
    R16Float,
    Rgba16Float,
    R32Float,
    Rgba32Float,
    D16Unorm,
    S8Uint,
    D16UnormS8Uint,
    D24UnormS8Uint,
}

impl PixelFormat {
    pub fn to_vk(self) -> vk::Format {
        use PixelFormat::*;
        match self {
            R8Unorm => vk::Format::R8_UNORM,
            Rg8Unorm => vk::Format::R8G8_UNORM,
            Rgb8Unorm => vk::Format::R8G8B8_UNORM,
            Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
            Bgr8Unorm => vk::Format::B8G8R8_UNORM,
            Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
            R8Srgb => vk::Format::R8_SRGB,
            Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
            Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
            R16Float => vk::Format::R16_SFLOAT,
            Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
            R32Float => vk::Format::R32_SFLOAT,
            Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
            D16Unorm => vk::Format::D16_UNORM,
            S8Uint => vk::Format::S8_UINT,
            D16UnormS8Uint => vk::Format::D16_UNORM_S8_UINT,
            D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
        }
    }

    /// The aspect mask implied by this format, per `YF_PIXFMT_ASPECT`.
    pub fn aspect(self) -> vk::ImageAspectFlags {
        use PixelFormat::*;
        match self {
            D16Unorm => vk::ImageAspectFlags::DEPTH,
            S8Uint => vk::ImageAspectFlags::STENCIL,
            D16UnormS8Uint | D24UnormS8Uint => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }
            _ => vk::ImageAspectFlags::COLOR,
        }
    }

    pub fn is_depth_stencil(self) -> bool {
        self.aspect()
            .intersects(vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL)
    }
}

/// Current layout plus the layout a pending priority transition will leave
/// the image in. Equal to each other except while a transition recorded by
/// [`crate::cmddec`]'s layout-change helper is in flight.
#[derive(Clone, Copy)]
struct LayoutState {
    current: vk::ImageLayout,
    next: vk::ImageLayout,
}

struct Inner {
    handle: vk::Image,
    format: PixelFormat,
    dim: (u32, u32, u32),
    layers: u32,
    levels: u32,
    samples: vk::SampleCountFlags,
    usage: vk::ImageUsageFlags,
    /// Protected by a mutex since layout transitions are encoded through the
    /// priority recorder, possibly from a thread other than the one driving
    /// graphics/compute encode.
    layout: Mutex<LayoutState>,
}

/// An image resource as seen by the command subsystem.
#[derive(Clone)]
pub struct Image {
    inner: Arc<Inner>,
}

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Image {}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("handle", &self.inner.handle)
            .field("format", &self.inner.format)
            .field("dim", &self.inner.dim)
            .finish()
    }
}

impl Image {
    /// Wraps an existing `vk::Image`, as the original's `yf_image_wrap` does
    /// for swapchain-owned images.
    #[allow(clippy::too_many_arguments)]
    pub fn from_raw(
        handle: vk::Image,
        format: PixelFormat,
        dim: (u32, u32, u32),
        layers: u32,
        levels: u32,
        samples: vk::SampleCountFlags,
        usage: vk::ImageUsageFlags,
        layout: vk::ImageLayout,
    ) -> Self {
        Image {
            inner: Arc::new(Inner {
                handle,
                format,
                dim,
                layers,
                levels,
                samples,
                usage,
                layout: Mutex::new(LayoutState {
                    current: layout,
                    next: layout,
                }),
            }),
        }
    }

    pub fn handle(&self) -> vk::Image {
        self.inner.handle
    }

    pub fn format(&self) -> PixelFormat {
        self.inner.format
    }

    pub fn dim(&self) -> (u32, u32, u32) {
        self.inner.dim
    }

    pub fn layers(&self) -> u32 {
        self.inner.layers
    }

    pub fn levels(&self) -> u32 {
        self.inner.levels
    }

    pub fn samples(&self) -> vk::SampleCountFlags {
        self.inner.samples
    }

    pub fn usage(&self) -> vk::ImageUsageFlags {
        self.inner.usage
    }

    pub fn layout(&self) -> vk::ImageLayout {
        self.inner.layout.lock().current
    }

    /// The layout a pending priority transition will leave this image in,
    /// or the current layout if none is pending.
    pub fn next_layout(&self) -> vk::ImageLayout {
        self.inner.layout.lock().next
    }

    /// Records that a transition to `layout` has been recorded into the
    /// priority recorder but not yet executed. Only
    /// [`crate::cmddec`]'s layout-change helper calls this.
    pub(crate) fn set_next_layout(&self, layout: vk::ImageLayout) {
        self.inner.layout.lock().next = layout;
    }

    /// Records that a previously pending transition has completed: `current`
    /// and `next` both become `layout`.
    pub(crate) fn set_layout(&self, layout: vk::ImageLayout) {
        let mut state = self.inner.layout.lock();
        state.current = layout;
        state.next = layout;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(layout: vk::ImageLayout) -> Image {
        Image::from_raw(
            vk::Image::null(),
            PixelFormat::Rgba8Unorm,
            (64, 64, 1),
            1,
            1,
            vk::SampleCountFlags::TYPE_1,
            vk::ImageUsageFlags::empty(),
            layout,
        )
    }

    #[test]
    fn current_and_next_layout_start_equal() {
        let img = image(vk::ImageLayout::UNDEFINED);
        assert_eq!(img.layout(), vk::ImageLayout::UNDEFINED);
        assert_eq!(img.next_layout(), vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn set_next_layout_leaves_current_untouched_until_set_layout() {
        let img = image(vk::ImageLayout::UNDEFINED);
        img.set_next_layout(vk::ImageLayout::GENERAL);
        assert_eq!(img.layout(), vk::ImageLayout::UNDEFINED);
        assert_eq!(img.next_layout(), vk::ImageLayout::GENERAL);

        img.set_layout(vk::ImageLayout::GENERAL);
        assert_eq!(img.layout(), vk::ImageLayout::GENERAL);
        assert_eq!(img.next_layout(), vk::ImageLayout::GENERAL);
    }

    #[test]
    fn clone_shares_identity_and_layout_state() {
        let img = image(vk::ImageLayout::UNDEFINED);
        let clone = img.clone();
        assert_eq!(img, clone);
        img.set_next_layout(vk::ImageLayout::GENERAL);
        assert_eq!(clone.next_layout(), vk::ImageLayout::GENERAL);
    }

    #[test]
    fn distinct_images_are_not_equal() {
        let a = image(vk::ImageLayout::UNDEFINED);
        let b = image(vk::ImageLayout::UNDEFINED);
        assert_ne!(a, b);
    }

    #[test]
    fn depth_stencil_format_reports_combined_aspect() {
        assert!(PixelFormat::D24UnormS8Uint.is_depth_stencil());
        assert!(!PixelFormat::Rgba8Unorm.is_depth_stencil());
        assert_eq!(
            PixelFormat::D24UnormS8Uint.aspect(),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }
}
