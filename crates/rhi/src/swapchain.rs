//! Swapchain creation, image acquisition and presentation.
//!
//! A [`Swapchain`] is a plain view over handles recorded in a ledger. It is
//! never recreated in place: the owner flushes the ledger that holds it and
//! builds a new one, so the swapchain and its image views are always
//! destroyed together.
//!
//! Staleness reported by the presentation engine is returned as an
//! [`AcquireStatus`] or [`PresentStatus`] value, never as an error.
//!
//! # Example
//!
//! ```no_run
//! use skyscatter_rhi::device::Device;
//! use skyscatter_rhi::ledger::GpuLedger;
//! use skyscatter_rhi::swapchain::{Swapchain, SwapchainDesc};
//! use skyscatter_rhi::vk;
//!
//! # fn example(
//! #     loader: &ash::khr::swapchain::Device,
//! #     surface_loader: &ash::khr::surface::Instance,
//! #     device: &Device,
//! #     surface: vk::SurfaceKHR,
//! #     ledger: &mut GpuLedger,
//! # ) -> skyscatter_rhi::RhiResult<()> {
//! let desc = SwapchainDesc {
//!     extent: vk::Extent2D { width: 1600, height: 900 },
//!     vsync: true,
//! };
//! let swapchain = Swapchain::new(loader, surface_loader, device, surface, &desc, ledger)?;
//! println!("{} images", swapchain.image_count());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::ledger::{GpuLedger, GpuObject};
use crate::sync::timeout_nanos;

/// Usage of every swapchain image: a transfer target for the compute output
/// and a color attachment for the overlay.
pub const SWAPCHAIN_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::TRANSFER_DST.as_raw() | vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw(),
);

/// Surface formats in order of preference.
const PREFERRED_FORMATS: [vk::Format; 2] =
    [vk::Format::R8G8B8A8_UNORM, vk::Format::B8G8R8A8_UNORM];

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self, RhiError> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Returns true if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }

    /// Returns true if swapchain images can be created with [`SWAPCHAIN_USAGE`].
    #[inline]
    pub fn supports_usage(&self) -> bool {
        self.capabilities
            .supported_usage_flags
            .contains(SWAPCHAIN_USAGE)
    }
}

/// Parameters of a swapchain build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainDesc {
    /// Window extent; clamped to the surface limits.
    pub extent: vk::Extent2D,
    /// Use FIFO presentation.
    pub vsync: bool,
}

/// Result of acquiring a swapchain image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireStatus {
    /// An image was acquired. `suboptimal` asks for a rebuild after this frame.
    Acquired { index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface; nothing was acquired.
    OutOfDate,
}

/// Result of queueing an image for presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentStatus {
    /// Returns true if the swapchain should be rebuilt.
    #[inline]
    pub fn is_stale(self) -> bool {
        !matches!(self, PresentStatus::Presented)
    }
}

/// Handles of one swapchain build.
pub struct Swapchain {
    loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Builds a swapchain and its image views, recording both in `ledger`.
    ///
    /// Images are shared concurrently between the graphics and compute
    /// families when those differ, since the compute queue writes them and
    /// the graphics queue presents them.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainError`] if the surface exposes no usable
    /// format, present mode or image usage, or the Vulkan error if creation
    /// fails.
    pub fn new(
        loader: &ash::khr::swapchain::Device,
        surface_loader: &ash::khr::surface::Instance,
        device: &Device,
        surface: vk::SurfaceKHR,
        desc: &SwapchainDesc,
        ledger: &mut GpuLedger,
    ) -> RhiResult<Self> {
        let support =
            SwapchainSupportDetails::query(device.physical_device(), surface, surface_loader)?;

        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }
        if !support.supports_usage() {
            return Err(RhiError::SwapchainError(format!(
                "Surface does not support {:?} image usage",
                SWAPCHAIN_USAGE
            )));
        }

        let surface_format = choose_surface_format(&support.formats).ok_or_else(|| {
            RhiError::SwapchainError("Surface reports no formats".to_string())
        })?;
        let present_mode = choose_present_mode(&support.present_modes, desc.vsync);
        let extent = choose_extent(&support.capabilities, desc.extent);
        let image_count = determine_image_count(&support.capabilities);

        info!(
            "Creating swapchain: {}x{}, format {:?}, present mode {:?}, {} images",
            extent.width, extent.height, surface_format.format, present_mode, image_count
        );

        let families = device.queue_families().unique_families();
        let (sharing_mode, queue_family_indices) = if families.len() > 1 {
            debug!("Using CONCURRENT sharing mode across families {:?}", families);
            (vk::SharingMode::CONCURRENT, families.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(SWAPCHAIN_USAGE)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(queue_family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };
        ledger.record(GpuObject::Swapchain {
            loader: loader.clone(),
            swapchain,
        });

        let images = unsafe { loader.get_swapchain_images(swapchain)? };
        let image_views = create_image_views(device, &images, surface_format.format, ledger)?;

        info!("Swapchain created with {} images", images.len());

        Ok(Self {
            loader: loader.clone(),
            swapchain,
            images,
            image_views,
            format: surface_format.format,
            extent,
            present_mode,
        })
    }

    /// Acquires the next presentable image, signaling `semaphore` when the
    /// image is ready to be written.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Timeout`] if no image becomes available within
    /// `timeout`, or the Vulkan error for any other failure.
    pub fn acquire(&self, semaphore: vk::Semaphore, timeout: Duration) -> RhiResult<AcquireStatus> {
        let result = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                timeout_nanos(timeout),
                semaphore,
                vk::Fence::null(),
            )
        };
        classify_acquire(result)
    }

    /// Queues `image_index` for presentation after `wait_semaphore`.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<PresentStatus> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.loader.queue_present(queue, &present_info) };
        classify_present(result)
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Returns the image at `index`, if it exists.
    #[inline]
    pub fn image(&self, index: u32) -> Option<vk::Image> {
        self.images.get(index as usize).copied()
    }

    /// Returns the view of the image at `index`, if it exists.
    #[inline]
    pub fn image_view(&self, index: u32) -> Option<vk::ImageView> {
        self.image_views.get(index as usize).copied()
    }
}

/// Maps the result of `vkAcquireNextImageKHR` to an [`AcquireStatus`].
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> RhiResult<AcquireStatus> {
    match result {
        Ok((index, suboptimal)) => Ok(AcquireStatus::Acquired { index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireStatus::OutOfDate),
        Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => {
            warn!("Swapchain image acquisition timed out");
            Err(RhiError::Timeout("swapchain image"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Maps the result of `vkQueuePresentKHR` to a [`PresentStatus`].
pub fn classify_present(result: Result<bool, vk::Result>) -> RhiResult<PresentStatus> {
    match result {
        Ok(false) => Ok(PresentStatus::Presented),
        Ok(true) => Ok(PresentStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
        Err(e) => Err(e.into()),
    }
}

/// Chooses the surface format.
///
/// Prefers R8G8B8A8_UNORM, which matches the compute output and allows a
/// plain copy, then B8G8R8A8_UNORM, then whatever the surface lists first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    for preferred in PREFERRED_FORMATS {
        if let Some(&format) = formats.iter().find(|f| {
            f.format == preferred && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        }) {
            debug!("Selected surface format {:?}", preferred);
            return Some(format);
        }
    }

    let first = formats.first().copied();
    if let Some(format) = first {
        warn!("Using first available surface format: {:?}", format.format);
    }
    first
}

/// Chooses the present mode.
///
/// FIFO when `vsync` is set. Otherwise MAILBOX, then IMMEDIATE, falling
/// back to FIFO, which every implementation supports.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync {
        for mode in [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE] {
            if present_modes.contains(&mode) {
                debug!("Selected {:?} present mode", mode);
                return mode;
            }
        }
    }

    debug!("Selected FIFO present mode (vsync)");
    vk::PresentModeKHR::FIFO
}

/// Chooses the swapchain extent.
///
/// Uses the surface's current extent when it is defined, otherwise clamps
/// `requested` to the surface limits.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    requested: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more image than the minimum, capped at the maximum if there is one.
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
    ledger: &mut GpuLedger,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut image_views = Vec::with_capacity(images.len());

    for (i, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(crate::command::color_subresource_range());

        let image_view = unsafe {
            device
                .handle()
                .create_image_view(&create_info, None)
                .map_err(|e| {
                    RhiError::SwapchainError(format!("Failed to create image view {}: {:?}", i, e))
                })?
        };
        ledger.record(GpuObject::ImageView(image_view));
        image_views.push(image_view);
    }

    debug!("Created {} swapchain image views", image_views.len());
    Ok(image_views)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_rgba_unorm() {
        let formats = vec![
            surface_format(vk::Format::B8G8R8A8_SRGB),
            surface_format(vk::Format::B8G8R8A8_UNORM),
            surface_format(vk::Format::R8G8B8A8_UNORM),
        ];

        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_surface_format_falls_back_to_bgra() {
        let formats = vec![
            surface_format(vk::Format::B8G8R8A8_SRGB),
            surface_format(vk::Format::B8G8R8A8_UNORM),
        ];

        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn test_choose_surface_format_uses_first_otherwise() {
        let formats = vec![surface_format(vk::Format::A2B10G10R10_UNORM_PACK32)];
        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::A2B10G10R10_UNORM_PACK32);

        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn test_choose_present_mode_vsync_is_fifo() {
        let modes = vec![
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO,
        ];
        assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_present_mode_without_vsync() {
        let modes = vec![
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(
            choose_present_mode(&modes, false),
            vk::PresentModeKHR::MAILBOX
        );

        let modes = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            choose_present_mode(&modes, false),
            vk::PresentModeKHR::IMMEDIATE
        );

        let modes = vec![vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };

        let extent = choose_extent(
            &capabilities,
            vk::Extent2D {
                width: 800,
                height: 600,
            },
        );
        assert_eq!(extent.width, 1920);
        assert_eq!(extent.height, 1080);
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let extent = choose_extent(
            &capabilities,
            vk::Extent2D {
                width: 3000,
                height: 50,
            },
        );
        assert_eq!(extent.width, 2000);
        assert_eq!(extent.height, 100);
    }

    #[test]
    fn test_determine_image_count() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 2);

        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 3);
    }

    #[test]
    fn test_support_requires_transfer_and_attachment_usage() {
        let mut support = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR {
                supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
                ..Default::default()
            },
            formats: vec![surface_format(vk::Format::B8G8R8A8_UNORM)],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(support.is_adequate());
        assert!(!support.supports_usage());

        support.capabilities.supported_usage_flags |= vk::ImageUsageFlags::TRANSFER_DST;
        assert!(support.supports_usage());

        support.present_modes.clear();
        assert!(!support.is_adequate());
    }

    #[test]
    fn test_classify_acquire() {
        assert_eq!(
            classify_acquire(Ok((2, false))).unwrap(),
            AcquireStatus::Acquired {
                index: 2,
                suboptimal: false
            }
        );
        assert_eq!(
            classify_acquire(Ok((0, true))).unwrap(),
            AcquireStatus::Acquired {
                index: 0,
                suboptimal: true
            }
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireStatus::OutOfDate
        );
        assert!(matches!(
            classify_acquire(Err(vk::Result::TIMEOUT)),
            Err(RhiError::Timeout(_))
        ));
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
        ));
    }

    #[test]
    fn test_classify_present() {
        assert_eq!(
            classify_present(Ok(false)).unwrap(),
            PresentStatus::Presented
        );
        assert_eq!(
            classify_present(Ok(true)).unwrap(),
            PresentStatus::Suboptimal
        );
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentStatus::OutOfDate
        );
        assert!(classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());

        assert!(!PresentStatus::Presented.is_stale());
        assert!(PresentStatus::Suboptimal.is_stale());
        assert!(PresentStatus::OutOfDate.is_stale());
    }
}
