//! Device-local images: the storage images written by the scattering
//! compute shader and the sampled texture holding the UI font atlas.

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme};
use tracing::{debug, info};

use crate::buffer::HostBuffer;
use crate::command::{
    CommandBuffer, ImageTransition, allocate_command_buffer, color_subresource_range,
    create_command_pool,
};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::ledger::{GpuLedger, GpuObject};

/// Format of every compute output image.
pub const OUTPUT_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Usage of every compute output image: written by the shader, then used
/// as a transfer source for the swapchain image.
pub const OUTPUT_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::STORAGE.as_raw() | vk::ImageUsageFlags::TRANSFER_SRC.as_raw(),
);

/// Format of sampled textures; texels are uploaded as RGBA bytes.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Usage of sampled textures: filled by a copy, then read by shaders.
pub const TEXTURE_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::TRANSFER_DST.as_raw() | vk::ImageUsageFlags::SAMPLED.as_raw(),
);

pub const TEXTURE_TO_TRANSFER_DST: ImageTransition = ImageTransition {
    old_layout: vk::ImageLayout::UNDEFINED,
    new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
    src_access: vk::AccessFlags::empty(),
    dst_stage: vk::PipelineStageFlags::TRANSFER,
    dst_access: vk::AccessFlags::TRANSFER_WRITE,
};

pub const TEXTURE_TO_SHADER_READ: ImageTransition = ImageTransition {
    old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    src_stage: vk::PipelineStageFlags::TRANSFER,
    src_access: vk::AccessFlags::TRANSFER_WRITE,
    dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
    dst_access: vk::AccessFlags::SHADER_READ,
};

/// Creates a single-mip 2D image in GPU-only memory with a full view, both
/// recorded in `ledger`.
fn create_image_with_view(
    device: &Device,
    name: &'static str,
    extent: vk::Extent2D,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
    ledger: &mut GpuLedger,
) -> RhiResult<(vk::Image, vk::ImageView)> {
    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let image = unsafe { device.handle().create_image(&image_info, None)? };
    let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

    let allocation = match device.allocate(&AllocationCreateDesc {
        name,
        requirements,
        location: MemoryLocation::GpuOnly,
        linear: false,
        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
    }) {
        Ok(allocation) => allocation,
        Err(e) => {
            unsafe { device.handle().destroy_image(image, None) };
            return Err(e);
        }
    };

    let bind = unsafe {
        device
            .handle()
            .bind_image_memory(image, allocation.memory(), allocation.offset())
    };
    ledger.record(GpuObject::Image { image, allocation });
    bind?;

    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(color_subresource_range());

    let view = unsafe { device.handle().create_image_view(&view_info, None)? };
    ledger.record(GpuObject::ImageView(view));

    debug!(
        "Created {} image: {}x{} ({:?})",
        name, extent.width, extent.height, format
    );
    Ok((image, view))
}

/// A device-local 2D color image with a full view.
///
/// The image, its memory and its view are recorded in the ledger passed to
/// [`StorageImage::new`]; this struct only carries the handles.
#[derive(Clone, Copy, Debug)]
pub struct StorageImage {
    image: vk::Image,
    view: vk::ImageView,
    extent: vk::Extent2D,
}

impl StorageImage {
    /// Creates an [`OUTPUT_FORMAT`] image sized to `extent`.
    pub fn new(
        device: &Device,
        name: &'static str,
        extent: vk::Extent2D,
        ledger: &mut GpuLedger,
    ) -> RhiResult<Self> {
        let (image, view) =
            create_image_with_view(device, name, extent, OUTPUT_FORMAT, OUTPUT_USAGE, ledger)?;

        Ok(Self {
            image,
            view,
            extent,
        })
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

/// Bytes of tightly packed RGBA8 texels covering `extent`.
pub fn rgba_byte_len(extent: vk::Extent2D) -> usize {
    extent.width as usize * extent.height as usize * 4
}

/// A shader-readable RGBA texture with its sampler.
#[derive(Clone, Copy, Debug)]
pub struct SampledTexture {
    view: vk::ImageView,
    sampler: vk::Sampler,
}

impl SampledTexture {
    /// Creates the texture and fills it with `rgba`.
    ///
    /// The image, view and sampler go into `ledger`. The staging buffer and
    /// the one-shot command pool live in a temporary ledger that is flushed
    /// once the copy has completed on the graphics queue; this blocks until
    /// the device is idle.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] if `rgba` does not hold exactly
    /// one RGBA8 texel per pixel of `extent`, or the Vulkan error if any
    /// step fails.
    pub fn upload(
        device: &Device,
        name: &'static str,
        extent: vk::Extent2D,
        rgba: &[u8],
        ledger: &mut GpuLedger,
    ) -> RhiResult<Self> {
        if rgba.len() != rgba_byte_len(extent) {
            return Err(RhiError::PipelineError(format!(
                "{} texture is {}x{} but {} bytes were supplied",
                name,
                extent.width,
                extent.height,
                rgba.len()
            )));
        }

        let (image, view) =
            create_image_with_view(device, name, extent, TEXTURE_FORMAT, TEXTURE_USAGE, ledger)?;
        let sampler = create_linear_sampler(device, ledger)?;

        let mut staging = GpuLedger::new("staging");
        let copied = copy_texels(device, image, extent, rgba, &mut staging);
        staging.flush(device);
        copied?;

        info!(
            "Uploaded {} texture ({}x{})",
            name, extent.width, extent.height
        );
        Ok(Self { view, sampler })
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }
}

fn create_linear_sampler(device: &Device, ledger: &mut GpuLedger) -> RhiResult<vk::Sampler> {
    let create_info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .max_lod(1.0);

    let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };
    ledger.record(GpuObject::Sampler(sampler));
    Ok(sampler)
}

/// Records and submits the staging copy, then waits for the device.
fn copy_texels(
    device: &Device,
    image: vk::Image,
    extent: vk::Extent2D,
    rgba: &[u8],
    staging: &mut GpuLedger,
) -> RhiResult<()> {
    let buffer = HostBuffer::new(
        device,
        "texture staging",
        vk::BufferUsageFlags::TRANSFER_SRC,
        rgba.len() as vk::DeviceSize,
        staging,
    )?;
    buffer.write(rgba)?;

    let queue = device.graphics_queue();
    let pool = create_command_pool(device, queue.family, staging)?;
    let cmd = CommandBuffer::from_handle(device, allocate_command_buffer(device, pool)?);

    cmd.begin()?;
    cmd.transition_images(&[(image, TEXTURE_TO_TRANSFER_DST)]);
    cmd.copy_buffer_to_image(buffer.handle(), image, extent);
    cmd.transition_images(&[(image, TEXTURE_TO_SHADER_READ)]);
    cmd.end()?;

    let command_buffers = [cmd.handle()];
    let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

    // SAFETY: the command buffer is fully recorded and no fence is used.
    unsafe { device.submit(queue, &[submit_info], vk::Fence::null())? };
    device.wait_idle()
}
