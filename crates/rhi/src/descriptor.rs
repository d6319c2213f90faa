//! Descriptor sets for the scattering compute pass and the overlay.
//!
//! Each frame slot owns one compute descriptor set with three bindings:
//!
//! | Binding | Type           | Resource                     |
//! |---------|----------------|------------------------------|
//! | 0       | uniform buffer | camera payload               |
//! | 1       | uniform buffer | atmosphere payload           |
//! | 2       | storage image  | output image (GENERAL layout) |
//!
//! The overlay has a single set shared by all slots, binding the font
//! texture as a combined image sampler at [`FONT_TEXTURE_BINDING`].
//!
//! Sets are freed with their pool, so every resource a set points at must
//! be recorded in the ledger before the pool.
//!
//! # Example
//!
//! ```no_run
//! use skyscatter_rhi::descriptor::{
//!     allocate_descriptor_sets, create_compute_descriptor_pool, create_compute_set_layout,
//! };
//! use skyscatter_rhi::device::Device;
//! use skyscatter_rhi::ledger::GpuLedger;
//!
//! # fn example(device: &Device, ledger: &mut GpuLedger) -> skyscatter_rhi::RhiResult<()> {
//! let layout = create_compute_set_layout(device, ledger)?;
//! let pool = create_compute_descriptor_pool(device, 2, ledger)?;
//! let sets = allocate_descriptor_sets(device, pool, layout, 2)?;
//! assert_eq!(sets.len(), 2);
//! # Ok(())
//! # }
//! ```

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;
use crate::ledger::{GpuLedger, GpuObject};

/// Binding index of the camera uniform buffer.
pub const CAMERA_BINDING: u32 = 0;
/// Binding index of the atmosphere uniform buffer.
pub const ATMOSPHERE_BINDING: u32 = 1;
/// Binding index of the output storage image.
pub const OUTPUT_IMAGE_BINDING: u32 = 2;
/// Binding index of the overlay font texture.
pub const FONT_TEXTURE_BINDING: u32 = 0;

/// The three compute-stage bindings of a frame descriptor set.
pub fn compute_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 3] {
    let binding = |index, ty| {
        vk::DescriptorSetLayoutBinding::default()
            .binding(index)
            .descriptor_type(ty)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
    };

    [
        binding(CAMERA_BINDING, vk::DescriptorType::UNIFORM_BUFFER),
        binding(ATMOSPHERE_BINDING, vk::DescriptorType::UNIFORM_BUFFER),
        binding(OUTPUT_IMAGE_BINDING, vk::DescriptorType::STORAGE_IMAGE),
    ]
}

/// Pool sizes for `set_count` frame descriptor sets.
pub fn compute_pool_sizes(set_count: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(2 * set_count),
        vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::STORAGE_IMAGE)
            .descriptor_count(set_count),
    ]
}

/// Creates the frame descriptor set layout.
pub fn create_compute_set_layout(
    device: &Device,
    ledger: &mut GpuLedger,
) -> RhiResult<vk::DescriptorSetLayout> {
    let bindings = compute_bindings();
    let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

    let layout = unsafe {
        device
            .handle()
            .create_descriptor_set_layout(&create_info, None)?
    };
    ledger.record(GpuObject::DescriptorSetLayout(layout));

    debug!("Created descriptor set layout with {} bindings", bindings.len());
    Ok(layout)
}

/// Creates a pool able to hold `set_count` frame descriptor sets.
pub fn create_compute_descriptor_pool(
    device: &Device,
    set_count: u32,
    ledger: &mut GpuLedger,
) -> RhiResult<vk::DescriptorPool> {
    let pool_sizes = compute_pool_sizes(set_count);
    let create_info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(set_count)
        .pool_sizes(&pool_sizes);

    let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };
    ledger.record(GpuObject::DescriptorPool(pool));

    debug!("Created descriptor pool (max sets: {})", set_count);
    Ok(pool)
}

/// Creates the overlay descriptor set layout: one fragment-stage sampler.
pub fn create_overlay_set_layout(
    device: &Device,
    ledger: &mut GpuLedger,
) -> RhiResult<vk::DescriptorSetLayout> {
    let bindings = [vk::DescriptorSetLayoutBinding::default()
        .binding(FONT_TEXTURE_BINDING)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::FRAGMENT)];
    let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

    let layout = unsafe {
        device
            .handle()
            .create_descriptor_set_layout(&create_info, None)?
    };
    ledger.record(GpuObject::DescriptorSetLayout(layout));
    Ok(layout)
}

/// Creates a pool for the single overlay descriptor set.
pub fn create_overlay_descriptor_pool(
    device: &Device,
    ledger: &mut GpuLedger,
) -> RhiResult<vk::DescriptorPool> {
    let pool_sizes = [vk::DescriptorPoolSize::default()
        .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .descriptor_count(1)];
    let create_info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(1)
        .pool_sizes(&pool_sizes);

    let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };
    ledger.record(GpuObject::DescriptorPool(pool));
    Ok(pool)
}

/// Allocates `count` sets sharing `layout`. Sets are freed with the pool.
pub fn allocate_descriptor_sets(
    device: &Device,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
    count: usize,
) -> RhiResult<Vec<vk::DescriptorSet>> {
    let layouts = vec![layout; count];
    let alloc_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(&layouts);

    let sets = unsafe { device.handle().allocate_descriptor_sets(&alloc_info)? };
    Ok(sets)
}

/// Points a uniform buffer binding at the first `range` bytes of `buffer`.
///
/// `range` must not exceed the device's `maxUniformBufferRange`.
pub fn write_uniform_buffer(
    device: &Device,
    set: vk::DescriptorSet,
    binding: u32,
    buffer: vk::Buffer,
    range: vk::DeviceSize,
) {
    let buffer_info = [vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(0)
        .range(range)];
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .dst_array_element(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(&buffer_info);

    unsafe {
        device.handle().update_descriptor_sets(&[write], &[]);
    }
}

/// Points a storage image binding at `view`, read and written in GENERAL.
pub fn write_storage_image(
    device: &Device,
    set: vk::DescriptorSet,
    binding: u32,
    view: vk::ImageView,
) {
    let image_info = [vk::DescriptorImageInfo::default()
        .image_view(view)
        .image_layout(vk::ImageLayout::GENERAL)];
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .dst_array_element(0)
        .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
        .image_info(&image_info);

    unsafe {
        device.handle().update_descriptor_sets(&[write], &[]);
    }
}

/// Points a combined image sampler binding at `view`, read in
/// SHADER_READ_ONLY_OPTIMAL.
pub fn write_sampled_image(
    device: &Device,
    set: vk::DescriptorSet,
    binding: u32,
    view: vk::ImageView,
    sampler: vk::Sampler,
) {
    let image_info = [vk::DescriptorImageInfo::default()
        .sampler(sampler)
        .image_view(view)
        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .dst_array_element(0)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(&image_info);

    unsafe {
        device.handle().update_descriptor_sets(&[write], &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_bindings_layout() {
        let bindings = compute_bindings();

        assert_eq!(bindings[0].binding, CAMERA_BINDING);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[1].binding, ATMOSPHERE_BINDING);
        assert_eq!(bindings[1].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[2].binding, OUTPUT_IMAGE_BINDING);
        assert_eq!(bindings[2].descriptor_type, vk::DescriptorType::STORAGE_IMAGE);

        for binding in &bindings {
            assert_eq!(binding.descriptor_count, 1);
            assert_eq!(binding.stage_flags, vk::ShaderStageFlags::COMPUTE);
        }
    }

    #[test]
    fn test_pool_sizes_scale_with_set_count() {
        let sizes = compute_pool_sizes(2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 4);
        assert_eq!(sizes[1].ty, vk::DescriptorType::STORAGE_IMAGE);
        assert_eq!(sizes[1].descriptor_count, 2);
    }
}
