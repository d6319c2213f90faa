//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate wraps the parts of Vulkan the renderer needs, using `ash`:
//! - Instance, physical device and logical device creation
//! - Resource ledgers for ordered teardown
//! - Swapchain management
//! - Command buffer recording
//! - Buffers, storage images, sampled textures, descriptors and pipelines
//! - Synchronization primitives
//!
//! Apart from [`instance::Instance`] and [`device::Device`], which own their
//! handles, every object is recorded in a [`ledger::GpuLedger`] when it is
//! created and destroyed when that ledger is flushed.

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod ledger;
pub mod physical_device;
pub mod pipeline;
pub mod rendering;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
