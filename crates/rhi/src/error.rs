//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
///
/// Every variant is fatal to the frame loop. Surface staleness is not an
/// error and is reported through return values instead.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// The selected GPU exposes no compute-capable queue family
    #[error("No compute-capable queue family available")]
    NoComputeQueue,

    /// A bounded host wait expired
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation or query error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// A payload does not fit in its per-frame buffer
    #[error("Payload of {size} bytes exceeds buffer capacity of {capacity} bytes")]
    PayloadTooLarge { size: u64, capacity: u64 },

    /// More overlay geometry than the per-frame buffers hold
    #[error("Overlay of {requested} {what} exceeds capacity of {capacity}")]
    OverlayCapacity {
        what: &'static str,
        requested: usize,
        capacity: usize,
    },

    /// A ledger would destroy an object before something that references it
    #[error("Ledger '{ledger}': {object} at entry {index} is recorded after a descriptor pool")]
    LedgerOrder {
        ledger: &'static str,
        object: &'static str,
        index: usize,
    },

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
