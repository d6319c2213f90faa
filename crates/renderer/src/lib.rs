//! GPU frame orchestration for the scattering renderer.
//!
//! This crate drives the per-frame protocol:
//! - Frame resource sets, one per frame in flight
//! - Presentation surface state and its rebuild protocol
//! - The frame scheduler: wait, acquire, compute, overlay, present
//! - The Vulkan backend implementing the [`backend`] traits

pub mod backend;
pub mod frame;
pub mod overlay;
pub mod passes;
pub mod recreate;
pub mod renderer;
pub mod scheduler;
pub mod surface;
pub mod vulkan;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{FrameBackend, FrameBinding, FramePayloads, SurfaceBackend};
pub use overlay::{FONT_TEXTURE_ID, OverlayDrawData};
pub use recreate::RecreationCoordinator;
pub use renderer::Renderer;
pub use scheduler::{FrameOutcome, FrameScheduler, FrameTimeouts};
pub use surface::{SurfaceManager, SurfaceState};

/// Maximum number of frames that can be in flight simultaneously.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
