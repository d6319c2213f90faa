//! The per-iteration frame protocol.
//!
//! # Overview
//!
//! One call to [`FrameScheduler::run_frame`] is one loop iteration:
//!
//! ```text
//! 1. Window minimized?          -> suspend, Skipped (no GPU work, no waits)
//! 2. Surface suspended?         -> Skipped until the window is restored
//! 3. Surface not ready?         -> rebuild first
//! 4. Wait on the slot's fences  (bounds frames in flight)
//! 5. Reset the slot's command buffers
//! 6. Acquire an image           -> out of date: rebuild, Dropped
//! 7. Reset the slot's fences
//! 8. Write both payloads
//! 9. Record compute: dispatch, copy into the acquired image
//! 10. Submit compute            (waits image acquired, signals compute finished)
//! 11. Submit overlay            (waits compute finished, signals overlay finished)
//! 12. Present                  (waits the last semaphore of the chain)
//! 13. Advance the frame index; rebuild if acquire or present reported staleness
//! ```
//!
//! The frame index only moves after a frame has been fully submitted, so a
//! dropped frame retries with the same slot.

use std::time::Duration;

use ash::vk;
use tracing::{trace, warn};

use skyscatter_core::GpuConfig;
use skyscatter_rhi::RhiResult;

use crate::backend::{AcquireStatus, FrameBackend, FramePayloads, is_zero_extent};
use crate::overlay::OverlayDrawData;
use crate::recreate::RecreationCoordinator;
use crate::surface::{SurfaceManager, SurfaceState};

/// Host-side bounds on the two blocking calls of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameTimeouts {
    pub acquire: Duration,
    pub fence: Duration,
}

impl FrameTimeouts {
    pub fn from_config(config: &GpuConfig) -> Self {
        Self {
            acquire: config.acquire_timeout(),
            fence: config.fence_timeout(),
        }
    }
}

impl Default for FrameTimeouts {
    fn default() -> Self {
        Self {
            acquire: Duration::from_secs(1),
            fence: Duration::from_secs(1),
        }
    }
}

/// What happened during one loop iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and queued for presentation.
    Presented { slot: usize, image_index: u32 },
    /// The surface is unusable (minimized); nothing was done.
    Skipped,
    /// Acquire reported an out-of-date surface; the surface was rebuilt and
    /// no work was submitted.
    Dropped,
}

/// Owns the frame index and the surface state, and runs frames against a
/// [`FrameBackend`].
#[derive(Debug)]
pub struct FrameScheduler {
    frame_index: usize,
    timeouts: FrameTimeouts,
    surface: SurfaceManager,
    coordinator: RecreationCoordinator,
    presented: u64,
    dropped: u64,
}

impl FrameScheduler {
    pub fn new(timeouts: FrameTimeouts) -> Self {
        Self {
            frame_index: 0,
            timeouts,
            surface: SurfaceManager::new(),
            coordinator: RecreationCoordinator::new(),
            presented: 0,
            dropped: 0,
        }
    }

    /// Builds the surface for the first time.
    ///
    /// Leaves the surface suspended if the window starts minimized.
    pub fn initialize<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> RhiResult<SurfaceState> {
        self.coordinator.recreate(backend, &mut self.surface)
    }

    /// Runs one iteration of the frame protocol.
    ///
    /// # Errors
    ///
    /// Any error is fatal: the GPU state is assumed corrupted.
    pub fn run_frame<B: FrameBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        payloads: &FramePayloads<'_>,
        overlay: &OverlayDrawData,
    ) -> RhiResult<FrameOutcome> {
        if is_zero_extent(backend.window_extent()) || backend.window_minimized() {
            self.surface.suspend();
            return Ok(FrameOutcome::Skipped);
        }
        if self.surface.state() == SurfaceState::Suspended {
            trace!("Surface suspended, skipping frame");
            return Ok(FrameOutcome::Skipped);
        }

        if !self.surface.is_ready()
            && self.coordinator.recreate(backend, &mut self.surface)? != SurfaceState::Ready
        {
            return Ok(FrameOutcome::Skipped);
        }

        let slot = self.frame_index;
        trace!("Frame slot {}: waiting", slot);
        backend.wait_for_slot(slot, self.timeouts.fence)?;
        backend.reset_commands(slot)?;

        let image_index = match backend.acquire_image(slot, self.timeouts.acquire)? {
            AcquireStatus::Acquired { index, suboptimal } => {
                if suboptimal {
                    self.surface.mark_stale();
                }
                index
            }
            AcquireStatus::OutOfDate => {
                warn!("Acquire reported an out-of-date surface, dropping frame");
                self.surface.mark_stale();
                self.coordinator.recreate(backend, &mut self.surface)?;
                self.dropped += 1;
                return Ok(FrameOutcome::Dropped);
            }
        };

        backend.reset_fences(slot)?;
        backend.write_payloads(slot, payloads)?;
        backend.record_compute(slot, image_index)?;
        backend.submit_compute(slot)?;

        if backend.overlay_enabled() {
            backend.submit_overlay(slot, image_index, overlay)?;
        }

        let status = backend.present(slot, image_index)?;
        if status.is_stale() {
            warn!("Present reported {:?}", status);
            self.surface.mark_stale();
        }

        self.frame_index = (self.frame_index + 1) % backend.slot_count();
        self.presented += 1;
        trace!("Frame slot {}: presented image {}", slot, image_index);

        if self.surface.state() == SurfaceState::Stale {
            self.coordinator.recreate(backend, &mut self.surface)?;
        }

        Ok(FrameOutcome::Presented { slot, image_index })
    }

    /// Resumes a suspended surface once the window is usable again at
    /// `extent`; the next frame rebuilds.
    pub fn notify_restored(&mut self, extent: vk::Extent2D) {
        self.surface.notify_restored(extent);
    }

    /// Slot the next frame will use.
    #[inline]
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    #[inline]
    pub fn surface(&self) -> &SurfaceManager {
        &self.surface
    }

    #[inline]
    pub fn surface_mut(&mut self) -> &mut SurfaceManager {
        &mut self.surface
    }

    /// Number of surface rebuilds so far, including the initial build.
    pub fn rebuilds(&self) -> u64 {
        self.coordinator.rebuilds()
    }

    pub fn presented_frames(&self) -> u64 {
        self.presented
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }
}
