//! Presentation surface state.
//!
//! ```text
//! Uninitialized ──build──▶ Ready ──stale acquire/present, resize──▶ Stale
//!                            ▲                                        │
//!                            └──────────── recreation ◀───────────────┘
//! any ──zero-area window──▶ Suspended ──restore──▶ Stale
//! ```
//!
//! The manager only tracks state and the current extent; the swapchain
//! itself lives in the backend's surface ledger.

use ash::vk;
use tracing::{debug, warn};

use crate::backend::is_zero_extent;

/// Lifecycle state of the presentation surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceState {
    /// Nothing has been built yet.
    Uninitialized,
    /// The swapchain matches the window; frames may be submitted.
    Ready,
    /// The swapchain must be rebuilt before the next frame.
    Stale,
    /// The window has no drawable area; no acquire or present is attempted.
    Suspended,
}

/// Tracks whether the presentation surface can be used this frame.
#[derive(Debug)]
pub struct SurfaceManager {
    state: SurfaceState,
    extent: vk::Extent2D,
}

impl SurfaceManager {
    pub fn new() -> Self {
        Self {
            state: SurfaceState::Uninitialized,
            extent: vk::Extent2D::default(),
        }
    }

    #[inline]
    pub fn state(&self) -> SurfaceState {
        self.state
    }

    /// Extent of the last successful build.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == SurfaceState::Ready
    }

    /// Marks a ready surface stale after an out-of-date or suboptimal result.
    pub fn mark_stale(&mut self) {
        if self.state == SurfaceState::Ready {
            warn!("Presentation surface is stale");
            self.state = SurfaceState::Stale;
        }
    }

    /// Stops presenting until the window regains a drawable area.
    pub fn suspend(&mut self) {
        if self.state != SurfaceState::Suspended {
            debug!("Presentation surface suspended ({:?})", self.state);
            self.state = SurfaceState::Suspended;
        }
    }

    /// Handles a size change reported by the window system.
    ///
    /// A resize to the extent already built is ignored.
    pub fn notify_resize(&mut self, extent: vk::Extent2D) {
        if is_zero_extent(extent) {
            self.suspend();
            return;
        }

        match self.state {
            SurfaceState::Uninitialized => {}
            SurfaceState::Ready if extent == self.extent => {}
            SurfaceState::Ready | SurfaceState::Suspended => {
                debug!(
                    "Surface resize to {}x{} pending",
                    extent.width, extent.height
                );
                self.state = SurfaceState::Stale;
            }
            SurfaceState::Stale => {}
        }
    }

    /// Handles the window coming back from minimized or occluded.
    ///
    /// Only a suspended surface reacts, going stale so the next frame
    /// rebuilds. Nothing changes while `extent` has no area.
    pub fn notify_restored(&mut self, extent: vk::Extent2D) {
        if self.state == SurfaceState::Suspended && !is_zero_extent(extent) {
            debug!(
                "Surface restored at {}x{}",
                extent.width, extent.height
            );
            self.state = SurfaceState::Stale;
        }
    }

    pub(crate) fn set_extent(&mut self, extent: vk::Extent2D) {
        self.extent = extent;
    }

    pub(crate) fn mark_ready(&mut self) {
        self.state = SurfaceState::Ready;
    }
}

impl Default for SurfaceManager {
    fn default() -> Self {
        Self::new()
    }
}
