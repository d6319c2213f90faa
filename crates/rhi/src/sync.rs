//! Synchronization primitives for the frame loop.
//!
//! - Semaphores order one queue submission against another (GPU to GPU).
//! - Fences let the host wait for a submission to finish (GPU to host).
//!
//! Every primitive is recorded in the ledger passed at creation and is
//! destroyed when that ledger is flushed.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use skyscatter_rhi::device::Device;
//! use skyscatter_rhi::ledger::GpuLedger;
//! use skyscatter_rhi::sync::{create_fence, reset_fences, wait_for_fences};
//!
//! # fn example(device: Arc<Device>, ledger: &mut GpuLedger) -> skyscatter_rhi::RhiResult<()> {
//! let fence = create_fence(&device, true, ledger)?;
//! wait_for_fences(&device, &[fence], Duration::from_secs(1))?;
//! reset_fences(&device, &[fence])?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use ash::vk;
use tracing::{debug, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::ledger::{GpuLedger, GpuObject};

/// Creates an unsignaled binary semaphore.
pub fn create_semaphore(device: &Device, ledger: &mut GpuLedger) -> RhiResult<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
    ledger.record(GpuObject::Semaphore(semaphore));
    Ok(semaphore)
}

/// Creates a fence, optionally already signaled so the first wait on it
/// returns immediately.
pub fn create_fence(
    device: &Device,
    signaled: bool,
    ledger: &mut GpuLedger,
) -> RhiResult<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = unsafe { device.handle().create_fence(&create_info, None)? };
    ledger.record(GpuObject::Fence(fence));
    Ok(fence)
}

/// Converts a host timeout into the nanosecond count Vulkan expects.
pub fn timeout_nanos(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

/// Blocks until every fence is signaled.
///
/// # Errors
///
/// Returns [`RhiError::Timeout`] if the fences are still unsignaled after
/// `timeout`, or the Vulkan error if the wait fails.
pub fn wait_for_fences(device: &Device, fences: &[vk::Fence], timeout: Duration) -> RhiResult<()> {
    if fences.is_empty() {
        return Ok(());
    }

    match unsafe {
        device
            .handle()
            .wait_for_fences(fences, true, timeout_nanos(timeout))
    } {
        Ok(()) => Ok(()),
        Err(vk::Result::TIMEOUT) => {
            warn!("Fence wait exceeded {:?}", timeout);
            Err(RhiError::Timeout("frame fence"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Returns fences to the unsignaled state. None of them may be pending.
pub fn reset_fences(device: &Device, fences: &[vk::Fence]) -> RhiResult<()> {
    if fences.is_empty() {
        return Ok(());
    }
    unsafe { device.handle().reset_fences(fences)? };
    Ok(())
}

/// Synchronization objects owned by one frame slot.
///
/// The semaphores form the chain
/// image acquired → compute finished → overlay finished → present.
/// Without the overlay stage, presentation waits on compute finished.
#[derive(Clone, Copy, Debug)]
pub struct FrameSync {
    /// `[compute, overlay]`; both created signaled.
    fences: [vk::Fence; 2],
    /// Signaled by the presentation engine when the acquired image is ready.
    pub image_acquired: vk::Semaphore,
    /// Signaled when the compute submission completes.
    pub compute_finished: vk::Semaphore,
    /// Signaled when the overlay submission completes.
    pub overlay_finished: vk::Semaphore,
}

impl FrameSync {
    /// Creates the fences (signaled) and semaphores for one frame slot.
    pub fn new(device: &Device, ledger: &mut GpuLedger) -> RhiResult<Self> {
        let compute_fence = create_fence(device, true, ledger)?;
        let overlay_fence = create_fence(device, true, ledger)?;
        let image_acquired = create_semaphore(device, ledger)?;
        let compute_finished = create_semaphore(device, ledger)?;
        let overlay_finished = create_semaphore(device, ledger)?;

        debug!("Created frame sync objects (2 fences, 3 semaphores)");

        Ok(Self {
            fences: [compute_fence, overlay_fence],
            image_acquired,
            compute_finished,
            overlay_finished,
        })
    }

    /// Guards the compute submission.
    #[inline]
    pub fn compute_fence(&self) -> vk::Fence {
        self.fences[0]
    }

    /// Guards the overlay submission.
    #[inline]
    pub fn overlay_fence(&self) -> vk::Fence {
        self.fences[1]
    }

    /// The fences a frame must observe before its slot is reused.
    ///
    /// The overlay fence is left out when the overlay stage is disabled,
    /// since nothing would signal it after the first reset.
    pub fn host_fences(&self, overlay_enabled: bool) -> &[vk::Fence] {
        if overlay_enabled {
            &self.fences
        } else {
            &self.fences[..1]
        }
    }

    /// The semaphore presentation waits on.
    pub fn present_wait(&self, overlay_enabled: bool) -> vk::Semaphore {
        if overlay_enabled {
            self.overlay_finished
        } else {
            self.compute_finished
        }
    }
}
