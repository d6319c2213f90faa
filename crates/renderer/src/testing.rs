//! A recording backend for exercising the frame protocol without a GPU.

use std::collections::VecDeque;
use std::time::Duration;

use ash::vk;

use skyscatter_rhi::{RhiError, RhiResult};

use crate::backend::{
    AcquireStatus, FrameBackend, FrameBinding, FramePayloads, PresentStatus, SurfaceBackend,
};
use crate::overlay::OverlayDrawData;

/// One backend call, as seen by the mock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    WaitDeviceIdle,
    FlushSurfaceLedger,
    FlushImageLedger,
    AllocateOutputImages(vk::Extent2D),
    WriteBinding(usize, FrameBinding),
    BuildSwapchain(vk::Extent2D),
    WaitForSlot(usize),
    ResetCommands(usize),
    AcquireImage(usize),
    ResetFences(usize),
    /// Slot, camera payload length, atmosphere payload length.
    WritePayloads(usize, usize, usize),
    RecordCompute(usize, u32),
    SubmitCompute(usize),
    /// Slot, image index, draw command count.
    SubmitOverlay(usize, u32, usize),
    Present(usize, u32),
}

/// Records every call in order; acquire and present results can be scripted.
pub struct MockBackend {
    slot_count: usize,
    image_count: u32,
    window_extent: vk::Extent2D,
    minimized: bool,
    overlay_enabled: bool,
    calls: Vec<Call>,
    acquire_script: VecDeque<AcquireStatus>,
    present_script: VecDeque<PresentStatus>,
    next_image: u32,
    fail_wait: bool,
    fail_allocation: bool,
}

impl MockBackend {
    pub fn new(slot_count: usize, window_extent: vk::Extent2D) -> Self {
        Self {
            slot_count,
            image_count: 3,
            window_extent,
            minimized: false,
            overlay_enabled: true,
            calls: Vec::new(),
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            next_image: 0,
            fail_wait: false,
            fail_allocation: false,
        }
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn set_window_extent(&mut self, extent: vk::Extent2D) {
        self.window_extent = extent;
    }

    pub fn set_minimized(&mut self, minimized: bool) {
        self.minimized = minimized;
    }

    pub fn set_overlay_enabled(&mut self, enabled: bool) {
        self.overlay_enabled = enabled;
    }

    /// Queues the result of a future acquire; unscripted acquires succeed.
    pub fn script_acquire(&mut self, status: AcquireStatus) {
        self.acquire_script.push_back(status);
    }

    /// Queues the result of a future present; unscripted presents succeed.
    pub fn script_present(&mut self, status: PresentStatus) {
        self.present_script.push_back(status);
    }

    pub fn fail_next_wait(&mut self) {
        self.fail_wait = true;
    }

    pub fn fail_next_allocation(&mut self) {
        self.fail_allocation = true;
    }
}

impl SurfaceBackend for MockBackend {
    fn slot_count(&self) -> usize {
        self.slot_count
    }

    fn window_extent(&self) -> vk::Extent2D {
        self.window_extent
    }

    fn window_minimized(&self) -> bool {
        self.minimized
    }

    fn wait_device_idle(&mut self) -> RhiResult<()> {
        self.calls.push(Call::WaitDeviceIdle);
        Ok(())
    }

    fn flush_surface_ledger(&mut self) {
        self.calls.push(Call::FlushSurfaceLedger);
    }

    fn flush_image_ledger(&mut self) {
        self.calls.push(Call::FlushImageLedger);
    }

    fn allocate_output_images(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        if std::mem::take(&mut self.fail_allocation) {
            return Err(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        }
        self.calls.push(Call::AllocateOutputImages(extent));
        Ok(())
    }

    fn write_binding(&mut self, slot: usize, binding: FrameBinding) -> RhiResult<()> {
        self.calls.push(Call::WriteBinding(slot, binding));
        Ok(())
    }

    fn build_swapchain(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        self.calls.push(Call::BuildSwapchain(extent));
        self.next_image = 0;
        Ok(())
    }
}

impl FrameBackend for MockBackend {
    fn overlay_enabled(&self) -> bool {
        self.overlay_enabled
    }

    fn wait_for_slot(&mut self, slot: usize, _timeout: Duration) -> RhiResult<()> {
        self.calls.push(Call::WaitForSlot(slot));
        if std::mem::take(&mut self.fail_wait) {
            return Err(RhiError::Timeout("frame fences"));
        }
        Ok(())
    }

    fn reset_commands(&mut self, slot: usize) -> RhiResult<()> {
        self.calls.push(Call::ResetCommands(slot));
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize, _timeout: Duration) -> RhiResult<AcquireStatus> {
        self.calls.push(Call::AcquireImage(slot));
        let status = self.acquire_script.pop_front().unwrap_or_else(|| {
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            AcquireStatus::Acquired {
                index,
                suboptimal: false,
            }
        });
        Ok(status)
    }

    fn reset_fences(&mut self, slot: usize) -> RhiResult<()> {
        self.calls.push(Call::ResetFences(slot));
        Ok(())
    }

    fn write_payloads(&mut self, slot: usize, payloads: &FramePayloads<'_>) -> RhiResult<()> {
        self.calls.push(Call::WritePayloads(
            slot,
            payloads.camera.len(),
            payloads.atmosphere.len(),
        ));
        Ok(())
    }

    fn record_compute(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        self.calls.push(Call::RecordCompute(slot, image_index));
        Ok(())
    }

    fn submit_compute(&mut self, slot: usize) -> RhiResult<()> {
        self.calls.push(Call::SubmitCompute(slot));
        Ok(())
    }

    fn submit_overlay(
        &mut self,
        slot: usize,
        image_index: u32,
        overlay: &OverlayDrawData,
    ) -> RhiResult<()> {
        self.calls.push(Call::SubmitOverlay(
            slot,
            image_index,
            overlay.draw_command_count(),
        ));
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentStatus> {
        self.calls.push(Call::Present(slot, image_index));
        Ok(self
            .present_script
            .pop_front()
            .unwrap_or(PresentStatus::Presented))
    }
}
