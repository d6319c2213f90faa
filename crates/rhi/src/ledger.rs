//! Resource ledgers: ordered teardown of GPU objects.
//!
//! Vulkan objects have no implicit ownership, and later objects may
//! reference earlier ones (a descriptor set references a buffer, an image
//! view references an image). Every object is therefore recorded in exactly
//! one [`Ledger`] at creation time and destroyed only when that ledger is
//! flushed, in reverse order of recording.
//!
//! Entries are tagged values rather than closures, so what a flush will do
//! is visible by inspecting the ledger.
//!
//! A ledger performs no synchronization. Callers wait for the device (or
//! the relevant fences) before flushing.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use skyscatter_rhi::device::Device;
//! use skyscatter_rhi::ledger::{GpuLedger, GpuObject};
//! use skyscatter_rhi::vk;
//!
//! # fn example(device: Arc<Device>, fence: vk::Fence, semaphore: vk::Semaphore)
//! #     -> skyscatter_rhi::RhiResult<()> {
//! let mut ledger = GpuLedger::new("main");
//! ledger.record(GpuObject::Fence(fence));
//! ledger.record(GpuObject::Semaphore(semaphore));
//!
//! device.wait_idle()?;
//! // Destroys the semaphore, then the fence.
//! ledger.flush(&device);
//! # Ok(())
//! # }
//! ```

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use tracing::{debug, trace, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// A recorded destruction action.
pub trait Teardown {
    /// State needed to perform the destruction.
    type Context: ?Sized;

    /// Destroys the underlying resource.
    fn teardown(self, context: &Self::Context);

    /// Short description used in logs.
    fn label(&self) -> &'static str;
}

/// An insertion-ordered list of pending destruction actions.
pub struct Ledger<T> {
    name: &'static str,
    entries: Vec<T>,
}

impl<T: Teardown> Ledger<T> {
    /// Creates an empty ledger. `name` appears in log output.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Vec::new(),
        }
    }

    /// Appends a destruction action. Never fails.
    pub fn record(&mut self, entry: T) {
        trace!("[{}] recorded {}", self.name, entry.label());
        self.entries.push(entry);
    }

    /// Executes every recorded action, last recorded first, and leaves the
    /// ledger empty. Returns the number of actions executed; flushing an
    /// empty ledger does nothing and returns 0.
    pub fn flush(&mut self, context: &T::Context) -> usize {
        let count = self.entries.len();
        while let Some(entry) = self.entries.pop() {
            trace!("[{}] tearing down {}", self.name, entry.label());
            entry.teardown(context);
        }

        if count > 0 {
            debug!("[{}] ledger flushed {} object(s)", self.name, count);
        }
        count
    }

    /// Returns the number of pending actions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the ledger's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Iterates pending entries in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}

impl<T> Drop for Ledger<T> {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            warn!(
                "[{}] ledger dropped with {} unflushed object(s); they are leaked",
                self.name,
                self.entries.len()
            );
        }
    }
}

/// A GPU object awaiting destruction.
pub enum GpuObject {
    Buffer {
        buffer: vk::Buffer,
        allocation: Allocation,
    },
    Image {
        image: vk::Image,
        allocation: Allocation,
    },
    ImageView(vk::ImageView),
    Sampler(vk::Sampler),
    CommandPool(vk::CommandPool),
    Fence(vk::Fence),
    Semaphore(vk::Semaphore),
    DescriptorPool(vk::DescriptorPool),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    PipelineLayout(vk::PipelineLayout),
    Pipeline(vk::Pipeline),
    ShaderModule(vk::ShaderModule),
    Swapchain {
        loader: ash::khr::swapchain::Device,
        swapchain: vk::SwapchainKHR,
    },
}

/// The type of a [`GpuObject`], without its handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Buffer,
    Image,
    ImageView,
    Sampler,
    CommandPool,
    Fence,
    Semaphore,
    DescriptorPool,
    DescriptorSetLayout,
    PipelineLayout,
    Pipeline,
    ShaderModule,
    Swapchain,
}

impl ObjectKind {
    pub fn label(self) -> &'static str {
        match self {
            ObjectKind::Buffer => "buffer",
            ObjectKind::Image => "image",
            ObjectKind::ImageView => "image view",
            ObjectKind::Sampler => "sampler",
            ObjectKind::CommandPool => "command pool",
            ObjectKind::Fence => "fence",
            ObjectKind::Semaphore => "semaphore",
            ObjectKind::DescriptorPool => "descriptor pool",
            ObjectKind::DescriptorSetLayout => "descriptor set layout",
            ObjectKind::PipelineLayout => "pipeline layout",
            ObjectKind::Pipeline => "pipeline",
            ObjectKind::ShaderModule => "shader module",
            ObjectKind::Swapchain => "swapchain",
        }
    }

    /// Objects a descriptor write can point at.
    pub fn is_descriptor_resource(self) -> bool {
        matches!(
            self,
            ObjectKind::Buffer | ObjectKind::Image | ObjectKind::ImageView | ObjectKind::Sampler
        )
    }
}

impl GpuObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            GpuObject::Buffer { .. } => ObjectKind::Buffer,
            GpuObject::Image { .. } => ObjectKind::Image,
            GpuObject::ImageView(_) => ObjectKind::ImageView,
            GpuObject::Sampler(_) => ObjectKind::Sampler,
            GpuObject::CommandPool(_) => ObjectKind::CommandPool,
            GpuObject::Fence(_) => ObjectKind::Fence,
            GpuObject::Semaphore(_) => ObjectKind::Semaphore,
            GpuObject::DescriptorPool(_) => ObjectKind::DescriptorPool,
            GpuObject::DescriptorSetLayout(_) => ObjectKind::DescriptorSetLayout,
            GpuObject::PipelineLayout(_) => ObjectKind::PipelineLayout,
            GpuObject::Pipeline(_) => ObjectKind::Pipeline,
            GpuObject::ShaderModule(_) => ObjectKind::ShaderModule,
            GpuObject::Swapchain { .. } => ObjectKind::Swapchain,
        }
    }
}

impl Teardown for GpuObject {
    type Context = Device;

    fn teardown(self, device: &Device) {
        let raw = device.handle();
        // SAFETY: every handle was created from `device`, is recorded in
        // exactly one ledger, and the caller has waited for the GPU to stop
        // using it before flushing.
        unsafe {
            match self {
                GpuObject::Buffer { buffer, allocation } => {
                    device.free(allocation);
                    raw.destroy_buffer(buffer, None);
                }
                GpuObject::Image { image, allocation } => {
                    device.free(allocation);
                    raw.destroy_image(image, None);
                }
                GpuObject::ImageView(view) => raw.destroy_image_view(view, None),
                GpuObject::Sampler(sampler) => raw.destroy_sampler(sampler, None),
                GpuObject::CommandPool(pool) => raw.destroy_command_pool(pool, None),
                GpuObject::Fence(fence) => raw.destroy_fence(fence, None),
                GpuObject::Semaphore(semaphore) => raw.destroy_semaphore(semaphore, None),
                GpuObject::DescriptorPool(pool) => raw.destroy_descriptor_pool(pool, None),
                GpuObject::DescriptorSetLayout(layout) => {
                    raw.destroy_descriptor_set_layout(layout, None)
                }
                GpuObject::PipelineLayout(layout) => raw.destroy_pipeline_layout(layout, None),
                GpuObject::Pipeline(pipeline) => raw.destroy_pipeline(pipeline, None),
                GpuObject::ShaderModule(module) => raw.destroy_shader_module(module, None),
                GpuObject::Swapchain { loader, swapchain } => {
                    loader.destroy_swapchain(swapchain, None)
                }
            }
        }
    }

    fn label(&self) -> &'static str {
        self.kind().label()
    }
}

/// Checks that no buffer, image, view or sampler follows the first
/// descriptor pool in recording order.
///
/// A flush runs last-recorded first, so a resource recorded after a pool
/// would be destroyed while sets allocated from that pool still reference
/// it. Returns the index of the first offending entry.
pub fn check_descriptor_order(
    kinds: impl IntoIterator<Item = ObjectKind>,
) -> Result<(), (usize, ObjectKind)> {
    let mut pool_seen = false;
    for (index, kind) in kinds.into_iter().enumerate() {
        if kind == ObjectKind::DescriptorPool {
            pool_seen = true;
        } else if pool_seen && kind.is_descriptor_resource() {
            return Err((index, kind));
        }
    }
    Ok(())
}

/// Ledger of Vulkan objects, flushed against a [`Device`].
pub type GpuLedger = Ledger<GpuObject>;

impl Ledger<GpuObject> {
    /// Fails if a flush would destroy a descriptor resource before the pool
    /// whose sets point at it. See [`check_descriptor_order`].
    pub fn verify_descriptor_order(&self) -> RhiResult<()> {
        check_descriptor_order(self.iter().map(GpuObject::kind)).map_err(|(index, kind)| {
            RhiError::LedgerOrder {
                ledger: self.name,
                object: kind.label(),
                index,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    struct Marker(u32);

    impl Teardown for Marker {
        type Context = RefCell<Vec<u32>>;

        fn teardown(self, log: &Self::Context) {
            log.borrow_mut().push(self.0);
        }

        fn label(&self) -> &'static str {
            "marker"
        }
    }

    #[test]
    fn test_flush_reverses_record_order() {
        let log = RefCell::new(Vec::new());
        let mut ledger = Ledger::new("test");
        for id in [3, 1, 4, 1, 5, 9, 2, 6] {
            ledger.record(Marker(id));
        }

        assert_eq!(ledger.flush(&log), 8);
        assert_eq!(*log.borrow(), vec![6, 2, 9, 5, 1, 4, 1, 3]);
    }

    #[test]
    fn test_flush_leaves_ledger_empty_and_is_idempotent() {
        let log = RefCell::new(Vec::new());
        let mut ledger = Ledger::new("test");
        ledger.record(Marker(1));
        ledger.record(Marker(2));

        ledger.flush(&log);
        assert!(ledger.is_empty());
        assert_eq!(ledger.len(), 0);

        assert_eq!(ledger.flush(&log), 0);
        assert_eq!(*log.borrow(), vec![2, 1]);
    }

    #[test]
    fn test_records_after_flush_start_fresh() {
        let log = RefCell::new(Vec::new());
        let mut ledger = Ledger::new("test");
        ledger.record(Marker(1));
        ledger.flush(&log);

        ledger.record(Marker(10));
        ledger.record(Marker(11));
        ledger.flush(&log);

        assert_eq!(*log.borrow(), vec![1, 11, 10]);
    }

    #[test]
    fn test_independent_ledgers_flush_separately() {
        let log = RefCell::new(Vec::new());
        let mut main = Ledger::new("main");
        let mut image = Ledger::new("image");
        main.record(Marker(1));
        image.record(Marker(100));
        main.record(Marker(2));
        image.record(Marker(101));

        image.flush(&log);
        assert_eq!(*log.borrow(), vec![101, 100]);
        assert_eq!(main.len(), 2);

        main.flush(&log);
        assert_eq!(*log.borrow(), vec![101, 100, 2, 1]);
    }

    #[test]
    fn test_iter_preserves_record_order() {
        let mut ledger = Ledger::new("test");
        ledger.record(Marker(7));
        ledger.record(Marker(8));

        let ids: Vec<u32> = ledger.iter().map(|p| p.0).collect();
        assert_eq!(ids, vec![7, 8]);
        assert_eq!(ledger.name(), "test");

        ledger.flush(&RefCell::new(Vec::new()));
    }

    #[test]
    fn test_frame_resources_before_descriptor_pool() {
        use ObjectKind::*;

        // Per-slot buffers, sync and pools, the font texture, then the
        // descriptor objects and pipelines.
        let order = [
            Buffer, Buffer, Buffer, Buffer, CommandPool, CommandPool, Fence, Fence, Semaphore,
            Semaphore, Semaphore, Image, ImageView, Sampler, DescriptorSetLayout, DescriptorPool,
            PipelineLayout, ShaderModule, Pipeline, DescriptorSetLayout, DescriptorPool,
            PipelineLayout,
        ];
        assert_eq!(check_descriptor_order(order), Ok(()));
    }

    #[test]
    fn test_buffer_after_pool_is_rejected() {
        use ObjectKind::*;

        let order = [
            DescriptorSetLayout,
            DescriptorPool,
            PipelineLayout,
            Pipeline,
            Buffer,
            Buffer,
        ];
        assert_eq!(check_descriptor_order(order), Err((4, Buffer)));
        assert_eq!(
            check_descriptor_order([DescriptorPool, Fence, Sampler]),
            Err((2, Sampler))
        );
    }

    #[test]
    fn test_non_resources_may_follow_pool() {
        use ObjectKind::*;

        let order = [DescriptorPool, CommandPool, Fence, Semaphore, Pipeline, Swapchain];
        assert_eq!(check_descriptor_order(order), Ok(()));
        assert_eq!(check_descriptor_order([]), Ok(()));
    }

    #[test]
    fn test_verify_descriptor_order_names_the_ledger() {
        let mut ledger = GpuLedger::new("main");
        ledger.record(GpuObject::DescriptorPool(vk::DescriptorPool::null()));
        ledger.record(GpuObject::Sampler(vk::Sampler::null()));

        match ledger.verify_descriptor_order() {
            Err(RhiError::LedgerOrder {
                ledger: name,
                object,
                index,
            }) => {
                assert_eq!(name, "main");
                assert_eq!(object, "sampler");
                assert_eq!(index, 1);
            }
            other => panic!("expected LedgerOrder, got {other:?}"),
        }

        // Null handles; nothing to destroy.
        std::mem::forget(ledger);
    }

    #[test]
    fn test_gpu_object_labels() {
        assert_eq!(GpuObject::Fence(vk::Fence::null()).label(), "fence");
        assert_eq!(
            GpuObject::ImageView(vk::ImageView::null()).label(),
            "image view"
        );
        assert_eq!(
            GpuObject::DescriptorSetLayout(vk::DescriptorSetLayout::null()).label(),
            "descriptor set layout"
        );
        assert_eq!(GpuObject::Sampler(vk::Sampler::null()).kind(), ObjectKind::Sampler);
        assert!(ObjectKind::Sampler.is_descriptor_resource());
        assert!(!ObjectKind::DescriptorPool.is_descriptor_resource());
    }
}
