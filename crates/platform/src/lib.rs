//! Platform abstraction layer for the scattering renderer.
//!
//! This crate provides platform-specific functionality:
//! - Window management and cursor capture via winit
//! - Keyboard and raw mouse input tracking
//! - Vulkan surface creation from raw window handles

mod input;
mod window;

pub use input::{InputState, KeyCode};
pub use window::{Surface, Window, get_required_extensions};

// Re-export winit types that users might need
pub use winit::event::{DeviceEvent, ElementState, WindowEvent};
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
