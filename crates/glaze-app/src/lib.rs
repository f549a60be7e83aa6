//! Application runner and presentation cycle for Glaze.
//!
//! Composes the window, the GPU context, the swapchain and the frame
//! synchronizer into a per-tick presentation cycle, exposing the
//! [`GlazeApp`] trait as the application surface.

pub mod app;
pub mod context;
pub mod frame;
pub mod runner;
pub mod time;

pub use app::GlazeApp;
pub use context::AppContext;
pub use frame::FrameContext;
pub use runner::{run_app, AppConfig};
pub use time::Time;
