//! Window creation and input-event translation for Glaze.
//!
//! Wraps winit with the event vocabulary the runner hands to
//! applications: a transient, ordered event list refilled once per tick.

pub mod event;
pub mod monitor;
pub mod window;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    /// Only one window may exist per process.
    #[error("A window already exists; only one window may be open at a time")]
    WindowAlreadyExists,
    #[error("Window creation failed: {0}")]
    WindowCreation(String),
    #[error("Event loop error: {0}")]
    EventLoop(String),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

pub use event::{Action, Event, Key, Mods, MouseButton};
pub use monitor::Monitor;
pub use window::{Window, WindowConfig, WindowMode};
