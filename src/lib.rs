//! # evdevkit
//!
//! Linux input devices from Rust: capability discovery, non-blocking event
//! streams with `SYN_DROPPED` recovery, and virtual devices through uinput.
//!
//! ## Features
//!
//! - Symbolic names for every event type, code and input property
//! - Capability bitmaps with absolute-axis calibration
//! - Event pump that hides the kernel's drop/resync signal
//! - Virtual devices mirroring a real device or a hand-built template
//! - Handle-based [`Registry`] for binding layers
//!
//! ## Quick Start
//!
//! ### Reading Events
//!
//! ```no_run
//! use evdevkit::{Registry, discovery};
//! use std::path::Path;
//!
//! let mut registry = Registry::new();
//! let fd = discovery::open_device_node(Path::new("/dev/input/event0"))?;
//! registry.new_context(1)?;
//! registry.bind(1, fd)?;
//!
//! println!("{}", registry.identity(1)?.name);
//! while let Some(event) = registry.next_event(1)? {
//!     println!("{}", event);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Creating a Virtual Device
//!
//! ```no_run
//! use evdevkit::{Registry, codes};
//!
//! let mut registry = Registry::new();
//! registry.new_context(1)?;
//! registry.enable_code(1, codes::EV_KEY, codes::KEY_A, None)?;
//!
//! registry.create_virtual(1, 1)?;
//! registry.write_event(1, codes::EV_KEY, codes::KEY_A, 1)?;
//! registry.write_syn_report(1)?;
//! registry.write_event(1, codes::EV_KEY, codes::KEY_A, 0)?;
//! registry.write_syn_report(1)?;
//! # Ok::<(), evdevkit::Error>(())
//! ```
//!
//! ## Architecture
//!
//! The core never touches the kernel directly. Devices are reached through
//! the traits in [`backend`]; on Linux they are implemented with the
//! `evdev` crate, and tests substitute scripted devices.

pub mod backend;
pub mod capability;
pub mod codes;
pub mod device;
#[cfg(target_os = "linux")]
pub mod discovery;
pub mod error;
pub mod event;
pub mod reader;
pub mod registry;
pub mod uinput;

// Re-exports
pub use backend::{DeviceSnapshot, InputDevice, UinputBackend, UinputSink};
pub use capability::{AbsInfo, Capabilities, CodeCapability, DeviceIdentity, TypeCapability, TypeCodes};
pub use device::DeviceContext;
pub use error::{Error, Handle, Result};
pub use event::{EventTime, InputEvent};
pub use reader::{EventReader, StreamState};
pub use registry::Registry;
pub use uinput::{UinputConfig, VirtualDevice};
