//! Kernel-facing seams.
//!
//! The core never issues syscalls itself. A bound device is an
//! [`InputDevice`], and virtual devices come from a [`UinputBackend`] as
//! [`UinputSink`]s. The Linux implementation sits on the `evdev` crate;
//! tests drive the core through scripted devices instead.
//!
//! ## Permissions
//!
//! Reading `/dev/input/event*` and writing `/dev/uinput` usually needs the
//! caller to be in the `input` group:
//! ```bash
//! sudo usermod -aG input $USER
//! # Then log out and back in
//! ```

use crate::capability::{Capabilities, DeviceIdentity};
use crate::event::InputEvent;
use std::fmt;
use std::io;
use std::os::fd::RawFd;
use std::path::PathBuf;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(test)]
pub(crate) mod mock;

/// What a kernel device reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSnapshot {
    /// Identity metadata.
    pub identity: DeviceIdentity,
    /// Capability bitmap, including axis calibration.
    pub capabilities: Capabilities,
}

/// A kernel event device bound to a descriptor.
pub trait InputDevice: fmt::Debug + Send {
    /// Query identity and capabilities.
    ///
    /// Fails if the descriptor does not speak the evdev protocol.
    fn query(&mut self) -> io::Result<DeviceSnapshot>;

    /// Read one raw event without blocking.
    ///
    /// An empty queue is reported as [`io::ErrorKind::WouldBlock`]. The
    /// kernel's drop signal (`SYN_DROPPED`) is returned like any other event.
    fn read_event(&mut self) -> io::Result<InputEvent>;

    /// Take or release exclusive access to the event stream.
    fn set_grab(&mut self, grab: bool) -> io::Result<()>;

    /// Underlying descriptor, for registration with an external poll loop.
    fn raw_fd(&self) -> RawFd;
}

/// Factory for virtual devices.
pub trait UinputBackend: fmt::Debug + Send {
    /// The part of `capabilities` a created device can declare.
    fn mirrorable(&self, capabilities: &Capabilities) -> Capabilities {
        capabilities.clone()
    }

    /// Materialize a device exposing exactly `capabilities`.
    fn create(
        &mut self,
        identity: &DeviceIdentity,
        capabilities: &Capabilities,
    ) -> io::Result<Box<dyn UinputSink>>;
}

/// A live virtual device.
pub trait UinputSink: fmt::Debug + Send {
    /// Inject one event.
    fn write_event(&mut self, event: &InputEvent) -> io::Result<()>;

    /// Device node the kernel assigned, `None` while it is still unnamed.
    fn devnode(&mut self) -> io::Result<Option<PathBuf>>;

    /// Descriptor of the uinput control handle.
    fn raw_fd(&self) -> RawFd;

    /// Remove the device from the kernel and close the descriptor.
    fn destroy(self: Box<Self>) -> io::Result<()>;
}
