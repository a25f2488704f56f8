//! Error types for device contexts, event streams and virtual devices.

use std::io;
use thiserror::Error;

/// Result type alias for evdevkit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Caller-chosen integer handle naming a context or virtual device.
pub type Handle = u32;

/// Errors that can occur while working with input devices.
#[derive(Debug, Error)]
pub enum Error {
    /// The handle is unknown or has already been released.
    #[error("invalid handle {0}")]
    InvalidHandle(Handle),

    /// The handle is still owned by a live context or virtual device.
    #[error("handle {0} is already in use")]
    HandleInUse(Handle),

    /// The descriptor does not speak the evdev protocol.
    #[error("not an input device: {0}")]
    Bind(#[source] io::Error),

    /// The context is already bound to a kernel device.
    #[error("context is already bound to a device")]
    AlreadyBound,

    /// The operation needs a bound context.
    #[error("context is not bound to a device")]
    NotBound,

    /// A type, code or property id outside the range the kernel knows.
    #[error("{kind} {value:#x} is out of range")]
    CapabilityRange {
        /// What was out of range ("type", "code" or "property").
        kind: &'static str,
        /// The offending id.
        value: u16,
    },

    /// Capabilities of a bound device are fixed by the kernel.
    #[error("capabilities of a bound device cannot be changed")]
    CapabilitiesFixed,

    /// The virtual device was not created with this type/code.
    #[error("event {event_type:#x}/{code:#x} was not declared for this device")]
    NotDeclared {
        /// Event type of the rejected write.
        event_type: u16,
        /// Event code of the rejected write.
        code: u16,
    },

    /// The kernel refused an ioctl or write.
    #[error("kernel rejected {op}: {source}")]
    KernelRejected {
        /// The refused operation.
        op: &'static str,
        /// The kernel's error.
        #[source]
        source: io::Error,
    },

    /// Reading the event stream failed for a reason other than an empty queue.
    #[error("failed to read event: {0}")]
    ReadFault(#[source] io::Error),

    /// The virtual device could not be materialized.
    #[error("failed to create virtual device: {0}")]
    Create(String),
}

impl Error {
    pub(crate) fn kernel(op: &'static str, source: io::Error) -> Self {
        Error::KernelRejected { op, source }
    }
}
