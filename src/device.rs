//! Device contexts: capability model, identity and event pump of one device.
//!
//! A [`DeviceContext`] starts out as a template whose capabilities and
//! identity can be edited by hand. Binding it to a kernel device replaces
//! both with what the kernel reports and freezes them.
//!
//! # Example
//!
//! ```
//! use evdevkit::{AbsInfo, DeviceContext, codes};
//!
//! let mut template = DeviceContext::new();
//! template.enable_code(codes::EV_KEY, codes::BTN_SOUTH, None).unwrap();
//! template
//!     .enable_code(codes::EV_ABS, codes::ABS_X, Some(AbsInfo::new(-32768, 32767, 16, 128, 0)))
//!     .unwrap();
//!
//! assert!(template.has_code(codes::EV_KEY, codes::BTN_SOUTH));
//! assert!(!template.has_type(codes::EV_SYN));
//! ```

use crate::backend::InputDevice;
use crate::capability::{AbsInfo, Capabilities, DeviceIdentity, TypeCapability};
use crate::error::{Error, Result};
use crate::event::InputEvent;
use crate::reader::{EventReader, StreamState};
use std::os::fd::RawFd;

#[derive(Debug)]
struct Binding {
    reader: EventReader,
    grabbed: bool,
}

/// Capability bitmap, identity and (once bound) event stream of one device.
#[derive(Debug, Default)]
pub struct DeviceContext {
    identity: DeviceIdentity,
    capabilities: Capabilities,
    binding: Option<Binding>,
}

impl DeviceContext {
    /// An empty, unbound template.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to a kernel device, replacing capabilities and identity with
    /// what it reports.
    pub fn bind(&mut self, mut device: Box<dyn InputDevice>) -> Result<()> {
        if self.binding.is_some() {
            return Err(Error::AlreadyBound);
        }
        let snapshot = device.query().map_err(Error::Bind)?;
        log::debug!(
            "bound fd {} to {:?} ({:04x}:{:04x})",
            device.raw_fd(),
            snapshot.identity.name,
            snapshot.identity.vendor,
            snapshot.identity.product
        );
        self.identity = snapshot.identity;
        self.capabilities = snapshot.capabilities;
        self.binding = Some(Binding {
            reader: EventReader::new(device),
            grabbed: false,
        });
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Identity metadata. Empty on a fresh template.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Mutable identity of a template.
    pub fn identity_mut(&mut self) -> Result<&mut DeviceIdentity> {
        self.ensure_template()?;
        Ok(&mut self.identity)
    }

    /// Replace the identity of a template.
    pub fn set_identity(&mut self, identity: DeviceIdentity) -> Result<()> {
        *self.identity_mut()? = identity;
        Ok(())
    }

    pub fn has_type(&self, event_type: u16) -> bool {
        self.capabilities.has_type(event_type)
    }

    pub fn has_code(&self, event_type: u16, code: u16) -> bool {
        self.capabilities.has_code(event_type, code)
    }

    pub fn has_property(&self, property: u16) -> bool {
        self.capabilities.has_property(property)
    }

    /// Supported types and codes, ordered by type then code.
    pub fn capabilities(&self) -> Vec<TypeCapability> {
        self.capabilities.snapshot()
    }

    /// The capability bitmap itself.
    pub fn capability_set(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Calibration of absolute axis `code`.
    pub fn abs_info(&self, code: u16) -> Option<AbsInfo> {
        self.capabilities.abs_info(code)
    }

    /// Enabled input properties, ascending.
    pub fn properties(&self) -> Vec<u16> {
        self.capabilities.properties().collect()
    }

    fn ensure_template(&self) -> Result<()> {
        if self.binding.is_some() {
            Err(Error::CapabilitiesFixed)
        } else {
            Ok(())
        }
    }

    pub fn enable_type(&mut self, event_type: u16) -> Result<()> {
        self.ensure_template()?;
        self.capabilities.enable_type(event_type)
    }

    pub fn disable_type(&mut self, event_type: u16) -> Result<()> {
        self.ensure_template()?;
        self.capabilities.disable_type(event_type)
    }

    /// Enable a code (and its type). `abs_info` defaults to zeroes for
    /// absolute axes and is ignored otherwise.
    pub fn enable_code(&mut self, event_type: u16, code: u16, abs_info: Option<AbsInfo>) -> Result<()> {
        self.ensure_template()?;
        self.capabilities.enable_code(event_type, code, abs_info)
    }

    pub fn disable_code(&mut self, event_type: u16, code: u16) -> Result<()> {
        self.ensure_template()?;
        self.capabilities.disable_code(event_type, code)
    }

    pub fn enable_property(&mut self, property: u16) -> Result<()> {
        self.ensure_template()?;
        self.capabilities.enable_property(property)
    }

    pub fn disable_property(&mut self, property: u16) -> Result<()> {
        self.ensure_template()?;
        self.capabilities.disable_property(property)
    }

    fn binding_mut(&mut self) -> Result<&mut Binding> {
        self.binding.as_mut().ok_or(Error::NotBound)
    }

    /// Take (`true`) or release (`false`) exclusive access to the device.
    pub fn grab(&mut self, enabled: bool) -> Result<()> {
        let binding = self.binding_mut()?;
        binding
            .reader
            .device_mut()
            .set_grab(enabled)
            .map_err(|e| Error::kernel("grab", e))?;
        binding.grabbed = enabled;
        log::debug!(
            "{} fd {}",
            if enabled { "grabbed" } else { "ungrabbed" },
            binding.reader.raw_fd()
        );
        Ok(())
    }

    pub fn is_grabbed(&self) -> bool {
        self.binding.as_ref().is_some_and(|b| b.grabbed)
    }

    /// Poll the event stream. See [`EventReader::next_event`].
    pub fn next_event(&mut self) -> Result<Option<InputEvent>> {
        self.binding_mut()?.reader.next_event()
    }

    /// Read everything currently queued.
    pub fn drain_events(&mut self) -> Result<Vec<InputEvent>> {
        self.binding_mut()?.reader.drain()
    }

    /// Number of `SYN_DROPPED` resyncs so far; zero when unbound.
    pub fn dropped_syncs(&self) -> u64 {
        self.binding.as_ref().map_or(0, |b| b.reader.dropped_syncs())
    }

    pub fn stream_state(&self) -> Option<StreamState> {
        self.binding.as_ref().map(|b| b.reader.state())
    }

    /// Descriptor of the bound device.
    pub fn raw_fd(&self) -> Result<RawFd> {
        self.binding
            .as_ref()
            .map(|b| b.reader.raw_fd())
            .ok_or(Error::NotBound)
    }

    /// A fresh template with this context's capabilities and identity.
    pub fn to_template(&self) -> DeviceContext {
        DeviceContext {
            identity: self.identity.clone(),
            capabilities: self.capabilities.clone(),
            binding: None,
        }
    }

    /// Release the grab, if any, and close the device.
    pub fn release(mut self) {
        if let Some(mut binding) = self.binding.take() {
            let fd = binding.reader.raw_fd();
            if binding.grabbed {
                if let Err(e) = binding.reader.device_mut().set_grab(false) {
                    log::warn!("failed to ungrab fd {} on release: {}", fd, e);
                }
            }
            drop(binding);
            log::debug!("released fd {}", fd);
        }
    }
}
