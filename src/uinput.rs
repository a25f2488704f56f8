//! Virtual devices created through uinput.
//!
//! A [`VirtualDevice`] mirrors the capabilities, axis calibration,
//! properties and identity of a [`DeviceContext`] and accepts writes only
//! for the type/code pairs it was created with.

use crate::backend::{UinputBackend, UinputSink};
use crate::capability::{Capabilities, DeviceIdentity};
use crate::codes::{self, EV_SYN};
use crate::device::DeviceContext;
use crate::error::{Error, Result};
use crate::event::InputEvent;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Settings for virtual devices.
///
/// The control device is always `/dev/uinput`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct UinputConfig {
    /// Name used when the template has none.
    pub default_name: String,
    /// Force-feedback effect slots, used when `EV_FF` is declared.
    pub ff_effects_max: u32,
}

impl Default for UinputConfig {
    fn default() -> Self {
        Self {
            default_name: String::from("evdevkit virtual device"),
            ff_effects_max: 16,
        }
    }
}

/// A live kernel device fed by this process.
#[derive(Debug)]
pub struct VirtualDevice {
    sink: Box<dyn UinputSink>,
    identity: DeviceIdentity,
    capabilities: Capabilities,
    devnode: Option<PathBuf>,
}

impl VirtualDevice {
    /// Create a device mirroring `template`.
    ///
    /// The template may be bound or hand-built, but must declare at least
    /// one capability the backend can mirror. Types the backend cannot
    /// declare are left out of the device.
    pub fn create_from(template: &DeviceContext, backend: &mut dyn UinputBackend) -> Result<Self> {
        let capabilities = backend.mirrorable(template.capability_set());
        if capabilities.is_empty() {
            return Err(Error::Create("template declares no capabilities".into()));
        }
        let identity = template.identity().clone();
        let sink = backend
            .create(&identity, &capabilities)
            .map_err(|e| Error::Create(e.to_string()))?;
        log::debug!("virtual device {:?} on fd {}", identity.name, sink.raw_fd());
        Ok(Self {
            sink,
            identity,
            capabilities,
            devnode: None,
        })
    }

    /// Descriptor of the uinput handle.
    pub fn raw_fd(&self) -> RawFd {
        self.sink.raw_fd()
    }

    /// Device node the kernel assigned, e.g. `/dev/input/event17`.
    ///
    /// `None` while the kernel has not named the device yet; the first
    /// successful lookup is cached.
    pub fn devnode(&mut self) -> Option<&Path> {
        if self.devnode.is_none() {
            match self.sink.devnode() {
                Ok(node) => self.devnode = node,
                Err(e) => log::debug!("devnode lookup failed: {}", e),
            }
        }
        self.devnode.as_deref()
    }

    /// Capabilities the device was created with.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn check_declared(&self, event_type: u16, code: u16) -> Result<()> {
        let declared = event_type == EV_SYN
            || self.capabilities.has_code(event_type, code)
            || (codes::max_codes(event_type) == 0 && self.capabilities.has_type(event_type));
        if declared {
            Ok(())
        } else {
            Err(Error::NotDeclared { event_type, code })
        }
    }

    /// Inject one event. Values are passed through unchecked.
    pub fn write_event(&mut self, event_type: u16, code: u16, value: i32) -> Result<()> {
        self.check_declared(event_type, code)?;
        self.sink
            .write_event(&InputEvent::new(event_type, code, value))
            .map_err(|e| Error::kernel("write", e))
    }

    /// Terminate the current frame.
    pub fn write_syn_report(&mut self) -> Result<()> {
        self.write_event(EV_SYN, codes::SYN_REPORT, 0)
    }

    /// Write `events` followed by a `SYN_REPORT`.
    ///
    /// Every event is checked before anything is written, so an undeclared
    /// event rejects the whole frame.
    pub fn write_frame(&mut self, events: &[InputEvent]) -> Result<()> {
        for event in events {
            self.check_declared(event.event_type, event.code)?;
        }
        for event in events {
            self.write_event(event.event_type, event.code, event.value)?;
        }
        self.write_syn_report()
    }

    /// Remove the device from the kernel.
    pub fn destroy(self) -> Result<()> {
        self.sink.destroy().map_err(|e| Error::kernel("destroy", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockDevice, MockUinput};
    use crate::capability::AbsInfo;
    use crate::codes::*;

    fn gamepad() -> DeviceContext {
        let mut ctx = DeviceContext::new();
        ctx.set_identity(DeviceIdentity {
            name: "Virtual Pad".into(),
            bustype: 0x06,
            vendor: 0x1234,
            product: 0x5678,
            version: 1,
            phys: "evdevkit/pad0".into(),
            uniq: String::new(),
        })
        .unwrap();
        ctx.enable_code(EV_KEY, BTN_SOUTH, None).unwrap();
        ctx.enable_code(EV_ABS, ABS_X, Some(AbsInfo::new(-32768, 32767, 16, 128, 0)))
            .unwrap();
        ctx.enable_property(INPUT_PROP_DIRECT).unwrap();
        ctx
    }

    #[test]
    fn test_default_config() {
        let config = UinputConfig::default();
        assert_eq!(config.default_name, "evdevkit virtual device");
        assert_eq!(config.ff_effects_max, 16);
    }

    #[test]
    fn test_unsupported_types_left_out() {
        let mut backend = MockUinput::new();
        backend.unsupported_type(EV_ABS);
        let device = VirtualDevice::create_from(&gamepad(), &mut backend).unwrap();
        assert!(device.capabilities().has_code(EV_KEY, BTN_SOUTH));
        assert!(!device.capabilities().has_type(EV_ABS));
        assert!(!backend.created()[0].capabilities.has_type(EV_ABS));
    }

    #[test]
    fn test_nothing_mirrorable_rejected() {
        let mut backend = MockUinput::new();
        backend.unsupported_type(EV_KEY);
        backend.unsupported_type(EV_ABS);
        let mut template = gamepad();
        template.disable_property(INPUT_PROP_DIRECT).unwrap();
        let result = VirtualDevice::create_from(&template, &mut backend);
        assert!(matches!(result, Err(Error::Create(_))));
        assert!(backend.created().is_empty());
    }

    #[test]
    fn test_mirrors_template() {
        let mut backend = MockUinput::new();
        let template = gamepad();
        let device = VirtualDevice::create_from(&template, &mut backend).unwrap();

        let created = &backend.created()[0];
        assert_eq!(created.identity.name, "Virtual Pad");
        assert_eq!(created.identity.phys, "evdevkit/pad0");
        assert_eq!(&created.capabilities, template.capability_set());
        assert_eq!(
            created.capabilities.abs_info(ABS_X),
            Some(AbsInfo::new(-32768, 32767, 16, 128, 0))
        );
        assert!(created.capabilities.has_property(INPUT_PROP_DIRECT));
        assert_eq!(device.identity(), template.identity());
    }

    #[test]
    fn test_mirrors_bound_device() {
        let mut caps = Capabilities::new();
        caps.enable_code(EV_KEY, KEY_A, None).unwrap();
        let identity = DeviceIdentity {
            name: "Keyboard".into(),
            ..DeviceIdentity::default()
        };
        let mut ctx = DeviceContext::new();
        ctx.bind(Box::new(MockDevice::new(identity, caps.clone()))).unwrap();

        let mut backend = MockUinput::new();
        let device = VirtualDevice::create_from(&ctx, &mut backend).unwrap();
        assert_eq!(device.capabilities(), &caps);
    }

    #[test]
    fn test_empty_template_rejected() {
        let mut backend = MockUinput::new();
        let result = VirtualDevice::create_from(&DeviceContext::new(), &mut backend);
        assert!(matches!(result, Err(Error::Create(_))));
        assert!(backend.created().is_empty());
    }

    #[test]
    fn test_backend_failure_is_create_error() {
        let mut backend = MockUinput::new();
        backend.fail_create();
        let result = VirtualDevice::create_from(&gamepad(), &mut backend);
        assert!(matches!(result, Err(Error::Create(_))));
    }

    #[test]
    fn test_write_declared_events() {
        let mut backend = MockUinput::new();
        let mut device = VirtualDevice::create_from(&gamepad(), &mut backend).unwrap();
        device.write_event(EV_KEY, BTN_SOUTH, 1).unwrap();
        device.write_event(EV_ABS, ABS_X, 40_000).unwrap();
        device.write_syn_report().unwrap();

        let written: Vec<_> = backend.created()[0]
            .written
            .iter()
            .map(|e| (e.event_type, e.code, e.value))
            .collect();
        assert_eq!(
            written,
            vec![
                (EV_KEY, BTN_SOUTH, 1),
                (EV_ABS, ABS_X, 40_000),
                (EV_SYN, SYN_REPORT, 0)
            ]
        );
    }

    #[test]
    fn test_undeclared_write_rejected() {
        let mut backend = MockUinput::new();
        let mut device = VirtualDevice::create_from(&gamepad(), &mut backend).unwrap();
        let before = device.capabilities().clone();

        let result = device.write_event(EV_KEY, KEY_A, 1);
        assert!(matches!(
            result,
            Err(Error::NotDeclared { event_type: EV_KEY, code: KEY_A })
        ));
        assert!(backend.created()[0].written.is_empty());
        assert_eq!(device.capabilities(), &before);
    }

    #[test]
    fn test_write_frame_is_all_or_nothing() {
        let mut backend = MockUinput::new();
        let mut device = VirtualDevice::create_from(&gamepad(), &mut backend).unwrap();

        let bad = [
            InputEvent::new(EV_KEY, BTN_SOUTH, 1),
            InputEvent::new(EV_REL, REL_X, 1),
        ];
        assert!(device.write_frame(&bad).is_err());
        assert!(backend.created()[0].written.is_empty());

        device
            .write_frame(&[InputEvent::new(EV_KEY, BTN_SOUTH, 0)])
            .unwrap();
        let written = &backend.created()[0].written;
        assert_eq!(written.len(), 2);
        assert!(written[1].is_syn_report());
    }

    #[test]
    fn test_kernel_write_failure() {
        let mut backend = MockUinput::new();
        let mut device = VirtualDevice::create_from(&gamepad(), &mut backend).unwrap();
        backend.fail_write();
        assert!(matches!(
            device.write_syn_report(),
            Err(Error::KernelRejected { op: "write", .. })
        ));
    }

    #[test]
    fn test_devnode_resolves_later() {
        let mut backend = MockUinput::new();
        let mut device = VirtualDevice::create_from(&gamepad(), &mut backend).unwrap();
        assert_eq!(device.devnode(), None);
        backend.assign_devnodes();
        assert_eq!(device.devnode(), Some(Path::new("/dev/input/event40")));
    }

    #[test]
    fn test_destroy() {
        let mut backend = MockUinput::new();
        let device = VirtualDevice::create_from(&gamepad(), &mut backend).unwrap();
        device.destroy().unwrap();
        assert!(backend.created()[0].destroyed);
    }
}
