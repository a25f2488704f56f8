//! Linux evdev and uinput backend.
//!
//! Event devices are queried and read through [`evdev::raw_stream::RawDevice`],
//! which hands out kernel events untouched, `SYN_DROPPED` included. Virtual
//! devices are built with [`evdev::uinput::VirtualDeviceBuilder`].

use super::{DeviceSnapshot, InputDevice, UinputBackend, UinputSink};
use crate::capability::{AbsInfo, Capabilities, DeviceIdentity};
use crate::codes::{self, EV_ABS, EV_REP, EV_SYN, REP_DELAY, REP_PERIOD};
use crate::event::{EventTime, InputEvent};
use crate::uinput::UinputConfig;
use evdev::raw_stream::RawDevice;
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{
    AbsoluteAxisCode, AttributeSet, BusType, FFEffectCode, InputId, KeyCode, MiscCode, PropType,
    RelativeAxisCode, SwitchCode, UinputAbsSetup,
};
use std::collections::{BTreeMap, VecDeque};
use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

/// Longest name uinput accepts, leaving room for the terminator.
const MAX_NAME_LEN: usize = 78;

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on a descriptor we own, no pointer arguments.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if flags & libc::O_NONBLOCK == 0 {
        // SAFETY: as above.
        let ret = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Identity from what the kernel reported; missing strings become empty.
fn identity_from(
    name: Option<&str>,
    phys: Option<&str>,
    uniq: Option<&str>,
    id: &InputId,
) -> DeviceIdentity {
    DeviceIdentity {
        name: name.unwrap_or_default().to_owned(),
        bustype: id.bus_type().0,
        vendor: id.vendor(),
        product: id.product(),
        version: id.version(),
        phys: phys.unwrap_or_default().to_owned(),
        uniq: uniq.unwrap_or_default().to_owned(),
    }
}

/// Kernel view of a device, flattened to plain ids.
#[derive(Debug, Default)]
pub(crate) struct KernelReport {
    pub identity: DeviceIdentity,
    pub event_types: Vec<u16>,
    pub codes: Vec<(u16, u16)>,
    pub axes: BTreeMap<u16, AbsInfo>,
    pub properties: Vec<u16>,
}

impl KernelReport {
    fn from_device(device: &RawDevice) -> io::Result<Self> {
        let mut report = KernelReport {
            identity: identity_from(
                device.name(),
                device.physical_path(),
                device.unique_name(),
                &device.input_id(),
            ),
            event_types: device.supported_events().iter().map(|t| t.0).collect(),
            properties: device.properties().iter().map(|p| p.0).collect(),
            ..KernelReport::default()
        };

        let mut push = |event_type: u16, codes: &mut dyn Iterator<Item = u16>| {
            report.codes.extend(codes.map(|code| (event_type, code)));
        };
        if let Some(keys) = device.supported_keys() {
            push(codes::EV_KEY, &mut keys.iter().map(|k| k.0));
        }
        if let Some(axes) = device.supported_relative_axes() {
            push(codes::EV_REL, &mut axes.iter().map(|a| a.0));
        }
        if let Some(misc) = device.misc_properties() {
            push(codes::EV_MSC, &mut misc.iter().map(|m| m.0));
        }
        if let Some(switches) = device.supported_switches() {
            push(codes::EV_SW, &mut switches.iter().map(|s| s.0));
        }
        if let Some(leds) = device.supported_leds() {
            push(codes::EV_LED, &mut leds.iter().map(|l| l.0));
        }
        if let Some(sounds) = device.supported_sounds() {
            push(codes::EV_SND, &mut sounds.iter().map(|s| s.0));
        }
        if let Some(ff) = device.supported_ff() {
            push(codes::EV_FF, &mut ff.iter().map(|f| f.0));
        }

        for (axis, info) in device.get_absinfo()? {
            report.axes.insert(
                axis.0,
                AbsInfo {
                    value: info.value(),
                    minimum: info.minimum(),
                    maximum: info.maximum(),
                    fuzz: info.fuzz(),
                    flat: info.flat(),
                    resolution: info.resolution(),
                },
            );
        }
        Ok(report)
    }

    /// Build the capability bitmap.
    ///
    /// Types this crate has no table for are skipped. `EV_REP` has no code
    /// bitmap in the kernel; a device with it always carries both repeat
    /// parameters.
    pub(crate) fn into_snapshot(self) -> io::Result<DeviceSnapshot> {
        let mut capabilities = Capabilities::new();
        for &event_type in &self.event_types {
            if event_type == EV_SYN || codes::type_info(event_type).is_none() {
                continue;
            }
            capabilities.enable_type(event_type).map_err(io::Error::other)?;
            if event_type == EV_REP {
                for code in [REP_DELAY, REP_PERIOD] {
                    capabilities
                        .enable_code(EV_REP, code, None)
                        .map_err(io::Error::other)?;
                }
            }
        }
        for &(event_type, code) in &self.codes {
            if usize::from(code) >= codes::max_codes(event_type) {
                log::debug!("ignoring code {:#x} of type {:#x}", code, event_type);
                continue;
            }
            capabilities
                .enable_code(event_type, code, None)
                .map_err(io::Error::other)?;
        }
        for (&axis, &info) in &self.axes {
            capabilities
                .enable_code(EV_ABS, axis, Some(info))
                .map_err(io::Error::other)?;
        }
        for &property in &self.properties {
            capabilities
                .enable_property(property)
                .map_err(io::Error::other)?;
        }
        Ok(DeviceSnapshot {
            identity: self.identity,
            capabilities,
        })
    }
}

fn event_from(event: &evdev::InputEvent) -> InputEvent {
    let time = event
        .timestamp()
        .duration_since(UNIX_EPOCH)
        .map(|d| EventTime::new(d.as_secs() as i64, i64::from(d.subsec_micros())))
        .unwrap_or_default();
    InputEvent {
        time,
        event_type: event.event_type().0,
        code: event.code(),
        value: event.value(),
    }
}

/// A kernel event device, `/dev/input/eventN`.
#[derive(Debug)]
pub struct EvdevNode {
    device: RawDevice,
    pending: VecDeque<InputEvent>,
}

impl EvdevNode {
    /// Take ownership of an open event device descriptor.
    ///
    /// Fails if the descriptor does not speak the evdev protocol. The
    /// descriptor is switched to non-blocking mode.
    pub fn from_fd(fd: OwnedFd) -> io::Result<Self> {
        let device = RawDevice::from_fd(fd)?;
        set_nonblocking(device.as_raw_fd())?;
        let (major, minor, rev) = device.driver_version();
        log::debug!(
            "evdev protocol {}.{}.{} on fd {}",
            major,
            minor,
            rev,
            device.as_raw_fd()
        );
        Ok(Self {
            device,
            pending: VecDeque::new(),
        })
    }
}

impl InputDevice for EvdevNode {
    fn query(&mut self) -> io::Result<DeviceSnapshot> {
        KernelReport::from_device(&self.device)?.into_snapshot()
    }

    fn read_event(&mut self) -> io::Result<InputEvent> {
        if self.pending.is_empty() {
            let batch = self.device.fetch_events()?;
            self.pending.extend(batch.map(|event| event_from(&event)));
        }
        self.pending
            .pop_front()
            .ok_or_else(|| io::ErrorKind::WouldBlock.into())
    }

    fn set_grab(&mut self, grab: bool) -> io::Result<()> {
        if grab {
            self.device.grab()
        } else {
            self.device.ungrab()
        }
    }

    fn raw_fd(&self) -> RawFd {
        self.device.as_raw_fd()
    }
}

/// Types the uinput builder can declare.
const MIRRORABLE_TYPES: [u16; 6] = [
    codes::EV_KEY,
    codes::EV_REL,
    codes::EV_ABS,
    codes::EV_MSC,
    codes::EV_SW,
    codes::EV_FF,
];

/// The subset of `capabilities` a uinput device can be created with.
pub(crate) fn mirrorable_capabilities(capabilities: &Capabilities) -> Capabilities {
    let mut mirrored = capabilities.clone();
    for (event_type, _) in capabilities.iter() {
        if !MIRRORABLE_TYPES.contains(&event_type) {
            log::debug!(
                "{} cannot be declared on a virtual device, skipping",
                codes::type_name(event_type)
            );
            // Only known types are ever enabled.
            let _ = mirrored.disable_type(event_type);
        }
    }
    mirrored
}

fn truncated_name(name: &str) -> &str {
    if name.len() <= MAX_NAME_LEN {
        return name;
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

fn type_codes(capabilities: &Capabilities, event_type: u16) -> Option<Vec<u16>> {
    capabilities
        .iter()
        .find(|&(t, _)| t == event_type)
        .map(|(_, type_codes)| type_codes.iter().map(|c| c.code).collect())
}

/// The `/dev/uinput` control device.
#[derive(Debug, Clone, Default)]
pub struct UinputControl {
    config: UinputConfig,
}

impl UinputControl {
    pub fn new(config: UinputConfig) -> Self {
        Self { config }
    }

    fn declare<'a>(
        &self,
        mut builder: VirtualDeviceBuilder<'a>,
        identity: &DeviceIdentity,
        capabilities: &Capabilities,
    ) -> io::Result<VirtualDeviceBuilder<'a>> {
        if !identity.phys.is_empty() {
            let phys = CString::new(identity.phys.as_str())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            builder = builder.with_phys(&phys)?;
        }
        if let Some(keys) = type_codes(capabilities, codes::EV_KEY) {
            let keys: AttributeSet<KeyCode> = keys.into_iter().map(KeyCode).collect();
            builder = builder.with_keys(&keys)?;
        }
        if let Some(axes) = type_codes(capabilities, codes::EV_REL) {
            let axes: AttributeSet<RelativeAxisCode> =
                axes.into_iter().map(RelativeAxisCode).collect();
            builder = builder.with_relative_axes(&axes)?;
        }
        let axes = capabilities
            .iter()
            .filter(|&(t, _)| t == EV_ABS)
            .flat_map(|(_, c)| c.iter());
        for axis in axes {
            let info = axis.abs_info.unwrap_or_default();
            let setup = UinputAbsSetup::new(
                AbsoluteAxisCode(axis.code),
                evdev::AbsInfo::new(
                    info.value,
                    info.minimum,
                    info.maximum,
                    info.fuzz,
                    info.flat,
                    info.resolution,
                ),
            );
            builder = builder.with_absolute_axis(&setup)?;
        }
        if let Some(misc) = type_codes(capabilities, codes::EV_MSC) {
            let misc: AttributeSet<MiscCode> = misc.into_iter().map(MiscCode).collect();
            builder = builder.with_msc(&misc)?;
        }
        if let Some(switches) = type_codes(capabilities, codes::EV_SW) {
            let switches: AttributeSet<SwitchCode> =
                switches.into_iter().map(SwitchCode).collect();
            builder = builder.with_switches(&switches)?;
        }
        if let Some(ff) = type_codes(capabilities, codes::EV_FF) {
            let ff: AttributeSet<FFEffectCode> = ff.into_iter().map(FFEffectCode).collect();
            builder = builder
                .with_ff(&ff)?
                .with_ff_effects_max(self.config.ff_effects_max);
        }
        let properties: AttributeSet<PropType> = capabilities.properties().map(PropType).collect();
        builder.with_properties(&properties)
    }
}

impl UinputBackend for UinputControl {
    fn mirrorable(&self, capabilities: &Capabilities) -> Capabilities {
        mirrorable_capabilities(capabilities)
    }

    fn create(
        &mut self,
        identity: &DeviceIdentity,
        capabilities: &Capabilities,
    ) -> io::Result<Box<dyn UinputSink>> {
        let name = truncated_name(if identity.name.is_empty() {
            &self.config.default_name
        } else {
            &identity.name
        });
        let builder = VirtualDevice::builder()?
            .name(name)
            .input_id(InputId::new(
                BusType(identity.bustype),
                identity.vendor,
                identity.product,
                identity.version,
            ));
        let mut device = self.declare(builder, identity, capabilities)?.build()?;

        let syspath = match device.get_syspath() {
            Ok(path) => Some(path),
            Err(e) => {
                log::debug!("UI_GET_SYSNAME failed: {}", e);
                None
            }
        };
        log::debug!(
            "created uinput device {:?} ({})",
            name,
            syspath
                .as_deref()
                .map_or_else(|| "unnamed".into(), |p| p.display().to_string())
        );

        Ok(Box::new(UinputNode {
            device,
            devnode: None,
        }))
    }
}

/// A created uinput device.
#[derive(Debug)]
pub struct UinputNode {
    device: VirtualDevice,
    devnode: Option<PathBuf>,
}

impl UinputSink for UinputNode {
    /// Write exactly one event; `VirtualDevice::emit` would append a
    /// `SYN_REPORT` to every call.
    fn write_event(&mut self, event: &InputEvent) -> io::Result<()> {
        let event = evdev::InputEvent::new(event.event_type, event.code, event.value);
        let raw: &libc::input_event = event.as_ref();
        loop {
            // SAFETY: writes exactly one `struct input_event` borrowed from `event`.
            let n = unsafe {
                libc::write(
                    self.device.as_raw_fd(),
                    (raw as *const libc::input_event).cast(),
                    size_of::<libc::input_event>(),
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if n as usize != size_of::<libc::input_event>() {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("short write to uinput: {} bytes", n),
                ));
            }
            return Ok(());
        }
    }

    fn devnode(&mut self) -> io::Result<Option<PathBuf>> {
        if self.devnode.is_none() {
            let mut nodes = match self.device.enumerate_dev_nodes_blocking() {
                Ok(nodes) => nodes,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e),
            };
            self.devnode = nodes.next().transpose()?;
        }
        Ok(self.devnode.clone())
    }

    fn raw_fd(&self) -> RawFd {
        self.device.as_raw_fd()
    }

    fn destroy(self: Box<Self>) -> io::Result<()> {
        // Closing the uinput handle removes the device.
        log::debug!("destroying uinput device on fd {}", self.device.as_raw_fd());
        drop(self);
        Ok(())
    }
}
