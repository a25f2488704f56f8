//! Scripted in-memory backend for unit tests.
//!
//! A [`MockDevice`] replays a queue of events and errors; a [`MockUinput`]
//! records every virtual device it creates and every event written to it.
//! Both hand out handles sharing their state so tests can inspect them after
//! the device has been boxed into a context or registry.

use super::{DeviceSnapshot, InputDevice, UinputBackend, UinputSink};
use crate::capability::{Capabilities, DeviceIdentity};
use crate::codes::{EV_SYN, SYN_DROPPED};
use crate::event::{EventTime, InputEvent};
use std::collections::VecDeque;
use std::io;
use std::os::fd::RawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_FD: AtomicI32 = AtomicI32::new(100);

fn next_fd() -> RawFd {
    NEXT_FD.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Default)]
struct DeviceState {
    queue: VecDeque<io::Result<InputEvent>>,
    grabbed: bool,
    refuse_grab: bool,
    closed: bool,
    clock: i64,
}

/// Scripted event device.
#[derive(Debug)]
pub struct MockDevice {
    snapshot: Option<DeviceSnapshot>,
    state: Arc<Mutex<DeviceState>>,
    fd: RawFd,
}

/// Test-side view of a [`MockDevice`].
#[derive(Debug, Clone)]
pub struct MockDeviceHandle {
    state: Arc<Mutex<DeviceState>>,
}

impl MockDevice {
    pub fn new(identity: DeviceIdentity, capabilities: Capabilities) -> Self {
        Self {
            snapshot: Some(DeviceSnapshot {
                identity,
                capabilities,
            }),
            state: Arc::default(),
            fd: next_fd(),
        }
    }

    /// A descriptor that fails every evdev query.
    pub fn not_an_input_device() -> Self {
        Self {
            snapshot: None,
            state: Arc::default(),
            fd: next_fd(),
        }
    }

    pub fn handle(&self) -> MockDeviceHandle {
        MockDeviceHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl MockDeviceHandle {
    /// Queue an event, timestamped one microsecond after the previous one.
    pub fn push(&self, event_type: u16, code: u16, value: i32) {
        let mut state = self.state.lock().unwrap();
        state.clock += 1;
        let time = EventTime::new(0, state.clock);
        state
            .queue
            .push_back(Ok(InputEvent::new(event_type, code, value).with_time(time)));
    }

    /// Queue the kernel's drop signal.
    pub fn push_drop(&self) {
        self.push(EV_SYN, SYN_DROPPED, 0);
    }

    /// Queue a read failure.
    pub fn push_error(&self, kind: io::ErrorKind) {
        self.state.lock().unwrap().queue.push_back(Err(kind.into()));
    }

    pub fn refuse_grab(&self) {
        self.state.lock().unwrap().refuse_grab = true;
    }

    pub fn is_grabbed(&self) -> bool {
        self.state.lock().unwrap().grabbed
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }
}

impl InputDevice for MockDevice {
    fn query(&mut self) -> io::Result<DeviceSnapshot> {
        self.snapshot
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Unsupported, "inappropriate ioctl for device"))
    }

    fn read_event(&mut self) -> io::Result<InputEvent> {
        self.state
            .lock()
            .unwrap()
            .queue
            .pop_front()
            .unwrap_or_else(|| Err(io::ErrorKind::WouldBlock.into()))
    }

    fn set_grab(&mut self, grab: bool) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.refuse_grab {
            return Err(io::Error::from(io::ErrorKind::ResourceBusy));
        }
        state.grabbed = grab;
        Ok(())
    }

    fn raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.state.lock().unwrap().closed = true;
    }
}

/// A virtual device recorded by [`MockUinput`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedDevice {
    pub identity: DeviceIdentity,
    pub capabilities: Capabilities,
    pub written: Vec<InputEvent>,
    pub destroyed: bool,
}

#[derive(Debug, Default)]
struct UinputState {
    created: Vec<CreatedDevice>,
    fail_create: bool,
    fail_write: bool,
    devnodes_ready: bool,
    unsupported_types: Vec<u16>,
}

/// Recording uinput backend.
#[derive(Debug, Clone, Default)]
pub struct MockUinput {
    state: Arc<Mutex<UinputState>>,
}

impl MockUinput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create(&self) {
        self.state.lock().unwrap().fail_create = true;
    }

    pub fn fail_write(&self) {
        self.state.lock().unwrap().fail_write = true;
    }

    /// Let the kernel "name" created devices so `devnode` resolves.
    pub fn assign_devnodes(&self) {
        self.state.lock().unwrap().devnodes_ready = true;
    }

    /// Leave `event_type` out of every created device.
    pub fn unsupported_type(&self, event_type: u16) {
        self.state.lock().unwrap().unsupported_types.push(event_type);
    }

    pub fn created(&self) -> Vec<CreatedDevice> {
        self.state.lock().unwrap().created.clone()
    }
}

impl UinputBackend for MockUinput {
    fn mirrorable(&self, capabilities: &Capabilities) -> Capabilities {
        let mut mirrored = capabilities.clone();
        for &event_type in &self.state.lock().unwrap().unsupported_types {
            mirrored.disable_type(event_type).unwrap();
        }
        mirrored
    }

    fn create(
        &mut self,
        identity: &DeviceIdentity,
        capabilities: &Capabilities,
    ) -> io::Result<Box<dyn UinputSink>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        state.created.push(CreatedDevice {
            identity: identity.clone(),
            capabilities: capabilities.clone(),
            written: Vec::new(),
            destroyed: false,
        });
        Ok(Box::new(MockSink {
            state: Arc::clone(&self.state),
            index: state.created.len() - 1,
            fd: next_fd(),
        }))
    }
}

#[derive(Debug)]
struct MockSink {
    state: Arc<Mutex<UinputState>>,
    index: usize,
    fd: RawFd,
}

impl UinputSink for MockSink {
    fn write_event(&mut self, event: &InputEvent) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_write {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }
        state.created[self.index].written.push(*event);
        Ok(())
    }

    fn devnode(&mut self) -> io::Result<Option<PathBuf>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .devnodes_ready
            .then(|| PathBuf::from(format!("/dev/input/event{}", 40 + self.index))))
    }

    fn raw_fd(&self) -> RawFd {
        self.fd
    }

    fn destroy(self: Box<Self>) -> io::Result<()> {
        self.state.lock().unwrap().created[self.index].destroyed = true;
        Ok(())
    }
}
