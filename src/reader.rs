//! Non-blocking event stream with drop recovery.
//!
//! When the kernel's per-client buffer overflows it emits `SYN_DROPPED`.
//! The reader reads on past it and hands the caller whatever real event
//! comes next, so a poll never returns the drop signal itself.

use crate::backend::InputDevice;
use crate::error::{Error, Result};
use crate::event::InputEvent;
use std::io;
use std::os::fd::RawFd;

/// Where the reader stands after the last poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// Events are delivered as read.
    #[default]
    Normal,
    /// A drop signal was seen and no real event has been read since.
    /// Only held inside a poll.
    Syncing,
    /// The last poll found the queue empty.
    Exhausted,
}

/// Pulls events from a bound device one poll at a time.
#[derive(Debug)]
pub struct EventReader {
    device: Box<dyn InputDevice>,
    state: StreamState,
    dropped_syncs: u64,
}

enum Read {
    Event(InputEvent),
    Empty,
}

impl EventReader {
    pub fn new(device: Box<dyn InputDevice>) -> Self {
        Self {
            device,
            state: StreamState::Normal,
            dropped_syncs: 0,
        }
    }

    fn read(&mut self) -> Result<Read> {
        match self.device.read_event() {
            Ok(event) => Ok(Read::Event(event)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Read::Empty),
            Err(e) => Err(Error::ReadFault(e)),
        }
    }

    /// Poll for the next event.
    ///
    /// Returns `Ok(None)` when nothing is queued. A drop signal is never
    /// returned: the reader keeps reading past it, and past any drop
    /// signals directly behind it, and hands out the first real event.
    pub fn next_event(&mut self) -> Result<Option<InputEvent>> {
        loop {
            let event = match self.read() {
                Ok(Read::Event(event)) => event,
                Ok(Read::Empty) => {
                    self.state = StreamState::Exhausted;
                    return Ok(None);
                }
                Err(e) => {
                    self.state = StreamState::Normal;
                    return Err(e);
                }
            };

            if !event.is_drop_signal() {
                self.state = StreamState::Normal;
                return Ok(Some(event));
            }

            self.dropped_syncs += 1;
            if self.state == StreamState::Syncing {
                log::warn!("repeated SYN_DROPPED on fd {}", self.device.raw_fd());
            } else {
                log::debug!(
                    "SYN_DROPPED on fd {}, resyncing ({} so far)",
                    self.device.raw_fd(),
                    self.dropped_syncs
                );
            }
            self.state = StreamState::Syncing;
        }
    }

    /// Read everything currently queued.
    pub fn drain(&mut self) -> Result<Vec<InputEvent>> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event()? {
            events.push(event);
        }
        Ok(events)
    }

    /// Number of drop signals seen so far.
    pub fn dropped_syncs(&self) -> u64 {
        self.dropped_syncs
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub(crate) fn device_mut(&mut self) -> &mut dyn InputDevice {
        self.device.as_mut()
    }

    pub fn raw_fd(&self) -> RawFd {
        self.device.raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockDevice, MockDeviceHandle};
    use crate::capability::{Capabilities, DeviceIdentity};
    use crate::codes::*;

    fn reader() -> (EventReader, MockDeviceHandle) {
        let device = MockDevice::new(DeviceIdentity::default(), Capabilities::new());
        let handle = device.handle();
        (EventReader::new(Box::new(device)), handle)
    }

    #[test]
    fn test_empty_queue_is_none() {
        let (mut reader, _handle) = reader();
        assert_eq!(reader.next_event().unwrap(), None);
        assert_eq!(reader.state(), StreamState::Exhausted);
    }

    #[test]
    fn test_events_in_kernel_order() {
        let (mut reader, handle) = reader();
        handle.push(EV_KEY, KEY_A, 1);
        handle.push(EV_SYN, SYN_REPORT, 0);
        handle.push(EV_KEY, KEY_A, 0);

        let events = reader.drain().unwrap();
        let triples: Vec<_> = events.iter().map(|e| (e.event_type, e.code, e.value)).collect();
        assert_eq!(
            triples,
            vec![(EV_KEY, KEY_A, 1), (EV_SYN, SYN_REPORT, 0), (EV_KEY, KEY_A, 0)]
        );
        assert!(events.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[test]
    fn test_drop_signal_is_skipped() {
        let (mut reader, handle) = reader();
        handle.push(EV_KEY, KEY_A, 1);
        handle.push_drop();
        handle.push(EV_KEY, KEY_B, 1);

        let first = reader.next_event().unwrap().unwrap();
        assert_eq!(first.code, KEY_A);
        let second = reader.next_event().unwrap().unwrap();
        assert_eq!(second.code, KEY_B);
        assert_eq!(reader.next_event().unwrap(), None);
        assert_eq!(reader.dropped_syncs(), 1);
    }

    #[test]
    fn test_drop_signal_then_empty_queue() {
        let (mut reader, handle) = reader();
        handle.push_drop();
        assert_eq!(reader.next_event().unwrap(), None);
        assert_eq!(reader.state(), StreamState::Exhausted);
    }

    #[test]
    fn test_consecutive_drops_are_skipped() {
        let (mut reader, handle) = reader();
        handle.push_drop();
        handle.push_drop();
        handle.push(EV_KEY, KEY_C, 1);

        assert_eq!(reader.next_event().unwrap().unwrap().code, KEY_C);
        assert_eq!(handle.pending(), 0);
        assert_eq!(reader.state(), StreamState::Normal);
        assert_eq!(reader.dropped_syncs(), 2);
    }

    #[test]
    fn test_drain_across_consecutive_drops() {
        let (mut reader, handle) = reader();
        handle.push(EV_KEY, KEY_A, 1);
        handle.push_drop();
        handle.push_drop();
        handle.push(EV_KEY, KEY_B, 1);
        handle.push(EV_KEY, KEY_C, 1);

        let codes: Vec<_> = reader.drain().unwrap().iter().map(|e| e.code).collect();
        assert_eq!(codes, vec![KEY_A, KEY_B, KEY_C]);
        assert_eq!(handle.pending(), 0);
        assert_eq!(reader.state(), StreamState::Exhausted);
    }

    #[test]
    fn test_drops_then_empty_queue() {
        let (mut reader, handle) = reader();
        handle.push_drop();
        handle.push_drop();
        assert_eq!(reader.next_event().unwrap(), None);
        assert_eq!(reader.state(), StreamState::Exhausted);
    }

    #[test]
    fn test_read_fault() {
        let (mut reader, handle) = reader();
        handle.push_error(io::ErrorKind::BrokenPipe);
        assert!(matches!(reader.next_event(), Err(Error::ReadFault(_))));
    }

    #[test]
    fn test_fault_during_resync_resets_state() {
        let (mut reader, handle) = reader();
        handle.push_drop();
        handle.push_error(io::ErrorKind::Other);
        assert!(matches!(reader.next_event(), Err(Error::ReadFault(_))));
        assert_eq!(reader.state(), StreamState::Normal);

        handle.push(EV_REL, REL_X, 3);
        assert_eq!(reader.next_event().unwrap().unwrap().value, 3);
        assert_eq!(reader.state(), StreamState::Normal);
    }
}
