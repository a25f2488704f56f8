//! Timestamped input event records.

use crate::codes;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Kernel timestamp of an event, as seconds and microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventTime {
    /// Whole seconds.
    pub sec: i64,
    /// Microseconds within the second.
    pub usec: i64,
}

impl EventTime {
    /// Create a timestamp from seconds and microseconds.
    pub fn new(sec: i64, usec: i64) -> Self {
        Self { sec, usec }
    }

    /// Convert to a [`SystemTime`]; negative timestamps clamp to the epoch.
    pub fn to_system_time(self) -> SystemTime {
        let secs = u64::try_from(self.sec).unwrap_or(0);
        let micros = u64::try_from(self.usec).unwrap_or(0);
        UNIX_EPOCH + Duration::from_secs(secs) + Duration::from_micros(micros)
    }
}

/// One input event: `{ time, type, code, value }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InputEvent {
    /// When the kernel generated the event. Zero for events built for injection.
    pub time: EventTime,
    /// Event type, e.g. [`codes::EV_KEY`].
    pub event_type: u16,
    /// Event code within the type.
    pub code: u16,
    /// Event value.
    pub value: i32,
}

impl InputEvent {
    /// Create an untimed event, ready to be written to a virtual device.
    pub fn new(event_type: u16, code: u16, value: i32) -> Self {
        Self {
            time: EventTime::default(),
            event_type,
            code,
            value,
        }
    }

    /// Create a `SYN_REPORT` frame terminator.
    pub fn syn_report() -> Self {
        Self::new(codes::EV_SYN, codes::SYN_REPORT, 0)
    }

    /// Attach a timestamp.
    pub fn with_time(mut self, time: EventTime) -> Self {
        self.time = time;
        self
    }

    /// Timestamp as a [`SystemTime`].
    pub fn timestamp(&self) -> SystemTime {
        self.time.to_system_time()
    }

    /// Symbolic name of the event type.
    pub fn type_name(&self) -> &'static str {
        codes::type_name(self.event_type)
    }

    /// Symbolic name of the event code.
    pub fn code_name(&self) -> &'static str {
        codes::code_name(self.event_type, self.code)
    }

    /// Whether this is the kernel's drop/resync signal.
    pub fn is_drop_signal(&self) -> bool {
        self.event_type == codes::EV_SYN && self.code == codes::SYN_DROPPED
    }

    /// Whether this is a `SYN_REPORT` frame terminator.
    pub fn is_syn_report(&self) -> bool {
        self.event_type == codes::EV_SYN && self.code == codes::SYN_REPORT
    }
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:06} {} ({}) {} ({}) {}",
            self.time.sec,
            self.time.usec,
            self.type_name(),
            self.event_type,
            self.code_name(),
            self.code,
            self.value
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::{EV_KEY, KEY_A};

    #[test]
    fn test_display_uses_symbolic_names() {
        let event = InputEvent::new(EV_KEY, KEY_A, 1).with_time(EventTime::new(12, 34));
        assert_eq!(event.to_string(), "12.000034 EV_KEY (1) KEY_A (30) 1");
    }

    #[test]
    fn test_syn_helpers() {
        assert!(InputEvent::syn_report().is_syn_report());
        assert!(!InputEvent::syn_report().is_drop_signal());
        assert!(InputEvent::new(codes::EV_SYN, codes::SYN_DROPPED, 0).is_drop_signal());
    }

    #[test]
    fn test_timestamp() {
        let event = InputEvent::new(EV_KEY, KEY_A, 0).with_time(EventTime::new(2, 500_000));
        assert_eq!(
            event.timestamp(),
            UNIX_EPOCH + Duration::from_millis(2_500)
        );
        assert_eq!(EventTime::new(-5, 0).to_system_time(), UNIX_EPOCH);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_round_trip() {
        let event = InputEvent::new(EV_KEY, KEY_A, 1).with_time(EventTime::new(1, 2));
        let json = serde_json::to_string(&event).unwrap();
        let back: InputEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
