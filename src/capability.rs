//! Capability bitmap, axis calibration and device identity.
//!
//! A [`Capabilities`] value records which event types and codes a device
//! supports and which input properties it advertises. The codes of a type are
//! a [`TypeCodes`] variant chosen by the type: absolute axes carry an
//! [`AbsInfo`] per code, every other type is a plain code set.
//!
//! The `EV_SYN` pseudo-type is structural. It can be "enabled" (a no-op) but
//! is never reported by any query.

use crate::codes::{self, EV_ABS, EV_SYN, INPUT_PROP_CNT};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Calibration of one absolute axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AbsInfo {
    /// Last reported value.
    pub value: i32,
    /// Minimum value.
    pub minimum: i32,
    /// Maximum value.
    pub maximum: i32,
    /// Noise threshold; changes smaller than this are filtered.
    pub fuzz: i32,
    /// Dead zone around the center.
    pub flat: i32,
    /// Units per millimeter (or per radian for rotational axes).
    pub resolution: i32,
}

impl AbsInfo {
    /// Calibration with a zero current value.
    pub fn new(minimum: i32, maximum: i32, fuzz: i32, flat: i32, resolution: i32) -> Self {
        Self {
            value: 0,
            minimum,
            maximum,
            fuzz,
            flat,
            resolution,
        }
    }
}

/// Identity metadata of a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceIdentity {
    /// Human readable device name.
    pub name: String,
    /// Bus type (`BUS_USB`, `BUS_VIRTUAL`, ...).
    pub bustype: u16,
    /// Vendor id.
    pub vendor: u16,
    /// Product id.
    pub product: u16,
    /// Version number.
    pub version: u16,
    /// Physical path, empty if the kernel reports none.
    pub phys: String,
    /// Unique identifier, empty if the kernel reports none.
    pub uniq: String,
}

/// One supported code and, for absolute axes, its calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CodeCapability {
    /// Event code.
    pub code: u16,
    /// Axis calibration; present only for `EV_ABS` codes.
    pub abs_info: Option<AbsInfo>,
}

/// All supported codes of one event type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TypeCapability {
    /// Event type.
    pub event_type: u16,
    /// Supported codes, ascending.
    pub codes: Vec<CodeCapability>,
}

/// Codes enabled for one event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeCodes {
    /// Absolute axes with their calibration.
    Abs(BTreeMap<u16, AbsInfo>),
    /// Any other type: a plain code set.
    Plain(BTreeSet<u16>),
}

impl TypeCodes {
    fn for_type(event_type: u16) -> Self {
        match event_type {
            EV_ABS => TypeCodes::Abs(BTreeMap::new()),
            _ => TypeCodes::Plain(BTreeSet::new()),
        }
    }

    /// Whether `code` is enabled.
    pub fn contains(&self, code: u16) -> bool {
        match self {
            TypeCodes::Abs(axes) => axes.contains_key(&code),
            TypeCodes::Plain(set) => set.contains(&code),
        }
    }

    /// Number of enabled codes.
    pub fn len(&self) -> usize {
        match self {
            TypeCodes::Abs(axes) => axes.len(),
            TypeCodes::Plain(set) => set.len(),
        }
    }

    /// Whether no code is enabled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enabled codes, ascending, with calibration for absolute axes.
    pub fn iter(&self) -> Box<dyn Iterator<Item = CodeCapability> + '_> {
        match self {
            TypeCodes::Abs(axes) => Box::new(axes.iter().map(|(&code, &info)| CodeCapability {
                code,
                abs_info: Some(info),
            })),
            TypeCodes::Plain(set) => Box::new(set.iter().map(|&code| CodeCapability {
                code,
                abs_info: None,
            })),
        }
    }

    fn insert(&mut self, code: u16, abs_info: Option<AbsInfo>) {
        match self {
            TypeCodes::Abs(axes) => {
                axes.insert(code, abs_info.unwrap_or_default());
            }
            TypeCodes::Plain(set) => {
                set.insert(code);
            }
        }
    }

    fn remove(&mut self, code: u16) {
        match self {
            TypeCodes::Abs(axes) => {
                axes.remove(&code);
            }
            TypeCodes::Plain(set) => {
                set.remove(&code);
            }
        }
    }
}

/// Capability bitmap of a device: types, codes and input properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    types: BTreeMap<u16, TypeCodes>,
    properties: BTreeSet<u16>,
}

fn check_type(event_type: u16) -> Result<()> {
    if codes::type_info(event_type).is_some() {
        Ok(())
    } else {
        Err(Error::CapabilityRange {
            kind: "type",
            value: event_type,
        })
    }
}

fn check_code(event_type: u16, code: u16) -> Result<()> {
    check_type(event_type)?;
    if usize::from(code) < codes::max_codes(event_type) {
        Ok(())
    } else {
        Err(Error::CapabilityRange {
            kind: "code",
            value: code,
        })
    }
}

fn check_property(property: u16) -> Result<()> {
    if property < INPUT_PROP_CNT {
        Ok(())
    } else {
        Err(Error::CapabilityRange {
            kind: "property",
            value: property,
        })
    }
}

impl Capabilities {
    /// An empty bitmap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the device supports `event_type`.
    ///
    /// A type counts only once at least one of its codes is enabled, except
    /// for types that have no codes at all (`EV_PWR`).
    pub fn has_type(&self, event_type: u16) -> bool {
        if event_type == EV_SYN {
            return false;
        }
        self.types.get(&event_type).is_some_and(|codes| {
            !codes.is_empty() || codes::max_codes(event_type) == 0
        })
    }

    /// Whether the device supports `code` of `event_type`.
    pub fn has_code(&self, event_type: u16, code: u16) -> bool {
        event_type != EV_SYN
            && self
                .types
                .get(&event_type)
                .is_some_and(|codes| codes.contains(code))
    }

    /// Whether the device advertises input property `property`.
    pub fn has_property(&self, property: u16) -> bool {
        self.properties.contains(&property)
    }

    /// Calibration of absolute axis `code`, if enabled.
    pub fn abs_info(&self, code: u16) -> Option<AbsInfo> {
        match self.types.get(&EV_ABS)? {
            TypeCodes::Abs(axes) => axes.get(&code).copied(),
            TypeCodes::Plain(_) => None,
        }
    }

    /// Supported types with their codes, ascending, `EV_SYN` excluded.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &TypeCodes)> {
        self.types
            .iter()
            .filter(|&(&event_type, _)| self.has_type(event_type))
            .map(|(&event_type, codes)| (event_type, codes))
    }

    /// Enabled input properties, ascending.
    pub fn properties(&self) -> impl Iterator<Item = u16> + '_ {
        self.properties.iter().copied()
    }

    /// Owned snapshot for enumeration.
    pub fn snapshot(&self) -> Vec<TypeCapability> {
        self.iter()
            .map(|(event_type, codes)| TypeCapability {
                event_type,
                codes: codes.iter().collect(),
            })
            .collect()
    }

    /// Whether nothing at all is enabled.
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none() && self.properties.is_empty()
    }

    /// Enable an event type. Enabling `EV_SYN` is accepted and ignored.
    pub fn enable_type(&mut self, event_type: u16) -> Result<()> {
        check_type(event_type)?;
        if event_type != EV_SYN {
            self.types
                .entry(event_type)
                .or_insert_with(|| TypeCodes::for_type(event_type));
        }
        Ok(())
    }

    /// Disable an event type and all of its codes.
    pub fn disable_type(&mut self, event_type: u16) -> Result<()> {
        check_type(event_type)?;
        self.types.remove(&event_type);
        Ok(())
    }

    /// Enable a code, enabling its type as well.
    ///
    /// `abs_info` is the calibration for `EV_ABS` codes and defaults to all
    /// zeroes. It is ignored for other types. Re-enabling an axis replaces
    /// its calibration.
    pub fn enable_code(
        &mut self,
        event_type: u16,
        code: u16,
        abs_info: Option<AbsInfo>,
    ) -> Result<()> {
        check_code(event_type, code)?;
        if event_type == EV_SYN {
            return Ok(());
        }
        self.types
            .entry(event_type)
            .or_insert_with(|| TypeCodes::for_type(event_type))
            .insert(code, abs_info);
        Ok(())
    }

    /// Disable a code. The type goes with its last code.
    pub fn disable_code(&mut self, event_type: u16, code: u16) -> Result<()> {
        check_code(event_type, code)?;
        if let Some(codes) = self.types.get_mut(&event_type) {
            codes.remove(code);
            if codes.is_empty() {
                self.types.remove(&event_type);
            }
        }
        Ok(())
    }

    /// Enable an input property.
    pub fn enable_property(&mut self, property: u16) -> Result<()> {
        check_property(property)?;
        self.properties.insert(property);
        Ok(())
    }

    /// Disable an input property.
    pub fn disable_property(&mut self, property: u16) -> Result<()> {
        check_property(property)?;
        self.properties.remove(&property);
        Ok(())
    }
}
