// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public configuration surface: master/outstation session options, the
//! per-point database configuration, and the defaults named in the
//! specification.
//!
//! Every struct here derives `Debug, Clone` and, behind the `serde` feature,
//! `Serialize`/`Deserialize`, so a caller's own file-format loader can
//! deserialize these directly. This crate does not parse any config file
//! format itself.

use std::time::Duration;

use crate::app::objects::EventClass;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A point's event class, where `None` means "static-only, never generates an event."
pub enum PointClass {
    None,
    Class1,
    Class2,
    Class3,
}

impl PointClass {
    #[must_use]
    pub fn event_class(self) -> Option<EventClass> {
        match self {
            Self::None => None,
            Self::Class1 => Some(EventClass::Class1),
            Self::Class2 => Some(EventClass::Class2),
            Self::Class3 => Some(EventClass::Class3),
        }
    }
}

/// Which classes an unsolicited response, or a class scan, should draw from.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassMask {
    pub class1: bool,
    pub class2: bool,
    pub class3: bool,
}

impl ClassMask {
    #[must_use]
    pub fn all() -> Self {
        Self {
            class1: true,
            class2: true,
            class3: true,
        }
    }

    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        !(self.class1 || self.class2 || self.class3)
    }

    #[must_use]
    pub fn contains(self, class: EventClass) -> bool {
        match class {
            EventClass::Class1 => self.class1,
            EventClass::Class2 => self.class2,
            EventClass::Class3 => self.class3,
        }
    }
}

/// How an `apply` batch decides whether an updated point generates an event.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventMode {
    /// Generate an event only if the value changed (and, for numerics,
    /// crossed the configured deadband); always update the static value.
    #[default]
    Detect,
    /// Generate an event unconditionally, regardless of deadband or change.
    Force,
    /// Update the static value only; never generate an event.
    Suppress,
}

// --- Static/event variation selectors --------------------------------------
//
// These pick the wire (group, variation) a point's static value or event
// record is encoded as. `default()` gives the most commonly interoperable
// variation for level-2 conformance.

macro_rules! variation_enum {
    ($name:ident, $group:expr, { $($variant:ident => $v:expr),+ $(,)? }) => {
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            #[must_use]
            pub fn group(self) -> u8 {
                $group
            }

            #[must_use]
            pub fn variation(self) -> u8 {
                match self {
                    $(Self::$variant => $v),+
                }
            }
        }
    };
}

variation_enum!(BinaryStaticVariation, 1, { Group1Var1 => 1, Group1Var2 => 2 });
variation_enum!(BinaryEventVariation, 2, { Group2Var1 => 1, Group2Var2 => 2, Group2Var3 => 3 });
variation_enum!(DoubleBitStaticVariation, 3, { Group3Var1 => 1, Group3Var2 => 2 });
variation_enum!(DoubleBitEventVariation, 4, { Group4Var1 => 1, Group4Var2 => 2, Group4Var3 => 3 });
variation_enum!(BinaryOutputStatusVariation, 10, { Group10Var2 => 2 });
variation_enum!(BinaryOutputEventVariation, 11, { Group11Var1 => 1, Group11Var2 => 2 });
variation_enum!(CounterStaticVariation, 20, {
    Group20Var1 => 1, Group20Var2 => 2, Group20Var5 => 5, Group20Var6 => 6,
});
variation_enum!(CounterEventVariation, 22, {
    Group22Var1 => 1, Group22Var2 => 2, Group22Var5 => 5, Group22Var6 => 6,
});
variation_enum!(FrozenCounterStaticVariation, 21, { Group21Var1 => 1, Group21Var2 => 2 });
variation_enum!(FrozenCounterEventVariation, 23, {
    Group23Var1 => 1, Group23Var2 => 2, Group23Var5 => 5, Group23Var6 => 6,
});
variation_enum!(AnalogStaticVariation, 30, {
    Group30Var1 => 1, Group30Var2 => 2, Group30Var3 => 3, Group30Var4 => 4,
    Group30Var5 => 5, Group30Var6 => 6,
});
variation_enum!(AnalogEventVariation, 32, {
    Group32Var1 => 1, Group32Var2 => 2, Group32Var3 => 3, Group32Var4 => 4,
    Group32Var5 => 5, Group32Var6 => 6, Group32Var7 => 7, Group32Var8 => 8,
});
variation_enum!(AnalogOutputStatusVariation, 40, {
    Group40Var1 => 1, Group40Var2 => 2, Group40Var3 => 3, Group40Var4 => 4,
});
variation_enum!(AnalogOutputEventVariation, 42, {
    Group42Var1 => 1, Group42Var2 => 2, Group42Var3 => 3, Group42Var4 => 4,
    Group42Var5 => 5, Group42Var6 => 6, Group42Var7 => 7, Group42Var8 => 8,
});

impl Default for BinaryStaticVariation {
    fn default() -> Self {
        Self::Group1Var2
    }
}
impl Default for BinaryEventVariation {
    fn default() -> Self {
        Self::Group2Var1
    }
}
impl Default for DoubleBitStaticVariation {
    fn default() -> Self {
        Self::Group3Var2
    }
}
impl Default for DoubleBitEventVariation {
    fn default() -> Self {
        Self::Group4Var1
    }
}
impl Default for BinaryOutputStatusVariation {
    fn default() -> Self {
        Self::Group10Var2
    }
}
impl Default for BinaryOutputEventVariation {
    fn default() -> Self {
        Self::Group11Var1
    }
}
impl Default for CounterStaticVariation {
    fn default() -> Self {
        Self::Group20Var1
    }
}
impl Default for CounterEventVariation {
    fn default() -> Self {
        Self::Group22Var1
    }
}
impl Default for FrozenCounterStaticVariation {
    fn default() -> Self {
        Self::Group21Var1
    }
}
impl Default for FrozenCounterEventVariation {
    fn default() -> Self {
        Self::Group23Var1
    }
}
impl Default for AnalogStaticVariation {
    fn default() -> Self {
        Self::Group30Var5
    }
}
impl Default for AnalogEventVariation {
    fn default() -> Self {
        Self::Group32Var5
    }
}
impl Default for AnalogOutputStatusVariation {
    fn default() -> Self {
        Self::Group40Var3
    }
}
impl Default for AnalogOutputEventVariation {
    fn default() -> Self {
        Self::Group42Var3
    }
}

/// Per-point configuration shared by the binary/double-bit/output-status
/// families (no deadband: these are discrete, not numeric).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct DiscretePointConfig<S, E> {
    pub static_variation: S,
    pub event_variation: E,
    pub class: PointClass,
}

impl<S: Default, E: Default> Default for DiscretePointConfig<S, E> {
    fn default() -> Self {
        Self {
            static_variation: S::default(),
            event_variation: E::default(),
            class: PointClass::Class1,
        }
    }
}

pub type BinaryPointConfig = DiscretePointConfig<BinaryStaticVariation, BinaryEventVariation>;
pub type DoubleBitPointConfig = DiscretePointConfig<DoubleBitStaticVariation, DoubleBitEventVariation>;
pub type BinaryOutputPointConfig = DiscretePointConfig<BinaryOutputStatusVariation, BinaryOutputEventVariation>;

/// Per-point configuration for numeric families (counter/analog): carries a
/// deadband used for [`EventMode::Detect`] comparisons.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct NumericPointConfig<S, E> {
    pub static_variation: S,
    pub event_variation: E,
    pub class: PointClass,
    pub deadband: f64,
}

impl<S: Default, E: Default> Default for NumericPointConfig<S, E> {
    fn default() -> Self {
        Self {
            static_variation: S::default(),
            event_variation: E::default(),
            class: PointClass::Class1,
            deadband: 0.0,
        }
    }
}

pub type CounterPointConfig = NumericPointConfig<CounterStaticVariation, CounterEventVariation>;
pub type FrozenCounterPointConfig = NumericPointConfig<FrozenCounterStaticVariation, FrozenCounterEventVariation>;
pub type AnalogPointConfig = NumericPointConfig<AnalogStaticVariation, AnalogEventVariation>;
pub type AnalogOutputPointConfig = NumericPointConfig<AnalogOutputStatusVariation, AnalogOutputEventVariation>;

/// Capacity of each per-type, per-class event FIFO.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct EventBufferConfig {
    pub max_binary_events: usize,
    pub max_double_bit_events: usize,
    pub max_binary_output_events: usize,
    pub max_counter_events: usize,
    pub max_frozen_counter_events: usize,
    pub max_analog_events: usize,
    pub max_analog_output_events: usize,
}

impl Default for EventBufferConfig {
    fn default() -> Self {
        Self {
            max_binary_events: 100,
            max_double_bit_events: 100,
            max_binary_output_events: 100,
            max_counter_events: 100,
            max_frozen_counter_events: 100,
            max_analog_events: 100,
            max_analog_output_events: 100,
        }
    }
}

/// Hard cap on concurrent sessions per channel (resource bounding; §9 Open Question).
pub const MAX_SESSIONS_PER_CHANNEL: usize = 32;

/// Narrowest per-fragment size a peer is allowed to negotiate down to.
pub const MIN_FRAG_SIZE: usize = 249;
pub const DEFAULT_FRAG_SIZE: usize = 2048;

/// Outstation-side session configuration.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct OutstationConfig {
    pub local_address: u16,
    pub remote_address: u16,
    pub event_buffers: EventBufferConfig,
    pub allow_unsolicited: bool,
    pub unsol_class_mask: ClassMask,
    pub unsol_confirm_timeout: Duration,
    pub unsol_retry_delay: Duration,
    pub select_timeout: Duration,
    pub max_controls_per_request: usize,
    pub local_control: bool,
    pub device_trouble: bool,
    pub max_rx_frag_size: usize,
    pub max_tx_frag_size: usize,
}

impl Default for OutstationConfig {
    fn default() -> Self {
        Self {
            local_address: 1024,
            remote_address: 1,
            event_buffers: EventBufferConfig::default(),
            allow_unsolicited: true,
            unsol_class_mask: ClassMask::all(),
            unsol_confirm_timeout: Duration::from_secs(5),
            unsol_retry_delay: Duration::from_secs(2),
            select_timeout: Duration::from_secs(10),
            max_controls_per_request: 16,
            local_control: false,
            device_trouble: false,
            max_rx_frag_size: DEFAULT_FRAG_SIZE,
            max_tx_frag_size: DEFAULT_FRAG_SIZE,
        }
    }
}

/// Master-side session configuration.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct MasterConfig {
    pub local_address: u16,
    pub remote_address: u16,
    pub response_timeout: Duration,
    pub task_retry_period: Duration,
    pub task_start_timeout: Duration,
    pub max_task_retries: u32,
    pub disable_unsol_on_startup: bool,
    pub ignore_restart_iin: bool,
    pub unsol_class_mask: ClassMask,
    pub startup_integrity_scan: bool,
    pub integrity_period: Option<Duration>,
    pub max_rx_frag_size: usize,
    pub max_tx_frag_size: usize,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            local_address: 1,
            remote_address: 1024,
            response_timeout: Duration::from_secs(5),
            task_retry_period: Duration::from_secs(5),
            task_start_timeout: Duration::from_secs(10),
            max_task_retries: 2,
            disable_unsol_on_startup: true,
            ignore_restart_iin: false,
            unsol_class_mask: ClassMask::all(),
            startup_integrity_scan: true,
            integrity_period: None,
            max_rx_frag_size: DEFAULT_FRAG_SIZE,
            max_tx_frag_size: DEFAULT_FRAG_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_mask_all_contains_every_class() {
        let mask = ClassMask::all();
        assert!(mask.contains(EventClass::Class1));
        assert!(mask.contains(EventClass::Class2));
        assert!(mask.contains(EventClass::Class3));
        assert!(!mask.is_empty());
    }

    #[test]
    fn class_mask_none_is_empty() {
        assert!(ClassMask::none().is_empty());
    }

    #[test]
    fn default_variations_match_level2_conformance() {
        assert_eq!(AnalogStaticVariation::default().variation(), 5);
        assert_eq!(BinaryStaticVariation::default().group(), 1);
    }

    #[test]
    fn point_class_maps_to_event_class() {
        assert_eq!(PointClass::None.event_class(), None);
        assert_eq!(PointClass::Class2.event_class(), Some(EventClass::Class2));
    }
}
