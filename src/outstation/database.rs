// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Current static point values plus the atomic `apply` batch that updates
//! them and feeds the event buffers.
//!
//! Points are dense-indexed per type, configured once at construction from
//! an [`OutstationConfig`]-adjacent per-point table; `apply` is the single
//! path by which the static values and event buffers change, keeping the
//! "no response reflects a partial batch" invariant trivial: the whole
//! batch runs to completion before anything downstream (the session) can
//! observe it, since the session worker only calls `apply` between
//! message-handling steps.

use std::collections::BTreeMap;

use crate::app::codec::variation_needs_time;
use crate::app::objects::{
    AnalogPoint, AnalogValue, BinaryValue, CounterValue, DoubleBitState, DoubleBitValue, EventClass,
    EventRecord, Flags, Timestamp,
};
use crate::app::ObjectValue;
use crate::config::{
    AnalogOutputPointConfig, AnalogPointConfig, BinaryOutputPointConfig, BinaryPointConfig,
    CounterPointConfig, DoubleBitPointConfig, EventMode, FrozenCounterPointConfig,
};

use super::events::{EventBuffers, PointType, StoredEvent};

/// One point's current static value plus the variation config it was built with.
#[derive(Debug, Clone, Copy)]
struct BinaryPoint {
    config: BinaryPointConfig,
    value: bool,
    flags: Flags,
}

#[derive(Debug, Clone, Copy)]
struct DoubleBitPoint {
    config: DoubleBitPointConfig,
    state: DoubleBitState,
    flags: Flags,
}

#[derive(Debug, Clone, Copy)]
struct BinaryOutputPoint {
    config: BinaryOutputPointConfig,
    value: bool,
    flags: Flags,
}

#[derive(Debug, Clone, Copy)]
struct CounterPoint {
    config: CounterPointConfig,
    value: u32,
    flags: Flags,
    /// Value as of the last emitted event; the deadband baseline.
    last_reported: f64,
}

#[derive(Debug, Clone, Copy)]
struct FrozenCounterPoint {
    config: FrozenCounterPointConfig,
    value: u32,
    flags: Flags,
    last_reported: f64,
}

#[derive(Debug, Clone, Copy)]
struct AnalogPointEntry {
    config: AnalogPointConfig,
    value: AnalogValue,
    flags: Flags,
    last_reported: f64,
}

#[derive(Debug, Clone, Copy)]
struct AnalogOutputPoint {
    config: AnalogOutputPointConfig,
    value: AnalogValue,
    flags: Flags,
    last_reported: f64,
}

/// Current values for every configured point, by type and dense index.
#[derive(Debug, Default)]
pub struct Database {
    binary: BTreeMap<u32, BinaryPoint>,
    double_bit: BTreeMap<u32, DoubleBitPoint>,
    binary_output: BTreeMap<u32, BinaryOutputPoint>,
    counter: BTreeMap<u32, CounterPoint>,
    frozen_counter: BTreeMap<u32, FrozenCounterPoint>,
    analog: BTreeMap<u32, AnalogPointEntry>,
    analog_output: BTreeMap<u32, AnalogOutputPoint>,
}

impl Database {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binary(&mut self, index: u32, config: BinaryPointConfig) {
        self.binary.insert(index, BinaryPoint { config, value: false, flags: Flags::default() });
    }

    pub fn add_double_bit(&mut self, index: u32, config: DoubleBitPointConfig) {
        self.double_bit.insert(
            index,
            DoubleBitPoint { config, state: DoubleBitState::Indeterminate, flags: Flags::default() },
        );
    }

    pub fn add_binary_output(&mut self, index: u32, config: BinaryOutputPointConfig) {
        self.binary_output
            .insert(index, BinaryOutputPoint { config, value: false, flags: Flags::default() });
    }

    pub fn add_counter(&mut self, index: u32, config: CounterPointConfig) {
        self.counter.insert(index, CounterPoint { config, value: 0, flags: Flags::default(), last_reported: 0.0 });
    }

    pub fn add_frozen_counter(&mut self, index: u32, config: FrozenCounterPointConfig) {
        self.frozen_counter.insert(
            index,
            FrozenCounterPoint { config, value: 0, flags: Flags::default(), last_reported: 0.0 },
        );
    }

    pub fn add_analog(&mut self, index: u32, config: AnalogPointConfig) {
        self.analog.insert(
            index,
            AnalogPointEntry { config, value: AnalogValue::F64(0.0), flags: Flags::default(), last_reported: 0.0 },
        );
    }

    pub fn add_analog_output(&mut self, index: u32, config: AnalogOutputPointConfig) {
        self.analog_output.insert(
            index,
            AnalogOutputPoint { config, value: AnalogValue::F64(0.0), flags: Flags::default(), last_reported: 0.0 },
        );
    }

    #[must_use]
    pub fn binary_range(&self) -> (u32, u32) {
        index_range(self.binary.keys().copied())
    }

    #[must_use]
    pub fn double_bit_range(&self) -> (u32, u32) {
        index_range(self.double_bit.keys().copied())
    }

    #[must_use]
    pub fn binary_output_range(&self) -> (u32, u32) {
        index_range(self.binary_output.keys().copied())
    }

    #[must_use]
    pub fn counter_range(&self) -> (u32, u32) {
        index_range(self.counter.keys().copied())
    }

    #[must_use]
    pub fn frozen_counter_range(&self) -> (u32, u32) {
        index_range(self.frozen_counter.keys().copied())
    }

    #[must_use]
    pub fn analog_range(&self) -> (u32, u32) {
        index_range(self.analog.keys().copied())
    }

    #[must_use]
    pub fn analog_output_range(&self) -> (u32, u32) {
        index_range(self.analog_output.keys().copied())
    }

    /// Class-0 static snapshot for a binary range, in the point's configured
    /// static variation's wire shape.
    #[must_use]
    pub fn binary_static(&self, index: u32) -> Option<ObjectValue> {
        self.binary.get(&index).map(|p| ObjectValue::Binary(BinaryValue { value: p.value, flags: p.flags }))
    }

    #[must_use]
    pub fn double_bit_static(&self, index: u32) -> Option<ObjectValue> {
        self.double_bit
            .get(&index)
            .map(|p| ObjectValue::DoubleBit(DoubleBitValue { state: p.state, flags: p.flags }))
    }

    #[must_use]
    pub fn binary_output_static(&self, index: u32) -> Option<ObjectValue> {
        self.binary_output
            .get(&index)
            .map(|p| ObjectValue::BinaryOutputStatus(BinaryValue { value: p.value, flags: p.flags }))
    }

    #[must_use]
    pub fn counter_static(&self, index: u32) -> Option<ObjectValue> {
        self.counter
            .get(&index)
            .map(|p| ObjectValue::Counter(CounterValue { value: p.value, flags: p.flags }))
    }

    #[must_use]
    pub fn frozen_counter_static(&self, index: u32) -> Option<ObjectValue> {
        self.frozen_counter
            .get(&index)
            .map(|p| ObjectValue::FrozenCounter(CounterValue { value: p.value, flags: p.flags }))
    }

    #[must_use]
    pub fn analog_static(&self, index: u32) -> Option<ObjectValue> {
        self.analog.get(&index).map(|p| ObjectValue::Analog(AnalogPoint { value: p.value, flags: p.flags }))
    }

    #[must_use]
    pub fn analog_output_static(&self, index: u32) -> Option<ObjectValue> {
        self.analog_output
            .get(&index)
            .map(|p| ObjectValue::AnalogOutputStatus(AnalogPoint { value: p.value, flags: p.flags }))
    }

    /// All binary points in index order, as `(start, stop, values)`, along
    /// with the static variation this core's single-variation-per-type
    /// configuration uses for the whole range. `None` if no points configured.
    #[must_use]
    pub fn binary_snapshot(&self) -> Option<(u32, u32, crate::config::BinaryStaticVariation, Vec<ObjectValue>)> {
        snapshot(&self.binary, |p| p.config.static_variation, |p| {
            ObjectValue::Binary(BinaryValue { value: p.value, flags: p.flags })
        })
    }

    #[must_use]
    pub fn double_bit_snapshot(&self) -> Option<(u32, u32, crate::config::DoubleBitStaticVariation, Vec<ObjectValue>)> {
        snapshot(&self.double_bit, |p| p.config.static_variation, |p| {
            ObjectValue::DoubleBit(DoubleBitValue { state: p.state, flags: p.flags })
        })
    }

    #[must_use]
    pub fn binary_output_snapshot(
        &self,
    ) -> Option<(u32, u32, crate::config::BinaryOutputStatusVariation, Vec<ObjectValue>)> {
        snapshot(&self.binary_output, |p| p.config.static_variation, |p| {
            ObjectValue::BinaryOutputStatus(BinaryValue { value: p.value, flags: p.flags })
        })
    }

    #[must_use]
    pub fn counter_snapshot(&self) -> Option<(u32, u32, crate::config::CounterStaticVariation, Vec<ObjectValue>)> {
        snapshot(&self.counter, |p| p.config.static_variation, |p| {
            ObjectValue::Counter(CounterValue { value: p.value, flags: p.flags })
        })
    }

    #[must_use]
    pub fn frozen_counter_snapshot(
        &self,
    ) -> Option<(u32, u32, crate::config::FrozenCounterStaticVariation, Vec<ObjectValue>)> {
        snapshot(&self.frozen_counter, |p| p.config.static_variation, |p| {
            ObjectValue::FrozenCounter(CounterValue { value: p.value, flags: p.flags })
        })
    }

    #[must_use]
    pub fn analog_snapshot(&self) -> Option<(u32, u32, crate::config::AnalogStaticVariation, Vec<ObjectValue>)> {
        snapshot(&self.analog, |p| p.config.static_variation, |p| {
            ObjectValue::Analog(AnalogPoint { value: p.value, flags: p.flags })
        })
    }

    #[must_use]
    pub fn analog_output_snapshot(
        &self,
    ) -> Option<(u32, u32, crate::config::AnalogOutputStatusVariation, Vec<ObjectValue>)> {
        snapshot(&self.analog_output, |p| p.config.static_variation, |p| {
            ObjectValue::AnalogOutputStatus(AnalogPoint { value: p.value, flags: p.flags })
        })
    }

    /// Apply a batch of updates atomically, pushing generated events into `events`.
    pub fn apply(&mut self, updates: Updates, events: &mut EventBuffers, now: Timestamp) {
        for update in updates.0 {
            self.apply_one(update, events, now);
        }
    }

    fn apply_one(&mut self, update: PointUpdate, events: &mut EventBuffers, now: Timestamp) {
        match update {
            PointUpdate::Binary { index, value, flags, mode } => {
                if let Some(point) = self.binary.get_mut(&index) {
                    let changed = point.value != value || point.flags != flags;
                    point.value = value;
                    point.flags = flags;
                    if should_emit(mode, changed) {
                        if let Some(class) = point.config.class.event_class() {
                            let variation = point.config.event_variation;
                            push_event(
                                events,
                                PointType::Binary,
                                class,
                                variation.group(),
                                variation.variation(),
                                ObjectValue::BinaryEvent(EventRecord {
                                    index,
                                    value: BinaryValue { value, flags },
                                    time: event_time(variation.variation(), now),
                                }),
                            );
                        }
                    }
                }
            }
            PointUpdate::DoubleBit { index, state, flags, mode } => {
                if let Some(point) = self.double_bit.get_mut(&index) {
                    let changed = point.state != state || point.flags != flags;
                    point.state = state;
                    point.flags = flags;
                    if should_emit(mode, changed) {
                        if let Some(class) = point.config.class.event_class() {
                            let variation = point.config.event_variation;
                            push_event(
                                events,
                                PointType::DoubleBit,
                                class,
                                variation.group(),
                                variation.variation(),
                                ObjectValue::DoubleBitEvent(EventRecord {
                                    index,
                                    value: DoubleBitValue { state, flags },
                                    time: event_time(variation.variation(), now),
                                }),
                            );
                        }
                    }
                }
            }
            PointUpdate::BinaryOutputStatus { index, value, flags, mode } => {
                if let Some(point) = self.binary_output.get_mut(&index) {
                    let changed = point.value != value || point.flags != flags;
                    point.value = value;
                    point.flags = flags;
                    if should_emit(mode, changed) {
                        if let Some(class) = point.config.class.event_class() {
                            let variation = point.config.event_variation;
                            push_event(
                                events,
                                PointType::BinaryOutputStatus,
                                class,
                                variation.group(),
                                variation.variation(),
                                ObjectValue::BinaryOutputEvent(EventRecord {
                                    index,
                                    value: BinaryValue { value, flags },
                                    time: event_time(variation.variation(), now),
                                }),
                            );
                        }
                    }
                }
            }
            PointUpdate::Counter { index, value, flags, mode } => {
                if let Some(point) = self.counter.get_mut(&index) {
                    let new = f64::from(value);
                    let changed = numeric_changed(mode, point.last_reported, new, point.config.deadband);
                    point.value = value;
                    point.flags = flags;
                    if should_emit(mode, changed) {
                        point.last_reported = new;
                        if let Some(class) = point.config.class.event_class() {
                            let variation = point.config.event_variation;
                            push_event(
                                events,
                                PointType::Counter,
                                class,
                                variation.group(),
                                variation.variation(),
                                ObjectValue::CounterEvent(EventRecord {
                                    index,
                                    value: CounterValue { value, flags },
                                    time: event_time(variation.variation(), now),
                                }),
                            );
                        }
                    }
                }
            }
            PointUpdate::FrozenCounter { index, value, flags, mode } => {
                if let Some(point) = self.frozen_counter.get_mut(&index) {
                    let new = f64::from(value);
                    let changed = numeric_changed(mode, point.last_reported, new, point.config.deadband);
                    point.value = value;
                    point.flags = flags;
                    if should_emit(mode, changed) {
                        point.last_reported = new;
                        if let Some(class) = point.config.class.event_class() {
                            let variation = point.config.event_variation;
                            push_event(
                                events,
                                PointType::FrozenCounter,
                                class,
                                variation.group(),
                                variation.variation(),
                                ObjectValue::FrozenCounterEvent(EventRecord {
                                    index,
                                    value: CounterValue { value, flags },
                                    time: event_time(variation.variation(), now),
                                }),
                            );
                        }
                    }
                }
            }
            PointUpdate::Analog { index, value, flags, mode } => {
                if let Some(point) = self.analog.get_mut(&index) {
                    let new = value.as_f64();
                    let changed = numeric_changed(mode, point.last_reported, new, point.config.deadband);
                    point.value = value;
                    point.flags = flags;
                    if should_emit(mode, changed) {
                        point.last_reported = new;
                        if let Some(class) = point.config.class.event_class() {
                            let variation = point.config.event_variation;
                            push_event(
                                events,
                                PointType::Analog,
                                class,
                                variation.group(),
                                variation.variation(),
                                ObjectValue::AnalogEvent(EventRecord {
                                    index,
                                    value: AnalogPoint { value, flags },
                                    time: event_time(variation.variation(), now),
                                }),
                            );
                        }
                    }
                }
            }
            PointUpdate::AnalogOutputStatus { index, value, flags, mode } => {
                if let Some(point) = self.analog_output.get_mut(&index) {
                    let new = value.as_f64();
                    let changed = numeric_changed(mode, point.last_reported, new, point.config.deadband);
                    point.value = value;
                    point.flags = flags;
                    if should_emit(mode, changed) {
                        point.last_reported = new;
                        if let Some(class) = point.config.class.event_class() {
                            let variation = point.config.event_variation;
                            push_event(
                                events,
                                PointType::AnalogOutputStatus,
                                class,
                                variation.group(),
                                variation.variation(),
                                ObjectValue::AnalogOutputEvent(EventRecord {
                                    index,
                                    value: AnalogPoint { value, flags },
                                    time: event_time(variation.variation(), now),
                                }),
                            );
                        }
                    }
                }
            }
        }
    }
}

fn should_emit(mode: EventMode, changed: bool) -> bool {
    match mode {
        EventMode::Detect => changed,
        EventMode::Force => true,
        EventMode::Suppress => false,
    }
}

/// NaN-aware deadband comparison against `old`, the value as of the last
/// *emitted* event (not the running static value) per spec.md §4.4: a
/// transition into or out of NaN always counts as changed (NaN has no
/// ordering against the deadband), matching the Detect-mode rule resolved
/// in the design notes.
fn numeric_changed(mode: EventMode, old: f64, new: f64, deadband: f64) -> bool {
    if mode != EventMode::Detect {
        return true;
    }
    if old.is_nan() != new.is_nan() {
        return true;
    }
    if old.is_nan() && new.is_nan() {
        return false;
    }
    (new - old).abs() > deadband
}

fn event_time(variation: u8, now: Timestamp) -> Option<Timestamp> {
    if variation_needs_time(variation) {
        Some(now)
    } else {
        None
    }
}

fn push_event(
    events: &mut EventBuffers,
    point_type: PointType,
    class: EventClass,
    group: u8,
    variation: u8,
    value: ObjectValue,
) {
    events.push(point_type, class, StoredEvent::new(group, variation, value));
}

/// Build `(start, stop, variation, values)` for an ordered point map,
/// reading every point's configured static variation from its first entry.
/// This core assumes all points of a given type share one static variation;
/// documented as a simplification in the design notes.
fn snapshot<P, V: Copy>(
    points: &BTreeMap<u32, P>,
    variation_of: impl Fn(&P) -> V,
    value_of: impl Fn(&P) -> ObjectValue,
) -> Option<(u32, u32, V, Vec<ObjectValue>)> {
    let first = points.values().next()?;
    let variation = variation_of(first);
    let (start, stop) = index_range(points.keys().copied());
    let values = points.values().map(&value_of).collect();
    Some((start, stop, variation, values))
}

fn index_range(indices: impl Iterator<Item = u32>) -> (u32, u32) {
    let (min, max) = indices.fold((u32::MAX, 0u32), |(min, max), i| (min.min(i), max.max(i)));
    if min > max {
        (0, 0)
    } else {
        (min, max)
    }
}

/// One point's new value plus how its `EventMode` should be applied.
#[derive(Debug, Clone, Copy)]
pub enum PointUpdate {
    Binary { index: u32, value: bool, flags: Flags, mode: EventMode },
    DoubleBit { index: u32, state: DoubleBitState, flags: Flags, mode: EventMode },
    BinaryOutputStatus { index: u32, value: bool, flags: Flags, mode: EventMode },
    Counter { index: u32, value: u32, flags: Flags, mode: EventMode },
    FrozenCounter { index: u32, value: u32, flags: Flags, mode: EventMode },
    Analog { index: u32, value: AnalogValue, flags: Flags, mode: EventMode },
    AnalogOutputStatus { index: u32, value: AnalogValue, flags: Flags, mode: EventMode },
}

/// A batch of point updates applied to a [`Database`] at a single logical instant.
#[derive(Debug, Clone, Default)]
pub struct Updates(Vec<PointUpdate>);

impl Updates {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, update: PointUpdate) -> &mut Self {
        self.0.push(update);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BinaryPointConfig, PointClass};

    fn binary_config(class: PointClass) -> BinaryPointConfig {
        BinaryPointConfig { class, ..BinaryPointConfig::default() }
    }

    #[test]
    fn detect_mode_emits_only_on_change() {
        let mut db = Database::new();
        db.add_binary(0, binary_config(PointClass::Class1));
        let mut events = EventBuffers::new(crate::config::EventBufferConfig::default());

        let mut updates = Updates::new();
        updates.update(PointUpdate::Binary {
            index: 0,
            value: true,
            flags: Flags::online(),
            mode: EventMode::Detect,
        });
        db.apply(updates, &mut events, Timestamp(0));
        assert!(events.type_has_class(PointType::Binary, EventClass::Class1));

        events.select_for_response(crate::config::ClassMask::all(), 1, 10);
        events.confirm(1);
        let mut no_change = Updates::new();
        no_change.update(PointUpdate::Binary {
            index: 0,
            value: true,
            flags: Flags::online(),
            mode: EventMode::Detect,
        });
        db.apply(no_change, &mut events, Timestamp(0));
        assert!(!events.type_has_class(PointType::Binary, EventClass::Class1));
    }

    #[test]
    fn force_mode_always_emits() {
        let mut db = Database::new();
        db.add_binary(0, binary_config(PointClass::Class1));
        let mut events = EventBuffers::new(crate::config::EventBufferConfig::default());

        for _ in 0..2 {
            let mut updates = Updates::new();
            updates.update(PointUpdate::Binary {
                index: 0,
                value: true,
                flags: Flags::online(),
                mode: EventMode::Force,
            });
            db.apply(updates, &mut events, Timestamp(0));
        }
        assert!(events.type_has_class(PointType::Binary, EventClass::Class1));
    }

    #[test]
    fn suppress_mode_updates_static_without_event() {
        let mut db = Database::new();
        db.add_binary(0, binary_config(PointClass::Class1));
        let mut events = EventBuffers::new(crate::config::EventBufferConfig::default());

        let mut updates = Updates::new();
        updates.update(PointUpdate::Binary {
            index: 0,
            value: true,
            flags: Flags::online(),
            mode: EventMode::Suppress,
        });
        db.apply(updates, &mut events, Timestamp(0));
        assert!(!events.type_has_class(PointType::Binary, EventClass::Class1));
        assert_eq!(db.binary_static(0), Some(ObjectValue::Binary(BinaryValue { value: true, flags: Flags::online() })));
    }

    #[test]
    fn analog_deadband_suppresses_small_changes() {
        let mut db = Database::new();
        let config = crate::config::AnalogPointConfig {
            deadband: 1.0,
            class: PointClass::Class2,
            ..crate::config::AnalogPointConfig::default()
        };
        db.add_analog(1, config);
        let mut events = EventBuffers::new(crate::config::EventBufferConfig::default());

        let mut first = Updates::new();
        first.update(PointUpdate::Analog {
            index: 1,
            value: AnalogValue::F64(20.0),
            flags: Flags::online(),
            mode: EventMode::Detect,
        });
        db.apply(first, &mut events, Timestamp(0));
        events.select_for_response(crate::config::ClassMask::all(), 1, 10);
        events.confirm(1);

        let mut small_change = Updates::new();
        small_change.update(PointUpdate::Analog {
            index: 1,
            value: AnalogValue::F64(20.5),
            flags: Flags::online(),
            mode: EventMode::Detect,
        });
        db.apply(small_change, &mut events, Timestamp(0));
        assert!(!events.type_has_class(PointType::Analog, EventClass::Class2));

        let mut big_change = Updates::new();
        big_change.update(PointUpdate::Analog {
            index: 1,
            value: AnalogValue::F64(21.5),
            flags: Flags::online(),
            mode: EventMode::Detect,
        });
        db.apply(big_change, &mut events, Timestamp(0));
        assert!(events.type_has_class(PointType::Analog, EventClass::Class2));
    }
}
