// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-(point type, event class) bounded event FIFOs.
//!
//! Each point type owns three ring buffers, one per [`EventClass`]. Pushing
//! past capacity drops the oldest entry and latches the overflow flag;
//! entries are removed only when the master's application confirm matches
//! the sequence they were sent under (see [`EventBuffers::confirm`]).

use std::collections::VecDeque;

use crate::app::objects::EventClass;
use crate::app::ObjectValue;
use crate::config::EventBufferConfig;

/// One buffered event: the point index it came from, the pre-shaped wire
/// object (already the correct group/variation/`EventRecord`), and whether
/// it has been included in a not-yet-confirmed response.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub group: u8,
    pub variation: u8,
    pub value: ObjectValue,
    pending_confirm: Option<u8>,
}

impl StoredEvent {
    #[must_use]
    pub fn new(group: u8, variation: u8, value: ObjectValue) -> Self {
        Self {
            group,
            variation,
            value,
            pending_confirm: None,
        }
    }
}

#[derive(Debug)]
struct TypeQueue {
    capacity: usize,
    class1: VecDeque<StoredEvent>,
    class2: VecDeque<StoredEvent>,
    class3: VecDeque<StoredEvent>,
}

impl TypeQueue {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            class1: VecDeque::new(),
            class2: VecDeque::new(),
            class3: VecDeque::new(),
        }
    }

    fn queue(&self, class: EventClass) -> &VecDeque<StoredEvent> {
        match class {
            EventClass::Class1 => &self.class1,
            EventClass::Class2 => &self.class2,
            EventClass::Class3 => &self.class3,
        }
    }

    fn queue_mut(&mut self, class: EventClass) -> &mut VecDeque<StoredEvent> {
        match class {
            EventClass::Class1 => &mut self.class1,
            EventClass::Class2 => &mut self.class2,
            EventClass::Class3 => &mut self.class3,
        }
    }

    /// Returns true if the oldest entry was dropped to make room (overflow).
    fn push(&mut self, class: EventClass, event: StoredEvent) -> bool {
        let capacity = self.capacity;
        let queue = self.queue_mut(class);
        let overflowed = if queue.len() >= capacity {
            queue.pop_front();
            true
        } else {
            false
        };
        queue.push_back(event);
        overflowed
    }

    fn has_room(&self) -> bool {
        self.class1.len() < self.capacity && self.class2.len() < self.capacity && self.class3.len() < self.capacity
    }
}

/// All seven point-type event queues for one outstation database.
#[derive(Debug)]
pub struct EventBuffers {
    binary: TypeQueue,
    double_bit: TypeQueue,
    binary_output: TypeQueue,
    counter: TypeQueue,
    frozen_counter: TypeQueue,
    analog: TypeQueue,
    analog_output: TypeQueue,
    overflow_latched: bool,
}

/// Which per-type queue an event belongs to; matches the seven point
/// families this core models (binary, double-bit, binary output status,
/// counter, frozen counter, analog, analog output status).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointType {
    Binary,
    DoubleBit,
    BinaryOutputStatus,
    Counter,
    FrozenCounter,
    Analog,
    AnalogOutputStatus,
}

/// Point types in the fixed order class reads interleave them in.
pub const POINT_TYPES: [PointType; 7] = [
    PointType::Binary,
    PointType::DoubleBit,
    PointType::BinaryOutputStatus,
    PointType::Counter,
    PointType::FrozenCounter,
    PointType::Analog,
    PointType::AnalogOutputStatus,
];

impl EventBuffers {
    #[must_use]
    pub fn new(config: EventBufferConfig) -> Self {
        Self {
            binary: TypeQueue::new(config.max_binary_events),
            double_bit: TypeQueue::new(config.max_double_bit_events),
            binary_output: TypeQueue::new(config.max_binary_output_events),
            counter: TypeQueue::new(config.max_counter_events),
            frozen_counter: TypeQueue::new(config.max_frozen_counter_events),
            analog: TypeQueue::new(config.max_analog_events),
            analog_output: TypeQueue::new(config.max_analog_output_events),
            overflow_latched: false,
        }
    }

    fn type_queue(&self, point_type: PointType) -> &TypeQueue {
        match point_type {
            PointType::Binary => &self.binary,
            PointType::DoubleBit => &self.double_bit,
            PointType::BinaryOutputStatus => &self.binary_output,
            PointType::Counter => &self.counter,
            PointType::FrozenCounter => &self.frozen_counter,
            PointType::Analog => &self.analog,
            PointType::AnalogOutputStatus => &self.analog_output,
        }
    }

    fn type_queue_mut(&mut self, point_type: PointType) -> &mut TypeQueue {
        match point_type {
            PointType::Binary => &mut self.binary,
            PointType::DoubleBit => &mut self.double_bit,
            PointType::BinaryOutputStatus => &mut self.binary_output,
            PointType::Counter => &mut self.counter,
            PointType::FrozenCounter => &mut self.frozen_counter,
            PointType::Analog => &mut self.analog,
            PointType::AnalogOutputStatus => &mut self.analog_output,
        }
    }

    /// Push a new event, latching overflow if it displaced an unconfirmed one.
    pub fn push(&mut self, point_type: PointType, class: EventClass, event: StoredEvent) {
        if self.type_queue_mut(point_type).push(class, event) {
            self.overflow_latched = true;
        }
    }

    /// Whether `class` has any buffered events of `point_type` (pending or not).
    #[must_use]
    pub fn type_has_class(&self, point_type: PointType, class: EventClass) -> bool {
        !self.type_queue(point_type).queue(class).is_empty()
    }

    /// Whether any type has an event in any of the classes `mask` selects.
    #[must_use]
    pub fn any_matching(&self, mask: crate::config::ClassMask) -> bool {
        for point_type in POINT_TYPES {
            for class in [EventClass::Class1, EventClass::Class2, EventClass::Class3] {
                if mask.contains(class) && self.type_has_class(point_type, class) {
                    return true;
                }
            }
        }
        false
    }

    #[must_use]
    pub fn event_buffer_overflow(&self) -> bool {
        self.overflow_latched
    }

    /// Clear the overflow latch once every queue has free capacity again.
    pub fn clear_overflow_if_room(&mut self) {
        if !self.overflow_latched {
            return;
        }
        let has_room = POINT_TYPES.iter().all(|&t| self.type_queue(t).has_room());
        if has_room {
            self.overflow_latched = false;
        }
    }

    /// Select up to `max_objects` not-yet-pending events matching `mask`,
    /// marking them pending-confirm under `seq`. Returns them grouped by
    /// point type in catalog order, preserving FIFO order within each type.
    pub fn select_for_response(
        &mut self,
        mask: crate::config::ClassMask,
        seq: u8,
        max_objects: usize,
    ) -> Vec<(PointType, Vec<StoredEvent>)> {
        let mut out = Vec::new();
        let mut remaining = max_objects;
        for point_type in POINT_TYPES {
            if remaining == 0 {
                break;
            }
            let queue = self.type_queue_mut(point_type);
            let mut selected = Vec::new();
            for class in [EventClass::Class1, EventClass::Class2, EventClass::Class3] {
                if remaining == 0 || !mask.contains(class) {
                    continue;
                }
                for event in queue.queue_mut(class).iter_mut() {
                    if remaining == 0 {
                        break;
                    }
                    if event.pending_confirm.is_some() {
                        continue;
                    }
                    event.pending_confirm = Some(seq);
                    selected.push(event.clone());
                    remaining -= 1;
                }
            }
            if !selected.is_empty() {
                out.push((point_type, selected));
            }
        }
        out
    }

    /// Remove every event pending confirm under `seq` (the master's CONFIRM matched).
    pub fn confirm(&mut self, seq: u8) {
        for point_type in POINT_TYPES {
            let queue = self.type_queue_mut(point_type);
            for class in [EventClass::Class1, EventClass::Class2, EventClass::Class3] {
                queue.queue_mut(class).retain(|e| e.pending_confirm != Some(seq));
            }
        }
        self.clear_overflow_if_room();
    }

    /// Release the pending-confirm mark on events sent under `seq` without
    /// removing them, so they are retransmitted on the next selection.
    pub fn release_pending(&mut self, seq: u8) {
        for point_type in POINT_TYPES {
            let queue = self.type_queue_mut(point_type);
            for class in [EventClass::Class1, EventClass::Class2, EventClass::Class3] {
                for event in queue.queue_mut(class).iter_mut() {
                    if event.pending_confirm == Some(seq) {
                        event.pending_confirm = None;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::objects::{BinaryValue, EventRecord, Flags};
    use crate::config::ClassMask;

    fn sample_event(index: u32) -> StoredEvent {
        StoredEvent::new(
            2,
            1,
            ObjectValue::BinaryEvent(EventRecord {
                index,
                value: BinaryValue { value: true, flags: Flags::online() },
                time: None,
            }),
        )
    }

    #[test]
    fn overflow_drops_oldest_and_latches() {
        let config = EventBufferConfig { max_binary_events: 2, ..EventBufferConfig::default() };
        let mut buffers = EventBuffers::new(config);
        buffers.push(PointType::Binary, EventClass::Class1, sample_event(0));
        buffers.push(PointType::Binary, EventClass::Class1, sample_event(1));
        assert!(!buffers.event_buffer_overflow());
        buffers.push(PointType::Binary, EventClass::Class1, sample_event(2));
        assert!(buffers.event_buffer_overflow());

        let selected = buffers.select_for_response(ClassMask::all(), 1, 10);
        let (_, events) = &selected[0];
        assert_eq!(events.len(), 2);
        match &events[0].value {
            ObjectValue::BinaryEvent(e) => assert_eq!(e.index, 1),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn confirm_removes_only_matching_sequence() {
        let mut buffers = EventBuffers::new(EventBufferConfig::default());
        buffers.push(PointType::Binary, EventClass::Class1, sample_event(0));
        buffers.select_for_response(ClassMask::all(), 5, 10);
        buffers.push(PointType::Binary, EventClass::Class1, sample_event(1));
        buffers.select_for_response(ClassMask::all(), 6, 10);

        buffers.confirm(5);
        assert!(buffers.type_has_class(PointType::Binary, EventClass::Class1));
        buffers.confirm(6);
        assert!(!buffers.type_has_class(PointType::Binary, EventClass::Class1));
    }

    #[test]
    fn release_pending_allows_retransmit() {
        let mut buffers = EventBuffers::new(EventBufferConfig::default());
        buffers.push(PointType::Binary, EventClass::Class1, sample_event(0));
        let first = buffers.select_for_response(ClassMask::all(), 1, 10);
        assert_eq!(first[0].1.len(), 1);

        // Without confirming, a second selection should find nothing new.
        let second = buffers.select_for_response(ClassMask::all(), 2, 10);
        assert!(second.is_empty());

        buffers.release_pending(1);
        let third = buffers.select_for_response(ClassMask::all(), 3, 10);
        assert_eq!(third[0].1.len(), 1);
    }

    #[test]
    fn overflow_clears_once_room_reopens() {
        let config = EventBufferConfig { max_binary_events: 1, ..EventBufferConfig::default() };
        let mut buffers = EventBuffers::new(config);
        buffers.push(PointType::Binary, EventClass::Class1, sample_event(0));
        buffers.push(PointType::Binary, EventClass::Class1, sample_event(1));
        assert!(buffers.event_buffer_overflow());

        buffers.select_for_response(ClassMask::all(), 1, 10);
        buffers.confirm(1);
        assert!(!buffers.event_buffer_overflow());
    }
}
