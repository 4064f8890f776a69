// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-(group, variation) object instance encoding and decoding.
//!
//! Every function here is a pure value transformer: no I/O, no panics on
//! malformed input (errors are returned as [`DecodeError`]/[`EncodeError`]).

use super::header::{ObjectHeader, HeaderRange};
use super::objects::{
    AnalogOutputCommand, AnalogPoint, AnalogValue, BinaryValue, CommandStatus, Crob,
    DoubleBitState, DoubleBitValue, EventRecord, Flags, Timestamp,
};
use super::qualifier::{Qualifier, Width};
use std::fmt;

/// A decoded object instance, tagged by which group/variation family it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectValue {
    Binary(BinaryValue),
    BinaryEvent(EventRecord<BinaryValue>),
    DoubleBit(DoubleBitValue),
    DoubleBitEvent(EventRecord<DoubleBitValue>),
    BinaryOutputStatus(BinaryValue),
    BinaryOutputEvent(EventRecord<BinaryValue>),
    CommandEvent(EventRecord<CommandStatus>),
    Counter(super::objects::CounterValue),
    CounterEvent(EventRecord<super::objects::CounterValue>),
    FrozenCounter(super::objects::CounterValue),
    FrozenCounterEvent(EventRecord<super::objects::CounterValue>),
    Analog(AnalogPoint),
    AnalogEvent(EventRecord<AnalogPoint>),
    AnalogOutputStatus(AnalogPoint),
    AnalogOutputEvent(EventRecord<AnalogPoint>),
    Crob(Crob),
    AnalogOutputCommand(AnalogOutputCommand),
    Time(Timestamp),
    /// Class-data / class-scan request headers carry no instance payload.
    ClassData,
    /// g80v1: one bit per requested IIN index.
    Iin(Vec<bool>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    Truncated,
    ObjectUnknown { group: u8, variation: u8 },
    InvalidRange,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "object data truncated"),
            Self::ObjectUnknown { group, variation } => {
                write!(f, "unknown object group {group} variation {variation}")
            }
            Self::InvalidRange => write!(f, "object header range invalid for this group"),
        }
    }
}

impl std::error::Error for DecodeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    VariationMismatch,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object value does not match header variation")
    }
}

impl std::error::Error for EncodeError {}

fn pack_bits(values: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; values.len().div_ceil(8)];
    for (i, &v) in values.iter().enumerate() {
        if v {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    out
}

fn unpack_bits(buf: &[u8], count: usize) -> Result<Vec<bool>, DecodeError> {
    let needed = count.div_ceil(8);
    if buf.len() < needed {
        return Err(DecodeError::Truncated);
    }
    Ok((0..count).map(|i| buf[i / 8] & (1 << (i % 8)) != 0).collect())
}

fn pack_double_bits(values: &[DoubleBitState]) -> Vec<u8> {
    let mut out = vec![0u8; values.len().div_ceil(4)];
    for (i, v) in values.iter().enumerate() {
        out[i / 4] |= v.code() << ((i % 4) * 2);
    }
    out
}

fn unpack_double_bits(buf: &[u8], count: usize) -> Result<Vec<DoubleBitState>, DecodeError> {
    let needed = count.div_ceil(4);
    if buf.len() < needed {
        return Err(DecodeError::Truncated);
    }
    Ok((0..count)
        .map(|i| DoubleBitState::from_code(buf[i / 4] >> ((i % 4) * 2)))
        .collect())
}

fn push_analog(out: &mut Vec<u8>, value: AnalogValue) {
    match value {
        AnalogValue::I16(v) => out.extend_from_slice(&v.to_le_bytes()),
        AnalogValue::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
        AnalogValue::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
        AnalogValue::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
    }
}

fn read_analog(buf: &[u8], cursor: &mut usize, variation: u8) -> Result<AnalogValue, DecodeError> {
    let (len, ctor): (usize, fn(&[u8]) -> AnalogValue) = match variation {
        1 | 5 => (4, |b| AnalogValue::I32(i32::from_le_bytes(b.try_into().unwrap()))),
        2 | 6 => (2, |b| AnalogValue::I16(i16::from_le_bytes(b.try_into().unwrap()))),
        3 | 7 => (4, |b| AnalogValue::F32(f32::from_le_bytes(b.try_into().unwrap()))),
        4 | 8 => (8, |b| AnalogValue::F64(f64::from_le_bytes(b.try_into().unwrap()))),
        _ => return Err(DecodeError::ObjectUnknown { group: 0, variation }),
    };
    if buf.len() < *cursor + len {
        return Err(DecodeError::Truncated);
    }
    let value = ctor(&buf[*cursor..*cursor + len]);
    *cursor += len;
    Ok(value)
}

fn analog_width_bytes(variation: u8) -> usize {
    match variation {
        1 | 5 => 4,
        2 | 6 => 2,
        3 | 7 => 4,
        4 | 8 => 8,
        _ => 0,
    }
}

/// Encode one object instance for `header`'s (group, variation).
pub fn encode_object(group: u8, variation: u8, value: &ObjectValue, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    match (group, variation, value) {
        (1, 2, ObjectValue::Binary(b)) | (10, 2, ObjectValue::BinaryOutputStatus(b)) => {
            let mut byte = b.flags.0 & 0x7F;
            if b.value {
                byte |= 0x80;
            }
            out.push(byte);
        }
        (2, v, ObjectValue::BinaryEvent(e)) | (11, v, ObjectValue::BinaryOutputEvent(e)) => {
            let mut byte = e.value.flags.0 & 0x7F;
            if e.value.value {
                byte |= 0x80;
            }
            out.push(byte);
            push_event_time(out, *v, e.time)?;
        }
        (3, 2, ObjectValue::DoubleBit(d)) => {
            out.push((d.flags.0 & 0xFC) | d.state.code());
        }
        (4, v, ObjectValue::DoubleBitEvent(e)) => {
            out.push((e.value.flags.0 & 0xFC) | e.value.state.code());
            push_event_time(out, *v, e.time)?;
        }
        (12, 1, ObjectValue::Crob(c)) => {
            out.push(c.control_code_byte());
            out.push(c.count);
            out.extend_from_slice(&c.on_time_ms.to_le_bytes());
            out.extend_from_slice(&c.off_time_ms.to_le_bytes());
            out.push(c.status.code());
        }
        (13, v, ObjectValue::CommandEvent(e)) => {
            out.push(e.value.code());
            push_event_time(out, *v, e.time)?;
        }
        (20, v, ObjectValue::Counter(c)) | (21, v, ObjectValue::FrozenCounter(c)) => {
            match v {
                1 | 5 => out.extend_from_slice(&c.value.to_le_bytes()),
                2 | 6 => out.extend_from_slice(&(c.value as u16).to_le_bytes()),
                _ => return Err(EncodeError::VariationMismatch),
            }
            if matches!(v, 1 | 2) {
                out.push(c.flags.0);
            }
        }
        (22, v, ObjectValue::CounterEvent(e)) | (23, v, ObjectValue::FrozenCounterEvent(e)) => {
            match v {
                1 | 5 => out.extend_from_slice(&e.value.value.to_le_bytes()),
                2 | 6 => out.extend_from_slice(&(e.value.value as u16).to_le_bytes()),
                _ => return Err(EncodeError::VariationMismatch),
            }
            if matches!(v, 1 | 2) {
                out.push(e.value.flags.0);
            }
            push_event_time(out, *v, e.time)?;
        }
        (30, v, ObjectValue::Analog(a)) | (40, v, ObjectValue::AnalogOutputStatus(a)) => {
            push_analog(out, a.value);
            if matches!(v, 1 | 2 | 5 | 6) {
                out.push(a.flags.0);
            }
        }
        (32, v, ObjectValue::AnalogEvent(e)) | (42, v, ObjectValue::AnalogOutputEvent(e)) => {
            push_analog(out, e.value.value);
            if matches!(v, 1 | 2 | 3 | 4) {
                out.push(e.value.flags.0);
            }
            push_event_time(out, *v, e.time)?;
        }
        (41, _, ObjectValue::AnalogOutputCommand(cmd)) => {
            push_analog(out, cmd.value);
            out.push(cmd.status.code());
        }
        (50, 1, ObjectValue::Time(t)) => out.extend_from_slice(&t.to_bytes()),
        (60, 1..=4, ObjectValue::ClassData) => {}
        (80, 1, ObjectValue::Iin(_)) => {
            // Bit-packed separately at the object-list level; see encode_objects.
            return Err(EncodeError::VariationMismatch);
        }
        _ => return Err(EncodeError::VariationMismatch),
    }
    Ok(())
}

/// Whether an event variation's wire layout appends a 48-bit timestamp.
/// Shared by the codec and by the outstation event buffer, which must build
/// event records whose `time` field matches what the codec expects to encode.
#[must_use]
pub fn variation_needs_time(variation: u8) -> bool {
    matches!(variation, 2 | 3 | 6)
}

/// Event-time suffix rules: odd "with-time" variations append a 48-bit
/// timestamp, "no-time" variations append nothing.
fn push_event_time(out: &mut Vec<u8>, variation: u8, time: Option<Timestamp>) -> Result<(), EncodeError> {
    let needs_time = variation_needs_time(variation);
    match (needs_time, time) {
        (true, Some(t)) => {
            out.extend_from_slice(&t.to_bytes());
            Ok(())
        }
        (false, None) => Ok(()),
        _ => Err(EncodeError::VariationMismatch),
    }
}

fn read_event_time(buf: &[u8], cursor: &mut usize, variation: u8) -> Result<Option<Timestamp>, DecodeError> {
    if variation_needs_time(variation) {
        if buf.len() < *cursor + 6 {
            return Err(DecodeError::Truncated);
        }
        let bytes: [u8; 6] = buf[*cursor..*cursor + 6].try_into().unwrap();
        *cursor += 6;
        Ok(Some(Timestamp::from_bytes(bytes)))
    } else {
        Ok(None)
    }
}

/// Index carried by an object instance, for types with no fixed position in
/// the header's range (events, commands). Static values addressed by a
/// start-stop range carry no index of their own.
fn object_index(value: &ObjectValue) -> Option<u32> {
    match value {
        ObjectValue::BinaryEvent(e) | ObjectValue::BinaryOutputEvent(e) => Some(e.index),
        ObjectValue::DoubleBitEvent(e) => Some(e.index),
        ObjectValue::CommandEvent(e) => Some(e.index),
        ObjectValue::CounterEvent(e) | ObjectValue::FrozenCounterEvent(e) => Some(e.index),
        ObjectValue::AnalogEvent(e) | ObjectValue::AnalogOutputEvent(e) => Some(e.index),
        ObjectValue::Crob(c) => Some(c.index),
        ObjectValue::AnalogOutputCommand(c) => Some(c.index),
        _ => None,
    }
}

/// Stamp `index` onto an object instance that carries one. A no-op for
/// static values, whose position comes from the header's range instead.
fn with_index(value: ObjectValue, index: u32) -> ObjectValue {
    match value {
        ObjectValue::BinaryEvent(mut e) => {
            e.index = index;
            ObjectValue::BinaryEvent(e)
        }
        ObjectValue::BinaryOutputEvent(mut e) => {
            e.index = index;
            ObjectValue::BinaryOutputEvent(e)
        }
        ObjectValue::DoubleBitEvent(mut e) => {
            e.index = index;
            ObjectValue::DoubleBitEvent(e)
        }
        ObjectValue::CommandEvent(mut e) => {
            e.index = index;
            ObjectValue::CommandEvent(e)
        }
        ObjectValue::CounterEvent(mut e) => {
            e.index = index;
            ObjectValue::CounterEvent(e)
        }
        ObjectValue::FrozenCounterEvent(mut e) => {
            e.index = index;
            ObjectValue::FrozenCounterEvent(e)
        }
        ObjectValue::AnalogEvent(mut e) => {
            e.index = index;
            ObjectValue::AnalogEvent(e)
        }
        ObjectValue::AnalogOutputEvent(mut e) => {
            e.index = index;
            ObjectValue::AnalogOutputEvent(e)
        }
        ObjectValue::Crob(mut c) => {
            c.index = index;
            ObjectValue::Crob(c)
        }
        ObjectValue::AnalogOutputCommand(mut c) => {
            c.index = index;
            ObjectValue::AnalogOutputCommand(c)
        }
        other => other,
    }
}

/// Index width to write/read per object instance, if `qualifier` prefixes
/// each instance with its own index.
fn index_prefix_width(qualifier: Qualifier) -> Option<Width> {
    match qualifier {
        Qualifier::IndexPrefixed(width) => Some(width),
        _ => None,
    }
}

/// Starting index implied by a non-prefixed range, so instances without an
/// index prefix on the wire still get a sensible `.index` when decoded.
fn range_start_index(range: super::header::HeaderRange) -> u32 {
    match range {
        super::header::HeaderRange::StartStop { start, .. } => start,
        _ => 0,
    }
}

/// Encode every object instance for `header`, handling group-level special
/// cases (bit-packed v1 binaries, header-only class data / IIN) and writing
/// each instance's index prefix when the header's qualifier calls for one.
pub fn encode_objects(header: &ObjectHeader, values: &[ObjectValue], out: &mut Vec<u8>) -> Result<(), EncodeError> {
    match (header.group, header.variation) {
        (1, 1) => {
            let bits: Vec<bool> = values
                .iter()
                .map(|v| match v {
                    ObjectValue::Binary(b) => Ok(b.value),
                    _ => Err(EncodeError::VariationMismatch),
                })
                .collect::<Result<_, _>>()?;
            out.extend_from_slice(&pack_bits(&bits));
        }
        (3, 1) => {
            let states: Vec<DoubleBitState> = values
                .iter()
                .map(|v| match v {
                    ObjectValue::DoubleBit(d) => Ok(d.state),
                    _ => Err(EncodeError::VariationMismatch),
                })
                .collect::<Result<_, _>>()?;
            out.extend_from_slice(&pack_double_bits(&states));
        }
        (60, _) => {}
        (80, 1) => {
            if let Some(ObjectValue::Iin(bits)) = values.first() {
                out.extend_from_slice(&pack_bits(bits));
            }
        }
        _ => {
            let index_width = index_prefix_width(header.qualifier);
            for value in values {
                if let Some(width) = index_width {
                    let index = object_index(value).unwrap_or(0);
                    super::header::push_width(out, width, index);
                }
                encode_object(header.group, header.variation, value, out)?;
            }
        }
    }
    Ok(())
}

/// Decode `header.range.object_count()` instances for `header` out of `buf`,
/// reading each instance's index prefix when the header's qualifier carries
/// one and otherwise deriving it from the start-stop range.
pub fn decode_objects(header: &ObjectHeader, buf: &[u8]) -> Result<(Vec<ObjectValue>, usize), DecodeError> {
    let group = header.group;
    let variation = header.variation;
    let count = header.range.object_count() as usize;

    match (group, variation) {
        (1, 1) => {
            let bits = unpack_bits(buf, count)?;
            let values = bits
                .into_iter()
                .map(|value| ObjectValue::Binary(BinaryValue { value, flags: Flags::online() }))
                .collect();
            return Ok((values, count.div_ceil(8)));
        }
        (3, 1) => {
            let states = unpack_double_bits(buf, count)?;
            let values = states
                .into_iter()
                .map(|state| ObjectValue::DoubleBit(DoubleBitValue { state, flags: Flags::online() }))
                .collect();
            return Ok((values, count.div_ceil(4)));
        }
        (60, 1..=4) => {
            // Class-scan headers request data, they don't carry instances.
            return Ok((vec![ObjectValue::ClassData], 0));
        }
        (80, 1) => {
            let bits = unpack_bits(buf, count)?;
            return Ok((vec![ObjectValue::Iin(bits)], count.div_ceil(8)));
        }
        _ => {}
    }

    let index_width = index_prefix_width(header.qualifier);
    let start_index = range_start_index(header.range);

    let mut cursor = 0usize;
    let mut values = Vec::with_capacity(count);
    for i in 0..count {
        let index = match index_width {
            Some(width) => {
                super::header::read_width(buf, &mut cursor, width).map_err(|_| DecodeError::Truncated)?
            }
            None => start_index + i as u32,
        };
        let value = decode_one(group, variation, buf, &mut cursor)?;
        values.push(with_index(value, index));
    }
    Ok((values, cursor))
}

fn decode_one(group: u8, variation: u8, buf: &[u8], cursor: &mut usize) -> Result<ObjectValue, DecodeError> {
    macro_rules! need {
        ($n:expr) => {
            if buf.len() < *cursor + $n {
                return Err(DecodeError::Truncated);
            }
        };
    }

    Ok(match (group, variation) {
        (1, 2) | (10, 2) => {
            need!(1);
            let byte = buf[*cursor];
            *cursor += 1;
            let binary = BinaryValue {
                value: byte & 0x80 != 0,
                flags: Flags(byte & 0x7F),
            };
            if group == 1 {
                ObjectValue::Binary(binary)
            } else {
                ObjectValue::BinaryOutputStatus(binary)
            }
        }
        (2, v) | (11, v) => {
            need!(1);
            let byte = buf[*cursor];
            *cursor += 1;
            let binary = BinaryValue {
                value: byte & 0x80 != 0,
                flags: Flags(byte & 0x7F),
            };
            let time = read_event_time(buf, cursor, v)?;
            let record = EventRecord { index: 0, value: binary, time };
            if group == 2 {
                ObjectValue::BinaryEvent(record)
            } else {
                ObjectValue::BinaryOutputEvent(record)
            }
        }
        (3, 2) => {
            need!(1);
            let byte = buf[*cursor];
            *cursor += 1;
            ObjectValue::DoubleBit(DoubleBitValue {
                state: DoubleBitState::from_code(byte),
                flags: Flags(byte & 0xFC),
            })
        }
        (4, v) => {
            need!(1);
            let byte = buf[*cursor];
            *cursor += 1;
            let time = read_event_time(buf, cursor, v)?;
            ObjectValue::DoubleBitEvent(EventRecord {
                index: 0,
                value: DoubleBitValue {
                    state: DoubleBitState::from_code(byte),
                    flags: Flags(byte & 0xFC),
                },
                time,
            })
        }
        (12, 1) => {
            need!(11);
            let control_byte = buf[*cursor];
            let count = buf[*cursor + 1];
            let on_time_ms = u32::from_le_bytes(buf[*cursor + 2..*cursor + 6].try_into().unwrap());
            let off_time_ms = u32::from_le_bytes(buf[*cursor + 6..*cursor + 10].try_into().unwrap());
            let status = CommandStatus::from_code(buf[*cursor + 10]);
            *cursor += 11;
            // Index is filled in by `decode_objects` from the header's index
            // prefix (or implicit start-stop position); this site only knows
            // the control-code byte.
            let crob = Crob::from_control_code_byte(0, control_byte, count, on_time_ms, off_time_ms, status)
                .ok_or(DecodeError::ObjectUnknown { group, variation })?;
            ObjectValue::Crob(crob)
        }
        (13, v) => {
            need!(1);
            let status = CommandStatus::from_code(buf[*cursor]);
            *cursor += 1;
            let time = read_event_time(buf, cursor, v)?;
            ObjectValue::CommandEvent(EventRecord { index: 0, value: status, time })
        }
        (20, v) | (21, v) => {
            let width = if matches!(v, 1 | 5) { 4 } else { 2 };
            need!(width);
            let raw = if width == 4 {
                u32::from_le_bytes(buf[*cursor..*cursor + 4].try_into().unwrap())
            } else {
                u32::from(u16::from_le_bytes(buf[*cursor..*cursor + 2].try_into().unwrap()))
            };
            *cursor += width;
            let flags = if matches!(v, 1 | 2) {
                need!(1);
                let f = Flags(buf[*cursor]);
                *cursor += 1;
                f
            } else {
                Flags::online()
            };
            let counter = super::objects::CounterValue { value: raw, flags };
            if group == 20 {
                ObjectValue::Counter(counter)
            } else {
                ObjectValue::FrozenCounter(counter)
            }
        }
        (22, v) | (23, v) => {
            let width = if matches!(v, 1 | 5) { 4 } else { 2 };
            need!(width);
            let raw = if width == 4 {
                u32::from_le_bytes(buf[*cursor..*cursor + 4].try_into().unwrap())
            } else {
                u32::from(u16::from_le_bytes(buf[*cursor..*cursor + 2].try_into().unwrap()))
            };
            *cursor += width;
            let flags = if matches!(v, 1 | 2) {
                need!(1);
                let f = Flags(buf[*cursor]);
                *cursor += 1;
                f
            } else {
                Flags::online()
            };
            let time = read_event_time(buf, cursor, v)?;
            let record = EventRecord {
                index: 0,
                value: super::objects::CounterValue { value: raw, flags },
                time,
            };
            if group == 22 {
                ObjectValue::CounterEvent(record)
            } else {
                ObjectValue::FrozenCounterEvent(record)
            }
        }
        (30, v) | (40, v) => {
            let width = analog_width_bytes(v);
            need!(width);
            let value = read_analog(buf, cursor, v)?;
            let flags = if matches!(v, 1 | 2 | 5 | 6) {
                need!(1);
                let f = Flags(buf[*cursor]);
                *cursor += 1;
                f
            } else {
                Flags::online()
            };
            let point = AnalogPoint { value, flags };
            if group == 30 {
                ObjectValue::Analog(point)
            } else {
                ObjectValue::AnalogOutputStatus(point)
            }
        }
        (32, v) | (42, v) => {
            let width = analog_width_bytes(v);
            need!(width);
            let value = read_analog(buf, cursor, v)?;
            let flags = if matches!(v, 1 | 2 | 3 | 4) {
                need!(1);
                let f = Flags(buf[*cursor]);
                *cursor += 1;
                f
            } else {
                Flags::online()
            };
            let time = read_event_time(buf, cursor, v)?;
            let record = EventRecord {
                index: 0,
                value: AnalogPoint { value, flags },
                time,
            };
            if group == 32 {
                ObjectValue::AnalogEvent(record)
            } else {
                ObjectValue::AnalogOutputEvent(record)
            }
        }
        (41, v) => {
            let width = analog_width_bytes(v);
            need!(width + 1);
            let value = read_analog(buf, cursor, v)?;
            let status = CommandStatus::from_code(buf[*cursor]);
            *cursor += 1;
            ObjectValue::AnalogOutputCommand(AnalogOutputCommand { index: 0, value, status })
        }
        (50, 1) => {
            need!(6);
            let bytes: [u8; 6] = buf[*cursor..*cursor + 6].try_into().unwrap();
            *cursor += 6;
            ObjectValue::Time(Timestamp::from_bytes(bytes))
        }
        (51, 1) => {
            need!(6);
            let bytes: [u8; 6] = buf[*cursor..*cursor + 6].try_into().unwrap();
            *cursor += 6;
            ObjectValue::Time(Timestamp::from_bytes(bytes))
        }
        (52, 2) => {
            need!(2);
            let ms = u16::from_le_bytes(buf[*cursor..*cursor + 2].try_into().unwrap());
            *cursor += 2;
            ObjectValue::Time(Timestamp(u64::from(ms)))
        }
        _ => return Err(DecodeError::ObjectUnknown { group, variation }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::header::ObjectHeader;

    #[test]
    fn binary_v2_roundtrip() {
        let header = ObjectHeader::for_range(1, 2, 0, 0);
        let values = vec![ObjectValue::Binary(BinaryValue {
            value: true,
            flags: Flags(Flags::ONLINE | Flags::RESTART),
        })];
        let mut buf = Vec::new();
        encode_objects(&header, &values, &mut buf).expect("encode");
        let (decoded, consumed) = decode_objects(&header, &buf).expect("decode");
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, values);
    }

    #[test]
    fn binary_v1_packed_roundtrip() {
        let header = ObjectHeader::for_range(1, 1, 0, 9);
        let values: Vec<ObjectValue> = (0..10)
            .map(|i| ObjectValue::Binary(BinaryValue { value: i % 3 == 0, flags: Flags::online() }))
            .collect();
        let mut buf = Vec::new();
        encode_objects(&header, &values, &mut buf).expect("encode");
        assert_eq!(buf.len(), 2); // ceil(10/8)
        let (decoded, consumed) = decode_objects(&header, &buf).expect("decode");
        assert_eq!(consumed, buf.len());
        for (orig, dec) in values.iter().zip(decoded.iter()) {
            match (orig, dec) {
                (ObjectValue::Binary(a), ObjectValue::Binary(b)) => assert_eq!(a.value, b.value),
                _ => panic!("unexpected variant"),
            }
        }
    }

    #[test]
    fn analog_event_with_time_roundtrip() {
        // g32v2: 16-bit analog input event with flag and time, exercising the
        // `variation_needs_time` suffix through the real encode/decode path.
        let header = ObjectHeader::for_indexed(32, 2, 1, 0);
        let values = vec![ObjectValue::AnalogEvent(EventRecord {
            index: 0,
            value: AnalogPoint {
                value: AnalogValue::I16(4250),
                flags: Flags::online(),
            },
            time: Some(Timestamp(123_456_789)),
        })];
        let mut buf = Vec::new();
        encode_objects(&header, &values, &mut buf).expect("encode");
        let (decoded, consumed) = decode_objects(&header, &buf).expect("decode");
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, values);
    }

    #[test]
    fn crob_roundtrip() {
        let header = ObjectHeader::for_indexed(12, 1, 1, 0);
        let crob = Crob {
            index: 0,
            trip_close: super::super::objects::TripClose::Nul,
            clear: false,
            queue: false,
            op_type: super::super::objects::OpType::LatchOn,
            count: 1,
            on_time_ms: 1000,
            off_time_ms: 0,
            status: CommandStatus::Success,
        };
        let values = vec![ObjectValue::Crob(crob)];
        let mut buf = Vec::new();
        encode_objects(&header, &values, &mut buf).expect("encode");
        let (decoded, consumed) = decode_objects(&header, &buf).expect("decode");
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, values);
    }

    #[test]
    fn unknown_group_variation_rejected() {
        let header = ObjectHeader::for_range(99, 1, 0, 0);
        assert_eq!(
            decode_objects(&header, &[0u8; 8]),
            Err(DecodeError::ObjectUnknown { group: 99, variation: 1 })
        );
    }

    #[test]
    fn class_data_header_has_no_payload() {
        let header = ObjectHeader::all_objects(60, 1);
        let (values, consumed) = decode_objects(&header, &[]).expect("decode");
        assert_eq!(consumed, 0);
        assert_eq!(values, vec![ObjectValue::ClassData]);
    }
}
