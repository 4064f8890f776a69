// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Typed object values shared by the application codec, the outstation
//! database, and the master's SOE callbacks.
//!
//! Rather than one struct per (group, variation), each object family is
//! modeled as a single Rust type carrying a tagged-union value
//! ([`AnalogValue`], [`DoubleBitState`]) plus [`Flags`]; the codec maps the
//! wire variation onto the numeric width, not onto a distinct Rust type.

use std::fmt;

/// Measurement quality bits shared by every numeric/binary static object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(pub u8);

impl Flags {
    pub const ONLINE: u8 = 0x01;
    pub const RESTART: u8 = 0x02;
    pub const COMM_LOST: u8 = 0x04;
    pub const REMOTE_FORCED: u8 = 0x08;
    pub const LOCAL_FORCED: u8 = 0x10;
    pub const OVER_RANGE: u8 = 0x20;
    pub const REFERENCE_ERR: u8 = 0x40;

    #[must_use]
    pub fn online() -> Self {
        Self(Self::ONLINE)
    }

    #[must_use]
    pub fn get(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    pub fn set(&mut self, bit: u8, value: bool) {
        if value {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }
}

/// 48-bit milliseconds-since-epoch timestamp used by g2v3/g4v3/g50v1 etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Largest value representable in 48 bits.
    pub const MAX: u64 = (1u64 << 48) - 1;

    #[must_use]
    pub fn to_bytes(self) -> [u8; 6] {
        let v = self.0 & Self::MAX;
        [
            v as u8,
            (v >> 8) as u8,
            (v >> 16) as u8,
            (v >> 24) as u8,
            (v >> 32) as u8,
            (v >> 40) as u8,
        ]
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        let v = u64::from(bytes[0])
            | (u64::from(bytes[1]) << 8)
            | (u64::from(bytes[2]) << 16)
            | (u64::from(bytes[3]) << 24)
            | (u64::from(bytes[4]) << 32)
            | (u64::from(bytes[5]) << 40);
        Self(v)
    }
}

/// Double-bit binary input state (g3/g4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoubleBitState {
    IntermediateState,
    DeterminedOff,
    DeterminedOn,
    Indeterminate,
}

impl DoubleBitState {
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::IntermediateState => 0,
            Self::DeterminedOff => 1,
            Self::DeterminedOn => 2,
            Self::Indeterminate => 3,
        }
    }

    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code & 0x03 {
            0 => Self::IntermediateState,
            1 => Self::DeterminedOff,
            2 => Self::DeterminedOn,
            _ => Self::Indeterminate,
        }
    }
}

/// Numeric value for counter/analog families, tagged by wire width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnalogValue {
    I16(i16),
    I32(i32),
    F32(f32),
    F64(f64),
}

impl AnalogValue {
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::I16(v) => f64::from(v),
            Self::I32(v) => f64::from(v),
            Self::F32(v) => f64::from(v),
            Self::F64(v) => v,
        }
    }

    /// Absolute difference between two values, used for deadband comparison.
    #[must_use]
    pub fn abs_delta(self, other: Self) -> f64 {
        (self.as_f64() - other.as_f64()).abs()
    }
}

/// Binary input / binary output status (g1/g10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryValue {
    pub value: bool,
    pub flags: Flags,
}

/// Double-bit binary input (g3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoubleBitValue {
    pub state: DoubleBitState,
    pub flags: Flags,
}

/// Counter / frozen counter (g20/g21).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterValue {
    pub value: u32,
    pub flags: Flags,
}

/// Analog input / analog output status (g30/g40).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogPoint {
    pub value: AnalogValue,
    pub flags: Flags,
}

/// An event record: a point index, its value snapshot, and an optional
/// timestamp (event variations without a time field carry `None`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventRecord<T> {
    pub index: u32,
    pub value: T,
    pub time: Option<Timestamp>,
}

/// Control-relay-output-block operate type (g12v1 byte 0, low nibble).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    Nul,
    PulseOn,
    PulseOff,
    LatchOn,
    LatchOff,
}

impl OpType {
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Nul => 0,
            Self::PulseOn => 1,
            Self::PulseOff => 2,
            Self::LatchOn => 3,
            Self::LatchOff => 4,
        }
    }

    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code & 0x0F {
            0 => Self::Nul,
            1 => Self::PulseOn,
            2 => Self::PulseOff,
            3 => Self::LatchOn,
            4 => Self::LatchOff,
            _ => return None,
        })
    }
}

/// Trip/close qualifier on a CROB control code (bits 6..7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripClose {
    Nul,
    Close,
    Trip,
}

impl TripClose {
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Nul => 0,
            Self::Close => 1,
            Self::Trip => 2,
        }
    }

    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match (code >> 6) & 0x03 {
            1 => Self::Close,
            2 => Self::Trip,
            _ => Self::Nul,
        }
    }
}

/// Control relay output block command (g12v1). `index` names the target
/// point; CROBs are always sent under an index-prefixed qualifier, never a
/// contiguous range, since each command targets exactly one point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crob {
    pub index: u32,
    pub trip_close: TripClose,
    pub clear: bool,
    pub queue: bool,
    pub op_type: OpType,
    pub count: u8,
    pub on_time_ms: u32,
    pub off_time_ms: u32,
    pub status: CommandStatus,
}

impl Crob {
    #[must_use]
    pub fn control_code_byte(&self) -> u8 {
        let mut byte = self.op_type.code();
        byte |= self.trip_close.code() << 6;
        if self.clear {
            byte |= 0x20;
        }
        if self.queue {
            byte |= 0x10;
        }
        byte
    }

    #[must_use]
    pub fn from_control_code_byte(
        index: u32,
        byte: u8,
        count: u8,
        on_time_ms: u32,
        off_time_ms: u32,
        status: CommandStatus,
    ) -> Option<Self> {
        Some(Self {
            index,
            trip_close: TripClose::from_code(byte),
            clear: byte & 0x20 != 0,
            queue: byte & 0x10 != 0,
            op_type: OpType::from_code(byte)?,
            count,
            on_time_ms,
            off_time_ms,
            status,
        })
    }
}

/// Analog output command (g41). `index` names the target point, same
/// reasoning as [`Crob::index`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogOutputCommand {
    pub index: u32,
    pub value: AnalogValue,
    pub status: CommandStatus,
}

/// Command status echoed in SELECT/OPERATE responses (g12/g41 status byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Timeout,
    NoSelect,
    FormatError,
    NotSupported,
    AlreadyActive,
    HardwareError,
    Local,
    TooManyOps,
    NotAuthorized,
    AutomationInhibit,
    ProcessingLimited,
    OutOfRange,
    DownstreamLocal,
    AlreadyComplete,
    Blocked,
    Canceled,
    BlockedOtherMaster,
    DownstreamFail,
    NonParticipating,
    Unknown(u8),
}

impl CommandStatus {
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Timeout => 1,
            Self::NoSelect => 2,
            Self::FormatError => 3,
            Self::NotSupported => 4,
            Self::AlreadyActive => 5,
            Self::HardwareError => 6,
            Self::Local => 7,
            Self::TooManyOps => 8,
            Self::NotAuthorized => 9,
            Self::AutomationInhibit => 10,
            Self::ProcessingLimited => 11,
            Self::OutOfRange => 12,
            Self::DownstreamLocal => 13,
            Self::AlreadyComplete => 14,
            Self::Blocked => 15,
            Self::Canceled => 16,
            Self::BlockedOtherMaster => 17,
            Self::DownstreamFail => 18,
            Self::NonParticipating => 126,
            Self::Unknown(code) => code,
        }
    }

    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::Timeout,
            2 => Self::NoSelect,
            3 => Self::FormatError,
            4 => Self::NotSupported,
            5 => Self::AlreadyActive,
            6 => Self::HardwareError,
            7 => Self::Local,
            8 => Self::TooManyOps,
            9 => Self::NotAuthorized,
            10 => Self::AutomationInhibit,
            11 => Self::ProcessingLimited,
            12 => Self::OutOfRange,
            13 => Self::DownstreamLocal,
            14 => Self::AlreadyComplete,
            15 => Self::Blocked,
            16 => Self::Canceled,
            17 => Self::BlockedOtherMaster,
            18 => Self::DownstreamFail,
            126 => Self::NonParticipating,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Event class a point's updates are reported under; `Status` is the
/// conceptual "class 0" static set, not an event class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventClass {
    Class1,
    Class2,
    Class3,
}

impl EventClass {
    #[must_use]
    pub fn class_number(self) -> u8 {
        match self {
            Self::Class1 => 1,
            Self::Class2 => 2,
            Self::Class3 => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_roundtrip_max() {
        let ts = Timestamp(Timestamp::MAX);
        assert_eq!(Timestamp::from_bytes(ts.to_bytes()), ts);
    }

    #[test]
    fn timestamp_roundtrip_zero() {
        let ts = Timestamp(0);
        assert_eq!(Timestamp::from_bytes(ts.to_bytes()), ts);
    }

    #[test]
    fn double_bit_state_roundtrip() {
        for state in [
            DoubleBitState::IntermediateState,
            DoubleBitState::DeterminedOff,
            DoubleBitState::DeterminedOn,
            DoubleBitState::Indeterminate,
        ] {
            assert_eq!(DoubleBitState::from_code(state.code()), state);
        }
    }

    #[test]
    fn crob_control_code_roundtrip() {
        let crob = Crob {
            index: 5,
            trip_close: TripClose::Close,
            clear: true,
            queue: false,
            op_type: OpType::LatchOn,
            count: 1,
            on_time_ms: 100,
            off_time_ms: 0,
            status: CommandStatus::Success,
        };
        let byte = crob.control_code_byte();
        let decoded = Crob::from_control_code_byte(crob.index, byte, 1, 100, 0, CommandStatus::Success).unwrap();
        assert_eq!(decoded.trip_close, crob.trip_close);
        assert_eq!(decoded.clear, crob.clear);
        assert_eq!(decoded.op_type, crob.op_type);
    }

    #[test]
    fn command_status_roundtrip_known_values() {
        for code in 0..=18u8 {
            let status = CommandStatus::from_code(code);
            assert_eq!(status.code(), code);
        }
        assert_eq!(CommandStatus::from_code(200).code(), 200);
    }

    #[test]
    fn analog_value_abs_delta_mixed_widths() {
        let a = AnalogValue::I32(100);
        let b = AnalogValue::F64(103.5);
        assert!((a.abs_delta(b) - 3.5).abs() < f64::EPSILON);
    }
}
