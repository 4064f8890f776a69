// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The two-byte Internal Indications field carried on every response.

/// First IIN byte: outstation-state flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Iin1(pub u8);

impl Iin1 {
    pub const BROADCAST: u8 = 0x01;
    pub const CLASS_1_EVENTS: u8 = 0x02;
    pub const CLASS_2_EVENTS: u8 = 0x04;
    pub const CLASS_3_EVENTS: u8 = 0x08;
    pub const NEED_TIME: u8 = 0x10;
    pub const LOCAL_CONTROL: u8 = 0x20;
    pub const DEVICE_TROUBLE: u8 = 0x40;
    pub const DEVICE_RESTART: u8 = 0x80;

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

/// Second IIN byte: protocol/request-processing flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Iin2(pub u8);

impl Iin2 {
    pub const NO_FUNC_CODE_SUPPORT: u8 = 0x01;
    pub const OBJECT_UNKNOWN: u8 = 0x02;
    pub const PARAMETER_ERROR: u8 = 0x04;
    pub const EVENT_BUFFER_OVERFLOW: u8 = 0x08;
    pub const ALREADY_EXECUTING: u8 = 0x10;
    pub const CONFIG_CORRUPT: u8 = 0x20;
    // Bits 0x40 and 0x80 are reserved.

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

/// Full two-byte IIN field, little-endian on the wire (IIN1 first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Iin {
    pub iin1: Iin1,
    pub iin2: Iin2,
}

impl Iin {
    #[must_use]
    pub fn to_bytes(self) -> [u8; 2] {
        [self.iin1.0, self.iin2.0]
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Self {
            iin1: Iin1(bytes[0]),
            iin2: Iin2(bytes[1]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iin1_bit_set_and_clear() {
        let mut iin1 = Iin1::default();
        iin1.set(Iin1::DEVICE_RESTART, true);
        assert!(iin1.get(Iin1::DEVICE_RESTART));
        iin1.set(Iin1::DEVICE_RESTART, false);
        assert!(!iin1.get(Iin1::DEVICE_RESTART));
    }

    #[test]
    fn iin_roundtrip_bytes() {
        let iin = Iin {
            iin1: Iin1(Iin1::DEVICE_RESTART | Iin1::CLASS_1_EVENTS),
            iin2: Iin2(Iin2::OBJECT_UNKNOWN),
        };
        assert_eq!(Iin::from_bytes(iin.to_bytes()), iin);
    }
}
