// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Object header qualifier codes: pick how the range of an object header is
//! expressed on the wire.

/// Width of the range/count/index fields that follow a qualifier byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Bits8,
    Bits16,
    Bits32,
}

impl Width {
    #[must_use]
    pub fn byte_len(self) -> usize {
        match self {
            Self::Bits8 => 1,
            Self::Bits16 => 2,
            Self::Bits32 => 4,
        }
    }
}

/// The seven qualifier codes this core encodes or decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    /// `0x00`/`0x01`/`0x02`: inclusive start/stop range, indices implicit.
    StartStop(Width),
    /// `0x06`: all instances of this group/variation, no range field.
    AllObjects,
    /// `0x07`/`0x08`: a bare count, no per-object index prefix.
    Count(Width),
    /// `0x17`/`0x28`: a count, with each object instance prefixed by its own index.
    IndexPrefixed(Width),
}

impl Qualifier {
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::StartStop(Width::Bits8) => 0x00,
            Self::StartStop(Width::Bits16) => 0x01,
            Self::StartStop(Width::Bits32) => 0x02,
            Self::AllObjects => 0x06,
            Self::Count(Width::Bits8) => 0x07,
            Self::Count(Width::Bits16) => 0x08,
            Self::Count(Width::Bits32) => 0x09,
            Self::IndexPrefixed(Width::Bits8) => 0x17,
            Self::IndexPrefixed(Width::Bits16) => 0x28,
            Self::IndexPrefixed(Width::Bits32) => 0x39,
        }
    }

    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => Self::StartStop(Width::Bits8),
            0x01 => Self::StartStop(Width::Bits16),
            0x02 => Self::StartStop(Width::Bits32),
            0x06 => Self::AllObjects,
            0x07 => Self::Count(Width::Bits8),
            0x08 => Self::Count(Width::Bits16),
            0x09 => Self::Count(Width::Bits32),
            0x17 => Self::IndexPrefixed(Width::Bits8),
            0x28 => Self::IndexPrefixed(Width::Bits16),
            0x39 => Self::IndexPrefixed(Width::Bits32),
            _ => return None,
        })
    }

    /// Narrowest qualifier that can express an inclusive `start..=stop` range.
    #[must_use]
    pub fn narrowest_for_range(start: u32, stop: u32) -> Self {
        if start <= u32::from(u8::MAX) && stop <= u32::from(u8::MAX) {
            Self::StartStop(Width::Bits8)
        } else if start <= u32::from(u16::MAX) && stop <= u32::from(u16::MAX) {
            Self::StartStop(Width::Bits16)
        } else {
            Self::StartStop(Width::Bits32)
        }
    }

    /// Narrowest qualifier that can express a bare `count`.
    #[must_use]
    pub fn narrowest_for_count(count: u32) -> Self {
        if count <= u32::from(u8::MAX) {
            Self::Count(Width::Bits8)
        } else if count <= u32::from(u16::MAX) {
            Self::Count(Width::Bits16)
        } else {
            Self::Count(Width::Bits32)
        }
    }

    /// Narrowest index-prefixed qualifier for `count` objects, each needing
    /// an index up to `max_index`.
    #[must_use]
    pub fn narrowest_indexed(count: u32, max_index: u32) -> Self {
        if count <= u32::from(u8::MAX) && max_index <= u32::from(u8::MAX) {
            Self::IndexPrefixed(Width::Bits8)
        } else if count <= u32::from(u16::MAX) && max_index <= u32::from(u16::MAX) {
            Self::IndexPrefixed(Width::Bits16)
        } else {
            Self::IndexPrefixed(Width::Bits32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_every_code() {
        for code in [0x00, 0x01, 0x02, 0x06, 0x07, 0x08, 0x09, 0x17, 0x28, 0x39] {
            let q = Qualifier::from_code(code).expect("known code");
            assert_eq!(q.code(), code);
        }
    }

    #[test]
    fn unknown_code_rejected() {
        assert_eq!(Qualifier::from_code(0x05), None);
    }

    #[test]
    fn narrowest_range_picks_smallest_width() {
        assert_eq!(
            Qualifier::narrowest_for_range(0, 10),
            Qualifier::StartStop(Width::Bits8)
        );
        assert_eq!(
            Qualifier::narrowest_for_range(0, 300),
            Qualifier::StartStop(Width::Bits16)
        );
        assert_eq!(
            Qualifier::narrowest_for_range(0, 70_000),
            Qualifier::StartStop(Width::Bits32)
        );
    }

    #[test]
    fn narrowest_count_picks_smallest_width() {
        assert_eq!(Qualifier::narrowest_for_count(5), Qualifier::Count(Width::Bits8));
        assert_eq!(
            Qualifier::narrowest_for_count(1000),
            Qualifier::Count(Width::Bits16)
        );
    }
}
