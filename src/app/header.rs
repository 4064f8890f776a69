// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Object header: `group(u8) variation(u8) qualifier(u8) range-field`.

use super::qualifier::{Qualifier, Width};
use std::fmt;

/// The range/count portion of an object header, already widened to `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderRange {
    /// Every instance of this group/variation the source holds.
    AllObjects,
    /// Inclusive `start..=stop`; object count is `stop - start + 1`.
    StartStop { start: u32, stop: u32 },
    /// A bare object count with no index information.
    Count(u32),
    /// `count` objects follow, each prefixed on the wire by its own index.
    IndexPrefixed(u32),
}

impl HeaderRange {
    /// Number of object instances this range covers.
    #[must_use]
    pub fn object_count(self) -> u32 {
        match self {
            Self::AllObjects => 0,
            Self::StartStop { start, stop } => stop.saturating_sub(start) + 1,
            Self::Count(n) | Self::IndexPrefixed(n) => n,
        }
    }
}

/// A decoded object header and its range specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    pub group: u8,
    pub variation: u8,
    pub qualifier: Qualifier,
    pub range: HeaderRange,
}

/// Header-level decode failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    Truncated,
    UnknownQualifier(u8),
    QualifierRangeMismatch,
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "object header truncated"),
            Self::UnknownQualifier(q) => write!(f, "unknown qualifier code {q:#04X}"),
            Self::QualifierRangeMismatch => {
                write!(f, "qualifier does not match the provided range")
            }
        }
    }
}

impl std::error::Error for HeaderError {}

impl ObjectHeader {
    /// Build a header for an inclusive index range, choosing the narrowest qualifier.
    #[must_use]
    pub fn for_range(group: u8, variation: u8, start: u32, stop: u32) -> Self {
        Self {
            group,
            variation,
            qualifier: Qualifier::narrowest_for_range(start, stop),
            range: HeaderRange::StartStop { start, stop },
        }
    }

    /// Build a header requesting all instances (class scans, integrity polls).
    #[must_use]
    pub fn all_objects(group: u8, variation: u8) -> Self {
        Self {
            group,
            variation,
            qualifier: Qualifier::AllObjects,
            range: HeaderRange::AllObjects,
        }
    }

    /// Build a header for `count` index-prefixed objects (commands).
    #[must_use]
    pub fn for_indexed(group: u8, variation: u8, count: u32, max_index: u32) -> Self {
        Self {
            group,
            variation,
            qualifier: Qualifier::narrowest_indexed(count, max_index),
            range: HeaderRange::IndexPrefixed(count),
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.group);
        out.push(self.variation);
        out.push(self.qualifier.code());

        match (self.qualifier, self.range) {
            (Qualifier::AllObjects, HeaderRange::AllObjects) => {}
            (Qualifier::StartStop(width), HeaderRange::StartStop { start, stop }) => {
                push_width(out, width, start);
                push_width(out, width, stop);
            }
            (Qualifier::Count(width), HeaderRange::Count(n))
            | (Qualifier::IndexPrefixed(width), HeaderRange::IndexPrefixed(n)) => {
                push_width(out, width, n);
            }
            _ => debug_assert!(false, "qualifier/range mismatch constructing header"),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, usize), HeaderError> {
        if buf.len() < 3 {
            return Err(HeaderError::Truncated);
        }
        let group = buf[0];
        let variation = buf[1];
        let qualifier = Qualifier::from_code(buf[2]).ok_or(HeaderError::UnknownQualifier(buf[2]))?;

        let mut cursor = 3;
        let range = match qualifier {
            Qualifier::AllObjects => HeaderRange::AllObjects,
            Qualifier::StartStop(width) => {
                let start = read_width(buf, &mut cursor, width)?;
                let stop = read_width(buf, &mut cursor, width)?;
                HeaderRange::StartStop { start, stop }
            }
            Qualifier::Count(width) => HeaderRange::Count(read_width(buf, &mut cursor, width)?),
            Qualifier::IndexPrefixed(width) => {
                HeaderRange::IndexPrefixed(read_width(buf, &mut cursor, width)?)
            }
        };

        Ok((
            Self {
                group,
                variation,
                qualifier,
                range,
            },
            cursor,
        ))
    }
}

pub(crate) fn push_width(out: &mut Vec<u8>, width: Width, value: u32) {
    match width {
        Width::Bits8 => out.push(value as u8),
        Width::Bits16 => out.extend_from_slice(&(value as u16).to_le_bytes()),
        Width::Bits32 => out.extend_from_slice(&value.to_le_bytes()),
    }
}

pub(crate) fn read_width(buf: &[u8], cursor: &mut usize, width: Width) -> Result<u32, HeaderError> {
    let len = width.byte_len();
    if buf.len() < *cursor + len {
        return Err(HeaderError::Truncated);
    }
    let value = match width {
        Width::Bits8 => u32::from(buf[*cursor]),
        Width::Bits16 => u32::from(u16::from_le_bytes([buf[*cursor], buf[*cursor + 1]])),
        Width::Bits32 => u32::from_le_bytes([
            buf[*cursor],
            buf[*cursor + 1],
            buf[*cursor + 2],
            buf[*cursor + 3],
        ]),
    };
    *cursor += len;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_all_objects() {
        let header = ObjectHeader::all_objects(1, 2);
        let mut buf = Vec::new();
        header.encode(&mut buf);
        assert_eq!(buf, vec![1, 2, 0x06]);
        let (decoded, consumed) = ObjectHeader::decode(&buf).expect("decode");
        assert_eq!(decoded, header);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn roundtrip_start_stop_8bit() {
        let header = ObjectHeader::for_range(30, 1, 0, 9);
        let mut buf = Vec::new();
        header.encode(&mut buf);
        assert_eq!(buf, vec![30, 1, 0x00, 0, 9]);
        let (decoded, _) = ObjectHeader::decode(&buf).expect("decode");
        assert_eq!(decoded.range, HeaderRange::StartStop { start: 0, stop: 9 });
        assert_eq!(decoded.range.object_count(), 10);
    }

    #[test]
    fn roundtrip_start_stop_16bit_when_needed() {
        let header = ObjectHeader::for_range(1, 2, 0, 500);
        let mut buf = Vec::new();
        header.encode(&mut buf);
        assert_eq!(buf[2], 0x01);
        let (decoded, consumed) = ObjectHeader::decode(&buf).expect("decode");
        assert_eq!(
            decoded.range,
            HeaderRange::StartStop { start: 0, stop: 500 }
        );
        assert_eq!(consumed, 7);
    }

    #[test]
    fn roundtrip_indexed_header() {
        let header = ObjectHeader::for_indexed(12, 1, 2, 3);
        let mut buf = Vec::new();
        header.encode(&mut buf);
        assert_eq!(buf, vec![12, 1, 0x17, 2]);
        let (decoded, _) = ObjectHeader::decode(&buf).expect("decode");
        assert_eq!(decoded.range.object_count(), 2);
    }

    #[test]
    fn truncated_header_rejected() {
        assert_eq!(ObjectHeader::decode(&[1, 2]), Err(HeaderError::Truncated));
        assert_eq!(
            ObjectHeader::decode(&[1, 2, 0x00, 5]),
            Err(HeaderError::Truncated)
        );
    }

    #[test]
    fn unknown_qualifier_rejected() {
        assert_eq!(
            ObjectHeader::decode(&[1, 2, 0x05]),
            Err(HeaderError::UnknownQualifier(0x05))
        );
    }
}
