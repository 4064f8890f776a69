// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Whole-APDU encode/decode: application control byte, function code,
//! optional IIN, and the concatenated object header/instance list.
//!
//! This is the unit the transport function segments on the way out and
//! reassembles on the way in (see [`crate::transport::segment`]); nothing in
//! this module knows about link frames or segmentation.

use super::codec::{self, DecodeError, EncodeError, ObjectValue};
use super::control::AppControl;
use super::function::FunctionCode;
use super::header::{HeaderError, ObjectHeader};
use super::iin::Iin;
use std::fmt;

/// One object header plus the instances it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderedObjects {
    pub header: ObjectHeader,
    pub objects: Vec<ObjectValue>,
}

/// A fully decoded (or ready-to-encode) application fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Apdu {
    pub control: AppControl,
    pub function: FunctionCode,
    /// Present on `Response`/`UnsolicitedResponse`, absent on requests.
    pub iin: Option<Iin>,
    pub objects: Vec<HeaderedObjects>,
}

/// Failures decoding a whole application fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApduError {
    Truncated,
    UnknownFunction(u8),
    Header(HeaderError),
    Object(DecodeError),
}

impl fmt::Display for ApduError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "APDU truncated before function code"),
            Self::UnknownFunction(code) => write!(f, "unknown application function code {code:#04X}"),
            Self::Header(e) => write!(f, "{e}"),
            Self::Object(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ApduError {}

impl From<HeaderError> for ApduError {
    fn from(e: HeaderError) -> Self {
        Self::Header(e)
    }
}

impl From<DecodeError> for ApduError {
    fn from(e: DecodeError) -> Self {
        Self::Object(e)
    }
}

impl Apdu {
    /// Build a request fragment (no IIN).
    #[must_use]
    pub fn request(control: AppControl, function: FunctionCode, objects: Vec<HeaderedObjects>) -> Self {
        Self {
            control,
            function,
            iin: None,
            objects,
        }
    }

    /// Build a response fragment (carries IIN).
    #[must_use]
    pub fn response(control: AppControl, function: FunctionCode, iin: Iin, objects: Vec<HeaderedObjects>) -> Self {
        Self {
            control,
            function,
            iin: Some(iin),
            objects,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::new();
        out.push(self.control.to_byte());
        out.push(self.function.code());
        if let Some(iin) = self.iin {
            out.extend_from_slice(&iin.to_bytes());
        }
        for entry in &self.objects {
            entry.header.encode(&mut out);
            codec::encode_objects(&entry.header, &entry.objects, &mut out)?;
        }
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ApduError> {
        if buf.len() < 2 {
            return Err(ApduError::Truncated);
        }
        let control = AppControl::from_byte(buf[0]);
        let function = FunctionCode::from_code(buf[1]).ok_or(ApduError::UnknownFunction(buf[1]))?;

        let mut cursor = 2usize;
        let iin = if function.is_response() {
            if buf.len() < cursor + 2 {
                return Err(ApduError::Truncated);
            }
            let bytes = [buf[cursor], buf[cursor + 1]];
            cursor += 2;
            Some(Iin::from_bytes(bytes))
        } else {
            None
        };

        let mut objects = Vec::new();
        while cursor < buf.len() {
            let (header, header_len) = ObjectHeader::decode(&buf[cursor..])?;
            cursor += header_len;
            let (values, consumed) = codec::decode_objects(&header, &buf[cursor..])?;
            cursor += consumed;
            objects.push(HeaderedObjects { header, objects: values });
        }

        Ok(Self {
            control,
            function,
            iin,
            objects,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::iin::{Iin1, Iin2};
    use crate::app::objects::{BinaryValue, Flags};

    #[test]
    fn request_roundtrip_no_iin() {
        let header = ObjectHeader::all_objects(60, 1);
        let apdu = Apdu::request(
            AppControl::single(4),
            FunctionCode::Read,
            vec![HeaderedObjects {
                header,
                objects: vec![ObjectValue::ClassData],
            }],
        );
        let bytes = apdu.encode().expect("encode");
        let decoded = Apdu::decode(&bytes).expect("decode");
        assert_eq!(decoded, apdu);
        assert!(decoded.iin.is_none());
    }

    #[test]
    fn response_roundtrip_with_iin_and_objects() {
        let header = ObjectHeader::for_range(1, 2, 0, 0);
        let apdu = Apdu::response(
            AppControl::single(4),
            FunctionCode::Response,
            Iin {
                iin1: Iin1(Iin1::DEVICE_RESTART),
                iin2: Iin2::default(),
            },
            vec![HeaderedObjects {
                header,
                objects: vec![ObjectValue::Binary(BinaryValue {
                    value: true,
                    flags: Flags::online(),
                })],
            }],
        );
        let bytes = apdu.encode().expect("encode");
        let decoded = Apdu::decode(&bytes).expect("decode");
        assert_eq!(decoded, apdu);
        assert!(decoded.iin.unwrap().iin1.get(Iin1::DEVICE_RESTART));
    }

    #[test]
    fn multiple_headers_in_one_fragment() {
        let h1 = ObjectHeader::all_objects(60, 1);
        let h2 = ObjectHeader::all_objects(60, 2);
        let apdu = Apdu::request(
            AppControl::single(1),
            FunctionCode::Read,
            vec![
                HeaderedObjects { header: h1, objects: vec![ObjectValue::ClassData] },
                HeaderedObjects { header: h2, objects: vec![ObjectValue::ClassData] },
            ],
        );
        let bytes = apdu.encode().expect("encode");
        let decoded = Apdu::decode(&bytes).expect("decode");
        assert_eq!(decoded.objects.len(), 2);
    }

    #[test]
    fn truncated_apdu_rejected() {
        assert_eq!(Apdu::decode(&[0x01]), Err(ApduError::Truncated));
    }

    #[test]
    fn unknown_function_code_rejected() {
        assert_eq!(Apdu::decode(&[0xC4, 0x7F]), Err(ApduError::UnknownFunction(0x7F)));
    }
}
