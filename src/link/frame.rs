// SPDX-License-Identifier: Apache-2.0 OR MIT

//! DNP3 link-layer frame encoding, decoding, and streaming resynchronization.
//!
//! # Wire Format
//!
//! ```text
//! +------+------+--------+---------+----------+----------+-----------+
//! | 0x05 | 0x64 | length | control | dest(le) | src(le)  | hdr crc   |
//! +------+------+--------+---------+----------+----------+-----------+
//! |<---------------------- 8 bytes, CRC'd --------------->|  2 bytes  |
//!
//! followed by ceil(user_data_len / 16) data blocks:
//!   [<=16 payload bytes][2-byte block CRC]
//! ```
//!
//! `length` counts control + dest + src + user data (`5 + user_data_len`),
//! per IEEE 1815. The header CRC covers all 8 preceding bytes, including the
//! two sync bytes.

use super::control::Control;
use std::fmt;

/// Two-byte frame synchronization pattern.
pub const SYNC: [u8; 2] = [0x05, 0x64];

/// Fixed header length: sync(2) + length(1) + control(1) + dest(2) + src(2) + crc(2).
pub const HEADER_LEN: usize = 10;

/// Maximum payload bytes a single link frame may carry.
pub const MAX_USER_DATA: usize = 250;

/// Payload bytes covered by each data-block CRC.
pub const BLOCK_DATA_LEN: usize = 16;

/// Bytes added per data block for its trailing CRC.
const BLOCK_CRC_LEN: usize = 2;

/// Errors encountered while encoding or decoding a link frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes are buffered than a complete frame needs; wait for more.
    Truncated,
    /// The two sync bytes did not match `0x05 0x64`.
    InvalidSync,
    /// The header CRC (bytes 0..=7) did not match the trailing header CRC field.
    HeaderCrcMismatch,
    /// A data block's CRC did not match its payload.
    BlockCrcMismatch,
    /// `length` implied fewer than 5 user-data-carrying bytes (control+addresses).
    InvalidLength(u8),
    /// Encoded payload exceeds [`MAX_USER_DATA`].
    PayloadTooLarge(usize),
    /// An unsupported or malformed control byte / function code.
    UnsupportedFunction(u8, bool),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated link frame"),
            Self::InvalidSync => write!(f, "invalid link frame sync bytes"),
            Self::HeaderCrcMismatch => write!(f, "link header CRC mismatch"),
            Self::BlockCrcMismatch => write!(f, "link data block CRC mismatch"),
            Self::InvalidLength(len) => write!(f, "invalid link length byte {len}"),
            Self::PayloadTooLarge(len) => write!(f, "link payload of {len} bytes exceeds 250"),
            Self::UnsupportedFunction(code, prm) => {
                write!(f, "unsupported link function code {code:#04X} (prm={prm})")
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// A fully decoded (or ready-to-encode) link-layer frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFrame {
    pub control: Control,
    pub dest: u16,
    pub src: u16,
    pub payload: Vec<u8>,
}

impl LinkFrame {
    #[must_use]
    pub fn new(control: Control, dest: u16, src: u16, payload: Vec<u8>) -> Self {
        Self {
            control,
            dest,
            src,
            payload,
        }
    }

    /// Number of 16-byte data blocks `payload` will occupy.
    #[must_use]
    pub fn block_count(payload_len: usize) -> usize {
        payload_len.div_ceil(BLOCK_DATA_LEN).max(if payload_len == 0 { 0 } else { 1 })
    }

    /// Total wire size once encoded.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        frame_size(self.payload.len())
    }

    /// Encode this frame to a fresh byte buffer.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        if self.payload.len() > MAX_USER_DATA {
            return Err(FrameError::PayloadTooLarge(self.payload.len()));
        }

        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&SYNC);
        let length = (5 + self.payload.len()) as u8;
        buf.push(length);
        buf.push(self.control.to_byte());
        buf.extend_from_slice(&self.dest.to_le_bytes());
        buf.extend_from_slice(&self.src.to_le_bytes());

        let header_crc = super::crc::crc16_dnp(&buf[0..8]);
        buf.extend_from_slice(&header_crc.to_le_bytes());

        for chunk in self.payload.chunks(BLOCK_DATA_LEN) {
            buf.extend_from_slice(chunk);
            let block_crc = super::crc::crc16_dnp(chunk);
            buf.extend_from_slice(&block_crc.to_le_bytes());
        }

        Ok(buf)
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// Returns the frame and the number of bytes consumed. `buf` must
    /// already be positioned at the sync bytes; use [`Deframer`] for
    /// streaming input that needs resynchronization.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), FrameError> {
        if buf.len() < HEADER_LEN {
            return Err(FrameError::Truncated);
        }
        if buf[0] != SYNC[0] || buf[1] != SYNC[1] {
            return Err(FrameError::InvalidSync);
        }

        let length = buf[2];
        if length < 5 {
            return Err(FrameError::InvalidLength(length));
        }
        let user_data_len = length as usize - 5;
        if user_data_len > MAX_USER_DATA {
            return Err(FrameError::PayloadTooLarge(user_data_len));
        }

        let header_crc_read = u16::from_le_bytes([buf[8], buf[9]]);
        let header_crc_calc = super::crc::crc16_dnp(&buf[0..8]);
        if header_crc_calc != header_crc_read {
            return Err(FrameError::HeaderCrcMismatch);
        }

        let control = Control::from_byte(buf[3])?;
        let dest = u16::from_le_bytes([buf[4], buf[5]]);
        let src = u16::from_le_bytes([buf[6], buf[7]]);

        let total_len = frame_size(user_data_len);
        if buf.len() < total_len {
            return Err(FrameError::Truncated);
        }

        let mut payload = Vec::with_capacity(user_data_len);
        let mut remaining = user_data_len;
        let mut cursor = HEADER_LEN;
        while remaining > 0 {
            let chunk_len = remaining.min(BLOCK_DATA_LEN);
            let chunk = &buf[cursor..cursor + chunk_len];
            let crc_read = u16::from_le_bytes([buf[cursor + chunk_len], buf[cursor + chunk_len + 1]]);
            if super::crc::crc16_dnp(chunk) != crc_read {
                return Err(FrameError::BlockCrcMismatch);
            }
            payload.extend_from_slice(chunk);
            cursor += chunk_len + BLOCK_CRC_LEN;
            remaining -= chunk_len;
        }

        Ok((
            LinkFrame {
                control,
                dest,
                src,
                payload,
            },
            total_len,
        ))
    }
}

/// Total encoded frame size (header + blocks + block CRCs) for a payload of `payload_len` bytes.
#[must_use]
pub fn frame_size(payload_len: usize) -> usize {
    let blocks = payload_len.div_ceil(BLOCK_DATA_LEN);
    HEADER_LEN + payload_len + blocks * BLOCK_CRC_LEN
}

/// Streaming frame decoder: buffers arbitrary byte chunks from the
/// transport and yields complete, CRC-valid frames, resynchronizing on
/// `0x05` after any failure.
#[derive(Debug, Default)]
pub struct Deframer {
    buf: Vec<u8>,
    bad_frames: u64,
}

impl Deframer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly-read transport bytes into the decoder.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Count of frames discarded due to CRC, sync, or length failures.
    #[must_use]
    pub fn bad_frame_count(&self) -> u64 {
        self.bad_frames
    }

    /// Pull the next complete, valid frame out of the buffer, if any.
    ///
    /// On any decode error the buffer is advanced past the bad byte(s) and
    /// resynchronized at the next `0x05`; the call keeps scanning forward
    /// internally until it either returns a good frame or runs out of
    /// buffered data.
    pub fn next_frame(&mut self) -> Option<LinkFrame> {
        loop {
            let sync_at = self.buf.iter().position(|&b| b == SYNC[0])?;
            if sync_at > 0 {
                self.buf.drain(0..sync_at);
            }

            match LinkFrame::decode(&self.buf) {
                Ok((frame, consumed)) => {
                    self.buf.drain(0..consumed);
                    return Some(frame);
                }
                Err(FrameError::Truncated) => return None,
                Err(_) => {
                    self.bad_frames += 1;
                    // Advance past this sync candidate and keep scanning.
                    self.buf.drain(0..1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::control::LinkFunction;

    fn sample_frame(payload: Vec<u8>) -> LinkFrame {
        LinkFrame::new(
            Control::primary(true, false, false, LinkFunction::UnconfirmedUserData),
            1024,
            1,
            payload,
        )
    }

    #[test]
    fn roundtrip_empty_payload() {
        let frame = sample_frame(vec![]);
        let bytes = frame.encode().expect("encode");
        let (decoded, consumed) = LinkFrame::decode(&bytes).expect("decode");
        assert_eq!(decoded, frame);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn roundtrip_small_payload() {
        let frame = sample_frame(vec![0xCA, 0xFE, 0x01, 0x02, 0x03]);
        let bytes = frame.encode().expect("encode");
        let (decoded, _) = LinkFrame::decode(&bytes).expect("decode");
        assert_eq!(decoded, frame);
    }

    #[test]
    fn max_payload_produces_sixteen_blocks_of_sixteen() {
        let payload = vec![0xAB; MAX_USER_DATA];
        let frame = sample_frame(payload.clone());
        let bytes = frame.encode().expect("encode");
        // 250 bytes => 15 full blocks of 16 (240) + 1 block of 10.
        let expected_blocks = MAX_USER_DATA.div_ceil(BLOCK_DATA_LEN);
        assert_eq!(expected_blocks, 16);
        assert_eq!(
            bytes.len(),
            HEADER_LEN + MAX_USER_DATA + expected_blocks * 2
        );
        let (decoded, consumed) = LinkFrame::decode(&bytes).expect("decode");
        assert_eq!(decoded.payload, payload);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn oversized_payload_rejected_on_encode() {
        let frame = sample_frame(vec![0u8; MAX_USER_DATA + 1]);
        assert_eq!(frame.encode(), Err(FrameError::PayloadTooLarge(251)));
    }

    #[test]
    fn header_crc_mismatch_detected() {
        let frame = sample_frame(vec![1, 2, 3]);
        let mut bytes = frame.encode().expect("encode");
        bytes[9] ^= 0xFF;
        assert_eq!(LinkFrame::decode(&bytes), Err(FrameError::HeaderCrcMismatch));
    }

    #[test]
    fn block_crc_mismatch_detected() {
        let frame = sample_frame(vec![1, 2, 3, 4, 5]);
        let mut bytes = frame.encode().expect("encode");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert_eq!(LinkFrame::decode(&bytes), Err(FrameError::BlockCrcMismatch));
    }

    #[test]
    fn deframer_resyncs_after_corruption() {
        let frame1 = sample_frame(vec![1, 2, 3]);
        let frame2 = sample_frame(vec![4, 5, 6, 7]);
        let mut bytes1 = frame1.encode().expect("encode");
        let bytes2 = frame2.encode().expect("encode");

        // Corrupt a CRC byte inside frame1's header to force a resync scan.
        bytes1[9] ^= 0x01;

        let mut stream = Vec::new();
        stream.extend_from_slice(&bytes1);
        stream.extend_from_slice(&bytes2);

        let mut deframer = Deframer::new();
        deframer.push(&stream);

        let decoded = deframer.next_frame().expect("should recover frame2");
        assert_eq!(decoded, frame2);
        assert!(deframer.bad_frame_count() >= 1);
    }

    #[test]
    fn deframer_waits_for_more_bytes_on_truncation() {
        let frame = sample_frame(vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let bytes = frame.encode().expect("encode");

        let mut deframer = Deframer::new();
        deframer.push(&bytes[..bytes.len() - 2]);
        assert!(deframer.next_frame().is_none());

        deframer.push(&bytes[bytes.len() - 2..]);
        let decoded = deframer.next_frame().expect("frame now complete");
        assert_eq!(decoded, frame);
    }

    #[test]
    fn streaming_push_across_many_small_chunks() {
        let frame = sample_frame(vec![9; 40]);
        let bytes = frame.encode().expect("encode");

        let mut deframer = Deframer::new();
        for chunk in bytes.chunks(3) {
            deframer.push(chunk);
        }
        let decoded = deframer.next_frame().expect("frame complete");
        assert_eq!(decoded, frame);
    }
}
