// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transport-function segmentation and reassembly.
//!
//! Each transport segment carries a single 1-byte header in front of up to
//! 249 bytes of APDU payload:
//!
//! ```text
//! TransportHeader = FIR(bit7) | FIN(bit6) | SEQ(bits 5..0)
//! ```
//!
//! Unlike a general-purpose fragmentation scheme this header carries no
//! group id or length field: the boundaries of a fragment are exactly the
//! `FIR`/`FIN` bits and a strictly incrementing 6-bit sequence number, per
//! IEEE 1815's Transport Function. There is also only ever one fragment in
//! flight per peer, so reassembly state is a single buffer, not a pool of
//! concurrent groups.

use std::collections::HashMap;

/// Payload bytes carried by a single segment once the header byte is removed.
pub const MAX_SEGMENT_PAYLOAD: usize = 249;

/// Default cap on a reassembled APDU (`MaxRxFragSize`).
pub const DEFAULT_MAX_RX_FRAG_SIZE: usize = 2048;

/// Errors from transport segmentation or reassembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// A segment arrived with zero bytes (header only, no payload byte to read from).
    EmptySegment,
    /// The APDU handed to [`Segmenter::segment`] would produce zero segments (also empty).
    EmptyApdu,
    /// The reassembled (or about-to-be-reassembled) APDU would exceed the configured cap.
    FragmentTooLarge { limit: usize },
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySegment => write!(f, "transport segment carried no header byte"),
            Self::EmptyApdu => write!(f, "cannot segment an empty APDU"),
            Self::FragmentTooLarge { limit } => {
                write!(f, "reassembled fragment exceeds {limit} byte limit")
            }
        }
    }
}

impl std::error::Error for TransportError {}

/// Decoded transport segment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportHeader {
    pub fir: bool,
    pub fin: bool,
    pub seq: u8,
}

impl TransportHeader {
    #[must_use]
    pub fn new(fir: bool, fin: bool, seq: u8) -> Self {
        Self {
            fir,
            fin,
            seq: seq & 0x3F,
        }
    }

    #[must_use]
    pub fn to_byte(self) -> u8 {
        let mut byte = self.seq & 0x3F;
        if self.fir {
            byte |= 0x80;
        }
        if self.fin {
            byte |= 0x40;
        }
        byte
    }

    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        Self {
            fir: byte & 0x80 != 0,
            fin: byte & 0x40 != 0,
            seq: byte & 0x3F,
        }
    }
}

/// A single transport segment ready for link-layer transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub header: TransportHeader,
    pub payload: Vec<u8>,
}

impl Segment {
    /// Encode this segment as `[header_byte, payload...]`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.payload.len());
        out.push(self.header.to_byte());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode `[header_byte, payload...]` into a segment.
    pub fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        if bytes.is_empty() {
            return Err(TransportError::EmptySegment);
        }
        Ok(Self {
            header: TransportHeader::from_byte(bytes[0]),
            payload: bytes[1..].to_vec(),
        })
    }
}

/// Splits an APDU into transport segments with a per-session incrementing
/// sequence counter.
#[derive(Debug)]
pub struct Segmenter {
    next_seq: u8,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Segmenter {
    #[must_use]
    pub fn new() -> Self {
        Self { next_seq: 0 }
    }

    /// Reset the sequence counter to zero, e.g. after a link reset.
    pub fn reset(&mut self) {
        self.next_seq = 0;
    }

    /// Split `apdu` into `ceil(len / 249)` segments, FIR on the first, FIN on
    /// the last, `seq` incrementing mod 64 starting from the current counter.
    pub fn segment(&mut self, apdu: &[u8]) -> Result<Vec<Segment>, TransportError> {
        if apdu.is_empty() {
            return Err(TransportError::EmptyApdu);
        }

        let chunks: Vec<&[u8]> = apdu.chunks(MAX_SEGMENT_PAYLOAD).collect();
        let last = chunks.len() - 1;

        let mut segments = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.into_iter().enumerate() {
            let header = TransportHeader::new(i == 0, i == last, self.next_seq);
            self.next_seq = (self.next_seq + 1) & 0x3F;
            segments.push(Segment {
                header,
                payload: chunk.to_vec(),
            });
        }

        Ok(segments)
    }
}

/// Per-peer reassembly buffer and its expected next sequence number.
#[derive(Debug)]
struct PendingFragment {
    buf: Vec<u8>,
    expected_seq: u8,
}

/// Reassembles APDUs from a stream of transport segments, one buffer per peer.
///
/// There is exactly one fragment in flight per peer at a time: a non-FIR
/// segment whose `seq` does not match `expected_seq` causes the whole
/// in-progress buffer to be silently dropped, per IEEE 1815 (the sender is
/// expected to either retransmit from FIR or the link layer handles retries
/// beneath this layer).
#[derive(Debug, Default)]
pub struct Reassembler {
    max_size: usize,
    pending: HashMap<u16, PendingFragment>,
    stats: ReassemblerStats,
}

/// Counters useful for diagnostics and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReassemblerStats {
    pub segments_received: u64,
    pub apdus_reassembled: u64,
    pub sequence_errors: u64,
    pub overflows: u64,
}

impl Reassembler {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            pending: HashMap::new(),
            stats: ReassemblerStats::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> ReassemblerStats {
        self.stats
    }

    /// Drop any in-progress buffer for `peer` (e.g. on link reset).
    pub fn reset_peer(&mut self, peer: u16) {
        self.pending.remove(&peer);
    }

    /// Feed one segment from `peer`. Returns `Some(apdu)` once a FIN segment
    /// completes a fragment.
    pub fn on_segment(
        &mut self,
        peer: u16,
        segment: &Segment,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        self.stats.segments_received += 1;
        let header = segment.header;

        if header.fir {
            self.pending.insert(
                peer,
                PendingFragment {
                    buf: Vec::with_capacity(segment.payload.len()),
                    expected_seq: header.seq,
                },
            );
        }

        let Some(pending) = self.pending.get_mut(&peer) else {
            // Non-FIR segment with no fragment in progress: ignore.
            return Ok(None);
        };

        if header.seq != pending.expected_seq {
            self.pending.remove(&peer);
            self.stats.sequence_errors += 1;
            return Ok(None);
        }

        if pending.buf.len() + segment.payload.len() > self.max_size {
            self.pending.remove(&peer);
            self.stats.overflows += 1;
            return Err(TransportError::FragmentTooLarge {
                limit: self.max_size,
            });
        }

        pending.buf.extend_from_slice(&segment.payload);
        pending.expected_seq = (pending.expected_seq + 1) & 0x3F;

        if header.fin {
            let fragment = self.pending.remove(&peer).expect("just inserted above");
            self.stats.apdus_reassembled += 1;
            return Ok(Some(fragment.buf));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let h = TransportHeader::new(true, false, 37);
        assert_eq!(TransportHeader::from_byte(h.to_byte()), h);
    }

    #[test]
    fn single_segment_apdu() {
        let mut segmenter = Segmenter::new();
        let apdu = vec![1, 2, 3, 4];
        let segments = segmenter.segment(&apdu).expect("segment");
        assert_eq!(segments.len(), 1);
        assert!(segments[0].header.fir);
        assert!(segments[0].header.fin);
        assert_eq!(segments[0].header.seq, 0);
    }

    #[test]
    fn multi_segment_apdu_sequences() {
        let mut segmenter = Segmenter::new();
        let apdu = vec![0xAB; MAX_SEGMENT_PAYLOAD * 2 + 10];
        let segments = segmenter.segment(&apdu).expect("segment");
        assert_eq!(segments.len(), 3);
        assert!(segments[0].header.fir && !segments[0].header.fin);
        assert!(!segments[1].header.fir && !segments[1].header.fin);
        assert!(!segments[2].header.fir && segments[2].header.fin);
        assert_eq!(segments[0].header.seq, 0);
        assert_eq!(segments[1].header.seq, 1);
        assert_eq!(segments[2].header.seq, 2);
    }

    #[test]
    fn sequence_counter_wraps_mod_64() {
        let mut segmenter = Segmenter::new();
        segmenter.next_seq = 63;
        let apdu = vec![0u8; MAX_SEGMENT_PAYLOAD * 2];
        let segments = segmenter.segment(&apdu).expect("segment");
        assert_eq!(segments[0].header.seq, 63);
        assert_eq!(segments[1].header.seq, 0);
    }

    #[test]
    fn reassembles_multi_segment_apdu() {
        let mut segmenter = Segmenter::new();
        let apdu: Vec<u8> = (0u32..600).map(|i| (i % 256) as u8).collect();
        let segments = segmenter.segment(&apdu).expect("segment");

        let mut reassembler = Reassembler::new(DEFAULT_MAX_RX_FRAG_SIZE);
        let mut result = None;
        for seg in &segments {
            result = reassembler.on_segment(1, seg).expect("on_segment");
        }
        assert_eq!(result, Some(apdu));
        assert_eq!(reassembler.stats().apdus_reassembled, 1);
    }

    #[test]
    fn non_consecutive_sequence_drops_fragment() {
        let mut segmenter = Segmenter::new();
        let apdu = vec![0xCD; MAX_SEGMENT_PAYLOAD * 3];
        let segments = segmenter.segment(&apdu).expect("segment");

        let mut reassembler = Reassembler::new(DEFAULT_MAX_RX_FRAG_SIZE);
        assert_eq!(reassembler.on_segment(1, &segments[0]).unwrap(), None);
        // Skip segment[1], feed segment[2] (wrong seq).
        assert_eq!(reassembler.on_segment(1, &segments[2]).unwrap(), None);
        assert_eq!(reassembler.stats().sequence_errors, 1);
    }

    #[test]
    fn new_fir_resets_in_progress_fragment() {
        let mut segmenter = Segmenter::new();
        let apdu1 = vec![0x11; MAX_SEGMENT_PAYLOAD * 2];
        let segs1 = segmenter.segment(&apdu1).expect("segment");

        let mut reassembler = Reassembler::new(DEFAULT_MAX_RX_FRAG_SIZE);
        reassembler.on_segment(1, &segs1[0]).unwrap();

        // A fresh FIR for a new APDU discards the half-assembled one.
        let apdu2 = vec![0x22; 10];
        let mut segmenter2 = Segmenter::new();
        let segs2 = segmenter2.segment(&apdu2).expect("segment");
        let result = reassembler.on_segment(1, &segs2[0]).unwrap();
        assert_eq!(result, Some(apdu2));
    }

    #[test]
    fn overflow_beyond_max_rx_frag_size_errors() {
        let mut segmenter = Segmenter::new();
        let apdu = vec![0u8; 300];
        let segments = segmenter.segment(&apdu).expect("segment");

        let mut reassembler = Reassembler::new(100);
        let err = reassembler.on_segment(1, &segments[0]);
        assert!(matches!(
            err,
            Err(TransportError::FragmentTooLarge { limit: 100 })
        ));
    }

    #[test]
    fn separate_peers_track_independent_state() {
        let mut segmenter = Segmenter::new();
        let apdu_a = vec![0xAA; MAX_SEGMENT_PAYLOAD + 5];
        let segs_a = segmenter.segment(&apdu_a).expect("segment");
        let mut segmenter_b = Segmenter::new();
        let apdu_b = vec![0xBB; 5];
        let segs_b = segmenter_b.segment(&apdu_b).expect("segment");

        let mut reassembler = Reassembler::new(DEFAULT_MAX_RX_FRAG_SIZE);
        assert_eq!(reassembler.on_segment(1, &segs_a[0]).unwrap(), None);
        assert_eq!(
            reassembler.on_segment(2, &segs_b[0]).unwrap(),
            Some(apdu_b)
        );
        assert_eq!(
            reassembler.on_segment(1, &segs_a[1]).unwrap(),
            Some(apdu_a)
        );
    }

    #[test]
    fn decode_rejects_empty_bytes() {
        assert_eq!(Segment::decode(&[]), Err(TransportError::EmptySegment));
    }

    #[test]
    fn encode_decode_roundtrip() {
        let segment = Segment {
            header: TransportHeader::new(true, true, 5),
            payload: vec![1, 2, 3],
        };
        let bytes = segment.encode();
        assert_eq!(Segment::decode(&bytes).unwrap(), segment);
    }
}
