// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transport function: splits an APDU into link-sized segments on the way
//! out, and reassembles segments back into an APDU on the way in.

pub mod link_transport;
pub mod segment;

pub use link_transport::{LinkTransport, TransportStats, TransportStatsSnapshot};
pub use segment::{
    Reassembler, ReassemblerStats, Segment, Segmenter, TransportError, TransportHeader,
    DEFAULT_MAX_RX_FRAG_SIZE, MAX_SEGMENT_PAYLOAD,
};
