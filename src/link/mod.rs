// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Link layer: frame synchronization, per-block CRC, and the primary/secondary
//! control-byte state machine described in IEEE 1815 Data Link Layer.
//!
//! This layer knows nothing about transport segmentation or application
//! data; it exposes [`LinkFrame`] as an opaque addressed byte carrier and a
//! [`Deframer`] for recovering frames out of a byte stream produced by an
//! arbitrary transport.

pub mod control;
pub mod crc;
pub mod frame;

pub use control::{Control, LinkFunction};
pub use frame::{Deframer, FrameError, LinkFrame, BLOCK_DATA_LEN, HEADER_LEN, MAX_USER_DATA, SYNC};
