// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # dnp3-core - Core DNP3 (IEEE 1815) Protocol Stack
//!
//! A pure Rust implementation of the DNP3 (IEEE 1815) master/outstation
//! protocol stack, designed for industrial control and SCADA systems. This
//! crate implements the protocol's framing, codec, and session state
//! machines over an abstract byte transport; it performs no I/O of its own.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dnp3_core::{Manager, OutstationConfig, RejectingHandler};
//! use dnp3_core::transport::LinkTransport;
//! use std::io;
//!
//! struct TcpLikeTransport; // supplied by the caller (TCP socket, serial port, ...)
//! impl LinkTransport for TcpLikeTransport {
//!     fn read(&mut self) -> io::Result<Vec<u8>> { Ok(Vec::new()) }
//!     fn write(&mut self, _buf: &[u8]) -> io::Result<()> { Ok(()) }
//!     fn close(&mut self) {}
//! }
//!
//! fn main() -> dnp3_core::Result<()> {
//!     let manager = Manager::new();
//!     let channel = manager.add_channel(1, Box::new(TcpLikeTransport));
//!
//!     let config = OutstationConfig { local_address: 10, ..Default::default() };
//!     let outstation = channel.add_outstation(config, Box::new(RejectingHandler))?;
//!     outstation.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                       Application Callbacks                         |
//! |     MasterApplication (SOE events)  |  CommandHandler (SELECT/OP)  |
//! +---------------------------------------------------------------------+
//! |                      Master / Outstation Sessions                   |
//! |   Task scheduler, command protocol  |  Database, event buffers      |
//! +---------------------------------------------------------------------+
//! |                        Application Layer (app)                      |
//! |        APDU framing, object headers, per-variation object codec      |
//! +---------------------------------------------------------------------+
//! |                    Transport Function (transport)                    |
//! |              Segmentation, reassembly, single in-flight fragment      |
//! +---------------------------------------------------------------------+
//! |                         Link Layer (link)                            |
//! |        Frame sync, CRC-16/DNP per block, primary/secondary control     |
//! +---------------------------------------------------------------------+
//! |                   Channel & Router (channel)                         |
//! |   Reader/writer worker threads, address-keyed session dispatch        |
//! +---------------------------------------------------------------------+
//! |                 Caller-supplied LinkTransport (abstract)              |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Manager`] | Entry point; owns zero or more [`ChannelHandle`]s |
//! | [`ChannelHandle`] | One byte transport, shared by its master/outstation sessions |
//! | [`MasterHandle`] | Scan scheduling and command issuance for a master session |
//! | [`OutstationHandle`] | Point-update application and unsolicited control |
//! | [`MasterApplication`] | Callback trait receiving decoded measurements |
//! | [`CommandHandler`] | Callback trait deciding SELECT/OPERATE outcomes |
//!
//! ## Features
//!
//! - **Worker-thread-per-session** concurrency: no async runtime, every
//!   session and channel owns a plain OS thread and a bounded mailbox.
//! - **Transport-agnostic**: bring your own TCP, serial, or TLS stream via
//!   [`transport::LinkTransport`].
//! - `logging` / `trace` - zero-cost-when-disabled leveled logging.
//! - `serde` - `Serialize`/`Deserialize` on configuration and value types.
//!
//! ## Modules Overview
//!
//! - [`link`] - frame synchronization and CRC-16/DNP
//! - [`transport`] - segmentation and reassembly
//! - [`app`] - APDU codec and object model
//! - [`outstation`] - point database, event buffers, command protocol
//! - [`master`] - task scheduler and SOE dispatch
//! - [`channel`] - transport I/O threads and link-address routing
//! - [`config`] - point/session configuration types
//!
//! ## See Also
//!
//! - [IEEE 1815-2012](https://standards.ieee.org/ieee/1815/5606/)

pub mod app;
pub mod channel;
pub mod config;
pub mod error;
pub mod link;
pub mod logging;
pub mod master;
pub mod outstation;
pub mod transport;

pub use channel::{Channel, ChannelHandle, ChannelMetrics, ChannelMetricsSnapshot};
pub use config::{
    AnalogPointConfig, BinaryPointConfig, ClassMask, CounterPointConfig, EventBufferConfig,
    EventMode, MasterConfig, OutstationConfig, PointClass,
};
pub use error::{Error, Result};
pub use master::{MasterApplication, MasterHandle, MeasurementEvent, ScanHandle};
pub use outstation::{CommandHandler, CommandResult, OutstationHandle, RejectingHandler};
pub use transport::LinkTransport;

use dashmap::DashMap;

/// Identifier a caller assigns to a channel when adding it to a [`Manager`].
pub type ChannelId = u32;

/// Entry point to this core: owns the set of channels a process hosts.
///
/// A `Manager` is just a registry — each [`ChannelHandle`] it returns is
/// independently runnable and already has its reader/writer threads
/// started by the time `add_channel` returns. Dropping the `Manager` does
/// not stop any channel; hold onto the returned handles (or call
/// [`ChannelHandle`]'s methods to add sessions) for as long as the channel
/// should run.
#[derive(Default)]
pub struct Manager {
    channels: DashMap<ChannelId, ChannelHandle>,
}

impl Manager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Start a new channel over `transport`, registering it under `id`.
    ///
    /// If `id` is already registered, the previous handle is replaced in
    /// this registry (the old channel keeps running independently as long
    /// as another clone of its handle is held elsewhere).
    pub fn add_channel(&self, id: ChannelId, transport: Box<dyn LinkTransport>) -> ChannelHandle {
        let handle = ChannelHandle::new(transport);
        self.channels.insert(id, handle.clone());
        handle
    }

    /// Look up a previously added channel by its id.
    #[must_use]
    pub fn channel(&self, id: ChannelId) -> Option<ChannelHandle> {
        self.channels.get(&id).map(|entry| entry.clone())
    }

    /// Remove a channel from this registry. The channel itself keeps
    /// running until every remaining clone of its handle is dropped.
    pub fn remove_channel(&self, id: ChannelId) -> Option<ChannelHandle> {
        self.channels.remove(&id).map(|(_, handle)| handle)
    }

    /// Number of channels currently registered.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};

    struct MemoryTransport {
        inbound: Arc<Mutex<VecDeque<Vec<u8>>>>,
    }

    impl LinkTransport for MemoryTransport {
        fn read(&mut self) -> io::Result<Vec<u8>> {
            Ok(self.inbound.lock().unwrap().pop_front().unwrap_or_default())
        }

        fn write(&mut self, _buf: &[u8]) -> io::Result<()> {
            Ok(())
        }

        fn close(&mut self) {}
    }

    #[test]
    fn manager_tracks_added_channels() {
        let manager = Manager::new();
        let transport = MemoryTransport {
            inbound: Arc::new(Mutex::new(VecDeque::new())),
        };
        let handle = manager.add_channel(1, Box::new(transport));
        assert_eq!(manager.channel_count(), 1);
        assert!(manager.channel(1).is_some());
        handle.metrics();

        let removed = manager.remove_channel(1);
        assert!(removed.is_some());
        assert_eq!(manager.channel_count(), 0);
    }

    #[test]
    fn unknown_channel_id_is_none() {
        let manager = Manager::new();
        assert!(manager.channel(42).is_none());
    }
}
