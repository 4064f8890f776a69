// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A channel owns one byte transport plus the router that demultiplexes it
//! across the master and outstation sessions added to it.
//!
//! Two dedicated worker threads per channel mirror the concurrency model of
//! the rest of this core: a reader that blocks on `transport.read()`, feeds
//! the link-layer deframer, and routes complete frames; and a writer that
//! drains a bounded queue fed by every session's outbound sender and writes
//! frames to the wire one at a time, so link frames from different
//! sessions never interleave mid-frame.

pub mod router;

pub use router::{InboundSink, RouteStatus, Router};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender};

use crate::config::{MasterConfig, OutstationConfig};
use crate::error::Error;
use crate::link::{Deframer, LinkFrame};
use crate::master::{self, MasterApplication, MasterHandle};
use crate::outstation::{self, CommandHandler, OutstationHandle};
use crate::transport::LinkTransport;

const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// Cumulative counters for one channel's link-layer traffic.
#[derive(Debug, Default)]
pub struct ChannelMetrics {
    pub frames_delivered: AtomicU64,
    pub frames_orphaned: AtomicU64,
    pub bad_frames: AtomicU64,
}

impl ChannelMetrics {
    #[must_use]
    pub fn snapshot(&self) -> ChannelMetricsSnapshot {
        ChannelMetricsSnapshot {
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            frames_orphaned: self.frames_orphaned.load(Ordering::Relaxed),
            bad_frames: self.bad_frames.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelMetricsSnapshot {
    pub frames_delivered: u64,
    pub frames_orphaned: u64,
    pub bad_frames: u64,
}

struct OutstationSink(Sender<outstation::SessionMsg>);

impl InboundSink for OutstationSink {
    fn deliver(&self, payload: Vec<u8>) {
        let _ = self.0.send(outstation::SessionMsg::InboundSegment(payload));
    }
}

struct MasterSink(Sender<master::SessionMsg>);

impl InboundSink for MasterSink {
    fn deliver(&self, payload: Vec<u8>) {
        let _ = self.0.send(master::SessionMsg::InboundSegment(payload));
    }
}

/// A running channel: one transport, one router, its reader/writer threads.
pub struct Channel {
    router: Arc<Router>,
    outbound: Sender<Vec<u8>>,
    metrics: Arc<ChannelMetrics>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Channel {
    pub(crate) fn new(transport: Box<dyn LinkTransport>) -> Self {
        let router = Arc::new(Router::new());
        let transport = Arc::new(Mutex::new(transport));
        let metrics = Arc::new(ChannelMetrics::default());
        let (outbound_tx, outbound_rx) = bounded::<Vec<u8>>(OUTBOUND_QUEUE_DEPTH);

        let reader = std::thread::Builder::new()
            .name("dnp3-channel-reader".into())
            .spawn({
                let router = router.clone();
                let transport = transport.clone();
                let metrics = metrics.clone();
                move || run_reader(&transport, &router, &metrics)
            })
            .expect("failed to spawn channel reader thread");

        let writer = std::thread::Builder::new()
            .name("dnp3-channel-writer".into())
            .spawn(move || run_writer(&transport, &outbound_rx))
            .expect("failed to spawn channel writer thread");

        Self {
            router,
            outbound: outbound_tx,
            metrics,
            reader: Some(reader),
            writer: Some(writer),
        }
    }

    #[must_use]
    pub fn metrics(&self) -> ChannelMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Add an outstation session to this channel, registering it in the
    /// router at `config.local_address`.
    pub fn add_outstation(&self, config: OutstationConfig, handler: Box<dyn CommandHandler>) -> Result<OutstationHandle, Error> {
        let local_address = config.local_address;
        let (handle, mailbox) = outstation::spawn(config, handler, self.outbound.clone());
        self.router.register(local_address, Arc::new(OutstationSink(mailbox)))?;
        Ok(handle)
    }

    /// Add a master session to this channel, registering it in the router
    /// at `config.local_address`.
    pub fn add_master(&self, config: MasterConfig, application: Box<dyn MasterApplication>) -> Result<MasterHandle, Error> {
        let local_address = config.local_address;
        let (handle, mailbox) = master::spawn(config, application, self.outbound.clone());
        self.router.register(local_address, Arc::new(MasterSink(mailbox)))?;
        Ok(handle)
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
    }
}

/// A cheap, cloneable handle to a channel, returned by [`crate::Manager::add_channel`].
///
/// Every clone shares the same underlying transport, router, and worker
/// threads; dropping the last clone tears the channel down.
#[derive(Clone)]
pub struct ChannelHandle(Arc<Channel>);

impl ChannelHandle {
    pub(crate) fn new(transport: Box<dyn LinkTransport>) -> Self {
        Self(Arc::new(Channel::new(transport)))
    }

    #[must_use]
    pub fn metrics(&self) -> ChannelMetricsSnapshot {
        self.0.metrics()
    }

    pub fn add_outstation(&self, config: OutstationConfig, handler: Box<dyn CommandHandler>) -> Result<OutstationHandle, Error> {
        self.0.add_outstation(config, handler)
    }

    pub fn add_master(&self, config: MasterConfig, application: Box<dyn MasterApplication>) -> Result<MasterHandle, Error> {
        self.0.add_master(config, application)
    }
}

fn run_reader(transport: &Arc<Mutex<Box<dyn LinkTransport>>>, router: &Router, metrics: &ChannelMetrics) {
    crate::info!("channel reader started");
    let mut deframer = Deframer::new();
    loop {
        let bytes = {
            let mut t = transport.lock().expect("channel transport lock poisoned");
            t.read()
        };
        match bytes {
            Ok(bytes) if bytes.is_empty() => {
                crate::info!("channel transport closed");
                return;
            }
            Ok(bytes) => {
                deframer.push(&bytes);
                while let Some(frame) = deframer.next_frame() {
                    dispatch_frame(router, metrics, &frame);
                }
                let bad = deframer.bad_frame_count();
                if bad > 0 {
                    metrics.bad_frames.store(bad, Ordering::Relaxed);
                }
            }
            Err(err) => {
                crate::warn!("channel transport read failed: {err}");
                return;
            }
        }
    }
}

fn dispatch_frame(router: &Router, metrics: &ChannelMetrics, frame: &LinkFrame) {
    match router.dispatch(frame) {
        RouteStatus::Delivered => {
            metrics.frames_delivered.fetch_add(1, Ordering::Relaxed);
        }
        RouteStatus::Orphaned => {
            metrics.frames_orphaned.fetch_add(1, Ordering::Relaxed);
            crate::debug!("channel: no session registered at address {:#06X}", frame.dest);
        }
        RouteStatus::Ignored => {}
    }
}

fn run_writer(transport: &Arc<Mutex<Box<dyn LinkTransport>>>, outbound: &crossbeam_channel::Receiver<Vec<u8>>) {
    crate::info!("channel writer started");
    while let Ok(bytes) = outbound.recv() {
        let mut t = transport.lock().expect("channel transport lock poisoned");
        if let Err(err) = t.write(&bytes) {
            crate::warn!("channel transport write failed: {err}");
        }
    }
}
