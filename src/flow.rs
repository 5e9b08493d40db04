//! Per-flow handling: attribution on flow start, then one decoder per direction.
//!
//! The reassembler notifies [`FlowTracker::on_new_flow`] once per connection. Flows that don't
//! belong to the target process get no [`FlowSession`] and all of their data should be ignored.
//! For the others, every ordered chunk is handed to [`FlowSession::on_data`], which returns the
//! bundles completed by that chunk.
//!
//! Each direction stops accepting data for good once it buffers more than
//! [`MAX_BUFFERED`](crate::framing::MAX_BUFFERED) bytes without producing a bundle.

use crate::attribution::{ConnectionTable, FlowAttributor, FlowEndpoints, ProcessNames};
use crate::framing::{Bundle, BundleDecoder, MAX_BUFFERED};
use std::net::SocketAddr;
use strum_macros::Display;
use tracing::{debug, info, warn};

/// Which peer sent the bytes
#[derive(Eq, PartialEq, Copy, Clone, Debug, Display)]
pub enum Direction {
    Client,
    Server,
}

/// Where the bytes of one direction came from and went to
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub struct Route {
    pub source: SocketAddr,
    pub destination: SocketAddr,
}

/// A [`BundleDecoder`] with a one-way kill switch for runaway buffers
#[derive(Debug)]
pub struct DirectionDecoder {
    decoder: BundleDecoder,
    limit: usize,
    dead: bool,
}

impl Default for DirectionDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectionDecoder {
    pub fn new() -> Self {
        Self::with_limit(MAX_BUFFERED)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            decoder: BundleDecoder::new(),
            limit,
            dead: false,
        }
    }

    /// Ignored once the direction is dead
    pub fn feed(&mut self, data: &[u8]) {
        if !self.dead {
            self.decoder.feed(data);
        }
    }

    /// Like [`BundleDecoder::next_bundle`], but enforces the buffer limit once drained
    pub fn next_bundle(&mut self) -> Option<Bundle> {
        if self.dead {
            return None;
        }
        let bundle = self.decoder.next_bundle();
        if bundle.is_none() && self.decoder.len() > self.limit {
            warn!(
                "Buffered {:#x} bytes without a bundle, ignoring the rest of this direction",
                self.decoder.len()
            );
            self.decoder.clear();
            self.dead = true;
        }
        bundle
    }

    /// Feeds `data` and drains every bundle it completed
    pub fn push(&mut self, data: &[u8]) -> Vec<Bundle> {
        self.feed(data);
        let mut bundles = Vec::new();
        while let Some(bundle) = self.next_bundle() {
            bundles.push(bundle);
        }
        bundles
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn buffered_len(&self) -> usize {
        self.decoder.len()
    }
}

/// Decoding state of one attributed flow
#[derive(Debug)]
pub struct FlowSession {
    endpoints: FlowEndpoints,
    pid: u32,
    client: DirectionDecoder,
    server: DirectionDecoder,
}

impl FlowSession {
    pub fn new(endpoints: FlowEndpoints, pid: u32) -> Self {
        Self {
            endpoints,
            pid,
            client: DirectionDecoder::new(),
            server: DirectionDecoder::new(),
        }
    }

    pub fn endpoints(&self) -> &FlowEndpoints {
        &self.endpoints
    }

    /// ID of the process owning the flow
    pub fn pid(&self) -> u32 {
        self.pid
    }

    fn decoder(&mut self, direction: Direction) -> &mut DirectionDecoder {
        match direction {
            Direction::Client => &mut self.client,
            Direction::Server => &mut self.server,
        }
    }

    /// Handles one ordered chunk sent by `direction`, returning the bundles it completed
    pub fn on_data(&mut self, direction: Direction, data: &[u8]) -> Vec<Bundle> {
        let flow = self.endpoints;
        let decoder = self.decoder(direction);
        if decoder.is_dead() {
            return Vec::new();
        }
        let bundles = decoder.push(data);
        if decoder.is_dead() {
            warn!("Flow {} {} data is corrupted, ignoring it", flow, direction);
        }
        bundles
    }

    /// The reassembler should stop delivering data for an ignored direction
    pub fn is_ignored(&self, direction: Direction) -> bool {
        match direction {
            Direction::Client => self.client.is_dead(),
            Direction::Server => self.server.is_dead(),
        }
    }

    pub fn route(&self, direction: Direction) -> Route {
        match direction {
            Direction::Client => Route {
                source: self.endpoints.client,
                destination: self.endpoints.server,
            },
            Direction::Server => Route {
                source: self.endpoints.server,
                destination: self.endpoints.client,
            },
        }
    }

    /// The reason is only logged
    pub fn on_terminated(self, reason: &str) {
        debug!(
            client_buffered = self.client.buffered_len(),
            server_buffered = self.server.buffered_len(),
            "Flow {} terminated: {}",
            self.endpoints,
            reason
        );
    }
}

/// Attributes new flows and creates their sessions
pub struct FlowTracker<T, P> {
    attributor: FlowAttributor<T, P>,
}

impl<T, P> FlowTracker<T, P>
where
    T: ConnectionTable,
    P: ProcessNames,
{
    pub fn new(attributor: FlowAttributor<T, P>) -> Self {
        Self { attributor }
    }

    /// Decides once whether the flow is decoded. `None` means both directions should be ignored.
    pub fn on_new_flow(&self, endpoints: FlowEndpoints) -> Option<FlowSession> {
        let record = self.attributor.attribute(&endpoints)?;
        info!(
            "{} flow detected: {} (pid = {})",
            self.attributor.target(),
            endpoints,
            record.pid
        );
        Some(FlowSession::new(endpoints, record.pid))
    }
}
