//! JSON lines output, one record per decoded bundle.
//!
//! ```json
//! {"connection":{"source":{"host":"…","port":…},"destination":{"host":"…","port":…}},
//!  "processId":…,
//!  "bundle":{"epoch":…,"segments":[{"source":…,"target":…,"type":…,"payload":{…}}]}}
//! ```
//!
//! Bundles that fail to unpack are logged and skipped, so no partial record is ever written.
//! A segment whose payload fails to decode, or whose type is unknown, has no `payload` key.

use crate::flow::Route;
use crate::framing::Bundle;
use crate::segments::{Payload, Segment, SegmentError};
use serde::Serialize;
use std::io::Write;
use std::net::SocketAddr;
use thiserror::Error;
use tracing::{trace, warn};

#[derive(Error, Debug)]
pub enum EmitError {
    #[error("Failed to serialize record")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("Failed to write record")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub host: String,
    pub port: u16,
}

impl From<SocketAddr> for Host {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub source: Host,
    pub destination: Host,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum PayloadRecord {
    Ipc {
        magic: u16,
        #[serde(rename = "type")]
        kind: u16,
        #[serde(rename = "serverId")]
        server_id: u16,
        epoch: u32,
        /// Hex encoded IPC body
        data: String,
    },
    KeepAlive {
        id: u32,
        epoch: u32,
    },
}

impl PayloadRecord {
    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::Ipc(ipc) => Some(Self::Ipc {
                magic: ipc.header.magic,
                kind: ipc.header.kind,
                server_id: ipc.header.server_id,
                epoch: ipc.header.epoch,
                data: hex::encode(&ipc.data),
            }),
            Payload::ClientKeepAlive(ka) | Payload::ServerKeepAlive(ka) => Some(Self::KeepAlive {
                id: ka.id,
                epoch: ka.epoch,
            }),
            Payload::Unknown(_) => None,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SegmentRecord {
    pub source: u32,
    pub target: u32,
    #[serde(rename = "type")]
    pub kind: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<PayloadRecord>,
}

impl From<&Segment> for SegmentRecord {
    fn from(segment: &Segment) -> Self {
        let payload = match segment.payload() {
            Ok(payload) => PayloadRecord::from_payload(payload),
            Err(e) => {
                warn!(
                    "Failed to decode {} segment payload ({:#x} -> {:#x}): {}",
                    segment.header.kind, segment.header.source, segment.header.target, e
                );
                None
            }
        };
        Self {
            source: segment.header.source,
            target: segment.header.target,
            kind: segment.header.kind.into(),
            payload,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct BundleRecord {
    /// Milliseconds since the Unix epoch
    pub epoch: u64,
    pub segments: Vec<SegmentRecord>,
}

/// The self-contained record written for each bundle
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub connection: Connection,
    pub process_id: u32,
    pub bundle: BundleRecord,
}

impl Record {
    pub fn new(route: &Route, pid: u32, bundle: &Bundle) -> Result<Self, SegmentError> {
        let segments = bundle.segments()?;
        Ok(Self {
            connection: Connection {
                source: route.source.into(),
                destination: route.destination.into(),
            },
            process_id: pid,
            bundle: BundleRecord {
                epoch: bundle.header.epoch,
                segments: segments.iter().map(SegmentRecord::from).collect(),
            },
        })
    }
}

/// Writes one JSON object per line (<https://jsonlines.org/>)
pub struct EventEmitter<W> {
    out: W,
}

impl<W: Write> EventEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Returns `false` if the bundle could not be unpacked and was skipped
    pub fn emit(&mut self, route: &Route, pid: u32, bundle: &Bundle) -> Result<bool, EmitError> {
        let record = match Record::new(route, pid, bundle) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    "Dropping bundle from {} to {}: {}",
                    route.source, route.destination, e
                );
                return Ok(false);
            }
        };
        let line = serde_json::to_vec(&record)?;
        trace!("Emitting {:#x} bytes record", line.len());
        self.out.write_all(&line)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(true)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
