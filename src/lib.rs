//! Passive decoder for the FFXIV client/server bundle protocol
//!
//! Turns reassembled TCP streams between the game client and its servers into structured
//! bundles, and writes one JSON record per decoded bundle.
//!
//! Packet capture and TCP reassembly are not part of this crate. The reassembler is expected to
//! announce new flows to a [`FlowTracker`](flow::FlowTracker), which decides once per flow whether
//! the connection belongs to the game process, and then to deliver ordered, de-duplicated bytes
//! for each direction to the resulting [`FlowSession`](flow::FlowSession).
//!
//! ## Notice
//!
//! The protocol is undocumented. Field names come from observing live traffic, some fields have no
//! known purpose and are named `unknown_N`, and the meaning of IPC opcodes changes with game patches.
//! This crate only decodes the structure and leaves the IPC bodies opaque.
//!
//! ## Protocol layers
//!
//! - [`framing`]: a stream is a sequence of bundles, each a 40 byte header starting with a 16 byte
//!   marker, followed by a body that may be zlib compressed.
//! - [`segments`]: the decompressed body packs a declared number of segments back to back. Each
//!   segment is an IPC message, a client or server keepalive, or an unknown type kept as raw bytes.
//! - [`attribution`]: maps a flow to the process that owns it through the OS connection table.
//! - [`flow`]: per-flow state, with one decoder per direction.
//! - [`emitter`]: JSON lines output.

pub mod attribution;
pub mod emitter;
pub mod flow;
pub mod framing;
pub mod segments;

pub use attribution::{FlowAttributor, FlowEndpoints};
pub use emitter::EventEmitter;
pub use flow::{Direction, FlowSession, FlowTracker};
pub use framing::{Bundle, BundleDecoder};
