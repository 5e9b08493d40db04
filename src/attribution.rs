//! Matching a captured flow to the process that owns it.
//!
//! The capture only sees addresses and ports. To find out whether a connection belongs to the
//! game client, the flow is looked up in the OS connection table, and the owning process name is
//! compared with the target executable. This happens once, when a flow is first seen.
//!
//! The connection table and process name lookups are injected through [`ConnectionTable`]
//! and [`ProcessNames`], so that the matching logic does not depend on any particular OS API.

#[cfg(feature = "sysinfo")]
mod processes;
mod tcp_state;

#[cfg(feature = "sysinfo")]
pub use processes::SysinfoProcesses;
pub use tcp_state::TcpState;

use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Executable name of the Windows DirectX 11 game client
pub const DEFAULT_TARGET_PROCESS: &str = "ffxiv_dx11.exe";

#[derive(Error, Debug)]
pub enum AttributionError {
    #[error("Connection table unavailable: {0}")]
    TableUnavailable(String),
    #[error("Connection table IO error")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Both ends of a reassembled TCP flow, as labeled by the capture
#[derive(Eq, PartialEq, Debug, Copy, Clone)]
pub struct FlowEndpoints {
    /// The side that sent the first SYN, or whichever side the reassembler picked for partial streams
    pub client: SocketAddr,
    pub server: SocketAddr,
}

impl FlowEndpoints {
    pub fn new(client: SocketAddr, server: SocketAddr) -> Self {
        Self { client, server }
    }

    pub fn is_v6(&self) -> bool {
        self.client.is_ipv6()
    }
}

impl fmt::Display for FlowEndpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.client, self.server)
    }
}

/// One row of the OS connection table
#[derive(Eq, PartialEq, Debug, Copy, Clone)]
pub struct ConnectionRecord {
    pub local: SocketAddr,
    pub remote: SocketAddr,
    pub state: TcpState,
    pub pid: u32,
}

/// Compares address and port only, the IPv6 flow label and scope are not part of a connection's identity
fn same_endpoint(a: &SocketAddr, b: &SocketAddr) -> bool {
    a.ip() == b.ip() && a.port() == b.port()
}

impl ConnectionRecord {
    pub fn is_v6(&self) -> bool {
        self.local.is_ipv6()
    }

    /// The table doesn't know which side the capture called the client, so both orientations match
    pub fn matches(&self, flow: &FlowEndpoints) -> bool {
        if self.is_v6() != flow.is_v6() {
            return false;
        }
        let local_is_client =
            same_endpoint(&self.local, &flow.client) && same_endpoint(&self.remote, &flow.server);
        let local_is_server =
            same_endpoint(&self.local, &flow.server) && same_endpoint(&self.remote, &flow.client);
        local_is_client || local_is_server
    }
}

/// Source of connection table snapshots. Both address families must be covered.
pub trait ConnectionTable {
    fn connections(&self) -> Result<Vec<ConnectionRecord>, AttributionError>;
}

/// A fixed snapshot
impl ConnectionTable for Vec<ConnectionRecord> {
    fn connections(&self) -> Result<Vec<ConnectionRecord>, AttributionError> {
        Ok(self.clone())
    }
}

/// Resolves a process ID to its executable name
pub trait ProcessNames {
    /// `None` if the process is gone or can't be inspected
    fn process_name(&self, pid: u32) -> Option<String>;
}

impl<F> ProcessNames for F
where
    F: Fn(u32) -> Option<String>,
{
    fn process_name(&self, pid: u32) -> Option<String> {
        self(pid)
    }
}

/// Decides whether a flow belongs to the target process
pub struct FlowAttributor<T, P> {
    table: T,
    names: P,
    target: String,
}

impl<T, P> FlowAttributor<T, P>
where
    T: ConnectionTable,
    P: ProcessNames,
{
    /// Look for connections owned by [`DEFAULT_TARGET_PROCESS`]
    pub fn new_simple(table: T, names: P) -> Self {
        Self::new_custom(table, names, DEFAULT_TARGET_PROCESS.to_owned())
    }

    pub fn new_custom(table: T, names: P, target: String) -> Self {
        Self {
            table,
            names,
            target,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Finds the connection table record for `flow` whose owner is the target process.
    ///
    /// The table is queried fresh on every call. A failed query counts as no match.
    pub fn attribute(&self, flow: &FlowEndpoints) -> Option<ConnectionRecord> {
        let records = match self.table.connections() {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to query connection table for flow {}: {}", flow, e);
                return None;
            }
        };
        trace!("Matching flow {} against {} connections", flow, records.len());

        let found = records
            .into_iter()
            .filter(|record| record.matches(flow))
            .find(|record| self.is_target(record.pid));
        if found.is_none() {
            debug!("Flow {} is not owned by {}", flow, self.target);
        }
        found
    }

    fn is_target(&self, pid: u32) -> bool {
        match self.names.process_name(pid) {
            Some(name) => {
                trace!(pid, name = name.as_str(), "Resolved process name");
                name == self.target
            }
            None => {
                trace!(pid, "Could not resolve process name");
                false
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::Cell;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn record(local: &str, remote: &str, pid: u32) -> ConnectionRecord {
        ConnectionRecord {
            local: addr(local),
            remote: addr(remote),
            state: TcpState::Established,
            pid,
        }
    }

    fn names(pid: u32) -> Option<String> {
        match pid {
            100 => Some(DEFAULT_TARGET_PROCESS.to_owned()),
            200 => Some("browser.exe".to_owned()),
            _ => None,
        }
    }

    #[test_log::test]
    fn matches_both_orientations() {
        let flow = FlowEndpoints::new(addr("192.168.1.5:50123"), addr("124.150.157.23:55006"));
        let client_side = record("192.168.1.5:50123", "124.150.157.23:55006", 1);
        let server_side = record("124.150.157.23:55006", "192.168.1.5:50123", 1);
        assert!(client_side.matches(&flow));
        assert!(server_side.matches(&flow));
        assert_eq!(client_side.matches(&flow), server_side.matches(&flow));
    }

    #[test_log::test]
    fn mismatched_ports_or_addresses() {
        let flow = FlowEndpoints::new(addr("10.0.0.1:50000"), addr("10.0.0.2:55000"));
        assert!(!record("10.0.0.1:50001", "10.0.0.2:55000", 1).matches(&flow));
        assert!(!record("10.0.0.1:50000", "10.0.0.3:55000", 1).matches(&flow));
        // Ports swapped between the two addresses is a different connection
        assert!(!record("10.0.0.1:55000", "10.0.0.2:50000", 1).matches(&flow));
    }

    #[test_log::test]
    fn families_must_agree() {
        let flow = FlowEndpoints::new(addr("[::1]:50000"), addr("[::1]:55000"));
        assert!(!record("127.0.0.1:50000", "127.0.0.1:55000", 1).matches(&flow));
        assert!(record("[::1]:55000", "[::1]:50000", 1).matches(&flow));
    }

    #[test_log::test]
    fn ipv6_scope_is_ignored() {
        let flow = FlowEndpoints::new(addr("[fe80::1%3]:50000"), addr("[fe80::2]:55000"));
        assert!(record("[fe80::1]:50000", "[fe80::2]:55000", 1).matches(&flow));
    }

    #[test_log::test]
    fn attributes_target_process_only() {
        let table = vec![
            record("10.0.0.1:50000", "10.0.0.2:55000", 200),
            record("10.0.0.1:50000", "10.0.0.2:55000", 100),
            record("10.0.0.1:50001", "10.0.0.2:55000", 100),
        ];
        let attributor = FlowAttributor::new_simple(table, names);
        let flow = FlowEndpoints::new(addr("10.0.0.2:55000"), addr("10.0.0.1:50000"));
        let found = attributor.attribute(&flow).unwrap();
        assert_eq!(found.pid, 100);
        assert_eq!(found.local, addr("10.0.0.1:50000"));

        let other = FlowEndpoints::new(addr("10.0.0.1:50002"), addr("10.0.0.2:55000"));
        assert_eq!(attributor.attribute(&other), None);
    }

    #[test_log::test]
    fn wrong_or_unresolvable_process_is_a_miss() {
        let table = vec![
            record("10.0.0.1:50000", "10.0.0.2:55000", 200),
            record("10.0.0.1:50000", "10.0.0.2:55000", 300),
        ];
        let attributor = FlowAttributor::new_simple(table, names);
        let flow = FlowEndpoints::new(addr("10.0.0.1:50000"), addr("10.0.0.2:55000"));
        assert_eq!(attributor.attribute(&flow), None);

        let custom = FlowAttributor::new_custom(
            vec![record("10.0.0.1:50000", "10.0.0.2:55000", 200)],
            names,
            "browser.exe".to_owned(),
        );
        assert_eq!(custom.target(), "browser.exe");
        assert_eq!(custom.attribute(&flow).map(|r| r.pid), Some(200));
    }

    struct FailingTable;

    impl ConnectionTable for FailingTable {
        fn connections(&self) -> Result<Vec<ConnectionRecord>, AttributionError> {
            Err(AttributionError::TableUnavailable("access denied".to_owned()))
        }
    }

    #[test_log::test]
    fn table_failure_is_a_miss() {
        let attributor = FlowAttributor::new_simple(FailingTable, names);
        let flow = FlowEndpoints::new(addr("10.0.0.1:50000"), addr("10.0.0.2:55000"));
        assert_eq!(attributor.attribute(&flow), None);
    }

    struct CountingTable {
        rows: Vec<ConnectionRecord>,
        queries: Cell<usize>,
    }

    impl ConnectionTable for CountingTable {
        fn connections(&self) -> Result<Vec<ConnectionRecord>, AttributionError> {
            self.queries.set(self.queries.get() + 1);
            Ok(self.rows.clone())
        }
    }

    #[test_log::test]
    fn table_is_queried_on_every_attempt() {
        let table = CountingTable {
            rows: vec![record("10.0.0.1:50000", "10.0.0.2:55000", 100)],
            queries: Cell::new(0),
        };
        let attributor = FlowAttributor::new_simple(table, names);
        let flow = FlowEndpoints::new(addr("10.0.0.1:50000"), addr("10.0.0.2:55000"));
        assert!(attributor.attribute(&flow).is_some());
        assert!(attributor.attribute(&flow).is_some());
        assert_eq!(attributor.table.queries.get(), 2);
    }

    #[test]
    fn flow_display() {
        let flow = FlowEndpoints::new(addr("10.0.0.1:50000"), addr("[::1]:80"));
        assert_eq!(flow.to_string(), "10.0.0.1:50000 <-> [::1]:80");
    }
}
