// src/topology.rs

//! Collective-communication topology for one training round.
//!
//! Every participating worker receives the same ordered machine list plus
//! its own listen port; the local view is what gets injected into the
//! trainer parameters on that worker.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoordinatorError, Result};
use crate::substrate::WorkerId;

/// A worker's reachable host and port, stripped of any scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerAddress {
    host: String,
    port: u16,
}

impl WorkerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse an address of the form `[scheme://]host:port`.
    ///
    /// The scheme is recognized by the last `://` in the string and
    /// discarded; the port is split off at the last `:` so IPv6-style
    /// hosts with embedded colons keep working.
    ///
    /// # Errors
    ///
    /// Returns `AddressFormat` when the port separator is missing, the
    /// host is empty, or the port is not a valid number.
    pub fn parse(address: &str) -> Result<Self> {
        let without_scheme = match address.rsplit_once("://") {
            Some((_, rest)) => rest,
            None => address,
        };

        let (host, port) = without_scheme.rsplit_once(':').ok_or_else(|| {
            CoordinatorError::address_format(address, "missing ':' port separator")
        })?;

        if host.is_empty() {
            return Err(CoordinatorError::address_format(address, "empty host"));
        }

        let port = port.parse::<u16>().map_err(|_| {
            CoordinatorError::address_format(address, format!("invalid port '{}'", port))
        })?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The address rewritten to a different port.
    pub fn with_port(&self, port: u16) -> Self {
        Self {
            host: self.host.clone(),
            port,
        }
    }
}

impl fmt::Display for WorkerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One worker's view of the collective ring.
///
/// `machines` is identical on every participant (same entries, same
/// order); only `local_listen_port` differs per worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkTopology {
    machines: String,
    local_listen_port: u16,
    num_machines: usize,
    listen_timeout_secs: u64,
}

impl NetworkTopology {
    /// Build the ring view for `local` out of the full participant list.
    ///
    /// Worker `i` in list order listens on `base_port + i`; the machine
    /// list pairs each worker's parsed host with its assigned port, so
    /// several workers sharing one host get distinct ports.
    ///
    /// # Errors
    ///
    /// Returns `Topology` when the participant list is empty, `local` is
    /// not in it, or a port assignment overflows `u16`. Address parse
    /// failures surface as `AddressFormat`.
    pub fn build(
        workers: &[WorkerId],
        local: &WorkerId,
        base_port: u16,
        listen_timeout_secs: u64,
    ) -> Result<Self> {
        if workers.is_empty() {
            return Err(CoordinatorError::topology(
                "cannot build a ring with no participating workers",
            ));
        }

        let mut machines = Vec::with_capacity(workers.len());
        let mut local_listen_port = None;
        for (i, worker) in workers.iter().enumerate() {
            let offset = u16::try_from(i).ok().and_then(|i| base_port.checked_add(i));
            let port = offset.ok_or_else(|| {
                CoordinatorError::topology(format!(
                    "listen port overflow: base {} with {} workers",
                    base_port,
                    workers.len()
                ))
            })?;

            let address = WorkerAddress::parse(worker.as_str())?;
            machines.push(address.with_port(port).to_string());
            if worker == local {
                local_listen_port = Some(port);
            }
        }

        let local_listen_port = local_listen_port.ok_or_else(|| {
            CoordinatorError::topology(format!(
                "local worker {} is not in the participant list",
                local
            ))
        })?;

        Ok(Self {
            machines: machines.join(","),
            local_listen_port,
            num_machines: workers.len(),
            listen_timeout_secs,
        })
    }

    /// Comma-joined `host:port` entries, in participant order.
    pub fn machines(&self) -> &str {
        &self.machines
    }

    pub fn local_listen_port(&self) -> u16 {
        self.local_listen_port
    }

    pub fn num_machines(&self) -> usize {
        self.num_machines
    }

    pub fn listen_timeout_secs(&self) -> u64 {
        self.listen_timeout_secs
    }
}
