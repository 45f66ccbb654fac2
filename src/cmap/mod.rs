//! Connection management: per-socket lifecycle, handshakes, and the node
//! set the failover engine selects from.

pub(crate) mod command;
mod conn;
mod establish;
mod pool;

use std::time::Duration;

pub(crate) use self::{
    command::{Command, CommandResponse},
    pool::{NodeSet, NodeStatus},
};
use crate::{compression::Compressor, options::ServerAddress, wire_version::WireVersion};

/// Information negotiated during a connection's handshake.
#[derive(Clone, Debug)]
pub(crate) struct StreamDescription {
    /// The address this connection is established to.
    pub(crate) server_address: ServerAddress,

    /// The wire version negotiated with the server.
    pub(crate) wire_version: WireVersion,

    /// How long the server keeps idle logical sessions alive.
    pub(crate) logical_session_timeout: Option<Duration>,

    /// The compressor negotiated for post-handshake traffic.
    pub(crate) compressor: Option<Compressor>,
}

impl StreamDescription {
    /// A description suitable for tests that never touch a socket.
    #[cfg(test)]
    pub(crate) fn new_testing() -> Self {
        Self {
            server_address: ServerAddress {
                host: "localhost".to_string(),
                port: None,
            },
            wire_version: WireVersion::V6_0,
            logical_session_timeout: Some(Duration::from_secs(30 * 60)),
            compressor: None,
        }
    }
}
