//! The node set: every server the client knows about, each with a status
//! and at most one multiplexed connection.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU32, Ordering},
    sync::Arc,
};

use tokio::net::TcpStream;

use super::{conn::Connection, establish};
use crate::{
    error::{Error, Result},
    options::{ClientOptions, ServerAddress},
};

/// The observed role of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NodeStatus {
    /// Nothing is known yet.
    Unknown,
    /// A connection attempt is in flight.
    Connecting,
    /// The node accepts writes: a replica-set primary, a mongos, or a
    /// standalone server.
    Primary,
    /// A replica-set secondary.
    Secondary,
    /// The last connection attempt failed.
    Unreachable,
}

#[derive(Debug)]
struct Node {
    status: NodeStatus,
    connection: Option<Arc<Connection>>,
}

impl Node {
    fn new() -> Self {
        Self {
            status: NodeStatus::Unknown,
            connection: None,
        }
    }

    fn live_connection(&self) -> Option<Arc<Connection>> {
        self.connection
            .as_ref()
            .filter(|conn| !conn.is_closed())
            .cloned()
    }
}

#[derive(Debug)]
struct NodeSetInner {
    nodes: HashMap<ServerAddress, Node>,
    /// Seed order first, discovered nodes after; selection sweeps in this
    /// order so behavior is deterministic.
    order: Vec<ServerAddress>,
}

impl NodeSetInner {
    fn add_node(&mut self, address: ServerAddress) {
        if !self.nodes.contains_key(&address) {
            self.nodes.insert(address.clone(), Node::new());
            self.order.push(address);
        }
    }

    /// Keeps the one-primary invariant: observing a new primary demotes any
    /// node previously believed to be one.
    fn set_status(&mut self, address: &ServerAddress, status: NodeStatus) {
        if status == NodeStatus::Primary {
            for (other_address, node) in self.nodes.iter_mut() {
                if other_address != address && node.status == NodeStatus::Primary {
                    node.status = NodeStatus::Unknown;
                }
            }
        }
        if let Some(node) = self.nodes.get_mut(address) {
            node.status = status;
        }
    }
}

/// The set of known nodes, protected by a single mutual-exclusion region
/// covering checkout, health updates, and topology changes.
#[derive(Debug)]
pub(crate) struct NodeSet {
    options: ClientOptions,
    inner: tokio::sync::Mutex<NodeSetInner>,
    next_connection_id: AtomicU32,
}

impl NodeSet {
    pub(crate) fn new(options: ClientOptions) -> Self {
        let mut inner = NodeSetInner {
            nodes: HashMap::new(),
            order: Vec::new(),
        };
        for address in &options.hosts {
            inner.add_node(address.clone());
        }

        Self {
            options,
            inner: tokio::sync::Mutex::new(inner),
            next_connection_id: AtomicU32::new(0),
        }
    }

    /// Checks out a connection: the pinned node when given, otherwise a
    /// writable one, connecting on demand.
    pub(crate) async fn acquire(
        &self,
        pinned: Option<&ServerAddress>,
    ) -> Result<Arc<Connection>> {
        let mut inner = self.inner.lock().await;

        if let Some(address) = pinned {
            inner.add_node(address.clone());
            return self.ensure_connected(&mut inner, address.clone()).await;
        }

        // A live primary wins outright.
        if let Some(conn) = self.live_with_status(&inner, NodeStatus::Primary) {
            return Ok(conn);
        }

        // Sweep the remaining nodes, connecting as needed, until one
        // reports itself writable.
        let mut last_error = None;
        for address in inner.order.clone() {
            match self.ensure_connected(&mut inner, address.clone()).await {
                Ok(conn) => {
                    if inner
                        .nodes
                        .get(&address)
                        .map(|n| n.status == NodeStatus::Primary)
                        .unwrap_or(false)
                    {
                        return Ok(conn);
                    }
                }
                Err(error) => last_error = Some(error),
            }
        }

        // No primary; fall back to any live node so read-only use keeps
        // working during an election.
        if let Some(conn) = self.live_with_status(&inner, NodeStatus::Secondary) {
            return Ok(conn);
        }

        Err(last_error.unwrap_or_else(|| {
            Error::network("no reachable node in the connection set".to_string())
        }))
    }

    fn live_with_status(
        &self,
        inner: &NodeSetInner,
        status: NodeStatus,
    ) -> Option<Arc<Connection>> {
        inner
            .order
            .iter()
            .filter_map(|address| inner.nodes.get(address))
            .filter(|node| node.status == status)
            .find_map(|node| node.live_connection())
    }

    async fn ensure_connected(
        &self,
        inner: &mut NodeSetInner,
        address: ServerAddress,
    ) -> Result<Arc<Connection>> {
        if let Some(conn) = inner.nodes.get(&address).and_then(Node::live_connection) {
            return Ok(conn);
        }

        inner.set_status(&address, NodeStatus::Connecting);
        match self.connect(&address).await {
            Ok((conn, outcome)) => {
                let conn = Arc::new(conn);
                for host in outcome.hosts {
                    inner.add_node(host);
                }
                inner.set_status(&address, outcome.status);
                if let Some(node) = inner.nodes.get_mut(&address) {
                    node.connection = Some(Arc::clone(&conn));
                }
                Ok(conn)
            }
            Err(error) => {
                inner.set_status(&address, NodeStatus::Unreachable);
                Err(error)
            }
        }
    }

    async fn connect(
        &self,
        address: &ServerAddress,
    ) -> Result<(Connection, establish::HandshakeOutcome)> {
        let target = (address.host.as_str(), address.resolved_port());

        let connect = TcpStream::connect(target);
        let mut stream = match self.options.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect).await.map_err(|_| {
                Error::network(format!(
                    "connecting to {} timed out after {:?}",
                    address,
                    self.options.connect_timeout.unwrap_or_default()
                ))
            })??,
            None => connect.await?,
        };
        stream.set_nodelay(true)?;

        let outcome = establish::handshake(&mut stream, address, &self.options).await?;

        tracing::debug!(
            target: "mongo_core::connection",
            %address,
            wire_version = ?outcome.description.wire_version,
            status = ?outcome.status,
            "connection established"
        );

        let (read_half, write_half) = stream.into_split();
        let id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
        let conn = Connection::new(id, read_half, write_half, outcome.description.clone());
        Ok((conn, outcome))
    }

    /// Marks a node unreachable after a network failure, discarding its
    /// connection.
    pub(crate) async fn mark_unreachable(&self, address: &ServerAddress) {
        let mut inner = self.inner.lock().await;
        if let Some(node) = inner.nodes.get_mut(address) {
            node.status = NodeStatus::Unreachable;
            if let Some(conn) = node.connection.take() {
                conn.close();
            }
        }
    }

    /// Closes every connection in the set.
    pub(crate) async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        for node in inner.nodes.values_mut() {
            if let Some(conn) = node.connection.take() {
                conn.close();
            }
            node.status = NodeStatus::Unknown;
        }
    }
}
