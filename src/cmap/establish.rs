//! Connection establishment: the initial `hello` exchange that negotiates
//! wire version, sessions, and compression.

use std::time::Duration;

use bson::{doc, Document};
use serde::Deserialize;
use tokio::net::TcpStream;

use super::{CommandResponse, NodeStatus, StreamDescription};
use crate::{
    compression::Compressor,
    error::{Error, ErrorKind, Result},
    options::{ClientOptions, ServerAddress},
    wire::{self, Query},
    wire_version::WireVersion,
};

/// The lifecycle of a handshake. A connection is usable only once its
/// handshake reaches `Ready`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HandshakeState {
    Init,
    Sent,
    Ready,
    Failed,
}

/// What the handshake negotiated, plus how the node described itself.
#[derive(Debug)]
pub(crate) struct HandshakeOutcome {
    pub(crate) description: StreamDescription,
    pub(crate) status: NodeStatus,
    pub(crate) hosts: Vec<ServerAddress>,
}

/// Drives the initial `hello` exchange on a fresh socket.
///
/// The first command a server sees must be legible to every wire version,
/// so it is always framed as OP_QUERY against `admin.$cmd`; `helloOk: true`
/// asks modern servers to accept `hello` thereafter.
pub(crate) async fn handshake(
    stream: &mut TcpStream,
    address: &ServerAddress,
    options: &ClientOptions,
) -> Result<HandshakeOutcome> {
    let mut state = HandshakeState::Init;

    let result = run_handshake(stream, address, options, &mut state).await;
    if result.is_err() {
        state = HandshakeState::Failed;
    }
    tracing::debug!(
        target: "mongo_core::connection",
        %address,
        ?state,
        "handshake finished"
    );
    result
}

async fn run_handshake(
    stream: &mut TcpStream,
    address: &ServerAddress,
    options: &ClientOptions,
    state: &mut HandshakeState,
) -> Result<HandshakeOutcome> {
    let mut body = doc! {
        "isMaster": 1,
        "helloOk": true,
    };
    if !options.compressors.is_empty() {
        let names: Vec<&str> = options.compressors.iter().map(|c| c.name()).collect();
        body.insert("compression", names);
    }

    let request_id = wire::next_request_id();
    Query::command("admin", body)
        .with_request_id(request_id)
        .write_to(stream)
        .await?;
    *state = HandshakeState::Sent;

    let frame = wire::read_reply_frame(stream).await?;
    if frame.response_to != request_id {
        return Err(Error::network(format!(
            "handshake reply answered request {} instead of {}",
            frame.response_to, request_id
        )));
    }

    let outcome = interpret_hello_reply(frame.document, address, options)?;
    *state = HandshakeState::Ready;
    Ok(outcome)
}

/// Maps a `hello` reply into a negotiated [`StreamDescription`] and node
/// status.
pub(crate) fn interpret_hello_reply(
    reply: Document,
    address: &ServerAddress,
    options: &ClientOptions,
) -> Result<HandshakeOutcome> {
    let response = CommandResponse::new(address.clone(), reply);
    if let Err(error) = response.validate() {
        // A speculative-authentication rejection arrives as the handshake
        // reply itself.
        if error.code() == Some(18) {
            return Err(ErrorKind::Authentication {
                message: format!("the server at {} rejected the handshake: {}", address, error),
            }
            .into());
        }
        return Err(error);
    }
    let hello: HelloReply = response.body()?;

    if hello.max_wire_version < WireVersion::V3_0.level() {
        return Err(ErrorKind::UnsupportedOperation {
            required: WireVersion::V3_0,
            actual: WireVersion::coerce(hello.max_wire_version),
        }
        .into());
    }

    // A node from the wrong replica set is unusable, but other seeds may
    // still match.
    if let Some(ref expected) = options.repl_set_name {
        if hello.set_name.as_ref() != Some(expected) {
            return Err(Error::network(format!(
                "the node at {} reports replica set {:?}, expected {:?}",
                address, hello.set_name, expected
            )));
        }
    }

    let wire_version = WireVersion::coerce(hello.max_wire_version);
    let compressor = Compressor::negotiate(&options.compressors, &hello.compression);

    let description = StreamDescription {
        server_address: address.clone(),
        wire_version,
        logical_session_timeout: hello
            .logical_session_timeout_minutes
            .map(|minutes| Duration::from_secs(minutes as u64 * 60)),
        compressor,
    };

    let hosts = hello
        .hosts
        .iter()
        .filter_map(|h| ServerAddress::parse(h).ok())
        .collect();

    Ok(HandshakeOutcome {
        description,
        status: hello.status(),
        hosts,
    })
}

/// The subset of a `hello` reply the core acts on.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HelloReply {
    /// Whether the server is writable: a primary, a mongos, or a standalone.
    is_writable_primary: Option<bool>,

    /// Legacy name for `is_writable_primary`.
    #[serde(rename = "ismaster")]
    is_master: Option<bool>,

    /// Contains `"isdbgrid"` when the reply comes from a mongos.
    msg: Option<String>,

    /// The name of the replica set, when the node belongs to one.
    set_name: Option<String>,

    /// Whether the node is a secondary.
    secondary: Option<bool>,

    /// The other members of the replica set.
    #[serde(default)]
    hosts: Vec<String>,

    /// The compressors the server is willing to use.
    #[serde(default)]
    compression: Vec<String>,

    /// How long the server keeps idle sessions, in minutes.
    logical_session_timeout_minutes: Option<i64>,

    /// The highest protocol level the server speaks.
    #[serde(default)]
    max_wire_version: i32,
}

impl HelloReply {
    fn status(&self) -> NodeStatus {
        let writable = self.is_writable_primary == Some(true) || self.is_master == Some(true);
        if self.msg.as_deref() == Some("isdbgrid") {
            // A mongos accepts writes like a primary does.
            NodeStatus::Primary
        } else if self.set_name.is_some() {
            if writable {
                NodeStatus::Primary
            } else if self.secondary == Some(true) {
                NodeStatus::Secondary
            } else {
                NodeStatus::Unknown
            }
        } else if writable {
            // A standalone server fills the primary role.
            NodeStatus::Primary
        } else {
            NodeStatus::Unknown
        }
    }
}
