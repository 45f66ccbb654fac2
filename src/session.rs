//! Logical sessions and the transaction state machine.
//!
//! A [`Session`] groups commands under one server-side `lsid` and carries
//! the transaction state for that session. Handles that share a session
//! share this state; the session's async mutex also serializes command
//! execution, so two commands on the same session never race on the wire.

use std::sync::Arc;

use bson::{doc, spec::BinarySubtype, Binary, Bson, Document};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::{concern::WriteConcern, error::Result, options::ServerAddress};

/// A logical session: an `lsid`, a monotonically increasing transaction
/// number, and the state of the transaction currently associated with the
/// session, if any.
///
/// Obtained with [`Database::start_session`](crate::Database::start_session);
/// cloning shares the underlying state.
#[derive(Clone, Debug)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    /// The `lsid` document embedded in every command of the session.
    id: Document,
    uuid: Uuid,
    state: Mutex<SessionState>,
}

/// The mutable half of a session, guarded by the session's mutex for the
/// whole duration of each command dispatched under it.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) txn_number: i64,
    pub(crate) transaction: TransactionState,
    /// The address of the node that accepted the first in-transaction
    /// command; set while a transaction is active.
    pub(crate) pinned: Option<ServerAddress>,
    /// The write concern the active transaction commits or aborts with.
    pub(crate) txn_write_concern: Option<WriteConcern>,
    /// Set by `killSession` and `endSession`; a destroyed session rejects
    /// all further use.
    pub(crate) destroyed: bool,
}

/// The transaction lifecycle. `Committed` and `Aborted` are terminal for
/// the transaction, not the session: the same session may start another
/// transaction, which increments the transaction number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TransactionState {
    None,
    Starting,
    InProgress,
    Committed,
    Aborted,
}

impl Session {
    /// Wraps a server-issued session id document.
    pub(crate) fn from_server_id(id: Document) -> Result<Self> {
        let uuid = match id.get("id") {
            Some(Bson::Binary(Binary {
                subtype: BinarySubtype::Uuid,
                bytes,
            })) if bytes.len() == 16 => {
                let mut raw = [0u8; 16];
                raw.copy_from_slice(bytes);
                Uuid::from_bytes(raw)
            }
            _ => {
                return Err(crate::error::Error::invalid_response(
                    "session id is not a 16-byte UUID",
                ))
            }
        };
        Ok(Self::with_parts(id, uuid))
    }

    /// Creates a session with a client-side generated id, for servers that
    /// never answer `startSession` (and for tests).
    pub(crate) fn generate() -> Self {
        let uuid = Uuid::new_v4();
        let id = doc! {
            "id": Binary {
                subtype: BinarySubtype::Uuid,
                bytes: uuid.as_bytes().to_vec(),
            },
        };
        Self::with_parts(id, uuid)
    }

    fn with_parts(id: Document, uuid: Uuid) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                uuid,
                state: Mutex::new(SessionState {
                    txn_number: 0,
                    transaction: TransactionState::None,
                    pinned: None,
                    txn_write_concern: None,
                    destroyed: false,
                }),
            }),
        }
    }

    /// The `lsid` document of this session.
    pub fn id(&self) -> &Document {
        &self.inner.id
    }

    /// The UUID inside the `lsid`.
    pub fn uuid(&self) -> Uuid {
        self.inner.uuid
    }

    /// The transaction number most recently used by this session.
    pub async fn txn_number(&self) -> i64 {
        self.inner.state.lock().await.txn_number
    }

    /// Locks the session state, serializing commands on this session.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().await
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.inner.uuid == other.inner.uuid
    }
}

impl Eq for Session {}

/// A non-owning session reference, held by the client's registry so that
/// shutdown can end whatever sessions are still alive without keeping them
/// alive itself.
#[derive(Clone, Debug)]
pub(crate) struct WeakSession {
    inner: std::sync::Weak<SessionInner>,
}

impl Session {
    pub(crate) fn downgrade(&self) -> WeakSession {
        WeakSession {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl WeakSession {
    pub(crate) fn upgrade(&self) -> Option<Session> {
        self.inner.upgrade().map(|inner| Session { inner })
    }
}

impl SessionState {
    pub(crate) fn in_transaction(&self) -> bool {
        matches!(
            self.transaction,
            TransactionState::Starting | TransactionState::InProgress
        )
    }

    /// Fails if the session was ended or killed.
    pub(crate) fn check_usable(&self) -> Result<()> {
        if self.destroyed {
            Err(crate::error::Error::session(
                "the session has been ended and can no longer be used",
            ))
        } else {
            Ok(())
        }
    }

    /// Begins a new transaction, bumping the transaction number.
    pub(crate) fn start_transaction(&mut self, write_concern: Option<WriteConcern>) {
        self.txn_number += 1;
        self.transaction = TransactionState::Starting;
        self.txn_write_concern = write_concern;
        self.pinned = None;
    }

    /// Forces the transaction into `Aborted` without server contact, as
    /// `killSession` does.
    pub(crate) fn force_abort(&mut self) {
        if self.in_transaction() {
            self.transaction = TransactionState::Aborted;
        }
        self.pinned = None;
        self.txn_write_concern = None;
    }
}
