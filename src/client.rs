//! The driver entry point and the operation dispatcher.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    cmap::NodeSet,
    concern::ReadConcern,
    db::Database,
    error::{ErrorKind, Result},
    failover::{self, FailoverStrategy},
    operation::{check_wire_version, AbortTransaction, CommitTransaction, KillSessions, Operation},
    options::{ClientOptions, ServerAddress},
    session::{Session, SessionState, TransactionState, WeakSession},
    wire_version::WireVersion,
};

/// The entry point of the driver: holds the node set and hands out
/// [`Database`] handles.
///
/// `Client` uses `Arc` internally, so it can be cloned and shared across
/// tasks cheaply. Connections are established lazily, on the first
/// operation that needs one.
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    options: ClientOptions,
    nodes: NodeSet,
    /// Live sessions by LSID, weakly held so shutdown can end whatever the
    /// application has not already ended.
    sessions: Mutex<HashMap<Uuid, WeakSession>>,
}

impl Client {
    /// Creates a client from parsed options. No I/O happens here.
    pub fn connect(options: ClientOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                nodes: NodeSet::new(options.clone()),
                options,
                sessions: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Creates a client from a `mongodb://` connection string.
    pub async fn with_uri_str(uri: &str) -> Result<Self> {
        Self::connect(ClientOptions::parse(uri)?)
    }

    /// The options this client was created with.
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Returns a handle to the named database, waiting under the client's
    /// default failover strategy until a node is reachable.
    pub async fn database(&self, name: &str) -> Result<Database> {
        self.database_with(name, self.inner.options.failover.clone())
            .await
    }

    /// Returns a handle to the named database with its own failover
    /// strategy.
    ///
    /// Node availability is verified (and retried per the strategy) before
    /// the handle is returned; the handle itself is a cheap value.
    pub async fn database_with(&self, name: &str, failover: FailoverStrategy) -> Result<Database> {
        let deadline = self.operation_deadline();
        let nodes = &self.inner.nodes;
        failover::with_retries(&failover, deadline, move || async move {
            nodes.acquire(None).await.map(drop)
        })
        .await?;

        Ok(Database::new(self.clone(), name, failover, None))
    }

    /// Returns a handle to the database named in the connection string
    /// path, if one was given.
    pub async fn default_database(&self) -> Result<Option<Database>> {
        match self.inner.options.default_database.clone() {
            Some(name) => self.database(&name).await.map(Some),
            None => Ok(None),
        }
    }

    /// Kills all live sessions on the server and closes every connection.
    /// The client is unusable afterwards.
    pub async fn shutdown(&self) {
        let session_ids: Vec<_> = {
            let sessions = self.inner.sessions.lock().expect("session registry poisoned");
            sessions
                .values()
                .filter_map(WeakSession::upgrade)
                .map(|s| s.id().clone())
                .collect()
        };

        if !session_ids.is_empty() {
            let kill = KillSessions::new(session_ids);
            if let Err(error) = self
                .execute_operation(kill, None, &FailoverStrategy::default())
                .await
            {
                tracing::warn!(
                    target: "mongo_core::command",
                    %error,
                    "failed to kill outstanding sessions during shutdown"
                );
            }
        }

        self.inner.nodes.shutdown().await;
    }

    pub(crate) fn register_session(&self, session: &Session) {
        self.inner
            .sessions
            .lock()
            .expect("session registry poisoned")
            .insert(session.uuid(), session.downgrade());
    }

    pub(crate) fn unregister_session(&self, session: &Session) {
        self.inner
            .sessions
            .lock()
            .expect("session registry poisoned")
            .remove(&session.uuid());
    }

    fn operation_deadline(&self) -> Option<Instant> {
        self.inner
            .options
            .socket_timeout
            .map(|timeout| Instant::now() + timeout)
    }

    /// Executes an operation under a failover strategy, optionally inside a
    /// session. Commands on a session are serialized: the session is locked
    /// for the whole send/await span of each attempt.
    pub(crate) async fn execute_operation<T: Operation>(
        &self,
        op: T,
        session: Option<&Session>,
        failover: &FailoverStrategy,
    ) -> Result<T::O> {
        // `retryWrites=false` turns the schedule off for writes; transient
        // read failures are still retried.
        let single_attempt;
        let failover = if op.is_write() && self.inner.options.retry_writes == Some(false) {
            single_attempt = FailoverStrategy {
                retries: 0,
                ..failover.clone()
            };
            &single_attempt
        } else {
            failover
        };

        let deadline = self.operation_deadline();
        let op = &op;
        failover::with_retries(failover, deadline, move || async move {
            match session {
                Some(session) => {
                    let mut state = session.lock().await;
                    state.check_usable()?;
                    self.execute_with_state(op, Some((session, &mut state)), None, deadline)
                        .await
                }
                None => self.execute_with_state(op, None, None, deadline).await,
            }
        })
        .await
    }

    /// Executes an operation exactly once, routed to a specific node: the
    /// path used for cursor continuation, which must stay on the server
    /// that owns the cursor.
    pub(crate) async fn execute_pinned<T: Operation>(
        &self,
        op: T,
        address: &ServerAddress,
        session: Option<&Session>,
    ) -> Result<T::O> {
        let deadline = self.operation_deadline();
        match session {
            Some(session) => {
                let mut state = session.lock().await;
                state.check_usable()?;
                self.execute_with_state(&op, Some((session, &mut state)), Some(address), deadline)
                    .await
            }
            None => {
                self.execute_with_state(&op, None, Some(address), deadline)
                    .await
            }
        }
    }

    async fn execute_with_state<T: Operation>(
        &self,
        op: &T,
        mut session: Option<(&Session, &mut SessionState)>,
        route: Option<&ServerAddress>,
        deadline: Option<Instant>,
    ) -> Result<T::O> {
        // In-transaction commands are pinned to the node that accepted the
        // first one.
        let pinned = session
            .as_ref()
            .and_then(|(_, state)| state.pinned.clone());
        let route = route.or(pinned.as_ref());

        let conn = self.inner.nodes.acquire(route).await?;
        let description = conn.description();
        check_wire_version(op, description)?;

        let mut command = op.build(description)?;
        let is_transaction_op =
            T::NAME == CommitTransaction::NAME || T::NAME == AbortTransaction::NAME;

        if let Some((session, state)) = session.as_ref() {
            if !description.wire_version.supports_sessions() {
                return Err(ErrorKind::UnsupportedOperation {
                    required: WireVersion::V3_6,
                    actual: description.wire_version,
                }
                .into());
            }
            command.body.insert("lsid", session.id().clone());

            if state.in_transaction() || is_transaction_op {
                if !description.wire_version.supports_transactions() {
                    return Err(ErrorKind::UnsupportedOperation {
                        required: WireVersion::V4_0,
                        actual: description.wire_version,
                    }
                    .into());
                }
                command.body.insert("txnNumber", state.txn_number);
                command.body.insert("autocommit", false);
                if state.transaction == TransactionState::Starting && !is_transaction_op {
                    command.body.insert("startTransaction", true);
                    // Transactional reads see a single snapshot throughout.
                    command
                        .body
                        .insert("readConcern", ReadConcern::snapshot().to_document());
                }
            }
        }

        tracing::debug!(
            target: "mongo_core::command",
            command = %command.name,
            db = %command.target_db,
            address = %conn.address(),
            "dispatching command"
        );

        let response = match conn.send_command(command, deadline).await {
            Ok(response) => response,
            Err(error) => {
                if error.is_network_error() {
                    self.inner.nodes.mark_unreachable(conn.address()).await;
                }
                return Err(error);
            }
        };

        let address = response.source_address().clone();
        let result = op.handle_response(response)?;

        // The first accepted command of a transaction moves it to
        // InProgress and pins its node.
        if let Some((_, state)) = session.as_mut() {
            if state.transaction == TransactionState::Starting && !is_transaction_op {
                state.transaction = TransactionState::InProgress;
                state.pinned = Some(address);
            }
        }

        Ok(result)
    }
}
