//! The database handle: a cheap immutable value through which operations,
//! sessions, and transactions are driven.

use bson::{Bson, Document};

use crate::{
    client::Client,
    coll::{options::AggregateOptions, Collection},
    concern::WriteConcern,
    cursor::Cursor,
    error::{Error, Result},
    failover::FailoverStrategy,
    operation::{
        AbortTransaction, Aggregate, AggregateTarget, CommitTransaction, Create, DropDatabase,
        EndSessions, ListCollections, Operation, RenameCollection, RunCommand, StartSession,
    },
    session::{Session, TransactionState},
};

/// `Database` is the client-side handle to a MongoDB database.
///
/// Handles are immutable values: operations that change what a handle
/// carries, such as [`Database::start_session`], return a *new* handle and
/// leave the receiver untouched. Comparing handles with `==` therefore
/// distinguishes a session-bearing handle from its predecessor.
#[derive(Clone, Debug)]
pub struct Database {
    client: Client,
    name: String,
    failover: FailoverStrategy,
    session: Option<Session>,
}

impl PartialEq for Database {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.session.as_ref().map(Session::uuid) == other.session.as_ref().map(Session::uuid)
    }
}

impl Database {
    pub(crate) fn new(
        client: Client,
        name: &str,
        failover: FailoverStrategy,
        session: Option<Session>,
    ) -> Self {
        Self {
            client,
            name: name.to_string(),
            failover,
            session,
        }
    }

    /// The name of this database.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The session attached to this handle, if any.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// The failover strategy operations through this handle run under.
    pub fn failover(&self) -> &FailoverStrategy {
        &self.failover
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn write_concern(&self) -> Option<WriteConcern> {
        self.client.options().write_concern.clone()
    }

    pub(crate) async fn execute<T: Operation>(&self, op: T) -> Result<T::O> {
        self.client
            .execute_operation(op, self.session.as_ref(), &self.failover)
            .await
    }

    /// Gets a handle to the collection `name`. No I/O is performed.
    pub fn collection(&self, name: &str) -> Collection {
        Collection::new(self.clone(), name)
    }

    /// Creates the collection `name` explicitly. When `fail_if_exists` is
    /// false, an already existing collection is treated as success.
    pub async fn create(&self, name: &str, fail_if_exists: bool) -> Result<()> {
        let create = Create::new(
            crate::coll::Namespace {
                db: self.name.clone(),
                coll: name.to_string(),
            },
            fail_if_exists,
            self.write_concern(),
        );
        self.execute(create).await
    }

    /// Drops the whole database. Dropping a database that does not exist is
    /// success.
    pub async fn drop(&self) -> Result<()> {
        let drop = DropDatabase::new(self.name.clone(), self.write_concern());
        self.execute(drop).await
    }

    /// The names of the collections in this database.
    pub async fn collection_names(&self) -> Result<Vec<String>> {
        let list = ListCollections::new(self.name.clone(), None, true);
        let spec = self.execute(list).await?;

        let documents = if spec.is_exhausted() {
            spec.initial_buffer.into_iter().collect()
        } else {
            Cursor::new(self.client.clone(), spec, None, self.session.clone())
                .collect()
                .await?
        };

        documents
            .into_iter()
            .map(|doc| match doc.get("name") {
                Some(Bson::String(name)) => Ok(name.clone()),
                _ => Err(Error::invalid_response(
                    "listCollections reply entry carried no name",
                )),
            })
            .collect()
    }

    /// Renames `from` to `to` within database `db`.
    ///
    /// The underlying command is only accepted on the `admin` database, so
    /// this handle must be one; any other handle fails client-side.
    pub async fn rename_collection(&self, db: &str, from: &str, to: &str) -> Result<()> {
        if self.name != "admin" {
            return Err(Error::invalid_argument(format!(
                "renameCollection must be issued through the admin database, not {}",
                self.name
            )));
        }

        let rename = RenameCollection::new(
            db.to_string(),
            from.to_string(),
            to.to_string(),
            false,
            self.write_concern(),
        );
        self.execute(rename).await
    }

    /// Runs an arbitrary command against this database and returns the raw
    /// reply document.
    pub async fn run_command(&self, command: Document) -> Result<Document> {
        let run = RunCommand::new(self.name.clone(), command)?;
        self.execute(run).await
    }

    /// Runs a database-level aggregation (`aggregate: 1`).
    pub async fn aggregate(
        &self,
        pipeline: impl IntoIterator<Item = crate::aggregation::PipelineStage>,
        options: impl Into<Option<AggregateOptions>>,
    ) -> Result<Cursor> {
        let options = options.into();
        let batch_size = options.as_ref().and_then(|o| o.batch_size);
        let pipeline: Vec<Document> = pipeline.into_iter().map(|s| s.to_document()).collect();
        let aggregate = Aggregate::new(
            AggregateTarget::Database(self.name.clone()),
            pipeline,
            options,
        );
        let spec = self.execute(aggregate).await?;
        Ok(Cursor::new(
            self.client.clone(),
            spec,
            batch_size,
            self.session.clone(),
        ))
    }

    // ===== sessions =====

    /// Starts a logical session on the server and returns a new handle
    /// carrying it.
    ///
    /// If this handle already has a session: an error when
    /// `fail_if_already_started`, otherwise a no-op returning an equivalent
    /// handle.
    pub async fn start_session(&self, fail_if_already_started: bool) -> Result<Database> {
        if self.session.is_some() {
            if fail_if_already_started {
                return Err(Error::session(
                    "a session is already started on this handle",
                ));
            }
            return Ok(self.clone());
        }

        let id = self
            .client
            .execute_operation(StartSession, None, &self.failover)
            .await?;
        let session = Session::from_server_id(id)?;
        self.client.register_session(&session);

        Ok(Database::new(
            self.client.clone(),
            &self.name,
            self.failover.clone(),
            Some(session),
        ))
    }

    /// Ends this handle's session on the server and returns a session-less
    /// handle.
    ///
    /// Without a session: an error when `fail_if_not_started`, otherwise a
    /// no-op returning an equivalent handle.
    pub async fn end_session(&self, fail_if_not_started: bool) -> Result<Database> {
        let session = match self.session {
            Some(ref session) => session,
            None => {
                if fail_if_not_started {
                    return Err(Error::session("no session is started on this handle"));
                }
                return Ok(self.clone());
            }
        };

        let end = EndSessions::new(vec![session.id().clone()]);
        self.client
            .execute_operation(end, None, &self.failover)
            .await?;

        let mut state = session.lock().await;
        state.force_abort();
        state.destroyed = true;
        drop(state);
        self.client.unregister_session(session);

        Ok(Database::new(
            self.client.clone(),
            &self.name,
            self.failover.clone(),
            None,
        ))
    }

    /// Drops this handle's session locally, without a server round trip.
    /// Any transaction the session carried is aborted locally. Always
    /// succeeds, returning a session-less handle.
    pub async fn kill_session(&self) -> Database {
        if let Some(ref session) = self.session {
            let mut state = session.lock().await;
            state.force_abort();
            state.destroyed = true;
            drop(state);
            self.client.unregister_session(session);
        }

        Database::new(self.client.clone(), &self.name, self.failover.clone(), None)
    }

    // ===== transactions =====

    /// Starts a transaction on this handle's session, incrementing the
    /// session's transaction number.
    ///
    /// With a transaction already running: an error when
    /// `fail_if_already_started`, otherwise a no-op.
    pub async fn start_transaction(
        &self,
        write_concern: Option<WriteConcern>,
        fail_if_already_started: bool,
    ) -> Result<()> {
        let session = self.require_session()?;
        let mut state = session.lock().await;
        state.check_usable()?;

        match state.transaction {
            TransactionState::Starting | TransactionState::InProgress => {
                if fail_if_already_started {
                    Err(Error::transaction(
                        "a transaction is already started on this session",
                    ))
                } else {
                    Ok(())
                }
            }
            TransactionState::None | TransactionState::Committed | TransactionState::Aborted => {
                state.start_transaction(write_concern);
                Ok(())
            }
        }
    }

    /// Commits the running transaction.
    ///
    /// Without a running transaction: an error when `fail_if_not_started`,
    /// otherwise a no-op.
    pub async fn commit_transaction(&self, fail_if_not_started: bool) -> Result<()> {
        let session = self.require_session()?;
        let write_concern = {
            let mut state = session.lock().await;
            match state.transaction {
                TransactionState::None
                | TransactionState::Committed
                | TransactionState::Aborted => {
                    return if fail_if_not_started {
                        Err(Error::transaction("no transaction to commit"))
                    } else {
                        Ok(())
                    };
                }
                TransactionState::Starting => {
                    // Nothing reached the server; the commit is local.
                    state.transaction = TransactionState::Committed;
                    state.pinned = None;
                    state.txn_write_concern = None;
                    return Ok(());
                }
                TransactionState::InProgress => state.txn_write_concern.clone(),
            }
        };

        // The state stays InProgress until the server acknowledges, so a
        // cancelled commit can be committed or aborted explicitly later.
        let commit = CommitTransaction::new(write_concern);
        self.client
            .execute_operation(commit, Some(session), &self.failover)
            .await?;

        let mut state = session.lock().await;
        state.transaction = TransactionState::Committed;
        state.pinned = None;
        state.txn_write_concern = None;
        Ok(())
    }

    /// Aborts the running transaction. The server treating the transaction
    /// as already gone (code 251) counts as success.
    ///
    /// Without a running transaction: an error when `fail_if_not_started`,
    /// otherwise a no-op.
    pub async fn abort_transaction(&self, fail_if_not_started: bool) -> Result<()> {
        let session = self.require_session()?;
        let mut state = session.lock().await;

        match state.transaction {
            TransactionState::None | TransactionState::Committed | TransactionState::Aborted => {
                if fail_if_not_started {
                    Err(Error::transaction("no transaction to abort"))
                } else {
                    Ok(())
                }
            }
            TransactionState::Starting => {
                state.force_abort();
                Ok(())
            }
            TransactionState::InProgress => {
                let write_concern = state.txn_write_concern.clone();
                drop(state);

                let abort = AbortTransaction::new(write_concern);
                let result = self
                    .client
                    .execute_operation(abort, Some(session), &self.failover)
                    .await;

                // Locally the transaction is over either way.
                let mut state = session.lock().await;
                state.force_abort();
                result
            }
        }
    }

    fn require_session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::session("this handle has no session; call start_session first"))
    }
}
