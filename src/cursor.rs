//! Server-side cursors and the lazy streams that drain them.

use std::{
    collections::VecDeque,
    pin::Pin,
    task::{Context, Poll},
};

use bson::Document;
use futures_core::Stream;
use futures_util::{future::BoxFuture, FutureExt};

use crate::{
    client::Client,
    coll::Namespace,
    error::Result,
    operation::{CursorInfo, GetMoreResult},
    options::ServerAddress,
    session::Session,
};

/// Everything needed to continue iterating a cursor the server returned:
/// its id, namespace, the address that owns it, and the eagerly
/// materialized first batch. A cursor id of 0 means the server already
/// exhausted it.
#[derive(Debug)]
pub(crate) struct CursorSpecification {
    pub(crate) ns: Namespace,
    pub(crate) address: ServerAddress,
    pub(crate) id: i64,
    pub(crate) batch_size: Option<u32>,
    pub(crate) initial_buffer: VecDeque<Document>,
}

impl CursorSpecification {
    pub(crate) fn new(info: CursorInfo, address: ServerAddress, batch_size: Option<u32>) -> Self {
        let batch = if info.first_batch.is_empty() {
            info.next_batch
        } else {
            info.first_batch
        };
        let ns = match info.ns.split_once('.') {
            Some((db, coll)) => Namespace {
                db: db.to_string(),
                coll: coll.to_string(),
            },
            None => Namespace {
                db: info.ns,
                coll: String::new(),
            },
        };

        Self {
            ns,
            address,
            id: info.id,
            batch_size,
            initial_buffer: batch.into(),
        }
    }

    pub(crate) fn id(&self) -> i64 {
        self.id
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.id == 0
    }

    #[cfg(test)]
    pub(crate) fn namespace(&self) -> &Namespace {
        &self.ns
    }
}

/// A lazy stream over the documents of a server-side cursor.
///
/// The first batch is yielded from memory; further batches are fetched with
/// `getMore` commands pinned to the server that created the cursor. Dropping
/// a `Cursor` whose server side is still live issues a best-effort
/// `killCursors`.
#[must_use = "streams do nothing unless polled"]
pub struct Cursor {
    client: Client,
    ns: Namespace,
    address: ServerAddress,
    id: i64,
    batch_size: Option<u32>,
    session: Option<Session>,
    buffer: VecDeque<Document>,
    state: PollState,
}

enum PollState {
    Idle,
    Fetching(BoxFuture<'static, Result<GetMoreResult>>),
}

impl Cursor {
    pub(crate) fn new(
        client: Client,
        spec: CursorSpecification,
        batch_size: Option<u32>,
        session: Option<Session>,
    ) -> Self {
        Self {
            client,
            ns: spec.ns,
            address: spec.address,
            id: spec.id,
            batch_size: batch_size.or(spec.batch_size),
            session,
            buffer: spec.initial_buffer,
            state: PollState::Idle,
        }
    }

    /// Drains the entire cursor into memory.
    pub async fn collect(mut self) -> Result<Vec<Document>> {
        use futures_util::StreamExt;

        let mut documents = Vec::new();
        while let Some(doc) = self.next().await {
            documents.push(doc?);
        }
        Ok(documents)
    }

    fn start_get_more(&mut self) -> BoxFuture<'static, Result<GetMoreResult>> {
        let client = self.client.clone();
        let ns = self.ns.clone();
        let address = self.address.clone();
        let id = self.id;
        let batch_size = self.batch_size;
        let session = self.session.clone();

        async move {
            let get_more = crate::operation::GetMore::new(ns, id, batch_size);
            client
                .execute_pinned(get_more, &address, session.as_ref())
                .await
        }
        .boxed()
    }
}

impl Stream for Cursor {
    type Item = Result<Document>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(doc) = self.buffer.pop_front() {
                return Poll::Ready(Some(Ok(doc)));
            }
            if self.id == 0 {
                return Poll::Ready(None);
            }

            match self.state {
                PollState::Idle => {
                    let future = self.start_get_more();
                    self.state = PollState::Fetching(future);
                }
                PollState::Fetching(ref mut future) => match future.poll_unpin(cx) {
                    Poll::Ready(Ok(result)) => {
                        self.id = result.id;
                        self.buffer = result.batch.into();
                        self.state = PollState::Idle;
                    }
                    Poll::Ready(Err(error)) => {
                        self.state = PollState::Idle;
                        return Poll::Ready(Some(Err(error)));
                    }
                    Poll::Pending => return Poll::Pending,
                },
            }
        }
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if self.id == 0 {
            return;
        }

        // The reply to this is irrelevant; the point is not to leak the
        // server-side cursor when the stream is cancelled mid-iteration.
        let client = self.client.clone();
        let ns = self.ns.clone();
        let address = self.address.clone();
        let id = self.id;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let kill = crate::operation::KillCursors::new(ns, vec![id]);
                if let Err(error) = client.execute_pinned(kill, &address, None).await {
                    tracing::warn!(
                        target: "mongo_core::command",
                        cursor_id = id,
                        %error,
                        "failed to kill dropped cursor"
                    );
                }
            });
        }
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Cursor")
            .field("ns", &self.ns)
            .field("id", &self.id)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}
