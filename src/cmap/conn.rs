use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use tokio::{
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    sync::oneshot,
    task::JoinHandle,
    time::Instant,
};

use super::{Command, CommandResponse, StreamDescription};
use crate::{
    error::{Error, ErrorKind, Result},
    wire::{self, next_request_id, Message, Query, ReplyFrame},
};

/// A single established connection: one writer, one reader task
/// demultiplexing replies to their waiters by request id.
#[derive(Debug)]
pub(crate) struct Connection {
    pub(crate) id: u32,
    description: StreamDescription,
    write_half: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: Arc<Mutex<PendingRequests>>,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

type PendingRequests = HashMap<i32, oneshot::Sender<Result<ReplyFrame>>>;

impl Connection {
    /// Wraps an already-handshaken socket, spawning its reader task.
    pub(crate) fn new(
        id: u32,
        read_half: OwnedReadHalf,
        write_half: OwnedWriteHalf,
        description: StreamDescription,
    ) -> Self {
        let pending: Arc<Mutex<PendingRequests>> = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(reader_loop(
            read_half,
            Arc::clone(&pending),
            Arc::clone(&closed),
            description.server_address.to_string(),
        ));

        Self {
            id,
            description,
            write_half: tokio::sync::Mutex::new(write_half),
            pending,
            closed,
            reader,
        }
    }

    pub(crate) fn description(&self) -> &StreamDescription {
        &self.description
    }

    pub(crate) fn address(&self) -> &crate::options::ServerAddress {
        &self.description.server_address
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Executes a `Command` and returns a `CommandResponse` containing the
    /// result from the server.
    ///
    /// An `Ok(...)` result means the server received the command and the
    /// driver received the reply; it implies nothing about the success of
    /// the command itself.
    pub(crate) async fn send_command(
        &self,
        command: Command,
        deadline: Option<Instant>,
    ) -> Result<CommandResponse> {
        if self.is_closed() {
            return Err(Error::network(format!(
                "connection {} to {} is closed",
                self.id,
                self.address()
            )));
        }

        let request_id = next_request_id();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending request map poisoned")
            .insert(request_id, tx);

        // Requests are dispatched in submission order: the write half is
        // held for the whole frame write.
        let write_result = self.write_frame(&command, request_id).await;
        if let Err(error) = write_result {
            self.pending
                .lock()
                .expect("pending request map poisoned")
                .remove(&request_id);
            return Err(error);
        }

        let reply = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    // The waiter is detached; the reply, if it ever arrives,
                    // is dropped by the reader.
                    self.pending
                        .lock()
                        .expect("pending request map poisoned")
                        .remove(&request_id);
                    return Err(ErrorKind::Timeout {
                        message: format!(
                            "no reply to request {} from {} before the deadline",
                            request_id,
                            self.address()
                        ),
                    }
                    .into());
                }
            },
            None => rx.await,
        };

        let frame = reply.map_err(|_| {
            Error::network(format!(
                "connection {} to {} dropped before replying to request {}",
                self.id,
                self.address(),
                request_id
            ))
        })??;

        Ok(CommandResponse::new(self.address().clone(), frame.document))
    }

    async fn write_frame(&self, command: &Command, request_id: i32) -> Result<()> {
        let mut writer = self.write_half.lock().await;

        if self.description.wire_version.supports_op_msg() {
            let mut body = command.body.clone();
            body.insert("$db", command.target_db.clone());
            let message = Message::from_document(body, 0).with_request_id(request_id);

            match self.description.compressor {
                Some(compressor) => message.write_compressed_to(&mut *writer, compressor).await,
                None => message.write_to(&mut *writer).await,
            }
        } else {
            let query = Query::command(&command.target_db, command.body.clone())
                .with_request_id(request_id);
            query.write_to(&mut *writer).await
        }
    }

    /// Tears the connection down, failing all pending waiters.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.reader.abort();
        fail_all_pending(
            &self.pending,
            &format!("connection to {} shut down", self.address()),
        );
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

async fn reader_loop(
    mut read_half: OwnedReadHalf,
    pending: Arc<Mutex<PendingRequests>>,
    closed: Arc<AtomicBool>,
    address: String,
) {
    loop {
        match wire::read_reply_frame(&mut read_half).await {
            Ok(frame) => {
                let waiter = pending
                    .lock()
                    .expect("pending request map poisoned")
                    .remove(&frame.response_to);
                match waiter {
                    Some(tx) => {
                        if tx.send(Ok(frame)).is_err() {
                            tracing::warn!(
                                target: "mongo_core::connection",
                                %address,
                                "dropping reply for a cancelled request"
                            );
                        }
                    }
                    None => {
                        tracing::warn!(
                            target: "mongo_core::connection",
                            %address,
                            response_to = frame.response_to,
                            "dropping reply that matches no pending request"
                        );
                    }
                }
            }
            Err(error) => {
                // A fatal read error poisons every outstanding request.
                closed.store(true, Ordering::SeqCst);
                tracing::debug!(
                    target: "mongo_core::connection",
                    %address,
                    %error,
                    "connection reader stopped"
                );
                fail_all_pending(&pending, &format!("connection to {} failed: {}", address, error));
                return;
            }
        }
    }
}

fn fail_all_pending(pending: &Arc<Mutex<PendingRequests>>, message: &str) {
    let waiters: Vec<_> = {
        let mut pending = pending.lock().expect("pending request map poisoned");
        pending.drain().collect()
    };
    for (_, tx) in waiters {
        let _ = tx.send(Err(Error::network(message.to_string())));
    }
}
