//! An in-process stand-in for a MongoDB server, speaking enough of the wire
//! protocol (OP_QUERY for the handshake, OP_MSG afterwards) and the command
//! set to drive the integration tests: CRUD, rename, cursors, sessions, and
//! transactions with per-session staged writes.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet, VecDeque},
    io::Cursor,
    sync::{Arc, Mutex},
};

use bson::{doc, spec::BinarySubtype, Binary, Bson, Document};
use byteorder::{LittleEndian, ReadBytesExt};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

const OP_REPLY: i32 = 1;
const OP_QUERY: i32 = 2004;
const OP_MSG: i32 = 2013;

pub struct MockServer {
    port: u16,
    state: Arc<Mutex<Store>>,
}

#[derive(Default)]
struct Store {
    /// db -> collection -> documents
    dbs: HashMap<String, HashMap<String, Vec<Document>>>,
    /// Transactions the server has seen `startTransaction: true` for.
    active_txns: HashSet<TxnKey>,
    /// Writes staged by active transactions, invisible to other sessions.
    staged: HashMap<TxnKey, Vec<StagedWrite>>,
    /// Live cursors by id.
    cursors: HashMap<i64, MockCursor>,
    next_cursor_id: i64,
    /// Sessions issued by `startSession`.
    sessions: HashSet<Vec<u8>>,
}

type TxnKey = (Vec<u8>, i64);

struct StagedWrite {
    db: String,
    coll: String,
    docs: Vec<Document>,
}

struct MockCursor {
    ns: String,
    remaining: VecDeque<Document>,
}

impl MockServer {
    pub async fn start() -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let port = listener.local_addr().expect("local addr").port();
        let state: Arc<Mutex<Store>> = Arc::default();

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, _)) => {
                        let conn_state = Arc::clone(&accept_state);
                        tokio::spawn(async move {
                            let _ = serve_connection(socket, conn_state).await;
                        });
                    }
                    Err(_) => return,
                }
            }
        });

        MockServer { port, state }
    }

    pub fn uri(&self) -> String {
        format!("mongodb://127.0.0.1:{}", self.port)
    }

    pub fn uri_with(&self, options: &str) -> String {
        format!("mongodb://127.0.0.1:{}/?{}", self.port, options)
    }

    /// Direct read of committed collection contents, bypassing the wire.
    pub fn committed_docs(&self, db: &str, coll: &str) -> Vec<Document> {
        let store = self.state.lock().unwrap();
        store
            .dbs
            .get(db)
            .and_then(|colls| colls.get(coll))
            .cloned()
            .unwrap_or_default()
    }

    /// The number of sessions `startSession` has issued and not yet ended.
    pub fn live_session_count(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }
}

async fn serve_connection(mut socket: TcpStream, state: Arc<Mutex<Store>>) -> std::io::Result<()> {
    loop {
        let mut header = [0u8; 16];
        if socket.read_exact(&mut header).await.is_err() {
            return Ok(());
        }
        let mut cursor = Cursor::new(&header[..]);
        let length = ReadBytesExt::read_i32::<LittleEndian>(&mut cursor)?;
        let request_id = ReadBytesExt::read_i32::<LittleEndian>(&mut cursor)?;
        let _response_to = ReadBytesExt::read_i32::<LittleEndian>(&mut cursor)?;
        let op_code = ReadBytesExt::read_i32::<LittleEndian>(&mut cursor)?;

        let mut body = vec![0u8; length as usize - 16];
        socket.read_exact(&mut body).await?;

        let (command, reply_as_op_msg) = match op_code {
            OP_QUERY => (parse_query_body(&body), false),
            OP_MSG => (parse_msg_body(&body), true),
            _ => return Ok(()),
        };

        let reply = handle_command(&command, &state);

        if reply_as_op_msg {
            write_op_msg(&mut socket, request_id, &reply).await?;
        } else {
            write_op_reply(&mut socket, request_id, &reply).await?;
        }
    }
}

fn parse_query_body(body: &[u8]) -> Document {
    let mut cursor = Cursor::new(body);
    let _flags = ReadBytesExt::read_i32::<LittleEndian>(&mut cursor).unwrap();
    // Skip the null-terminated namespace.
    loop {
        let mut byte = [0u8; 1];
        std::io::Read::read_exact(&mut cursor, &mut byte).unwrap();
        if byte[0] == 0 {
            break;
        }
    }
    let _skip = ReadBytesExt::read_i32::<LittleEndian>(&mut cursor).unwrap();
    let _num_to_return = ReadBytesExt::read_i32::<LittleEndian>(&mut cursor).unwrap();
    Document::from_reader(&mut cursor).unwrap()
}

fn parse_msg_body(body: &[u8]) -> Document {
    let mut cursor = Cursor::new(body);
    let _flags = ReadBytesExt::read_u32::<LittleEndian>(&mut cursor).unwrap();
    let payload_type = ReadBytesExt::read_u8(&mut cursor).unwrap();
    assert_eq!(payload_type, 0, "mock server only handles payload type 0");
    Document::from_reader(&mut cursor).unwrap()
}

async fn write_op_reply(
    socket: &mut TcpStream,
    response_to: i32,
    reply: &Document,
) -> std::io::Result<()> {
    let doc_bytes = bson::to_vec(reply).unwrap();
    let length = 16 + 4 + 8 + 4 + 4 + doc_bytes.len();

    let mut frame = Vec::with_capacity(length);
    frame.extend((length as i32).to_le_bytes());
    frame.extend(0_i32.to_le_bytes());
    frame.extend(response_to.to_le_bytes());
    frame.extend(OP_REPLY.to_le_bytes());
    frame.extend(0_i32.to_le_bytes()); // response flags
    frame.extend(0_i64.to_le_bytes()); // cursor id
    frame.extend(0_i32.to_le_bytes()); // starting from
    frame.extend(1_i32.to_le_bytes()); // number returned
    frame.extend(&doc_bytes);

    socket.write_all(&frame).await?;
    socket.flush().await
}

async fn write_op_msg(
    socket: &mut TcpStream,
    response_to: i32,
    reply: &Document,
) -> std::io::Result<()> {
    let doc_bytes = bson::to_vec(reply).unwrap();
    let length = 16 + 4 + 1 + doc_bytes.len();

    let mut frame = Vec::with_capacity(length);
    frame.extend((length as i32).to_le_bytes());
    frame.extend(0_i32.to_le_bytes());
    frame.extend(response_to.to_le_bytes());
    frame.extend(OP_MSG.to_le_bytes());
    frame.extend(0_u32.to_le_bytes()); // flags
    frame.push(0); // payload type 0
    frame.extend(&doc_bytes);

    socket.write_all(&frame).await?;
    socket.flush().await
}

fn error_reply(code: i32, code_name: &str, message: &str) -> Document {
    doc! {
        "ok": 0.0,
        "code": code,
        "codeName": code_name,
        "errmsg": message,
    }
}

fn handle_command(command: &Document, state: &Arc<Mutex<Store>>) -> Document {
    let name = match command.keys().next() {
        Some(name) => name.clone(),
        None => return error_reply(59, "CommandNotFound", "empty command"),
    };
    let db = command
        .get_str("$db")
        .unwrap_or("admin")
        .to_string();

    let mut store = state.lock().unwrap();
    match name.as_str() {
        "isMaster" | "hello" => doc! {
            "ok": 1.0,
            "ismaster": true,
            "helloOk": true,
            "maxWireVersion": 17,
            "minWireVersion": 0,
            "logicalSessionTimeoutMinutes": 30_i64,
        },
        "buildInfo" | "ping" => doc! { "ok": 1.0 },
        "create" => {
            let coll = command.get_str("create").unwrap_or_default().to_string();
            let colls = store.dbs.entry(db.clone()).or_default();
            if colls.contains_key(&coll) {
                error_reply(
                    48,
                    "NamespaceExists",
                    &format!("a collection '{}.{}' already exists", db, coll),
                )
            } else {
                colls.insert(coll, Vec::new());
                doc! { "ok": 1.0 }
            }
        }
        "drop" => {
            let coll = command.get_str("drop").unwrap_or_default().to_string();
            let existed = store
                .dbs
                .get_mut(&db)
                .map(|colls| colls.remove(&coll).is_some())
                .unwrap_or(false);
            if existed {
                doc! { "ok": 1.0 }
            } else {
                error_reply(26, "NamespaceNotFound", "ns not found")
            }
        }
        "dropDatabase" => {
            store.dbs.remove(&db);
            doc! { "ok": 1.0 }
        }
        "listCollections" => {
            let names: Vec<Bson> = store
                .dbs
                .get(&db)
                .map(|colls| {
                    let mut names: Vec<_> = colls.keys().cloned().collect();
                    names.sort();
                    names
                        .into_iter()
                        .map(|name| Bson::Document(doc! { "name": name }))
                        .collect()
                })
                .unwrap_or_default();
            doc! {
                "ok": 1.0,
                "cursor": {
                    "id": 0_i64,
                    "ns": format!("{}.$cmd.listCollections", db),
                    "firstBatch": names,
                },
            }
        }
        "renameCollection" => {
            let source = command.get_str("renameCollection").unwrap_or_default();
            let target = command.get_str("to").unwrap_or_default();
            let (source_db, source_coll) = match source.split_once('.') {
                Some(parts) => parts,
                None => return error_reply(73, "InvalidNamespace", "invalid source namespace"),
            };
            let (target_db, target_coll) = match target.split_once('.') {
                Some(parts) => parts,
                None => return error_reply(73, "InvalidNamespace", "invalid target namespace"),
            };
            if source_db != target_db {
                return error_reply(73, "InvalidNamespace", "cannot rename across databases");
            }

            let colls = store.dbs.entry(source_db.to_string()).or_default();
            if !colls.contains_key(source_coll) {
                return error_reply(26, "NamespaceNotFound", "source namespace does not exist");
            }
            if colls.contains_key(target_coll) {
                return error_reply(48, "NamespaceExists", "target namespace exists");
            }
            let docs = colls.remove(source_coll).unwrap_or_default();
            colls.insert(target_coll.to_string(), docs);
            doc! { "ok": 1.0 }
        }
        "insert" => {
            let coll = command.get_str("insert").unwrap_or_default().to_string();
            let docs: Vec<Document> = command
                .get_array("documents")
                .map(|docs| {
                    docs.iter()
                        .filter_map(|d| d.as_document().cloned())
                        .collect()
                })
                .unwrap_or_default();
            let n = docs.len() as i32;

            match txn_key(command) {
                Some(key) => {
                    if command.get_bool("startTransaction").unwrap_or(false) {
                        store.active_txns.insert(key.clone());
                    }
                    if !store.active_txns.contains(&key) {
                        return error_reply(
                            251,
                            "NoSuchTransaction",
                            &format!("Transaction {} has been aborted", key.1),
                        );
                    }
                    store.staged.entry(key).or_default().push(StagedWrite {
                        db: db.clone(),
                        coll,
                        docs,
                    });
                    doc! { "ok": 1.0, "n": n }
                }
                None => match apply_insert(&mut store, &db, &coll, docs) {
                    Ok(()) => doc! { "ok": 1.0, "n": n },
                    Err(reply) => reply,
                },
            }
        }
        "find" | "count" | "aggregate" => {
            let (coll, filter) = match name.as_str() {
                "find" => (
                    command.get_str("find").unwrap_or_default().to_string(),
                    command.get_document("filter").cloned().unwrap_or_default(),
                ),
                "count" => (
                    command.get_str("count").unwrap_or_default().to_string(),
                    command.get_document("query").cloned().unwrap_or_default(),
                ),
                _ => {
                    let coll = command.get_str("aggregate").unwrap_or_default().to_string();
                    let filter = command
                        .get_array("pipeline")
                        .ok()
                        .and_then(|stages| stages.first())
                        .and_then(Bson::as_document)
                        .and_then(|stage| stage.get_document("$match").ok())
                        .cloned()
                        .unwrap_or_default();
                    (coll, filter)
                }
            };

            if let Some(ref key) = txn_key(command) {
                if command.get_bool("startTransaction").unwrap_or(false) {
                    store.active_txns.insert(key.clone());
                }
            }

            let mut matching: Vec<Document> = store
                .dbs
                .get(&db)
                .and_then(|colls| colls.get(&coll))
                .map(|docs| {
                    docs.iter()
                        .filter(|doc| matches_filter(doc, &filter))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            // A transaction sees its own staged writes.
            if let Some(key) = txn_key(command) {
                if let Some(staged) = store.staged.get(&key) {
                    for write in staged {
                        if write.db == db && write.coll == coll {
                            matching.extend(
                                write
                                    .docs
                                    .iter()
                                    .filter(|doc| matches_filter(doc, &filter))
                                    .cloned(),
                            );
                        }
                    }
                }
            }

            if name == "count" {
                return doc! { "ok": 1.0, "n": matching.len() as i32 };
            }

            let ns = format!("{}.{}", db, coll);
            let batch_size = command
                .get("batchSize")
                .and_then(numeric)
                .or_else(|| {
                    command
                        .get_document("cursor")
                        .ok()
                        .and_then(|c| c.get("batchSize"))
                        .and_then(numeric)
                })
                .map(|n| n as usize);

            let (first_batch, cursor_id) = match batch_size {
                Some(batch_size) if matching.len() > batch_size && batch_size > 0 => {
                    let rest: VecDeque<Document> = matching.split_off(batch_size).into();
                    store.next_cursor_id += 1;
                    let id = store.next_cursor_id;
                    store.cursors.insert(
                        id,
                        MockCursor {
                            ns: ns.clone(),
                            remaining: rest,
                        },
                    );
                    (matching, id)
                }
                _ => (matching, 0),
            };

            let first_batch: Vec<Bson> = first_batch.into_iter().map(Bson::Document).collect();
            doc! {
                "ok": 1.0,
                "cursor": { "id": cursor_id, "ns": ns, "firstBatch": first_batch },
            }
        }
        "update" => {
            let coll = command.get_str("update").unwrap_or_default().to_string();
            let update = command
                .get_array("updates")
                .ok()
                .and_then(|u| u.first())
                .and_then(Bson::as_document)
                .cloned()
                .unwrap_or_default();
            let filter = update.get_document("q").cloned().unwrap_or_default();
            let change = update.get_document("u").cloned().unwrap_or_default();
            let multi = update.get_bool("multi").unwrap_or(false);

            let mut matched = 0;
            let mut modified = 0;
            if let Some(docs) = store.dbs.get_mut(&db).and_then(|colls| colls.get_mut(&coll)) {
                for doc in docs.iter_mut() {
                    if !matches_filter(doc, &filter) {
                        continue;
                    }
                    matched += 1;
                    if let Ok(set) = change.get_document("$set") {
                        for (key, value) in set {
                            doc.insert(key.clone(), value.clone());
                        }
                        modified += 1;
                    }
                    if !multi {
                        break;
                    }
                }
            }
            doc! { "ok": 1.0, "n": matched, "nModified": modified }
        }
        "delete" => {
            let coll = command.get_str("delete").unwrap_or_default().to_string();
            let delete = command
                .get_array("deletes")
                .ok()
                .and_then(|d| d.first())
                .and_then(Bson::as_document)
                .cloned()
                .unwrap_or_default();
            let filter = delete.get_document("q").cloned().unwrap_or_default();
            let limit = delete.get("limit").and_then(numeric).unwrap_or(0);

            let mut deleted = 0;
            if let Some(docs) = store.dbs.get_mut(&db).and_then(|colls| colls.get_mut(&coll)) {
                docs.retain(|doc| {
                    let matches = matches_filter(doc, &filter);
                    let within_limit = limit == 0 || deleted < limit;
                    if matches && within_limit {
                        deleted += 1;
                        false
                    } else {
                        true
                    }
                });
            }
            doc! { "ok": 1.0, "n": deleted as i32 }
        }
        "getMore" => {
            let id = command.get_i64("getMore").unwrap_or(0);
            let batch_size = command.get("batchSize").and_then(numeric).map(|n| n as usize);
            match store.cursors.get_mut(&id) {
                Some(cursor) => {
                    let take = batch_size.unwrap_or(cursor.remaining.len()).max(1);
                    let mut batch = Vec::new();
                    for _ in 0..take {
                        match cursor.remaining.pop_front() {
                            Some(doc) => batch.push(Bson::Document(doc)),
                            None => break,
                        }
                    }
                    let ns = cursor.ns.clone();
                    let next_id = if cursor.remaining.is_empty() {
                        store.cursors.remove(&id);
                        0
                    } else {
                        id
                    };
                    doc! {
                        "ok": 1.0,
                        "cursor": { "id": next_id, "ns": ns, "nextBatch": batch },
                    }
                }
                None => error_reply(43, "CursorNotFound", "cursor id not found"),
            }
        }
        "killCursors" => {
            let killed: Vec<Bson> = command
                .get_array("cursors")
                .map(|ids| {
                    ids.iter()
                        .filter_map(Bson::as_i64)
                        .filter(|id| store.cursors.remove(id).is_some())
                        .map(Bson::Int64)
                        .collect()
                })
                .unwrap_or_default();
            doc! { "ok": 1.0, "cursorsKilled": killed }
        }
        "startSession" => {
            let uuid = uuid_bytes();
            store.sessions.insert(uuid.clone());
            doc! {
                "ok": 1.0,
                "id": {
                    "id": Binary { subtype: BinarySubtype::Uuid, bytes: uuid },
                },
                "timeoutMinutes": 30,
            }
        }
        "endSessions" | "killSessions" => {
            for id in session_ids(command, &name) {
                store.sessions.remove(&id);
                store.active_txns.retain(|(lsid, _)| *lsid != id);
                store.staged.retain(|(lsid, _), _| *lsid != id);
            }
            doc! { "ok": 1.0 }
        }
        "commitTransaction" => match txn_key(command) {
            Some(key) if store.active_txns.remove(&key) => {
                let staged = store.staged.remove(&key).unwrap_or_default();
                for write in staged {
                    if let Err(reply) =
                        apply_insert_owned(&mut store, write.db, write.coll, write.docs)
                    {
                        return reply;
                    }
                }
                doc! { "ok": 1.0 }
            }
            Some(key) => error_reply(
                251,
                "NoSuchTransaction",
                &format!("Transaction {} has been aborted", key.1),
            ),
            None => error_reply(251, "NoSuchTransaction", "no transaction in progress"),
        },
        "abortTransaction" => match txn_key(command) {
            Some(key) if store.active_txns.remove(&key) => {
                store.staged.remove(&key);
                doc! { "ok": 1.0 }
            }
            Some(key) => error_reply(
                251,
                "NoSuchTransaction",
                &format!("Transaction {} has been aborted", key.1),
            ),
            None => error_reply(251, "NoSuchTransaction", "no transaction in progress"),
        },
        other => error_reply(59, "CommandNotFound", &format!("no such command: {}", other)),
    }
}

/// The (lsid bytes, txnNumber) pair of an in-transaction command.
fn txn_key(command: &Document) -> Option<TxnKey> {
    if command.get_bool("autocommit").unwrap_or(true) {
        return None;
    }
    let lsid = command
        .get_document("lsid")
        .ok()?
        .get("id")
        .and_then(|id| match id {
            Bson::Binary(binary) => Some(binary.bytes.clone()),
            _ => None,
        })?;
    let txn_number = command.get_i64("txnNumber").ok()?;
    Some((lsid, txn_number))
}

fn session_ids(command: &Document, key: &str) -> Vec<Vec<u8>> {
    command
        .get_array(key)
        .map(|ids| {
            ids.iter()
                .filter_map(Bson::as_document)
                .filter_map(|doc| match doc.get("id") {
                    Some(Bson::Binary(binary)) => Some(binary.bytes.clone()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, value)| doc.get(key) == Some(value))
}

fn apply_insert(
    store: &mut Store,
    db: &str,
    coll: &str,
    docs: Vec<Document>,
) -> Result<(), Document> {
    apply_insert_owned(store, db.to_string(), coll.to_string(), docs)
}

fn apply_insert_owned(
    store: &mut Store,
    db: String,
    coll: String,
    docs: Vec<Document>,
) -> Result<(), Document> {
    let existing = store.dbs.entry(db).or_default().entry(coll).or_default();
    for doc in docs {
        if let Some(id) = doc.get("_id") {
            if existing.iter().any(|d| d.get("_id") == Some(id)) {
                return Err(error_reply(
                    11000,
                    "DuplicateKey",
                    "E11000 duplicate key error",
                ));
            }
        }
        existing.push(doc);
    }
    Ok(())
}

fn numeric(value: &Bson) -> Option<i64> {
    match *value {
        Bson::Int32(n) => Some(i64::from(n)),
        Bson::Int64(n) => Some(n),
        Bson::Double(n) => Some(n as i64),
        _ => None,
    }
}

fn uuid_bytes() -> Vec<u8> {
    // The tests do not need RFC-compliant UUIDs, only 16 unique bytes.
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let mut bytes = vec![0u8; 16];
    bytes[..8].copy_from_slice(&n.to_le_bytes());
    bytes[8..].copy_from_slice(&n.to_be_bytes());
    bytes
}
