//! This crate is the core of a pure Rust MongoDB client driver. It translates
//! high-level database operations into the MongoDB wire protocol, dispatches
//! them against a set of server connections with configurable failover
//! semantics, and returns results asynchronously.
//!
//! To connect, pass a MongoDB connection string to [`Client::with_uri_str`]:
//!
//! ```no_run
//! # use mongo_core::{Client, error::Result};
//! # async fn make_client() -> Result<Client> {
//! let client = Client::with_uri_str("mongodb://localhost:27017/").await?;
//! # Ok(client)
//! # }
//! ```
//!
//! Operations are performed through cheap, immutable [`Database`] and
//! [`Collection`] handles:
//!
//! ```no_run
//! # use bson::doc;
//! # use mongo_core::{Client, error::Result};
//! # async fn do_stuff() -> Result<()> {
//! # let client = Client::with_uri_str("mongodb://localhost:27017").await?;
//! let db = client.database("some_db").await?;
//! for coll_name in db.collection_names().await? {
//!     println!("collection: {}", coll_name);
//! }
//!
//! let coll = db.collection("some-coll");
//! let result = coll.insert(vec![doc! { "x": 1 }]).await?;
//! println!("{:#?}", result);
//! # Ok(())
//! # }
//! ```
//!
//! Sessions and transactions are modeled as handle transitions: calling
//! [`Database::start_session`] returns a *new* handle carrying the session,
//! and every command issued through that handle embeds the session's `lsid`.

#![warn(missing_docs)]

pub mod aggregation;
mod bson_util;
mod client;
mod cmap;
mod coll;
pub mod compression;
pub mod concern;
mod cursor;
mod db;
pub mod error;
pub mod failover;
mod operation;
pub mod options;
pub mod results;
pub mod serialization;
mod session;
mod wire;
pub mod wire_version;

pub use crate::{
    client::Client,
    coll::{Collection, Namespace},
    cursor::Cursor,
    db::Database,
    session::Session,
};
