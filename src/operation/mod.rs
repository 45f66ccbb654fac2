//! The command algebra: each server-side operation is a type that knows how
//! to serialize itself into a [`Command`] and how to interpret the server's
//! reply.

mod abort_transaction;
mod aggregate;
mod commit_transaction;
mod count;
mod create;
mod delete;
mod drop_collection;
mod drop_database;
mod find;
mod get_more;
mod insert;
mod kill_cursors;
mod list_collections;
mod rename_collection;
mod run_command;
mod sessions;
mod update;

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::{
    cmap::{Command, CommandResponse, StreamDescription},
    error::{Error, ErrorKind, Result},
    wire_version::WireVersion,
};

pub(crate) use self::{
    abort_transaction::AbortTransaction,
    aggregate::{Aggregate, AggregateTarget},
    commit_transaction::CommitTransaction,
    count::Count,
    create::Create,
    delete::Delete,
    drop_collection::DropCollection,
    drop_database::DropDatabase,
    find::Find,
    get_more::{GetMore, GetMoreResult},
    insert::Insert,
    kill_cursors::KillCursors,
    list_collections::ListCollections,
    rename_collection::RenameCollection,
    run_command::RunCommand,
    sessions::{EndSessions, KillSessions, StartSession},
    update::Update,
};

/// A trait modeling the behavior of a server side operation.
pub(crate) trait Operation {
    /// The output type of this operation.
    type O;

    /// The name of the server side command associated with this operation.
    const NAME: &'static str;

    /// Returns the command that should be sent to the server as part of this
    /// operation.
    fn build(&self, description: &StreamDescription) -> Result<Command>;

    /// Interprets the server response to the command.
    fn handle_response(&self, response: CommandResponse) -> Result<Self::O>;

    /// The minimum wire version the connected server must advertise for this
    /// operation to be sent at all.
    fn min_wire_version(&self) -> Option<WireVersion> {
        None
    }

    /// Whether this operation writes, which determines which concern the
    /// dispatcher may attach.
    fn is_write(&self) -> bool {
        false
    }
}

/// Rejects the operation before serialization if the negotiated wire version
/// cannot carry it.
pub(crate) fn check_wire_version<T: Operation>(
    op: &T,
    description: &StreamDescription,
) -> Result<()> {
    if let Some(required) = op.min_wire_version() {
        if description.wire_version < required {
            return Err(ErrorKind::UnsupportedOperation {
                required,
                actual: description.wire_version,
            }
            .into());
        }
    }
    Ok(())
}

/// Appends a serializable struct to the input document.
/// The serializable struct MUST serialize to a document, otherwise an error
/// will be returned.
pub(crate) fn append_options<T: Serialize>(doc: &mut Document, options: Option<&T>) -> Result<()> {
    let options = match options {
        Some(options) => options,
        None => return Ok(()),
    };

    match bson::to_bson(options)? {
        Bson::Document(options_doc) => {
            doc.extend(options_doc);
            Ok(())
        }
        _ => Err(Error::invalid_argument(
            "options did not serialize to a document",
        )),
    }
}

/// The `{cursor: {...}}` shape shared by `find`, `aggregate`, `getMore`, and
/// `listCollections` replies.
#[derive(Debug, Deserialize)]
pub(crate) struct CursorBody {
    pub(crate) cursor: CursorInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CursorInfo {
    pub(crate) id: i64,
    pub(crate) ns: String,
    #[serde(default)]
    pub(crate) first_batch: Vec<Document>,
    #[serde(default)]
    pub(crate) next_batch: Vec<Document>,
}
