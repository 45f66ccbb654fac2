use bson::{Bson, Document};
use serde::de::DeserializeOwned;

use crate::{
    bson_util,
    error::{CommandError, Error, ErrorKind, Result},
    options::ServerAddress,
};

/// `Command` is a driver side abstraction of a server command containing all
/// the information necessary to serialize it to a wire message.
#[derive(Clone, Debug)]
pub(crate) struct Command {
    pub(crate) name: String,
    pub(crate) target_db: String,
    pub(crate) body: Document,
}

impl Command {
    pub(crate) fn new(
        name: impl Into<String>,
        target_db: impl Into<String>,
        body: Document,
    ) -> Self {
        Self {
            name: name.into(),
            target_db: target_db.into(),
            body,
        }
    }
}

/// A single reply document, already matched to the command that produced
/// it.
#[derive(Clone, Debug)]
pub(crate) struct CommandResponse {
    source: ServerAddress,
    pub(crate) raw_response: Document,
}

impl CommandResponse {
    pub(crate) fn new(source: ServerAddress, raw_response: Document) -> Self {
        Self {
            source,
            raw_response,
        }
    }

    /// Whether this response indicates success (i.e. `ok: 1`).
    pub(crate) fn is_success(&self) -> bool {
        match self.raw_response.get("ok") {
            Some(b) => bson_util::get_int(b) == Some(1),
            None => false,
        }
    }

    /// Returns an error if this response corresponds to a command failure.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.is_success() {
            return Ok(());
        }

        let command_error: CommandError =
            bson::from_bson(Bson::Document(self.raw_response.clone())).map_err(|_| {
                Error::invalid_response(format!(
                    "the server sent a command failure the driver could not decode: {}",
                    self.raw_response
                ))
            })?;
        let labels = command_error.labels.clone();
        Err(Error::new(ErrorKind::Command(command_error)).with_labels(labels))
    }

    /// Deserializes the body of the response, failing with the command error
    /// if the response is a failure.
    pub(crate) fn body<T: DeserializeOwned>(&self) -> Result<T> {
        self.validate()?;
        bson::from_bson(Bson::Document(self.raw_response.clone())).map_err(|e| {
            Error::invalid_response(format!("could not decode command reply: {}", e))
        })
    }

    /// The address of the server that sent this response.
    pub(crate) fn source_address(&self) -> &ServerAddress {
        &self.source
    }
}
