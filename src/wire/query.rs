//! The legacy OP_QUERY / OP_REPLY pair, used for command traffic against
//! servers that predate OP_MSG (wire version < 3.6) and for the initial
//! handshake, which must be legible to any server version.

use std::io::Cursor;

use bitflags::bitflags;
use bson::Document;
use byteorder::{LittleEndian, ReadBytesExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{next_request_id, Header, OpCode};
use crate::error::{ProtocolError, Result};

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub(crate) struct QueryFlags: i32 {
        const TAILABLE_CURSOR   = 0b_0000_0010;
        const SECONDARY_OK      = 0b_0000_0100;
        const NO_CURSOR_TIMEOUT = 0b_0001_0000;
        const AWAIT_DATA        = 0b_0010_0000;
        const EXHAUST           = 0b_0100_0000;
        const PARTIAL           = 0b_1000_0000;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub(crate) struct ResponseFlags: i32 {
        const CURSOR_NOT_FOUND = 0b_0001;
        const QUERY_FAILURE    = 0b_0010;
    }
}

/// An OP_QUERY frame. Commands are expressed as a query against the
/// database's virtual `$cmd` collection with `num_to_return` of -1.
#[derive(Debug)]
pub(crate) struct Query {
    pub(crate) flags: QueryFlags,
    pub(crate) full_collection_name: String,
    pub(crate) num_to_skip: i32,
    pub(crate) num_to_return: i32,
    pub(crate) query: Document,
    pub(crate) request_id: Option<i32>,
}

impl Query {
    /// A command query against `db.$cmd`.
    pub(crate) fn command(db: &str, body: Document) -> Self {
        Self {
            flags: QueryFlags::empty(),
            full_collection_name: format!("{}.$cmd", db),
            num_to_skip: 0,
            num_to_return: -1,
            query: body,
            request_id: None,
        }
    }

    pub(crate) fn with_request_id(mut self, request_id: i32) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub(crate) async fn write_to<W: AsyncWrite + Unpin + Send>(&self, writer: &mut W) -> Result<()> {
        let query_bytes = bson::to_vec(&self.query)?;

        let total_length = Header::LENGTH
            + std::mem::size_of::<i32>()
            + self.full_collection_name.len()
            + 1
            + 2 * std::mem::size_of::<i32>()
            + query_bytes.len();
        let header = Header {
            length: total_length as i32,
            request_id: self.request_id.unwrap_or_else(next_request_id),
            response_to: 0,
            op_code: OpCode::Query,
        };

        header.write_to(writer).await?;
        writer.write_i32_le(self.flags.bits()).await?;
        writer.write_all(self.full_collection_name.as_bytes()).await?;
        // Null terminator for the collection name.
        writer.write_u8(0).await?;
        writer.write_i32_le(self.num_to_skip).await?;
        writer.write_i32_le(self.num_to_return).await?;
        writer.write_all(&query_bytes).await?;
        writer.flush().await?;

        Ok(())
    }
}

/// An OP_REPLY frame.
#[derive(Debug)]
pub(crate) struct Reply {
    pub(crate) response_flags: ResponseFlags,
    pub(crate) cursor_id: i64,
    pub(crate) documents: Vec<Document>,
}

impl Reply {
    /// Parses the post-header bytes of an OP_REPLY frame.
    pub(crate) fn read_body(body: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(body);
        let response_flags = ResponseFlags::from_bits_truncate(
            cursor
                .read_i32::<LittleEndian>()
                .map_err(|e| truncated(e.to_string()))?,
        );
        let cursor_id = cursor
            .read_i64::<LittleEndian>()
            .map_err(|e| truncated(e.to_string()))?;
        let _starting_from = cursor
            .read_i32::<LittleEndian>()
            .map_err(|e| truncated(e.to_string()))?;
        let num_returned = cursor
            .read_i32::<LittleEndian>()
            .map_err(|e| truncated(e.to_string()))?;

        let mut documents = Vec::with_capacity(num_returned.max(0) as usize);
        while (cursor.position() as usize) < body.len() {
            let document = Document::from_reader(&mut cursor)
                .map_err(|e| ProtocolError::Frame(format!("malformed reply document: {}", e)))?;
            documents.push(document);
        }

        if documents.len() != num_returned as usize {
            return Err(ProtocolError::Frame(format!(
                "the reply declared {} documents but carried {}",
                num_returned,
                documents.len()
            ))
            .into());
        }

        Ok(Self {
            response_flags,
            cursor_id,
            documents,
        })
    }

    /// The single command-result document of a `$cmd` reply.
    pub(crate) fn into_single_document(mut self) -> Result<Document> {
        if self.response_flags.contains(ResponseFlags::QUERY_FAILURE) {
            return Err(ProtocolError::Frame(
                "the server flagged the query as failed".to_string(),
            )
            .into());
        }
        match self.documents.len() {
            1 => Ok(self.documents.remove(0)),
            n => Err(ProtocolError::Frame(format!(
                "a command reply must carry exactly one document, got {}",
                n
            ))
            .into()),
        }
    }
}

fn truncated(detail: String) -> crate::error::Error {
    ProtocolError::Frame(format!("truncated OP_REPLY body: {}", detail)).into()
}
