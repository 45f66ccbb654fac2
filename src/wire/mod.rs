//! Wire protocol message framing.

mod header;
mod message;
mod query;

use std::sync::atomic::{AtomicI32, Ordering};

use bson::Document;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{ProtocolError, Result};

pub(crate) use self::{
    header::{Header, OpCode},
    message::Message,
    query::{Query, Reply},
};

/// Returns a strictly monotonic request id to use for a wire message.
pub(crate) fn next_request_id() -> i32 {
    static REQUEST_ID: AtomicI32 = AtomicI32::new(0);
    REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

/// A server-to-client frame reduced to the single command reply document it
/// carries, tagged with the request it answers.
#[derive(Debug)]
pub(crate) struct ReplyFrame {
    pub(crate) response_to: i32,
    pub(crate) document: Document,
}

/// Reads the next server frame, accepting OP_MSG, OP_COMPRESSED, or the
/// legacy OP_REPLY.
pub(crate) async fn read_reply_frame<R: AsyncRead + Unpin + Send>(
    reader: &mut R,
) -> Result<ReplyFrame> {
    let header = Header::read_from(reader).await?;
    if header.length < Header::LENGTH as i32 {
        return Err(ProtocolError::Frame(format!(
            "frame length {} shorter than its own header",
            header.length
        ))
        .into());
    }

    let mut body = vec![0u8; header.length as usize - Header::LENGTH];
    reader.read_exact(&mut body).await.map_err(|e| {
        crate::error::Error::from(ProtocolError::Frame(format!(
            "frame truncated before {} declared bytes: {}",
            header.length, e
        )))
    })?;

    let document = match header.op_code {
        OpCode::Message => Message::read_body(&body)?.into_single_document()?,
        OpCode::Compressed => Message::read_compressed_body(&body)?.into_single_document()?,
        OpCode::Reply => Reply::read_body(&body)?.into_single_document()?,
        other => {
            return Err(ProtocolError::Frame(format!(
                "op code {} is not valid in a server reply",
                other as i32
            ))
            .into())
        }
    };

    Ok(ReplyFrame {
        response_to: header.response_to,
        document,
    })
}
