use std::io::Cursor;

use bitflags::bitflags;
use bson::Document;
use byteorder::{LittleEndian, ReadBytesExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{next_request_id, Header, OpCode};
use crate::{
    compression::{self, Compressor},
    error::{ProtocolError, Result},
};

bitflags! {
    /// The bitwise flags of an OP_MSG frame.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub(crate) struct MessageFlags: u32 {
        const CHECKSUM_PRESENT = 0b_0000_0000_0000_0000_0000_0000_0000_0001;
        const MORE_TO_COME     = 0b_0000_0000_0000_0000_0000_0000_0000_0010;
        const EXHAUST_ALLOWED  = 0b_0000_0000_0000_0001_0000_0000_0000_0000;
    }
}

/// An OP_MSG wire protocol operation carrying a single payload type 0
/// section.
#[derive(Debug)]
pub(crate) struct Message {
    pub(crate) document_payload: Document,
    pub(crate) response_to: i32,
    pub(crate) flags: MessageFlags,
    pub(crate) request_id: Option<i32>,
}

impl Message {
    /// Creates a message answering `response_to` from a single body
    /// document.
    pub(crate) fn from_document(document_payload: Document, response_to: i32) -> Self {
        Self {
            document_payload,
            response_to,
            flags: MessageFlags::empty(),
            request_id: None,
        }
    }

    pub(crate) fn with_request_id(mut self, request_id: i32) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub(crate) fn into_single_document(self) -> Result<Document> {
        Ok(self.document_payload)
    }

    /// Parses the post-header bytes of an OP_MSG frame.
    pub(crate) fn read_body(body: &[u8]) -> Result<Self> {
        Self::read_sections(body, 0)
    }

    /// Parses the post-header bytes of an OP_COMPRESSED frame wrapping an
    /// OP_MSG.
    pub(crate) fn read_compressed_body(body: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(body);
        let original_op = cursor
            .read_i32::<LittleEndian>()
            .map_err(|e| truncated(e.to_string()))?;
        if original_op != OpCode::Message as i32 {
            return Err(ProtocolError::Codec(format!(
                "the original op code of a compressed frame must be {}, but was {}",
                OpCode::Message as i32,
                original_op
            ))
            .into());
        }

        let uncompressed_size = cursor
            .read_i32::<LittleEndian>()
            .map_err(|e| truncated(e.to_string()))?;
        let compressor_id = cursor.read_u8().map_err(|e| truncated(e.to_string()))?;

        let compressed = &body[cursor.position() as usize..];
        let decompressed = compression::decompress_message(compressed, compressor_id)?;

        if decompressed.len() != uncompressed_size as usize {
            return Err(ProtocolError::Codec(format!(
                "the frame claims an uncompressed length of {}, but {} bytes were produced",
                uncompressed_size,
                decompressed.len()
            ))
            .into());
        }

        Self::read_sections(&decompressed, 0)
    }

    fn read_sections(body: &[u8], response_to: i32) -> Result<Self> {
        let mut cursor = Cursor::new(body);
        let flags = MessageFlags::from_bits_truncate(
            cursor
                .read_u32::<LittleEndian>()
                .map_err(|e| truncated(e.to_string()))?,
        );

        let checksum_len = if flags.contains(MessageFlags::CHECKSUM_PRESENT) {
            std::mem::size_of::<u32>() as u64
        } else {
            0
        };
        let sections_end = body.len() as u64 - checksum_len;

        let mut document_payload = None;
        while cursor.position() < sections_end {
            let payload_type = cursor.read_u8().map_err(|e| truncated(e.to_string()))?;
            if payload_type != 0 {
                return Err(ProtocolError::Frame(format!(
                    "unexpected OP_MSG payload type {} in a server reply",
                    payload_type
                ))
                .into());
            }
            let document = Document::from_reader(&mut cursor)
                .map_err(|e| ProtocolError::Frame(format!("malformed section document: {}", e)))?;
            if document_payload.replace(document).is_some() {
                return Err(ProtocolError::Frame(
                    "an OP_MSG reply must contain exactly one payload type 0 section".to_string(),
                )
                .into());
            }
        }

        Ok(Self {
            document_payload: document_payload.ok_or_else(|| {
                ProtocolError::Frame(
                    "an OP_MSG reply must contain exactly one payload type 0 section".to_string(),
                )
            })?,
            response_to,
            flags: flags - MessageFlags::CHECKSUM_PRESENT,
            request_id: None,
        })
    }

    /// Serializes the message and writes it to `writer`.
    pub(crate) async fn write_to<W: AsyncWrite + Unpin + Send>(&self, writer: &mut W) -> Result<()> {
        let section = self.section_bytes()?;

        let total_length = Header::LENGTH + std::mem::size_of::<u32>() + section.len();
        let header = Header {
            length: total_length as i32,
            request_id: self.request_id.unwrap_or_else(next_request_id),
            response_to: self.response_to,
            op_code: OpCode::Message,
        };

        header.write_to(writer).await?;
        writer.write_u32_le(self.flags.bits()).await?;
        writer.write_all(&section).await?;
        writer.flush().await?;

        Ok(())
    }

    /// Serializes the message, compresses the flags and sections, and writes
    /// an OP_COMPRESSED frame to `writer`.
    pub(crate) async fn write_compressed_to<W: AsyncWrite + Unpin + Send>(
        &self,
        writer: &mut W,
        compressor: Compressor,
    ) -> Result<()> {
        let section = self.section_bytes()?;

        let mut uncompressed = Vec::with_capacity(section.len() + 4);
        uncompressed.extend(self.flags.bits().to_le_bytes());
        uncompressed.extend(&section);
        let compressed = compression::compress_message(&uncompressed, compressor)?;

        let total_length = Header::LENGTH
            + std::mem::size_of::<i32>()
            + std::mem::size_of::<i32>()
            + std::mem::size_of::<u8>()
            + compressed.len();
        let header = Header {
            length: total_length as i32,
            request_id: self.request_id.unwrap_or_else(next_request_id),
            response_to: self.response_to,
            op_code: OpCode::Compressed,
        };

        header.write_to(writer).await?;
        writer.write_i32_le(OpCode::Message as i32).await?;
        writer.write_i32_le(uncompressed.len() as i32).await?;
        writer.write_u8(compressor.id()).await?;
        writer.write_all(&compressed).await?;
        writer.flush().await?;

        Ok(())
    }

    fn section_bytes(&self) -> Result<Vec<u8>> {
        let doc_bytes = bson::to_vec(&self.document_payload)?;
        let mut section = Vec::with_capacity(doc_bytes.len() + 1);
        // Payload type 0.
        section.push(0);
        section.extend(doc_bytes);
        Ok(section)
    }
}

fn truncated(detail: String) -> crate::error::Error {
    ProtocolError::Frame(format!("truncated OP_MSG body: {}", detail)).into()
}
