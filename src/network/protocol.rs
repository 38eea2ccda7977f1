use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    executor::command::{Command, QueryResult},
    types::{TransactionId, error::DatabaseError},
};

/// Frames larger than this are rejected before the payload is read.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

pub const FRAME_HEADER_SIZE: usize = 4;

/// A command together with the transaction it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(flatten)]
    pub command: Command,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
}

impl Request {
    pub fn new(command: Command, transaction_id: Option<TransactionId>) -> Self {
        Self {
            command,
            transaction_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Map<String, JsonValue>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// Builds the reply for a successful command. `transaction_id` is the
    /// session's transaction after the command ran.
    pub fn from_result(result: QueryResult, transaction_id: Option<TransactionId>) -> Self {
        let mut response = Response {
            transaction_id,
            ..Default::default()
        };
        match result {
            QueryResult::Rows { columns, rows } => {
                let objects: Vec<Map<String, JsonValue>> = rows
                    .into_iter()
                    .map(|row| {
                        columns
                            .iter()
                            .cloned()
                            .zip(row.into_iter().map(JsonValue::from))
                            .collect()
                    })
                    .collect();
                response.row_count = Some(objects.len());
                response.message = Some(format!("{} row(s) returned", objects.len()));
                response.columns = Some(columns);
                response.rows = Some(objects);
            }
            QueryResult::Affected { count, message } => {
                response.row_count = Some(count);
                response.message = Some(message);
            }
            QueryResult::Transaction { id, message } => {
                response.transaction_id = Some(id);
                response.message = Some(message);
            }
            QueryResult::Tree(text) | QueryResult::Constants(text) => {
                response.message = Some(text);
            }
            other => response.message = Some(other.message()),
        }
        response
    }

    pub fn error(error: impl ToString, transaction_id: Option<TransactionId>) -> Self {
        Response {
            error: Some(error.to_string()),
            transaction_id,
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Serializes `message` as one frame: a big-endian length, then the JSON.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>, DatabaseError> {
    let payload = serde_json::to_vec(message).map_err(|e| DatabaseError::Serialization {
        details: e.to_string(),
    })?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(DatabaseError::Serialization {
            details: format!("frame of {} bytes exceeds {}", payload.len(), MAX_FRAME_SIZE),
        });
    }
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decodes one complete frame. Trailing bytes after the declared length are
/// an error.
pub fn decode_frame<T: for<'de> Deserialize<'de>>(frame: &[u8]) -> Result<T, DatabaseError> {
    if frame.len() < FRAME_HEADER_SIZE {
        return Err(DatabaseError::Serialization {
            details: format!("frame too short: {} bytes", frame.len()),
        });
    }
    let mut header = [0u8; FRAME_HEADER_SIZE];
    header.copy_from_slice(&frame[..FRAME_HEADER_SIZE]);
    let length = check_length(u32::from_be_bytes(header))?;
    let payload = &frame[FRAME_HEADER_SIZE..];
    if payload.len() != length {
        return Err(DatabaseError::Serialization {
            details: format!("frame declares {} bytes but carries {}", length, payload.len()),
        });
    }
    decode_payload(payload)
}

fn check_length(length: u32) -> Result<usize, DatabaseError> {
    let length = length as usize;
    if length > MAX_FRAME_SIZE {
        return Err(DatabaseError::Serialization {
            details: format!("frame of {} bytes exceeds {}", length, MAX_FRAME_SIZE),
        });
    }
    Ok(length)
}

fn decode_payload<T: for<'de> Deserialize<'de>>(payload: &[u8]) -> Result<T, DatabaseError> {
    serde_json::from_slice(payload).map_err(|e| DatabaseError::Serialization {
        details: e.to_string(),
    })
}

/// Reads the next frame. A clean end of stream before the header yields
/// `None`; a stream cut inside a frame is an I/O error.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, DatabaseError>
where
    R: AsyncRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let length = check_length(u32::from_be_bytes(header))?;
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;
    decode_payload(&payload).map(Some)
}

pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), DatabaseError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
