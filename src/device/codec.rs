//! Gateway wire framing
//!
//! Every request and response is one JSON object behind a header block:
//! ```text
//! Content-Length: <byte-length>\r\n
//! \r\n
//! <JSON body>
//! ```
//! Unknown headers are skipped.

use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::protocol::{RequestMessage, ResponseMessage};
use crate::common::{Error, Result};

/// Upper bound for a single response body; point values are tiny
const MAX_BODY_BYTES: usize = 1024 * 1024;

fn closed_or_io(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::GatewayCrashed
    } else {
        Error::Io(e)
    }
}

/// Consume the header block and return the announced body length
async fn read_body_length<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<usize> {
    let mut length = None;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await.map_err(closed_or_io)? == 0 {
            return Err(Error::GatewayCrashed);
        }

        let header = line.trim();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                let value = value.trim();
                length = Some(value.parse::<usize>().map_err(|_| {
                    Error::GatewayProtocol(format!("Invalid Content-Length: {}", value))
                })?);
            }
        }
    }

    match length {
        Some(len) if len > MAX_BODY_BYTES => Err(Error::GatewayProtocol(format!(
            "Response of {} bytes exceeds the {} byte limit",
            len, MAX_BODY_BYTES
        ))),
        Some(len) => Ok(len),
        None => Err(Error::GatewayProtocol(
            "Missing Content-Length header".to_string(),
        )),
    }
}

/// Read the next response from the gateway
pub async fn read_response<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<ResponseMessage> {
    let len = read_body_length(reader).await?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(closed_or_io)?;

    tracing::trace!("gateway <<< {}", String::from_utf8_lossy(&body));
    serde_json::from_slice(&body)
        .map_err(|e| Error::GatewayProtocol(format!("Invalid response: {}", e)))
}

/// Send one request to the gateway
pub async fn write_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    request: &RequestMessage,
) -> Result<()> {
    let body = serde_json::to_string(request)?;
    tracing::trace!("gateway >>> {}", body);

    writer
        .write_all(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes())
        .await?;
    writer.write_all(body.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
