//! Stdio transport: newline-delimited JSON-RPC over a byte stream pair.
//!
//! The process has exactly one implicit connection bound to its input and
//! output for its whole lifetime. Requests are handled one at a time and
//! responses are written by a single writer task. Stdio carries no headers,
//! so calls to tools that require auth always fail here.

use crate::dispatcher::{Connection, Dispatcher};
use crate::error::{McpError, McpResult};
use crate::protocol::{JsonRpcResponse, Outbound, INVALID_REQUEST};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use toolbox_auth::Credentials;
use toolbox_tools::DEFAULT_TOOLSET;
use tracing::{debug, info, warn};

/// Longest accepted request line.
pub const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Serve MCP over the process's stdin and stdout.
pub async fn serve_stdio(dispatcher: Dispatcher, shutdown: CancellationToken) -> McpResult<()> {
    serve(dispatcher, tokio::io::stdin(), tokio::io::stdout(), shutdown).await
}

/// Serve MCP over any reader/writer pair until the reader ends or
/// `shutdown` fires.
pub async fn serve<R, W>(
    dispatcher: Dispatcher,
    reader: R,
    writer: W,
    shutdown: CancellationToken,
) -> McpResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    let writer_task = tokio::spawn(async move {
        let mut sink = FramedWrite::new(writer, LinesCodec::new());
        while let Some(message) = rx.recv().await {
            let line = serde_json::to_string(&message)?;
            sink.send(line).await?;
        }
        Ok::<_, McpError>(())
    });

    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let mut conn = Connection::new(DEFAULT_TOOLSET);
    let credentials = Credentials::new();
    info!("MCP stdio transport started");

    let result = loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break Ok(()),
            next = lines.next() => next,
        };

        let line = match next {
            None => break Ok(()),
            Some(Ok(line)) => line,
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                warn!(max = MAX_LINE_LENGTH, "Dropping oversized request line");
                let response = JsonRpcResponse::error(
                    None,
                    INVALID_REQUEST,
                    "invalid request: message too large",
                );
                if tx.send(Outbound::Response(response)).is_err() {
                    break Ok(());
                }
                continue;
            }
            Some(Err(e)) => break Err(McpError::from(e)),
        };

        if line.trim().is_empty() {
            continue;
        }
        debug!(bytes = line.len(), "Received stdio message");

        if let Some(response) = dispatcher
            .handle_text(&mut conn, &line, &credentials, &shutdown)
            .await
        {
            if tx.send(Outbound::Response(response)).is_err() {
                break Ok(());
            }
        }
    };

    conn.close();
    drop(tx);
    let written = writer_task
        .await
        .map_err(|e| McpError::Task(e.to_string()))?;
    info!("MCP stdio transport stopped");
    result.and(written)
}
