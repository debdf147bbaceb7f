//! The stdio request loop.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::DaemonError;
use crate::protocol::{parse_line, ParsedLine, Request, Response};

/// Counters reported when the input closes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeStats {
    pub requests: u64,
    pub errors: u64,
}

/// Read requests from `reader` until EOF, writing one response line per
/// non-blank input line. Requests are handled strictly one at a time.
pub async fn serve<R, W>(
    mut reader: R,
    mut writer: W,
    dispatcher: Dispatcher,
) -> Result<ServeStats, DaemonError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let dispatcher = Arc::new(Mutex::new(dispatcher));
    let mut stats = ServeStats::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        let response = match parse_line(&line) {
            ParsedLine::Blank => continue,
            ParsedLine::Invalid(response) => {
                warn!("rejected input line: {}", response.error_message().unwrap_or_default());
                response
            }
            ParsedLine::Request(request) => dispatch(&dispatcher, request).await,
        };

        stats.requests += 1;
        if response.is_error() {
            stats.errors += 1;
        }

        writer.write_all(response.to_line()?.as_bytes()).await?;
        writer.flush().await?;
    }

    info!(requests = stats.requests, errors = stats.errors, "input closed, shutting down");
    Ok(stats)
}

/// Run one request on the blocking pool and wait for it.
async fn dispatch(dispatcher: &Arc<Mutex<Dispatcher>>, request: Request) -> Response {
    let request_id = request.request_id.clone();
    debug!(command = %request.command, "dispatching");

    let dispatcher = Arc::clone(dispatcher);
    let task = tokio::task::spawn_blocking(move || {
        // A panic in an earlier request leaves the lock poisoned but the
        // backend slots intact.
        let mut dispatcher = dispatcher.lock().unwrap_or_else(PoisonError::into_inner);
        dispatcher.handle(request)
    });

    match task.await {
        Ok(response) => response,
        Err(e) => {
            let err = DaemonError::from(e);
            error!(request_id = %request_id, "{}", err);
            Response::error(Some(request_id), err.to_string())
        }
    }
}
