//! Fallback transport: HTTP long-polling emulating the envelope stream.
//!
//! The server side exposes three endpoints under the polling base URL:
//! `GET /handshake` registers the connection, `GET /poll` parks until
//! messages are available (or the wait expires, returning 204), and
//! `POST /send` accepts one encoded envelope per request.

use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use dentavia_core::config::EndpointConfig;
use dentavia_core::{AppError, AppResult, ErrorKind};

use super::{ConnectContext, TransportEvent, TransportHandle};
use crate::connection::selector::TransportKind;

const FRAME_BUFFER: usize = 64;
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Register with the polling endpoint and spawn the poll and send loops.
pub(crate) async fn connect(
    endpoint: &EndpointConfig,
    poll_wait_seconds: u64,
    ctx: &ConnectContext,
) -> AppResult<TransportHandle> {
    let client = reqwest::Client::builder()
        .build()
        .map_err(|e| AppError::with_source(ErrorKind::Configuration, "failed to build HTTP client", e))?;

    let base = endpoint.poll_url.trim_end_matches('/');
    let handshake_url = format!("{base}/handshake?connectionId={}", ctx.connection_id);
    let poll_url =
        format!("{base}/poll?connectionId={}&wait={poll_wait_seconds}", ctx.connection_id);
    let send_url = format!("{base}/send?connectionId={}", ctx.connection_id);

    let response = client
        .get(&handshake_url)
        .timeout(SEND_TIMEOUT)
        .send()
        .await
        .map_err(classify)?;
    if !response.status().is_success() {
        return Err(AppError::transport(format!(
            "polling handshake rejected with status {}",
            response.status()
        )));
    }

    let (frames_tx, frames_rx) = mpsc::channel(FRAME_BUFFER);
    let (events_tx, events_rx) = mpsc::channel(FRAME_BUFFER);
    let cancel = CancellationToken::new();

    let poll_timeout = Duration::from_secs(poll_wait_seconds) + POLL_GRACE;
    tokio::spawn(poll_loop(
        client.clone(),
        poll_url,
        poll_timeout,
        events_tx.clone(),
        cancel.clone(),
    ));
    tokio::spawn(send_loop(client, send_url, frames_rx, events_tx, cancel.clone()));

    Ok(TransportHandle::new(TransportKind::Fallback, frames_tx, events_rx, cancel))
}

/// Map request errors onto the failure taxonomy. Builder errors mean the
/// URL itself is unusable; everything else is transient.
fn classify(error: reqwest::Error) -> AppError {
    if error.is_builder() {
        AppError::with_source(
            ErrorKind::Configuration,
            format!("polling endpoint is unusable: {error}"),
            error,
        )
    } else {
        AppError::with_source(
            ErrorKind::Transport,
            format!("polling request failed: {error}"),
            error,
        )
    }
}

/// Repeatedly park on the poll endpoint, forwarding every received frame.
/// Any request failure closes the transport as a whole.
async fn poll_loop(
    client: reqwest::Client,
    poll_url: String,
    poll_timeout: Duration,
    events: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
) {
    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return,
            outcome = poll_once(&client, &poll_url, poll_timeout) => outcome,
        };
        match outcome {
            Ok(frames) => {
                for frame in frames {
                    if events.send(TransportEvent::Frame(frame)).await.is_err() {
                        cancel.cancel();
                        return;
                    }
                }
            }
            Err(reason) => {
                debug!(reason, "poll loop terminating");
                let _ = events.send(TransportEvent::Closed { code: None, reason }).await;
                cancel.cancel();
                return;
            }
        }
    }
}

/// One long-poll round trip. 204 means the wait expired with nothing to
/// deliver; 200 carries a JSON array of envelopes.
async fn poll_once(
    client: &reqwest::Client,
    poll_url: &str,
    poll_timeout: Duration,
) -> Result<Vec<String>, String> {
    let response = client
        .get(poll_url)
        .timeout(poll_timeout)
        .send()
        .await
        .map_err(|e| format!("poll request failed: {e}"))?;

    match response.status() {
        StatusCode::NO_CONTENT => Ok(Vec::new()),
        status if status.is_success() => {
            let values: Vec<serde_json::Value> =
                response.json().await.map_err(|e| format!("poll response malformed: {e}"))?;
            Ok(values.into_iter().map(|value| value.to_string()).collect())
        }
        status => Err(format!("poll rejected with status {status}")),
    }
}

/// Forward queued frames to the send endpoint, one POST per frame.
async fn send_loop(
    client: reqwest::Client,
    send_url: String,
    mut frames: mpsc::Receiver<String>,
    events: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                // The handle was dropped; the attempt is over.
                None => {
                    cancel.cancel();
                    return;
                }
            },
        };

        let result = client
            .post(&send_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(frame)
            .timeout(SEND_TIMEOUT)
            .send()
            .await;

        let reason = match result {
            Ok(response) if response.status().is_success() => continue,
            Ok(response) => format!("send rejected with status {}", response.status()),
            Err(e) => format!("send request failed: {e}"),
        };
        debug!(reason, "send loop terminating");
        let _ = events.send(TransportEvent::Closed { code: None, reason }).await;
        cancel.cancel();
        return;
    }
}
