//! Primary transport: one WebSocket connection per attempt.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use dentavia_core::config::EndpointConfig;
use dentavia_core::{AppError, AppResult, ErrorKind};

use super::{ConnectContext, TransportEvent, TransportHandle};
use crate::connection::selector::TransportKind;

const FRAME_BUFFER: usize = 64;

/// Open a WebSocket to the configured endpoint and spawn its IO task.
pub(crate) async fn connect(
    endpoint: &EndpointConfig,
    ctx: &ConnectContext,
) -> AppResult<TransportHandle> {
    let url = connection_url(endpoint, ctx);
    let (stream, _response) = connect_async(url.as_str()).await.map_err(classify)?;

    let (frames_tx, frames_rx) = mpsc::channel(FRAME_BUFFER);
    let (events_tx, events_rx) = mpsc::channel(FRAME_BUFFER);
    let cancel = CancellationToken::new();
    tokio::spawn(run_io(stream, frames_rx, events_tx, cancel.clone()));

    Ok(TransportHandle::new(TransportKind::Primary, frames_tx, events_rx, cancel))
}

/// Build the connection URL with the identifying query parameters.
fn connection_url(endpoint: &EndpointConfig, ctx: &ConnectContext) -> String {
    let mut url = format!("{}?connectionId={}", endpoint.ws_url, ctx.connection_id);
    if let Some(user_id) = endpoint.user_id {
        url.push_str(&format!("&userId={user_id}"));
    }
    if let Some(clinic_id) = endpoint.clinic_id {
        url.push_str(&format!("&clinicId={clinic_id}"));
    }
    url.push_str(&format!("&isClinic={}", endpoint.is_clinic));
    url
}

/// Map connect errors onto the failure taxonomy: URL and TLS setup problems
/// will not heal by retrying, everything else is transient.
fn classify(error: WsError) -> AppError {
    match &error {
        WsError::Url(_) => AppError::with_source(
            ErrorKind::Configuration,
            format!("WebSocket endpoint is unusable: {error}"),
            error,
        ),
        _ => AppError::with_source(
            ErrorKind::Transport,
            format!("WebSocket connect failed: {error}"),
            error,
        ),
    }
}

/// Pump frames in both directions until the socket closes or the channel
/// driver cancels the transport.
async fn run_io(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut frames: mpsc::Receiver<String>,
    events: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
) {
    let (mut sink, mut source) = stream.split();

    let close_event = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break None;
            }
            frame = frames.recv() => match frame {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        break Some(TransportEvent::Closed {
                            code: None,
                            reason: format!("send failed: {e}"),
                        });
                    }
                }
                // All handle clones dropped: the attempt was discarded.
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break None;
                }
            },
            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if events.send(TransportEvent::Frame(text.to_string())).await.is_err() {
                        break None;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(frame))) => break Some(close_to_event(frame)),
                Some(Ok(_)) => {
                    // Binary, Pong and raw frames are not part of the protocol.
                }
                Some(Err(e)) => {
                    break Some(TransportEvent::Closed { code: None, reason: e.to_string() });
                }
                None => {
                    break Some(TransportEvent::Closed {
                        code: None,
                        reason: "connection reset".to_string(),
                    });
                }
            },
        }
    };

    if let Some(event) = close_event {
        debug!(?event, "websocket transport closed");
        let _ = events.send(event).await;
    }
}

fn close_to_event(frame: Option<CloseFrame>) -> TransportEvent {
    match frame {
        Some(frame) => TransportEvent::Closed {
            code: Some(u16::from(frame.code)),
            reason: frame.reason.to_string(),
        },
        None => TransportEvent::Closed { code: None, reason: "closed without a code".to_string() },
    }
}
