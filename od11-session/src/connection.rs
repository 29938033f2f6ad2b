//! Opening the socket and running the join handshake

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{CACHE_CONTROL, COOKIE, ORIGIN, PRAGMA};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use od11_api::{Action, DeviceMessage, SessionId};
use od11_state::{SessionToken, StateMirror};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Build the upgrade request with the headers the device expects
pub(crate) fn build_request(config: &SessionConfig) -> Result<Request> {
    let url = config.url()?;
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| SessionError::Config(format!("Invalid WebSocket URL {url}: {e}")))?;

    let headers = request.headers_mut();
    headers.insert(ORIGIN, header_value("Origin", &config.origin_header())?);
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    if let Some(cookie) = config.cookie.as_deref().filter(|c| !c.trim().is_empty()) {
        headers.insert(COOKIE, header_value("Cookie", cookie.trim())?);
    }

    Ok(request)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| SessionError::Config(format!("Invalid {name} header value: {e}")))
}

/// Open the socket and complete the handshake, filling `mirror`
pub(crate) async fn establish(config: &SessionConfig, mirror: &StateMirror) -> Result<WsStream> {
    let request = build_request(config)?;
    let host = config.host.as_str();

    let (mut ws, response) = timeout(config.connect_timeout, connect_async(request))
        .await
        .map_err(|_| {
            SessionError::Timeout(format!(
                "connecting to {host} took longer than {:?}",
                config.connect_timeout
            ))
        })?
        .map_err(|e| SessionError::Connection(format!("WebSocket connection to {host} failed: {e}")))?;

    info!(host, status = %response.status(), "Connected to device");

    match timeout(config.handshake_timeout, handshake(&mut ws, config, mirror)).await {
        Ok(Ok(())) => Ok(ws),
        Ok(Err(e)) => {
            let _ = ws.close(None).await;
            Err(e)
        }
        Err(_) => {
            let _ = ws.close(None).await;
            Err(SessionError::HandshakeRejected(format!(
                "no group_joined from {host} within {:?}",
                config.handshake_timeout
            )))
        }
    }
}

/// `global_join` → `global_joined` → `group_join` → `group_joined`
async fn handshake(ws: &mut WsStream, config: &SessionConfig, mirror: &StateMirror) -> Result<()> {
    send_action(ws, &config.handshake.global_join(), None).await?;
    wait_for(ws, mirror, "global_joined").await?;

    send_action(ws, &config.handshake.group_join(), None).await?;
    wait_for(ws, mirror, "group_joined").await?;

    info!(
        host = %config.host,
        sid = ?mirror.get::<SessionToken>().map(|t| t.0.to_string()),
        sources = mirror.snapshot().source_map().len(),
        "Joined device group"
    );
    Ok(())
}

/// Read frames until `expected` arrives, merging everything along the way
async fn wait_for(ws: &mut WsStream, mirror: &StateMirror, expected: &str) -> Result<()> {
    while let Some(frame) = ws.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(frame)) => {
                return Err(SessionError::HandshakeRejected(format!(
                    "device closed the connection while waiting for {expected}: {frame:?}"
                )));
            }
            Ok(_) => continue,
            Err(e) => {
                return Err(SessionError::Connection(format!(
                    "socket error while waiting for {expected}: {e}"
                )));
            }
        };

        match DeviceMessage::parse(&text) {
            Ok(DeviceMessage::Rejected { reason }) => {
                return Err(SessionError::HandshakeRejected(reason));
            }
            Ok(message) => {
                mirror.apply_message(&message);
                if message.kind() == expected {
                    return Ok(());
                }
                debug!(kind = message.kind(), expected, "Handshake frame merged");
            }
            Err(e) => warn!(error = %e, "Ignoring malformed frame during handshake"),
        }
    }

    Err(SessionError::HandshakeRejected(format!(
        "connection ended while waiting for {expected}"
    )))
}

/// Encode and write one action
pub(crate) async fn send_action<S>(sink: &mut S, action: &Action, sid: Option<&SessionId>) -> Result<()>
where
    S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let frame = action.encode(sid)?;
    debug!(action = action.name(), frame = %frame, "Sending");
    sink.send(Message::Text(frame.into()))
        .await
        .map_err(|e| SessionError::Connection(format!("failed to send {}: {e}", action.name())))
}
