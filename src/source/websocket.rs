//! WebSocket push source with an Origin header

use super::{FrameStream, PushSource, SourceError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};

/// Push source over a single WebSocket connection per [`PushSource::open`] call
#[derive(Debug, Clone)]
pub struct WebSocketSource {
    url: String,
    origin: String,
    subscribe_message: Option<String>,
}

impl WebSocketSource {
    /// Create a source for `url`, sending `origin` as the Origin header.
    ///
    /// The upstream edge rejects upgrades without it.
    pub fn new(url: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            origin: origin.into(),
            subscribe_message: None,
        }
    }

    /// Text frame sent right after every successful open
    pub fn with_subscribe_message(mut self, message: Option<String>) -> Self {
        self.subscribe_message = message;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn build_request(&self) -> Result<tungstenite::handshake::client::Request, SourceError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        let origin = HeaderValue::from_str(&self.origin)
            .map_err(|e| SourceError::InvalidHeader(e.to_string()))?;
        request.headers_mut().insert("Origin", origin);
        Ok(request)
    }
}

fn frame_from_message(
    msg: Result<Message, tungstenite::Error>,
) -> Option<Result<String, SourceError>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(text)),
        Ok(Message::Binary(data)) => match String::from_utf8(data) {
            Ok(text) => Some(Ok(text)),
            Err(_) => Some(Err(SourceError::Transport(
                "binary frame is not UTF-8".to_string(),
            ))),
        },
        Ok(Message::Close(frame)) => {
            tracing::info!(frame = ?frame, "Received close frame");
            None
        }
        // Pings are answered by tungstenite on the next read
        Ok(_) => None,
        Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => None,
        Err(e) => Some(Err(SourceError::Transport(e.to_string()))),
    }
}

#[async_trait]
impl PushSource for WebSocketSource {
    async fn open(&self) -> Result<FrameStream, SourceError> {
        let request = self.build_request()?;

        tracing::info!(url = %self.url, origin = %self.origin, "Connecting to push feed");

        let (mut ws_stream, _response) = connect_async(request)
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        if let Some(message) = &self.subscribe_message {
            ws_stream
                .send(Message::Text(message.clone()))
                .await
                .map_err(|e| SourceError::Transport(e.to_string()))?;
            tracing::debug!("Sent subscribe message");
        }

        let frames = ws_stream
            .filter_map(|msg| futures_util::future::ready(frame_from_message(msg)))
            .boxed();

        Ok(frames)
    }
}
