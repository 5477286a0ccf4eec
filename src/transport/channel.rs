/// Live channel seam
///
/// The manager only needs "connect", "next text frame", "send text" and
/// "close"; `WsConnector` provides them over a WebSocket.
use crate::errors::TransportError;
use async_trait::async_trait;

/// An open full-duplex channel
#[async_trait]
pub trait LiveChannel: Send {
    /// Next inbound text frame; `Ok(None)` once the peer closed the channel
    ///
    /// Must be cancel-safe: the manager polls it inside `tokio::select!`.
    async fn next_message(&mut self) -> Result<Option<String>, TransportError>;

    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Close gracefully; errors are ignored
    async fn close(&mut self);
}

/// Opens live channels to one endpoint
#[async_trait]
pub trait LiveConnector: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn connect(&self) -> Result<Box<dyn LiveChannel>, TransportError>;
}

#[cfg(feature = "live")]
pub use ws::WsConnector;

#[cfg(feature = "live")]
mod ws {
    use super::{LiveChannel, LiveConnector};
    use crate::errors::TransportError;
    use async_trait::async_trait;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    /// WebSocket connector (`ws://` or `wss://`)
    pub struct WsConnector {
        url: String,
    }

    impl WsConnector {
        pub fn new(url: impl Into<String>) -> Self {
            Self { url: url.into() }
        }
    }

    #[async_trait]
    impl LiveConnector for WsConnector {
        fn endpoint(&self) -> &str {
            &self.url
        }

        async fn connect(&self) -> Result<Box<dyn LiveChannel>, TransportError> {
            let (stream, _) =
                connect_async(self.url.as_str())
                    .await
                    .map_err(|e| TransportError::Connect {
                        endpoint: self.url.clone(),
                        reason: e.to_string(),
                    })?;
            Ok(Box::new(WsChannel { stream }))
        }
    }

    struct WsChannel {
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    }

    #[async_trait]
    impl LiveChannel for WsChannel {
        async fn next_message(&mut self) -> Result<Option<String>, TransportError> {
            while let Some(message) = self.stream.next().await {
                match message {
                    Ok(Message::Text(text)) => return Ok(Some(text)),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => return Ok(Some(text)),
                        Err(_) => continue,
                    },
                    Ok(Message::Close(_)) => return Ok(None),
                    // Ping/pong are answered by tungstenite itself
                    Ok(_) => continue,
                    Err(e) => return Err(TransportError::Network(e.to_string())),
                }
            }
            Ok(None)
        }

        async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
            self.stream
                .send(Message::Text(text))
                .await
                .map_err(|e| TransportError::Send(e.to_string()))
        }

        async fn close(&mut self) {
            let _ = self.stream.close(None).await;
        }
    }
}
