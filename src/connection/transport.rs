//! Realtime transport seam.
//!
//! The connection actor never touches a socket directly. A [`Connector`]
//! opens a [`Link`]: a pair of channels carrying outbound text frames and
//! inbound [`Frame`]s, plus the task that pumps them.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

use crate::error::ClientError;

const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Inbound frame from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// The peer closed or the stream failed; nothing follows.
    Closed(Option<String>),
}

/// One open realtime connection.
#[derive(Debug)]
pub struct Link {
    outbound: Option<mpsc::UnboundedSender<String>>,
    inbound: mpsc::UnboundedReceiver<Frame>,
    pump: Option<JoinHandle<()>>,
}

impl Link {
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<Frame>,
        pump: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            outbound: Some(outbound),
            inbound,
            pump,
        }
    }

    /// Queue a text frame. False once the link is gone.
    pub fn send(&self, text: String) -> bool {
        self.outbound
            .as_ref()
            .map(|tx| tx.send(text).is_ok())
            .unwrap_or(false)
    }

    /// Next inbound frame. A vanished pump reads as a close.
    pub async fn recv(&mut self) -> Frame {
        self.inbound
            .recv()
            .await
            .unwrap_or(Frame::Closed(None))
    }

    /// Close gracefully, giving the pump a moment to send the close frame.
    pub async fn close(mut self) {
        self.outbound.take();
        if let Some(mut pump) = self.pump.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut pump).await.is_err() {
                pump.abort();
            }
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// Opens realtime links.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Link, ClientError>;
}

/// WebSocket connector built on tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Link, ClientError> {
        let url = Url::parse(url).map_err(|e| ClientError::Config(format!("invalid ws url: {e}")))?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Frame>();

        // local -> remote; a dropped sender means close
        let forward = tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                    return;
                }
            }
            let _ = ws_tx.send(WsMessage::Close(None)).await;
            let _ = ws_tx.close().await;
        });

        // remote -> local
        let receive = tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => {
                        if in_tx.send(Frame::Text(text.to_string())).is_err() {
                            return;
                        }
                    }
                    Ok(WsMessage::Close(frame)) => {
                        let reason = frame.map(|f| format!("{} ({})", f.reason, u16::from(f.code)));
                        let _ = in_tx.send(Frame::Closed(reason));
                        return;
                    }
                    // protocol-level ping/pong is answered by tungstenite
                    Ok(_) => {}
                    Err(e) => {
                        let _ = in_tx.send(Frame::Closed(Some(e.to_string())));
                        return;
                    }
                }
            }
            let _ = in_tx.send(Frame::Closed(None));
        });

        let pump = tokio::spawn(async move {
            let mut receive = receive;
            tokio::select! {
                _ = forward => {
                    // closing from our side; let the reader see the close handshake
                    if tokio::time::timeout(CLOSE_GRACE, &mut receive).await.is_err() {
                        receive.abort();
                    }
                }
                _ = &mut receive => {}
            }
        });

        Ok(Link::new(out_tx, in_rx, Some(pump)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_link_over_channels() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let mut link = Link::new(out_tx, in_rx, None);

        assert!(link.send("hello".into()));
        assert_eq!(out_rx.recv().await.as_deref(), Some("hello"));

        in_tx.send(Frame::Text("world".into())).unwrap();
        assert_eq!(link.recv().await, Frame::Text("world".into()));

        drop(in_tx);
        assert_eq!(link.recv().await, Frame::Closed(None));

        link.close().await;
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_ws_connector_refused() {
        let err = WsConnector.connect("ws://127.0.0.1:1/ws").await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }
}
