//! WebSocket signaling channel
//!
//! Speaks the JSON wire protocol over a WebSocket to a signaling
//! server that handles room fan-out. The server is trusted to deliver
//! in order per sender; this client only frames, parses, and filters.

use super::{SignalingChannel, SignalingMessage};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// A registered participant receiving room traffic
struct Subscriber {
    room: String,
    user: String,
    tx: mpsc::UnboundedSender<SignalingMessage>,
}

/// Signaling channel over a WebSocket connection
pub struct WebSocketSignaling {
    /// Server URL this channel is connected to
    url: String,

    /// Outgoing frame sender
    tx: mpsc::UnboundedSender<Message>,

    /// Current subscriber, if any
    subscriber: Arc<RwLock<Option<Subscriber>>>,
}

impl WebSocketSignaling {
    /// Connect to a signaling server
    ///
    /// Establishes the WebSocket connection and starts background
    /// tasks for sending and receiving frames.
    ///
    /// # Arguments
    ///
    /// * `url` - Signaling server URL (ws:// or wss://)
    pub async fn connect(url: &str) -> Result<Self> {
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "signaling URL must start with ws:// or wss://, got {}",
                url
            )));
        }

        info!("Connecting to signaling server: {}", url);

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::Channel(format!("Failed to connect: {}", e)))?;

        info!("Connected to signaling server");

        let (write, read) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber = Arc::new(RwLock::new(None));

        tokio::spawn(Self::sender_task(write, rx));
        tokio::spawn(Self::receiver_task(read, subscriber.clone()));

        Ok(Self {
            url: url.to_string(),
            tx,
            subscriber,
        })
    }

    /// Server URL this channel was connected to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sender task: forwards frames from the channel to the socket
    async fn sender_task(
        mut write: futures::stream::SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = write.send(msg).await {
                error!("Failed to send WebSocket frame: {}", e);
                break;
            }
        }

        debug!("Signaling sender task terminated");
    }

    /// Receiver task: parses text frames and forwards room traffic to
    /// the registered subscriber
    async fn receiver_task(
        mut read: futures::stream::SplitStream<WsStream>,
        subscriber: Arc<RwLock<Option<Subscriber>>>,
    ) {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    Self::dispatch_frame(&text, &*subscriber.read().await);
                }
                Ok(Message::Close(_)) => {
                    info!("Signaling WebSocket closed by server");
                    break;
                }
                Err(e) => {
                    error!("Signaling WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        debug!("Signaling receiver task terminated");
    }

    /// Parse one frame and hand it to the subscriber when it belongs
    /// to their room. Malformed frames are dropped with a diagnostic.
    fn dispatch_frame(text: &str, subscriber: &Option<Subscriber>) {
        let message = match SignalingMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropped malformed signaling frame: {}", e);
                return;
            }
        };

        let Some(sub) = subscriber else {
            debug!("Dropped {}: no subscriber registered", message.kind());
            return;
        };

        if message.room != sub.room {
            debug!(
                "Dropped {}: room {} is not {}",
                message.kind(),
                message.room,
                sub.room
            );
            return;
        }

        if sub.tx.send(message).is_err() {
            debug!("Dropped frame for {}: subscriber receiver gone", sub.user);
        }
    }
}

#[async_trait]
impl SignalingChannel for WebSocketSignaling {
    async fn send(&self, message: SignalingMessage) -> Result<()> {
        let json = message.to_json()?;
        debug!("Sending {} to signaling server", message.kind());

        self.tx
            .send(Message::Text(json))
            .map_err(|e| Error::Channel(format!("Signaling connection closed: {}", e)))
    }

    async fn subscribe(
        &self,
        room: &str,
        user: &str,
    ) -> Result<mpsc::UnboundedReceiver<SignalingMessage>> {
        let (tx, rx) = mpsc::unbounded_channel();

        *self.subscriber.write().await = Some(Subscriber {
            room: room.to_string(),
            user: user.to_string(),
            tx,
        });

        debug!("{} subscribed to room {} via {}", user, room, self.url);
        Ok(rx)
    }

    async fn unsubscribe(&self, room: &str, user: &str) -> Result<()> {
        let mut subscriber = self.subscriber.write().await;
        if subscriber
            .as_ref()
            .is_some_and(|s| s.room == room && s.user == user)
        {
            *subscriber = None;
            debug!("{} unsubscribed from room {}", user, room);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber(room: &str, user: &str) -> (Subscriber, mpsc::UnboundedReceiver<SignalingMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Subscriber {
                room: room.to_string(),
                user: user.to_string(),
                tx,
            },
            rx,
        )
    }

    #[test]
    fn test_dispatch_forwards_room_traffic() {
        let (sub, mut rx) = subscriber("room-1", "alice");
        let frame = SignalingMessage::user_joined("room-1", "bob")
            .to_json()
            .unwrap();

        WebSocketSignaling::dispatch_frame(&frame, &Some(sub));

        assert_eq!(rx.try_recv().unwrap().from, "bob");
    }

    #[test]
    fn test_dispatch_filters_other_rooms() {
        let (sub, mut rx) = subscriber("room-1", "alice");
        let frame = SignalingMessage::user_joined("room-2", "bob")
            .to_json()
            .unwrap();

        WebSocketSignaling::dispatch_frame(&frame, &Some(sub));

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dispatch_tolerates_malformed_frames() {
        let (sub, mut rx) = subscriber("room-1", "alice");

        WebSocketSignaling::dispatch_frame("{not json", &Some(sub));
        WebSocketSignaling::dispatch_frame("{}", &None);

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_rejects_non_websocket_url() {
        let result = WebSocketSignaling::connect("http://localhost:8080").await;
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_wss_url_passes_validation() {
        // Nothing listens on the discard port; the URL is accepted and
        // the connection attempt itself is what fails.
        let result = WebSocketSignaling::connect("wss://127.0.0.1:9").await;
        assert!(matches!(result, Err(Error::Channel(_))));
    }
}
