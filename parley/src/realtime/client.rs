use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Mutex as TokioMutex};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::change::{ChangeEvent, ChangeFilter};
use super::messages::{
    PhoenixFrame, PHOENIX_TOPIC, PHX_CLOSE, PHX_ERROR, PHX_REPLY, POSTGRES_CHANGES, SYSTEM,
};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Lower bound for the heartbeat and reconnect timers
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Internal message type for the write channel
enum WriteMessage {
    Frame(PhoenixFrame),
    Close,
}

struct Channel {
    filter: ChangeFilter,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

/// Receiving end of one channel subscription
pub struct ChangeSubscription {
    topic: String,
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl ChangeSubscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next change; `None` once the channel is unsubscribed
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }
}

/// Websocket client for the platform's realtime service.
///
/// Channels registered with [`subscribe`](Self::subscribe) survive reconnects:
/// every time the socket comes back they are joined again.
#[derive(Clone)]
pub struct RealtimeClient {
    url: String,
    heartbeat_interval: Duration,
    reconnect_delay: Duration,
    access_token: Arc<RwLock<Option<String>>>,
    channels: Arc<Mutex<HashMap<String, Channel>>>,
    write_tx: Arc<Mutex<Option<mpsc::UnboundedSender<WriteMessage>>>>,
    connected: Arc<TokioMutex<bool>>,
    next_ref: Arc<AtomicU64>,
    /// Shutdown signal broadcaster
    shutdown_tx: broadcast::Sender<()>,
}

impl RealtimeClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_url(
            config.realtime_url(),
            config.heartbeat_interval,
            config.reconnect_delay,
        )
    }

    pub fn with_url(url: impl Into<String>, heartbeat_interval: Duration, reconnect_delay: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            url: url.into(),
            heartbeat_interval: heartbeat_interval.max(MIN_INTERVAL),
            reconnect_delay: reconnect_delay.max(MIN_INTERVAL),
            access_token: Arc::new(RwLock::new(None)),
            channels: Arc::new(Mutex::new(HashMap::new())),
            write_tx: Arc::new(Mutex::new(None)),
            connected: Arc::new(TokioMutex::new(false)),
            next_ref: Arc::new(AtomicU64::new(1)),
            shutdown_tx,
        }
    }

    /// Check if the socket is currently up
    pub async fn is_connected(&self) -> bool {
        *self.connected.lock().await
    }

    /// Token sent with every join; pushed to joined channels when it changes
    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write() = token.clone();
        if let Some(token) = token {
            let topics: Vec<String> = self.channels.lock().keys().cloned().collect();
            for topic in topics {
                let frame = PhoenixFrame::access_token(&topic, &token, self.make_ref());
                let _ = self.push(frame);
            }
        }
    }

    /// Start the socket loop in the background; it keeps reconnecting until
    /// [`disconnect`](Self::disconnect) is called
    pub fn connect(&self) {
        let client = self.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            client.run(shutdown_rx).await;
        });
    }

    /// Register a channel named `name` and return its change stream.
    ///
    /// A second subscription under the same name replaces the first, whose
    /// stream then ends.
    pub fn subscribe(&self, name: &str, filter: ChangeFilter) -> ChangeSubscription {
        let topic = format!("realtime:{}", name);
        let (tx, rx) = mpsc::unbounded_channel();

        let join = PhoenixFrame::join(
            &topic,
            &filter,
            self.access_token.read().as_deref(),
            self.make_ref(),
        );
        self.channels
            .lock()
            .insert(topic.clone(), Channel { filter, tx });

        info!(topic = %topic, "Subscribed to channel");
        // Joined now if connected, otherwise on the next connect
        let _ = self.push(join);

        ChangeSubscription { topic, rx }
    }

    /// Leave a channel and end its change stream
    pub fn unsubscribe(&self, subscription: ChangeSubscription) {
        self.leave(&subscription.topic);
    }

    fn leave(&self, topic: &str) {
        if self.channels.lock().remove(topic).is_some() {
            info!(topic, "Leaving channel");
            let _ = self.push(PhoenixFrame::leave(topic, self.make_ref()));
        }
    }

    /// Gracefully disconnect and stop reconnecting
    pub fn disconnect(&self) {
        info!("Initiating graceful realtime disconnect");
        // Signal shutdown to stop reconnection loop
        let _ = self.shutdown_tx.send(());
        if let Some(tx) = self.write_tx.lock().as_ref() {
            let _ = tx.send(WriteMessage::Close);
        }
    }

    fn make_ref(&self) -> String {
        self.next_ref.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Queue a frame on the live connection
    fn push(&self, frame: PhoenixFrame) -> ClientResult<()> {
        let guard = self.write_tx.lock();
        match guard.as_ref() {
            Some(tx) => tx
                .send(WriteMessage::Frame(frame))
                .map_err(|e| ClientError::realtime(format!("Failed to queue frame: {}", e))),
            None => {
                debug!(topic = %frame.topic, event = %frame.event, "Not connected, frame dropped");
                Err(ClientError::realtime("Not connected"))
            }
        }
    }

    async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let endpoint = self.url.split('?').next().unwrap_or_default().to_string();

        loop {
            info!(url = %endpoint, "Connecting to realtime service");

            match connect_async(self.url.as_str()).await {
                Ok((ws_stream, _)) => {
                    if !self.session(ws_stream, &mut shutdown_rx).await {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, url = %endpoint, "Failed to connect to realtime service");
                }
            }

            debug!(delay = ?self.reconnect_delay, "Reconnecting");
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping reconnection");
                    break;
                }
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
    }

    /// Drive one connection until it drops. Returns whether to reconnect.
    async fn session(
        &self,
        ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> bool {
        info!("Connected to realtime service");
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<WriteMessage>();
        *self.write_tx.lock() = Some(tx);
        *self.connected.lock().await = true;

        self.rejoin_all();

        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        // The first tick completes immediately
        heartbeat.tick().await;

        let mut should_reconnect = true;
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, closing connection gracefully");
                    if let Err(e) = ws_write.send(Message::Close(None)).await {
                        warn!(error = %e, "Failed to send close frame");
                    }
                    should_reconnect = false;
                    break;
                }
                Some(msg) = rx.recv() => {
                    match msg {
                        WriteMessage::Frame(frame) => {
                            let json = match serde_json::to_string(&frame) {
                                Ok(json) => json,
                                Err(e) => {
                                    error!(error = %e, "Failed to encode frame");
                                    continue;
                                }
                            };
                            debug!(topic = %frame.topic, event = %frame.event, "Sending frame");
                            if ws_write.send(Message::Text(json.into())).await.is_err() {
                                error!("Failed to send frame to realtime service");
                                break;
                            }
                        }
                        WriteMessage::Close => {
                            info!("Close requested, sending close frame");
                            if let Err(e) = ws_write.send(Message::Close(None)).await {
                                warn!(error = %e, "Failed to send close frame");
                            }
                            should_reconnect = false;
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    let frame = PhoenixFrame::heartbeat(self.make_ref());
                    let Ok(json) = serde_json::to_string(&frame) else { continue };
                    if ws_write.send(Message::Text(json.into())).await.is_err() {
                        error!("Failed to send heartbeat");
                        break;
                    }
                }
                msg = ws_read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.dispatch(&text),
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Realtime service closed connection");
                            break;
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        // Cleanup
        *self.write_tx.lock() = None;
        *self.connected.lock().await = false;
        info!("Disconnected from realtime service");

        should_reconnect
    }

    fn rejoin_all(&self) {
        let token = self.access_token.read().clone();
        let joins: Vec<PhoenixFrame> = self
            .channels
            .lock()
            .iter()
            .map(|(topic, channel)| {
                PhoenixFrame::join(topic, &channel.filter, token.as_deref(), self.make_ref())
            })
            .collect();

        debug!(count = joins.len(), "Joining channels");
        for join in joins {
            let _ = self.push(join);
        }
    }

    fn dispatch(&self, text: &str) {
        let frame: PhoenixFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                let preview: String = text.chars().take(100).collect();
                warn!(error = %e, preview = %preview, "Unreadable frame");
                return;
            }
        };

        match frame.event.as_str() {
            POSTGRES_CHANGES => self.deliver(&frame),
            PHX_REPLY if frame.topic == PHOENIX_TOPIC => {
                debug!("Heartbeat acknowledged");
            }
            PHX_REPLY => match frame.reply_status() {
                Some("ok") => debug!(topic = %frame.topic, "Channel reply ok"),
                status => warn!(
                    topic = %frame.topic,
                    status = ?status,
                    response = %frame.payload.get("response").cloned().unwrap_or_default(),
                    "Channel request rejected"
                ),
            },
            PHX_ERROR | PHX_CLOSE => {
                warn!(topic = %frame.topic, event = %frame.event, "Channel closed by server");
            }
            SYSTEM => debug!(topic = %frame.topic, payload = %frame.payload, "System message"),
            other => debug!(topic = %frame.topic, event = other, "Ignoring frame"),
        }
    }

    fn deliver(&self, frame: &PhoenixFrame) {
        let Some(event) = ChangeEvent::from_payload(&frame.payload) else {
            warn!(topic = %frame.topic, "Malformed change payload");
            return;
        };

        let dropped = {
            let channels = self.channels.lock();
            let Some(channel) = channels.get(&frame.topic) else {
                debug!(topic = %frame.topic, "Change for unknown channel");
                return;
            };
            if !channel.filter.matches(&event) {
                debug!(topic = %frame.topic, table = %event.table, "Change outside channel filter");
                return;
            }
            channel.tx.send(event).is_err()
        };

        if dropped {
            debug!(topic = %frame.topic, "Subscriber gone");
            self.leave(&frame.topic);
        }
    }
}
