use crate::error::Error;
use crate::transport::{
    DisconnectReason, ListenerId, Listeners, MessageCallback, TransportEvent, TransportFactory,
    TransportFailure, TransportHandle, TransportKind, TransportOptions,
};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{
    client_async_tls_with_config, tungstenite::client::IntoClientRequest, tungstenite::Message,
    Connector, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, trace, warn};
use url::Url;

/// Event name used for inbound text frames that do not carry an envelope.
const RAW_MESSAGE_EVENT: &str = "message";

/// Application-level message envelope carried in text frames.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Commands forwarded into the I/O loop
enum Outbound {
    /// Send a frame
    Frame(Message),
    /// Gracefully close the connection
    Close,
}

/// Factory producing [`WebSocketTransport`] handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketFactory;

impl WebSocketFactory {
    /// Create a new factory
    pub fn new() -> Self {
        Self
    }
}

impl TransportFactory for WebSocketFactory {
    fn create(&self, target: &str, options: &TransportOptions) -> Arc<dyn TransportHandle> {
        Arc::new(WebSocketTransport::new(target, options.clone()))
    }
}

/// One WebSocket connection attempt over tokio-tungstenite.
///
/// `connect` spawns an I/O task that establishes the connection (TCP with
/// low-latency options, optional TLS, handshake, all bounded by the connect
/// timeout) and then pumps frames: inbound text frames are decoded as
/// `{event, data}` envelopes and dispatched to registered listeners,
/// outbound `emit` calls are encoded the same way.
pub struct WebSocketTransport {
    shared: Arc<WsShared>,
}

struct WsShared {
    target: String,
    options: TransportOptions,
    connected: AtomicBool,
    listeners: Listeners,
    lifecycle: Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
    io_task: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketTransport {
    /// Create a handle for `target`. Does not connect.
    pub fn new(target: &str, options: TransportOptions) -> Self {
        Self {
            shared: Arc::new(WsShared {
                target: target.to_string(),
                options,
                connected: AtomicBool::new(false),
                listeners: Listeners::new(),
                lifecycle: Mutex::new(Vec::new()),
                outbound: Mutex::new(None),
                io_task: Mutex::new(None),
            }),
        }
    }
}

impl WsShared {
    fn broadcast(&self, event: TransportEvent) {
        self.lifecycle
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn dispatch_text(&self, text: &str) {
        match serde_json::from_str::<Envelope>(text) {
            Ok(envelope) => {
                let delivered = self.listeners.dispatch(&envelope.event, &envelope.data);
                trace!(
                    target = %self.target,
                    event = %envelope.event,
                    delivered,
                    "dispatched message event"
                );
            }
            Err(_) => {
                // Not an envelope; hand the raw text to generic listeners
                self.listeners
                    .dispatch(RAW_MESSAGE_EVENT, &Value::String(text.to_string()));
            }
        }
    }
}

impl TransportHandle for WebSocketTransport {
    fn connect(&self) {
        let mut task_slot = self.shared.io_task.lock();
        if task_slot.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!(target = %self.shared.target, "connect issued while already active, ignoring");
            return;
        }

        if !self
            .shared
            .options
            .transports
            .contains(&TransportKind::WebSocket)
        {
            let err = Error::UnsupportedTransport(self.shared.options.transports.clone());
            warn!(target = %self.shared.target, error = %err, "cannot connect");
            self.shared
                .broadcast(TransportEvent::ConnectError(TransportFailure::from(&err)));
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.outbound.lock() = Some(tx);
        let shared = Arc::clone(&self.shared);
        *task_slot = Some(tokio::spawn(run_io(shared, rx)));
    }

    fn disconnect(&self) {
        let delivered = self
            .shared
            .outbound
            .lock()
            .take()
            .map(|tx| tx.send(Outbound::Close).is_ok())
            .unwrap_or(false);

        if !delivered {
            // No live loop to honour the close; drop the task outright
            if let Some(task) = self.shared.io_task.lock().take() {
                task.abort();
            }
            self.shared.connected.store(false, Ordering::SeqCst);
        }
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.lifecycle.lock().push(tx);
        rx
    }

    fn detach_listeners(&self) {
        self.shared.listeners.clear();
        self.shared.lifecycle.lock().clear();
    }

    fn on(&self, event: &str, callback: MessageCallback) -> ListenerId {
        self.shared.listeners.add(event, callback)
    }

    fn off(&self, event: &str, id: ListenerId) {
        self.shared.listeners.remove(event, id);
    }

    fn emit(&self, event: &str, payload: Value) {
        let sender = self.shared.outbound.lock().clone();
        let Some(tx) = sender else {
            trace!(target = %self.shared.target, event, "emit while disconnected, dropping");
            return;
        };
        let envelope = Envelope {
            event: event.to_string(),
            data: payload,
        };
        if let Ok(text) = serde_json::to_string(&envelope) {
            let _ = tx.send(Outbound::Frame(Message::Text(text)));
        }
    }
}

/// Type alias for the WebSocket stream
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn run_io(shared: Arc<WsShared>, mut outbound_rx: mpsc::UnboundedReceiver<Outbound>) {
    let target = shared.target.clone();

    let stream = match timeout(
        shared.options.connect_timeout,
        establish(&target, &shared.options),
    )
    .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            debug!(target = %target, error = %e, "connect failed");
            shared.broadcast(TransportEvent::ConnectError(TransportFailure::from(&e)));
            return;
        }
        Err(_) => {
            let e = Error::Timeout(shared.options.connect_timeout);
            debug!(target = %target, error = %e, "connect failed");
            shared.broadcast(TransportEvent::ConnectError(TransportFailure::from(&e)));
            return;
        }
    };

    shared.connected.store(true, Ordering::SeqCst);
    info!(target = %target, "websocket connected");
    shared.broadcast(TransportEvent::Connected);

    let (mut write, mut read) = stream.split();

    let reason = loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => shared.dispatch_text(&text),
                    Some(Ok(Message::Ping(data))) => {
                        if write.send(Message::Pong(data)).await.is_err() {
                            break DisconnectReason::ConnectionLost;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(target = %target, "received close frame");
                        break DisconnectReason::ServerInitiated;
                    }
                    // Binary/pong/raw frames carry no envelope
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(target = %target, error = %e, "websocket error");
                        break DisconnectReason::ConnectionLost;
                    }
                    None => {
                        debug!(target = %target, "websocket stream ended");
                        break DisconnectReason::ServerInitiated;
                    }
                }
            }

            command = outbound_rx.recv() => {
                match command {
                    Some(Outbound::Frame(message)) => {
                        if let Err(e) = write.send(message).await {
                            warn!(target = %target, error = %e, "failed to send frame");
                            break DisconnectReason::ConnectionLost;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        break DisconnectReason::ClientInitiated;
                    }
                }
            }
        }
    };

    shared.connected.store(false, Ordering::SeqCst);
    info!(target = %target, ?reason, "websocket closed");
    shared.broadcast(TransportEvent::Disconnected(reason));
}

/// Establish the TCP/TLS stream and perform the WebSocket handshake.
async fn establish(target: &str, options: &TransportOptions) -> Result<WsStream, Error> {
    let mut url = Url::parse(target)?;

    match url.scheme() {
        "ws" | "wss" => {}
        "http" => {
            let _ = url.set_scheme("ws");
        }
        "https" => {
            let _ = url.set_scheme("wss");
        }
        scheme => {
            return Err(Error::ConnectionFailed {
                target: target.to_string(),
                message: format!("unsupported scheme: {scheme}"),
            })
        }
    }

    if url.path() == "/" && options.path != "/" {
        url.set_path(&options.path);
    }

    let is_tls = url.scheme() == "wss";
    let host = url
        .host_str()
        .ok_or_else(|| Error::ConnectionFailed {
            target: target.to_string(),
            message: "no host in URL".to_string(),
        })?
        .to_string();
    let port = url.port().unwrap_or(if is_tls { 443 } else { 80 });

    let request = url.as_str().into_client_request()?;

    // DNS lookup
    let dest = format!("{host}:{port}");
    let addr = tokio::net::lookup_host(&dest)
        .await
        .map_err(|e| Error::ConnectionFailed {
            target: target.to_string(),
            message: format!("DNS lookup failed: {e}"),
        })?
        .next()
        .ok_or_else(|| Error::ConnectionFailed {
            target: target.to_string(),
            message: format!("no addresses found for {host}"),
        })?;

    let tcp = TcpStream::connect(addr)
        .await
        .map_err(|e| Error::ConnectionFailed {
            target: target.to_string(),
            message: format!("TCP connect to {addr} failed: {e}"),
        })?;
    set_tcp_options(&tcp);

    let connector = if is_tls {
        let tls = native_tls::TlsConnector::new().map_err(|e| Error::ConnectionFailed {
            target: target.to_string(),
            message: format!("TLS error: {e}"),
        })?;
        Some(Connector::NativeTls(tls))
    } else {
        None
    };

    let (stream, _response) = client_async_tls_with_config(request, tcp, None, connector).await?;

    Ok(stream)
}

/// Set TCP options for low latency
fn set_tcp_options(stream: &TcpStream) {
    let sock = socket2::SockRef::from(stream);

    // Disable Nagle's algorithm
    let _ = sock.set_nodelay(true);

    // Keepalive to detect dead connections
    let keepalive = socket2::TcpKeepalive::new()
        .with_time(Duration::from_secs(30))
        .with_interval(Duration::from_secs(10));
    let _ = sock.set_tcp_keepalive(&keepalive);
}
