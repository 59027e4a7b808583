//! Real-time channel.
//!
//! A [`Realtime`] connector opens one connection per account and hands back
//! a [`Connection`]: a [`Publisher`] for outbound frames and a stream of
//! decoded [`ServerEvent`]s. [`Channel`] wraps the current connection with
//! the room bookkeeping the driver needs.

use crate::{Error, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures_util::{SinkExt, Stream as FutStream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info, trace, warn};
use trix_types::{
    events::{ClientEvent, MoveBroadcast, ServerEvent},
    Address, MatchId,
};
use url::Url;

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Outbound half of a connection. Sends are queued and never block.
pub trait Publisher: Send + Sync {
    fn publish(&self, event: ClientEvent) -> Result<()>;
}

pub struct Connection {
    pub publisher: Arc<dyn Publisher>,
    pub events: BoxStream<'static, Result<ServerEvent>>,
}

#[async_trait]
pub trait Realtime: Send + Sync + 'static {
    async fn connect(&self, account: &Address) -> Result<Connection>;
}

/// Websocket connector speaking JSON `{"event", "data"}` text frames.
#[derive(Clone, Debug)]
pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url)?;
        match url.scheme() {
            "ws" | "wss" => Ok(Self { url }),
            scheme => Err(Error::InvalidScheme(scheme.to_string())),
        }
    }
}

#[async_trait]
impl Realtime for WsConnector {
    async fn connect(&self, account: &Address) -> Result<Connection> {
        let (ws, _) = connect_async(self.url.as_str()).await?;
        info!(url = %self.url, account = %account, "real-time channel connected");
        let (publisher, events) = EventStream::new(ws, DEFAULT_CHANNEL_CAPACITY);
        Ok(Connection {
            publisher: Arc::new(publisher),
            events: events.boxed(),
        })
    }
}

struct WsPublisher {
    sender: mpsc::UnboundedSender<ClientEvent>,
}

impl Publisher for WsPublisher {
    fn publish(&self, event: ClientEvent) -> Result<()> {
        self.sender.send(event).map_err(|_| Error::ConnectionClosed)
    }
}

/// Inbound events of a websocket connection. Dropping it stops both the
/// reader and the writer task.
struct EventStream {
    receiver: mpsc::Receiver<Result<ServerEvent>>,
    reader: tokio::task::JoinHandle<()>,
    writer: tokio::task::JoinHandle<()>,
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

impl EventStream {
    fn new<S>(ws: WebSocketStream<S>, capacity: usize) -> (WsPublisher, Self)
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws.split();
        let (tx, receiver) = mpsc::channel(capacity);
        let (sender, outbound) = mpsc::unbounded_channel();
        let reader = Self::spawn_reader(stream, tx);
        let writer = Self::spawn_writer(sink, outbound);
        (
            WsPublisher { sender },
            Self {
                receiver,
                reader,
                writer,
            },
        )
    }

    fn spawn_reader<S>(
        mut stream: futures_util::stream::SplitStream<WebSocketStream<S>>,
        tx: mpsc::Sender<Result<ServerEvent>>,
    ) -> tokio::task::JoinHandle<()>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        trace!(len = text.len(), "received websocket message");
                        let item = match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => Ok(event),
                            Err(e) => {
                                warn!(
                                    len = text.len(),
                                    error = %e,
                                    "failed to decode websocket message"
                                );
                                Err(Error::Json(e))
                            }
                        };
                        if tx.send(item).await.is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("WebSocket closed");
                        let _ = tx.send(Err(Error::ConnectionClosed)).await;
                        break;
                    }
                    Ok(_) => {} // Ignore other message types
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        let _ = tx.send(Err(e.into())).await;
                        break;
                    }
                }
            }
        })
    }

    fn spawn_writer<S>(
        mut sink: futures_util::stream::SplitSink<WebSocketStream<S>, Message>,
        mut outbound: mpsc::UnboundedReceiver<ClientEvent>,
    ) -> tokio::task::JoinHandle<()>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(event) = outbound.recv().await {
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "failed to encode outbound event");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!(error = %e, "failed to send websocket message");
                    break;
                }
            }
            let _ = sink.close().await;
        })
    }
}

impl FutStream for EventStream {
    type Item = Result<ServerEvent>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub connected: bool,
    pub subscribed_match: Option<MatchId>,
}

struct Attached {
    account: Address,
    publisher: Arc<dyn Publisher>,
    events: BoxStream<'static, Result<ServerEvent>>,
}

/// The driver's view of the real-time channel. Outbound messages are
/// best-effort: failures are logged and never retried.
#[derive(Default)]
pub struct Channel {
    attached: Option<Attached>,
    subscribed: Option<MatchId>,
}

impl Channel {
    /// Take ownership of a fresh connection and join the account's room.
    pub fn attach(&mut self, account: Address, connection: Connection) {
        self.subscribed = None;
        let attached = Attached {
            account,
            publisher: connection.publisher,
            events: connection.events,
        };
        send(&attached, ClientEvent::JoinUserRoom(attached.account.clone()));
        self.attached = Some(attached);
    }

    /// Tear the connection down. Dropping the event stream stops its tasks.
    pub fn close(&mut self) {
        if let Some(attached) = self.attached.take() {
            debug!(account = %attached.account, "closing real-time channel");
        }
        self.subscribed = None;
    }

    pub fn is_connected(&self) -> bool {
        self.attached.is_some()
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState {
            connected: self.is_connected(),
            subscribed_match: self.subscribed,
        }
    }

    pub fn subscribe(&mut self, match_id: MatchId) {
        self.subscribed = Some(match_id);
        self.publish(ClientEvent::JoinMatch(match_id));
    }

    pub fn leave(&mut self, match_id: MatchId) {
        if self.subscribed == Some(match_id) {
            self.subscribed = None;
        }
        self.publish(ClientEvent::LeaveMatch(match_id));
    }

    pub fn publish_move(&self, broadcast: MoveBroadcast) {
        self.publish(ClientEvent::MakeMove(broadcast));
    }

    fn publish(&self, event: ClientEvent) {
        match &self.attached {
            Some(attached) => send(attached, event),
            None => debug!(?event, "real-time channel not connected, dropping event"),
        }
    }

    /// Next inbound item. Pending forever while detached; `None` once the
    /// connection has ended, after which the channel is detached.
    pub async fn next_event(&mut self) -> Option<Result<ServerEvent>> {
        let Some(attached) = self.attached.as_mut() else {
            return futures::future::pending().await;
        };
        let next = attached.events.next().await;
        if next.is_none() {
            self.close();
        }
        next
    }
}

fn send(attached: &Attached, event: ClientEvent) {
    if let Err(err) = attached.publisher.publish(event) {
        warn!(account = %attached.account, ?err, "failed to publish real-time event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{
            ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade},
            State as AxumState,
        },
        response::IntoResponse,
        routing::get,
        Router,
    };
    use std::net::SocketAddr;
    use tokio::time::{sleep, timeout, Duration};
    use trix_types::{Board, Symbol};

    const CREATOR: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const JOINER: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    async fn handle_socket(
        ws: WebSocketUpgrade,
        AxumState(seen): AxumState<mpsc::UnboundedSender<String>>,
    ) -> impl IntoResponse {
        ws.on_upgrade(move |socket| serve_socket(socket, seen))
    }

    async fn serve_socket(mut socket: WebSocket, seen: mpsc::UnboundedSender<String>) {
        // Room subscription.
        if let Some(Ok(AxumMessage::Text(text))) = socket.recv().await {
            let _ = seen.send(text);
        }
        let joined = format!(
            r#"{{"event":"matchJoined","data":{{"matchId":7,"player1":"{CREATOR}","player2":"{JOINER}"}}}}"#
        );
        socket.send(AxumMessage::Text(joined)).await.unwrap();
        socket
            .send(AxumMessage::Text("not json".to_string()))
            .await
            .unwrap();
        // joinMatch and makeMove, then hang up.
        for _ in 0..2 {
            if let Some(Ok(AxumMessage::Text(text))) = socket.recv().await {
                let _ = seen.send(text);
            }
        }
        let _ = socket.send(AxumMessage::Close(None)).await;
    }

    async fn serve_ws() -> (String, mpsc::UnboundedReceiver<String>, tokio::task::JoinHandle<()>) {
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        let router = Router::new()
            .route("/socket", get(handle_socket))
            .with_state(seen_tx);
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        let actual_addr = listener.local_addr().unwrap();
        let url = format!("ws://{actual_addr}/socket");
        let handle = tokio::spawn(async move {
            axum::serve(listener, router.into_make_service())
                .await
                .unwrap();
        });
        sleep(Duration::from_millis(50)).await;
        (url, seen_rx, handle)
    }

    #[test]
    fn test_connector_validates_scheme() {
        assert!(WsConnector::new("wss://example.com/socket").is_ok());
        assert!(matches!(
            WsConnector::new("http://example.com"),
            Err(Error::InvalidScheme(_))
        ));
    }

    #[tokio::test]
    async fn test_detached_channel_is_inert() {
        let mut channel = Channel::default();
        channel.subscribe(MatchId(1));
        assert_eq!(
            channel.state(),
            ConnectionState {
                connected: false,
                subscribed_match: Some(MatchId(1)),
            }
        );
        channel.leave(MatchId(1));
        assert_eq!(channel.state().subscribed_match, None);
        assert!(timeout(Duration::from_millis(20), channel.next_event())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_ws_round_trip() {
        let (url, mut seen, handle) = serve_ws().await;
        let account = Address::parse(CREATOR).unwrap();
        let connection = WsConnector::new(&url)
            .unwrap()
            .connect(&account)
            .await
            .unwrap();
        let mut channel = Channel::default();
        channel.attach(account.clone(), connection);
        assert!(channel.is_connected());

        let first = seen.recv().await.unwrap();
        assert_eq!(first, format!(r#"{{"event":"joinUserRoom","data":"{CREATOR}"}}"#));

        let event = channel.next_event().await.unwrap().unwrap();
        assert_eq!(event.name(), "matchJoined");
        assert_eq!(event.match_id(), MatchId(7));
        assert!(matches!(channel.next_event().await, Some(Err(Error::Json(_)))));
        assert!(channel.is_connected());

        channel.subscribe(MatchId(7));
        channel.publish_move(MoveBroadcast {
            match_id: MatchId(7),
            player: account.clone(),
            position: 4,
            board: Board::empty().with_mark(4, Symbol::X).unwrap(),
        });
        assert_eq!(seen.recv().await.unwrap(), r#"{"event":"joinMatch","data":7}"#);
        let moved: serde_json::Value = serde_json::from_str(&seen.recv().await.unwrap()).unwrap();
        assert_eq!(moved["event"], "makeMove");
        assert_eq!(moved["data"]["position"], 4);

        assert!(matches!(
            channel.next_event().await,
            Some(Err(Error::ConnectionClosed))
        ));
        assert!(channel.next_event().await.is_none());
        assert!(!channel.is_connected());

        handle.abort();
    }
}
