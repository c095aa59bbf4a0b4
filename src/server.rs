//! WebSocket transport
//!
//! Each connection becomes a [`ChannelSink`] on the journey and a source of
//! JSON-RPC control calls. Both the call responses and the broadcast
//! coordinates go out through the connection's single outbound queue.

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use std::net::SocketAddr;
use crate::control::ControlSurface;
use crate::playback::JourneyHandle;
use crate::sink::{ChannelSink, Outbound, SinkId};

/// Shared state passed to all request handlers
#[derive(Clone)]
struct AppState {
    journey: JourneyHandle,
    surface: ControlSurface,
}

impl AppState {
    fn new(journey: JourneyHandle) -> Self {
        Self {
            surface: ControlSurface::new(journey.clone()),
            journey,
        }
    }
}

fn router(journey: JourneyHandle) -> Router {
    Router::new()
        .route("/", get(handle_websocket))
        .route("/ws", get(handle_websocket))
        .with_state(AppState::new(journey))
}

/// Serve WebSocket clients until Ctrl-C, then stop the journey
pub async fn serve(addr: SocketAddr, journey: JourneyHandle) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("WebSocket server is listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        router(journey.clone()).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("WebSocket server terminated unexpectedly")?;

    journey.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn handle_websocket(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, peer, state))
}

/// Manages a single WebSocket connection
async fn handle_socket(socket: WebSocket, peer: SocketAddr, state: AppState) {
    let (writer, reader) = socket.split();
    run_connection(writer, reader, peer.to_string(), state).await;
}

/// Drive one connection: attach it to the journey, answer its calls, detach
///
/// Responses and broadcasts share the connection's outbound queue. The call
/// returns when the peer goes away or the writer stops, e.g. after eviction.
async fn run_connection<W, R>(mut writer: W, mut reader: R, peer: String, state: AppState)
where
    W: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let id = SinkId::next();

    let mut writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let (message, last) = match frame {
                Outbound::Text(text) => (Message::Text(text.into()), false),
                Outbound::Close => (Message::Close(None), true),
            };
            if writer.send(message).await.is_err() || last {
                break;
            }
        }
        let _ = writer.close().await;
    });

    let sink = ChannelSink::new(id, peer.clone(), tx.clone());
    if state.journey.attach(Box::new(sink)).await.is_err() {
        warn!("Journey is gone, dropping connection from {}", peer);
        writer_task.abort();
        return;
    }

    let mut writer_done = false;
    loop {
        let message = tokio::select! {
            message = reader.next() => message,
            _ = &mut writer_task => {
                writer_done = true;
                break;
            }
        };

        match message {
            Some(Ok(Message::Text(text))) => {
                debug!("Received message from {}: {}", peer, text.as_str());
                let Some(response) = state.surface.handle_text(text.as_str()).await else {
                    continue;
                };
                match response.to_json() {
                    Ok(json) => {
                        if tx.send(Outbound::Text(json)).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to serialize response: {}", e),
                }
            }
            Some(Ok(Message::Binary(_))) => warn!("Ignoring binary frame from {}", peer),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("WebSocket error from {}: {}", peer, e);
                break;
            }
        }
    }

    state.journey.detach(id).await;
    drop(tx);
    if !writer_done {
        let _ = writer_task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
    use serde_json::{json, Value};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;
    use std::time::Duration;
    use crate::core::{Coordinate, Track};
    use crate::playback::{Journey, PlaybackConfig};
    use crate::sink::ConnectionRegistry;

    /// Test side of one connection
    struct Client {
        to_server: UnboundedSender<Result<Message, axum::Error>>,
        from_server: UnboundedReceiver<Message>,
        task: JoinHandle<()>,
    }

    impl Client {
        fn connect(state: &AppState, peer: &str) -> Self {
            let (to_server, reader) = unbounded();
            let (writer, from_server) = unbounded();
            let task = tokio::spawn(run_connection(writer, reader, peer.to_string(), state.clone()));
            Self {
                to_server,
                from_server,
                task,
            }
        }

        fn send(&self, text: &str) {
            self.to_server
                .unbounded_send(Ok(Message::Text(text.to_string().into())))
                .unwrap();
        }

        async fn next_frame(&mut self) -> Option<Message> {
            timeout(Duration::from_secs(5), self.from_server.next())
                .await
                .expect("no frame from server")
        }

        async fn next_json(&mut self) -> Value {
            match self.next_frame().await {
                Some(Message::Text(text)) => serde_json::from_str(text.as_str()).unwrap(),
                other => panic!("expected a text frame, got {:?}", other),
            }
        }

        /// Round-trip a status call; once it returns the connection is attached
        async fn status(&mut self, id: u64) -> Value {
            self.send(&format!(
                r#"{{"jsonrpc":"2.0","method":"getJourneyStatus","id":{}}}"#,
                id
            ));
            let response = self.next_json().await;
            assert_eq!(response["id"], json!(id));
            response["result"].clone()
        }
    }

    fn state(points: usize) -> AppState {
        let track: Track = (0..points)
            .map(|i| Coordinate {
                lat: i as f64,
                lng: i as f64,
            })
            .collect();
        let (journey, _task) =
            Journey::spawn(track, PlaybackConfig::default(), ConnectionRegistry::default());
        AppState::new(journey)
    }

    #[tokio::test]
    async fn test_responses_and_broadcasts_share_one_ordered_queue() {
        let state = state(3);
        let mut client = Client::connect(&state, "a");
        client.status(1).await;

        client.send(r#"{"jsonrpc":"2.0","method":"startJourney","params":{"delaySeconds":60},"id":2}"#);
        client.send(r#"{"jsonrpc":"2.0","method":"stopJourney","id":3}"#);
        client.send(r#"{"jsonrpc":"2.0","method":"continueJourney","id":4}"#);

        assert_eq!(client.next_json().await["result"], json!("Journey started"));
        assert_eq!(client.next_json().await["result"], json!("Journey stopped"));
        // The paused point goes out before the reply to the call that resumed it
        assert_eq!(client.next_json().await, json!({"lat": 0.0, "lng": 0.0}));
        assert_eq!(
            client.next_json().await,
            json!({"jsonrpc": "2.0", "result": "Journey resumed", "id": 4})
        );
    }

    #[tokio::test]
    async fn test_new_connection_closes_previous_writer() {
        let state = state(3);
        let mut a = Client::connect(&state, "a");
        a.status(1).await;
        let mut b = Client::connect(&state, "b");
        let status = b.status(2).await;
        assert_eq!(status["connections"], json!(1));

        assert_eq!(a.next_frame().await, Some(Message::Close(None)));
        assert_eq!(a.next_frame().await, None);
        // A never hung up; the closed writer alone ends its loop
        timeout(Duration::from_secs(5), a.task)
            .await
            .expect("evicted connection kept running")
            .unwrap();

        b.send(r#"{"jsonrpc":"2.0","method":"startJourney","params":{"delaySeconds":0},"id":3}"#);
        let mut frames = vec![b.next_json().await, b.next_json().await];
        frames.sort_by_key(|frame| frame.get("id").is_some());
        assert_eq!(frames[0], json!({"lat": 0.0, "lng": 0.0}));
        assert_eq!(frames[1]["result"], json!("Journey started"));
    }

    #[tokio::test]
    async fn test_peer_hangup_detaches() {
        let state = state(3);
        let mut client = Client::connect(&state, "a");
        client.status(1).await;

        let Client { to_server, task, .. } = client;
        drop(to_server);
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

        let status = state.journey.status().await.unwrap();
        assert_eq!(status.connections, 0);
    }

    #[tokio::test]
    async fn test_notifications_and_binary_frames_get_no_reply() {
        let state = state(3);
        let mut client = Client::connect(&state, "a");
        client.status(1).await;

        client.send(r#"{"jsonrpc":"2.0","method":"setReplaySpeed","params":{"speed":2}}"#);
        client
            .to_server
            .unbounded_send(Ok(Message::Binary(vec![1, 2, 3].into())))
            .unwrap();
        let status = client.status(2).await;
        assert_eq!(status["speedMultiplier"], json!(2.0));
    }
}
