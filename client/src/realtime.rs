//! Live comment inserts over the service's Phoenix-channel websocket.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use gazette_shared::{ChangeEvent, CommentInsertEvent};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::auth::SessionStore;
use crate::backend::{ChangeFeed, Subscription};
use crate::config::ClientConfig;
use crate::error::BackendError;
use crate::rest::RestClient;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PhoenixMessage {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

#[derive(Clone)]
pub struct RealtimeFeed {
    config: Arc<ClientConfig>,
    session: SessionStore,
}

impl RealtimeFeed {
    pub fn new(config: ClientConfig, session: SessionStore) -> Self {
        Self {
            config: Arc::new(config),
            session,
        }
    }

    /// A feed that authenticates with the same session as `client`.
    pub fn for_client(client: &RestClient) -> Self {
        Self::new(client.config().clone(), client.session_store().clone())
    }
}

pub fn topic_for(article_id: &str) -> String {
    format!("realtime:public:comments:{article_id}")
}

fn join_message(topic: &str, article_id: &str, access_token: Option<String>, reference: String) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic.to_string(),
        event: "phx_join".to_string(),
        payload: json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": [
                    {
                        "event": "INSERT",
                        "schema": "public",
                        "table": "comments",
                        "filter": format!("article_id=eq.{article_id}"),
                    },
                    {
                        "event": "INSERT",
                        "schema": "public",
                        "table": "comments",
                        "filter": "parent_id=is.not.null",
                    },
                ],
            },
            "access_token": access_token,
        }),
        reference: Some(reference),
    }
}

fn heartbeat_message(reference: String) -> PhoenixMessage {
    PhoenixMessage {
        topic: "phoenix".to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        reference: Some(reference),
    }
}

fn leave_message(topic: &str, reference: String) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic.to_string(),
        event: "phx_leave".to_string(),
        payload: json!({}),
        reference: Some(reference),
    }
}

#[derive(Debug, PartialEq)]
enum Inbound {
    Change(ChangeEvent),
    Ignore,
    Closed(String),
}

fn decode_inbound(topic: &str, msg: &PhoenixMessage) -> Inbound {
    if msg.topic != topic {
        return Inbound::Ignore;
    }

    match msg.event.as_str() {
        "postgres_changes" => {
            let data = &msg.payload["data"];
            if data["type"] != "INSERT" || data["table"] != "comments" {
                return Inbound::Ignore;
            }
            match serde_json::from_value::<CommentInsertEvent>(data["record"].clone()) {
                Ok(record) => Inbound::Change(ChangeEvent::from_record(record)),
                Err(e) => {
                    warn!(topic, error = %e, "Undecodable comment insert");
                    Inbound::Ignore
                }
            }
        }
        "phx_reply" if msg.payload["status"] == "error" => {
            Inbound::Closed(format!("join rejected: {}", msg.payload["response"]))
        }
        "phx_error" => Inbound::Closed("channel error".to_string()),
        "phx_close" => Inbound::Closed("channel closed by server".to_string()),
        _ => Inbound::Ignore,
    }
}

fn next_ref(counter: &mut u64) -> String {
    *counter += 1;
    counter.to_string()
}

async fn send(ws: &mut Socket, msg: &PhoenixMessage) -> Result<(), BackendError> {
    ws.send(Message::Text(serde_json::to_string(msg)?)).await?;
    Ok(())
}

/// Reads frames until the server answers the join sent with `join_ref`.
async fn await_join(ws: &mut Socket, topic: &str, join_ref: &str) -> Result<(), BackendError> {
    while let Some(frame) = ws.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let msg = match serde_json::from_str::<PhoenixMessage>(&text) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(topic, error = %e, "Unreadable frame while joining");
                continue;
            }
        };
        if msg.topic != topic || msg.event != "phx_reply" || msg.reference.as_deref() != Some(join_ref) {
            continue;
        }
        return match msg.payload["status"].as_str() {
            Some("ok") => Ok(()),
            _ => Err(BackendError::Realtime(format!(
                "join rejected: {}",
                msg.payload["response"]
            ))),
        };
    }
    Err(BackendError::Realtime(
        "socket closed before the join was acknowledged".to_string(),
    ))
}

#[async_trait]
impl ChangeFeed for RealtimeFeed {
    async fn subscribe(&self, article_id: &str) -> Result<Subscription, BackendError> {
        let (mut ws, _) = tokio_tungstenite::connect_async(self.config.realtime_url()).await?;

        let topic = topic_for(article_id);
        let mut refs = 0;
        let join_ref = next_ref(&mut refs);
        let join = join_message(&topic, article_id, self.session.access_token(), join_ref.clone());
        send(&mut ws, &join).await?;

        if let Err(e) = await_join(&mut ws, &topic, &join_ref).await {
            warn!(topic = %topic, error = %e, "Join not accepted");
            let _ = ws.close(None).await;
            return Err(e);
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (release_tx, release_rx) = oneshot::channel();
        tokio::spawn(pump(
            ws,
            topic.clone(),
            events_tx,
            release_rx,
            self.config.heartbeat_interval,
            refs,
        ));

        info!(topic = %topic, "Subscribed to comment inserts");
        Ok(Subscription::new(topic, events_rx, release_tx))
    }
}

/// Owns the socket until the subscription is released or the server ends
/// the channel.
async fn pump(
    mut ws: Socket,
    topic: String,
    events: mpsc::UnboundedSender<ChangeEvent>,
    mut release: oneshot::Receiver<()>,
    heartbeat_every: Duration,
    mut refs: u64,
) {
    let mut heartbeat = tokio::time::interval(heartbeat_every.max(Duration::from_secs(1)));
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = &mut release => {
                if let Err(e) = send(&mut ws, &leave_message(&topic, next_ref(&mut refs))).await {
                    debug!(topic = %topic, error = %e, "Leave not delivered");
                }
                break;
            }
            _ = heartbeat.tick() => {
                if let Err(e) = send(&mut ws, &heartbeat_message(next_ref(&mut refs))).await {
                    warn!(topic = %topic, error = %e, "Heartbeat failed, ending feed");
                    break;
                }
            }
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let msg = match serde_json::from_str::<PhoenixMessage>(&text) {
                        Ok(msg) => msg,
                        Err(e) => {
                            warn!(topic = %topic, error = %e, "Unreadable realtime frame");
                            continue;
                        }
                    };
                    match decode_inbound(&topic, &msg) {
                        Inbound::Change(event) => {
                            debug!(topic = %topic, id = %event.record().id, "Comment insert received");
                            if events.send(event).is_err() {
                                break;
                            }
                        }
                        Inbound::Ignore => {}
                        Inbound::Closed(reason) => {
                            warn!(topic = %topic, reason = %reason, "Realtime channel ended");
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(topic = %topic, "Realtime socket closed");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(topic = %topic, error = %e, "Realtime socket error");
                    break;
                }
            },
        }
    }

    let _ = ws.close(None).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame(topic: &str, event: &str, payload: Value) -> PhoenixMessage {
        PhoenixMessage {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference: None,
        }
    }

    #[test]
    fn join_binds_both_insert_filters() {
        let topic = topic_for("a1");
        let msg = join_message(&topic, "a1", Some("jwt".into()), "1".into());
        let wire = serde_json::to_value(&msg).unwrap();

        assert_eq!(wire["event"], "phx_join");
        assert_eq!(wire["ref"], "1");
        assert_eq!(wire["payload"]["access_token"], "jwt");
        let bindings = wire["payload"]["config"]["postgres_changes"].as_array().unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0]["filter"], "article_id=eq.a1");
        assert_eq!(bindings[1]["filter"], "parent_id=is.not.null");
    }

    #[test]
    fn decodes_inserts_by_parent() {
        let topic = topic_for("a1");
        let insert = |parent: Value| {
            frame(
                &topic,
                "postgres_changes",
                json!({
                    "ids": [1],
                    "data": {
                        "type": "INSERT",
                        "schema": "public",
                        "table": "comments",
                        "commit_timestamp": "2024-05-01T10:00:00Z",
                        "record": {
                            "id": "k2",
                            "article_id": "a1",
                            "user_id": "u2",
                            "parent_id": parent,
                            "content": "hello",
                            "status": "published"
                        }
                    }
                }),
            )
        };

        match decode_inbound(&topic, &insert(Value::Null)) {
            Inbound::Change(ChangeEvent::CommentInserted(r)) => assert_eq!(r.id, "k2"),
            other => panic!("unexpected {other:?}"),
        }
        match decode_inbound(&topic, &insert(json!("k1"))) {
            Inbound::Change(ChangeEvent::ReplyInserted(r)) => assert_eq!(r.parent_id.as_deref(), Some("k1")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ignores_other_topics_and_updates() {
        let topic = topic_for("a1");
        assert_eq!(
            decode_inbound(&topic, &frame("phoenix", "phx_reply", json!({"status": "ok"}))),
            Inbound::Ignore
        );
        let update = frame(
            &topic,
            "postgres_changes",
            json!({"data": {"type": "UPDATE", "table": "comments", "record": {}}}),
        );
        assert_eq!(decode_inbound(&topic, &update), Inbound::Ignore);
    }

    #[test]
    fn rejected_join_ends_the_feed() {
        let topic = topic_for("a1");
        let reply = frame(
            &topic,
            "phx_reply",
            json!({"status": "error", "response": {"reason": "unauthorized"}}),
        );
        assert!(matches!(decode_inbound(&topic, &reply), Inbound::Closed(_)));
        assert!(matches!(
            decode_inbound(&topic, &frame(&topic, "phx_close", json!({}))),
            Inbound::Closed(_)
        ));
    }

    mod server {
        use std::future::Future;

        use super::*;
        use tokio::net::TcpListener;

        pub type ServerSocket = WebSocketStream<TcpStream>;

        /// Accepts one websocket on a local port and hands it to `handler`.
        pub async fn serve_once<F, Fut>(handler: F) -> ClientConfig
        where
            F: FnOnce(ServerSocket) -> Fut + Send + 'static,
            Fut: Future<Output = ()> + Send + 'static,
        {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                handler(ws).await;
            });
            ClientConfig::new(format!("http://{addr}"), "anon").unwrap()
        }

        pub async fn read(ws: &mut ServerSocket) -> Option<PhoenixMessage> {
            while let Some(Ok(frame)) = ws.next().await {
                if let Message::Text(text) = frame {
                    return serde_json::from_str(&text).ok();
                }
            }
            None
        }

        pub async fn write(ws: &mut ServerSocket, msg: &PhoenixMessage) {
            ws.send(Message::Text(serde_json::to_string(msg).unwrap()))
                .await
                .unwrap();
        }

        pub fn reply_to(join: &PhoenixMessage, payload: Value) -> PhoenixMessage {
            PhoenixMessage {
                topic: join.topic.clone(),
                event: "phx_reply".to_string(),
                payload,
                reference: join.reference.clone(),
            }
        }
    }

    #[tokio::test]
    async fn rejected_join_fails_subscribe() {
        let config = server::serve_once(|mut ws| async move {
            let join = server::read(&mut ws).await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            let reply = server::reply_to(
                &join,
                json!({"status": "error", "response": {"reason": "unauthorized"}}),
            );
            server::write(&mut ws, &reply).await;
            while server::read(&mut ws).await.is_some() {}
        })
        .await;

        let feed = RealtimeFeed::new(config, SessionStore::default());
        let err = feed.subscribe("a1").await.unwrap_err();

        assert!(matches!(err, BackendError::Realtime(_)), "{err:?}");
        assert!(err.to_string().contains("unauthorized"), "{err}");
    }

    #[tokio::test]
    async fn socket_closed_before_reply_fails_subscribe() {
        let config = server::serve_once(|mut ws| async move {
            server::read(&mut ws).await.unwrap();
            let _ = ws.close(None).await;
        })
        .await;

        let feed = RealtimeFeed::new(config, SessionStore::default());
        assert!(feed.subscribe("a1").await.is_err());
    }

    #[tokio::test]
    async fn subscribe_waits_for_ack_then_streams_until_release() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let acked = Arc::new(AtomicBool::new(false));
        let (left_tx, left_rx) = oneshot::channel();
        let server_acked = acked.clone();

        let config = server::serve_once(move |mut ws| async move {
            let join = server::read(&mut ws).await.unwrap();
            assert_eq!(join.event, "phx_join");
            tokio::time::sleep(Duration::from_millis(100)).await;

            // Noise before the reply must not count as an ack.
            server::write(&mut ws, &frame("phoenix", "phx_reply", json!({"status": "ok"}))).await;
            server_acked.store(true, Ordering::SeqCst);
            server::write(&mut ws, &server::reply_to(&join, json!({"status": "ok", "response": {}}))).await;

            let insert = frame(
                &join.topic,
                "postgres_changes",
                json!({"data": {
                    "type": "INSERT",
                    "table": "comments",
                    "record": {"id": "k9", "article_id": "a1", "user_id": "u2", "parent_id": null}
                }}),
            );
            server::write(&mut ws, &insert).await;

            while let Some(msg) = server::read(&mut ws).await {
                if msg.event == "phx_leave" {
                    let _ = left_tx.send(msg.topic);
                    break;
                }
            }
        })
        .await;

        let feed = RealtimeFeed::new(config, SessionStore::default());
        let mut sub = feed.subscribe("a1").await.unwrap();
        assert!(acked.load(Ordering::SeqCst));
        assert_eq!(sub.topic(), "realtime:public:comments:a1");

        match sub.recv().await {
            Some(ChangeEvent::CommentInserted(record)) => assert_eq!(record.id, "k9"),
            other => panic!("unexpected {other:?}"),
        }

        sub.release();
        let left = tokio::time::timeout(Duration::from_secs(5), left_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(left, "realtime:public:comments:a1");
    }

    #[test]
    fn refs_increase() {
        let mut refs = 0;
        assert_eq!(next_ref(&mut refs), "1");
        assert_eq!(next_ref(&mut refs), "2");
    }
}
