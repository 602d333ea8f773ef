//! End-to-End-Tests mit echten WebSocket-Clients

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tsrelay_core::ChannelClientPair;
use tsrelay_hub::{ws_router, BroadcastHub, EndpointState, HubHandle};
use tsrelay_query::{Channel, OnlineClient, QueryResult, ServerQuery};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

#[derive(Default)]
struct AufzeichnendeQuery {
    gesendet: Mutex<Vec<String>>,
}

#[async_trait]
impl ServerQuery for AufzeichnendeQuery {
    async fn client_liste(&self) -> QueryResult<Vec<OnlineClient>> {
        Ok(Vec::new())
    }

    async fn channel_liste(&self) -> QueryResult<Vec<Channel>> {
        Ok(Vec::new())
    }

    async fn globale_nachricht_senden(&self, text: &str) -> QueryResult<()> {
        self.gesendet.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

struct TestServer {
    url: String,
    hub: HubHandle,
    query: Arc<AufzeichnendeQuery>,
    _shutdown_tx: watch::Sender<bool>,
}

async fn server_starten(chat_echo: bool) -> TestServer {
    let (hub, handle) = BroadcastHub::neu();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(hub.laufen(shutdown_rx));

    let query = Arc::new(AufzeichnendeQuery::default());
    let weiterleitung: Arc<dyn ServerQuery> = query.clone();
    let app = ws_router(EndpointState {
        hub: handle.clone(),
        weiterleitung: Some(weiterleitung),
        chat_echo,
        metriken: None,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestServer {
        url: format!("ws://{addr}/ws"),
        hub: handle,
        query,
        _shutdown_tx: shutdown_tx,
    }
}

async fn verbinden(server: &TestServer) -> WsStream {
    let (ws, _) = tokio::time::timeout(TIMEOUT, connect_async(server.url.as_str()))
        .await
        .unwrap()
        .unwrap();
    ws
}

async fn warten_auf_anzahl(hub: &HubHandle, anzahl: usize) {
    tokio::time::timeout(TIMEOUT, async {
        while hub.subscriber_anzahl().await.unwrap() != anzahl {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Subscriber-Anzahl nicht erreicht");
}

async fn naechster_text(ws: &mut WsStream) -> serde_json::Value {
    loop {
        let frame = tokio::time::timeout(TIMEOUT, ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn servernachricht_erreicht_alle_subscriber() {
    let server = server_starten(false).await;
    let mut a = verbinden(&server).await;
    let mut b = verbinden(&server).await;
    warten_auf_anzahl(&server.hub, 2).await;

    server
        .hub
        .servernachricht_senden("hello world ".into())
        .await
        .unwrap();

    let erwartet = serde_json::json!({"header": "servermsg", "payload": "hello world "});
    assert_eq!(naechster_text(&mut a).await, erwartet);
    assert_eq!(naechster_text(&mut b).await, erwartet);
}

#[tokio::test]
async fn chat_wird_an_den_server_weitergeleitet() {
    let server = server_starten(false).await;
    let mut a = verbinden(&server).await;
    warten_auf_anzahl(&server.hub, 1).await;

    let paket = serde_json::json!({
        "header": "chatmessage",
        "payload": serde_json::json!({"ip": "", "message": "hello", "time": ""}).to_string(),
    });
    a.send(Message::Text(paket.to_string())).await.unwrap();

    tokio::time::timeout(TIMEOUT, async {
        while server.query.gesendet.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(*server.query.gesendet.lock().unwrap(), vec!["hello"]);
}

#[tokio::test]
async fn chat_echo_an_alle() {
    let server = server_starten(true).await;
    let mut a = verbinden(&server).await;
    let mut b = verbinden(&server).await;
    warten_auf_anzahl(&server.hub, 2).await;

    let paket = r#"{"header":"chatmessage","payload":{"ip":"10.0.0.2","message":"hi","time":"12:00"}}"#;
    a.send(Message::Text(paket.into())).await.unwrap();

    for ws in [&mut a, &mut b] {
        let json = naechster_text(ws).await;
        assert_eq!(json["header"], "chatmessage");
        assert_eq!(json["payload"]["message"], "hi");
    }
}

#[tokio::test]
async fn getrennter_subscriber_wird_entfernt() {
    let server = server_starten(false).await;
    let mut a = verbinden(&server).await;
    let mut b = verbinden(&server).await;
    warten_auf_anzahl(&server.hub, 2).await;

    b.close(None).await.unwrap();
    warten_auf_anzahl(&server.hub, 1).await;

    let roster = vec![ChannelClientPair::neu("Lobby", vec!["Anna".into()])];
    server.hub.roster_senden(roster).await.unwrap();
    assert_eq!(
        naechster_text(&mut a).await,
        serde_json::json!({
            "header": "clientlist",
            "payload": [{"ChannelName": "Lobby", "Clients": ["Anna"]}]
        })
    );
}

#[tokio::test]
async fn kaputte_huelle_trennt_nur_diesen_subscriber() {
    let server = server_starten(false).await;
    let mut a = verbinden(&server).await;
    let mut b = verbinden(&server).await;
    warten_auf_anzahl(&server.hub, 2).await;

    b.send(Message::Text("kein json".into())).await.unwrap();
    warten_auf_anzahl(&server.hub, 1).await;

    server
        .hub
        .servernachricht_senden("noch da ".into())
        .await
        .unwrap();
    assert_eq!(naechster_text(&mut a).await["payload"], "noch da ");
}
