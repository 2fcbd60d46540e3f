//! WebSocket transport against a real listener and the filesystem stores

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use md_web_host::config::Config;
use md_web_host::ws::{serve_listener, ServerState};
use md_web_protocol::{CommandName, EditPayload, Envelope, OpenPayload};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn start_server() -> (String, Arc<ServerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut config = Config::default();
    config.session.persist_debounce_ms = 20;
    let state = Arc::new(ServerState::from_config(&config));

    let serve_state = state.clone();
    tokio::spawn(async move {
        let _ = serve_listener(listener, serve_state).await;
    });
    (format!("ws://{addr}"), state)
}

fn doc_url(base: &str, document: &Path) -> String {
    let encoded = utf8_percent_encode(&document.to_string_lossy(), NON_ALPHANUMERIC).to_string();
    format!("{base}/?doc={encoded}")
}

async fn connect(url: &str, origin: &str) -> Result<Socket, tokio_tungstenite::tungstenite::Error> {
    let mut request = url.into_client_request().unwrap();
    request.headers_mut().insert("Origin", origin.parse().unwrap());
    connect_async(request).await.map(|(ws, _)| ws)
}

async fn next_envelope(ws: &mut Socket) -> Envelope {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Binary(data) = msg {
            return Envelope::decode(&data).unwrap();
        }
    }
}

async fn send(ws: &mut Socket, envelope: &Envelope) {
    ws.send(Message::Binary(envelope.encode().unwrap())).await.unwrap();
}

#[tokio::test]
async fn edits_over_websocket_reach_disk() {
    let dir = tempfile::tempdir().unwrap();
    let document = dir.path().join("remote.md");
    std::fs::write(&document, "# Remote").unwrap();
    let (base, state) = start_server().await;

    let mut ws = connect(&doc_url(&base, &document), "http://localhost:8080")
        .await
        .expect("valid origin accepted");
    send(&mut ws, &Envelope::bare(CommandName::Init)).await;

    let open = next_envelope(&mut ws).await;
    assert_eq!(open.name, CommandName::Open);
    let open: OpenPayload = open.payload().unwrap();
    assert_eq!(open.content, "# Remote");
    assert_eq!(state.sessions.read().await.session_count(), 1);

    let edit = Envelope::new(CommandName::DoSave, &EditPayload::tagged("# Remote\nedited", open.revision)).unwrap();
    send(&mut ws, &edit).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(std::fs::read_to_string(&document).unwrap(), "# Remote\nedited");

    ws.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(state.sessions.read().await.session_count(), 0);
}

#[tokio::test]
async fn invalid_origin_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let document = dir.path().join("a.md");
    let (base, state) = start_server().await;

    assert!(connect(&doc_url(&base, &document), "http://localhost.evil.com").await.is_err());
    assert!(connect(&doc_url(&base, &document), "http://evil.com").await.is_err());
    assert_eq!(state.sessions.read().await.session_count(), 0);
}

#[tokio::test]
async fn missing_document_is_rejected() {
    let (base, _state) = start_server().await;
    assert!(connect(&format!("{base}/"), "http://localhost").await.is_err());
}

#[tokio::test]
async fn second_view_of_same_document_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let document = dir.path().join("shared.md");
    std::fs::write(&document, "one").unwrap();
    let (base, state) = start_server().await;
    let url = doc_url(&base, &document);

    let mut first = connect(&url, "http://127.0.0.1").await.unwrap();
    send(&mut first, &Envelope::bare(CommandName::Init)).await;
    assert_eq!(next_envelope(&mut first).await.name, CommandName::Open);

    let mut second = connect(&url, "http://127.0.0.1").await.unwrap();
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match second.next().await {
                Some(Ok(Message::Close(frame))) => return frame.map(|f| f.reason.to_string()),
                Some(Ok(_)) => {}
                _ => return None,
            }
        }
    })
    .await
    .unwrap();
    assert!(closed.is_some_and(|reason| reason.contains("already open")));
    assert_eq!(state.sessions.read().await.session_count(), 1);
}

#[tokio::test]
async fn saves_past_the_rate_limit_are_delayed_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    let document = dir.path().join("burst.md");
    std::fs::write(&document, "start").unwrap();
    let (base, _state) = start_server().await;

    let mut ws = connect(&doc_url(&base, &document), "http://localhost").await.unwrap();
    send(&mut ws, &Envelope::bare(CommandName::Init)).await;
    let open: OpenPayload = next_envelope(&mut ws).await.payload().unwrap();

    // More than the connection's burst allowance
    for i in 0..1100 {
        let save = Envelope::new(CommandName::Save, &EditPayload::tagged(format!("edit {i}"), open.revision)).unwrap();
        send(&mut ws, &save).await;
    }

    let last = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let on_disk = std::fs::read_to_string(&document).unwrap_or_default();
            if on_disk == "edit 1099" {
                return on_disk;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("last save never reached disk");
    assert_eq!(last, "edit 1099");
}
