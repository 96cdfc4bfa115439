//! End-to-end tests against a listening server with real HTTP and
//! WebSocket clients.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;

use tvcomet_core::Event;
use tvcomet_server::{BOXID_LEN, CometServer};
use tvcomet_settings::ServerSettings;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn boot_server() -> (String, Arc<CometServer>) {
    let settings = ServerSettings {
        port: 0,
        poll_wait_ms: 500,
        ..ServerSettings::default()
    };
    let server = Arc::new(CometServer::new(settings));
    let (addr, _handle) = server.listen().await.unwrap();
    (format!("127.0.0.1:{}", addr.port()), server)
}

async fn connect_ws(addr: &str, boxid: Option<&str>) -> WsStream {
    let url = match boxid {
        Some(id) => format!("ws://{addr}/comet/ws?boxid={id}"),
        None => format!("ws://{addr}/comet/ws"),
    };
    let mut request = url.into_client_request().unwrap();
    let _ = request
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("tvheadend-comet"));
    let (ws, resp) = connect_async(request).await.unwrap();
    assert_eq!(
        resp.headers().get(SEC_WEBSOCKET_PROTOCOL).unwrap(),
        "tvheadend-comet"
    );
    ws
}

async fn next_frame(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn poll(addr: &str, form: &[(&str, &str)]) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/comet/poll"))
        .form(form)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn poll_creates_seeded_mailbox() {
    let (addr, server) = boot_server().await;

    let resp = poll(&addr, &[("immediate", "1")]).await;
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    let boxid = body["boxid"].as_str().unwrap();
    assert_eq!(boxid.len(), BOXID_LEN);

    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages[0]["notificationClass"], "accessUpdate");
    assert_eq!(messages[0]["address"], "127.0.0.1");
    assert_eq!(messages[1]["notificationClass"], "setServerIpPort");
    assert_eq!(messages[1]["ip"], "127.0.0.1");
    assert_eq!(server.hub().mailbox_count(), 1);

    server.shutdown().shutdown();
}

#[tokio::test]
async fn poll_delivers_broadcast_and_keeps_boxid() {
    let (addr, server) = boot_server().await;
    let first: Value = poll(&addr, &[("immediate", "1")]).await.json().await.unwrap();
    let boxid = first["boxid"].as_str().unwrap().to_owned();

    let hub = server.hub().clone();
    let _ = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        hub.add_message(&Event::new("channels", json!({"reload": 1})), false);
    });

    let body: Value = poll(&addr, &[("boxid", boxid.as_str()), ("immediate", "0")])
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["boxid"], boxid.as_str());
    assert_eq!(
        body["messages"],
        json!([{"notificationClass": "channels", "reload": 1}])
    );

    server.shutdown().shutdown();
}

#[tokio::test]
async fn empty_poll_times_out_with_boxid() {
    let (addr, server) = boot_server().await;
    let first: Value = poll(&addr, &[("immediate", "1")]).await.json().await.unwrap();
    let boxid = first["boxid"].as_str().unwrap().to_owned();

    let body: Value = poll(&addr, &[("boxid", boxid.as_str())]).await.json().await.unwrap();
    assert_eq!(body["boxid"], boxid.as_str());
    assert_eq!(body["messages"], json!([]));

    server.shutdown().shutdown();
}

#[tokio::test]
async fn socket_first_frame_has_boxid_later_frames_do_not() {
    let (addr, server) = boot_server().await;
    let mut ws = connect_ws(&addr, None).await;

    let first = next_frame(&mut ws).await;
    let boxid = first["boxid"].as_str().unwrap();
    assert_eq!(boxid.len(), BOXID_LEN);
    assert_eq!(first["messages"][0]["notificationClass"], "accessUpdate");
    assert_eq!(server.hub().socket_count(), 1);

    server
        .hub()
        .add_message(&Event::new("dvrdb", json!({"uuid": "u1"})), false);
    let second = next_frame(&mut ws).await;
    assert!(second.get("boxid").is_none());
    assert_eq!(second["messages"][0]["notificationClass"], "dvrdb");

    server.shutdown().shutdown();
}

#[tokio::test]
async fn socket_resumes_known_mailbox() {
    let (addr, server) = boot_server().await;
    let first: Value = poll(&addr, &[("immediate", "1")]).await.json().await.unwrap();
    let boxid = first["boxid"].as_str().unwrap().to_owned();

    let mut ws = connect_ws(&addr, Some(&boxid)).await;
    server
        .hub()
        .add_message(&Event::new("epg", json!({"update": ["e1"]})), false);
    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["boxid"], boxid.as_str());
    assert_eq!(frame["messages"][0]["notificationClass"], "epg");
    assert_eq!(server.hub().mailbox_count(), 1);

    server.shutdown().shutdown();
}

#[tokio::test]
async fn debug_toggle_reaches_socket() {
    let (addr, server) = boot_server().await;
    let mut ws = connect_ws(&addr, None).await;
    let first = next_frame(&mut ws).await;
    let boxid = first["boxid"].as_str().unwrap().to_owned();

    let resp = reqwest::get(format!("http://{addr}/comet/debug?boxid={boxid}"))
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let frame = next_frame(&mut ws).await;
    assert_eq!(
        frame["messages"][0],
        json!({"notificationClass": "logmessage", "logtxt": "Loglevel debug: enabled"})
    );

    let resp = reqwest::get(format!("http://{addr}/comet/debug")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    server.shutdown().shutdown();
}

#[tokio::test]
async fn shutdown_releases_waiting_poll_with_400() {
    let (addr, server) = boot_server().await;
    let first: Value = poll(&addr, &[("immediate", "1")]).await.json().await.unwrap();
    let boxid = first["boxid"].as_str().unwrap().to_owned();

    let waiter = {
        let addr = addr.clone();
        tokio::spawn(async move { poll(&addr, &[("boxid", boxid.as_str())]).await.status() })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    server.hub().shutdown();

    let status = timeout(TIMEOUT, waiter).await.unwrap().unwrap();
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
    server.shutdown().shutdown();
}

#[tokio::test]
async fn health_reports_sockets() {
    let (addr, server) = boot_server().await;
    let mut ws = connect_ws(&addr, None).await;
    let _ = next_frame(&mut ws).await;

    let body: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["mailboxes"], 1);
    assert_eq!(body["sockets"], 1);

    server.shutdown().shutdown();
}
