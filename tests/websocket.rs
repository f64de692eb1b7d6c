//! End-to-end tests over a real WebSocket connection

use chatrelay::server::{RelayServer, RelayServerConfig};
use chatrelay::storage::MemoryFileSink;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    server: Arc<RelayServer>,
    sink: Arc<MemoryFileSink>,
    _shutdown: oneshot::Sender<()>,
}

/// Start the server on a random port
async fn start_test_server() -> TestServer {
    let sink = Arc::new(MemoryFileSink::new());
    let server = Arc::new(RelayServer::with_sink(RelayServerConfig::default(), sink.clone()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let running = server.clone();
    tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.await;
        };
        running.serve(listener, shutdown).await.unwrap();
    });

    TestServer {
        addr,
        server,
        sink,
        _shutdown: shutdown_tx,
    }
}

async fn connect(addr: SocketAddr) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}/", addr)).await.unwrap();
    socket
}

async fn send(socket: &mut Socket, value: Value) {
    socket.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Next JSON frame, or None if nothing arrives in time
async fn recv(socket: &mut Socket) -> Option<Value> {
    loop {
        match timeout(Duration::from_millis(500), socket.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return Some(serde_json::from_str(text.as_str()).unwrap()),
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            _ => return None,
        }
    }
}

/// Wait until the server has `expected` identities online
async fn wait_for_online(server: &RelayServer, expected: usize) {
    for _ in 0..100 {
        if server.online_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} online, found {}", expected, server.online_count());
}

async fn signin(test: &TestServer, socket: &mut Socket, name: &str, expected_online: usize) {
    send(socket, json!({"protocol": "signin", "from": name})).await;
    wait_for_online(&test.server, expected_online).await;
}

#[tokio::test]
async fn test_health_endpoint() {
    let test = start_test_server().await;

    let mut stream = TcpStream::connect(test.addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.ends_with("ok"));
}

#[tokio::test]
async fn test_presence_and_direct_messages() {
    let test = start_test_server().await;
    let mut a = connect(test.addr).await;
    let mut b = connect(test.addr).await;
    let mut c = connect(test.addr).await;

    signin(&test, &mut a, "A", 1).await;
    signin(&test, &mut b, "B", 2).await;
    assert_eq!(
        recv(&mut a).await,
        Some(json!({"protocol": "online", "online": "B", "onlineCount": 2}))
    );

    signin(&test, &mut c, "C", 3).await;
    let expected = json!({"protocol": "online", "online": "C", "onlineCount": 3});
    assert_eq!(recv(&mut a).await, Some(expected.clone()));
    assert_eq!(recv(&mut b).await, Some(expected));

    let direct = json!({"protocol": "p2p", "from": "A", "to": "B", "text": "hi"});
    send(&mut a, direct.clone()).await;
    assert_eq!(recv(&mut b).await, Some(direct));
    assert_eq!(recv(&mut c).await, None);
}

#[tokio::test]
async fn test_broadcast_and_offline() {
    let test = start_test_server().await;
    let mut a = connect(test.addr).await;
    let mut b = connect(test.addr).await;

    signin(&test, &mut a, "A", 1).await;
    signin(&test, &mut b, "B", 2).await;
    recv(&mut a).await;

    let shout = json!({"protocol": "broadcast", "from": "B", "text": "hello all"});
    send(&mut b, shout.clone()).await;
    assert_eq!(recv(&mut a).await, Some(shout.clone()));
    assert_eq!(recv(&mut b).await, Some(shout));

    b.close(None).await.unwrap();
    assert_eq!(
        recv(&mut a).await,
        Some(json!({"protocol": "offline", "offline": "B", "onlineCount": 1}))
    );
    wait_for_online(&test.server, 1).await;
}

#[tokio::test]
async fn test_bad_input_keeps_connection_open() {
    let test = start_test_server().await;
    let mut a = connect(test.addr).await;
    let mut b = connect(test.addr).await;
    signin(&test, &mut a, "A", 1).await;
    signin(&test, &mut b, "B", 2).await;
    recv(&mut a).await;

    send(&mut b, json!({"protocol": "unknown"})).await;
    assert_eq!(recv(&mut b).await, Some(json!({"error": "unrecognized protocol"})));

    b.send(Message::Text("this is not json".into())).await.unwrap();
    assert_eq!(
        recv(&mut b).await,
        Some(json!({"error": "server error processing message"}))
    );
    assert_eq!(recv(&mut a).await, None);

    // Same connection keeps working
    let direct = json!({"protocol": "p2p", "from": "B", "to": "A", "text": "ok"});
    send(&mut b, direct.clone()).await;
    assert_eq!(recv(&mut a).await, Some(direct));
}

#[tokio::test]
async fn test_file_upload_notice() {
    let test = start_test_server().await;
    let mut a = connect(test.addr).await;
    let mut b = connect(test.addr).await;
    signin(&test, &mut a, "A", 1).await;
    signin(&test, &mut b, "B", 2).await;
    recv(&mut a).await;

    send(
        &mut a,
        json!({"protocol": "file", "from": "A", "filename": "pic.bin", "content": [0, 1, 2, 255]}),
    )
    .await;

    let notice = json!({"protocol": "file", "from": "A", "filename": "pic.bin"});
    assert_eq!(recv(&mut a).await, Some(notice.clone()));
    assert_eq!(recv(&mut b).await, Some(notice));
    assert_eq!(test.sink.get("pic.bin"), Some(vec![0, 1, 2, 255]));
}

#[tokio::test]
async fn test_disconnect_before_signin_is_silent() {
    let test = start_test_server().await;
    let mut a = connect(test.addr).await;
    signin(&test, &mut a, "A", 1).await;

    let mut anon = connect(test.addr).await;
    anon.close(None).await.unwrap();

    assert_eq!(recv(&mut a).await, None);
    assert_eq!(test.server.online_count(), 1);
}
