use crate::relay::{self, Relay, SharedRelay};
use crate::transport::serve;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const SILENCE: Duration = Duration::from_millis(200);

async fn start_relay(max_peers: usize) -> (String, SharedRelay) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("local addr");
    let relay = relay::shared(Relay::with_max_peers(max_peers));

    tokio::spawn(serve(listener, relay.clone()));

    (format!("ws://{addr}"), relay)
}

/// Waits until the relay holds exactly `expected` peers. Registration
/// happens after the handshake response, so a connected client may not be
/// in the set yet.
async fn wait_for_peers(relay: &SharedRelay, expected: usize) {
    timeout(RECV_TIMEOUT, async {
        loop {
            let current = relay::lock(relay).len();
            if current == expected {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("relay never reached {expected} peers"));
}

async fn connect(url: &str, relay: &SharedRelay, expected: usize) -> Ws {
    let (ws, _) = connect_async(url)
        .await
        .expect("WebSocket handshake failed");
    wait_for_peers(relay, expected).await;
    ws
}

async fn send_text(ws: &mut Ws, text: &str) {
    ws.send(WsMessage::text(text))
        .await
        .expect("Failed to send message");
}

async fn recv(ws: &mut Ws) -> WsMessage {
    timeout(RECV_TIMEOUT, ws.next())
        .await
        .expect("Did not receive a frame in time")
        .expect("Stream ended")
        .expect("WebSocket error")
}

async fn recv_text(ws: &mut Ws) -> String {
    match recv(ws).await {
        WsMessage::Text(text) => text.as_str().to_owned(),
        other => panic!("Expected a text message, got {other:?}"),
    }
}

async fn assert_silent(ws: &mut Ws) {
    if let Ok(frame) = timeout(SILENCE, ws.next()).await {
        panic!("Expected no frame, got {frame:?}");
    }
}

#[tokio::test]
async fn test_valid_json_reaches_every_peer_including_sender() {
    let (url, relay) = start_relay(0).await;
    let mut a = connect(&url, &relay, 1).await;
    let mut b = connect(&url, &relay, 2).await;

    let msg = r#"{"type":"fingerprint_data","id":1}"#;
    send_text(&mut a, msg).await;

    assert_eq!(recv_text(&mut a).await, msg);
    assert_eq!(recv_text(&mut b).await, msg);
    assert_silent(&mut a).await;
    assert_silent(&mut b).await;
}

#[tokio::test]
async fn test_invalid_json_reaches_nobody() {
    let (url, relay) = start_relay(0).await;
    let mut a = connect(&url, &relay, 1).await;
    let mut b = connect(&url, &relay, 2).await;

    send_text(&mut a, "not-json").await;

    assert_silent(&mut a).await;
    assert_silent(&mut b).await;
    assert_eq!(relay::lock(&relay).len(), 2);
}

#[tokio::test]
async fn test_binary_non_json_reaches_nobody() {
    let (url, relay) = start_relay(0).await;
    let mut a = connect(&url, &relay, 1).await;
    let mut b = connect(&url, &relay, 2).await;

    a.send(WsMessage::binary(b"not-json".to_vec()))
        .await
        .expect("Failed to send message");
    a.send(WsMessage::binary(vec![0xffu8, 0xfe, 0x00]))
        .await
        .expect("Failed to send message");

    assert_silent(&mut a).await;
    assert_silent(&mut b).await;
    assert_eq!(relay::lock(&relay).len(), 2);
}

#[tokio::test]
async fn test_invalid_frame_does_not_disturb_following_frames() {
    let (url, relay) = start_relay(0).await;
    let mut a = connect(&url, &relay, 1).await;
    let mut b = connect(&url, &relay, 2).await;

    send_text(&mut a, "{\"unterminated\":").await;
    send_text(&mut a, r#"{"seq":2}"#).await;

    // The dropped frame never shows up, the next valid one comes first.
    assert_eq!(recv_text(&mut b).await, r#"{"seq":2}"#);
    assert_eq!(recv_text(&mut a).await, r#"{"seq":2}"#);
}

#[tokio::test]
async fn test_disconnected_peer_is_removed() {
    let (url, relay) = start_relay(0).await;
    let mut a = connect(&url, &relay, 1).await;
    let mut b = connect(&url, &relay, 2).await;

    b.close(None).await.expect("Failed to close WebSocket");
    wait_for_peers(&relay, 1).await;

    let msg = r#"{"type":"verify","id":2}"#;
    send_text(&mut a, msg).await;
    assert_eq!(recv_text(&mut a).await, msg);
    assert_eq!(relay::lock(&relay).len(), 1);
}

#[tokio::test]
async fn test_abrupt_disconnect_is_removed() {
    let (url, relay) = start_relay(0).await;
    let mut a = connect(&url, &relay, 1).await;
    let b = connect(&url, &relay, 2).await;

    // No closing handshake, just drop the socket.
    drop(b);
    wait_for_peers(&relay, 1).await;

    send_text(&mut a, "[]").await;
    assert_eq!(recv_text(&mut a).await, "[]");
}

#[tokio::test]
async fn test_frames_are_forwarded_byte_for_byte() {
    let (url, relay) = start_relay(0).await;
    let mut a = connect(&url, &relay, 1).await;
    let mut b = connect(&url, &relay, 2).await;

    let msg = "{ \"z\" : 1.50,\n \"a\":\"\\u00e9t\u{e9}\", \"n\": [ null ,true] }";
    send_text(&mut a, msg).await;

    assert_eq!(recv_text(&mut b).await, msg);
    assert_eq!(recv_text(&mut a).await, msg);
}

#[tokio::test]
async fn test_binary_json_is_relayed_as_binary() {
    let (url, relay) = start_relay(0).await;
    let mut a = connect(&url, &relay, 1).await;
    let mut b = connect(&url, &relay, 2).await;

    let payload = br#"{"type":"identify","template":"AAEC"}"#.to_vec();
    a.send(WsMessage::binary(payload.clone()))
        .await
        .expect("Failed to send message");

    match recv(&mut b).await {
        WsMessage::Binary(data) => assert_eq!(data.as_ref(), payload.as_slice()),
        other => panic!("Expected a binary message, got {other:?}"),
    }
}

#[tokio::test]
async fn test_per_sender_order_is_preserved() {
    let (url, relay) = start_relay(0).await;
    let mut a = connect(&url, &relay, 1).await;
    let mut b = connect(&url, &relay, 2).await;

    for seq in 0..20 {
        send_text(&mut a, &format!("{{\"seq\":{seq}}}")).await;
    }
    for seq in 0..20 {
        assert_eq!(recv_text(&mut b).await, format!("{{\"seq\":{seq}}}"));
    }
}

#[tokio::test]
async fn test_fan_out_to_many_peers() {
    let (url, relay) = start_relay(0).await;
    let mut peers = Vec::new();
    for n in 1..=5 {
        peers.push(connect(&url, &relay, n).await);
    }

    send_text(&mut peers[3], r#"{"from":3}"#).await;

    for ws in peers.iter_mut() {
        assert_eq!(recv_text(ws).await, r#"{"from":3}"#);
    }
}

#[tokio::test]
async fn test_connection_over_capacity_is_closed() {
    let (url, relay) = start_relay(1).await;
    let mut a = connect(&url, &relay, 1).await;

    let (mut rejected, _) = connect_async(url.as_str())
        .await
        .expect("WebSocket handshake failed");

    match recv(&mut rejected).await {
        WsMessage::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Again),
        other => panic!("Expected a close frame, got {other:?}"),
    }
    assert_eq!(relay::lock(&relay).len(), 1);

    // The admitted peer is unaffected.
    send_text(&mut a, "{}").await;
    assert_eq!(recv_text(&mut a).await, "{}");
}
