use super::*;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn memory_connect_hands_peer_to_caller() {
    let (connector, mut peers) = MemoryConnector::pair();
    let mut link = connector
        .connect("ws://primary:8000")
        .await
        .expect("connect");
    let mut peer = peers.recv().await.expect("peer");
    assert_eq!(peer.url, "ws://primary:8000");

    link.outbound
        .send(Payload::Text("hi".into()))
        .expect("outbound open");
    assert_eq!(peer.received.recv().await, Some(Payload::Text("hi".into())));

    assert!(peer.send(Payload::Binary(vec![1, 2])));
    assert_eq!(link.inbound.recv().await, Some(LinkEvent::Message(Payload::Binary(vec![1, 2]))));
}

#[tokio::test]
async fn memory_peer_fail_reports_error_then_close() {
    let (connector, mut peers) = MemoryConnector::pair();
    let mut link = connector.connect("ws://x").await.expect("connect");
    let peer = peers.recv().await.expect("peer");

    peer.fail("reset");
    assert_eq!(link.inbound.recv().await, Some(LinkEvent::Error("reset".into())));
    assert_eq!(link.inbound.recv().await, Some(LinkEvent::Closed));
    assert_eq!(link.inbound.recv().await, None);
}

#[tokio::test]
async fn memory_connect_fails_without_acceptor() {
    let (connector, peers) = MemoryConnector::pair();
    drop(peers);
    assert!(matches!(connector.connect("ws://x").await, Err(LinkError::Closed)));
}

#[tokio::test]
async fn ws_connect_to_closed_port_errors() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let result = WsConnector.connect(&format!("ws://{addr}")).await;
    assert!(matches!(result, Err(LinkError::Connect(_))));
}

#[tokio::test]
async fn ws_link_echoes_frames_and_reports_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake");
        // Echo the first data frame, then close.
        while let Some(Ok(message)) = ws.next().await {
            if message.is_binary() || message.is_text() {
                ws.send(message).await.expect("echo");
                break;
            }
        }
        let _ = ws.close(None).await;
    });

    let mut link = WsConnector
        .connect(&format!("ws://{addr}"))
        .await
        .expect("connect");
    link.outbound
        .send(Payload::Binary(vec![9, 8, 7]))
        .expect("outbound open");

    let echoed = timeout(WAIT, link.inbound.recv())
        .await
        .expect("echo in time");
    assert_eq!(echoed, Some(LinkEvent::Message(Payload::Binary(vec![9, 8, 7]))));

    // After the server closes, the stream always ends with Closed.
    let mut saw_closed = false;
    while let Ok(Some(event)) = timeout(WAIT, link.inbound.recv()).await {
        if event == LinkEvent::Closed {
            saw_closed = true;
            break;
        }
    }
    assert!(saw_closed);
}
