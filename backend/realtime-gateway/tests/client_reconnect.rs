//! Client session against a bare WebSocket server that drops the first socket.

use futures::{SinkExt, StreamExt};
use realtime_gateway::client::{ClientSession, ConnectionState, ReconnectPolicy};
use realtime_gateway::{ClientEvent, UserId};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

async fn next_event<S>(socket: &mut S) -> ClientEvent
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => return ClientEvent::from_json(text.as_str()).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("socket ended early: {other:?}"),
        }
    }
}

#[tokio::test]
async fn rejoins_rooms_after_server_drop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<(usize, ClientEvent)>();

    tokio::spawn(async move {
        // First socket: read the join, then drop it.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        seen_tx.send((1, next_event(&mut ws).await)).unwrap();
        drop(ws);

        // Second socket: expect the replayed join, then greet.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        seen_tx.send((2, next_event(&mut ws).await)).unwrap();
        ws.send(Message::text(r#"{"event":"error","data":{"message":"hi"}}"#))
            .await
            .unwrap();
        // Hold the socket open until the client closes it.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let policy = ReconnectPolicy {
        max_attempts: 5,
        initial_delay: Duration::from_millis(20),
        ..ReconnectPolicy::default()
    };
    let (session, mut inbound) = ClientSession::connect(
        &format!("ws://{addr}/socket.io/"),
        &UserId::parse("s1").unwrap(),
        policy,
    );

    let join = ClientEvent::JoinChat { course_id: "course123".into() };
    session.send(join.clone()).unwrap();

    let timeout = Duration::from_secs(5);
    let first = tokio::time::timeout(timeout, seen_rx.recv()).await.unwrap().unwrap();
    assert_eq!(first, (1, join.clone()));

    let second = tokio::time::timeout(timeout, seen_rx.recv()).await.unwrap().unwrap();
    assert_eq!(second, (2, join));

    let greeting = tokio::time::timeout(timeout, inbound.recv()).await.unwrap().unwrap();
    assert!(greeting.contains("\"hi\""));
    assert_eq!(session.state(), ConnectionState::Connected);

    let mut state = session.watch_state();
    session.close().await;
    assert_eq!(*state.borrow_and_update(), ConnectionState::Disconnected);
}
