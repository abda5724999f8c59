use lantern::{BoxError, Message, MessageType, Server, ServerConfig, ServerState};
use std::{
    net::Ipv4Addr,
    thread,
    time::{Duration, Instant},
};
use tokio::{net::UdpSocket, sync::mpsc, time};
use tokio_test::assert_ok;

const MAC: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];

fn discover() -> Message {
    let mut msg = Message::new();
    msg.op = 1;
    msg.htype = 1;
    msg.hlen = 6;
    msg.xid = rand::random();
    msg.chaddr = MAC;
    msg.options.set_message_type(MessageType::Discover);
    msg
}

async fn started_server() -> Server {
    let config = ServerConfig::new(Ipv4Addr::LOCALHOST, 0)
        .with_read_timeout(Duration::from_millis(100));
    let mut server = Server::new(config);
    assert_ok!(server.start().await);
    server
}

async fn client_for(server: &Server) -> UdpSocket {
    let client = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    client.connect(server.local_addr().unwrap()).await.unwrap();
    client
}

#[tokio::test]
async fn test_handler_receives_message_without_reply() {
    let mut server = started_server().await;
    assert!(server.listening());

    let (tx, mut rx) = mpsc::unbounded_channel();
    server.register_callback(move |got: Message| -> Result<Option<Message>, BoxError> {
        tx.send(got)?;
        Ok(None)
    });

    let sent = discover();
    let client = client_for(&server).await;
    client.send(&sent.encode()).await.unwrap();

    let got = time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for the handler")
        .unwrap();
    assert_eq!(got, sent);

    // No reply, and no second invocation.
    let mut buf = [0u8; 1500];
    assert!(time::timeout(Duration::from_millis(300), client.recv(&mut buf))
        .await
        .is_err());
    assert!(rx.try_recv().is_err());

    assert_ok!(server.stop().await);
    assert_eq!(server.state(), ServerState::Stopped);
    assert!(!server.listening());

    // Stopping twice is harmless.
    assert_ok!(server.stop().await);

    // Nothing reads the socket any more.
    let _ = client.send(&discover().encode()).await;
    time::sleep(Duration::from_millis(200)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_handler_response_is_sent_back() {
    let mut server = started_server().await;

    server.register_callback(|request: Message| -> Result<Option<Message>, BoxError> {
        let mut offer = Message::reply(&request);
        offer.yiaddr = Ipv4Addr::new(192, 168, 1, 100);
        offer.sname = "lantern".to_string();
        offer.options.set_message_type(MessageType::Offer);
        Ok(Some(offer))
    });

    let sent = discover();
    let client = client_for(&server).await;
    client.send(&sent.encode()).await.unwrap();

    let mut buf = [0u8; 1500];
    let len = time::timeout(Duration::from_secs(1), client.recv(&mut buf))
        .await
        .expect("timed out waiting for the response")
        .unwrap();
    assert!(len >= 272);

    let reply = Message::decode(&buf[..len]).unwrap();
    assert_eq!(reply.op, 2);
    assert_eq!(reply.xid, sent.xid);
    assert_eq!(reply.chaddr, MAC);
    assert_eq!(reply.yiaddr, Ipv4Addr::new(192, 168, 1, 100));
    assert_eq!(reply.sname, "lantern");
    assert_eq!(reply.options.message_type(), Ok(MessageType::Offer));

    assert_ok!(server.stop().await);
}

#[tokio::test]
async fn test_malformed_datagram_does_not_stop_loop() {
    let mut server = started_server().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    server.register_callback(move |got: Message| -> Result<Option<Message>, BoxError> {
        tx.send(got.xid)?;
        Ok(None)
    });

    let client = client_for(&server).await;

    // Too short, then a bad hardware length, then a valid message.
    client.send(&[0u8; 100]).await.unwrap();
    let mut bad = discover().encode().to_vec();
    bad[2] = 7;
    client.send(&bad).await.unwrap();

    let sent = discover();
    client.send(&sent.encode()).await.unwrap();

    let xid = time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for the handler")
        .unwrap();
    assert_eq!(xid, sent.xid);
    assert!(server.listening());

    assert_ok!(server.stop().await);
}

#[tokio::test]
async fn test_handler_error_sends_nothing() {
    let mut server = started_server().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    server.register_callback(move |_: Message| -> Result<Option<Message>, BoxError> {
        tx.send(())?;
        Err("no lease available".into())
    });

    let client = client_for(&server).await;
    client.send(&discover().encode()).await.unwrap();

    time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for the handler")
        .unwrap();

    let mut buf = [0u8; 1500];
    assert!(time::timeout(Duration::from_millis(300), client.recv(&mut buf))
        .await
        .is_err());
    assert!(server.listening());

    assert_ok!(server.stop().await);
}

#[tokio::test]
async fn test_register_callback_while_running() {
    let mut server = started_server().await;
    let client = client_for(&server).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let first = tx.clone();
    server.register_callback(move |_: Message| -> Result<Option<Message>, BoxError> {
        first.send("first")?;
        Ok(None)
    });

    client.send(&discover().encode()).await.unwrap();
    let got = time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
    assert_eq!(got, Some("first"));

    server.register_callback(move |_: Message| -> Result<Option<Message>, BoxError> {
        tx.send("second")?;
        Ok(None)
    });

    client.send(&discover().encode()).await.unwrap();
    let got = time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
    assert_eq!(got, Some("second"));

    assert_ok!(server.stop().await);
}

#[tokio::test]
async fn test_no_handler_sends_nothing() {
    let mut server = started_server().await;
    let client = client_for(&server).await;

    client.send(&discover().encode()).await.unwrap();

    let mut buf = [0u8; 1500];
    assert!(time::timeout(Duration::from_millis(300), client.recv(&mut buf))
        .await
        .is_err());
    assert!(server.listening());

    assert_ok!(server.stop().await);
}

#[tokio::test]
async fn test_stop_is_bounded_and_observable() {
    let mut server = started_server().await;
    let mut state = server.subscribe();
    assert_eq!(*state.borrow_and_update(), ServerState::Listening);

    time::timeout(Duration::from_secs(2), server.stop())
        .await
        .expect("stop did not finish in time")
        .unwrap();

    assert_ok!(state.changed().await);
    assert_eq!(*state.borrow(), ServerState::Stopped);
}

#[tokio::test]
async fn test_slow_handler_does_not_delay_next_datagram() {
    let mut server = started_server().await;
    let client = client_for(&server).await;

    let slow = discover();
    let fast = discover();
    let slow_xid = slow.xid;

    let (tx, mut rx) = mpsc::unbounded_channel();
    server.register_callback(move |got: Message| -> Result<Option<Message>, BoxError> {
        if got.xid == slow_xid {
            thread::sleep(Duration::from_millis(800));
        }
        tx.send(got.xid)?;
        Ok(None)
    });

    client.send(&slow.encode()).await.unwrap();
    time::sleep(Duration::from_millis(100)).await;
    client.send(&fast.encode()).await.unwrap();

    // The second message is handled while the first call is still asleep.
    let first = time::timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("second datagram waited for the slow handler")
        .unwrap();
    assert_eq!(first, fast.xid);

    let second = time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("slow handler never finished")
        .unwrap();
    assert_eq!(second, slow_xid);

    assert_ok!(server.stop().await);
}

#[tokio::test]
async fn test_register_callback_does_not_wait_for_running_handler() {
    let mut server = started_server().await;
    let client = client_for(&server).await;

    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    server.register_callback(move |_: Message| -> Result<Option<Message>, BoxError> {
        started_tx.send(())?;
        thread::sleep(Duration::from_secs(2));
        Ok(None)
    });

    client.send(&discover().encode()).await.unwrap();
    time::timeout(Duration::from_secs(1), started_rx.recv())
        .await
        .expect("timed out waiting for the handler")
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let swap_started = Instant::now();
    server.register_callback(move |got: Message| -> Result<Option<Message>, BoxError> {
        tx.send(got.xid)?;
        Ok(None)
    });
    assert!(
        swap_started.elapsed() < Duration::from_millis(500),
        "register_callback blocked for {:?}",
        swap_started.elapsed()
    );

    // The replacement serves new traffic while the old call is still running.
    let sent = discover();
    client.send(&sent.encode()).await.unwrap();
    let xid = time::timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("timed out waiting for the replacement handler")
        .unwrap();
    assert_eq!(xid, sent.xid);

    assert_ok!(server.stop().await);
}

#[tokio::test]
async fn test_stop_closes_socket_with_dispatch_in_flight() {
    let mut server = started_server().await;
    let addr = server.local_addr().unwrap();
    let client = client_for(&server).await;

    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    server.register_callback(move |request: Message| -> Result<Option<Message>, BoxError> {
        started_tx.send(())?;
        thread::sleep(Duration::from_millis(500));
        Ok(Some(Message::reply(&request)))
    });

    client.send(&discover().encode()).await.unwrap();
    time::timeout(Duration::from_secs(1), started_rx.recv())
        .await
        .expect("timed out waiting for the handler")
        .unwrap();

    assert_ok!(server.stop().await);

    // Bound without SO_REUSEADDR, so this only succeeds once the server
    // socket is gone.
    let rebound = std::net::UdpSocket::bind(addr);
    assert!(rebound.is_ok(), "port still bound after stop: {rebound:?}");

    // The handler still finishes, but its reply is never sent.
    let mut buf = [0u8; 1500];
    assert!(time::timeout(Duration::from_secs(1), client.recv(&mut buf))
        .await
        .is_err());
}
