//! End-to-end tests of the connection layer against a scripted local server

use searchbot_core::config::{Config, ServerConfig};
use searchbot_core::*;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::time::timeout;

async fn listener() -> (TcpListener, ServerConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = ServerConfig {
        host: "127.0.0.1".to_string(),
        port,
        tls: false,
        connect_timeout_secs: 5,
        registration_timeout_secs: 5,
        ..ServerConfig::default()
    };
    (listener, server)
}

#[tokio::test]
async fn test_connect_register_and_converse() {
    let (listener, server_config) = listener().await;

    let script = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();

        assert_eq!(lines.next_line().await.unwrap().unwrap(), "NICK SearchBot");
        assert!(lines.next_line().await.unwrap().unwrap().starts_with("USER SearchBot 0 *"));
        write
            .write_all(b":irc.test 001 SearchBot :Welcome\r\n")
            .await
            .unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "JOIN #test_room");

        write
            .write_all(b":irc.test PING :token123\r\n:alice!a@h PRIVMSG SearchBot :!search rust\r\n")
            .await
            .unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "PONG token123");

        assert_eq!(lines.next_line().await.unwrap().unwrap(), "PRIVMSG alice :1. result");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "QUIT bye");
    });

    let config = Config::default();
    let mut conn = Connection::connect(&server_config).await.unwrap();
    let nick = conn
        .register(&config.identity, None, &config.channels, server_config.registration_timeout())
        .await
        .unwrap();
    assert_eq!(nick, "SearchBot");

    let mut session = conn.into_session(SessionOptions {
        idle_timeout: Duration::from_secs(60),
        message_delay: Duration::ZERO,
        max_message_length: 400,
    });

    let event = timeout(Duration::from_secs(5), session.next_event()).await.unwrap();
    let sender = match event {
        Some(Event::PrivateMessage { sender, text }) => {
            assert_eq!(text, "!search rust");
            sender
        }
        other => panic!("unexpected event {:?}", other),
    };

    let reply = OutboundMessage::single(sender, "1. result");
    assert!(session.outbound().send_message(&reply).await);
    session.quit("bye").await;

    script.await.unwrap();
}

#[tokio::test]
async fn test_connect_refused_is_transient() {
    let (listener, server_config) = listener().await;
    drop(listener);

    let err = match Connection::connect(&server_config).await {
        Ok(_) => panic!("connect should fail"),
        Err(e) => e,
    };
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_lost_connection_closes_event_stream() {
    let (listener, server_config) = listener().await;

    let script = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket
            .write_all(b":irc.test 001 SearchBot :Welcome\r\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(socket);
    });

    let config = Config::default();
    let mut conn = Connection::connect(&server_config).await.unwrap();
    conn.register(&config.identity, None, &[], Duration::from_secs(5))
        .await
        .unwrap();

    let mut session = conn.into_session(SessionOptions::from_config(&config));
    assert_eq!(timeout(Duration::from_secs(5), session.next_event()).await.unwrap(), None);

    script.await.unwrap();
}
