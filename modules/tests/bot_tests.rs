//! Full bot runs against a scripted local IRC server

use async_trait::async_trait;
use searchbot_core::config::{Config, ReconnectConfig, ServerConfig};
use searchbot_modules::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpListener;
use tokio::time::{timeout, Instant};

struct StaticBackend;

#[async_trait]
impl SearchBackend for StaticBackend {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResults, SearchError> {
        Ok(SearchResults::new(vec![SearchEntry {
            title: format!("About {}", request.query),
            url: "https://example.com/".to_string(),
            description: String::new(),
            score: 1.0,
        }]))
    }
}

async fn setup() -> (TcpListener, Config) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut config = Config::default();
    config.server = ServerConfig {
        host: "127.0.0.1".to_string(),
        port,
        tls: false,
        connect_timeout_secs: 5,
        registration_timeout_secs: 5,
        ..ServerConfig::default()
    };
    config.reconnect = ReconnectConfig {
        initial_delay_secs: 1,
        max_delay_secs: 1,
    };
    config.output.message_delay_ms = 0;
    (listener, config)
}

async fn next_line(lines: &mut tokio::io::Lines<BufReader<OwnedReadHalf>>) -> String {
    timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("timed out waiting for the bot")
        .unwrap()
        .expect("bot closed the connection")
}

#[tokio::test]
async fn test_search_round_trip_and_shutdown() {
    let (listener, config) = setup().await;
    let mut bot = Bot::with_backend(config, Arc::new(StaticBackend));
    let shutdown = bot.shutdown_token();
    let running = tokio::spawn(async move { bot.run().await });

    let (socket, _) = listener.accept().await.unwrap();
    let (read, mut write) = socket.into_split();
    let mut lines = BufReader::new(read).lines();

    assert_eq!(next_line(&mut lines).await, "NICK SearchBot");
    assert!(next_line(&mut lines).await.starts_with("USER SearchBot"));
    write.write_all(b":irc.test 001 SearchBot :Welcome\r\n").await.unwrap();
    assert_eq!(next_line(&mut lines).await, "JOIN #test_room");

    write
        .write_all(b":Alice!a@h PRIVMSG #test_room :!search rust\r\n")
        .await
        .unwrap();
    assert_eq!(
        next_line(&mut lines).await,
        "PRIVMSG Alice :1. \x0303About rust\x0F | \x0312https://example.com/\x0F"
    );
    assert!(next_line(&mut lines).await.starts_with("PRIVMSG Alice :\x0314Search results powered by"));

    // The bot never answers its own messages
    write
        .write_all(b":SearchBot!s@h PRIVMSG #test_room :!help\r\n:Bob!b@h PRIVMSG SearchBot :!help\r\n")
        .await
        .unwrap();
    assert!(next_line(&mut lines).await.starts_with("PRIVMSG Bob :SearchBot Commands"));

    shutdown.cancel();
    assert_eq!(next_line(&mut lines).await, "QUIT :Shutting down");
    drop(write);

    let result = timeout(Duration::from_secs(5), running).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_reconnects_after_server_error() {
    let (listener, config) = setup().await;
    let mut bot = Bot::with_backend(config, Arc::new(StaticBackend));
    let shutdown = bot.shutdown_token();
    let running = tokio::spawn(async move { bot.run().await });

    let (mut first, _) = listener.accept().await.unwrap();
    first.write_all(b"ERROR :Closing Link: throttled\r\n").await.unwrap();
    drop(first);

    let (second, _) = timeout(Duration::from_secs(5), listener.accept()).await.unwrap().unwrap();
    let (read, mut write) = second.into_split();
    let mut lines = BufReader::new(read).lines();
    assert_eq!(next_line(&mut lines).await, "NICK SearchBot");
    assert!(next_line(&mut lines).await.starts_with("USER SearchBot"));

    // Channels are joined again on the new link
    write.write_all(b":irc.test 001 SearchBot :Welcome back\r\n").await.unwrap();
    assert_eq!(next_line(&mut lines).await, "JOIN #test_room");

    shutdown.cancel();
    assert_eq!(next_line(&mut lines).await, "QUIT :Shutting down");
    drop(write);
    let result = timeout(Duration::from_secs(5), running).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_backoff_grows_when_server_keeps_dropping_after_welcome() {
    let (listener, mut config) = setup().await;
    config.reconnect = ReconnectConfig {
        initial_delay_secs: 1,
        max_delay_secs: 4,
    };
    let mut bot = Bot::with_backend(config, Arc::new(StaticBackend));
    let shutdown = bot.shutdown_token();
    let running = tokio::spawn(async move { bot.run().await });

    let mut accepted = Vec::new();
    for _ in 0..3 {
        let (socket, _) = timeout(Duration::from_secs(10), listener.accept()).await.unwrap().unwrap();
        accepted.push(Instant::now());

        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();
        assert_eq!(next_line(&mut lines).await, "NICK SearchBot");
        assert!(next_line(&mut lines).await.starts_with("USER SearchBot"));
        write.write_all(b":irc.test 001 SearchBot :Welcome\r\n").await.unwrap();
        assert_eq!(next_line(&mut lines).await, "JOIN #test_room");
        write.write_all(b"ERROR :Closing Link: K-lined\r\n").await.unwrap();
    }

    let first_gap = accepted[1] - accepted[0];
    let second_gap = accepted[2] - accepted[1];
    assert!(first_gap >= Duration::from_millis(1000), "first gap {:?}", first_gap);
    assert!(second_gap >= Duration::from_millis(2000), "second gap {:?}", second_gap);

    shutdown.cancel();
    let result = timeout(Duration::from_secs(5), running).await.unwrap().unwrap();
    assert!(result.is_ok());
}
