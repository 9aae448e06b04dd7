//! Command server over a real TCP socket

#![cfg(unix)]

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use herder::config::Settings;
use herder::{serve, ServerState};

const DEADLINE: Duration = Duration::from_secs(10);

async fn start_server() -> (TcpStream, ServerState) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut settings = Settings::default();
    settings.watch.poll_interval_ms = 10;
    let state = ServerState::new(settings);
    tokio::spawn(serve(listener, state.clone()));

    (TcpStream::connect(addr).await.unwrap(), state)
}

async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> String {
    let mut line = String::new();
    tokio::time::timeout(DEADLINE, reader.read_line(&mut line))
        .await
        .expect("reply should arrive")
        .unwrap();
    line
}

#[tokio::test]
async fn test_spawn_list_and_watch() {
    let (stream, state) = start_server().await;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    writer
        .write_all(b"process greet shell=1 printf hello; exit 2\n")
        .await
        .unwrap();
    let reply = read_line(&mut reader).await;
    assert!(reply.starts_with("greet pid="), "{reply:?}");

    writer.write_all(b"processes gr*\n").await.unwrap();
    assert_eq!(read_line(&mut reader).await, reply);

    writer.write_all(b"watch greet\n").await.unwrap();
    assert_eq!(read_line(&mut reader).await, "Watching 1\n");

    // Keep acknowledging until the session reports its end
    let mut stream = Vec::new();
    loop {
        let mut chunk = [0u8; 1024];
        let n = tokio::time::timeout(DEADLINE, reader.read(&mut chunk))
            .await
            .expect("batch should arrive")
            .unwrap();
        assert!(n > 0, "server closed the connection");
        stream.extend_from_slice(&chunk[..n]);
        if stream.ends_with(b"] ") {
            writer.write_all(b"\n").await.unwrap();
        }
        if stream.ends_with(b"Nothing left to watch\n") {
            break;
        }
    }

    let text = String::from_utf8_lossy(&stream);
    assert!(text.contains("out:greet:"), "{text}");
    assert!(text.contains("\nhello\n"), "{text}");
    assert!(text.contains("closed:greet:"), "{text}");
    assert!(text.contains(":2\n] "), "{text}");
    assert!(state.registry.lock().await.is_empty());

    writer.write_all(b"quit\n").await.unwrap();
    let mut rest = Vec::new();
    tokio::time::timeout(DEADLINE, reader.read_to_end(&mut rest))
        .await
        .expect("connection should close")
        .unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_conflicting_definition_is_rejected() {
    let (stream, state) = start_server().await;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    writer.write_all(b"process napper shell=1 sleep 5\n").await.unwrap();
    let first = read_line(&mut reader).await;
    assert!(first.starts_with("napper pid="), "{first:?}");

    writer.write_all(b"process napper shell=1 sleep 5\n").await.unwrap();
    assert_eq!(read_line(&mut reader).await, first);

    writer.write_all(b"process napper shell=1 sleep 6\n").await.unwrap();
    let reply = read_line(&mut reader).await;
    assert_eq!(
        reply,
        format!(
            "Error: Process for napper has already been created - {}",
            first
        )
    );
    assert_eq!(state.registry.lock().await.len(), 1);
}

#[tokio::test]
async fn test_process_with_watch_streams_immediately() {
    let (stream, _state) = start_server().await;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    writer
        .write_all(b"process quick watch=1 output=64 /bin/sh -c true\n")
        .await
        .unwrap();
    assert!(read_line(&mut reader).await.starts_with("quick pid="));

    let mut stream = Vec::new();
    loop {
        let mut chunk = [0u8; 256];
        let n = tokio::time::timeout(DEADLINE, reader.read(&mut chunk))
            .await
            .expect("batch should arrive")
            .unwrap();
        assert!(n > 0, "server closed the connection");
        stream.extend_from_slice(&chunk[..n]);
        if stream.ends_with(b"] ") {
            writer.write_all(b"\n").await.unwrap();
        }
        if stream.ends_with(b"Nothing left to watch\n") {
            break;
        }
    }
    assert!(String::from_utf8_lossy(&stream).starts_with("closed:quick:"));
}
