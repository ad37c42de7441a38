//! Integration tests for the TCP transport.
//!
//! These spin up a real listener on a random loopback port and push
//! frames through actual sockets, including a stream that arrives one
//! byte per write.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use wayfarer_transport::{DEFAULT_MAX_FRAME_SIZE, TcpTransport, encode_frame};

async fn bind() -> (TcpTransport, String) {
    let transport = TcpTransport::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = transport.local_addr().expect("local addr").to_string();
    (transport, addr)
}

#[tokio::test]
async fn test_tcp_accept_and_exchange_frames() {
    let (transport, addr) = bind().await;

    let accept = tokio::spawn(async move { transport.accept().await.expect("should accept") });
    let mut client = TcpStream::connect(&addr).await.expect("client should connect");
    let conn = accept.await.expect("task should complete");
    assert!(conn.id().into_inner() > 0);

    let (mut reader, mut writer) = conn.into_framed(DEFAULT_MAX_FRAME_SIZE);

    // Client → server
    client
        .write_all(&encode_frame(b"hello from client").unwrap())
        .await
        .unwrap();
    let received = reader.next_frame().await.unwrap();
    assert_eq!(received.as_deref(), Some(&b"hello from client"[..]));

    // Server → client
    writer.send(b"hello from server").await.unwrap();
    let mut buf = vec![0u8; 18];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf[0], 17);
    assert_eq!(&buf[1..], b"hello from server");
}

#[tokio::test]
async fn test_tcp_frame_dribbled_one_byte_per_write() {
    let (transport, addr) = bind().await;

    let accept = tokio::spawn(async move { transport.accept().await.expect("should accept") });
    let mut client = TcpStream::connect(&addr).await.unwrap();
    let (mut reader, _writer) = accept.await.unwrap().into_framed(DEFAULT_MAX_FRAME_SIZE);

    let payload: Vec<u8> = (0..=255u8).collect();
    let frame = encode_frame(&payload).unwrap();
    tokio::spawn(async move {
        for byte in frame {
            client.write_all(&[byte]).await.unwrap();
            client.flush().await.unwrap();
        }
        // Keep the socket open until the reader is done.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    });

    assert_eq!(reader.next_frame().await.unwrap(), Some(payload));
}

#[tokio::test]
async fn test_tcp_client_close_yields_none() {
    let (transport, addr) = bind().await;

    let accept = tokio::spawn(async move { transport.accept().await.expect("should accept") });
    let client = TcpStream::connect(&addr).await.unwrap();
    let (mut reader, _writer) = accept.await.unwrap().into_framed(DEFAULT_MAX_FRAME_SIZE);

    drop(client);

    assert_eq!(reader.next_frame().await.unwrap(), None);
}
