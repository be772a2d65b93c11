//! End-to-end scenarios driven over an in-process duplex transport, playing
//! the role of a server that writes canned RESP3 replies.

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use valkey_client_core::error::ClientError;
use valkey_client_core::resp::token::Token;
use valkey_client_core::{Client, ClientConfig};

/// Reads and discards one command frame off `server`, then writes `reply`.
async fn expect_command_and_reply(server: &mut DuplexStream, reply: &[u8]) {
  let mut buf = [0u8; 4096];
  let _ = server.read(&mut buf).await.unwrap();
  server.write_all(reply).await.unwrap();
}

async fn handshake(server: &mut DuplexStream) {
  expect_command_and_reply(
    server,
    b"%1\r\n$6\r\nserver\r\n$5\r\nvalkey\r\n",
  )
  .await;
}

async fn connect_pair() -> (Client, DuplexStream) {
  let _ = env_logger::try_init();
  let (client_side, mut server_side) = tokio::io::duplex(4096);
  let (client, _) = tokio::join!(
    Client::connect(client_side, ClientConfig::default()),
    handshake(&mut server_side),
  );
  (client.unwrap(), server_side)
}

#[tokio::test]
async fn hello_handshake_carries_auth_and_setname_when_configured() {
  let _ = env_logger::try_init();
  let (client_side, mut server_side) = tokio::io::duplex(4096);
  let config = ClientConfig {
    auth: Some(("default".to_string(), "hunter2".to_string())),
    client_name: Some("my-app".to_string()),
    ..ClientConfig::default()
  };

  let mut sent = [0u8; 4096];
  let (client, n) = tokio::join!(Client::connect(client_side, config), async {
    let n = server_side.read(&mut sent).await.unwrap();
    server_side.write_all(b"%1\r\n$6\r\nserver\r\n$5\r\nvalkey\r\n").await.unwrap();
    n
  });
  client.unwrap();

  assert_eq!(
    &sent[..n],
    &b"*7\r\n$5\r\nHELLO\r\n$1\r\n3\r\n$4\r\nAUTH\r\n$7\r\ndefault\r\n$7\r\nhunter2\r\n$7\r\nSETNAME\r\n$6\r\nmy-app\r\n"[..]
  );
}

#[tokio::test]
async fn get_returns_bulk_string() {
  let (client, mut server) = connect_pair().await;
  let request = tokio::spawn(async move { client.call::<String>(&[b"GET", b"foo"]).await });
  expect_command_and_reply(&mut server, b"$3\r\nbar\r\n").await;
  assert_eq!(request.await.unwrap().unwrap(), "bar");
}

#[tokio::test]
async fn server_error_surfaces_as_command_error() {
  let (client, mut server) = connect_pair().await;
  let request = tokio::spawn(async move { client.call::<Token>(&[b"SET", b"foo", b"bar"]).await });
  expect_command_and_reply(&mut server, b"-WRONGTYPE Operation against a key\r\n").await;
  let err = request.await.unwrap().unwrap_err();
  assert!(matches!(err, ClientError::CommandError(msg) if msg == "WRONGTYPE Operation against a key"));
}

#[tokio::test]
async fn transaction_reports_one_result_per_member() {
  let (client, mut server) = connect_pair().await;
  let request = tokio::spawn(async move {
    client.transaction(&[&[b"SET", b"a", b"1"], &[b"SET", b"b", b"2"]]).await
  });

  // MULTI, SET a 1, SET b 2 all get queued with +QUEUED.
  let mut buf = [0u8; 4096];
  let _ = server.read(&mut buf).await.unwrap(); // MULTI
  server.write_all(b"+OK\r\n").await.unwrap();
  let _ = server.read(&mut buf).await.unwrap(); // SET a 1
  server.write_all(b"+QUEUED\r\n").await.unwrap();
  let _ = server.read(&mut buf).await.unwrap(); // SET b 2
  server.write_all(b"+QUEUED\r\n").await.unwrap();
  let _ = server.read(&mut buf).await.unwrap(); // EXEC
  server.write_all(b"*2\r\n+OK\r\n+OK\r\n").await.unwrap();

  let results = request.await.unwrap();
  assert_eq!(results.len(), 2);
  assert!(results.into_iter().all(|r| r.is_ok()));
}

#[tokio::test]
async fn exec_abort_fails_every_member() {
  let (client, mut server) = connect_pair().await;
  let request = tokio::spawn(async move {
    client.transaction(&[&[b"SET", b"a", b"1"], &[b"SET", b"b", b"2"]]).await
  });

  let mut buf = [0u8; 4096];
  let _ = server.read(&mut buf).await.unwrap(); // MULTI
  server.write_all(b"+OK\r\n").await.unwrap();
  let _ = server.read(&mut buf).await.unwrap(); // SET a 1
  server.write_all(b"+QUEUED\r\n").await.unwrap();
  let _ = server.read(&mut buf).await.unwrap(); // SET b 2 (server rejects)
  server.write_all(b"-ERR syntax error\r\n").await.unwrap();
  let _ = server.read(&mut buf).await.unwrap(); // EXEC
  server.write_all(b"*-1\r\n").await.unwrap();

  let results = request.await.unwrap();
  assert_eq!(results.len(), 2);
  assert!(results.iter().all(|r| r.is_err()));
}

#[tokio::test]
async fn subscribe_then_message_is_delivered() {
  let (client, mut server) = connect_pair().await;
  let mut sub = client.subscribe("news");

  let mut buf = [0u8; 4096];
  let _ = server.read(&mut buf).await.unwrap(); // SUBSCRIBE news
  server
    .write_all(b">3\r\n$9\r\nsubscribe\r\n$4\r\nnews\r\n:1\r\n")
    .await
    .unwrap();
  server
    .write_all(b">3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$5\r\nhello\r\n")
    .await
    .unwrap();

  let delivery = sub.next().await.unwrap();
  assert_eq!(delivery.channel, "news");
  assert_eq!(&delivery.payload[..], b"hello");
}
