//! End-to-end scenarios exercising the connection state machine, the
//! framing/handshake protocol and the multi-client dispatcher together over
//! real local stream endpoints, mirroring the literal scenarios this
//! protocol is specified against.

use ipc::{start_client, start_server, ClientConfig, Message, ServerConfig, Status};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique_name(prefix: &str) -> String {
    format!(
        "{}_{}_{}",
        prefix,
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    )
}

async fn wait_for_connected(actor_read: impl std::future::Future<Output = ipc::Result<Message>>) {
    let msg = actor_read.await.expect("read should not fail while connecting");
    assert!(msg.is_status());
    assert_eq!(msg.status.as_deref(), Some("Connected"));
}

#[tokio::test]
async fn happy_path_exchanges_an_application_message_both_ways() {
    let name = unique_name("test_happy_path");

    let server = start_server(ServerConfig::new(name.clone()).unwrap())
        .await
        .unwrap();
    let client = start_client(ClientConfig::new(name).unwrap()).await.unwrap();

    wait_for_connected(server.read()).await;
    wait_for_connected(client.read()).await;

    let payload = b"Here is a test message sent from the server to the client... -/and some more test data to pad it out a bit".to_vec();
    server.write(5, payload.clone()).await.unwrap();

    let received = client.read().await.unwrap();
    assert_eq!(received.msg_type, 5);
    assert_eq!(received.data, payload);

    server.close().await;
    client.close().await;
}

#[tokio::test]
async fn reserved_message_type_is_rejected_before_touching_the_wire() {
    let name = unique_name("test_reserved_type");
    let server = start_server(ServerConfig::new(name).unwrap()).await.unwrap();

    let err = server.write(0, vec![0]).await.unwrap_err();
    assert_eq!(err.to_string(), "message type 0 is reserved");

    server.close().await;
}

#[tokio::test]
async fn oversize_payload_is_rejected_after_the_negotiated_limit_is_known() {
    let name = unique_name("test_oversize");
    let max = 2048u32;

    let server = start_server(ServerConfig::new(name.clone()).unwrap().max_msg_size(max))
        .await
        .unwrap();
    let client = start_client(ClientConfig::new(name).unwrap()).await.unwrap();

    wait_for_connected(server.read()).await;
    wait_for_connected(client.read()).await;

    let err = client
        .write(2, vec![0u8; max as usize + 1])
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "message exceeds maximum message length");

    server.close().await;
    client.close().await;
}

#[tokio::test]
async fn multi_client_assigns_sequential_ids_and_endpoints() {
    let name = unique_name("test_multiclient");

    let server = start_server(ServerConfig::new(name.clone()).unwrap().multi_client(true))
        .await
        .unwrap();

    let c1 = start_client(ClientConfig::new(name.clone()).unwrap().multi_client(true))
        .await
        .unwrap();
    assert_eq!(c1.client_id(), 1);

    let c2 = start_client(ClientConfig::new(name.clone()).unwrap().multi_client(true))
        .await
        .unwrap();
    assert_eq!(c2.client_id(), 2);

    let c3 = start_client(ClientConfig::new(name).unwrap().multi_client(true))
        .await
        .unwrap();
    assert_eq!(c3.client_id(), 3);

    wait_for_connected(c1.read()).await;
    wait_for_connected(c2.read()).await;
    wait_for_connected(c3.read()).await;

    server.manager().unwrap().close().await;
    c1.close().await;
    c2.close().await;
    c3.close().await;
}

#[tokio::test]
async fn server_reports_disconnected_then_accepts_again_on_reconnect() {
    let name = unique_name("test_reconnect");

    let server = start_server(ServerConfig::new(name.clone()).unwrap())
        .await
        .unwrap();
    let client = start_client(
        ClientConfig::new(name.clone())
            .unwrap()
            .retry_timer_secs(1),
    )
    .await
    .unwrap();

    wait_for_connected(server.read()).await;
    wait_for_connected(client.read()).await;

    server.close().await;

    let client_status = loop {
        let msg = client.read().await.unwrap();
        if msg.is_status() {
            break msg.status.unwrap();
        }
    };
    assert_eq!(client_status, "Reconnecting");

    let server2 = start_server(ServerConfig::new(name).unwrap()).await.unwrap();

    wait_for_connected(server2.read()).await;

    let reconnected_status = loop {
        let msg = client.read().await.unwrap();
        if msg.is_status() {
            break msg.status.unwrap();
        }
    };
    assert_eq!(reconnected_status, "Connected");
    assert_eq!(client.status().await, Status::Connected);

    server2.close().await;
    client.close().await;
}

#[tokio::test]
async fn version_mismatch_is_surfaced_to_the_server_as_an_error() {
    let name = unique_name("test_version_mismatch");

    let server = start_server(ServerConfig::new(name.clone()).unwrap())
        .await
        .unwrap();

    // Give the accept loop a moment to be blocked in accept() before a raw
    // peer dials in and speaks a different protocol version.
    tokio::time::sleep(Duration::from_millis(50)).await;

    #[cfg(unix)]
    {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::UnixStream;

        let path = format!("/tmp/{}.sock", name);
        let mut raw = UnixStream::connect(path).await.unwrap();
        let _server_version = raw.read_u8().await.unwrap();
        raw.write_u8(1).await.unwrap();
    }

    let err = loop {
        let msg = server.read().await.unwrap();
        if msg.is_error() {
            break msg.err.unwrap();
        }
    };
    assert_eq!(err, "client has a different VERSION number");

    server.close().await;
}
