//! A multi-client server fanning its reads across two clients, mirroring
//! `original_source/example/multiclient/multiclient.go`.

use clap::Parser;
use ipc::{start_client, start_server, Client, ClientConfig, Message, ServerConfig};
use ipc_demos::DemoArgs;
use std::time::Duration;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

fn timeout_sentinel() -> Message {
    Message::data(-100, Vec::new())
}

#[tokio::main]
async fn main() {
    ipc_demos::init_logging();
    let args = DemoArgs::parse();

    let server = start_server(
        ServerConfig::new(args.name.clone())
            .expect("endpoint name")
            .multi_client(true)
            .encryption(args.encryption),
    )
    .await
    .expect("server should start listening");

    let manager = server.manager().expect("multi-client server carries a manager").clone();
    tokio::spawn(async move {
        loop {
            manager
                .read_timed(READ_TIMEOUT, timeout_sentinel(), |worker, result| {
                    let msg = match result {
                        Ok(msg) => msg,
                        Err(e) => {
                            tracing::warn!(error = %e, "server read failed");
                            return;
                        }
                    };
                    if msg.data.is_empty() && msg.msg_type == -100 {
                        return;
                    }
                    if msg.is_status() {
                        if msg.status.as_deref() == Some("Connected") {
                            tracing::info!(client_id = worker.client_id(), "server sending ping");
                            let worker = worker.clone();
                            tokio::spawn(async move {
                                let _ = worker.write(1, b"server - PING".to_vec()).await;
                            });
                        }
                    } else {
                        tracing::info!(client_id = worker.client_id(), data = ?String::from_utf8_lossy(&msg.data), "server received");
                        let worker = worker.clone();
                        tokio::spawn(async move {
                            let _ = worker.write(1, b"server - PING".to_vec()).await;
                        });
                    }
                })
                .await;
        }
    });

    let client_config = ClientConfig::new(args.name)
        .expect("endpoint name")
        .multi_client(true)
        .encryption(args.encryption);

    let c1 = start_client(client_config.clone())
        .await
        .expect("first client should be assigned id 1");
    let c2 = start_client(client_config)
        .await
        .expect("second client should be assigned id 2");

    pong_until_a_reply_arrives(&c2, false).await;
    pong_until_a_reply_arrives(&c1, false).await;
    pong_until_a_reply_arrives(&c2, true).await;

    server.manager().unwrap().close().await;
    c1.close().await;
    c2.close().await;
}

async fn pong_until_a_reply_arrives(client: &Client, autosend: bool) {
    let pong_message = format!("Message from client({}) - PONG", client.client_id());

    if autosend {
        let _ = client.write(5, pong_message.clone().into_bytes()).await;
    }

    loop {
        let message = match client.read_timed(READ_TIMEOUT, timeout_sentinel()).await {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "client read failed");
                continue;
            }
        };

        if message.data.is_empty() && message.msg_type == -100 {
            continue;
        }

        if message.is_status() {
            tracing::info!(status = ?client.status().await, "client status");
            match message.status.as_deref() {
                Some("Reconnecting") => {
                    client.close().await;
                    return;
                }
                Some("Connected") => {
                    let _ = client.write(5, pong_message.clone().into_bytes()).await;
                }
                _ => {}
            }
        } else {
            tracing::info!(
                client_id = client.client_id(),
                data = ?String::from_utf8_lossy(&message.data),
                msg_type = message.msg_type,
                "client received"
            );
            break;
        }
    }
}
