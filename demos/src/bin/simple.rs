//! A server that pings once on connect and a client that pongs back,
//! mirroring `original_source/example/simple/simple.go`.

use clap::Parser;
use ipc::{start_client, start_server, Client, ClientConfig, Server, ServerConfig};
use ipc_demos::DemoArgs;

#[tokio::main]
async fn main() {
    ipc_demos::init_logging();
    let args = DemoArgs::parse();

    let server = start_server(
        ServerConfig::new(args.name.clone())
            .expect("endpoint name")
            .encryption(args.encryption),
    )
    .await
    .expect("server should start listening");
    spawn_pinger(server.clone());

    let client = start_client(
        ClientConfig::new(args.name)
            .expect("endpoint name")
            .encryption(args.encryption),
    )
    .await
    .expect("client should be able to dial the server");

    pong_until_a_reply_arrives(&client).await;

    server.close().await;
    client.close().await;
}

fn spawn_pinger(server: Server) {
    tokio::spawn(async move {
        loop {
            let msg = match server.read().await {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!(error = %e, "server read failed");
                    continue;
                }
            };

            if msg.is_status() {
                match msg.status.as_deref() {
                    Some("Connected") => {
                        tracing::info!("server sending ping");
                        let _ = server.write(1, b"server - PING".to_vec()).await;
                    }
                    Some("Closed") => return,
                    _ => {}
                }
            } else {
                tracing::info!(data = ?String::from_utf8_lossy(&msg.data), msg_type = msg.msg_type, "server received");
                let _ = server.write(1, b"server - PING".to_vec()).await;
            }
        }
    });
}

async fn pong_until_a_reply_arrives(client: &Client) {
    let pong_message = format!("Message from client({}) - PONG", client.client_id());

    loop {
        let message = match client.read().await {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "client read failed");
                continue;
            }
        };

        if message.is_status() {
            tracing::info!(status = ?client.status().await, "client status");
            match message.status.as_deref() {
                Some("Reconnecting") => panic!("lost the server connection"),
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
