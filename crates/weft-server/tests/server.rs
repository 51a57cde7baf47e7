//! Server lifecycle over real TCP listeners.

use std::sync::Arc;

use async_trait::async_trait;
use weft_core::{MessageKind, ProtocolError};
use weft_protocol::{BinaryProtocol, Protocol};
use weft_server::{MethodHandler, Processor, ServiceProcessor, SimpleServer, TaskServer};
use weft_transport::{connect_tcp, TcpServerChannel};

/// Replies to `ping` with an empty result struct.
struct Ping;

#[async_trait]
impl MethodHandler for Ping {
    async fn handle(
        &self,
        kind: MessageKind,
        seq_id: i32,
        input: &mut dyn Protocol,
        output: &mut dyn Protocol,
    ) -> Result<(), ProtocolError> {
        input.read_struct_begin().await?;
        assert!(input.read_field_begin().await?.is_stop());
        input.read_struct_end().await?;
        input.read_message_end().await?;

        if kind == MessageKind::Oneway {
            return Ok(());
        }
        output
            .write_message_begin("ping", MessageKind::Reply, seq_id)
            .await?;
        output.write_struct_begin("ping_result").await?;
        output.write_field_stop().await?;
        output.write_struct_end().await?;
        output.write_message_end().await
    }
}

fn ping_processor() -> Arc<dyn Processor> {
    Arc::new(ServiceProcessor::new().with_method("ping", Box::new(Ping)))
}

async fn ping_once(addr: &str, seq_id: i32) {
    let (input, output) = connect_tcp(addr).await.unwrap();
    let mut input = BinaryProtocol::new(input);
    let mut output = BinaryProtocol::new(output);

    output
        .write_message_begin("ping", MessageKind::Call, seq_id)
        .await
        .unwrap();
    output.write_struct_begin("ping_args").await.unwrap();
    output.write_field_stop().await.unwrap();
    output.write_struct_end().await.unwrap();
    output.write_message_end().await.unwrap();
    output.flush().await.unwrap();

    let envelope = input.read_message_begin().await.unwrap();
    assert_eq!(envelope.kind, MessageKind::Reply);
    assert_eq!(envelope.seq_id, seq_id);
    input.read_struct_begin().await.unwrap();
    assert!(input.read_field_begin().await.unwrap().is_stop());
    input.read_struct_end().await.unwrap();
    input.read_message_end().await.unwrap();
}

#[tokio::test]
async fn simple_server_serves_connections_in_turn() {
    let channel = TcpServerChannel::bind("127.0.0.1:0").await.unwrap();
    let addr = channel.local_addr().unwrap().to_string();
    let mut server = SimpleServer::new(ping_processor(), channel);
    let handle = server.stop_handle();
    let serving = tokio::spawn(async move { server.serve().await });

    for seq in 1..=3 {
        ping_once(&addr, seq).await;
    }

    handle.stop();
    serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn task_server_accepts_while_connections_are_open() {
    let channel = TcpServerChannel::bind("127.0.0.1:0").await.unwrap();
    let addr = channel.local_addr().unwrap().to_string();
    let mut server = TaskServer::new(ping_processor(), channel);
    let handle = server.stop_handle();
    let serving = tokio::spawn(async move { server.serve().await });

    // Hold one connection open while another completes a full exchange.
    let (held_input, held_output) = connect_tcp(&addr).await.unwrap();
    ping_once(&addr, 7).await;
    drop(held_input);
    drop(held_output);

    handle.stop();
    serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn stop_interrupts_a_blocked_accept() {
    let channel = TcpServerChannel::bind("127.0.0.1:0").await.unwrap();
    let mut server = SimpleServer::new(ping_processor(), channel);
    let handle = server.stop_handle();
    let serving = tokio::spawn(async move { server.serve().await });

    // No client ever connects; stop must still unblock serve promptly.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    handle.stop();
    serving.await.unwrap().unwrap();
    assert!(handle.is_stopped());
}
