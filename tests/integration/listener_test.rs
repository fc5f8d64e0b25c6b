// tests/integration/listener_test.rs

use super::test_helpers::TestContext;
use bytes::{BufMut, BytesMut};
use cortado::core::protocol::{BinaryCodec, Encoding, Response, WireError};
use cortado::core::types::{SeqId, Statement};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

#[tokio::test]
async fn test_json_port_speaks_newline_delimited_json() {
    let ctx = TestContext::with_nodes(1).await;
    let stream = TcpStream::connect(&ctx.nodes[0].json_addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    write_half
        .write_all(
            b"{\"OpenConnection\":{\"client_id\":5,\"seq_id\":1,\"user\":\"u\",\"password\":\"p\",\"database\":\"d\"}}\n",
        )
        .await
        .unwrap();
    let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(reply["Connection"]["client_id"], 5);
    assert_eq!(reply["Connection"]["user"], "u");

    // Several requests over one connection are answered in order.
    write_half
        .write_all(
            b"{\"ExecuteSql\":{\"connection\":{\"client_id\":5,\"seq_id\":2,\"user\":\"u\",\"password\":\"p\",\"database\":\"d\"},\"statement\":{\"query\":\"CREATE TABLE t (a text)\"}}}\n\
              {\"ExecuteSql\":{\"connection\":{\"client_id\":5,\"seq_id\":3,\"user\":\"u\",\"password\":\"p\",\"database\":\"d\"},\"statement\":{\"query\":\"SELECT * FROM t\"}}}\n",
        )
        .await
        .unwrap();
    let created: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(created["ResultSet"]["tuples"], Value::Array(vec![]));
    let selected: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(selected["ResultSet"]["field_names"][0], "a");
}

#[tokio::test]
async fn test_undecodable_binary_frame_gets_protocol_error() {
    let ctx = TestContext::with_nodes(1).await;
    let mut stream = TcpStream::connect(&ctx.nodes[0].binary_addr).await.unwrap();

    let mut frame = BytesMut::new();
    frame.put_u32(4);
    frame.put_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
    stream.write_all(&frame).await.unwrap();

    let mut framed = Framed::new(stream, BinaryCodec::<Response>::new());
    let reply = framed.next().await.unwrap().unwrap();
    assert!(matches!(reply, Response::Error(WireError::Protocol(_))), "{reply:?}");
    assert!(framed.next().await.is_none());
}

#[tokio::test]
async fn test_concurrent_clerks_share_one_backend() {
    let ctx = Arc::new(TestContext::with_nodes(2).await);
    let setup = ctx.clerk(Encoding::Binary);
    let group = ctx.group(&[0], Encoding::Binary);
    let mut handle = setup.open_connection(&group).await.unwrap();
    setup
        .execute_sql(&group, &mut handle, Statement::new("CREATE TABLE hits (who text)"))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let ctx = ctx.clone();
        tasks.push(tokio::spawn(async move {
            let encoding = if i % 2 == 0 { Encoding::Binary } else { Encoding::Json };
            let clerk = ctx.clerk(encoding);
            let group = ctx.group(&[i % 2], encoding);
            let mut handle = clerk.open_connection(&group).await.unwrap();
            clerk
                .execute_sql(
                    &group,
                    &mut handle,
                    Statement::new("INSERT INTO hits VALUES ($1)").bind(i.to_string()),
                )
                .await
                .unwrap();
            clerk.close_connection(&group, &mut handle).await.unwrap();
            assert_eq!(handle.seq_id, SeqId::new(3));
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let rows = setup
        .execute_sql(&group, &mut handle, Statement::new("SELECT * FROM hits"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 20);
    assert_eq!(ctx.backend.open_sessions(), 1);
}

#[tokio::test]
async fn test_stop_closes_both_listeners() {
    let mut ctx = TestContext::with_nodes(1).await;
    let binary = ctx.nodes[0].binary_addr.clone();
    let json = ctx.nodes[0].json_addr.clone();

    // An idle open connection must not hold up shutdown.
    let _idle = TcpStream::connect(&binary).await.unwrap();
    ctx.nodes[0].stop().await.unwrap();

    assert!(TcpStream::connect(&binary).await.is_err());
    assert!(TcpStream::connect(&json).await.is_err());
}
