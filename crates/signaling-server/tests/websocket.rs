//! Signaling over real WebSocket connections

mod common;

use std::sync::Arc;

use serde_json::json;

use common::{connect, recv, send, start_server, wait_for_registered, EchoBackend};

#[tokio::test]
async fn test_call_over_websockets() -> anyhow::Result<()> {
    let backend = Arc::new(EchoBackend::default());
    let mut server = start_server(backend.clone()).await?;

    let mut operator = connect(&server).await?;
    send(&mut operator, json!({"id": "register", "name": "op1", "role": "admin"})).await?;
    assert_eq!(
        recv(&mut operator).await?,
        json!({"id": "registerResponse", "response": "accepted"})
    );

    let mut caller = connect(&server).await?;
    send(&mut caller, json!({"id": "register", "name": "u1", "role": "user"})).await?;
    recv(&mut caller).await?;

    send(&mut caller, json!({"id": "call", "from": "u1", "sdpOffer": "offer-a"})).await?;
    assert_eq!(
        recv(&mut operator).await?,
        json!({"id": "incomingCall", "from": "u1", "to": "op1"})
    );

    send(
        &mut caller,
        json!({"id": "onIceCandidate", "from": "u1", "candidate": {"candidate": "c1", "sdpMid": "0"}}),
    )
    .await?;
    send(
        &mut operator,
        json!({
            "id": "incomingCallResponse",
            "from": "u1",
            "to": "op1",
            "callResponse": "accept",
            "sdpOffer": "offer-b"
        }),
    )
    .await?;

    assert_eq!(
        recv(&mut caller).await?,
        json!({"id": "callResponse", "response": "accepted", "sdpAnswer": "answer-to-offer-a"})
    );
    assert_eq!(
        recv(&mut operator).await?,
        json!({"id": "startCommunication", "sdpAnswer": "answer-to-offer-b"})
    );
    assert_eq!(server.broker().stats().await.active_calls, 1);

    send(&mut caller, json!({"id": "stop", "name": "u1"})).await?;
    assert_eq!(
        recv(&mut operator).await?,
        json!({"id": "stopCommunication", "message": "remote user hung up"})
    );
    // Release follows the peer notification
    for _ in 0..100 {
        if !backend.released.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(backend.released.lock().unwrap().len(), 1);
    assert_eq!(server.broker().stats().await.active_calls, 0);

    server.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_errors_are_reported_on_the_socket() -> anyhow::Result<()> {
    let backend = Arc::new(EchoBackend::default());
    let mut server = start_server(backend).await?;

    let mut client = connect(&server).await?;
    send(&mut client, json!({"id": "stop", "name": "ghost"})).await?;
    assert_eq!(
        recv(&mut client).await?,
        json!({"id": "error", "message": "User not found: ghost"})
    );

    send(&mut client, json!({"id": "register", "name": "u1", "role": "caller"})).await?;
    recv(&mut client).await?;
    send(&mut client, json!({"id": "call", "from": "u1", "sdpOffer": "x"})).await?;
    assert_eq!(recv(&mut client).await?, json!({"id": "allAdminsAreBusy"}));

    server.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_closing_socket_removes_session() -> anyhow::Result<()> {
    let backend = Arc::new(EchoBackend::default());
    let mut server = start_server(backend).await?;

    let mut operator = connect(&server).await?;
    send(&mut operator, json!({"id": "register", "name": "op1", "role": "operator"})).await?;
    recv(&mut operator).await?;
    let mut caller = connect(&server).await?;
    send(&mut caller, json!({"id": "register", "name": "u1", "role": "caller"})).await?;
    recv(&mut caller).await?;
    wait_for_registered(&server, 2).await;

    send(&mut caller, json!({"id": "call", "from": "u1", "sdpOffer": "x"})).await?;
    recv(&mut operator).await?;

    caller.close(None).await?;
    assert_eq!(
        recv(&mut operator).await?,
        json!({"id": "stopCommunication", "message": "remote user hung up"})
    );
    wait_for_registered(&server, 1).await;
    assert_eq!(server.broker().stats().await.idle_operators, 1);

    server.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_malformed_frame_closes_connection() -> anyhow::Result<()> {
    let backend = Arc::new(EchoBackend::default());
    let mut server = start_server(backend).await?;

    let mut client = connect(&server).await?;
    send(&mut client, json!({"id": "register", "name": "u1", "role": "caller"})).await?;
    recv(&mut client).await?;

    use futures::SinkExt;
    client
        .send(tokio_tungstenite::tungstenite::Message::text("{oops".to_string()))
        .await?;
    assert!(recv(&mut client).await.is_err());
    wait_for_registered(&server, 0).await;

    server.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_stats_and_health_endpoints() -> anyhow::Result<()> {
    let backend = Arc::new(EchoBackend::default());
    let mut server = start_server(backend).await?;
    let base = format!("http://{}", server.local_addr().expect("bound"));

    let mut client = connect(&server).await?;
    send(&mut client, json!({"id": "register", "name": "op1", "role": "operator"})).await?;
    recv(&mut client).await?;

    let health = reqwest::get(format!("{}/health", base)).await?.text().await?;
    assert_eq!(health, "ok");

    let stats: serde_json::Value = reqwest::get(format!("{}/stats", base)).await?.json().await?;
    assert_eq!(stats["registered"], 1);
    assert_eq!(stats["operators"], 1);
    assert_eq!(stats["idle_operators"], 1);
    assert_eq!(stats["active_calls"], 0);

    server.shutdown().await?;
    assert!(server.shutdown().await.is_err());
    Ok(())
}
