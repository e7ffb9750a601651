// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::protocol::{Request, Response};

#[tokio::test]
async fn frame_round_trip() {
    let (mut client, mut server) = tokio::io::duplex(4096);
    write_message(&mut client, &Request::Ping).await.unwrap();
    let request: Request = read_message(&mut server).await.unwrap();
    assert_eq!(request, Request::Ping);
}

#[tokio::test]
async fn closed_stream_reports_connection_closed() {
    let (client, mut server) = tokio::io::duplex(64);
    drop(client);
    let err = read_message::<_, Request>(&mut server).await.unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
}

#[tokio::test]
async fn oversized_frame_is_rejected() {
    let (mut client, mut server) = tokio::io::duplex(64);
    use tokio::io::AsyncWriteExt;
    client.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
    let err = read_message::<_, Request>(&mut server).await.unwrap_err();
    assert!(matches!(err, ProtocolError::FrameTooLarge(_)));
}

#[tokio::test]
async fn partial_frames_are_reassembled() {
    let (mut client, mut server) = tokio::io::duplex(4096);
    let frame = encode(&Response::Ok).unwrap();
    let (head, tail) = frame.split_at(3);

    use tokio::io::AsyncWriteExt;
    let head = head.to_vec();
    let tail = tail.to_vec();
    let writer = tokio::spawn(async move {
        client.write_all(&head).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        client.write_all(&tail).await.unwrap();
        client
    });

    let response: Response = read_message(&mut server).await.unwrap();
    assert_eq!(response, Response::Ok);
    drop(writer.await.unwrap());
}

#[tokio::test]
async fn read_timeout_fires() {
    let (_client, mut server) = tokio::io::duplex(64);
    let err = read_message_timeout::<_, Request>(
        &mut server,
        std::time::Duration::from_millis(30),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ProtocolError::Timeout));
}

#[tokio::test]
async fn garbage_payload_is_malformed() {
    let (mut client, mut server) = tokio::io::duplex(64);
    use tokio::io::AsyncWriteExt;
    let body = b"not json";
    client.write_all(&(body.len() as u32).to_be_bytes()).await.unwrap();
    client.write_all(body).await.unwrap();
    let err = read_message::<_, Request>(&mut server).await.unwrap_err();
    assert!(matches!(err, ProtocolError::Malformed(_)));
}
