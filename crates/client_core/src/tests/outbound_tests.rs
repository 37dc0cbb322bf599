use std::time::Duration;

use super::*;

#[test]
fn parses_join_commands_by_prefix() {
    assert_eq!(
        OutboundCommand::parse("  /join 15  ").expect("parse"),
        OutboundCommand::Join(RoomId(15))
    );
    assert_eq!(
        OutboundCommand::parse("/join 3 please").expect("parse"),
        OutboundCommand::Say("/join 3 please".to_string())
    );
    assert_eq!(
        OutboundCommand::parse("/join 5 extra").expect("parse").payload(),
        "/join 5 extra"
    );
    assert_eq!(
        OutboundCommand::parse("/join  4").expect("parse"),
        OutboundCommand::Say("/join  4".to_string())
    );
    assert_eq!(
        OutboundCommand::parse("/join lobby").expect("parse"),
        OutboundCommand::Say("/join lobby".to_string())
    );
    assert_eq!(
        OutboundCommand::parse("/joined 4").expect("parse"),
        OutboundCommand::Say("/joined 4".to_string())
    );
}

#[test]
fn rejects_whitespace_only_text() {
    assert!(matches!(
        OutboundCommand::parse(" \t\n"),
        Err(ClientError::EmptyCommand)
    ));
}

#[test]
fn payload_wraps_greentext() {
    assert_eq!(
        OutboundCommand::parse(">implying").expect("parse").payload(),
        "[color=#72ff72]>implying"
    );
    assert_eq!(
        OutboundCommand::parse("> spaced quote").expect("parse").payload(),
        "> spaced quote"
    );
    assert_eq!(
        OutboundCommand::Join(RoomId(8)).payload(),
        "/join 8"
    );
}

#[test]
fn read_only_policy_admits_only_joins() {
    let lurker = OutboundPolicy { read_only: true };
    assert!(lurker.admits(&OutboundCommand::Join(RoomId(1))));
    assert!(!lurker.admits(&OutboundCommand::Say("hi".to_string())));

    let normal = OutboundPolicy::default();
    assert!(normal.admits(&OutboundCommand::Say("hi".to_string())));
}

#[tokio::test]
async fn sender_trims_and_rejects_empty_text() {
    let (tx, mut rx) = mpsc::channel(4);
    let sender = CommandSender::new(tx, CancellationToken::new());

    sender.send("  hello  ").await.expect("send");
    assert!(matches!(
        sender.send("   ").await,
        Err(ClientError::EmptyCommand)
    ));

    assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    assert!(rx.try_recv().is_err(), "empty text is never queued");
}

#[tokio::test]
async fn sender_fails_fast_once_cancelled() {
    let (tx, _rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let sender = CommandSender::new(tx, cancel.clone());
    sender.send("fills the queue").await.expect("send");

    let blocked = tokio::spawn({
        let sender = sender.clone();
        async move { sender.send("waits for room").await }
    });
    tokio::task::yield_now().await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(1), blocked)
        .await
        .expect("no hang")
        .expect("join");
    assert!(matches!(result, Err(ClientError::Closed)));
    assert!(matches!(
        sender.send("after shutdown").await,
        Err(ClientError::Closed)
    ));
}

#[tokio::test]
async fn sender_reports_closed_when_the_writer_is_gone() {
    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    let sender = CommandSender::new(tx, CancellationToken::new());
    assert!(matches!(sender.send("hi").await, Err(ClientError::Closed)));
}
