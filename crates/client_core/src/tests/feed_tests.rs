use std::time::Duration;

use shared::domain::MessageId;

use super::*;

fn msg(id: u32) -> Message {
    Message {
        id: MessageId(id),
        ..Message::default()
    }
}

#[test]
fn full_feed_drops_without_affecting_others() {
    let hub = FeedHub::new(2);
    let stalled = hub.register();
    let mut healthy = hub.register();

    let mut received = Vec::new();
    for id in 1..=10 {
        hub.deliver(&msg(id));
        while let Some(msg) = healthy.try_recv() {
            received.push(msg.id.0);
        }
    }

    assert_eq!(received, (1..=10).collect::<Vec<_>>());
    assert_eq!(stalled.dropped(), 8);
    assert_eq!(healthy.dropped(), 0);
}

#[test]
fn delivery_reports_accepted_and_dropped_counts() {
    let hub = FeedHub::new(1);
    let _a = hub.register();
    let _b = hub.register();

    assert_eq!(
        hub.deliver(&msg(1)),
        Delivery {
            accepted: 2,
            dropped: 0
        }
    );
    assert_eq!(
        hub.deliver(&msg(2)),
        Delivery {
            accepted: 0,
            dropped: 2
        }
    );
}

#[test]
fn closed_feeds_are_pruned_and_their_slot_reused() {
    let hub = FeedHub::new(4);
    let mut first = hub.register();
    let _second = hub.register();
    assert_eq!(hub.slot_count(), 2);

    first.close();
    assert_eq!(hub.live(), 1);
    hub.deliver(&msg(1));

    let _third = hub.register();
    assert_eq!(hub.slot_count(), 2, "freed slot is reused");
    assert_eq!(hub.live(), 2);
}

#[test]
fn dropped_feed_is_pruned_lazily() {
    let hub = FeedHub::new(4);
    drop(hub.register());
    let mut kept = hub.register();

    let delivery = hub.deliver(&msg(1));
    assert_eq!(delivery.accepted, 1);
    assert_eq!(kept.try_recv().map(|msg| msg.id), Some(MessageId(1)));
}

#[tokio::test]
async fn closer_ends_the_stream_after_queued_updates() {
    let hub = FeedHub::new(4);
    let mut feed = hub.register();
    hub.deliver(&msg(1));

    feed.closer().close();
    hub.deliver(&msg(2));

    assert_eq!(feed.recv().await.map(|msg| msg.id), Some(MessageId(1)));
    assert!(feed.recv().await.is_none());
}

#[tokio::test]
async fn closer_ends_an_idle_stream_without_further_deliveries() {
    let hub = FeedHub::new(4);
    let mut feed = hub.register();
    hub.deliver(&msg(1));

    let closer = feed.closer();
    tokio::spawn(async move { closer.close() })
        .await
        .expect("close task");
    assert_eq!(hub.live(), 0);

    let first = tokio::time::timeout(Duration::from_secs(1), feed.recv())
        .await
        .expect("no hang");
    assert_eq!(first.map(|msg| msg.id), Some(MessageId(1)));
    let end = tokio::time::timeout(Duration::from_secs(1), feed.recv())
        .await
        .expect("stream ends without traffic");
    assert!(end.is_none());

    let _next = hub.register();
    assert_eq!(hub.slot_count(), 1, "slot freed by the closer is reused");
}

#[tokio::test]
async fn close_all_drains_then_ends_every_feed() {
    let hub = FeedHub::new(4);
    let mut a = hub.register();
    let mut b = hub.register();
    hub.deliver(&msg(1));
    hub.close_all();

    for feed in [&mut a, &mut b] {
        let first = tokio::time::timeout(Duration::from_secs(1), feed.recv())
            .await
            .expect("no hang");
        assert_eq!(first.map(|msg| msg.id), Some(MessageId(1)));
        assert!(feed.recv().await.is_none());
        assert!(!feed.is_open());
    }
}
