//! Integration tests for the broadcast dispatcher.

mod common;

use std::sync::Arc;

use gpuwatch_protocol::ChatId;
use gpuwatchd::broadcast::Broadcaster;
use gpuwatchd::transport::{MessageFormat, Messenger};

use common::{whitelist, RecordingMessenger};

#[tokio::test]
async fn test_failed_recipient_does_not_stop_batch() {
    let messenger = RecordingMessenger::new();
    messenger.fail_for(ChatId::new(2));
    let shared: Arc<dyn Messenger> = messenger.clone();
    let broadcaster = Broadcaster::new(shared, whitelist(&[1, 2, 3]));

    let report = broadcaster.broadcast("GPU 0 is free", MessageFormat::Plain).await;

    assert_eq!(report.delivered, vec![ChatId::new(1), ChatId::new(3)]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].recipient(), ChatId::new(2));
    assert!(!report.all_delivered());

    assert_eq!(messenger.texts_for(ChatId::new(1)), vec!["GPU 0 is free"]);
    assert_eq!(messenger.texts_for(ChatId::new(3)), vec!["GPU 0 is free"]);
    assert!(messenger.texts_for(ChatId::new(2)).is_empty());
}

#[tokio::test]
async fn test_broadcast_follows_whitelist_order() {
    let messenger = RecordingMessenger::new();
    let shared: Arc<dyn Messenger> = messenger.clone();
    let broadcaster = Broadcaster::new(shared, whitelist(&[30, 10, 20]));

    let report = broadcaster.broadcast("*bold*", MessageFormat::Markdown).await;
    assert!(report.all_delivered());

    let recipients: Vec<ChatId> = messenger.sent().iter().map(|m| m.recipient).collect();
    assert_eq!(recipients, vec![ChatId::new(30), ChatId::new(10), ChatId::new(20)]);
    assert!(messenger
        .sent()
        .iter()
        .all(|m| m.format == MessageFormat::Markdown));
}

#[tokio::test]
async fn test_every_recipient_failing_is_not_an_error() {
    let messenger = RecordingMessenger::new();
    messenger.fail_for(ChatId::new(1));
    messenger.fail_for(ChatId::new(2));
    let shared: Arc<dyn Messenger> = messenger.clone();
    let broadcaster = Broadcaster::new(shared, whitelist(&[1, 2]));

    let report = broadcaster.broadcast("hello", MessageFormat::Plain).await;
    assert!(report.delivered.is_empty());
    assert_eq!(report.failed.len(), 2);
}

#[tokio::test]
async fn test_empty_whitelist() {
    let messenger = RecordingMessenger::new();
    let shared: Arc<dyn Messenger> = messenger.clone();
    let broadcaster = Broadcaster::new(shared, whitelist(&[]));

    let report = broadcaster.broadcast("hello", MessageFormat::Plain).await;
    assert!(report.all_delivered());
    assert!(messenger.sent().is_empty());
}
