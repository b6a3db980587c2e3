//! Refresh cycles against a fake gog.

#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{FakeGog, INBOX};
use gogcli_sensor::coordinator::request_refresh;
use gogcli_sensor::summary::sensor_states;
use gogcli_sensor::{InboxCoordinator, IntegrationConfig, IntegrationError};
use std::sync::Arc;
use std::time::Duration;

fn coordinator(gog: &FakeGog) -> InboxCoordinator {
    let config = IntegrationConfig::new("me@gmail.com").with_config_dir(&gog.home);
    InboxCoordinator::from_config(&config, &gog.path)
}

#[tokio::test]
async fn failing_thread_leaves_only_that_message_without_thread() {
    let gog = FakeGog::new(INBOX);
    let coordinator = coordinator(&gog);

    let messages = coordinator.refresh().await.unwrap();

    assert_eq!(messages.len(), 5);
    for (i, item) in messages.iter().enumerate() {
        assert_eq!(item.message.id, format!("m{}", i + 1));
        if i == 2 {
            assert!(item.thread.is_none(), "thread t3 should be missing");
        } else {
            let thread = item.thread.as_ref().expect("thread fetched");
            assert_eq!(thread.id.as_deref(), Some(format!("t{}", i + 1).as_str()));
        }
    }

    let calls = gog.calls();
    assert_eq!(calls[0], "gmail messages search label:INBOX --max=5 --json --include-body");
    assert_eq!(calls.iter().filter(|c| c.starts_with("gmail thread get")).count(), 5);

    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.messages, messages);
    assert!(snapshot.last_success.is_some());
    assert_eq!(snapshot.last_error, None);
}

#[tokio::test]
async fn search_failure_fails_the_refresh_and_keeps_previous_data() {
    let gog = FakeGog::new(&format!(
        "if [ -f \"$HOME/broken\" ]; then echo \"quota exceeded\" >&2; exit 2; fi\n{INBOX}"
    ));
    let coordinator = coordinator(&gog);
    coordinator.refresh().await.unwrap();
    let first = coordinator.snapshot();

    std::fs::write(gog.home.join("broken"), b"").unwrap();
    let err = coordinator.refresh().await.unwrap_err();

    match &err {
        IntegrationError::UpdateFailed(source) => {
            assert!(source.to_string().contains("quota exceeded"), "source: {source}");
        }
        other => panic!("expected UpdateFailed, got {other:?}"),
    }
    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.messages, first.messages);
    assert_eq!(snapshot.last_success, first.last_success);
    assert!(snapshot.last_error.unwrap().contains("quota exceeded"));
}

#[tokio::test]
async fn empty_inbox_gives_empty_slots() {
    let gog = FakeGog::new(r#"echo '{"messages":[]}'"#);
    let coordinator = coordinator(&gog);

    let messages = coordinator.refresh().await.unwrap();

    assert!(messages.is_empty());
    assert_eq!(sensor_states(&messages, 5), vec!["Empty"; 5]);
    assert_eq!(gog.calls().len(), 1);
}

#[tokio::test]
async fn thread_passthrough() {
    let gog = FakeGog::new(INBOX);
    let coordinator = coordinator(&gog);

    let thread = coordinator.get_thread("t2").await.unwrap();
    assert_eq!(thread.messages[0].id, "m2");

    let err = coordinator.get_thread("t3").await.unwrap_err();
    assert!(matches!(err, IntegrationError::Adapter(_)));
}

#[tokio::test]
async fn run_publishes_immediately_and_on_request() {
    let gog = FakeGog::new(INBOX);
    let coordinator = Arc::new(coordinator(&gog));
    let mut snapshots = coordinator.subscribe();
    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);

    let poller = Arc::clone(&coordinator);
    let task = tokio::spawn(async move {
        poller
            .run(async move {
                let _ = stop_rx.changed().await;
            })
            .await;
    });

    tokio::time::timeout(Duration::from_secs(10), snapshots.changed())
        .await
        .expect("first refresh published")
        .unwrap();
    let first = snapshots.borrow_and_update().last_success;
    assert!(first.is_some());
    assert_eq!(coordinator.snapshot().messages.len(), 5);

    request_refresh(&[Arc::clone(&coordinator)], &["ME@gmail.com".to_string()]);
    tokio::time::timeout(Duration::from_secs(10), snapshots.changed())
        .await
        .expect("manual refresh published")
        .unwrap();
    assert!(snapshots.borrow().last_success >= first);
    let searches = gog
        .calls()
        .iter()
        .filter(|c| c.starts_with("gmail messages search"))
        .count();
    assert_eq!(searches, 2);

    stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("poller stopped")
        .unwrap();
}
