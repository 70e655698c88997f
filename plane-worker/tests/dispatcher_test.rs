/// Dispatcher loop tests over the in-memory queue

use async_trait::async_trait;
use plane_shared::jobs::{EmailJob, JobQueue, MemoryJobQueue};
use plane_worker::config::WorkerConfig;
use plane_worker::dispatcher::{DispatchStats, Dispatcher};
use plane_worker::mailer::{EmailMessage, MailError, Mailer, MemoryMailer};
use std::sync::Arc;
use std::time::Duration;

fn config() -> WorkerConfig {
    WorkerConfig {
        poll_timeout_secs: 1,
        max_in_flight: 2,
        shutdown_grace_secs: 5,
        ..WorkerConfig::default()
    }
}

fn magic(email: &str) -> EmailJob {
    EmailJob::MagicLink {
        email: email.to_string(),
        key: format!("magic_{}", email),
        token: "abcd-efgh-ijkl".to_string(),
        web_url: "http://localhost:3000".to_string(),
    }
}

async fn wait_for<F, Fut>(condition: F, timeout: Duration)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while !condition().await {
        assert!(start.elapsed() < timeout, "condition not met within {:?}", timeout);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_drains_queue_then_stops() {
    let queue = Arc::new(MemoryJobQueue::new());
    let mailer = Arc::new(MemoryMailer::new());

    for i in 0..5 {
        queue.enqueue(magic(&format!("user{}@example.com", i))).await.unwrap();
    }

    let dispatcher = Dispatcher::new(queue.clone(), mailer.clone(), config());
    let shutdown = dispatcher.shutdown_token();
    let handle = tokio::spawn(async move { dispatcher.run().await });

    wait_for(|| async { mailer.sent().await.len() == 5 }, Duration::from_secs(5)).await;
    shutdown.cancel();

    let stats = handle.await.unwrap();
    assert_eq!(stats, DispatchStats { sent: 5, failed: 0 });
    assert_eq!(queue.len().await, 0);

    let recipients: Vec<String> = mailer.sent().await.into_iter().map(|m| m.to).collect();
    assert!(recipients.contains(&"user0@example.com".to_string()));
    assert!(recipients.contains(&"user4@example.com".to_string()));
}

#[tokio::test]
async fn test_picks_up_jobs_enqueued_while_waiting() {
    let queue = Arc::new(MemoryJobQueue::new());
    let mailer = Arc::new(MemoryMailer::new());

    let dispatcher = Dispatcher::new(queue.clone(), mailer.clone(), config());
    let shutdown = dispatcher.shutdown_token();
    let handle = tokio::spawn(async move { dispatcher.run().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    queue.enqueue(magic("late@example.com")).await.unwrap();

    wait_for(|| async { !mailer.sent().await.is_empty() }, Duration::from_secs(5)).await;
    shutdown.cancel();

    let stats = handle.await.unwrap();
    assert_eq!(stats.sent, 1);
    assert_eq!(mailer.sent().await[0].to, "late@example.com");
}

/// Rejects every message
struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    fn name(&self) -> &str {
        "failing"
    }

    async fn send(&self, _message: &EmailMessage) -> Result<(), MailError> {
        Err(MailError::Rejected {
            status: 503,
            body: "relay down".to_string(),
        })
    }
}

#[tokio::test]
async fn test_failed_sends_are_dropped() {
    let queue = Arc::new(MemoryJobQueue::new());
    queue.enqueue(magic("a@example.com")).await.unwrap();
    queue.enqueue(magic("b@example.com")).await.unwrap();

    let dispatcher = Dispatcher::new(queue.clone(), Arc::new(FailingMailer), config());
    let shutdown = dispatcher.shutdown_token();
    let handle = tokio::spawn(async move { dispatcher.run().await });

    wait_for(|| async { queue.len().await == 0 }, Duration::from_secs(5)).await;
    // Let the spawned sends settle before stopping
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    let stats = handle.await.unwrap();
    assert_eq!(stats, DispatchStats { sent: 0, failed: 2 });
}
