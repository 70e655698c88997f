/// Email dispatcher
///
/// Pops [`EmailJob`]s from a [`JobQueue`], renders them and hands them to a
/// [`Mailer`]. Sends run concurrently up to `max_in_flight`.
///
/// ```text
/// Dispatcher
///   ├─> JobQueue: blocking pop (poll timeout)
///   ├─> render: job → EmailMessage
///   └─> Mailer: send (spawned, bounded by a semaphore)
/// ```
///
/// Delivery is fire-and-forget: a job that fails to render or send is
/// logged and dropped.
///
/// # Example
///
/// ```no_run
/// use plane_shared::jobs::MemoryJobQueue;
/// use plane_worker::config::WorkerConfig;
/// use plane_worker::dispatcher::Dispatcher;
/// use plane_worker::mailer::LogMailer;
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let dispatcher = Dispatcher::new(
///     Arc::new(MemoryJobQueue::new()),
///     Arc::new(LogMailer),
///     WorkerConfig::default(),
/// );
/// let shutdown = dispatcher.shutdown_token();
/// tokio::spawn(async move { dispatcher.run().await });
/// shutdown.cancel();
/// # Ok(())
/// # }
/// ```

use crate::config::WorkerConfig;
use crate::mailer::{MailError, Mailer};
use crate::render::{render, RenderError};
use plane_shared::jobs::{EmailJob, JobError, JobQueue};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Pause after a failed pop before trying again
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Mail(#[from] MailError),
}

/// Counters reported when the loop stops
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub sent: u64,
    pub failed: u64,
}

pub struct Dispatcher {
    queue: Arc<dyn JobQueue>,
    mailer: Arc<dyn Mailer>,
    config: WorkerConfig,
    shutdown_token: CancellationToken,
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn JobQueue>, mailer: Arc<dyn Mailer>, config: WorkerConfig) -> Self {
        Self {
            queue,
            mailer,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Cancelling the token stops the loop after in-flight sends finish
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Renders and sends one job
    pub async fn deliver(&self, job: &EmailJob) -> Result<(), DispatchError> {
        deliver(self.mailer.as_ref(), &self.config.from_address, job).await
    }

    /// Runs until the shutdown token is cancelled
    pub async fn run(&self) -> DispatchStats {
        tracing::info!(
            mailer = self.mailer.name(),
            queue = %self.config.queue_key,
            max_in_flight = self.config.max_in_flight,
            "Email dispatcher starting"
        );

        let permits = Arc::new(Semaphore::new(self.config.max_in_flight));
        let mut in_flight: JoinSet<bool> = JoinSet::new();
        let mut stats = DispatchStats::default();

        loop {
            let permit = tokio::select! {
                biased;
                _ = self.shutdown_token.cancelled() => break,
                Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                    record(&mut stats, done);
                    continue;
                }
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let next = tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                next = self.queue.dequeue(self.config.poll_timeout()) => next,
            };

            let job = match next {
                Ok(Some(job)) => job,
                Ok(None) => continue,
                Err(JobError::Payload(e)) => {
                    tracing::error!(error = %e, "Dropping malformed email job");
                    stats.failed += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to pop email job");
                    tokio::select! {
                        _ = self.shutdown_token.cancelled() => break,
                        _ = sleep(ERROR_BACKOFF) => continue,
                    }
                }
            };

            let mailer = self.mailer.clone();
            let from = self.config.from_address.clone();
            in_flight.spawn(async move {
                let _permit = permit;
                match deliver(mailer.as_ref(), &from, &job).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::error!(
                            kind = job.kind(),
                            to = %job.recipient(),
                            error = %e,
                            "Email job dropped"
                        );
                        false
                    }
                }
            });
        }

        tracing::info!(in_flight = in_flight.len(), "Shutdown requested, waiting for sends");

        let drain = async {
            while let Some(done) = in_flight.join_next().await {
                record(&mut stats, done);
            }
        };
        if tokio::time::timeout(self.config.shutdown_grace(), drain).await.is_err() {
            tracing::warn!(count = in_flight.len(), "Aborting sends still running");
            in_flight.abort_all();
        }

        tracing::info!(sent = stats.sent, failed = stats.failed, "Email dispatcher stopped");
        stats
    }
}

fn record(stats: &mut DispatchStats, done: Result<bool, tokio::task::JoinError>) {
    match done {
        Ok(true) => stats.sent += 1,
        Ok(false) => stats.failed += 1,
        Err(e) => {
            tracing::error!(error = %e, "Send task panicked");
            stats.failed += 1;
        }
    }
}

async fn deliver(mailer: &dyn Mailer, from: &str, job: &EmailJob) -> Result<(), DispatchError> {
    let message = render(job, from)?;
    mailer.send(&message).await?;

    tracing::info!(kind = job.kind(), to = %message.to, mailer = mailer.name(), "Email sent");
    Ok(())
}
