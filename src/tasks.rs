//! Background work.
//!
//! Handlers hand slow jobs (mail delivery) to a worker task over an
//! unbounded channel so requests never wait on SMTP. A second loop runs
//! periodic housekeeping against the database.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::db::queries::{registration, sessions, tags};
use crate::db::DbPool;
use crate::mail::{EmailMessage, MailError, Mailer};

#[derive(Debug, Clone)]
pub enum Task {
    SendEmail(EmailMessage),
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Delivery attempts per task, including the first.
    pub retries: u32,
    /// Delay before the first retry; doubles with every attempt.
    pub retry_backoff: Duration,
    pub housekeeping_interval: Duration,
    pub account_activation_days: i64,
}

/// Sending side of the worker channel. Cheap to clone.
#[derive(Clone)]
pub struct TaskQueue {
    sender: mpsc::UnboundedSender<Task>,
}

impl TaskQueue {
    /// Spawn the worker and housekeeping loops on the current runtime.
    pub fn start(mailer: Arc<Mailer>, db: DbPool, settings: WorkerSettings) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();

        tokio::spawn(run_worker(receiver, mailer, settings.clone()));
        spawn_housekeeping(db, settings);

        tracing::info!("Background worker started");
        Self { sender }
    }

    pub fn enqueue(&self, task: Task) {
        if let Err(e) = self.sender.send(task) {
            tracing::error!(task = ?e.0, "Background worker is gone, dropping task");
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<Task>,
    mailer: Arc<Mailer>,
    settings: WorkerSettings,
) {
    while let Some(task) = receiver.recv().await {
        match task {
            Task::SendEmail(message) => {
                let (mailer, message) = (mailer.as_ref(), &message);
                send_with_retries(move || mailer.send(message), &message.subject, &settings)
                    .await;
            }
        }
    }
    tracing::debug!("Task channel closed, worker exiting");
}

/// Call `send` until it succeeds or `retries` attempts have failed. Returns
/// the number of attempts made.
async fn send_with_retries<F, Fut>(mut send: F, subject: &str, settings: &WorkerSettings) -> u32
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), MailError>>,
{
    let attempts = settings.retries.max(1);
    let mut delay = settings.retry_backoff;

    for attempt in 1..=attempts {
        match send().await {
            Ok(()) => return attempt,
            Err(e) if attempt < attempts => {
                tracing::warn!(
                    attempt,
                    error = %e,
                    subject,
                    "Email delivery failed, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => {
                tracing::error!(attempts, error = %e, subject, "Giving up on email delivery");
            }
        }
    }
    attempts
}

fn spawn_housekeeping(db: DbPool, settings: WorkerSettings) {
    tokio::spawn(async move {
        // First run one period after startup.
        let period = settings.housekeeping_interval.max(Duration::from_secs(1));
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = housekeeping(&db, settings.account_activation_days) {
                tracing::error!(error = %e, "Housekeeping failed");
            }
        }
    });
}

/// Purge expired sessions, stale registrations and orphaned tags.
pub fn housekeeping(db: &DbPool, account_activation_days: i64) -> crate::error::AppResult<()> {
    let conn = db.get()?;
    let expired_sessions = sessions::delete_expired_sessions(&conn)?;
    let expired_registrations =
        registration::delete_expired_registrations(&conn, account_activation_days)?;
    let unused_tags = tags::delete_unused_tags(&conn)?;
    tracing::debug!(
        expired_sessions,
        expired_registrations,
        unused_tags,
        "Housekeeping finished"
    );
    Ok(())
}
