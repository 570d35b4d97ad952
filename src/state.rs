use std::sync::Arc;

use crate::config::Config;
use crate::db::DbPool;
use crate::mail::{mail_admins, EmailMessage};
use crate::tasks::{Task, TaskQueue};

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<Config>,
    pub tasks: TaskQueue,
}

impl AppState {
    /// Queue an email for background delivery.
    pub fn send_mail(&self, message: EmailMessage) {
        self.tasks.enqueue(Task::SendEmail(message));
    }

    /// Queue a message to the site admins, if any are configured.
    pub fn notify_admins(&self, subject: &str, body: &str) {
        if let Some(message) = mail_admins(&self.config, subject, body) {
            self.send_mail(message);
        }
    }
}
