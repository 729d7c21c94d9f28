// SPDX-License-Identifier: MIT
//! The Remote Task Client: owns the "current activity" record and drives the
//! four operations against the tracking service (login, reconcile, start,
//! stop).
//!
//! Ownership contract: this is the only place the current-task record is
//! mutated. The orientation router asks for start/stop through this API and
//! never touches the record itself.

pub mod api;

use std::sync::Mutex;
use tracing::{error, info, warn};

use crate::retry::{retry_if, RetryConfig};
use crate::session::SessionStore;
use api::{ActivityApi, ApiError, Project};

/// The activity this process believes is running, as assigned by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentTask {
    pub id: i64,
    pub started_at: String,
}

/// Current time in the service's wire format: day-of-week, month name, day,
/// year, 24-hour time, UTC. E.g. `Tue August 25 2026 14:03:07`.
///
/// Not ISO-8601 — the deployed server parses exactly this shape.
pub fn now_stamp() -> String {
    chrono::Utc::now().format("%a %B %d %Y %H:%M:%S").to_string()
}

pub struct TaskClient<A: ActivityApi> {
    api: A,
    // At most one current task per process. Plain std mutex: it is never held
    // across an await.
    current: Mutex<Option<CurrentTask>>,
}

impl<A: ActivityApi> TaskClient<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            current: Mutex::new(None),
        }
    }

    /// Is an activity currently running, as far as this process knows?
    pub fn is_active(&self) -> bool {
        self.current.lock().expect("current lock").is_some()
    }

    pub fn current(&self) -> Option<CurrentTask> {
        self.current.lock().expect("current lock").clone()
    }

    /// Exchange credentials for a session, retrying transient failures with
    /// backoff. A non-transient rejection (bad credentials) propagates
    /// immediately. On success the session is persisted so the next start of
    /// the daemon skips the prompt.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        retry: &RetryConfig,
        store: &SessionStore,
    ) -> Result<(), ApiError> {
        let session = retry_if(retry, ApiError::is_transient, || {
            self.api.log_in(email, password)
        })
        .await?;

        if let Err(e) = store.save(&session) {
            // Not fatal — the session works for this run, it just won't
            // survive a restart.
            warn!(err = %e, "could not persist session");
        }
        info!("logged in");
        Ok(())
    }

    /// Adopt the activity the server reports as running, if any. Called once
    /// at startup: the server, not local state, is the source of truth for
    /// "is something running".
    pub async fn reconcile(&self) -> Result<Option<CurrentTask>, ApiError> {
        let adopted = self.api.working_activity().await?.map(|activity| CurrentTask {
            id: activity.id,
            started_at: activity.started_at.unwrap_or_default(),
        });
        match &adopted {
            Some(task) => info!(id = task.id, "adopted running activity from server"),
            None => info!("no activity running on server"),
        }
        *self.current.lock().expect("current lock") = adopted.clone();
        Ok(adopted)
    }

    /// Start a new activity and record it as current. The caller guarantees
    /// nothing is running (the router always stops first).
    pub async fn start(&self, project: i64, description: &str) -> Result<CurrentTask, ApiError> {
        let started_at = now_stamp();
        let activity = self
            .api
            .start_activity(project, description, &started_at)
            .await?;
        let task = CurrentTask {
            id: activity.id,
            started_at,
        };
        info!(id = task.id, project, description, "started activity");
        *self.current.lock().expect("current lock") = Some(task.clone());
        Ok(task)
    }

    /// Stop the current activity, if any. The local record is cleared before
    /// the remote outcome is known: a failed stop is logged but the router
    /// must never see a task the rotation already dismissed. The server-side
    /// activity may stay open until the next reconcile — a known gap.
    pub async fn stop_current(&self) {
        let Some(task) = self.current.lock().expect("current lock").take() else {
            return;
        };
        match self.api.stop_activity(task.id, &now_stamp()).await {
            Ok(()) => info!(id = task.id, "stopped activity"),
            Err(e) => error!(id = task.id, err = %e, "failed to stop activity on server"),
        }
    }

    /// List the account's projects (`cubelinkd projects`).
    pub async fn projects(&self) -> Result<Vec<Project>, ApiError> {
        self.api.projects().await
    }

    pub fn api(&self) -> &A {
        &self.api
    }
}
