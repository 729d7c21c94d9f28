// SPDX-License-Identifier: MIT
//! The Orientation Router: turns one-byte orientation notifications into
//! stop/start decisions against the task client.
//!
//! Three effective states: Idle (nothing running), Active (current task
//! set), and the transient Stopping/Starting inside a single pass. Nothing
//! is remembered between notifications beyond "is a task active", which the
//! task client owns. Deliberately no debouncing: a repeated notification for
//! the same face restarts the activity.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{MappingEntry, FACE_RANGE};
use crate::tracker::api::{ActivityApi, ApiError};
use crate::tracker::TaskClient;

/// What a single notification pass did.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Face was 0 / out of range — stopped whatever ran, nothing started.
    Cleared,
    /// Started the activity mapped to this face.
    Started { face: u8, project: i64 },
    /// Valid face with no mapping entry — reported, nothing running now.
    Unmapped { face: u8 },
}

/// Resolves an activity description when the mapping entry leaves it empty.
#[async_trait]
pub trait DescriptionPrompt: Send + Sync {
    async fn description(&self) -> String;
}

/// Asks on the terminal, blocking off the async runtime.
pub struct ConsolePrompt;

#[async_trait]
impl DescriptionPrompt for ConsolePrompt {
    async fn description(&self) -> String {
        tokio::task::spawn_blocking(|| {
            use std::io::Write;
            print!("What are you working on? ");
            std::io::stdout().flush().ok();
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).ok();
            line.trim().to_string()
        })
        .await
        .unwrap_or_default()
    }
}

pub struct Router<A: ActivityApi, P: DescriptionPrompt> {
    mapping: Vec<MappingEntry>,
    client: Arc<TaskClient<A>>,
    prompt: P,
    // Serializes notification passes: two stop-then-start pairs must never
    // interleave.
    gate: tokio::sync::Mutex<()>,
}

impl<A: ActivityApi, P: DescriptionPrompt> Router<A, P> {
    pub fn new(mapping: Vec<MappingEntry>, client: Arc<TaskClient<A>>, prompt: P) -> Self {
        Self {
            mapping,
            client,
            prompt,
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Handle one orientation notification.
    ///
    /// Out-of-range faces (flat, in motion, unknown) stop the current
    /// activity and nothing else. A valid face always stops first, then
    /// starts the mapped activity if one is configured. A start failure
    /// propagates; the stop has already run, so local state stays accurate.
    pub async fn on_orientation(&self, face: u8) -> Result<Outcome, ApiError> {
        let _pass = self.gate.lock().await;
        debug!(face, "orientation notification");

        if !FACE_RANGE.contains(&face) {
            self.client.stop_current().await;
            return Ok(Outcome::Cleared);
        }

        self.client.stop_current().await;

        let Some(entry) = self.mapping.iter().find(|m| m.face == face) else {
            warn!(face, "no task assigned for this face");
            return Ok(Outcome::Unmapped { face });
        };

        let description = if entry.description.is_empty() {
            self.prompt.description().await
        } else {
            entry.description.clone()
        };

        self.client.start(entry.project, &description).await?;
        Ok(Outcome::Started {
            face,
            project: entry.project,
        })
    }
}
