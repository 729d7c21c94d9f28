// SPDX-License-Identifier: MIT
//! Persisted login session.
//!
//! The Hackaru login endpoint hands back session cookies. We keep them in
//! `{data_dir}/session.json` together with their expiry so the daemon can
//! skip the interactive login across restarts while the session is valid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A logged-in session: the cookie header value plus expiry metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Value sent as the `cookie` request header, e.g. `auth_token_id=...`.
    pub cookie: String,
    /// Expiry taken from the `Set-Cookie` attributes. `None` means the server
    /// sent no expiry; treated as valid until the server rejects it.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(t) => t <= Utc::now(),
            None => false,
        }
    }
}

/// File-backed session store.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("session.json"),
        }
    }

    /// Load the persisted session, discarding it when expired or unreadable.
    pub fn load(&self) -> Option<Session> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), err = %e, "cannot read session file");
                return None;
            }
        };
        let session: Session = match serde_json::from_str(&contents) {
            Ok(s) => s,
            Err(e) => {
                warn!(path = %self.path.display(), err = %e, "session file is corrupt — ignoring");
                return None;
            }
        };
        if session.is_expired() {
            debug!("persisted session has expired");
            let _ = std::fs::remove_file(&self.path);
            return None;
        }
        Some(session)
    }

    /// Persist the session. The file is written with mode 0600 on Unix —
    /// it holds the authentication cookie.
    pub fn save(&self, session: &Session) -> std::io::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(session).expect("session serializes");
        std::fs::write(&self.path, json)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms)?;
        }
        Ok(())
    }

    /// Drop the persisted session (used by `cubelinkd login`).
    pub fn clear(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        assert!(store.load().is_none());

        let session = Session {
            cookie: "auth_token_id=abc123".into(),
            expires_at: Some(Utc::now() + Duration::days(30)),
        };
        store.save(&session).unwrap();
        assert_eq!(store.load().unwrap(), session);

        store.clear();
        assert!(store.load().is_none());
    }

    #[test]
    fn expired_session_is_discarded_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = Session {
            cookie: "auth_token_id=stale".into(),
            expires_at: Some(Utc::now() - Duration::hours(1)),
        };
        store.save(&session).unwrap();
        assert!(store.load().is_none());
        // the stale file is removed, not just skipped
        assert!(!dir.path().join("session.json").exists());
    }

    #[test]
    fn session_without_expiry_never_expires_locally() {
        let session = Session {
            cookie: "auth_token_id=xyz".into(),
            expires_at: None,
        };
        assert!(!session.is_expired());
    }

    #[test]
    fn corrupt_file_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("session.json"), "{not json").unwrap();
        let store = SessionStore::new(dir.path());
        assert!(store.load().is_none());
    }
}
