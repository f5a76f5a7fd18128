use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;

use crate::api::{ApiError, AuthPayload, User};
use crate::storage;

/// The authenticated identity, absent for anonymous browsing.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: User,
}

/// Owns the current session and keeps the persisted copy in sync. Callers
/// read the session at render time rather than holding onto a clone, so a
/// login or logout shows up on the next render.
pub struct Manager {
    store: Arc<storage::Store>,
    current: RwLock<Option<Session>>,
}

impl Manager {
    pub fn new(store: Arc<storage::Store>) -> Self {
        Self {
            store,
            current: RwLock::new(None),
        }
    }

    /// Restores the session persisted by a previous run, if any. A stored
    /// user blob that no longer parses is dropped rather than carried as a
    /// broken session.
    pub fn load_existing(&self) -> Result<()> {
        let Some((token, user_json)) = self.store.load_session()? else {
            return Ok(());
        };
        match serde_json::from_str::<User>(&user_json) {
            Ok(user) => {
                *self.current.write() = Some(Session { token, user });
            }
            Err(_) => {
                self.store.clear_session()?;
            }
        }
        Ok(())
    }

    pub fn current(&self) -> Option<Session> {
        self.current.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn token(&self) -> Option<String> {
        self.current.read().as_ref().map(|session| session.token.clone())
    }

    /// Client-side precondition for mutating calls.
    pub fn require_token(&self) -> Result<String, ApiError> {
        self.token().ok_or(ApiError::MissingToken)
    }

    pub fn user_id(&self) -> Option<u64> {
        self.current.read().as_ref().map(|session| session.user.id)
    }

    /// Installs the payload of a successful login or register and persists
    /// it for the next run.
    pub fn install(&self, payload: AuthPayload) -> Result<()> {
        let user_json =
            serde_json::to_string(&payload.user).context("session: serialize user")?;
        self.store.save_session(&payload.token, &user_json)?;
        *self.current.write() = Some(Session {
            token: payload.token,
            user: payload.user,
        });
        Ok(())
    }

    /// Logout: drops the in-memory session and the persisted entries.
    pub fn clear(&self) -> Result<()> {
        self.store.clear_session()?;
        *self.current.write() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::mock::user;
    use tempfile::tempdir;

    fn open_manager(path: &std::path::Path) -> Manager {
        let store = Arc::new(
            storage::Store::open(storage::Options {
                path: Some(path.to_path_buf()),
            })
            .unwrap(),
        );
        Manager::new(store)
    }

    #[test]
    fn install_persists_across_managers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");

        let manager = open_manager(&path);
        manager
            .install(AuthPayload {
                token: "tok".into(),
                user: user(5, "sara"),
            })
            .unwrap();
        assert!(manager.is_authenticated());
        assert_eq!(manager.user_id(), Some(5));

        let restored = open_manager(&path);
        assert!(!restored.is_authenticated());
        restored.load_existing().unwrap();
        let session = restored.current().expect("restored session");
        assert_eq!(session.token, "tok");
        assert_eq!(session.user.username, "sara");
    }

    #[test]
    fn clear_removes_session_everywhere() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");

        let manager = open_manager(&path);
        manager
            .install(AuthPayload {
                token: "tok".into(),
                user: user(5, "sara"),
            })
            .unwrap();
        manager.clear().unwrap();
        assert!(manager.current().is_none());
        assert!(matches!(
            manager.require_token(),
            Err(ApiError::MissingToken)
        ));

        let restored = open_manager(&path);
        restored.load_existing().unwrap();
        assert!(restored.current().is_none());
    }
}
