//! Per-conversation dialogue state for the district rename flow.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use teloxide::types::{ChatId, UserId};
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::MAX_NAME_LEN;

/// Represents the conversation state of one chat
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AdminDialogueState {
    #[default]
    Idle,
    AwaitingDistrictName {
        district_id: i64,
    },
}

/// Why a proposed district name was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameError {
    Empty,
    TooLong,
}

/// Validates a district name input
pub fn validate_district_name(name: &str) -> Result<String, NameError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(NameError::Empty);
    }

    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(NameError::TooLong);
    }

    Ok(trimmed.to_string())
}

/// One user's conversation within one chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub chat_id: ChatId,
    pub user_id: UserId,
}

impl SessionKey {
    pub fn new(chat_id: ChatId, user_id: UserId) -> Self {
        Self { chat_id, user_id }
    }
}

/// Upper bound on a session TTL (ten years)
const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone)]
struct Session {
    state: AdminDialogueState,
    updated_at: DateTime<Utc>,
}

/// Dialogue state keyed by chat and user, with expiry.
///
/// A key with no entry, or with an entry older than the TTL, is `Idle`.
pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<SessionKey, Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ttl_secs(secs: u64) -> Self {
        let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(MAX_TTL_SECS);
        Self::new(Duration::seconds(secs))
    }

    fn expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        now - session.updated_at >= self.ttl
    }

    pub async fn get(&self, key: SessionKey) -> AdminDialogueState {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get(&key)
            .map(|session| (session.state.clone(), self.expired(session, now)));

        match entry {
            Some((_, true)) => {
                debug!(chat_id = %key.chat_id, user_id = %key.user_id, "Dialogue session expired");
                sessions.remove(&key);
                AdminDialogueState::Idle
            }
            Some((state, false)) => state,
            None => AdminDialogueState::Idle,
        }
    }

    pub async fn update(&self, key: SessionKey, state: AdminDialogueState) {
        let mut sessions = self.sessions.lock().await;
        if state == AdminDialogueState::Idle {
            sessions.remove(&key);
            return;
        }
        sessions.insert(
            key,
            Session {
                state,
                updated_at: Utc::now(),
            },
        );
    }

    /// Return the conversation to `Idle`
    pub async fn exit(&self, key: SessionKey) {
        self.sessions.lock().await.remove(&key);
    }

    /// Drop every expired entry, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| !self.expired(session, now));
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_district_name_validation() {
        // Valid names
        assert!(validate_district_name("Yunusobod").is_ok());
        assert!(validate_district_name("  Mirzo Ulug'bek  ").is_ok());

        // Invalid names
        assert_eq!(validate_district_name(""), Err(NameError::Empty));
        assert_eq!(validate_district_name("   "), Err(NameError::Empty));
        assert_eq!(
            validate_district_name(&"a".repeat(256)),
            Err(NameError::TooLong)
        );
    }

    #[test]
    fn test_district_name_limit_counts_characters() {
        // 255 two-byte characters fit even though they exceed 255 bytes
        assert!(validate_district_name(&"ў".repeat(255)).is_ok());
    }

    #[test]
    fn test_district_name_trimming() {
        let result = validate_district_name("  Uptown  ");
        assert_eq!(result.unwrap(), "Uptown");
    }

    fn key(chat: i64, user: u64) -> SessionKey {
        SessionKey::new(ChatId(chat), UserId(user))
    }

    #[tokio::test]
    async fn test_sessions_are_scoped_per_chat() {
        let store = SessionStore::with_ttl_secs(600);
        store
            .update(key(1, 10), AdminDialogueState::AwaitingDistrictName { district_id: 7 })
            .await;

        assert_eq!(
            store.get(key(1, 10)).await,
            AdminDialogueState::AwaitingDistrictName { district_id: 7 }
        );
        assert_eq!(store.get(key(2, 10)).await, AdminDialogueState::Idle);
    }

    #[tokio::test]
    async fn test_sessions_are_scoped_per_user_in_a_group() {
        let store = SessionStore::with_ttl_secs(600);
        store
            .update(key(-100, 10), AdminDialogueState::AwaitingDistrictName { district_id: 7 })
            .await;

        assert_eq!(store.get(key(-100, 11)).await, AdminDialogueState::Idle);
        store.exit(key(-100, 11)).await;
        assert_eq!(
            store.get(key(-100, 10)).await,
            AdminDialogueState::AwaitingDistrictName { district_id: 7 }
        );
    }

    #[tokio::test]
    async fn test_exit_returns_to_idle() {
        let store = SessionStore::with_ttl_secs(600);
        store
            .update(key(1, 10), AdminDialogueState::AwaitingDistrictName { district_id: 7 })
            .await;
        store.exit(key(1, 10)).await;

        assert_eq!(store.get(key(1, 10)).await, AdminDialogueState::Idle);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_session_reads_as_idle() {
        let store = SessionStore::with_ttl_secs(0);
        store
            .update(key(1, 10), AdminDialogueState::AwaitingDistrictName { district_id: 7 })
            .await;

        assert_eq!(store.get(key(1, 10)).await, AdminDialogueState::Idle);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = SessionStore::with_ttl_secs(0);
        store
            .update(key(1, 10), AdminDialogueState::AwaitingDistrictName { district_id: 1 })
            .await;
        store
            .update(key(2, 20), AdminDialogueState::AwaitingDistrictName { district_id: 2 })
            .await;

        assert_eq!(store.purge_expired().await, 2);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_updating_to_idle_removes_entry() {
        let store = SessionStore::with_ttl_secs(600);
        store
            .update(key(1, 10), AdminDialogueState::AwaitingDistrictName { district_id: 1 })
            .await;
        store.update(key(1, 10), AdminDialogueState::Idle).await;

        assert!(store.is_empty().await);
    }
}
