// Email/password authentication with stored sessions
//
// Passwords are salted and SHA-256 digested; sessions are random uuid
// tokens with a 24-hour expiry in the sessions table. Session presence
// gates every card endpoint on the HTTP surface.

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};

use crate::composer::is_valid_email;
use crate::error::AuthError;
use crate::store::{AuthStore, SessionRecord, StoreError};

/// Sessions live for 24 hours from sign-in.
pub const SESSION_TTL_HOURS: i64 = 24;

const MIN_PASSWORD_LEN: usize = 8;

fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b"\0");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn store_err(e: StoreError) -> AuthError {
    AuthError::Unavailable(e.to_string())
}

/// Register a new account. The email must be a valid address and the
/// password at least eight characters.
pub fn sign_up(store: &dyn AuthStore, email: &str, password: &str) -> Result<i64, AuthError> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AuthError::InvalidInput("not a valid email address".to_string()));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AuthError::InvalidInput(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let salt = uuid::Uuid::new_v4().simple().to_string();
    let hash = hash_password(password, &salt);

    match store.insert_user(&email, &hash, &salt) {
        Ok(id) => Ok(id),
        Err(StoreError::DuplicateKey) => Err(AuthError::EmailTaken),
        Err(e) => Err(store_err(e)),
    }
}

/// Verify credentials and open a session, returning its token.
pub fn sign_in(store: &dyn AuthStore, email: &str, password: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();

    let user = store
        .find_user(&email)
        .map_err(store_err)?
        .ok_or(AuthError::InvalidCredentials)?;

    if hash_password(password, &user.salt) != user.password_hash {
        return Err(AuthError::InvalidCredentials);
    }

    let token = uuid::Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::hours(SESSION_TTL_HOURS);
    store
        .insert_session(&token, user.id, expires_at)
        .map_err(store_err)?;

    Ok(token)
}

/// Look up a live session. Expired or unknown tokens yield None.
pub fn current_session(
    store: &dyn AuthStore,
    token: &str,
) -> Result<Option<SessionRecord>, AuthError> {
    let session = store.find_session(token).map_err(store_err)?;

    match session {
        Some(s) if s.expires_at > Utc::now() => Ok(Some(s)),
        Some(s) => {
            // Expired: drop the row so the table does not accumulate.
            let _ = store.delete_session(&s.token);
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Close a session. Unknown tokens are a no-op.
pub fn sign_out(store: &dyn AuthStore, token: &str) -> Result<(), AuthError> {
    store.delete_session(token).map_err(store_err)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    #[test]
    fn test_sign_up_and_sign_in() {
        let store = SqliteStore::open_in_memory().unwrap();

        sign_up(&store, "taro@example.com", "correct horse").unwrap();
        let token = sign_in(&store, "taro@example.com", "correct horse").unwrap();

        let session = current_session(&store, &token).unwrap().unwrap();
        assert_eq!(session.email, "taro@example.com");
    }

    #[test]
    fn test_sign_up_rejects_bad_input() {
        let store = SqliteStore::open_in_memory().unwrap();

        assert!(matches!(
            sign_up(&store, "not-an-email", "long enough password"),
            Err(AuthError::InvalidInput(_))
        ));
        assert!(matches!(
            sign_up(&store, "taro@example.com", "short"),
            Err(AuthError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_sign_up_duplicate_email() {
        let store = SqliteStore::open_in_memory().unwrap();

        sign_up(&store, "taro@example.com", "correct horse").unwrap();
        assert!(matches!(
            sign_up(&store, "TARO@example.com", "another password"),
            Err(AuthError::EmailTaken)
        ));
    }

    #[test]
    fn test_sign_in_wrong_password() {
        let store = SqliteStore::open_in_memory().unwrap();

        sign_up(&store, "taro@example.com", "correct horse").unwrap();
        assert!(matches!(
            sign_in(&store, "taro@example.com", "wrong horse"),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            sign_in(&store, "nobody@example.com", "correct horse"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_sign_out_closes_session() {
        let store = SqliteStore::open_in_memory().unwrap();

        sign_up(&store, "taro@example.com", "correct horse").unwrap();
        let token = sign_in(&store, "taro@example.com", "correct horse").unwrap();

        sign_out(&store, &token).unwrap();
        assert!(current_session(&store, &token).unwrap().is_none());
    }

    #[test]
    fn test_expired_session_is_not_current() {
        let store = SqliteStore::open_in_memory().unwrap();
        sign_up(&store, "taro@example.com", "correct horse").unwrap();
        let user_id = store.find_user("taro@example.com").unwrap().unwrap().id;

        // Insert a session that expired an hour ago.
        store
            .insert_session("stale-token", user_id, Utc::now() - Duration::hours(1))
            .unwrap();

        assert!(current_session(&store, "stale-token").unwrap().is_none());
    }

    #[test]
    fn test_salts_differ_between_accounts() {
        let store = SqliteStore::open_in_memory().unwrap();

        sign_up(&store, "a@example.com", "same password").unwrap();
        sign_up(&store, "b@example.com", "same password").unwrap();

        let a = store.find_user("a@example.com").unwrap().unwrap();
        let b = store.find_user("b@example.com").unwrap().unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.password_hash, b.password_hash);
    }
}
