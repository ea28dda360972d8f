use crate::session::{AuthStore, TokenStore, REFRESH_TOKEN_KEY, TOKEN_KEY};

/// Restore the persisted session into `auth`, once, before any guarded view runs.
///
/// Both keys must be present; otherwise the session is left empty. A missing
/// session is a normal unauthenticated start, not an error. Returns whether the
/// session was hydrated.
pub fn hydrate_session(auth: &AuthStore) -> bool {
    let token = auth.storage().get(TOKEN_KEY);
    let refresh = auth.storage().get(REFRESH_TOKEN_KEY);

    match (token, refresh) {
        (Some(token), Some(refresh)) if !token.is_empty() && !refresh.is_empty() => {
            tracing::debug!("hydrating session tokens from storage");
            auth.hydrate(&token, &refresh);
            true
        }
        _ => {
            tracing::debug!("no stored session tokens");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hydrate_with_both_keys() {
        let auth = AuthStore::in_memory();
        auth.storage().set(TOKEN_KEY, "t1").unwrap();
        auth.storage().set(REFRESH_TOKEN_KEY, "r1").unwrap();

        assert!(hydrate_session(&auth));
        let session = auth.snapshot();
        assert!(session.is_authenticated());
        assert_eq!(session.token(), Some("t1"));
        assert_eq!(session.refresh_token(), Some("r1"));
    }

    #[test]
    fn test_no_keys_leaves_session_empty() {
        let auth = AuthStore::in_memory();
        assert!(!hydrate_session(&auth));
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn test_only_token_key_is_not_enough() {
        let auth = AuthStore::in_memory();
        auth.storage().set(TOKEN_KEY, "t1").unwrap();
        assert!(!hydrate_session(&auth));
        assert!(!auth.is_authenticated());
        assert_eq!(auth.access_token(), None);
    }

    #[test]
    fn test_hydration_after_credentials_persisted() {
        // A previous process signed in; a fresh store picks the session up.
        let first = AuthStore::in_memory();
        first
            .set_credentials(&crate::session::Credentials::new("a", "b"))
            .unwrap();
        let stored_token = first.storage().get(TOKEN_KEY).unwrap();
        let stored_refresh = first.storage().get(REFRESH_TOKEN_KEY).unwrap();

        let second = AuthStore::in_memory();
        second.storage().set(TOKEN_KEY, &stored_token).unwrap();
        second.storage().set(REFRESH_TOKEN_KEY, &stored_refresh).unwrap();
        assert!(hydrate_session(&second));
        assert_eq!(second.access_token().as_deref(), Some("a"));
    }
}
