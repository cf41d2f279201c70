// src/services/sessions.rs

use std::{sync::Arc, time::Duration};

use crate::{
    error::{AppError, AppResult},
    ports::KeyValueStore,
    utils::token,
};

/// Result of checking a presented portal token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCheck {
    /// Matched; the session TTL was slid forward.
    Valid,
    /// No session for this candidate, or it timed out.
    Expired,
    /// A session exists but holds a different token.
    Mismatch,
}

/// Short-lived tokens kept in the TTL store: magic links, login throttles
/// and candidate portal sessions.
#[derive(Clone)]
pub struct SessionTokens {
    kv: Arc<dyn KeyValueStore>,
    magic_link_ttl: Duration,
    portal_ttl: Duration,
    login_throttle: Duration,
}

fn magic_link_key(email: &str) -> String {
    format!("magic_link:{email}")
}

fn portal_key(email: &str) -> String {
    format!("portal:{email}")
}

fn throttle_key(email: &str) -> String {
    format!("login_rate_limit:{email}")
}

impl SessionTokens {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        magic_link_ttl: Duration,
        portal_ttl: Duration,
        login_throttle: Duration,
    ) -> Self {
        Self {
            kv,
            magic_link_ttl,
            portal_ttl,
            login_throttle,
        }
    }

    /// One login request per email per throttle window.
    pub async fn throttle_login(&self, email: &str) -> AppResult<()> {
        let admitted = self
            .kv
            .put_if_absent(&throttle_key(email), "1", self.login_throttle)
            .await?;
        if !admitted {
            return Err(AppError::TooManyRequests(
                "Please wait before requesting another login link".to_string(),
            ));
        }
        Ok(())
    }

    /// Issues a fresh magic-link token, replacing any outstanding one.
    pub async fn issue_magic_link(&self, email: &str) -> AppResult<String> {
        let token = token::magic_link_token();
        self.kv.put(&magic_link_key(email), &token, self.magic_link_ttl).await?;
        Ok(token)
    }

    /// Consumes the token. Succeeds at most once per issued token.
    pub async fn redeem_magic_link(&self, email: &str, token: &str) -> AppResult<()> {
        if self.kv.take_if_eq(&magic_link_key(email), token).await? {
            Ok(())
        } else {
            Err(AppError::invalid_token())
        }
    }

    /// Opens a portal session. A previous session for the same candidate is
    /// replaced.
    pub async fn issue_portal_session(&self, email: &str) -> AppResult<String> {
        let token = token::portal_token();
        self.kv.put(&portal_key(email), &token, self.portal_ttl).await?;
        Ok(token)
    }

    /// Checks the token and, when it matches, extends the session.
    pub async fn check_portal_session(&self, email: &str, token: &str) -> AppResult<TokenCheck> {
        let key = portal_key(email);
        if self.kv.touch_if_eq(&key, token, self.portal_ttl).await? {
            return Ok(TokenCheck::Valid);
        }
        Ok(match self.kv.get(&key).await? {
            Some(_) => TokenCheck::Mismatch,
            None => TokenCheck::Expired,
        })
    }

    pub async fn require_portal_session(&self, email: &str, token: &str) -> AppResult<()> {
        match self.check_portal_session(email, token).await? {
            TokenCheck::Valid => Ok(()),
            check => {
                tracing::debug!(?check, "portal session rejected");
                Err(AppError::invalid_token())
            }
        }
    }

    /// Ends the session only if `token` is the one currently held.
    pub async fn end_portal_session(&self, email: &str, token: &str) -> AppResult<()> {
        if self.kv.take_if_eq(&portal_key(email), token).await? {
            Ok(())
        } else {
            Err(AppError::invalid_token())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;

    fn tokens() -> SessionTokens {
        SessionTokens::new(
            Arc::new(MemoryStore::new()),
            Duration::from_secs(900),
            Duration::from_secs(900),
            Duration::from_secs(60),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn magic_link_redeems_once() {
        let sessions = tokens();
        let token = sessions.issue_magic_link("a@example.com").await.unwrap();

        sessions.redeem_magic_link("a@example.com", &token).await.unwrap();
        assert!(matches!(
            sessions.redeem_magic_link("a@example.com", &token).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn reissuing_invalidates_the_old_link() {
        let sessions = tokens();
        let first = sessions.issue_magic_link("a@example.com").await.unwrap();
        let second = sessions.issue_magic_link("a@example.com").await.unwrap();

        assert!(sessions.redeem_magic_link("a@example.com", &first).await.is_err());
        assert!(sessions.redeem_magic_link("a@example.com", &second).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn magic_link_expires() {
        let sessions = tokens();
        let token = sessions.issue_magic_link("a@example.com").await.unwrap();
        tokio::time::advance(Duration::from_secs(901)).await;
        assert!(sessions.redeem_magic_link("a@example.com", &token).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn login_is_throttled_per_email() {
        let sessions = tokens();
        sessions.throttle_login("a@example.com").await.unwrap();
        assert!(matches!(
            sessions.throttle_login("a@example.com").await,
            Err(AppError::TooManyRequests(_))
        ));
        sessions.throttle_login("b@example.com").await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        sessions.throttle_login("a@example.com").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn portal_session_slides_while_in_use() {
        let sessions = tokens();
        let token = sessions.issue_portal_session("c@example.com").await.unwrap();

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(600)).await;
            assert_eq!(
                sessions.check_portal_session("c@example.com", &token).await.unwrap(),
                TokenCheck::Valid
            );
        }

        tokio::time::advance(Duration::from_secs(901)).await;
        assert_eq!(
            sessions.check_portal_session("c@example.com", &token).await.unwrap(),
            TokenCheck::Expired
        );
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_token_is_a_mismatch() {
        let sessions = tokens();
        sessions.issue_portal_session("c@example.com").await.unwrap();
        assert_eq!(
            sessions.check_portal_session("c@example.com", "forged").await.unwrap(),
            TokenCheck::Mismatch
        );
        assert!(sessions.require_portal_session("c@example.com", "forged").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn logout_needs_the_current_token() {
        let sessions = tokens();
        let token = sessions.issue_portal_session("c@example.com").await.unwrap();

        assert!(sessions.end_portal_session("c@example.com", "forged").await.is_err());
        sessions.end_portal_session("c@example.com", &token).await.unwrap();
        assert_eq!(
            sessions.check_portal_session("c@example.com", &token).await.unwrap(),
            TokenCheck::Expired
        );
    }
}
