//! Sessions and anti-forgery tokens.
//!
//! Each session keeps a small ordered set of tokens with their issue times.
//! Read-only requests pass without a token; anything mutating must present a
//! live one. Expired tokens are evicted lazily, whenever a session is
//! touched, so the token lifetime and count limits hold at every observation.

use crate::config::Config;
use crate::error::AuthError;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use parking_lot::Mutex;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TokenPolicy {
    pub token_ttl: Duration,
    pub max_tokens: usize,
    pub session_ttl: Duration,
}

impl TokenPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            token_ttl: Duration::seconds(config.security.token_ttl_secs as i64),
            max_tokens: config.security.max_tokens,
            session_ttl: Duration::seconds(config.security.session_ttl_secs as i64),
        }
    }
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone)]
struct IssuedToken {
    value: String,
    issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    tokens: Vec<IssuedToken>,
    last_seen: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            tokens: Vec::new(),
            last_seen: now,
        }
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn has_token(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t.value == token)
    }

    /// Mints a fresh token, drops expired ones, and keeps at most
    /// `max_tokens`, discarding the oldest first.
    pub fn issue_token(&mut self, now: DateTime<Utc>, policy: &TokenPolicy) -> String {
        let value = random_hex_token();
        self.tokens.push(IssuedToken {
            value: value.clone(),
            issued_at: now,
        });
        self.tokens.retain(|t| now - t.issued_at <= policy.token_ttl);
        while self.tokens.len() > policy.max_tokens {
            self.tokens.remove(0);
        }
        value
    }

    /// Checks a presented token. An expired token is removed as a side effect
    /// of the failed check.
    pub fn check_token(
        &mut self,
        token: &str,
        now: DateTime<Utc>,
        policy: &TokenPolicy,
    ) -> Result<(), AuthError> {
        if token.is_empty() {
            return Err(AuthError::Missing);
        }
        let Some(pos) = self.tokens.iter().position(|t| t.value == token) else {
            return Err(AuthError::InvalidOrExpired);
        };
        if now - self.tokens[pos].issued_at <= policy.token_ttl {
            return Ok(());
        }
        self.tokens.remove(pos);
        Err(AuthError::InvalidOrExpired)
    }
}

/// 256 random bits as 64 lowercase hex characters.
pub fn random_hex_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Session persistence owned by the login collaborator.
pub trait SessionStore: Send + Sync {
    fn get(&self, id: &str) -> Option<Session>;
    fn put(&self, id: &str, session: Session);
    fn delete(&self, id: &str);
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, id: &str) -> Option<Session> {
        self.sessions.lock().get(id).cloned()
    }

    fn put(&self, id: &str, session: Session) {
        self.sessions.lock().insert(id.to_string(), session);
    }

    fn delete(&self, id: &str) {
        self.sessions.lock().remove(id);
    }
}

pub fn is_read_only(method: &str) -> bool {
    method.eq_ignore_ascii_case("GET") || method.eq_ignore_ascii_case("HEAD")
}

pub struct RequestAuthorizer {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    policy: TokenPolicy,
}

impl RequestAuthorizer {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>, policy: TokenPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    /// Starts a session for an already authenticated user and returns its id.
    pub fn create_session(&self, user_id: &str) -> String {
        let id = random_hex_token();
        self.store.put(&id, Session::new(user_id, self.clock.now()));
        id
    }

    /// Owner of a stored session, without touching its idle timer.
    pub fn user_of(&self, session_id: Option<&str>) -> Option<String> {
        session_id
            .and_then(|id| self.store.get(id))
            .map(|session| session.user_id)
    }

    pub fn end_session(&self, session_id: &str) {
        self.store.delete(session_id);
    }

    /// Loads a live session and refreshes its idle timer.
    pub fn session(&self, session_id: Option<&str>) -> Result<Session, AuthError> {
        let id = session_id
            .filter(|id| !id.is_empty())
            .ok_or(AuthError::Unauthenticated)?;
        let mut session = self.store.get(id).ok_or(AuthError::Unauthenticated)?;
        let now = self.clock.now();
        if now - session.last_seen > self.policy.session_ttl {
            debug!("Session for {} expired", session.user_id);
            self.store.delete(id);
            return Err(AuthError::Unauthenticated);
        }
        session.last_seen = now;
        self.store.put(id, session.clone());
        Ok(session)
    }

    /// Checks that `session_id` names a live session and, for mutating
    /// methods, that `presented_token` is one of its live tokens.
    pub fn authorize(
        &self,
        session_id: Option<&str>,
        presented_token: Option<&str>,
        method: &str,
    ) -> Result<Session, AuthError> {
        let mut session = self.session(session_id)?;
        if is_read_only(method) {
            return Ok(session);
        }

        let token = presented_token.unwrap_or_default();
        let result = session.check_token(token, self.clock.now(), &self.policy);
        if matches!(result, Err(AuthError::InvalidOrExpired))
            && let Some(id) = session_id
        {
            self.store.put(id, session.clone());
        }
        result.map(|_| session)
    }

    pub fn issue_token(&self, session_id: Option<&str>) -> Result<String, AuthError> {
        let mut session = self.session(session_id)?;
        let token = session.issue_token(self.clock.now(), &self.policy);
        if let Some(id) = session_id {
            self.store.put(id, session);
        }
        Ok(token)
    }
}
