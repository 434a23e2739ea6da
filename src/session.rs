//! Per-browser state carried between requests.
//!
//! Handlers receive a [`SessionContext`] extracted from the `sid` cookie,
//! mutate its `data`, and hand it back through [`SessionContext::respond`],
//! which stores the data and sets the cookie for new sessions.

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use log::debug;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const COOKIE_NAME: &str = "sid";

/// Sessions idle longer than this are dropped on the next write.
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on stored sessions; the least recently used go first.
pub const MAX_SESSIONS: usize = 1024;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub columns: Vec<String>,
    pub preview_html: Option<String>,
    pub query: Option<String>,
    pub search_results: Option<serde_json::Value>,
    pub extracted_info: Option<String>,
}

struct Entry {
    session: Session,
    touched: Instant,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<Uuid, Entry>>>,
    max_sessions: usize,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_limits(MAX_SESSIONS, SESSION_TTL)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_sessions: usize, ttl: Duration) -> Self {
        Self {
            inner: Arc::default(),
            max_sessions: max_sessions.max(1),
            ttl,
        }
    }

    /// Reading a session counts as activity.
    pub fn get(&self, id: &Uuid) -> Option<Session> {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let entry = map.get_mut(id)?;
        entry.touched = Instant::now();
        Some(entry.session.clone())
    }

    pub fn put(&self, id: Uuid, session: Session) {
        let now = Instant::now();
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let ttl = self.ttl;
        map.retain(|_, e| now.duration_since(e.touched) < ttl);
        if !map.contains_key(&id) && map.len() >= self.max_sessions {
            let oldest = map.iter().min_by_key(|(_, e)| e.touched).map(|(k, _)| *k);
            if let Some(k) = oldest {
                debug!("session store full, evicting {}", k);
                map.remove(&k);
            }
        }
        map.insert(id, Entry { session, touched: now });
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct SessionContext {
    pub id: Uuid,
    pub data: Session,
    is_new: bool,
    store: SessionStore,
}

impl SessionContext {
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Persist `data` and attach the session cookie when it was just created.
    /// A new session with nothing in it is neither stored nor sent.
    pub fn respond(self, body: impl IntoResponse) -> Response {
        let mut res = body.into_response();
        if self.is_new && self.data == Session::default() {
            return res;
        }
        self.store.put(self.id, self.data);
        if self.is_new {
            let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", COOKIE_NAME, self.id);
            if let Ok(v) = HeaderValue::from_str(&cookie) {
                res.headers_mut().append(SET_COOKIE, v);
            }
        }
        res
    }
}

fn cookie_session_id(parts: &Parts) -> Option<Uuid> {
    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix("sid="))
        .find_map(|id| Uuid::parse_str(id).ok())
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionContext
where
    SessionStore: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let store = SessionStore::from_ref(state);
        let existing = cookie_session_id(parts).and_then(|id| store.get(&id).map(|s| (id, s)));
        Ok(match existing {
            Some((id, data)) => SessionContext {
                id,
                data,
                is_new: false,
                store,
            },
            None => SessionContext {
                id: Uuid::new_v4(),
                data: Session::default(),
                is_new: true,
                store,
            },
        })
    }
}
