use std::sync::Arc;

use {
    dashmap::DashMap,
    tokio::sync::Mutex,
    tracing::{debug, info},
};

use wxgate_common::{Clock, Result};

use crate::types::{CachedCredential, UserToken};

/// One cached credential. The lock is held across the refresh so concurrent
/// misses on the same slot issue a single remote call.
pub struct Slot<T> {
    name: &'static str,
    inner: Mutex<Option<CachedCredential<T>>>,
}

impl<T: Clone> Slot<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Mutex::new(None),
        }
    }

    /// Return the cached value if fresh, otherwise run `refresh` and store its
    /// result. A failed refresh leaves the previous entry untouched.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        clock: &dyn Clock,
        window: u64,
        refresh: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut guard = self.inner.lock().await;
        let now = clock.now_secs();
        if let Some(cached) = guard.as_ref() {
            if cached.is_fresh(now, window) {
                debug!(slot = self.name, age = cached.age(now), "cache hit");
                return Ok(cached.value.clone());
            }
            debug!(slot = self.name, age = cached.age(now), "cache stale");
        }

        let value = refresh().await?;
        *guard = Some(CachedCredential::new(value.clone(), now));
        info!(slot = self.name, "credential refreshed");
        Ok(value)
    }

    /// True when nothing has ever been stored and no refresh is running.
    fn is_vacant(&self) -> bool {
        self.inner.try_lock().is_ok_and(|g| g.is_none())
    }

    /// Current contents, fresh or stale, without touching the network.
    pub async fn snapshot(&self) -> Option<CachedCredential<T>> {
        self.inner.lock().await.clone()
    }
}

/// All mutable credential state of one client.
pub struct CredentialStore {
    pub(crate) app_token: Slot<String>,
    user_tokens: DashMap<String, Arc<Slot<UserToken>>>,
    pub(crate) ticket: Slot<String>,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        Self {
            app_token: Slot::new("app_token"),
            user_tokens: DashMap::new(),
            ticket: Slot::new("jsapi_ticket"),
        }
    }

    /// Slot for one authorization code, created empty on first use.
    pub(crate) fn user_slot(&self, code: &str) -> Arc<Slot<UserToken>> {
        self.user_tokens
            .entry(code.to_string())
            .or_insert_with(|| Arc::new(Slot::new("user_token")))
            .value()
            .clone()
    }

    pub(crate) fn existing_user_slot(&self, code: &str) -> Option<Arc<Slot<UserToken>>> {
        self.user_tokens.get(code).map(|s| Arc::clone(s.value()))
    }

    /// Drop the slot for `code` if it never held a token and nobody else is
    /// using it. Codes are single-use, so failed exchanges must not pile up.
    pub(crate) fn release_user_slot(&self, code: &str) {
        let removed = self
            .user_tokens
            .remove_if(code, |_, slot| Arc::strong_count(slot) == 1 && slot.is_vacant());
        if removed.is_some() {
            debug!("released empty user token slot");
        }
    }

    pub fn user_token_count(&self) -> usize {
        self.user_tokens.len()
    }
}
