//! Credential rotation — one provider surface over a pool of equivalent keys.
//!
//! Upstream model hosts rate-limit per credential. `RotatingProvider` hides
//! that behind the ordinary `Provider` trait: on a rate-limit-class failure it
//! advances a circular cursor over the pool and retries with the next key,
//! bounded by `pool_size × 2` total attempts. Any other failure class is
//! re-raised immediately without rotation.
//!
//! The pool itself is a plain value with a pure transition function, so the
//! rotation policy is unit-testable without any network.

use raita_core::error::ProviderError;
use raita_core::provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// An ordered pool of interchangeable credentials with a circular cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPool {
    keys: Vec<String>,
    cursor: usize,
}

impl CredentialPool {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The credential the cursor currently points at.
    pub fn current(&self) -> Option<&str> {
        self.keys.get(self.cursor).map(|k| k.as_str())
    }

    /// The current cursor position (always in range while non-empty).
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Pure rotation transition: the same pool with the cursor advanced
    /// circularly by one.
    pub fn advanced(&self) -> Self {
        if self.keys.is_empty() {
            return self.clone();
        }
        Self {
            keys: self.keys.clone(),
            cursor: (self.cursor + 1) % self.keys.len(),
        }
    }

    /// Total attempt budget for a single call: every key gets two chances.
    pub fn max_attempts(&self) -> usize {
        self.keys.len() * 2
    }
}

/// Builds a provider handle bound to one credential.
pub type CredentialFactory = dyn Fn(&str) -> Arc<dyn Provider> + Send + Sync;

/// A provider that rotates through a credential pool on rate-limit failures.
pub struct RotatingProvider {
    name: String,
    factory: Arc<CredentialFactory>,
    pool: Arc<Mutex<CredentialPool>>,
}

impl RotatingProvider {
    /// Create a rotating provider from a pool of keys and a factory that
    /// binds one key to a concrete provider handle.
    pub fn new(
        name: impl Into<String>,
        keys: Vec<String>,
        factory: impl Fn(&str) -> Arc<dyn Provider> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
            pool: Arc::new(Mutex::new(CredentialPool::new(keys))),
        }
    }

    /// Convenience constructor: a rotating pool of Groq credentials.
    pub fn groq(keys: Vec<String>) -> Self {
        Self::new("groq-rotating", keys, |key| {
            Arc::new(crate::openai_compat::OpenAiCompatProvider::groq(key))
        })
    }

    /// The current cursor position (exposed for tests and diagnostics).
    pub fn cursor(&self) -> usize {
        self.pool.lock().map(|p| p.cursor()).unwrap_or(0)
    }

    /// Snapshot the current key, or fail if the pool is empty.
    fn current_key(pool: &Mutex<CredentialPool>) -> Result<String, ProviderError> {
        let guard = pool
            .lock()
            .map_err(|_| ProviderError::NotConfigured("credential pool poisoned".into()))?;
        guard
            .current()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::NotConfigured("no credentials configured".into()))
    }

    /// Apply the pure rotation transition to the shared pool.
    fn rotate(pool: &Mutex<CredentialPool>) {
        if let Ok(mut guard) = pool.lock() {
            let next = guard.advanced();
            *guard = next;
        }
    }

    fn attempt_budget(&self) -> Result<usize, ProviderError> {
        let guard = self
            .pool
            .lock()
            .map_err(|_| ProviderError::NotConfigured("credential pool poisoned".into()))?;
        if guard.is_empty() {
            return Err(ProviderError::NotConfigured(
                "no credentials configured".into(),
            ));
        }
        Ok(guard.max_attempts())
    }
}

#[async_trait]
impl Provider for RotatingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let max_attempts = self.attempt_budget()?;

        for attempt in 1..=max_attempts {
            let key = Self::current_key(&self.pool)?;
            let provider = (self.factory)(&key);

            debug!(attempt, max_attempts, cursor = self.cursor(), "Invoking provider");

            match provider.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_rate_limit() => {
                    warn!(attempt, cursor = self.cursor(), "Rate limited, rotating credential");
                    Self::rotate(&self.pool);
                }
                Err(e) => return Err(e),
            }
        }

        Err(ProviderError::CredentialsExhausted {
            attempts: max_attempts,
        })
    }

    /// Streaming with the same rotation policy.
    ///
    /// A rate-limit failure can also surface mid-stream, after some deltas
    /// were already forwarded downstream. The fresh attempt after rotation
    /// restarts from an empty response, so consumers must treat the delta
    /// sequence as at-least-once across a rotation boundary — already-seen
    /// text may repeat. There is no resume cursor.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let max_attempts = self.attempt_budget()?;
        let factory = Arc::clone(&self.factory);
        let pool = Arc::clone(&self.pool);

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            'attempts: for attempt in 1..=max_attempts {
                let key = match Self::current_key(&pool) {
                    Ok(k) => k,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };
                let provider = factory(&key);

                let mut inner = match provider.stream(request.clone()).await {
                    Ok(rx) => rx,
                    Err(e) if e.is_rate_limit() => {
                        warn!(attempt, "Rate limited before first delta, rotating credential");
                        Self::rotate(&pool);
                        continue 'attempts;
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };

                while let Some(item) = inner.recv().await {
                    match item {
                        Ok(chunk) => {
                            if tx.send(Ok(chunk)).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        Err(e) if e.is_rate_limit() => {
                            warn!(attempt, "Rate limited mid-stream, rotating credential");
                            Self::rotate(&pool);
                            continue 'attempts;
                        }
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }

                // Inner stream completed normally.
                return;
            }

            let _ = tx
                .send(Err(ProviderError::CredentialsExhausted {
                    attempts: max_attempts,
                }))
                .await;
        });

        Ok(rx)
    }
}
