//! Fallback manager: rotates through a priority-ordered list of provider
//! configs, retrying each before moving to the next, so a single
//! provider outage doesn't surface as a hard `ProviderError` to the
//! caller. Consulted by `LeafAgent` in place of calling its provider
//! directly.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::provider::{Chunk, CompletionOptions, Provider, ProviderMessage};
use crate::error::{CoreError, Result};
use crate::stream::Reader;

#[derive(Clone)]
pub struct FallbackManager {
    providers: Vec<Arc<dyn Provider>>,
    retries_per_provider: u32,
    retry_delay: Duration,
}

impl FallbackManager {
    /// `providers` is tried in order; the first entry is the primary.
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        FallbackManager {
            providers,
            retries_per_provider: 1,
            retry_delay: Duration::from_millis(200),
        }
    }

    pub fn with_retries_per_provider(mut self, n: u32) -> Self {
        self.retries_per_provider = n;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn push_provider(&mut self, provider: Arc<dyn Provider>) {
        self.providers.push(provider);
    }

    /// Tries each provider in order, retrying each up to
    /// `retries_per_provider` times before moving on. Returns the last
    /// error seen once every provider is exhausted.
    pub async fn stream(&self, messages: &[ProviderMessage], options: &CompletionOptions) -> Result<Reader<Chunk>> {
        let mut last_err = CoreError::ProviderError("no providers configured".into());
        for (provider_index, provider) in self.providers.iter().enumerate() {
            for attempt in 0..=self.retries_per_provider {
                match provider.stream(messages, options).await {
                    Ok(reader) => return Ok(reader),
                    Err(e) => {
                        warn!(provider_index, attempt, error = %e, "provider call failed");
                        last_err = e;
                        if attempt < self.retries_per_provider {
                            tokio::time::sleep(self.retry_delay).await;
                        }
                    }
                }
            }
        }
        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::super::provider::{CompletionOptions, Response};
    use crate::stream::pipe;

    struct FlakyProvider {
        fails: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Provider for FlakyProvider {
        async fn complete(&self, _messages: &[ProviderMessage], _options: &CompletionOptions) -> Result<Response> {
            unimplemented!()
        }

        async fn stream(&self, _messages: &[ProviderMessage], _options: &CompletionOptions) -> Result<Reader<Chunk>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fails {
                return Err(CoreError::ProviderError("simulated outage".into()));
            }
            let (mut writer, reader) = pipe(4);
            writer.close();
            Ok(reader)
        }
    }

    #[tokio::test]
    async fn retries_before_falling_back_to_the_next_provider() {
        let primary = Arc::new(FlakyProvider { fails: 5, calls: AtomicU32::new(0) });
        let backup = Arc::new(FlakyProvider { fails: 0, calls: AtomicU32::new(0) });
        let manager = FallbackManager::new(vec![primary.clone(), backup.clone()]).with_retries_per_provider(1);

        let result = manager.stream(&[], &CompletionOptions::default()).await;
        assert!(result.is_ok());
        assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
        assert_eq!(backup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn surfaces_the_last_error_once_every_provider_is_exhausted() {
        let only = Arc::new(FlakyProvider { fails: 10, calls: AtomicU32::new(0) });
        let manager = FallbackManager::new(vec![only]).with_retries_per_provider(1).with_retry_delay(Duration::from_millis(1));

        let result = manager.stream(&[], &CompletionOptions::default()).await;
        assert!(result.is_err());
    }
}
