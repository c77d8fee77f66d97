//! Provider registry and the cached ability snapshot.

use crate::config::{AbilityConfig, ProvidersConfig};
use crate::demo::{DemoLlm, DemoStt, DemoTts};
use crate::error::ProviderError;
use crate::llm::ChatGpt;
use crate::openai::OpenAiClient;
use crate::provider::{LlmProvider, Provider, SttProvider, TtsProvider};
use crate::stt::Whisper;
use crate::tts::ElevenLabs;
use futures_util::future::{join3, join_all};
use std::sync::Arc;
use std::time::Duration;
use talk_types::{Ability, CapabilityKind, LlmOption, ProviderAbility, SttOption, TtsOption};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// One provider that could not describe itself during a refresh.
#[derive(Debug, Clone)]
pub struct AbilityFailure {
    pub kind: CapabilityKind,
    pub provider: &'static str,
    pub message: String,
}

/// Outcome of [`CapabilityRegistry::refresh_ability`].
#[derive(Debug, Clone)]
pub struct AbilityReport {
    pub ability: Arc<Ability>,
    /// Providers that failed during this refresh. Empty on a cache hit.
    pub failures: Vec<AbilityFailure>,
    /// `true` when the snapshot was served from cache without calling providers.
    pub cached: bool,
}

struct CachedAbility {
    ability: Arc<Ability>,
    expires_at: Instant,
}

/// Registered providers per capability, immutable after construction.
///
/// Selection walks providers in registration order and returns the first one
/// that accepts the requested option.
pub struct CapabilityRegistry {
    llm: Vec<Arc<dyn LlmProvider>>,
    stt: Vec<Arc<dyn SttProvider>>,
    tts: Vec<Arc<dyn TtsProvider>>,
    config: AbilityConfig,
    // Held across a refresh so concurrent callers wait for one round of describes.
    cache: Mutex<Option<CachedAbility>>,
}

impl CapabilityRegistry {
    pub fn new(config: AbilityConfig) -> Self {
        Self {
            llm: Vec::new(),
            stt: Vec::new(),
            tts: Vec::new(),
            config,
            cache: Mutex::new(None),
        }
    }

    pub fn with_llm(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.llm.push(provider);
        self
    }

    pub fn with_stt(mut self, provider: Arc<dyn SttProvider>) -> Self {
        self.stt.push(provider);
        self
    }

    pub fn with_tts(mut self, provider: Arc<dyn TtsProvider>) -> Self {
        self.tts.push(provider);
        self
    }

    /// Registers the providers whose credentials are configured, or the demo
    /// set when demo mode is on.
    pub fn from_config(
        providers: &ProvidersConfig,
        ability: AbilityConfig,
    ) -> Result<Self, ProviderError> {
        let mut registry = Self::new(ability);

        if providers.demo {
            tracing::info!("demo mode: registering demo providers");
            return Ok(registry
                .with_llm(Arc::new(DemoLlm::default()))
                .with_stt(Arc::new(DemoStt::default()))
                .with_tts(Arc::new(DemoTts::default())));
        }

        if !providers.openai.api_key.is_empty() {
            let client = OpenAiClient::new(&providers.openai)?;
            registry = registry
                .with_llm(Arc::new(ChatGpt::new(client.clone())))
                .with_stt(Arc::new(Whisper::new(client)));
        } else {
            tracing::warn!("no OpenAI API key configured; chatGPT and whisper are disabled");
        }

        if !providers.elevenlabs.api_key.is_empty() {
            registry = registry.with_tts(Arc::new(ElevenLabs::new(&providers.elevenlabs)?));
        } else {
            tracing::warn!("no ElevenLabs API key configured; elevenlabs is disabled");
        }

        Ok(registry)
    }

    pub fn select_llm(&self, option: Option<&LlmOption>) -> Option<Arc<dyn LlmProvider>> {
        let option = option?;
        self.llm.iter().find(|p| p.supports(option)).cloned()
    }

    pub fn select_stt(&self, option: Option<&SttOption>) -> Option<Arc<dyn SttProvider>> {
        let option = option?;
        self.stt.iter().find(|p| p.supports(option)).cloned()
    }

    pub fn select_tts(&self, option: Option<&TtsOption>) -> Option<Arc<dyn TtsProvider>> {
        let option = option?;
        self.tts.iter().find(|p| p.supports(option)).cloned()
    }

    /// Names of the registered providers for `kind`, in registration order.
    pub fn provider_names(&self, kind: CapabilityKind) -> Vec<&'static str> {
        match kind {
            CapabilityKind::Llm => self.llm.iter().map(|p| p.name()).collect(),
            CapabilityKind::Stt => self.stt.iter().map(|p| p.name()).collect(),
            CapabilityKind::Tts => self.tts.iter().map(|p| p.name()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.llm.is_empty() && self.stt.is_empty() && self.tts.is_empty()
    }

    /// Returns the cached snapshot, or describes every provider concurrently
    /// and caches the result.
    ///
    /// A snapshot where some providers failed is cached for the shorter
    /// degraded window. When nothing succeeded the result is returned but
    /// not cached.
    pub async fn refresh_ability(&self) -> AbilityReport {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if Instant::now() < cached.expires_at {
                return AbilityReport {
                    ability: cached.ability.clone(),
                    failures: Vec::new(),
                    cached: true,
                };
            }
        }

        let (ability, failures, succeeded) = self.describe_all().await;
        let ability = Arc::new(ability);

        if succeeded > 0 {
            let ttl = if failures.is_empty() {
                self.config.ttl()
            } else {
                self.config.degraded_ttl()
            };
            *cache = Some(CachedAbility {
                ability: ability.clone(),
                expires_at: Instant::now() + ttl,
            });
            tracing::debug!(
                succeeded,
                failed = failures.len(),
                ttl_secs = ttl.as_secs(),
                "ability snapshot refreshed"
            );
        } else {
            *cache = None;
            tracing::warn!(failed = failures.len(), "no provider described itself");
        }

        AbilityReport {
            ability,
            failures,
            cached: false,
        }
    }

    /// Drops the cached snapshot so the next refresh calls every provider.
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    /// Describes every provider, bypassing the cache, and fails if any of them fails.
    pub async fn check_all(&self) -> Result<Arc<Ability>, ProviderError> {
        let (ability, failures, _) = self.describe_all().await;
        if failures.is_empty() {
            return Ok(Arc::new(ability));
        }
        let summary = failures
            .iter()
            .map(|f| format!("{}/{}: {}", f.kind, f.provider, f.message))
            .collect::<Vec<_>>()
            .join("; ");
        Err(ProviderError::CheckFailed {
            failed: failures.len(),
            summary,
        })
    }

    async fn describe_all(&self) -> (Ability, Vec<AbilityFailure>, usize) {
        let timeout = self.config.refresh_timeout();
        let (llm, stt, tts) = join3(
            describe_group(CapabilityKind::Llm, &self.llm, timeout),
            describe_group(CapabilityKind::Stt, &self.stt, timeout),
            describe_group(CapabilityKind::Tts, &self.tts, timeout),
        )
        .await;

        let mut ability = Ability::default();
        let mut failures = Vec::new();
        let mut succeeded = 0;
        for (kind, provider, result) in llm.into_iter().chain(stt).chain(tts) {
            match result {
                Ok(described) => {
                    succeeded += 1;
                    ability.insert(kind, provider, described);
                }
                Err(e) => {
                    tracing::warn!(%kind, provider, error = %e, "provider failed to describe itself");
                    ability.insert(kind, provider, ProviderAbility::default());
                    failures.push(AbilityFailure {
                        kind,
                        provider,
                        message: e.to_string(),
                    });
                }
            }
        }
        (ability, failures, succeeded)
    }
}

type Described = (CapabilityKind, &'static str, Result<ProviderAbility, ProviderError>);

async fn describe_group<P>(kind: CapabilityKind, providers: &[Arc<P>], timeout: Duration) -> Vec<Described>
where
    P: Provider + ?Sized,
{
    join_all(providers.iter().map(|provider| async move {
        let result = match tokio::time::timeout(timeout, provider.describe()).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(timeout)),
        };
        (kind, provider.name(), result)
    }))
    .await
}
