use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::config::{AppConfig, GenerationConfig};
use crate::error::CanonicalError;
use crate::fc::SoftCallModel;
use crate::model::Model;

/// Creates models for one provider.
pub trait ModelFactory: Send + Sync {
    /// Instantiate `model` with the given generation parameters.
    ///
    /// # Errors
    ///
    /// Returns a provider-specific error when the model cannot be created.
    fn new_model(
        &self,
        model: &str,
        config: &GenerationConfig,
    ) -> Result<Box<dyn Model>, CanonicalError>;
}

impl<F> ModelFactory for F
where
    F: Fn(&str, &GenerationConfig) -> Result<Box<dyn Model>, CanonicalError> + Send + Sync,
{
    fn new_model(
        &self,
        model: &str,
        config: &GenerationConfig,
    ) -> Result<Box<dyn Model>, CanonicalError> {
        self(model, config)
    }
}

/// Provider name to [`ModelFactory`] lookup.
///
/// Owned by the application and passed where needed; safe to share across
/// threads.
#[derive(Default)]
pub struct ModelRegistry {
    factories: RwLock<FxHashMap<String, Arc<dyn ModelFactory>>>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}

impl ModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `provider`, returning the factory it replaced.
    pub fn register(
        &self,
        provider: impl Into<String>,
        factory: Arc<dyn ModelFactory>,
    ) -> Option<Arc<dyn ModelFactory>> {
        let provider = provider.into();
        let replaced = self.factories.write().insert(provider.clone(), factory);
        if replaced.is_some() {
            tracing::debug!(provider = %provider, "replaced model factory");
        }
        replaced
    }

    pub fn unregister(&self, provider: &str) -> Option<Arc<dyn ModelFactory>> {
        self.factories.write().remove(provider)
    }

    #[must_use]
    pub fn contains(&self, provider: &str) -> bool {
        self.factories.read().contains_key(provider)
    }

    /// Registered provider names, sorted.
    #[must_use]
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Create `model` through the factory registered for `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError::NoSuchProvider`] for unknown providers and
    /// propagates factory errors.
    pub fn new_model(
        &self,
        provider: &str,
        model: &str,
        config: &GenerationConfig,
    ) -> Result<Box<dyn Model>, CanonicalError> {
        // Release the lock before running the factory.
        let factory = self
            .factories
            .read()
            .get(provider)
            .cloned()
            .ok_or_else(|| CanonicalError::NoSuchProvider(provider.to_string()))?;
        factory.new_model(model, config)
    }

    /// Create `model` and wrap it in tool-call emulation configured from `config`.
    ///
    /// # Errors
    ///
    /// Same as [`ModelRegistry::new_model`].
    pub fn new_softcall_model(
        &self,
        provider: &str,
        model: &str,
        config: &AppConfig,
    ) -> Result<SoftCallModel<Box<dyn Model>>, CanonicalError> {
        let upstream = self.new_model(provider, model, &config.generation)?;
        Ok(SoftCallModel::from_config(upstream, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::canonical::{ChatContext, Content, FinishReason, Role};
    use crate::stream::{StreamContent, StreamOutcome};
    use tokio_util::sync::CancellationToken;

    struct NamedModel(String);

    impl Model for NamedModel {
        fn generate_stream(
            &self,
            _cancel: CancellationToken,
            _chat: ChatContext,
            _input: Content,
        ) -> StreamContent {
            StreamContent::ready(
                Vec::new(),
                StreamOutcome::success(Content::empty(Role::Model), None, FinishReason::Stop),
            )
        }

        fn name(&self) -> &str {
            &self.0
        }
    }

    fn named_factory(prefix: &'static str) -> Arc<dyn ModelFactory> {
        Arc::new(
            move |model: &str, _config: &GenerationConfig| -> Result<Box<dyn Model>, CanonicalError> {
                Ok(Box::new(NamedModel(format!("{prefix}/{model}"))))
            },
        )
    }

    #[test]
    fn unknown_provider_is_reported() {
        let registry = ModelRegistry::new();
        let err = registry
            .new_model("nope", "m", &GenerationConfig::default())
            .err()
            .unwrap();
        assert_eq!(err, CanonicalError::NoSuchProvider("nope".into()));
    }

    #[test]
    fn registered_factory_creates_models() {
        let registry = ModelRegistry::new();
        assert!(registry.register("anthropic", named_factory("a")).is_none());
        let model = registry
            .new_model("anthropic", "claude", &GenerationConfig::default())
            .unwrap();
        assert_eq!(model.name(), "a/claude");
    }

    #[test]
    fn register_replaces_and_unregister_removes() {
        let registry = ModelRegistry::new();
        registry.register("openai", named_factory("first"));
        assert!(registry.register("openai", named_factory("second")).is_some());
        let model = registry
            .new_model("openai", "gpt", &GenerationConfig::default())
            .unwrap();
        assert_eq!(model.name(), "second/gpt");

        assert!(registry.unregister("openai").is_some());
        assert!(!registry.contains("openai"));
        assert!(registry.unregister("openai").is_none());
    }

    #[test]
    fn providers_are_sorted() {
        let registry = ModelRegistry::new();
        registry.register("vertexai", named_factory("v"));
        registry.register("anthropic", named_factory("a"));
        registry.register("openai", named_factory("o"));
        assert_eq!(registry.providers(), ["anthropic", "openai", "vertexai"]);
    }

    #[test]
    fn softcall_model_keeps_upstream_name() {
        let registry = ModelRegistry::new();
        registry.register("ollama", named_factory("ollama"));
        let model = registry
            .new_softcall_model("ollama", "llama3", &AppConfig::default())
            .unwrap();
        assert_eq!(model.name(), "ollama/llama3");
    }

    #[test]
    fn factory_errors_propagate() {
        let registry = ModelRegistry::new();
        registry.register(
            "broken",
            Arc::new(|_: &str, _: &GenerationConfig| -> Result<Box<dyn Model>, CanonicalError> {
                Err(CanonicalError::Config("missing api key".into()))
            }),
        );
        let err = registry
            .new_model("broken", "m", &GenerationConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, CanonicalError::Config(_)));
    }
}
