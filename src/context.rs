//! Process-wide component registry built once from configuration.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::SemanticCache;
use crate::catalog::ModelCatalog;
use crate::config::{ConfigError, RoutewiseConfig};
use crate::outcomes::{DecisionStore, SqliteDecisionStore};
use crate::pipeline::{PipelineBuilder, PipelineOrchestrator};
use crate::routing::{retrain_loop, LearnedRouter, Router, RuleBasedRouter};

/// Shared core components.
///
/// Construction is the only fallible step; everything built here degrades
/// at runtime instead of failing.
pub struct CoreContext {
    pub config: RoutewiseConfig,
    pub catalog: ModelCatalog,
    pub store: Arc<dyn DecisionStore>,
    pub router: Arc<Router>,
    pub learned: Option<Arc<LearnedRouter>>,
    pub cache: Arc<SemanticCache>,
}

impl CoreContext {
    pub fn from_config(config: RoutewiseConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let catalog = config.catalog()?;

        let store_error = |path: String, message: String| ConfigError::Store { path, message };
        let store: Arc<dyn DecisionStore> = match &config.learning.database_path {
            Some(path) => Arc::new(
                SqliteDecisionStore::open(path)
                    .map_err(|e| store_error(path.display().to_string(), e.to_string()))?,
            ),
            None => Arc::new(
                SqliteDecisionStore::open_in_memory()
                    .map_err(|e| store_error(":memory:".to_string(), e.to_string()))?,
            ),
        };

        let rules = RuleBasedRouter::new(catalog.clone(), config.routing.clone())?;
        let (router, learned) = if config.learning.enabled {
            let learned = Arc::new(LearnedRouter::new(
                rules,
                store.clone(),
                config.learning.clone(),
            ));
            if let Some(path) = config.learning.model_path.as_deref().filter(|p| p.exists()) {
                if let Err(e) = learned.load_model(path) {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Ignoring saved router model"
                    );
                }
            }
            (Router::learned(learned.clone(), store.clone()), Some(learned))
        } else {
            (Router::rule_based(rules, store.clone()), None)
        };

        let cache = SemanticCache::from_config(&config.cache)?;

        tracing::info!(
            backends = catalog.len(),
            router = router.kind(),
            cache_enabled = cache.is_enabled(),
            semantic_search = cache.semantic_search_available(),
            "Core context initialized"
        );

        Ok(Self {
            config,
            catalog,
            store,
            router: Arc::new(router),
            learned,
            cache: Arc::new(cache),
        })
    }

    /// Pipeline builder pre-wired with this context's router, cache and
    /// pipeline settings. Collaborators are added by the caller.
    pub fn pipeline(&self) -> PipelineBuilder {
        PipelineOrchestrator::builder(self.catalog.clone(), self.config.routing.clone())
            .config(self.config.pipeline.clone())
            .cache(self.cache.clone())
            .router(self.router.clone())
            .content_logging(self.config.logging.content_preview_limit())
    }

    /// Start the periodic retrain loop when the learned router is in use
    pub fn spawn_retrain_loop(&self, cancel_token: CancellationToken) -> Option<JoinHandle<()>> {
        let learned = self.learned.clone()?;
        let interval = Duration::from_secs(self.config.learning.retrain_interval_seconds.max(1));
        Some(tokio::spawn(retrain_loop(learned, interval, cancel_token)))
    }
}
