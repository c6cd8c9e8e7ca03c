//! The session object
//!
//! Owns every scope-bound component and wires the registry's
//! invalidation hooks to the analysis caches at construction, so cascade
//! semantics hold no matter which path mutates the registry.

use std::sync::Arc;

use spectra_analysis::{DifferentialEngine, SimilarityEngine};
use spectra_ingest::{Decoder, IngestPipeline};
use spectra_ledger::{DuplicateLedger, Sink};
use spectra_model::ScopeId;
use spectra_registry::TraceRegistry;

use crate::config::SessionConfig;
use crate::manifest::{Manifest, ManifestBuilder};
use crate::SessionError;

/// Sink key the manifest is exported under
const MANIFEST_KEY: &str = "manifest";

/// A workspace session: scoped state plus its teardown boundary
pub struct Session {
    scope: ScopeId,
    config: SessionConfig,
    sink: Arc<dyn Sink>,
    registry: Arc<TraceRegistry>,
    ledger: Arc<DuplicateLedger>,
    pipeline: IngestPipeline,
    similarity: Arc<SimilarityEngine>,
    differential: Arc<DifferentialEngine>,
}

impl Session {
    /// Create a session with a fresh scope
    ///
    /// Spawns the ingestion workers, so this must be called from within
    /// a Tokio runtime.
    #[must_use]
    pub fn new(config: SessionConfig, decoder: Arc<dyn Decoder>, sink: Arc<dyn Sink>) -> Self {
        let scope = ScopeId::new();
        let registry = Arc::new(TraceRegistry::new(config.tier_targets.clone()));
        let ledger = Arc::new(DuplicateLedger::new(Arc::clone(&sink)));

        let similarity = Arc::new(SimilarityEngine::new(
            Arc::clone(&registry),
            config.grid_samples,
            config.similarity_cache_capacity,
        ));
        let differential = Arc::new(DifferentialEngine::new(
            Arc::clone(&registry),
            config.ratio_epsilon,
            config.differential_cache_capacity,
        ));

        // Cascade: registry mutations invalidate both caches.
        {
            let similarity = Arc::clone(&similarity);
            registry.on_invalidate(Box::new(move |id| similarity.invalidate(id)));
        }
        {
            let differential = Arc::clone(&differential);
            registry.on_invalidate(Box::new(move |id| differential.invalidate(id)));
        }

        let pipeline = IngestPipeline::new(
            scope,
            config.pipeline.clone(),
            decoder,
            Arc::clone(&registry),
            Arc::clone(&ledger),
        );

        tracing::info!(%scope, "session created");
        Self {
            scope,
            config,
            sink,
            registry,
            ledger,
            pipeline,
            similarity,
            differential,
        }
    }

    /// This session's scope
    #[inline]
    #[must_use]
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// The active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The trace registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<TraceRegistry> {
        &self.registry
    }

    /// The duplicate ledger
    #[inline]
    #[must_use]
    pub fn ledger(&self) -> &Arc<DuplicateLedger> {
        &self.ledger
    }

    /// The ingestion pipeline
    #[inline]
    #[must_use]
    pub fn pipeline(&self) -> &IngestPipeline {
        &self.pipeline
    }

    /// The similarity engine
    #[inline]
    #[must_use]
    pub fn similarity(&self) -> &SimilarityEngine {
        &self.similarity
    }

    /// The differential engine
    #[inline]
    #[must_use]
    pub fn differential(&self) -> &DifferentialEngine {
        &self.differential
    }

    /// Tear down all scope-bound state
    ///
    /// Purges this scope from the ledger and sink, clears the registry,
    /// and drops both analysis caches. Other sessions sharing the sink
    /// are unaffected.
    ///
    /// # Errors
    /// Returns [`SessionError`] when the sink rejects the purge.
    pub async fn reset(&self) -> Result<(), SessionError> {
        self.ledger.purge(self.scope).await?;
        self.registry.clear();
        self.similarity.invalidate_all();
        self.differential.invalidate_all();
        tracing::info!(scope = %self.scope, "session reset");
        Ok(())
    }

    /// Snapshot the visible traces into a manifest
    #[must_use]
    pub fn manifest(&self) -> Manifest {
        ManifestBuilder::new(&self.registry, self.scope, &self.config).build()
    }

    /// Build the manifest and write it through the sink
    ///
    /// # Errors
    /// Returns [`SessionError`] on serialization or sink failure.
    pub async fn export_manifest(&self) -> Result<Manifest, SessionError> {
        let manifest = self.manifest();
        let bytes = manifest.to_json()?;
        self.sink.put(self.scope, MANIFEST_KEY, bytes).await?;
        tracing::info!(scope = %self.scope, entries = manifest.entries.len(), "manifest exported");
        Ok(manifest)
    }
}
