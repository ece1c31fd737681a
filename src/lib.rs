//! Rabbit telemetry relay.
//!
//! Polls a sensor endpoint for Rabbit-encrypted packets, decrypts them
//! through an external cipher engine executable, parses the engine's
//! step-by-step trace and keeps bounded logs and statistics. When the
//! endpoint is unreachable the relay substitutes synthetic samples so the
//! pipeline keeps moving.
//!
//! # Components
//!
//! - [`codec`]: hex token encoding and key/IV validation
//! - [`process`]: subprocess invocation with timeouts
//! - [`engine`]: request staging, artifact files and engine calls
//! - [`trace`]: engine trace text to a structured model
//! - [`pipeline`]: the fetch/decrypt loop and its statistics
//! - [`api`]: JSON request/response surface over the engine

pub mod api;
pub mod cli;
pub mod codec;
pub mod config;
pub mod engine;
pub mod health;
pub mod pipeline;
pub mod process;
pub mod sensor;
pub mod shutdown;
pub mod source;
pub mod telemetry;
pub mod trace;

use std::sync::Arc;

use thiserror::Error;

use config::EnvConfig;
use engine::{resolve_executable, ArtifactRegistry, CipherEngine, EngineAdapter, EngineError};
use pipeline::{PipelineHandle, TelemetryPipeline};
use process::TokioInvoker;
use source::{FetchError, HttpSource, TelemetrySource};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Source(#[from] FetchError),
}

/// Wired-up relay components.
pub struct Relay {
    pub config: EnvConfig,
    pub artifacts: Arc<ArtifactRegistry>,
    pub engine: Arc<EngineAdapter>,
}

impl Relay {
    /// Resolve the engine executable and build the adapter.
    ///
    /// Fails when the executable cannot be found.
    pub fn new(config: EnvConfig) -> Result<Self, RelayError> {
        let executable = resolve_executable(&config.engine_path)?;
        let artifacts = Arc::new(ArtifactRegistry::new(config.artifact_dir.clone()));
        let invoker = Arc::new(TokioInvoker::new(config.engine_timeout));
        let engine = Arc::new(EngineAdapter::new(executable, invoker, Arc::clone(&artifacts)));

        Ok(Self {
            config,
            artifacts,
            engine,
        })
    }

    /// HTTP source for the configured URL.
    pub fn http_source(&self) -> Result<HttpSource, RelayError> {
        Ok(HttpSource::new(
            self.config.source_url.clone(),
            self.config.fetch_timeout,
        )?)
    }

    /// Build a pipeline reading from `source` and decrypting with this engine.
    pub fn pipeline(&self, source: Arc<dyn TelemetrySource>) -> (TelemetryPipeline, PipelineHandle) {
        let engine: Arc<dyn CipherEngine> = self.engine.clone();
        TelemetryPipeline::new(self.config.pipeline_config(), source, engine)
    }
}
