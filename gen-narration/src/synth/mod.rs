//! Speech synthesis engine boundary and dispatch.

pub mod command;
pub mod dispatcher;
pub mod pool;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::audio::Waveform;
use crate::config::SynthConfig;
use crate::error::{NarrationError, Result};

pub use command::CommandEngine;
pub use dispatcher::{Slot, SlotOutcome, SynthesisDispatcher, SynthesisReport};
pub use pool::{EngineLease, EnginePool};

/// Failure of a single engine call. Recovered by the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to start engine: {0}")]
    Spawn(String),

    #[error("engine exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("unusable engine output: {0}")]
    Output(String),

    #[error("no engine available: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Generation controls forwarded to the engine untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    /// Text-stage sampling temperature
    pub temperature: f32,
    /// Waveform-stage sampling temperature
    pub waveform_temperature: f32,
    /// Fixed seed for reproducible output
    pub seed: Option<u64>,
    /// Engine-specific extras
    pub extra: BTreeMap<String, String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.65,
            waveform_temperature: 0.55,
            seed: None,
            extra: BTreeMap::new(),
        }
    }
}

impl GenerationParams {
    pub fn from_config(config: &SynthConfig) -> Self {
        Self {
            temperature: config.temperature,
            waveform_temperature: config.waveform_temperature,
            seed: config.seed,
            extra: config.extra.clone(),
        }
    }
}

/// Speech synthesis engine - every backend implements this.
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Synthesize one chunk of text.
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        params: &GenerationParams,
    ) -> std::result::Result<Waveform, EngineError>;

    /// Engine name for logs.
    fn name(&self) -> &str;
}

/// Build the engine pool described by the synthesis config.
pub fn create_pool(config: &SynthConfig) -> Result<EnginePool> {
    if config.command.is_empty() {
        return Err(NarrationError::Config(
            "no synthesis engine configured (set synthesis.command or pass --engine-cmd)".into(),
        ));
    }

    let build = || -> Result<Arc<dyn SynthesisEngine>> {
        let engine = CommandEngine::new(config.command.clone())
            .map_err(|e| NarrationError::Config(e.to_string()))?;
        Ok(Arc::new(engine))
    };

    if config.isolate_engines {
        EnginePool::isolated(config.workers, |_| build())
    } else {
        Ok(EnginePool::shared(build()?, config.workers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_from_config() {
        let config = SynthConfig::default();
        let params = GenerationParams::from_config(&config);
        assert_eq!(params.temperature, 0.65);
        assert_eq!(params.waveform_temperature, 0.55);
        assert_eq!(params.seed, Some(1234));
    }

    #[test]
    fn test_create_pool_requires_command() {
        let err = create_pool(&SynthConfig::default()).err().unwrap();
        assert!(matches!(err, NarrationError::Config(_)));
    }

    #[test]
    fn test_create_pool_isolated() {
        let config = SynthConfig {
            workers: 3,
            isolate_engines: true,
            command: vec!["tts".into(), "{text}".into(), "{output}".into()],
            ..SynthConfig::default()
        };
        let pool = create_pool(&config).unwrap();
        assert_eq!(pool.workers(), 3);
        assert!(pool.is_isolated());
    }
}
