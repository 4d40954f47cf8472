//! Concurrent chunk synthesis with ordered results.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::{EnginePool, GenerationParams};
use crate::audio::Waveform;
use crate::config::SynthConfig;
use crate::runner::StopHandle;
use crate::text::Chunk;

#[derive(Debug, Clone, PartialEq)]
pub enum SlotOutcome {
    Synthesized(Waveform),
    Failed(String),
    TimedOut,
    /// Never dispatched because a stop was requested
    Skipped,
}

/// Result for the chunk at `index`.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub index: usize,
    pub outcome: SlotOutcome,
}

impl Slot {
    pub fn is_synthesized(&self) -> bool {
        matches!(self.outcome, SlotOutcome::Synthesized(_))
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisReport {
    slots: Vec<Slot>,
    placeholder: Waveform,
    cancelled: bool,
}

impl SynthesisReport {
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// One waveform per chunk, in chunk order. Unsuccessful slots become
    /// the silence placeholder.
    pub fn waveforms(&self) -> Vec<Waveform> {
        self.slots
            .iter()
            .map(|slot| match &slot.outcome {
                SlotOutcome::Synthesized(waveform) => waveform.clone(),
                _ => self.placeholder.clone(),
            })
            .collect()
    }

    pub fn failures(&self) -> usize {
        self.count(|o| matches!(o, SlotOutcome::Failed(_)))
    }

    pub fn timeouts(&self) -> usize {
        self.count(|o| matches!(o, SlotOutcome::TimedOut))
    }

    /// Failures plus timeouts.
    pub fn unsuccessful(&self) -> usize {
        self.failures() + self.timeouts()
    }

    /// A stop was requested before every chunk was dispatched.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn count(&self, pred: impl Fn(&SlotOutcome) -> bool) -> usize {
        self.slots.iter().filter(|s| pred(&s.outcome)).count()
    }
}

pub struct SynthesisDispatcher {
    pool: Arc<EnginePool>,
    voice: String,
    params: GenerationParams,
    workers: usize,
    timeout: Duration,
    placeholder: Waveform,
    stop: StopHandle,
}

impl SynthesisDispatcher {
    pub fn new(pool: Arc<EnginePool>, config: &SynthConfig, sample_rate: u32) -> Self {
        Self {
            pool,
            voice: config.voice.clone(),
            params: GenerationParams::from_config(config),
            workers: config.workers.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
            placeholder: Waveform::silence(config.placeholder_secs, sample_rate),
            stop: StopHandle::new(),
        }
    }

    pub fn with_stop(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Synthesize every chunk, at most `workers` at once. Engine errors and
    /// timeouts are recorded per slot and never abort the call.
    pub async fn synthesize(&self, chunks: &[Chunk]) -> SynthesisReport {
        let mut outcomes: Vec<SlotOutcome> = vec![SlotOutcome::Skipped; chunks.len()];
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        let mut cancelled = false;

        for (position, chunk) in chunks.iter().enumerate() {
            if self.stop.is_stopped() {
                cancelled = true;
                break;
            }

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    outcomes[position] = SlotOutcome::Failed(e.to_string());
                    continue;
                }
            };
            // Re-check after waiting for a worker
            if self.stop.is_stopped() {
                cancelled = true;
                break;
            }

            outcomes[position] = SlotOutcome::Failed("synthesis task aborted".into());
            let pool = Arc::clone(&self.pool);
            let text = chunk.text.clone();
            let voice = self.voice.clone();
            let params = self.params.clone();
            let timeout = self.timeout;

            tasks.spawn(async move {
                let _permit = permit;
                let outcome = match pool.acquire().await {
                    Ok(engine) => {
                        match tokio::time::timeout(timeout, engine.synthesize(&text, &voice, &params))
                            .await
                        {
                            Ok(Ok(waveform)) => SlotOutcome::Synthesized(waveform),
                            Ok(Err(e)) => SlotOutcome::Failed(e.to_string()),
                            Err(_) => SlotOutcome::TimedOut,
                        }
                    }
                    Err(e) => SlotOutcome::Failed(e.to_string()),
                };
                (position, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, outcome)) => outcomes[position] = outcome,
                Err(e) => warn!("Synthesis task panicked: {}", e),
            }
        }

        let slots: Vec<Slot> = chunks
            .iter()
            .zip(outcomes)
            .map(|(chunk, outcome)| Slot {
                index: chunk.index,
                outcome,
            })
            .collect();

        for slot in &slots {
            match &slot.outcome {
                SlotOutcome::Failed(reason) => {
                    warn!("Chunk {} failed, using silence: {}", slot.index, reason)
                }
                SlotOutcome::TimedOut => warn!(
                    "Chunk {} timed out after {}s, using silence",
                    slot.index,
                    self.timeout.as_secs()
                ),
                _ => {}
            }
        }

        let report = SynthesisReport {
            slots,
            placeholder: self.placeholder.clone(),
            cancelled,
        };
        if report.unsuccessful() > 0 {
            warn!(
                "{} of {} chunks unsuccessful ({} timed out)",
                report.unsuccessful(),
                chunks.len(),
                report.timeouts()
            );
        } else {
            debug!("Synthesized {} chunks", chunks.len());
        }
        report
    }
}
