//! Job runner: plan once, then synthesize, assemble and commit batch by batch.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use log::{debug, error, info, warn};

use crate::audio::{AudioAssembler, Encoder, OutputFormat};
use crate::batch::{Batch, plan_document};
use crate::checkpoint::{ArtifactRecord, CheckpointStore, JobState};
use crate::config::NarrationConfig;
use crate::error::{NarrationError, Result};
use crate::extract::Document;
use crate::output::{Manifest, artifact_base, batch_file_name, final_file_name};
use crate::synth::{EnginePool, SynthesisDispatcher};
use crate::text::TextSegmenter;

/// Shared stop flag, checked between batches and between chunk dispatches.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Planning,
    Running,
    Paused,
    /// The batch at this index failed and stays pending
    FailedBatch(usize),
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Complete,
    /// Some batches failed; the checkpoint is kept for the next run
    Incomplete,
    Paused,
}

/// Reported to the progress callback after planning and after every batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RunProgress {
    pub phase: JobPhase,
    pub completed: usize,
    pub total: usize,
    /// 1-based number of the batch just finished
    pub batch: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobSummary {
    pub job_key: String,
    pub outcome: JobOutcome,
    pub resumed: bool,
    pub total_batches: usize,
    pub completed_batches: usize,
    /// Batches committed by this run
    pub processed_batches: usize,
    pub failed_batches: Vec<usize>,
    pub failed_chunks: usize,
    /// Batches written as WAV after an MP3 encode failure
    pub fallbacks: usize,
    pub artifacts: Vec<PathBuf>,
    pub final_artifact: Option<PathBuf>,
    pub manifest: Option<PathBuf>,
}

pub struct JobRunner {
    config: NarrationConfig,
    store: CheckpointStore,
    pool: Arc<EnginePool>,
    output_dir: PathBuf,
    resume: bool,
    stop: StopHandle,
    phase: JobPhase,
}

impl JobRunner {
    pub fn new(config: NarrationConfig, store: CheckpointStore, pool: Arc<EnginePool>) -> Self {
        let output_dir = config.output.dir.clone();
        Self {
            config,
            store,
            pool,
            output_dir,
            resume: true,
            stop: StopHandle::new(),
            phase: JobPhase::Planning,
        }
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_stop(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    /// Reload and verify the job's checkpoint, or plan and persist a new one.
    /// The flag is true when resuming.
    pub fn prepare(&mut self, document: &Document, job_key: &str) -> Result<(JobState, bool)> {
        self.phase = JobPhase::Planning;

        if self.resume {
            if let Some(state) = self.store.load(job_key)? {
                state.verify(&document.text)?;
                let (completed, total, pct) = state.progress();
                info!(
                    "Resuming {}: {}/{} batches ({:.1}% complete)",
                    job_key, completed, total, pct
                );
                return Ok((state, true));
            }
        } else {
            self.store.remove(job_key)?;
        }

        let batches = plan_document(document, &self.config.batch);
        if batches.is_empty() {
            return Err(NarrationError::extraction(
                &document.source_id,
                "nothing to narrate after cleanup",
            ));
        }
        info!("Planned {} batches for {}", batches.len(), document.source_id);
        for batch in &batches {
            debug!(
                "  batch {}: {} chars, ~{} tokens, paragraphs {:?}, pages {:?}",
                batch.number(),
                batch.char_count,
                batch.token_estimate,
                batch.paragraph_range,
                batch.page_range
            );
        }

        let state = JobState::new(
            job_key.to_string(),
            document.source_id.clone(),
            &document.text,
            batches,
            Utc::now(),
        );
        self.store.save(&state)?;
        Ok((state, false))
    }

    /// Run or resume the job for `document`.
    pub async fn run<F>(
        &mut self,
        document: &Document,
        job_key: &str,
        mut on_progress: F,
    ) -> Result<JobSummary>
    where
        F: FnMut(&RunProgress),
    {
        let (mut state, resumed) = self.prepare(document, job_key)?;

        let base = artifact_base(&state.source_id, self.config.output.max_identifier_len);
        let segmenter = TextSegmenter::new(self.config.segment.clone());
        let assembler = AudioAssembler::new(self.config.audio.clone());
        let encoder = Encoder::new(self.config.output.ffmpeg.clone());
        let format = self.config.output.output_format();
        let dispatcher = SynthesisDispatcher::new(
            Arc::clone(&self.pool),
            &self.config.synthesis,
            assembler.sample_rate(),
        )
        .with_stop(self.stop.clone());

        self.phase = JobPhase::Running;
        let mut summary = JobSummary {
            job_key: job_key.to_string(),
            outcome: JobOutcome::Incomplete,
            resumed,
            total_batches: state.total_batches,
            completed_batches: state.completed_batch_indices.len(),
            processed_batches: 0,
            failed_batches: Vec::new(),
            failed_chunks: 0,
            fallbacks: 0,
            artifacts: Vec::new(),
            final_artifact: None,
            manifest: None,
        };
        on_progress(&self.progress(&state, None));

        let mut paused = false;
        for index in state.pending_indices() {
            if self.stop.is_stopped() {
                paused = true;
                break;
            }

            let batch = state.batches[index].clone();
            let started = Instant::now();
            let context = BatchContext {
                base: &base,
                date_stamp: &state.date_stamp,
                total: state.total_batches,
                segmenter: &segmenter,
                dispatcher: &dispatcher,
                assembler: &assembler,
                encoder: &encoder,
                format: &format,
            };

            match self.run_batch(&batch, &context).await {
                Ok(Some(record)) => {
                    info!(
                        "Batch {}/{} done in {:.1}s: {} ({:.1}s audio)",
                        batch.number(),
                        state.total_batches,
                        started.elapsed().as_secs_f64(),
                        record.path.display(),
                        record.duration_secs
                    );
                    summary.failed_chunks += record.failed_chunks;
                    if record.fell_back {
                        summary.fallbacks += 1;
                    }
                    summary.processed_batches += 1;
                    summary.artifacts.push(record.path.clone());
                    state.mark_complete(record);
                    self.store.save(&state)?;
                    if !matches!(self.phase, JobPhase::FailedBatch(_)) {
                        self.phase = JobPhase::Running;
                    }
                }
                Ok(None) => {
                    info!("Stop requested during batch {}", batch.number());
                    paused = true;
                    break;
                }
                Err(e) => {
                    error!("Batch {} failed: {}", batch.number(), e);
                    self.phase = JobPhase::FailedBatch(index);
                    summary.failed_batches.push(index);
                }
            }
            on_progress(&self.progress(&state, Some(batch.number())));
        }
        summary.completed_batches = state.completed_batch_indices.len();

        if paused {
            self.phase = JobPhase::Paused;
            summary.outcome = JobOutcome::Paused;
            info!(
                "Paused after {}/{} batches; rerun to resume",
                summary.completed_batches, summary.total_batches
            );
            return Ok(summary);
        }

        if !state.is_complete() {
            summary.outcome = JobOutcome::Incomplete;
            warn!(
                "{} of {} batches still pending; checkpoint kept at {}",
                state.total_batches - summary.completed_batches,
                state.total_batches,
                self.store.path_for(job_key).display()
            );
            return Ok(summary);
        }

        summary.final_artifact = if self.config.batch.final_merge && state.total_batches > 1 {
            self.merge_final(&state, &base, &assembler, &encoder, &format)
                .await
        } else {
            None
        };

        let manifest = Manifest::from_state(&state, summary.final_artifact.as_deref());
        summary.manifest = Some(manifest.write_json(&self.output_dir)?);
        manifest.write_playlist(&self.output_dir)?;

        self.store.remove(job_key)?;
        self.phase = JobPhase::Complete;
        summary.outcome = JobOutcome::Complete;
        on_progress(&self.progress(&state, None));
        Ok(summary)
    }

    fn progress(&self, state: &JobState, batch: Option<usize>) -> RunProgress {
        RunProgress {
            phase: self.phase,
            completed: state.completed_batch_indices.len(),
            total: state.total_batches,
            batch,
        }
    }

    /// `Ok(None)` when a stop cut the batch short; nothing is written then.
    async fn run_batch(
        &self,
        batch: &Batch,
        ctx: &BatchContext<'_>,
    ) -> Result<Option<ArtifactRecord>> {
        let chunks = ctx.segmenter.segment(&batch.text);
        if chunks.is_empty() {
            return Err(NarrationError::Synthesis {
                chunk: 0,
                message: format!("batch {} produced no chunks", batch.number()),
            });
        }
        info!(
            "Batch {}/{}: {} chunks, {} chars",
            batch.number(),
            ctx.total,
            chunks.len(),
            batch.char_count
        );

        let report = ctx.dispatcher.synthesize(&chunks).await;
        if report.is_cancelled() {
            return Ok(None);
        }

        let waveforms = report.waveforms();
        let path = self.output_dir.join(batch_file_name(
            ctx.base,
            ctx.date_stamp,
            batch.number(),
            ctx.format.extension(),
        ));
        let assembler = ctx.assembler.clone();
        let encoder = ctx.encoder.clone();
        let format = ctx.format.clone();

        let encoded = tokio::task::spawn_blocking(move || {
            let track = assembler.assemble(&waveforms);
            encoder.write_track(&track, &path, &format)
        })
        .await
        .map_err(|e| NarrationError::Io(std::io::Error::other(e)))??;

        Ok(Some(ArtifactRecord {
            batch_index: batch.index,
            path: encoded.path,
            format: encoded.extension,
            duration_secs: encoded.duration_secs,
            chunk_count: chunks.len(),
            failed_chunks: report.unsuccessful(),
            fell_back: encoded.fell_back,
        }))
    }

    /// Concatenate every batch artifact into the `complete` file. A failure
    /// is logged and leaves the batch artifacts as the result.
    async fn merge_final(
        &self,
        state: &JobState,
        base: &str,
        assembler: &AudioAssembler,
        encoder: &Encoder,
        format: &OutputFormat,
    ) -> Option<PathBuf> {
        let inputs: Vec<PathBuf> = state.artifacts.values().map(|r| r.path.clone()).collect();
        let path = self
            .output_dir
            .join(final_file_name(base, &state.date_stamp, format.extension()));
        let assembler = assembler.clone();
        let encoder = encoder.clone();
        let format = format.clone();

        info!("Merging {} batch files into {}", inputs.len(), path.display());
        let merged = tokio::task::spawn_blocking(move || -> Result<PathBuf> {
            let waveforms = inputs
                .iter()
                .map(|p| encoder.decode_file(p))
                .collect::<Result<Vec<_>>>()?;
            let track = assembler.merge_tracks(&waveforms);
            Ok(encoder.write_track(&track, &path, &format)?.path)
        })
        .await;

        match merged {
            Ok(Ok(path)) => Some(path),
            Ok(Err(e)) => {
                warn!("Final merge failed: {}", e);
                None
            }
            Err(e) => {
                warn!("Final merge task failed: {}", e);
                None
            }
        }
    }
}

struct BatchContext<'a> {
    base: &'a str,
    date_stamp: &'a str,
    total: usize,
    segmenter: &'a TextSegmenter,
    dispatcher: &'a SynthesisDispatcher,
    assembler: &'a AudioAssembler,
    encoder: &'a Encoder,
    format: &'a OutputFormat,
}
