//! External engine: any program that turns text into a WAV file.
//!
//! The argv template may use `{text}`, `{voice}`, `{output}`, `{seed}`,
//! `{temperature}` and `{waveform_temperature}`. The chunk text is also
//! piped to stdin, and `extra` params are exported as `NARRATE_<KEY>`.

use std::process::Stdio;

use async_trait::async_trait;
use log::debug;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{EngineError, GenerationParams, SynthesisEngine};
use crate::audio::Waveform;

#[derive(Debug, Clone)]
pub struct CommandEngine {
    argv: Vec<String>,
    name: String,
}

impl CommandEngine {
    pub fn new(argv: Vec<String>) -> Result<Self, EngineError> {
        let Some(program) = argv.first() else {
            return Err(EngineError::Spawn("engine command is empty".into()));
        };
        if !argv.iter().any(|arg| arg.contains("{output}")) {
            return Err(EngineError::Spawn(
                "engine command must contain an {output} placeholder".into(),
            ));
        }

        let name = std::path::Path::new(program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.clone());
        Ok(Self { argv, name })
    }

    /// Substitute placeholders into the argv template.
    ///
    /// Each argument is scanned once, so placeholder-like text inside a
    /// substituted value is left as is.
    pub fn render_args(
        &self,
        text: &str,
        voice_id: &str,
        output: &str,
        params: &GenerationParams,
    ) -> Vec<String> {
        let seed = params.seed.map(|s| s.to_string()).unwrap_or_default();
        let temperature = params.temperature.to_string();
        let waveform_temperature = params.waveform_temperature.to_string();
        let values = [
            ("{text}", text),
            ("{voice}", voice_id),
            ("{output}", output),
            ("{seed}", seed.as_str()),
            ("{waveform_temperature}", waveform_temperature.as_str()),
            ("{temperature}", temperature.as_str()),
        ];

        self.argv
            .iter()
            .map(|arg| substitute(arg, &values))
            .collect()
    }
}

fn substitute(template: &str, values: &[(&str, &str)]) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = rest.find('{') {
        rendered.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match values.iter().find(|(name, _)| rest.starts_with(name)) {
            Some((name, value)) => {
                rendered.push_str(value);
                rest = &rest[name.len()..];
            }
            None => {
                rendered.push('{');
                rest = &rest[1..];
            }
        }
    }
    rendered.push_str(rest);
    rendered
}

#[async_trait]
impl SynthesisEngine for CommandEngine {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        params: &GenerationParams,
    ) -> Result<Waveform, EngineError> {
        let output_file = tempfile::Builder::new()
            .prefix("narrate-")
            .suffix(".wav")
            .tempfile()?;
        let output_path = output_file.path().to_string_lossy().into_owned();

        let args = self.render_args(text, voice_id, &output_path, params);
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| EngineError::Spawn("engine command is empty".into()))?;

        let mut command = Command::new(program);
        command
            .args(rest)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &params.extra {
            command.env(format!("NARRATE_{}", key.to_uppercase()), value);
        }

        debug!("Running {} for {} chars", self.name, text.chars().count());
        let mut child = command
            .spawn()
            .map_err(|e| EngineError::Spawn(format!("{}: {}", program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // Engines that take text from argv may exit without reading stdin
            match stdin.write_all(text.as_bytes()).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(e.into()),
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Exit {
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        let waveform = Waveform::read_wav(output_file.path())
            .map_err(|e| EngineError::Output(e.to_string()))?;
        if waveform.samples.is_empty() {
            return Err(EngineError::Output("engine wrote no samples".into()));
        }
        Ok(waveform)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
