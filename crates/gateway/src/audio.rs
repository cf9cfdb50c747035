//! Local speech engines.
//!
//! Text-to-speech runs the Piper binary and speech-to-text runs the
//! whisper.cpp CLI. Each call works in its own scratch directory under the
//! configured temp dir, removed once the engine exits.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

use vox_core::{
    config::{setting, SpeechConfig},
    traits::{SpeechSynthesizer, SpeechTranscriber},
    types::AudioBlob,
    Error, Result,
};

/// Longest stderr excerpt carried into an error.
const MAX_STDERR: usize = 320;

/// Supported audio formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Mp4,
    Wav,
    Webm,
    Ogg,
    Flac,
}

impl AudioFormat {
    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Mp4 => "audio/mp4",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Webm => "audio/webm",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Flac => "audio/flac",
        }
    }

    /// Get the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Mp4 => "m4a",
            AudioFormat::Wav => "wav",
            AudioFormat::Webm => "webm",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Flac => "flac",
        }
    }

    /// Detect format from bytes.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }

        if data.starts_with(b"RIFF") && data.len() >= 12 && &data[8..12] == b"WAVE" {
            return Some(AudioFormat::Wav);
        }
        if data.starts_with(b"OggS") {
            return Some(AudioFormat::Ogg);
        }
        if data.starts_with(b"fLaC") {
            return Some(AudioFormat::Flac);
        }
        if data.starts_with(b"ID3") || data.starts_with(&[0xFF, 0xFB]) || data.starts_with(&[0xFF, 0xFA]) {
            return Some(AudioFormat::Mp3);
        }
        if data.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
            return Some(AudioFormat::Webm);
        }
        if data.len() >= 8 && &data[4..8] == b"ftyp" {
            return Some(AudioFormat::Mp4);
        }

        None
    }

    /// Map a MIME type such as `audio/webm;codecs=opus`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim().to_lowercase();
        match essence.as_str() {
            "audio/mpeg" | "audio/mp3" => Some(AudioFormat::Mp3),
            "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some(AudioFormat::Mp4),
            "audio/wav" | "audio/x-wav" | "audio/wave" => Some(AudioFormat::Wav),
            "audio/webm" => Some(AudioFormat::Webm),
            "audio/ogg" => Some(AudioFormat::Ogg),
            "audio/flac" | "audio/x-flac" => Some(AudioFormat::Flac),
            _ => None,
        }
    }

    /// Best guess for a clip: magic bytes, then declared MIME type.
    pub fn for_clip(clip: &AudioBlob) -> Option<Self> {
        Self::detect(&clip.data).or_else(|| clip.mime_type.as_deref().and_then(Self::from_mime))
    }
}

// =============================================================================
// Piper TTS
// =============================================================================

/// Text-to-speech through the Piper CLI.
#[derive(Debug, Clone)]
pub struct PiperSynthesizer {
    binary: String,
    model_path: PathBuf,
    config_path: Option<PathBuf>,
    speaker_id: Option<String>,
    temp_dir: PathBuf,
    timeout: Duration,
}

impl PiperSynthesizer {
    /// Build from the `[speech]` section. Fails when no voice model is usable.
    pub fn from_config(config: &SpeechConfig) -> Result<Self> {
        let model_path = setting(&config.piper_model_path)
            .map(PathBuf::from)
            .ok_or_else(|| Error::config("piper_model_path is not set"))?;
        if !model_path.exists() {
            return Err(Error::config(format!(
                "Piper voice model not found at {}",
                model_path.display()
            )));
        }

        let binary = config.piper_binary.trim();
        if binary.is_empty() {
            return Err(Error::config("piper_binary is empty"));
        }

        // A missing voice config is skipped; Piper looks next to the model.
        let config_path = setting(&config.piper_config_path)
            .map(PathBuf::from)
            .filter(|p| p.exists());

        Ok(Self {
            binary: binary.to_string(),
            model_path,
            config_path,
            speaker_id: setting(&config.piper_speaker_id).map(str::to_string),
            temp_dir: config.temp_dir.clone(),
            timeout: Duration::from_secs(config.tts_timeout_secs),
        })
    }

    pub(crate) fn command_args(&self, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--model".into(),
            self.model_path.clone().into(),
            "--output_file".into(),
            output.into(),
        ];
        if let Some(config) = &self.config_path {
            args.push("--config".into());
            args.push(config.into());
        }
        if let Some(speaker) = &self.speaker_id {
            args.push("--speaker".into());
            args.push(speaker.into());
        }
        args
    }

    async fn run(&self, text: &str, work_dir: &Path) -> Result<AudioBlob> {
        let output_path = work_dir.join("speech.wav");

        let mut child = Command::new(&self.binary)
            .args(self.command_args(&output_path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::speech(format!("failed to start {}: {}", self.binary, e)))?;

        // Feeding stdin and waiting share one deadline: a Piper that stops
        // reading blocks the write once the pipe buffer fills.
        let stdin = child.stdin.take();
        let exchange = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(text.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::speech(format!("Piper timed out after {} seconds", self.timeout.as_secs())))??;

        if !output.status.success() {
            return Err(Error::speech(format!(
                "Piper TTS failed: {}",
                stderr_excerpt(&output.stderr, "Unknown Piper error.")
            )));
        }

        let wav = tokio::fs::read(&output_path).await?;
        Ok(AudioBlob::wav(wav))
    }
}

#[async_trait]
impl SpeechSynthesizer for PiperSynthesizer {
    fn name(&self) -> &str {
        "piper"
    }

    async fn synthesize(&self, text: &str) -> Result<AudioBlob> {
        if text.trim().is_empty() {
            return Err(Error::invalid_request("No text provided for TTS."));
        }

        let work_dir = scratch_dir(&self.temp_dir, "tts").await?;
        let result = self.run(text, &work_dir).await;
        cleanup(&work_dir).await;

        let audio = result?;
        tracing::info!(engine = "piper", bytes = audio.len(), "Generated TTS audio");
        Ok(audio)
    }
}

// =============================================================================
// whisper.cpp STT
// =============================================================================

/// Speech-to-text through the whisper.cpp CLI.
#[derive(Debug, Clone)]
pub struct WhisperCliTranscriber {
    binary: String,
    model_path: PathBuf,
    language: Option<String>,
    temp_dir: PathBuf,
    timeout: Duration,
}

impl WhisperCliTranscriber {
    /// Build from the `[speech]` section. Fails when no model is usable.
    pub fn from_config(config: &SpeechConfig) -> Result<Self> {
        let model_path = setting(&config.whisper_model_path)
            .map(PathBuf::from)
            .ok_or_else(|| Error::config("whisper_model_path is not set"))?;
        if !model_path.exists() {
            return Err(Error::config(format!(
                "Whisper model not found at {}",
                model_path.display()
            )));
        }

        let binary = config.whisper_binary.trim();
        if binary.is_empty() {
            return Err(Error::config("whisper_binary is empty"));
        }

        Ok(Self {
            binary: binary.to_string(),
            model_path,
            language: setting(&config.stt_language).map(str::to_string),
            temp_dir: config.temp_dir.clone(),
            timeout: Duration::from_secs(config.stt_timeout_secs),
        })
    }

    pub(crate) fn command_args(&self, input: &Path, out_prefix: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-m".into(),
            self.model_path.clone().into(),
            "-f".into(),
            input.into(),
            "-of".into(),
            out_prefix.into(),
            "-otxt".into(),
        ];
        if let Some(language) = &self.language {
            args.push("-l".into());
            args.push(language.into());
        }
        args
    }

    async fn run(&self, audio: &AudioBlob, work_dir: &Path) -> Result<String> {
        let ext = AudioFormat::for_clip(audio).map_or("wav", |f| f.extension());
        let input_path = work_dir.join(format!("input.{}", ext));
        tokio::fs::write(&input_path, &audio.data).await?;

        let out_prefix = work_dir.join("transcript");
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.command_args(&input_path, &out_prefix))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                Error::speech(format!("whisper-cli timed out after {} seconds", self.timeout.as_secs()))
            })?
            .map_err(|e| Error::speech(format!("failed to start {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(Error::speech(format!(
                "whisper-cli failed: {}",
                stderr_excerpt(&output.stderr, "unknown error")
            )));
        }

        // Older builds ignore -of and only print to stdout.
        let transcript_path = PathBuf::from(format!("{}.txt", out_prefix.display()));
        let text = match tokio::fs::read_to_string(&transcript_path).await {
            Ok(text) => text,
            Err(_) => String::from_utf8_lossy(&output.stdout).into_owned(),
        };

        Ok(normalize_transcript(&text))
    }
}

#[async_trait]
impl SpeechTranscriber for WhisperCliTranscriber {
    fn name(&self) -> &str {
        "whisper.cpp"
    }

    async fn transcribe(&self, audio: &AudioBlob) -> Result<String> {
        if audio.is_empty() {
            return Err(Error::invalid_request("Empty audio file."));
        }

        let work_dir = scratch_dir(&self.temp_dir, "stt").await?;
        let result = self.run(audio, &work_dir).await;
        cleanup(&work_dir).await;

        let text = result?;
        tracing::info!(
            engine = "whisper.cpp",
            language = ?self.language,
            chars = text.len(),
            "Transcribed audio"
        );
        Ok(text)
    }
}

/// Join whisper's per-segment lines into one sentence stream.
///
/// Stdout segments carry a `[00:00:00.000 --> 00:00:02.000]` prefix, which is dropped.
fn normalize_transcript(raw: &str) -> String {
    raw.lines()
        .map(|l| strip_timestamp(l.trim()).trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_timestamp(line: &str) -> &str {
    if !line.starts_with('[') {
        return line;
    }
    match line.find(']') {
        Some(end) if line[..end].contains("-->") => &line[end + 1..],
        _ => line,
    }
}

fn stderr_excerpt(stderr: &[u8], fallback: &str) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.chars().take(MAX_STDERR).collect()
    }
}

async fn scratch_dir(base: &Path, kind: &str) -> Result<PathBuf> {
    let dir = base.join(format!("{}-{}", kind, Uuid::new_v4()));
    tokio::fs::create_dir_all(&dir).await?;
    Ok(dir)
}

async fn cleanup(dir: &Path) {
    if let Err(err) = tokio::fs::remove_dir_all(dir).await {
        tracing::debug!(dir = %dir.display(), error = %err, "Failed to remove scratch directory");
    }
}
