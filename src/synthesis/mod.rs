//! Модуль синтеза речи
//!
//! Сам синтезатор внешний и описан трейтом `Synthesizer`. Здесь повторные
//! попытки, измерение длительности и запись аудио сегментов на диск.

pub mod duration;

pub use duration::measure_duration;

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, warn};

use crate::config::VoiceSettings;
use crate::error::{Result, SyncError};
use crate::progress::ProgressTracker;
use crate::segment::{Segment, WordBoundary};

/// Результат синтеза одного текста
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisOutput {
    pub audio: Bytes,
    pub word_boundaries: Vec<WordBoundary>,
    /// Расширение файла (формат аудио)
    pub extension: String,
}

impl SynthesisOutput {
    pub fn new(audio: impl Into<Bytes>, word_boundaries: Vec<WordBoundary>) -> Self {
        Self {
            audio: audio.into(),
            word_boundaries,
            extension: "mp3".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }
}

/// Внешний сервис синтеза речи
///
/// Ошибка `SyncError::Configuration` внутри `anyhow::Error` (например, нет
/// ключа доступа) не повторяется.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &VoiceSettings)
        -> anyhow::Result<SynthesisOutput>;
}

/// Синтез с ограниченным числом последовательных попыток
pub async fn synthesize_with_retry<S: Synthesizer + ?Sized>(
    synthesizer: &S,
    text: &str,
    voice: &VoiceSettings,
    max_attempts: usize,
) -> Result<SynthesisOutput> {
    if text.trim().is_empty() {
        return Err(SyncError::InvalidProject(
            "Cannot synthesize empty text".to_string(),
        ));
    }

    let max_attempts = max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match synthesizer.synthesize(text, voice).await {
            Ok(output) if !output.audio.is_empty() => {
                debug!(
                    "Synthesized {} bytes, {} word boundaries (attempt {})",
                    output.audio.len(),
                    output.word_boundaries.len(),
                    attempt
                );
                return Ok(output);
            }
            Ok(_) => {
                warn!("Synthesis attempt {} returned empty audio", attempt);
                last_error = "empty audio".to_string();
            }
            Err(e) => {
                if let Some(SyncError::Configuration(msg)) = e.downcast_ref::<SyncError>() {
                    return Err(SyncError::Configuration(msg.clone()));
                }
                warn!("Synthesis attempt {}/{} failed: {}", attempt, max_attempts, e);
                last_error = e.to_string();
            }
        }
    }

    Err(SyncError::Synthesis(format!(
        "failed after {} attempts: {}",
        max_attempts, last_error
    )))
}

/// Этап синтеза: озвучка всех сегментов по порядку
pub struct SynthesisStage<'a, S: Synthesizer + ?Sized> {
    synthesizer: &'a S,
    voice: &'a VoiceSettings,
    max_attempts: usize,
    progress: Option<&'a ProgressTracker>,
}

impl<'a, S: Synthesizer + ?Sized> SynthesisStage<'a, S> {
    pub fn new(synthesizer: &'a S, voice: &'a VoiceSettings, max_attempts: usize) -> Self {
        Self {
            synthesizer,
            voice,
            max_attempts,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: &'a ProgressTracker) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Озвучить сегменты, записать аудио в `audio_dir`
    ///
    /// Заполняет `audio_path` и `audio_duration`; возвращает метки слов
    /// по индексу сегмента.
    pub async fn run(
        &self,
        segments: &mut [Segment],
        audio_dir: &Path,
    ) -> Result<Vec<Vec<WordBoundary>>> {
        tokio::fs::create_dir_all(audio_dir).await?;

        let total = segments.len();
        let mut boundaries = Vec::with_capacity(total);

        for (index, segment) in segments.iter_mut().enumerate() {
            let text = segment.spoken_text().to_string();
            let output = synthesize_with_retry(self.synthesizer, &text, self.voice, self.max_attempts)
                .await
                .map_err(|e| match e {
                    SyncError::Synthesis(msg) => {
                        SyncError::Synthesis(format!("segment #{}: {}", index, msg))
                    }
                    other => other,
                })?;

            let path = audio_dir.join(format!("segment_{:03}.{}", index, output.extension));
            tokio::fs::write(&path, &output.audio).await?;

            let duration = match measure_duration(&output.audio, Some(&output.extension)) {
                Ok(duration) => duration,
                Err(e) => {
                    let fallback = output
                        .word_boundaries
                        .iter()
                        .map(WordBoundary::end)
                        .fold(0.0, f64::max)
                        / 1000.0;
                    if fallback <= 0.0 {
                        return Err(e);
                    }
                    warn!(
                        "Segment #{}: cannot measure audio ({}), using word timing {:.3}s",
                        index, e, fallback
                    );
                    fallback
                }
            };

            segment.audio_path = Some(path.to_string_lossy().into_owned());
            segment.audio_duration = Some(duration);
            debug!("Segment #{}: {:.3}s of narration", index, duration);

            boundaries.push(output.word_boundaries);
            if let Some(progress) = self.progress {
                progress.update_items(index + 1, total, Some(format!("segment {}", index + 1)));
            }
        }

        info!("Synthesized {} segments", total);
        Ok(boundaries)
    }
}
