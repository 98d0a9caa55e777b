//! Модуль подгонки текста под бюджет слов
//!
//! Бюджет считается из времени до следующего сегмента. Если текст не
//! помещается, он отправляется на переписывание (не более трех попыток), а
//! затем детерминированно обрезается.

pub mod rewriter;

pub use rewriter::{NoopRewriter, Rewriter};

use log::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::segment::Segment;
use crate::utils::text::{count_words, sanitize, strip_ellipsis, truncate_to_budget};

/// Минимальный визуальный бюджет сегмента, секунды
pub const MIN_DURATION_LIMIT: f64 = 1.0;
/// Минимальный бюджет слов
pub const MIN_WORDS: usize = 3;

/// Как был получен итоговый текст сегмента
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefinementOutcome {
    /// Текст помещался и принят как есть
    Unchanged,
    /// Сервис переписывания уложился в бюджет
    Rewritten { attempts: usize },
    /// Детерминированное сокращение
    Truncated,
}

/// Подгонка текста сегментов под доступное время
pub struct ScriptRefiner<'a, R: Rewriter + ?Sized> {
    rewriter: &'a R,
    words_per_second: f64,
    max_attempts: usize,
}

impl<'a, R: Rewriter + ?Sized> ScriptRefiner<'a, R> {
    pub fn new(rewriter: &'a R, words_per_second: f64) -> Self {
        Self {
            rewriter,
            words_per_second,
            max_attempts: 3,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Визуальный бюджет сегмента: до начала следующего или до конца видео
    pub fn duration_limit(segments: &[Segment], index: usize, video_duration: f64) -> f64 {
        let start = segments[index].start_time;
        let end = segments
            .get(index + 1)
            .map(|next| next.start_time)
            .unwrap_or(video_duration);
        (end - start).max(MIN_DURATION_LIMIT)
    }

    /// Бюджет слов для заданной длительности
    pub fn max_words(&self, duration_limit: f64) -> usize {
        ((duration_limit * self.words_per_second).floor() as usize).max(MIN_WORDS)
    }

    /// Подогнать текст всех сегментов; сегменты обрабатываются по порядку
    pub async fn refine_segments(
        &self,
        segments: &mut [Segment],
        video_duration: f64,
    ) -> Result<Vec<RefinementOutcome>> {
        let mut outcomes = Vec::with_capacity(segments.len());

        for index in 0..segments.len() {
            let limit = Self::duration_limit(segments, index, video_duration);
            let max_words = self.max_words(limit);
            let is_last = index + 1 == segments.len();

            let segment = &mut segments[index];
            segment.duration_limit = Some(limit);
            let words = count_words(&segment.content);

            debug!(
                "Segment #{}: {} words, budget {} ({:.2}s)",
                index, words, max_words, limit
            );

            let (text, outcome) = if is_last || words <= max_words {
                (strip_ellipsis(&segment.content), RefinementOutcome::Unchanged)
            } else {
                self.refine_text(&segment.content, max_words)
                    .await
                    .map_err(|e| match e {
                        SyncError::Rewrite(msg) => {
                            SyncError::Rewrite(format!("segment #{}: {}", index, msg))
                        }
                        other => other,
                    })?
            };

            segment.adjusted_content = Some(text);
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    /// Уложить один текст в `max_words`
    pub async fn refine_text(
        &self,
        content: &str,
        max_words: usize,
    ) -> Result<(String, RefinementOutcome)> {
        let mut current = content.to_string();
        let mut responded = false;
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match self.rewriter.rewrite(&current, max_words).await {
                Ok(Some(candidate)) => {
                    responded = true;
                    let refined = sanitize(&candidate);
                    let words = count_words(&refined);
                    if words > 0 && words <= max_words {
                        info!(
                            "Rewrite accepted on attempt {}: {} words (budget {})",
                            attempt, words, max_words
                        );
                        return Ok((refined, RefinementOutcome::Rewritten { attempts: attempt }));
                    }
                    warn!(
                        "Rewrite attempt {} returned {} words, budget is {}",
                        attempt, words, max_words
                    );
                    if words > 0 {
                        current = refined;
                    }
                }
                Ok(None) => {
                    responded = true;
                    warn!("Rewrite attempt {} returned nothing", attempt);
                }
                Err(e) => {
                    warn!("Rewrite attempt {} failed: {}", attempt, e);
                    last_error = Some(e);
                }
            }
        }

        if !responded {
            if let Some(e) = last_error {
                return Err(SyncError::Rewrite(format!(
                    "rewrite service failed {} times: {}",
                    self.max_attempts, e
                )));
            }
        }

        let truncated = truncate_to_budget(&current, max_words);
        warn!(
            "Falling back to truncation: {} -> {} words",
            count_words(&current),
            count_words(&truncated)
        );
        Ok((truncated, RefinementOutcome::Truncated))
    }
}
