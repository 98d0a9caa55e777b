//! Модель данных сегментов озвучки
//!
//! `Segment` - то, что приходит от автора и хранится в файле проекта.
//! `ShiftedSegment` - результат планировщика таймлайна; композиторы звука и
//! видео принимают только его, поэтому "еще не спланированный" сегмент не
//! может попасть на этап сборки.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Минимальный интервал между началами соседних сегментов, секунды
pub const MIN_SEGMENT_GAP: f64 = 0.033;

/// Стратегия согласования длительности озвучки и видео
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Видео обрезается, при нехватке удерживается последний кадр
    #[default]
    Trim,
    /// Весь отрезок видео равномерно ускоряется/замедляется
    SpeedTotal,
    /// Видео идет в нормальном темпе, хвост ускоряется
    SpeedOverflow,
    /// Видео идет в нормальном темпе, затем стоп-кадр
    Freeze,
}

/// Переопределение звука для сегмента
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mute_original: Option<bool>,
}

/// Сегмент озвучки, привязанный к моменту исходного видео
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Начало сегмента в исходном видео, секунды
    pub start_time: f64,
    /// Исходный текст
    #[serde(default)]
    pub content: String,
    /// Текст, уложенный в бюджет слов
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjusted_content: Option<String>,
    #[serde(default)]
    pub strategy: Strategy,
    /// Коэффициент ускорения хвоста (только для speed_overflow)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_factor: Option<f64>,
    /// Измеренная длительность озвучки, секунды
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_duration: Option<f64>,
    /// Визуальный бюджет до следующего сегмента, секунды
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_limit: Option<f64>,
    /// Путь к синтезированному аудио
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
    /// Записывается обратно после планирования, только для хранения
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_override: Option<AudioOverride>,
}

impl Segment {
    /// Создать сегмент с текстом и стратегией по умолчанию
    pub fn new(start_time: f64, content: impl Into<String>) -> Self {
        Self {
            start_time,
            content: content.into(),
            ..Self::default()
        }
    }

    /// Текст, который будет озвучен
    pub fn spoken_text(&self) -> &str {
        self.adjusted_content
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or(&self.content)
    }

    /// Целочисленный коэффициент ускорения, не меньше 2
    pub fn effective_speed_factor(&self) -> f64 {
        self.speed_factor
            .filter(|factor| factor.is_finite())
            .map(f64::floor)
            .unwrap_or(2.0)
            .max(2.0)
    }
}

/// Метка слова из синтезатора речи
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WordBoundary {
    pub text: String,
    /// Смещение от начала аудио, миллисекунды
    pub audio_offset: f64,
    /// Длительность, миллисекунды
    pub duration: f64,
}

impl WordBoundary {
    pub fn new(text: impl Into<String>, audio_offset: f64, duration: f64) -> Self {
        Self {
            text: text.into(),
            audio_offset,
            duration,
        }
    }

    /// Конец слова, миллисекунды
    pub fn end(&self) -> f64 {
        self.audio_offset + self.duration
    }
}

/// Сегмент после планирования таймлайна
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftedSegment {
    /// Индекс сегмента в проекте
    pub index: usize,
    pub segment: Segment,
    /// Начало сегмента на выходном таймлайне
    pub target_start_time: f64,
    /// Длительность сегмента на выходном таймлайне
    pub target_duration: f64,
    /// Озвучка плюс пауза
    pub audio_needed: f64,
    /// Перекрытие с переходом к следующему сегменту
    pub tail_needed: f64,
    pub total_needed: f64,
    /// Сколько исходного видео есть до следующего сегмента
    pub visual_available: f64,
    /// Начало следующего сегмента в исходном видео
    pub next_start_time: Option<f64>,
}

impl ShiftedSegment {
    pub fn target_end(&self) -> f64 {
        self.target_start_time + self.target_duration
    }

    pub fn is_last(&self) -> bool {
        self.next_start_time.is_none()
    }
}

/// Проверить порядок сегментов перед обработкой
pub fn validate_order(segments: &[Segment]) -> Result<()> {
    for (i, segment) in segments.iter().enumerate() {
        if !segment.start_time.is_finite() || segment.start_time < 0.0 {
            return Err(SyncError::InvalidProject(format!(
                "Segment {} has invalid start time {}",
                i, segment.start_time
            )));
        }
        if let Some(next) = segments.get(i + 1) {
            let gap = next.start_time - segment.start_time;
            if gap < 0.0 {
                return Err(SyncError::InvalidProject(format!(
                    "Segments are not ordered: #{} starts at {:.3}s, #{} at {:.3}s",
                    i,
                    segment.start_time,
                    i + 1,
                    next.start_time
                )));
            }
            if gap < MIN_SEGMENT_GAP {
                warn!(
                    "Segments #{} and #{} are only {:.3}s apart, visual time will be clamped",
                    i,
                    i + 1,
                    gap
                );
            }
        }
    }
    Ok(())
}
