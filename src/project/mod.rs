//! Файл проекта: сегменты озвучки и настройки звука
//!
//! Файл перечитывается и перезаписывается после каждого этапа конвейера.
//! Одновременные записи отслеживаются счетчиком `revision`.

pub mod store;

pub use store::{load_project, save_project, save_project_checked};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AudioConfig;
use crate::error::{Result, SyncError};
use crate::segment::{Segment, ShiftedSegment};

/// Текущая версия формата
pub const PROJECT_VERSION: u32 = 2;

/// Содержимое файла проекта
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub version: u32,
    pub video_name: String,
    pub last_modified: DateTime<Utc>,
    /// Номер записи; увеличивается при каждом сохранении с проверкой
    #[serde(default)]
    pub revision: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioConfig>,
    pub segments: Vec<Segment>,
}

impl ProjectFile {
    pub fn new(video_name: impl Into<String>, segments: Vec<Segment>) -> Self {
        Self {
            version: PROJECT_VERSION,
            video_name: video_name.into(),
            last_modified: Utc::now(),
            revision: 0,
            audio: None,
            segments,
        }
    }

    /// Настройки звука (по умолчанию, если в файле их нет)
    pub fn audio_config(&self) -> AudioConfig {
        self.audio.clone().unwrap_or_default()
    }

    /// Записать результат планирования в сегменты
    pub fn apply_timeline(&mut self, timeline: &[ShiftedSegment]) -> Result<()> {
        apply_timeline(&mut self.segments, timeline)
    }
}

/// Сохранить целевое время из таймлайна в хранимые поля сегментов
pub fn apply_timeline(segments: &mut [Segment], timeline: &[ShiftedSegment]) -> Result<()> {
    for shifted in timeline {
        let count = segments.len();
        let segment = segments.get_mut(shifted.index).ok_or_else(|| {
            SyncError::InvalidProject(format!(
                "Timeline refers to segment #{} but the project has {}",
                shifted.index, count
            ))
        })?;
        segment.target_start_time = Some(shifted.target_start_time);
        segment.target_duration = Some(shifted.target_duration);
    }
    Ok(())
}
