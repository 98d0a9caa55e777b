//! Модуль обработки ошибок библиотеки narration-sync
//!
//! Этот модуль содержит типы ошибок, которые могут возникнуть при работе библиотеки.

use thiserror::Error;

/// Ошибки библиотеки narration-sync
#[derive(Debug, Error)]
pub enum SyncError {
    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ошибка конфигурации (в том числе отсутствующие учетные данные)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Файл не найден
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Некорректный файл проекта или список сегментов
    #[error("Invalid project: {0}")]
    InvalidProject(String),

    /// Файл проекта был изменен другим процессом
    #[error("Project file was modified concurrently (expected revision {expected}, found {found})")]
    ProjectConflict { expected: u64, found: u64 },

    /// Внешний медиа-движок завершился с ошибкой
    #[error("Media engine failed with {status}: {diagnostics}")]
    MediaEngine { status: String, diagnostics: String },

    /// Ошибка синтеза речи
    #[error("Speech synthesis error: {0}")]
    Synthesis(String),

    /// Ошибка переписывания текста
    #[error("Rewrite error: {0}")]
    Rewrite(String),

    /// Ошибка обработки аудио
    #[error("Audio processing error: {0}")]
    AudioProcessing(String),

    /// Другая ошибка
    #[error("Other error: {0}")]
    Other(String),
}

impl From<&str> for SyncError {
    fn from(s: &str) -> Self {
        SyncError::Other(s.to_string())
    }
}

impl From<String> for SyncError {
    fn from(s: String) -> Self {
        SyncError::Other(s)
    }
}

/// Тип Result для библиотеки narration-sync
pub type Result<T> = std::result::Result<T, SyncError>;
