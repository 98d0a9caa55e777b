//! Модуль конфигурации библиотеки narration-sync
//!
//! Конфигурация создается один раз на запуск конвейера и явно передается
//! в каждый компонент. Глобального изменяемого состояния нет.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::segment::Strategy;

/// Настройки голоса, передаваемые синтезатору речи
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceSettings {
    /// Идентификатор голоса
    pub voice: String,
    /// Модель синтеза
    pub model: String,
    /// Скорость речи (0.25 - 4.0)
    pub speed: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            voice: "alloy".to_string(),
            model: "tts-1".to_string(),
            speed: 1.0,
        }
    }
}

/// Параметры выходного видео
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderSettings {
    /// Ширина кадра в пикселях
    pub width: u32,
    /// Высота кадра в пикселях
    pub height: u32,
    /// Частота кадров
    pub fps: u32,
    /// Впечатывать субтитры в кадр вместо отдельной дорожки
    #[serde(default)]
    pub burn_subtitles: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            burn_subtitles: false,
        }
    }
}

/// Настройки внешнего медиа-движка (ffmpeg/ffprobe)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSettings {
    /// Путь или имя исполняемого файла ffmpeg
    pub ffmpeg_path: String,
    /// Путь или имя исполняемого файла ffprobe
    pub ffprobe_path: String,
    /// Сколько последних символов диагностики показывать при ошибке
    pub diagnostic_tail: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            diagnostic_tail: 2500,
        }
    }
}

/// Конфигурация конвейера
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Темп речи, слов в секунду (для расчета бюджета слов)
    pub words_per_second: f64,
    /// Сдвигать сегменты вплотную друг к другу (убирая лишнее видео)
    pub auto_trim_video: bool,
    /// Плавные переходы между сегментами
    pub enable_transitions: bool,
    /// Количество попыток для внешних сервисов (переписывание, синтез)
    pub max_attempts: usize,
    /// Параметры выходного видео
    pub render: RenderSettings,
    /// Настройки медиа-движка
    pub engine: EngineSettings,
    /// Настройки голоса
    pub voice: VoiceSettings,
    /// Удалять временные файлы после завершения
    pub cleanup_temp_files: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            words_per_second: 2.5,
            auto_trim_video: true,
            enable_transitions: false,
            max_attempts: 3,
            render: RenderSettings::default(),
            engine: EngineSettings::default(),
            voice: VoiceSettings::default(),
            cleanup_temp_files: true,
        }
    }
}

impl PipelineConfig {
    /// Проверить корректность конфигурации до запуска конвейера
    pub fn validate(&self) -> Result<()> {
        if !self.words_per_second.is_finite() || self.words_per_second <= 0.0 {
            return Err(SyncError::Configuration(format!(
                "words_per_second must be positive, got {}",
                self.words_per_second
            )));
        }
        if self.render.width == 0 || self.render.height == 0 {
            return Err(SyncError::Configuration(format!(
                "Invalid output resolution {}x{}",
                self.render.width, self.render.height
            )));
        }
        if self.render.fps == 0 {
            return Err(SyncError::Configuration("fps must be positive".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(SyncError::Configuration(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Режим работы с оригинальной звуковой дорожкой
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioMode {
    /// Только озвучка, оригинал не используется
    #[default]
    Replace,
    /// Оригинал и озвучка смешиваются
    Mix,
    /// Оригинал приглушается под озвучкой (sidechain)
    Duck,
}

/// Параметры приглушения оригинала
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DuckingConfig {
    #[serde(default = "default_attack_ms")]
    pub attack_ms: f64,
    #[serde(default = "default_release_ms")]
    pub release_ms: f64,
    /// Порог срабатывания компрессора, dB
    #[serde(default = "default_target_gain_db")]
    pub target_gain_db: f64,
}

fn default_attack_ms() -> f64 {
    100.0
}

fn default_release_ms() -> f64 {
    300.0
}

fn default_target_gain_db() -> f64 {
    -24.0
}

impl Default for DuckingConfig {
    fn default() -> Self {
        Self {
            attack_ms: default_attack_ms(),
            release_ms: default_release_ms(),
            target_gain_db: default_target_gain_db(),
        }
    }
}

/// Правило по умолчанию для конкретной стратегии
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StrategyRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mute_original: Option<bool>,
}

/// Настройки звука проекта (хранятся в файле проекта)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfig {
    #[serde(default)]
    pub mode: AudioMode,
    /// Усиление оригинала; если не задано, зависит от режима
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_gain_db: Option<f64>,
    #[serde(default)]
    pub narration_gain_db: f64,
    #[serde(default)]
    pub ducking: DuckingConfig,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub strategy_rules: BTreeMap<Strategy, StrategyRule>,
}

impl AudioConfig {
    /// Усиление оригинальной дорожки: 0 dB для mix, -14 dB для остальных режимов
    pub fn effective_original_gain_db(&self) -> f64 {
        self.original_gain_db.unwrap_or(match self.mode {
            AudioMode::Mix => 0.0,
            _ => -14.0,
        })
    }

    /// Правило отключения оригинала для стратегии, если оно задано
    pub fn rule_mutes(&self, strategy: Strategy) -> Option<bool> {
        self.strategy_rules
            .get(&strategy)
            .and_then(|rule| rule.mute_original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.engine.diagnostic_tail, 2500);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.words_per_second = 0.0;
        assert!(matches!(config.validate(), Err(SyncError::Configuration(_))));

        let mut config = PipelineConfig::default();
        config.render.height = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_original_gain_defaults_by_mode() {
        let mut audio = AudioConfig::default();
        assert_eq!(audio.effective_original_gain_db(), -14.0);
        audio.mode = AudioMode::Mix;
        assert_eq!(audio.effective_original_gain_db(), 0.0);
        audio.original_gain_db = Some(-6.0);
        assert_eq!(audio.effective_original_gain_db(), -6.0);
    }

    #[test]
    fn test_audio_config_from_json() {
        let json = r#"{
            "mode": "duck",
            "ducking": { "attackMs": 50 },
            "strategyRules": { "speed_overflow": { "muteOriginal": true } }
        }"#;
        let audio: AudioConfig = serde_json::from_str(json).unwrap();
        assert_eq!(audio.mode, AudioMode::Duck);
        assert_eq!(audio.ducking.attack_ms, 50.0);
        assert_eq!(audio.ducking.release_ms, 300.0);
        assert_eq!(audio.rule_mutes(Strategy::SpeedOverflow), Some(true));
        assert_eq!(audio.rule_mutes(Strategy::Trim), None);
    }
}
