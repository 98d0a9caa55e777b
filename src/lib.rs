//! narration-sync
//!
//! Библиотека выравнивания озвучки с видео: подгонка текста под время,
//! планирование таймлайна по стратегиям, сборка оригинальной дорожки с
//! отключением и приглушением, сведение озвучки, субтитры по меткам слов и
//! план визуальной сборки для ffmpeg.

pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod progress;
pub mod project;
pub mod refiner;
pub mod segment;
pub mod subtitle;
pub mod synthesis;
pub mod timing;
pub mod utils;

pub use config::{AudioConfig, AudioMode, DuckingConfig, PipelineConfig, RenderSettings, VoiceSettings};
pub use error::{Result, SyncError};
pub use media::{FfmpegEngine, MediaCommand, MediaEngine};
pub use pipeline::{NarrationJob, NarrationOutput, NarrationPipeline};
pub use progress::{ProcessStep, ProgressInfo, ProgressObserver, ProgressTracker};
pub use project::ProjectFile;
pub use refiner::{RefinementOutcome, Rewriter, ScriptRefiner};
pub use segment::{Segment, ShiftedSegment, Strategy, WordBoundary};
pub use subtitle::SubtitleCue;
pub use synthesis::{SynthesisOutput, Synthesizer};
pub use timing::{plan_timeline, MuteWindow, TimingOptions};
pub use utils::logger::init_logger;
