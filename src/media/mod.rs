//! Модуль для сборки звука и видео через внешний медиа-движок

pub mod ffmpeg;
pub mod merger;
pub mod original_track;
pub mod title;
pub mod video;

pub use ffmpeg::{FfmpegEngine, FilterChain, FilterGraph, MediaCommand, MediaEngine, MediaInput};
pub use merger::{clips_from_timeline, merge_clips, MergeClip};
pub use original_track::{OriginalTrackComposer, OriginalTrackPlan};
pub use title::{layout_title, TitleLayout};
pub use video::{RateCurve, SegmentVisualPlan, Stitch, VideoRenderPlan, VideoRenderPlanBuilder};
