//! Модуль субтитров: нарезка по словам и файлы SRT

pub mod segmenter;
pub mod srt;

pub use segmenter::{cues_for_timeline, merge_segment_boundaries, segment_words, SubtitleCue};
pub use srt::{format_timestamp, parse_srt, parse_srt_file, render_srt, write_srt};
