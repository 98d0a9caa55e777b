//! Сведение клипов озвучки в одну дорожку
//!
//! Каждый клип при необходимости обрезается с коротким затуханием в точке
//! обрезки, сдвигается на свое место на таймлайне, затем все клипы
//! суммируются без нормализации громкости.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{Result, SyncError};
use crate::media::ffmpeg::{fmt_secs, FilterChain, FilterGraph, MediaCommand, MediaEngine, MediaInput};
use crate::segment::ShiftedSegment;

/// Длительность затухания в конце обрезанного клипа, секунды
pub const FADE_OUT_DURATION: f64 = 0.035;
/// Минимальная длительность клипа при обрезке, секунды
const MIN_CLIP_DURATION: f64 = 0.05;
/// Метка выходной дорожки в графе
pub const NARRATION_PAD: &str = "narration";

/// Клип озвучки на таймлайне
#[derive(Debug, Clone, PartialEq)]
pub struct MergeClip {
    pub audio_path: PathBuf,
    /// Начало клипа на выходном таймлайне, секунды
    pub start_time: f64,
    pub max_duration_sec: Option<f64>,
}

impl MergeClip {
    pub fn new(audio_path: impl Into<PathBuf>, start_time: f64) -> Self {
        Self {
            audio_path: audio_path.into(),
            start_time,
            max_duration_sec: None,
        }
    }

    pub fn with_max_duration(mut self, max_duration_sec: f64) -> Self {
        self.max_duration_sec = Some(max_duration_sec);
        self
    }

    /// Задержка в целых миллисекундах
    pub fn delay_ms(&self) -> u64 {
        (self.start_time.max(0.0) * 1000.0).round() as u64
    }
}

/// Клипы по спланированному таймлайну
///
/// Клип ограничен длительностью сегмента и не заходит на начало следующего.
pub fn clips_from_timeline(timeline: &[ShiftedSegment]) -> Result<Vec<MergeClip>> {
    timeline
        .iter()
        .enumerate()
        .map(|(pos, shifted)| {
            let path = shifted.segment.audio_path.as_ref().ok_or_else(|| {
                SyncError::InvalidProject(format!(
                    "Segment #{} has no synthesized audio",
                    shifted.index
                ))
            })?;

            let mut limit = shifted.target_duration;
            if let Some(next) = timeline.get(pos + 1) {
                limit = limit.min(next.target_start_time - shifted.target_start_time);
            }
            if limit < MIN_CLIP_DURATION {
                warn!(
                    "Segment #{} has only {:.3}s before the next one, clip kept at {}s",
                    shifted.index, limit, MIN_CLIP_DURATION
                );
                limit = MIN_CLIP_DURATION;
            }

            Ok(MergeClip::new(path, shifted.target_start_time).with_max_duration(limit))
        })
        .collect()
}

/// Цепочка для одного клипа: обрезка, затухание, задержка
fn clip_chain(input_index: usize, clip: &MergeClip, label: &str) -> FilterChain {
    let mut chain = FilterChain::from_pad(format!("{}:a", input_index));

    if let Some(max) = clip.max_duration_sec {
        let duration = max.max(MIN_CLIP_DURATION);
        let fade = FADE_OUT_DURATION.min(duration);
        chain = chain
            .filter(format!("atrim=end={}", fmt_secs(duration)))
            .filter("asetpts=PTS-STARTPTS")
            .filter(format!(
                "afade=t=out:st={}:d={}",
                fmt_secs(duration - fade),
                fmt_secs(fade)
            ));
    }

    chain
        .filter(format!("adelay=delays={}:all=1", clip.delay_ms()))
        .output(label)
}

/// Граф сведения; входы клипов начинаются с `first_input`
pub fn build_merge_graph(
    clips: &[MergeClip],
    first_input: usize,
    narration_gain_db: f64,
    output_label: &str,
) -> FilterGraph {
    let mut graph = FilterGraph::new();
    let labels: Vec<String> = (0..clips.len()).map(|i| format!("clip{}", i)).collect();

    for (i, clip) in clips.iter().enumerate() {
        graph.push(clip_chain(first_input + i, clip, &labels[i]));
    }

    let mut mix = FilterChain::new(labels.iter().cloned()).filter(format!(
        "amix=inputs={}:duration=longest:dropout_transition=0:normalize=0",
        clips.len()
    ));
    if narration_gain_db != 0.0 {
        mix = mix.filter(format!("volume={}dB", fmt_secs(narration_gain_db)));
    }
    graph.push(mix.output(output_label));
    graph
}

/// Команда сведения клипов в файл
pub fn build_merge_command(
    clips: &[MergeClip],
    output: &Path,
    narration_gain_db: f64,
) -> Result<MediaCommand> {
    if clips.is_empty() {
        return Err(SyncError::InvalidProject(
            "No narration clips to merge".to_string(),
        ));
    }

    let mut command = MediaCommand::new(output);
    for clip in clips {
        command.add_input(MediaInput::new(&clip.audio_path));
    }
    command.set_filter_graph(build_merge_graph(clips, 0, narration_gain_db, NARRATION_PAD));
    command.map(format!("[{}]", NARRATION_PAD));
    command.output_args(["-ar", "48000", "-ac", "2"]);
    Ok(command)
}

/// Свести клипы и записать результат в `output`
pub async fn merge_clips(
    engine: &dyn MediaEngine,
    clips: &[MergeClip],
    output: &Path,
    narration_gain_db: f64,
) -> Result<PathBuf> {
    for clip in clips {
        if !clip.audio_path.exists() {
            return Err(SyncError::FileNotFound(clip.audio_path.display().to_string()));
        }
    }

    let command = build_merge_command(clips, output, narration_gain_db)?;
    engine.run(&command).await?;
    info!("Merged {} narration clips into {}", clips.len(), output.display());
    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Segment;

    fn shifted(index: usize, start: f64, duration: f64, audio: Option<&str>) -> ShiftedSegment {
        let mut segment = Segment::new(start, "text");
        segment.audio_path = audio.map(str::to_string);
        ShiftedSegment {
            index,
            segment,
            target_start_time: start,
            target_duration: duration,
            audio_needed: duration,
            tail_needed: 0.0,
            total_needed: duration,
            visual_available: duration,
            next_start_time: None,
        }
    }

    #[test]
    fn test_clip_filters_trim_fade_and_delay() {
        let clips = vec![
            MergeClip::new("a.mp3", 0.0).with_max_duration(2.5),
            MergeClip::new("b.mp3", 3.2004),
        ];
        let graph = build_merge_graph(&clips, 0, 0.0, "out").to_string();

        assert!(graph.contains(
            "[0:a]atrim=end=2.5,asetpts=PTS-STARTPTS,afade=t=out:st=2.465:d=0.035,adelay=delays=0:all=1[clip0]"
        ));
        assert!(graph.contains("[1:a]adelay=delays=3200:all=1[clip1]"));
        assert!(graph.ends_with(
            "[clip0][clip1]amix=inputs=2:duration=longest:dropout_transition=0:normalize=0[out]"
        ));
    }

    #[test]
    fn test_gain_and_input_offset() {
        let clips = vec![MergeClip::new("a.mp3", 1.0)];
        let graph = build_merge_graph(&clips, 2, -3.0, "n").to_string();
        assert!(graph.starts_with("[2:a]adelay=delays=1000:all=1[clip0]"));
        assert!(graph.contains("normalize=0,volume=-3dB[n]"));
    }

    #[test]
    fn test_merge_command_requires_clips() {
        let result = build_merge_command(&[], Path::new("out.wav"), 0.0);
        assert!(matches!(result, Err(SyncError::InvalidProject(_))));
    }

    #[test]
    fn test_clips_from_timeline() {
        let timeline = vec![
            shifted(0, 0.0, 4.0, Some("s0.mp3")),
            shifted(1, 3.0, 2.0, Some("s1.mp3")),
        ];
        let clips = clips_from_timeline(&timeline).unwrap();
        assert_eq!(clips[0].max_duration_sec, Some(3.0));
        assert_eq!(clips[1].max_duration_sec, Some(2.0));
        assert_eq!(clips[1].delay_ms(), 3000);

        let missing = vec![shifted(0, 0.0, 4.0, None)];
        assert!(clips_from_timeline(&missing).is_err());
    }
}
