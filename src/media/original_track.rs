//! Сборка оригинальной звуковой дорожки вместе с озвучкой
//!
//! Для каждого сегмента из исходника вырезается кусок звука, ослабляется и
//! ставится на место сегмента на выходном таймлайне. Затем на ускоренных
//! участках звук отключается, и дорожка смешивается с озвучкой или
//! приглушается под нее.

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::{AudioConfig, AudioMode, DuckingConfig};
use crate::error::{Result, SyncError};
use crate::media::ffmpeg::{fmt_secs, FilterChain, FilterGraph, MediaCommand, MediaEngine, MediaInput};
use crate::segment::ShiftedSegment;
use crate::timing::{mute_windows, MuteWindow};

/// Минимальная длина куска оригинала, секунды
pub const MIN_SLICE_DURATION: f64 = 0.02;
/// Метка итоговой дорожки
pub const MIXED_PAD: &str = "mixed";

const SIDECHAIN_RATIO: u32 = 20;

/// Результат планирования дорожки
#[derive(Debug, Clone, PartialEq)]
pub enum OriginalTrackPlan {
    /// Оригинал не используется; дорожка озвучки идет как есть
    NarrationOnly(PathBuf),
    /// Нужен запуск движка
    Composite {
        command: MediaCommand,
        windows: Vec<MuteWindow>,
        output: PathBuf,
    },
}

impl OriginalTrackPlan {
    /// Путь к дорожке, которая пойдет в итоговое видео
    pub fn output_path(&self) -> &Path {
        match self {
            Self::NarrationOnly(path) => path,
            Self::Composite { output, .. } => output,
        }
    }
}

/// Кусок исходного звука для одного сегмента
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OriginalSlice {
    /// Начало в исходном видео
    pub source_start: f64,
    pub used: f64,
    /// Начало на выходном таймлайне
    pub target_start: f64,
}

/// Куски исходного звука по таймлайну
pub fn original_slices(timeline: &[ShiftedSegment], source_duration: f64) -> Vec<OriginalSlice> {
    timeline
        .iter()
        .map(|shifted| {
            let start = shifted.segment.start_time;
            let raw = match shifted.next_start_time {
                Some(next) => next - start,
                None if source_duration > start => source_duration - start,
                None => shifted.target_duration,
            };
            OriginalSlice {
                source_start: start,
                used: raw.min(shifted.target_duration).max(MIN_SLICE_DURATION),
                target_start: shifted.target_start_time,
            }
        })
        .collect()
}

/// Порог компрессора в линейных единицах (ffmpeg принимает 0.00098..1)
pub fn sidechain_threshold(target_gain_db: f64) -> f64 {
    10f64.powf(target_gain_db / 20.0).clamp(0.000_976_563, 1.0)
}

/// Фильтр приглушения оригинала под озвучкой
pub fn sidechain_filter(ducking: &DuckingConfig) -> String {
    format!(
        "sidechaincompress=threshold={:.6}:ratio={}:attack={}:release={}",
        sidechain_threshold(ducking.target_gain_db),
        SIDECHAIN_RATIO,
        fmt_secs(ducking.attack_ms.clamp(0.01, 2000.0)),
        fmt_secs(ducking.release_ms.clamp(0.01, 9000.0))
    )
}

/// Фильтр отключения звука в окне
pub fn mute_gate(window: &MuteWindow) -> String {
    format!(
        "volume=0:enable='between(t,{},{})'",
        fmt_secs(window.start),
        fmt_secs(window.end)
    )
}

/// Планировщик оригинальной дорожки
pub struct OriginalTrackComposer<'a> {
    audio: &'a AudioConfig,
}

impl<'a> OriginalTrackComposer<'a> {
    pub fn new(audio: &'a AudioConfig) -> Self {
        Self { audio }
    }

    /// Построить план; в режиме replace граф не строится вообще
    pub fn plan(
        &self,
        timeline: &[ShiftedSegment],
        source_video: &Path,
        source_duration: f64,
        narration: &Path,
        output: &Path,
    ) -> Result<OriginalTrackPlan> {
        if self.audio.mode == AudioMode::Replace {
            debug!("Audio mode replace, original track is not used");
            return Ok(OriginalTrackPlan::NarrationOnly(narration.to_path_buf()));
        }
        if timeline.is_empty() {
            return Err(SyncError::InvalidProject(
                "Cannot compose original track for an empty timeline".to_string(),
            ));
        }

        let windows = mute_windows(timeline, self.audio);
        let slices = original_slices(timeline, source_duration);
        let graph = self.build_graph(&slices, &windows);

        let mut command = MediaCommand::new(output);
        command.add_input(MediaInput::new(source_video));
        command.add_input(MediaInput::new(narration));
        command.set_filter_graph(graph);
        command.map(format!("[{}]", MIXED_PAD));
        command.output_args(["-ar", "48000", "-ac", "2"]);

        info!(
            "Original track: mode {:?}, {} slices, {} mute windows",
            self.audio.mode,
            slices.len(),
            windows.len()
        );

        Ok(OriginalTrackPlan::Composite {
            command,
            windows,
            output: output.to_path_buf(),
        })
    }

    /// Вход 0 - исходное видео, вход 1 - дорожка озвучки
    pub fn build_graph(&self, slices: &[OriginalSlice], windows: &[MuteWindow]) -> FilterGraph {
        let mut graph = FilterGraph::new();
        let gain_db = self.audio.effective_original_gain_db();

        // Каждый вход в графе можно использовать один раз
        let sources: Vec<String> = if slices.len() > 1 {
            let labels: Vec<String> = (0..slices.len()).map(|i| format!("src{}", i)).collect();
            let mut split = FilterChain::from_pad("0:a").filter(format!("asplit={}", slices.len()));
            for label in &labels {
                split = split.output(label.clone());
            }
            graph.push(split);
            labels
        } else {
            vec!["0:a".to_string()]
        };

        let mut pieces = Vec::with_capacity(slices.len());
        for (i, (slice, source)) in slices.iter().zip(&sources).enumerate() {
            let label = format!("orig{}", i);
            graph.push(
                FilterChain::from_pad(source.clone())
                    .filter(format!(
                        "atrim=start={}:end={}",
                        fmt_secs(slice.source_start),
                        fmt_secs(slice.source_start + slice.used)
                    ))
                    .filter("asetpts=PTS-STARTPTS")
                    .filter(format!("volume={}dB", fmt_secs(gain_db)))
                    .filter(format!(
                        "adelay=delays={}:all=1",
                        (slice.target_start.max(0.0) * 1000.0).round() as u64
                    ))
                    .output(label.clone()),
            );
            pieces.push(label);
        }

        let mut current = if pieces.len() > 1 {
            graph.push(
                FilterChain::new(pieces.iter().cloned())
                    .filter(format!(
                        "amix=inputs={}:duration=longest:dropout_transition=0:normalize=0",
                        pieces.len()
                    ))
                    .output("orig"),
            );
            "orig".to_string()
        } else {
            pieces[0].clone()
        };

        if !windows.is_empty() {
            let mut gates = FilterChain::from_pad(current);
            for window in windows {
                gates = gates.filter(mute_gate(window));
            }
            graph.push(gates.output("orig_gated"));
            current = "orig_gated".to_string();
        }

        match self.audio.mode {
            AudioMode::Duck => {
                graph.push(
                    FilterChain::from_pad("1:a")
                        .filter("asplit=2")
                        .output("nar_sc")
                        .output("nar_mix"),
                );
                graph.push(
                    FilterChain::new([current, "nar_sc".to_string()])
                        .filter(sidechain_filter(&self.audio.ducking))
                        .output("ducked"),
                );
                graph.push(
                    FilterChain::new(["ducked", "nar_mix"])
                        .filter("amix=inputs=2:duration=longest:dropout_transition=0:normalize=0")
                        .output(MIXED_PAD),
                );
            }
            _ => {
                graph.push(
                    FilterChain::new([current, "1:a".to_string()])
                        .filter("amix=inputs=2:duration=longest:dropout_transition=0:normalize=0")
                        .output(MIXED_PAD),
                );
            }
        }

        graph
    }

    /// Выполнить план; возвращает путь к итоговой дорожке
    pub async fn compose(engine: &dyn MediaEngine, plan: &OriginalTrackPlan) -> Result<PathBuf> {
        if let OriginalTrackPlan::Composite { command, .. } = plan {
            engine.run(command).await?;
        }
        Ok(plan.output_path().to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{Segment, Strategy};
    use crate::timing::{plan_timeline, TimingOptions};

    fn timeline() -> Vec<ShiftedSegment> {
        let segments = vec![
            Segment {
                audio_duration: Some(6.0),
                strategy: Strategy::SpeedOverflow,
                speed_factor: Some(2.0),
                ..Segment::new(0.0, "first")
            },
            Segment {
                audio_duration: Some(2.0),
                ..Segment::new(3.0, "second")
            },
        ];
        plan_timeline(
            &segments,
            TimingOptions {
                auto_trim_video: true,
                enable_transitions: false,
            },
        )
    }

    #[test]
    fn test_replace_mode_returns_narration_unchanged() {
        let audio = AudioConfig::default();
        let composer = OriginalTrackComposer::new(&audio);
        let plan = composer
            .plan(
                &timeline(),
                Path::new("video.mp4"),
                10.0,
                Path::new("narration.wav"),
                Path::new("mixed.wav"),
            )
            .unwrap();
        assert_eq!(plan, OriginalTrackPlan::NarrationOnly(PathBuf::from("narration.wav")));
    }

    #[test]
    fn test_slices_use_visual_budget() {
        let slices = original_slices(&timeline(), 10.0);
        assert_eq!(slices[0].source_start, 0.0);
        assert_eq!(slices[0].used, 3.0);
        // последний сегмент: остаток видео (7 с) против длительности 2.8 с
        assert!((slices[1].used - 2.8).abs() < 1e-9);
        assert!((slices[1].target_start - 6.8).abs() < 1e-9);
    }

    #[test]
    fn test_mix_graph_with_overflow_gate() {
        let audio = AudioConfig {
            mode: AudioMode::Mix,
            ..AudioConfig::default()
        };
        let composer = OriginalTrackComposer::new(&audio);
        let plan = composer
            .plan(
                &timeline(),
                Path::new("video.mp4"),
                10.0,
                Path::new("narration.wav"),
                Path::new("mixed.wav"),
            )
            .unwrap();

        let OriginalTrackPlan::Composite { command, windows, .. } = plan else {
            panic!("mix mode must build a filter graph");
        };
        assert_eq!(windows.len(), 1);
        let graph = command.filter_graph.unwrap().to_string();
        assert!(graph.starts_with("[0:a]asplit=2[src0][src1]"));
        assert!(graph.contains("[src0]atrim=start=0:end=3,asetpts=PTS-STARTPTS,volume=0dB"));
        assert!(graph.contains("adelay=delays=6800:all=1[orig1]"));
        assert!(graph.contains("volume=0:enable='between(t,4.6,6.8)'"));
        assert!(graph.ends_with("[orig_gated][1:a]amix=inputs=2:duration=longest:dropout_transition=0:normalize=0[mixed]"));
        assert!(!graph.contains("sidechaincompress"));
    }

    #[test]
    fn test_duck_graph_uses_linear_threshold() {
        let audio = AudioConfig {
            mode: AudioMode::Duck,
            ..AudioConfig::default()
        };
        let composer = OriginalTrackComposer::new(&audio);
        let slices = vec![OriginalSlice {
            source_start: 1.0,
            used: 2.0,
            target_start: 0.0,
        }];
        let graph = composer.build_graph(&slices, &[]).to_string();

        assert!(!graph.contains("asplit=1"));
        assert!(graph.starts_with("[0:a]atrim=start=1:end=3"));
        assert!(graph.contains("volume=-14dB"));
        assert!(graph.contains("[1:a]asplit=2[nar_sc][nar_mix]"));
        assert!(graph.contains(
            "[orig0][nar_sc]sidechaincompress=threshold=0.063096:ratio=20:attack=100:release=300[ducked]"
        ));
    }

    #[test]
    fn test_threshold_conversion() {
        assert!((sidechain_threshold(0.0) - 1.0).abs() < 1e-12);
        assert!((sidechain_threshold(-20.0) - 0.1).abs() < 1e-12);
        assert_eq!(sidechain_threshold(-90.0), 0.000_976_563);
    }
}
