//! План визуальной сборки
//!
//! Для каждого сегмента определяется, сколько исходного видео читается и
//! как оно растягивается во времени, чтобы занять ровно `target_duration`
//! на выходе. Сегменты склеиваются встык или через xfade; смещения xfade
//! считаются той же накопительной суммой, что и в планировщике таймлайна.

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::RenderSettings;
use crate::error::{Result, SyncError};
use crate::media::ffmpeg::{escape_drawtext, fmt_secs, FilterChain, FilterGraph, MediaCommand, MediaInput};
use crate::media::title::{layout_title, subtitle_font_size, text_scale, TitleLayout};
use crate::segment::{ShiftedSegment, Strategy};
use crate::subtitle::SubtitleCue;
use crate::timing::{solve_crossover, TimingOptions};

/// Метка итогового видеопотока
pub const VIDEO_PAD: &str = "vout";

/// Отображение времени исходника во время выхода
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateCurve {
    Identity,
    /// Все время умножается на `factor`
    Uniform { factor: f64 },
    /// До `crossover` нормальный темп, дальше ускорение в `factor` раз
    Piecewise { crossover: f64, factor: f64 },
}

impl RateCurve {
    /// Время на выходе для момента `t` исходника (от начала сегмента)
    pub fn map(&self, t: f64) -> f64 {
        match *self {
            Self::Identity => t,
            Self::Uniform { factor } => t * factor,
            Self::Piecewise { crossover, factor } => {
                if t < crossover {
                    t
                } else {
                    crossover + (t - crossover) / factor
                }
            }
        }
    }

    /// Фильтр setpts (после сброса PTS к нулю)
    pub fn setpts_filter(&self) -> Option<String> {
        match *self {
            Self::Identity => None,
            Self::Uniform { factor } => Some(format!("setpts={:.6}*PTS", factor)),
            Self::Piecewise { crossover, factor } => {
                let x = fmt_secs(crossover);
                let n = fmt_secs(factor);
                Some(format!(
                    "setpts=if(lt(T\\,{x})\\,PTS\\,{x}/TB+(PTS-{x}/TB)/{n})",
                    x = x,
                    n = n
                ))
            }
        }
    }
}

/// Визуальный план одного сегмента
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentVisualPlan {
    pub index: usize,
    pub strategy: Strategy,
    /// Начало чтения в исходнике
    pub source_start: f64,
    /// Сколько исходника читается
    pub read_duration: f64,
    pub curve: RateCurve,
    /// Длительность на выходе (совпадает с `target_duration`)
    pub output_duration: f64,
    pub target_start: f64,
}

impl SegmentVisualPlan {
    /// Длительность прочитанного куска после изменения темпа
    pub fn retimed_duration(&self) -> f64 {
        self.curve.map(self.read_duration)
    }

    /// Сколько держится последний кадр
    pub fn hold_duration(&self) -> f64 {
        (self.output_duration - self.retimed_duration()).max(0.0)
    }
}

/// Визуальный план сегмента по его стратегии
pub fn plan_segment(shifted: &ShiftedSegment) -> SegmentVisualPlan {
    let strategy = shifted.segment.strategy;
    let visual = shifted.visual_available;
    let output = shifted.target_duration;

    let (read_duration, curve) = match strategy {
        Strategy::Trim => (shifted.total_needed.min(visual), RateCurve::Identity),
        Strategy::SpeedTotal => (
            visual,
            RateCurve::Uniform {
                factor: output / visual,
            },
        ),
        Strategy::SpeedOverflow => {
            let factor = shifted.segment.effective_speed_factor();
            let crossover = solve_crossover(visual, output, factor);
            let curve = if crossover >= visual {
                RateCurve::Identity
            } else {
                RateCurve::Piecewise { crossover, factor }
            };
            (visual, curve)
        }
        Strategy::Freeze => (visual, RateCurve::Identity),
    };

    SegmentVisualPlan {
        index: shifted.index,
        strategy,
        source_start: shifted.segment.start_time,
        read_duration,
        curve,
        output_duration: output,
        target_start: shifted.target_start_time,
    }
}

/// Способ склейки сегментов
#[derive(Debug, Clone, PartialEq)]
pub enum Stitch {
    Concat,
    /// `offsets[k]` - смещение перехода к сегменту `k + 1`
    Crossfade { duration: f64, offsets: Vec<f64> },
}

/// Смещения xfade: накопленное время выхода минус перекрытие
pub fn crossfade_offsets(durations: &[f64], transition: f64) -> Vec<f64> {
    let mut offsets = Vec::with_capacity(durations.len().saturating_sub(1));
    let mut running = match durations.first() {
        Some(first) => *first,
        None => return offsets,
    };
    for duration in &durations[1..] {
        offsets.push((running - transition).max(0.0));
        running += duration - transition;
    }
    offsets
}

/// Полный визуальный план
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRenderPlan {
    pub render: RenderSettings,
    pub segments: Vec<SegmentVisualPlan>,
    pub stitch: Stitch,
    /// Без автоподрезки исходное видео идет без перестройки
    pub retime: bool,
    pub title: Option<TitleLayout>,
    /// Субтитры, впечатываемые в кадр
    pub burned_cues: Vec<SubtitleCue>,
    /// Длительность выхода, секунды
    pub total_duration: f64,
}

/// Построитель визуального плана
pub struct VideoRenderPlanBuilder<'a> {
    render: &'a RenderSettings,
    options: TimingOptions,
    title: Option<String>,
    cues: Vec<SubtitleCue>,
}

impl<'a> VideoRenderPlanBuilder<'a> {
    pub fn new(render: &'a RenderSettings, options: TimingOptions) -> Self {
        Self {
            render,
            options,
            title: None,
            cues: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Субтитры для впечатывания; используются только при `burn_subtitles`
    pub fn with_subtitles(mut self, cues: Vec<SubtitleCue>) -> Self {
        self.cues = cues;
        self
    }

    pub fn build(&self, timeline: &[ShiftedSegment]) -> Result<VideoRenderPlan> {
        if timeline.is_empty() {
            return Err(SyncError::InvalidProject(
                "Cannot build a video plan for an empty timeline".to_string(),
            ));
        }

        let segments: Vec<SegmentVisualPlan> = timeline.iter().map(plan_segment).collect();
        for plan in &segments {
            debug!(
                "Segment #{} visual: read {:.3}s from {:.3}s, {:?}, hold {:.3}s",
                plan.index,
                plan.read_duration,
                plan.source_start,
                plan.curve,
                plan.hold_duration()
            );
        }

        let transition = self.options.transition_duration();
        let durations: Vec<f64> = segments.iter().map(|s| s.output_duration).collect();
        let stitch = if transition > 0.0 && segments.len() > 1 {
            Stitch::Crossfade {
                duration: transition,
                offsets: crossfade_offsets(&durations, transition),
            }
        } else {
            Stitch::Concat
        };

        let retime = self.options.auto_trim_video;
        let total_duration = if retime {
            let overlap = match &stitch {
                Stitch::Crossfade { duration, offsets } => duration * offsets.len() as f64,
                Stitch::Concat => 0.0,
            };
            durations.iter().sum::<f64>() - overlap
        } else {
            timeline
                .iter()
                .map(ShiftedSegment::target_end)
                .fold(0.0, f64::max)
        };

        let title = self
            .title
            .as_deref()
            .and_then(|text| layout_title(text, self.render.width, self.render.height));
        let burned_cues = if self.render.burn_subtitles {
            self.cues.clone()
        } else {
            Vec::new()
        };

        info!(
            "Video plan: {} segments, {:?}, output {:.3}s",
            segments.len(),
            if matches!(stitch, Stitch::Concat) { "concat" } else { "xfade" },
            total_duration
        );

        Ok(VideoRenderPlan {
            render: self.render.clone(),
            segments,
            stitch,
            retime,
            title,
            burned_cues,
            total_duration,
        })
    }
}

impl VideoRenderPlan {
    fn normalize_filters(&self) -> [String; 4] {
        let (w, h) = (self.render.width, self.render.height);
        [
            format!("scale={}:{}:force_original_aspect_ratio=decrease", w, h),
            format!("pad={}:{}:(ow-iw)/2:(oh-ih)/2", w, h),
            "setsar=1".to_string(),
            format!("fps={}", self.render.fps),
        ]
    }

    fn segment_chain(&self, plan: &SegmentVisualPlan, source: String, label: String) -> FilterChain {
        let mut chain = FilterChain::from_pad(source)
            .filter(format!(
                "trim=start={}:duration={}",
                fmt_secs(plan.source_start),
                fmt_secs(plan.read_duration)
            ))
            .filter("setpts=PTS-STARTPTS");
        if let Some(setpts) = plan.curve.setpts_filter() {
            chain = chain.filter(setpts);
        }
        for filter in self.normalize_filters() {
            chain = chain.filter(filter);
        }
        chain
            .filter(format!(
                "tpad=stop_mode=clone:stop_duration={}",
                fmt_secs(plan.output_duration)
            ))
            .filter(format!("trim=duration={}", fmt_secs(plan.output_duration)))
            .filter("setpts=PTS-STARTPTS")
            .output(label)
    }

    /// Наложения: заголовок и впечатанные субтитры
    fn overlay_filters(&self) -> Vec<String> {
        let mut filters = Vec::new();

        if let Some(title) = &self.title {
            let end = self
                .segments
                .first()
                .map(|s| s.output_duration)
                .unwrap_or(self.total_duration);
            let top = (self.render.height.saturating_sub(title.block_height())) / 2;
            for (i, line) in title.lines.iter().enumerate() {
                filters.push(format!(
                    "drawtext=text={}:fontsize={}:fontcolor=white:borderw={}:bordercolor=black:x=(w-text_w)/2:y={}:enable='between(t,0,{})'",
                    escape_drawtext(line),
                    title.font_size,
                    (title.font_size / 24).max(1),
                    top + i as u32 * title.line_height,
                    fmt_secs(end)
                ));
            }
        }

        if !self.burned_cues.is_empty() {
            let (w, h) = (self.render.width, self.render.height);
            let font_size = subtitle_font_size(w, h);
            let margin = (60.0 * text_scale(w, h)).round() as u32;
            for cue in &self.burned_cues {
                filters.push(format!(
                    "drawtext=text={}:fontsize={}:fontcolor=white:box=1:boxcolor=black@0.5:boxborderw={}:x=(w-text_w)/2:y=h-text_h-{}:enable='between(t,{},{})'",
                    escape_drawtext(&cue.text),
                    font_size,
                    (font_size / 4).max(1),
                    margin,
                    fmt_secs(cue.start_ms as f64 / 1000.0),
                    fmt_secs(cue.end_ms as f64 / 1000.0)
                ));
            }
        }

        filters
    }

    /// Граф фильтров видео; пустой, если видео идет без изменений
    pub fn filter_graph(&self) -> FilterGraph {
        let mut graph = FilterGraph::new();
        let overlays = self.overlay_filters();

        if !self.retime {
            if !overlays.is_empty() {
                let mut chain = FilterChain::from_pad("0:v");
                for filter in overlays {
                    chain = chain.filter(filter);
                }
                graph.push(chain.output(VIDEO_PAD));
            }
            return graph;
        }

        let count = self.segments.len();
        let sources: Vec<String> = if count > 1 {
            let labels: Vec<String> = (0..count).map(|i| format!("vsrc{}", i)).collect();
            let mut split = FilterChain::from_pad("0:v").filter(format!("split={}", count));
            for label in &labels {
                split = split.output(label.clone());
            }
            graph.push(split);
            labels
        } else {
            vec!["0:v".to_string()]
        };

        let labels: Vec<String> = (0..count).map(|i| format!("v{}", i)).collect();
        for ((plan, source), label) in self.segments.iter().zip(sources).zip(&labels) {
            graph.push(self.segment_chain(plan, source, label.clone()));
        }

        let stitched_label = if overlays.is_empty() {
            VIDEO_PAD.to_string()
        } else {
            "vstitched".to_string()
        };

        match &self.stitch {
            Stitch::Crossfade { duration, offsets } => {
                let mut current = labels[0].clone();
                for (k, offset) in offsets.iter().enumerate() {
                    let out = if k + 1 == offsets.len() {
                        stitched_label.clone()
                    } else {
                        format!("x{}", k + 1)
                    };
                    graph.push(
                        FilterChain::new([current, labels[k + 1].clone()])
                            .filter(format!(
                                "xfade=transition=fade:duration={}:offset={}",
                                fmt_secs(*duration),
                                fmt_secs(*offset)
                            ))
                            .output(out.clone()),
                    );
                    current = out;
                }
            }
            Stitch::Concat => {
                graph.push(
                    FilterChain::new(labels.iter().cloned())
                        .filter(format!("concat=n={}:v=1:a=0", count))
                        .output(stitched_label.clone()),
                );
            }
        }

        if !overlays.is_empty() {
            let mut chain = FilterChain::from_pad(stitched_label);
            for filter in overlays {
                chain = chain.filter(filter);
            }
            graph.push(chain.output(VIDEO_PAD));
        }

        graph
    }

    /// Команда финальной сборки
    ///
    /// Входы: 0 - исходное видео, 1 - звуковая дорожка, 2 - субтитры (если есть).
    pub fn to_command(
        &self,
        source_video: &Path,
        audio_track: &Path,
        subtitles: Option<&Path>,
        output: &Path,
    ) -> MediaCommand {
        let mut command = MediaCommand::new(output);
        command.add_input(MediaInput::new(source_video));
        command.add_input(MediaInput::new(audio_track));
        let subtitle_input = subtitles
            .filter(|_| self.burned_cues.is_empty())
            .map(|path| command.add_input(MediaInput::new(path)));

        let graph = self.filter_graph();
        if graph.is_empty() {
            command.map("0:v");
            command.output_args(["-c:v", "copy"]);
        } else {
            command.set_filter_graph(graph);
            command.map(format!("[{}]", VIDEO_PAD));
            command.output_args([
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-profile:v",
                "high",
                "-r",
            ]);
            command.output_arg(self.render.fps.to_string());
        }

        command.map("1:a");
        command.output_args(["-c:a", "aac", "-b:a", "192k"]);

        if let Some(index) = subtitle_input {
            command.map(format!("{}:s", index));
            command.output_args(["-c:s", "mov_text"]);
        }

        command.output_args(["-movflags", "+faststart"]);
        command
    }

    /// Путь по умолчанию для результата рядом с исходником
    pub fn default_output(source_video: &Path) -> PathBuf {
        let stem = source_video
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        source_video.with_file_name(format!("{}_narrated.mp4", stem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Segment;
    use crate::timing::plan_timeline;

    fn segment(start: f64, audio: f64, strategy: Strategy) -> Segment {
        Segment {
            audio_duration: Some(audio),
            strategy,
            ..Segment::new(start, "text")
        }
    }

    fn options(auto_trim: bool, transitions: bool) -> TimingOptions {
        TimingOptions {
            auto_trim_video: auto_trim,
            enable_transitions: transitions,
        }
    }

    #[test]
    fn test_rate_curves() {
        assert_eq!(RateCurve::Identity.map(2.0), 2.0);
        assert_eq!(RateCurve::Uniform { factor: 1.5 }.map(2.0), 3.0);
        let piecewise = RateCurve::Piecewise {
            crossover: 1.0,
            factor: 2.0,
        };
        assert_eq!(piecewise.map(0.5), 0.5);
        assert_eq!(piecewise.map(3.0), 2.0);
        assert_eq!(
            piecewise.setpts_filter().unwrap(),
            "setpts=if(lt(T\\,1)\\,PTS\\,1/TB+(PTS-1/TB)/2)"
        );
        assert!(RateCurve::Identity.setpts_filter().is_none());
    }

    #[test]
    fn test_strategy_table() {
        let segments = vec![
            segment(0.0, 2.0, Strategy::Trim),
            segment(10.0, 5.0, Strategy::SpeedTotal),
            segment(14.0, 3.0, Strategy::SpeedOverflow),
            segment(20.0, 1.0, Strategy::Freeze),
            segment(30.0, 1.0, Strategy::Trim),
        ];
        let timeline = plan_timeline(&segments, options(true, false));
        let plans: Vec<_> = timeline.iter().map(plan_segment).collect();

        // trim: читается столько, сколько нужно озвучке
        assert!((plans[0].read_duration - 2.8).abs() < 1e-9);
        assert_eq!(plans[0].curve, RateCurve::Identity);
        assert!(plans[0].hold_duration() < 1e-9);

        // speed_total: 4 с исходника растягиваются в 5.8 с
        assert_eq!(plans[1].read_duration, 4.0);
        match plans[1].curve {
            RateCurve::Uniform { factor } => assert!((factor - 5.8 / 4.0).abs() < 1e-9),
            other => panic!("unexpected curve {:?}", other),
        }
        assert!((plans[1].retimed_duration() - 5.8).abs() < 1e-9);

        // speed_overflow: 6 с исходника, выход 3.8 с, N = 2 -> x = 1.6
        assert_eq!(plans[2].read_duration, 6.0);
        match plans[2].curve {
            RateCurve::Piecewise { crossover, factor } => {
                assert!((crossover - 1.6).abs() < 1e-9);
                assert_eq!(factor, 2.0);
            }
            other => panic!("unexpected curve {:?}", other),
        }
        assert!((plans[2].retimed_duration() - 3.8).abs() < 1e-9);

        // freeze: весь отрезок плюс стоп-кадр не нужен (10 с > 1.8 с)
        assert_eq!(plans[3].read_duration, 10.0);
        assert!((plans[3].output_duration - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_freeze_holds_last_frame() {
        let segments = vec![
            segment(0.0, 4.0, Strategy::Freeze),
            segment(2.0, 1.0, Strategy::Trim),
        ];
        let timeline = plan_timeline(&segments, options(true, false));
        let plan = plan_segment(&timeline[0]);
        assert_eq!(plan.read_duration, 2.0);
        assert!((plan.hold_duration() - 2.8).abs() < 1e-9);
    }

    #[test]
    fn test_crossfade_offsets_match_timeline() {
        let segments = vec![
            segment(0.0, 2.0, Strategy::Trim),
            segment(5.0, 3.0, Strategy::Trim),
            segment(9.0, 1.0, Strategy::Trim),
        ];
        let timeline = plan_timeline(&segments, options(true, true));
        let render = RenderSettings::default();
        let plan = VideoRenderPlanBuilder::new(&render, options(true, true))
            .build(&timeline)
            .unwrap();

        let Stitch::Crossfade { duration, offsets } = &plan.stitch else {
            panic!("transitions must produce xfade");
        };
        assert_eq!(*duration, 0.5);
        assert_eq!(offsets.len(), 2);
        for (offset, shifted) in offsets.iter().zip(&timeline[1..]) {
            assert!((offset - shifted.target_start_time).abs() < 1e-9);
        }
        let last = timeline.last().unwrap();
        assert!((plan.total_duration - last.target_end()).abs() < 1e-9);

        let graph = plan.filter_graph().to_string();
        assert!(graph.starts_with("[0:v]split=3[vsrc0][vsrc1][vsrc2]"));
        assert!(graph.contains("[v0][v1]xfade=transition=fade:duration=0.5:offset=2.8[x1]"));
        assert!(graph.contains("[x1][v2]xfade=transition=fade:duration=0.5:offset=6.6[vout]"));
    }

    #[test]
    fn test_concat_without_transitions() {
        let segments = vec![
            segment(0.0, 2.0, Strategy::Trim),
            segment(5.0, 3.0, Strategy::SpeedOverflow),
        ];
        let timeline = plan_timeline(&segments, options(true, false));
        let render = RenderSettings::default();
        let plan = VideoRenderPlanBuilder::new(&render, options(true, false))
            .build(&timeline)
            .unwrap();
        assert_eq!(plan.stitch, Stitch::Concat);

        let graph = plan.filter_graph().to_string();
        assert!(graph.contains(
            "[vsrc0]trim=start=0:duration=2.8,setpts=PTS-STARTPTS,scale=1920:1080:force_original_aspect_ratio=decrease"
        ));
        assert!(graph.contains("tpad=stop_mode=clone:stop_duration=2.8,trim=duration=2.8"));
        assert!(graph.ends_with("[v0][v1]concat=n=2:v=1:a=0[vout]"));
    }

    #[test]
    fn test_passthrough_without_auto_trim() {
        let segments = vec![segment(0.0, 2.0, Strategy::Trim)];
        let timeline = plan_timeline(&segments, options(false, false));
        let render = RenderSettings::default();
        let plan = VideoRenderPlanBuilder::new(&render, options(false, false))
            .build(&timeline)
            .unwrap();
        assert!(plan.filter_graph().is_empty());

        let args: Vec<String> = plan
            .to_command(
                Path::new("in.mp4"),
                Path::new("mix.wav"),
                Some(Path::new("subs.srt")),
                Path::new("out.mp4"),
            )
            .to_args()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let joined = args.join(" ");
        assert!(joined.contains("-map 0:v -map 1:a -map 2:s -c:v copy"));
        assert!(joined.contains("-c:s mov_text"));
        assert!(!joined.contains("-filter_complex"));
    }

    #[test]
    fn test_title_and_burned_subtitles() {
        let segments = vec![segment(0.0, 2.0, Strategy::Trim)];
        let timeline = plan_timeline(&segments, options(true, false));
        let render = RenderSettings {
            burn_subtitles: true,
            ..RenderSettings::default()
        };
        let plan = VideoRenderPlanBuilder::new(&render, options(true, false))
            .with_title("Intro: part 1")
            .with_subtitles(vec![SubtitleCue::new(0, 1500, "Hello world")])
            .build(&timeline)
            .unwrap();

        let graph = plan.filter_graph().to_string();
        assert!(graph.contains("[v0]concat=n=1:v=1:a=0[vstitched]"));
        assert!(graph.contains("drawtext=text=Intro\\\\: part 1:fontsize=96"));
        assert!(graph.contains("y=480:enable='between(t,0,2.8)'"));
        assert!(graph.contains("enable='between(t,0,1.5)'"));

        let args: Vec<String> = plan
            .to_command(
                Path::new("in.mp4"),
                Path::new("mix.wav"),
                Some(Path::new("subs.srt")),
                Path::new("out.mp4"),
            )
            .to_args()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        // впечатанные субтитры не добавляются отдельной дорожкой
        assert!(!args.iter().any(|a| a == "subs.srt"));
        assert!(args.iter().any(|a| a == "libx264"));
    }

    #[test]
    fn test_empty_timeline_is_rejected() {
        let render = RenderSettings::default();
        let result = VideoRenderPlanBuilder::new(&render, options(true, false)).build(&[]);
        assert!(result.is_err());
    }
}
