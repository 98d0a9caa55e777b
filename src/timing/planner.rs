//! Планировщик таймлайна
//!
//! Чистая функция: одинаковый вход всегда дает одинаковый выход. Накопленное
//! смещение передается через свертку по упорядоченным сегментам.

use log::debug;

use crate::segment::{Segment, ShiftedSegment, Strategy};

/// Пауза после озвучки, секунды
pub const PADDING_DURATION: f64 = 0.8;
/// Длительность перехода между сегментами, секунды
pub const TRANSITION_DURATION: f64 = 0.5;
/// Длительность озвучки, если она еще не измерена
pub const DEFAULT_AUDIO_DURATION: f64 = 5.0;
/// Минимальный визуальный отрезок (один кадр при 30 fps)
pub const MIN_VISUAL_DURATION: f64 = 0.033;

/// Флаги планирования
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingOptions {
    pub auto_trim_video: bool,
    pub enable_transitions: bool,
}

impl TimingOptions {
    pub fn transition_duration(&self) -> f64 {
        if self.enable_transitions {
            TRANSITION_DURATION
        } else {
            0.0
        }
    }
}

/// Рассчитать целевое время для каждого сегмента
pub fn plan_timeline(segments: &[Segment], options: TimingOptions) -> Vec<ShiftedSegment> {
    let transition = options.transition_duration();

    let (timeline, _) = segments.iter().enumerate().fold(
        (Vec::with_capacity(segments.len()), 0.0_f64),
        |(mut timeline, cursor), (index, segment)| {
            let next_start_time = segments.get(index + 1).map(|next| next.start_time);

            let audio_needed =
                segment.audio_duration.unwrap_or(DEFAULT_AUDIO_DURATION) + PADDING_DURATION;
            let tail_needed = if next_start_time.is_some() {
                transition
            } else {
                0.0
            };
            let total_needed = audio_needed + tail_needed;
            let visual_available = match next_start_time {
                Some(next) => (next - segment.start_time).max(MIN_VISUAL_DURATION),
                None => audio_needed,
            };

            let segment_duration = match segment.strategy {
                Strategy::Freeze => total_needed.max(visual_available),
                _ => total_needed,
            };

            let target_start_time = if options.auto_trim_video {
                cursor
            } else {
                segment.start_time
            };

            debug!(
                "Segment #{}: start {:.3}s -> {:.3}s, duration {:.3}s (visual {:.3}s, {:?})",
                index,
                segment.start_time,
                target_start_time,
                segment_duration,
                visual_available,
                segment.strategy
            );

            timeline.push(ShiftedSegment {
                index,
                segment: segment.clone(),
                target_start_time,
                target_duration: segment_duration,
                audio_needed,
                tail_needed,
                total_needed,
                visual_available,
                next_start_time,
            });

            (timeline, cursor + segment_duration - tail_needed)
        },
    );

    timeline
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, audio: f64, strategy: Strategy) -> Segment {
        Segment {
            audio_duration: Some(audio),
            strategy,
            ..Segment::new(start, "text")
        }
    }

    const AUTO: TimingOptions = TimingOptions {
        auto_trim_video: true,
        enable_transitions: false,
    };

    #[test]
    fn test_auto_trim_starts_at_zero_and_accumulates() {
        let segments = vec![
            segment(0.0, 2.0, Strategy::Trim),
            segment(10.0, 3.0, Strategy::Trim),
            segment(12.0, 1.0, Strategy::Trim),
        ];
        let timeline = plan_timeline(&segments, AUTO);

        assert_eq!(timeline[0].target_start_time, 0.0);
        assert!((timeline[1].target_start_time - 2.8).abs() < 1e-9);
        assert!((timeline[2].target_start_time - 6.6).abs() < 1e-9);
        assert!((timeline[2].target_duration - 1.8).abs() < 1e-9);
    }

    #[test]
    fn test_target_start_is_non_decreasing() {
        let segments: Vec<Segment> = (0..20)
            .map(|i| {
                let strategy = match i % 4 {
                    0 => Strategy::Trim,
                    1 => Strategy::SpeedTotal,
                    2 => Strategy::SpeedOverflow,
                    _ => Strategy::Freeze,
                };
                segment(i as f64 * 1.7, (i % 5) as f64 * 0.9, strategy)
            })
            .collect();

        for enable_transitions in [false, true] {
            let timeline = plan_timeline(
                &segments,
                TimingOptions {
                    auto_trim_video: true,
                    enable_transitions,
                },
            );
            assert_eq!(timeline[0].target_start_time, 0.0);
            for pair in timeline.windows(2) {
                assert!(pair[1].target_start_time >= pair[0].target_start_time);
            }
        }
    }

    #[test]
    fn test_freeze_uses_available_visual_time() {
        let segments = vec![
            segment(0.0, 1.0, Strategy::Freeze),
            segment(8.0, 1.0, Strategy::Trim),
        ];
        let timeline = plan_timeline(&segments, AUTO);
        assert_eq!(timeline[0].target_duration, 8.0);
        assert_eq!(timeline[1].target_start_time, 8.0);
    }

    #[test]
    fn test_transitions_overlap_tail() {
        let segments = vec![
            segment(0.0, 2.0, Strategy::Trim),
            segment(5.0, 2.0, Strategy::Trim),
        ];
        let timeline = plan_timeline(
            &segments,
            TimingOptions {
                auto_trim_video: true,
                enable_transitions: true,
            },
        );
        assert_eq!(timeline[0].tail_needed, TRANSITION_DURATION);
        assert!((timeline[0].target_duration - 3.3).abs() < 1e-9);
        assert!((timeline[1].target_start_time - 2.8).abs() < 1e-9);
        assert_eq!(timeline[1].tail_needed, 0.0);
    }

    #[test]
    fn test_without_auto_trim_keeps_source_times() {
        let segments = vec![
            segment(1.0, 2.0, Strategy::Trim),
            segment(7.5, 2.0, Strategy::Trim),
        ];
        let timeline = plan_timeline(&segments, TimingOptions::default());
        assert_eq!(timeline[0].target_start_time, 1.0);
        assert_eq!(timeline[1].target_start_time, 7.5);
    }

    #[test]
    fn test_zero_gap_and_missing_audio() {
        let segments = vec![
            Segment::new(3.0, "a"),
            Segment::new(3.0, "b"),
        ];
        let timeline = plan_timeline(&segments, AUTO);
        assert_eq!(timeline[0].visual_available, MIN_VISUAL_DURATION);
        assert_eq!(timeline[0].audio_needed, DEFAULT_AUDIO_DURATION + PADDING_DURATION);
        // последний сегмент: визуального бюджета ровно на озвучку
        assert_eq!(timeline[1].visual_available, timeline[1].audio_needed);
    }

    #[test]
    fn test_planning_is_pure() {
        let segments = vec![
            segment(0.0, 2.0, Strategy::SpeedOverflow),
            segment(4.0, 6.0, Strategy::Freeze),
        ];
        let first = plan_timeline(&segments, AUTO);
        let second = plan_timeline(&segments, AUTO);
        assert_eq!(first, second);
    }
}
