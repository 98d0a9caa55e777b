//! Ускоренные хвосты сегментов speed_overflow
//!
//! Точка перехода `x` находится из уравнения `x + (V - x) / N = W`:
//! первые `x` секунд исходника идут в нормальном темпе, остаток ускорен в
//! `N` раз, и все вместе занимает `W` секунд выходного таймлайна.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::AudioConfig;
use crate::segment::{ShiftedSegment, Strategy};

/// Окно отключения оригинала не длиннее последних 2.2 секунды
pub const MAX_MUTE_TAIL: f64 = 2.2;
/// Окна короче 5 мс не применяются
pub const MIN_MUTE_WINDOW: f64 = 0.005;

/// Интервал выходного таймлайна, где оригинальный звук отключен
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MuteWindow {
    pub start: f64,
    pub end: f64,
}

impl MuteWindow {
    /// Окно создается только если оно не короче `MIN_MUTE_WINDOW`
    pub fn new(start: f64, end: f64) -> Option<Self> {
        if start.is_finite() && end.is_finite() && end - start >= MIN_MUTE_WINDOW - 1e-9 {
            Some(Self { start, end })
        } else {
            None
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Найти точку перехода к ускоренному воспроизведению
///
/// * `visual_available` - V, сколько исходного видео есть у сегмента
/// * `output_duration` - W, сколько сегмент занимает на выходе
/// * `speed_factor` - N, округляется вниз и не меньше 2
pub fn solve_crossover(visual_available: f64, output_duration: f64, speed_factor: f64) -> f64 {
    let v = visual_available.max(0.0);
    let n = speed_factor.floor().max(2.0);
    let x = (n * output_duration - v) / (n - 1.0);
    x.clamp(0.0, v)
}

/// Конец зоны ускорения: начало следующего сегмента или конец текущего
fn overflow_end(timeline: &[ShiftedSegment], position: usize) -> f64 {
    timeline
        .get(position + 1)
        .map(|next| next.target_start_time)
        .unwrap_or_else(|| timeline[position].target_end())
}

/// Окно для ускоренного хвоста одного сегмента
pub fn overflow_window(timeline: &[ShiftedSegment], position: usize) -> Option<MuteWindow> {
    let shifted = timeline.get(position)?;
    if shifted.segment.strategy != Strategy::SpeedOverflow {
        return None;
    }

    let x = solve_crossover(
        shifted.visual_available,
        shifted.target_duration,
        shifted.segment.effective_speed_factor(),
    );
    let end = overflow_end(timeline, position);
    let start = (shifted.target_start_time + x).max(end - MAX_MUTE_TAIL);

    let window = MuteWindow::new(start, end);
    if window.is_none() {
        debug!(
            "Segment #{}: overflow window [{:.3}, {:.3}] is too short, skipped",
            shifted.index, start, end
        );
    }
    window
}

/// Запрошено ли полное отключение оригинала для сегмента
///
/// Только сегменты speed_overflow могут отключать оригинал; по умолчанию нет.
pub fn full_mute_requested(shifted: &ShiftedSegment, audio: &AudioConfig) -> bool {
    let strategy = shifted.segment.strategy;
    let requested = shifted
        .segment
        .audio_override
        .as_ref()
        .and_then(|o| o.mute_original)
        .or_else(|| audio.rule_mutes(strategy))
        .unwrap_or(false);

    if requested && strategy != Strategy::SpeedOverflow {
        warn!(
            "Segment #{}: full mute is only supported for speed_overflow, ignored for {:?}",
            shifted.index, strategy
        );
        return false;
    }
    requested
}

/// Все окна отключения оригинала на выходном таймлайне, по возрастанию
pub fn mute_windows(timeline: &[ShiftedSegment], audio: &AudioConfig) -> Vec<MuteWindow> {
    let mut windows: Vec<MuteWindow> = (0..timeline.len())
        .filter_map(|position| {
            let shifted = &timeline[position];
            if full_mute_requested(shifted, audio) {
                MuteWindow::new(shifted.target_start_time, overflow_end(timeline, position))
            } else {
                overflow_window(timeline, position)
            }
        })
        .collect();

    windows.sort_by(|a, b| a.start.total_cmp(&b.start));
    windows
}
