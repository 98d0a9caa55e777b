//! Модуль планирования таймлайна
//!
//! Расчет целевого начала и длительности сегментов, а также окон
//! отключения оригинального звука для ускоренных хвостов.

pub mod overflow;
pub mod planner;

pub use overflow::{mute_windows, solve_crossover, MuteWindow};
pub use planner::{plan_timeline, TimingOptions};
