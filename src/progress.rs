//! Модуль для отслеживания прогресса выполнения конвейера
//!
//! Наблюдатели получают уведомления синхронно; дополнительно каждое
//! обновление публикуется в broadcast-канал для асинхронных подписчиков.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Информация о прогрессе выполнения операции
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressInfo {
    /// Текущий этап операции
    pub step: String,
    /// Процент выполнения текущего этапа (0.0 - 100.0)
    pub step_progress: f32,
    /// Общий процент выполнения (0.0 - 100.0)
    pub total_progress: f32,
    pub details: Option<String>,
}

impl ProgressInfo {
    pub fn new(
        step: impl Into<String>,
        step_progress: f32,
        total_progress: f32,
        details: Option<String>,
    ) -> Self {
        Self {
            step: step.into(),
            step_progress: step_progress.clamp(0.0, 100.0),
            total_progress: total_progress.clamp(0.0, 100.0),
            details,
        }
    }
}

/// Наблюдатель, получающий уведомления о прогрессе
pub trait ProgressObserver: Send + Sync {
    fn on_progress_update(&self, progress: ProgressInfo);
}

/// Этапы конвейера озвучки
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStep {
    ScriptRefinement,
    SpeechSynthesis,
    TimelinePlanning,
    AudioComposition,
    VideoComposition,
    Subtitles,
}

impl ProcessStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScriptRefinement => "Подгонка текста",
            Self::SpeechSynthesis => "Синтез речи",
            Self::TimelinePlanning => "Планирование таймлайна",
            Self::AudioComposition => "Сборка звука",
            Self::VideoComposition => "Сборка видео",
            Self::Subtitles => "Субтитры",
        }
    }

    /// Весовой коэффициент этапа (в процентах от общего процесса)
    pub fn weight(&self) -> f32 {
        match self {
            Self::ScriptRefinement => 10.0,
            Self::SpeechSynthesis => 40.0,
            Self::TimelinePlanning => 5.0,
            Self::AudioComposition => 15.0,
            Self::VideoComposition => 25.0,
            Self::Subtitles => 5.0,
        }
    }
}

struct TrackerState {
    current_step: ProcessStep,
    step_progress: f32,
    total_progress: f32,
    completed_steps: HashMap<ProcessStep, f32>,
}

/// Трекер прогресса конвейера
pub struct ProgressTracker {
    state: RwLock<TrackerState>,
    observers: RwLock<HashMap<usize, Box<dyn ProgressObserver>>>,
    next_id: AtomicUsize,
    tx: broadcast::Sender<ProgressInfo>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self {
            state: RwLock::new(TrackerState {
                current_step: ProcessStep::ScriptRefinement,
                step_progress: 0.0,
                total_progress: 0.0,
                completed_steps: HashMap::new(),
            }),
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
            tx,
        }
    }

    /// Добавить наблюдателя; возвращает идентификатор для удаления
    pub fn add_observer(&self, observer: Box<dyn ProgressObserver>) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.observers.write().insert(id, observer);
        id
    }

    pub fn remove_observer(&self, id: usize) -> Option<Box<dyn ProgressObserver>> {
        self.observers.write().remove(&id)
    }

    /// Подписаться на обновления через канал
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressInfo> {
        self.tx.subscribe()
    }

    /// Установить текущий этап; предыдущий считается завершенным
    pub fn set_step(&self, step: ProcessStep) {
        {
            let mut state = self.state.write();
            if state.current_step == step {
                return;
            }
            let previous = state.current_step;
            state.completed_steps.insert(previous, 100.0);
            state.current_step = step;
            state.step_progress = 0.0;
            Self::update_total_progress(&mut state);
        }
        self.report_progress(None);
    }

    /// Обновить прогресс текущего этапа
    pub fn update_step_progress(&self, progress: f32, details: Option<String>) {
        {
            let mut state = self.state.write();
            state.step_progress = progress.clamp(0.0, 100.0);
            Self::update_total_progress(&mut state);
        }
        self.report_progress(details);
    }

    /// Прогресс по количеству обработанных элементов
    pub fn update_items(&self, done: usize, total: usize, details: Option<String>) {
        let progress = if total == 0 {
            100.0
        } else {
            done as f32 / total as f32 * 100.0
        };
        self.update_step_progress(progress, details);
    }

    /// Общий прогресс считается по весам всех этапов, поэтому пропущенные
    /// этапы не дают дойти до 100 до вызова `complete`
    fn update_total_progress(state: &mut TrackerState) {
        let all_weight: f32 = [
            ProcessStep::ScriptRefinement,
            ProcessStep::SpeechSynthesis,
            ProcessStep::TimelinePlanning,
            ProcessStep::AudioComposition,
            ProcessStep::VideoComposition,
            ProcessStep::Subtitles,
        ]
        .iter()
        .map(ProcessStep::weight)
        .sum();

        let mut total: f32 = state
            .completed_steps
            .iter()
            .filter(|(step, _)| **step != state.current_step)
            .map(|(step, progress)| step.weight() * progress / 100.0)
            .sum();
        total += state.current_step.weight() * state.step_progress / 100.0;

        state.total_progress = (total / all_weight * 100.0).clamp(0.0, 100.0);
    }

    fn report_progress(&self, details: Option<String>) {
        let progress = {
            let state = self.state.read();
            ProgressInfo::new(
                state.current_step.as_str(),
                state.step_progress,
                state.total_progress,
                details,
            )
        };

        for observer in self.observers.read().values() {
            observer.on_progress_update(progress.clone());
        }
        // Ошибка означает лишь отсутствие подписчиков
        let _ = self.tx.send(progress);
    }

    /// Отметить завершение всего процесса
    pub fn complete(&self) {
        {
            let mut state = self.state.write();
            let current = state.current_step;
            state.completed_steps.insert(current, 100.0);
            state.step_progress = 100.0;
            state.total_progress = 100.0;
        }
        self.report_progress(Some("Процесс завершен".to_string()));
    }

    pub fn total_progress(&self) -> f32 {
        self.state.read().total_progress
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
