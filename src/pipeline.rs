//! Конвейер озвучки видео
//!
//! Этапы идут строго по порядку: подгонка текста, синтез, планирование
//! таймлайна, сборка звука, сборка видео и субтитры. После каждого этапа,
//! меняющего сегменты, файл проекта перезаписывается с проверкой ревизии.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info};

use crate::config::PipelineConfig;
use crate::error::{Result, SyncError};
use crate::media::ffmpeg::{FfmpegEngine, MediaEngine};
use crate::media::merger::{clips_from_timeline, merge_clips};
use crate::media::original_track::OriginalTrackComposer;
use crate::media::video::VideoRenderPlanBuilder;
use crate::progress::{ProcessStep, ProgressTracker};
use crate::project::{load_project, save_project_checked, ProjectFile};
use crate::refiner::{RefinementOutcome, Rewriter, ScriptRefiner};
use crate::segment::{ShiftedSegment, WordBoundary};
use crate::subtitle::{cues_for_timeline, write_srt};
use crate::synthesis::{SynthesisStage, Synthesizer};
use crate::timing::{plan_timeline, TimingOptions};
use crate::utils::temp::TempFileManager;

/// Что и куда собирать
#[derive(Debug, Clone)]
pub struct NarrationJob {
    pub project_path: PathBuf,
    pub video_path: PathBuf,
    pub output_path: PathBuf,
    /// Заголовок поверх первого сегмента
    pub title: Option<String>,
    /// Куда складывать озвучку; по умолчанию рядом с файлом проекта
    pub audio_dir: Option<PathBuf>,
}

impl NarrationJob {
    pub fn new(
        project_path: impl Into<PathBuf>,
        video_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project_path: project_path.into(),
            video_path: video_path.into(),
            output_path: output_path.into(),
            title: None,
            audio_dir: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Директория для аудио сегментов
    pub fn resolved_audio_dir(&self, project: &ProjectFile) -> PathBuf {
        self.audio_dir.clone().unwrap_or_else(|| {
            let parent = self
                .project_path
                .parent()
                .unwrap_or_else(|| Path::new("."));
            let stem = Path::new(&project.video_name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "project".to_string());
            parent.join(format!("{}_narration", stem))
        })
    }

    /// Файл субтитров рядом с результатом
    pub fn subtitle_path(&self) -> PathBuf {
        self.output_path.with_extension("srt")
    }
}

/// Результат полного запуска
#[derive(Debug, Clone)]
pub struct NarrationOutput {
    pub video: PathBuf,
    pub subtitles: PathBuf,
    pub timeline: Vec<ShiftedSegment>,
    pub refinement: Vec<RefinementOutcome>,
}

/// Конвейер озвучки
pub struct NarrationPipeline {
    config: PipelineConfig,
    engine: Arc<dyn MediaEngine>,
    progress: Option<Arc<ProgressTracker>>,
}

impl NarrationPipeline {
    pub fn new(config: PipelineConfig, engine: Arc<dyn MediaEngine>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            engine,
            progress: None,
        })
    }

    /// Конвейер с ffmpeg из настроек
    pub fn with_ffmpeg(config: PipelineConfig) -> Result<Self> {
        let engine = FfmpegEngine::from_settings(&config.engine)?;
        Self::new(config, Arc::new(engine))
    }

    pub fn with_progress(mut self, progress: Arc<ProgressTracker>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn timing_options(&self) -> TimingOptions {
        TimingOptions {
            auto_trim_video: self.config.auto_trim_video,
            enable_transitions: self.config.enable_transitions,
        }
    }

    fn step(&self, step: ProcessStep) {
        if let Some(progress) = &self.progress {
            progress.set_step(step);
        }
    }

    /// Подогнать текст сегментов под время
    pub async fn refine(
        &self,
        project: &mut ProjectFile,
        rewriter: &dyn Rewriter,
        video_duration: f64,
    ) -> Result<Vec<RefinementOutcome>> {
        self.step(ProcessStep::ScriptRefinement);
        let refiner = ScriptRefiner::new(rewriter, self.config.words_per_second)
            .with_max_attempts(self.config.max_attempts);
        let outcomes = refiner
            .refine_segments(&mut project.segments, video_duration)
            .await?;

        let truncated = outcomes
            .iter()
            .filter(|o| matches!(o, RefinementOutcome::Truncated))
            .count();
        info!(
            "Refined {} segments ({} truncated)",
            outcomes.len(),
            truncated
        );
        Ok(outcomes)
    }

    /// Озвучить сегменты
    pub async fn synthesize(
        &self,
        project: &mut ProjectFile,
        synthesizer: &dyn Synthesizer,
        audio_dir: &Path,
    ) -> Result<Vec<Vec<WordBoundary>>> {
        self.step(ProcessStep::SpeechSynthesis);
        let mut stage =
            SynthesisStage::new(synthesizer, &self.config.voice, self.config.max_attempts);
        if let Some(progress) = &self.progress {
            stage = stage.with_progress(progress);
        }
        stage.run(&mut project.segments, audio_dir).await
    }

    /// Рассчитать таймлайн и записать целевое время в сегменты
    pub fn plan(&self, project: &mut ProjectFile) -> Result<Vec<ShiftedSegment>> {
        self.step(ProcessStep::TimelinePlanning);
        let timeline = plan_timeline(&project.segments, self.timing_options());
        project.apply_timeline(&timeline)?;
        Ok(timeline)
    }

    /// Собрать звук, видео и субтитры по готовому таймлайну
    pub async fn render(
        &self,
        project: &ProjectFile,
        timeline: &[ShiftedSegment],
        boundaries: &[Vec<WordBoundary>],
        job: &NarrationJob,
        video_duration: f64,
    ) -> Result<PathBuf> {
        let mut temp = TempFileManager::new(self.config.cleanup_temp_files)?;
        let audio = project.audio_config();

        self.step(ProcessStep::AudioComposition);
        let clips = clips_from_timeline(timeline)?;
        let narration = temp.reserve_path("narration", "wav");
        merge_clips(
            self.engine.as_ref(),
            &clips,
            &narration,
            audio.narration_gain_db,
        )
        .await?;

        let mixed = temp.reserve_path("mixed", "wav");
        let track_plan = OriginalTrackComposer::new(&audio).plan(
            timeline,
            &job.video_path,
            video_duration,
            &narration,
            &mixed,
        )?;
        let audio_track = OriginalTrackComposer::compose(self.engine.as_ref(), &track_plan).await?;

        self.step(ProcessStep::Subtitles);
        let cues = cues_for_timeline(timeline, boundaries);
        let subtitle_path = job.subtitle_path();
        write_srt(&subtitle_path, &cues)?;

        self.step(ProcessStep::VideoComposition);
        let mut builder = VideoRenderPlanBuilder::new(&self.config.render, self.timing_options())
            .with_subtitles(cues.clone());
        if let Some(title) = &job.title {
            builder = builder.with_title(title.clone());
        }
        let plan = builder.build(timeline)?;
        let subtitles = if cues.is_empty() {
            None
        } else {
            Some(subtitle_path.as_path())
        };
        let command = plan.to_command(&job.video_path, &audio_track, subtitles, &job.output_path);
        self.engine.run(&command).await?;

        temp.cleanup()?;
        info!("Rendered {}", job.output_path.display());
        Ok(job.output_path.clone())
    }

    /// Полный запуск: проверка, подгонка, синтез, план, сборка
    pub async fn run(
        &self,
        job: &NarrationJob,
        rewriter: &dyn Rewriter,
        synthesizer: &dyn Synthesizer,
    ) -> Result<NarrationOutput> {
        let result = self.run_inner(job, rewriter, synthesizer).await;
        if let Err(e) = &result {
            error!("Narration pipeline failed: {}", e);
        }
        result
    }

    async fn run_inner(
        &self,
        job: &NarrationJob,
        rewriter: &dyn Rewriter,
        synthesizer: &dyn Synthesizer,
    ) -> Result<NarrationOutput> {
        if !job.video_path.exists() {
            return Err(SyncError::FileNotFound(format!(
                "Source video not found: {}",
                job.video_path.display()
            )));
        }
        let mut project = load_project(&job.project_path)?;
        if project.segments.is_empty() {
            return Err(SyncError::InvalidProject(
                "Project has no segments".to_string(),
            ));
        }

        let video_duration = self.engine.probe_duration(&job.video_path).await?;
        info!(
            "Project {}: {} segments, video {:.3}s",
            project.video_name,
            project.segments.len(),
            video_duration
        );

        let refinement = self.refine(&mut project, rewriter, video_duration).await?;
        save_project_checked(&job.project_path, &mut project)?;

        let audio_dir = job.resolved_audio_dir(&project);
        let boundaries = self.synthesize(&mut project, synthesizer, &audio_dir).await?;
        save_project_checked(&job.project_path, &mut project)?;

        let timeline = self.plan(&mut project)?;
        save_project_checked(&job.project_path, &mut project)?;

        let video = self
            .render(&project, &timeline, &boundaries, job, video_duration)
            .await?;

        if let Some(progress) = &self.progress {
            progress.complete();
        }

        Ok(NarrationOutput {
            video,
            subtitles: job.subtitle_path(),
            timeline,
            refinement,
        })
    }
}
