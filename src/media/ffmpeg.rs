//! Граница с внешним медиа-движком (ffmpeg/ffprobe)
//!
//! Граф фильтров и аргументы собираются как структуры и превращаются в
//! вектор аргументов только при запуске процесса. Пути к файлам всегда
//! передаются отдельными аргументами, шелл не используется.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, error, info};
use tokio::process::Command as TokioCommand;

use crate::config::EngineSettings;
use crate::error::{Result, SyncError};

/// Одна цепочка фильтров: `[in1][in2]f1,f2[out]`
#[derive(Debug, Clone, PartialEq)]
pub struct FilterChain {
    inputs: Vec<String>,
    filters: Vec<String>,
    outputs: Vec<String>,
}

impl FilterChain {
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            filters: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Цепочка с одним входом
    pub fn from_pad(input: impl Into<String>) -> Self {
        Self::new([input.into()])
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    pub fn output(mut self, label: impl Into<String>) -> Self {
        self.outputs.push(label.into());
        self
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for input in &self.inputs {
            write!(f, "[{}]", input)?;
        }
        write!(f, "{}", self.filters.join(","))?;
        for output in &self.outputs {
            write!(f, "[{}]", output)?;
        }
        Ok(())
    }
}

/// Граф фильтров для `-filter_complex`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGraph {
    chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chain: FilterChain) {
        self.chains.push(chain);
    }

    pub fn chains(&self) -> &[FilterChain] {
        &self.chains
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Есть ли в графе фильтр с таким именем
    pub fn uses_filter(&self, name: &str) -> bool {
        self.chains.iter().any(|chain| {
            chain
                .filters
                .iter()
                .any(|f| f == name || f.starts_with(&format!("{}=", name)))
        })
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.chains.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join(";"))
    }
}

/// Входной файл с опциями, которые ставятся перед `-i`
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInput {
    pub options: Vec<OsString>,
    pub path: PathBuf,
}

impl MediaInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            options: Vec::new(),
            path: path.into(),
        }
    }

    pub fn with_option(mut self, option: impl Into<OsString>) -> Self {
        self.options.push(option.into());
        self
    }
}

/// Полное описание одного запуска ffmpeg
#[derive(Debug, Clone, PartialEq)]
pub struct MediaCommand {
    pub inputs: Vec<MediaInput>,
    pub filter_graph: Option<FilterGraph>,
    pub maps: Vec<String>,
    pub output_args: Vec<OsString>,
    pub output: PathBuf,
}

impl MediaCommand {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            inputs: Vec::new(),
            filter_graph: None,
            maps: Vec::new(),
            output_args: Vec::new(),
            output: output.into(),
        }
    }

    /// Добавить вход; возвращает его индекс
    pub fn add_input(&mut self, input: MediaInput) -> usize {
        self.inputs.push(input);
        self.inputs.len() - 1
    }

    pub fn set_filter_graph(&mut self, graph: FilterGraph) {
        self.filter_graph = Some(graph).filter(|g| !g.is_empty());
    }

    pub fn map(&mut self, spec: impl Into<String>) {
        self.maps.push(spec.into());
    }

    pub fn output_arg(&mut self, arg: impl Into<OsString>) {
        self.output_args.push(arg.into());
    }

    pub fn output_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
    }

    /// Вектор аргументов ffmpeg (без имени программы)
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-y".into()];

        for input in &self.inputs {
            args.extend(input.options.iter().cloned());
            args.push("-i".into());
            args.push(input.path.clone().into_os_string());
        }

        if let Some(graph) = &self.filter_graph {
            args.push("-filter_complex".into());
            args.push(graph.to_string().into());
        }

        for map in &self.maps {
            args.push("-map".into());
            args.push(map.into());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.clone().into_os_string());
        args
    }
}

/// Внешний медиа-движок
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Выполнить команду; ненулевой код выхода - ошибка `MediaEngine`
    async fn run(&self, command: &MediaCommand) -> Result<()>;

    /// Длительность медиафайла в секундах
    async fn probe_duration(&self, path: &Path) -> Result<f64>;
}

/// Последние `max_chars` символов диагностики
pub fn diagnostic_tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}

fn escape_chars(text: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Экранировать текст для `drawtext=text=...` внутри `-filter_complex`
///
/// Три уровня: подстановки drawtext, опции фильтра, граф фильтров.
pub fn escape_drawtext(text: &str) -> String {
    let expansion = escape_chars(text, &['\\', '%']);
    let option = escape_chars(&expansion, &['\\', '\'', ':']);
    escape_chars(&option, &['\\', '\'', '[', ']', ',', ';'])
}

/// Движок на основе процессов ffmpeg и ffprobe
pub struct FfmpegEngine {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    diagnostic_tail: usize,
}

impl FfmpegEngine {
    /// Найти исполняемые файлы по настройкам (имя в PATH или полный путь)
    pub fn from_settings(settings: &EngineSettings) -> Result<Self> {
        let ffmpeg = which::which(&settings.ffmpeg_path).map_err(|e| {
            SyncError::Configuration(format!("ffmpeg not found ({}): {}", settings.ffmpeg_path, e))
        })?;
        let ffprobe = which::which(&settings.ffprobe_path).map_err(|e| {
            SyncError::Configuration(format!(
                "ffprobe not found ({}): {}",
                settings.ffprobe_path, e
            ))
        })?;
        info!("Using ffmpeg at {}", ffmpeg.display());

        Ok(Self::with_paths(ffmpeg, ffprobe, settings.diagnostic_tail))
    }

    /// Без поиска в PATH
    pub fn with_paths(
        ffmpeg: impl Into<PathBuf>,
        ffprobe: impl Into<PathBuf>,
        diagnostic_tail: usize,
    ) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            diagnostic_tail,
        }
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn run(&self, command: &MediaCommand) -> Result<()> {
        let args = command.to_args();
        debug!("Executing ffmpeg command: {:?}", args);

        let output = TokioCommand::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let diagnostics = diagnostic_tail(&stderr, self.diagnostic_tail);
            error!("ffmpeg failed with {}: {}", output.status, diagnostics);
            return Err(SyncError::MediaEngine {
                status: output.status.to_string(),
                diagnostics,
            });
        }

        Ok(())
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        if !path.exists() {
            return Err(SyncError::FileNotFound(path.display().to_string()));
        }

        let output = TokioCommand::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SyncError::MediaEngine {
                status: output.status.to_string(),
                diagnostics: diagnostic_tail(&stderr, self.diagnostic_tail),
            });
        }

        let duration_str = String::from_utf8_lossy(&output.stdout);
        duration_str.trim().parse::<f64>().map_err(|_| {
            SyncError::AudioProcessing(format!("Failed to parse duration: {}", duration_str.trim()))
        })
    }
}

/// Секунды для аргументов фильтров
pub(crate) fn fmt_secs(value: f64) -> String {
    let text = format!("{:.3}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text.is_empty() || text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_graph_rendering() {
        let mut graph = FilterGraph::new();
        graph.push(
            FilterChain::from_pad("0:a")
                .filter("atrim=0:2.5")
                .filter("adelay=delays=1000:all=1")
                .output("a0"),
        );
        graph.push(
            FilterChain::new(["a0", "a1"])
                .filter("amix=inputs=2:normalize=0")
                .output("out"),
        );

        assert_eq!(
            graph.to_string(),
            "[0:a]atrim=0:2.5,adelay=delays=1000:all=1[a0];[a0][a1]amix=inputs=2:normalize=0[out]"
        );
        assert!(graph.uses_filter("amix"));
        assert!(!graph.uses_filter("sidechaincompress"));
    }

    #[test]
    fn test_paths_stay_discrete_arguments() {
        let mut command = MediaCommand::new("/tmp/out put.m4a");
        command.add_input(MediaInput::new("/tmp/evil; rm -rf ~.mp3"));
        command.add_input(MediaInput::new("/tmp/clip.mp3").with_option("-ss").with_option("1.5"));
        let mut graph = FilterGraph::new();
        graph.push(FilterChain::new(["0:a", "1:a"]).filter("amix=inputs=2").output("a"));
        command.set_filter_graph(graph);
        command.map("[a]");
        command.output_args(["-c:a", "aac"]);

        let args: Vec<String> = command
            .to_args()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            vec![
                "-hide_banner",
                "-y",
                "-i",
                "/tmp/evil; rm -rf ~.mp3",
                "-ss",
                "1.5",
                "-i",
                "/tmp/clip.mp3",
                "-filter_complex",
                "[0:a][1:a]amix=inputs=2[a]",
                "-map",
                "[a]",
                "-c:a",
                "aac",
                "/tmp/out put.m4a",
            ]
        );
    }

    #[test]
    fn test_empty_graph_is_omitted() {
        let mut command = MediaCommand::new("out.mp4");
        command.set_filter_graph(FilterGraph::new());
        assert!(command.filter_graph.is_none());
        assert!(!command
            .to_args()
            .iter()
            .any(|a| a.to_str() == Some("-filter_complex")));
    }

    #[test]
    fn test_diagnostic_tail_is_char_safe() {
        assert_eq!(diagnostic_tail("short", 10), "short");
        assert_eq!(diagnostic_tail("abcdef", 3), "def");
        assert_eq!(diagnostic_tail("ошибка", 2), "ка");
    }

    #[test]
    fn test_escape_drawtext() {
        assert_eq!(escape_drawtext("Plain title"), "Plain title");
        assert_eq!(escape_drawtext("a:b"), "a\\\\:b");
        assert_eq!(escape_drawtext("one, two"), "one\\, two");
        assert_eq!(escape_drawtext("it's"), "it\\\\\\'s");
        assert_eq!(escape_drawtext("100%"), "100\\\\\\\\%");
    }

    #[test]
    fn test_fmt_secs() {
        assert_eq!(fmt_secs(1.5), "1.5");
        assert_eq!(fmt_secs(2.0), "2");
        assert_eq!(fmt_secs(0.0004), "0");
        assert_eq!(fmt_secs(3.14159), "3.142");
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let engine = FfmpegEngine::with_paths("/nonexistent/ffmpeg", "/nonexistent/ffprobe", 2500);
        let result = engine.run(&MediaCommand::new("/tmp/never.mp4")).await;
        assert!(matches!(result, Err(SyncError::Io(_))));
    }
}
