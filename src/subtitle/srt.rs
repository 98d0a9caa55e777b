//! Чтение и запись субтитров в формате SRT

use std::fs;
use std::path::Path;

use log::{debug, warn};

use crate::error::{Result, SyncError};
use crate::subtitle::segmenter::SubtitleCue;

/// Время в формате `HH:MM:SS,mmm`
pub fn format_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

/// Сформировать текст SRT; нумерация с единицы
pub fn render_srt(cues: &[SubtitleCue]) -> String {
    let mut output = String::new();
    for (i, cue) in cues.iter().enumerate() {
        output.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(cue.start_ms),
            format_timestamp(cue.end_ms),
            cue.text
        ));
    }
    output
}

/// Записать SRT на диск
pub fn write_srt<P: AsRef<Path>>(path: P, cues: &[SubtitleCue]) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, render_srt(cues))?;
    debug!("Wrote {} subtitle cues to {}", cues.len(), path.display());
    Ok(())
}

/// Прочитать SRT файл
pub fn parse_srt_file<P: AsRef<Path>>(path: P) -> Result<Vec<SubtitleCue>> {
    let content = fs::read_to_string(&path).map_err(|e| {
        SyncError::FileNotFound(format!(
            "Failed to open SRT file {}: {}",
            path.as_ref().display(),
            e
        ))
    })?;
    parse_srt(&content)
}

/// Разобрать текст SRT
pub fn parse_srt(content: &str) -> Result<Vec<SubtitleCue>> {
    let content = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");

    let mut cues = Vec::new();
    let mut block: Vec<&str> = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            if !block.is_empty() {
                cues.push(parse_cue_block(&block)?);
                block.clear();
            }
        } else {
            block.push(line);
        }
    }
    if !block.is_empty() {
        cues.push(parse_cue_block(&block)?);
    }

    Ok(cues)
}

fn parse_cue_block(lines: &[&str]) -> Result<SubtitleCue> {
    let timing_index = lines
        .iter()
        .position(|line| line.contains("-->"))
        .ok_or_else(|| SyncError::Other(format!("SRT block without timing: {:?}", lines)))?;

    let (start, end) = lines[timing_index]
        .split_once("-->")
        .ok_or_else(|| SyncError::Other("Malformed SRT timing line".to_string()))?;
    let start_ms = parse_timestamp(start.trim())
        .ok_or_else(|| SyncError::Other(format!("Invalid SRT timestamp: {}", start.trim())))?;
    let end_ms = parse_timestamp(end.trim())
        .ok_or_else(|| SyncError::Other(format!("Invalid SRT timestamp: {}", end.trim())))?;

    if end_ms < start_ms {
        warn!("SRT cue ends before it starts: {} -> {}", start_ms, end_ms);
    }

    let text = lines[timing_index + 1..]
        .iter()
        .map(|line| line.trim())
        .collect::<Vec<_>>()
        .join("\n");

    Ok(SubtitleCue::new(start_ms, end_ms, text))
}

/// Разбор `HH:MM:SS,mmm` (допускается точка вместо запятой)
fn parse_timestamp(value: &str) -> Option<u64> {
    // Позиционные настройки после времени (X1:... Y1:...) игнорируются
    let value = value.split_whitespace().next()?;
    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let hours = parts[0].parse::<u64>().ok()?;
    let minutes = parts[1].parse::<u64>().ok()?;
    let (seconds, millis) = match parts[2].split_once(|c| c == ',' || c == '.') {
        Some((s, ms)) => {
            let value = ms.parse::<u64>().ok()?;
            let millis = match ms.len() {
                1 => value * 100,
                2 => value * 10,
                3 => value,
                n => value / 10_u64.pow(n as u32 - 3),
            };
            (s.parse::<u64>().ok()?, millis)
        }
        None => (parts[2].parse::<u64>().ok()?, 0),
    };

    Some(hours * 3_600_000 + minutes * 60_000 + seconds * 1000 + millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "00:00:00,000");
        assert_eq!(format_timestamp(3_723_045), "01:02:03,045");
        assert_eq!(format_timestamp(59_999), "00:00:59,999");
    }

    #[test]
    fn test_render_numbers_from_one() {
        let cues = vec![
            SubtitleCue::new(0, 1500, "Hello world"),
            SubtitleCue::new(2000, 3250, "你好"),
        ];
        let srt = render_srt(&cues);
        assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:01,500\nHello world\n\n2\n"));
        assert!(srt.contains("00:00:02,000 --> 00:00:03,250\n你好"));
    }

    #[test]
    fn test_parse_reads_rendered_file() {
        let cues = vec![
            SubtitleCue::new(10, 990, "first"),
            SubtitleCue::new(61_000, 62_500, "second"),
        ];
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.srt");
        write_srt(&path, &cues).unwrap();

        assert_eq!(parse_srt_file(&path).unwrap(), cues);
    }

    #[test]
    fn test_parse_handles_crlf_and_dot_separator() {
        let input = "\u{feff}1\r\n00:00:01.5 --> 00:00:02,000\r\nline one\r\nline two\r\n";
        let cues = parse_srt(input).unwrap();
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].start_ms, 1500);
        assert_eq!(cues[0].text, "line one\nline two");
    }

    #[test]
    fn test_parse_rejects_bad_timestamp() {
        assert!(parse_srt("1\n00:xx:01,000 --> 00:00:02,000\ntext\n").is_err());
        assert!(parse_srt_file("/nonexistent/file.srt").is_err());
    }
}
