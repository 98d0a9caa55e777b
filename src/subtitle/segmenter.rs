//! Нарезка меток слов на субтитры
//!
//! Решения о разрыве принимаются по тексту с пунктуацией; пунктуация в
//! конце убирается только из отображаемого текста.

use log::debug;

use crate::segment::{ShiftedSegment, WordBoundary};
use crate::utils::text::{
    collapse_spacing, count_words, is_break_punctuation, COMMA_PUNCTUATION, QUOTES,
    STRONG_PUNCTUATION, WEAK_PUNCTUATION,
};

/// Максимум слов в одном субтитре
pub const WORDS_PER_SUBTITLE: usize = 8;
/// Пауза между словами, после которой субтитр обязательно разрывается, мс
pub const MAX_WORD_GAP_MS: f64 = 1000.0;
/// Служебный разделитель между сегментами
pub const SEGMENT_TERMINATOR: &str = "。";

/// Один субтитр
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleCue {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

impl SubtitleCue {
    pub fn new(start_ms: u64, end_ms: u64, text: impl Into<String>) -> Self {
        Self {
            start_ms,
            end_ms,
            text: text.into(),
        }
    }
}

/// Порог для разрыва на запятой/точке с запятой
fn soft_break_threshold() -> usize {
    (WORDS_PER_SUBTITLE + 1) / 2
}

const CLOSING_BRACKETS: &[char] = &[')', '）', ']', '】', '〕', '》', '〉'];

fn is_closing(c: char) -> bool {
    QUOTES.contains(&c) || CLOSING_BRACKETS.contains(&c)
}

/// Последний знак токена без закрывающих кавычек и скобок
fn ends_with(text: &str, set: &[char]) -> bool {
    text.trim_end_matches(is_closing)
        .chars()
        .last()
        .map_or(false, |c| set.contains(&c))
}

/// Слово, а не отдельный знак препинания
fn is_word(token: &WordBoundary) -> bool {
    count_words(&token.text) > 0
}

fn build_cue(chunk: &[&WordBoundary]) -> Option<SubtitleCue> {
    let first = chunk.first()?;
    let last = chunk.last()?;

    let joined = chunk
        .iter()
        .map(|w| w.text.trim())
        .collect::<Vec<_>>()
        .join(" ");
    let text = collapse_spacing(&joined)
        .trim_end_matches(|c: char| {
            is_break_punctuation(c) || is_closing(c) || c == '…' || c.is_whitespace()
        })
        .to_string();

    if text.is_empty() {
        return None;
    }

    let start_ms = first.audio_offset.max(0.0).round() as u64;
    let end_ms = (last.end().max(0.0).round() as u64).max(start_ms);
    Some(SubtitleCue::new(start_ms, end_ms, text))
}

/// Сгруппировать метки слов в субтитры
pub fn segment_words(words: &[WordBoundary]) -> Vec<SubtitleCue> {
    let mut cues = Vec::new();
    let mut chunk: Vec<&WordBoundary> = Vec::new();
    let mut chunk_words = 0usize;

    let mut flush = |chunk: &mut Vec<&WordBoundary>, chunk_words: &mut usize| {
        if let Some(cue) = build_cue(chunk) {
            cues.push(cue);
        }
        chunk.clear();
        *chunk_words = 0;
    };

    for word in words {
        let text = word.text.trim();
        if text.is_empty() {
            continue;
        }

        if let Some(previous) = chunk.last() {
            if word.audio_offset - previous.end() > MAX_WORD_GAP_MS {
                flush(&mut chunk, &mut chunk_words);
            }
        }

        chunk.push(word);
        if is_word(word) {
            chunk_words += 1;
        }

        let should_break = chunk_words >= WORDS_PER_SUBTITLE
            || ends_with(text, STRONG_PUNCTUATION)
            || (chunk_words >= soft_break_threshold()
                && (ends_with(text, COMMA_PUNCTUATION) || ends_with(text, WEAK_PUNCTUATION)));

        if should_break {
            flush(&mut chunk, &mut chunk_words);
        }
    }
    flush(&mut chunk, &mut chunk_words);

    cues
}

/// Объединить метки нескольких сегментов в одну дорожку
///
/// `groups` - пары (начало сегмента на выходном таймлайне в секундах, метки
/// относительно начала озвучки сегмента). Между сегментами вставляется
/// разделитель нулевой длительности, если предыдущий сегмент не закончился
/// знаком конца предложения.
pub fn merge_segment_boundaries(groups: &[(f64, &[WordBoundary])]) -> Vec<WordBoundary> {
    let mut merged: Vec<WordBoundary> = Vec::new();

    for (offset_sec, words) in groups {
        let offset_ms = offset_sec * 1000.0;

        if let Some(last) = merged.last() {
            if !words.is_empty() && !ends_with(last.text.trim(), STRONG_PUNCTUATION) {
                let at = last.end();
                merged.push(WordBoundary::new(SEGMENT_TERMINATOR, at, 0.0));
            }
        }

        merged.extend(
            words
                .iter()
                .map(|w| WordBoundary::new(w.text.clone(), w.audio_offset + offset_ms, w.duration)),
        );
    }

    merged
}

/// Субтитры для всего таймлайна
///
/// `boundaries[i]` - метки сегмента с индексом `i` в проекте.
pub fn cues_for_timeline(
    timeline: &[ShiftedSegment],
    boundaries: &[Vec<WordBoundary>],
) -> Vec<SubtitleCue> {
    let groups: Vec<(f64, &[WordBoundary])> = timeline
        .iter()
        .filter_map(|shifted| {
            boundaries
                .get(shifted.index)
                .map(|words| (shifted.target_start_time, words.as_slice()))
        })
        .collect();

    let cues = segment_words(&merge_segment_boundaries(&groups));
    debug!("Built {} subtitle cues for {} segments", cues.len(), groups.len());
    cues
}
