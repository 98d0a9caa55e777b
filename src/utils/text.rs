//! Вспомогательные функции для работы с текстом
//!
//! Подсчет "слов" с учетом письменности: каждый иероглиф - отдельная
//! единица, каждое латинское/цифровое слово - тоже одна единица.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WORD_UNIT: Regex =
        Regex::new(r"\p{Han}|[\p{L}\p{N}&&[^\p{Han}]]+(?:['’][\p{L}\p{N}&&[^\p{Han}]]+)*")
            .unwrap();
    static ref ELLIPSIS: Regex = Regex::new(r"\.{2,}|…+").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Знаки конца предложения
pub const STRONG_PUNCTUATION: &[char] = &['.', '!', '?', '。', '！', '？'];
/// Запятые
pub const COMMA_PUNCTUATION: &[char] = &[',', '，', '、'];
/// Точка с запятой и двоеточие
pub const WEAK_PUNCTUATION: &[char] = &[';', '；', ':', '：'];

/// Кавычки, которые снимаются с краев текста
pub const QUOTES: &[char] = &['"', '\'', '“', '”', '‘', '’', '「', '」', '『', '』', '«', '»'];
const TRAILING_WEAK: &[char] = &[',', '，', '、', ';', '；', ':', '：', '-', '–', '—'];

/// Иероглиф (основные блоки CJK Unified Ideographs)
pub fn is_han(c: char) -> bool {
    matches!(c as u32,
        0x3400..=0x4DBF
        | 0x4E00..=0x9FFF
        | 0xF900..=0xFAFF
        | 0x20000..=0x2A6DF
        | 0x2A700..=0x2EBEF)
}

/// Иероглиф или полноширинная пунктуация CJK
pub fn is_cjk(c: char) -> bool {
    is_han(c) || matches!(c as u32, 0x3000..=0x303F | 0xFF00..=0xFFEF)
}

/// Любой знак препинания, по которому режутся фразы
pub fn is_break_punctuation(c: char) -> bool {
    STRONG_PUNCTUATION.contains(&c) || COMMA_PUNCTUATION.contains(&c) || WEAK_PUNCTUATION.contains(&c)
}

/// Количество единиц текста
pub fn count_words(text: &str) -> usize {
    WORD_UNIT.find_iter(text).count()
}

/// Границы (в байтах) каждой единицы текста
pub fn word_spans(text: &str) -> Vec<(usize, usize)> {
    WORD_UNIT
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect()
}

/// Убрать лишние пробелы: между иероглифами, перед знаками препинания и
/// после полноширинной пунктуации
pub fn collapse_spacing(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len());

    for (i, &c) in chars.iter().enumerate() {
        if c == ' ' {
            let prev = result.chars().last();
            let next = chars[i + 1..].iter().copied().find(|n| *n != ' ');
            let drop = match (prev, next) {
                (None, _) | (_, None) => true,
                (Some(' '), _) => true,
                (Some(p), Some(n)) => {
                    (is_cjk(p) && is_cjk(n))
                        || is_break_punctuation(n)
                        || (is_cjk(p) && !is_han(p))
                }
            };
            if drop {
                continue;
            }
        }
        result.push(c);
    }
    result
}

/// Убрать многоточия и схлопнуть пробелы, остальное оставить как есть
pub fn strip_ellipsis(text: &str) -> String {
    let without = ELLIPSIS.replace_all(text, " ");
    let collapsed = WHITESPACE.replace_all(&without, " ");
    collapse_cjk_gaps(collapsed.trim())
}

/// Пробел, появившийся между двумя иероглифами, удаляется
fn collapse_cjk_gaps(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    chars
        .iter()
        .enumerate()
        .filter(|(i, c)| {
            !(**c == ' '
                && *i > 0
                && *i + 1 < chars.len()
                && is_cjk(chars[i - 1])
                && is_cjk(chars[i + 1]))
        })
        .map(|(_, c)| *c)
        .collect()
}

/// Очистить текст: многоточия, пробелы, обрамляющие кавычки и слабая
/// пунктуация в конце
pub fn sanitize(text: &str) -> String {
    let mut result = strip_ellipsis(text);
    loop {
        let trimmed = result
            .trim_matches(|c: char| QUOTES.contains(&c) || c.is_whitespace())
            .trim_end_matches(|c: char| TRAILING_WEAK.contains(&c) || c.is_whitespace())
            .to_string();
        if trimmed == result {
            return result;
        }
        result = trimmed;
    }
}

/// Детерминированно укоротить текст до `max_words` единиц
///
/// В префиксе длиной `max_words` ищется последний конец предложения дальше
/// 50% префикса, затем последняя запятая/двоеточие дальше 70%, иначе
/// жесткий обрез. Многоточие не добавляется; повторный вызов ничего не меняет.
pub fn truncate_to_budget(text: &str, max_words: usize) -> String {
    let cleaned = sanitize(text);
    let spans = word_spans(&cleaned);
    if spans.len() <= max_words {
        return cleaned;
    }

    let max_words = max_words.max(1);
    let mut prefix_end = spans[max_words - 1].1;
    // пунктуация сразу после последнего слова относится к префиксу
    for c in cleaned[prefix_end..].chars() {
        if !is_break_punctuation(c) {
            break;
        }
        prefix_end += c.len_utf8();
    }
    let prefix = &cleaned[..prefix_end];

    let chars: Vec<(usize, char)> = prefix.char_indices().collect();
    let total = chars.len() as f64;
    let last_past = |set: &[char], ratio: f64| {
        chars
            .iter()
            .enumerate()
            .rev()
            .find(|(pos, (_, c))| set.contains(c) && *pos as f64 > total * ratio)
            .map(|(_, (byte, c))| (*byte, *c))
    };

    let cut = last_past(STRONG_PUNCTUATION, 0.5)
        .map(|(byte, c)| byte + c.len_utf8())
        .or_else(|| {
            let weak: Vec<char> = COMMA_PUNCTUATION
                .iter()
                .chain(WEAK_PUNCTUATION)
                .copied()
                .collect();
            last_past(&weak, 0.7).map(|(byte, _)| byte)
        })
        .unwrap_or(prefix.len());

    let result = sanitize(&prefix[..cut]);
    if result.is_empty() {
        sanitize(prefix)
    } else {
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_words_is_script_aware() {
        assert_eq!(count_words("Hello world"), 2);
        assert_eq!(count_words("你好世界"), 4);
        assert_eq!(count_words("用 Rust 写代码"), 5);
        assert_eq!(count_words("don't stop, 2024!"), 3);
        assert_eq!(count_words("...  ,"), 0);
        assert_eq!(count_words("Привет, мир"), 2);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("  \"Hello...   world,\" "), "Hello world");
        assert_eq!(sanitize("「你好……世界」"), "你好世界");
        assert_eq!(sanitize("Done; "), "Done");
        assert_eq!(sanitize("Ends well."), "Ends well.");
        let once = sanitize("“Wait… what,”");
        assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn test_strip_ellipsis_keeps_other_punctuation() {
        assert_eq!(strip_ellipsis("Well... fine, ok,"), "Well fine, ok,");
    }

    #[test]
    fn test_truncate_prefers_sentence_end() {
        let text = "One two three four. Five six seven eight nine ten";
        assert_eq!(truncate_to_budget(text, 6), "One two three four.");
    }

    #[test]
    fn test_truncate_falls_back_to_comma() {
        let text = "One two three four five six seven, eight nine ten eleven";
        assert_eq!(truncate_to_budget(text, 8), "One two three four five six seven");
    }

    #[test]
    fn test_truncate_hard_cut() {
        let text = "alpha beta gamma delta epsilon zeta";
        assert_eq!(truncate_to_budget(text, 3), "alpha beta gamma");
    }

    #[test]
    fn test_truncate_is_idempotent_and_never_empty() {
        let samples = [
            "这是一个很长的句子。后面还有很多很多的内容需要被截断，真的很多",
            "\"Quoted... text that goes on and on, and on; forever and ever\"",
            "a b c d e f g h i j k",
        ];
        for text in samples {
            for budget in [3, 5, 8] {
                let once = truncate_to_budget(text, budget);
                assert!(!once.is_empty());
                assert!(count_words(&once) <= budget);
                assert!(!once.contains("...") && !once.contains('…'));
                assert_eq!(truncate_to_budget(&once, budget), once);
            }
        }
    }

    #[test]
    fn test_collapse_spacing() {
        assert_eq!(collapse_spacing("你 好 世 界"), "你好世界");
        assert_eq!(collapse_spacing("Hello , world !"), "Hello, world!");
        assert_eq!(collapse_spacing("你好 。 Rust"), "你好。Rust");
        assert_eq!(collapse_spacing("Rust 很 好"), "Rust 很好");
    }
}
