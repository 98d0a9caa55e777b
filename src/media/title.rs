//! Раскладка заголовка и масштаб текста под размер кадра

use crate::utils::text::is_cjk;

/// Размер шрифта заголовка по числу строк (1, 2, 3, 4+) для кадра 1080p
pub const TITLE_FONT_TABLE: [f64; 4] = [96.0, 80.0, 68.0, 56.0];
/// Базовый размер шрифта субтитров для кадра 1080p
pub const SUBTITLE_FONT_SIZE: f64 = 42.0;
/// Минимальный множитель для вертикального видео
pub const PORTRAIT_PENALTY_FLOOR: f64 = 0.75;

const CJK_CHAR_WIDTH: f64 = 1.0;
const LATIN_CHAR_WIDTH: f64 = 0.55;
const LINE_SPACING: f64 = 1.25;

/// Множитель текста: короткая сторона кадра относительно 1080 и штраф для
/// вертикального видео
pub fn text_scale(width: u32, height: u32) -> f64 {
    let short_edge = width.min(height).max(1) as f64;
    let mut scale = short_edge / 1080.0;
    if height > width {
        scale *= (width as f64 / height as f64).sqrt().max(PORTRAIT_PENALTY_FLOOR);
    }
    scale
}

pub fn subtitle_font_size(width: u32, height: u32) -> u32 {
    (SUBTITLE_FONT_SIZE * text_scale(width, height)).round().max(1.0) as u32
}

/// Примерная ширина строки в пикселях
pub fn estimate_width(text: &str, font_size: f64) -> f64 {
    text.chars()
        .map(|c| {
            if is_cjk(c) {
                CJK_CHAR_WIDTH
            } else {
                LATIN_CHAR_WIDTH
            }
        })
        .sum::<f64>()
        * font_size
}

/// Токены для переноса: иероглиф - отдельный токен, слово - до пробела.
/// Флаг означает, что перед токеном был пробел.
fn tokens(text: &str) -> Vec<(bool, String)> {
    let mut result: Vec<(bool, String)> = Vec::new();
    let mut word = String::new();
    let mut space_before = false;
    let mut pending_space = false;

    for c in text.chars() {
        if c.is_whitespace() {
            if !word.is_empty() {
                result.push((space_before, std::mem::take(&mut word)));
            }
            pending_space = true;
        } else if is_cjk(c) {
            if !word.is_empty() {
                result.push((space_before, std::mem::take(&mut word)));
                pending_space = false;
            }
            result.push((pending_space, c.to_string()));
            pending_space = false;
        } else {
            if word.is_empty() {
                space_before = pending_space;
                pending_space = false;
            }
            word.push(c);
        }
    }
    if !word.is_empty() {
        result.push((space_before, word));
    }
    result
}

/// Жадный перенос по ширине
pub fn wrap_text(text: &str, font_size: f64, max_width: f64) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();

    for (space_before, token) in tokens(text) {
        let candidate = if line.is_empty() {
            token.clone()
        } else if space_before {
            format!("{} {}", line, token)
        } else {
            format!("{}{}", line, token)
        };

        if !line.is_empty() && estimate_width(&candidate, font_size) > max_width {
            lines.push(std::mem::take(&mut line));
            line = token;
        } else {
            line = candidate;
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Итоговая раскладка заголовка
#[derive(Debug, Clone, PartialEq)]
pub struct TitleLayout {
    pub lines: Vec<String>,
    pub font_size: u32,
    /// Расстояние между базовыми линиями, пиксели
    pub line_height: u32,
}

impl TitleLayout {
    pub fn block_height(&self) -> u32 {
        self.line_height * self.lines.len() as u32
    }
}

fn table_font(lines: usize, scale: f64) -> f64 {
    let index = lines.clamp(1, TITLE_FONT_TABLE.len()) - 1;
    TITLE_FONT_TABLE[index] * scale
}

/// Разложить заголовок в два прохода
///
/// Первый проход оценивает число строк крупным шрифтом, второй переносит
/// текст заново уже выбранным размером.
pub fn layout_title(text: &str, width: u32, height: u32) -> Option<TitleLayout> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let scale = text_scale(width, height);
    let max_width = width as f64 * 2.0 / 3.0;

    let first_pass = wrap_text(text, table_font(1, scale), max_width);
    let font_size = table_font(first_pass.len(), scale);
    let lines = wrap_text(text, font_size, max_width);

    let font_size = font_size.round().max(1.0) as u32;
    Some(TitleLayout {
        lines,
        font_size,
        line_height: (font_size as f64 * LINE_SPACING).round() as u32,
    })
}
