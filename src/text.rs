//! Text metrics for the base-14 Helvetica family and greedy line wrapping.
//!
//! Widths are the standard AFM advances (1/1000 em) for printable ASCII.
//! Anything outside that range measures as a lowercase Latin letter, which
//! is close enough for the accented Latin-1 characters reports contain.

use crate::types::Pt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Font {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
}

impl Font {
    pub const ALL: [Font; 3] = [Font::Helvetica, Font::HelveticaBold, Font::HelveticaOblique];

    pub fn base_name(&self) -> &'static str {
        match self {
            Font::Helvetica => "Helvetica",
            Font::HelveticaBold => "Helvetica-Bold",
            Font::HelveticaOblique => "Helvetica-Oblique",
        }
    }

    pub fn resource_name(&self) -> &'static str {
        match self {
            Font::Helvetica => "F1",
            Font::HelveticaBold => "F2",
            Font::HelveticaOblique => "F3",
        }
    }

    fn advance(&self, ch: char) -> u16 {
        let table = match self {
            Font::Helvetica | Font::HelveticaOblique => &HELVETICA_WIDTHS,
            Font::HelveticaBold => &HELVETICA_BOLD_WIDTHS,
        };
        match ch {
            ' '..='~' => table[(ch as usize) - 32],
            _ => DEFAULT_ADVANCE,
        }
    }
}

const DEFAULT_ADVANCE: u16 = 556;

const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    333, 333, 584, 584, 584, 611, 975, // ':'..'@'
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    333, 278, 333, 584, 556, 333, // '['..'`'
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, // 'a'..'m'
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, // 'n'..'z'
    389, 280, 389, 584, // '{'..'~'
];

pub fn measure_text_width(font: Font, font_size: Pt, text: &str) -> Pt {
    let units: i64 = text.chars().map(|ch| font.advance(ch) as i64).sum();
    Pt::from_milli_i64(font_size.to_milli_i64() * units / 1000)
}

/// Breaks `text` into lines no wider than `max_width`. Explicit newlines are
/// kept; words wider than a full line are split between characters.
pub fn wrap_text(font: Font, font_size: Pt, text: &str, max_width: Pt) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if measure_text_width(font, font_size, &candidate) <= max_width {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if measure_text_width(font, font_size, word) <= max_width {
                current = word.to_string();
            } else {
                for piece in split_long_word(font, font_size, word, max_width) {
                    if !current.is_empty() {
                        lines.push(std::mem::take(&mut current));
                    }
                    current = piece;
                }
            }
        }
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn split_long_word(font: Font, font_size: Pt, word: &str, max_width: Pt) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for ch in word.chars() {
        current.push(ch);
        if current.chars().count() > 1 && measure_text_width(font, font_size, &current) > max_width
        {
            current.pop();
            pieces.push(std::mem::take(&mut current));
            current.push(ch);
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_with_afm_advances() {
        let size = Pt::from_i32(10);
        // "Bon" in Helvetica: 667 + 556 + 556.
        assert_eq!(
            measure_text_width(Font::Helvetica, size, "Bon").to_milli_i64(),
            17_790
        );
        assert!(
            measure_text_width(Font::HelveticaBold, size, "Bon")
                > measure_text_width(Font::Helvetica, size, "Bon")
        );
        assert_eq!(
            measure_text_width(Font::HelveticaOblique, size, "il"),
            measure_text_width(Font::Helvetica, size, "il")
        );
    }

    #[test]
    fn wraps_on_word_boundaries() {
        let size = Pt::from_i32(10);
        let text = "Peinture ecaillee sur le mur nord pres de la fenetre";
        let max = measure_text_width(Font::Helvetica, size, "Peinture ecaillee sur");
        let lines = wrap_text(Font::Helvetica, size, text, max);
        assert_eq!(lines[0], "Peinture ecaillee sur");
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(measure_text_width(Font::Helvetica, size, line) <= max);
        }
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn keeps_explicit_newlines() {
        let lines = wrap_text(Font::Helvetica, Pt::from_i32(10), "un\ndeux", Pt::from_i32(500));
        assert_eq!(lines, vec!["un".to_string(), "deux".to_string()]);
    }

    #[test]
    fn splits_words_longer_than_a_line() {
        let size = Pt::from_i32(10);
        let max = measure_text_width(Font::Helvetica, size, "aaaa");
        let lines = wrap_text(Font::Helvetica, size, "aaaaaaaaaa", max);
        assert_eq!(lines, vec!["aaaa", "aaaa", "aa"]);
    }
}
