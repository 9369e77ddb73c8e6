//! Text cleanup for stored bilingual fields.
//!
//! Runs as an idempotent pass: cleaning already-clean text returns it as is.
//! Full-width punctuation inside Chinese text is left alone; only punctuation
//! sitting against Latin text is converted.

use std::borrow::Cow;

use tracing::debug;

const ZERO_WIDTH: &[char] = &['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

const CJK_PUNCTUATION: &[char] =
    &['，', '。', '！', '？', '；', '：', '、', '）', '」', '』', '】', '》'];

const NAME_SEPARATORS: &[char] = &['·', '•', '・'];

pub fn clean(text: &str) -> String {
    let s = sanitize(text);
    let s = fold_fullwidth_alphanumerics(&s);
    let s = collapse_whitespace(&s);
    let s = normalize_punctuation(&s);
    let s = space_script_boundaries(&s);
    let s = tighten_punctuation(&s);
    collapse_whitespace(&s).trim().to_string()
}

/// Cleans raw column bytes, replacing invalid UTF-8 instead of failing.
pub fn clean_bytes(bytes: &[u8]) -> String {
    let decoded = String::from_utf8_lossy(bytes);
    if let Cow::Owned(_) = decoded {
        debug!(len = bytes.len(), "replaced invalid UTF-8 sequences");
    }
    clean(&decoded)
}

/// Cleans an optional field; blank results become `None`.
pub fn clean_field(value: Option<&str>) -> Option<String> {
    value.map(clean).filter(|v| !v.is_empty())
}

pub fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF
        | 0x3400..=0x4DBF
        | 0x20000..=0x2A6DF
        | 0xF900..=0xFAFF
        | 0x3040..=0x309F
        | 0x30A0..=0x30FA
        | 0x30FC..=0x30FF
        | 0xAC00..=0xD7AF)
}

pub fn contains_cjk(s: &str) -> bool {
    s.chars().any(is_cjk)
}

fn is_latin(c: char) -> bool {
    c.is_ascii_alphanumeric() || (('\u{00C0}'..='\u{024F}').contains(&c) && c.is_alphabetic())
}

fn sanitize(text: &str) -> String {
    let text = text.replace("\\r\\n", " ").replace("\\n", " ").replace("\\r", " ");
    text.chars()
        .filter(|c| !ZERO_WIDTH.contains(c))
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

fn fold_fullwidth_alphanumerics(s: &str) -> String {
    s.chars()
        .map(|c| match c as u32 {
            0xFF10..=0xFF19 | 0xFF21..=0xFF3A | 0xFF41..=0xFF5A => {
                char::from_u32(c as u32 - 0xFEE0).unwrap_or(c)
            },
            _ => c,
        })
        .collect()
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn ascii_punctuation(c: char) -> Option<char> {
    match c {
        '\u{3001}' => Some(','),
        '\u{3002}' => Some('.'),
        '\u{FF01}'..='\u{FF0F}' | '\u{FF1A}'..='\u{FF20}' | '\u{FF3B}'..='\u{FF40}'
        | '\u{FF5B}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0),
        _ => None,
    }
}

fn normalize_punctuation(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());

    for (i, &c) in chars.iter().enumerate() {
        let Some(ascii) = ascii_punctuation(c) else {
            out.push(c);
            continue;
        };

        let prev = chars[..i].iter().rev().copied().find(|c| *c != ' ');
        let next = chars[i + 1..].iter().copied().find(|c| *c != ' ');
        let near_latin = prev.is_some_and(is_latin) || next.is_some_and(is_latin);
        let near_cjk = prev.is_some_and(is_cjk) || next.is_some_and(is_cjk);
        if !near_latin || near_cjk {
            out.push(c);
            continue;
        }

        if matches!(ascii, ',' | '.' | ':' | ';' | '!' | '?') {
            while out.ends_with(' ') {
                out.pop();
            }
            out.push(ascii);
            if next.is_some_and(char::is_alphabetic) {
                out.push(' ');
            }
        } else {
            out.push(ascii);
        }
    }
    out
}

fn space_script_boundaries(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    let mut prev: Option<char> = None;
    for c in s.chars() {
        if let Some(p) = prev {
            if (is_cjk(p) && is_latin(c)) || (is_latin(p) && is_cjk(c)) {
                out.push(' ');
            }
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

fn tighten_punctuation(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut skip_spaces = false;
    for c in s.chars() {
        if skip_spaces && c == ' ' {
            continue;
        }
        skip_spaces = false;
        if CJK_PUNCTUATION.contains(&c) || NAME_SEPARATORS.contains(&c) {
            while out.ends_with(' ') {
                out.pop();
            }
            skip_spaces = NAME_SEPARATORS.contains(&c);
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_ideographic_and_ordinary_whitespace() {
        assert_eq!(clean("  无依之地\u{3000}\u{3000}是一部 \n\t 电影  "), "无依之地 是一部 电影");
    }

    #[test]
    fn spaces_cjk_latin_boundaries() {
        assert_eq!(clean("由Chloé Zhao执导的2020年电影"), "由 Chloé Zhao 执导的 2020 年电影");
        assert_eq!(clean("赵婷 Chloé Zhao"), "赵婷 Chloé Zhao");
    }

    #[test]
    fn never_spaces_between_cjk_characters() {
        assert_eq!(clean("我们的父辈，他们的故事。"), "我们的父辈，他们的故事。");
    }

    #[test]
    fn converts_fullwidth_punctuation_next_to_latin() {
        assert_eq!(clean("Hello，world！"), "Hello, world!");
        assert_eq!(clean("Part （II）"), "Part (II)");
        assert_eq!(clean("3．14"), "3.14");
    }

    #[test]
    fn keeps_fullwidth_punctuation_between_cjk_and_latin() {
        assert_eq!(clean("导演：Martin Scorsese"), "导演：Martin Scorsese");
        assert_eq!(clean("Scorsese ，的作品"), "Scorsese，的作品");
    }

    #[test]
    fn folds_fullwidth_letters_and_digits() {
        assert_eq!(clean("ＡＢＣ１２３"), "ABC123");
    }

    #[test]
    fn tightens_name_separators() {
        assert_eq!(clean("马丁 · 斯科塞斯"), "马丁·斯科塞斯");
    }

    #[test]
    fn removes_escape_artifacts_and_zero_width_characters() {
        assert_eq!(clean("第一行\\n第二行\u{200B}"), "第一行 第二行");
        assert_eq!(clean("a\u{0007}b"), "a b");
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let bytes = [0xE6, 0x97, 0xA0, 0xFF, b'A'];
        assert_eq!(clean_bytes(&bytes), "无\u{FFFD}A");
    }

    #[test]
    fn blank_fields_become_none() {
        assert_eq!(clean_field(Some(" \u{3000} ")), None);
        assert_eq!(clean_field(None), None);
    }

    #[test]
    fn cleaning_is_idempotent() {
        let samples = [
            "  无依之地\u{3000}讲述了Fern的故事 ，她在2011年失去了一切。 ",
            "Hello ，world ！",
            "Hello，你好",
            "导演 ：马丁 · 斯科塞斯 (Martin Scorsese)",
            "ＡＢＣ，ＤＥＦ",
            "第一行\\r\\n第二行",
            "《花样年华》In the Mood for Love，2000年",
            "a，，b",
            "",
        ];
        for s in samples {
            let once = clean(s);
            assert_eq!(clean(&once), once, "not idempotent for {s:?}");
        }
    }
}
