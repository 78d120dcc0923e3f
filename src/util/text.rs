use regex::Regex;
use std::borrow::Cow;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::OnceLock;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

const ESC: char = '\u{1b}';
const BEL: char = '\u{07}';

fn script_block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)<(script|style)\b.*?(</(script|style)\s*>|$)")
            .expect("script block pattern is valid")
    })
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"))
}

/// Converts description markup into plain display text.
///
/// Drops `<script>`/`<style>` blocks and all other tags, decodes every
/// HTML entity (named and numeric), and collapses runs of whitespace,
/// non-breaking spaces included, to single spaces.
///
/// ```
/// use reelfeed::util::clean_html;
///
/// assert_eq!(clean_html("<p>Day 45 &amp; more</p>"), "Day 45 & more");
/// ```
pub fn clean_html(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    let without_blocks = script_block_pattern().replace_all(html, " ");
    let text = tag_pattern().replace_all(&without_blocks, " ");
    let decoded = html_escape::decode_html_entities(&text);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Calculates the display width of a string in terminal columns.
///
/// CJK characters and most emoji take two columns, combining marks none.
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Truncates `s` to at most `max_width` terminal columns.
///
/// When text is cut, `...` is appended and counted within `max_width`.
/// Widths of three columns or fewer have no room for the ellipsis, so the
/// text is cut bare. Returns `Cow::Borrowed` when nothing was cut.
///
/// ```
/// use reelfeed::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("Short", 10), "Short");
/// assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
/// assert_eq!(truncate_to_width("Test", 2), "Te");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }
    if max_width <= ELLIPSIS_WIDTH {
        return Cow::Owned(s[..prefix_within(s, max_width)].to_owned());
    }
    let cut = prefix_within(s, max_width - ELLIPSIS_WIDTH);
    Cow::Owned(format!("{}{ELLIPSIS}", &s[..cut]))
}

/// Byte length of the longest prefix of `s` that fits in `width` columns.
fn prefix_within(s: &str, width: usize) -> usize {
    let mut used = 0;
    for (idx, c) in s.char_indices() {
        used += UnicodeWidthChar::width(c).unwrap_or(0);
        if used > width {
            return idx;
        }
    }
    s.len()
}

fn is_stripped_control(c: char) -> bool {
    c == '\u{7f}' || (c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r'))
}

/// Removes terminal control characters and ANSI escape sequences.
///
/// Feed text is printed straight to the terminal, so CSI (`ESC [`) and
/// OSC (`ESC ]`, ended by BEL or `ESC \`) sequences are dropped whole,
/// along with bare ESC, DEL, and C0 controls other than tab, LF and CR.
/// Clean input is returned borrowed.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ESC {
            skip_escape_sequence(&mut chars);
        } else if !is_stripped_control(c) {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// Consumes the remainder of an escape sequence whose ESC was just read.
fn skip_escape_sequence(chars: &mut Peekable<Chars<'_>>) {
    match chars.peek() {
        Some('[') => {
            chars.next();
            // Parameters run until a final byte in @..=~
            for c in chars.by_ref() {
                if ('\u{40}'..='\u{7e}').contains(&c) {
                    break;
                }
            }
        }
        Some(']') => {
            chars.next();
            while let Some(c) = chars.next() {
                if c == BEL {
                    break;
                }
                if c == ESC && chars.peek() == Some(&'\\') {
                    chars.next();
                    break;
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_html_strips_tags_and_entities() {
        assert_eq!(
            clean_html("<p>Contestants&nbsp;face <b>nominations</b> &amp; a &quot;twist&quot;</p>"),
            "Contestants face nominations & a \"twist\""
        );
        assert_eq!(clean_html("It&#39;s &#x41;ll here"), "It's All here");
    }

    #[test]
    fn test_clean_html_drops_script_and_style() {
        let html = "<style>p { color: red }</style><p>Visible</p><SCRIPT>alert(1)</SCRIPT> text";
        assert_eq!(clean_html(html), "Visible text");
    }

    #[test]
    fn test_clean_html_collapses_whitespace() {
        assert_eq!(clean_html("<p>a</p>\n\n<p>b</p><br/>c"), "a b c");
        assert_eq!(clean_html(""), "");
        assert_eq!(clean_html("<img src=\"x.jpg\">"), "");
    }

    #[test]
    fn test_clean_html_decodes_mixed_entities() {
        assert_eq!(
            clean_html("<p>Tom &amp; Jerry&hellip; it&rsquo;s on &mdash; now</p>"),
            "Tom & Jerry\u{2026} it\u{2019}s on \u{2014} now"
        );
    }

    #[test]
    fn test_truncation() {
        assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
        assert_eq!(truncate_to_width("12345", 5), "12345");
        assert_eq!(truncate_to_width("Testing", 4), "T...");
        assert!(matches!(truncate_to_width("fits", 10), Cow::Borrowed(_)));
    }

    #[test]
    fn test_wide_char_truncation() {
        assert_eq!(truncate_to_width("你好世界", 7), "你好...");
        assert_eq!(truncate_to_width("你好世界", 5), "你...");
        assert_eq!(truncate_to_width("Hello 🎉 World", 11), "Hello 🎉...");
    }

    #[test]
    fn test_narrow_widths_have_no_ellipsis() {
        assert_eq!(truncate_to_width("Test", 0), "");
        assert_eq!(truncate_to_width("Test", 1), "T");
        assert_eq!(truncate_to_width("Test", 3), "Tes");
        assert_eq!(truncate_to_width("你好", 1), "");
        assert_eq!(truncate_to_width("你好", 3), "你");
    }

    #[test]
    fn test_display_width() {
        assert_eq!(display_width("Hello"), 5);
        assert_eq!(display_width("你好"), 4);
    }

    #[test]
    fn test_strip_clean_text_returns_borrowed() {
        let input = "line1\nline2\ttabbed\r\nplain";
        let result = strip_control_chars(input);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, input);
    }

    #[test]
    fn test_strip_controls_and_del() {
        assert_eq!(strip_control_chars("he\x00ll\x07o\x08 w\x0bor\x0cld\x7f!"), "hello world!");
    }

    #[test]
    fn test_strip_ansi_sequences() {
        assert_eq!(strip_control_chars("\x1b[31mRed\x1b[0m"), "Red");
        assert_eq!(strip_control_chars("before\x1b[2Aafter"), "beforeafter");
        assert_eq!(strip_control_chars("\x1b]0;title\x07safe"), "safe");
        assert_eq!(strip_control_chars("\x1b]0;title\x1b\\safe"), "safe");
        assert_eq!(strip_control_chars("bare\x1bescape"), "bareescape");
    }

    #[test]
    fn test_strip_keeps_unicode() {
        assert_eq!(strip_control_chars("日本 \x1b[1m太字\x1b[0m"), "日本 太字");
    }
}
