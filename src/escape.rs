/// Escapes every character outside U+0000..=U+00FF as a `\uXXXX` sequence.
///
/// Characters beyond the BMP are written as their UTF-16 surrogate pair so
/// every emitted token is exactly four lowercase hex digits.
pub fn escape_unicode(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut units = [0u16; 2];

    for ch in input.chars() {
        if (ch as u32) < 0x100 {
            output.push(ch);
            continue;
        }

        for unit in ch.encode_utf16(&mut units) {
            output.push_str(&format!("\\u{:04x}", unit));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_is_untouched() {
        let input = r#"{"state": "SUCCESS","url": "/a/b.png"}"#;
        assert_eq!(escape_unicode(input), input);
        assert_eq!(escape_unicode(&escape_unicode(input)), input);
    }

    #[test]
    fn test_latin1_passes_through() {
        assert_eq!(escape_unicode("café ÿ"), "café ÿ");
    }

    #[test]
    fn test_cjk_is_escaped() {
        assert_eq!(escape_unicode("IO错误"), "IO\\u9519\\u8bef");
    }

    #[test]
    fn test_small_code_points_are_zero_padded() {
        assert_eq!(escape_unicode("\u{100}"), "\\u0100");
    }

    #[test]
    fn test_astral_characters_use_surrogates() {
        assert_eq!(escape_unicode("😀"), "\\ud83d\\ude00");
    }

    #[test]
    fn test_escaped_output_is_stable() {
        let once = escape_unicode("上传 report.pdf");
        assert!(once.is_ascii());
        assert_eq!(escape_unicode(&once), once);
    }
}
