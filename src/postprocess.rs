use crate::config::Config;
use unicode_normalization::UnicodeNormalization;

/// The only locale rule applied to delivered text: `ß` becomes `ss`.
pub fn replace_sharp_s(s: &str) -> String {
    s.replace('ß', "ss")
}

/// Tidy text pulled out of a source document before it goes into a prompt.
pub fn clean_extracted_text(cfg: &Config, raw: &str) -> String {
    let mut text = raw.replace("\r\n", "\n");

    if cfg.extraction.normalize_unicode {
        text = text.nfkc().collect::<String>();
    }

    text = sanitize_control_chars(&text);

    text.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn sanitize_control_chars(s: &str) -> String {
    // pdftotext separates pages with form feeds.
    s.chars()
        .map(|ch| if ch == '\u{000C}' { '\n' } else { ch })
        .filter(|&ch| ch == '\n' || ch == '\t' || !ch.is_control())
        .collect()
}
