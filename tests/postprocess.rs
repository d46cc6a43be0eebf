use olat_quizgen::{
    config::Config,
    normalize::transform_response,
    postprocess::{clean_extracted_text, replace_sharp_s},
    quiz::KeepOrder,
};

#[test]
fn sharp_s_becomes_double_s() {
    assert_eq!(replace_sharp_s("Straße und Fuß"), "Strasse und Fuss");
    assert_eq!(replace_sharp_s("ohne"), "ohne");
}

#[test]
fn transformed_output_contains_no_sharp_s() {
    let raw = r#"```json
[{"text": "Die Straße ist groß.", "blanks": ["Straße"], "wrong_substitutes": ["Gasse", "Maß"]}]
```"#;
    let out = transform_response(raw, &mut KeepOrder).unwrap();
    assert!(!out.text.contains('ß'));
    assert!(out.text.contains("1\tStrasse\t20"));
    assert!(out.text.contains("Text\tist gross."));
    assert!(out.text.contains("Strasse|Gasse|Mass"));
}

#[test]
fn extracted_text_is_tidied() {
    let cfg = Config::default();
    let raw = "  Die ﬁnale Seite  \r\nzwei\u{0002}\u{000C}drei\t!  \n\n";
    assert_eq!(
        clean_extracted_text(&cfg, raw),
        "Die finale Seite\nzwei\ndrei\t!"
    );
}

#[test]
fn unicode_normalization_can_be_disabled() {
    let mut cfg = Config::default();
    cfg.extraction.normalize_unicode = false;
    assert_eq!(clean_extracted_text(&cfg, "ﬁ"), "ﬁ");
}
