use olat_quizgen::config::Config;

#[test]
fn parse_example_config() {
    let raw = include_str!("../olat-quizgen.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert_eq!(cfg.generation.blank_type, "inline_fib");
    assert_eq!(cfg.generation.languages["Deutsch"], "German");
    assert_eq!(cfg.generation.bloom_levels["inline_fib"], "Erinnern");
    assert!(cfg.generation.shuffle_seed.is_none());
    assert!(!cfg.paths.out_dir.is_empty());
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let cfg: Config = toml::from_str("[global]\nprint_summary = false\n").expect("parse TOML");
    assert!(!cfg.global.print_summary);
    assert_eq!(cfg.model.default_model, "gpt-4o");
    assert_eq!(cfg.output.file_suffix, "_olat.txt");
    assert_eq!(cfg.generation.default_bloom_level, "Verstehen");
}
