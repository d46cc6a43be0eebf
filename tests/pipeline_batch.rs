use anyhow::{anyhow, Result};
use olat_quizgen::{
    config::Config,
    extract::{Extracted, Extractor, ImageData, ToolDiag},
    model::{ModelClient, ModelRequest},
    pipeline::{
        render_document, GenerationRequest, Notice, Pipeline, SectionOutcome, MALFORMED_TOKEN,
        UNPROCESSABLE_TOKEN,
    },
    prompt::PromptLibrary,
    quiz::{encode, BlankItem, KeepOrder},
};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const FIB_JSON: &str = r#"```json
[{"text": "Die {Hauptstadt} von Deutschland ist {Berlin}.", "blanks": ["Hauptstadt", "Berlin"], "wrong_substitutes": ["Paris"]}]
```"#;

struct StubExtractor;

impl Extractor for StubExtractor {
    fn doctor(&self) -> Vec<ToolDiag> {
        Vec::new()
    }

    fn extract(&self, input: &Path) -> Result<Extracted> {
        let name = input.file_name().unwrap().to_string_lossy().into_owned();
        let page = || ImageData {
            mime: "image/jpeg".into(),
            bytes: vec![0xff, 0xd8],
        };
        match name.as_str() {
            "scan.pdf" => Ok(Extracted::Pages(vec![page(), page()])),
            "foto.png" => Ok(Extracted::Image(page())),
            "kaputt.pdf" => Err(anyhow!("pdftotext failed")),
            _ => Ok(Extracted::Text(format!("Inhalt von {name}"))),
        }
    }
}

/// Answers by the `TYPE=<id>` marker each template starts with.
struct ScriptedModel {
    responses: BTreeMap<String, Result<String, String>>,
    calls: RefCell<Vec<(String, bool, Option<String>)>>,
}

impl ScriptedModel {
    fn new(responses: &[(&str, Result<&str, &str>)]) -> Self {
        Self {
            responses: responses
                .iter()
                .map(|(k, v)| (k.to_string(), v.map(str::to_string).map_err(str::to_string)))
                .collect(),
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl ModelClient for ScriptedModel {
    fn complete(&self, req: &ModelRequest<'_>) -> Result<String> {
        let qtype = req
            .prompt
            .strip_prefix("TYPE=")
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or_default()
            .to_string();
        self.calls.borrow_mut().push((
            req.prompt.clone(),
            req.image.is_some(),
            req.document_text.map(str::to_string),
        ));
        match self.responses.get(&qtype) {
            Some(Ok(r)) => Ok(r.clone()),
            Some(Err(e)) => Err(anyhow!(e.clone())),
            None => Err(anyhow!("no scripted response for {qtype}")),
        }
    }
}

fn prompts(types: &[&str]) -> PromptLibrary {
    PromptLibrary::from_map(
        types
            .iter()
            .map(|t| (t.to_string(), format!("TYPE={t} Stufe {{bloom_level}}")))
            .collect(),
    )
}

fn request(types: &[&str]) -> GenerationRequest {
    GenerationRequest {
        instructions: "Bitte 2 Fragen".into(),
        learning_goals: "Hauptstädte kennen".into(),
        question_types: types.iter().map(|s| s.to_string()).collect(),
        language: "Deutsch".into(),
        model: "gpt-4o".into(),
    }
}

fn expected_fib_block() -> String {
    let item = BlankItem {
        text: "Die {Hauptstadt} von Deutschland ist {Berlin}.".into(),
        blanks: vec!["Hauptstadt".into(), "Berlin".into()],
        wrong_substitutes: vec!["Paris".into()],
    };
    encode(&[item], &mut KeepOrder).combined()
}

#[test]
fn sections_follow_the_requested_type_order() {
    let model = ScriptedModel::new(&[
        ("single_choice", Ok("Type\tSC\nTitle\tGroße Frage")),
        ("inline_fib", Ok(FIB_JSON)),
    ]);
    let pipeline = Pipeline::new(
        &Config::default(),
        prompts(&["single_choice", "inline_fib"]),
        StubExtractor,
        model,
    );

    let result = pipeline.run_file(
        Path::new("vorlesung.txt"),
        &request(&["single_choice", "inline_fib"]),
        &mut KeepOrder,
    );

    assert_eq!(result.output_name, "vorlesung_olat.txt");
    let expected = format!(
        "Type\tSC\nTitle\tGrosse Frage\n\n{}\n\n",
        expected_fib_block()
    );
    assert_eq!(result.document.as_deref(), Some(expected.as_str()));
    assert_eq!(result.sections[0].label, "Single Choice");
    assert_eq!(result.sections[1].label, "Inline Fib (Verarbeitet)");
}

#[test]
fn reversed_order_is_kept() {
    let model = ScriptedModel::new(&[
        ("single_choice", Ok("SC")),
        ("inline_fib", Ok(FIB_JSON)),
    ]);
    let pipeline = Pipeline::new(
        &Config::default(),
        prompts(&["single_choice", "inline_fib"]),
        StubExtractor,
        model,
    );
    let result = pipeline.run_file(
        Path::new("a.txt"),
        &request(&["inline_fib", "single_choice"]),
        &mut KeepOrder,
    );
    let doc = result.document.unwrap();
    assert!(doc.starts_with("Type\tInlinechoice"));
    assert!(doc.ends_with("\n\nSC\n\n"));
}

#[test]
fn prompt_carries_template_user_input_and_document_text() {
    let model = ScriptedModel::new(&[("inline_fib", Ok(FIB_JSON))]);
    let pipeline = Pipeline::new(&Config::default(), prompts(&["inline_fib"]), StubExtractor, model);
    pipeline.run_file(Path::new("a.txt"), &request(&["inline_fib"]), &mut KeepOrder);

    let calls = pipeline_calls(&pipeline);
    assert_eq!(calls.len(), 1);
    let (prompt, has_image, text) = &calls[0];
    assert_eq!(
        prompt,
        "TYPE=inline_fib Stufe Erinnern\n\nBenutzereingabe: Bitte 2 Fragen\n\nLernziele: Hauptstädte kennen"
    );
    assert!(!has_image);
    assert_eq!(text.as_deref(), Some("Inhalt von a.txt"));
}

fn pipeline_calls(
    pipeline: &Pipeline<StubExtractor, ScriptedModel>,
) -> Vec<(String, bool, Option<String>)> {
    pipeline.model().calls.borrow().clone()
}

#[test]
fn missing_template_is_skipped_and_batch_continues() {
    let model = ScriptedModel::new(&[("single_choice", Ok("SC"))]);
    let pipeline = Pipeline::new(&Config::default(), prompts(&["single_choice"]), StubExtractor, model);
    let result = pipeline.run_file(
        Path::new("a.txt"),
        &request(&["kprim", "single_choice"]),
        &mut KeepOrder,
    );

    assert!(matches!(result.sections[0].outcome, SectionOutcome::Skipped { .. }));
    assert_eq!(result.document.as_deref(), Some("SC\n\n"));
    assert_eq!(
        result.warnings(),
        vec!["Die Prompt-Datei 'kprim.md' wurde nicht gefunden.".to_string()]
    );
}

#[test]
fn failed_model_call_is_omitted() {
    let model = ScriptedModel::new(&[
        ("truefalse", Err("HTTP 500")),
        ("kprim", Ok("   ")),
        ("single_choice", Ok("SC")),
    ]);
    let pipeline = Pipeline::new(
        &Config::default(),
        prompts(&["truefalse", "kprim", "single_choice"]),
        StubExtractor,
        model,
    );
    let result = pipeline.run_file(
        Path::new("a.txt"),
        &request(&["truefalse", "kprim", "single_choice"]),
        &mut KeepOrder,
    );

    assert!(matches!(result.sections[0].outcome, SectionOutcome::Failed { .. }));
    assert!(matches!(result.sections[1].outcome, SectionOutcome::Failed { .. }));
    assert_eq!(result.document.as_deref(), Some("SC\n\n"));
}

#[test]
fn malformed_blank_response_leaves_visible_error_token() {
    let model = ScriptedModel::new(&[
        ("inline_fib", Ok("Leider kann ich das nicht.")),
        ("single_choice", Ok("SC")),
    ]);
    let pipeline = Pipeline::new(
        &Config::default(),
        prompts(&["inline_fib", "single_choice"]),
        StubExtractor,
        model,
    );
    let result = pipeline.run_file(
        Path::new("a.txt"),
        &request(&["inline_fib", "single_choice"]),
        &mut KeepOrder,
    );

    assert_eq!(
        result.document.as_deref(),
        Some(format!("{MALFORMED_TOKEN}\n\nSC\n\n").as_str())
    );
    match &result.sections[0].outcome {
        SectionOutcome::Generated {
            notice: Some(Notice::MalformedContent { cleaned, raw, .. }),
            ..
        } => {
            assert_eq!(cleaned, "Leider kann ich das nicht.");
            assert_eq!(raw, "Leider kann ich das nicht.");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn malformed_diagnostics_are_part_of_the_warnings() {
    let model = ScriptedModel::new(&[("inline_fib", Ok("```json\nLeider   nicht."))]);
    let pipeline = Pipeline::new(&Config::default(), prompts(&["inline_fib"]), StubExtractor, model);
    let result = pipeline.run_file(Path::new("a.txt"), &request(&["inline_fib"]), &mut KeepOrder);

    let warnings = result.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("Inline Fib (Verarbeitet): "), "{}", warnings[0]);
    assert!(warnings[0].contains("bereinigte Eingabe: Leider nicht."), "{}", warnings[0]);
    assert!(warnings[0].contains("originale Eingabe: ```json\nLeider   nicht."), "{}", warnings[0]);
}

#[test]
fn long_diagnostics_are_shortened_in_warnings() {
    let long = "y".repeat(500);
    let model = ScriptedModel::new(&[("inline_fib", Ok(long.as_str()))]);
    let pipeline = Pipeline::new(&Config::default(), prompts(&["inline_fib"]), StubExtractor, model);
    let result = pipeline.run_file(Path::new("a.txt"), &request(&["inline_fib"]), &mut KeepOrder);

    let warning = &result.warnings()[0];
    assert_eq!(warning.matches('y').count(), 400, "{warning}");
    assert_eq!(warning.matches('…').count(), 2);
    match &result.sections[0].outcome {
        SectionOutcome::Generated {
            notice: Some(Notice::MalformedContent { raw, .. }),
            ..
        } => assert_eq!(raw.len(), 500),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn parsed_but_unusable_blank_response_gets_its_own_token() {
    let model = ScriptedModel::new(&[("inline_fib", Ok(r#"["Berlin", "Paris"]"#))]);
    let pipeline = Pipeline::new(&Config::default(), prompts(&["inline_fib"]), StubExtractor, model);
    let result = pipeline.run_file(Path::new("a.txt"), &request(&["inline_fib"]), &mut KeepOrder);

    assert_eq!(
        result.document.as_deref(),
        Some(format!("{UNPROCESSABLE_TOKEN}\n\n").as_str())
    );
    match &result.sections[0].outcome {
        SectionOutcome::Generated {
            notice: Some(Notice::UnprocessableContent { reason, raw, .. }),
            ..
        } => {
            assert!(reason.contains("item 0"), "{reason}");
            assert_eq!(raw, r#"["Berlin", "Paris"]"#);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn repaired_blank_response_is_flagged() {
    let model = ScriptedModel::new(&[(
        "inline_fib",
        Ok(r#"[{"text":"a{b}c","blanks":["b"],"wrong_substitutes":[]}"#),
    )]);
    let pipeline = Pipeline::new(&Config::default(), prompts(&["inline_fib"]), StubExtractor, model);
    let result = pipeline.run_file(Path::new("a.txt"), &request(&["inline_fib"]), &mut KeepOrder);

    let doc = result.document.unwrap();
    assert_eq!(doc.matches("Points\t1").count(), 2);
    assert!(matches!(
        result.sections[0].outcome,
        SectionOutcome::Generated {
            notice: Some(Notice::PartiallyRecovered { .. }),
            ..
        }
    ));
}

#[test]
fn rendered_pages_get_their_own_headings() {
    let model = ScriptedModel::new(&[("single_choice", Ok("SC"))]);
    let pipeline = Pipeline::new(&Config::default(), prompts(&["single_choice"]), StubExtractor, model);
    let result = pipeline.run_file(Path::new("scan.pdf"), &request(&["single_choice"]), &mut KeepOrder);

    assert_eq!(
        result.document.as_deref(),
        Some("### Seite 1\nSC\n\n\n\n### Seite 2\nSC\n\n\n\n")
    );
    assert_eq!(result.sections.len(), 2);
    assert!(pipeline_calls(&pipeline).iter().all(|(_, image, text)| *image && text.is_none()));
}

#[test]
fn bad_files_do_not_stop_the_batch() {
    let model = ScriptedModel::new(&[("single_choice", Ok("SC"))]);
    let pipeline = Pipeline::new(&Config::default(), prompts(&["single_choice"]), StubExtractor, model);
    let inputs: Vec<PathBuf> = ["notizen.xyz", "kaputt.pdf", "foto.png"]
        .iter()
        .map(PathBuf::from)
        .collect();
    let results = pipeline.run_batch(&inputs, &request(&["single_choice"]), &mut KeepOrder);

    assert_eq!(results.len(), 3);
    assert_eq!(
        results[0].error.as_deref(),
        Some("Nicht unterstützter Dateityp für 'notizen.xyz'.")
    );
    assert!(results[0].document.is_none());
    assert!(results[1].error.is_some());
    assert!(results[1].document.is_none());
    assert_eq!(results[2].document.as_deref(), Some("SC\n\n"));
    assert_eq!(results[2].output_name, "foto_olat.txt");
}

#[test]
fn render_document_skips_sections_without_content() {
    assert_eq!(render_document(&[]), "");
}
