//! Blank items and their two OLAT text encodings: Fill-in-Blank and Inline-Choice.

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::Serialize;
use serde_json::Value;

pub const FIB_TITLE: &str = "✏✏Vervollständigen Sie die Lücken mit dem korrekten Begriff.✏✏";
pub const INLINE_CHOICE_TITLE: &str = "Wörter einordnen";
pub const INLINE_CHOICE_QUESTION: &str = "✏✏Wählen Sie die richtigen Wörter.✏✏";

/// Weight written after every Fill-in-Blank answer.
pub const BLANK_WEIGHT: u32 = 20;

/// One generated cloze text with its answers and distractors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlankItem {
    pub text: String,
    pub blanks: Vec<String>,
    pub wrong_substitutes: Vec<String>,
}

impl BlankItem {
    /// Coerce one parsed JSON element. Missing fields become empty; non-objects yield `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(map) = value else {
            return None;
        };
        let wrong = map
            .get("wrong_substitutes")
            .or_else(|| map.get("wrongSubstitutes"));
        Some(Self {
            text: map.get("text").map(scalar_text).unwrap_or_default(),
            blanks: string_list(map.get("blanks")),
            wrong_substitutes: string_list(wrong),
        })
    }

    /// Split `text` at the blank positions.
    ///
    /// Each blank replaces the first remaining occurrence of its literal,
    /// in list order. A marker written as `{literal}` loses its braces.
    /// Segment `i` carries `blanks[i]` when that index exists, so a blank
    /// whose literal is missing from the text still gets an answer line.
    pub fn segments(&self) -> Vec<Segment<'_>> {
        let mut pieces = vec![self.text.clone()];

        for literal in &self.blanks {
            let Some((idx, pos)) = pieces
                .iter()
                .enumerate()
                .find_map(|(i, p)| p.find(literal.as_str()).map(|pos| (i, pos)))
            else {
                continue;
            };
            let piece = &pieces[idx];
            let mut left = piece[..pos].to_string();
            let mut right = piece[pos + literal.len()..].to_string();
            if left.ends_with('{') && right.starts_with('}') {
                left.pop();
                right.remove(0);
            }
            pieces[idx] = left;
            pieces.insert(idx + 1, right);
        }

        pieces
            .into_iter()
            .enumerate()
            .map(|(i, text)| Segment {
                text: text.trim().to_string(),
                answer: self.blanks.get(i).map(String::as_str),
            })
            .collect()
    }

    /// `blanks` followed by `wrong_substitutes`, before shuffling.
    pub fn option_pool(&self) -> Vec<String> {
        self.blanks
            .iter()
            .chain(self.wrong_substitutes.iter())
            .cloned()
            .collect()
    }
}

fn scalar_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn string_list(v: Option<&Value>) -> Vec<String> {
    match v {
        Some(Value::Array(values)) => values
            .iter()
            .filter(|v| !v.is_null())
            .map(scalar_text)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// A text run followed by at most one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'a> {
    pub text: String,
    pub answer: Option<&'a str>,
}

/// Source of the Inline-Choice option order.
pub trait OptionShuffler {
    fn shuffle(&mut self, options: &mut [String]);
}

pub struct RandomShuffler<R: Rng> {
    rng: R,
}

impl<R: Rng> RandomShuffler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RandomShuffler<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    pub fn from_seed_opt(seed: Option<u64>) -> Self {
        seed.map(Self::seeded).unwrap_or_else(Self::from_entropy)
    }
}

impl<R: Rng> OptionShuffler for RandomShuffler<R> {
    fn shuffle(&mut self, options: &mut [String]) {
        options.shuffle(&mut self.rng);
    }
}

/// Leaves options in `blanks ++ wrong_substitutes` order.
pub struct KeepOrder;

impl OptionShuffler for KeepOrder {
    fn shuffle(&mut self, _options: &mut [String]) {}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuizBlocks {
    pub fill_in_blank: String,
    pub inline_choice: String,
}

impl QuizBlocks {
    /// Inline-Choice block, a `---` line, then the Fill-in-Blank block.
    pub fn combined(&self) -> String {
        format!("{}\n---\n{}", self.inline_choice, self.fill_in_blank)
    }
}

/// Encode every item in both formats. Options are shuffled once per item.
pub fn encode(items: &[BlankItem], shuffler: &mut dyn OptionShuffler) -> QuizBlocks {
    let mut fib = Vec::with_capacity(items.len());
    let mut inline = Vec::with_capacity(items.len());

    for item in items {
        let segments = item.segments();
        let mut pool = item.option_pool();
        shuffler.shuffle(&mut pool);

        fib.push(render_fill_in_blank(item, &segments));
        inline.push(render_inline_choice(item, &segments, &pool));
    }

    QuizBlocks {
        fill_in_blank: fib.join("\n\n"),
        inline_choice: inline.join("\n\n"),
    }
}

pub fn render_fill_in_blank(item: &BlankItem, segments: &[Segment<'_>]) -> String {
    let mut lines = vec![
        "Type\tFIB".to_string(),
        format!("Title\t{FIB_TITLE}"),
        format!("Points\t{}", item.blanks.len()),
    ];
    for seg in segments {
        lines.push(format!("Text\t{}", field(&seg.text)));
        if let Some(answer) = seg.answer {
            lines.push(format!("1\t{}\t{BLANK_WEIGHT}", field(answer)));
        }
    }
    lines.join("\n")
}

pub fn render_inline_choice(item: &BlankItem, segments: &[Segment<'_>], pool: &[String]) -> String {
    let options = pool.iter().map(|o| field(o)).collect::<Vec<_>>().join("|");
    let mut lines = vec![
        "Type\tInlinechoice".to_string(),
        format!("Title\t{INLINE_CHOICE_TITLE}"),
        format!("Question\t{INLINE_CHOICE_QUESTION}"),
        format!("Points\t{}", item.blanks.len()),
    ];
    for seg in segments {
        lines.push(format!("Text\t{}", field(&seg.text)));
        if let Some(answer) = seg.answer {
            lines.push(format!("1\t{options}\t{}\t|", field(answer)));
        }
    }
    lines.join("\n")
}

/// Tabs and line breaks inside a value would split the field or the line.
fn field(s: &str) -> String {
    s.replace("\r\n", " ").replace(['\t', '\n', '\r'], " ")
}
