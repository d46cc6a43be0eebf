pub mod repair;
pub mod sanitize;

pub use repair::{parse_items, repair, ParsedItems, Recovery};
pub use sanitize::sanitize;

use crate::{
    error::ContentError,
    postprocess::replace_sharp_s,
    quiz::{encode, OptionShuffler},
};

/// Final text for one blank-style response, plus how it was recovered.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub text: String,
    pub recovery: Recovery,
    pub item_count: usize,
}

/// Sanitize, parse (with repair), encode both formats and normalize `ß`.
pub fn transform_response(
    raw: &str,
    shuffler: &mut dyn OptionShuffler,
) -> Result<Transformed, ContentError> {
    let cleaned = sanitize(raw);
    let parsed = parse_items(&cleaned, raw)?;
    let blocks = encode(&parsed.items, shuffler);
    Ok(Transformed {
        text: replace_sharp_s(&blocks.combined()),
        recovery: parsed.recovery,
        item_count: parsed.items.len(),
    })
}
