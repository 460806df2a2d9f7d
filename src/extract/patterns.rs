//! Regex patterns used by the extraction cascade.
//!
//! These are part of the transcript format: changing any of them changes which
//! existing transcripts parse and how.

use lazy_static::lazy_static;
use regex::Regex;

/// Signed decimal: `0.4`, `-0.75`, `+1`, `-.5`, `1.`
pub const NUMBER: &str = r"[-+]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)";

lazy_static! {
    /// Tier 1: canonical label immediately followed by a number.
    pub static ref LABEL_NUMBER: Regex =
        Regex::new(&format!(r"OPINION:[ \t]*({NUMBER})")).expect("label pattern is valid");

    /// Tier 2: the label anywhere on a line, any case.
    pub static ref LABEL_ANY_CASE: Regex =
        Regex::new(r"(?i)\bopinion\s*:").expect("label line pattern is valid");

    /// Tier 3 anchor: the word "opinion" in any case.
    pub static ref OPINION_WORD: Regex =
        Regex::new(r"(?i)opinion").expect("opinion word pattern is valid");

    /// A number anywhere.
    pub static ref ANY_NUMBER: Regex = Regex::new(NUMBER).expect("number pattern is valid");

    /// Inline emphasis markers: `**`, `*`, `__`, backticks, strikethrough.
    pub static ref EMPHASIS: Regex =
        Regex::new(r"\*+|_{2,}|`+|~~").expect("emphasis pattern is valid");

    /// The scale description from the score instruction, echoed back by weak models.
    pub static ref TEMPLATE_ECHO: Regex = Regex::new(
        r"(?i)(?:as a float\s*)?from\s*-1(?:\.0)?\s*(?:\([^)]*\)\s*)?to\s*\+?1(?:\.0)?(?:\s*\([^)]*\))?"
    )
    .expect("template echo pattern is valid");

    /// The label and everything after it on its line, for display stripping.
    /// A label that opens a line also takes the preceding newline.
    pub static ref SCORE_LINE: Regex =
        Regex::new(r"(?i)(?:\n[ \t]*)?[ \t]*[*_`]*opinion[*_`]*[ \t]*:[^\n]*")
            .expect("score line pattern is valid");
}
