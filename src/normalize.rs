//! Text normalization applied to extracted text before chunking.
//!
//! [`normalize`] is pure and idempotent: `normalize(normalize(x)) == normalize(x)`.
//! The steps run in a fixed order:
//!
//! 1. Typographic quotes are mapped to ASCII `'` and `"`.
//! 2. Characters outside the allow-list (word characters, whitespace,
//!    standard punctuation, brackets, quotes) become a space.
//! 3. Whitespace runs collapse. A run holding two or more newlines becomes a
//!    single blank line (`"\n\n"`), anything else becomes one space.
//! 4. A sentence-ending punctuation run glued to an uppercase letter gets a
//!    space, so `"end.Next"` becomes `"end. Next"`.
//! 5. Leading and trailing whitespace is trimmed.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[^\w\s.,;:!?\-/()\[\]{}'"%&@#*+=]"#).expect("allow-list pattern is valid")
});

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

static GLUED_SENTENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([.!?]+)(\p{Lu})").expect("sentence pattern is valid"));

/// Cleans raw extracted text. See the module docs for the exact steps.
pub fn normalize(raw: &str) -> String {
    let quoted: String = raw.chars().map(canonical_quote).collect();
    let allowed = DISALLOWED.replace_all(&quoted, " ");
    let collapsed = WHITESPACE_RUN.replace_all(&allowed, |caps: &Captures| {
        if caps[0].matches('\n').count() >= 2 {
            "\n\n"
        } else {
            " "
        }
    });
    let spaced = GLUED_SENTENCE.replace_all(&collapsed, "$1 $2");
    spaced.trim().to_string()
}

fn canonical_quote(c: char) -> char {
    match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => '\'',
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{00AB}' | '\u{00BB}'
        | '\u{2033}' => '"',
        other => other,
    }
}
