//! Scientific-name forms used for exact-name lookup.

use std::sync::OnceLock;

use regex::Regex;

/// Single capital initial, period, space, then a lowercase (possibly accented)
/// epithet.
const ABBREVIATED_BINOMIAL: &str =
    r"^([A-Z]\. )([a-zïëöüäåéèčáàæœóú]+)$";

fn abbreviated_binomial() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(ABBREVIATED_BINOMIAL).ok())
        .as_ref()
}

/// Expands `"C. lupus"` to `"Canis lupus"` when a genus is supplied.
///
/// Returns `None` when the name is not an abbreviated binomial or no
/// (non-blank) genus is given.
#[must_use]
pub fn expand_abbreviation(name: &str, genus: Option<&str>) -> Option<String> {
    let genus = genus.map(str::trim).filter(|g| !g.is_empty())?;
    let captures = abbreviated_binomial()?.captures(name.trim())?;
    let epithet = captures.get(2)?.as_str();
    Some(format!("{genus} {epithet}"))
}

/// Every form a scientific name is indexed under.
///
/// The full name always comes first, followed by the binomial (for names
/// with more than two words) and abbreviated forms (`"C. lupus"`,
/// `"C. lupus dingo"`). Forms are whitespace-normalised and de-duplicated;
/// case folding happens in the index tokenizer.
#[must_use]
pub fn name_forms(name: &str) -> Vec<String> {
    let words: Vec<&str> = name.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    let mut forms = vec![words.join(" ")];
    if words.len() > 2 {
        forms.push(words[..2].join(" "));
    }
    if words.len() >= 2 {
        if let Some(initial) = words[0].chars().next().filter(|c| c.is_alphabetic()) {
            let abbreviated_genus = format!("{initial}.");
            forms.push(format!("{abbreviated_genus} {}", words[1]));
            if words.len() > 2 {
                forms.push(format!("{abbreviated_genus} {}", words[1..].join(" ")));
            }
        }
    }
    let mut seen = std::collections::HashSet::new();
    forms.retain(|f| seen.insert(f.to_lowercase()));
    forms
}
