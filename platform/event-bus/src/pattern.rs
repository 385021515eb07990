//! Topic routing patterns.
//!
//! Routing keys are dot-separated words (`user.created`). Binding patterns
//! may use three wildcards:
//!
//! - `*` matches exactly one word (`user.*` matches `user.created`, not
//!   `user.profile.updated`)
//! - `#` matches zero or more words (`user.#` matches `user`,
//!   `user.created` and `user.profile.updated`)
//! - `>` matches one or more words (native broker form of the above)

use crate::{BusError, BusResult};

/// Check whether a concrete subject matches a binding pattern.
pub fn matches(subject: &str, pattern: &str) -> bool {
    let subject: Vec<&str> = subject.split('.').collect();
    let pattern: Vec<&str> = pattern.split('.').collect();
    matches_tokens(&subject, &pattern)
}

fn matches_tokens(subject: &[&str], pattern: &[&str]) -> bool {
    match pattern.first() {
        None => subject.is_empty(),
        Some(&">") => pattern.len() == 1 && !subject.is_empty(),
        Some(&"#") => (0..=subject.len()).any(|taken| matches_tokens(&subject[taken..], &pattern[1..])),
        Some(&"*") => !subject.is_empty() && matches_tokens(&subject[1..], &pattern[1..]),
        Some(word) => subject.first() == Some(word) && matches_tokens(&subject[1..], &pattern[1..]),
    }
}

/// Validate a concrete publish subject: non-empty words, no wildcards.
///
/// # Errors
///
/// Returns [`BusError::InvalidSubject`] naming the offending subject.
pub fn validate_subject(subject: &str) -> BusResult<()> {
    if subject.is_empty()
        || subject
            .split('.')
            .any(|tok| tok.is_empty() || tok == "*" || tok == "#" || tok == ">")
    {
        return Err(BusError::InvalidSubject(subject.to_string()));
    }
    Ok(())
}

/// Normalize a binding pattern to the broker-native form.
///
/// A trailing `#` becomes `>`; `*` and literal words pass through.
///
/// # Errors
///
/// Returns [`BusError::InvalidSubject`] for empty words or a `#`/`>`
/// anywhere but the final position (the broker cannot express those).
pub fn normalize(pattern: &str) -> BusResult<String> {
    let tokens: Vec<&str> = pattern.split('.').collect();
    let last = tokens.len() - 1;

    let mut out = Vec::with_capacity(tokens.len());
    for (i, tok) in tokens.iter().enumerate() {
        match *tok {
            "" => return Err(BusError::InvalidSubject(pattern.to_string())),
            "#" | ">" if i != last => return Err(BusError::InvalidSubject(pattern.to_string())),
            "#" => out.push(">"),
            tok => out.push(tok),
        }
    }

    Ok(out.join("."))
}
