//! Canonical name keys used to compare people across rosters and form exports.
//!
//! A key is split into the given name (always the first token) and the
//! surname (every remaining token, in order). Keeping the whole tail as the
//! surname is what lets compound surnames such as "Garcia Rodriguez" compare
//! equal instead of being cut at the first space.

use std::fmt;

/// Characters kept when they sit between two letters or digits.
const JOINERS: [char; 2] = ['-', '\''];

/// Comparable form of a person's name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedKey {
    given: String,
    surname: Vec<String>,
}

impl NormalizedKey {
    /// Builds a key from already cleaned tokens. The first token becomes the
    /// given name.
    pub fn from_tokens(tokens: Vec<String>) -> Self {
        let mut tokens = tokens.into_iter();
        let given = tokens.next().unwrap_or_default();
        Self {
            given,
            surname: tokens.collect(),
        }
    }

    pub fn given(&self) -> &str {
        &self.given
    }

    pub fn surname(&self) -> &[String] {
        &self.surname
    }

    /// Returns `true` when the source contained no usable name characters.
    pub fn is_empty(&self) -> bool {
        self.given.is_empty()
    }

    /// Iterates over the given name followed by the surname tokens.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.given.as_str())
            .filter(|token| !token.is_empty())
            .chain(self.surname.iter().map(String::as_str))
    }

    /// Letters and digits of every token concatenated, without separators,
    /// hyphens or apostrophes.
    pub fn compact(&self) -> String {
        self.tokens()
            .flat_map(str::chars)
            .filter(|ch| ch.is_alphanumeric())
            .collect()
    }

    /// Compact form of the surname alone.
    pub fn compact_surname(&self) -> String {
        self.surname
            .iter()
            .flat_map(|token| token.chars())
            .filter(|ch| ch.is_alphanumeric())
            .collect()
    }
}

impl fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for token in self.tokens() {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(token)?;
            first = false;
        }
        Ok(())
    }
}

/// Canonicalises a raw display name.
///
/// "Surname, Given" input is reordered to "Given Surname" before tokenising,
/// so `normalize("Garcia Rodriguez, Maria")` equals
/// `normalize("maria garcia rodriguez")`.
pub fn normalize(raw: &str) -> NormalizedKey {
    let reordered = match raw.split_once(',') {
        Some((surname, given)) => format!("{given} {surname}"),
        None => raw.to_string(),
    };
    let tokens = reordered.split_whitespace().filter_map(clean_token).collect();
    NormalizedKey::from_tokens(tokens)
}

/// Builds a key from the username part of an e-mail address.
///
/// `maria.garcia42@school.org` becomes given `maria`, surname `garcia`.
/// Digits are dropped since school accounts usually append an ID.
pub fn normalize_email(raw: &str) -> NormalizedKey {
    let tokens = email_local_part(raw)
        .split(['.', '_', '-', '+'])
        .map(|piece| piece.chars().filter(|ch| ch.is_alphabetic()).collect::<String>())
        .filter(|piece| !piece.is_empty())
        .collect();
    NormalizedKey::from_tokens(tokens)
}

/// Letters of the e-mail username, lower-cased and concatenated.
pub fn compact_email(raw: &str) -> String {
    email_local_part(raw)
        .chars()
        .filter(|ch| ch.is_alphabetic())
        .collect()
}

fn email_local_part(raw: &str) -> String {
    let trimmed = raw.trim();
    let local = trimmed.split('@').next().unwrap_or(trimmed);
    local.to_lowercase()
}

fn clean_token(token: &str) -> Option<String> {
    let chars: Vec<char> = token
        .chars()
        .map(|ch| match ch {
            '\u{2018}' | '\u{2019}' | '`' => '\'',
            '\u{2010}' | '\u{2011}' => '-',
            other => other,
        })
        .collect();

    let mut cleaned = String::with_capacity(token.len());
    for (idx, &ch) in chars.iter().enumerate() {
        if ch.is_alphanumeric() {
            cleaned.extend(ch.to_lowercase());
        } else if JOINERS.contains(&ch) {
            let after_name_char = cleaned.chars().last().is_some_and(char::is_alphanumeric);
            let before_name_char = chars.get(idx + 1).is_some_and(|next| next.is_alphanumeric());
            if after_name_char && before_name_char {
                cleaned.push(ch);
            }
        }
    }

    (!cleaned.is_empty()).then_some(cleaned)
}
