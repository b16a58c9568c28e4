//! Resolves form submitters to roster entries.
//!
//! Matching runs in three tiers and stops at the first tier that finds
//! anything:
//!
//! 1. exact key equality;
//! 2. same given name with one surname a prefix or suffix of the other (and,
//!    for e-mail usernames, a username that opens with the given name and
//!    carries the surname after it);
//! 3. fuzzy similarity above the configured threshold.
//!
//! Several candidates at the winning tier always produce
//! [`MatchResult::Ambiguous`]; the matcher never picks one arbitrarily.

use std::collections::BTreeSet;

use serde::Deserialize;
use tracing::debug;

use crate::model::{Identifier, MatchResult, MatchTier, Period, Person, Roster, Submission};
use crate::normalize::{NormalizedKey, compact_email};

/// Tunables for the matcher.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Fuzzy candidates must score strictly above this similarity.
    pub fuzzy_threshold: f64,
    /// Include edit distance on the compact name in fuzzy similarity.
    pub edit_distance: bool,
    /// Search the whole roster when nothing matches in the hinted period.
    pub cross_period_fallback: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.8,
            edit_distance: true,
            cross_period_fallback: true,
        }
    }
}

/// Name being looked up.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    key: NormalizedKey,
    email_username: Option<String>,
}

impl Query {
    pub fn from_key(key: NormalizedKey) -> Self {
        Self {
            key,
            email_username: None,
        }
    }

    pub fn from_identifier(identifier: &Identifier) -> Self {
        let email_username = match identifier {
            Identifier::Email(raw) => Some(compact_email(raw)),
            Identifier::Name(_) => None,
        };
        Self {
            key: identifier.key(),
            email_username,
        }
    }

    pub fn key(&self) -> &NormalizedKey {
        &self.key
    }
}

#[derive(Debug, Clone, Default)]
pub struct Matcher {
    config: MatchConfig,
}

impl Matcher {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Matches a submission against the roster, using its period as hint.
    pub fn match_submission<'a>(
        &self,
        submission: &Submission,
        roster: &'a Roster,
    ) -> MatchResult<'a> {
        let query = Query::from_identifier(&submission.identifier);
        let result = self.find(&query, roster.people(), submission.period.as_ref());
        match &result {
            MatchResult::Matched {
                person,
                tier,
                cross_period,
            } => debug!(
                identifier = %submission.identifier,
                person = person.full_name(),
                %tier,
                cross_period,
                "submission matched"
            ),
            MatchResult::Unmatched => debug!(identifier = %submission.identifier, "no match"),
            MatchResult::Ambiguous { candidates, tier } => debug!(
                identifier = %submission.identifier,
                candidates = candidates.len(),
                %tier,
                "ambiguous match"
            ),
        }
        result
    }

    /// Matches every submission, keeping the input order.
    pub fn match_all<'a>(
        &self,
        submissions: Vec<Submission>,
        roster: &'a Roster,
    ) -> Vec<(Submission, MatchResult<'a>)> {
        submissions
            .into_iter()
            .map(|submission| {
                let result = self.match_submission(&submission, roster);
                (submission, result)
            })
            .collect()
    }

    /// Finds the best candidate for `query`.
    ///
    /// With a `period_hint` only that period is searched first; if nothing
    /// matches there and fallback is enabled the full candidate list is
    /// searched and a hit is flagged as cross-period.
    pub fn find<'a>(
        &self,
        query: &Query,
        candidates: &'a [Person],
        period_hint: Option<&Period>,
    ) -> MatchResult<'a> {
        if query.key.is_empty() {
            return MatchResult::Unmatched;
        }

        let Some(period) = period_hint else {
            let everyone: Vec<&Person> = candidates.iter().collect();
            return self.search(query, &everyone);
        };

        let in_period: Vec<&Person> = candidates
            .iter()
            .filter(|person| &person.period == period)
            .collect();
        match self.search(query, &in_period) {
            MatchResult::Unmatched if self.config.cross_period_fallback => {
                let everyone: Vec<&Person> = candidates.iter().collect();
                match self.search(query, &everyone) {
                    MatchResult::Matched { person, tier, .. } => MatchResult::Matched {
                        person,
                        tier,
                        cross_period: true,
                    },
                    other => other,
                }
            }
            other => other,
        }
    }

    fn search<'a>(&self, query: &Query, candidates: &[&'a Person]) -> MatchResult<'a> {
        let exact: Vec<&'a Person> = candidates
            .iter()
            .copied()
            .filter(|person| person.key() == &query.key)
            .collect();
        if let Some(result) = decide(exact, MatchTier::Exact) {
            return result;
        }

        let partial: Vec<&'a Person> = candidates
            .iter()
            .copied()
            .filter(|person| {
                surname_overlaps(&query.key, person.key())
                    || query
                        .email_username
                        .as_deref()
                        .is_some_and(|username| username_contains(username, person.key()))
            })
            .collect();
        if let Some(result) = decide(partial, MatchTier::NormalizedExact) {
            return result;
        }

        let scored: Vec<(&'a Person, f64)> = candidates
            .iter()
            .copied()
            .map(|person| (person, self.similarity(&query.key, person.key())))
            .filter(|(_, score)| *score > self.config.fuzzy_threshold)
            .collect();
        let best = scored
            .iter()
            .map(|(_, score)| *score)
            .fold(f64::NEG_INFINITY, f64::max);
        let fuzzy: Vec<&'a Person> = scored
            .into_iter()
            .filter(|(_, score)| (best - score).abs() <= f64::EPSILON)
            .map(|(person, _)| person)
            .collect();
        decide(fuzzy, MatchTier::Fuzzy).unwrap_or(MatchResult::Unmatched)
    }

    /// Similarity in `0.0..=1.0` used by the fuzzy tier.
    pub fn similarity(&self, query: &NormalizedKey, candidate: &NormalizedKey) -> f64 {
        let overlap = token_overlap(query, candidate);
        if !self.config.edit_distance {
            return overlap;
        }
        overlap.max(edit_similarity(&query.compact(), &candidate.compact()))
    }
}

fn decide(found: Vec<&Person>, tier: MatchTier) -> Option<MatchResult<'_>> {
    match found.len() {
        0 => None,
        1 => Some(MatchResult::Matched {
            person: found[0],
            tier,
            cross_period: false,
        }),
        _ => Some(MatchResult::Ambiguous {
            candidates: found,
            tier,
        }),
    }
}

fn surname_overlaps(query: &NormalizedKey, candidate: &NormalizedKey) -> bool {
    let (wanted, known) = (query.surname(), candidate.surname());
    if query.given() != candidate.given() || wanted.is_empty() || known.is_empty() {
        return false;
    }
    known.starts_with(wanted)
        || known.ends_with(wanted)
        || wanted.starts_with(known)
        || wanted.ends_with(known)
}

/// `firstname.lastname###@school` style usernames. The given name must open
/// the username so that "diana" never stands in for "ana".
fn username_contains(username: &str, candidate: &NormalizedKey) -> bool {
    let given: String = candidate
        .given()
        .chars()
        .filter(|ch| ch.is_alphabetic())
        .collect();
    let surname = candidate.compact_surname();
    if given.is_empty() || surname.is_empty() {
        return false;
    }
    username
        .strip_prefix(given.as_str())
        .is_some_and(|rest| rest.contains(&surname))
}

fn token_overlap(lhs: &NormalizedKey, rhs: &NormalizedKey) -> f64 {
    let lhs: BTreeSet<&str> = lhs.tokens().collect();
    let rhs: BTreeSet<&str> = rhs.tokens().collect();
    let union = lhs.union(&rhs).count();
    if union == 0 {
        return 0.0;
    }
    lhs.intersection(&rhs).count() as f64 / union as f64
}

fn edit_similarity(lhs: &str, rhs: &str) -> f64 {
    let longest = lhs.chars().count().max(rhs.chars().count());
    if longest == 0 {
        return 0.0;
    }
    1.0 - levenshtein(lhs, rhs) as f64 / longest as f64
}

/// Character-level edit distance.
pub fn levenshtein(lhs: &str, rhs: &str) -> usize {
    let rhs: Vec<char> = rhs.chars().collect();
    let mut previous: Vec<usize> = (0..=rhs.len()).collect();
    let mut current = vec![0; rhs.len() + 1];

    for (i, left) in lhs.chars().enumerate() {
        current[0] = i + 1;
        for (j, right) in rhs.iter().enumerate() {
            let substitution = previous[j] + usize::from(left != *right);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[rhs.len()]
}
