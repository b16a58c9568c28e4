use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer};

use crate::error::{Result, ToolError};
use crate::normalize::{NormalizedKey, normalize, normalize_email};

/// A class section identifier.
///
/// Numbered periods sort numerically and before any free-form label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Period {
    /// Numbered class block, e.g. `3` for "Period 3".
    Number(u32),
    /// Any other section label, e.g. "A-Day".
    Label(String),
}

impl Period {
    /// Parses a period from cell or configuration text.
    ///
    /// Accepts `3`, `3.0`, `Period 3` and `period: 3`; anything else that is
    /// not blank becomes a label.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let lowered = trimmed.to_lowercase();
        let digits = lowered
            .strip_prefix("period")
            .map(|rest| rest.trim_start_matches([':', ' ', '#']))
            .unwrap_or(lowered.as_str());

        if let Ok(number) = digits.parse::<u32>() {
            return Some(Period::Number(number));
        }
        if let Ok(number) = digits.parse::<f64>() {
            if number >= 0.0 && number.fract() == 0.0 && number <= f64::from(u32::MAX) {
                return Some(Period::Number(number as u32));
            }
        }
        Some(Period::Label(trimmed.to_string()))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Number(number) => write!(f, "{number}"),
            Period::Label(label) => f.write_str(label),
        }
    }
}

impl From<u32> for Period {
    fn from(number: u32) -> Self {
        Period::Number(number)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawPeriod {
            Number(u32),
            Text(String),
        }

        match RawPeriod::deserialize(deserializer)? {
            RawPeriod::Number(number) => Ok(Period::Number(number)),
            RawPeriod::Text(text) => Period::parse(&text)
                .ok_or_else(|| serde::de::Error::custom("period must not be blank")),
        }
    }
}

/// One enrolled student within one period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    full_name: String,
    key: NormalizedKey,
    /// Opaque student number from the gradebook.
    pub student_id: Option<String>,
    /// Grade level as exported (e.g. "10").
    pub grade: Option<String>,
    pub period: Period,
    pub course: String,
}

impl Person {
    /// Creates a person; the normalized key is derived from `full_name`.
    pub fn new(full_name: impl Into<String>, period: Period, course: impl Into<String>) -> Self {
        let full_name = full_name.into().trim().to_string();
        let key = normalize(&full_name);
        Self {
            full_name,
            key,
            student_id: None,
            grade: None,
            period,
            course: course.into(),
        }
    }

    pub fn with_student_id(mut self, student_id: impl Into<String>) -> Self {
        self.student_id = Some(student_id.into());
        self
    }

    pub fn with_grade(mut self, grade: impl Into<String>) -> Self {
        self.grade = Some(grade.into());
        self
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn key(&self) -> &NormalizedKey {
        &self.key
    }

    /// Output order: period, surname, given name, then the raw name.
    pub fn roster_order(&self, other: &Person) -> Ordering {
        self.period
            .cmp(&other.period)
            .then_with(|| self.key.surname().cmp(other.key.surname()))
            .then_with(|| self.key.given().cmp(other.key.given()))
            .then_with(|| self.full_name.cmp(&other.full_name))
    }
}

/// Validated collection of people, sorted in roster order.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    people: Vec<Person>,
    diagnostics: Vec<Diagnostic>,
}

impl Roster {
    /// Validates and sorts the given people.
    ///
    /// Two people with the same normalized key in the same period make
    /// submission counts meaningless, so that aborts with
    /// [`ToolError::DuplicateRosterEntry`]. The same key in different periods
    /// is kept and flagged as [`Diagnostic::CrossPeriodEnrollment`].
    pub fn new(mut people: Vec<Person>) -> Result<Self> {
        check_duplicates(&people)?;
        let diagnostics = enrollment_diagnostics(&people);
        people.sort_by(Person::roster_order);
        Ok(Self {
            people,
            diagnostics,
        })
    }

    /// Copy of the roster holding only the given periods.
    pub fn restricted_to(&self, periods: &BTreeSet<Period>) -> Roster {
        let people: Vec<Person> = self
            .people
            .iter()
            .filter(|person| periods.contains(&person.period))
            .cloned()
            .collect();
        let diagnostics = enrollment_diagnostics(&people);
        Self {
            people,
            diagnostics,
        }
    }

    pub fn people(&self) -> &[Person] {
        &self.people
    }

    /// People enrolled in the given period, in roster order.
    pub fn in_period<'a>(&'a self, period: &'a Period) -> impl Iterator<Item = &'a Person> + 'a {
        self.people.iter().filter(move |person| &person.period == period)
    }

    /// Distinct periods in ascending order.
    pub fn periods(&self) -> BTreeSet<Period> {
        self.people.iter().map(|person| person.period.clone()).collect()
    }

    /// Advisories raised while validating the roster.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }
}

fn check_duplicates(people: &[Person]) -> Result<()> {
    let mut seen: HashMap<(&Period, &NormalizedKey), &Person> = HashMap::new();
    for person in people {
        if let Some(first) = seen.insert((&person.period, &person.key), person) {
            return Err(ToolError::DuplicateRosterEntry {
                key: person.key.to_string(),
                period: person.period.to_string(),
                first: first.full_name.clone(),
                second: person.full_name.clone(),
            });
        }
    }
    Ok(())
}

fn enrollment_diagnostics(people: &[Person]) -> Vec<Diagnostic> {
    let mut periods_by_key: BTreeMap<&NormalizedKey, (&str, BTreeSet<&Period>)> =
        BTreeMap::new();
    for person in people {
        periods_by_key
            .entry(&person.key)
            .or_insert_with(|| (person.full_name.as_str(), BTreeSet::new()))
            .1
            .insert(&person.period);
    }
    periods_by_key
        .into_values()
        .filter(|(_, periods)| periods.len() > 1)
        .map(|(name, periods)| Diagnostic::CrossPeriodEnrollment {
            person: name.to_string(),
            periods: periods.into_iter().cloned().collect(),
        })
        .collect()
}

/// Raw value used to locate the submitter of a form response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Name(String),
    Email(String),
}

impl Identifier {
    /// Anything containing `@` is treated as an e-mail address.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim().to_string();
        if trimmed.contains('@') {
            Identifier::Email(trimmed)
        } else {
            Identifier::Name(trimmed)
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            Identifier::Name(raw) | Identifier::Email(raw) => raw,
        }
    }

    pub fn key(&self) -> NormalizedKey {
        match self {
            Identifier::Name(raw) => normalize(raw),
            Identifier::Email(raw) => normalize_email(raw),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw())
    }
}

/// One form response row.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub identifier: Identifier,
    /// Period the response was collected for, when known.
    pub period: Option<Period>,
    pub response_text: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
    /// 1-based row number within the source file; the header row is 1.
    pub source_row: usize,
}

impl Submission {
    pub fn new(identifier: Identifier, source_row: usize) -> Self {
        Self {
            identifier,
            period: None,
            response_text: None,
            timestamp: None,
            source_row,
        }
    }

    pub fn with_period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response_text = Some(response.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Response text with surrounding whitespace removed, if any remains.
    pub fn response(&self) -> Option<&str> {
        self.response_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// Confidence tier of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    Exact,
    NormalizedExact,
    Fuzzy,
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchTier::Exact => write!(f, "exact"),
            MatchTier::NormalizedExact => write!(f, "normalized-exact"),
            MatchTier::Fuzzy => write!(f, "fuzzy"),
        }
    }
}

/// Outcome of matching one submission against a roster.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult<'a> {
    /// A single roster entry was found. `cross_period` is set when the entry
    /// was only found outside the submission's period.
    Matched {
        person: &'a Person,
        tier: MatchTier,
        cross_period: bool,
    },
    Unmatched,
    /// Several entries tied at the same tier; needs a human decision.
    Ambiguous {
        candidates: Vec<&'a Person>,
        tier: MatchTier,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Submitted,
    NotSubmitted,
}

/// ACE rubric result. Each part is in `0..=2`, so `total` is in `0..=6`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RubricScore {
    pub answer: u8,
    pub cite: u8,
    pub explain: u8,
    pub total: u8,
}

impl RubricScore {
    /// Builds a score, clamping every part to the rubric maximum.
    pub fn new(answer: u8, cite: u8, explain: u8) -> Self {
        let (answer, cite, explain) = (answer.min(2), cite.min(2), explain.min(2));
        Self {
            answer,
            cite,
            explain,
            total: answer + cite + explain,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// One output row per roster person.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledRow {
    pub person: Person,
    pub status: SubmissionStatus,
    /// The submission kept for this person, if any.
    pub submission: Option<Submission>,
    pub tier: Option<MatchTier>,
    pub score: Option<RubricScore>,
}

impl ReconciledRow {
    /// First `limit` characters of the kept response, with `...` appended
    /// when it was cut.
    pub fn response_preview(&self, limit: usize) -> Option<String> {
        let text = self.submission.as_ref()?.response()?;
        if text.chars().count() > limit {
            let cut: String = text.chars().take(limit).collect();
            Some(format!("{cut}..."))
        } else {
            Some(text.to_string())
        }
    }
}

/// Reportable condition collected during a run.
///
/// Diagnostics are part of the primary output: every workflow writes them to
/// their own sheet next to the results.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A source row could not be turned into a record and was skipped.
    MalformedRecord {
        source: String,
        row: usize,
        reason: String,
    },
    Unmatched {
        identifier: String,
        period: Option<Period>,
        row: usize,
    },
    Ambiguous {
        identifier: String,
        period: Option<Period>,
        row: usize,
        tier: MatchTier,
        candidates: Vec<String>,
    },
    /// The submitter was only found in another period's roster.
    CrossPeriodMatch {
        identifier: String,
        row: usize,
        submitted_period: Option<Period>,
        person: String,
        roster_period: Period,
    },
    /// Another submission for the same person was kept instead of this one.
    DuplicateSubmission {
        person: String,
        period: Period,
        kept_row: usize,
        discarded_row: usize,
        discarded_identifier: String,
    },
    /// The same name is enrolled in more than one period.
    CrossPeriodEnrollment {
        person: String,
        periods: Vec<Period>,
    },
    /// Scoring for a period was skipped because its prompt is unusable.
    Configuration { period: Period, reason: String },
}

impl Diagnostic {
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::MalformedRecord { .. } => "malformed record",
            Diagnostic::Unmatched { .. } => "unmatched",
            Diagnostic::Ambiguous { .. } => "ambiguous",
            Diagnostic::CrossPeriodMatch { .. } => "cross-period match",
            Diagnostic::DuplicateSubmission { .. } => "duplicate submission",
            Diagnostic::CrossPeriodEnrollment { .. } => "cross-period enrollment",
            Diagnostic::Configuration { .. } => "configuration",
        }
    }

    pub fn period(&self) -> Option<&Period> {
        match self {
            Diagnostic::Unmatched { period, .. } | Diagnostic::Ambiguous { period, .. } => {
                period.as_ref()
            }
            Diagnostic::CrossPeriodMatch {
                submitted_period, ..
            } => submitted_period.as_ref(),
            Diagnostic::DuplicateSubmission { period, .. }
            | Diagnostic::Configuration { period, .. } => Some(period),
            Diagnostic::MalformedRecord { .. } | Diagnostic::CrossPeriodEnrollment { .. } => None,
        }
    }

    pub fn row(&self) -> Option<usize> {
        match self {
            Diagnostic::MalformedRecord { row, .. }
            | Diagnostic::Unmatched { row, .. }
            | Diagnostic::Ambiguous { row, .. }
            | Diagnostic::CrossPeriodMatch { row, .. } => Some(*row),
            Diagnostic::DuplicateSubmission { discarded_row, .. } => Some(*discarded_row),
            Diagnostic::CrossPeriodEnrollment { .. } | Diagnostic::Configuration { .. } => None,
        }
    }

    /// Raw identifier or name the diagnostic is about.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Diagnostic::Unmatched { identifier, .. }
            | Diagnostic::Ambiguous { identifier, .. }
            | Diagnostic::CrossPeriodMatch { identifier, .. } => Some(identifier.as_str()),
            Diagnostic::DuplicateSubmission {
                discarded_identifier,
                ..
            } => Some(discarded_identifier.as_str()),
            Diagnostic::CrossPeriodEnrollment { person, .. } => Some(person.as_str()),
            Diagnostic::MalformedRecord { .. } | Diagnostic::Configuration { .. } => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MalformedRecord {
                source,
                row,
                reason,
            } => write!(f, "{source} row {row}: {reason}"),
            Diagnostic::Unmatched { identifier, .. } => {
                write!(f, "no roster entry matches '{identifier}'")
            }
            Diagnostic::Ambiguous {
                identifier,
                tier,
                candidates,
                ..
            } => write!(
                f,
                "'{identifier}' matches {} roster entries at {tier} tier: {}",
                candidates.len(),
                candidates.join("; ")
            ),
            Diagnostic::CrossPeriodMatch {
                identifier,
                person,
                roster_period,
                ..
            } => write!(
                f,
                "'{identifier}' matched {person}, who is enrolled in period {roster_period}"
            ),
            Diagnostic::DuplicateSubmission {
                person,
                kept_row,
                discarded_row,
                ..
            } => write!(
                f,
                "{person} submitted more than once; kept row {kept_row}, discarded row {discarded_row}"
            ),
            Diagnostic::CrossPeriodEnrollment { person, periods } => {
                let periods: Vec<String> = periods.iter().map(Period::to_string).collect();
                write!(f, "{person} is enrolled in periods {}", periods.join(", "))
            }
            Diagnostic::Configuration { period, reason } => {
                write!(f, "period {period} was not scored: {reason}")
            }
        }
    }
}
