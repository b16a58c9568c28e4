//! Turns per-submission match results into one row per roster person.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::{debug, info};

use crate::model::{
    Diagnostic, MatchResult, MatchTier, Period, Person, ReconciledRow, Roster, Submission,
    SubmissionStatus,
};
use crate::normalize::NormalizedKey;

/// Result of reconciling submissions against a roster.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Exactly one row per roster person, in roster order.
    pub rows: Vec<ReconciledRow>,
    /// Unmatched, ambiguous, cross-period and duplicate submissions.
    pub diagnostics: Vec<Diagnostic>,
}

impl Reconciliation {
    pub fn rows_in_period<'a>(
        &'a self,
        period: &'a Period,
    ) -> impl Iterator<Item = &'a ReconciledRow> + 'a {
        self.rows.iter().filter(move |row| &row.person.period == period)
    }

    pub fn submitted_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.status == SubmissionStatus::Submitted)
            .count()
    }
}

struct Claim<'s> {
    order: usize,
    submission: &'s Submission,
    tier: MatchTier,
}

/// Builds the reconciled output for `roster`.
///
/// `matches` pairs every submission with the result of matching it against
/// the same roster. A person claimed by several submissions keeps the most
/// complete one: a non-blank response beats a blank one, then the later
/// timestamp wins, then the later source row, then the later position in
/// `matches`. Every submission not kept is reported, never dropped.
pub fn reconcile(roster: &Roster, matches: &[(Submission, MatchResult<'_>)]) -> Reconciliation {
    // Each diagnostic is tagged with the input position of its submission.
    let mut diagnostics: Vec<(usize, Diagnostic)> = Vec::new();
    let mut claims: HashMap<(Period, NormalizedKey), Vec<Claim<'_>>> = HashMap::new();

    for (order, (submission, result)) in matches.iter().enumerate() {
        let identifier = submission.identifier.raw().to_string();
        match result {
            MatchResult::Matched {
                person,
                tier,
                cross_period,
            } => {
                if *cross_period {
                    diagnostics.push((
                        order,
                        Diagnostic::CrossPeriodMatch {
                            identifier,
                            row: submission.source_row,
                            submitted_period: submission.period.clone(),
                            person: person.full_name().to_string(),
                            roster_period: person.period.clone(),
                        },
                    ));
                }
                claims
                    .entry((person.period.clone(), person.key().clone()))
                    .or_default()
                    .push(Claim {
                        order,
                        submission,
                        tier: *tier,
                    });
            }
            MatchResult::Unmatched => diagnostics.push((
                order,
                Diagnostic::Unmatched {
                    identifier,
                    period: submission.period.clone(),
                    row: submission.source_row,
                },
            )),
            MatchResult::Ambiguous { candidates, tier } => diagnostics.push((
                order,
                Diagnostic::Ambiguous {
                    identifier,
                    period: submission.period.clone(),
                    row: submission.source_row,
                    tier: *tier,
                    candidates: candidates.iter().map(|person| describe(person)).collect(),
                },
            )),
        }
    }

    let mut rows = Vec::with_capacity(roster.len());
    for person in roster.people() {
        let claimed = claims
            .remove(&(person.period.clone(), person.key().clone()))
            .and_then(|mut claimed| {
                claimed.sort_by(prefer);
                let kept = claimed.pop()?;
                Some((kept, claimed))
            });
        let Some((kept, claimed)) = claimed else {
            rows.push(ReconciledRow {
                person: person.clone(),
                status: SubmissionStatus::NotSubmitted,
                submission: None,
                tier: None,
                score: None,
            });
            continue;
        };

        for discarded in &claimed {
            debug!(
                person = person.full_name(),
                kept_row = kept.submission.source_row,
                discarded_row = discarded.submission.source_row,
                "duplicate submission"
            );
            diagnostics.push((
                discarded.order,
                Diagnostic::DuplicateSubmission {
                    person: person.full_name().to_string(),
                    period: person.period.clone(),
                    kept_row: kept.submission.source_row,
                    discarded_row: discarded.submission.source_row,
                    discarded_identifier: discarded.submission.identifier.raw().to_string(),
                },
            ));
        }

        rows.push(ReconciledRow {
            person: person.clone(),
            status: SubmissionStatus::Submitted,
            submission: Some(kept.submission.clone()),
            tier: Some(kept.tier),
            score: None,
        });
    }

    // Only reachable when results were produced against a different roster.
    diagnostics.extend(claims.into_values().flatten().map(|claim| {
        (
            claim.order,
            Diagnostic::Unmatched {
                identifier: claim.submission.identifier.raw().to_string(),
                period: claim.submission.period.clone(),
                row: claim.submission.source_row,
            },
        )
    }));
    diagnostics.sort_by_key(|(order, _)| *order);

    let reconciliation = Reconciliation {
        rows,
        diagnostics: diagnostics
            .into_iter()
            .map(|(_, diagnostic)| diagnostic)
            .collect(),
    };
    info!(
        rows = reconciliation.rows.len(),
        submitted = reconciliation.submitted_count(),
        diagnostics = reconciliation.diagnostics.len(),
        "reconciled submissions"
    );
    reconciliation
}

/// Orders claims from least to most preferred.
fn prefer(lhs: &Claim<'_>, rhs: &Claim<'_>) -> Ordering {
    let (left, right) = (lhs.submission, rhs.submission);
    left.response()
        .is_some()
        .cmp(&right.response().is_some())
        .then_with(|| left.timestamp.cmp(&right.timestamp))
        .then_with(|| left.source_row.cmp(&right.source_row))
        .then_with(|| lhs.order.cmp(&rhs.order))
}

fn describe(person: &Person) -> String {
    match &person.student_id {
        Some(id) => format!("{} ({id}, period {})", person.full_name(), person.period),
        None => format!("{} (period {})", person.full_name(), person.period),
    }
}
