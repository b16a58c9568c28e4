//! End-to-end runs behind each CLI subcommand.
//!
//! Every workflow loads its inputs, does all matching and scoring in memory
//! and writes the output workbook as the very last step.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use tracing::{debug, info, instrument};

use crate::config::RunConfig;
use crate::error::{Result, ToolError};
use crate::io::excel_write;
use crate::io::form_read::read_form_export;
use crate::io::roster_read::{read_gradebook_export, read_master_roster};
use crate::matcher::Matcher;
use crate::model::{Diagnostic, Period, Roster, Submission, SubmissionStatus};
use crate::reconcile::{Reconciliation, reconcile};
use crate::report::{
    WorkbookData, completion_table, diagnostics_table, grades_table, master_roster_table,
};
use crate::rubric::score_reconciled;

/// Per-period counts printed after a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodSummary {
    pub period: Period,
    pub students: usize,
    /// `None` when the period had no form to submit.
    pub submitted: Option<usize>,
    /// Mean total score over every scored student, non-submitters included.
    pub average_score: Option<f64>,
}

/// What a workflow produced, besides the workbook itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub periods: Vec<PeriodSummary>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Summary {
    pub fn students(&self) -> usize {
        self.periods.iter().map(|period| period.students).sum()
    }

    pub fn submitted(&self) -> usize {
        self.periods.iter().filter_map(|period| period.submitted).sum()
    }

    /// Mean total score across every scored period, weighted by students.
    pub fn average_score(&self) -> Option<f64> {
        let (sum, students) = self
            .periods
            .iter()
            .filter_map(|period| {
                period
                    .average_score
                    .map(|average| (average * period.students as f64, period.students))
            })
            .fold((0.0, 0), |(sum, count), (total, students)| {
                (sum + total, count + students)
            });
        (students > 0).then(|| sum / students as f64)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for period in &self.periods {
            write!(f, "Period {}: {} students", period.period, period.students)?;
            match period.submitted {
                Some(submitted) => write!(
                    f,
                    ", {submitted}/{} submitted ({:.1}%)",
                    period.students,
                    percent(submitted, period.students)
                )?,
                None => write!(f, ", no form")?,
            }
            if let Some(average) = period.average_score {
                write!(f, ", average {average:.2}/6")?;
            }
            writeln!(f)?;
        }

        let (students, submitted) = (self.students(), self.submitted());
        write!(f, "Overall: {students} students")?;
        if self.periods.iter().any(|period| period.submitted.is_some()) {
            write!(
                f,
                ", {submitted} submitted ({:.1}%)",
                percent(submitted, students)
            )?;
        }
        if let Some(average) = self.average_score() {
            write!(f, ", average {average:.2}/6")?;
        }
        writeln!(f)?;
        write!(f, "Diagnostics: {}", self.diagnostics.len())
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Merges the configured gradebook exports into one master roster workbook.
#[instrument(level = "info", skip_all, fields(output = %output.display()))]
pub fn merge_rosters(config: &RunConfig, output: &Path) -> Result<Summary> {
    let (roster, mut diagnostics) = load_roster_sources(config)?;
    diagnostics.extend_from_slice(roster.diagnostics());
    info!(
        students = roster.len(),
        periods = roster.periods().len(),
        "merged roster"
    );

    let workbook = WorkbookData::new([
        master_roster_table(&roster),
        diagnostics_table(&diagnostics),
    ]);
    excel_write::write_workbook(output, &workbook)?;

    let periods = roster
        .periods()
        .into_iter()
        .map(|period| PeriodSummary {
            students: roster.in_period(&period).count(),
            period,
            submitted: None,
            average_score: None,
        })
        .collect();
    Ok(Summary {
        periods,
        diagnostics,
    })
}

/// Marks every rostered student as having submitted the form or not.
#[instrument(
    level = "info",
    skip_all,
    fields(roster = %roster_path.display(), output = %output.display(), title = %title)
)]
pub fn completion_report(
    config: &RunConfig,
    roster_path: &Path,
    title: &str,
    output: &Path,
) -> Result<Summary> {
    let (roster, mut diagnostics) = load_master(roster_path)?;
    let (submissions, form_periods, form_diagnostics) = load_forms(config)?;
    diagnostics.extend(form_diagnostics);

    let reconciliation = match_and_reconcile(config, submissions, &roster);
    diagnostics.extend_from_slice(&reconciliation.diagnostics);

    let workbook = WorkbookData::new([
        completion_table(title, &reconciliation, &form_periods),
        diagnostics_table(&diagnostics),
    ]);
    excel_write::write_workbook(output, &workbook)?;

    Ok(Summary {
        periods: summarize(&roster, &reconciliation, &form_periods),
        diagnostics,
    })
}

/// Scores written responses with the ACE rubric.
///
/// Only periods that have a form export are graded.
#[instrument(
    level = "info",
    skip_all,
    fields(roster = %roster_path.display(), output = %output.display())
)]
pub fn grade_writing(config: &RunConfig, roster_path: &Path, output: &Path) -> Result<Summary> {
    let (full_roster, mut diagnostics) = load_master(roster_path)?;
    let (submissions, form_periods, form_diagnostics) = load_forms(config)?;
    diagnostics.extend(form_diagnostics);

    let roster = full_roster.restricted_to(&form_periods);
    debug!(
        students = roster.len(),
        skipped = full_roster.len() - roster.len(),
        "restricted roster to periods with forms"
    );

    let mut reconciliation = match_and_reconcile(config, submissions, &roster);
    diagnostics.extend_from_slice(&reconciliation.diagnostics);
    diagnostics.extend(score_reconciled(&mut reconciliation.rows, &config.rubric));

    let workbook = WorkbookData::new([
        grades_table(&reconciliation),
        diagnostics_table(&diagnostics),
    ]);
    excel_write::write_workbook(output, &workbook)?;

    Ok(Summary {
        periods: summarize(&roster, &reconciliation, &form_periods),
        diagnostics,
    })
}

fn match_and_reconcile(
    config: &RunConfig,
    submissions: Vec<Submission>,
    roster: &Roster,
) -> Reconciliation {
    let matcher = Matcher::new(config.matching.clone());
    let matches = matcher.match_all(submissions, roster);
    reconcile(roster, &matches)
}

fn summarize(
    roster: &Roster,
    reconciliation: &Reconciliation,
    form_periods: &BTreeSet<Period>,
) -> Vec<PeriodSummary> {
    roster
        .periods()
        .into_iter()
        .map(|period| {
            let rows: Vec<_> = reconciliation.rows_in_period(&period).collect();
            let submitted = form_periods.contains(&period).then(|| {
                rows.iter()
                    .filter(|row| row.status == SubmissionStatus::Submitted)
                    .count()
            });
            let scores: Vec<f64> = rows
                .iter()
                .filter_map(|row| row.score)
                .map(|score| f64::from(score.total))
                .collect();
            let average_score = (!scores.is_empty())
                .then(|| scores.iter().sum::<f64>() / scores.len() as f64);
            PeriodSummary {
                students: rows.len(),
                period,
                submitted,
                average_score,
            }
        })
        .collect()
}

fn load_roster_sources(config: &RunConfig) -> Result<(Roster, Vec<Diagnostic>)> {
    if config.rosters.is_empty() {
        return Err(ToolError::Configuration(
            "no roster exports configured".to_string(),
        ));
    }

    let mut people = Vec::new();
    let mut diagnostics = Vec::new();
    for source in &config.rosters {
        if !source.path.exists() {
            return Err(ToolError::MissingInput(source.path.clone()));
        }
        let loaded = read_gradebook_export(
            &source.path,
            source.period.clone(),
            &source.course,
            &config.roster_layout,
        )?;
        people.extend(loaded.records);
        diagnostics.extend(loaded.diagnostics);
    }

    Ok((Roster::new(people)?, diagnostics))
}

fn load_master(path: &Path) -> Result<(Roster, Vec<Diagnostic>)> {
    if !path.exists() {
        return Err(ToolError::MissingInput(path.to_path_buf()));
    }
    let loaded = read_master_roster(path)?;
    let roster = Roster::new(loaded.records)?;
    let mut diagnostics = loaded.diagnostics;
    diagnostics.extend_from_slice(roster.diagnostics());
    Ok((roster, diagnostics))
}

fn load_forms(config: &RunConfig) -> Result<(Vec<Submission>, BTreeSet<Period>, Vec<Diagnostic>)> {
    if config.forms.is_empty() {
        return Err(ToolError::Configuration(
            "no form exports configured".to_string(),
        ));
    }

    let mut submissions = Vec::new();
    let mut periods = BTreeSet::new();
    let mut diagnostics = Vec::new();
    for source in &config.forms {
        let period = source.resolved_period()?;
        if !source.path.exists() {
            return Err(ToolError::MissingInput(source.path.clone()));
        }
        let loaded = read_form_export(&source.path, Some(period.clone()), &config.form_layout)?;
        submissions.extend(loaded.records);
        diagnostics.extend(loaded.diagnostics);
        periods.insert(period);
    }

    Ok((submissions, periods, diagnostics))
}
