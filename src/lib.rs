//! Core library for the roster-tools command line application.
//!
//! The pipeline runs left to right: loaders under [`io`] turn gradebook and
//! form exports into [`model`] records, [`normalize`] and [`matcher`] resolve
//! form submitters to roster entries, [`reconcile`] produces one row per
//! enrolled student, [`rubric`] scores written responses, and [`report`]
//! flattens everything into sheets for [`io::excel_write`]. The [`workflow`]
//! module strings these together for each CLI subcommand.

pub mod config;
pub mod error;
pub mod io;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod reconcile;
pub mod report;
pub mod rubric;
pub mod workflow;

pub use config::RunConfig;
pub use error::{Result, ToolError};
pub use matcher::{MatchConfig, Matcher};
pub use model::{Diagnostic, MatchResult, MatchTier, Period, Person, Roster, Submission};
pub use normalize::{NormalizedKey, normalize};
pub use reconcile::{Reconciliation, reconcile};
pub use rubric::{RubricConfig, RubricScorer};
