//! JSON run configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, ToolError};
use crate::io::form_read::FormLayout;
use crate::io::period_from_file_name;
use crate::io::roster_read::RosterLayout;
use crate::matcher::MatchConfig;
use crate::model::Period;
use crate::rubric::RubricConfig;

/// Everything a run needs besides the command-line paths.
///
/// Each section is optional; a workflow complains only about the sections it
/// actually uses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub matching: MatchConfig,
    pub rosters: Vec<RosterSource>,
    pub roster_layout: RosterLayout,
    pub forms: Vec<FormSource>,
    pub form_layout: FormLayout,
    pub rubric: RubricConfig,
}

/// One gradebook roster export.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RosterSource {
    pub path: PathBuf,
    /// Falls back to a "Period: N" cell in the export when absent.
    #[serde(default)]
    pub period: Option<Period>,
    #[serde(default)]
    pub course: String,
}

/// One form response export.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FormSource {
    pub path: PathBuf,
    /// Falls back to a period named in the file name when absent.
    #[serde(default)]
    pub period: Option<Period>,
}

impl FormSource {
    /// Period the responses were collected for.
    pub fn resolved_period(&self) -> Result<Period> {
        self.period
            .clone()
            .or_else(|| period_from_file_name(&self.path))
            .ok_or_else(|| {
                ToolError::Configuration(format!(
                    "no period configured for form {} and none found in its file name",
                    self.path.display()
                ))
            })
    }
}

impl RunConfig {
    /// Loads a configuration file. Relative paths inside it are resolved
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let source = fs::read_to_string(path)?;
        let mut config: RunConfig = serde_json::from_str(&source)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        debug!(
            config = %path.display(),
            rosters = config.rosters.len(),
            forms = config.forms.len(),
            "loaded run configuration"
        );
        Ok(config)
    }

    /// Parses configuration JSON without touching paths.
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        for roster in &mut self.rosters {
            roster.path = resolve(base, &roster.path);
        }
        for form in &mut self.forms {
            form.path = resolve(base, &form.path);
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_default_and_periods_accept_numbers_or_text() {
        let config = RunConfig::from_json(
            r#"{
                "rosters": [{ "path": "p1.csv", "period": 1, "course": "Earth Science" }],
                "forms": [{ "path": "Week_1_Period_2_Volcanoes.csv" }, { "path": "b.csv", "period": "Period 3" }],
                "rubric": { "prompts": { "1": { "sub_questions": [["magma"]] } } }
            }"#,
        )
        .expect("config parses");

        assert_eq!(config.rosters[0].period, Some(Period::Number(1)));
        assert_eq!(config.forms[0].resolved_period().expect("period"), Period::Number(2));
        assert_eq!(config.forms[1].resolved_period().expect("period"), Period::Number(3));
        assert!(config.rubric.prompts.contains_key(&Period::Number(1)));
        assert_eq!(config.matching, MatchConfig::default());
        assert_eq!(config.roster_layout.name_header, "Student Name");
    }

    #[test]
    fn relative_paths_resolve_against_config_directory() {
        let mut config = RunConfig::from_json(r#"{ "forms": [{ "path": "f.csv", "period": 1 }] }"#)
            .expect("config parses");
        config.resolve_paths(Path::new("/data/week1"));
        assert_eq!(config.forms[0].path, Path::new("/data/week1/f.csv"));
    }
}
