use std::fs;
use std::path::{Path, PathBuf};

use calamine::{Reader, Xlsx, open_workbook};
use roster_tools::io::roster_read::{RosterLayout, read_gradebook_export, read_master_roster};
use roster_tools::model::{Diagnostic, Period, Roster};
use roster_tools::{RunConfig, ToolError, workflow};
use tempfile::tempdir;

fn write_csv(path: &Path, rows: &[&[&str]]) {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .expect("CSV opened");
    for row in rows {
        writer.write_record(*row).expect("CSV row written");
    }
    writer.flush().expect("CSV flushed");
}

fn write_config(dir: &Path, config: serde_json::Value) -> PathBuf {
    let path = dir.join("run.json");
    fs::write(&path, serde_json::to_string_pretty(&config).expect("JSON")).expect("config written");
    path
}

fn sheet_rows(path: &Path, sheet: &str) -> Vec<Vec<String>> {
    let mut workbook: Xlsx<_> = open_workbook(path).expect("workbook opened");
    let range = workbook
        .worksheet_range(sheet)
        .expect("sheet present")
        .expect("sheet readable");
    range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect()
}

fn gradebook_export(path: &Path, period_line: &str, students: &[[&str; 3]]) {
    let mut rows: Vec<Vec<&str>> = vec![
        vec!["Gradebook Export", "", "", ""],
        vec!["Teacher: Ms. Rivera", "", "", ""],
        vec![period_line, "", "", ""],
        vec!["", "Student Name", "Grade", "Student Number"],
        vec!["", "Points Possible", "", ""],
        vec!["", "Class Average", "", ""],
    ];
    rows.extend(
        students
            .iter()
            .map(|[name, grade, id]| vec!["", *name, *grade, *id]),
    );
    let borrowed: Vec<&[&str]> = rows.iter().map(Vec::as_slice).collect();
    write_csv(path, &borrowed);
}

fn master_roster_csv(path: &Path) {
    write_csv(
        path,
        &[
            &["Student Name", "Grade", "Student ID", "Period", "Course"],
            &["Ana Lopez", "10", "1001", "1", "Earth Science"],
            &["Carlos Mendoza", "10", "1002", "1", "Earth Science"],
            &["Eli Park", "11", "2001", "2", "Earth Science"],
        ],
    );
}

#[test]
fn merged_roster_reads_back_identically() {
    let dir = tempdir().expect("temporary directory");
    gradebook_export(
        &dir.path().join("p1.csv"),
        "Period: 1",
        &[["Mendoza, Carlos", "10", "1002"], ["Lopez, Ana", "10", "1001"]],
    );
    gradebook_export(
        &dir.path().join("p2.csv"),
        "",
        &[["Park, Eli", "11", "2001"], ["", "", ""], ["Kim, Dana", "", "2002"]],
    );
    let config_path = write_config(
        dir.path(),
        serde_json::json!({
            "rosters": [
                { "path": "p1.csv", "course": "Earth Science" },
                { "path": "p2.csv", "period": 2, "course": "Earth Science" }
            ]
        }),
    );
    let output = dir.path().join("master.xlsx");

    let config = RunConfig::load(&config_path).expect("config loaded");
    let summary = workflow::merge_rosters(&config, &output).expect("roster merged");
    assert_eq!(summary.students(), 4);
    assert!(summary.diagnostics.is_empty());

    let layout = RosterLayout::default();
    let mut expected = read_gradebook_export(&dir.path().join("p1.csv"), None, "Earth Science", &layout)
        .expect("p1 read")
        .records;
    expected.extend(
        read_gradebook_export(
            &dir.path().join("p2.csv"),
            Some(Period::Number(2)),
            "Earth Science",
            &layout,
        )
        .expect("p2 read")
        .records,
    );
    let expected = Roster::new(expected).expect("valid roster");

    let restored = read_master_roster(&output).expect("master roster read");
    assert!(restored.diagnostics.is_empty());
    assert_eq!(restored.records, expected.people());

    let rows = sheet_rows(&output, "Master Roster");
    assert_eq!(rows[0], ["Student Name", "Grade", "Student ID", "Period", "Course"]);
    assert_eq!(rows[1][0], "Lopez, Ana");
    assert_eq!(rows.len(), 5);
}

#[test]
fn duplicate_roster_entries_abort_without_output() {
    let dir = tempdir().expect("temporary directory");
    gradebook_export(
        &dir.path().join("p1.csv"),
        "Period: 1",
        &[["Lopez, Ana", "10", "1001"], ["Ana Lopez", "10", "1003"]],
    );
    let config_path = write_config(
        dir.path(),
        serde_json::json!({ "rosters": [{ "path": "p1.csv", "course": "Earth Science" }] }),
    );
    let output = dir.path().join("master.xlsx");

    let config = RunConfig::load(&config_path).expect("config loaded");
    let error = workflow::merge_rosters(&config, &output).expect_err("duplicate rejected");
    assert!(matches!(error, ToolError::DuplicateRosterEntry { .. }));
    assert!(!output.exists());
}

#[test]
fn volcano_writing_is_graded_end_to_end() {
    let dir = tempdir().expect("temporary directory");
    let roster_path = dir.path().join("master.csv");
    write_csv(
        &roster_path,
        &[
            &["Student Name", "Grade", "Student ID", "Period", "Course"],
            &["Ana Lopez", "10", "1001", "1", "Earth Science"],
            &["Carlos Mendoza", "10", "1002", "1", "Earth Science"],
        ],
    );
    write_csv(
        &dir.path().join("week1_p1.csv"),
        &[
            &["Timestamp", "Username", "Why do volcanoes erupt?"],
            &[
                "2024/09/18 10:15:32 AM MDT",
                "carlos.mendoza@school.org",
                "The article says \"magma rises because gas pressure builds.\" \
                 This shows pressure causes eruptions.",
            ],
        ],
    );
    let config_path = write_config(
        dir.path(),
        serde_json::json!({
            "forms": [{ "path": "week1_p1.csv", "period": 1 }],
            "rubric": {
                "prompts": {
                    "1": {
                        "topic": "Volcanoes",
                        "sub_questions": [["magma", "lava"], ["pressure", "gas"]]
                    }
                }
            }
        }),
    );
    let output = dir.path().join("grades.xlsx");

    let config = RunConfig::load(&config_path).expect("config loaded");
    let summary =
        workflow::grade_writing(&config, &roster_path, &output).expect("writing graded");
    assert!(summary.diagnostics.is_empty(), "{:?}", summary.diagnostics);
    assert_eq!(summary.submitted(), 1);

    let rows = sheet_rows(&output, "Writing Grades");
    assert_eq!(rows.len(), 3);
    let header = &rows[0];
    let column = |name: &str| {
        header
            .iter()
            .position(|cell| cell == name)
            .expect("column present")
    };
    let (name, cite, explain, total, preview) = (
        column("Student Name"),
        column("Cite (0-2)"),
        column("Explain (0-2)"),
        column("Total Score (0-6)"),
        column("Response Preview"),
    );

    let ana = &rows[1];
    assert_eq!(ana[name], "Ana Lopez");
    assert_eq!(ana[total], "0");
    assert_eq!(ana[preview], "NO SUBMISSION");

    let carlos = &rows[2];
    assert_eq!(carlos[name], "Carlos Mendoza");
    let score = |idx: usize| carlos[idx].parse::<f64>().expect("numeric score");
    assert!(score(cite) >= 1.0);
    assert!(score(explain) >= 1.0);
    assert!(score(total) >= 2.0);
    assert!(carlos[preview].starts_with("The article says"));

    assert_eq!(sheet_rows(&output, "Diagnostics").len(), 1);
}

#[test]
fn compound_surname_with_a_cited_explanation_is_graded() {
    let dir = tempdir().expect("temporary directory");
    let roster_path = dir.path().join("master.csv");
    write_csv(
        &roster_path,
        &[
            &["Student Name", "Grade", "Student ID", "Period", "Course"],
            &["Ana Lopez", "10", "1001", "1", "Earth Science"],
            &["Carlos Diaz Vega", "10", "1002", "1", "Earth Science"],
        ],
    );
    write_csv(
        &dir.path().join("volcanoes_p1.csv"),
        &[
            &["Timestamp", "Name", "Why do volcanoes erupt?"],
            &[
                "2024/09/18 10:15:32 AM MDT",
                "carlos diaz vega",
                "I think the volcano erupted because pressure built up, as the text states.",
            ],
        ],
    );
    let config_path = write_config(
        dir.path(),
        serde_json::json!({
            "forms": [{ "path": "volcanoes_p1.csv", "period": 1 }],
            "rubric": {
                "prompts": {
                    "1": { "sub_questions": [["magma", "lava"], ["pressure", "gas"]] }
                }
            }
        }),
    );
    let output = dir.path().join("grades.xlsx");

    let config = RunConfig::load(&config_path).expect("config loaded");
    let summary =
        workflow::grade_writing(&config, &roster_path, &output).expect("writing graded");
    assert!(summary.diagnostics.is_empty(), "{:?}", summary.diagnostics);
    assert_eq!(summary.submitted(), 1);
    assert_eq!(summary.average_score(), Some(1.5));
    assert!(
        summary
            .to_string()
            .contains("Overall: 2 students, 1 submitted (50.0%), average 1.50/6")
    );

    let rows = sheet_rows(&output, "Writing Grades");
    let scores: Vec<&[String]> = rows[1..].iter().map(|row| &row[1..7]).collect();
    assert_eq!(
        scores,
        [
            ["Carlos Diaz Vega", "", "1", "1", "1", "3"],
            ["Ana Lopez", "Not submitted", "0", "0", "0", "0"],
        ]
    );
}

#[test]
fn completion_report_marks_each_student() {
    let dir = tempdir().expect("temporary directory");
    let roster_path = dir.path().join("master.csv");
    master_roster_csv(&roster_path);
    write_csv(
        &dir.path().join("Week_1_Period_1_Volcanoes.csv"),
        &[
            &["Timestamp", "Username", "Response"],
            &["2024/09/18 10:00:00 AM MDT", "ana.lopez@school.org", "Lava"],
            &["2024/09/18 10:05:00 AM MDT", "", "anonymous"],
            &["2024/09/18 10:07:00 AM MDT", "zed.quinn@school.org", "Gas"],
        ],
    );
    let config_path = write_config(
        dir.path(),
        serde_json::json!({ "forms": [{ "path": "Week_1_Period_1_Volcanoes.csv" }] }),
    );
    let output = dir.path().join("completion.xlsx");

    let config = RunConfig::load(&config_path).expect("config loaded");
    let summary =
        workflow::completion_report(&config, &roster_path, "Week 1 Volcanoes", &output)
            .expect("report written");

    assert_eq!(summary.students(), 3);
    assert_eq!(summary.submitted(), 1);
    assert_eq!(summary.periods[1].submitted, None);
    assert!(matches!(
        summary.diagnostics.as_slice(),
        [
            Diagnostic::MalformedRecord { row: 3, .. },
            Diagnostic::Unmatched { row: 4, .. }
        ]
    ));

    let rows = sheet_rows(&output, "Week 1 Volcanoes");
    let statuses: Vec<(&str, &str)> = rows[1..]
        .iter()
        .map(|row| (row[0].as_str(), row[5].as_str()))
        .collect();
    assert_eq!(
        statuses,
        [
            ("Ana Lopez", "Yes"),
            ("Carlos Mendoza", "No"),
            ("Eli Park", "No Form")
        ]
    );
    assert_eq!(sheet_rows(&output, "Diagnostics").len(), 3);
}

#[test]
fn missing_inputs_are_reported() {
    let dir = tempdir().expect("temporary directory");
    let config_path = write_config(
        dir.path(),
        serde_json::json!({ "forms": [{ "path": "absent.csv", "period": 1 }] }),
    );
    let config = RunConfig::load(&config_path).expect("config loaded");

    let error = workflow::completion_report(
        &config,
        &dir.path().join("absent.xlsx"),
        "Week 1",
        &dir.path().join("out.xlsx"),
    )
    .expect_err("roster is missing");
    assert!(matches!(error, ToolError::MissingInput(_)));

    let roster_path = dir.path().join("master.csv");
    master_roster_csv(&roster_path);
    let error = workflow::grade_writing(&config, &roster_path, &dir.path().join("out.xlsx"))
        .expect_err("form is missing");
    assert!(matches!(error, ToolError::MissingInput(path) if path.ends_with("absent.csv")));
}
