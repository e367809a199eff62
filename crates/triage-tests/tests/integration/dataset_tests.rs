//! CSV loading through the filesystem.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;
use triage_core::{Dataset, TriageError};
use triage_tests::{synthetic_csv, DIAGNOSES, SYMPTOMS};

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write csv");
    path
}

fn data_format_message(result: Result<Dataset, TriageError>) -> String {
    match result {
        Err(TriageError::DataFormat(message)) => message,
        Err(other) => panic!("expected a data format error, got {other}"),
        Ok(_) => panic!("expected a data format error"),
    }
}

#[test]
fn loads_synthetic_records_from_disk() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(&dir, "records.csv", &synthetic_csv(100, 1));
    let data = Dataset::from_csv_path(&path, "TYPE").expect("load");

    assert_eq!(data.len(), 100);
    assert_eq!(data.target_states(), &DIAGNOSES);
    assert_eq!(data.symptom_names(), SYMPTOMS.to_vec());
    assert_eq!(data.class_counts(), vec![40, 20, 20, 20]);
}

#[test]
fn accepts_alternate_binary_spellings() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(
        &dir,
        "mixed.csv",
        "fever, cough ,TYPE\n1.0,false,FLU\nTRUE,0,COLD\n0, 1 ,COLD\n",
    );
    let data = Dataset::from_csv_path(&path, "TYPE").expect("load");
    let fever = data.index_of("fever").expect("fever");
    let cough = data.index_of("cough").expect("cough");
    assert_eq!(data.column(fever), &[1, 1, 0]);
    assert_eq!(data.column(cough), &[0, 0, 1]);
    assert_eq!(data.target_states(), &["COLD", "FLU"]);
}

#[test]
fn non_binary_symptom_names_row_and_column() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(&dir, "bad.csv", "fever,cough,TYPE\n1,0,FLU\n1,2,COLD\n");
    let message = data_format_message(Dataset::from_csv_path(&path, "TYPE"));
    assert!(message.contains("row 2"), "{message}");
    assert!(message.contains("cough"), "{message}");
}

#[test]
fn missing_cells_are_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(&dir, "blank.csv", "fever,TYPE\n,FLU\n");
    let message = data_format_message(Dataset::from_csv_path(&path, "TYPE"));
    assert!(message.contains("missing value"), "{message}");

    let path = write(&dir, "blank_target.csv", "fever,TYPE\n1,\n");
    let message = data_format_message(Dataset::from_csv_path(&path, "TYPE"));
    assert!(message.contains("target"), "{message}");
}

#[test]
fn structural_problems_are_data_format_errors() {
    let dir = TempDir::new().expect("tempdir");

    let no_target = write(&dir, "no_target.csv", "fever,cough\n1,0\n");
    let message = data_format_message(Dataset::from_csv_path(&no_target, "TYPE"));
    assert!(message.contains("TYPE"), "{message}");

    let header_only = write(&dir, "header_only.csv", "fever,TYPE\n");
    data_format_message(Dataset::from_csv_path(&header_only, "TYPE"));

    let ragged = write(&dir, "ragged.csv", "fever,TYPE\n1,FLU,extra\n");
    data_format_message(Dataset::from_csv_path(&ragged, "TYPE"));

    data_format_message(Dataset::from_csv_path(dir.path().join("absent.csv"), "TYPE"));
}

#[test]
fn custom_target_column() {
    let data = Dataset::from_reader("diagnosis,fever\nflu,1\ncold,0\n".as_bytes(), "diagnosis")
        .expect("load");
    assert_eq!(data.target_name(), "diagnosis");
    assert_eq!(data.target_index(), 0);
    assert_eq!(data.symptom_names(), vec!["fever"]);
}
