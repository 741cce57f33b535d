#![allow(dead_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow::array::{Array, AsArray};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::LogicalType;
use tempfile::{TempDir, tempdir};

pub const PATIENT_A: &str = "b9c610cd-28a6-4636-ccb6-c7a0d2a4cb85";
pub const PATIENT_B: &str = "c1f1fcaa-82fd-d5b7-3544-c8f9708b06a8";
pub const ENCOUNTER_A: &str = "0b03e41b-06a6-66fa-b972-acc5a83b134a";
pub const ORGANIZATION_A: &str = "ef58ea08-d883-3957-8300-150554edc8fb";

/// Scratch directory holding an input directory plus room for outputs.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let workspace = Self {
            temp_dir: tempdir().expect("temp dir"),
        };
        fs::create_dir(workspace.input_dir()).expect("create input dir");
        workspace
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Directory the converter reads from.
    pub fn input_dir(&self) -> PathBuf {
        self.temp_dir.path().join("csv")
    }

    /// Writes `contents` as `name` inside the input directory.
    pub fn write_input(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.input_dir().join(name);
        fs::write(&path, contents).expect("write input file");
        path
    }

    /// Writes raw bytes as `name`, for inputs in legacy encodings.
    pub fn write_input_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.input_dir().join(name);
        fs::write(&path, contents).expect("write input file");
        path
    }

    /// Writes a small Synthea-like extract.
    pub fn write_synthea_sample(&self) {
        self.write_input(
            "patients.csv",
            &format!(
                "Id,BIRTHDATE,DEATHDATE,GENDER,HEALTHCARE_EXPENSES\n\
                 {PATIENT_A},1989-05-25,,F,9039.16\n\
                 {PATIENT_B},1975-03-01,2020-01-02,M,100\n"
            ),
        );
        self.write_input(
            "medications.csv",
            &format!(
                "START,STOP,PATIENT,PAYER,ENCOUNTER,CODE,DESCRIPTION\n\
                 2019-02-17T05:07:38Z,,{PATIENT_A},{ORGANIZATION_A},{ENCOUNTER_A},834061,Penicillin V\n"
            ),
        );
        self.write_input(
            "observations.csv",
            &format!(
                "DATE,PATIENT,ENCOUNTER,CODE,VALUE\n\
                 2019-02-17T05:07:38Z,{PATIENT_A},{ENCOUNTER_A},8302,82.7\n\
                 2019-03-17T05:07:38Z,{PATIENT_B},,8302,80.1\n"
            ),
        );
        self.write_input(
            "organizations.csv",
            &format!("Id,NAME,ZIP\n{ORGANIZATION_A},General Hospital,01001\n"),
        );
        for table in ["allergies", "conditions", "devices", "procedures"] {
            self.write_input(
                &format!("{table}.csv"),
                &format!("START,PATIENT,CODE\n2019-02-17,{PATIENT_A},26643006\n"),
            );
        }
    }

    /// Writes a small tab-delimited Athena-like vocabulary download.
    pub fn write_vocab_sample(&self) {
        self.write_input(
            "CONCEPT.csv",
            "concept_id\tconcept_name\tdomain_id\tvalid_start_date\tvalid_end_date\tinvalid_reason\n\
             8507\tMALE\tGender\t19700101\t20991231\t\n\
             8532\tFEMALE\tGender\t19700101\t20991231\t\n",
        );
        self.write_input(
            "CONCEPT_RELATIONSHIP.csv",
            "concept_id_1\tconcept_id_2\trelationship_id\tvalid_start_date\tvalid_end_date\n\
             8507\t8532\tIs a\t19700101\t20991231\n",
        );
        self.write_input(
            "DRUG_STRENGTH.csv",
            "drug_concept_id\tingredient_concept_id\tamount_value\tvalid_start_date\tvalid_end_date\n\
             19019073\t1713332\t500\t20100101\t20991231\n",
        );
        self.write_input(
            "VOCABULARY.csv",
            "vocabulary_id\tvocabulary_name\tvocabulary_concept_id\n\
             Gender\tOMOP Gender\t44819217\n",
        );
    }
}

/// Arrow column names and types stored in a Parquet file.
pub fn parquet_columns(path: &Path) -> Vec<(String, DataType)> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path).expect("open parquet"))
        .expect("read parquet metadata");
    builder
        .schema()
        .fields()
        .iter()
        .map(|field| (field.name().clone(), field.data_type().clone()))
        .collect()
}

pub fn parquet_column_type(path: &Path, column: &str) -> DataType {
    parquet_columns(path)
        .into_iter()
        .find(|(name, _)| name == column)
        .map(|(_, data_type)| data_type)
        .unwrap_or_else(|| panic!("column {column} missing from {path:?}"))
}

/// Names of the columns carrying the Parquet UUID logical type.
pub fn uuid_columns(path: &Path) -> Vec<String> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path).expect("open parquet"))
        .expect("read parquet metadata");
    let descr = builder.metadata().file_metadata().schema_descr_ptr();
    descr
        .columns()
        .iter()
        .filter(|column| column.logical_type() == Some(LogicalType::Uuid))
        .map(|column| column.name().to_string())
        .collect()
}

/// Values of a Utf8 column, NULLs as `None`.
pub fn parquet_string_values(path: &Path, column: &str) -> Vec<Option<String>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path).expect("open parquet"))
        .expect("read parquet metadata")
        .build()
        .expect("build parquet reader");
    let mut values = Vec::new();
    for batch in reader {
        let batch = batch.expect("read record batch");
        let array = batch
            .column_by_name(column)
            .unwrap_or_else(|| panic!("column {column} missing from {path:?}"))
            .as_string::<i32>();
        values.extend((0..array.len()).map(|idx| {
            (!array.is_null(idx)).then(|| array.value(idx).to_string())
        }));
    }
    values
}

pub fn parquet_row_count(path: &Path) -> i64 {
    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path).expect("open parquet"))
        .expect("read parquet metadata");
    builder.metadata().file_metadata().num_rows()
}
