//! Cast rules and the fixed mode profiles that bundle them.
//!
//! Profiles are plain values built once at startup by [`ModeProfile::for_mode`].
//! A rule declared for all tables is expanded to the discovered table list by
//! [`ModeProfile::resolve`] before any schema is touched; the resolved rules are
//! then folded, in declaration order, over each table's schema map.

use std::collections::BTreeSet;

use log::debug;

use crate::schema::{ColumnType, TableSchema};

const VOCAB_DATE_TABLES: &[&str] = &["concept", "concept_relationship", "drug_strength"];
const VOCAB_DATE_COLUMNS: &[&str] = &["valid_start_date", "valid_end_date"];

const CLINICAL_CODE_TABLES: &[&str] = &[
    "medications",
    "allergies",
    "conditions",
    "devices",
    "procedures",
];
const CLINICAL_CODE_COLUMNS: &[&str] = &["code"];

const CLINICAL_IDENTIFIER_COLUMNS: &[&str] = &[
    "patient",
    "encounter",
    "id",
    "patientid",
    "providerid",
    "appointmentid",
    "secondary_payer",
    "memberid",
    "supervisingproviderid",
    "claimid",
    "placeofservice",
    "patientinsuranceid",
    "organization",
    "provider",
    "payer",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Athena vocabulary download.
    Vocabulary,
    /// Synthea CSV output.
    Clinical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSet {
    All,
    Named(BTreeSet<String>),
}

impl TableSet {
    pub fn named<'a, I>(tables: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        TableSet::Named(tables.into_iter().map(str::to_lowercase).collect())
    }
}

/// Declared rule: retype `columns` on `tables` to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastRule {
    pub tables: TableSet,
    pub columns: BTreeSet<String>,
    pub target: ColumnType,
}

impl CastRule {
    pub fn new<'a, I>(tables: TableSet, columns: I, target: ColumnType) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self {
            tables,
            columns: columns.into_iter().map(str::to_lowercase).collect(),
            target,
        }
    }
}

/// A rule whose table set has been fixed against the discovered tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRule {
    pub tables: BTreeSet<String>,
    pub columns: BTreeSet<String>,
    pub target: ColumnType,
}

impl ResolvedRule {
    pub fn applies_to(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    /// Retypes the matching columns of `schema` when the rule covers its table.
    pub fn apply(&self, schema: &mut TableSchema) -> usize {
        if !self.applies_to(&schema.table) {
            return 0;
        }
        schema.retype_matching(self.columns.iter().map(String::as_str), self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeProfile {
    pub mode: Mode,
    pub output_dir_name: &'static str,
    pub date_format: &'static str,
    pub rules: Vec<CastRule>,
}

impl ModeProfile {
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Vocabulary => Self::vocabulary(),
            Mode::Clinical => Self::clinical(),
        }
    }

    pub fn vocabulary() -> Self {
        Self {
            mode: Mode::Vocabulary,
            output_dir_name: "vocab_parquet",
            date_format: "%Y%m%d",
            rules: vec![CastRule::new(
                TableSet::named(VOCAB_DATE_TABLES.iter().copied()),
                VOCAB_DATE_COLUMNS.iter().copied(),
                ColumnType::Date,
            )],
        }
    }

    pub fn clinical() -> Self {
        Self {
            mode: Mode::Clinical,
            output_dir_name: "synthea_parquet",
            date_format: "%Y-%m-%d",
            rules: vec![
                CastRule::new(
                    TableSet::named(CLINICAL_CODE_TABLES.iter().copied()),
                    CLINICAL_CODE_COLUMNS.iter().copied(),
                    ColumnType::String,
                ),
                CastRule::new(
                    TableSet::All,
                    CLINICAL_IDENTIFIER_COLUMNS.iter().copied(),
                    ColumnType::Guid,
                ),
            ],
        }
    }

    /// Expands every all-tables rule to `discovered`, keeping declaration order.
    pub fn resolve<'a, I>(&self, discovered: I) -> Vec<ResolvedRule>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let all: BTreeSet<String> = discovered.into_iter().map(str::to_string).collect();
        self.rules
            .iter()
            .map(|rule| ResolvedRule {
                tables: match &rule.tables {
                    TableSet::All => all.clone(),
                    TableSet::Named(named) => named.clone(),
                },
                columns: rule.columns.clone(),
                target: rule.target,
            })
            .collect()
    }
}

/// Union of the table sets of `rules`, in name order.
pub fn targeted_tables(rules: &[ResolvedRule]) -> BTreeSet<String> {
    rules
        .iter()
        .flat_map(|rule| rule.tables.iter().cloned())
        .collect()
}

/// Folds `rules` over `schema` in order; a later rule overwrites an earlier
/// one on the same column. Returns the number of column assignments made.
pub fn apply_rules(schema: &mut TableSchema, rules: &[ResolvedRule]) -> usize {
    rules
        .iter()
        .map(|rule| {
            let matched = rule.apply(schema);
            if matched > 0 {
                debug!(
                    "Cast {matched} column(s) of '{}' to {}",
                    schema.table, rule.target
                );
            }
            matched
        })
        .sum()
}
