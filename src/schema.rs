//! Canonical fields and their physical column candidates.
//!
//! Source tables name the same attribute differently (and one column was
//! renamed over time), so every read goes through a [`SchemaMapping`]
//! resolved once from the columns actually present.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::{FieldValue, ProgramRow};
use crate::normalize::{parse_date, parse_float, parse_int};

// ── Physical column names ───────────────────────────────────────────────────
pub mod columns {
    pub const ID: &str = "id";
    pub const HRD_NAME: &str = "HRD_Net_과정명";
    pub const NAME: &str = "과정명";
    pub const ROUND: &str = "회차";
    pub const COHORT: &str = "기수";
    pub const BATCH: &str = "배치";
    pub const STATUS: &str = "진행상태";
    pub const START_DATE: &str = "개강일";
    pub const END_DATE: &str = "종강일";
    /// Legacy short start column, also consulted when the start date fails to parse.
    pub const START: &str = "개강";
    /// Legacy short end column, also consulted when the end date fails to parse.
    pub const END: &str = "종강";
    pub const YEAR: &str = "년도";
    pub const QUARTER: &str = "분기";
    pub const TEAM_DETAILED: &str = "담당팀";
    pub const TEAM: &str = "팀";
    pub const CATEGORY: &str = "과정구분";
    pub const HOURS: &str = "교육시간";
    pub const CAPACITY: &str = "정원";
    pub const CONFIRMED: &str = "HRD_확정";
    pub const COMPLETED: &str = "수료인원";
    pub const EMPLOYED: &str = "취업인원";
    pub const WORKERS: &str = "근로자";
    pub const EMPLOYMENT_EXCLUDED: &str = "취업산정제외인원";
    pub const COMPLETION_EXCLUDED: &str = "수료산정 제외인원";
    /// Name of the completion-exclusion column before it was renamed.
    pub const COMPLETION_EXCLUDED_LEGACY: &str = "산정제외";
    pub const SATISFACTION: &str = "HRD_만족도";
}

/// Status value marking a finished program, kept verbatim from the source data.
pub const ENDED_STATUS: &str = "종강";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Team,
    Category,
    Name,
    /// Batch label, with the legacy round column as the last fallback.
    Round,
    Start,
    End,
    Year,
    Quarter,
    Status,
    Capacity,
    Confirmed,
    Completed,
    Employed,
    Satisfaction,
    EmploymentExcluded,
    Workers,
    CompletionExcluded,
    Hours,
}

impl Field {
    pub const ALL: [Field; 18] = [
        Field::Team,
        Field::Category,
        Field::Name,
        Field::Round,
        Field::Start,
        Field::End,
        Field::Year,
        Field::Quarter,
        Field::Status,
        Field::Capacity,
        Field::Confirmed,
        Field::Completed,
        Field::Employed,
        Field::Satisfaction,
        Field::EmploymentExcluded,
        Field::Workers,
        Field::CompletionExcluded,
        Field::Hours,
    ];

    /// Physical names in priority order.
    pub fn candidates(self) -> &'static [&'static str] {
        use columns::*;
        match self {
            Field::Team => &[TEAM_DETAILED, TEAM, CATEGORY],
            Field::Category => &[CATEGORY, TEAM_DETAILED, TEAM],
            Field::Name => &[HRD_NAME, NAME],
            Field::Round => &[COHORT, BATCH, ROUND],
            Field::Start => &[START_DATE, START],
            Field::End => &[END_DATE, END],
            Field::Year => &[YEAR],
            Field::Quarter => &[QUARTER],
            Field::Status => &[STATUS],
            Field::Capacity => &[CAPACITY],
            Field::Confirmed => &[CONFIRMED],
            Field::Completed => &[COMPLETED],
            Field::Employed => &[EMPLOYED],
            Field::Satisfaction => &[SATISFACTION],
            Field::EmploymentExcluded => &[EMPLOYMENT_EXCLUDED],
            Field::Workers => &[WORKERS],
            Field::CompletionExcluded => &[COMPLETION_EXCLUDED, COMPLETION_EXCLUDED_LEGACY],
            Field::Hours => &[HOURS],
        }
    }
}

/// Canonical field to physical column, for one snapshot of the table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaMapping {
    resolved: HashMap<Field, &'static str>,
    present: Vec<&'static str>,
}

impl SchemaMapping {
    pub fn resolve<S: AsRef<str>>(columns: &[S]) -> Self {
        let has = |name: &str| columns.iter().any(|c| c.as_ref() == name);
        let mut resolved = HashMap::new();
        let mut present = Vec::new();
        for field in Field::ALL {
            if let Some(name) = field.candidates().iter().copied().find(|c| has(c)) {
                resolved.insert(field, name);
            }
            for name in field.candidates() {
                if has(name) && !present.contains(name) {
                    present.push(*name);
                }
            }
        }
        Self { resolved, present }
    }

    pub fn column(&self, field: Field) -> Option<&'static str> {
        self.resolved.get(&field).copied()
    }

    pub fn is_mapped(&self, field: Field) -> bool {
        self.resolved.contains_key(&field)
    }

    fn has_column(&self, name: &str) -> bool {
        self.present.iter().any(|c| *c == name)
    }

    /// Raw cell for a field; `None` when the field is unmapped or the row lacks it.
    pub fn value<'r>(&self, row: &'r ProgramRow, field: Field) -> Option<&'r FieldValue> {
        row.get(self.column(field)?)
    }

    pub fn int(&self, row: &ProgramRow, field: Field) -> i64 {
        parse_int(self.value(row, field), 0)
    }

    pub fn float(&self, row: &ProgramRow, field: Field) -> f64 {
        parse_float(self.value(row, field), 0.0)
    }

    pub fn date(&self, row: &ProgramRow, field: Field) -> Option<NaiveDate> {
        parse_date(self.value(row, field))
    }

    /// Trimmed text of a field; empty when unmapped or null.
    pub fn text(&self, row: &ProgramRow, field: Field) -> String {
        self.value(row, field)
            .map(|v| v.to_string().trim().to_string())
            .unwrap_or_default()
    }

    /// Trimmed text, or `None` when blank.
    pub fn opt_text(&self, row: &ProgramRow, field: Field) -> Option<String> {
        Some(self.text(row, field)).filter(|s| !s.is_empty())
    }

    /// First non-blank value across every present candidate column.
    pub fn coalesce(&self, row: &ProgramRow, field: Field) -> String {
        field
            .candidates()
            .iter()
            .filter(|name| self.has_column(name))
            .filter_map(|name| row.get(name))
            .find(|value| !value.is_blank())
            .map(|value| value.to_string().trim().to_string())
            .unwrap_or_default()
    }
}
