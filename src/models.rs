use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::normalize::parse_int;

/// A single cell as it comes out of the backing store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Null and whitespace-only text count as blank; numeric zero does not.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Real(v) => write!(f, "{v}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Real(value)
    }
}

/// One program row keyed by physical column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramRow {
    fields: HashMap<String, FieldValue>,
}

impl ProgramRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(column.into(), value.into());
    }

    #[cfg(test)]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }

    /// The store's primary key; rows without one report `None`.
    pub fn id(&self) -> Option<i64> {
        match self.get(crate::schema::columns::ID) {
            Some(value) if !value.is_blank() => Some(parse_int(Some(value), 0)),
            _ => None,
        }
    }
}

/// Snapshot of the program table: the physical columns present and every row.
#[derive(Debug, Clone, Default)]
pub struct ProgramTable {
    pub columns: Vec<String>,
    pub rows: Vec<ProgramRow>,
}

impl ProgramTable {
    pub fn row_refs(&self) -> Vec<&ProgramRow> {
        self.rows.iter().collect()
    }
}

/// Per-program monthly values for months `1M`..`12M`.
#[derive(Debug, Clone, Default)]
pub struct MonthlyMatrix {
    by_id: HashMap<i64, [i64; 12]>,
}

impl MonthlyMatrix {
    pub fn from_rows(rows: &[ProgramRow]) -> Self {
        let mut matrix = Self::default();
        for row in rows {
            let Some(id) = row.id() else {
                continue;
            };
            let mut values = [0i64; 12];
            for (idx, label) in month_labels().iter().enumerate() {
                values[idx] = parse_int(row.get(label), 0);
            }
            matrix.insert(id, values);
        }
        matrix
    }

    pub fn insert(&mut self, id: i64, values: [i64; 12]) {
        self.by_id.insert(id, values);
    }

    /// Value for a 1-based month index; unknown programs and out-of-range months read as 0.
    pub fn value(&self, id: i64, month_index: usize) -> i64 {
        if !(1..=12).contains(&month_index) {
            return 0;
        }
        self.by_id
            .get(&id)
            .map(|values| values[month_index - 1])
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MonthlyMatrices {
    pub hours: MonthlyMatrix,
    pub enrollments: MonthlyMatrix,
}

pub fn month_labels() -> Vec<String> {
    (1..=12).map(|m| format!("{m}M")).collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct KpiSet {
    pub fill_rate: f64,
    pub completion_rate: f64,
    pub employment_rate: f64,
    pub satisfaction: f64,
}

impl KpiSet {
    pub fn rounded(self) -> Self {
        Self {
            fill_rate: round2(self.fill_rate),
            completion_rate: round2(self.completion_rate),
            employment_rate: round2(self.employment_rate),
            satisfaction: round2(self.satisfaction),
        }
    }
}

/// Two-decimal rounding, ties to even.
pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

#[derive(Debug, Clone, Serialize)]
pub struct Bucket {
    pub key: String,
    #[serde(flatten)]
    pub kpis: KpiSet,
}

#[derive(Debug, Clone, Serialize)]
pub struct EducationStats {
    pub total_courses: usize,
    pub total_students: i64,
    pub completion_rate: f64,
    pub employment_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EducationCounts {
    pub year: String,
    pub total_courses: usize,
    pub total_students: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEvent {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub team: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub start: Option<chrono::NaiveDate>,
    pub end: Option<chrono::NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterOptions {
    pub years: Vec<i64>,
    pub quarters: Vec<String>,
    pub teams: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RevenueTotals {
    pub expected: i64,
    pub actual: i64,
    pub gap: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueGapItem {
    pub program: String,
    pub round: String,
    pub quarter: Option<String>,
    pub expected: i64,
    pub actual: i64,
    pub gap: i64,
    pub max: i64,
    pub start: Option<chrono::NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueGapReport {
    pub year: Option<String>,
    pub totals: RevenueTotals,
    pub items: Vec<RevenueGapItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyRevenueItem {
    pub program: String,
    pub round: String,
    pub months: Vec<i64>,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyRevenueReport {
    pub year: Option<String>,
    pub months: Vec<String>,
    pub month_totals: Vec<i64>,
    pub total: i64,
    pub items: Vec<MonthlyRevenueItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpectedRevenueItem {
    pub program: String,
    pub round: String,
    pub month_index: usize,
    pub expected: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpectedRevenueReport {
    pub year: i32,
    pub month: u32,
    pub total: i64,
    pub items: Vec<ExpectedRevenueItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedMonth {
    pub month: String,
    pub enrollment: f64,
    pub hours: f64,
    pub revenue: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgramProjection {
    pub program: String,
    pub round: String,
    pub confirmed: i64,
    pub completed: i64,
    pub duration_months: i64,
    pub decline_per_month: f64,
    pub monthly_data: Vec<ProjectedMonth>,
    pub total_revenue: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthTotal {
    pub month: String,
    pub total_revenue: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressionReport {
    pub year: Option<String>,
    pub program_filter: Option<String>,
    pub monthly_totals: Vec<MonthTotal>,
    pub programs: Vec<ProgramProjection>,
    pub grand_total: i64,
}
