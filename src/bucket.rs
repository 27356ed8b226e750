use std::collections::BTreeMap;
use std::fmt;

use chrono::Datelike;
use clap::ValueEnum;

use crate::kpi::compute_kpis;
use crate::models::{Bucket, KpiSet, ProgramRow};
use crate::schema::{Field, SchemaMapping};
use crate::window::{
    ended_in_floating_window, ended_in_year, resolve_end_date, resolve_start_date,
    status_ended, DASHBOARD_YEAR,
};

pub const QUARTERS: [&str; 4] = ["Q1", "Q2", "Q3", "Q4"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Granularity {
    Year,
    Quarter,
    Month,
    Program,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Granularity::Year => "year",
            Granularity::Quarter => "quarter",
            Granularity::Month => "month",
            Granularity::Program => "program",
        };
        f.write_str(label)
    }
}

/// How each bucket's rates are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Ruleset {
    /// Per-rate date windows, as on the dashboard.
    Dashboard,
    /// One aggregation over the whole bucket.
    Raw,
}

impl fmt::Display for Ruleset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ruleset::Dashboard => f.write_str("dashboard"),
            Ruleset::Raw => f.write_str("raw"),
        }
    }
}

/// Equality filters on mapped fields plus a name substring.
///
/// A filter naming an unmapped field is ignored rather than matching nothing.
#[derive(Debug, Clone, Default)]
pub struct ProgramFilter {
    pub year: Option<String>,
    pub quarter: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub program_like: Option<String>,
}

impl ProgramFilter {
    pub fn for_year(year: Option<&str>) -> Self {
        Self {
            year: year.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn matches(&self, row: &ProgramRow, mapping: &SchemaMapping) -> bool {
        let checks = [
            (Field::Year, &self.year),
            (Field::Quarter, &self.quarter),
            (Field::Team, &self.category),
            (Field::Status, &self.status),
        ];
        for (field, wanted) in checks {
            let wanted = wanted.as_deref().map(str::trim);
            let Some(wanted) = wanted.filter(|w| !w.is_empty()) else {
                continue;
            };
            if mapping.is_mapped(field) && mapping.text(row, field) != wanted {
                return false;
            }
        }
        match self.program_like.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() && mapping.is_mapped(Field::Name) => {
                mapping.text(row, Field::Name).contains(needle)
            }
            _ => true,
        }
    }

    pub fn apply<'a>(
        &self,
        rows: &[&'a ProgramRow],
        mapping: &SchemaMapping,
    ) -> Vec<&'a ProgramRow> {
        rows.iter()
            .copied()
            .filter(|row| self.matches(row, mapping))
            .collect()
    }
}

/// Quarter label for a row: the quarter column, else derived from the start month.
pub fn quarter_of(row: &ProgramRow, mapping: &SchemaMapping) -> Option<String> {
    mapping.opt_text(row, Field::Quarter).or_else(|| {
        resolve_start_date(row, mapping).map(|d| format!("Q{}", (d.month() - 1) / 3 + 1))
    })
}

pub fn bucket_key(
    row: &ProgramRow,
    mapping: &SchemaMapping,
    granularity: Granularity,
) -> Option<String> {
    match granularity {
        Granularity::Year => resolve_end_date(row, mapping)
            .map(|d| d.year().to_string())
            .or_else(|| mapping.opt_text(row, Field::Year)),
        Granularity::Quarter => quarter_of(row, mapping),
        Granularity::Month => {
            resolve_end_date(row, mapping).map(|d| d.format("%Y-%m").to_string())
        }
        Granularity::Program => mapping.opt_text(row, Field::Name),
    }
}

/// Fill on programs ending in the reporting year; completion and satisfaction
/// on those that also carry the ended status; employment on the floating window.
pub fn dashboard_kpis(rows: &[&ProgramRow], mapping: &SchemaMapping) -> KpiSet {
    let ended_this_year: Vec<&ProgramRow> = rows
        .iter()
        .copied()
        .filter(|row| ended_in_year(row, mapping, DASHBOARD_YEAR))
        .collect();
    let recruit = compute_kpis(ended_this_year.iter().copied(), mapping);
    let done = compute_kpis(
        ended_this_year
            .iter()
            .copied()
            .filter(|row| status_ended(row, mapping)),
        mapping,
    );
    let window = compute_kpis(
        rows.iter()
            .copied()
            .filter(|row| ended_in_floating_window(row, mapping)),
        mapping,
    );

    KpiSet {
        fill_rate: recruit.fill_rate,
        completion_rate: done.completion_rate,
        employment_rate: window.employment_rate,
        satisfaction: done.satisfaction,
    }
}

pub fn bucket_metrics(
    rows: &[&ProgramRow],
    mapping: &SchemaMapping,
    granularity: Granularity,
    ruleset: Ruleset,
) -> Vec<Bucket> {
    let mut buckets: BTreeMap<String, Vec<&ProgramRow>> = BTreeMap::new();
    for row in rows.iter().copied() {
        if let Some(key) = bucket_key(row, mapping, granularity) {
            buckets.entry(key).or_default().push(row);
        }
    }

    let keys: Vec<String> = if granularity == Granularity::Quarter {
        QUARTERS.iter().map(|q| q.to_string()).collect()
    } else {
        buckets.keys().cloned().collect()
    };

    keys.into_iter()
        .map(|key| {
            let members = buckets.get(&key).map(Vec::as_slice).unwrap_or(&[]);
            let kpis = if members.is_empty() {
                KpiSet::default()
            } else {
                match ruleset {
                    Ruleset::Dashboard => dashboard_kpis(members, mapping),
                    Ruleset::Raw => compute_kpis(members.iter().copied(), mapping),
                }
            };
            Bucket {
                key,
                kpis: kpis.rounded(),
            }
        })
        .collect()
}

/// Headline dashboard figures for an already filtered set of rows.
pub fn dashboard_kpi(rows: &[&ProgramRow], mapping: &SchemaMapping) -> KpiSet {
    dashboard_kpis(rows, mapping).rounded()
}

/// Dashboard rates per quarter with satisfaction on a 0-100 scale.
///
/// Rows without a derivable quarter are counted in Q1.
pub fn quarterly_trends(rows: &[&ProgramRow], mapping: &SchemaMapping) -> Vec<Bucket> {
    let mut buckets: BTreeMap<String, Vec<&ProgramRow>> = BTreeMap::new();
    for row in rows.iter().copied() {
        let key = quarter_of(row, mapping).unwrap_or_else(|| QUARTERS[0].to_string());
        buckets.entry(key).or_default().push(row);
    }

    QUARTERS
        .iter()
        .map(|quarter| {
            let members = buckets.get(*quarter).map(Vec::as_slice).unwrap_or(&[]);
            let mut kpis = dashboard_kpis(members, mapping);
            kpis.satisfaction = kpis.satisfaction / 5.0 * 100.0;
            Bucket {
                key: quarter.to_string(),
                kpis: kpis.rounded(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> SchemaMapping {
        SchemaMapping::resolve(&[
            "HRD_Net_과정명",
            "년도",
            "분기",
            "담당팀",
            "진행상태",
            "개강일",
            "종강일",
            "정원",
            "HRD_확정",
            "수료인원",
            "취업인원",
            "HRD_만족도",
        ])
    }

    fn program(name: &str, quarter: &str, start: &str, end: &str) -> ProgramRow {
        ProgramRow::new()
            .with("HRD_Net_과정명", name)
            .with("년도", 2025i64)
            .with("분기", quarter)
            .with("담당팀", "Cloud")
            .with("진행상태", "종강")
            .with("개강일", start)
            .with("종강일", end)
            .with("정원", 20i64)
            .with("HRD_확정", 10i64)
            .with("수료인원", 8i64)
            .with("취업인원", 4i64)
            .with("HRD_만족도", 4.0)
    }

    #[test]
    fn quarter_buckets_always_emit_four() {
        let mapping = mapping();
        let rows: Vec<&ProgramRow> = Vec::new();
        for ruleset in [Ruleset::Dashboard, Ruleset::Raw] {
            let buckets = bucket_metrics(&rows, &mapping, Granularity::Quarter, ruleset);
            let keys: Vec<&str> = buckets.iter().map(|b| b.key.as_str()).collect();
            assert_eq!(keys, QUARTERS);
            assert!(buckets.iter().all(|b| b.kpis == KpiSet::default()));
        }
    }

    #[test]
    fn quarter_derived_from_start_month_when_blank() {
        let mapping = mapping();
        let row = program("A", " ", "2025-08-04", "2025-12-20");
        assert_eq!(quarter_of(&row, &mapping), Some("Q3".to_string()));
        let rows = vec![&row];
        let buckets = bucket_metrics(&rows, &mapping, Granularity::Quarter, Ruleset::Raw);
        assert_eq!(buckets[2].kpis.fill_rate, 50.0);
        assert_eq!(buckets[0].kpis.fill_rate, 0.0);
    }

    #[test]
    fn other_granularities_emit_sorted_observed_keys() {
        let mapping = mapping();
        let a = program("Zeta", "Q1", "2024-11-01", "2025-03-02");
        let b = program("Alpha", "Q2", "2024-01-01", "2024-06-30");
        let c = program("Mid", "Q2", "2025-01-01", "2025-03-15");
        let rows = vec![&a, &b, &c];

        let years = bucket_metrics(&rows, &mapping, Granularity::Year, Ruleset::Raw);
        let keys: Vec<&str> = years.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, ["2024", "2025"]);

        let months = bucket_metrics(&rows, &mapping, Granularity::Month, Ruleset::Raw);
        let keys: Vec<&str> = months.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, ["2024-06", "2025-03"]);

        let programs = bucket_metrics(&rows, &mapping, Granularity::Program, Ruleset::Raw);
        let keys: Vec<&str> = programs.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, ["Alpha", "Mid", "Zeta"]);
    }

    #[test]
    fn dashboard_rules_slice_each_rate() {
        let mapping = mapping();
        // Ends in 2025 and inside the employment window.
        let in_window = program("A", "Q1", "2025-01-02", "2025-03-31");
        // Ends in 2024 inside the window: only employment counts it.
        let last_year = program("B", "Q1", "2024-05-01", "2024-09-30")
            .with("취업인원", 8i64);
        // Ends late 2025, still running: only fill counts it.
        let running = program("C", "Q1", "2025-06-01", "2025-11-30")
            .with("진행상태", "진행중")
            .with("HRD_확정", 20i64);
        let rows = vec![&in_window, &last_year, &running];

        let kpis = dashboard_kpi(&rows, &mapping);
        // (10 + 20) / (20 + 20)
        assert_eq!(kpis.fill_rate, 75.0);
        assert_eq!(kpis.completion_rate, 80.0);
        // (4 + 8) / (8 + 8)
        assert_eq!(kpis.employment_rate, 75.0);
        assert_eq!(kpis.satisfaction, 4.0);

        let raw = bucket_metrics(&rows, &mapping, Granularity::Quarter, Ruleset::Raw);
        // 40 / 60 over the whole bucket
        assert_eq!(raw[0].kpis.fill_rate, 66.67);
    }

    #[test]
    fn trends_rescale_satisfaction_after_averaging() {
        let mapping = mapping();
        let a = program("A", "Q2", "2025-04-01", "2025-05-30").with("HRD_만족도", 4.333);
        let b = program("B", "Q2", "2025-04-01", "2025-05-30").with("HRD_만족도", 4.334);
        let rows = vec![&a, &b];
        let trends = quarterly_trends(&rows, &mapping);
        assert_eq!(trends.len(), 4);
        // mean 4.3335 -> 86.67, not round(4.33) * 20 = 86.6
        assert_eq!(trends[1].kpis.satisfaction, 86.67);
        assert_eq!(trends[0].kpis, KpiSet::default());
    }

    #[test]
    fn filters_compare_mapped_text() {
        let mapping = mapping();
        let a = program("Data Analytics", "Q1", "2025-01-02", "2025-03-31");
        let b = program("Cloud Ops", "Q2", "2025-04-01", "2025-06-30").with("년도", 2024i64);
        let rows = vec![&a, &b];

        let filter = ProgramFilter::for_year(Some("2025"));
        assert_eq!(filter.apply(&rows, &mapping).len(), 1);

        let filter = ProgramFilter {
            quarter: Some("Q2".to_string()),
            category: Some("Cloud".to_string()),
            ..ProgramFilter::default()
        };
        assert_eq!(filter.apply(&rows, &mapping).len(), 1);

        let filter = ProgramFilter {
            program_like: Some("Analytics".to_string()),
            ..ProgramFilter::default()
        };
        let matched = filter.apply(&rows, &mapping);
        assert_eq!(matched.len(), 1);
        assert_eq!(mapping.text(matched[0], Field::Name), "Data Analytics");
    }
}
