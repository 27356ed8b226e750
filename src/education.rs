use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::bucket::QUARTERS;
use crate::kpi::{aggregate, saturating_total};
use crate::models::{
    round2, EducationCounts, EducationStats, FilterOptions, ProgramRow, TimelineEvent,
};
use crate::normalize::parse_int;
use crate::schema::{Field, SchemaMapping};
use crate::window::{resolve_end_date, resolve_start_date};

pub const DEFAULT_YEAR: &str = "2025";

fn total_students(rows: &[&ProgramRow], mapping: &SchemaMapping) -> i64 {
    saturating_total(rows.iter().map(|r| mapping.int(r, Field::Confirmed)))
}

/// Course and student totals with completion and employment rates from a
/// single aggregation over every row.
pub fn stats(rows: &[&ProgramRow], mapping: &SchemaMapping) -> EducationStats {
    let kpis = aggregate(rows.iter().copied(), mapping).rates();
    EducationStats {
        total_courses: rows.len(),
        total_students: total_students(rows, mapping),
        completion_rate: round2(kpis.completion_rate),
        employment_rate: round2(kpis.employment_rate),
    }
}

/// Totals for rows already narrowed to `year`.
pub fn counts(rows: &[&ProgramRow], mapping: &SchemaMapping, year: &str) -> EducationCounts {
    EducationCounts {
        year: year.to_string(),
        total_courses: rows.len(),
        total_students: total_students(rows, mapping),
    }
}

/// Programs of one year in start-date order; undated programs sort as 1 January.
pub fn timeline(rows: &[&ProgramRow], mapping: &SchemaMapping, year: i32) -> Vec<TimelineEvent> {
    let fallback = NaiveDate::from_ymd_opt(year, 1, 1);
    let mut dated: Vec<(Option<NaiveDate>, TimelineEvent)> = rows
        .iter()
        .map(|row| {
            let start = resolve_start_date(row, mapping);
            let event = TimelineEvent {
                id: row.id(),
                name: mapping.opt_text(row, Field::Name),
                team: mapping.opt_text(row, Field::Team),
                status: mapping.opt_text(row, Field::Status),
                category: Some(mapping.coalesce(row, Field::Category)).filter(|c| !c.is_empty()),
                start,
                end: resolve_end_date(row, mapping),
            };
            (start.or(fallback), event)
        })
        .collect();
    dated.sort_by(|a, b| a.0.cmp(&b.0));
    dated.into_iter().map(|(_, event)| event).collect()
}

/// Distinct years (newest first), quarters and teams for filter pickers.
pub fn filter_options(rows: &[&ProgramRow], mapping: &SchemaMapping) -> FilterOptions {
    let years: BTreeSet<i64> = rows
        .iter()
        .filter_map(|r| mapping.value(r, Field::Year))
        .filter(|v| !v.is_null())
        .map(|v| parse_int(Some(v), 0))
        .collect();

    let mut quarters: Vec<String> = rows
        .iter()
        .filter_map(|r| mapping.opt_text(r, Field::Quarter))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if quarters.is_empty() {
        quarters = QUARTERS.iter().map(|q| q.to_string()).collect();
    }

    let teams: BTreeSet<String> = rows
        .iter()
        .filter_map(|r| mapping.opt_text(r, Field::Team))
        .collect();

    FilterOptions {
        years: years.into_iter().rev().collect(),
        quarters,
        teams: teams.into_iter().collect(),
    }
}
