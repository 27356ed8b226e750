//! Date-window predicates shared by every KPI consumer.

use chrono::{Datelike, NaiveDate};

use crate::models::ProgramRow;
use crate::normalize::{is_present, parse_date};
use crate::schema::{columns, Field, SchemaMapping, ENDED_STATUS};

/// Reporting year for fill, completion and satisfaction on the dashboard.
pub const DASHBOARD_YEAR: i32 = 2025;

/// Employment-rate eligibility window, inclusive on both ends.
pub fn employment_window() -> Option<(NaiveDate, NaiveDate)> {
    Some((
        NaiveDate::from_ymd_opt(2024, 7, 1)?,
        NaiveDate::from_ymd_opt(2025, 6, 30)?,
    ))
}

/// Mapped end date, falling back to the legacy `종강` column when the mapped
/// column is one of the ended-date columns and its value does not parse.
pub fn resolve_end_date(row: &ProgramRow, mapping: &SchemaMapping) -> Option<NaiveDate> {
    resolve_with_legacy(row, mapping, Field::End, columns::END)
}

pub fn resolve_start_date(row: &ProgramRow, mapping: &SchemaMapping) -> Option<NaiveDate> {
    resolve_with_legacy(row, mapping, Field::Start, columns::START)
}

fn resolve_with_legacy(
    row: &ProgramRow,
    mapping: &SchemaMapping,
    field: Field,
    legacy: &str,
) -> Option<NaiveDate> {
    let column = mapping.column(field)?;
    mapping.date(row, field).or_else(|| {
        if column.contains(legacy) {
            parse_date(row.get(legacy))
        } else {
            None
        }
    })
}

pub fn ended_in_year(row: &ProgramRow, mapping: &SchemaMapping, year: i32) -> bool {
    resolve_end_date(row, mapping).is_some_and(|d| d.year() == year)
}

pub fn status_ended(row: &ProgramRow, mapping: &SchemaMapping) -> bool {
    mapping.is_mapped(Field::Status) && mapping.text(row, Field::Status) == ENDED_STATUS
}

/// Ended status, a recorded completion count (zero allowed) and an end date
/// inside the employment window.
pub fn ended_in_floating_window(row: &ProgramRow, mapping: &SchemaMapping) -> bool {
    if !status_ended(row, mapping) {
        return false;
    }
    if !is_present(mapping.value(row, Field::Completed)) {
        return false;
    }
    let Some(end) = resolve_end_date(row, mapping) else {
        return false;
    };
    employment_window().is_some_and(|(from, to)| from <= end && end <= to)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> SchemaMapping {
        SchemaMapping::resolve(&["진행상태", "종강일", "종강", "수료인원"])
    }

    fn ended(end: &str, completed: i64) -> ProgramRow {
        ProgramRow::new()
            .with("진행상태", "종강")
            .with("종강일", end)
            .with("수료인원", completed)
    }

    #[test]
    fn floating_window_boundaries() {
        let mapping = mapping();
        assert!(!ended_in_floating_window(&ended("2024-06-30", 10), &mapping));
        assert!(ended_in_floating_window(&ended("2024-07-01", 0), &mapping));
        assert!(ended_in_floating_window(&ended("2025.06.30", 3), &mapping));
        assert!(!ended_in_floating_window(&ended("2025-07-01", 3), &mapping));
    }

    #[test]
    fn floating_window_requires_completion_count() {
        let mapping = mapping();
        let blank = ended("2024-09-01", 0).with("수료인원", "");
        let missing = ProgramRow::new()
            .with("진행상태", "종강")
            .with("종강일", "2024-09-01");
        assert!(!ended_in_floating_window(&blank, &mapping));
        assert!(!ended_in_floating_window(&missing, &mapping));
    }

    #[test]
    fn floating_window_requires_ended_status() {
        let mapping = mapping();
        let running = ended("2024-09-01", 5).with("진행상태", "진행중");
        assert!(!ended_in_floating_window(&running, &mapping));
    }

    #[test]
    fn status_match_is_trimmed_and_exact() {
        let mapping = mapping();
        let padded = ProgramRow::new().with("진행상태", " 종강 ");
        let other = ProgramRow::new().with("진행상태", "종강예정");
        assert!(status_ended(&padded, &mapping));
        assert!(!status_ended(&other, &mapping));
        let unmapped = SchemaMapping::resolve(&["종강일"]);
        assert!(!status_ended(&padded, &unmapped));
    }

    #[test]
    fn end_date_falls_back_to_legacy_column() {
        let mapping = mapping();
        let row = ProgramRow::new()
            .with("종강일", "TBD")
            .with("종강", "2025/02/28");
        assert_eq!(
            resolve_end_date(&row, &mapping),
            NaiveDate::from_ymd_opt(2025, 2, 28)
        );
        assert!(ended_in_year(&row, &mapping, 2025));
        assert!(!ended_in_year(&row, &mapping, 2024));
    }

    #[test]
    fn unmapped_end_date_never_matches() {
        let mapping = SchemaMapping::resolve(&["진행상태"]);
        let row = ProgramRow::new().with("종강", "2025-02-28");
        assert_eq!(resolve_end_date(&row, &mapping), None);
        assert!(!ended_in_year(&row, &mapping, 2025));
    }
}
