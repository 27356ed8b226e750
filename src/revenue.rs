use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate};
use tracing::{debug, warn};

use crate::bucket::ProgramFilter;
use crate::kpi::{aggregate, saturating_total};
use crate::models::{
    month_labels, round_to, ExpectedRevenueItem, ExpectedRevenueReport, MonthTotal,
    MonthlyMatrices, MonthlyRevenueItem, MonthlyRevenueReport, ProgramProjection, ProgramRow,
    ProgressionReport, ProjectedMonth, RevenueGapItem, RevenueGapReport, RevenueTotals,
};
use crate::schema::{Field, SchemaMapping};
use crate::window::{resolve_end_date, resolve_start_date};

/// Revenue per training hour per enrollee.
pub const UNIT_RATE: i64 = 18_150;

/// Year selector for revenue reports; `all` disables the year filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YearScope {
    All,
    Year(String),
}

impl YearScope {
    pub fn label(&self) -> Option<String> {
        match self {
            YearScope::All => None,
            YearScope::Year(year) => Some(year.clone()),
        }
    }

    fn filter(&self, program_like: Option<&str>) -> ProgramFilter {
        ProgramFilter {
            year: self.label(),
            program_like: program_like.map(str::to_string),
            ..ProgramFilter::default()
        }
    }
}

impl FromStr for YearScope {
    type Err = Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("all") {
            Ok(YearScope::All)
        } else {
            Ok(YearScope::Year(value.to_string()))
        }
    }
}

fn program_label(row: &ProgramRow, mapping: &SchemaMapping) -> String {
    mapping.coalesce(row, Field::Name)
}

/// Months from the first month to the second, counting both ends.
fn inclusive_months(from: NaiveDate, to: NaiveDate) -> i64 {
    (to.year() as i64 - from.year() as i64) * 12 + (to.month() as i64 - from.month() as i64) + 1
}

/// Hours × enrollment × unit rate, clamped at the `i64` bounds.
fn billed(hours: i64, enrolled: i64) -> i64 {
    hours.saturating_mul(enrolled).saturating_mul(UNIT_RATE)
}

/// Expected, actual, gap and maximum revenue from summed group inputs.
pub fn revenue_figures(
    confirmed: i64,
    completed: i64,
    excluded: i64,
    hours: i64,
) -> RevenueTotals {
    let denominator = confirmed.saturating_sub(excluded);
    let graduation_rate = if denominator > 0 {
        completed as f64 / denominator as f64
    } else {
        0.0
    };
    let expected =
        (graduation_rate * confirmed as f64 * hours as f64 * UNIT_RATE as f64).round_ties_even();
    let expected = expected as i64;
    let actual = billed(hours, completed);
    RevenueTotals {
        expected,
        actual,
        gap: expected.saturating_sub(actual),
        max: billed(hours, confirmed),
    }
}

/// Expected/actual/gap per (program, round), inputs summed per group first.
pub fn revenue_gap(
    rows: &[&ProgramRow],
    mapping: &SchemaMapping,
    scope: &YearScope,
) -> RevenueGapReport {
    let rows = scope.filter(None).apply(rows, mapping);

    let mut order: Vec<(String, String)> = Vec::new();
    let mut groups: HashMap<(String, String), Vec<&ProgramRow>> = HashMap::new();
    for row in rows {
        let key = (program_label(row, mapping), mapping.text(row, Field::Round));
        let members = groups.entry(key.clone()).or_default();
        if members.is_empty() {
            order.push(key);
        }
        members.push(row);
    }

    let mut items: Vec<RevenueGapItem> = order
        .into_iter()
        .map(|key| {
            let members = groups.remove(&key).unwrap_or_default();
            let totals = aggregate(members.iter().copied(), mapping);
            let hours = saturating_total(members.iter().map(|r| mapping.int(r, Field::Hours)));
            let figures = revenue_figures(
                totals.confirmed,
                totals.completed,
                totals.completion_excluded,
                hours,
            );
            let start = members
                .iter()
                .filter_map(|r| resolve_start_date(r, mapping))
                .max();
            let (program, round) = key;
            RevenueGapItem {
                program,
                round,
                quarter: members
                    .first()
                    .and_then(|r| mapping.opt_text(r, Field::Quarter)),
                expected: figures.expected,
                actual: figures.actual,
                gap: figures.gap,
                max: figures.max,
                start,
            }
        })
        .collect();

    items.sort_by(|a, b| b.start.cmp(&a.start));

    let totals = items.iter().fold(RevenueTotals::default(), |mut acc, item| {
        acc.expected = acc.expected.saturating_add(item.expected);
        acc.actual = acc.actual.saturating_add(item.actual);
        acc.gap = acc.gap.saturating_add(item.gap);
        acc.max = acc.max.saturating_add(item.max);
        acc
    });

    RevenueGapReport {
        year: scope.label(),
        totals,
        items,
    }
}

/// Hours × enrollment × unit rate for months `1M`..`12M` of every program in scope.
pub fn monthly_revenue(
    rows: &[&ProgramRow],
    mapping: &SchemaMapping,
    matrices: &MonthlyMatrices,
    scope: &YearScope,
    program_like: Option<&str>,
) -> MonthlyRevenueReport {
    let rows = scope.filter(program_like).apply(rows, mapping);
    let labels = month_labels();
    let mut month_totals = vec![0i64; labels.len()];

    let mut dated: Vec<(Option<NaiveDate>, MonthlyRevenueItem)> = rows
        .iter()
        .map(|row| {
            let id = row.id().unwrap_or(0);
            let months: Vec<i64> = (1..=labels.len())
                .map(|m| billed(matrices.hours.value(id, m), matrices.enrollments.value(id, m)))
                .collect();
            for (total, value) in month_totals.iter_mut().zip(&months) {
                *total = total.saturating_add(*value);
            }
            let item = MonthlyRevenueItem {
                program: program_label(row, mapping),
                round: mapping.text(row, Field::Round),
                total: saturating_total(months.iter().copied()),
                months,
            };
            (resolve_start_date(row, mapping), item)
        })
        .collect();

    dated.sort_by(|a, b| b.0.cmp(&a.0));
    let items: Vec<MonthlyRevenueItem> = dated.into_iter().map(|(_, item)| item).collect();

    MonthlyRevenueReport {
        year: scope.label(),
        months: labels,
        total: saturating_total(month_totals.iter().copied()),
        month_totals,
        items,
    }
}

/// Matrix revenue for one calendar month, read from each active program's
/// month index relative to its start (the start month is `1M`).
pub fn target_month_expected(
    rows: &[&ProgramRow],
    mapping: &SchemaMapping,
    matrices: &MonthlyMatrices,
    year: i32,
    month: u32,
    program_like: Option<&str>,
) -> ExpectedRevenueReport {
    let mut report = ExpectedRevenueReport {
        year,
        month,
        total: 0,
        items: Vec::new(),
    };
    let window = NaiveDate::from_ymd_opt(year, month, 1).and_then(|start| {
        let end = start.checked_add_months(Months::new(1))?.pred_opt()?;
        Some((start, end))
    });
    let Some((window_start, window_end)) = window else {
        warn!(year, month, "invalid target month");
        return report;
    };

    let filter = ProgramFilter {
        program_like: program_like.map(str::to_string),
        ..ProgramFilter::default()
    };
    for row in filter.apply(rows, mapping) {
        let Some(start) = resolve_start_date(row, mapping) else {
            continue;
        };
        if start > window_end {
            continue;
        }
        if resolve_end_date(row, mapping).is_some_and(|end| end < window_start) {
            continue;
        }
        let month_index = inclusive_months(start, window_start);
        if !(1..=12).contains(&month_index) {
            continue;
        }
        let month_index = month_index as usize;
        let id = row.id().unwrap_or(0);
        let expected = billed(
            matrices.hours.value(id, month_index),
            matrices.enrollments.value(id, month_index),
        );
        report.total = report.total.saturating_add(expected);
        report.items.push(ExpectedRevenueItem {
            program: program_label(row, mapping),
            round: mapping.text(row, Field::Round),
            month_index,
            expected,
        });
    }

    report.items.sort_by(|a, b| b.expected.cmp(&a.expected));
    report
}

/// Month-by-month projection for one cohort.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub duration_months: i64,
    pub decline_per_month: f64,
    pub months: Vec<ProjectedMonth>,
}

/// Spread the drop from `confirmed` to `completed` linearly over the program's
/// months. Enrollment never falls below `completed` and the last month is
/// pinned to it.
pub fn project_program(
    confirmed: i64,
    completed: i64,
    start: NaiveDate,
    end: NaiveDate,
    hours: i64,
) -> Option<Projection> {
    if confirmed <= 0 || hours <= 0 {
        return None;
    }
    let duration_months = inclusive_months(start, end).max(1);
    let decline_per_month = (confirmed as f64 - completed as f64) / duration_months as f64;
    let monthly_hours = hours as f64 / duration_months as f64;

    let (mut year, mut month) = (start.year(), start.month());
    let mut months = Vec::with_capacity(duration_months as usize);
    for idx in 0..duration_months {
        let projected = confirmed as f64 - idx as f64 * decline_per_month;
        let enrollment = if idx == duration_months - 1 || projected < completed as f64 {
            completed as f64
        } else {
            projected
        };
        months.push(ProjectedMonth {
            month: format!("{year}-{month:02}"),
            enrollment: round_to(enrollment, 1),
            hours: round_to(monthly_hours, 1),
            revenue: (enrollment * monthly_hours * UNIT_RATE as f64).round_ties_even() as i64,
        });
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }

    Some(Projection {
        duration_months,
        decline_per_month,
        months,
    })
}

pub fn progression(
    rows: &[&ProgramRow],
    mapping: &SchemaMapping,
    scope: &YearScope,
    program_like: Option<&str>,
) -> ProgressionReport {
    let rows = scope.filter(program_like).apply(rows, mapping);
    let mut per_month: BTreeMap<String, i64> = BTreeMap::new();
    let mut programs = Vec::new();

    for row in rows {
        let confirmed = mapping.int(row, Field::Confirmed);
        let completed = mapping.int(row, Field::Completed);
        let hours = mapping.int(row, Field::Hours);
        let start = resolve_start_date(row, mapping);
        let end = resolve_end_date(row, mapping);
        let projection = match (start, end) {
            (Some(start), Some(end)) => project_program(confirmed, completed, start, end, hours),
            _ => None,
        };
        let Some(projection) = projection else {
            debug!(id = ?row.id(), "program skipped from revenue projection");
            continue;
        };

        for month in &projection.months {
            let total = per_month.entry(month.month.clone()).or_default();
            *total = total.saturating_add(month.revenue);
        }
        programs.push(ProgramProjection {
            program: program_label(row, mapping),
            round: mapping.text(row, Field::Round),
            confirmed,
            completed,
            duration_months: projection.duration_months,
            decline_per_month: round_to(projection.decline_per_month, 2),
            total_revenue: saturating_total(projection.months.iter().map(|m| m.revenue)),
            monthly_data: projection.months,
        });
    }

    let grand_total = saturating_total(per_month.values().copied());
    ProgressionReport {
        year: scope.label(),
        program_filter: program_like
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        monthly_totals: per_month
            .into_iter()
            .map(|(month, total_revenue)| MonthTotal {
                month,
                total_revenue,
            })
            .collect(),
        programs,
        grand_total,
    }
}
