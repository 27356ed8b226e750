use std::iter::Sum;
use std::ops::{Add, AddAssign};

use crate::models::{KpiSet, ProgramRow};
use crate::schema::{Field, SchemaMapping};

/// Raw counters summed over a set of rows. Additive across disjoint subsets.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub capacity: i64,
    pub confirmed: i64,
    pub completed: i64,
    pub employed: i64,
    pub employment_excluded: i64,
    pub workers: i64,
    pub completion_excluded: i64,
    pub satisfaction_sum: f64,
    pub satisfaction_count: usize,
}

impl Totals {
    pub fn from_row(row: &ProgramRow, mapping: &SchemaMapping) -> Self {
        let satisfaction = mapping.value(row, Field::Satisfaction);
        let rated = satisfaction.is_some_and(|v| !v.is_null());
        Self {
            capacity: mapping.int(row, Field::Capacity),
            confirmed: mapping.int(row, Field::Confirmed),
            completed: mapping.int(row, Field::Completed),
            employed: mapping.int(row, Field::Employed),
            employment_excluded: mapping.int(row, Field::EmploymentExcluded),
            workers: mapping.int(row, Field::Workers),
            completion_excluded: mapping.int(row, Field::CompletionExcluded),
            satisfaction_sum: if rated {
                mapping.float(row, Field::Satisfaction)
            } else {
                0.0
            },
            satisfaction_count: usize::from(rated),
        }
    }

    /// Unrounded rates; reporting code rounds.
    pub fn rates(&self) -> KpiSet {
        KpiSet {
            fill_rate: percentage(self.confirmed, self.capacity),
            completion_rate: percentage(
                self.completed,
                self.confirmed.saturating_sub(self.completion_excluded),
            ),
            employment_rate: percentage(
                self.employed,
                self.completed
                    .saturating_sub(self.employment_excluded.saturating_add(self.workers)),
            ),
            satisfaction: if self.satisfaction_count == 0 {
                0.0
            } else {
                self.satisfaction_sum / self.satisfaction_count as f64
            },
        }
    }
}

fn percentage(numerator: i64, denominator: i64) -> f64 {
    if denominator <= 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}

impl Add for Totals {
    type Output = Totals;

    fn add(mut self, rhs: Totals) -> Totals {
        self += rhs;
        self
    }
}

impl AddAssign for Totals {
    fn add_assign(&mut self, rhs: Totals) {
        self.capacity = self.capacity.saturating_add(rhs.capacity);
        self.confirmed = self.confirmed.saturating_add(rhs.confirmed);
        self.completed = self.completed.saturating_add(rhs.completed);
        self.employed = self.employed.saturating_add(rhs.employed);
        self.employment_excluded = self
            .employment_excluded
            .saturating_add(rhs.employment_excluded);
        self.workers = self.workers.saturating_add(rhs.workers);
        self.completion_excluded = self
            .completion_excluded
            .saturating_add(rhs.completion_excluded);
        self.satisfaction_sum += rhs.satisfaction_sum;
        self.satisfaction_count += rhs.satisfaction_count;
    }
}

impl Sum for Totals {
    fn sum<I: Iterator<Item = Totals>>(iter: I) -> Totals {
        iter.fold(Totals::default(), Add::add)
    }
}

/// Sum that clamps at the `i64` bounds instead of overflowing.
pub fn saturating_total<I: IntoIterator<Item = i64>>(values: I) -> i64 {
    values.into_iter().fold(0, i64::saturating_add)
}

pub fn aggregate<'a, I>(rows: I, mapping: &SchemaMapping) -> Totals
where
    I: IntoIterator<Item = &'a ProgramRow>,
{
    rows.into_iter()
        .map(|row| Totals::from_row(row, mapping))
        .sum()
}

pub fn compute_kpis<'a, I>(rows: I, mapping: &SchemaMapping) -> KpiSet
where
    I: IntoIterator<Item = &'a ProgramRow>,
{
    aggregate(rows, mapping).rates()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;

    fn mapping() -> SchemaMapping {
        SchemaMapping::resolve(&[
            "정원",
            "HRD_확정",
            "수료인원",
            "취업인원",
            "취업산정제외인원",
            "근로자",
            "수료산정 제외인원",
            "HRD_만족도",
        ])
    }

    fn row(capacity: i64, confirmed: i64, completed: i64, employed: i64) -> ProgramRow {
        ProgramRow::new()
            .with("정원", capacity)
            .with("HRD_확정", confirmed)
            .with("수료인원", completed)
            .with("취업인원", employed)
    }

    #[test]
    fn rates_follow_formulas() {
        let mapping = mapping();
        let rows = vec![
            row(30, 24, 20, 10).with("HRD_만족도", 4.5),
            row(20, 16, 12, 6)
                .with("수료산정 제외인원", 4i64)
                .with("근로자", 2i64)
                .with("HRD_만족도", 3.5),
        ];
        let kpis = compute_kpis(&rows, &mapping);
        assert_eq!(kpis.fill_rate, 80.0);
        // 32 / (40 - 4)
        assert!((kpis.completion_rate - 32.0 / 36.0 * 100.0).abs() < 1e-9);
        // 16 / (32 - 2)
        assert!((kpis.employment_rate - 16.0 / 30.0 * 100.0).abs() < 1e-9);
        assert_eq!(kpis.satisfaction, 4.0);
    }

    #[test]
    fn fill_rate_is_zero_without_capacity() {
        let mapping = mapping();
        let rows = vec![row(0, 12, 10, 5)];
        assert_eq!(compute_kpis(&rows, &mapping).fill_rate, 0.0);
    }

    #[test]
    fn completion_rate_is_zero_when_exclusions_cover_confirmed() {
        let mapping = mapping();
        let rows = vec![row(10, 8, 6, 3).with("수료산정 제외인원", 8i64)];
        assert_eq!(compute_kpis(&rows, &mapping).completion_rate, 0.0);
        let rows = vec![row(10, 8, 6, 3).with("수료산정 제외인원", 12i64)];
        assert_eq!(compute_kpis(&rows, &mapping).completion_rate, 0.0);
    }

    #[test]
    fn employment_rate_is_zero_when_exclusions_cover_completed() {
        let mapping = mapping();
        let rows = vec![row(10, 8, 6, 3)
            .with("취업산정제외인원", 2i64)
            .with("근로자", 4i64)];
        assert_eq!(compute_kpis(&rows, &mapping).employment_rate, 0.0);
    }

    #[test]
    fn satisfaction_averages_only_present_scores() {
        let mapping = mapping();
        let rows = vec![
            row(10, 8, 6, 3).with("HRD_만족도", 5.0),
            row(10, 8, 6, 3).with("HRD_만족도", FieldValue::Null),
            row(10, 8, 6, 3),
        ];
        assert_eq!(compute_kpis(&rows, &mapping).satisfaction, 5.0);
    }

    #[test]
    fn counters_are_additive_over_partitions() {
        let mapping = mapping();
        let rows = vec![
            row(30, 24, 20, 10).with("근로자", 1i64),
            row(20, 16, 12, 6).with("HRD_만족도", 4.0),
            row(15, 15, 15, 15).with("수료산정 제외인원", 2i64),
            row(0, 3, 1, 0),
        ];
        let whole = aggregate(&rows, &mapping);
        let (left, right) = rows.split_at(2);
        assert_eq!(whole, aggregate(left, &mapping) + aggregate(right, &mapping));
    }

    #[test]
    fn oversized_counts_clamp_instead_of_overflowing() {
        let mapping = mapping();
        let rows = vec![
            ProgramRow::new()
                .with("정원", "9223372036854775807")
                .with("HRD_확정", 10i64),
            ProgramRow::new().with("정원", 10i64).with("HRD_확정", 10i64),
        ];
        let totals = aggregate(&rows, &mapping);
        assert_eq!(totals.capacity, i64::MAX);
        assert_eq!(totals.confirmed, 20);
        assert!(compute_kpis(&rows, &mapping).fill_rate < 1e-6);
        assert_eq!(saturating_total([i64::MAX, 1, 1]), i64::MAX);
    }

    #[test]
    fn empty_input_yields_zero_rates() {
        let mapping = mapping();
        let rows: Vec<ProgramRow> = Vec::new();
        assert_eq!(compute_kpis(&rows, &mapping), KpiSet::default());
    }
}
