use std::fmt::Write;

use crate::models::{
    Bucket, EducationCounts, EducationStats, ExpectedRevenueReport, FilterOptions, KpiSet,
    MonthlyRevenueReport, ProgressionReport, RevenueGapReport, TimelineEvent,
};

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn render_kpis(kpis: &KpiSet) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Fill rate:        {:.2}%", kpis.fill_rate);
    let _ = writeln!(output, "Completion rate:  {:.2}%", kpis.completion_rate);
    let _ = writeln!(output, "Employment rate:  {:.2}%", kpis.employment_rate);
    let _ = writeln!(output, "Satisfaction:     {:.2}", kpis.satisfaction);
    output
}

pub fn render_buckets(buckets: &[Bucket]) -> String {
    let mut output = String::new();
    if buckets.is_empty() {
        let _ = writeln!(output, "No programs matched.");
        return output;
    }
    for bucket in buckets {
        let _ = writeln!(
            output,
            "- {}: fill {:.2}%, completion {:.2}%, employment {:.2}%, satisfaction {:.2}",
            bucket.key,
            bucket.kpis.fill_rate,
            bucket.kpis.completion_rate,
            bucket.kpis.employment_rate,
            bucket.kpis.satisfaction
        );
    }
    output
}

pub fn render_stats(stats: &EducationStats) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Courses:          {}", stats.total_courses);
    let _ = writeln!(output, "Students:         {}", stats.total_students);
    let _ = writeln!(output, "Completion rate:  {:.2}%", stats.completion_rate);
    let _ = writeln!(output, "Employment rate:  {:.2}%", stats.employment_rate);
    output
}

pub fn render_counts(counts: &EducationCounts) -> String {
    format!(
        "{}: {} courses, {} students\n",
        counts.year, counts.total_courses, counts.total_students
    )
}

pub fn render_timeline(events: &[TimelineEvent]) -> String {
    let mut output = String::new();
    if events.is_empty() {
        let _ = writeln!(output, "No programs scheduled for this year.");
        return output;
    }
    for event in events {
        let _ = writeln!(
            output,
            "- {} to {} {} ({}, {})",
            or_dash(event.start),
            or_dash(event.end),
            event.name.as_deref().unwrap_or("(unnamed)"),
            or_dash(event.team.as_deref()),
            or_dash(event.status.as_deref())
        );
    }
    output
}

pub fn render_filters(options: &FilterOptions) -> String {
    let years: Vec<String> = options.years.iter().map(|y| y.to_string()).collect();
    let mut output = String::new();
    let _ = writeln!(output, "Years:    {}", years.join(", "));
    let _ = writeln!(output, "Quarters: {}", options.quarters.join(", "));
    let _ = writeln!(output, "Teams:    {}", options.teams.join(", "));
    output
}

pub fn render_gap(report: &RevenueGapReport) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "Revenue for {}: expected {}, actual {}, gap {}, max {}",
        report.year.as_deref().unwrap_or("all years"),
        report.totals.expected,
        report.totals.actual,
        report.totals.gap,
        report.totals.max
    );
    for item in &report.items {
        let _ = writeln!(
            output,
            "- {} #{} ({}, start {}): expected {}, actual {}, gap {}, max {}",
            item.program,
            item.round,
            or_dash(item.quarter.as_deref()),
            or_dash(item.start),
            item.expected,
            item.actual,
            item.gap,
            item.max
        );
    }
    output
}

pub fn render_monthly(report: &MonthlyRevenueReport) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "Monthly revenue for {}: total {}",
        report.year.as_deref().unwrap_or("all years"),
        report.total
    );
    let totals: Vec<String> = report
        .months
        .iter()
        .zip(&report.month_totals)
        .map(|(label, total)| format!("{label}={total}"))
        .collect();
    let _ = writeln!(output, "By month: {}", totals.join(", "));
    for item in &report.items {
        let _ = writeln!(output, "- {} #{}: {}", item.program, item.round, item.total);
    }
    output
}

pub fn render_expected(report: &ExpectedRevenueReport) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "Expected revenue for {}-{:02}: {}",
        report.year, report.month, report.total
    );
    for item in &report.items {
        let _ = writeln!(
            output,
            "- {} #{} ({}M): {}",
            item.program, item.round, item.month_index, item.expected
        );
    }
    output
}

pub fn render_progression(report: &ProgressionReport) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "Projected revenue for {}: {}",
        report.year.as_deref().unwrap_or("all years"),
        report.grand_total
    );
    for total in &report.monthly_totals {
        let _ = writeln!(output, "  {}: {}", total.month, total.total_revenue);
    }
    for program in &report.programs {
        let _ = writeln!(
            output,
            "- {} #{}: {} -> {} over {} months (-{:.2}/month), total {}",
            program.program,
            program.round,
            program.confirmed,
            program.completed,
            program.duration_months,
            program.decline_per_month,
            program.total_revenue
        );
    }
    output
}

pub fn build_report(
    year: Option<&str>,
    kpis: &KpiSet,
    trends: &[Bucket],
    stats: &EducationStats,
    revenue: &RevenueGapReport,
) -> String {
    let mut output = String::new();
    let year_label = year.unwrap_or("all years");

    let _ = writeln!(output, "# Program Performance Report");
    let _ = writeln!(output, "Generated for {}", year_label);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Headline KPIs");
    let _ = writeln!(output, "- Fill rate: {:.2}%", kpis.fill_rate);
    let _ = writeln!(output, "- Completion rate: {:.2}%", kpis.completion_rate);
    let _ = writeln!(output, "- Employment rate: {:.2}%", kpis.employment_rate);
    let _ = writeln!(output, "- Satisfaction: {:.2} / 5", kpis.satisfaction);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Quarterly Trends");
    let _ = writeln!(output, "| Quarter | Fill | Completion | Employment | Satisfaction (100) |");
    let _ = writeln!(output, "|---|---|---|---|---|");
    for bucket in trends {
        let _ = writeln!(
            output,
            "| {} | {:.2} | {:.2} | {:.2} | {:.2} |",
            bucket.key,
            bucket.kpis.fill_rate,
            bucket.kpis.completion_rate,
            bucket.kpis.employment_rate,
            bucket.kpis.satisfaction
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Enrollment");
    let _ = writeln!(
        output,
        "{} courses, {} confirmed students (completion {:.2}%, employment {:.2}%)",
        stats.total_courses, stats.total_students, stats.completion_rate, stats.employment_rate
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Revenue Gap");
    if revenue.items.is_empty() {
        let _ = writeln!(output, "No programs with revenue inputs for this window.");
    } else {
        let _ = writeln!(
            output,
            "Expected {}, actual {}, gap {} (max {})",
            revenue.totals.expected, revenue.totals.actual, revenue.totals.gap, revenue.totals.max
        );
        let mut largest = revenue.items.clone();
        largest.sort_by(|a, b| b.gap.cmp(&a.gap));
        for item in largest.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} #{}: gap {} ({} expected, {} actual)",
                item.program, item.round, item.gap, item.expected, item.actual
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProgramProjection, RevenueGapItem, RevenueTotals};

    #[test]
    fn report_lists_largest_gaps_first() {
        let item = |program: &str, gap: i64| RevenueGapItem {
            program: program.to_string(),
            round: "1".to_string(),
            quarter: None,
            expected: gap,
            actual: 0,
            gap,
            max: gap,
            start: None,
        };
        let revenue = RevenueGapReport {
            year: Some("2025".to_string()),
            totals: RevenueTotals::default(),
            items: vec![item("Small", 10), item("Large", 500)],
        };
        let stats = EducationStats {
            total_courses: 2,
            total_students: 40,
            completion_rate: 80.0,
            employment_rate: 50.0,
        };
        let report = build_report(Some("2025"), &KpiSet::default(), &[], &stats, &revenue);
        assert!(report.starts_with("# Program Performance Report"));
        let large = report.find("- Large").unwrap();
        let small = report.find("- Small").unwrap();
        assert!(large < small);
    }

    #[test]
    fn text_output_is_plain_ascii() {
        let event = TimelineEvent {
            id: Some(1),
            name: Some("Cloud".to_string()),
            team: None,
            status: None,
            category: None,
            start: chrono::NaiveDate::from_ymd_opt(2025, 1, 6),
            end: chrono::NaiveDate::from_ymd_opt(2025, 3, 28),
        };
        let timeline = render_timeline(&[event]);
        assert_eq!(timeline, "- 2025-01-06 to 2025-03-28 Cloud (-, -)\n");

        let progression = ProgressionReport {
            year: Some("2025".to_string()),
            program_filter: None,
            monthly_totals: Vec::new(),
            programs: vec![ProgramProjection {
                program: "Cloud".to_string(),
                round: "1".to_string(),
                confirmed: 100,
                completed: 60,
                duration_months: 4,
                decline_per_month: 13.33,
                monthly_data: Vec::new(),
                total_revenue: 0,
            }],
            grand_total: 0,
        };
        let rendered = render_progression(&progression);
        assert!(rendered.is_ascii());
        assert!(rendered.contains("100 -> 60 over 4 months (-13.33/month)"));
    }

    #[test]
    fn empty_buckets_render_placeholder() {
        assert_eq!(render_buckets(&[]), "No programs matched.\n");
    }
}
