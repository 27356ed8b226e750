use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod bucket;
mod db;
mod education;
mod kpi;
mod models;
mod normalize;
mod report;
mod revenue;
mod schema;
mod window;

use bucket::{Granularity, ProgramFilter, Ruleset};
use models::{MonthlyMatrices, ProgramTable};
use revenue::YearScope;
use schema::SchemaMapping;

#[derive(Parser)]
#[command(name = "program-metrics")]
#[command(about = "KPI and revenue reporting for training programs", long_about = None)]
struct Cli {
    /// Read the program snapshot from a CSV export instead of Postgres
    #[arg(long, global = true)]
    csv: Option<PathBuf>,
    /// Monthly hours matrix (CSV mode)
    #[arg(long, global = true)]
    hours_csv: Option<PathBuf>,
    /// Monthly enrollment matrix (CSV mode)
    #[arg(long, global = true)]
    enrollments_csv: Option<PathBuf>,
    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone, Default)]
struct FilterArgs {
    #[arg(long)]
    year: Option<String>,
    #[arg(long)]
    quarter: Option<String>,
    /// Team or category label
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    status: Option<String>,
}

impl FilterArgs {
    fn into_filter(self, program_like: Option<String>) -> ProgramFilter {
        ProgramFilter {
            year: self.year,
            quarter: self.quarter,
            category: self.category,
            status: self.status,
            program_like,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Headline dashboard KPIs
    Kpi {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Dashboard KPIs per quarter
    Trends {
        #[arg(long)]
        year: Option<String>,
    },
    /// KPIs grouped by year, quarter, month or program
    Metrics {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long)]
        program_like: Option<String>,
        #[arg(long, value_enum, ignore_case = true, default_value_t = Granularity::Quarter)]
        granularity: Granularity,
        #[arg(long, value_enum, ignore_case = true, default_value_t = Ruleset::Dashboard)]
        ruleset: Ruleset,
    },
    /// Course and student totals across every program
    Stats,
    /// Course and student totals for one year
    Counts {
        #[arg(long, default_value = education::DEFAULT_YEAR)]
        year: String,
    },
    /// Programs of one year in start-date order
    Timeline { year: i32 },
    /// Distinct years, quarters and teams
    Filters,
    /// Expected versus actual revenue per program round
    Revenue {
        #[arg(long, default_value = "2025")]
        year: YearScope,
    },
    /// Monthly revenue from the hours and enrollment matrices
    Monthly {
        #[arg(long, default_value = "2025")]
        year: YearScope,
        #[arg(long)]
        program_like: Option<String>,
    },
    /// Matrix revenue for one calendar month
    Expected {
        #[arg(long, default_value_t = 2025)]
        year: i32,
        #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: u32,
        #[arg(long)]
        program_like: Option<String>,
    },
    /// Projected monthly revenue with linear enrollment decline
    Progression {
        #[arg(long, default_value = "2025")]
        year: YearScope,
        #[arg(long)]
        program_like: Option<String>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        year: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

impl Commands {
    fn needs_matrices(&self) -> bool {
        matches!(self, Commands::Monthly { .. } | Commands::Expected { .. })
    }
}

struct Snapshot {
    table: ProgramTable,
    matrices: MonthlyMatrices,
}

async fn load_snapshot(cli: &Cli) -> anyhow::Result<Snapshot> {
    if let Some(path) = &cli.csv {
        let table = db::load_csv_table(path)?;
        let matrices = MonthlyMatrices {
            hours: db::load_csv_matrix(cli.hours_csv.as_deref())?,
            enrollments: db::load_csv_matrix(cli.enrollments_csv.as_deref())?,
        };
        return Ok(Snapshot { table, matrices });
    }

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set when no --csv snapshot is given")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let table = db::fetch_program_table(&pool).await?;
    let matrices = if cli.command.needs_matrices() {
        db::fetch_monthly_matrices(&pool).await
    } else {
        MonthlyMatrices::default()
    };
    Ok(Snapshot { table, matrices })
}

fn emit<T: Serialize>(json: bool, value: &T, render: fn(&T) -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", render(value));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Snapshot { table, matrices } = load_snapshot(&cli).await?;
    let mapping = SchemaMapping::resolve(&table.columns);
    let rows = table.row_refs();
    let json = cli.json;

    match cli.command {
        Commands::Kpi { filters } => {
            let rows = filters.into_filter(None).apply(&rows, &mapping);
            let kpis = bucket::dashboard_kpi(&rows, &mapping);
            emit(json, &kpis, report::render_kpis)?;
        }
        Commands::Trends { year } => {
            let rows = ProgramFilter::for_year(year.as_deref()).apply(&rows, &mapping);
            let trends = bucket::quarterly_trends(&rows, &mapping);
            emit(json, &trends, |t| report::render_buckets(t))?;
        }
        Commands::Metrics {
            filters,
            program_like,
            granularity,
            ruleset,
        } => {
            let rows = filters.into_filter(program_like).apply(&rows, &mapping);
            info!(%granularity, %ruleset, rows = rows.len(), "bucketing programs");
            let buckets = bucket::bucket_metrics(&rows, &mapping, granularity, ruleset);
            emit(json, &buckets, |b| report::render_buckets(b))?;
        }
        Commands::Stats => {
            let stats = education::stats(&rows, &mapping);
            emit(json, &stats, report::render_stats)?;
        }
        Commands::Counts { year } => {
            let rows = ProgramFilter::for_year(Some(year.as_str())).apply(&rows, &mapping);
            let counts = education::counts(&rows, &mapping, &year);
            emit(json, &counts, report::render_counts)?;
        }
        Commands::Timeline { year } => {
            let label = year.to_string();
            let rows = ProgramFilter::for_year(Some(label.as_str())).apply(&rows, &mapping);
            let events = education::timeline(&rows, &mapping, year);
            emit(json, &events, |e| report::render_timeline(e))?;
        }
        Commands::Filters => {
            let options = education::filter_options(&rows, &mapping);
            emit(json, &options, report::render_filters)?;
        }
        Commands::Revenue { year } => {
            let gap = revenue::revenue_gap(&rows, &mapping, &year);
            emit(json, &gap, report::render_gap)?;
        }
        Commands::Monthly { year, program_like } => {
            let monthly = revenue::monthly_revenue(
                &rows,
                &mapping,
                &matrices,
                &year,
                program_like.as_deref(),
            );
            emit(json, &monthly, report::render_monthly)?;
        }
        Commands::Expected {
            year,
            month,
            program_like,
        } => {
            let expected = revenue::target_month_expected(
                &rows,
                &mapping,
                &matrices,
                year,
                month,
                program_like.as_deref(),
            );
            emit(json, &expected, report::render_expected)?;
        }
        Commands::Progression { year, program_like } => {
            let projection =
                revenue::progression(&rows, &mapping, &year, program_like.as_deref());
            emit(json, &projection, report::render_progression)?;
        }
        Commands::Report { year, out } => {
            let rows = ProgramFilter::for_year(year.as_deref()).apply(&rows, &mapping);
            let kpis = bucket::dashboard_kpi(&rows, &mapping);
            let trends = bucket::quarterly_trends(&rows, &mapping);
            let stats = education::stats(&rows, &mapping);
            let scope = year
                .clone()
                .map_or(YearScope::All, YearScope::Year);
            let gap = revenue::revenue_gap(&rows, &mapping, &scope);
            let report = report::build_report(year.as_deref(), &kpis, &trends, &stats, &gap);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
