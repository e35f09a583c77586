// Entry point and high-level CLI flow.
//
// Reads exported aggregates from a directory of CSV files, builds the
// requested report variants for one reference year and writes the workbook
// (plus an optional JSON summary).
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tenant_report::output::{self, SpreadsheetSink, XlsxSink};
use tenant_report::util::format_int;
use tenant_report::{CsvSource, ReportConfig, ReportEngine, ReportRequest, ReportVariant};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum VariantArg {
    ByCategory,
    AnteCreation,
    ExtraSite,
    All,
}

impl VariantArg {
    fn variants(self) -> Vec<ReportVariant> {
        match self {
            VariantArg::ByCategory => vec![ReportVariant::ByCategory],
            VariantArg::AnteCreation => vec![ReportVariant::AnteCreation],
            VariantArg::ExtraSite => vec![ReportVariant::ExtraSite],
            VariantArg::All => ReportVariant::ALL.to_vec(),
        }
    }
}

#[derive(Parser)]
#[command(name = "tenant_report")]
#[command(author, version, about = "Yearly activity report workbook generator", long_about = None)]
struct Cli {
    /// Directory holding one <query>.csv file per aggregate query
    #[arg(short, long, value_name = "DIR")]
    data_dir: PathBuf,

    /// Reference year of the report
    #[arg(short, long)]
    year: i32,

    /// Report variant to build
    #[arg(long, value_enum, default_value = "all")]
    variant: VariantArg,

    /// Restrict every query to one company
    #[arg(long)]
    company: Option<String>,

    /// Date to resolve the current period against (defaults to today)
    #[arg(long, value_name = "YYYY-MM-DD")]
    today: Option<NaiveDate>,

    /// Workbook to write
    #[arg(short, long, default_value = "report.xlsx")]
    output: PathBuf,

    /// Also write a JSON summary of the computed tables
    #[arg(long, value_name = "FILE")]
    summary: Option<PathBuf>,

    /// Layout and field-name configuration (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print Markdown previews of every table
    #[arg(long)]
    preview: bool,

    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => {
            ReportConfig::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => ReportConfig::default(),
    };
    let today = cli.today.unwrap_or_else(|| Local::now().date_naive());

    let mut request = ReportRequest::all(cli.year, today);
    request.variants = cli.variant.variants();
    if let Some(company) = &cli.company {
        request = request.company(company.as_str());
    }

    println!("Generating reports...");
    let source = CsvSource::new(&cli.data_dir);
    let engine = ReportEngine::new(&source, &config);
    let report = engine.run(&request).context("report generation failed")?;

    for diagnostic in &report.diagnostics {
        eprintln!("Warning: {}", diagnostic);
    }

    XlsxSink
        .save(&report.workbook, &cli.output)
        .with_context(|| format!("writing {}", cli.output.display()))?;
    println!(
        "Period {} to {}: {} sheets written to {}",
        report.period.start,
        report.period.end,
        format_int(report.workbook.len() as u64),
        cli.output.display()
    );

    if let Some(path) = &cli.summary {
        output::write_json(path, &report.summary)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Summary saved to {}", path.display());
    }

    if cli.preview {
        for table in &report.summary.tables {
            println!("\n{} (total {})\n", table.title, format_int(table.total));
            println!("{}", output::preview_table(&table.lines, usize::MAX));
        }
        for value in &report.summary.values {
            println!("{}: {}", value.label, value.value);
        }
    }

    Ok(())
}
