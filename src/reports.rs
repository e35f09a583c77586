// Report orchestration.
//
// A request walks through ResolvePeriod -> FetchAggregates -> ComputeMetrics
// -> AllocateColumns -> BuildSheets -> AppendToWorkbook for each variant, then
// HandOff. Any error from the source or the builders stops the run and no
// workbook is returned.
use crate::columns::{ColumnAllocator, DuplicateLabel};
use crate::config::ReportConfig;
use crate::coords::CellRef;
use crate::duration::{self, Duration};
use crate::error::Result;
use crate::metrics::{self, category_breakdown, percentage_of, Breakdown, DeltaRule};
use crate::period::Period;
use crate::sheet::{
    write_key_value_block, write_labeled_table, CellStyle, CellValue, Cursor, MergeOverlap, Sheet,
    Workbook,
};
use crate::source::{fetch_all, AggregateSource};
use crate::types::{AggregateRow, CategoryLine, QuerySpec, ReportSummary, SummaryTable};
use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, info, info_span, warn};

pub const Q_COMPANIES_BY_CATEGORY: &str = "companies_by_category";
pub const Q_HEADCOUNT_BY_CONTRACT: &str = "headcount_by_contract";
pub const Q_PLAN_HISTORY: &str = "plan_history";
pub const Q_INTERVIEWS: &str = "interviews";
pub const Q_EVENTS_BY_TYPE: &str = "events_by_type";

const LABEL_COLUMN_WIDTH: f64 = 32.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportVariant {
    ByCategory,
    AnteCreation,
    ExtraSite,
}

impl ReportVariant {
    pub const ALL: [ReportVariant; 3] = [
        ReportVariant::ByCategory,
        ReportVariant::AnteCreation,
        ReportVariant::ExtraSite,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReportVariant::ByCategory => "by-category",
            ReportVariant::AnteCreation => "ante-creation",
            ReportVariant::ExtraSite => "extra-site",
        }
    }
}

impl fmt::Display for ReportVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReportVariant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ReportVariant::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown report variant '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ResolvePeriod,
    FetchAggregates,
    ComputeMetrics,
    AllocateColumns,
    BuildSheets,
    AppendToWorkbook,
    HandOff,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub variants: Vec<ReportVariant>,
    pub reference_year: i32,
    /// Tenant scope; `None` reports over every company.
    pub company: Option<String>,
    pub today: NaiveDate,
}

impl ReportRequest {
    pub fn new(variant: ReportVariant, reference_year: i32, today: NaiveDate) -> Self {
        Self {
            variants: vec![variant],
            reference_year,
            company: None,
            today,
        }
    }

    pub fn all(reference_year: i32, today: NaiveDate) -> Self {
        Self {
            variants: ReportVariant::ALL.to_vec(),
            reference_year,
            company: None,
            today,
        }
    }

    pub fn company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }
}

/// Non-fatal anomalies found while building a report.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    DuplicateLabel(DuplicateLabel),
    MergeOverlap(MergeOverlap),
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::DuplicateLabel(d) => write!(
                f,
                "duplicate label '{}': kept column {}, rejected column {}",
                d.label, d.kept_index, d.rejected_index
            ),
            Diagnostic::MergeOverlap(o) => write!(f, "{}", o),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub period: Period,
    pub workbook: Workbook,
    pub summary: ReportSummary,
    pub diagnostics: Vec<Diagnostic>,
    pub stages: Vec<Stage>,
}

#[derive(Debug, Default)]
struct StageLog {
    stages: Vec<Stage>,
}

impl StageLog {
    fn enter(&mut self, stage: Stage) {
        debug!(?stage, "entering stage");
        self.stages.push(stage);
    }

    fn current(&self) -> Option<Stage> {
        self.stages.last().copied()
    }
}

/// Sheets and findings produced by one variant before they join the workbook.
struct Section {
    sheets: Vec<(String, Sheet)>,
    diagnostics: Vec<Diagnostic>,
}

pub struct ReportEngine<'a, S: AggregateSource + ?Sized> {
    source: &'a S,
    config: &'a ReportConfig,
}

impl<'a, S: AggregateSource + ?Sized> ReportEngine<'a, S> {
    pub fn new(source: &'a S, config: &'a ReportConfig) -> Self {
        Self { source, config }
    }

    pub fn run(&self, request: &ReportRequest) -> Result<Report> {
        let span = info_span!("report", year = request.reference_year, company = ?request.company);
        let _guard = span.enter();

        let mut log = StageLog::default();
        match self.execute(request, &mut log) {
            Ok(mut report) => {
                log.enter(Stage::Completed);
                report.stages = log.stages;
                info!(
                    sheets = report.workbook.len(),
                    diagnostics = report.diagnostics.len(),
                    "report completed"
                );
                Ok(report)
            }
            Err(e) => {
                error!(stage = ?log.current(), error = %e, "report failed");
                log.enter(Stage::Failed);
                Err(e)
            }
        }
    }

    fn execute(&self, request: &ReportRequest, log: &mut StageLog) -> Result<Report> {
        log.enter(Stage::ResolvePeriod);
        let period = Period::resolve(request.reference_year, request.today);
        let previous = period.previous(request.today);
        debug!(start = %period.start, end = %period.end, "period resolved");

        let mut workbook = Workbook::new();
        let mut summary = ReportSummary::new(period);
        let mut diagnostics = Vec::new();

        for variant in &request.variants {
            let scope = Scope {
                period,
                previous,
                company: request.company.as_deref(),
            };
            let section = match variant {
                ReportVariant::ByCategory => self.by_category(&scope, log, &mut summary)?,
                ReportVariant::AnteCreation => self.ante_creation(&scope, log, &mut summary)?,
                ReportVariant::ExtraSite => self.extra_site(&scope, log, &mut summary)?,
            };
            log.enter(Stage::AppendToWorkbook);
            for (name, sheet) in section.sheets {
                workbook.append_sheet(sheet, &name)?;
            }
            diagnostics.extend(section.diagnostics);
        }

        log.enter(Stage::HandOff);
        diagnostics.extend(merge_diagnostics(&workbook));

        Ok(Report {
            period,
            workbook,
            summary,
            diagnostics,
            stages: Vec::new(),
        })
    }

    fn spec(&self, name: &str, period: Period, company: Option<&str>) -> QuerySpec {
        let spec = QuerySpec::new(name, period);
        match company {
            Some(c) => spec.filter(self.config.fields.company.as_str(), c),
            None => spec,
        }
    }

    fn by_category(
        &self,
        scope: &Scope<'_>,
        log: &mut StageLog,
        summary: &mut ReportSummary,
    ) -> Result<Section> {
        let f = &self.config.fields;

        log.enter(Stage::FetchAggregates);
        let specs = vec![
            self.spec(Q_COMPANIES_BY_CATEGORY, scope.period, scope.company),
            self.spec(Q_COMPANIES_BY_CATEGORY, scope.previous, scope.company),
            self.spec(Q_HEADCOUNT_BY_CONTRACT, scope.period, scope.company),
            self.spec(Q_HEADCOUNT_BY_CONTRACT, scope.previous, scope.company),
            // Plan history reaches back a year so moves into the period are seen.
            self.spec(Q_PLAN_HISTORY, scope.previous, scope.company),
            self.spec(Q_PLAN_HISTORY, scope.period, scope.company),
        ];
        let mut results = fetch_all(self.source, &specs)?.into_iter();
        let mut next = || results.next().unwrap_or_default();
        let (companies, companies_prev) = (next(), next());
        let (headcount, headcount_prev) = (next(), next());
        let mut plans = next();
        plans.extend(next());

        log.enter(Stage::ComputeMetrics);
        let categories = category_breakdown(
            &companies,
            Some(companies_prev.as_slice()),
            &f.category,
            &f.count,
            DeltaRule::YearOverYear,
        );
        let contracts = category_breakdown(
            &headcount,
            Some(headcount_prev.as_slice()),
            &f.contract,
            &f.count,
            DeltaRule::NonNegative,
        );
        let sequences = metrics::dated_label_sequences(&plans, &f.entity, &f.label, &f.date);
        let tracked = self.config.transitions();
        let transitions = metrics::transition_counts_within(&sequences, &tracked, &scope.period);

        log.enter(Stage::BuildSheets);
        let mut overview = labeled_sheet();
        let cursor = write_period_block(&mut overview, Cursor::top(), &scope.period)?;
        write_labeled_table(
            &mut overview,
            cursor,
            "Companies by category",
            &total_line(&categories),
            &categories.lines,
        )?;

        let mut staff = labeled_sheet();
        write_labeled_table(
            &mut staff,
            Cursor::top(),
            "Headcount by contract type (new hires)",
            &total_line(&contracts),
            &contracts.lines,
        )?;

        let mut moves = labeled_sheet();
        let entries: Vec<(String, CellValue)> = transitions
            .iter()
            .map(|((from, to), count)| {
                (format!("{} → {}", from, to), CellValue::Integer(*count as i64))
            })
            .collect();
        write_key_value_block(&mut moves, Cursor::top(), "Plan transitions", &entries)?;

        summary.tables.push(summary_table("Companies by category", &categories));
        summary.tables.push(summary_table("Headcount by contract type", &contracts));
        for (label, value) in &entries {
            summary.value(label.as_str(), value);
        }

        Ok(Section {
            sheets: vec![
                ("Categories".to_string(), overview),
                ("Headcount".to_string(), staff),
                ("Transitions".to_string(), moves),
            ],
            diagnostics: Vec::new(),
        })
    }

    fn ante_creation(
        &self,
        scope: &Scope<'_>,
        log: &mut StageLog,
        summary: &mut ReportSummary,
    ) -> Result<Section> {
        let f = &self.config.fields;

        log.enter(Stage::FetchAggregates);
        let specs = vec![self.spec(Q_INTERVIEWS, scope.period, scope.company)];
        let interviews = fetch_all(self.source, &specs)?.into_iter().next().unwrap_or_default();

        log.enter(Stage::ComputeMetrics);
        let durations: Vec<String> = interviews.iter().map(|r| r.label(&f.duration)).collect();
        let total_time = Duration::parse(&duration::sum(&durations));
        let weighted: Vec<(String, i64)> = interviews
            .iter()
            .map(|r| (r.label(&f.duration), record_weight(r, &f.count)))
            .collect();
        let average_time = Duration::parse(&duration::weighted_average(&weighted));

        log.enter(Stage::AllocateColumns);
        let allocator = ColumnAllocator::new(self.config.subject_start_column)
            .delimiter(self.config.label_delimiter.as_str())
            .seed(self.config.seeded_subjects.iter().cloned());
        let allocation = allocator.allocate(&interviews, &f.subjects);
        let diagnostics: Vec<Diagnostic> = allocation
            .duplicates()
            .iter()
            .cloned()
            .map(Diagnostic::DuplicateLabel)
            .collect();
        let map = allocation.into_map();
        let total_col = allocator.total_column(&map);

        log.enter(Stage::BuildSheets);
        let mut sheet = labeled_sheet();
        let header = CellRef { row: 1, col: 0 };
        sheet.set_cell(header, "Interview", CellStyle::Header);
        sheet.set_cell(header.offset(0, 1), "Duration", CellStyle::Header);
        for (index, label) in map.iter() {
            sheet.set_cell(CellRef { row: 1, col: index }, label, CellStyle::Header);
        }
        sheet.set_cell(CellRef { row: 1, col: total_col }, "Total", CellStyle::Header);

        let mut per_subject: Vec<i64> = vec![0; map.len()];
        for (i, row) in interviews.iter().enumerate() {
            let at = CellRef { row: i as u32 + 2, col: 0 };
            let label = row.label(&f.label);
            let label = if label.is_empty() { format!("#{}", i + 1) } else { label };
            sheet.set_cell(at, label, CellStyle::Label);
            let spent = Duration::parse(&row.label(&f.duration));
            sheet.set_cell(at.offset(0, 1), spent, CellStyle::Plain);
            for (col, count) in allocator.project_row(row, &f.subjects, &map) {
                sheet.set_cell(CellRef { row: at.row, col }, count, CellStyle::Plain);
                if col != total_col && count > 0 {
                    if let Some(slot) = map.iter().position(|(c, _)| c == col) {
                        per_subject[slot] += 1;
                    }
                }
            }
        }

        let records = interviews.len() as i64;
        let lines: Vec<CategoryLine> = map
            .iter()
            .zip(&per_subject)
            .map(|((_, label), count)| CategoryLine {
                label: label.to_string(),
                count: *count,
                percent: percentage_of(*count as f64, records as f64),
                delta: None,
            })
            .collect();
        let total = CategoryLine {
            label: "Interviews".into(),
            count: records,
            percent: percentage_of(records as f64, records as f64),
            delta: None,
        };
        // Header row, one row per record, then a blank row.
        let cursor = Cursor::top().down(records as u32 + 2);
        let cursor =
            write_labeled_table(&mut sheet, cursor, "Interviews by subject", &total, &lines)?;
        write_key_value_block(
            &mut sheet,
            cursor,
            "Time spent",
            &[
                ("Total time".to_string(), CellValue::Duration(total_time)),
                ("Average per interview".to_string(), CellValue::Duration(average_time)),
            ],
        )?;

        summary.tables.push(SummaryTable {
            title: "Interviews by subject".into(),
            total: records,
            lines,
        });
        summary.value("Interview time", total_time);
        summary.value("Average interview time", average_time);

        Ok(Section {
            sheets: vec![("Interviews".to_string(), sheet)],
            diagnostics,
        })
    }

    fn extra_site(
        &self,
        scope: &Scope<'_>,
        log: &mut StageLog,
        summary: &mut ReportSummary,
    ) -> Result<Section> {
        let f = &self.config.fields;

        log.enter(Stage::FetchAggregates);
        let specs = vec![
            self.spec(Q_EVENTS_BY_TYPE, scope.period, scope.company),
            self.spec(Q_EVENTS_BY_TYPE, scope.previous, scope.company),
        ];
        let mut results = fetch_all(self.source, &specs)?.into_iter();
        let events = results.next().unwrap_or_default();
        let events_prev = results.next().unwrap_or_default();

        log.enter(Stage::ComputeMetrics);
        let types = category_breakdown(
            &events,
            Some(events_prev.as_slice()),
            &f.category,
            &f.count,
            DeltaRule::YearOverYear,
        );
        // Each row carries the average duration of one event of its type.
        let weighted: Vec<(String, i64)> = events
            .iter()
            .map(|r| (r.label(&f.duration), r.count(&f.count)))
            .collect();
        let average_time = Duration::parse(&duration::weighted_average(&weighted));
        let total_time: Duration = weighted
            .iter()
            .map(|(d, n)| Duration::from_minutes(Duration::parse(d).minutes().saturating_mul(*n)))
            .sum();

        log.enter(Stage::BuildSheets);
        let mut sheet = labeled_sheet();
        let cursor = write_labeled_table(
            &mut sheet,
            Cursor::top(),
            "Events by type",
            &total_line(&types),
            &types.lines,
        )?;
        write_key_value_block(
            &mut sheet,
            cursor,
            "Time spent",
            &[
                ("Total time".to_string(), CellValue::Duration(total_time)),
                ("Average per event".to_string(), CellValue::Duration(average_time)),
            ],
        )?;

        summary.tables.push(summary_table("Events by type", &types));
        summary.value("Event time", total_time);
        summary.value("Average event time", average_time);

        Ok(Section {
            sheets: vec![("Events".to_string(), sheet)],
            diagnostics: Vec::new(),
        })
    }
}

/// Overlapping merge regions across the workbook, as diagnostics.
///
/// Overlaps are never rejected while sheets are built; this pass reports them
/// and the sink keeps the first declared region of each overlapping pair.
pub fn merge_diagnostics(workbook: &Workbook) -> Vec<Diagnostic> {
    workbook
        .validate_merges()
        .into_iter()
        .map(|overlap| {
            warn!(%overlap, "overlapping merge regions");
            Diagnostic::MergeOverlap(overlap)
        })
        .collect()
}

struct Scope<'r> {
    period: Period,
    previous: Period,
    company: Option<&'r str>,
}

fn labeled_sheet() -> Sheet {
    let mut sheet = Sheet::new();
    sheet.set_column_width(0, LABEL_COLUMN_WIDTH);
    sheet
}

/// A row without a count field stands for one record.
fn record_weight(row: &AggregateRow, count_field: &str) -> i64 {
    if row.get(count_field).is_some() {
        row.count(count_field)
    } else {
        1
    }
}

fn total_line(b: &Breakdown) -> CategoryLine {
    CategoryLine {
        label: "Total".into(),
        count: b.total,
        percent: b.total_percent,
        delta: b.total_delta,
    }
}

fn summary_table(title: &str, b: &Breakdown) -> SummaryTable {
    SummaryTable {
        title: title.into(),
        total: b.total,
        lines: b.lines.clone(),
    }
}

fn write_period_block(sheet: &mut Sheet, cursor: Cursor, period: &Period) -> Result<Cursor> {
    let date = |d: NaiveDate| CellValue::Text(d.format("%Y-%m-%d").to_string());
    write_key_value_block(
        sheet,
        cursor,
        "Reporting period",
        &[
            ("Reference year".to_string(), CellValue::Integer(period.reference_year as i64)),
            ("From".to_string(), date(period.start)),
            ("To".to_string(), date(period.end)),
        ],
    )
}
