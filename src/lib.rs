//! Periodic activity reports for a tenant-management application.
//!
//! Aggregate rows for a reporting period are turned into comparative
//! statistics (totals, percentages, changes against the previous year,
//! category transitions) and laid out into a multi-sheet workbook that is
//! finally serialized to xlsx.
pub mod columns;
pub mod config;
pub mod coords;
pub mod duration;
pub mod error;
pub mod metrics;
pub mod output;
pub mod period;
pub mod reports;
pub mod sheet;
pub mod source;
pub mod types;
pub mod util;

pub use config::ReportConfig;
pub use error::{ReportError, Result};
pub use period::Period;
pub use reports::{Report, ReportEngine, ReportRequest, ReportVariant, Stage};
pub use sheet::{Sheet, Workbook};
pub use source::{AggregateSource, CsvSource, MemorySource};
