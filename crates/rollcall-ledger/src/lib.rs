//! rollcall-ledger: attendance records on disk.
//!
//! Matched identity labels become `Identifier,Name,Date,Time` rows in one CSV
//! file per day, and any day can be rendered to a paginated PDF report.

pub mod record;
pub mod report;
pub mod store;

pub use record::{records_for, split_label, AttendanceRecord};
pub use report::{paginate, render_pdf, write_report, ReportError, ReportRow};
pub use store::{parse_day_file_name, read_day_file, Ledger, LedgerError, RecordedRun};
