//! examlens-report — report rendering.
//!
//! [`markdown`] assembles the student-facing learning report; [`json`]
//! produces the machine-readable summary that embeds it. [`chart`] renders
//! class chart analyses.

pub mod chart;
pub mod json;
pub mod markdown;

pub use chart::{render_chart_report, render_comprehensive_chart_report, write_chart_report};
pub use json::{generate_summary, write_json_summary, ReportSummary};
pub use markdown::{assemble, render_report, write_markdown_report};
