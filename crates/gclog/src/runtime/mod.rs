//! Runtime — binary-only wiring: logging, configuration, report output.

pub mod boot;
pub mod report;
