//! Read-only renderers for finished reports.

pub mod html;
pub mod markdown;

use std::fmt;
use std::str::FromStr;

use crate::core::report::BreachReport;
use crate::error::ExportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Markdown,
    Html,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "md",
            ExportFormat::Html => "html",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "markdown",
            ExportFormat::Html => "html",
        };
        f.write_str(name)
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            "html" => Ok(ExportFormat::Html),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

pub fn to_json(report: &BreachReport) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn render(report: &BreachReport, format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => to_json(report),
        ExportFormat::Markdown => Ok(markdown::render(report)),
        ExportFormat::Html => Ok(html::render(report)),
    }
}
