//! JSON report renderer

use super::Report;
use crate::BrandTraceResult;

/// Render a report as pretty-printed JSON
pub fn render(report: &Report) -> BrandTraceResult<String> {
    Ok(serde_json::to_string_pretty(report)?)
}
