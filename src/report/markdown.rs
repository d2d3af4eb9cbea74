//! Markdown report renderer
//!
//! Fixed structure: header, score summary, category breakdown, lookalike
//! domains, collection gaps, evidence appendix. Category rows always follow
//! the fixed scoring order so reports diff cleanly across runs.

use super::Report;
use crate::engine::scoring::{evidence_level, ConfidenceBand};
use crate::typosquat::RegistrationStatus;

/// Render a report as Markdown
pub fn render(report: &Report) -> String {
    let mut md = String::with_capacity(4096);
    let score = &report.score;

    md.push_str("# Brand Protection Analysis Report\n\n");

    md.push_str("| Field | Value |\n|---|---|\n");
    md.push_str(&format!("| **Session** | `{}` |\n", report.session_id));
    md.push_str(&format!("| **Brand** | {} |\n", escape_cell(&report.brand)));
    md.push_str(&format!("| **Target** | `{}` |\n", escape_cell(&truncate(&report.target_url, 80))));
    md.push_str(&format!(
        "| **Generated** | {} |\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    md.push_str(&format!("| **Version** | v{:03} |\n\n", report.version));

    // Score summary
    md.push_str("## Score Summary\n\n");
    md.push_str(&format!(
        "- **Evidence-Based Score:** **{:.2}** / 100\n",
        score.value
    ));
    md.push_str(&format!(
        "- **Confidence Band:** {}\n",
        band_badge(score.confidence_band)
    ));
    md.push_str(&format!("- **Evidence Level:** {}\n", evidence_level(score.value)));
    md.push_str(&format!(
        "- **Direct Categories:** {}/{}\n\n",
        score.direct_categories(),
        score.breakdown.len()
    ));

    // Breakdown
    md.push_str("## Category Breakdown\n\n");
    md.push_str("| Category | Weight | Raw Signal | Contribution |\n");
    md.push_str("|----------|-------:|-----------:|-------------:|\n");
    for row in &score.breakdown {
        let name = if row.direct {
            row.category.key().to_string()
        } else {
            format!("{} (neutral)", row.category.key())
        };
        md.push_str(&format!(
            "| {} | {:.2} | {:.3} | {:.2} |\n",
            name, row.weight, row.raw_signal, row.contribution
        ));
    }
    let total_weight: f64 = score.breakdown.iter().map(|b| b.weight).sum();
    md.push_str(&format!(
        "| **Total** | **{:.2}** | | **{:.2}** |\n\n",
        total_weight, score.value
    ));

    // Lookalike domains
    let registered = report.registered_variants();
    if !registered.is_empty() {
        md.push_str("## Registered Lookalike Domains\n\n");
        md.push_str("| Domain | Technique | Registrar |\n");
        md.push_str("|--------|-----------|-----------|\n");
        for v in registered {
            md.push_str(&format!(
                "| `{}` | {} | {} |\n",
                v.candidate,
                v.technique,
                escape_cell(v.registrar.as_deref().unwrap_or("unknown"))
            ));
        }
        md.push_str("\n");
    }
    let unknown = report
        .variants
        .iter()
        .filter(|v| v.is_registered == RegistrationStatus::Unknown)
        .count();
    if unknown > 0 {
        md.push_str(&format!(
            "_{} of {} lookalike lookups could not be resolved._\n\n",
            unknown,
            report.variants.len()
        ));
    }

    // Gaps
    md.push_str("## Collection Gaps\n\n");
    if report.gaps.is_empty() {
        md.push_str("None.\n\n");
    } else {
        for gap in &report.gaps {
            md.push_str(&format!("- {}\n", gap));
        }
        md.push_str("\n");
    }

    // Appendix
    md.push_str("## Evidence Appendix\n\n");
    if report.evidence.is_empty() {
        md.push_str("No evidence items were collected.\n\n");
    } else {
        md.push_str("| # | Source | Confidence | Collected | SHA-256 |\n");
        md.push_str("|--:|--------|-----------:|-----------|---------|\n");
        for (i, item) in report.evidence.iter().enumerate() {
            md.push_str(&format!(
                "| {} | {} | {:.2} | {} | `{}` |\n",
                i + 1,
                item.source(),
                item.confidence(),
                item.collected_at().format("%Y-%m-%d %H:%M:%S"),
                truncate(item.sha256(), 16)
            ));
        }
        md.push_str("\n");
    }

    md.push_str("---\n\n");
    md.push_str(
        "*Zero-trust methodology: categories without direct evidence are held at a neutral \
         signal and reduce confidence, not the score. All findings require human review \
         before any action is taken.*\n",
    );

    md
}

fn band_badge(band: ConfidenceBand) -> &'static str {
    match band {
        ConfidenceBand::Low => "🔵 low",
        ConfidenceBand::Medium => "🟡 medium",
        ConfidenceBand::High => "🟠 high",
    }
}

/// Keep collaborator- and user-supplied text inside its table cell
fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|").replace(['\r', '\n'], " ")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(max).collect::<String>())
    }
}
