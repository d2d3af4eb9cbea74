//! Takedown notice drafting
//!
//! Consumes an accepted report and renders a DMCA-style takedown notice for
//! the receiving workflow. The factual basis section lists only categories
//! backed by direct evidence. Drafts carry no claim of legal sufficiency
//! and must be reviewed before sending.

use crate::engine::scoring::evidence_level;
use crate::report::Report;
use crate::storage::{self, ArtifactStore};
use crate::BrandTraceResult;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const NOTICE_DIR: &str = "notices";

static DOMAIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Za-z][A-Za-z0-9+.\-]*://)?(?:www\.)?([^/:?#\s]+)").unwrap()
});

/// Host portion of `url`, without scheme, `www.` or port
pub fn extract_domain(url: &str) -> String {
    let trimmed = url.trim();
    DOMAIN_PATTERN
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Who is sending the notice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimantDetails {
    /// Legal name of the rights holder
    pub copyright_owner: String,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub contact_address: String,
}

/// Case-specific text supplied by the drafter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoticeDetails {
    /// The rights holder's own site
    pub original_url: String,
    /// Description of the specific infringing elements
    pub infringement_details: String,
    pub original_work_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakedownNotice {
    pub session_id: String,
    pub infringing_url: String,
    pub infringing_domain: String,
    pub report_version: u32,
    pub drafted_at: DateTime<Utc>,
    pub markdown: String,
}

impl TakedownNotice {
    /// Write under `notices/takedown_<domain>_vNNN.md`, returning the key
    pub fn persist(&self, store: &dyn ArtifactStore) -> BrandTraceResult<String> {
        let stem = format!("takedown_{}", sanitize(&self.infringing_domain));
        let version = storage::next_version(store, NOTICE_DIR, &stem)?;
        let key = storage::versioned_key(NOTICE_DIR, &stem, version, "md");
        store.put_new(&key, self.markdown.as_bytes())?;
        tracing::info!("Stored takedown notice draft {}", key);
        Ok(key)
    }
}

fn sanitize(domain: &str) -> String {
    domain
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct NoticeDrafter;

impl NoticeDrafter {
    pub fn new() -> Self {
        Self
    }

    pub fn draft(&self, report: &Report, claimant: &ClaimantDetails, details: &NoticeDetails) -> TakedownNotice {
        let drafted_at = Utc::now();
        let domain = extract_domain(&report.target_url);
        let work = details.original_work_description.clone().unwrap_or_else(|| {
            format!(
                "The original work is the '{}' brand, including its name, logo, product designs, \
                 and associated elements as displayed on {}.",
                report.brand, details.original_url
            )
        });

        let mut md = String::with_capacity(4096);
        md.push_str("# DMCA TAKEDOWN NOTICE\n\n");
        md.push_str(&format!("**Date:** {}\n\n", drafted_at.format("%B %d, %Y")));
        md.push_str(&format!("**RE: Copyright Infringement Notice - {}**\n\n", report.brand));
        md.push_str("To Whom It May Concern:\n\n");
        md.push_str(
            "This letter serves as notification under the Digital Millennium Copyright Act (DMCA), \
             17 USC § 512(c)(3)(A) that the following copyright infringement has occurred. I request \
             that you remove or disable access to the infringing material as described below.\n\n",
        );

        md.push_str("## 1. Contact Information\n\n");
        md.push_str(&format!("**Copyright Owner:** {}\n", claimant.copyright_owner));
        md.push_str(&format!("**Represented by:** {}\n", claimant.contact_name));
        md.push_str(&format!("**Email:** {}\n", claimant.contact_email));
        md.push_str(&format!("**Phone:** {}\n", claimant.contact_phone));
        md.push_str(&format!("**Address:** {}\n\n", claimant.contact_address));

        md.push_str("## 2. Identification of Copyrighted Work\n\n");
        md.push_str(&format!("{}\n\n", work));

        md.push_str("## 3. Identification of Infringing Material\n\n");
        md.push_str("The unauthorized and infringing material can be found at:\n");
        md.push_str(&format!("{}\n\n", report.target_url));

        md.push_str("## 4. Specific Description of Infringement\n\n");
        md.push_str(&format!("{}\n\n", details.infringement_details));

        md.push_str("### Factual Basis\n\n");
        md.push_str(&format!(
            "Automated analysis (report v{:03}, session `{}`) assigned an evidence-based score of \
             {:.2}/100 ({} evidence, {} confidence).\n\n",
            report.version,
            report.session_id,
            report.score.value,
            evidence_level(report.score.value),
            report.score.confidence_band
        ));
        let direct: Vec<_> = report.score.breakdown.iter().filter(|b| b.direct).collect();
        if direct.is_empty() {
            md.push_str("- No category is supported by direct evidence.\n");
        }
        for row in direct {
            md.push_str(&format!(
                "- {}: signal {:.2} from {} item(s)\n",
                row.category.label(),
                row.raw_signal,
                row.evidence_count
            ));
        }
        for v in report.registered_variants() {
            md.push_str(&format!(
                "- Registered lookalike domain `{}` ({})\n",
                v.candidate, v.technique
            ));
        }
        md.push('\n');

        md.push_str("## 5. Good Faith Statement\n\n");
        md.push_str(
            "I have a good faith belief that the use of the material in the manner complained of \
             is not authorized by the copyright owner, its agent, or the law.\n\n",
        );
        md.push_str("## 6. Accuracy Statement\n\n");
        md.push_str(
            "Under penalty of perjury, I state that the information in this notification is \
             accurate, and I am authorized to act on behalf of the owner of the exclusive right \
             that is allegedly infringed.\n\n",
        );
        md.push_str("## 7. Fair Use Statement\n\n");
        md.push_str("I have taken into consideration fair use aspects before sending this notice.\n\n");
        md.push_str("## 8. Request for Removal\n\n");
        md.push_str(
            "I respectfully ask that you remove or disable access to the infringing material \
             identified above. Please notify me when this action has been taken.\n\n",
        );

        md.push_str("Sincerely,\n\n");
        md.push_str(&format!(
            "{}\n{}\n{}\n{}\n",
            claimant.contact_name, claimant.copyright_owner, claimant.contact_email, claimant.contact_phone
        ));

        tracing::debug!("Drafted takedown notice for {} ({} bytes)", domain, md.len());

        TakedownNotice {
            session_id: report.session_id.clone(),
            infringing_url: report.target_url.clone(),
            infringing_domain: domain,
            report_version: report.version,
            drafted_at,
            markdown: md,
        }
    }
}
