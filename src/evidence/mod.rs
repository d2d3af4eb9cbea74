//! Evidence normalization
//!
//! Turns raw collaborator responses into uniform, immutable
//! [`EvidenceItem`]s:
//! - Strict field checks: a degraded third-party response fails with
//!   `MalformedEvidence` instead of defaulting into a score
//! - SHA-256 anchoring of the raw response for tamper detection
//! - An explicit confidence per item, taken from the collaborator when it
//!   reports one, otherwise a fixed per-source default
//!
//! Normalization allocates the item and nothing else; there is no I/O here.

use crate::{BrandTraceError, BrandTraceResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

// ─── Source ────────────────────────────────────────────────────────

/// Which collaborator produced a piece of evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EvidenceSource {
    ContentScrape,
    Screenshot,
    ImageComparison,
    DomainRecord,
    DnsRecord,
}

impl EvidenceSource {
    pub const ALL: [EvidenceSource; 5] = [
        Self::ContentScrape,
        Self::Screenshot,
        Self::ImageComparison,
        Self::DomainRecord,
        Self::DnsRecord,
    ];

    /// Confidence used when the collaborator reports no certainty of its own.
    /// `None` means the source must always report one.
    pub fn default_confidence(&self) -> Option<f64> {
        match self {
            Self::ContentScrape => Some(0.7),
            Self::Screenshot => None,
            Self::ImageComparison => Some(0.8),
            Self::DomainRecord => Some(0.9),
            Self::DnsRecord => Some(0.9),
        }
    }

    /// Fields that must be present in the raw response (nullable or not)
    fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::ContentScrape => &["markdown", "html", "screenshot_refs"],
            Self::Screenshot => &["description", "brand_markers", "confidence"],
            Self::ImageComparison => &["similarity"],
            Self::DomainRecord => &["registrar", "creation_date", "privacy_shielded"],
            Self::DnsRecord => &["A", "MX", "TXT"],
        }
    }
}

impl std::fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContentScrape => write!(f, "ContentScrape"),
            Self::Screenshot => write!(f, "Screenshot"),
            Self::ImageComparison => write!(f, "ImageComparison"),
            Self::DomainRecord => write!(f, "DomainRecord"),
            Self::DnsRecord => write!(f, "DNSRecord"),
        }
    }
}

// ─── Payload ───────────────────────────────────────────────────────

/// Normalized, source-specific content of an evidence item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidencePayload {
    Content {
        url: Option<String>,
        /// Case-insensitive occurrences of the brand name in the markdown
        brand_mentions: usize,
        /// Similarity reported by the collaborator, if any
        reported_similarity: Option<f64>,
        markdown_sha256: String,
        screenshot_refs: Vec<String>,
    },
    Screenshot {
        image: Option<String>,
        description: String,
        brand_markers: Vec<String>,
    },
    ImageComparison {
        reference: Option<String>,
        candidate: Option<String>,
        similarity: f64,
    },
    DomainRecord {
        domain: Option<String>,
        registrar: Option<String>,
        creation_date: Option<String>,
        privacy_shielded: bool,
    },
    DnsRecord {
        domain: Option<String>,
        a: Vec<String>,
        mx: Vec<String>,
        txt: Vec<String>,
    },
}

// ─── Item ──────────────────────────────────────────────────────────

/// One normalized unit of signal. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    source: EvidenceSource,
    confidence: f64,
    signal: f64,
    payload: EvidencePayload,
    sha256: String,
    collected_at: DateTime<Utc>,
}

impl EvidenceItem {
    pub fn source(&self) -> EvidenceSource {
        self.source
    }

    /// Certainty in [0, 1] attached by the collaborator (or the source default)
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Suspicion signal in [0, 1] this item contributes to its category
    pub fn signal(&self) -> f64 {
        self.signal
    }

    pub fn payload(&self) -> &EvidencePayload {
        &self.payload
    }

    /// SHA-256 of the canonical raw response
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn collected_at(&self) -> DateTime<Utc> {
        self.collected_at
    }
}

// ─── Raw response shapes ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawScrape {
    markdown: String,
    html: String,
    screenshot_refs: Vec<String>,
    url: Option<String>,
    similarity: Option<f64>,
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawImageAnalysis {
    description: String,
    brand_markers: Vec<String>,
    confidence: f64,
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawComparison {
    similarity: f64,
    reference: Option<String>,
    candidate: Option<String>,
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawWhois {
    registrar: Option<String>,
    creation_date: Option<String>,
    privacy_shielded: bool,
    domain: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDns {
    #[serde(rename = "A")]
    a: Vec<String>,
    #[serde(rename = "MX")]
    mx: Vec<String>,
    #[serde(rename = "TXT")]
    txt: Vec<String>,
    domain: Option<String>,
}

// ─── Collector ─────────────────────────────────────────────────────

/// Normalizes raw collaborator output for one brand
#[derive(Debug, Clone)]
pub struct EvidenceCollector {
    brand: String,
}

impl EvidenceCollector {
    pub fn new(brand: impl Into<String>) -> Self {
        Self {
            brand: brand.into(),
        }
    }

    pub fn brand(&self) -> &str {
        &self.brand
    }

    /// Normalize one raw response declared as coming from `source`
    pub fn normalize(&self, raw: &Value, source: EvidenceSource) -> BrandTraceResult<EvidenceItem> {
        let object = raw
            .as_object()
            .ok_or_else(|| BrandTraceError::malformed(source, "response is not a JSON object"))?;
        for field in source.required_fields() {
            if !object.contains_key(*field) {
                return Err(BrandTraceError::malformed(
                    source,
                    format!("missing required field '{}'", field),
                ));
            }
        }

        let (payload, signal, reported_confidence) = match source {
            EvidenceSource::ContentScrape => {
                let r: RawScrape = parse(raw, source)?;
                if let Some(s) = r.similarity {
                    check_unit(source, "similarity", s)?;
                }
                let brand_mentions = count_mentions(&r.markdown, &self.brand);
                let signal = r.similarity.unwrap_or_else(|| mention_signal(brand_mentions));
                tracing::debug!(
                    "Scrape evidence: {} mentions, {} bytes html, {} screenshots",
                    brand_mentions,
                    r.html.len(),
                    r.screenshot_refs.len()
                );
                let payload = EvidencePayload::Content {
                    url: r.url,
                    brand_mentions,
                    reported_similarity: r.similarity,
                    markdown_sha256: hex::encode(Sha256::digest(r.markdown.as_bytes())),
                    screenshot_refs: r.screenshot_refs,
                };
                (payload, signal, r.confidence)
            }
            EvidenceSource::Screenshot => {
                let r: RawImageAnalysis = parse(raw, source)?;
                check_unit(source, "confidence", r.confidence)?;
                let signal = if r.brand_markers.is_empty() { 0.0 } else { r.confidence };
                let payload = EvidencePayload::Screenshot {
                    image: r.image,
                    description: r.description,
                    brand_markers: r.brand_markers,
                };
                (payload, signal, Some(r.confidence))
            }
            EvidenceSource::ImageComparison => {
                let r: RawComparison = parse(raw, source)?;
                check_unit(source, "similarity", r.similarity)?;
                let payload = EvidencePayload::ImageComparison {
                    reference: r.reference,
                    candidate: r.candidate,
                    similarity: r.similarity,
                };
                (payload, r.similarity, r.confidence)
            }
            EvidenceSource::DomainRecord => {
                let r: RawWhois = parse(raw, source)?;
                let registrar = r.registrar.filter(|s| !s.trim().is_empty());
                let creation_date = r.creation_date.filter(|s| !s.trim().is_empty());
                let signal = opacity_signal(r.privacy_shielded, registrar.is_none(), creation_date.is_none());
                let payload = EvidencePayload::DomainRecord {
                    domain: r.domain,
                    registrar,
                    creation_date,
                    privacy_shielded: r.privacy_shielded,
                };
                (payload, signal, None)
            }
            EvidenceSource::DnsRecord => {
                let r: RawDns = parse(raw, source)?;
                // Appendix only: a site that resolves but takes no mail is a common throwaway pattern
                let signal = if !r.a.is_empty() && r.mx.is_empty() { 0.3 } else { 0.1 };
                let payload = EvidencePayload::DnsRecord {
                    domain: r.domain,
                    a: r.a,
                    mx: r.mx,
                    txt: r.txt,
                };
                (payload, signal, None)
            }
        };

        let confidence = match reported_confidence {
            Some(c) => {
                check_unit(source, "confidence", c)?;
                c
            }
            None => source.default_confidence().ok_or_else(|| {
                BrandTraceError::malformed(source, "collaborator reported no confidence")
            })?,
        };

        Ok(EvidenceItem {
            source,
            confidence,
            signal: signal.clamp(0.0, 1.0),
            payload,
            sha256: hash_raw(raw),
            collected_at: Utc::now(),
        })
    }
}

fn parse<T: serde::de::DeserializeOwned>(raw: &Value, source: EvidenceSource) -> BrandTraceResult<T> {
    serde_json::from_value(raw.clone()).map_err(|e| BrandTraceError::malformed(source, e.to_string()))
}

fn check_unit(source: EvidenceSource, field: &str, value: f64) -> BrandTraceResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(BrandTraceError::malformed(
            source,
            format!("'{}' must lie in [0, 1], got {}", field, value),
        ))
    }
}

/// serde_json maps are key-sorted, so this is stable across field order
fn hash_raw(raw: &Value) -> String {
    let bytes = serde_json::to_vec(raw).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

fn count_mentions(text: &str, brand: &str) -> usize {
    let needle = brand.trim().to_lowercase();
    if needle.is_empty() {
        return 0;
    }
    text.to_lowercase().matches(needle.as_str()).count()
}

/// Conservative ladder: even heavy name-dropping caps at 0.7 without a
/// reported similarity.
pub fn mention_signal(mentions: usize) -> f64 {
    match mentions {
        0 => 0.0,
        1 => 0.1,
        2..=4 => 0.2,
        5..=9 => 0.35,
        10..=24 => 0.5,
        _ => 0.7,
    }
}

fn opacity_signal(privacy_shielded: bool, registrar_missing: bool, creation_missing: bool) -> f64 {
    let mut signal: f64 = 0.1;
    if privacy_shielded {
        signal = signal.max(0.9);
    }
    if registrar_missing {
        signal = signal.max(0.6);
    }
    if creation_missing {
        signal = signal.max(0.4);
    }
    signal
}
