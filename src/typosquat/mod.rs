//! Typosquatting variant generation and registration classification
//!
//! Generation applies a fixed catalogue of single-edit techniques in a fixed
//! order, so the same input always yields the same candidates in the same
//! order:
//! 1. Substitution against a QWERTY adjacency table
//! 2. Character omission
//! 3. Adjacent transposition
//! 4. Homoglyph substitution
//! 5. TLD swap against a short curated list
//!
//! A candidate produced by more than one technique keeps the first.
//! Classification runs registration lookups with bounded concurrency; a
//! failed or timed-out lookup is recorded as `Unknown`, never as
//! "not registered".

use crate::collectors::DomainIntelService;
use crate::config::CollectionConfig;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;
use url::Url;

/// TLDs tried by the swap technique, in order
pub const SWAP_TLDS: &[&str] = &["com", "net", "org", "co", "io", "info", "biz", "shop"];

// ─── Types ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Technique {
    Substitution,
    Omission,
    Transposition,
    Homoglyph,
    TldSwap,
}

impl std::fmt::Display for Technique {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Substitution => write!(f, "substitution"),
            Self::Omission => write!(f, "omission"),
            Self::Transposition => write!(f, "transposition"),
            Self::Homoglyph => write!(f, "homoglyph"),
            Self::TldSwap => write!(f, "tld-swap"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Not looked up yet
    Unchecked,
    Registered,
    NotRegistered,
    /// Lookup failed or timed out
    Unknown,
}

impl RegistrationStatus {
    /// `Some(bool)` only for a definite answer
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Registered => Some(true),
            Self::NotRegistered => Some(false),
            Self::Unknown | Self::Unchecked => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainVariant {
    pub candidate: String,
    pub technique: Technique,
    pub is_registered: RegistrationStatus,
    pub registrar: Option<String>,
}

impl DomainVariant {
    fn unchecked(candidate: String, technique: Technique) -> Self {
        Self {
            candidate,
            technique,
            is_registered: RegistrationStatus::Unchecked,
            registrar: None,
        }
    }
}

// ─── Edit tables ───────────────────────────────────────────────────

fn keyboard_neighbors(c: char) -> &'static str {
    match c {
        'q' => "wa",
        'w' => "qeas",
        'e' => "wrsd",
        'r' => "etdf",
        't' => "ryfg",
        'y' => "tugh",
        'u' => "yihj",
        'i' => "uojk",
        'o' => "ipkl",
        'p' => "ol",
        'a' => "qwsz",
        's' => "awedxz",
        'd' => "serfcx",
        'f' => "drtgvc",
        'g' => "ftyhbv",
        'h' => "gyujnb",
        'j' => "huikmn",
        'k' => "jiolm",
        'l' => "kop",
        'z' => "asx",
        'x' => "zsdc",
        'c' => "xdfv",
        'v' => "cfgb",
        'b' => "vghn",
        'n' => "bhjm",
        'm' => "njk",
        '1' => "2q",
        '2' => "13w",
        '3' => "24e",
        '4' => "35r",
        '5' => "46t",
        '6' => "57y",
        '7' => "68u",
        '8' => "79i",
        '9' => "80o",
        '0' => "9p",
        _ => "",
    }
}

fn homoglyphs(c: char) -> &'static [&'static str] {
    match c {
        'o' => &["0"],
        '0' => &["o"],
        'l' => &["1", "i"],
        'i' => &["1", "l"],
        '1' => &["l", "i"],
        'e' => &["3"],
        'a' => &["4"],
        's' => &["5"],
        'g' => &["9", "q"],
        'b' => &["6"],
        'm' => &["rn"],
        'w' => &["vv"],
        _ => &[],
    }
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Public suffixes registered one level below the TLD
const COMPOUND_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "com.au", "net.au", "co.nz", "co.jp", "com.br", "co.in", "com.mx",
];

/// Lowercased host of a domain or URL, without a trailing dot or a
/// leading `www.`. Bare hosts such as `acme-outlet.shop/deals` are accepted.
pub fn normalize_host(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = Url::parse(trimmed)
        .ok()
        .filter(|u| u.host_str().is_some())
        .or_else(|| Url::parse(&format!("https://{}", trimmed)).ok())?;
    let host = parsed.host_str()?.trim_end_matches('.').to_lowercase();
    let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Split a host into its registrable label and public suffix, dropping
/// subdomains: `shop.acme.co.uk` gives `("acme", "co.uk")`. IP literals
/// have no registrable label.
pub fn split_registrable(host: &str) -> Option<(String, String)> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if bare.parse::<IpAddr>().is_ok() {
        return None;
    }
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    match labels.len() {
        0 => None,
        1 => Some((labels[0].to_string(), String::new())),
        n => {
            let last_two = format!("{}.{}", labels[n - 2], labels[n - 1]);
            if n >= 3 && COMPOUND_SUFFIXES.contains(&last_two.as_str()) {
                Some((labels[n - 3].to_string(), last_two))
            } else {
                Some((labels[n - 2].to_string(), labels[n - 1].to_string()))
            }
        }
    }
}

// ─── Analyzer ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TyposquattingAnalyzer {
    concurrency: usize,
    lookup_timeout: Duration,
}

impl TyposquattingAnalyzer {
    pub fn new(config: &CollectionConfig) -> Self {
        Self {
            concurrency: config.lookup_concurrency.max(1),
            lookup_timeout: config.lookup_timeout(),
        }
    }

    /// All single-edit lookalikes of `brand_domain`, in catalogue order.
    ///
    /// Accepts a bare domain, a host with subdomains, or a full URL; edits
    /// apply to the registrable label only. Empty when no label can be
    /// derived.
    pub fn generate_variants(&self, brand_domain: &str) -> Vec<DomainVariant> {
        let (label, tld) = match normalize_host(brand_domain).as_deref().and_then(split_registrable) {
            Some(parts) => parts,
            None => {
                tracing::debug!("No registrable domain in '{}'", brand_domain);
                return Vec::new();
            }
        };
        if !is_valid_label(&label) {
            tracing::debug!("Unusable label '{}' in '{}'", label, brand_domain);
            return Vec::new();
        }
        let domain = if tld.is_empty() {
            label.clone()
        } else {
            format!("{}.{}", label, tld)
        };
        let chars: Vec<char> = label.chars().collect();

        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(domain.clone());
        let mut variants = Vec::new();

        let mut push = |candidate_label: String, tld: &str, technique: Technique| {
            if !is_valid_label(&candidate_label) {
                return;
            }
            let candidate = if tld.is_empty() {
                candidate_label
            } else {
                format!("{}.{}", candidate_label, tld)
            };
            if seen.insert(candidate.clone()) {
                variants.push(DomainVariant::unchecked(candidate, technique));
            }
        };

        for (i, &c) in chars.iter().enumerate() {
            for n in keyboard_neighbors(c).chars() {
                let mut edited = chars.clone();
                edited[i] = n;
                push(edited.into_iter().collect(), tld.as_str(), Technique::Substitution);
            }
        }

        for i in 0..chars.len() {
            let edited: String = chars
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, c)| *c)
                .collect();
            push(edited, tld.as_str(), Technique::Omission);
        }

        for i in 0..chars.len().saturating_sub(1) {
            if chars[i] == chars[i + 1] {
                continue;
            }
            let mut edited = chars.clone();
            edited.swap(i, i + 1);
            push(edited.into_iter().collect(), tld.as_str(), Technique::Transposition);
        }

        for (i, &c) in chars.iter().enumerate() {
            for glyph in homoglyphs(c) {
                let prefix: String = chars[..i].iter().collect();
                let suffix: String = chars[i + 1..].iter().collect();
                push(format!("{}{}{}", prefix, glyph, suffix), tld.as_str(), Technique::Homoglyph);
            }
        }

        if !tld.is_empty() {
            for &swap in SWAP_TLDS {
                if swap != tld {
                    push(label.clone(), swap, Technique::TldSwap);
                }
            }
        }

        tracing::debug!("Generated {} variants for {}", variants.len(), domain);
        variants
    }

    /// Look up every variant, preserving input order. Never fails as a whole.
    pub async fn classify(
        &self,
        variants: Vec<DomainVariant>,
        intel: &dyn DomainIntelService,
    ) -> Vec<DomainVariant> {
        let timeout = self.lookup_timeout;
        let classified: Vec<DomainVariant> = stream::iter(variants)
            .map(|mut variant| async move {
                match tokio::time::timeout(timeout, intel.is_registered(&variant.candidate)).await {
                    Ok(Ok(lookup)) => {
                        if lookup.registered {
                            variant.is_registered = RegistrationStatus::Registered;
                            variant.registrar = lookup.registrar;
                        } else {
                            variant.is_registered = RegistrationStatus::NotRegistered;
                        }
                    }
                    Ok(Err(e)) => {
                        tracing::warn!("Registration lookup for {} failed: {}", variant.candidate, e);
                        variant.is_registered = RegistrationStatus::Unknown;
                    }
                    Err(_) => {
                        tracing::warn!(
                            "Registration lookup for {} timed out after {}ms",
                            variant.candidate,
                            timeout.as_millis()
                        );
                        variant.is_registered = RegistrationStatus::Unknown;
                    }
                }
                variant
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let registered = registered_variants(&classified).count();
        let unknown = classified
            .iter()
            .filter(|v| v.is_registered == RegistrationStatus::Unknown)
            .count();
        tracing::info!(
            "Classified {} variants: {} registered, {} unknown",
            classified.len(),
            registered,
            unknown
        );
        classified
    }
}

impl Default for TyposquattingAnalyzer {
    fn default() -> Self {
        Self::new(&CollectionConfig::default())
    }
}

pub fn registered_variants(variants: &[DomainVariant]) -> impl Iterator<Item = &DomainVariant> {
    variants
        .iter()
        .filter(|v| v.is_registered == RegistrationStatus::Registered)
}
