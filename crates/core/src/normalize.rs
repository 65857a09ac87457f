use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::similarity::{LevenshteinRatio, Similarity};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse normalizer config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Alias entry has an empty canonical name")]
    EmptyCanonical,
    #[error("Fuzzy threshold must be within 0.0..=1.0, got {0}")]
    InvalidThreshold(f32),
}

/// A canonical label and the variant spellings that resolve to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub canonical: String,
    #[serde(default)]
    pub variants: Vec<String>,
    /// Region the canonical branch rolls up into.
    #[serde(default)]
    pub region: Option<String>,
}

impl AliasEntry {
    pub fn new(canonical: &str, variants: &[&str], region: Option<&str>) -> Self {
        Self {
            canonical: canonical.to_string(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
            region: region.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderReplacement {
    pub from: String,
    pub to: String,
}

/// Read-only tables driving label and header normalization.
///
/// Order is significant everywhere: aliases, prefixes, separators and header
/// replacements are all applied first-match-wins in declared order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerConfig {
    #[serde(default)]
    pub aliases: Vec<AliasEntry>,
    #[serde(default = "default_prefixes")]
    pub prefixes: Vec<String>,
    #[serde(default = "default_separators")]
    pub separators: Vec<String>,
    #[serde(default = "default_header_replacements")]
    pub header_replacements: Vec<HeaderReplacement>,
    /// Enables fuzzy matching against canonical names when set.
    #[serde(default)]
    pub fuzzy_threshold: Option<f32>,
}

fn default_prefixes() -> Vec<String> {
    ["BR-", "BR.", "BRANCH-", "BRANCH :", "RO-", "SSML-", "SSML "]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_separators() -> Vec<String> {
    [" - ", "-", ":"].iter().map(|s| s.to_string()).collect()
}

fn default_header_replacements() -> Vec<HeaderReplacement> {
    [
        ("ACTUAL", "Act"),
        ("BUDGET", "Bgt"),
        ("ACHIEVEMENT", "Ach"),
        ("GROWTH", "Gr"),
        ("LAST YEAR", "LY"),
        ("OUTSTANDING", "OS"),
    ]
    .iter()
    .map(|(from, to)| HeaderReplacement {
        from: from.to_string(),
        to: to.to_string(),
    })
    .collect()
}

fn default_aliases() -> Vec<AliasEntry> {
    vec![
        AliasEntry::new("CHENNAI", &["MADRAS", "CHENNAI"], Some("NORTH")),
        AliasEntry::new("VELLORE", &["VELLORE", "VLR"], Some("NORTH")),
        AliasEntry::new("PUDUCHERRY", &["PONDY", "PONDICHERRY", "PUDUCHERRY"], Some("NORTH")),
        AliasEntry::new("SALEM", &["SALEM"], Some("WEST")),
        AliasEntry::new("ERODE", &["ERODE"], Some("WEST")),
        AliasEntry::new("COIMBATORE", &["COIMBATORE", "CBE", "COVAI", "KOVAI"], Some("WEST")),
        AliasEntry::new("TIRUPPUR", &["TIRUPPUR", "TIRUPUR", "TPR"], Some("WEST")),
        AliasEntry::new("TIRUCHIRAPPALLI", &["TRICHY", "TRICHI", "TIRUCHY", "TIRUCHIRAPALLI"], Some("SOUTH")),
        AliasEntry::new("MADURAI", &["MADURAI", "MDU"], Some("SOUTH")),
        AliasEntry::new("TIRUNELVELI", &["TIRUNELVELI", "NELLAI", "TVL"], Some("SOUTH")),
    ]
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            aliases: default_aliases(),
            prefixes: default_prefixes(),
            separators: default_separators(),
            header_replacements: default_header_replacements(),
            fuzzy_threshold: None,
        }
    }
}

impl NormalizerConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: NormalizerConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aliases.iter().any(|a| a.canonical.trim().is_empty()) {
            return Err(ConfigError::EmptyCanonical);
        }
        if let Some(t) = self.fuzzy_threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(ConfigError::InvalidThreshold(t));
            }
        }
        Ok(())
    }

    /// Pairs `(earlier, later)` of canonical names where a variant of the earlier entry
    /// occurs inside a variant of the later one, so the later entry can be shadowed.
    ///
    /// Resolution is not changed by this; it only reports.
    pub fn overlapping_aliases(&self) -> Vec<(String, String)> {
        let mut overlaps = Vec::new();
        for (i, earlier) in self.aliases.iter().enumerate() {
            for later in &self.aliases[i + 1..] {
                let shadows = earlier.variants.iter().any(|e| {
                    let e = e.to_uppercase();
                    later
                        .variants
                        .iter()
                        .chain(std::iter::once(&later.canonical))
                        .any(|l| l.to_uppercase().contains(&e))
                });
                if shadows {
                    overlaps.push((earlier.canonical.clone(), later.canonical.clone()));
                }
            }
        }
        overlaps
    }
}

/// Which rule produced a normalized label.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "rule", content = "label", rename_all = "snake_case")]
pub enum Resolution {
    Dropped,
    Alias(String),
    Fuzzy(String),
    Prefix(String),
    Separator(String),
    Fallback(String),
}

impl Resolution {
    pub fn label(&self) -> Option<&str> {
        match self {
            Resolution::Dropped => None,
            Resolution::Alias(s)
            | Resolution::Fuzzy(s)
            | Resolution::Prefix(s)
            | Resolution::Separator(s)
            | Resolution::Fallback(s) => Some(s),
        }
    }

    pub fn into_label(self) -> Option<String> {
        match self {
            Resolution::Dropped => None,
            Resolution::Alias(s)
            | Resolution::Fuzzy(s)
            | Resolution::Prefix(s)
            | Resolution::Separator(s)
            | Resolution::Fallback(s) => Some(s),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolution::Fallback(_))
    }
}

/// Internal alias entry with uppercased lookup keys.
struct CompiledAlias {
    canonical: String,
    variants: Vec<String>,
    region: Option<String>,
}

/// Maps noisy branch/region/column labels onto canonical forms.
///
/// Immutable after construction and safe to share across threads.
pub struct LabelNormalizer {
    aliases: Vec<CompiledAlias>,
    prefixes: Vec<String>,
    separators: Vec<String>,
    header_replacements: Vec<HeaderReplacement>,
    fuzzy_threshold: Option<f32>,
    similarity: Box<dyn Similarity>,
}

impl Default for LabelNormalizer {
    fn default() -> Self {
        Self::new(NormalizerConfig::default())
    }
}

impl std::fmt::Debug for LabelNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelNormalizer")
            .field("aliases", &self.aliases.len())
            .field("fuzzy_threshold", &self.fuzzy_threshold)
            .finish()
    }
}

impl LabelNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self::with_similarity(config, LevenshteinRatio)
    }

    pub fn with_similarity(config: NormalizerConfig, similarity: impl Similarity + 'static) -> Self {
        let aliases = config
            .aliases
            .into_iter()
            .map(|a| CompiledAlias {
                canonical: a.canonical.trim().to_uppercase(),
                variants: a
                    .variants
                    .iter()
                    .map(|v| v.trim().to_uppercase())
                    .filter(|v| !v.is_empty())
                    .collect(),
                region: a.region.map(|r| r.trim().to_uppercase()),
            })
            .collect();
        Self {
            aliases,
            prefixes: config.prefixes.iter().map(|p| p.to_uppercase()).collect(),
            separators: config.separators.into_iter().filter(|s| !s.is_empty()).collect(),
            header_replacements: config.header_replacements,
            fuzzy_threshold: config.fuzzy_threshold,
            similarity: Box::new(similarity),
        }
    }

    /// Canonical label for `raw`, or `None` when the row should be dropped.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        self.resolve(raw).into_label()
    }

    /// Runs the rule pipeline and reports which rule fired.
    ///
    /// Rules are tried in order: blank and head-office labels are dropped, then alias
    /// lookup, then fuzzy matching against canonical names (only when a threshold is
    /// configured), then prefix stripping, then separator splitting. A label no rule
    /// claims falls back to its trimmed uppercase form.
    pub fn resolve(&self, raw: &str) -> Resolution {
        let label = raw.trim().to_uppercase();
        if label.is_empty() {
            return Resolution::Dropped;
        }

        // Head office rows never belong in branch-level output.
        if label == "HO" || label.ends_with("-HO") {
            return Resolution::Dropped;
        }

        if let Some(canonical) = self.lookup_alias(&label) {
            return Resolution::Alias(canonical.to_string());
        }

        if let Some(canonical) = self.fuzzy_match(&label) {
            return Resolution::Fuzzy(canonical.to_string());
        }

        if let Some(rest) = self
            .prefixes
            .iter()
            .find_map(|p| label.strip_prefix(p.as_str()))
            .map(str::trim)
            .filter(|rest| !rest.is_empty())
        {
            return Resolution::Prefix(rest.to_string());
        }

        // Separators are tried in priority order, not by position in the label.
        if let Some(sep) = self.separators.iter().find(|s| label.contains(s.as_str())) {
            if let Some((_, after)) = label.rsplit_once(sep.as_str()) {
                let after = after.trim();
                if !after.is_empty() {
                    return Resolution::Separator(after.to_string());
                }
            }
        }

        Resolution::Fallback(label)
    }

    /// Trims, uppercases and compresses a column header into its short code.
    pub fn normalize_header(&self, raw: &str) -> String {
        self.header_replacements
            .iter()
            .fold(raw.trim().to_uppercase(), |header, r| {
                header.replace(r.from.as_str(), r.to.as_str())
            })
    }

    /// Region configured for a canonical label.
    pub fn region_of(&self, canonical: &str) -> Option<&str> {
        let canonical = canonical.trim().to_uppercase();
        self.aliases
            .iter()
            .find(|a| a.canonical == canonical)
            .and_then(|a| a.region.as_deref())
    }

    pub fn canonical_names(&self) -> impl Iterator<Item = &str> {
        self.aliases.iter().map(|a| a.canonical.as_str())
    }

    fn lookup_alias(&self, label: &str) -> Option<&str> {
        // An already-canonical label resolves to itself.
        if let Some(a) = self.aliases.iter().find(|a| a.canonical == label) {
            return Some(&a.canonical);
        }
        self.aliases
            .iter()
            .find(|a| a.variants.iter().any(|v| label.contains(v.as_str())))
            .map(|a| a.canonical.as_str())
    }

    fn fuzzy_match(&self, label: &str) -> Option<&str> {
        let threshold = self.fuzzy_threshold?;
        let mut best: Option<(&str, f32)> = None;
        for a in &self.aliases {
            let score = self.similarity.score(label, &a.canonical);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((a.canonical.as_str(), score));
            }
        }
        let (canonical, score) = best.filter(|(_, s)| *s > threshold)?;
        tracing::trace!(label, canonical, score, "fuzzy label match");
        Some(canonical)
    }
}
