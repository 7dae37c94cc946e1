//! Log variants: markers, whitelists and averaging policy as data
//!
//! Each benchmark script flavour differs only in which commands count as
//! protocol work, which file names it reads and how it averages. A
//! [`Variant`] captures those knobs so a new log flavour is a few lines of
//! TOML rather than a new scan loop.
//!
//! # Example cardlog.toml
//!
//! ```toml
//! [[variant]]
//! name = "presentation-sle66"
//! platform = "sle66"
//! command_scope = "802"
//! protocol_codes = ["8022"]
//!
//! [[variant]]
//! name = "fixed-0.4"
//! ratio = "0.4"
//! bare_durations = "overhead"
//! averaging = { fixed = 50 }
//! ```

use crate::aggregate::Bucket;
use crate::error::{CardlogError, Result as CardlogResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Which part of the log a variant measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Everything before the presentation marker, as one block per file
    Issuance,
    /// Disclosure rounds between the presentation and completion markers
    #[default]
    Presentation,
}

/// What to do with a duration line that has no command line in front of it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BareDurations {
    /// Count it as transfer overhead
    Overhead,
    /// Discard it
    #[default]
    Ignore,
}

/// Divisor used when averaging a round's accumulated time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Averaging {
    /// Divide by the number of times the round was entered
    #[default]
    Observed,
    /// Divide by a constant number of repetitions
    Fixed(u32),
}

/// Inclusive range of disclosed-attribute counts shown as table columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRange {
    pub first: u32,
    pub last: u32,
}

impl Default for ColumnRange {
    fn default() -> Self {
        Self { first: 0, last: 5 }
    }
}

impl ColumnRange {
    pub fn iter(&self) -> impl Iterator<Item = u32> {
        self.first..=self.last
    }
}

/// Substrings that identify the interesting lines of a log
///
/// Matching is byte-for-byte substring search, same as the benchmark
/// tooling expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Markers {
    pub presenting: String,
    pub disclosing: String,
    pub completed: String,
    pub proof_specification: String,
    pub command: String,
    pub duration: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            presenting: "### Presenting".to_string(),
            disclosing: "### Disclosing".to_string(),
            completed: "completed successfully".to_string(),
            proof_specification: "Proof Specification".to_string(),
            command: "C: ".to_string(),
            duration: " duration:".to_string(),
        }
    }
}

/// A configured log flavour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Variant {
    pub name: String,
    pub phase: Phase,
    /// File name pattern; `{setting}`, `{ratio}` and `{platform}` are substituted
    pub file_template: String,
    pub ratio: String,
    pub platform: String,
    /// Credential counts to process, in order
    pub settings: Vec<u32>,
    /// Only commands whose code starts with this prefix are recorded; `""` or none admits all
    pub command_scope: Option<String>,
    /// Command-code prefixes that count as protocol work
    pub protocol_codes: Vec<String>,
    pub bare_durations: BareDurations,
    pub averaging: Averaging,
    pub columns: ColumnRange,
    pub protocol_label: String,
    pub overhead_label: String,
    pub markers: Markers,
}

impl Default for Variant {
    fn default() -> Self {
        Self {
            name: "presentation".to_string(),
            phase: Phase::Presentation,
            file_template: "run-{setting}cred-{ratio}-{platform}.log".to_string(),
            ratio: "0.6".to_string(),
            platform: "sle78".to_string(),
            settings: vec![1, 2, 3, 4, 5],
            command_scope: Some("802".to_string()),
            protocol_codes: vec!["8022".to_string()],
            bare_durations: BareDurations::Ignore,
            averaging: Averaging::Observed,
            columns: ColumnRange::default(),
            protocol_label: "Proof generation".to_string(),
            overhead_label: "Transfer overhead".to_string(),
            markers: Markers::default(),
        }
    }
}

impl Variant {
    /// Issuance timing: commands before the presentation marker
    pub fn issuance() -> Self {
        Self {
            name: "issuance".to_string(),
            phase: Phase::Issuance,
            command_scope: Some("801".to_string()),
            protocol_codes: vec![
                "8016".to_string(),
                "801903".to_string(),
                "801A02".to_string(),
            ],
            protocol_label: "Protocol execution".to_string(),
            ..Self::default()
        }
    }

    /// Presentation rounds with the 8022 proof command as protocol work
    pub fn presentation() -> Self {
        Self::default()
    }

    /// Presentation rounds on the ISO class command set
    pub fn presentation_iso() -> Self {
        Self {
            name: "presentation-iso".to_string(),
            command_scope: None,
            protocol_codes: vec!["0021".to_string()],
            ..Self::default()
        }
    }

    /// Fixed disclosure percentage runs: untagged durations, 50 repetitions each
    pub fn fixed_disclosure() -> Self {
        Self {
            name: "fixed-disclosure".to_string(),
            ratio: "0.2".to_string(),
            command_scope: None,
            protocol_codes: Vec::new(),
            bare_durations: BareDurations::Overhead,
            averaging: Averaging::Fixed(50),
            ..Self::default()
        }
    }

    /// Check the variant for values that cannot produce a report
    pub fn validate(&self) -> CardlogResult<()> {
        if self.name.trim().is_empty() {
            return Err(CardlogError::InvalidConfig(
                "variant name must not be empty".to_string(),
            ));
        }
        if self.settings.is_empty() {
            return Err(CardlogError::InvalidConfig(format!(
                "variant '{}' has no settings",
                self.name
            )));
        }
        if self.averaging == Averaging::Fixed(0) {
            return Err(CardlogError::InvalidConfig(format!(
                "variant '{}' uses a fixed divisor of 0",
                self.name
            )));
        }
        if self.columns.first > self.columns.last {
            return Err(CardlogError::InvalidConfig(format!(
                "variant '{}' has column range {}..{}",
                self.name, self.columns.first, self.columns.last
            )));
        }
        if !self.file_template.contains("{setting}") {
            return Err(CardlogError::InvalidConfig(format!(
                "variant '{}' file_template lacks {{setting}}",
                self.name
            )));
        }
        let m = &self.markers;
        for (field, value) in [
            ("presenting", &m.presenting),
            ("disclosing", &m.disclosing),
            ("completed", &m.completed),
            ("command", &m.command),
            ("duration", &m.duration),
        ] {
            if value.is_empty() {
                return Err(CardlogError::InvalidConfig(format!(
                    "variant '{}' has an empty {} marker",
                    self.name, field
                )));
            }
        }
        Ok(())
    }

    /// Log file for one credential setting
    pub fn log_path(&self, dir: &Path, setting: u32) -> PathBuf {
        let file = self
            .file_template
            .replace("{setting}", &setting.to_string())
            .replace("{ratio}", &self.ratio)
            .replace("{platform}", &self.platform);
        dir.join(file)
    }

    /// Whether a command code belongs to the measured command family
    pub fn in_scope(&self, code: &str) -> bool {
        match &self.command_scope {
            None => true,
            Some(prefix) => has_prefix(code, prefix),
        }
    }

    /// Bucket a command's duration by its code
    pub fn bucket_for(&self, code: &str) -> Bucket {
        if self.protocol_codes.iter().any(|p| has_prefix(code, p)) {
            Bucket::Protocol
        } else {
            Bucket::Overhead
        }
    }
}

fn has_prefix(code: &str, prefix: &str) -> bool {
    code.len() >= prefix.len()
        && code.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Root of a cardlog.toml file
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct VariantConfig {
    #[serde(default)]
    pub variant: Vec<Variant>,
}

/// Known variants by name
#[derive(Debug, Clone)]
pub struct VariantSet {
    variants: BTreeMap<String, Variant>,
}

impl VariantSet {
    /// The variants every installation knows about
    pub fn builtin() -> Self {
        let variants = [
            Variant::issuance(),
            Variant::presentation(),
            Variant::presentation_iso(),
            Variant::fixed_disclosure(),
        ]
        .into_iter()
        .map(|v| (v.name.clone(), v))
        .collect();
        Self { variants }
    }

    /// Built-in variants plus those from a TOML file; file entries win on name clashes
    pub fn with_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut set = Self::builtin();
        set.merge_toml_str(&content)
            .with_context(|| format!("Invalid variant file {}", path.display()))?;
        Ok(set)
    }

    /// Merge `[[variant]]` tables from TOML content
    pub fn merge_toml_str(&mut self, content: &str) -> Result<()> {
        let config: VariantConfig = toml::from_str(content).context("Failed to parse TOML")?;
        for variant in config.variant {
            variant.validate()?;
            if self.variants.contains_key(&variant.name) {
                tracing::debug!("Variant '{}' overridden by config", variant.name);
            }
            self.variants.insert(variant.name.clone(), variant);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> CardlogResult<&Variant> {
        self.variants
            .get(name)
            .ok_or_else(|| CardlogError::UnknownVariant(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variant> {
        self.variants.values()
    }
}

/// Widest range a settings list may name
pub const MAX_SETTINGS_SPAN: u32 = 1024;

/// Parse a settings list such as `1-5`, `1,2,4` or `2,4-5`
///
/// The result is sorted and free of repeats.
pub fn parse_settings(spec: &str) -> CardlogResult<Vec<u32>> {
    let invalid = || CardlogError::InvalidSettings(spec.to_string());
    let mut settings = BTreeSet::new();

    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(invalid());
        }
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: u32 = lo.trim().parse().map_err(|_| invalid())?;
                let hi: u32 = hi.trim().parse().map_err(|_| invalid())?;
                if lo > hi || hi - lo >= MAX_SETTINGS_SPAN {
                    return Err(invalid());
                }
                settings.extend(lo..=hi);
            }
            None => {
                settings.insert(part.parse().map_err(|_| invalid())?);
            }
        }
    }

    Ok(settings.into_iter().collect())
}
