//! Runs a variant over every configured credential setting
//!
//! Settings are processed one after another. Each iteration opens its log,
//! scans it to the terminal marker, folds it into the aggregator and closes
//! the file before the next setting starts.

use crate::aggregate::{Aggregator, SettingKey};
use crate::apdu::CommandBreakdown;
use crate::error::{CardlogError, Result};
use crate::extract::{ExtractStats, PhaseExtractor, ScanOutcome};
use crate::scanner::LineScanner;
use crate::variant::Variant;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Where logs live and how to treat missing ones
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dir: PathBuf,
    /// Warn and continue instead of failing when a setting's log is missing
    pub skip_missing: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            skip_missing: false,
        }
    }
}

/// What the scan of one setting's log produced
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub log: PathBuf,
    pub outcome: ScanOutcome,
    pub stats: ExtractStats,
}

/// Everything a report needs
#[derive(Debug, Clone)]
pub struct RunResult {
    pub variant: Variant,
    pub aggregator: Aggregator,
    pub scans: BTreeMap<SettingKey, ScanSummary>,
    pub missing: Vec<SettingKey>,
    pub breakdown: CommandBreakdown,
}

/// Scan, aggregate and average every setting of a variant
pub fn run_variant(variant: &Variant, options: &RunOptions) -> Result<RunResult> {
    variant.validate()?;
    let extractor = PhaseExtractor::new(variant)?;

    let mut aggregator = Aggregator::new(variant.averaging);
    let mut breakdown = CommandBreakdown::new();
    let mut scans = BTreeMap::new();
    let mut missing = Vec::new();

    // Repeats would scan the same log twice into one cell
    let settings: BTreeSet<SettingKey> = variant.settings.iter().copied().collect();
    for setting in settings {
        let path = variant.log_path(&options.dir, setting);
        let mut scanner = match LineScanner::open(&path) {
            Ok(scanner) => scanner,
            Err(CardlogError::FileNotFound { path }) if options.skip_missing => {
                tracing::warn!("Skipping setting {}: {} not found", setting, path.display());
                missing.push(setting);
                continue;
            }
            Err(e) => return Err(e),
        };

        let extraction = extractor.extract(&mut scanner)?;
        drop(scanner);

        tracing::info!(
            "Setting {}: {} rounds, {} commands from {}",
            setting,
            extraction.stats.rounds,
            extraction.stats.commands,
            path.display()
        );

        aggregator.ingest(setting, &extraction);
        aggregator.finalize_averages(setting);
        breakdown.ingest(setting, &extraction);
        scans.insert(
            setting,
            ScanSummary {
                log: path,
                outcome: extraction.outcome,
                stats: extraction.stats,
            },
        );
    }

    Ok(RunResult {
        variant: variant.clone(),
        aggregator,
        scans,
        missing,
        breakdown,
    })
}
