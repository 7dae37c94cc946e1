//! Text and JSON rendering of a run
//!
//! The text form mirrors what the benchmark write-up pastes into LaTeX: a
//! dump of the mappings followed by one `&`-separated table per bucket,
//! every row ending in `\\hline`.

use crate::aggregate::{Cell, CellAverage, Measure, RoundKey, SettingKey, Table};
use crate::apdu::{CommandStats, Instruction};
use crate::extract::{ExtractStats, ScanOutcome};
use crate::pipeline::RunResult;
use crate::variant::{Averaging, ColumnRange, Phase};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::PathBuf;

/// Row terminator of the LaTeX tables
pub const ROW_SEPARATOR: &str = "\\\\hline";

/// `Label: {1: {0: 12.5}, ...}` in ascending key order
pub fn render_dump<V: Debug>(label: &str, table: &Table<V>) -> String {
    format!("{}: {:?}\n", label, table)
}

/// Fixed-column table of truncated integer values
///
/// One row per setting, one `&`-separated cell per column right-justified
/// to width 3. Absent cells are blank with the same width.
pub fn render_table(table: &Table<f64>, columns: ColumnRange) -> String {
    let mut out = String::new();
    for col in columns.iter() {
        out.push_str(&format!("  &  {}", col));
    }
    out.push_str(&format!("  {}\n", ROW_SEPARATOR));

    for (setting, rounds) in table {
        out.push_str(&setting.to_string());
        for col in columns.iter() {
            match rounds.get(&col) {
                Some(value) => out.push_str(&format!(" & {:>3}", value.trunc() as i64)),
                None => out.push_str(" &    "),
            }
        }
        out.push_str(&format!(" {}\n", ROW_SEPARATOR));
    }
    out
}

/// Full plain-text report
pub fn render_text(result: &RunResult, by_command: bool) -> String {
    let variant = &result.variant;
    let agg = &result.aggregator;
    let mut out = String::new();

    match variant.phase {
        Phase::Issuance => {
            let flat = |m: Measure| -> BTreeMap<SettingKey, u64> {
                agg.raw_table(m)
                    .into_iter()
                    .map(|(s, rounds)| (s, rounds.values().sum()))
                    .collect()
            };
            out.push_str(&format!("Total: {:?}\n", flat(Measure::Total)));
            out.push_str(&format!(
                "{}: {:?}\n",
                variant.protocol_label,
                flat(Measure::Protocol)
            ));
            out.push_str(&format!(
                "{}: {:?}\n",
                variant.overhead_label,
                flat(Measure::Overhead)
            ));
        }
        Phase::Presentation => {
            let sections = [
                ("Total", agg.average_table(Measure::Total)),
                (
                    variant.protocol_label.as_str(),
                    agg.average_table(Measure::Protocol),
                ),
                (
                    variant.overhead_label.as_str(),
                    agg.average_table(Measure::Overhead),
                ),
            ];

            out.push_str(&render_dump(sections[0].0, &sections[0].1));
            out.push_str(&render_dump("Count", &agg.count_table()));
            for (label, table) in &sections[1..] {
                out.push_str(&render_dump(label, table));
            }

            for (label, table) in &sections {
                out.push_str(&format!("\n\n{}:\n", label));
                out.push_str(&render_table(table, variant.columns));
            }
        }
    }

    if !result.missing.is_empty() {
        out.push_str(&format!("\nMissing settings: {:?}\n", result.missing));
    }

    if by_command {
        out.push_str("\n\nPer-instruction breakdown:\n");
        out.push_str(&result.breakdown.render());
    }

    out
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    variant: &'a str,
    phase: Phase,
    averaging: Averaging,
    settings: BTreeMap<SettingKey, JsonSetting<'a>>,
    missing: &'a [SettingKey],
    #[serde(skip_serializing_if = "Option::is_none")]
    commands: Option<BTreeMap<SettingKey, Vec<JsonCommand>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    undecodable_commands: Option<u64>,
}

#[derive(Debug, Serialize)]
struct JsonSetting<'a> {
    log: Option<&'a PathBuf>,
    outcome: Option<ScanOutcome>,
    stats: Option<&'a ExtractStats>,
    rounds: BTreeMap<RoundKey, JsonRound>,
}

#[derive(Debug, Serialize)]
struct JsonRound {
    #[serde(flatten)]
    raw: Cell,
    total_ms: u64,
    average: Option<CellAverage>,
}

#[derive(Debug, Serialize)]
struct JsonCommand {
    cla: u8,
    ins: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'static str>,
    #[serde(flatten)]
    stats: CommandStats,
}

impl JsonCommand {
    fn new(ins: &Instruction, stats: &CommandStats) -> Self {
        Self {
            cla: ins.cla,
            ins: ins.ins,
            name: ins.name(),
            stats: *stats,
        }
    }
}

/// Machine-readable report
pub fn render_json(result: &RunResult, by_command: bool) -> serde_json::Result<String> {
    let agg = &result.aggregator;

    let settings = agg
        .cells()
        .iter()
        .map(|(&setting, cells)| {
            let scan = result.scans.get(&setting);
            let rounds = cells
                .iter()
                .map(|(&round, cell)| {
                    (
                        round,
                        JsonRound {
                            raw: *cell,
                            total_ms: cell.total_ms(),
                            average: agg.average(setting, round).copied(),
                        },
                    )
                })
                .collect();
            (
                setting,
                JsonSetting {
                    log: scan.map(|s| &s.log),
                    outcome: scan.map(|s| s.outcome),
                    stats: scan.map(|s| &s.stats),
                    rounds,
                },
            )
        })
        .collect();

    let commands = by_command.then(|| {
        result
            .breakdown
            .settings()
            .iter()
            .map(|(&setting, cmds)| {
                (
                    setting,
                    cmds.iter()
                        .map(|(ins, stats)| JsonCommand::new(ins, stats))
                        .collect(),
                )
            })
            .collect()
    });

    let report = JsonReport {
        variant: &result.variant.name,
        phase: result.variant.phase,
        averaging: result.variant.averaging,
        settings,
        missing: &result.missing,
        commands,
        undecodable_commands: by_command.then(|| result.breakdown.undecodable()),
    };
    serde_json::to_string_pretty(&report)
}
