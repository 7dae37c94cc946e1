//! Phase extraction: from classified lines to timed rounds
//!
//! A presentation log looks like
//!
//! ```text
//! ... issuing ...
//! ### Presenting
//! ### Disclosing 2 attributes
//! C: 802200000A...
//!  duration: 143 ms
//! C: 802B0100
//!  duration: 12 ms
//! ### Disclosing 3 attributes
//! ...
//! Verification completed successfully
//! ```
//!
//! The extractor walks it once with a small state machine
//! (`SkippingIssuance -> InPresentation -> InRound -> Terminal`) and
//! returns every round it entered with the command timings inside it.
//! Issuance variants use `InIssuance -> Terminal` instead and collect
//! everything before the presentation marker into a single round 0.

use crate::aggregate::{Bucket, RoundKey};
use crate::classify::{Classifier, LogLine};
use crate::error::Result;
use crate::scanner::LineScanner;
use crate::variant::{BareDurations, Phase, Variant};
use serde::Serialize;
use std::io::BufRead;

/// One timed command (or bare duration) inside a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimingRecord {
    /// Hex command code, `None` for bare durations
    pub command: Option<String>,
    pub duration_ms: u64,
    pub bucket: Bucket,
}

/// One entry into a disclosure round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Round {
    pub disclosed: RoundKey,
    pub records: Vec<TimingRecord>,
}

impl Round {
    fn new(disclosed: RoundKey) -> Self {
        Self {
            disclosed,
            records: Vec::new(),
        }
    }
}

/// How the scan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    /// The terminal marker was reached
    Completed,
    /// The log ended before the terminal marker
    Truncated,
}

/// Counters collected during one scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractStats {
    pub lines: u64,
    pub rounds: u64,
    pub commands: u64,
    /// Commands outside the variant's command scope
    pub skipped_commands: u64,
    /// Duration lines that did not hold an integer
    pub malformed_durations: u64,
    /// Commands not followed by a duration line
    pub missing_durations: u64,
    pub bare_durations: u64,
    /// Round markers without a readable attribute count
    pub unreadable_rounds: u64,
    pub proof_specifications: u64,
}

/// Result of scanning one log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub rounds: Vec<Round>,
    pub outcome: ScanOutcome,
    pub stats: ExtractStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtractState {
    SkippingIssuance,
    InIssuance,
    InPresentation,
    InRound,
    Terminal,
}

/// Splits a log into rounds according to a variant
#[derive(Debug, Clone)]
pub struct PhaseExtractor<'v> {
    variant: &'v Variant,
    classifier: Classifier,
}

impl<'v> PhaseExtractor<'v> {
    pub fn new(variant: &'v Variant) -> Result<Self> {
        Ok(Self {
            variant,
            classifier: Classifier::new(&variant.markers)?,
        })
    }

    /// Scan a log to its terminal marker or end of file
    ///
    /// Lines after the terminal marker are never read.
    pub fn extract<R: BufRead>(&self, scanner: &mut LineScanner<R>) -> Result<Extraction> {
        let mut rounds = Vec::new();
        let mut stats = ExtractStats::default();
        let mut state = match self.variant.phase {
            Phase::Issuance => {
                rounds.push(Round::new(0));
                ExtractState::InIssuance
            }
            Phase::Presentation => ExtractState::SkippingIssuance,
        };

        while state != ExtractState::Terminal {
            let Some(line) = scanner.next_line()? else {
                break;
            };
            stats.lines += 1;

            let tag = self.classifier.classify(&line);
            state = match (state, tag) {
                (ExtractState::SkippingIssuance, LogLine::Presenting) => {
                    tracing::debug!("Presentation starts at line {}", scanner.line_number());
                    ExtractState::InPresentation
                }
                (ExtractState::SkippingIssuance, _) => ExtractState::SkippingIssuance,

                (ExtractState::InIssuance, LogLine::Presenting) => ExtractState::Terminal,

                (
                    ExtractState::InPresentation | ExtractState::InRound,
                    LogLine::RoundStart { disclosed },
                ) => match disclosed {
                    Some(n) => {
                        tracing::debug!("Processing for number of attributes: {}", n);
                        stats.rounds += 1;
                        rounds.push(Round::new(n));
                        ExtractState::InRound
                    }
                    None => {
                        tracing::warn!(
                            "{}:{}: round marker without attribute count, skipping round",
                            scanner.origin().display(),
                            scanner.line_number()
                        );
                        stats.unreadable_rounds += 1;
                        ExtractState::InPresentation
                    }
                },
                (ExtractState::InPresentation | ExtractState::InRound, LogLine::Completed) => {
                    ExtractState::Terminal
                }
                (ExtractState::InPresentation, _) => ExtractState::InPresentation,

                (current, LogLine::Command { code }) => {
                    let code = code.to_string();
                    let record = self.read_command(scanner, code, &mut stats)?;
                    push_record(&mut rounds, record);
                    current
                }
                (current, LogLine::Duration { ms }) => {
                    stats.bare_durations += 1;
                    if self.variant.bare_durations == BareDurations::Overhead {
                        let duration_ms = self.duration_or_zero(ms, scanner, &mut stats);
                        push_record(
                            &mut rounds,
                            Some(TimingRecord {
                                command: None,
                                duration_ms,
                                bucket: Bucket::Overhead,
                            }),
                        );
                    }
                    current
                }
                (current, LogLine::ProofSpecification) => {
                    stats.proof_specifications += 1;
                    current
                }
                (current, _) => current,
            };
        }

        let outcome = if state == ExtractState::Terminal {
            ScanOutcome::Completed
        } else {
            tracing::warn!(
                "{}: log ended after {} lines without terminal marker",
                scanner.origin().display(),
                stats.lines
            );
            ScanOutcome::Truncated
        };

        Ok(Extraction {
            rounds,
            outcome,
            stats,
        })
    }

    /// Pair a command with the duration line that follows it
    ///
    /// The following line is consumed only if it is a duration line. A
    /// command without one is booked as zero.
    fn read_command<R: BufRead>(
        &self,
        scanner: &mut LineScanner<R>,
        code: String,
        stats: &mut ExtractStats,
    ) -> Result<Option<TimingRecord>> {
        let next = match scanner.peek()? {
            Some(line) => match self.classifier.classify(line) {
                LogLine::Duration { ms } => Some(ms),
                _ => None,
            },
            None => None,
        };
        if next.is_some() {
            scanner.advance();
            stats.lines += 1;
        }

        if !self.variant.in_scope(&code) {
            stats.skipped_commands += 1;
            return Ok(None);
        }
        stats.commands += 1;

        let duration_ms = match next {
            Some(ms) => self.duration_or_zero(ms, scanner, stats),
            None => {
                tracing::warn!(
                    "{}:{}: command {} has no duration line",
                    scanner.origin().display(),
                    scanner.line_number(),
                    code
                );
                stats.missing_durations += 1;
                0
            }
        };

        let bucket = self.variant.bucket_for(&code);
        Ok(Some(TimingRecord {
            command: Some(code),
            duration_ms,
            bucket,
        }))
    }

    fn duration_or_zero<R: BufRead>(
        &self,
        ms: Option<u64>,
        scanner: &LineScanner<R>,
        stats: &mut ExtractStats,
    ) -> u64 {
        ms.unwrap_or_else(|| {
            tracing::warn!(
                "{}:{}: malformed duration counted as 0",
                scanner.origin().display(),
                scanner.line_number()
            );
            stats.malformed_durations += 1;
            0
        })
    }
}

/// Records can only land in the round currently open
fn push_record(rounds: &mut [Round], record: Option<TimingRecord>) {
    if let (Some(record), Some(round)) = (record, rounds.last_mut()) {
        round.records.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn run(variant: &Variant, log: &str) -> Extraction {
        let extractor = PhaseExtractor::new(variant).unwrap();
        let mut scanner = LineScanner::new(Cursor::new(log.to_string()));
        extractor.extract(&mut scanner).unwrap()
    }

    const PRESENTATION_LOG: &str = "\
### Issuing credential
C: 8022000000
 duration: 999 ms
### Presenting
### Disclosing 2 attributes
C: 8022000010
 duration: 143 ms
C: 802B010000
 duration: 12 ms
R: 9000
### Disclosing 2 attributes
C: 8022000010
 duration: 141 ms
### Disclosing 0 attributes
Proof Specification
C: 8022000000
 duration: 90 ms
Verification completed successfully
### Disclosing 5 attributes
C: 8022000000
 duration: 1 ms
";

    #[test]
    fn test_presentation_rounds() {
        let ex = run(&Variant::presentation(), PRESENTATION_LOG);
        assert_eq!(ex.outcome, ScanOutcome::Completed);

        let disclosed: Vec<_> = ex.rounds.iter().map(|r| r.disclosed).collect();
        assert_eq!(disclosed, vec![2, 2, 0]);

        let first = &ex.rounds[0].records;
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].duration_ms, 143);
        assert_eq!(first[0].bucket, Bucket::Protocol);
        assert_eq!(first[1].duration_ms, 12);
        assert_eq!(first[1].bucket, Bucket::Overhead);

        assert_eq!(ex.stats.rounds, 3);
        assert_eq!(ex.stats.commands, 4);
        assert_eq!(ex.stats.proof_specifications, 1);
    }

    #[test]
    fn test_issuance_commands_are_discarded() {
        let ex = run(&Variant::presentation(), PRESENTATION_LOG);
        let all: Vec<u64> = ex
            .rounds
            .iter()
            .flat_map(|r| r.records.iter().map(|t| t.duration_ms))
            .collect();
        assert!(!all.contains(&999));
    }

    #[test]
    fn test_out_of_scope_command_consumes_its_duration() {
        let log = "\
### Presenting
### Disclosing 1 attributes
C: 00A4040007
 duration: 30 ms
C: 8022000000
 duration: 40 ms
completed successfully
";
        let ex = run(&Variant::presentation(), log);
        assert_eq!(ex.rounds[0].records.len(), 1);
        assert_eq!(ex.rounds[0].records[0].duration_ms, 40);
        assert_eq!(ex.stats.skipped_commands, 1);
        assert_eq!(ex.stats.bare_durations, 0);
    }

    #[test]
    fn test_iso_class_presentation() {
        let log = "\
### Presenting
### Disclosing 1 attributes
C: 00A4040000
 duration: 9 ms
C: 0021000010
 duration: 310 ms
C: 0020000000
 duration: 4 ms
completed successfully
";
        let extraction = run(&Variant::presentation_iso(), log);
        let records = &extraction.rounds[0].records;
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].bucket, Bucket::Protocol);
        assert_eq!(records[1].duration_ms, 310);
        assert_eq!(records[0].bucket, Bucket::Overhead);
        assert_eq!(records[2].bucket, Bucket::Overhead);
    }

    #[test]
    fn test_truncated_log_terminates() {
        let log = "\
### Presenting
### Disclosing 3 attributes
C: 8022000000
 duration: 40 ms
C: 802B000000
";
        let ex = run(&Variant::presentation(), log);
        assert_eq!(ex.outcome, ScanOutcome::Truncated);
        assert_eq!(ex.rounds.len(), 1);
        assert_eq!(ex.rounds[0].records.len(), 2);
        assert_eq!(ex.rounds[0].records[1].duration_ms, 0);
        assert_eq!(ex.stats.missing_durations, 1);
    }

    #[test]
    fn test_log_without_presentation() {
        let ex = run(&Variant::presentation(), "C: 8022\n duration: 5 ms\n");
        assert_eq!(ex.outcome, ScanOutcome::Truncated);
        assert!(ex.rounds.is_empty());
    }

    #[test]
    fn test_malformed_duration_is_zero() {
        let log = "\
### Presenting
### Disclosing 1 attributes
C: 8022000000
 duration: ?? ms
completed successfully
";
        let ex = run(&Variant::presentation(), log);
        assert_eq!(ex.rounds[0].records[0].duration_ms, 0);
        assert_eq!(ex.stats.malformed_durations, 1);
    }

    #[test]
    fn test_command_followed_by_round_marker_keeps_marker() {
        let log = "\
### Presenting
### Disclosing 1 attributes
C: 8022000000
### Disclosing 2 attributes
C: 8022000000
 duration: 7 ms
completed successfully
";
        let ex = run(&Variant::presentation(), log);
        let disclosed: Vec<_> = ex.rounds.iter().map(|r| r.disclosed).collect();
        assert_eq!(disclosed, vec![1, 2]);
        assert_eq!(ex.rounds[1].records[0].duration_ms, 7);
    }

    #[test]
    fn test_unreadable_round_drops_its_records() {
        let log = "\
### Presenting
### Disclosing 1 attributes
C: 8022000000
 duration: 10 ms
### Disclosing many attributes
C: 8022000000
 duration: 20 ms
completed successfully
";
        let ex = run(&Variant::presentation(), log);
        assert_eq!(ex.rounds.len(), 1);
        assert_eq!(ex.rounds[0].records.len(), 1);
        assert_eq!(ex.stats.unreadable_rounds, 1);
    }

    #[test]
    fn test_bare_durations_as_overhead() {
        let log = "\
### Presenting
### Disclosing 4 attributes
 duration: 300 ms
 duration: 200 ms
completed successfully
";
        let ex = run(&Variant::fixed_disclosure(), log);
        let records = &ex.rounds[0].records;
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.bucket == Bucket::Overhead && r.command.is_none()));
        assert_eq!(ex.stats.bare_durations, 2);
    }

    #[test]
    fn test_bare_durations_ignored() {
        let log = "\
### Presenting
### Disclosing 4 attributes
 duration: 300 ms
completed successfully
";
        let ex = run(&Variant::presentation(), log);
        assert!(ex.rounds[0].records.is_empty());
        assert_eq!(ex.stats.bare_durations, 1);
    }

    #[test]
    fn test_issuance_phase() {
        let log = "\
C: 8010000000
 duration: 20 ms
C: 8016000000
 duration: 400 ms
C: 8019030000
 duration: 300 ms
C: 8019020000
 duration: 15 ms
C: 801A020000
 duration: 250 ms
C: 8022000000
 duration: 77 ms
### Presenting
C: 8016000000
 duration: 999 ms
";
        let ex = run(&Variant::issuance(), log);
        assert_eq!(ex.outcome, ScanOutcome::Completed);
        assert_eq!(ex.rounds.len(), 1);
        assert_eq!(ex.rounds[0].disclosed, 0);

        let protocol: u64 = ex.rounds[0]
            .records
            .iter()
            .filter(|r| r.bucket == Bucket::Protocol)
            .map(|r| r.duration_ms)
            .sum();
        let overhead: u64 = ex.rounds[0]
            .records
            .iter()
            .filter(|r| r.bucket == Bucket::Overhead)
            .map(|r| r.duration_ms)
            .sum();
        assert_eq!(protocol, 950);
        assert_eq!(overhead, 35);
        assert_eq!(ex.stats.skipped_commands, 1);
    }
}
