//! Accumulation of durations per (credential setting, disclosed count)
//!
//! Raw sums are kept in integer milliseconds. Averages are computed once per
//! setting by [`Aggregator::finalize_averages`] after its log has been
//! scanned.

use crate::extract::Extraction;
use crate::variant::Averaging;
use serde::Serialize;
use std::collections::BTreeMap;

/// Credential count of a benchmark run
pub type SettingKey = u32;
/// Disclosed-attribute count of a round
pub type RoundKey = u32;

/// Where a duration is booked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    /// Core cryptographic commands
    Protocol,
    /// Everything else: transport and bookkeeping commands
    Overhead,
}

/// Which figure of a cell to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Total,
    Protocol,
    Overhead,
}

/// Accumulated time for one (setting, round) pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub protocol_ms: u64,
    pub overhead_ms: u64,
    /// Number of times the round was entered
    pub observations: u32,
}

impl Cell {
    pub fn total_ms(&self) -> u64 {
        self.protocol_ms.saturating_add(self.overhead_ms)
    }

    pub fn add(&mut self, bucket: Bucket, ms: u64) {
        match bucket {
            Bucket::Protocol => self.protocol_ms = self.protocol_ms.saturating_add(ms),
            Bucket::Overhead => self.overhead_ms = self.overhead_ms.saturating_add(ms),
        }
    }

    pub fn raw(&self, measure: Measure) -> u64 {
        match measure {
            Measure::Total => self.total_ms(),
            Measure::Protocol => self.protocol_ms,
            Measure::Overhead => self.overhead_ms,
        }
    }

    /// Average the cell; `None` when the divisor is zero
    pub fn average(&self, averaging: Averaging) -> Option<CellAverage> {
        let divisor = match averaging {
            Averaging::Observed => self.observations,
            Averaging::Fixed(n) => n,
        };
        if divisor == 0 {
            return None;
        }
        let divisor = f64::from(divisor);
        Some(CellAverage {
            protocol: self.protocol_ms as f64 / divisor,
            overhead: self.overhead_ms as f64 / divisor,
            total: self.total_ms() as f64 / divisor,
        })
    }
}

/// Averaged figures of one cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CellAverage {
    pub protocol: f64,
    pub overhead: f64,
    pub total: f64,
}

impl CellAverage {
    pub fn get(&self, measure: Measure) -> f64 {
        match measure {
            Measure::Total => self.total,
            Measure::Protocol => self.protocol,
            Measure::Overhead => self.overhead,
        }
    }
}

/// Nested mapping setting -> round -> value
pub type Table<V> = BTreeMap<SettingKey, BTreeMap<RoundKey, V>>;

/// Accumulates durations across all settings of one run
#[derive(Debug, Clone)]
pub struct Aggregator {
    averaging: Averaging,
    cells: Table<Cell>,
    averages: Table<CellAverage>,
}

impl Aggregator {
    pub fn new(averaging: Averaging) -> Self {
        Self {
            averaging,
            cells: BTreeMap::new(),
            averages: BTreeMap::new(),
        }
    }

    /// Make sure a setting shows up in reports even if its log has no rounds
    pub fn ensure_setting(&mut self, setting: SettingKey) {
        self.cells.entry(setting).or_default();
    }

    /// Count one entry into a round
    pub fn observe(&mut self, setting: SettingKey, round: RoundKey) {
        self.cell_mut(setting, round).observations += 1;
    }

    /// Book `ms` into a bucket, creating a zeroed cell if needed
    pub fn add_duration(&mut self, setting: SettingKey, round: RoundKey, bucket: Bucket, ms: u64) {
        self.cell_mut(setting, round).add(bucket, ms);
    }

    /// Fold a scanned log into the setting's cells
    ///
    /// Each round counts as one observation regardless of how many records it holds.
    pub fn ingest(&mut self, setting: SettingKey, extraction: &Extraction) {
        self.ensure_setting(setting);
        for round in &extraction.rounds {
            self.observe(setting, round.disclosed);
            for record in &round.records {
                self.add_duration(setting, round.disclosed, record.bucket, record.duration_ms);
            }
        }
    }

    /// Compute averages for every round of a setting
    ///
    /// Cells whose divisor is zero are left unaveraged. Returns how many
    /// cells were averaged.
    pub fn finalize_averages(&mut self, setting: SettingKey) -> usize {
        let Some(rounds) = self.cells.get(&setting) else {
            return 0;
        };

        let mut averaged = BTreeMap::new();
        for (&round, cell) in rounds {
            match cell.average(self.averaging) {
                Some(avg) => {
                    averaged.insert(round, avg);
                }
                None => tracing::warn!(
                    "Setting {} round {}: no observations, left unaveraged",
                    setting,
                    round
                ),
            }
        }

        let count = averaged.len();
        self.averages.insert(setting, averaged);
        count
    }

    pub fn cell(&self, setting: SettingKey, round: RoundKey) -> Option<&Cell> {
        self.cells.get(&setting)?.get(&round)
    }

    pub fn average(&self, setting: SettingKey, round: RoundKey) -> Option<&CellAverage> {
        self.averages.get(&setting)?.get(&round)
    }

    pub fn settings(&self) -> impl Iterator<Item = SettingKey> + '_ {
        self.cells.keys().copied()
    }

    pub fn cells(&self) -> &Table<Cell> {
        &self.cells
    }

    /// Raw sums for one measure
    pub fn raw_table(&self, measure: Measure) -> Table<u64> {
        map_table(&self.cells, |c| c.raw(measure))
    }

    /// Averaged values for one measure; unaveraged cells are absent
    pub fn average_table(&self, measure: Measure) -> Table<f64> {
        let mut table = map_table(&self.averages, |a| a.get(measure));
        for setting in self.cells.keys() {
            table.entry(*setting).or_default();
        }
        table
    }

    /// Observation counts per round
    pub fn count_table(&self) -> Table<u32> {
        map_table(&self.cells, |c| c.observations)
    }

    fn cell_mut(&mut self, setting: SettingKey, round: RoundKey) -> &mut Cell {
        self.cells
            .entry(setting)
            .or_default()
            .entry(round)
            .or_default()
    }
}

fn map_table<T, V>(table: &Table<T>, f: impl Fn(&T) -> V) -> Table<V> {
    table
        .iter()
        .map(|(&s, rounds)| (s, rounds.iter().map(|(&r, v)| (r, f(v))).collect()))
        .collect()
}
