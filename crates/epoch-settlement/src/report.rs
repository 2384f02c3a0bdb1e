//! Rendering of settlement results, chain-state listings and the
//! critical-value table for the CLI.

use crate::{
    settlement::{SettlementRecord, SettlementReport},
    stats::{BinomialTailTest, CriticalValueTable},
    store::MemoryStore,
};
use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use tabled::{Table, Tabled, settings::Style};

/// Unified output format for all CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    #[default]
    #[value(name = "table")]
    Table,
    #[value(name = "csv")]
    Csv,
    #[value(name = "json")]
    Json,
    #[value(name = "json-pretty")]
    JsonPretty,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Csv => write!(f, "csv"),
            Self::Json => write!(f, "json"),
            Self::JsonPretty => write!(f, "json-pretty"),
        }
    }
}

/// Trait for types that can be exported to various formats
pub trait Exportable {
    fn export(&self, format: OutputFormat) -> Result<String>;
}

/// Helper function to convert a collection to CSV format
pub fn collection_to_csv<T: Serialize>(records: &[T]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in records {
        wtr.serialize(record)?;
    }
    let data = wtr.into_inner()?;
    Ok(String::from_utf8(data)?)
}

pub fn to_json_string<T: Serialize>(data: &T, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(data)?)
    } else {
        Ok(serde_json::to_string(data)?)
    }
}

fn table<T: Tabled>(rows: &[T]) -> String {
    Table::new(rows).with(Style::psql().remove_horizontals()).to_string()
}

#[derive(Tabled)]
struct SummaryRow {
    field: &'static str,
    value: String,
}

impl Exportable for SettlementReport {
    fn export(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Table => {
                let summary = [
                    SummaryRow {
                        field: "epoch",
                        value: self.epoch_index.to_string(),
                    },
                    SummaryRow {
                        field: "previous epoch",
                        value: self.previous_epoch_index.to_string(),
                    },
                    SummaryRow {
                        field: "pool",
                        value: self.pool.amount.to_string(),
                    },
                    SummaryRow {
                        field: "capped",
                        value: self.capped.to_string(),
                    },
                    SummaryRow {
                        field: "minted",
                        value: self.minted.to_string(),
                    },
                    SummaryRow {
                        field: "work coins",
                        value: self.total_work_coins().to_string(),
                    },
                    SummaryRow {
                        field: "replaced burned",
                        value: self.replaced_burned.to_string(),
                    },
                    SummaryRow {
                        field: "expired burned",
                        value: format!("{} ({} removed)", self.expired_burned, self.expired_removed),
                    },
                ];
                Ok(format!("{}\n\n{}", table(&summary), table(&self.records)))
            }
            OutputFormat::Csv => collection_to_csv::<SettlementRecord>(&self.records),
            OutputFormat::Json => to_json_string(self, false),
            OutputFormat::JsonPretty => to_json_string(self, true),
        }
    }
}

/// One participant's outstanding position in a chain state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Tabled)]
pub struct ParticipantRow {
    pub participant: String,
    pub status: String,
    pub coin_balance: i64,
    pub epochs_completed: u32,
    /// Epoch of the unclaimed settle amount, `-` when none.
    pub settle_epoch: String,
    pub unclaimed_coins: u64,
    pub summaries: usize,
    pub claimed_summaries: usize,
}

fn display_option(value: &Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParticipantListing {
    pub current_epoch: Option<u64>,
    pub rows: Vec<ParticipantRow>,
}

impl ParticipantListing {
    /// Lists participants of `store`, optionally filtered to one address.
    pub fn from_store(store: &MemoryStore, participant: Option<&str>) -> Self {
        let rows = store
            .participants
            .values()
            .filter(|p| participant.is_none_or(|addr| p.address == addr))
            .map(|p| {
                let settle_amount = store.settle_amounts.get(&p.address);
                let summaries: Vec<_> = store.performance_summaries_for(&p.address).collect();
                ParticipantRow {
                    participant: p.address.clone(),
                    status: format!("{:?}", p.status),
                    coin_balance: p.coin_balance,
                    epochs_completed: p.epochs_completed,
                    settle_epoch: display_option(&settle_amount.map(|s| s.epoch_index)),
                    unclaimed_coins: settle_amount.map(|s| s.total_coins()).unwrap_or(0),
                    summaries: summaries.len(),
                    claimed_summaries: summaries.iter().filter(|s| s.claimed).count(),
                }
            })
            .collect();
        Self {
            current_epoch: store.current_epoch,
            rows,
        }
    }
}

impl Exportable for ParticipantListing {
    fn export(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Table => Ok(format!(
                "Current epoch: {}\n{}",
                display_option(&self.current_epoch),
                table(&self.rows)
            )),
            OutputFormat::Csv => collection_to_csv(&self.rows),
            OutputFormat::Json => to_json_string(self, false),
            OutputFormat::JsonPretty => to_json_string(self, true),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Tabled)]
pub struct CriticalValueRow {
    pub total: u64,
    pub table_critical: u64,
    pub binomial_critical: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CriticalValueListing {
    pub rows: Vec<CriticalValueRow>,
}

impl CriticalValueListing {
    /// Table rows up to `max_total`, each next to the exact binomial bound.
    pub fn build(max_total: u64) -> Result<Self> {
        let binomial = BinomialTailTest::default();
        let rows = CriticalValueTable
            .thresholds()
            .iter()
            .filter(|t| t.total <= max_total)
            .map(|t| {
                Ok(CriticalValueRow {
                    total: t.total,
                    table_critical: t.critical_misses,
                    binomial_critical: binomial.critical_misses(t.total)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rows })
    }
}

impl Exportable for CriticalValueListing {
    fn export(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Table => Ok(table(&self.rows)),
            OutputFormat::Csv => collection_to_csv(&self.rows),
            OutputFormat::Json => to_json_string(&self.rows, false),
            OutputFormat::JsonPretty => to_json_string(&self.rows, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Participant, ParticipantStatus, SettleAmount};

    fn store() -> MemoryStore {
        let mut store = MemoryStore {
            current_epoch: Some(3),
            ..Default::default()
        };
        store.add_participant(Participant::new("alice", 10, ParticipantStatus::Active));
        store.add_participant(Participant::new("bob", 0, ParticipantStatus::Invalid));
        store.settle_amounts.insert(
            "alice".to_string(),
            SettleAmount {
                participant: "alice".to_string(),
                epoch_index: 2,
                work_coins: 5,
                reward_coins: 7,
                seed_signature: String::new(),
            },
        );
        store
    }

    #[test]
    fn test_listing_filters_participant() {
        let listing = ParticipantListing::from_store(&store(), Some("alice"));
        assert_eq!(listing.rows.len(), 1);
        assert_eq!(listing.rows[0].settle_epoch, "2");
        assert_eq!(listing.rows[0].unclaimed_coins, 12);

        let all = ParticipantListing::from_store(&store(), None);
        assert_eq!(all.rows.len(), 2);
        assert_eq!(all.rows[1].settle_epoch, "-");
    }

    #[test]
    fn test_listing_csv_has_header_and_rows() {
        let csv = ParticipantListing::from_store(&store(), None)
            .export(OutputFormat::Csv)
            .unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("participant,status,coin_balance"));
    }

    #[test]
    fn test_critical_values_respect_max_total() {
        let listing = CriticalValueListing::build(20).unwrap();
        assert!(listing.rows.iter().all(|r| r.total <= 20));
        assert!(!listing.rows.is_empty());
        let json = listing.export(OutputFormat::Json).unwrap();
        assert!(json.starts_with('['));
    }
}
