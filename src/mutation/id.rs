//! Primary-key generation strategies

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::codec::CellValue;
use crate::errors::{DbError, DbResult};

/// How new rows get their `id`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IdStrategy {
    /// Last row's id + 1
    #[default]
    #[serde(rename = "sequential")]
    Sequential,
    /// Wall-clock milliseconds; not unique under rapid repeated calls
    #[serde(rename = "timestamp")]
    TimestampMillis,
    /// Delegates to the unique-id source (UUID v4 by default)
    #[serde(rename = "uuid")]
    RandomUnique,
}

impl IdStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdStrategy::Sequential => "sequential",
            IdStrategy::TimestampMillis => "timestamp",
            IdStrategy::RandomUnique => "uuid",
        }
    }
}

impl FromStr for IdStrategy {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(IdStrategy::Sequential),
            "timestamp" => Ok(IdStrategy::TimestampMillis),
            "uuid" => Ok(IdStrategy::RandomUnique),
            other => Err(DbError::invalid_id_strategy(other)),
        }
    }
}

impl fmt::Display for IdStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unique-id collaborator
pub trait UniqueIdSource: Send + Sync {
    fn new_id(&self) -> String;
}

/// UUID v4 ids
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidSource;

impl UniqueIdSource for UuidSource {
    fn new_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Id generator for one insert batch.
///
/// The sequential counter is seeded from the store once, on first use, and
/// then incremented in memory.
pub struct IdGenerator<'a> {
    strategy: IdStrategy,
    counter: Option<u64>,
    clock: &'a dyn Clock,
    ids: &'a dyn UniqueIdSource,
}

impl<'a> IdGenerator<'a> {
    pub fn new(strategy: IdStrategy, clock: &'a dyn Clock, ids: &'a dyn UniqueIdSource) -> Self {
        Self {
            strategy,
            counter: None,
            clock,
            ids,
        }
    }

    /// Next id. `read_last_id` returns the stored text of the last row's id
    /// and is called at most once per generator.
    pub fn next_id<F>(&mut self, read_last_id: F) -> DbResult<CellValue>
    where
        F: FnOnce() -> DbResult<String>,
    {
        match self.strategy {
            IdStrategy::Sequential => {
                let last = match self.counter {
                    Some(last) => last,
                    None => parse_last_id(&read_last_id()?),
                };
                let next = last
                    .checked_add(1)
                    .filter(|next| *next <= MAX_SEQUENTIAL_ID)
                    .ok_or_else(|| DbError::sequence_exhausted(last))?;
                self.counter = Some(next);
                Ok(CellValue::from(next as i64))
            }
            IdStrategy::TimestampMillis => {
                Ok(CellValue::from(self.clock.now().timestamp_millis()))
            }
            IdStrategy::RandomUnique => Ok(CellValue::text(self.ids.new_id())),
        }
    }
}

/// Largest id a `Number` cell holds exactly (2^53)
pub const MAX_SEQUENTIAL_ID: u64 = 1 << 53;

/// Non-numeric or negative ids count as 0. Huge values saturate to
/// `u64::MAX` and are rejected by the caller.
fn parse_last_id(text: &str) -> u64 {
    let trimmed = text.trim();
    if let Ok(n) = trimmed.parse::<u64>() {
        return n;
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 0.0 => n.trunc() as u64,
        _ => 0,
    }
}
