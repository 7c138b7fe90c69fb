use fxhash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

const DELIMITER: char = '^';

/// Identifies one end-to-end distributed call
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId {
    /// Agent that started the transaction
    pub agent_id: String,
    /// Start time of that agent, epoch milliseconds
    pub agent_start_time: i64,
    /// Per-agent sequence number
    pub sequence: i64,
}

impl TransactionId {
    pub fn new(agent_id: impl Into<String>, agent_start_time: i64, sequence: i64) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_start_time,
            sequence,
        }
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.agent_id, DELIMITER, self.agent_start_time, DELIMITER, self.sequence
        )
    }
}

impl FromStr for TransactionId {
    type Err = ParseTransactionIdError;

    /// Parses `agentId^agentStartTime^sequence`. The agent id may itself
    /// contain the delimiter, so the numeric parts are split from the right.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.rsplitn(3, DELIMITER);
        let sequence = parts.next();
        let start_time = parts.next();
        let agent_id = parts.next();

        match (agent_id, start_time, sequence) {
            (Some(agent_id), Some(start_time), Some(sequence)) if !agent_id.is_empty() => {
                let agent_start_time = start_time
                    .parse()
                    .map_err(|_| ParseTransactionIdError::InvalidNumber(start_time.to_string()))?;
                let sequence = sequence
                    .parse()
                    .map_err(|_| ParseTransactionIdError::InvalidNumber(sequence.to_string()))?;
                Ok(Self::new(agent_id, agent_start_time, sequence))
            }
            _ => Err(ParseTransactionIdError::Format(s.to_string())),
        }
    }
}

impl Serialize for TransactionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TransactionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseTransactionIdError {
    #[error("Invalid transaction id '{0}', expected agentId^agentStartTime^sequence")]
    Format(String),

    #[error("Invalid number '{0}' in transaction id")]
    InvalidNumber(String),
}

/// Remove duplicate transaction ids, keeping first-seen order.
///
/// Returns the input slice itself when nothing was duplicated.
pub fn dedup_transaction_ids(transaction_ids: &[TransactionId]) -> Cow<'_, [TransactionId]> {
    let mut seen: FxHashSet<&TransactionId> = FxHashSet::default();
    let has_duplicates = !transaction_ids.iter().all(|id| seen.insert(id));
    if !has_duplicates {
        return Cow::Borrowed(transaction_ids);
    }

    let mut occurrences: FxHashMap<&TransactionId, usize> = FxHashMap::default();
    let mut distinct = Vec::with_capacity(transaction_ids.len());
    let mut duplicated = Vec::new();
    for id in transaction_ids {
        let count = occurrences.entry(id).or_insert(0);
        *count += 1;
        match *count {
            1 => distinct.push(id.clone()),
            2 => duplicated.push(id.to_string()),
            _ => {}
        }
    }

    tracing::warn!(
        "Duplicate transaction ids found. original:{} filtered:{} duplicated:{:?}",
        transaction_ids.len(),
        distinct.len(),
        duplicated
    );

    Cow::Owned(distinct)
}
