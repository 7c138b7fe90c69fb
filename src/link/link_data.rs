use fxhash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};

use crate::map::Application;
use crate::schema::SlotType;
use crate::stats::{Histogram, TimeSeriesHistogram};

/// Directed edge identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkKey {
    pub from: Application,
    pub to: Application,
}

impl LinkKey {
    pub fn new(from: Application, to: Application) -> Self {
        Self { from, to }
    }
}

/// Calling and called agent of one edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentPair {
    pub source: String,
    pub target: String,
}

/// Counters of one agent pair over time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCallData {
    source_agent: String,
    target_agent: String,
    histogram: TimeSeriesHistogram,
}

impl LinkCallData {
    fn new(pair: &AgentPair) -> Self {
        Self {
            source_agent: pair.source.clone(),
            target_agent: pair.target.clone(),
            histogram: TimeSeriesHistogram::new(),
        }
    }

    pub fn source_agent(&self) -> &str {
        &self.source_agent
    }

    pub fn target_agent(&self) -> &str {
        &self.target_agent
    }

    pub fn time_histogram(&self) -> &TimeSeriesHistogram {
        &self.histogram
    }

    pub fn total_count(&self) -> u64 {
        self.histogram.total_count()
    }
}

/// Aggregated calls of one directed edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkData {
    from: Application,
    to: Application,
    call_data: FxHashMap<AgentPair, LinkCallData>,
}

impl LinkData {
    pub fn new(from: Application, to: Application) -> Self {
        Self {
            from,
            to,
            call_data: FxHashMap::default(),
        }
    }

    pub fn from_application(&self) -> &Application {
        &self.from
    }

    pub fn to_application(&self) -> &Application {
        &self.to
    }

    /// Add calls between two agents in one time bucket and latency slot
    pub fn add_link_data(
        &mut self,
        source_agent: &str,
        target_agent: &str,
        timestamp: i64,
        slot: SlotType,
        count: u64,
    ) {
        let pair = AgentPair {
            source: source_agent.to_string(),
            target: target_agent.to_string(),
        };
        self.call_data
            .entry(pair)
            .or_insert_with_key(LinkCallData::new)
            .histogram
            .add_call_count(timestamp, slot, count);
    }

    /// Add every counter of another edge with the same endpoints
    pub fn merge(&mut self, other: LinkData) {
        for (pair, call) in other.call_data {
            match self.call_data.get_mut(&pair) {
                Some(existing) => existing.histogram.merge(&call.histogram),
                None => {
                    self.call_data.insert(pair, call);
                }
            }
        }
    }

    pub fn call_data(&self) -> impl Iterator<Item = &LinkCallData> {
        self.call_data.values()
    }

    pub fn call_data_for(&self, source_agent: &str, target_agent: &str) -> Option<&LinkCallData> {
        self.call_data.get(&AgentPair {
            source: source_agent.to_string(),
            target: target_agent.to_string(),
        })
    }

    pub fn source_agents(&self) -> BTreeSet<&str> {
        self.call_data.keys().map(|p| p.source.as_str()).collect()
    }

    pub fn target_agents(&self) -> BTreeSet<&str> {
        self.call_data.keys().map(|p| p.target.as_str()).collect()
    }

    /// Counts summed over agents and time
    pub fn total_histogram(&self) -> Histogram {
        self.call_data.values().fold(Histogram::new(), |mut acc, call| {
            acc.add(&call.histogram.total());
            acc
        })
    }

    /// Counts summed over agents, per time bucket
    pub fn time_histogram(&self) -> TimeSeriesHistogram {
        self.call_data
            .values()
            .fold(TimeSeriesHistogram::new(), |mut acc, call| {
                acc.merge(&call.histogram);
                acc
            })
    }

    /// Counts summed over time, per target agent
    pub fn target_agent_histograms(&self) -> BTreeMap<&str, Histogram> {
        let mut histograms: BTreeMap<&str, Histogram> = BTreeMap::new();
        for (pair, call) in &self.call_data {
            histograms
                .entry(pair.target.as_str())
                .or_default()
                .add(&call.histogram.total());
        }
        histograms
    }

    pub fn total_count(&self) -> u64 {
        self.call_data.values().map(|c| c.total_count()).sum()
    }
}
