//! Per-application response time distributions
//!
//! Node statistics are collected independently of edges: every span adds one
//! sample under its own application, split by agent and time bucket.

use fxhash::FxHashMap;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use super::histogram::{Histogram, TimeSeriesHistogram};
use super::Accumulate;
use crate::map::Application;
use crate::schema::SlotType;

/// One classified span response
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSample {
    pub application: Application,
    pub agent_id: String,
    /// Bucket start, already refined by the caller's time window
    pub timestamp: i64,
    pub slot: SlotType,
}

/// Response times of one application, per agent
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseTime {
    application: Application,
    agents: BTreeMap<String, TimeSeriesHistogram>,
}

impl ResponseTime {
    fn new(application: Application) -> Self {
        Self {
            application,
            agents: BTreeMap::new(),
        }
    }

    fn add(&mut self, agent_id: &str, timestamp: i64, slot: SlotType) {
        if let Some(series) = self.agents.get_mut(agent_id) {
            series.add_call_count(timestamp, slot, 1);
        } else {
            let mut series = TimeSeriesHistogram::new();
            series.add_call_count(timestamp, slot, 1);
            self.agents.insert(agent_id.to_string(), series);
        }
    }

    fn merge(&mut self, other: ResponseTime) {
        for (agent_id, series) in other.agents {
            match self.agents.get_mut(&agent_id) {
                Some(existing) => existing.merge(&series),
                None => {
                    self.agents.insert(agent_id, series);
                }
            }
        }
    }
}

/// Accumulates node response samples for one request
#[derive(Debug, Clone, Default)]
pub struct ResponseHistogramBuilder {
    responses: FxHashMap<Application, ResponseTime>,
}

impl ResponseHistogramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn application_count(&self) -> usize {
        self.responses.len()
    }

    pub fn applications(&self) -> impl Iterator<Item = &Application> {
        self.responses.keys()
    }

    /// Freeze the accumulated counts
    pub fn build(self) -> ResponseHistogramSummary {
        let mut summaries: BTreeMap<Application, ApplicationResponseHistogram> = BTreeMap::new();

        for (application, response) in self.responses {
            let mut total = Histogram::new();
            let mut time_series = TimeSeriesHistogram::new();
            let mut agent_histograms = BTreeMap::new();

            for (agent_id, series) in response.agents {
                let agent_total = series.total();
                total.add(&agent_total);
                time_series.merge(&series);
                agent_histograms.insert(agent_id, agent_total);
            }

            summaries.insert(
                application.clone(),
                ApplicationResponseHistogram {
                    application,
                    total,
                    agent_histograms,
                    time_series,
                },
            );
        }

        ResponseHistogramSummary { summaries }
    }
}

impl Accumulate<ResponseSample> for ResponseHistogramBuilder {
    fn accumulate(&mut self, sample: ResponseSample) {
        let ResponseSample {
            application,
            agent_id,
            timestamp,
            slot,
        } = sample;

        self.responses
            .entry(application)
            .or_insert_with_key(|app| ResponseTime::new(app.clone()))
            .add(&agent_id, timestamp, slot);
    }

    fn merge(&mut self, other: Self) {
        for (application, response) in other.responses {
            match self.responses.get_mut(&application) {
                Some(existing) => existing.merge(response),
                None => {
                    self.responses.insert(application, response);
                }
            }
        }
    }
}

/// Immutable node statistics for one application
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationResponseHistogram {
    application: Application,
    total: Histogram,
    agent_histograms: BTreeMap<String, Histogram>,
    time_series: TimeSeriesHistogram,
}

impl ApplicationResponseHistogram {
    pub fn application(&self) -> &Application {
        &self.application
    }

    pub fn total(&self) -> &Histogram {
        &self.total
    }

    pub fn agent_histograms(&self) -> &BTreeMap<String, Histogram> {
        &self.agent_histograms
    }

    pub fn agent_ids(&self) -> impl Iterator<Item = &str> {
        self.agent_histograms.keys().map(|s| s.as_str())
    }

    pub fn time_series(&self) -> &TimeSeriesHistogram {
        &self.time_series
    }
}

impl Serialize for ApplicationResponseHistogram {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let schema = self.application.service_type().histogram_schema();
        let agents: BTreeMap<&str, _> = self
            .agent_histograms
            .iter()
            .map(|(agent, h)| (agent.as_str(), h.labeled(schema)))
            .collect();
        let series: Vec<_> = self
            .time_series
            .iter()
            .map(|(ts, h)| (ts, h.labeled(schema)))
            .collect();

        let mut state = serializer.serialize_struct("ApplicationResponseHistogram", 4)?;
        state.serialize_field("application", &self.application)?;
        state.serialize_field("histogram", &self.total.labeled(schema))?;
        state.serialize_field("agentHistogram", &agents)?;
        state.serialize_field("timeSeries", &series)?;
        state.end()
    }
}

/// Frozen node statistics for a whole map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseHistogramSummary {
    summaries: BTreeMap<Application, ApplicationResponseHistogram>,
}

impl ResponseHistogramSummary {
    pub fn get(&self, application: &Application) -> Option<&ApplicationResponseHistogram> {
        self.summaries.get(application)
    }

    pub fn applications(&self) -> impl Iterator<Item = &Application> {
        self.summaries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ApplicationResponseHistogram> {
        self.summaries.values()
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}
