use fxhash::FxHashMap;
use std::collections::BTreeSet;

use super::link_data::{LinkData, LinkKey};
use crate::map::Application;
use crate::schema::SlotType;
use crate::stats::Accumulate;

/// One classified call on a directed edge
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSample {
    pub from: Application,
    pub from_agent: String,
    pub to: Application,
    pub to_agent: String,
    /// Bucket start, already refined by the caller's time window
    pub timestamp: i64,
    pub slot: SlotType,
    pub count: u64,
}

/// Edges keyed by (source, destination); insertion is additive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDataMap {
    link_data: FxHashMap<LinkKey, LinkData>,
}

impl LinkDataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &LinkKey) -> Option<&LinkData> {
        self.link_data.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LinkKey, &LinkData)> {
        self.link_data.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &LinkKey> {
        self.link_data.keys()
    }

    pub fn len(&self) -> usize {
        self.link_data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.link_data.is_empty()
    }

    pub fn total_count(&self) -> u64 {
        self.link_data.values().map(|l| l.total_count()).sum()
    }

    /// Every application appearing as either endpoint
    pub fn applications(&self) -> BTreeSet<&Application> {
        self.link_data
            .keys()
            .flat_map(|key| [&key.from, &key.to])
            .collect()
    }
}

impl Accumulate<LinkSample> for LinkDataMap {
    fn accumulate(&mut self, sample: LinkSample) {
        let LinkSample {
            from,
            from_agent,
            to,
            to_agent,
            timestamp,
            slot,
            count,
        } = sample;

        self.link_data
            .entry(LinkKey::new(from.clone(), to.clone()))
            .or_insert_with(|| LinkData::new(from, to))
            .add_link_data(&from_agent, &to_agent, timestamp, slot, count);
    }

    fn merge(&mut self, other: Self) {
        for (key, data) in other.link_data {
            match self.link_data.get_mut(&key) {
                Some(existing) => existing.merge(data),
                None => {
                    self.link_data.insert(key, data);
                }
            }
        }
    }
}
