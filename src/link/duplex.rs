//! Paired source/target edge views
//!
//! The same physical call can be reported by its caller (span event, source
//! view) and by its callee (span, target view). User-originated calls have no
//! caller span, so they are written to both views.

use std::collections::BTreeSet;

use super::link_data::LinkKey;
use super::link_map::{LinkDataMap, LinkSample};
use crate::map::Application;
use crate::stats::Accumulate;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDataDuplexMap {
    source_link_data_map: LinkDataMap,
    target_link_data_map: LinkDataMap,
}

impl LinkDataDuplexMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source_link_data_map(&self) -> &LinkDataMap {
        &self.source_link_data_map
    }

    pub fn target_link_data_map(&self) -> &LinkDataMap {
        &self.target_link_data_map
    }

    /// Record a call seen from the caller's side
    pub fn add_source_link_data(&mut self, sample: LinkSample) {
        self.source_link_data_map.accumulate(sample);
    }

    /// Record a call seen from the callee's side
    pub fn add_target_link_data(&mut self, sample: LinkSample) {
        self.target_link_data_map.accumulate(sample);
    }

    pub fn merge(&mut self, other: LinkDataDuplexMap) {
        self.source_link_data_map.merge(other.source_link_data_map);
        self.target_link_data_map.merge(other.target_link_data_map);
    }

    /// Distinct edges across both views
    pub fn link_keys(&self) -> BTreeSet<&LinkKey> {
        self.source_link_data_map
            .keys()
            .chain(self.target_link_data_map.keys())
            .collect()
    }

    /// Every application appearing as an endpoint in either view
    pub fn applications(&self) -> BTreeSet<&Application> {
        let mut applications = self.source_link_data_map.applications();
        applications.extend(self.target_link_data_map.applications());
        applications
    }

    pub fn size(&self) -> usize {
        self.source_link_data_map.len() + self.target_link_data_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_link_data_map.is_empty() && self.target_link_data_map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ServiceType, SlotType};

    fn sample(from: Application, to: Application) -> LinkSample {
        LinkSample {
            from,
            from_agent: "a".to_string(),
            to,
            to_agent: "b".to_string(),
            timestamp: 0,
            slot: SlotType::Fast,
            count: 1,
        }
    }

    #[test]
    fn test_views_are_independent() {
        let user = Application::user("web");
        let web = Application::new("web", ServiceType::Unknown);
        let db = Application::new("db", ServiceType::Unknown);

        let mut duplex = LinkDataDuplexMap::new();
        duplex.add_source_link_data(sample(user.clone(), web.clone()));
        duplex.add_target_link_data(sample(user.clone(), web.clone()));
        duplex.add_source_link_data(sample(web.clone(), db.clone()));

        assert_eq!(duplex.source_link_data_map().len(), 2);
        assert_eq!(duplex.target_link_data_map().len(), 1);
        assert_eq!(duplex.size(), 3);
        assert_eq!(duplex.link_keys().len(), 2);
        assert_eq!(duplex.applications().len(), 3);
    }

    #[test]
    fn test_merge() {
        let user = Application::user("web");
        let web = Application::new("web", ServiceType::Unknown);

        let mut a = LinkDataDuplexMap::new();
        a.add_target_link_data(sample(user.clone(), web.clone()));
        let mut b = LinkDataDuplexMap::new();
        b.add_target_link_data(sample(user.clone(), web.clone()));
        b.add_source_link_data(sample(user.clone(), web.clone()));

        a.merge(b);
        assert_eq!(a.target_link_data_map().total_count(), 2);
        assert_eq!(a.source_link_data_map().total_count(), 1);
    }
}
