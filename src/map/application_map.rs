//! Final map assembly
//!
//! Nodes are every application seen as a link endpoint or as a histogram
//! subject. Applications that report their own spans carry their response
//! histogram; terminal and unknown nodes are measured from the calls made to
//! them.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

use super::application::Application;
use super::scatter::ApplicationScatterScanResult;
use crate::link::{LinkData, LinkDataDuplexMap, LinkDataMap, LinkKey};
use crate::schema::ServiceType;
use crate::stats::{Histogram, ResponseHistogramSummary, TimeSeriesHistogram};
use crate::storage::{AgentInfo, AgentInfoService};
use crate::window::{Range, TimeWindow, TimeWindowDownSampler};

/// Whether nodes of this type report spans of their own
fn reports_spans(service_type: &ServiceType) -> bool {
    matches!(service_type, ServiceType::Defined(_))
        && service_type.is_record_statistics()
        && !service_type.is_terminal()
        && !service_type.is_rpc_client()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    application: Application,
    agents: Vec<AgentInfo>,
    histogram: Histogram,
    agent_histograms: BTreeMap<String, Histogram>,
    time_series: Vec<(i64, Histogram)>,
}

impl Node {
    pub fn application(&self) -> &Application {
        &self.application
    }

    pub fn agents(&self) -> &[AgentInfo] {
        &self.agents
    }

    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    pub fn agent_histograms(&self) -> &BTreeMap<String, Histogram> {
        &self.agent_histograms
    }

    /// One entry per window bucket, empty buckets included
    pub fn time_series(&self) -> &[(i64, Histogram)] {
        &self.time_series
    }

    pub fn is_was(&self) -> bool {
        reports_spans(self.application.service_type())
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let schema = self.application.service_type().histogram_schema();
        let agent_histograms: BTreeMap<&str, _> = self
            .agent_histograms
            .iter()
            .map(|(agent, h)| (agent.as_str(), h.labeled(schema)))
            .collect();
        let series: Vec<_> = self
            .time_series
            .iter()
            .map(|(ts, h)| (ts, h.labeled(schema)))
            .collect();

        let mut state = serializer.serialize_struct("Node", 7)?;
        state.serialize_field("key", &self.application.to_string())?;
        state.serialize_field("application", &self.application)?;
        state.serialize_field("isWas", &self.is_was())?;
        state.serialize_field("agents", &self.agents)?;
        state.serialize_field("histogram", &self.histogram.labeled(schema))?;
        state.serialize_field("agentHistogram", &agent_histograms)?;
        state.serialize_field("timeSeries", &series)?;
        state.end()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    key: LinkKey,
    source_link_data: Option<LinkData>,
    target_link_data: Option<LinkData>,
    histogram: Histogram,
    time_series: Vec<(i64, Histogram)>,
}

impl Link {
    pub fn from(&self) -> &Application {
        &self.key.from
    }

    pub fn to(&self) -> &Application {
        &self.key.to
    }

    /// Calls as reported by the caller
    pub fn source_link_data(&self) -> Option<&LinkData> {
        self.source_link_data.as_ref()
    }

    /// Calls as reported by the callee
    pub fn target_link_data(&self) -> Option<&LinkData> {
        self.target_link_data.as_ref()
    }

    /// The callee's view when it exists, otherwise the caller's
    pub fn link_data(&self) -> Option<&LinkData> {
        self.target_link_data
            .as_ref()
            .or(self.source_link_data.as_ref())
    }

    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    pub fn time_series(&self) -> &[(i64, Histogram)] {
        &self.time_series
    }

    pub fn total_count(&self) -> u64 {
        self.histogram.total_count()
    }
}

impl Serialize for Link {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let schema = self.key.to.service_type().histogram_schema();
        let series: Vec<_> = self
            .time_series
            .iter()
            .map(|(ts, h)| (ts, h.labeled(schema)))
            .collect();
        let (source_agents, target_agents, agent_histograms) = match self.link_data() {
            Some(data) => (
                data.source_agents(),
                data.target_agents(),
                data.target_agent_histograms(),
            ),
            None => (BTreeSet::new(), BTreeSet::new(), BTreeMap::new()),
        };
        let target_histograms: BTreeMap<&str, _> = agent_histograms
            .iter()
            .map(|(agent, h)| (*agent, h.labeled(schema)))
            .collect();

        let mut state = serializer.serialize_struct("Link", 10)?;
        state.serialize_field("key", &format!("{}~{}", self.key.from, self.key.to))?;
        state.serialize_field("from", &self.key.from)?;
        state.serialize_field("to", &self.key.to)?;
        state.serialize_field("totalCount", &self.histogram.total_count())?;
        state.serialize_field("errorCount", &self.histogram.error_count())?;
        state.serialize_field("histogram", &self.histogram.labeled(schema))?;
        state.serialize_field("sourceAgents", &source_agents)?;
        state.serialize_field("targetAgents", &target_agents)?;
        state.serialize_field("targetAgentHistogram", &target_histograms)?;
        state.serialize_field("timeSeries", &series)?;
        state.end()
    }
}

/// Service topology with call statistics for one request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationMap {
    range: Range,
    /// Width of the link time series buckets
    window_slot_size: i64,
    nodes: Vec<Node>,
    links: Vec<Link>,
    application_scatter_scan_result: Vec<ApplicationScatterScanResult>,
}

impl ApplicationMap {
    pub fn range(&self) -> Range {
        self.range
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn node(&self, application: &Application) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.application == application)
    }

    pub fn link(&self, from: &Application, to: &Application) -> Option<&Link> {
        self.links
            .iter()
            .find(|l| &l.key.from == from && &l.key.to == to)
    }

    pub fn scatter(&self) -> &[ApplicationScatterScanResult] {
        &self.application_scatter_scan_result
    }

    pub fn with_scatter(mut self, scatter: Vec<ApplicationScatterScanResult>) -> Self {
        self.application_scatter_scan_result = scatter;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Assembles an `ApplicationMap` from frozen statistics
pub struct ApplicationMapBuilder {
    range: Range,
    link_window: TimeWindow,
}

impl ApplicationMapBuilder {
    pub fn new(range: Range) -> Self {
        Self {
            range,
            link_window: TimeWindow::new(range, &TimeWindowDownSampler),
        }
    }

    pub fn build(
        &self,
        link_data_duplex_map: &LinkDataDuplexMap,
        summary: &ResponseHistogramSummary,
        agent_info_service: &dyn AgentInfoService,
    ) -> ApplicationMap {
        let links: Vec<Link> = link_data_duplex_map
            .link_keys()
            .into_iter()
            .map(|key| self.build_link(key, link_data_duplex_map))
            .collect();

        let mut applications: BTreeSet<&Application> = link_data_duplex_map.applications();
        applications.extend(summary.applications());

        let nodes: Vec<Node> = applications
            .into_iter()
            .map(|application| {
                self.build_node(application, link_data_duplex_map, summary, agent_info_service)
            })
            .collect();

        tracing::debug!(
            "Application map built. nodes:{} links:{} range:{}",
            nodes.len(),
            links.len(),
            self.range
        );

        ApplicationMap {
            range: self.range,
            window_slot_size: self.link_window.window_slot_size(),
            nodes,
            links,
            application_scatter_scan_result: Vec::new(),
        }
    }

    fn build_link(&self, key: &LinkKey, duplex: &LinkDataDuplexMap) -> Link {
        let source_link_data = duplex.source_link_data_map().get(key).cloned();
        let target_link_data = duplex.target_link_data_map().get(key).cloned();
        let summary = target_link_data.as_ref().or(source_link_data.as_ref());

        let (histogram, time_series) = match summary {
            Some(data) => (
                data.total_histogram(),
                data.time_histogram().zero_filled(&self.link_window),
            ),
            None => (Histogram::new(), TimeSeriesHistogram::new().zero_filled(&self.link_window)),
        };

        Link {
            key: key.clone(),
            source_link_data,
            target_link_data,
            histogram,
            time_series,
        }
    }

    fn build_node(
        &self,
        application: &Application,
        duplex: &LinkDataDuplexMap,
        summary: &ResponseHistogramSummary,
        agent_info_service: &dyn AgentInfoService,
    ) -> Node {
        let agents = if reports_spans(application.service_type()) {
            agent_info_service.agents_of(application.name(), self.range)
        } else {
            Vec::new()
        };

        if let Some(response) = summary.get(application) {
            return Node {
                application: application.clone(),
                agents,
                histogram: *response.total(),
                agent_histograms: response.agent_histograms().clone(),
                // one-minute samples regrouped to the link bucket width
                time_series: response
                    .time_series()
                    .rebucket(&self.link_window)
                    .zero_filled(&self.link_window),
            };
        }

        // nodes without spans of their own are measured from inbound calls
        let inbound = inbound_calls(application, duplex.source_link_data_map())
            .or_else(|| inbound_calls(application, duplex.target_link_data_map()));
        let (histogram, agent_histograms, time_series) = match inbound {
            Some((histogram, agent_histograms, series)) => (
                histogram,
                agent_histograms,
                series.zero_filled(&self.link_window),
            ),
            None => (
                Histogram::new(),
                BTreeMap::new(),
                TimeSeriesHistogram::new().zero_filled(&self.link_window),
            ),
        };

        Node {
            application: application.clone(),
            agents,
            histogram,
            agent_histograms,
            time_series,
        }
    }
}

/// Sum of every call into `application` in one view; `None` when there is none
fn inbound_calls(
    application: &Application,
    link_data_map: &LinkDataMap,
) -> Option<(Histogram, BTreeMap<String, Histogram>, TimeSeriesHistogram)> {
    let mut found = false;
    let mut histogram = Histogram::new();
    let mut agent_histograms: BTreeMap<String, Histogram> = BTreeMap::new();
    let mut series = TimeSeriesHistogram::new();

    for (key, data) in link_data_map.iter() {
        if &key.to != application {
            continue;
        }
        found = true;
        histogram.add(&data.total_histogram());
        series.merge(&data.time_histogram());
        for (agent, h) in data.target_agent_histograms() {
            agent_histograms.entry(agent.to_string()).or_default().add(&h);
        }
    }

    found.then_some((histogram, agent_histograms, series))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkSample;
    use crate::schema::{codes, ServiceTypeRegistry, SlotType, StaticServiceTypeRegistry};
    use crate::stats::{Accumulate, ResponseHistogramBuilder, ResponseSample};
    use crate::storage::StaticAgentInfoService;
    use crate::window::{ONE_DAY, ONE_MINUTE};

    fn range() -> Range {
        Range::new(0, 5 * ONE_MINUTE).unwrap()
    }

    fn sample(from: &Application, to: &Application, to_agent: &str, slot: SlotType) -> LinkSample {
        LinkSample {
            from: from.clone(),
            from_agent: "web-1".to_string(),
            to: to.clone(),
            to_agent: to_agent.to_string(),
            timestamp: ONE_MINUTE,
            slot,
            count: 1,
        }
    }

    struct Fixture {
        user: Application,
        web: Application,
        db: Application,
        duplex: LinkDataDuplexMap,
        summary: ResponseHistogramSummary,
        agents: StaticAgentInfoService,
    }

    fn fixture() -> Fixture {
        let registry = StaticServiceTypeRegistry::with_defaults();
        let user = Application::user("web");
        let web = Application::new("web", registry.find_service_type(codes::TOMCAT));
        let db = Application::new("orders-db", registry.find_service_type(codes::MYSQL));

        let mut duplex = LinkDataDuplexMap::new();
        duplex.add_source_link_data(sample(&user, &web, "web-1", SlotType::Fast));
        duplex.add_target_link_data(sample(&user, &web, "web-1", SlotType::Fast));
        duplex.add_source_link_data(sample(&web, &db, "db:3306", SlotType::Fast));
        duplex.add_source_link_data(sample(&web, &db, "db:3306", SlotType::Error));

        let mut responses = ResponseHistogramBuilder::new();
        responses.accumulate(ResponseSample {
            application: web.clone(),
            agent_id: "web-1".to_string(),
            timestamp: ONE_MINUTE,
            slot: SlotType::Fast,
        });

        let agents = StaticAgentInfoService::new();
        agents.register(AgentInfo {
            agent_id: "web-1".to_string(),
            application_name: "web".to_string(),
            hostname: "web-1.local".to_string(),
            ip: "10.0.0.1".to_string(),
            service_type: codes::TOMCAT,
            start_timestamp: 0,
        });

        Fixture {
            user,
            web,
            db,
            duplex,
            summary: responses.build(),
            agents,
        }
    }

    #[test]
    fn test_nodes_from_links_and_histograms() {
        let f = fixture();
        let map = ApplicationMapBuilder::new(range()).build(&f.duplex, &f.summary, &f.agents);

        assert_eq!(map.nodes().len(), 3);
        assert_eq!(map.links().len(), 2);

        let web = map.node(&f.web).unwrap();
        assert!(web.is_was());
        assert_eq!(web.agents().len(), 1);
        assert_eq!(web.histogram().get(SlotType::Fast), 1);
        assert_eq!(web.time_series().len(), 6);
        assert_eq!(web.time_series()[1].1.total_count(), 1);

        let user = map.node(&f.user).unwrap();
        assert!(user.agents().is_empty());
        assert!(user.histogram().is_empty());
    }

    #[test]
    fn test_long_range_node_series_follows_link_buckets() {
        let f = fixture();
        let range = Range::new(0, 5 * 365 * ONE_DAY).unwrap();
        let map = ApplicationMapBuilder::new(range).build(&f.duplex, &f.summary, &f.agents);

        let link_len = map.link(&f.user, &f.web).unwrap().time_series().len();
        assert_eq!(link_len, 5 * 365 * 24 + 1);

        let web = map.node(&f.web).unwrap();
        assert_eq!(web.time_series().len(), link_len);
        assert_eq!(web.time_series()[0].1.total_count(), 1);
        assert_eq!(web.histogram().total_count(), 1);
        assert_eq!(map.node(&f.db).unwrap().time_series().len(), link_len);
    }

    #[test]
    fn test_terminal_node_measured_from_inbound_calls() {
        let f = fixture();
        let map = ApplicationMapBuilder::new(range()).build(&f.duplex, &f.summary, &f.agents);

        let db = map.node(&f.db).unwrap();
        assert!(!db.is_was());
        assert_eq!(db.histogram().total_count(), 2);
        assert_eq!(db.histogram().error_count(), 1);
        assert_eq!(db.agent_histograms()["db:3306"].total_count(), 2);
    }

    #[test]
    fn test_link_views() {
        let f = fixture();
        let map = ApplicationMapBuilder::new(range()).build(&f.duplex, &f.summary, &f.agents);

        let user_link = map.link(&f.user, &f.web).unwrap();
        assert!(user_link.source_link_data().is_some());
        assert!(user_link.target_link_data().is_some());
        assert_eq!(user_link.total_count(), 1);

        let db_link = map.link(&f.web, &f.db).unwrap();
        assert!(db_link.target_link_data().is_none());
        assert_eq!(db_link.total_count(), 2);
        assert_eq!(db_link.time_series()[1].1.error_count(), 1);
    }

    #[test]
    fn test_serialize_map() {
        let f = fixture();
        let map = ApplicationMapBuilder::new(range()).build(&f.duplex, &f.summary, &f.agents);

        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json["nodes"].as_array().unwrap().len(), 3);
        assert_eq!(json["windowSlotSize"], ONE_MINUTE);
        let db_link = json["links"]
            .as_array()
            .unwrap()
            .iter()
            .find(|l| l["to"]["applicationName"] == "orders-db")
            .unwrap();
        assert_eq!(db_link["totalCount"], 2);
        assert_eq!(db_link["histogram"]["Error"], 1);
        assert_eq!(db_link["targetAgentHistogram"]["db:3306"]["100ms"], 1);
    }
}
