use dashmap::DashMap;

use super::dao::{AgentInfo, AgentInfoService};
use crate::window::Range;

/// Agent registry held in memory, keyed by application name
#[derive(Debug, Default)]
pub struct StaticAgentInfoService {
    agents: DashMap<String, Vec<AgentInfo>>,
}

impl StaticAgentInfoService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent. Repeated registrations of one agent id keep the
    /// earliest start time.
    pub fn register(&self, agent: AgentInfo) {
        let mut agents = self.agents.entry(agent.application_name.clone()).or_default();
        match agents.iter_mut().find(|a| a.agent_id == agent.agent_id) {
            Some(existing) => {
                if agent.start_timestamp <= existing.start_timestamp {
                    *existing = agent;
                }
            }
            None => agents.push(agent),
        }
    }

    pub fn application_count(&self) -> usize {
        self.agents.len()
    }
}

impl AgentInfoService for StaticAgentInfoService {
    fn agents_of(&self, application_name: &str, range: Range) -> Vec<AgentInfo> {
        let mut agents: Vec<AgentInfo> = self
            .agents
            .get(application_name)
            .map(|entry| {
                entry
                    .iter()
                    .filter(|a| a.start_timestamp <= range.to())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        agents
    }
}
