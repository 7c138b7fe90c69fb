mod agent;
mod dao;
mod trace_store;

pub use agent::StaticAgentInfoService;
pub use dao::{
    AgentInfo, AgentInfoService, ApplicationTraceIndexDao, LimitedScanResult, SelectedScatterArea,
    StorageError, TraceDao,
};
pub use trace_store::MemoryTraceStore;
