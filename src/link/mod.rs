mod duplex;
mod link_data;
mod link_map;

pub use duplex::LinkDataDuplexMap;
pub use link_data::{AgentPair, LinkCallData, LinkData, LinkKey};
pub use link_map::{LinkDataMap, LinkSample};
