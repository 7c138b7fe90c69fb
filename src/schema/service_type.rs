use super::histogram::{HistogramSchema, HistogramSlot, FAST_SCHEMA, NORMAL_SCHEMA};
use serde::{Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub type ServiceTypeCode = i16;

pub const UNDEFINED_CODE: ServiceTypeCode = -1;
pub const UNKNOWN_CODE: ServiceTypeCode = 1;
pub const USER_CODE: ServiceTypeCode = 2;

/// Static description of a registered service type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTypeInfo {
    pub code: ServiceTypeCode,
    pub name: String,
    pub desc: String,
    /// Whether calls of this type produce map statistics
    pub record_statistics: bool,
    /// Client side of a remote call; the callee reports its own span
    pub rpc_client: bool,
    /// Leaf node that never reports spans (databases, caches)
    pub terminal: bool,
    pub schema: HistogramSchema,
}

impl ServiceTypeInfo {
    pub fn new(code: ServiceTypeCode, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            code,
            desc: name.clone(),
            name,
            record_statistics: false,
            rpc_client: false,
            terminal: false,
            schema: NORMAL_SCHEMA,
        }
    }

    /// Application server that reports its own spans
    pub fn server(code: ServiceTypeCode, name: impl Into<String>) -> Self {
        Self::new(code, name).with_record_statistics(true)
    }

    /// Outbound remote call whose callee may report a span
    pub fn rpc_client(code: ServiceTypeCode, name: impl Into<String>) -> Self {
        Self::new(code, name)
            .with_record_statistics(true)
            .with_rpc_client(true)
    }

    /// Database, cache or other leaf backend
    pub fn terminal(code: ServiceTypeCode, name: impl Into<String>) -> Self {
        Self::new(code, name)
            .with_record_statistics(true)
            .with_terminal(true)
            .with_schema(FAST_SCHEMA)
    }

    /// Local method call; never part of the map
    pub fn internal(code: ServiceTypeCode, name: impl Into<String>) -> Self {
        Self::new(code, name)
    }

    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    pub fn with_record_statistics(mut self, record: bool) -> Self {
        self.record_statistics = record;
        self
    }

    pub fn with_rpc_client(mut self, rpc_client: bool) -> Self {
        self.rpc_client = rpc_client;
        self
    }

    pub fn with_terminal(mut self, terminal: bool) -> Self {
        self.terminal = terminal;
        self
    }

    pub fn with_schema(mut self, schema: HistogramSchema) -> Self {
        self.schema = schema;
        self
    }
}

/// Resolved service type.
///
/// The synthetic map nodes are variants so that callers match on them
/// instead of comparing names.
#[derive(Debug, Clone)]
pub enum ServiceType {
    /// Code missing from the registry; never recorded
    Undefined,
    /// Callee of a remote call that never reported back
    Unknown,
    /// Caller outside the traced system
    User,
    Defined(Arc<ServiceTypeInfo>),
}

impl ServiceType {
    pub fn defined(info: ServiceTypeInfo) -> Self {
        ServiceType::Defined(Arc::new(info))
    }

    pub fn code(&self) -> ServiceTypeCode {
        match self {
            ServiceType::Undefined => UNDEFINED_CODE,
            ServiceType::Unknown => UNKNOWN_CODE,
            ServiceType::User => USER_CODE,
            ServiceType::Defined(info) => info.code,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ServiceType::Undefined => "UNDEFINED",
            ServiceType::Unknown => "UNKNOWN",
            ServiceType::User => "USER",
            ServiceType::Defined(info) => &info.name,
        }
    }

    pub fn is_record_statistics(&self) -> bool {
        match self {
            ServiceType::Undefined => false,
            ServiceType::Unknown | ServiceType::User => true,
            ServiceType::Defined(info) => info.record_statistics,
        }
    }

    pub fn is_rpc_client(&self) -> bool {
        match self {
            ServiceType::Defined(info) => info.rpc_client,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            ServiceType::Unknown => true,
            ServiceType::Defined(info) => info.terminal,
            _ => false,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, ServiceType::User)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ServiceType::Unknown)
    }

    pub fn histogram_schema(&self) -> &HistogramSchema {
        match self {
            ServiceType::Defined(info) => &info.schema,
            _ => &NORMAL_SCHEMA,
        }
    }

    /// Latency slot for one call of this type
    pub fn slot_for(&self, has_exception: bool, elapsed: i32) -> &HistogramSlot {
        self.histogram_schema().slot_for(has_exception, elapsed)
    }
}

impl PartialEq for ServiceType {
    fn eq(&self, other: &Self) -> bool {
        self.code() == other.code()
    }
}

impl Eq for ServiceType {}

impl Hash for ServiceType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code().hash(state);
    }
}

impl PartialOrd for ServiceType {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServiceType {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.code().cmp(&other.code())
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Serialize for ServiceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::histogram::SlotType;

    #[test]
    fn test_sentinel_properties() {
        assert!(ServiceType::User.is_record_statistics());
        assert!(ServiceType::Unknown.is_record_statistics());
        assert!(!ServiceType::Undefined.is_record_statistics());
        assert!(ServiceType::Unknown.is_terminal());
        assert!(!ServiceType::User.is_rpc_client());
        assert_eq!(ServiceType::User.code(), USER_CODE);
    }

    #[test]
    fn test_equality_by_code() {
        let a = ServiceType::defined(ServiceTypeInfo::server(1010, "TOMCAT"));
        let b = ServiceType::defined(ServiceTypeInfo::server(1010, "TOMCAT").with_desc("Tomcat"));
        assert_eq!(a, b);
        assert_ne!(a, ServiceType::User);
    }

    #[test]
    fn test_terminal_uses_fast_schema() {
        let mysql = ServiceType::defined(ServiceTypeInfo::terminal(2101, "MYSQL"));
        assert_eq!(mysql.slot_for(false, 150).slot_type, SlotType::Normal);

        let tomcat = ServiceType::defined(ServiceTypeInfo::server(1010, "TOMCAT"));
        assert_eq!(tomcat.slot_for(false, 150).slot_type, SlotType::Fast);
    }

    #[test]
    fn test_serialize_as_name() {
        let json = serde_json::to_string(&ServiceType::Unknown).unwrap();
        assert_eq!(json, "\"UNKNOWN\"");
    }
}
