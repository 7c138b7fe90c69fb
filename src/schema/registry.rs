//! Service type registry
//!
//! Read-only lookup from stored service type codes to resolved types. The
//! map engine receives it as a trait object; tests substitute their own table.

use super::service_type::{ServiceType, ServiceTypeCode, ServiceTypeInfo};
use fxhash::FxHashMap;

/// Well-known service type codes carried by the default registry
pub mod codes {
    use super::ServiceTypeCode;

    pub const STAND_ALONE: ServiceTypeCode = 1000;
    pub const TOMCAT: ServiceTypeCode = 1010;
    pub const TOMCAT_METHOD: ServiceTypeCode = 1011;
    pub const SPRING_BOOT: ServiceTypeCode = 1210;
    pub const UNKNOWN_DB: ServiceTypeCode = 2050;
    pub const MYSQL: ServiceTypeCode = 2100;
    pub const MYSQL_EXECUTE_QUERY: ServiceTypeCode = 2101;
    pub const POSTGRESQL_EXECUTE_QUERY: ServiceTypeCode = 2501;
    pub const INTERNAL_METHOD: ServiceTypeCode = 5000;
    pub const SPRING_BEAN: ServiceTypeCode = 5071;
    pub const MEMCACHED: ServiceTypeCode = 8050;
    pub const REDIS: ServiceTypeCode = 8200;
    pub const THRIFT_CLIENT: ServiceTypeCode = 8000;
    pub const HTTP_CLIENT: ServiceTypeCode = 9050;
    pub const ASYNC_HTTP_CLIENT: ServiceTypeCode = 9056;
}

pub trait ServiceTypeRegistry: Send + Sync {
    /// Resolve a stored code. Total: unregistered codes yield `ServiceType::Undefined`.
    fn find_service_type(&self, code: ServiceTypeCode) -> ServiceType;

    fn find_service_type_by_name(&self, name: &str) -> Option<ServiceType>;
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Service type code {0} already registered")]
    DuplicateCode(ServiceTypeCode),

    #[error("Service type name '{0}' already registered")]
    DuplicateName(String),
}

/// In-memory registry backed by a fixed table
#[derive(Debug, Clone)]
pub struct StaticServiceTypeRegistry {
    by_code: FxHashMap<ServiceTypeCode, ServiceType>,
    by_name: FxHashMap<String, ServiceType>,
}

impl StaticServiceTypeRegistry {
    /// Registry holding only the sentinel types
    pub fn new() -> Self {
        let mut registry = Self {
            by_code: FxHashMap::default(),
            by_name: FxHashMap::default(),
        };
        for sentinel in [ServiceType::Undefined, ServiceType::Unknown, ServiceType::User] {
            registry.by_code.insert(sentinel.code(), sentinel.clone());
            registry.by_name.insert(sentinel.name().to_string(), sentinel);
        }
        registry
    }

    /// Registry pre-loaded with common servers, clients and backends
    pub fn with_defaults() -> Self {
        let defaults = [
            ServiceTypeInfo::server(codes::STAND_ALONE, "STAND_ALONE"),
            ServiceTypeInfo::server(codes::TOMCAT, "TOMCAT"),
            ServiceTypeInfo::internal(codes::TOMCAT_METHOD, "TOMCAT_METHOD"),
            ServiceTypeInfo::server(codes::SPRING_BOOT, "SPRING_BOOT"),
            ServiceTypeInfo::terminal(codes::UNKNOWN_DB, "UNKNOWN_DB"),
            ServiceTypeInfo::terminal(codes::MYSQL, "MYSQL"),
            ServiceTypeInfo::terminal(codes::MYSQL_EXECUTE_QUERY, "MYSQL_EXECUTE_QUERY"),
            ServiceTypeInfo::terminal(
                codes::POSTGRESQL_EXECUTE_QUERY,
                "POSTGRESQL_EXECUTE_QUERY",
            ),
            ServiceTypeInfo::internal(codes::INTERNAL_METHOD, "INTERNAL_METHOD"),
            ServiceTypeInfo::internal(codes::SPRING_BEAN, "SPRING_BEAN"),
            ServiceTypeInfo::terminal(codes::MEMCACHED, "MEMCACHED"),
            ServiceTypeInfo::terminal(codes::REDIS, "REDIS"),
            ServiceTypeInfo::rpc_client(codes::THRIFT_CLIENT, "THRIFT_CLIENT"),
            ServiceTypeInfo::rpc_client(codes::HTTP_CLIENT, "HTTP_CLIENT"),
            ServiceTypeInfo::rpc_client(codes::ASYNC_HTTP_CLIENT, "ASYNC_HTTP_CLIENT"),
        ];

        defaults
            .into_iter()
            .fold(Self::new(), |registry, info| registry.with(info))
    }

    /// Register a service type
    pub fn register(&mut self, info: ServiceTypeInfo) -> Result<(), RegistryError> {
        if self.by_code.contains_key(&info.code) {
            return Err(RegistryError::DuplicateCode(info.code));
        }
        if self.by_name.contains_key(&info.name) {
            return Err(RegistryError::DuplicateName(info.name));
        }

        let service_type = ServiceType::defined(info);
        self.by_name
            .insert(service_type.name().to_string(), service_type.clone());
        self.by_code.insert(service_type.code(), service_type);
        Ok(())
    }

    /// Builder-style registration; a duplicate entry replaces nothing and is logged
    pub fn with(mut self, info: ServiceTypeInfo) -> Self {
        if let Err(e) = self.register(info) {
            tracing::warn!("Ignoring service type registration: {}", e);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

impl Default for StaticServiceTypeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ServiceTypeRegistry for StaticServiceTypeRegistry {
    fn find_service_type(&self, code: ServiceTypeCode) -> ServiceType {
        self.by_code
            .get(&code)
            .cloned()
            .unwrap_or(ServiceType::Undefined)
    }

    fn find_service_type_by_name(&self, name: &str) -> Option<ServiceType> {
        self.by_name.get(name).cloned()
    }
}
