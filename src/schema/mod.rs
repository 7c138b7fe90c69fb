pub mod histogram;
pub mod registry;
pub mod service_type;

pub use histogram::{HistogramSchema, HistogramSlot, SlotType, FAST_SCHEMA, NORMAL_SCHEMA};
pub use registry::{codes, RegistryError, ServiceTypeRegistry, StaticServiceTypeRegistry};
pub use service_type::{
    ServiceType, ServiceTypeCode, ServiceTypeInfo, UNDEFINED_CODE, UNKNOWN_CODE, USER_CODE,
};
