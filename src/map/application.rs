use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;

use crate::schema::ServiceType;

/// Graph node identity: logical name plus service type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Application {
    name: String,
    service_type: ServiceType,
}

impl Application {
    pub fn new(name: impl Into<String>, service_type: ServiceType) -> Self {
        Self {
            name: name.into(),
            service_type,
        }
    }

    /// Synthetic caller node standing in front of an application
    pub fn user(name: impl Into<String>) -> Self {
        Self::new(name, ServiceType::User)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    /// Matches on name and service type name, as given by request filters
    pub fn matches(&self, name: &str, service_type_name: &str) -> bool {
        self.name == name && self.service_type.name() == service_type_name
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.service_type)
    }
}

impl Serialize for Application {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Application", 3)?;
        state.serialize_field("applicationName", &self.name)?;
        state.serialize_field("serviceType", self.service_type.name())?;
        state.serialize_field("serviceTypeCode", &self.service_type.code())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ServiceTypeInfo;
    use std::collections::HashSet;

    #[test]
    fn test_identity_uses_name_and_type() {
        let tomcat = ServiceType::defined(ServiceTypeInfo::server(1010, "TOMCAT"));
        let a = Application::new("web", tomcat.clone());
        let b = Application::new("web", tomcat);
        let user = Application::user("web");

        let mut set = HashSet::new();
        set.insert(a.clone());
        set.insert(b);
        set.insert(user.clone());
        assert_eq!(set.len(), 2);
        assert_ne!(a, user);
    }

    #[test]
    fn test_display_and_serialize() {
        let app = Application::user("web");
        assert_eq!(app.to_string(), "web/USER");

        let json = serde_json::to_value(&app).unwrap();
        assert_eq!(json["applicationName"], "web");
        assert_eq!(json["serviceType"], "USER");
        assert_eq!(json["serviceTypeCode"], 2);
    }
}
