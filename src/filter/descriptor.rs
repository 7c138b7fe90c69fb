//! Short-key JSON filter descriptors
//!
//! ```json
//! [{"fa": "web", "fst": "TOMCAT", "ta": "orders-db", "tst": "MYSQL",
//!   "ie": true, "rf": 0, "rt": "max", "url": "^/orders"}]
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{
    AcceptAllFilter, Filter, FilterChain, FilterError, FromToResponseFilter, UrlPatternFilter,
};
use crate::map::Application;
use crate::schema::{ServiceType, ServiceTypeRegistry};

/// One caller/callee condition
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterDescriptor {
    #[serde(rename = "fa", default)]
    pub from_application: Option<String>,
    #[serde(rename = "fst", default)]
    pub from_service_type: Option<String>,
    #[serde(rename = "ta", default)]
    pub to_application: Option<String>,
    #[serde(rename = "tst", default)]
    pub to_service_type: Option<String>,
    /// Keep only failed (`true`) or only successful (`false`) calls
    #[serde(rename = "ie", default)]
    pub include_exception: Option<bool>,
    #[serde(rename = "rf", default)]
    pub response_from: Option<i64>,
    #[serde(rename = "rt", default)]
    pub response_to: Option<ResponseBound>,
    /// Regular expression on the root span's request URI
    #[serde(rename = "url", default)]
    pub url_pattern: Option<String>,
}

impl FilterDescriptor {
    fn has_link_condition(&self) -> bool {
        self.from_application.is_some()
            || self.from_service_type.is_some()
            || self.to_application.is_some()
            || self.to_service_type.is_some()
    }
}

/// Upper response bound: milliseconds or the keyword `"max"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBound {
    Millis(i64),
    Keyword(String),
}

impl ResponseBound {
    fn millis(&self) -> Result<Option<i64>, FilterError> {
        match self {
            ResponseBound::Millis(ms) => Ok(Some(*ms)),
            ResponseBound::Keyword(k) if k.eq_ignore_ascii_case("max") => Ok(None),
            ResponseBound::Keyword(k) => Err(FilterError::InvalidResponseBound(k.clone())),
        }
    }
}

/// Turns descriptors into a filter chain, resolving service type names
#[derive(Clone)]
pub struct FilterBuilder {
    registry: Arc<dyn ServiceTypeRegistry>,
}

impl FilterBuilder {
    pub fn new(registry: Arc<dyn ServiceTypeRegistry>) -> Self {
        Self { registry }
    }

    /// Parse a JSON array of descriptors and build the chain
    pub fn parse(&self, json: &str) -> Result<Box<dyn Filter>, FilterError> {
        let trimmed = json.trim();
        if trimmed.is_empty() {
            return Ok(Box::new(AcceptAllFilter));
        }
        let descriptors: Vec<FilterDescriptor> = serde_json::from_str(trimmed)?;
        self.build(&descriptors)
    }

    /// All descriptors must hold; no descriptors keeps every transaction
    pub fn build(&self, descriptors: &[FilterDescriptor]) -> Result<Box<dyn Filter>, FilterError> {
        if descriptors.is_empty() {
            return Ok(Box::new(AcceptAllFilter));
        }

        let mut chain = FilterChain::new();
        for descriptor in descriptors {
            // a url-only descriptor carries no caller/callee condition
            if descriptor.has_link_condition() || descriptor.url_pattern.is_none() {
                chain.push(Box::new(self.from_to_filter(descriptor)?));
            }
            if let Some(pattern) = &descriptor.url_pattern {
                chain.push(Box::new(UrlPatternFilter::new(pattern)?));
            }
        }
        Ok(Box::new(chain))
    }

    fn from_to_filter(
        &self,
        descriptor: &FilterDescriptor,
    ) -> Result<FromToResponseFilter, FilterError> {
        let from_type = self.service_type(descriptor.from_service_type.as_deref(), "fst")?;
        let to_name = required(descriptor.to_application.as_deref(), "ta")?;
        let to_type = self.service_type(descriptor.to_service_type.as_deref(), "tst")?;

        let from = if from_type.is_user() {
            Application::user(descriptor.from_application.as_deref().unwrap_or(to_name))
        } else {
            let from_name = required(descriptor.from_application.as_deref(), "fa")?;
            Application::new(from_name, from_type)
        };
        let to = Application::new(to_name, to_type);

        let response_to = match &descriptor.response_to {
            Some(bound) => bound.millis()?,
            None => None,
        };
        if let (Some(from), Some(to)) = (descriptor.response_from, response_to) {
            if from > to {
                return Err(FilterError::InvalidResponseRange { from, to });
            }
        }

        Ok(FromToResponseFilter::new(from, to, Arc::clone(&self.registry))
            .with_response_range(descriptor.response_from, response_to)
            .with_include_exception(descriptor.include_exception))
    }

    fn service_type(
        &self,
        name: Option<&str>,
        field: &'static str,
    ) -> Result<ServiceType, FilterError> {
        let name = required(name, field)?;
        self.registry
            .find_service_type_by_name(name)
            .ok_or_else(|| FilterError::UnknownServiceType(name.to_string()))
    }
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, FilterError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(FilterError::MissingField(field)),
    }
}
