use fxhash::FxHashSet;
use std::sync::Arc;

use super::Filter;
use crate::map::builder::span_lookup;
use crate::map::Application;
use crate::schema::{ServiceType, ServiceTypeRegistry};
use crate::trace::{Span, SpanEvent};

/// Keeps transactions containing a matching call between two applications.
///
/// The call is located according to the endpoints: a span without a stored
/// parent when the caller is the user, a span event when the callee never reports spans
/// (terminal or unknown), otherwise a child span of a caller span.
pub struct FromToResponseFilter {
    from: Application,
    to: Application,
    response_from: Option<i64>,
    response_to: Option<i64>,
    include_exception: Option<bool>,
    registry: Arc<dyn ServiceTypeRegistry>,
}

impl FromToResponseFilter {
    pub fn new(from: Application, to: Application, registry: Arc<dyn ServiceTypeRegistry>) -> Self {
        Self {
            from,
            to,
            response_from: None,
            response_to: None,
            include_exception: None,
            registry,
        }
    }

    /// Inclusive response time bounds in milliseconds; `None` leaves the side open
    pub fn with_response_range(mut self, from: Option<i64>, to: Option<i64>) -> Self {
        self.response_from = from;
        self.response_to = to;
        self
    }

    /// `Some(true)` keeps only failed calls, `Some(false)` only successful ones
    pub fn with_include_exception(mut self, include_exception: Option<bool>) -> Self {
        self.include_exception = include_exception;
        self
    }

    fn check_response(&self, elapsed: i64, has_error: bool) -> bool {
        if self.response_from.is_some_and(|from| elapsed < from) {
            return false;
        }
        if self.response_to.is_some_and(|to| elapsed > to) {
            return false;
        }
        match self.include_exception {
            Some(expected) => has_error == expected,
            None => true,
        }
    }

    fn is_application(&self, span: &Span, application: &Application) -> bool {
        span.application_id == application.name()
            && self.registry.find_service_type(span.service_type) == *application.service_type()
    }

    fn event_destination(&self, event: &SpanEvent, span_ids: &FxHashSet<i64>) -> ServiceType {
        let service_type = self.registry.find_service_type(event.service_type);
        let has_acceptor = event
            .next_span_id
            .is_some_and(|next| span_ids.contains(&next));
        if service_type.is_rpc_client() && !has_acceptor {
            ServiceType::Unknown
        } else {
            service_type
        }
    }

    /// Spans called by the user: roots, and spans whose parent never reached storage
    fn include_user_call(&self, transaction: &[Span]) -> bool {
        let span_map = span_lookup(transaction);
        transaction
            .iter()
            .filter(|span| {
                span.parent_span_id
                    .map_or(true, |parent_id| !span_map.contains_key(&parent_id))
            })
            .filter(|span| self.is_application(span, &self.to))
            .any(|span| self.check_response(span.elapsed as i64, span.has_error()))
    }

    fn include_event_call(&self, transaction: &[Span]) -> bool {
        let span_ids: FxHashSet<i64> = transaction.iter().map(|s| s.span_id).collect();
        transaction
            .iter()
            .filter(|span| self.is_application(span, &self.from))
            .flat_map(|span| span.span_events.iter())
            .filter(|event| {
                event.destination_id == self.to.name()
                    && self.event_destination(event, &span_ids) == *self.to.service_type()
            })
            .any(|event| self.check_response(event.end_elapsed as i64, event.has_exception))
    }

    fn include_span_call(&self, transaction: &[Span]) -> bool {
        let caller_ids: FxHashSet<i64> = transaction
            .iter()
            .filter(|span| self.is_application(span, &self.from))
            .map(|span| span.span_id)
            .collect();
        if caller_ids.is_empty() {
            return false;
        }
        transaction
            .iter()
            .filter(|span| span.parent_span_id.is_some_and(|p| caller_ids.contains(&p)))
            .filter(|span| self.is_application(span, &self.to))
            .any(|span| self.check_response(span.elapsed as i64, span.has_error()))
    }
}

impl Filter for FromToResponseFilter {
    fn include(&self, transaction: &[Span]) -> bool {
        let to_type = self.to.service_type();
        if self.from.service_type().is_user() {
            self.include_user_call(transaction)
        } else if to_type.is_terminal() || to_type.is_rpc_client() {
            self.include_event_call(transaction)
        } else {
            self.include_span_call(transaction)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{codes, StaticServiceTypeRegistry};
    use crate::trace::TransactionId;

    fn registry() -> Arc<dyn ServiceTypeRegistry> {
        Arc::new(StaticServiceTypeRegistry::with_defaults())
    }

    fn app(name: &str, code: i16) -> Application {
        Application::new(name, registry().find_service_type(code))
    }

    /// web (root, 120ms) -> api (40ms, failed) -> mysql event (8ms)
    fn transaction() -> Vec<Span> {
        let tx = TransactionId::new("web-1", 1, 1);
        vec![
            Span::new(tx.clone(), 1, "web", codes::TOMCAT, "web-1")
                .with_timing(1_000, 120)
                .with_event(
                    SpanEvent::new(codes::HTTP_CLIENT, "api")
                        .with_timing(10, 45)
                        .with_next_span_id(2),
                )
                .with_event(
                    SpanEvent::new(codes::HTTP_CLIENT, "external.io")
                        .with_timing(60, 30)
                        .with_next_span_id(99),
                ),
            Span::new(tx, 2, "api", codes::TOMCAT, "api-1")
                .with_parent(1)
                .with_timing(1_010, 40)
                .with_err_code(1)
                .with_event(
                    SpanEvent::new(codes::MYSQL_EXECUTE_QUERY, "orders-db").with_timing(5, 8),
                ),
        ]
    }

    #[test]
    fn test_user_to_root_span() {
        let filter = FromToResponseFilter::new(
            Application::user("web"),
            app("web", codes::TOMCAT),
            registry(),
        );
        assert!(filter.include(&transaction()));

        let slow_only = FromToResponseFilter::new(
            Application::user("web"),
            app("web", codes::TOMCAT),
            registry(),
        )
        .with_response_range(Some(500), None);
        assert!(!slow_only.include(&transaction()));
    }

    #[test]
    fn test_user_to_span_with_missing_parent() {
        let tx = TransactionId::new("web-1", 1, 1);
        let orphan = vec![Span::new(tx, 2, "api", codes::TOMCAT, "api-1")
            .with_parent(42)
            .with_timing(1_010, 40)];

        let filter = FromToResponseFilter::new(
            Application::user("api"),
            app("api", codes::TOMCAT),
            registry(),
        );
        assert!(filter.include(&orphan));

        // api's parent is stored, so it was called by web
        let from_user = FromToResponseFilter::new(
            Application::user("api"),
            app("api", codes::TOMCAT),
            registry(),
        );
        assert!(!from_user.include(&transaction()));
    }

    #[test]
    fn test_span_to_span_with_exception() {
        let failed = FromToResponseFilter::new(
            app("web", codes::TOMCAT),
            app("api", codes::TOMCAT),
            registry(),
        )
        .with_include_exception(Some(true));
        assert!(failed.include(&transaction()));

        let succeeded = FromToResponseFilter::new(
            app("web", codes::TOMCAT),
            app("api", codes::TOMCAT),
            registry(),
        )
        .with_include_exception(Some(false));
        assert!(!succeeded.include(&transaction()));
    }

    #[test]
    fn test_span_event_to_terminal() {
        let db = FromToResponseFilter::new(
            app("api", codes::TOMCAT),
            app("orders-db", codes::MYSQL_EXECUTE_QUERY),
            registry(),
        )
        .with_response_range(Some(0), Some(10));
        assert!(db.include(&transaction()));

        let wrong_caller = FromToResponseFilter::new(
            app("web", codes::TOMCAT),
            app("orders-db", codes::MYSQL_EXECUTE_QUERY),
            registry(),
        );
        assert!(!wrong_caller.include(&transaction()));
    }

    #[test]
    fn test_unanswered_rpc_matches_unknown() {
        let unknown = FromToResponseFilter::new(
            app("web", codes::TOMCAT),
            Application::new("external.io", ServiceType::Unknown),
            registry(),
        );
        assert!(unknown.include(&transaction()));

        let answered_as_unknown = FromToResponseFilter::new(
            app("web", codes::TOMCAT),
            Application::new("api", ServiceType::Unknown),
            registry(),
        );
        assert!(!answered_as_unknown.include(&transaction()));
    }
}
