//! Network- and message-level filtering.
//!
//! Both filters are pure predicates over immutable configuration: applying
//! one twice to the same input gives the same answer. The network filter
//! runs once per connection before any byte is parsed; the message filter
//! runs per decoded message. Configured constraints are conjunctive.

use std::net::IpAddr;

use http::{Method, StatusCode};
use regex::bytes::Regex;

use crate::decode::DecodedMessage;
use crate::flow::FlowIdentity;

/// Process-wide filter configuration, built once at startup and shared
/// read-only by every connection handler.
#[derive(Debug, Default)]
pub struct FilterConfig {
    pub network: NetworkFilter,
    pub message: MessageFilter,
}

/// Constraints on a flow's 4-tuple. Unset fields always pass; set fields
/// must match exactly.
#[derive(Debug, Default, Clone)]
pub struct NetworkFilter {
    pub src_ip: Option<IpAddr>,
    pub dst_ip: Option<IpAddr>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
}

impl NetworkFilter {
    /// True when every configured constraint matches the flow.
    pub fn matches(&self, flow: &FlowIdentity) -> bool {
        self.src_ip.is_none_or(|ip| ip == flow.src_ip)
            && self.dst_ip.is_none_or(|ip| ip == flow.dst_ip)
            && self.src_port.is_none_or(|port| port == flow.src_port)
            && self.dst_port.is_none_or(|port| port == flow.dst_port)
    }
}

/// Constraints on a decoded message.
///
/// Direction exclusivity: a method constraint implies request-only and a
/// status constraint implies response-only, on top of the explicit
/// request-only/response-only flags. The content pattern is checked last,
/// against the rendered message (body included unless suppressed).
#[derive(Debug, Default)]
pub struct MessageFilter {
    method: Option<Method>,
    status: Option<StatusCode>,
    request_only: bool,
    response_only: bool,
    content: Option<Regex>,
    suppress_body: bool,
}

impl MessageFilter {
    pub fn new(
        method: Option<Method>,
        status: Option<StatusCode>,
        request_only: bool,
        response_only: bool,
        content: Option<Regex>,
        suppress_body: bool,
    ) -> Self {
        Self { method, status, request_only, response_only, content, suppress_body }
    }

    /// Whether emitted output (and content matching) should omit bodies.
    pub fn suppress_body(&self) -> bool {
        self.suppress_body
    }

    /// True when the message satisfies every configured constraint.
    pub fn matches(&self, message: &DecodedMessage) -> bool {
        match message {
            DecodedMessage::Request(request) => {
                if self.response_only || self.status.is_some() {
                    return false;
                }
                if let Some(method) = &self.method
                    && request.method() != method
                {
                    return false;
                }
            }
            DecodedMessage::Response(response) => {
                if self.request_only || self.method.is_some() {
                    return false;
                }
                if let Some(status) = self.status
                    && response.status() != status
                {
                    return false;
                }
            }
        }

        match &self.content {
            Some(pattern) => pattern.is_match(&message.render(!self.suppress_body)),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{decode_request, decode_response};

    fn flow() -> FlowIdentity {
        FlowIdentity {
            src_ip: "10.0.0.1".parse().unwrap(),
            src_port: 43210,
            dst_ip: "10.0.0.2".parse().unwrap(),
            dst_port: 80,
        }
    }

    fn get_request() -> DecodedMessage {
        decode_request(b"GET /page HTTP/1.1\r\nHost: x\r\n\r\n").unwrap()
    }

    fn post_request() -> DecodedMessage {
        decode_request(b"POST /page HTTP/1.1\r\nContent-Length: 6\r\n\r\nsecret").unwrap()
    }

    fn ok_response() -> DecodedMessage {
        decode_response(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nbody").unwrap()
    }

    #[test]
    fn unconstrained_network_filter_passes_everything() {
        assert!(NetworkFilter::default().matches(&flow()));
    }

    #[test]
    fn fully_constrained_flow_round_trip() {
        let flow = flow();
        let filter = NetworkFilter {
            src_ip: Some(flow.src_ip),
            dst_ip: Some(flow.dst_ip),
            src_port: Some(flow.src_port),
            dst_port: Some(flow.dst_port),
        };
        assert!(filter.matches(&flow));

        // changing any single constrained field fails the match
        assert!(!filter.matches(&FlowIdentity { src_ip: "10.0.0.9".parse().unwrap(), ..flow }));
        assert!(!filter.matches(&FlowIdentity { dst_ip: "10.0.0.9".parse().unwrap(), ..flow }));
        assert!(!filter.matches(&FlowIdentity { src_port: 1, ..flow }));
        assert!(!filter.matches(&FlowIdentity { dst_port: 8080, ..flow }));
    }

    #[test]
    fn method_filter_matches_exactly() {
        let filter = MessageFilter::new(Some(Method::POST), None, false, false, None, false);
        assert!(!filter.matches(&get_request()));
        assert!(filter.matches(&post_request()));
    }

    #[test]
    fn method_filter_implies_request_only() {
        let filter = MessageFilter::new(Some(Method::POST), None, false, false, None, false);
        assert!(!filter.matches(&ok_response()));
    }

    #[test]
    fn status_filter_rejects_any_request() {
        let filter =
            MessageFilter::new(Some(Method::POST), Some(StatusCode::OK), false, false, None, false);
        assert!(!filter.matches(&post_request()));
    }

    #[test]
    fn status_filter_matches_exactly() {
        let filter = MessageFilter::new(None, Some(StatusCode::NOT_FOUND), false, false, None, false);
        assert!(!filter.matches(&ok_response()));
        let filter = MessageFilter::new(None, Some(StatusCode::OK), false, false, None, false);
        assert!(filter.matches(&ok_response()));
    }

    #[test]
    fn request_only_and_response_only_flags() {
        let requests = MessageFilter::new(None, None, true, false, None, false);
        assert!(requests.matches(&get_request()));
        assert!(!requests.matches(&ok_response()));

        let responses = MessageFilter::new(None, None, false, true, None, false);
        assert!(!responses.matches(&get_request()));
        assert!(responses.matches(&ok_response()));
    }

    #[test]
    fn content_pattern_sees_headers_and_body() {
        let filter =
            MessageFilter::new(None, None, false, false, Some(Regex::new("secret").unwrap()), false);
        assert!(filter.matches(&post_request()));
        assert!(!filter.matches(&get_request()));
    }

    #[test]
    fn suppressed_body_is_invisible_to_content_pattern() {
        let filter =
            MessageFilter::new(None, None, false, false, Some(Regex::new("secret").unwrap()), true);
        assert!(!filter.matches(&post_request()));
    }

    #[test]
    fn filtering_is_idempotent() {
        let filter = MessageFilter::new(
            Some(Method::POST),
            None,
            false,
            false,
            Some(Regex::new("secret").unwrap()),
            false,
        );
        let message = post_request();
        let first = filter.matches(&message);
        let second = filter.matches(&message);
        assert_eq!(first, second);
        assert!(first);
    }
}
