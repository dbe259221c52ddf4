use crate::rule::HttpRule;
use tracing::trace;

/// Matches any request method.
pub const WILDCARD_METHOD: &str = "*";

/// Checks whether a request's method satisfies a rule's HTTP constraint. An
/// absent constraint matches every request.
pub fn match_http(rule: Option<&HttpRule>, method: &str) -> bool {
    match rule {
        None => {
            trace!("No HTTP rule");
            true
        }
        Some(HttpRule { methods }) => match_methods(methods, method),
    }
}

pub fn match_methods(methods: &[String], method: &str) -> bool {
    if methods.is_empty() {
        trace!("Rule has no HTTP methods");
        return true;
    }

    for m in methods {
        if m == WILDCARD_METHOD {
            trace!("Rule matches all methods with wildcard");
            return true;
        }
        if m == method {
            trace!(%method, "HTTP method matched");
            return true;
        }
    }

    trace!(?methods, %method, "HTTP method not matched");
    false
}
