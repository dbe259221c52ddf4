use crate::{
    identity::ServiceAccountIdentity, labels::Labels, rule::ServiceAccountMatch,
    selector::Selector,
};
use std::collections::BTreeSet;
use tracing::{debug, trace, warn};

/// Checks whether a caller's identity and labels satisfy a rule's service
/// account constraint. An absent constraint matches every caller.
pub fn match_service_account(
    sa_match: Option<&ServiceAccountMatch>,
    id: &ServiceAccountIdentity,
    labels: &Labels,
) -> bool {
    trace!(?sa_match, %id, ?labels, "Matching service account");
    let Some(sa_match) = sa_match else {
        trace!("No service account match on rule");
        return true;
    };

    match_names(&sa_match.names, &id.name) && match_labels(&sa_match.selector, labels)
}

pub fn match_names(names: &BTreeSet<String>, name: &str) -> bool {
    if names.is_empty() {
        trace!("No service account names on rule");
        return true;
    }

    let matched = names.contains(name);
    trace!(?names, %name, matched, "Matched service account name");
    matched
}

/// Evaluates a selector expression against the caller's labels.
///
/// An expression that can't be parsed never matches.
pub fn match_labels(selector: &str, labels: &Labels) -> bool {
    if selector.is_empty() {
        trace!("No service account selector on rule");
        return true;
    }

    let sel = match Selector::parse(selector) {
        Ok(sel) => sel,
        Err(error) => {
            warn!(%selector, %error, "Could not parse policy selector");
            return false;
        }
    };

    let matched = sel.matches(labels);
    debug!(%selector, ?labels, matched, "Evaluated service account selector");
    matched
}
