use std::{collections::BTreeSet, fmt};

/// A named, ordered group of rules that applies to a destination workload.
#[derive(Clone, Debug, PartialEq)]
pub struct Policy {
    pub name: String,
    pub namespace: String,

    /// Policies with a lower order are evaluated first. Policies without an
    /// order are evaluated after all ordered policies.
    pub order: Option<f64>,

    pub inbound_rules: Vec<Rule>,
}

/// A single directional match clause.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rule {
    pub action: Action,
    pub source: EntityRule,
    pub http: Option<HttpRule>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Action {
    #[default]
    Allow,
    Deny,
    Log,
    Pass,
}

/// Describes which callers a rule applies to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntityRule {
    pub service_accounts: Option<ServiceAccountMatch>,
}

/// Constrains a caller's service account.
///
/// An empty name set or an empty selector matches every caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceAccountMatch {
    pub names: BTreeSet<String>,
    pub selector: String,
}

/// Constrains the attributes of an HTTP request.
///
/// An empty method list, or one containing `*`, matches every method.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpRule {
    pub methods: Vec<String>,
}

// === impl Action ===

impl std::str::FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "Allow" | "allow" => Ok(Self::Allow),
            "Deny" | "deny" => Ok(Self::Deny),
            "Log" | "log" => Ok(Self::Log),
            "Pass" | "pass" => Ok(Self::Pass),
            s => Err(anyhow::anyhow!("invalid rule action: {:?}", s)),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => "Allow".fmt(f),
            Self::Deny => "Deny".fmt(f),
            Self::Log => "Log".fmt(f),
            Self::Pass => "Pass".fmt(f),
        }
    }
}

// === impl ServiceAccountMatch ===

impl ServiceAccountMatch {
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Self {
            names: names.into_iter().map(|n| n.to_string()).collect(),
            selector: String::new(),
        }
    }

    pub fn selector(selector: impl ToString) -> Self {
        Self {
            names: BTreeSet::new(),
            selector: selector.to_string(),
        }
    }
}

// === impl HttpRule ===

impl HttpRule {
    pub fn methods<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Self {
            methods: methods.into_iter().map(|m| m.to_string()).collect(),
        }
    }
}
