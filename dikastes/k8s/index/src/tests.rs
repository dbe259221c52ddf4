use crate::{Index, SharedIndex};
use dikastes_core::{Action, HttpRule, ProviderError, ServiceAccountMatch, WorkloadRef};
use dikastes_k8s_api::{
    self as k8s,
    network_policy::{
        EntityRuleSpec, HttpMatchSpec, PolicyType, RuleSpec, ServiceAccountMatchSpec,
    },
};
use kubert::index::IndexNamespacedResource;
use maplit::btreemap;

const NODE: &str = "node-0";

#[test]
fn resolves_containers_on_local_node() {
    let test = TestConfig::default();
    test.index.write().apply(mk_pod(
        "ns-0",
        "pod-0",
        NODE,
        btreemap! { "app".to_string() => "web".to_string() },
        ["containerd://aaa", "containerd://bbb"],
    ));

    let index = test.index.read();
    for id in ["aaa", "bbb"] {
        assert_eq!(
            index.resolve_container(id, NODE).expect("container must resolve"),
            workload("ns-0", "pod-0"),
        );
    }
    assert!(matches!(
        index.resolve_container("ccc", NODE),
        Err(ProviderError::NotFound(_))
    ));
    assert!(matches!(
        index.resolve_container("aaa", "node-1"),
        Err(ProviderError::NotFound(_))
    ));
}

#[test]
fn pod_updates_replace_container_ids() {
    let test = TestConfig::default();
    test.index.write().apply(mk_pod(
        "ns-0",
        "pod-0",
        NODE,
        Default::default(),
        ["docker://aaa"],
    ));
    test.index.write().apply(mk_pod(
        "ns-0",
        "pod-0",
        NODE,
        Default::default(),
        ["docker://bbb"],
    ));

    let index = test.index.read();
    index
        .resolve_container("aaa", NODE)
        .expect_err("replaced container must not resolve");
    index
        .resolve_container("bbb", NODE)
        .expect("current container must resolve");
}

#[test]
fn deleted_pods_are_forgotten() {
    let test = TestConfig::default();
    test.index.write().apply(mk_pod(
        "ns-0",
        "pod-0",
        NODE,
        Default::default(),
        ["containerd://aaa"],
    ));
    IndexNamespacedResource::<k8s::Pod>::delete(
        &mut *test.index.write(),
        "ns-0".to_string(),
        "pod-0".to_string(),
    );

    let index = test.index.read();
    index
        .resolve_container("aaa", NODE)
        .expect_err("deleted container must not resolve");
    assert!(index.namespaces.is_empty());
}

#[test]
fn selects_policies_in_order() {
    let test = TestConfig::default();
    test.index.write().apply(mk_pod(
        "ns-0",
        "pod-0",
        NODE,
        btreemap! { "app".to_string() => "web".to_string() },
        ["containerd://aaa"],
    ));

    test.index
        .write()
        .apply(mk_policy("ns-0", "unordered", None, "app == 'web'"));
    test.index
        .write()
        .apply(mk_policy("ns-0", "late", Some(200.0), ""));
    test.index
        .write()
        .apply(mk_policy("ns-0", "early", Some(100.0), "has(app)"));
    test.index
        .write()
        .apply(mk_policy("ns-0", "other-app", Some(1.0), "app == 'db'"));
    test.index
        .write()
        .apply(mk_policy("ns-1", "other-ns", Some(1.0), ""));

    let policies = test
        .index
        .read()
        .policies_for(&workload("ns-0", "pod-0"))
        .expect("pod must exist");
    let names = policies.iter().map(|p| p.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, ["early", "late", "unordered"]);

    let early = &policies[0];
    assert_eq!(early.namespace, "ns-0");
    assert_eq!(early.inbound_rules.len(), 1);
    assert_eq!(early.inbound_rules[0].action, Action::Allow);
    assert_eq!(
        early.inbound_rules[0].source.service_accounts,
        Some(ServiceAccountMatch::names(["bar"]))
    );
    assert_eq!(
        early.inbound_rules[0].http,
        Some(HttpRule::methods(["GET"]))
    );
}

#[test]
fn policies_require_known_pod() {
    let test = TestConfig::default();
    test.index
        .write()
        .apply(mk_policy("ns-0", "policy-0", None, ""));

    assert!(matches!(
        test.index.read().policies_for(&workload("ns-0", "pod-0")),
        Err(ProviderError::NotFound(_))
    ));
}

#[test]
fn invalid_policies_are_ignored() {
    let test = TestConfig::default();
    test.index.write().apply(mk_pod(
        "ns-0",
        "pod-0",
        NODE,
        Default::default(),
        ["containerd://aaa"],
    ));
    test.index
        .write()
        .apply(mk_policy("ns-0", "policy-0", None, ""));
    assert_eq!(
        test.index
            .read()
            .policies_for(&workload("ns-0", "pod-0"))
            .expect("pod must exist")
            .len(),
        1
    );

    // An update that can't be indexed removes the prior version.
    test.index
        .write()
        .apply(mk_policy("ns-0", "policy-0", None, "app =="));
    assert!(test
        .index
        .read()
        .policies_for(&workload("ns-0", "pod-0"))
        .expect("pod must exist")
        .is_empty());

    let mut bad_action = mk_policy("ns-0", "policy-1", None, "");
    bad_action.spec.ingress[0].action = "Reject".to_string();
    test.index.write().apply(bad_action);
    assert!(test
        .index
        .read()
        .policies_for(&workload("ns-0", "pod-0"))
        .expect("pod must exist")
        .is_empty());
}

#[test]
fn egress_policies_are_ignored() {
    let test = TestConfig::default();
    test.index.write().apply(mk_pod(
        "ns-0",
        "pod-0",
        NODE,
        Default::default(),
        ["containerd://aaa"],
    ));
    let mut policy = mk_policy("ns-0", "egress", None, "");
    policy.spec.types = Some(vec![PolicyType::Egress]);
    test.index.write().apply(policy);

    assert!(test
        .index
        .read()
        .policies_for(&workload("ns-0", "pod-0"))
        .expect("pod must exist")
        .is_empty());
}

#[test]
fn egress_only_update_removes_policy() {
    let test = TestConfig::default();
    test.index.write().apply(mk_pod(
        "ns-0",
        "pod-0",
        NODE,
        Default::default(),
        ["containerd://aaa"],
    ));
    test.index
        .write()
        .apply(mk_policy("ns-0", "policy-0", None, ""));

    let mut policy = mk_policy("ns-0", "policy-0", None, "");
    policy.spec.types = Some(vec![PolicyType::Egress]);
    test.index.write().apply(policy);

    assert!(test
        .index
        .read()
        .policies_for(&workload("ns-0", "pod-0"))
        .expect("pod must exist")
        .is_empty());
}

#[test]
fn deeply_nested_selectors_are_ignored() {
    let test = TestConfig::default();
    test.index.write().apply(mk_pod(
        "ns-0",
        "pod-0",
        NODE,
        Default::default(),
        ["containerd://aaa"],
    ));
    let selector = format!("{}all(){}", "(".repeat(10_000), ")".repeat(10_000));
    test.index
        .write()
        .apply(mk_policy("ns-0", "policy-0", None, &selector));

    assert!(test
        .index
        .read()
        .policies_for(&workload("ns-0", "pod-0"))
        .expect("pod must exist")
        .is_empty());
}

#[test]
fn deleted_policies_are_forgotten() {
    let test = TestConfig::default();
    test.index.write().apply(mk_pod(
        "ns-0",
        "pod-0",
        NODE,
        Default::default(),
        ["containerd://aaa"],
    ));
    test.index
        .write()
        .apply(mk_policy("ns-0", "policy-0", None, ""));
    IndexNamespacedResource::<k8s::NetworkPolicy>::delete(
        &mut *test.index.write(),
        "ns-0".to_string(),
        "policy-0".to_string(),
    );

    assert!(test
        .index
        .read()
        .policies_for(&workload("ns-0", "pod-0"))
        .expect("pod must exist")
        .is_empty());
}

#[test]
fn strips_runtime_scheme_from_container_ids() {
    assert_eq!(crate::pod::container_id("containerd://abc"), "abc");
    assert_eq!(crate::pod::container_id("cri-o://abc"), "abc");
    assert_eq!(crate::pod::container_id("abc"), "abc");
}

// === Helpers ===

struct TestConfig {
    index: SharedIndex,
    _tracing: tracing::subscriber::DefaultGuard,
}

impl Default for TestConfig {
    fn default() -> Self {
        let _tracing = tracing::subscriber::set_default(
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(tracing::Level::TRACE)
                .finish(),
        );
        Self {
            index: Index::shared(),
            _tracing,
        }
    }
}

fn workload(ns: &str, name: &str) -> WorkloadRef {
    WorkloadRef {
        name: name.to_string(),
        namespace: ns.to_string(),
    }
}

fn mk_pod(
    ns: impl ToString,
    name: impl ToString,
    node: impl ToString,
    labels: std::collections::BTreeMap<String, String>,
    container_ids: impl IntoIterator<Item = &'static str>,
) -> k8s::Pod {
    let container_statuses = container_ids
        .into_iter()
        .enumerate()
        .map(|(i, id)| k8s::ContainerStatus {
            name: format!("c{i}"),
            container_id: Some(id.to_string()),
            ..Default::default()
        })
        .collect();

    k8s::Pod {
        metadata: k8s::ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(k8s::PodSpec {
            node_name: Some(node.to_string()),
            ..Default::default()
        }),
        status: Some(k8s::PodStatus {
            container_statuses: Some(container_statuses),
            ..Default::default()
        }),
    }
}

fn mk_policy(
    ns: impl ToString,
    name: impl ToString,
    order: Option<f64>,
    selector: impl ToString,
) -> k8s::NetworkPolicy {
    k8s::NetworkPolicy {
        metadata: k8s::ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: k8s::NetworkPolicySpec {
            order,
            selector: selector.to_string(),
            types: Some(vec![PolicyType::Ingress]),
            ingress: vec![RuleSpec {
                action: "Allow".to_string(),
                source: EntityRuleSpec {
                    service_accounts: Some(ServiceAccountMatchSpec {
                        names: vec!["bar".to_string()],
                        selector: String::new(),
                    }),
                },
                http: Some(HttpMatchSpec {
                    methods: vec!["GET".to_string()],
                }),
            }],
            egress: vec![],
        },
    }
}
