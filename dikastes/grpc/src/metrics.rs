use dikastes_core::Decision;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::{Registry, Unit},
};
use tokio::time;

/// Metrics for the authorization service: gRPC server metrics for the Check
/// RPC and a count of decisions.
#[derive(Clone, Debug)]
pub struct CheckMetrics {
    rpc: GrpcServerRPCMetrics,
    decisions: Family<DecisionLabels, Counter>,
}

/// Server RPC metrics for the unary Check method.
#[derive(Clone, Debug)]
struct GrpcServerRPCMetrics {
    started: Counter,
    handling: Histogram,
    handled: Counter,
}

/// Records the outcome of a single RPC when dropped.
pub(crate) struct ResponseObserver {
    start: time::Instant,
    durations: Histogram,
    handled: Counter,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct Labels {
    grpc_service: &'static str,
    grpc_method: &'static str,
    grpc_type: &'static str,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct CodeLabels {
    grpc_service: &'static str,
    grpc_method: &'static str,
    grpc_type: &'static str,
    grpc_code: &'static str,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct DecisionLabels {
    decision: &'static str,
}

const DECISIONS: [Decision; 3] = [Decision::Ok, Decision::Denied, Decision::Internal];

// === impl CheckMetrics ===

impl CheckMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let decisions = Family::<DecisionLabels, Counter>::default();
        reg.register(
            "decisions",
            "Total number of authorization decisions, by outcome",
            decisions.clone(),
        );
        for decision in DECISIONS {
            let _ = decisions.get_or_create(&DecisionLabels {
                decision: decision.as_str(),
            });
        }

        let rpc = GrpcServerRPCMetrics::register(
            reg.sub_registry_with_prefix("grpc_server"),
            "envoy.service.auth.v3.Authorization",
            "Check",
        );

        Self { rpc, decisions }
    }

    pub(crate) fn start(&self) -> ResponseObserver {
        self.rpc.started.inc();
        ResponseObserver {
            start: time::Instant::now(),
            durations: self.rpc.handling.clone(),
            handled: self.rpc.handled.clone(),
        }
    }

    pub(crate) fn decided(&self, decision: Decision) {
        self.decisions
            .get_or_create(&DecisionLabels {
                decision: decision.as_str(),
            })
            .inc();
    }
}

// === impl GrpcServerRPCMetrics ===

impl GrpcServerRPCMetrics {
    fn register(
        reg: &mut Registry,
        grpc_service: &'static str,
        grpc_method: &'static str,
    ) -> Self {
        let labels = Labels {
            grpc_service,
            grpc_method,
            grpc_type: "unary",
        };

        let started = Family::<Labels, Counter>::default();
        reg.register(
            "started",
            "Total number of RPCs started on the server",
            started.clone(),
        );

        // Decisions, including internal failures, are carried in the response
        // body, so every completed Check is an OK RPC.
        let handled = Family::<CodeLabels, Counter>::default();
        reg.register(
            "handled",
            "Total number of RPCs completed on the server, regardless of success or failure",
            handled.clone(),
        );

        let handling = Family::<Labels, Histogram>::new_with_constructor(|| {
            // Checks are answered from memory; anything slower than a few
            // milliseconds is waiting on the runtime.
            Histogram::new([0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 1.0])
        });
        reg.register_with_unit(
            "handling",
            "Histogram of response latency (seconds) of Check RPCs handled by the server",
            Unit::Seconds,
            handling.clone(),
        );

        let handled = handled
            .get_or_create(&CodeLabels {
                grpc_service,
                grpc_method,
                grpc_type: labels.grpc_type,
                grpc_code: "OK",
            })
            .clone();
        let started = started.get_or_create(&labels).clone();
        let handling = handling.get_or_create(&labels).clone();
        Self {
            started,
            handling,
            handled,
        }
    }
}

// === impl ResponseObserver ===

impl Drop for ResponseObserver {
    fn drop(&mut self) {
        self.durations.observe(self.start.elapsed().as_secs_f64());
        self.handled.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(reg: &Registry) -> String {
        let mut buf = String::new();
        prometheus_client::encoding::text::encode(&mut buf, reg).expect("encode metrics");
        buf
    }

    #[test]
    fn counts_checks_and_decisions() {
        let mut reg = Registry::default();
        let metrics = CheckMetrics::register(&mut reg);

        let rsp = metrics.start();
        metrics.decided(Decision::Denied);
        drop(rsp);

        let text = encode(&reg);
        assert!(text.contains(r#"decisions_total{decision="denied"} 1"#), "{text}");
        assert!(text.contains(r#"decisions_total{decision="ok"} 0"#), "{text}");
        assert!(
            text.contains(r#"grpc_server_started_total{grpc_service="envoy.service.auth.v3.Authorization",grpc_method="Check",grpc_type="unary"} 1"#),
            "{text}"
        );
        assert!(
            text.contains(r#"grpc_server_handled_total{grpc_service="envoy.service.auth.v3.Authorization",grpc_method="Check",grpc_type="unary",grpc_code="OK"} 1"#),
            "{text}"
        );
        assert!(
            text.contains(r#"grpc_server_handling_seconds_count{grpc_service="envoy.service.auth.v3.Authorization",grpc_method="Check",grpc_type="unary"} 1"#),
            "{text}"
        );
        assert!(!text.contains("msg_sent"), "{text}");
    }
}
