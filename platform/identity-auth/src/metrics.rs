use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    pub register_total: IntCounterVec,
    pub login_total: IntCounterVec,
    pub refresh_total: IntCounterVec,
    pub logout_total: IntCounterVec,
    pub publish_fail_total: IntCounterVec,
    pub dep_up: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let counter = |name: &str, help: &str, labels: &[&str]| {
            let c = IntCounterVec::new(Opts::new(name, help), labels).expect("metric definition");
            registry.register(Box::new(c.clone())).expect("metric registration");
            c
        };

        let register_total = counter(
            "auth_register_total",
            "Registration attempts by outcome",
            &["outcome", "reason"],
        );
        let login_total = counter(
            "auth_login_total",
            "Login attempts by outcome",
            &["outcome", "reason"],
        );
        let refresh_total = counter(
            "auth_refresh_total",
            "Token refresh attempts by outcome",
            &["outcome", "reason"],
        );
        let logout_total = counter(
            "auth_logout_total",
            "Logout attempts by outcome",
            &["outcome", "reason"],
        );
        let publish_fail_total = counter(
            "auth_event_publish_fail_total",
            "Event publishes that failed after retry",
            &["subject"],
        );

        let dep_up = IntGaugeVec::new(
            Opts::new("auth_dependency_up", "Dependency availability (1 = up)"),
            &["dependency"],
        )
        .expect("metric definition");
        registry.register(Box::new(dep_up.clone())).expect("metric registration");

        Self {
            registry,
            register_total,
            login_total,
            refresh_total,
            logout_total,
            publish_fail_total,
            dep_up,
        }
    }

    pub fn export(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_the_export() {
        let metrics = Metrics::new();
        metrics
            .register_total
            .with_label_values(&["success", "ok"])
            .inc();

        let exported = metrics.export();
        assert!(exported.contains("auth_register_total"));
    }
}
