use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

pub(crate) const METRIC_SUBSYSTEM: &str = "fleet_rewards";

/// Per-route request counters and latency samples, rendered as Prometheus
/// text by the /metrics endpoint. BTreeMap keeps the exposition ordering
/// stable across scrapes.
#[derive(Debug, Default)]
pub(crate) struct RequestMetrics {
    counts: Mutex<BTreeMap<(String, u16), u64>>,
    latency_ns: Mutex<BTreeMap<String, Vec<u64>>>,
}

impl RequestMetrics {
    pub(crate) fn observe_request(&self, route: &str, status: u16, latency: Duration) {
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry((route.to_string(), status)).or_insert(0) += 1;
        }
        if let Ok(mut samples) = self.latency_ns.lock() {
            let latency_ns = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
            samples.entry(route.to_string()).or_default().push(latency_ns);
        }
    }

    pub(crate) fn render(&self) -> String {
        let mut body = String::new();
        if let Ok(counts) = self.counts.lock() {
            for ((route, status), count) in counts.iter() {
                body.push_str(&format!(
                    "{METRIC_SUBSYSTEM}_requests_total{{route=\"{route}\",status=\"{status}\"}} {count}\n"
                ));
            }
        }
        if let Ok(samples) = self.latency_ns.lock() {
            for (route, values) in samples.iter() {
                let total: u128 = values.iter().map(|v| u128::from(*v)).sum();
                body.push_str(&format!(
                    "{METRIC_SUBSYSTEM}_request_latency_ns_sum{{route=\"{route}\"}} {total}\n\
{METRIC_SUBSYSTEM}_request_latency_ns_count{{route=\"{route}\"}} {}\n",
                    values.len()
                ));
            }
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_every_observed_route_and_status() {
        let metrics = RequestMetrics::default();
        metrics.observe_request("/healthz", 200, Duration::from_micros(50));
        metrics.observe_request("/healthz", 200, Duration::from_micros(70));
        metrics.observe_request("/v1/withdrawals", 403, Duration::from_micros(10));
        let body = metrics.render();
        assert!(body
            .contains("fleet_rewards_requests_total{route=\"/healthz\",status=\"200\"} 2"));
        assert!(body
            .contains("fleet_rewards_requests_total{route=\"/v1/withdrawals\",status=\"403\"} 1"));
        assert!(body.contains("fleet_rewards_request_latency_ns_count{route=\"/healthz\"} 2"));
    }

    #[test]
    fn render_on_a_fresh_registry_is_empty() {
        assert!(RequestMetrics::default().render().is_empty());
    }
}
