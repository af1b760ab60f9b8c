//! Request counters rendered in Prometheus text format

use crate::error::RejectReason;
use radius_proto::AcctStatusType;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

const ACCT_STATUSES: [AcctStatusType; 5] = [
    AcctStatusType::Start,
    AcctStatusType::Stop,
    AcctStatusType::InterimUpdate,
    AcctStatusType::AccountingOn,
    AcctStatusType::AccountingOff,
];

fn status_index(status: AcctStatusType) -> usize {
    ACCT_STATUSES
        .iter()
        .position(|s| *s == status)
        .unwrap_or_default()
}

/// Process-wide counters, shared by both listeners
#[derive(Debug, Default)]
pub struct Metrics {
    auth_requests: AtomicU64,
    accepts: AtomicU64,
    challenges: AtomicU64,
    rejects: [AtomicU64; RejectReason::ALL.len()],
    acct_requests: [AtomicU64; ACCT_STATUSES.len()],
    acct_errors: AtomicU64,
    dropped: AtomicU64,
    disconnects_acked: AtomicU64,
    disconnects_failed: AtomicU64,
}

/// Prometheus text builder
#[derive(Debug, Default)]
struct PrometheusText {
    content: String,
}

impl PrometheusText {
    fn add_counter(&mut self, name: &str, value: u64, help: &str) {
        let _ = writeln!(self.content, "# HELP {} {}", name, help);
        let _ = writeln!(self.content, "# TYPE {} counter", name);
        let _ = writeln!(self.content, "{} {}", name, value);
    }

    fn add_labeled_counter(&mut self, name: &str, label: &str, values: &[(&str, u64)], help: &str) {
        let _ = writeln!(self.content, "# HELP {} {}", name, help);
        let _ = writeln!(self.content, "# TYPE {} counter", name);
        for (label_value, value) in values {
            let _ = writeln!(self.content, "{}{{{}=\"{}\"}} {}", name, label, label_value, value);
        }
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auth_request(&self) {
        self.auth_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn accept(&self) {
        self.accepts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn challenge(&self) {
        self.challenges.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reject(&self, reason: RejectReason) {
        self.rejects[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn acct_request(&self, status: AcctStatusType) {
        self.acct_requests[status_index(status)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn acct_error(&self) {
        self.acct_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Packet discarded without a reply
    pub fn drop_packet(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn disconnect(&self, acknowledged: bool) {
        if acknowledged {
            self.disconnects_acked.fetch_add(1, Ordering::Relaxed);
        } else {
            self.disconnects_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn rejects(&self, reason: RejectReason) -> u64 {
        self.rejects[reason.index()].load(Ordering::Relaxed)
    }

    pub fn accepts(&self) -> u64 {
        self.accepts.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn acct_requests(&self, status: AcctStatusType) -> u64 {
        self.acct_requests[status_index(status)].load(Ordering::Relaxed)
    }

    pub fn render(&self) -> String {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let mut text = PrometheusText::default();

        text.add_counter(
            "radius_auth_requests_total",
            load(&self.auth_requests),
            "Access-Requests received",
        );
        text.add_counter("radius_auth_accepts_total", load(&self.accepts), "Access-Accepts sent");
        text.add_counter(
            "radius_auth_challenges_total",
            load(&self.challenges),
            "Access-Challenges sent",
        );

        let rejects: Vec<(&str, u64)> = RejectReason::ALL
            .iter()
            .map(|r| (r.code(), self.rejects(*r)))
            .collect();
        text.add_labeled_counter(
            "radius_auth_rejects_total",
            "reason",
            &rejects,
            "Access-Rejects sent by reason",
        );

        let acct: Vec<(&str, u64)> = ACCT_STATUSES
            .iter()
            .map(|s| (s.as_str(), self.acct_requests(*s)))
            .collect();
        text.add_labeled_counter(
            "radius_acct_requests_total",
            "status",
            &acct,
            "Accounting-Requests by Acct-Status-Type",
        );
        text.add_counter(
            "radius_acct_errors_total",
            load(&self.acct_errors),
            "Accounting repository failures",
        );
        text.add_counter("radius_dropped_total", load(&self.dropped), "Packets silently dropped");
        text.add_counter(
            "radius_disconnect_acked_total",
            load(&self.disconnects_acked),
            "Disconnect-Requests acknowledged",
        );
        text.add_counter(
            "radius_disconnect_failed_total",
            load(&self.disconnects_failed),
            "Disconnect-Requests that were refused or timed out",
        );
        text.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.reject(RejectReason::PasswordMismatch);
        metrics.reject(RejectReason::PasswordMismatch);
        metrics.acct_request(AcctStatusType::InterimUpdate);
        metrics.accept();

        assert_eq!(metrics.rejects(RejectReason::PasswordMismatch), 2);
        assert_eq!(metrics.rejects(RejectReason::UserDisabled), 0);
        assert_eq!(metrics.acct_requests(AcctStatusType::InterimUpdate), 1);
        assert_eq!(metrics.accepts(), 1);
    }

    #[test]
    fn test_render_prometheus_text() {
        let metrics = Metrics::new();
        metrics.reject(RejectReason::RateLimited);
        metrics.acct_request(AcctStatusType::Start);

        let text = metrics.render();
        assert!(text.contains("# TYPE radius_auth_rejects_total counter"));
        assert!(text.contains("radius_auth_rejects_total{reason=\"rate-limited\"} 1"));
        assert!(text.contains("radius_auth_rejects_total{reason=\"user-disabled\"} 0"));
        assert!(text.contains("radius_acct_requests_total{status=\"start\"} 1"));
    }
}
