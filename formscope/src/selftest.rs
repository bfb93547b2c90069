//! Self-test for host internals drift
//!
//! The interception points reach into host internals through reflective
//! bindings that can vanish or change shape between host versions. Before
//! first use, every binding is probed once. Failures are logged in a single
//! warning block and flip the health flag; the caller is never blocked or
//! failed.

use log::{debug, warn};
use std::sync::OnceLock;

use crate::domain::HostError;
use crate::host::{Capability, Host, InterceptionPoint};
use crate::instrumentation::guard::run_guarded;

/// One binding the host failed to provide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub capability: Capability,
    pub error: HostError,
}

/// Outcome of probing every [`Capability`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelfTestReport {
    pub failures: Vec<ProbeFailure>,
}

impl SelfTestReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// Interception points that will run degraded, deduplicated and ordered.
    #[must_use]
    pub fn degraded_points(&self) -> Vec<InterceptionPoint> {
        let mut points: Vec<_> =
            self.failures.iter().flat_map(|f| f.capability.used_by().iter().copied()).collect();
        points.sort_unstable();
        points.dedup();
        points
    }
}

/// Runs the probes at most once per process (per [`Session`](crate::bridge::Session)).
#[derive(Debug, Default)]
pub struct SelfTest {
    report: OnceLock<SelfTestReport>,
}

impl SelfTest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe `host` on the first call; later calls return the first report.
    ///
    /// Concurrent first callers block until the single run finishes.
    pub fn ensure_tested(&self, host: &dyn Host) -> &SelfTestReport {
        self.report.get_or_init(|| {
            let report = run_probes(host);
            log_report(&report);
            report
        })
    }

    /// True until a self-test has run and found a missing binding.
    pub fn is_healthy(&self) -> bool {
        self.report.get().map_or(true, SelfTestReport::passed)
    }

    pub fn report(&self) -> Option<&SelfTestReport> {
        self.report.get()
    }
}

/// Probe every capability. A panicking probe counts as a failure.
pub fn run_probes(host: &dyn Host) -> SelfTestReport {
    let failures = Capability::ALL
        .into_iter()
        .filter_map(|capability| {
            let outcome = run_guarded(capability, false, || Ok(host.probe(capability)));
            let error = match outcome {
                Some(Ok(())) => return None,
                Some(Err(e)) => e,
                None => HostError::Other(format!("probe for {capability} panicked")),
            };
            Some(ProbeFailure { capability, error })
        })
        .collect();
    SelfTestReport { failures }
}

fn log_report(report: &SelfTestReport) {
    if report.passed() {
        debug!("Self-test passed: {} host bindings available", Capability::ALL.len());
        return;
    }

    let mut message = String::from("⚠️  Host self-test failed; capture may be incomplete.\n");
    for failure in &report.failures {
        message.push_str(&format!("   - {}: {}\n", failure.capability, failure.error));
    }
    let degraded: Vec<_> = report.degraded_points().iter().map(|p| p.as_str()).collect();
    message.push_str(&format!("   Degraded interception points: {}", degraded.join(", ")));
    warn!("{message}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimHost;

    #[test]
    fn test_healthy_before_first_run() {
        let self_test = SelfTest::new();
        assert!(self_test.is_healthy());
        assert!(self_test.report().is_none());
    }

    #[test]
    fn test_missing_binding_marks_unhealthy() {
        let host = SimHost::new();
        host.break_capability(Capability::CompilerLine);

        let self_test = SelfTest::new();
        let report = self_test.ensure_tested(&host);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].capability, Capability::CompilerLine);
        assert_eq!(report.degraded_points(), vec![InterceptionPoint::Transform]);
        assert!(!self_test.is_healthy());
    }

    #[test]
    fn test_runs_once() {
        let host = SimHost::new();
        let self_test = SelfTest::new();
        assert!(self_test.ensure_tested(&host).passed());

        // Breaking a binding later does not re-run the probes
        host.break_capability(Capability::VarSymbol);
        assert!(self_test.ensure_tested(&host).passed());
        assert!(self_test.is_healthy());
    }
}
