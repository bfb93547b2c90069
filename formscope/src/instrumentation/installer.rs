//! Idempotent installation of the interception points
//!
//! Runs the self-test, applies the configured capture toggles and attaches
//! the observer at every interception point. A point the host refuses is
//! logged and skipped; the others still attach.

use std::sync::{Arc, OnceLock};

use log::{debug, info, warn};

use crate::bridge::Session;
use crate::config::InstrumentationConfig;
use crate::domain::HostError;
use crate::host::{CompilerObserver, Host, InterceptionPoint};
use crate::instrumentation::observer::Instrumentation;

/// What happened during the single installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub attached: Vec<InterceptionPoint>,
    pub refused: Vec<(InterceptionPoint, HostError)>,
    /// Self-test result at install time
    pub healthy: bool,
}

impl InstallReport {
    #[must_use]
    pub fn is_fully_attached(&self) -> bool {
        self.refused.is_empty()
    }
}

pub struct Installer {
    session: Arc<Session>,
    config: InstrumentationConfig,
    report: OnceLock<InstallReport>,
}

impl Installer {
    pub fn new(session: Arc<Session>, config: InstrumentationConfig) -> Self {
        Self { session, config, report: OnceLock::new() }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn is_installed(&self) -> bool {
        self.report.get().is_some()
    }

    /// Install into `host` on the first call. Later calls, with any host,
    /// return the first report and change nothing.
    pub fn install<H: Host + 'static>(&self, host: &Arc<H>) -> &InstallReport {
        if let Some(report) = self.report.get() {
            debug!("Instrumentation already installed, skipping");
            return report;
        }
        let host: Arc<dyn Host> = Arc::clone(host) as Arc<dyn Host>;
        self.report.get_or_init(|| self.attach_all(&host))
    }

    fn attach_all(&self, host: &Arc<dyn Host>) -> InstallReport {
        if self.config.verbose {
            info!("Installing compiler instrumentation...");
        }

        let healthy = self.session.self_test().ensure_tested(host.as_ref()).passed();
        self.config.apply(&self.session);

        let observer: Arc<dyn CompilerObserver> = Arc::new(Instrumentation::new(
            Arc::clone(&self.session),
            Arc::downgrade(host),
            self.config.debug,
        ));

        let mut attached = Vec::new();
        let mut refused = Vec::new();
        for point in InterceptionPoint::ALL {
            match host.attach(point, Arc::clone(&observer)) {
                Ok(()) => {
                    if self.config.verbose {
                        info!("✓ Attached {point} interception");
                    }
                    attached.push(point);
                }
                Err(e) => {
                    warn!("⚠️  Could not attach {point} interception: {e}");
                    refused.push((point, e));
                }
            }
        }

        if self.config.verbose {
            info!(
                "Instrumentation installed: {}/{} points attached",
                attached.len(),
                InterceptionPoint::ALL.len()
            );
        }

        InstallReport { attached, refused, healthy }
    }
}

static GLOBAL_INSTALLER: OnceLock<Installer> = OnceLock::new();

/// Install into `host` against [`Session::global`], once per process.
///
/// `config` is only read by the first call.
pub fn install_global<H: Host + 'static>(
    host: &Arc<H>,
    config: InstrumentationConfig,
) -> &'static InstallReport {
    GLOBAL_INSTALLER.get_or_init(|| Installer::new(Session::global(), config)).install(host)
}
