//! Result listeners
//!
//! A listener is selected by type name through the `suite-listener` key. The
//! [`ListenerRegistry`] maps names to factory functions registered at process
//! start, and [`ListenerDispatch`] holds the zero-or-one listener of a run.

use crate::compare::{ComparisonReport, Outcome};
use crate::config::{keys, Configuration};
use crate::suite::SuiteSummary;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Receives comparison outcomes
pub trait ResultListener: Send {
    fn on_result(&mut self, report: &ComparisonReport) -> anyhow::Result<()>;

    fn on_suite_started(&mut self, _configuration: &Configuration) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_suite_completed(&mut self, _summary: &SuiteSummary) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Builds a listener from the effective configuration
pub type ListenerFactory = fn(&Configuration) -> anyhow::Result<Box<dyn ResultListener>>;

/// Type name to factory mapping
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    factories: BTreeMap<String, ListenerFactory>,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `log` and `json-report` registered
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(TracingListener::TYPE_NAME, TracingListener::create);
        registry.register(JsonReportListener::TYPE_NAME, JsonReportListener::create);
        registry
    }

    /// Register `factory` under `type_name`, replacing any earlier one
    pub fn register(&mut self, type_name: impl Into<String>, factory: ListenerFactory) {
        self.factories.insert(type_name.into(), factory);
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Instantiate the listener registered as `type_name`
    pub fn resolve(
        &self,
        type_name: &str,
        configuration: &Configuration,
    ) -> Result<Box<dyn ResultListener>> {
        let factory = self.factories.get(type_name).ok_or_else(|| {
            Error::ListenerResolutionFailed(format!("no listener registered as '{}'", type_name))
        })?;
        factory(configuration).map_err(|e| {
            Error::ListenerResolutionFailed(format!("cannot construct '{}': {}", type_name, e))
        })
    }
}

/// The listener of a single run, if any
#[derive(Default)]
pub struct ListenerDispatch {
    listener: Option<(String, Box<dyn ResultListener>)>,
}

impl ListenerDispatch {
    /// Dispatch that notifies nobody
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(type_name: impl Into<String>, listener: Box<dyn ResultListener>) -> Self {
        Self {
            listener: Some((type_name.into(), listener)),
        }
    }

    /// Resolve the listener named by `suite-listener`, if the key is set
    pub fn resolve(registry: &ListenerRegistry, configuration: &Configuration) -> Result<Self> {
        match configuration.get(keys::SUITE_LISTENER) {
            None => Ok(Self::none()),
            Some(type_name) => {
                let listener = registry.resolve(type_name, configuration)?;
                debug!("Resolved listener '{}'", type_name);
                Ok(Self::new(type_name, listener))
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.listener.is_some()
    }

    pub fn listener_name(&self) -> Option<&str> {
        self.listener.as_ref().map(|(name, _)| name.as_str())
    }

    pub fn notify(&mut self, report: &ComparisonReport) -> Result<()> {
        self.invoke(|listener| listener.on_result(report))
    }

    pub fn suite_started(&mut self, configuration: &Configuration) -> Result<()> {
        self.invoke(|listener| listener.on_suite_started(configuration))
    }

    pub fn suite_completed(&mut self, summary: &SuiteSummary) -> Result<()> {
        self.invoke(|listener| listener.on_suite_completed(summary))
    }

    fn invoke<F>(&mut self, call: F) -> Result<()>
    where
        F: FnOnce(&mut dyn ResultListener) -> anyhow::Result<()>,
    {
        match &mut self.listener {
            None => Ok(()),
            Some((name, listener)) => call(listener.as_mut()).map_err(|e| {
                Error::ListenerInvocationFailed {
                    listener: name.clone(),
                    reason: format!("{:#}", e),
                }
            }),
        }
    }
}

/// Logs every outcome through `tracing`
#[derive(Debug, Default)]
pub struct TracingListener;

impl TracingListener {
    pub const TYPE_NAME: &'static str = "log";

    fn create(_configuration: &Configuration) -> anyhow::Result<Box<dyn ResultListener>> {
        Ok(Box::new(Self))
    }
}

impl ResultListener for TracingListener {
    fn on_result(&mut self, report: &ComparisonReport) -> anyhow::Result<()> {
        match report.outcome {
            Outcome::Match => info!("✓ {} ({:.2}% differ)", report.name, report.diff_percent),
            Outcome::Mismatch => warn!("✗ {} ({:.2}% differ)", report.name, report.diff_percent),
            Outcome::Error => warn!(
                "✗ {} - {}",
                report.name,
                report.error.as_deref().unwrap_or("unknown error")
            ),
        }
        Ok(())
    }

    fn on_suite_completed(&mut self, summary: &SuiteSummary) -> anyhow::Result<()> {
        info!(
            "Results: {} matched, {} mismatched, {} errored",
            summary.matched, summary.mismatched, summary.errored
        );
        Ok(())
    }
}

/// Buffers every report and writes them with the suite counts as JSON to
/// `result-output-file` once the suite completes
#[derive(Debug)]
pub struct JsonReportListener {
    output: PathBuf,
    reports: Vec<ComparisonReport>,
}

impl JsonReportListener {
    pub const TYPE_NAME: &'static str = "json-report";

    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            reports: Vec::new(),
        }
    }

    fn create(configuration: &Configuration) -> anyhow::Result<Box<dyn ResultListener>> {
        let output = configuration
            .get(keys::RESULT_OUTPUT_FILE)
            .ok_or_else(|| anyhow::anyhow!("'{}' is not set", keys::RESULT_OUTPUT_FILE))?;
        Ok(Box::new(Self::new(output)))
    }
}

impl ResultListener for JsonReportListener {
    fn on_suite_started(&mut self, _configuration: &Configuration) -> anyhow::Result<()> {
        self.reports.clear();
        Ok(())
    }

    fn on_result(&mut self, report: &ComparisonReport) -> anyhow::Result<()> {
        self.reports.push(report.clone());
        Ok(())
    }

    fn on_suite_completed(&mut self, summary: &SuiteSummary) -> anyhow::Result<()> {
        if let Some(parent) = self.output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let document = SuiteSummary {
            started_at: summary.started_at,
            duration_ms: summary.duration_ms,
            total: summary.total,
            matched: summary.matched,
            mismatched: summary.mismatched,
            errored: summary.errored,
            results: std::mem::take(&mut self.reports),
        };
        let json = serde_json::to_string_pretty(&document)?;
        std::fs::write(&self.output, json)?;
        info!("Results written to: {}", self.output.display());
        Ok(())
    }
}
