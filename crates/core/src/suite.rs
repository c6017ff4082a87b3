//! Directory suites
//!
//! Pairs every file below `samples-directory` with the file at the same
//! relative path below `patterns-directory` and compares them against the
//! run's mask set.

use crate::compare::{ComparisonReport, Orchestrator, Outcome, ToleranceComparator};
use crate::config::{keys, Configuration};
use crate::listener::{ListenerDispatch, ListenerRegistry};
use crate::mask::{MaskLoadPolicy, MaskSet, MaskSetLoader};
use crate::source::{read_pair, FileSource, ImageSource};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use walkdir::WalkDir;

/// Result of running all samples
#[derive(Debug, Clone, Serialize)]
pub struct SuiteSummary {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub total: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub errored: usize,
    pub results: Vec<ComparisonReport>,
}

impl SuiteSummary {
    pub fn from_results(started_at: DateTime<Utc>, results: Vec<ComparisonReport>) -> Self {
        let count = |outcome: Outcome| results.iter().filter(|r| r.outcome == outcome).count();
        let duration_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
        Self {
            started_at,
            duration_ms,
            total: results.len(),
            matched: count(Outcome::Match),
            mismatched: count(Outcome::Mismatch),
            errored: count(Outcome::Error),
            results,
        }
    }

    /// True when every sample matched its pattern
    pub fn is_success(&self) -> bool {
        self.mismatched == 0 && self.errored == 0
    }
}

/// Runs a directory suite under one frozen global configuration
pub struct SuiteRunner {
    configuration: Configuration,
    source: Box<dyn ImageSource>,
    masks: MaskSet,
    orchestrator: Orchestrator,
    dispatch: ListenerDispatch,
}

impl SuiteRunner {
    pub fn new(
        configuration: Configuration,
        source: Box<dyn ImageSource>,
        masks: MaskSet,
        orchestrator: Orchestrator,
        dispatch: ListenerDispatch,
    ) -> Self {
        Self {
            configuration,
            source,
            masks,
            orchestrator,
            dispatch,
        }
    }

    /// Assemble a runner from well-known configuration keys.
    ///
    /// Masks come from `masks-directory` when set, the diff artifacts go to
    /// `file-storage-directory` when set and the listener is resolved from
    /// `suite-listener` through `registry`.
    pub fn from_config(configuration: Configuration, registry: &ListenerRegistry) -> Result<Self> {
        for key in [keys::SAMPLES_DIRECTORY, keys::PATTERNS_DIRECTORY] {
            if !configuration.contains_key(key) {
                return Err(Error::InvalidConfig(format!("'{}' is not set", key)));
            }
        }

        let masks = match configuration.get(keys::MASKS_DIRECTORY) {
            Some(directory) => MaskSetLoader::<FileSource>::default()
                .with_policy(MaskLoadPolicy::from_config(&configuration)?)
                .load(Path::new(directory))?,
            None => MaskSet::new(),
        };

        let mut orchestrator = Orchestrator::new(Box::new(ToleranceComparator::from_config(&configuration)?));
        if let Some(directory) = configuration.get(keys::FILE_STORAGE_DIRECTORY) {
            orchestrator = orchestrator.with_diff_directory(directory);
        }

        let dispatch = ListenerDispatch::resolve(registry, &configuration)?;
        let source = Box::new(FileSource::new(configuration.clone()));

        Ok(Self::new(configuration, source, masks, orchestrator, dispatch))
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn masks(&self) -> &MaskSet {
        &self.masks
    }

    fn samples_directory(&self) -> Result<PathBuf> {
        self.configuration
            .get(keys::SAMPLES_DIRECTORY)
            .map(PathBuf::from)
            .ok_or_else(|| Error::InvalidConfig(format!("'{}' is not set", keys::SAMPLES_DIRECTORY)))
    }

    /// Relative paths of every sample file, sorted
    pub fn sample_identifiers(&self) -> Result<Vec<String>> {
        let root = self.samples_directory()?;
        let mut identifiers = Vec::new();

        for entry in WalkDir::new(&root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root.as_path()).to_path_buf();
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop"));
                Error::DirectoryUnreadable { path, source }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&root) {
                identifiers.push(relative.to_string_lossy().to_string());
            }
        }

        Ok(identifiers)
    }

    /// Compare a single sample against its pattern and notify the listener.
    ///
    /// A sample or pattern that cannot be retrieved yields an `Error` outcome
    /// naming the unreachable artifact.
    pub fn run_sample(&mut self, identifier: &str) -> Result<ComparisonReport> {
        match read_pair(self.source.as_ref(), identifier, &self.configuration) {
            Ok((sample, pattern)) => {
                self.orchestrator
                    .run(identifier, &sample, &pattern, &self.masks, &mut self.dispatch)
            }
            Err(e) => {
                error!("Cannot load images for '{}': {}", identifier, e);
                let report = ComparisonReport::errored(identifier, &e);
                self.dispatch.notify(&report)?;
                Ok(report)
            }
        }
    }

    /// Run every sample of the suite
    pub fn run(&mut self) -> Result<SuiteSummary> {
        let started_at = Utc::now();
        let identifiers = self.sample_identifiers()?;

        self.dispatch.suite_started(&self.configuration)?;
        info!("Running {} comparison(s) with {} mask(s)...", identifiers.len(), self.masks.len());

        let mut results = Vec::with_capacity(identifiers.len());
        for identifier in &identifiers {
            results.push(self.run_sample(identifier)?);
        }

        let summary = SuiteSummary::from_results(started_at, results);
        info!(
            "Suite finished: {} matched, {} mismatched, {} errored ({} ms)",
            summary.matched, summary.mismatched, summary.errored, summary.duration_ms
        );

        self.dispatch.suite_completed(&summary)?;
        Ok(summary)
    }
}
