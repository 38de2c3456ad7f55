use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use altpy_core::{
    AltpyConfig, BuildStep, InstallOptions, LifecycleCommand, LifecycleError, VersionCatalog,
    VersionId, VersionSource,
};
use log::{debug, info, warn};

use crate::{
    claim_operation, write_install_receipt, AliasPublisher, ArchiveExtractor, ArchiveFetcher,
    ArtifactLayout, ArtifactStore, ConfirmationProvider, InstallReceipt, InstallState,
    InstalledVersion, OperationGuard, ProcessRunner, StagingArtifact, SymlinkPublisher,
};

/// Progress hooks for front ends. Every method defaults to a no-op.
pub trait LifecycleObserver {
    fn step(&self, _version: &VersionId, _step: &str) {}

    fn output_line(&self, _line: &str) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SilentObserver;

impl LifecycleObserver for SilentObserver {}

/// Collaborators injected into the orchestrator.
pub struct LifecycleServices<'a> {
    pub versions: &'a dyn VersionSource,
    pub fetcher: &'a dyn ArchiveFetcher,
    pub extractor: &'a dyn ArchiveExtractor,
    pub runner: &'a dyn ProcessRunner,
    pub confirmation: &'a dyn ConfirmationProvider,
    pub observer: &'a dyn LifecycleObserver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalStatus {
    Removed,
    /// The install root had no receipt; leftovers of an interrupted install were deleted.
    RepairedIncomplete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalReport {
    pub version: VersionId,
    pub status: RemovalStatus,
    pub removed_aliases: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub removed: Vec<RemovalReport>,
    pub swept_staging: Vec<PathBuf>,
    pub pruned_aliases: Vec<String>,
    pub nothing_to_do: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleOutcome {
    Installed(InstalledVersion),
    Removed(RemovalReport),
    Cleaned(CleanReport),
}

pub struct LifecycleOrchestrator<'a> {
    config: &'a AltpyConfig,
    services: LifecycleServices<'a>,
    store: ArtifactStore,
    publisher: Box<dyn AliasPublisher + 'a>,
}

impl<'a> LifecycleOrchestrator<'a> {
    pub fn new(config: &'a AltpyConfig, services: LifecycleServices<'a>) -> Self {
        let layout = ArtifactLayout::from_config(config);
        let publisher = SymlinkPublisher::new(layout.clone(), config.alias_prefix.clone());
        Self {
            config,
            services,
            store: ArtifactStore::new(layout),
            publisher: Box::new(publisher),
        }
    }

    pub fn with_publisher(mut self, publisher: impl AliasPublisher + 'a) -> Self {
        self.publisher = Box::new(publisher);
        self
    }

    pub fn layout(&self) -> &ArtifactLayout {
        self.store.layout()
    }

    pub fn execute(&self, command: &LifecycleCommand) -> Result<LifecycleOutcome, LifecycleError> {
        debug!("executing {}", command.name());
        match command {
            LifecycleCommand::Install { version, options } => {
                self.install(version, options).map(LifecycleOutcome::Installed)
            }
            LifecycleCommand::Remove { version } => {
                self.remove(version).map(LifecycleOutcome::Removed)
            }
            LifecycleCommand::Clean => self.clean().map(LifecycleOutcome::Cleaned),
        }
    }

    /// Downloads, builds and publishes `raw`.
    ///
    /// Only a version listed by the catalog is accepted. An existing install is replaced after
    /// confirmation; any failure leaves neither an install root nor aliases for the version.
    pub fn install(
        &self,
        raw: &str,
        options: &InstallOptions,
    ) -> Result<InstalledVersion, LifecycleError> {
        let version = VersionId::parse(raw)?;
        let _guard = self.claim("install")?;
        let version = VersionCatalog::new(self.services.versions).resolve(version.as_str())?;

        match self.store.install_state(&version) {
            InstallState::Installed => {
                let prompt = format!("{version} is already installed. Remove it and reinstall?");
                if !self.confirm(&prompt) {
                    return Err(LifecycleError::UserDeclined {
                        action: "install".to_string(),
                    });
                }
                self.remove_unlocked(&version)?;
            }
            InstallState::Incomplete => {
                info!("discarding incomplete install of {version}");
                self.store
                    .purge_install(&version)
                    .map_err(|err| LifecycleError::storage(&err))?;
            }
            InstallState::NotPresent => {}
        }

        match self.build_and_publish(&version, options) {
            Ok(installed) => {
                info!("installed {version}");
                Ok(installed)
            }
            Err(err) => {
                self.rollback(&version);
                Err(err)
            }
        }
    }

    /// Deletes an installed version and its aliases. Absent versions are rejected.
    pub fn remove(&self, raw: &str) -> Result<RemovalReport, LifecycleError> {
        let version = VersionId::parse(raw)?;
        let _guard = self.claim("remove")?;

        if self.store.install_state(&version) == InstallState::NotPresent {
            return Err(LifecycleError::NotInstalled {
                version: version.to_string(),
            });
        }
        if !self.confirm(&format!("Remove {version} and its aliases?")) {
            return Err(LifecycleError::UserDeclined {
                action: "remove".to_string(),
            });
        }
        self.remove_unlocked(&version)
    }

    /// Removes every installed version after a single confirmation, then sweeps leftovers.
    ///
    /// Removal is best-effort: one failing version does not stop the rest.
    pub fn clean(&self) -> Result<CleanReport, LifecycleError> {
        let _guard = self.claim("clean")?;

        let mut targets: Vec<VersionId> = self
            .store
            .installed_versions()
            .map_err(|err| LifecycleError::storage(&err))?
            .into_iter()
            .map(|installed| installed.version)
            .chain(
                self.store
                    .incomplete_installs()
                    .map_err(|err| LifecycleError::storage(&err))?,
            )
            .collect();
        targets.sort();

        let mut report = CleanReport::default();
        let mut failed = Vec::new();
        if targets.is_empty() {
            info!("nothing to clean");
            report.nothing_to_do = true;
        } else {
            let names = targets
                .iter()
                .map(VersionId::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            let prompt = format!("Remove {} installed version(s): {names}?", targets.len());
            if !self.confirm(&prompt) {
                return Err(LifecycleError::UserDeclined {
                    action: "clean".to_string(),
                });
            }

            for version in &targets {
                match self.remove_unlocked(version) {
                    Ok(removal) => report.removed.push(removal),
                    Err(err) => {
                        warn!("failed to remove {version}: {err}");
                        failed.push(version.to_string());
                    }
                }
            }
        }

        match self.store.sweep_stale_staging() {
            Ok(swept) => report.swept_staging = swept,
            Err(err) => {
                warn!("failed to sweep staging leftovers: {err:#}");
                failed.push("staging leftovers".to_string());
            }
        }
        match self.publisher.prune_orphans() {
            Ok(pruned) => report.pruned_aliases = pruned,
            Err(err) => {
                warn!("failed to prune orphaned aliases: {err:#}");
                failed.push("orphaned aliases".to_string());
            }
        }

        if !failed.is_empty() {
            return Err(LifecycleError::CleanIncomplete { failed });
        }
        Ok(report)
    }

    pub fn list_installed(&self) -> Result<Vec<InstalledVersion>, LifecycleError> {
        self.store
            .installed_versions()
            .map_err(|err| LifecycleError::storage(&err))
    }

    fn claim(&self, operation: &str) -> Result<OperationGuard, LifecycleError> {
        claim_operation(self.store.layout(), operation)
    }

    fn confirm(&self, prompt: &str) -> bool {
        match self.services.confirmation.confirm(prompt) {
            Ok(answer) => answer,
            Err(err) => {
                warn!("no answer to confirmation prompt, treating as no: {err:#}");
                false
            }
        }
    }

    fn build_and_publish(
        &self,
        version: &VersionId,
        options: &InstallOptions,
    ) -> Result<InstalledVersion, LifecycleError> {
        let archive_url = self.config.archive_url(version);
        self.services.observer.step(version, "fetch");
        info!("fetching {archive_url}");
        let staging = self.store.stage(
            version,
            &archive_url,
            self.services.fetcher,
            self.services.extractor,
            options.expected_sha256.as_deref(),
        )?;

        let install_root = self.store.install_root_for(version);
        self.run_step(
            version,
            BuildStep::Configure,
            &configure_argv(&install_root, &self.config.configure_args),
            &staging.build_dir,
        )?;
        let jobs = self.build_jobs(options, &staging.build_dir);
        self.run_step(
            version,
            BuildStep::Build,
            &["make".to_string(), format!("-j{jobs}")],
            &staging.build_dir,
        )?;
        self.run_step(
            version,
            BuildStep::Install,
            &["make".to_string(), "altinstall".to_string()],
            &staging.build_dir,
        )?;

        if let Err(err) = self.store.purge_staging(&staging) {
            warn!("failed to remove build tree for {version}: {err:#}");
        }

        self.services.observer.step(version, "publish");
        let aliases = self
            .publisher
            .publish(version, &install_root)
            .map_err(|err| LifecycleError::PublishFailed {
                version: version.to_string(),
                detail: format!("{err:#}"),
            })?;

        self.record_install(version, &staging, aliases, jobs)
    }

    fn record_install(
        &self,
        version: &VersionId,
        staging: &StagingArtifact,
        aliases: BTreeSet<String>,
        jobs: u32,
    ) -> Result<InstalledVersion, LifecycleError> {
        let installed_at_unix = current_unix_timestamp();
        let receipt = InstallReceipt {
            version: version.to_string(),
            aliases: aliases.iter().cloned().collect(),
            archive_url: Some(staging.archive_url.clone()),
            archive_sha256: Some(staging.archive_sha256.clone()),
            jobs: Some(jobs),
            installed_at_unix,
        };
        write_install_receipt(self.store.layout(), &receipt)
            .map_err(|err| LifecycleError::storage(&err))?;

        Ok(InstalledVersion {
            version: version.clone(),
            install_root: self.store.install_root_for(version),
            published_aliases: aliases,
            archive_sha256: Some(staging.archive_sha256.clone()),
            installed_at_unix,
        })
    }

    fn run_step(
        &self,
        version: &VersionId,
        step: BuildStep,
        argv: &[String],
        workdir: &Path,
    ) -> Result<(), LifecycleError> {
        let observer = self.services.observer;
        observer.step(version, step.as_str());
        info!("{step}: {}", argv.join(" "));

        let result = self
            .services
            .runner
            .run(argv, workdir, &mut |line: &str| observer.output_line(line));
        if result.success {
            return Ok(());
        }

        let detail = result
            .captured_output
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| format!("`{}` exited unsuccessfully", argv.join(" ")));
        Err(LifecycleError::BuildStepFailed {
            version: version.to_string(),
            step,
            detail,
        })
    }

    fn build_jobs(&self, options: &InstallOptions, workdir: &Path) -> u32 {
        if let Some(jobs) = options.jobs.or(self.config.jobs).filter(|jobs| *jobs > 0) {
            return jobs;
        }

        let (ok, output) = self
            .services
            .runner
            .run_capturing(&["nproc".to_string()], workdir);
        match output.trim().parse::<u32>() {
            Ok(cores) if ok && cores > 0 => cores,
            _ => {
                warn!(
                    "could not determine core count ({}); building with a single job",
                    output.trim()
                );
                1
            }
        }
    }

    fn remove_unlocked(&self, version: &VersionId) -> Result<RemovalReport, LifecycleError> {
        let status = match self.store.install_state(version) {
            InstallState::Incomplete => RemovalStatus::RepairedIncomplete,
            InstallState::Installed | InstallState::NotPresent => RemovalStatus::Removed,
        };
        self.services.observer.step(version, "remove");

        let purged = self.store.purge_install(version);
        let unpublished = self.publisher.unpublish(version);
        match (purged, unpublished) {
            (Ok(()), Ok(removed_aliases)) => {
                info!("removed {version}");
                Ok(RemovalReport {
                    version: version.clone(),
                    status,
                    removed_aliases,
                })
            }
            (Err(err), Ok(_)) | (Ok(()), Err(err)) => Err(LifecycleError::storage(&err)),
            (Err(purge_err), Err(unpublish_err)) => Err(LifecycleError::Storage {
                detail: format!("{purge_err:#}; {unpublish_err:#}"),
            }),
        }
    }

    /// Returns the version to `NotPresent`. Cleanup errors are logged, never returned.
    fn rollback(&self, version: &VersionId) {
        warn!("rolling back install of {version}");
        self.store.discard_staging(version);
        if let Err(err) = self.store.purge_install(version) {
            warn!("rollback could not remove install root for {version}: {err:#}");
        }
        if let Err(err) = self.publisher.unpublish(version) {
            warn!("rollback could not remove aliases for {version}: {err:#}");
        }
    }
}

fn configure_argv(install_root: &Path, extra: &[String]) -> Vec<String> {
    let root = install_root.display();
    let mut argv = vec![
        "./configure".to_string(),
        "--enable-optimizations".to_string(),
        "--with-ensurepip=install".to_string(),
        format!("--prefix={root}"),
        format!("--exec-prefix={root}"),
    ];
    argv.extend(extra.iter().cloned());
    argv
}

fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
