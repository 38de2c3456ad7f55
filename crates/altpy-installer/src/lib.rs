mod checksum;
mod confirm;
mod extract;
mod fs_utils;
mod layout;
mod operation;
mod orchestrator;
mod process;
mod publish;
mod receipts;
mod store;

pub use checksum::sha256_file;
pub use confirm::{AssumeYes, ConfirmationProvider};
pub use extract::{ArchiveExtractor, TarGzExtractor};
pub use fs_utils::{remove_dir_all_if_exists, remove_file_if_exists};
pub use layout::ArtifactLayout;
pub use operation::{claim_operation, read_active_operation, ActiveOperation, OperationGuard};
pub use orchestrator::{
    CleanReport, LifecycleObserver, LifecycleOrchestrator, LifecycleOutcome, LifecycleServices,
    RemovalReport, RemovalStatus, SilentObserver,
};
pub use process::{ExecutionResult, ProcessRunner, SystemProcessRunner};
pub use publish::{versioned_executable_name, AliasPublisher, SymlinkPublisher};
pub use receipts::{parse_receipt, read_install_receipt, write_install_receipt, InstallReceipt};
pub use store::{ArchiveFetcher, ArtifactStore, InstallState, InstalledVersion, StagingArtifact};
