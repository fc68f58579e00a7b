pub mod copy;
pub mod credentials;
pub mod error;
pub mod job;
pub mod mount;
pub mod notifications;
pub mod orchestrator;
pub mod ownership;
pub mod prompt;
pub mod transfer_engine;
pub mod tree;

pub use copy::{BackupResult, CopyEngine, CopyOutcome};
pub use credentials::Credential;
pub use error::BackupError;
pub use job::{BackupJob, RemoteEndpoint, RunMode};
pub use mount::{MountHandle, Mounter, ShareMount};
pub use orchestrator::{JobReport, JobState, Orchestrator, Verdict};
pub use ownership::{OwnerIds, invoking_user};
pub use prompt::{InquirePrompter, Prompter};
