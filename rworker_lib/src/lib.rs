mod error;
mod identity;
pub mod job_directory;
mod process;
mod status;
mod util;

pub use error::{AuthenticationError, JobDirectoryError, ProcessError, Result};
pub use identity::Identity;
pub use job_directory::JobDirectory;
pub use process::Process;
pub use rworker_data::{JobId, JobLog, JobStatus, Status};
pub use status::{derive_status, ProcessStatus, NO_EXIT_CODE};
