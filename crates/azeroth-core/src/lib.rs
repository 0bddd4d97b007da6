pub mod error;
pub mod store;
pub mod types;

// Re-export commonly used items
pub use error::{ErrorInfo, LauncherError, Result, SourceAttempt};
pub use store::{MemoryPathStore, PathStore};
pub use types::{
    // Download types
    CommandResult,
    DownloadKind,
    DownloadSession,
    DownloadState,
    DownloadTarget,
    // Add-on types
    CatalogEntry,
    DisplayPackage,
    PackageGroup,
    RawPackageEntry,
};
