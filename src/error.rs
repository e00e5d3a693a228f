// Error types shared by the indexing engine

use std::path::PathBuf;

/// Errors surfaced by the indexing engine and its queries.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error(
        "Project path must be absolute, got '{0}'. \
         Use a full path such as '/home/user/my-project' (POSIX) or 'C:\\Users\\user\\my-project' (Windows)"
    )]
    RelativeProjectPath(String),

    #[error("Project path does not exist or is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No project has been analyzed yet; run analyze first")]
    NotAnalyzed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;
