use std::path::PathBuf;

/// Errors raised by internal probes and by configuration loading.
///
/// Monitor operations never hand these to callers directly: a failed probe
/// becomes an absent field, an `available: false` result or a structured
/// kill outcome. Only [`crate::config::Settings::load`] and sort-key parsing
/// surface them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {what}: {line:?}")]
    Parse { what: &'static str, line: String },

    #[error("command `{command}` failed: {reason}")]
    Probe { command: String, reason: String },

    #[error("command `{command}` did not finish within {timeout_secs}s")]
    ProbeTimeout { command: String, timeout_secs: u64 },

    #[error("not supported on this platform: {0}")]
    Unsupported(&'static str),

    #[error("no mounted filesystem contains {0}")]
    NoFilesystem(PathBuf),

    #[error("unknown sort key {0:?}")]
    UnknownSortKey(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(what: &'static str, line: impl Into<String>) -> Self {
        Error::Parse {
            what,
            line: line.into(),
        }
    }

    /// True when the underlying I/O failure was a permission check.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Error::Read { source, .. } | Error::Io(source) => {
                source.kind() == std::io::ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }
}

/// Reads a kernel or platform file into a string, tagging the error with its path.
pub(crate) fn read_to_string(path: impl AsRef<std::path::Path>) -> Result<String> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|err| Error::read(path, err))
}
