// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error type of the packer and its exit statuses. */

use {
    pyinline_archive::ArchiveError,
    pyinline_packaging::WalkError,
    std::path::{Path, PathBuf},
};

/// Broad classification of packer errors.
///
/// Each kind maps to a distinct process exit status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid or contradictory arguments, or packages that can't be found.
    Config,
    /// Sources couldn't be read or the output couldn't be written.
    Io,
    /// An artifact is malformed.
    Format,
}

impl ErrorKind {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config => 2,
            Self::Io => 3,
            Self::Format => 4,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("{0}")]
    Config(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{0}")]
    Walk(#[from] WalkError),

    #[error("{0}")]
    Archive(#[from] ArchiveError),
}

impl PackError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Io { .. } => ErrorKind::Io,
            Self::Walk(err) => match err {
                WalkError::Io { .. } | WalkError::Walk(_) => ErrorKind::Io,
                WalkError::NotAPackage(_)
                | WalkError::PackageNotFound(_)
                | WalkError::Interpreter(_) => ErrorKind::Config,
                WalkError::Archive(err) => archive_error_kind(err),
            },
            Self::Archive(err) => archive_error_kind(err),
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

fn archive_error_kind(err: &ArchiveError) -> ErrorKind {
    match err {
        ArchiveError::Io(_) => ErrorKind::Io,
        ArchiveError::DuplicateModule(_) | ArchiveError::UnrepresentablePath(_) => {
            ErrorKind::Config
        }
        ArchiveError::Format(_)
        | ArchiveError::Decode { .. }
        | ArchiveError::Json(_)
        | ArchiveError::Bootstrap(_) => ErrorKind::Format,
    }
}

pub type Result<T> = std::result::Result<T, PackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let cases = [
            (PackError::config("ambiguous"), 2),
            (
                PackError::io(
                    "out.py",
                    std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
                ),
                3,
            ),
            (
                PackError::Walk(WalkError::PackageNotFound("missing".to_string())),
                2,
            ),
            (
                PackError::Archive(ArchiveError::DuplicateModule("pkg".to_string())),
                2,
            ),
            (
                PackError::Archive(ArchiveError::Format("bad".to_string())),
                4,
            ),
        ];

        for (err, code) in cases {
            assert_eq!(err.exit_code(), code, "{}", err);
        }
    }
}
