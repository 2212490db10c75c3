// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Discovery of Python packages on the filesystem.

This crate locates the directories of Python packages, either from an
explicit path or by name, and walks them to produce the ordered list of
module source files that end up inlined into an archive.
*/

pub mod filesystem_scanning;
pub mod location;
pub mod module_util;

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("{} is not a Python package (no __init__.py)", .0.display())]
    NotAPackage(PathBuf),

    #[error("{0} is not an (installed) Python package")]
    PackageNotFound(String),

    #[error("error running Python interpreter: {0}")]
    Interpreter(String),

    #[error("{0}")]
    Archive(#[from] pyinline_archive::ArchiveError),
}

impl WalkError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type WalkResult<T> = std::result::Result<T, WalkError>;
