// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Importer for modules embedded in an inlined archive.

[InlineImporter] resolves qualified module names against the registry of an
[pyinline_archive::Archive], decodes the module source from the blob and
hands it to a [ModuleHost] for execution. Each module is executed at most
once per importer. Names not present in the archive are delegated to the
host's native import machinery.

The importer follows the host import contract for packages: a package's
parents are imported first, and a module that is still executing is
visible, partially initialized, to circular imports of itself.
*/

mod host;
mod importer;
#[cfg(test)]
mod testutil;

pub use crate::{
    host::{ModuleHost, ModuleImporter, ModuleSpec},
    importer::{ImporterConfig, InlineImporter, ModuleInfo, ModuleStatus, ResolutionOrder},
};

use pyinline_archive::ArchiveError;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("No module named '{0}'")]
    NotFound(String),

    #[error("cannot import {name}: '{parent}' is not a package")]
    NotAPackage { name: String, parent: String },

    #[error("error loading module {name}: {source}")]
    Load {
        name: String,
        source: anyhow::Error,
    },

    #[error("source of module {0} is not valid UTF-8")]
    InvalidSource(String),

    #[error("{0}")]
    Format(#[from] ArchiveError),

    #[error("host error: {0}")]
    Host(anyhow::Error),
}

impl ImportError {
    /// The qualified name the error is about, if any.
    pub fn module_name(&self) -> Option<&str> {
        match self {
            Self::NotFound(name)
            | Self::NotAPackage { name, .. }
            | Self::Load { name, .. }
            | Self::InvalidSource(name) => Some(name),
            Self::Format(_) | Self::Host(_) => None,
        }
    }
}
