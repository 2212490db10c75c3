// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*!
Scanning the filesystem for Python module sources.
*/

use {
    crate::{
        location::PackageRoot,
        module_util::{is_hidden, is_module_file, is_package_dir},
        WalkError, WalkResult,
    },
    log::{debug, info},
    pyinline_archive::qualified_name_from_path,
    std::{
        path::PathBuf,
        time::UNIX_EPOCH,
    },
};

/// A Python module source file discovered in a package tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleFile {
    /// Fully qualified module name.
    pub name: String,

    /// Whether this is a package initializer.
    pub is_package: bool,

    /// Path relative to the directory holding the top-level package.
    pub relative_path: PathBuf,

    /// Path on the filesystem.
    pub full_path: PathBuf,
}

impl ModuleFile {
    /// Read the raw source and the modification time in seconds since the epoch.
    ///
    /// Filesystems without modification times report 0.
    pub fn read_source(&self) -> WalkResult<(Vec<u8>, u64)> {
        let source =
            std::fs::read(&self.full_path).map_err(|e| WalkError::io(&self.full_path, e))?;
        let metadata =
            std::fs::metadata(&self.full_path).map_err(|e| WalkError::io(&self.full_path, e))?;

        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Ok((source, mtime))
    }
}

/// Walk a package tree and collect its module source files.
///
/// Entries are visited depth first in file name order, so a sub-package is
/// fully walked before its following siblings and the result is stable for
/// a given directory state. Only directories that are themselves packages
/// are descended into. Hidden directories, caches and data files are
/// skipped.
pub fn walk_package(root: &PackageRoot) -> WalkResult<Vec<ModuleFile>> {
    let package_path = root.path();

    if !is_package_dir(&package_path) {
        return Err(WalkError::NotAPackage(package_path));
    }

    let walker = walkdir::WalkDir::new(&package_path)
        .follow_links(true)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || (!is_hidden(entry.file_name()) && is_package_dir(entry.path()))
        });

    let mut res = Vec::new();

    for entry in walker {
        let entry = entry?;
        let path = entry.path();

        if entry.file_type().is_dir() {
            debug!("descending into package directory {}", path.display());
            continue;
        }

        if !is_module_file(path) {
            debug!("ignoring {}", path.display());
            continue;
        }

        let relative_path = path
            .strip_prefix(&root.base_dir)
            .map_err(|_| {
                WalkError::io(
                    path,
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "path escapes the package base directory",
                    ),
                )
            })?
            .to_path_buf();

        let (name, is_package) = qualified_name_from_path(&relative_path)?;

        debug!("found module {} at {}", name, relative_path.display());

        res.push(ModuleFile {
            name,
            is_package,
            relative_path,
            full_path: path.to_path_buf(),
        });
    }

    info!(
        "found {} modules in package {}",
        res.len(),
        root.name
    );

    Ok(res)
}
