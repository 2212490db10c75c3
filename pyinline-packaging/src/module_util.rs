// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Utility functions related to Python modules. */

use {
    pyinline_archive::{PACKAGE_INIT_STEM, SOURCE_SUFFIXES},
    std::{
        ffi::OsStr,
        path::{Path, PathBuf},
    },
};

/// Whether a file or directory name is hidden by convention.
pub fn is_hidden(name: &OsStr) -> bool {
    name.to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Path of the initializer file that makes `dir` a package.
pub fn package_init_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}.py", PACKAGE_INIT_STEM))
}

/// Whether a directory is a regular (non-namespace) Python package.
pub fn is_package_dir(dir: &Path) -> bool {
    dir.is_dir() && package_init_path(dir).is_file()
}

/// Whether a path is a Python module source file.
///
/// Only regular files with a recognized source suffix qualify. Names with
/// more than one dot can't be imported and are skipped, as are hidden files.
pub fn is_module_file(path: &Path) -> bool {
    let file_name = match path.file_name() {
        Some(name) => name,
        None => return false,
    };

    if is_hidden(file_name) || !path.is_file() {
        return false;
    }

    match file_name.to_str().and_then(|name| name.split_once('.')) {
        Some((stem, suffix)) => !stem.is_empty() && SOURCE_SUFFIXES.contains(&suffix),
        None => false,
    }
}
