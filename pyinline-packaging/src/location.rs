// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Locating Python packages on the filesystem. */

use {
    crate::{module_util::is_package_dir, WalkError, WalkResult},
    log::debug,
    pyinline_archive::PACKAGE_INIT_STEM,
    std::{
        ffi::OsStr,
        path::{Path, PathBuf},
    },
};

/// Python program printing the origin of an importable module.
const FIND_SPEC_SCRIPT: &str = r#"import importlib.util, sys
try:
    spec = importlib.util.find_spec(sys.argv[1])
except Exception:
    spec = None
if spec is not None and spec.origin:
    print(spec.origin)
"#;

/// A package directory split into its parent and the package name.
///
/// Module names inside the package are derived from paths relative to
/// `base_dir`, so they all start with `name`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageRoot {
    /// Directory containing the package directory.
    pub base_dir: PathBuf,

    /// Name of the package directory.
    pub name: String,
}

impl PackageRoot {
    /// Resolve a package from the path of its directory.
    pub fn from_directory(path: &Path) -> WalkResult<Self> {
        let path = if path.file_name().is_some() {
            path.to_path_buf()
        } else {
            std::fs::canonicalize(path).map_err(|e| WalkError::io(path, e))?
        };

        if !is_package_dir(&path) {
            return Err(WalkError::NotAPackage(path));
        }

        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| WalkError::NotAPackage(path.clone()))?
            .to_string();

        Ok(Self {
            base_dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            name,
        })
    }

    /// Path of the package directory.
    pub fn path(&self) -> PathBuf {
        self.base_dir.join(&self.name)
    }
}

/// Whether a string is a dotted Python module name.
fn is_module_name(value: &str) -> bool {
    value.split('.').all(|part| {
        let mut chars = part.chars();

        match chars.next() {
            Some(c) if c.is_alphabetic() || c == '_' => {
                chars.all(|c| c.is_alphanumeric() || c == '_')
            }
            _ => false,
        }
    })
}

/// Resolves package arguments to package directories.
///
/// An argument naming an existing directory is used as is. Otherwise it
/// is treated as a (possibly dotted) package name and looked up in the
/// configured search paths, then through a Python interpreter if one is
/// set.
#[derive(Clone, Debug, Default)]
pub struct PackageLocator {
    search_paths: Vec<PathBuf>,
    python_exe: Option<PathBuf>,
}

impl PackageLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    /// Append the entries of the `PYTHONPATH` environment variable.
    pub fn add_pythonpath(&mut self) {
        if let Some(value) = std::env::var_os("PYTHONPATH") {
            self.search_paths.extend(
                std::env::split_paths(&value).filter(|path| !path.as_os_str().is_empty()),
            );
        }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Set the Python interpreter used to find installed packages.
    pub fn set_python_exe(&mut self, python_exe: Option<PathBuf>) {
        self.python_exe = python_exe;
    }

    pub fn locate(&self, package: &str) -> WalkResult<PackageRoot> {
        let path = Path::new(package);

        if path.is_dir() {
            return PackageRoot::from_directory(path);
        }

        if !is_module_name(package) {
            return Err(WalkError::PackageNotFound(package.to_string()));
        }

        let relative = package.split('.').collect::<PathBuf>();

        for search_path in &self.search_paths {
            let candidate = search_path.join(&relative);

            if is_package_dir(&candidate) {
                debug!("found {} in {}", package, search_path.display());
                return PackageRoot::from_directory(&candidate);
            }
        }

        if let Some(python_exe) = &self.python_exe {
            if let Some(dir) = find_package_with_interpreter(python_exe, package)? {
                debug!("{} resolved {} to {}", python_exe.display(), package, dir.display());
                return PackageRoot::from_directory(&dir);
            }
        }

        Err(WalkError::PackageNotFound(package.to_string()))
    }
}

/// Ask a Python interpreter for the directory of an installed package.
///
/// Returns `None` if the interpreter can't find the name.
pub fn find_package_with_interpreter(
    python_exe: &Path,
    package: &str,
) -> WalkResult<Option<PathBuf>> {
    let output = duct::cmd(python_exe, ["-c", FIND_SPEC_SCRIPT, package])
        .stdout_capture()
        .stderr_null()
        .unchecked()
        .run()
        .map_err(|e| WalkError::Interpreter(format!("{}: {}", python_exe.display(), e)))?;

    if !output.status.success() {
        return Err(WalkError::Interpreter(format!(
            "{} exited with {}",
            python_exe.display(),
            output.status
        )));
    }

    let stdout = String::from_utf8(output.stdout)
        .map_err(|e| WalkError::Interpreter(format!("non UTF-8 output: {}", e)))?;
    let origin = stdout.trim();

    if origin.is_empty() {
        return Ok(None);
    }

    let origin = PathBuf::from(origin);

    match origin.parent() {
        Some(parent)
            if is_package_dir(parent)
                && origin.file_stem() == Some(OsStr::new(PACKAGE_INIT_STEM)) =>
        {
            Ok(Some(parent.to_path_buf()))
        }
        _ => Err(WalkError::NotAPackage(origin)),
    }
}
