// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Configuration of a packing run. */

use {
    crate::error::{PackError, Result},
    clap::ArgMatches,
    pyinline_archive::ExceptionHookMode,
    pyinline_packaging::location::{PackageLocator, PackageRoot},
    std::path::PathBuf,
};

/// Options controlling a packing run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackConfig {
    /// Packages to inline, as directory paths or importable names.
    pub packages: Vec<String>,

    /// Destination file. `None` writes to stdout.
    pub output: Option<PathBuf>,

    /// Package the artifact's own name resolves to.
    ///
    /// Defaults to the package when a single one is inlined.
    pub default_package: Option<String>,

    /// Disable the default package, even with a single package.
    pub no_default_package: bool,

    /// Append the `__main__.py` of the package, to run when the artifact
    /// is executed. Implies `no_default_package`.
    pub run_entry_script: bool,

    pub exception_hook: ExceptionHookMode,

    /// Precede each module in the blob with a marker naming its file.
    pub tagged: bool,

    /// Directories searched for packages given by name.
    pub search_paths: Vec<PathBuf>,

    /// Also search `PYTHONPATH`.
    pub use_pythonpath: bool,

    /// Interpreter asked for packages not found otherwise.
    pub python_exe: Option<PathBuf>,
}

impl PackConfig {
    /// Construct from the arguments of the `pack` command.
    pub fn from_args(args: &ArgMatches) -> Self {
        let exception_hook = if args.get_flag("set_except") {
            ExceptionHookMode::ForceOn
        } else if args.get_flag("no_except") {
            ExceptionHookMode::ForceOff
        } else {
            ExceptionHookMode::Auto
        };

        Self {
            packages: args
                .get_many::<String>("packages")
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
            output: args.get_one::<PathBuf>("outfile").cloned(),
            default_package: args.get_one::<String>("default_package").cloned(),
            no_default_package: args.get_flag("no_default_package"),
            run_entry_script: args.get_flag("runmain"),
            exception_hook,
            tagged: args.get_flag("tag"),
            search_paths: args
                .get_many::<PathBuf>("search_path")
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
            use_pythonpath: !args.get_flag("no_pythonpath"),
            python_exe: args.get_one::<PathBuf>("python").cloned(),
        }
    }

    /// Check options that don't depend on the filesystem.
    pub fn validate(&self) -> Result<()> {
        if self.packages.is_empty() {
            return Err(PackError::config("no packages to inline"));
        }

        if self.run_entry_script && self.packages.len() > 1 {
            return Err(PackError::config(format!(
                "ambiguous entry point: running __main__ requires exactly one package; {} were given",
                self.packages.len()
            )));
        }

        Ok(())
    }

    /// Build the locator resolving package arguments.
    pub fn locator(&self) -> PackageLocator {
        let mut locator = PackageLocator::new();

        for path in &self.search_paths {
            locator.add_search_path(path);
        }
        if self.use_pythonpath {
            locator.add_pythonpath();
        }
        locator.set_python_exe(self.python_exe.clone());

        locator
    }

    /// Select the default package among the located packages.
    ///
    /// `roots` holds the located package of each argument, in argument
    /// order. An explicit default may name either the argument or the
    /// package. The returned value is the package name.
    pub fn resolve_default_package(&self, roots: &[PackageRoot]) -> Result<Option<String>> {
        if self.no_default_package || self.run_entry_script {
            return Ok(None);
        }

        match &self.default_package {
            Some(wanted) => self
                .packages
                .iter()
                .zip(roots)
                .find(|(argument, root)| *argument == wanted || root.name == *wanted)
                .map(|(_, root)| Some(root.name.clone()))
                .ok_or_else(|| {
                    PackError::config(format!(
                        "{} is not a valid default package; it must be one of the inlined packages",
                        wanted
                    ))
                }),
            None if roots.len() == 1 => Ok(Some(roots[0].name.clone())),
            None => Ok(None),
        }
    }
}
