// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Interface between the importer and the environment executing modules. */

use {
    crate::ImportError,
    pyinline_archive::{parent_name, ModuleRecord, NAME_SEPARATOR},
};

/// Describes a module about to be materialized from an archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleSpec {
    /// Fully qualified module name.
    pub name: String,

    /// Whether the module is a package and can hold submodules.
    pub is_package: bool,

    /// Synthetic path of the module source, for diagnostics.
    pub origin: String,

    /// Modification time of the packed source file.
    pub mtime: u64,
}

impl ModuleSpec {
    pub(crate) fn from_record(record: &ModuleRecord) -> Self {
        Self {
            name: record.name.clone(),
            is_package: record.is_package,
            origin: record.origin_path(),
            mtime: record.mtime,
        }
    }

    /// Name of the package containing this module.
    pub fn parent(&self) -> Option<&str> {
        parent_name(&self.name)
    }

    /// Last component of the qualified name.
    pub fn leaf_name(&self) -> &str {
        match self.name.rsplit_once(NAME_SEPARATOR) {
            Some((_, leaf)) => leaf,
            None => &self.name,
        }
    }
}

/// Something that imports modules on behalf of executing code.
///
/// Hosts receive this while executing module source so that imports
/// performed by the source are routed back to the importer.
pub trait ModuleImporter<M> {
    /// Import a module by qualified name.
    fn import_module(&self, name: &str) -> Result<M, ImportError>;

    /// Obtain the source of an embedded module, if it is known.
    ///
    /// Exception handlers use this to render tracebacks for modules that
    /// don't exist on the filesystem.
    fn get_source(&self, name: &str) -> Option<String>;
}

/// The environment in which embedded modules are executed.
///
/// A host owns the module objects. The importer only clones handles to them
/// and never inspects their contents.
pub trait ModuleHost: Send + Sync {
    /// Handle to a module namespace. Clones must refer to the same module.
    type Module: Clone + Send + Sync;

    /// Create the empty namespace for a module.
    ///
    /// Package namespaces must be able to hold submodules before the
    /// package source finishes executing.
    fn new_module(&self, spec: &ModuleSpec) -> Self::Module;

    /// Execute module source against its namespace.
    fn execute_module(
        &self,
        importer: &dyn ModuleImporter<Self::Module>,
        module: &Self::Module,
        spec: &ModuleSpec,
        source: &str,
    ) -> anyhow::Result<()>;

    /// Execute a script in the top-level context of the host.
    fn execute_main(
        &self,
        importer: &dyn ModuleImporter<Self::Module>,
        source: &str,
        origin: &str,
    ) -> anyhow::Result<()>;

    /// Resolve a name with the host's own import machinery.
    ///
    /// Returns `Ok(None)` if the host doesn't know the name either.
    fn resolve_native(&self, name: &str) -> anyhow::Result<Option<Self::Module>>;

    /// Expose a freshly materialized submodule as an attribute of its parent.
    fn bind_submodule(&self, _parent: &Self::Module, _leaf_name: &str, _child: &Self::Module) {}

    /// Whether a custom handler for uncaught errors is already installed.
    fn has_exception_hook(&self) -> bool;

    /// Install a handler for uncaught errors that can render embedded sources.
    fn install_exception_hook(
        &self,
        importer: &dyn ModuleImporter<Self::Module>,
    ) -> anyhow::Result<()>;
}
