// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Resolution and materialization of embedded modules. */

use {
    crate::{
        host::{ModuleHost, ModuleImporter, ModuleSpec},
        ImportError,
    },
    log::{debug, info, warn},
    pyinline_archive::{parent_name, Archive, ExceptionHookMode, ModuleRecord, NAME_SEPARATOR},
    std::{
        borrow::Cow,
        collections::{HashMap, HashSet},
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc, Condvar, Mutex, MutexGuard, PoisonError,
        },
        thread::{self, ThreadId},
    },
};

/// Name the entry script executes under.
const ENTRY_SCRIPT_NAME: &str = "__main__";

/// Which import mechanism wins when both know a name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResolutionOrder {
    /// Embedded modules shadow modules known to the host.
    #[default]
    EmbeddedFirst,
    /// Modules known to the host shadow embedded modules.
    NativeFirst,
}

/// Runtime options of an [InlineImporter].
#[derive(Clone, Debug, Default)]
pub struct ImporterConfig {
    /// Name resolving to the archive's default package.
    ///
    /// This is typically the name the artifact itself is imported as.
    /// Ignored if the archive has no default package or if the name is
    /// itself an embedded module.
    pub alias: Option<String>,

    pub resolution_order: ResolutionOrder,

    /// Overrides the exception hook mode recorded in the archive.
    pub exception_hook: Option<ExceptionHookMode>,
}

/// Observable state of an embedded module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModuleStatus {
    Unrequested,
    Materializing,
    Materialized,
    /// The last attempt failed with the given message. The next request retries.
    Failed(String),
}

/// An immediate child of a package, as reported by [InlineImporter::iter_modules].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Last component of the qualified name.
    pub name: String,
    pub is_package: bool,
}

enum ModuleState<M> {
    /// Source is executing on `owner`. `module` is the partially initialized namespace.
    Materializing { module: M, owner: ThreadId },
    Materialized(M),
    Failed(String),
}

struct ImporterState<M> {
    modules: HashMap<String, ModuleState<M>>,
    /// Name each blocked thread waits on.
    waiting: HashMap<ThreadId, String>,
}

impl<M> ImporterState<M> {
    fn new() -> Self {
        Self {
            modules: HashMap::new(),
            waiting: HashMap::new(),
        }
    }

    /// Whether `waiter` blocking on a module held by `owner` closes a wait cycle.
    fn would_deadlock(&self, waiter: ThreadId, mut owner: ThreadId) -> bool {
        let mut seen = HashSet::new();

        loop {
            if owner == waiter {
                return true;
            }

            if !seen.insert(owner) {
                return false;
            }

            owner = match self
                .waiting
                .get(&owner)
                .and_then(|name| self.modules.get(name))
            {
                Some(ModuleState::Materializing { owner, .. }) => *owner,
                _ => return false,
            };
        }
    }
}

/// Imports modules from an [Archive] into a [ModuleHost].
///
/// Every embedded module goes through the states unrequested, materializing
/// and materialized, with failed reachable from materializing. Module source
/// executes at most once per importer, including when several threads
/// request the same module. A failed module is attempted again on the next
/// request.
///
/// Importers are `Sync` and are usually shared through an [Arc].
pub struct InlineImporter<H: ModuleHost> {
    host: H,
    archive: Arc<Archive>,
    config: ImporterConfig,
    state: Mutex<ImporterState<H::Module>>,
    state_changed: Condvar,
    bootstrapped: AtomicBool,
}

impl<H: ModuleHost> InlineImporter<H> {
    /// Construct an importer, validating the archive.
    pub fn new(host: H, archive: Arc<Archive>, config: ImporterConfig) -> Result<Self, ImportError> {
        archive.validate()?;

        debug!(
            "importer created for archive with {} modules",
            archive.registry.len()
        );

        Ok(Self {
            host,
            archive,
            config,
            state: Mutex::new(ImporterState::new()),
            state_changed: Condvar::new(),
            bootstrapped: AtomicBool::new(false),
        })
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    fn lock_state(&self) -> MutexGuard<'_, ImporterState<H::Module>> {
        // Module execution happens outside the lock, so a poisoned lock
        // still guards consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rewrite a name under the alias to the same name under the default package.
    fn canonical_name<'a>(&self, name: &'a str) -> Cow<'a, str> {
        let (alias, default) = match (&self.config.alias, &self.archive.default_package) {
            (Some(alias), Some(default))
                if alias != default && !self.archive.registry.contains(alias) =>
            {
                (alias, default)
            }
            _ => return Cow::Borrowed(name),
        };

        if name == alias {
            return Cow::Owned(default.clone());
        }

        match name
            .strip_prefix(alias.as_str())
            .and_then(|rest| rest.strip_prefix(NAME_SEPARATOR))
        {
            Some(rest) => Cow::Owned(format!("{}{}{}", default, NAME_SEPARATOR, rest)),
            None => Cow::Borrowed(name),
        }
    }

    /// Import a module by qualified name.
    ///
    /// Repeated imports of a name return the same module.
    pub fn import_module(&self, name: &str) -> Result<H::Module, ImportError> {
        let canonical = self.canonical_name(name);

        if canonical != name {
            debug!("resolving {} as {}", name, canonical);
        }

        self.import_canonical(&canonical)
    }

    fn import_canonical(&self, name: &str) -> Result<H::Module, ImportError> {
        if let Some(module) = self.materialized_module(name) {
            return Ok(module);
        }

        let record = self.archive.registry.get(name);

        if record.is_none() || self.config.resolution_order == ResolutionOrder::NativeFirst {
            if let Some(module) = self.resolve_native(name)? {
                return Ok(module);
            }
        }

        let record = record.ok_or_else(|| ImportError::NotFound(name.to_string()))?;

        let parent = match parent_name(name) {
            Some(parent) => {
                if let Some(parent_record) = self.archive.registry.get(parent) {
                    if !parent_record.is_package {
                        return Err(ImportError::NotAPackage {
                            name: name.to_string(),
                            parent: parent.to_string(),
                        });
                    }
                }

                Some(self.import_canonical(parent)?)
            }
            None => None,
        };

        let (module, fresh) = self.materialize(record)?;

        if fresh {
            if let Some(parent) = &parent {
                let spec = ModuleSpec::from_record(record);
                self.host.bind_submodule(parent, spec.leaf_name(), &module);
            }
        }

        Ok(module)
    }

    fn materialized_module(&self, name: &str) -> Option<H::Module> {
        match self.lock_state().modules.get(name) {
            Some(ModuleState::Materialized(module)) => Some(module.clone()),
            _ => None,
        }
    }

    fn resolve_native(&self, name: &str) -> Result<Option<H::Module>, ImportError> {
        let module = self
            .host
            .resolve_native(name)
            .map_err(|source| ImportError::Load {
                name: name.to_string(),
                source,
            })?;

        if module.is_some() {
            debug!("{} resolved by host", name);
        }

        Ok(module)
    }

    /// Obtain the module for a record, executing its source if needed.
    ///
    /// The boolean is true if this call executed the source.
    fn materialize(&self, record: &ModuleRecord) -> Result<(H::Module, bool), ImportError> {
        let name = record.name.as_str();
        let me = thread::current().id();

        let mut state = self.lock_state();

        loop {
            let (module, owner) = match state.modules.get(name) {
                Some(ModuleState::Materialized(module)) => return Ok((module.clone(), false)),
                Some(ModuleState::Materializing { module, owner }) => (module.clone(), *owner),
                Some(ModuleState::Failed(_)) | None => break,
            };

            if owner == me {
                debug!("{} is being imported circularly; returning partial module", name);
                return Ok((module, false));
            }

            if state.would_deadlock(me, owner) {
                warn!(
                    "waiting on {} would deadlock; returning partial module",
                    name
                );
                return Ok((module, false));
            }

            state.waiting.insert(me, name.to_string());
            state = self
                .state_changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            state.waiting.remove(&me);
        }

        let spec = ModuleSpec::from_record(record);
        let module = self.host.new_module(&spec);

        debug!("materializing {}", name);
        state.modules.insert(
            name.to_string(),
            ModuleState::Materializing {
                module: module.clone(),
                owner: me,
            },
        );
        drop(state);

        let result = self.execute(&module, &spec, record);

        let mut state = self.lock_state();
        let res = match result {
            Ok(()) => {
                debug!("materialized {}", name);
                state
                    .modules
                    .insert(name.to_string(), ModuleState::Materialized(module.clone()));
                Ok((module, true))
            }
            Err(err) => {
                debug!("materializing {} failed: {}", name, err);
                state
                    .modules
                    .insert(name.to_string(), ModuleState::Failed(err.to_string()));
                Err(err)
            }
        };
        drop(state);
        self.state_changed.notify_all();

        res
    }

    fn execute(
        &self,
        module: &H::Module,
        spec: &ModuleSpec,
        record: &ModuleRecord,
    ) -> Result<(), ImportError> {
        let source = self.decode_source(record)?;

        self.host
            .execute_module(self, module, spec, &source)
            .map_err(|source| ImportError::Load {
                name: spec.name.clone(),
                source,
            })
    }

    fn decode_source(&self, record: &ModuleRecord) -> Result<String, ImportError> {
        String::from_utf8(self.archive.record_source(record)?)
            .map_err(|_| ImportError::InvalidSource(record.name.clone()))
    }

    /// Obtain the decoded source of an embedded module.
    pub fn get_source(&self, name: &str) -> Result<Option<String>, ImportError> {
        let name = self.canonical_name(name);

        match self.archive.registry.get(&name) {
            Some(record) => Ok(Some(self.decode_source(record)?)),
            None => Ok(None),
        }
    }

    /// List embedded modules directly under a package.
    ///
    /// `None` lists top-level modules.
    pub fn iter_modules(&self, package: Option<&str>) -> Vec<ModuleInfo> {
        let package = package.map(|package| self.canonical_name(package));

        self.archive
            .registry
            .children(package.as_deref())
            .map(|record| ModuleInfo {
                name: ModuleSpec::from_record(record).leaf_name().to_string(),
                is_package: record.is_package,
            })
            .collect()
    }

    pub fn module_status(&self, name: &str) -> ModuleStatus {
        let name = self.canonical_name(name);
        let state = self.lock_state();

        match state.modules.get(&*name) {
            None => ModuleStatus::Unrequested,
            Some(ModuleState::Materializing { .. }) => ModuleStatus::Materializing,
            Some(ModuleState::Materialized(_)) => ModuleStatus::Materialized,
            Some(ModuleState::Failed(message)) => ModuleStatus::Failed(message.clone()),
        }
    }

    /// Install the exception hook and run the entry script.
    ///
    /// Only the first call has any effect, so the entry script runs at most
    /// once.
    pub fn bootstrap(&self) -> Result<(), ImportError> {
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            debug!("importer already bootstrapped");
            return Ok(());
        }

        self.maybe_install_exception_hook()?;

        if let Some(script) = &self.archive.entry_script {
            info!("running entry script");
            self.host
                .execute_main(self, script, ENTRY_SCRIPT_NAME)
                .map_err(|source| ImportError::Load {
                    name: ENTRY_SCRIPT_NAME.to_string(),
                    source,
                })?;
        }

        Ok(())
    }

    fn maybe_install_exception_hook(&self) -> Result<bool, ImportError> {
        let mode = self
            .config
            .exception_hook
            .unwrap_or(self.archive.exception_hook);

        let install = match mode {
            ExceptionHookMode::ForceOn => true,
            ExceptionHookMode::ForceOff => false,
            // Best-effort: the host may not be able to tell a custom hook apart.
            ExceptionHookMode::Auto => !self.host.has_exception_hook(),
        };

        if install {
            info!("installing exception hook");
            self.host
                .install_exception_hook(self)
                .map_err(ImportError::Host)?;
        } else {
            debug!("leaving exception hook alone ({:?})", mode);
        }

        Ok(install)
    }
}

impl<H: ModuleHost> ModuleImporter<H::Module> for InlineImporter<H> {
    fn import_module(&self, name: &str) -> Result<H::Module, ImportError> {
        InlineImporter::import_module(self, name)
    }

    fn get_source(&self, name: &str) -> Option<String> {
        InlineImporter::get_source(self, name).ok().flatten()
    }
}

impl<H: ModuleHost> Drop for InlineImporter<H> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);

        debug!(
            "tearing down importer with {} known modules",
            state.modules.len()
        );
    }
}
