// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! A module host executing line directives, for tests.

Module source is a list of directives, one per line:

* `import NAME` imports a module and records `import:NAME`.
* `peek NAME KEY` imports a module and records the value of its `KEY`
  attribute, or `<unset>`, as `peek:NAME.KEY`.
* `set KEY VALUE` sets an attribute.
* `sleep MS` blocks the executing thread.
* `fail MESSAGE` fails execution.
*/

use {
    crate::host::{ModuleHost, ModuleImporter, ModuleSpec},
    anyhow::{anyhow, Result},
    pyinline_archive::{Archive, ArchiveBuilder},
    std::{
        collections::{BTreeMap, HashMap, HashSet},
        path::Path,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    },
};

#[derive(Debug)]
pub(crate) struct TestModule {
    pub name: String,
    attrs: Mutex<BTreeMap<String, String>>,
    children: Mutex<BTreeMap<String, Arc<TestModule>>>,
}

impl TestModule {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            attrs: Mutex::new(BTreeMap::new()),
            children: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn attr(&self, key: &str) -> Option<String> {
        self.attrs.lock().unwrap().get(key).cloned()
    }

    pub fn set_attr(&self, key: impl Into<String>, value: impl Into<String>) {
        self.attrs.lock().unwrap().insert(key.into(), value.into());
    }

    pub fn child(&self, name: &str) -> Option<Arc<TestModule>> {
        self.children.lock().unwrap().get(name).cloned()
    }
}

#[derive(Default)]
pub(crate) struct ScriptedHost {
    existing_hook: bool,
    native: HashMap<String, Arc<TestModule>>,
    executions: Mutex<Vec<String>>,
    imports: Mutex<Vec<(String, String, Arc<TestModule>)>>,
    fail_next: Mutex<HashSet<String>>,
    hook_installs: AtomicUsize,
    main_runs: AtomicUsize,
    main: Mutex<Option<Arc<TestModule>>>,
}

impl ScriptedHost {
    /// Make a module resolvable through the native mechanism.
    pub fn with_native(mut self, name: &str) -> Self {
        self.native.insert(name.to_string(), TestModule::new(name));
        self
    }

    /// Pretend a custom exception hook is already installed.
    pub fn with_existing_hook(mut self, existing_hook: bool) -> Self {
        self.existing_hook = existing_hook;
        self
    }

    pub fn native_module(&self, name: &str) -> Option<Arc<TestModule>> {
        self.native.get(name).cloned()
    }

    /// Make the next execution of a module fail.
    pub fn fail_next(&self, name: &str) {
        self.fail_next.lock().unwrap().insert(name.to_string());
    }

    pub fn executions(&self, name: &str) -> usize {
        self.executions
            .lock()
            .unwrap()
            .iter()
            .filter(|n| *n == name)
            .count()
    }

    pub fn execution_order(&self) -> Vec<String> {
        self.executions.lock().unwrap().clone()
    }

    /// The module object `importer` received when it imported `target`.
    pub fn imported_by(&self, importer: &str, target: &str) -> Option<Arc<TestModule>> {
        self.imports
            .lock()
            .unwrap()
            .iter()
            .find(|(by, name, _)| by == importer && name == target)
            .map(|(_, _, module)| module.clone())
    }

    fn record_import(&self, importer: &TestModule, target: &str, module: &Arc<TestModule>) {
        self.imports.lock().unwrap().push((
            importer.name.clone(),
            target.to_string(),
            module.clone(),
        ));
    }

    pub fn hook_installs(&self) -> usize {
        self.hook_installs.load(Ordering::SeqCst)
    }

    pub fn main_runs(&self) -> usize {
        self.main_runs.load(Ordering::SeqCst)
    }

    pub fn main_module(&self) -> Option<Arc<TestModule>> {
        self.main.lock().unwrap().clone()
    }

    fn run(
        &self,
        importer: &dyn ModuleImporter<Arc<TestModule>>,
        module: &TestModule,
        source: &str,
    ) -> Result<()> {
        for line in source.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (directive, args) = line.split_once(' ').unwrap_or((line, ""));

            match directive {
                "import" => {
                    let imported = importer.import_module(args)?;
                    self.record_import(module, args, &imported);
                    module.set_attr(format!("import:{}", args), imported.name.clone());
                }
                "peek" => {
                    let (target, key) = args
                        .split_once(' ')
                        .ok_or_else(|| anyhow!("peek needs a module and a key"))?;
                    let imported = importer.import_module(target)?;
                    self.record_import(module, target, &imported);
                    let value = imported
                        .attr(key)
                        .unwrap_or_else(|| "<unset>".to_string());
                    module.set_attr(format!("peek:{}.{}", target, key), value);
                }
                "set" => {
                    let (key, value) = args.split_once(' ').unwrap_or((args, ""));
                    module.set_attr(key, value);
                }
                "sleep" => std::thread::sleep(Duration::from_millis(args.parse()?)),
                "fail" => return Err(anyhow!("{}", args)),
                other => return Err(anyhow!("unknown directive {}", other)),
            }
        }

        Ok(())
    }
}

impl ModuleHost for ScriptedHost {
    type Module = Arc<TestModule>;

    fn new_module(&self, spec: &ModuleSpec) -> Self::Module {
        let module = TestModule::new(&spec.name);
        module.set_attr("__file__", spec.origin.clone());
        if spec.is_package {
            module.set_attr("__path__", spec.name.clone());
        }

        module
    }

    fn execute_module(
        &self,
        importer: &dyn ModuleImporter<Self::Module>,
        module: &Self::Module,
        spec: &ModuleSpec,
        source: &str,
    ) -> Result<()> {
        self.executions.lock().unwrap().push(spec.name.clone());

        if self.fail_next.lock().unwrap().remove(&spec.name) {
            return Err(anyhow!("injected failure"));
        }

        self.run(importer, module, source)
    }

    fn execute_main(
        &self,
        importer: &dyn ModuleImporter<Self::Module>,
        source: &str,
        origin: &str,
    ) -> Result<()> {
        self.main_runs.fetch_add(1, Ordering::SeqCst);

        let module = TestModule::new(origin);
        self.main.lock().unwrap().replace(module.clone());

        self.run(importer, &module, source)
    }

    fn resolve_native(&self, name: &str) -> Result<Option<Self::Module>> {
        Ok(self.native_module(name))
    }

    fn bind_submodule(&self, parent: &Self::Module, leaf_name: &str, child: &Self::Module) {
        parent
            .children
            .lock()
            .unwrap()
            .insert(leaf_name.to_string(), child.clone());
    }

    fn has_exception_hook(&self) -> bool {
        self.existing_hook
    }

    fn install_exception_hook(&self, _importer: &dyn ModuleImporter<Self::Module>) -> Result<()> {
        self.hook_installs.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}

/// Build an untagged archive from `(relative path, source)` pairs.
pub(crate) fn archive_from_files(files: &[(&str, &str)]) -> Result<Archive> {
    let mut builder = ArchiveBuilder::new(false);

    for (path, source) in files {
        builder.add_module(Path::new(path), source.as_bytes(), 1)?;
    }

    Ok(builder.build()?)
}
