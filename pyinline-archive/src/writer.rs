// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Assembling and writing inlined archives. */

use {
    crate::{
        data::{Archive, ExceptionHookMode, ModuleRecord, Registry},
        serialization::{encode_source, qualified_name_from_path, tag_marker, FORMAT_VERSION},
        ArchiveError, ArchiveResult,
    },
    log::debug,
    std::{io::Write, path::Path},
};

/// Line separating the bootstrap epilogue from an appended entry script.
pub const ENTRY_SCRIPT_MARKER: &str = "# <pyinline:entry-script>";

pub(crate) const FORMAT_VERSION_CONSTANT: &str = "INLINER_FORMAT_VERSION";
pub(crate) const EXCEPTION_HOOK_CONSTANT: &str = "INLINER_EXCEPTION_HOOK";
pub(crate) const DEFAULT_PACKAGE_CONSTANT: &str = "INLINER_DEFAULT_PACKAGE";
pub(crate) const TAGGED_CONSTANT: &str = "INLINER_TAGGED";
pub(crate) const RUN_ENTRY_SCRIPT_CONSTANT: &str = "INLINER_RUN_ENTRY_SCRIPT";
pub(crate) const BLOB_OPEN: &str = "INLINER_BLOB = r'''";
pub(crate) const BLOB_CLOSE: &str = "'''";
pub(crate) const REGISTRY_OPEN: &str = "INLINER_REGISTRY = ";

/// Produces the bootstrap code surrounding the archive data.
///
/// The prologue runs before the archive constants are defined and the
/// epilogue runs after them. The epilogue is responsible for installing the
/// importer, and, when the archive has an entry script, for letting the
/// entry script run after it.
pub trait BootstrapTemplate {
    fn render_prologue(&self, archive: &Archive) -> ArchiveResult<String>;

    fn render_epilogue(&self, archive: &Archive) -> ArchiveResult<String>;
}

/// Incrementally builds an [Archive].
///
/// Module ranges are taken from the blob write cursor immediately before and
/// after each module is appended. They are never recomputed.
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    blob: String,
    registry: Registry,
    tagged: bool,
    default_package: Option<String>,
    exception_hook: ExceptionHookMode,
    entry_script: Option<String>,
}

impl ArchiveBuilder {
    /// Construct a builder for the untagged or tagged blob layout.
    pub fn new(tagged: bool) -> Self {
        Self {
            tagged,
            ..Default::default()
        }
    }

    pub fn set_default_package(&mut self, package: Option<String>) {
        self.default_package = package;
    }

    pub fn set_exception_hook(&mut self, mode: ExceptionHookMode) {
        self.exception_hook = mode;
    }

    pub fn set_entry_script(&mut self, script: Option<String>) {
        self.entry_script = script;
    }

    /// Append the source of a module to the blob.
    ///
    /// `relative_path` locates the source file relative to the directory
    /// holding its top-level package and determines the module name.
    pub fn add_module(
        &mut self,
        relative_path: &Path,
        source: &[u8],
        mtime: u64,
    ) -> ArchiveResult<ModuleRecord> {
        let (name, is_package) = qualified_name_from_path(relative_path)?;

        if self.registry.contains(&name) {
            return Err(ArchiveError::DuplicateModule(name));
        }

        if self.tagged {
            self.blob.push_str(&tag_marker(relative_path)?);
            self.blob.push('\n');
        }

        let start = self.blob.len();
        self.blob.push_str(&encode_source(source));
        if self.tagged {
            self.blob.push('\n');
        }
        let end = self.blob.len();

        debug!("encoded {} into blob range {}..{}", name, start, end);

        let record = ModuleRecord {
            name,
            is_package,
            start,
            end,
            mtime,
        };
        self.registry.insert(record.clone())?;

        Ok(record)
    }

    /// Finish building, validating the result.
    pub fn build(self) -> ArchiveResult<Archive> {
        let archive = Archive {
            blob: self.blob,
            registry: self.registry,
            default_package: self.default_package,
            exception_hook: self.exception_hook,
            tagged: self.tagged,
            entry_script: self.entry_script,
        };

        archive.validate()?;

        Ok(archive)
    }
}

fn python_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Serialize the registry with one module per line.
///
/// Keys keep registry order and formatting is fixed, so identical registries
/// always serialize identically.
fn write_registry<W: Write>(registry: &Registry, dest: &mut W) -> ArchiveResult<()> {
    writeln!(dest, "{}{{", REGISTRY_OPEN)?;

    let count = registry.len();
    for (i, record) in registry.iter().enumerate() {
        writeln!(
            dest,
            "    {}: [{}, {}, {}, {}]{}",
            serde_json::to_string(&record.name)?,
            u8::from(record.is_package),
            record.start,
            record.end,
            record.mtime,
            if i + 1 < count { "," } else { "" }
        )?;
    }

    writeln!(dest, "}}")?;

    Ok(())
}

/// Write an archive as a single Python source file.
///
/// The layout is, in order: the template prologue, the archive constants,
/// the blob literal, the registry literal, the template epilogue and,
/// if present, the entry script preceded by [ENTRY_SCRIPT_MARKER].
pub fn write_artifact<W: Write>(
    archive: &Archive,
    bootstrap: &dyn BootstrapTemplate,
    dest: &mut W,
) -> ArchiveResult<()> {
    let prologue = bootstrap.render_prologue(archive)?;
    let epilogue = bootstrap.render_epilogue(archive)?;

    dest.write_all(prologue.as_bytes())?;
    if !prologue.is_empty() && !prologue.ends_with('\n') {
        dest.write_all(b"\n")?;
    }

    let default_package = match &archive.default_package {
        Some(package) => serde_json::to_string(package)?,
        None => "None".to_string(),
    };

    writeln!(dest, "{} = {}", FORMAT_VERSION_CONSTANT, FORMAT_VERSION)?;
    writeln!(
        dest,
        "{} = {}",
        EXCEPTION_HOOK_CONSTANT,
        archive.exception_hook.python_literal()
    )?;
    writeln!(dest, "{} = {}", DEFAULT_PACKAGE_CONSTANT, default_package)?;
    writeln!(dest, "{} = {}", TAGGED_CONSTANT, python_bool(archive.tagged))?;
    writeln!(
        dest,
        "{} = {}",
        RUN_ENTRY_SCRIPT_CONSTANT,
        python_bool(archive.entry_script.is_some())
    )?;
    writeln!(dest)?;

    dest.write_all(BLOB_OPEN.as_bytes())?;
    dest.write_all(archive.blob.as_bytes())?;
    dest.write_all(BLOB_CLOSE.as_bytes())?;
    writeln!(dest)?;
    writeln!(dest)?;

    write_registry(&archive.registry, dest)?;

    dest.write_all(epilogue.as_bytes())?;

    if let Some(script) = &archive.entry_script {
        if !epilogue.is_empty() && !epilogue.ends_with('\n') {
            writeln!(dest)?;
        }
        writeln!(dest, "{}", ENTRY_SCRIPT_MARKER)?;
        dest.write_all(script.as_bytes())?;
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use {super::*, anyhow::Result};

    /// A template with fixed text.
    pub(crate) struct PlainTemplate;

    impl BootstrapTemplate for PlainTemplate {
        fn render_prologue(&self, _archive: &Archive) -> ArchiveResult<String> {
            Ok("import sys\n".to_string())
        }

        fn render_epilogue(&self, _archive: &Archive) -> ArchiveResult<String> {
            Ok("install()\n".to_string())
        }
    }

    pub(crate) fn sample_builder(tagged: bool) -> Result<ArchiveBuilder> {
        let mut builder = ArchiveBuilder::new(tagged);
        builder.add_module(Path::new("pkg/__init__.py"), b"from . import util\n", 10)?;
        builder.add_module(Path::new("pkg/util.py"), b"VALUE = 1\n", 11)?;
        builder.add_module(Path::new("pkg/sub/__init__.py"), b"", 12)?;
        builder.add_module(Path::new("pkg/sub/x.py"), b"import pkg\n", 13)?;

        Ok(builder)
    }

    #[test]
    fn test_ranges_contiguous() -> Result<()> {
        let archive = sample_builder(false)?.build()?;

        let records = archive.registry.iter().collect::<Vec<_>>();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].start, 0);
        for pair in records.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(records[3].end, archive.blob.len());

        assert_eq!(
            archive.module_source("pkg.util")?,
            Some(b"VALUE = 1\n".to_vec())
        );
        assert_eq!(archive.module_source("pkg.sub")?, Some(vec![]));
        assert_eq!(archive.module_source("pkg.missing")?, None);

        Ok(())
    }

    #[test]
    fn test_ranges_tagged() -> Result<()> {
        let archive = sample_builder(true)?.build()?;

        assert!(archive.blob.starts_with("<tag:pkg/__init__.py>\n"));

        let first = archive.registry.get("pkg").unwrap();
        assert_eq!(first.start, "<tag:pkg/__init__.py>\n".len());
        assert!(archive.encoded_region(first)?.ends_with("|\n"));

        for record in archive.registry.iter() {
            assert_eq!(
                archive.record_source(record)?,
                sample_builder(false)?
                    .build()?
                    .module_source(&record.name)?
                    .unwrap()
            );
        }

        Ok(())
    }

    #[test]
    fn test_duplicate_module() -> Result<()> {
        let mut builder = ArchiveBuilder::new(false);
        builder.add_module(Path::new("pkg/mod.py"), b"a", 0)?;
        let blob_len = builder.blob.len();

        assert!(matches!(
            builder.add_module(Path::new("pkg/mod.pyw"), b"b", 0),
            Err(ArchiveError::DuplicateModule(_))
        ));
        assert_eq!(builder.blob.len(), blob_len);

        Ok(())
    }

    #[test]
    fn test_default_package_validated() -> Result<()> {
        let mut builder = sample_builder(false)?;
        builder.set_default_package(Some("pkg.util".to_string()));
        assert!(matches!(builder.build(), Err(ArchiveError::Format(_))));

        let mut builder = sample_builder(false)?;
        builder.set_default_package(Some("other".to_string()));
        assert!(matches!(builder.build(), Err(ArchiveError::Format(_))));

        let mut builder = sample_builder(false)?;
        builder.set_default_package(Some("pkg".to_string()));
        builder.build()?;

        Ok(())
    }

    #[test]
    fn test_write_layout() -> Result<()> {
        let mut builder = ArchiveBuilder::new(false);
        builder.add_module(Path::new("pkg/__init__.py"), b"x = 1\n", 7)?;
        builder.set_default_package(Some("pkg".to_string()));
        builder.set_exception_hook(ExceptionHookMode::ForceOff);
        builder.set_entry_script(Some("print('main')\n".to_string()));
        let archive = builder.build()?;

        let mut data = Vec::new();
        write_artifact(&archive, &PlainTemplate, &mut data)?;

        let expected = format!(
            "import sys\n\
             INLINER_FORMAT_VERSION = 1\n\
             INLINER_EXCEPTION_HOOK = False\n\
             INLINER_DEFAULT_PACKAGE = \"pkg\"\n\
             INLINER_TAGGED = False\n\
             INLINER_RUN_ENTRY_SCRIPT = True\n\
             \n\
             INLINER_BLOB = r'''{}'''\n\
             \n\
             INLINER_REGISTRY = {{\n    \"pkg\": [1, 0, {}, 7]\n}}\n\
             install()\n\
             # <pyinline:entry-script>\n\
             print('main')\n",
            archive.blob,
            archive.blob.len()
        );
        assert_eq!(String::from_utf8(data)?, expected);

        Ok(())
    }

    #[test]
    fn test_write_deterministic() -> Result<()> {
        let mut first = Vec::new();
        let mut second = Vec::new();
        write_artifact(&sample_builder(false)?.build()?, &PlainTemplate, &mut first)?;
        write_artifact(&sample_builder(false)?.build()?, &PlainTemplate, &mut second)?;

        assert_eq!(first, second);

        Ok(())
    }
}
