// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Inspection of emitted archive files. */

use {
    crate::error::{PackError, Result},
    pyinline_archive::{parse_artifact, Archive, ExceptionHookMode, FORMAT_VERSION},
    serde::Serialize,
    std::{fmt::Write as _, io::Write, path::Path},
};

/// Describes a module in an archive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModuleSummary {
    pub name: String,
    pub is_package: bool,
    pub start: usize,
    pub end: usize,
    pub mtime: u64,
    /// Length of the decoded source.
    pub source_len: usize,
}

/// Describes an archive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    pub format_version: u32,
    pub tagged: bool,
    pub default_package: Option<String>,
    pub exception_hook: &'static str,
    pub entry_script: bool,
    pub blob_len: usize,
    pub modules: Vec<ModuleSummary>,
}

fn hook_mode_name(mode: ExceptionHookMode) -> &'static str {
    match mode {
        ExceptionHookMode::ForceOn => "on",
        ExceptionHookMode::ForceOff => "off",
        ExceptionHookMode::Auto => "auto",
    }
}

/// Read and parse an archive file.
pub fn read_artifact(path: &Path) -> Result<Archive> {
    let text = std::fs::read_to_string(path).map_err(|e| PackError::io(path, e))?;

    Ok(parse_artifact(&text)?)
}

/// Summarize an archive.
///
/// Every module is decoded, so undecodable regions are reported here.
pub fn summarize(archive: &Archive) -> Result<ArchiveSummary> {
    let modules = archive
        .registry
        .iter()
        .map(|record| {
            let source = archive.record_source(record)?;

            Ok(ModuleSummary {
                name: record.name.clone(),
                is_package: record.is_package,
                start: record.start,
                end: record.end,
                mtime: record.mtime,
                source_len: source.len(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ArchiveSummary {
        format_version: FORMAT_VERSION,
        tagged: archive.tagged,
        default_package: archive.default_package.clone(),
        exception_hook: hook_mode_name(archive.exception_hook),
        entry_script: archive.entry_script.is_some(),
        blob_len: archive.blob.len(),
        modules,
    })
}

/// Render a summary as human readable text.
pub fn render_text(summary: &ArchiveSummary) -> String {
    let mut text = String::new();

    // Writing to a String can't fail.
    let _ = writeln!(text, "format version: {}", summary.format_version);
    let _ = writeln!(
        text,
        "default package: {}",
        summary.default_package.as_deref().unwrap_or("<none>")
    );
    let _ = writeln!(text, "exception hook: {}", summary.exception_hook);
    let _ = writeln!(text, "tagged: {}", summary.tagged);
    let _ = writeln!(text, "entry script: {}", summary.entry_script);
    let _ = writeln!(
        text,
        "{} modules in {} blob bytes",
        summary.modules.len(),
        summary.blob_len
    );

    for module in &summary.modules {
        let _ = writeln!(
            text,
            "{} {} [{}, {}) {} bytes",
            if module.is_package { "P" } else { "M" },
            module.name,
            module.start,
            module.end,
            module.source_len
        );
    }

    text
}

/// Obtain the decoded source of a named module.
pub fn module_source(archive: &Archive, name: &str) -> Result<Vec<u8>> {
    archive
        .module_source(name)?
        .ok_or_else(|| PackError::config(format!("{} is not in the archive", name)))
}

/// Print information about an archive file to stdout.
///
/// With `source`, the decoded source of that module is printed instead of a
/// listing.
pub fn inspect(path: &Path, source: Option<&str>, json: bool) -> Result<()> {
    let archive = read_artifact(path)?;

    let data = match source {
        Some(name) => module_source(&archive, name)?,
        None => {
            let summary = summarize(&archive)?;

            if json {
                let mut data = serde_json::to_vec_pretty(&summary)
                    .map_err(|e| PackError::Archive(e.into()))?;
                data.push(b'\n');
                data
            } else {
                render_text(&summary).into_bytes()
            }
        }
    };

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(&data)
        .and_then(|_| stdout.flush())
        .map_err(|e| PackError::io("<stdout>", e))
}

#[cfg(test)]
mod tests {
    use {super::*, anyhow::Result, pyinline_archive::ArchiveBuilder};

    fn sample() -> Result<Archive> {
        let mut builder = ArchiveBuilder::new(false);
        builder.add_module(Path::new("pkg/__init__.py"), b"", 5)?;
        builder.add_module(Path::new("pkg/util.py"), b"VALUE = 1\n", 6)?;
        builder.set_default_package(Some("pkg".to_string()));

        Ok(builder.build()?)
    }

    #[test]
    fn test_summarize() -> Result<()> {
        let archive = sample()?;
        let summary = summarize(&archive)?;

        assert_eq!(summary.default_package.as_deref(), Some("pkg"));
        assert_eq!(summary.exception_hook, "auto");
        assert_eq!(summary.modules.len(), 2);
        assert_eq!(summary.modules[1].name, "pkg.util");
        assert_eq!(summary.modules[1].source_len, 10);
        assert_eq!(summary.modules[1].end, archive.blob.len());

        let text = render_text(&summary);
        assert!(text.contains("default package: pkg\n"));
        assert!(text.contains("2 modules in"));
        assert!(text.contains("\nP pkg [0, "));
        assert!(text.contains("\nM pkg.util ["));

        Ok(())
    }

    #[test]
    fn test_corrupt_region() -> Result<()> {
        let mut archive = sample()?;
        archive.blob = archive.blob.replace('|', "#");

        let err = summarize(&archive).unwrap_err();
        assert_eq!(err.exit_code(), 4);

        Ok(())
    }

    #[test]
    fn test_module_source() -> Result<()> {
        let archive = sample()?;

        assert_eq!(module_source(&archive, "pkg.util")?, b"VALUE = 1\n");
        assert!(matches!(
            module_source(&archive, "pkg.missing"),
            Err(PackError::Config(_))
        ));

        Ok(())
    }
}
