// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Packing of Python packages into an inlined archive file. */

use {
    crate::{
        bootstrap::PythonBootstrap,
        config::PackConfig,
        error::{PackError, Result},
    },
    log::{info, warn},
    pyinline_archive::{write_artifact, Archive, ArchiveBuilder},
    pyinline_packaging::{filesystem_scanning::walk_package, location::PackageRoot},
    std::{
        io::Write,
        path::{Path, PathBuf},
    },
};

/// Name of the file holding a package's entry script.
pub const ENTRY_SCRIPT_FILENAME: &str = "__main__.py";

/// Locate the package of every argument, in argument order.
pub fn locate_packages(config: &PackConfig) -> Result<Vec<PackageRoot>> {
    let locator = config.locator();

    config
        .packages
        .iter()
        .map(|package| {
            let root = locator.locate(package)?;
            info!("inlining {} from {}", root.name, root.path().display());
            Ok(root)
        })
        .collect()
}

fn read_entry_script(root: &PackageRoot) -> Result<String> {
    let path = root.path().join(ENTRY_SCRIPT_FILENAME);

    match std::fs::read_to_string(&path) {
        Ok(script) => Ok(script),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PackError::config(format!(
            "package {} has no {} to run",
            root.name, ENTRY_SCRIPT_FILENAME
        ))),
        Err(e) => Err(PackError::io(path, e)),
    }
}

/// Build the archive described by a configuration.
///
/// Nothing is written. Every error is raised before output is produced.
pub fn build_archive(config: &PackConfig) -> Result<Archive> {
    config.validate()?;

    let roots = locate_packages(config)?;
    let default_package = config.resolve_default_package(&roots)?;

    let mut builder = ArchiveBuilder::new(config.tagged);
    builder.set_default_package(default_package);
    builder.set_exception_hook(config.exception_hook);

    for root in &roots {
        let files = walk_package(root)?;
        if files.is_empty() {
            warn!("package {} has no modules", root.name);
        }

        for file in files {
            let (source, mtime) = file.read_source()?;
            builder.add_module(&file.relative_path, &source, mtime)?;
        }
    }

    if config.run_entry_script {
        // Validation guarantees a single package.
        if let Some(root) = roots.first() {
            builder.set_entry_script(Some(read_entry_script(root)?));
        }
    }

    Ok(builder.build()?)
}

/// Render an archive as the content of a Python source file.
pub fn render_archive(archive: &Archive, packages: &[String]) -> Result<Vec<u8>> {
    let bootstrap = PythonBootstrap::new(packages.to_vec());

    let mut data = Vec::new();
    write_artifact(archive, &bootstrap, &mut data)?;

    Ok(data)
}

/// Write artifact content to a file or stdout.
///
/// Files are written to a temporary sibling and renamed into place, so a
/// partially written artifact is never observable at `path`.
pub fn write_output(path: Option<&Path>, data: &[u8]) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => {
            let mut stdout = std::io::stdout().lock();
            return stdout
                .write_all(data)
                .and_then(|_| stdout.flush())
                .map_err(|e| PackError::io("<stdout>", e));
        }
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut temp = tempfile::Builder::new()
        .prefix(".pyinline-")
        .suffix(".py")
        .tempfile_in(&parent)
        .map_err(|e| PackError::io(&parent, e))?;

    temp.write_all(data)
        .and_then(|_| temp.flush())
        .map_err(|e| PackError::io(temp.path(), e))?;

    temp.persist(path)
        .map_err(|e| PackError::io(path, e.error))?;

    info!("wrote {}", path.display());

    Ok(())
}

/// Perform a packing run.
pub fn pack(config: &PackConfig) -> Result<()> {
    let archive = build_archive(config)?;
    info!(
        "inlined {} modules into a {} byte blob",
        archive.registry.len(),
        archive.blob.len()
    );

    let data = render_archive(&archive, &config.packages)?;

    write_output(config.output.as_deref(), &data)
}
