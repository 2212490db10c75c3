// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Parsing of emitted inlined archive files. */

use {
    crate::{
        data::{Archive, ExceptionHookMode, Registry},
        serialization::FORMAT_VERSION,
        writer::{
            BLOB_CLOSE, BLOB_OPEN, DEFAULT_PACKAGE_CONSTANT, ENTRY_SCRIPT_MARKER,
            EXCEPTION_HOOK_CONSTANT, FORMAT_VERSION_CONSTANT, REGISTRY_OPEN,
            RUN_ENTRY_SCRIPT_CONSTANT, TAGGED_CONSTANT,
        },
        ArchiveError, ArchiveResult,
    },
    std::convert::TryFrom,
};

fn format_error(message: impl Into<String>) -> ArchiveError {
    ArchiveError::Format(message.into())
}

/// Find the value assigned to a constant in the archive header.
fn constant_value<'a>(header: &'a str, name: &str) -> ArchiveResult<&'a str> {
    header
        .lines()
        .find_map(|line| {
            line.strip_prefix(name)
                .and_then(|rest| rest.strip_prefix(" = "))
        })
        .map(|value| value.trim())
        .ok_or_else(|| format_error(format!("{} is not defined", name)))
}

fn python_bool(name: &str, value: &str) -> ArchiveResult<bool> {
    match value {
        "True" => Ok(true),
        "False" => Ok(false),
        _ => Err(format_error(format!(
            "{} has non-boolean value {}",
            name, value
        ))),
    }
}

/// Parse an emitted archive file back into an [Archive].
///
/// Everything up to the blob literal is treated as the header holding the
/// archive constants. Bootstrap code is not interpreted. The result is
/// validated, so registry ranges that don't fit the blob are reported as
/// [ArchiveError::Format].
pub fn parse_artifact(text: &str) -> ArchiveResult<Archive> {
    let blob_open = text
        .find(BLOB_OPEN)
        .ok_or_else(|| format_error("blob literal not found"))?;
    let header = &text[..blob_open];

    let version = constant_value(header, FORMAT_VERSION_CONSTANT)?;
    if version != FORMAT_VERSION.to_string() {
        return Err(format_error(format!(
            "unsupported format version {}",
            version
        )));
    }

    let exception_hook =
        ExceptionHookMode::try_from(constant_value(header, EXCEPTION_HOOK_CONSTANT)?)
            .map_err(format_error)?;

    let default_package = match constant_value(header, DEFAULT_PACKAGE_CONSTANT)? {
        "None" => None,
        value => Some(serde_json::from_str::<String>(value)?),
    };

    let tagged = python_bool(TAGGED_CONSTANT, constant_value(header, TAGGED_CONSTANT)?)?;
    let run_entry_script = python_bool(
        RUN_ENTRY_SCRIPT_CONSTANT,
        constant_value(header, RUN_ENTRY_SCRIPT_CONSTANT)?,
    )?;

    let blob_start = blob_open + BLOB_OPEN.len();
    let blob_len = text[blob_start..]
        .find(BLOB_CLOSE)
        .ok_or_else(|| format_error("blob literal is not terminated"))?;
    let blob = &text[blob_start..blob_start + blob_len];
    let rest = &text[blob_start + blob_len + BLOB_CLOSE.len()..];

    let registry_open = rest
        .find(REGISTRY_OPEN)
        .ok_or_else(|| format_error("registry literal not found"))?;
    let registry_text = &rest[registry_open + REGISTRY_OPEN.len()..];

    // Only the leading JSON value is consumed. The epilogue follows it.
    let registry = serde_json::Deserializer::from_str(registry_text)
        .into_iter::<Registry>()
        .next()
        .ok_or_else(|| format_error("registry literal is empty"))??;

    let entry_script = if run_entry_script {
        let marker = format!("\n{}\n", ENTRY_SCRIPT_MARKER);
        let offset = registry_text
            .find(&marker)
            .ok_or_else(|| format_error("entry script marker not found"))?;

        Some(registry_text[offset + marker.len()..].to_string())
    } else {
        None
    };

    let archive = Archive {
        blob: blob.to_string(),
        registry,
        default_package,
        exception_hook,
        tagged,
        entry_script,
    };

    archive.validate()?;

    Ok(archive)
}
