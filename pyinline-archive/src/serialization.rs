// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Encoding of module sources inside the blob. */

use {
    crate::{data::NAME_SEPARATOR, ArchiveError, ArchiveResult},
    std::path::{Component, Path},
};

/// Version of the artifact layout written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// Character terminating every encoded region.
///
/// It is never produced by base64, so it doubles as a visual delimiter.
pub const REGION_TERMINATOR: char = '|';

/// File stem of package initializers.
pub const PACKAGE_INIT_STEM: &str = "__init__";

/// File extensions (without the dot) recognized as Python module source.
pub const SOURCE_SUFFIXES: &[&str] = &["py", "pyw", "py3"];

const TAG_PREFIX: &str = "<tag:";
const TAG_SUFFIX: &str = ">";

/// Encode module source into a blob region, terminator included.
pub fn encode_source(source: &[u8]) -> String {
    let mut encoded = base64::encode(source);
    encoded.push(REGION_TERMINATOR);

    encoded
}

/// Decode a blob region back into module source.
///
/// Tolerates trailing whitespace and a leading tag marker line, so regions
/// sliced from tagged blobs decode as well.
pub fn decode_region(name: &str, region: &str) -> ArchiveResult<Vec<u8>> {
    let mut region = region.trim_end();

    if region.starts_with(TAG_PREFIX) {
        region = match region.split_once('\n') {
            Some((_, rest)) => rest,
            None => "",
        };
    }

    let payload = region.strip_suffix(REGION_TERMINATOR).ok_or_else(|| {
        ArchiveError::Format(format!(
            "region of {} is not terminated by {}",
            name, REGION_TERMINATOR
        ))
    })?;

    base64::decode(payload).map_err(|source| ArchiveError::Decode {
        name: name.to_string(),
        source,
    })
}

/// Collect the normal components of a relative path as strings.
fn path_components(path: &Path) -> ArchiveResult<Vec<&str>> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(
                part.to_str()
                    .ok_or_else(|| ArchiveError::UnrepresentablePath(path.display().to_string())),
            ),
            _ => None,
        })
        .collect()
}

/// Produce the human readable marker preceding a region in tagged blobs.
///
/// Paths are always rendered with `/` separators.
pub fn tag_marker(relative_path: &Path) -> ArchiveResult<String> {
    let rendered = path_components(relative_path)?.join("/");

    // The marker lives inside a raw triple quoted Python string.
    if rendered.contains("'''") || rendered.contains('\n') {
        return Err(ArchiveError::UnrepresentablePath(rendered));
    }

    Ok(format!("{}{}{}", TAG_PREFIX, rendered, TAG_SUFFIX))
}

/// Derive the qualified module name of a source file.
///
/// `relative_path` is relative to the directory containing the top-level
/// package, e.g. `foo/bar/__init__.py`. Returns the name and whether the
/// file is a package initializer.
pub fn qualified_name_from_path(relative_path: &Path) -> ArchiveResult<(String, bool)> {
    let mut components = path_components(relative_path)?;

    let file_name = components
        .pop()
        .ok_or_else(|| ArchiveError::UnrepresentablePath(relative_path.display().to_string()))?;

    let stem = match file_name.rsplit_once('.') {
        Some((stem, suffix)) if SOURCE_SUFFIXES.contains(&suffix) => stem,
        _ => {
            return Err(ArchiveError::UnrepresentablePath(
                relative_path.display().to_string(),
            ))
        }
    };

    let is_package = stem == PACKAGE_INIT_STEM;

    if !is_package {
        components.push(stem);
    }

    if components.is_empty() {
        return Err(ArchiveError::UnrepresentablePath(
            relative_path.display().to_string(),
        ));
    }

    Ok((
        components.join(NAME_SEPARATOR.to_string().as_str()),
        is_package,
    ))
}
