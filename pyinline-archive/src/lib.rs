// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Inlined Python Archives

This crate defines and implements a data format for storing the source
files of one or more Python packages inside a single Python source file.
We call the emitted file an *inlined archive*.

A producer walks a package tree, encodes every module's source into one
text *blob* and records each module's byte range in a *registry* keyed by
its fully qualified module name. The blob and the registry are then written
between a bootstrap prologue and epilogue. At run time, the epilogue
installs an importer that slices source out of the blob on demand.

The blob uses standard base64 for every module so it can never contain the
Python string terminator `'''` nor the region terminator `|`.

Two blob layouts exist:

* *Untagged*. Regions are packed back to back. For consecutive registry
  entries, `end` of one equals `start` of the next, the first region starts
  at 0 and the last ends at the blob length.
* *Tagged*. Every region is preceded by a `<tag:relative/path.py>` marker
  line and followed by a newline. Registry ranges exclude the marker, so
  ranges are still exact but are no longer contiguous. Code that splits the
  blob by walking it from start to end must not be used with this layout.
*/

mod data;
mod parser;
mod serialization;
mod writer;

pub use crate::{
    data::{parent_name, Archive, ExceptionHookMode, ModuleRecord, Registry, NAME_SEPARATOR},
    parser::parse_artifact,
    serialization::{
        decode_region, encode_source, qualified_name_from_path, tag_marker, FORMAT_VERSION,
        PACKAGE_INIT_STEM, REGION_TERMINATOR, SOURCE_SUFFIXES,
    },
    writer::{write_artifact, ArchiveBuilder, BootstrapTemplate, ENTRY_SCRIPT_MARKER},
};

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed archive: {0}")]
    Format(String),

    #[error("duplicate module name: {0}")]
    DuplicateModule(String),

    #[error("source of module {name} could not be decoded: {source}")]
    Decode {
        name: String,
        source: base64::DecodeError,
    },

    #[error("registry (de)serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bootstrap template error: {0}")]
    Bootstrap(String),

    #[error("path cannot be stored in an archive: {0}")]
    UnrepresentablePath(String),
}

/// Result type for this crate.
pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;
