// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Declares the foundational data primitives inside inlined archives. */

use {
    crate::{serialization::decode_region, ArchiveError, ArchiveResult},
    serde::{
        de::{MapAccess, Visitor},
        ser::SerializeMap,
        Deserialize, Deserializer, Serialize, Serializer,
    },
    std::{collections::HashMap, convert::TryFrom, fmt, ops::Range},
};

/// Separator between components of a qualified module name.
pub const NAME_SEPARATOR: char = '.';

/// Obtain the name of the package containing a qualified name.
///
/// Returns `None` for top-level names.
pub fn parent_name(name: &str) -> Option<&str> {
    name.rsplit_once(NAME_SEPARATOR).map(|(parent, _)| parent)
}

/// Describes how the emitted bootstrap treats the uncaught exception handler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExceptionHookMode {
    /// Always install the handler.
    ForceOn,
    /// Never install the handler.
    ForceOff,
    /// Install the handler only if the host doesn't have a custom one.
    ///
    /// Detecting a custom handler is best-effort.
    #[default]
    Auto,
}

impl ExceptionHookMode {
    /// The Python literal representing this mode in the bootstrap prologue.
    pub fn python_literal(&self) -> &'static str {
        match self {
            Self::ForceOn => "True",
            Self::ForceOff => "False",
            Self::Auto => "None",
        }
    }
}

impl TryFrom<&str> for ExceptionHookMode {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "True" => Ok(Self::ForceOn),
            "False" => Ok(Self::ForceOff),
            "None" => Ok(Self::Auto),
            _ => Err(format!("{} is not a valid exception hook mode", value)),
        }
    }
}

/// Represents a single module stored in the blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleRecord {
    /// Fully qualified module name. e.g. `foo.bar`.
    ///
    /// Packages are named after their directory, without `__init__`.
    pub name: String,

    /// Whether the module is a package.
    pub is_package: bool,

    /// Offset of the first byte of the encoded region in the blob.
    pub start: usize,

    /// Offset one past the last byte of the encoded region in the blob.
    pub end: usize,

    /// Modification time of the source file, in seconds since the UNIX epoch.
    pub mtime: u64,
}

impl ModuleRecord {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Synthetic path used as the module origin in diagnostics.
    pub fn origin_path(&self) -> String {
        let base = self.name.replace(NAME_SEPARATOR, "/");

        if self.is_package {
            format!("{}/__init__.py", base)
        } else {
            format!("{}.py", base)
        }
    }
}

/// Whether a name is an immediate child of a package target.
///
/// `None` targets the root level and only matches top-level names.
fn name_at_package_hierarchy(name: &str, package: Option<&str>) -> bool {
    match package {
        None => !name.contains(NAME_SEPARATOR),
        Some(package) => match name
            .strip_prefix(package)
            .and_then(|s| s.strip_prefix(NAME_SEPARATOR))
        {
            Some(suffix) => !suffix.contains(NAME_SEPARATOR),
            None => false,
        },
    }
}

/// Ordered mapping of qualified module names to their records.
///
/// Iteration order is insertion order, which is the order in which modules
/// were written to the blob.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Registry {
    records: Vec<ModuleRecord>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, refusing names that are already registered.
    pub fn insert(&mut self, record: ModuleRecord) -> ArchiveResult<()> {
        if self.index.contains_key(&record.name) {
            return Err(ArchiveError::DuplicateModule(record.name));
        }

        self.index.insert(record.name.clone(), self.records.len());
        self.records.push(record);

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ModuleRecord> {
        self.index.get(name).map(|idx| &self.records[*idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.records.iter()
    }

    /// Records that are immediate children of a package.
    ///
    /// `None` yields top-level records.
    pub fn children<'a>(
        &'a self,
        package: Option<&'a str>,
    ) -> impl Iterator<Item = &'a ModuleRecord> + 'a {
        self.records
            .iter()
            .filter(move |record| name_at_package_hierarchy(&record.name, package))
    }

    /// Verify that every range lies within a blob of `blob_len` bytes.
    ///
    /// Untagged blobs must additionally be covered exactly by the ranges, in
    /// registry order. Tagged blobs only need ranges to be ordered and
    /// disjoint, since marker text sits between them.
    pub fn validate(&self, blob_len: usize, tagged: bool) -> ArchiveResult<()> {
        let mut cursor = 0;

        for record in &self.records {
            if record.start > record.end || record.end > blob_len {
                return Err(ArchiveError::Format(format!(
                    "range {}..{} of {} is outside blob of length {}",
                    record.start, record.end, record.name, blob_len
                )));
            }

            if tagged {
                if record.start < cursor {
                    return Err(ArchiveError::Format(format!(
                        "range of {} overlaps the previous module",
                        record.name
                    )));
                }
            } else if record.start != cursor {
                return Err(ArchiveError::Format(format!(
                    "range of {} starts at {}; expected {}",
                    record.name, record.start, cursor
                )));
            }

            cursor = record.end;
        }

        if !tagged && cursor != blob_len {
            return Err(ArchiveError::Format(format!(
                "registry covers {} bytes of a {} byte blob",
                cursor, blob_len
            )));
        }

        Ok(())
    }
}

/// Package flag as it appears in serialized registries.
///
/// Writers emit integers so the registry is valid JSON and valid Python.
/// Booleans are accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum PackageFlag {
    Bool(bool),
    Int(u8),
}

#[derive(Deserialize)]
struct SerializedRecord(PackageFlag, usize, usize, u64);

impl Serialize for Registry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.records.len()))?;

        for record in &self.records {
            map.serialize_entry(
                &record.name,
                &(
                    u8::from(record.is_package),
                    record.start,
                    record.end,
                    record.mtime,
                ),
            )?;
        }

        map.end()
    }
}

struct RegistryVisitor;

impl<'de> Visitor<'de> for RegistryVisitor {
    type Value = Registry;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a mapping of module names to [is_package, start, end, mtime]")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut registry = Registry::new();

        while let Some((name, value)) = access.next_entry::<String, SerializedRecord>()? {
            let is_package = match value.0 {
                PackageFlag::Bool(v) => v,
                PackageFlag::Int(v) => v != 0,
            };

            registry
                .insert(ModuleRecord {
                    name,
                    is_package,
                    start: value.1,
                    end: value.2,
                    mtime: value.3,
                })
                .map_err(serde::de::Error::custom)?;
        }

        Ok(registry)
    }
}

impl<'de> Deserialize<'de> for Registry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RegistryVisitor)
    }
}

/// A fully assembled inlined archive.
///
/// Instances are produced by [crate::ArchiveBuilder] at pack time or by
/// [crate::parse_artifact] when reading an emitted file. They are not
/// mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Archive {
    /// Encoded sources of every module.
    pub blob: String,

    /// Where each module lives in `blob`.
    pub registry: Registry,

    /// Package that the artifact's own name resolves to.
    pub default_package: Option<String>,

    /// How the bootstrap installs the uncaught exception handler.
    pub exception_hook: ExceptionHookMode,

    /// Whether the blob uses the tagged layout.
    pub tagged: bool,

    /// Script executed once after the importer is installed.
    pub entry_script: Option<String>,
}

impl Archive {
    /// Check internal consistency of the archive.
    pub fn validate(&self) -> ArchiveResult<()> {
        self.registry.validate(self.blob.len(), self.tagged)?;

        if let Some(package) = &self.default_package {
            match self.registry.get(package) {
                Some(record) if record.is_package => {}
                Some(_) => {
                    return Err(ArchiveError::Format(format!(
                        "default package {} is not a package",
                        package
                    )))
                }
                None => {
                    return Err(ArchiveError::Format(format!(
                        "default package {} is not in the registry",
                        package
                    )))
                }
            }
        }

        Ok(())
    }

    /// Obtain the encoded region backing a record.
    pub fn encoded_region(&self, record: &ModuleRecord) -> ArchiveResult<&str> {
        self.blob.get(record.range()).ok_or_else(|| {
            ArchiveError::Format(format!(
                "range {}..{} of {} does not address the blob",
                record.start, record.end, record.name
            ))
        })
    }

    /// Decode the source of a record.
    pub fn record_source(&self, record: &ModuleRecord) -> ArchiveResult<Vec<u8>> {
        decode_region(&record.name, self.encoded_region(record)?)
    }

    /// Decode the source of a module by name.
    ///
    /// Returns `Ok(None)` if the module isn't registered.
    pub fn module_source(&self, name: &str) -> ArchiveResult<Option<Vec<u8>>> {
        match self.registry.get(name) {
            Some(record) => Ok(Some(self.record_source(record)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, anyhow::Result};

    fn record(name: &str, is_package: bool, start: usize, end: usize) -> ModuleRecord {
        ModuleRecord {
            name: name.to_string(),
            is_package,
            start,
            end,
            mtime: 42,
        }
    }

    #[test]
    fn test_parent_name() {
        assert_eq!(parent_name("foo"), None);
        assert_eq!(parent_name("foo.bar"), Some("foo"));
        assert_eq!(parent_name("foo.bar.baz"), Some("foo.bar"));
    }

    #[test]
    fn test_exception_hook_literal() -> Result<()> {
        for mode in [
            ExceptionHookMode::ForceOn,
            ExceptionHookMode::ForceOff,
            ExceptionHookMode::Auto,
        ] {
            assert_eq!(ExceptionHookMode::try_from(mode.python_literal()), Ok(mode));
        }
        assert!(ExceptionHookMode::try_from("maybe").is_err());

        Ok(())
    }

    #[test]
    fn test_origin_path() {
        assert_eq!(
            record("foo.bar", true, 0, 0).origin_path(),
            "foo/bar/__init__.py"
        );
        assert_eq!(record("foo.bar", false, 0, 0).origin_path(), "foo/bar.py");
    }

    #[test]
    fn test_duplicate_rejected() -> Result<()> {
        let mut registry = Registry::new();
        registry.insert(record("foo", true, 0, 4))?;

        assert!(matches!(
            registry.insert(record("foo", false, 4, 8)),
            Err(ArchiveError::DuplicateModule(name)) if name == "foo"
        ));
        assert_eq!(registry.len(), 1);

        Ok(())
    }

    #[test]
    fn test_children() -> Result<()> {
        let mut registry = Registry::new();
        registry.insert(record("foo", true, 0, 1))?;
        registry.insert(record("foo.a", false, 1, 2))?;
        registry.insert(record("foo.sub", true, 2, 3))?;
        registry.insert(record("foo.sub.x", false, 3, 4))?;
        registry.insert(record("foobar", true, 4, 5))?;

        let names = |package: Option<&'static str>| {
            registry
                .children(package)
                .map(|r| r.name.clone())
                .collect::<Vec<_>>()
        };

        assert_eq!(names(None), vec!["foo", "foobar"]);
        assert_eq!(names(Some("foo")), vec!["foo.a", "foo.sub"]);
        assert_eq!(names(Some("foo.sub")), vec!["foo.sub.x"]);
        assert!(names(Some("foo.a")).is_empty());

        Ok(())
    }

    #[test]
    fn test_validate_contiguous() -> Result<()> {
        let mut registry = Registry::new();
        registry.insert(record("foo", true, 0, 5))?;
        registry.insert(record("foo.a", false, 5, 9))?;

        registry.validate(9, false)?;
        assert!(registry.validate(10, false).is_err());
        assert!(registry.validate(8, false).is_err());

        Ok(())
    }

    #[test]
    fn test_validate_gap() -> Result<()> {
        let mut registry = Registry::new();
        registry.insert(record("foo", true, 2, 5))?;
        registry.insert(record("foo.a", false, 7, 9))?;

        assert!(registry.validate(9, false).is_err());
        registry.validate(10, true)?;

        Ok(())
    }

    #[test]
    fn test_validate_overlap() -> Result<()> {
        let mut registry = Registry::new();
        registry.insert(record("foo", true, 0, 5))?;
        registry.insert(record("foo.a", false, 4, 9))?;

        assert!(registry.validate(9, false).is_err());
        assert!(registry.validate(9, true).is_err());

        Ok(())
    }

    #[test]
    fn test_registry_json_preserves_order() -> Result<()> {
        let mut registry = Registry::new();
        registry.insert(record("zeta", true, 0, 5))?;
        registry.insert(record("alpha", false, 5, 9))?;

        let json = serde_json::to_string(&registry)?;
        assert_eq!(json, r#"{"zeta":[1,0,5,42],"alpha":[0,5,9,42]}"#);

        let parsed: Registry = serde_json::from_str(&json)?;
        assert_eq!(parsed, registry);

        let booleans: Registry = serde_json::from_str(r#"{"zeta":[true,0,5,42]}"#)?;
        assert!(booleans.get("zeta").unwrap().is_package);

        Ok(())
    }

    #[test]
    fn test_registry_json_duplicate() {
        let res = serde_json::from_str::<Registry>(r#"{"a":[0,0,1,0],"a":[0,1,2,0]}"#);
        assert!(res.is_err());
    }
}
