//! Object key layout and path validation.
//!
//! Blocks are laid out as `<tenant>/<block id>/<object>`, where the metadata
//! objects are `meta.json` for an active block and `meta.compacted.json` once
//! the block has been superseded by compaction. Every key that reaches a
//! backend goes through [`validate`] first so that a hostile tenant name can
//! never escape the storage root.

use crate::error::{ErrorKind, Result};
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// Name of the metadata object of an active block.
pub const META_NAME: &str = "meta.json";
/// Name of the metadata object of a compacted block.
pub const COMPACTED_META_NAME: &str = "meta.compacted.json";

/// The metadata objects a block directory may contain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetaObject {
    Active,
    Compacted,
}
impl MetaObject {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Active => META_NAME,
            Self::Compacted => COMPACTED_META_NAME,
        }
    }
}

/// Validates a storage key, resolving `.` and `..` components.
///
/// Keys are always relative to the backend root: leading slashes are dropped,
/// parent references may not climb above the root, and NUL bytes or Windows
/// drive prefixes are rejected outright.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use blockscope_storage::validate_path;
/// assert_eq!(validate_path("tenant/./block/../meta.json").unwrap(), Path::new("tenant/meta.json"));
/// assert!(validate_path("../outside").is_err());
/// assert!(validate_path("a\0b").is_err());
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(original.to_path_buf());
    let mut resolved: Vec<&std::ffi::OsStr> = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(part) if part.as_encoded_bytes().contains(&0) => exn::bail!(invalid()),
            Component::Normal(part) => resolved.push(part),
            Component::CurDir | Component::RootDir => {},
            Component::ParentDir => {
                if resolved.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
            Component::Prefix(_) => exn::bail!(invalid()),
        }
    }
    if resolved.is_empty() {
        exn::bail!(invalid());
    }
    Ok(resolved.into_iter().collect())
}

/// Directory holding every block of a tenant.
pub fn tenant_dir(tenant: &str) -> Result<PathBuf> {
    let dir = validate(tenant)?;
    // A tenant is a single key segment; "a/b" would silently scope into
    // another tenant's blocks.
    if dir.components().count() != 1 {
        exn::bail!(ErrorKind::InvalidPath(PathBuf::from(tenant)));
    }
    Ok(dir)
}

/// Directory holding the objects of one block.
pub fn block_dir(tenant: &str, id: &Uuid) -> Result<PathBuf> {
    Ok(tenant_dir(tenant)?.join(id.to_string()))
}

/// Key of a block's metadata object.
pub fn meta_path(tenant: &str, id: &Uuid, object: MetaObject) -> Result<PathBuf> {
    Ok(block_dir(tenant, id)?.join(object.file_name()))
}
