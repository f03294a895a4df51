//! Snapshot-consistent schema registry
//!
//! Readers take an `Arc` to the current snapshot and keep it for the
//! duration of one document. Writers build a new snapshot and swap it in,
//! so a reader never observes a half-replaced version.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tracing::{debug, info, trace};

use crate::builtin::{core_segments, BUILTIN_VERSIONS};
use crate::loader::SchemaLoader;
use crate::model::SegmentSchema;
use crate::{Error, Result};

type VersionTable = HashMap<String, Arc<SegmentSchema>>;

/// Immutable view of all registered schemas
#[derive(Debug, Default, Clone)]
pub struct RegistrySnapshot {
    versions: HashMap<String, VersionTable>,
}

impl RegistrySnapshot {
    /// Look up a schema by version and case-insensitive tag
    ///
    /// A version like `005010X210` falls back to its six-digit base.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when neither the version nor its base
    /// knows the tag.
    pub fn get(&self, version: &str, tag: &str) -> Result<Arc<SegmentSchema>> {
        let tag_upper = tag.to_ascii_uppercase();
        let lookup = |v: &str| self.versions.get(v).and_then(|t| t.get(&tag_upper)).cloned();

        if let Some(schema) = lookup(version) {
            trace!("Schema hit for {}:{}", version, tag_upper);
            return Ok(schema);
        }
        if let Some(base) = version.get(..6).filter(|b| *b != version) {
            if let Some(schema) = lookup(base) {
                debug!("Schema for {} resolved through base version {}", tag_upper, base);
                return Ok(schema);
            }
        }
        Err(Error::not_found(version, tag_upper))
    }

    /// Check if a version has any schemas
    #[must_use]
    pub fn has_version(&self, version: &str) -> bool {
        self.versions.contains_key(version)
    }

    /// Registered versions, sorted
    #[must_use]
    pub fn versions(&self) -> Vec<String> {
        let mut v: Vec<String> = self.versions.keys().cloned().collect();
        v.sort();
        v
    }

    /// Registered tags of a version, sorted
    #[must_use]
    pub fn tags(&self, version: &str) -> Vec<String> {
        let mut tags: Vec<String> = self
            .versions
            .get(version)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        tags.sort();
        tags
    }

    /// Total number of schemas across versions
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.values().map(HashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registry of segment schemas keyed by (version, tag)
pub struct SchemaRegistry {
    base_path: Option<PathBuf>,
    include_builtin: bool,
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_path: None,
            include_builtin: false,
            current: RwLock::new(Arc::new(RegistrySnapshot::default())),
        }
    }

    /// Create a registry holding the built-in bundle
    ///
    /// # Errors
    ///
    /// Returns an error only if the embedded bundle is malformed.
    pub fn with_builtin() -> Result<Self> {
        let mut registry = Self::new();
        registry.include_builtin = true;
        registry.reload()?;
        Ok(registry)
    }

    /// Create a registry backed by a schema directory
    ///
    /// When `include_builtin` is set the built-in bundle is loaded first
    /// and files on disk replace individual segments.
    ///
    /// # Errors
    ///
    /// Returns loader errors for unreadable or malformed files.
    pub fn from_directory(base_path: impl Into<PathBuf>, include_builtin: bool) -> Result<Self> {
        let mut registry = Self::new();
        registry.base_path = Some(base_path.into());
        registry.include_builtin = include_builtin;
        registry.reload()?;
        Ok(registry)
    }

    /// Current snapshot
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockPoisoned`] if a writer panicked.
    pub fn snapshot(&self) -> Result<Arc<RegistrySnapshot>> {
        self.current
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| Error::lock_poisoned("snapshot"))
    }

    /// Look up a schema in the current snapshot
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown (version, tag).
    pub fn get(&self, version: &str, tag: &str) -> Result<Arc<SegmentSchema>> {
        self.snapshot()?.get(version, tag)
    }

    /// Add or replace one schema under a version
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockPoisoned`] if a writer panicked.
    pub fn register(&self, version: &str, schema: SegmentSchema) -> Result<()> {
        self.update("register", |snapshot| {
            trace!("Registering schema {}:{}", version, schema.tag);
            snapshot
                .versions
                .entry(version.to_string())
                .or_default()
                .insert(schema.tag.to_ascii_uppercase(), Arc::new(schema));
        })
    }

    /// Replace every schema of one version at once
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockPoisoned`] if a writer panicked.
    pub fn replace_version(&self, version: &str, schemas: Vec<SegmentSchema>) -> Result<()> {
        let table = to_table(schemas);
        info!("Replacing version {} with {} schemas", version, table.len());
        self.update("replace_version", move |snapshot| {
            snapshot.versions.insert(version.to_string(), table);
        })
    }

    /// Rebuild from the built-in bundle and the backing directory
    ///
    /// Schemas registered at runtime are dropped.
    ///
    /// # Errors
    ///
    /// Returns loader errors; the previous snapshot stays in place.
    pub fn reload(&self) -> Result<()> {
        let mut next = RegistrySnapshot::default();

        if self.include_builtin {
            for version in BUILTIN_VERSIONS {
                next.versions
                    .insert((*version).to_string(), to_table(core_segments(version)?));
            }
        }

        if let Some(path) = &self.base_path {
            for (version, schemas) in SchemaLoader::new(path).load_all()? {
                let table = next.versions.entry(version).or_default();
                for schema in schemas {
                    table.insert(schema.tag.clone(), Arc::new(schema));
                }
            }
        }

        info!(
            "Schema registry loaded {} schemas across {} versions",
            next.len(),
            next.versions.len()
        );
        let mut guard = self
            .current
            .write()
            .map_err(|_| Error::lock_poisoned("reload"))?;
        *guard = Arc::new(next);
        Ok(())
    }

    /// Drop every schema
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockPoisoned`] if a writer panicked.
    pub fn clear(&self) -> Result<()> {
        let mut guard = self
            .current
            .write()
            .map_err(|_| Error::lock_poisoned("clear"))?;
        *guard = Arc::new(RegistrySnapshot::default());
        Ok(())
    }

    fn update<F>(&self, operation: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut RegistrySnapshot),
    {
        let mut guard = self
            .current
            .write()
            .map_err(|_| Error::lock_poisoned(operation))?;
        let mut next = RegistrySnapshot::clone(&guard);
        apply(&mut next);
        *guard = Arc::new(next);
        Ok(())
    }
}

fn to_table(schemas: Vec<SegmentSchema>) -> VersionTable {
    schemas
        .into_iter()
        .map(|s| (s.tag.to_ascii_uppercase(), Arc::new(s)))
        .collect()
}
