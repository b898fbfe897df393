//! Migration unit registry and identifier handling.
//!
//! Units are named by identifiers of the form
//! `<date>_<disambiguator>_<descriptive_name>` (for example
//! `2023_01_add_users`). Identifiers are date-prefixed so that ascending
//! lexicographic order equals chronological authoring order; the executor
//! relies on this for forward ordering and its reverse for rollback.
//!
//! Resolution is an explicit map from identifier to a unit factory —
//! discovery scans the migrations directory and selects which registered
//! factories run, never loading code at runtime.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::error::{MigrateError, Result};
use crate::MigrationUnit;

/// Factory producing a migration unit instance.
pub type UnitFactory = Box<dyn Fn() -> Box<dyn MigrationUnit> + Send + Sync>;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4,8})_(\d+)_([a-z][a-z0-9_]*)$").expect("identifier pattern")
    })
}

/// Returns whether the string is a well-formed unit identifier.
#[must_use]
pub fn is_identifier(candidate: &str) -> bool {
    identifier_pattern().is_match(candidate)
}

/// Derives the unit's entry name by camel-casing the identifier tokens after
/// the first two: `2023_01_add_users` becomes `AddUsers`.
///
/// # Errors
///
/// Returns [`MigrateError::InvalidIdentifier`] for malformed identifiers.
pub fn entry_name(identifier: &str) -> Result<String> {
    if !is_identifier(identifier) {
        return Err(MigrateError::InvalidIdentifier(identifier.to_string()));
    }
    Ok(identifier
        .split('_')
        .skip(2)
        .map(|token| {
            let mut chars = token.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect())
}

/// Maps unit identifiers to their factories.
#[derive(Default)]
pub struct MigrationRegistry {
    factories: BTreeMap<String, UnitFactory>,
}

impl MigrationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under the identifier.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::InvalidIdentifier`] for malformed identifiers.
    pub fn register<F>(&mut self, identifier: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn MigrationUnit> + Send + Sync + 'static,
    {
        let identifier = identifier.into();
        if !is_identifier(&identifier) {
            return Err(MigrateError::InvalidIdentifier(identifier));
        }
        self.factories.insert(identifier, Box::new(factory));
        Ok(())
    }

    /// Returns whether the identifier has a registered factory.
    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.factories.contains_key(identifier)
    }

    /// Returns the registered identifiers in ascending order.
    #[must_use]
    pub fn identifiers(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Instantiates the unit registered under the identifier.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::UnitResolution`] when no factory is
    /// registered.
    pub fn resolve(&self, identifier: &str) -> Result<Box<dyn MigrationUnit>> {
        let factory = self
            .factories
            .get(identifier)
            .ok_or_else(|| MigrateError::UnitResolution(identifier.to_string()))?;
        Ok(factory())
    }
}

/// Scans a migrations directory for unit files, returning their identifiers
/// in ascending lexicographic order.
///
/// Only `.rs` files whose stems are well-formed identifiers are considered;
/// other entries are skipped with a warning.
///
/// # Errors
///
/// Returns [`MigrateError::DirectoryNotFound`] when the directory is
/// missing; IO errors surface unmodified.
pub fn scan_directory(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(MigrateError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut identifiers = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("rs") {
            continue;
        }
        match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) if is_identifier(stem) => identifiers.push(stem.to_string()),
            Some(stem) => {
                warn!(file = %stem, "Skipping file without a migration identifier");
            }
            None => {}
        }
    }

    identifiers.sort();
    Ok(identifiers)
}
