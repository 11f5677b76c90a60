use std::collections::HashMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::debug;

use crate::error::PrepError;
use crate::layout::{remove_link, symlink_checked};

/// Shared paths that were already repopulated by this process.
///
/// Many parts point at the same global bin, lib and index trees. The first
/// part to touch such a tree rebuilds it; later parts only relink it.
#[derive(Debug, Default)]
pub struct InstallationState {
    fresh: HashMap<Utf8PathBuf, bool>,
}

impl InstallationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fresh(&self, path: &Utf8Path) -> bool {
        self.fresh.get(path).copied().unwrap_or(false)
    }

    pub fn mark_fresh(&mut self, path: &Utf8Path) {
        self.fresh.insert(path.to_path_buf(), true);
    }

    pub fn reset(&mut self) {
        self.fresh.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Materialization {
    /// The shared tree was wiped and rebuilt from its source.
    Populated,
    /// Another part already rebuilt the tree in this process.
    AlreadyFresh,
    Created,
    Existing,
}

/// Materializes the shared trees of one part.
///
/// Populated trees only count as fresh once [`Materializer::finish`] is
/// called, so a part that fails halfway leaves them to be rebuilt by the next
/// part.
pub struct Materializer<'a> {
    state: &'a mut InstallationState,
    populated: Vec<Utf8PathBuf>,
}

impl<'a> Materializer<'a> {
    pub fn new(state: &'a mut InstallationState) -> Self {
        Self {
            state,
            populated: Vec::new(),
        }
    }

    /// Repopulates `path` once per process and always relinks `link -> path`.
    pub fn ensure_materialized<F>(
        &mut self,
        path: &Utf8Path,
        link: &Utf8Path,
        populate: F,
    ) -> Result<Materialization, PrepError>
    where
        F: FnOnce(&Utf8Path) -> Result<(), PrepError>,
    {
        let outcome = if self.state.is_fresh(path) {
            Materialization::AlreadyFresh
        } else {
            if path.as_std_path().exists() {
                fs::remove_dir_all(path.as_std_path()).map_err(|err| PrepError::fs(path, err))?;
            }
            populate(path)?;
            self.populated.push(path.to_path_buf());
            Materialization::Populated
        };
        relink(path, link)?;
        Ok(outcome)
    }

    /// Creates `path` when absent, never recreating it, and relinks it.
    pub fn ensure_directory(
        &mut self,
        path: &Utf8Path,
        link: &Utf8Path,
    ) -> Result<Materialization, PrepError> {
        let outcome = if path.as_std_path().exists() {
            Materialization::Existing
        } else {
            fs::create_dir_all(path.as_std_path()).map_err(|err| PrepError::fs(path, err))?;
            Materialization::Created
        };
        relink(path, link)?;
        Ok(outcome)
    }

    /// Marks every tree populated by this materializer as fresh.
    pub fn finish(self) {
        for path in &self.populated {
            self.state.mark_fresh(path);
        }
    }
}

fn relink(path: &Utf8Path, link: &Utf8Path) -> Result<(), PrepError> {
    remove_link(link)?;
    symlink_checked(path, link)?;
    debug!(link = %link, target = %path, "linked shared resource");
    Ok(())
}
