use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use walkdir::WalkDir;

use crate::domain::InputType;
use crate::error::PrepError;

/// Paths below the buildout directory shared by every part.
#[derive(Debug, Clone)]
pub struct Layout {
    root: Utf8PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn shared_bin_dir(&self) -> Utf8PathBuf {
        self.root.join("var").join("pipeline").join("bin")
    }

    pub fn shared_lib_dir(&self) -> Utf8PathBuf {
        self.root.join("var").join("pipeline").join("lib")
    }

    pub fn results_dir(&self, experiment_id: &str) -> Utf8PathBuf {
        self.root.join("var").join(experiment_id)
    }

    pub fn gem_indices_dir(&self) -> Utf8PathBuf {
        self.root.join("var").join("GEMIndices")
    }

    pub fn pipeline_bin_source(&self) -> Utf8PathBuf {
        self.root.join("src").join("pipeline").join("bin")
    }

    pub fn pipeline_lib_source(&self) -> Utf8PathBuf {
        self.root.join("src").join("pipeline").join("lib")
    }

    /// A path inside the checked-out source tree, e.g. `src/flux/bin/flux`.
    pub fn source(&self, relative: &str) -> Utf8PathBuf {
        self.root.join(relative)
    }

    pub fn template(&self, input_type: InputType) -> Utf8PathBuf {
        let name = match input_type {
            InputType::Fastq => "template3.0.txt",
            InputType::Bam => "template.bam.txt",
        };
        self.root.join("src").join("pipeline").join(name)
    }

    pub fn copy_dir_recursive(source: &Utf8Path, dest: &Utf8Path) -> Result<(), PrepError> {
        fs::create_dir_all(dest.as_std_path()).map_err(|err| PrepError::fs(dest, err))?;
        for entry in WalkDir::new(source.as_std_path()).min_depth(1) {
            let entry = entry.map_err(|err| PrepError::Filesystem(err.to_string()))?;
            let relative = entry
                .path()
                .strip_prefix(source.as_std_path())
                .map_err(|err| PrepError::Filesystem(err.to_string()))?;
            let target = dest.as_std_path().join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)
                    .map_err(|err| PrepError::fs(target.display(), err))?;
            } else {
                fs::copy(entry.path(), &target)
                    .map_err(|err| PrepError::fs(entry.path().display(), err))?;
            }
        }
        Ok(())
    }
}

/// Removes a file or link at `path`, including dangling links. Real
/// directories are left alone and reported.
pub fn remove_link(path: &Utf8Path) -> Result<(), PrepError> {
    match fs::symlink_metadata(path.as_std_path()) {
        Ok(meta) if meta.is_dir() => Err(PrepError::Filesystem(format!(
            "{path} is a directory, not a link"
        ))),
        Ok(_) => fs::remove_file(path.as_std_path()).map_err(|err| PrepError::fs(path, err)),
        Err(_) => Ok(()),
    }
}

/// Creates `link -> source` and checks the link resolves afterwards.
pub fn symlink_checked(source: &Utf8Path, link: &Utf8Path) -> Result<(), PrepError> {
    std::os::unix::fs::symlink(source.as_std_path(), link.as_std_path())
        .map_err(|err| PrepError::fs(format!("link {link} -> {source}"), err))?;
    if !link.as_std_path().exists() {
        return Err(PrepError::Io(link.to_string()));
    }
    Ok(())
}
