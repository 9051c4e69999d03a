//! Scratch directory holding translated templates.

use std::{
    collections::hash_map::DefaultHasher,
    fs,
    hash::{Hash, Hasher},
    io,
    path::{Path, PathBuf},
};

use log::{debug, trace};

use crate::error::{Result, StencilError};

#[derive(Debug, Clone)]
pub struct CompiledDir {
    path: PathBuf,
    retain: bool,
}

impl CompiledDir {
    pub fn new(path: impl Into<PathBuf>, retain: bool) -> Self {
        Self {
            path: path.into(),
            retain,
        }
    }

    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.path).map_err(|e| {
            StencilError::io(
                format!("creating compiled directory {}", self.path.display()),
                e,
            )
        })
    }

    /// Store the translated form of `source` and return where it went.
    pub fn write(&self, source: &Path, translated: &str) -> Result<PathBuf> {
        self.ensure()?;
        let target = self.path.join(compiled_name(source));
        fs::write(&target, translated)
            .map_err(|e| StencilError::io(format!("writing {}", target.display()), e))?;
        trace!("compiled {} -> {}", source.display(), target.display());
        Ok(target)
    }

    /// Remove the compiled templates in the directory. Anything else in it,
    /// including the directory itself, is left alone.
    pub fn purge(&self) -> Result<usize> {
        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(StencilError::io(
                    format!("reading {}", self.path.display()),
                    e,
                ));
            }
        };

        let mut removed = 0;
        for entry in entries {
            let entry =
                entry.map_err(|e| StencilError::io(format!("reading {}", self.path.display()), e))?;
            let path = entry.path();
            let ours = entry.file_type().is_ok_and(|t| t.is_file())
                && entry.file_name().to_str().is_some_and(is_compiled_name);
            if !ours {
                trace!("leaving {} in place", path.display());
                continue;
            }
            fs::remove_file(&path)
                .map_err(|e| StencilError::io(format!("removing {}", path.display()), e))?;
            removed += 1;
        }
        debug!("removed {removed} entries from {}", self.path.display());
        Ok(removed)
    }

    /// Called once a render is done; purges unless the directory is retained.
    pub fn finish(&self) -> Result<()> {
        if self.retain {
            debug!("keeping compiled files in {}", self.path.display());
            return Ok(());
        }
        self.purge().map(|_| ())
    }
}

/// File name for a compiled template: readable stem plus a hash of the full
/// source path so equally named files in different directories do not clash.
pub fn compiled_name(source: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    let stem = source
        .file_name()
        .map(|s| s.to_string_lossy().replace(|c: char| !c.is_ascii_alphanumeric(), "_"))
        .unwrap_or_else(|| "template".to_string());
    format!("{stem}-{:016x}.tera", hasher.finish())
}

/// Whether `name` has the shape produced by [`compiled_name`].
pub fn is_compiled_name(name: &str) -> bool {
    name.strip_suffix(".tera")
        .and_then(|stem| stem.rsplit_once('-'))
        .is_some_and(|(_, hash)| hash.len() == 16 && hash.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn names_differ_by_directory() {
        let a = compiled_name(Path::new("one/example.yaml"));
        let b = compiled_name(Path::new("two/example.yaml"));
        assert_ne!(a, b);
        assert!(a.starts_with("example_yaml-"), "{a}");
        assert!(a.ends_with(".tera"));
    }

    #[test]
    fn finish_purges_unless_retained() {
        let dir = TempDir::new().unwrap();
        let compiled = CompiledDir::new(dir.path().join("compiled"), false);
        let written = compiled.write(Path::new("example.yaml"), "name: {{ name }}").unwrap();
        assert!(written.is_file());

        compiled.finish().unwrap();
        assert!(!written.exists());
        assert!(compiled.path.is_dir(), "directory itself is kept");

        let kept = CompiledDir::new(dir.path().join("kept"), true);
        let written = kept.write(Path::new("example.yaml"), "x").unwrap();
        kept.finish().unwrap();
        assert!(written.is_file());
    }

    #[test]
    fn recognises_compiled_names() {
        assert!(is_compiled_name(&compiled_name(Path::new("a/example.yaml"))));
        assert!(!is_compiled_name("example.yaml"));
        assert!(!is_compiled_name("layout.tera"));
        assert!(!is_compiled_name("theme-dark.tera"));
    }

    #[test]
    fn purge_only_touches_compiled_files() {
        let dir = TempDir::new().unwrap();
        let compiled = CompiledDir::new(dir.path(), false);
        fs::write(dir.path().join("unrelated.txt"), "keep me").unwrap();
        fs::write(dir.path().join("layout.tera"), "keep me too").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        let written = compiled.write(Path::new("example.yaml"), "x").unwrap();

        assert_eq!(compiled.purge().unwrap(), 1);
        assert!(!written.exists());
        assert!(dir.path().join("unrelated.txt").is_file());
        assert!(dir.path().join("layout.tera").is_file());
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn purging_missing_directory_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let compiled = CompiledDir::new(dir.path().join("nope"), false);
        assert_eq!(compiled.purge().unwrap(), 0);
    }
}
