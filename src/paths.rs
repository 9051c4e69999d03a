//! Save-location computation and the guards that keep a render from
//! clobbering its own input.

use std::{
    ffi::OsString,
    fs, io,
    path::{self, Path, PathBuf},
};

use crate::error::{Result, StencilError};

const RENDERED_MARKER: &str = "rendered";

/// Tidy a user supplied path: trim, host separators, `~` expansion.
pub fn clean(raw: &Path) -> PathBuf {
    let text = raw.to_string_lossy();
    let normalized = normalize_separators(text.trim());
    expand_home(Path::new(&normalized))
}

/// Rewrite separators for the host platform.
pub fn normalize_separators(path: &str) -> String {
    if cfg!(windows) {
        path.replace('/', "\\")
    } else {
        path.replace('\\', "/")
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    let rest = if text == "~" {
        Some("")
    } else {
        text.strip_prefix("~/")
            .or_else(|| text.strip_prefix(&format!("~{}", path::MAIN_SEPARATOR)))
    };

    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// `example.yaml` -> `example.rendered.yaml`, `Makefile` -> `Makefile.rendered`.
pub fn default_file_name(source: &Path) -> OsString {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let stem = stem
        .strip_suffix(&format!(".{RENDERED_MARKER}"))
        .unwrap_or(&stem);

    let mut name = format!("{stem}.{RENDERED_MARKER}");
    if let Some(ext) = source.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    OsString::from(name)
}

/// Where a single file renders to when no save target was given.
pub fn default_save_path(source: &Path) -> Result<PathBuf> {
    let source = absolute(source)?;
    let dir = source.parent().unwrap_or_else(|| Path::new(""));
    Ok(dir.join(default_file_name(&source)))
}

/// Resolve the destination for a single file render.
pub fn resolve_save_path(source: &Path, save_to: Option<&Path>) -> Result<PathBuf> {
    let Some(target) = save_to else {
        return default_save_path(source);
    };

    let names_directory = target.to_string_lossy().ends_with(path::is_separator);
    if names_directory || target.is_dir() {
        return Ok(target.join(default_file_name(source)));
    }
    Ok(target.to_path_buf())
}

/// Mirror `file`'s location under `source_root` into `save_dir`.
pub fn mirror_path(source_root: &Path, file: &Path, save_dir: &Path) -> Result<PathBuf> {
    let relative = file.strip_prefix(source_root).map_err(|_| {
        StencilError::io(
            format!(
                "computing save path for {} under {}",
                file.display(),
                source_root.display()
            ),
            io::Error::new(io::ErrorKind::InvalidInput, "file is outside the source directory"),
        )
    })?;
    Ok(save_dir.join(relative))
}

pub fn absolute(path: &Path) -> Result<PathBuf> {
    path::absolute(path).map_err(|e| StencilError::io(format!("resolving {}", path.display()), e))
}

/// Best effort canonical form used for equality checks, valid for paths that
/// do not exist yet.
fn comparable(path: &Path) -> Result<PathBuf> {
    if let Ok(real) = path.canonicalize() {
        return Ok(real);
    }
    let abs = absolute(path)?;
    match (abs.parent(), abs.file_name()) {
        (Some(parent), Some(name)) => Ok(comparable(parent)?.join(name)),
        _ => Ok(abs),
    }
}

pub fn same_path(a: &Path, b: &Path) -> Result<bool> {
    Ok(comparable(a)? == comparable(b)?)
}

pub fn is_within(child: &Path, parent: &Path) -> Result<bool> {
    Ok(comparable(child)?.starts_with(comparable(parent)?))
}

/// Fail if rendering `source` to `save_to` would overwrite the source.
pub fn ensure_not_source(source: &Path, save_to: &Path) -> Result<()> {
    if same_path(source, save_to)? {
        return Err(StencilError::SamePath(format!(
            "The save path '{}' is the file being rendered, use a different save path.",
            save_to.display()
        )));
    }
    Ok(())
}

/// Fail if the batch save directory is, or lives inside, the source directory.
pub fn ensure_distinct_directories(source_dir: &Path, save_dir: &Path) -> Result<()> {
    if same_path(source_dir, save_dir)? {
        return Err(StencilError::SamePath(
            "The path being processed is also the --save-to directory, use a different save directory."
                .to_string(),
        ));
    }
    if is_within(save_dir, source_dir)? {
        return Err(StencilError::SamePath(format!(
            "The save directory '{}' is inside the directory being processed, use a different save directory.",
            save_dir.display()
        )));
    }
    Ok(())
}

/// Fail with `FileAlreadyExists` unless overwriting was requested.
pub fn ensure_can_write(save_to: &Path, force: bool) -> Result<()> {
    if save_to.exists() && !force {
        return Err(StencilError::FileAlreadyExists(save_to.to_path_buf()));
    }
    Ok(())
}

/// Create the destination's parent directory and check it is writable.
pub fn prepare_parent(save_to: &Path) -> Result<()> {
    let Some(parent) = save_to.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };

    if let Err(err) = fs::create_dir_all(parent) {
        return Err(match err.kind() {
            io::ErrorKind::PermissionDenied => StencilError::PermissionDenied(parent.to_path_buf()),
            _ => StencilError::io(format!("creating directory {}", parent.display()), err),
        });
    }

    let readonly = fs::metadata(parent)
        .map(|m| m.permissions().readonly())
        .unwrap_or(false);
    if readonly {
        return Err(StencilError::PermissionDenied(parent.to_path_buf()));
    }
    Ok(())
}
