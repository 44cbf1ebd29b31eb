// Quarantine vault: atomic relocation into/out of an isolated directory,
// collision-safe naming, and file-attribute restoration.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{ScanError, ScanResult};

const QUARANTINE_SUFFIX: &str = "quarantine";

/// An atomic move-in / move-out store. Every entry's on-disk name is
/// `<basename>.quarantine`, or `<stem>_<n>.quarantine` on collision.
pub struct QuarantineVault {
    dir: PathBuf,
}

impl QuarantineVault {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Move `path` into the vault. Uses a rename when source and vault
    /// share a filesystem (atomic); otherwise copies, fsyncs, and only
    /// then unlinks the source, surfacing any copy failure before the
    /// original is touched.
    pub fn quarantine(&self, path: &Path) -> ScanResult<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| ScanError::io(&self.dir, e))?;

        let target = self.next_free_name(path)?;

        match fs::rename(path, &target) {
            Ok(()) => {
                info!(from = %path.display(), to = %target.display(), "quarantined file");
                Ok(target)
            }
            Err(_) => {
                // Cross-filesystem rename: copy, fsync, unlink only on success.
                let mut src = fs::File::open(path).map_err(|e| ScanError::io(path, e))?;
                let mut dst =
                    fs::File::create(&target).map_err(|e| ScanError::io(&target, e))?;
                std::io::copy(&mut src, &mut dst).map_err(|e| ScanError::io(&target, e))?;
                dst.sync_all().map_err(|e| ScanError::io(&target, e))?;
                drop(dst);
                drop(src);
                fs::remove_file(path).map_err(|e| ScanError::io(path, e))?;
                info!(from = %path.display(), to = %target.display(), "quarantined file (copy+unlink)");
                Ok(target)
            }
        }
    }

    /// Compute the smallest-`n` free vault path for `path`, probing
    /// collisions one at a time. The probe-then-rename sequence is not
    /// assumed atomic across concurrent quarantines of the same basename;
    /// callers retry on a `rename` race by re-probing.
    fn next_free_name(&self, path: &Path) -> ScanResult<PathBuf> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|s| format!(".{}", s.to_string_lossy()))
            .unwrap_or_default();

        let basename = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let candidate = self.dir.join(format!("{basename}.{QUARANTINE_SUFFIX}"));
        if !candidate.exists() {
            return Ok(candidate);
        }

        let mut n = 1u64;
        loop {
            let candidate = self
                .dir
                .join(format!("{stem}_{n}{ext}.{QUARANTINE_SUFFIX}"));
            if !candidate.exists() {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Names currently present in the vault.
    pub fn list(&self) -> ScanResult<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| ScanError::io(&self.dir, e))? {
            let entry = entry.map_err(|e| ScanError::io(&self.dir, e))?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Restore `name` (a vault entry, including the `.quarantine` suffix)
    /// back to its original location, derived by stripping the suffix.
    /// On a destination collision, picks `<stem>_restored_<k><ext>` with
    /// the smallest free `k`. Clears read-only/system attributes. The
    /// vault entry is removed only after the destination write and
    /// attribute restore both succeed.
    pub fn restore(&self, name: &str) -> ScanResult<PathBuf> {
        let entry_path = self.dir.join(name);
        if !entry_path.exists() {
            return Err(ScanError::NotFound(entry_path));
        }

        let original_name = name
            .strip_suffix(&format!(".{QUARANTINE_SUFFIX}"))
            .unwrap_or(name);
        let original_path = PathBuf::from(original_name);

        let destination = if original_path.exists() {
            self.next_free_restore_path(&original_path)?
        } else {
            original_path
        };

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ScanError::io(parent, e))?;
            }
        }

        fs::copy(&entry_path, &destination).map_err(|e| ScanError::io(&destination, e))?;
        clear_restrictive_attributes(&destination)?;
        fs::remove_file(&entry_path).map_err(|e| ScanError::io(&entry_path, e))?;

        info!(entry = %entry_path.display(), to = %destination.display(), "restored file from quarantine");
        Ok(destination)
    }

    fn next_free_restore_path(&self, original: &Path) -> ScanResult<PathBuf> {
        let stem = original
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let ext = original
            .extension()
            .map(|s| format!(".{}", s.to_string_lossy()))
            .unwrap_or_default();
        let parent = original.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut k = 1u64;
        loop {
            let candidate = parent.join(format!("{stem}_restored_{k}{ext}"));
            if !candidate.exists() {
                return Ok(candidate);
            }
            k += 1;
        }
    }

    /// Iterate `list()`, restoring each entry and continuing on per-entry
    /// failures. Returns `true` only if every entry restored successfully.
    pub fn restore_all(&self) -> ScanResult<bool> {
        let mut all_ok = true;
        for name in self.list()? {
            if let Err(e) = self.restore(&name) {
                warn!(entry = %name, error = %e, "failed to restore quarantine entry");
                all_ok = false;
            }
        }
        Ok(all_ok)
    }
}

#[cfg(unix)]
fn clear_restrictive_attributes(path: &Path) -> ScanResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = fs::metadata(path).map_err(|e| ScanError::io(path, e))?;
    let mut perms = metadata.permissions();
    perms.set_mode(0o644);
    fs::set_permissions(path, perms).map_err(|e| ScanError::io(path, e))?;
    Ok(())
}

#[cfg(not(unix))]
fn clear_restrictive_attributes(path: &Path) -> ScanResult<()> {
    let metadata = fs::metadata(path).map_err(|e| ScanError::io(path, e))?;
    let mut perms = metadata.permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(path, perms).map_err(|e| ScanError::io(path, e))?;
    Ok(())
}
