//! # Conflict Resolution and Artifact Writing
//!
//! This module commits artifacts to the output tree while safely handling
//! collisions with pre-existing files.
//!
//! ## Decision Order
//!
//! For each artifact, evaluated strictly in this order:
//!
//! 1.  **Dry run**: record the decision that *would* be made, touch nothing
//!     on disk, return a synthetic would-write result. Conflict detection
//!     still happens (it is read-only), so a dry run reports the same
//!     warnings as a real run.
//! 2.  **New file**: write directly; no conflict.
//! 3.  **Identical content**: no-op; idempotent re-generation is not a
//!     conflict.
//! 4.  **Force set**: optionally back up the existing file, then overwrite;
//!     force implies acceptance, so no conflict is recorded.
//! 5.  **Policy**: apply the configured [`ConflictPolicy`]: `skip` keeps
//!     the existing content and records one [`ConflictRecord`]; `overwrite`
//!     and `backup` behave like force; `merge` concatenates existing and new
//!     content under a generated-section marker (lossy, best-effort);
//!     `interactive` degrades to `skip` when no decision source exists.
//!
//! ## Rollback
//!
//! The writer remembers every backup it made and every brand-new file it
//! created. `rollback` restores backups over their originals and deletes
//! un-backed-up new files. This is best-effort, not transactional;
//! concurrent external modification of the output tree is out of scope.
//!
//! All mutable writer state sits behind one `Mutex`: generators are expected
//! to own disjoint path prefixes by convention, but the writer stays safe
//! when the convention is violated.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, warn};

use crate::config::ConflictPolicy;
use crate::error::{Error, Result};
use crate::generator::Artifact;

/// Maximum number of diff lines kept in a conflict record.
const MAX_DIFF_LINES: usize = 50;

/// Marker inserted between existing and generated content by the `merge`
/// policy.
const MERGE_MARKER: &str = "# --- generated section ---";

/// Evidence that a proposed artifact write collided with different
/// pre-existing content at the same path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRecord {
    /// Output-relative path of the collision.
    pub path: String,
    pub existing_hash: String,
    pub new_hash: String,
    /// Bounded line diff between existing and proposed content.
    pub diff: Vec<String>,
}

/// What the writer decided to do with one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A brand-new file was written.
    Written,
    /// Dry run; the file would have been written or changed.
    WouldWrite,
    /// Existing content was already identical; nothing happened.
    Unchanged,
    /// Existing content was replaced (force, `overwrite`, or `backup`).
    Overwritten,
    /// Existing and new content were concatenated under a marker.
    Merged,
    /// New content was appended to the existing file.
    Appended,
    /// Existing content was kept; a conflict record was taken.
    Skipped,
}

/// Counters describing what a run did to the output tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub written: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub backed_up: usize,
    pub conflicts: usize,
}

#[derive(Default)]
struct WriterState {
    /// Absolute paths of files that did not exist before this run.
    created: Vec<PathBuf>,
    /// Original path -> backup path.
    backups: HashMap<PathBuf, PathBuf>,
    conflicts: Vec<ConflictRecord>,
    summary: WriteSummary,
}

/// Commits artifacts to an output directory, one decision per path.
pub struct ArtifactWriter {
    output_dir: PathBuf,
    force: bool,
    dry_run: bool,
    backup: bool,
    policy: ConflictPolicy,
    state: Mutex<WriterState>,
}

impl ArtifactWriter {
    /// Create a writer rooted at `output_dir`.
    ///
    /// The directory is created eagerly unless this is a dry run.
    pub fn new(
        output_dir: &Path,
        force: bool,
        dry_run: bool,
        policy: ConflictPolicy,
        backup: bool,
    ) -> Result<Self> {
        if !dry_run {
            fs::create_dir_all(output_dir).map_err(|e| Error::Write {
                path: output_dir.display().to_string(),
                message: format!("failed to create output directory: {}", e),
            })?;
        }
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            force,
            dry_run,
            backup,
            policy,
            state: Mutex::new(WriterState::default()),
        })
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Decide and (unless dry-running) perform the write for one artifact.
    pub fn write(&self, artifact: &Artifact) -> Result<Disposition> {
        let full_path = self.output_dir.join(&artifact.path);

        if artifact.append {
            return self.append(artifact, &full_path);
        }

        let existing = match read_if_exists(&full_path, &artifact.path)? {
            Some(existing) => existing,
            None => return self.write_new(artifact, &full_path),
        };

        // Idempotent re-generation: identical content is not a conflict
        if hash_content(&existing) == hash_content(&artifact.content) {
            self.locked().summary.unchanged += 1;
            return Ok(Disposition::Unchanged);
        }

        if self.force {
            return self.overwrite(artifact, &full_path, self.backup);
        }

        match self.policy {
            ConflictPolicy::Skip | ConflictPolicy::Interactive => {
                self.record_conflict(&artifact.path, &existing, &artifact.content);
                self.locked().summary.skipped += 1;
                debug!("skipping '{}': existing content differs", artifact.path);
                Ok(Disposition::Skipped)
            }
            ConflictPolicy::Overwrite => self.overwrite(artifact, &full_path, self.backup),
            ConflictPolicy::Backup => self.overwrite(artifact, &full_path, true),
            ConflictPolicy::Merge => self.merge(artifact, &full_path, &existing),
        }
    }

    fn write_new(&self, artifact: &Artifact, full_path: &Path) -> Result<Disposition> {
        if self.dry_run {
            self.locked().summary.written += 1;
            return Ok(Disposition::WouldWrite);
        }
        self.commit(artifact, full_path, &artifact.content)?;
        let mut state = self.locked();
        state.created.push(full_path.to_path_buf());
        state.summary.written += 1;
        Ok(Disposition::Written)
    }

    fn overwrite(
        &self,
        artifact: &Artifact,
        full_path: &Path,
        with_backup: bool,
    ) -> Result<Disposition> {
        if self.dry_run {
            self.locked().summary.written += 1;
            return Ok(Disposition::WouldWrite);
        }
        if with_backup {
            self.backup_file(&artifact.path, full_path)?;
        }
        self.commit(artifact, full_path, &artifact.content)?;
        self.locked().summary.written += 1;
        Ok(Disposition::Overwritten)
    }

    fn merge(&self, artifact: &Artifact, full_path: &Path, existing: &str) -> Result<Disposition> {
        if self.dry_run {
            self.locked().summary.written += 1;
            return Ok(Disposition::WouldWrite);
        }
        // Naive concatenation, documented as lossy; not a semantic merge
        let merged = format!(
            "{}\n\n{}\n{}",
            existing.trim_end_matches('\n'),
            MERGE_MARKER,
            artifact.content
        );
        if self.backup {
            self.backup_file(&artifact.path, full_path)?;
        }
        self.commit(artifact, full_path, &merged)?;
        self.locked().summary.written += 1;
        Ok(Disposition::Merged)
    }

    fn append(&self, artifact: &Artifact, full_path: &Path) -> Result<Disposition> {
        if self.dry_run {
            self.locked().summary.written += 1;
            return Ok(Disposition::WouldWrite);
        }
        if full_path.exists() {
            use std::io::Write;
            let mut file = fs::OpenOptions::new()
                .append(true)
                .open(full_path)
                .map_err(|e| write_error(&artifact.path, e))?;
            write!(file, "\n{}", artifact.content).map_err(|e| write_error(&artifact.path, e))?;
            self.locked().summary.written += 1;
            Ok(Disposition::Appended)
        } else {
            self.write_new(artifact, full_path)
        }
    }

    /// Write content and apply the executable bits where requested.
    fn commit(&self, artifact: &Artifact, full_path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Write {
                path: artifact.path.clone(),
                message: format!("failed to create directory '{}': {}", parent.display(), e),
            })?;
        }
        fs::write(full_path, content).map_err(|e| write_error(&artifact.path, e))?;

        #[cfg(unix)]
        if artifact.executable {
            use std::os::unix::fs::PermissionsExt;
            let metadata = fs::metadata(full_path).map_err(|e| write_error(&artifact.path, e))?;
            let mut perms = metadata.permissions();
            perms.set_mode(perms.mode() | 0o111);
            fs::set_permissions(full_path, perms).map_err(|e| write_error(&artifact.path, e))?;
        }

        Ok(())
    }

    /// Create a timestamped backup of an existing file, with a counter
    /// suffix when a backup of the same second already exists.
    fn backup_file(&self, relative: &str, full_path: &Path) -> Result<()> {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let mut backup_path = full_path.with_file_name(format!(
            "{}.{}.backup",
            file_name(full_path),
            timestamp
        ));
        let mut counter = 1;
        while backup_path.exists() {
            backup_path = full_path.with_file_name(format!(
                "{}.{}_{}.backup",
                file_name(full_path),
                timestamp,
                counter
            ));
            counter += 1;
        }

        fs::copy(full_path, &backup_path).map_err(|e| Error::Write {
            path: relative.to_string(),
            message: format!("failed to back up to '{}': {}", backup_path.display(), e),
        })?;
        debug!("backed up '{}' to '{}'", relative, backup_path.display());

        let mut state = self.locked();
        state
            .backups
            .insert(full_path.to_path_buf(), backup_path);
        state.summary.backed_up += 1;
        Ok(())
    }

    fn record_conflict(&self, path: &str, existing: &str, new: &str) {
        let record = ConflictRecord {
            path: path.to_string(),
            existing_hash: hash_content(existing),
            new_hash: hash_content(new),
            diff: line_diff(existing, new),
        };
        let mut state = self.locked();
        state.conflicts.push(record);
        state.summary.conflicts += 1;
    }

    /// Conflict records taken so far.
    pub fn conflicts(&self) -> Vec<ConflictRecord> {
        self.locked().conflicts.clone()
    }

    pub fn summary(&self) -> WriteSummary {
        self.locked().summary.clone()
    }

    /// Restore every backup over its original and delete brand-new files.
    ///
    /// Best-effort: individual failures are logged and the walk continues.
    pub fn rollback(&self) {
        let mut state = self.locked();
        for (original, backup) in state.backups.drain() {
            if let Err(e) = fs::copy(&backup, &original) {
                warn!(
                    "rollback: failed to restore '{}' from '{}': {}",
                    original.display(),
                    backup.display(),
                    e
                );
                continue;
            }
            if let Err(e) = fs::remove_file(&backup) {
                warn!("rollback: failed to remove backup '{}': {}", backup.display(), e);
            }
        }
        for created in state.created.drain(..) {
            if created.exists() {
                if let Err(e) = fs::remove_file(&created) {
                    warn!("rollback: failed to remove '{}': {}", created.display(), e);
                }
            }
        }
    }

    /// Delete backup files after a successful run.
    pub fn cleanup_backups(&self) {
        let mut state = self.locked();
        for backup in state.backups.values() {
            if backup.exists() {
                if let Err(e) = fs::remove_file(backup) {
                    warn!("failed to remove backup '{}': {}", backup.display(), e);
                }
            }
        }
        state.backups.clear();
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn write_error(path: &str, e: std::io::Error) -> Error {
    Error::Write {
        path: path.to_string(),
        message: e.to_string(),
    }
}

fn read_if_exists(full_path: &Path, relative: &str) -> Result<Option<String>> {
    if !full_path.exists() {
        return Ok(None);
    }
    fs::read_to_string(full_path)
        .map(Some)
        .map_err(|e| write_error(relative, e))
}

/// Content hash used for conflict detection.
pub fn hash_content(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// Bounded line diff between two texts.
///
/// Trims the common prefix and suffix, then emits `-` lines for removed
/// content and `+` lines for added content, capped at [`MAX_DIFF_LINES`].
/// Enough evidence for a conflict record, not a semantic diff.
pub fn line_diff(existing: &str, new: &str) -> Vec<String> {
    let old_lines: Vec<&str> = existing.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    let mut prefix = 0;
    while prefix < old_lines.len()
        && prefix < new_lines.len()
        && old_lines[prefix] == new_lines[prefix]
    {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < old_lines.len() - prefix
        && suffix < new_lines.len() - prefix
        && old_lines[old_lines.len() - 1 - suffix] == new_lines[new_lines.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let mut diff = vec!["--- existing".to_string(), "+++ new".to_string()];
    for line in &old_lines[prefix..old_lines.len() - suffix] {
        diff.push(format!("-{}", line));
    }
    for line in &new_lines[prefix..new_lines.len() - suffix] {
        diff.push(format!("+{}", line));
    }

    if diff.len() > MAX_DIFF_LINES {
        diff.truncate(MAX_DIFF_LINES);
        diff.push("... (diff truncated)".to_string());
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn writer(dir: &TempDir, force: bool, dry_run: bool, policy: ConflictPolicy) -> ArtifactWriter {
        ArtifactWriter::new(dir.path(), force, dry_run, policy, true).unwrap()
    }

    #[test]
    fn test_write_new_file() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir, false, false, ConflictPolicy::Skip);

        let disposition = w.write(&Artifact::new("src/app.py", "print('hi')\n")).unwrap();
        assert_eq!(disposition, Disposition::Written);
        let on_disk = fs::read_to_string(dir.path().join("src/app.py")).unwrap();
        assert_eq!(on_disk, "print('hi')\n");
        assert_eq!(w.summary().written, 1);
    }

    #[test]
    fn test_write_idempotent_no_conflict_no_backup() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir, false, false, ConflictPolicy::Skip);
        let artifact = Artifact::new("a.txt", "same\n");

        assert_eq!(w.write(&artifact).unwrap(), Disposition::Written);
        assert_eq!(w.write(&artifact).unwrap(), Disposition::Unchanged);

        assert!(w.conflicts().is_empty());
        assert_eq!(w.summary().backed_up, 0);
        // No backup file appeared next to the target
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_skip_policy_preserves_existing_content() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("keep.txt"), "precious\n").unwrap();
        let w = writer(&dir, false, false, ConflictPolicy::Skip);

        let disposition = w.write(&Artifact::new("keep.txt", "generated\n")).unwrap();
        assert_eq!(disposition, Disposition::Skipped);

        let on_disk = fs::read_to_string(dir.path().join("keep.txt")).unwrap();
        assert_eq!(on_disk, "precious\n");

        let conflicts = w.conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path, "keep.txt");
        assert_ne!(conflicts[0].existing_hash, conflicts[0].new_hash);
        assert!(conflicts[0].diff.iter().any(|l| l == "-precious"));
        assert!(conflicts[0].diff.iter().any(|l| l == "+generated"));
    }

    #[test]
    fn test_interactive_policy_degrades_to_skip() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("f.txt"), "old").unwrap();
        let w = writer(&dir, false, false, ConflictPolicy::Interactive);

        assert_eq!(
            w.write(&Artifact::new("f.txt", "new")).unwrap(),
            Disposition::Skipped
        );
        assert_eq!(fs::read_to_string(dir.path().join("f.txt")).unwrap(), "old");
    }

    #[test]
    fn test_force_overwrites_with_backup() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("f.txt"), "old").unwrap();
        let w = writer(&dir, true, false, ConflictPolicy::Skip);

        let disposition = w.write(&Artifact::new("f.txt", "new")).unwrap();
        assert_eq!(disposition, Disposition::Overwritten);
        assert_eq!(fs::read_to_string(dir.path().join("f.txt")).unwrap(), "new");
        assert_eq!(w.summary().backed_up, 1);
        assert!(w.conflicts().is_empty());

        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".backup"))
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read_to_string(backups[0].path()).unwrap(), "old");
    }

    #[test]
    fn test_overwrite_policy_without_force() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("f.txt"), "old").unwrap();
        let w = writer(&dir, false, false, ConflictPolicy::Overwrite);

        assert_eq!(
            w.write(&Artifact::new("f.txt", "new")).unwrap(),
            Disposition::Overwritten
        );
        assert_eq!(fs::read_to_string(dir.path().join("f.txt")).unwrap(), "new");
    }

    #[test]
    fn test_merge_policy_concatenates_under_marker() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("f.txt"), "existing\n").unwrap();
        let w = writer(&dir, false, false, ConflictPolicy::Merge);

        assert_eq!(
            w.write(&Artifact::new("f.txt", "generated\n")).unwrap(),
            Disposition::Merged
        );
        let on_disk = fs::read_to_string(dir.path().join("f.txt")).unwrap();
        assert!(on_disk.starts_with("existing"));
        assert!(on_disk.contains(MERGE_MARKER));
        assert!(on_disk.ends_with("generated\n"));
    }

    #[test]
    fn test_dry_run_touches_nothing_but_detects_conflicts() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("f.txt"), "old").unwrap();
        let before = fs::metadata(dir.path().join("f.txt")).unwrap().modified().unwrap();

        let w = writer(&dir, false, true, ConflictPolicy::Skip);
        assert_eq!(
            w.write(&Artifact::new("f.txt", "new")).unwrap(),
            Disposition::Skipped
        );
        assert_eq!(
            w.write(&Artifact::new("other.txt", "x")).unwrap(),
            Disposition::WouldWrite
        );

        // Same conflict evidence as a real run, zero disk mutation
        assert_eq!(w.conflicts().len(), 1);
        assert_eq!(fs::read_to_string(dir.path().join("f.txt")).unwrap(), "old");
        assert!(!dir.path().join("other.txt").exists());
        let after = fs::metadata(dir.path().join("f.txt")).unwrap().modified().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_rollback_restores_backups_and_deletes_new_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("existing.txt"), "old").unwrap();
        let w = writer(&dir, true, false, ConflictPolicy::Skip);

        w.write(&Artifact::new("existing.txt", "new")).unwrap();
        w.write(&Artifact::new("fresh.txt", "created")).unwrap();
        w.rollback();

        assert_eq!(
            fs::read_to_string(dir.path().join("existing.txt")).unwrap(),
            "old"
        );
        assert!(!dir.path().join("fresh.txt").exists());
        // Backups were consumed by the restore
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".backup"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_cleanup_backups_removes_backup_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("f.txt"), "old").unwrap();
        let w = writer(&dir, true, false, ConflictPolicy::Skip);

        w.write(&Artifact::new("f.txt", "new")).unwrap();
        w.cleanup_backups();

        assert_eq!(fs::read_to_string(dir.path().join("f.txt")).unwrap(), "new");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".backup"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_append_to_existing_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "first").unwrap();
        let w = writer(&dir, false, false, ConflictPolicy::Skip);

        assert_eq!(
            w.write(&Artifact::new("notes.txt", "second").append()).unwrap(),
            Disposition::Appended
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("notes.txt")).unwrap(),
            "first\nsecond"
        );
        assert!(w.conflicts().is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn test_executable_artifact_gets_exec_bits() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let w = writer(&dir, false, false, ConflictPolicy::Skip);

        w.write(&Artifact::new("run.sh", "#!/bin/sh\n").executable())
            .unwrap();
        let mode = fs::metadata(dir.path().join("run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_ne!(mode & 0o111, 0);
    }

    #[test]
    fn test_line_diff_bounded() {
        let existing = (0..200).map(|i| format!("old {}", i)).collect::<Vec<_>>().join("\n");
        let new = (0..200).map(|i| format!("new {}", i)).collect::<Vec<_>>().join("\n");
        let diff = line_diff(&existing, &new);
        assert!(diff.len() <= MAX_DIFF_LINES + 1);
        assert_eq!(diff.last().unwrap(), "... (diff truncated)");
    }

    #[test]
    fn test_line_diff_trims_common_context() {
        let diff = line_diff("a\nb\nc\n", "a\nB\nc\n");
        assert_eq!(
            diff,
            vec![
                "--- existing".to_string(),
                "+++ new".to_string(),
                "-b".to_string(),
                "+B".to_string(),
            ]
        );
    }
}
