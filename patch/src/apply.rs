//! Applying parsed operations to the filesystem.
//!
//! Every operation is resolved in memory first; nothing touches disk until the whole
//! patch has applied cleanly.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use toolhost_utils::{AtomicWriteOptions, PersistMode, atomic_write_with_options, existing_mode};

use crate::error::PatchError;
use crate::parser::{PatchOperation, parse_patch};
use crate::resolve::apply_hunks;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    Added,
    Modified,
    Deleted,
}

impl FileChange {
    fn marker(self) -> char {
        match self {
            FileChange::Added => 'A',
            FileChange::Modified => 'M',
            FileChange::Deleted => 'D',
        }
    }
}

/// Files touched by a patch, in operation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub changes: Vec<(String, FileChange)>,
}

impl fmt::Display for ApplySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Success. Updated the following files:")?;
        for (path, change) in &self.changes {
            write!(f, "\n{} {path}", change.marker())?;
        }
        Ok(())
    }
}

/// Parse `text` and apply it with relative paths resolved against `root`.
pub fn apply_patch(text: &str, root: &Path) -> Result<ApplySummary, PatchError> {
    let ops = parse_patch(text)?;
    apply_operations(&ops, root)
}

/// Pending state of one path.
struct StagedFile {
    /// `None` once deleted.
    content: Option<String>,
    mode: Option<u32>,
}

#[derive(Default)]
struct Staging {
    files: HashMap<PathBuf, StagedFile>,
    /// Commit order: first time each path was staged.
    order: Vec<PathBuf>,
}

impl Staging {
    fn read(&self, path: &Path) -> Result<String, PatchError> {
        if let Some(staged) = self.files.get(path) {
            return staged.content.clone().ok_or_else(|| PatchError::Io {
                op: "read",
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "file deleted earlier in this patch",
                ),
            });
        }
        fs::read_to_string(path).map_err(|source| PatchError::Io {
            op: "read",
            path: path.to_path_buf(),
            source,
        })
    }

    fn ensure_exists(&self, path: &Path) -> Result<(), PatchError> {
        match self.files.get(path) {
            Some(staged) if staged.content.is_some() => Ok(()),
            Some(_) => Err(PatchError::Io {
                op: "delete",
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "file deleted earlier in this patch",
                ),
            }),
            None => fs::metadata(path).map(|_| ()).map_err(|source| PatchError::Io {
                op: "delete",
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn stage(&mut self, path: PathBuf, content: Option<String>) {
        let mode = self
            .files
            .get(&path)
            .map_or_else(|| existing_mode(&path), |staged| staged.mode);
        if !self.files.contains_key(&path) {
            self.order.push(path.clone());
        }
        self.files.insert(path, StagedFile { content, mode });
    }

    fn commit(self) -> Result<(), PatchError> {
        let Staging { mut files, order } = self;
        for path in order {
            let Some(staged) = files.remove(&path) else {
                continue;
            };
            match staged.content {
                Some(content) => write_file(&path, &content, staged.mode)?,
                None => match fs::remove_file(&path) {
                    Ok(()) => {}
                    // Added and deleted within the same patch.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(source) => {
                        return Err(PatchError::Io {
                            op: "delete",
                            path,
                            source,
                        });
                    }
                },
            }
        }
        Ok(())
    }
}

fn write_file(path: &Path, content: &str, mode: Option<u32>) -> Result<(), PatchError> {
    let io_err = |op, source| PatchError::Io {
        op,
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| io_err("create directory", e))?;
    }
    let options = AtomicWriteOptions {
        mode: mode.map_or(PersistMode::Default, PersistMode::Preserve),
        ..AtomicWriteOptions::default()
    };
    atomic_write_with_options(path, content.as_bytes(), options).map_err(|e| io_err("write", e))
}

fn resolve(root: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Apply already-parsed operations under `root`.
pub fn apply_operations(ops: &[PatchOperation], root: &Path) -> Result<ApplySummary, PatchError> {
    let mut staging = Staging::default();
    let mut summary = ApplySummary::default();

    for op in ops {
        match op {
            PatchOperation::Add { file, lines } => {
                let content = if lines.is_empty() {
                    String::new()
                } else {
                    let mut joined = lines.join("\n");
                    joined.push('\n');
                    joined
                };
                staging.stage(resolve(root, file), Some(content));
                summary.changes.push((file.clone(), FileChange::Added));
            }
            PatchOperation::Delete { file } => {
                let path = resolve(root, file);
                staging.ensure_exists(&path)?;
                staging.stage(path, None);
                summary.changes.push((file.clone(), FileChange::Deleted));
            }
            PatchOperation::Update {
                file,
                move_to,
                hunks,
            } => {
                let source = resolve(root, file);
                let original = staging.read(&source)?;
                let updated = apply_hunks(&original, hunks, file)?;
                match move_to {
                    Some(target) => {
                        let dest = resolve(root, target);
                        if dest != source {
                            staging.stage(source, None);
                        }
                        staging.stage(dest, Some(updated));
                        summary.changes.push((target.clone(), FileChange::Modified));
                    }
                    None => {
                        staging.stage(source, Some(updated));
                        summary.changes.push((file.clone(), FileChange::Modified));
                    }
                }
            }
        }
    }

    staging.commit()?;
    tracing::debug!(files = summary.changes.len(), "Patch applied");
    Ok(summary)
}
