//! The destination half of a transfer: filesystem preparation and the
//! block-receiving loop (spec §4.3 "Destination").

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::MmapMut;
use xcp_net::Connection;
use xcp_rundown::LazyGate;
use xcp_wire::{Message, TransferBlockHeader, TransferInfo, BLOCK_HEADER_LEN};

use crate::error::EngineError;
use crate::mmap::SharedMmap;
use crate::progress::{ProgressCallback, ProgressReporter};

/// Default permission applied when a manifest entry's `posix_perm == 0`.
const DEFAULT_FILE_PERM: u32 = 0o644;
/// Default permission applied to a created directory whose manifest entry
/// carries `posix_perm == 0`. The distilled spec only states the file
/// default explicitly; this mirrors it for directories (see DESIGN.md).
const DEFAULT_DIR_PERM: u32 = 0o755;

struct DestinationFile {
    /// `None` for a declared-empty file: no block is ever addressed to it
    /// (the source's own offset check never lets one past), so no mapping
    /// is needed.
    mmap: Option<SharedMmap>,
    size: u64,
    received: AtomicU64,
}

/// The destination side of one transfer.
pub struct TransferDestination {
    root: PathBuf,
    files: Vec<DestinationFile>,
    total_size: u64,
    transferred: AtomicU64,
    channels_finished: LazyGate,
    progress: ProgressReporter,
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Strips the transfer root's own path component (the first segment of
/// every `relative_path`) when the destination root itself stands in for
/// that directory, rather than being created as a new child of it.
fn strip_root_component(relative_path: &str) -> &str {
    match relative_path.split_once('/') {
        Some((_, rest)) => rest,
        None => "",
    }
}

impl TransferDestination {
    /// Records the destination path; no filesystem I/O happens until
    /// [`TransferDestination::init_transfer_info`].
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, progress: Option<ProgressCallback>) -> Self {
        Self {
            root: root.into(),
            files: Vec::new(),
            total_size: 0,
            transferred: AtomicU64::new(0),
            channels_finished: LazyGate::uninit(),
            progress: ProgressReporter::new(progress),
        }
    }

    /// Resolves the destination path against the filesystem per spec
    /// §4.3's five-way case split, creates every declared directory and
    /// file, memory-maps each file, and initializes the
    /// "all channels finished" gate.
    pub fn init_transfer_info(
        &mut self,
        manifest: &TransferInfo,
        total_channel_multiplicity: u64,
    ) -> Result<(), EngineError> {
        let existing = std::fs::symlink_metadata(&self.root);

        let strip = match (&existing, manifest.source_is_directory) {
            (Ok(meta), false) if meta.is_file() => true,
            (Ok(meta), true) if meta.is_dir() => false,
            (Ok(meta), false) if meta.is_dir() => {
                return Err(EngineError::unsupported(format!(
                    "{} exists as a directory but the transfer is a single file",
                    self.root.display()
                )))
            }
            (Ok(meta), _) if !meta.is_file() && !meta.is_dir() => {
                return Err(EngineError::unsupported(format!(
                    "{} is a special file",
                    self.root.display()
                )))
            }
            (Err(err), _) if err.kind() == std::io::ErrorKind::NotFound => {
                if manifest.source_is_directory {
                    std::fs::create_dir_all(&self.root)?;
                }
                true
            }
            (Err(err), _) => return Err(EngineError::Io(std::io::Error::new(err.kind(), err.to_string()))),
            _ => false,
        };

        if manifest.source_is_directory {
            self.create_directories(manifest, strip)?;
        }
        self.create_files(manifest, strip)?;

        self.total_size = manifest.files.iter().map(|f| f.size).sum();
        self.channels_finished.init(total_channel_multiplicity);
        Ok(())
    }

    fn target_path(&self, relative_path: &str, strip: bool) -> PathBuf {
        if strip {
            let stripped = strip_root_component(relative_path);
            if stripped.is_empty() {
                self.root.clone()
            } else {
                self.root.join(stripped)
            }
        } else {
            self.root.join(relative_path)
        }
    }

    fn create_directories(&self, manifest: &TransferInfo, strip: bool) -> Result<(), EngineError> {
        for (index, dir) in manifest.directories.iter().enumerate() {
            let perm = if dir.posix_perm == 0 {
                DEFAULT_DIR_PERM
            } else {
                u32::from(dir.posix_perm)
            };
            if strip && index == 0 {
                // The root entry maps onto `self.root`, already created by
                // `init_transfer_info`.
                set_permissions(&self.root, perm)?;
                continue;
            }
            let path = self.target_path(&dir.relative_path, strip);
            std::fs::create_dir_all(&path)?;
            set_permissions(&path, perm)?;
        }
        Ok(())
    }

    fn create_files(&mut self, manifest: &TransferInfo, strip: bool) -> Result<(), EngineError> {
        for file in &manifest.files {
            if file.size > usize::MAX as u64 {
                return Err(EngineError::unsupported(format!(
                    "{} is too large for this platform's address space",
                    file.relative_path
                )));
            }

            let path = self.target_path(&file.relative_path, strip);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let handle = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?;
            handle.set_len(file.size)?;
            let perm = if file.posix_perm == 0 {
                DEFAULT_FILE_PERM
            } else {
                u32::from(file.posix_perm)
            };
            set_permissions(&path, perm)?;

            let mmap = if file.size == 0 {
                None
            } else {
                let mmap = unsafe { MmapMut::map_mut(&handle)? };
                let shared = SharedMmap::new(mmap);
                shared.advise_sequential();
                Some(shared)
            };

            self.files.push(DestinationFile {
                mmap,
                size: file.size,
                received: AtomicU64::new(0),
            });
        }
        Ok(())
    }

    /// Runs the block-receiving loop for one channel connection until the
    /// end-of-stream sentinel arrives, then signals the "channels
    /// finished" gate exactly once regardless of whether this call
    /// succeeded or failed.
    pub fn invoke_channel(&self, conn: &Connection) -> Result<(), EngineError> {
        struct SignalOnDrop<'a>(&'a LazyGate);
        impl Drop for SignalOnDrop<'_> {
            fn drop(&mut self) {
                self.0.signal();
            }
        }
        let _signal_guard = SignalOnDrop(&self.channels_finished);

        loop {
            let mut header_bytes = [0u8; BLOCK_HEADER_LEN];
            conn.recv_exact(&mut header_bytes)?;
            let header = TransferBlockHeader::from_bytes(&header_bytes);
            if header.is_sentinel() {
                break;
            }

            let file = self
                .files
                .get(header.file_index as usize)
                .ok_or_else(|| EngineError::invalid_argument("block references unknown file index"))?;
            let len = u64::from(header.block_size);
            let end = header
                .offset
                .checked_add(len)
                .ok_or_else(|| EngineError::invalid_argument("block range overflows"))?;
            if end > file.size {
                return Err(EngineError::invalid_argument(
                    "block range exceeds declared file size",
                ));
            }

            let mmap = file
                .mmap
                .as_ref()
                .ok_or_else(|| EngineError::invalid_argument("received a block for a zero-length file"))?;
            // SAFETY: bounds were validated above; disjointness across
            // concurrent channels is guaranteed by the source's partition
            // of `next_offset` (spec §4.3 invariants).
            let slice = unsafe { mmap.slice_mut(header.offset as usize, len as usize) };
            conn.recv_exact(slice)?;

            let received = file.received.fetch_add(len, Ordering::SeqCst) + len;
            if received == file.size {
                if let Err(err) = mmap.flush() {
                    tracing::warn!(%err, "flush failed for a completed file");
                }
            }

            let transferred = self.transferred.fetch_add(len, Ordering::SeqCst) + len;
            self.progress.report(transferred, self.total_size);
        }

        Ok(())
    }

    /// Waits for every channel to finish, then sends
    /// `TRANSFER_DESTINATION_FINISHED{error_code=0}` on the portal
    /// connection.
    pub fn invoke_portal(&self, conn: &Connection) -> Result<(), EngineError> {
        self.channels_finished.wait();
        let msg = xcp_wire::TransferDestinationFinished {
            error_code: 0,
            error_message: String::new(),
        };
        msg.send(&mut crate::conn_io::ConnWriter(conn))?;
        Ok(())
    }

    /// Total declared size across every file in the manifest.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcp_wire::{BasicDirInfo, BasicFileInfo};

    fn single_file_manifest(name: &str, size: u64) -> TransferInfo {
        TransferInfo {
            source_is_directory: false,
            directories: Vec::new(),
            files: vec![BasicFileInfo {
                relative_path: name.to_string(),
                size,
                posix_perm: 0,
            }],
        }
    }

    #[test]
    fn single_file_into_nonexistent_path_creates_it_with_declared_size() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let manifest = single_file_manifest("a.bin", 42);

        let mut dest = TransferDestination::new(&target, None);
        dest.init_transfer_info(&manifest, 1).unwrap();

        assert_eq!(std::fs::metadata(&target).unwrap().len(), 42);
    }

    #[test]
    fn single_file_onto_existing_regular_file_overwrites_it() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        std::fs::write(&target, b"stale contents, longer than the new size").unwrap();
        let manifest = single_file_manifest("a.bin", 5);

        let mut dest = TransferDestination::new(&target, None);
        dest.init_transfer_info(&manifest, 1).unwrap();

        assert_eq!(std::fs::metadata(&target).unwrap().len(), 5);
    }

    #[test]
    fn directory_transfer_into_existing_directory_nests_under_source_name() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = TransferInfo {
            source_is_directory: true,
            directories: vec![BasicDirInfo {
                relative_path: "srcdir".to_string(),
                posix_perm: 0,
            }],
            files: vec![BasicFileInfo {
                relative_path: "srcdir/a.bin".to_string(),
                size: 5,
                posix_perm: 0,
            }],
        };

        let mut dest = TransferDestination::new(dir.path(), None);
        dest.init_transfer_info(&manifest, 1).unwrap();

        assert!(dir.path().join("srcdir").is_dir());
        assert_eq!(std::fs::metadata(dir.path().join("srcdir/a.bin")).unwrap().len(), 5);
    }

    #[test]
    fn directory_transfer_into_nonexistent_path_becomes_the_root_itself() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("newroot");
        let manifest = TransferInfo {
            source_is_directory: true,
            directories: vec![BasicDirInfo {
                relative_path: "srcdir".to_string(),
                posix_perm: 0,
            }],
            files: vec![BasicFileInfo {
                relative_path: "srcdir/a.bin".to_string(),
                size: 5,
                posix_perm: 0,
            }],
        };

        let mut dest = TransferDestination::new(&target, None);
        dest.init_transfer_info(&manifest, 1).unwrap();

        assert!(target.is_dir());
        assert_eq!(std::fs::metadata(target.join("a.bin")).unwrap().len(), 5);
        assert!(!target.join("srcdir").exists());
    }

    #[test]
    fn existing_directory_with_single_file_transfer_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = single_file_manifest("a.bin", 5);
        let mut dest = TransferDestination::new(dir.path(), None);
        let err = dest.init_transfer_info(&manifest, 1).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Logic {
                kind: crate::error::ErrorKind::Unsupported,
                ..
            }
        ));
    }

    #[test]
    fn zero_length_file_is_created_without_a_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("empty.bin");
        let manifest = single_file_manifest("empty.bin", 0);
        let mut dest = TransferDestination::new(&target, None);
        dest.init_transfer_info(&manifest, 1).unwrap();
        assert_eq!(std::fs::metadata(&target).unwrap().len(), 0);
        assert!(dest.files[0].mmap.is_none());
    }
}
