//! The source half of a transfer: file enumeration and the block-sending
//! loop (spec §4.3 "Source").

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use walkdir::WalkDir;
use xcp_net::Connection;
use xcp_wire::{BasicDirInfo, BasicFileInfo, Message, TransferBlockHeader, TransferInfo};

use crate::adaptive::{adjust_block_size, round_and_clamp, ADAPTIVE_START};
use crate::error::EngineError;
use crate::progress::{ProgressCallback, ProgressReporter};

struct SourceFile {
    handle: File,
    size: u64,
    next_offset: AtomicU64,
}

/// The source side of one transfer: every file's read handle, the
/// manifest sent to the peer, and the per-file offset cursors every
/// channel thread races to claim blocks from.
pub struct TransferSource {
    files: Vec<SourceFile>,
    manifest: TransferInfo,
    total_size: u64,
    transferred: AtomicU64,
    block_size_hint: u64,
    progress: ProgressReporter,
}

#[cfg(unix)]
fn posix_perm(metadata: &std::fs::Metadata) -> u16 {
    use std::os::unix::fs::PermissionsExt;
    (metadata.permissions().mode() & 0o7777) as u16
}

#[cfg(not(unix))]
fn posix_perm(_metadata: &std::fs::Metadata) -> u16 {
    0
}

impl TransferSource {
    /// Constructs a source from `path`. Regular files always work;
    /// directories require `recursive == true` (spec: "source is directory
    /// without `-r`" is an `EINVAL` logic error). Every file handle is
    /// opened immediately, matching spec §4.3 ("All file handles are
    /// opened immediately; they are closed on disposal").
    pub fn new(
        path: &Path,
        recursive: bool,
        block_size_hint: u64,
        progress: Option<ProgressCallback>,
    ) -> Result<Self, EngineError> {
        let metadata = std::fs::metadata(path)?;

        let (manifest, files) = if metadata.is_dir() {
            if !recursive {
                return Err(EngineError::invalid_argument(
                    "source is a directory but recursion was not requested",
                ));
            }
            Self::scan_directory(path)?
        } else if metadata.is_file() {
            let root_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string_lossy().into_owned());
            let handle = File::open(path)?;
            let file_meta = handle.metadata()?;
            let manifest = TransferInfo {
                source_is_directory: false,
                directories: Vec::new(),
                files: vec![BasicFileInfo {
                    relative_path: root_name,
                    size: file_meta.len(),
                    posix_perm: posix_perm(&file_meta),
                }],
            };
            let files = vec![SourceFile {
                size: file_meta.len(),
                handle,
                next_offset: AtomicU64::new(0),
            }];
            (manifest, files)
        } else {
            return Err(EngineError::unsupported(format!(
                "{} is not a regular file or directory",
                path.display()
            )));
        };

        let total_size = manifest.files.iter().map(|f| f.size).sum();

        Ok(Self {
            files,
            manifest,
            total_size,
            transferred: AtomicU64::new(0),
            block_size_hint,
            progress: ProgressReporter::new(progress),
        })
    }

    fn scan_directory(root: &Path) -> Result<(TransferInfo, Vec<SourceFile>), EngineError> {
        let root_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.to_string_lossy().into_owned());
        let root_meta = std::fs::metadata(root)?;

        let mut directories = vec![BasicDirInfo {
            relative_path: root_name.clone(),
            posix_perm: posix_perm(&root_meta),
        }];
        let mut files = Vec::new();
        let mut file_infos = Vec::new();

        // `follow_links(true)` matches spec §4.3/§9: directory traversal
        // follows symlinks; walkdir tracks the ancestor chain by device +
        // inode and reports a loop as an `Err` instead of recursing
        // forever, which is the "bounded traversal" defense §9 calls for.
        let walker = WalkDir::new(root).follow_links(true).min_depth(1);
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    if err
                        .io_error()
                        .map(|e| e.kind() == std::io::ErrorKind::PermissionDenied)
                        .unwrap_or(false)
                    {
                        tracing::warn!(%err, "skipping unreadable directory entry");
                        continue;
                    }
                    return Err(EngineError::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        err.to_string(),
                    )));
                }
            };

            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let relative_path = format!("{root_name}/{}", relative.display().to_string().replace('\\', "/"));
            let entry_meta = entry.metadata().map_err(|err| {
                std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
            })?;

            if entry_meta.is_dir() {
                directories.push(BasicDirInfo {
                    relative_path,
                    posix_perm: posix_perm(&entry_meta),
                });
            } else if entry_meta.is_file() {
                let handle = File::open(entry.path())?;
                let size = entry_meta.len();
                file_infos.push(BasicFileInfo {
                    relative_path,
                    size,
                    posix_perm: posix_perm(&entry_meta),
                });
                files.push(SourceFile {
                    handle,
                    size,
                    next_offset: AtomicU64::new(0),
                });
            } else {
                return Err(EngineError::unsupported(format!(
                    "{} is a special file, not a regular file or directory",
                    entry.path().display()
                )));
            }
        }

        let manifest = TransferInfo {
            source_is_directory: true,
            directories,
            files: file_infos,
        };
        Ok((manifest, files))
    }

    /// The manifest to send in `SERVER_TRANSFER_RESPONSE`/used to drive
    /// `init_transfer_info` on the destination.
    #[must_use]
    pub fn manifest(&self) -> &TransferInfo {
        &self.manifest
    }

    /// Sum of every file's declared size.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Runs the block-sending loop for one channel connection: claims
    /// blocks from every file's shared offset cursor via atomic
    /// fetch-add, `send_file`s each one, and finally emits the
    /// end-of-stream sentinel exactly once.
    pub fn invoke_channel(&self, conn: &Connection) -> Result<(), EngineError> {
        let adaptive = self.block_size_hint == 0;
        let mut block_size = if adaptive { ADAPTIVE_START } else { round_and_clamp(self.block_size_hint) };

        for (file_index, file) in self.files.iter().enumerate() {
            loop {
                let offset = file.next_offset.fetch_add(block_size, Ordering::SeqCst);
                if offset >= file.size {
                    break;
                }
                let len = block_size.min(file.size - offset) as u32;
                let header = TransferBlockHeader {
                    offset,
                    block_size: len,
                    file_index: file_index as u32,
                };

                let start = Instant::now();
                conn.send_file(&file.handle, offset, u64::from(len), Some(&header.to_bytes()))?;
                let elapsed = start.elapsed();

                if adaptive {
                    block_size = adjust_block_size(block_size, elapsed);
                }

                let transferred = self.transferred.fetch_add(u64::from(len), Ordering::SeqCst) + u64::from(len);
                self.progress.report(transferred, self.total_size);
            }
        }

        conn.send_all(&TransferBlockHeader::SENTINEL.to_bytes())?;
        Ok(())
    }

    /// Waits for the destination's `TRANSFER_DESTINATION_FINISHED` message
    /// on the portal connection and maps its `error_code` to a result.
    pub fn invoke_portal(&self, conn: &Connection) -> Result<(), EngineError> {
        let finished =
            xcp_wire::TransferDestinationFinished::recv(&mut crate::conn_io::ConnReader(conn))?;
        if finished.error_code != 0 {
            return Err(EngineError::PeerReported {
                code: finished.error_code,
                message: finished.error_message,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn single_file_manifest_has_one_entry_named_after_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"hello").unwrap();

        let source = TransferSource::new(&path, false, 0, None).unwrap();
        assert!(!source.manifest().source_is_directory);
        assert_eq!(source.manifest().files.len(), 1);
        assert_eq!(source.manifest().files[0].relative_path, "a.bin");
        assert_eq!(source.total_size(), 5);
    }

    #[test]
    fn directory_without_recursive_flag_is_rejected() {
        let dir = tempdir().unwrap();
        let err = TransferSource::new(dir.path(), false, 0, None).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Logic {
                kind: crate::error::ErrorKind::InvalidArgument,
                ..
            }
        ));
    }

    #[test]
    fn directory_scan_finds_nested_files_and_root_directory_entry() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.bin"), b"contents").unwrap();
        std::fs::write(dir.path().join("a.bin"), b"hi").unwrap();

        let source = TransferSource::new(dir.path(), true, 0, None).unwrap();
        assert!(source.manifest().source_is_directory);
        let root_name = dir.path().file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(source.manifest().directories[0].relative_path, root_name);
        assert_eq!(source.manifest().files.len(), 2);
        assert_eq!(source.total_size(), 10);
    }

    #[test]
    fn block_partition_covers_whole_file_with_fixed_block_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        let mut f = std::fs::File::create(&path).unwrap();
        let data = vec![7u8; (3 * crate::adaptive::BLOCK_SIZE_UNIT) as usize + 100];
        f.write_all(&data).unwrap();
        drop(f);

        let source = TransferSource::new(&path, false, crate::adaptive::BLOCK_SIZE_UNIT, None).unwrap();
        // Every claim should eventually exhaust next_offset past file size.
        let file = &source.files[0];
        let mut claimed = 0u64;
        loop {
            let offset = file.next_offset.fetch_add(crate::adaptive::BLOCK_SIZE_UNIT, Ordering::SeqCst);
            if offset >= file.size {
                break;
            }
            claimed += crate::adaptive::BLOCK_SIZE_UNIT.min(file.size - offset);
        }
        assert_eq!(claimed, file.size);
    }
}
