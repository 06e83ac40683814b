//! Deterministic `.tar.zst` artifact archives

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use tar::{Archive, Builder, EntryType, Header};
use tracing::debug;

use super::{check_relative, CacheError};
use crate::files::to_unix;

const ZSTD_LEVEL: i32 = 3;

/// Write `files` (relative to `anchor`) as a zstd-compressed tarball.
///
/// Entries are sorted by path and carry zeroed timestamps and owners, so the
/// same files always produce the same bytes.
pub fn write_archive<W: Write>(out: W, anchor: &Path, files: &[PathBuf]) -> Result<W, CacheError> {
    let mut sorted: Vec<&PathBuf> = files.iter().collect();
    sorted.sort();
    sorted.dedup();

    let encoder = zstd::Encoder::new(out, ZSTD_LEVEL)?;
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    for rel in sorted {
        check_relative(rel)?;
        append(&mut builder, anchor, rel)?;
    }

    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

fn append<W: Write>(builder: &mut Builder<W>, anchor: &Path, rel: &Path) -> Result<(), CacheError> {
    let path = anchor.join(rel);
    let meta = fs::symlink_metadata(&path)?;
    let name = to_unix(rel);

    let mut header = Header::new_gnu();
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(mode(&meta));

    let file_type = meta.file_type();
    if file_type.is_symlink() {
        let target = fs::read_link(&path)?;
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        builder.append_link(&mut header, &name, &target)?;
    } else if file_type.is_dir() {
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
        builder.append_data(&mut header, format!("{}/", name), io::empty())?;
    } else {
        header.set_entry_type(EntryType::Regular);
        header.set_size(meta.len());
        let file = File::open(&path)?;
        builder.append_data(&mut header, &name, BufReader::new(file))?;
    }
    Ok(())
}

#[cfg(unix)]
fn mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn mode(meta: &fs::Metadata) -> u32 {
    if meta.is_dir() {
        0o755
    } else {
        0o644
    }
}

/// Unpack an archive under `anchor`, returning the restored relative paths.
///
/// Absolute paths, `..` components and symlinks pointing outside the anchor
/// are rejected.
pub fn restore_archive<R: Read>(input: R, anchor: &Path) -> Result<Vec<PathBuf>, CacheError> {
    let decoder = zstd::Decoder::new(input)?;
    let mut archive = Archive::new(decoder);
    archive.set_preserve_mtime(false);

    let mut restored = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let rel = entry.path()?.into_owned();
        check_relative(&rel)?;
        let dest = anchor.join(&rel);

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&dest)?;
            }
            EntryType::Regular | EntryType::Continuous | EntryType::Symlink => {
                if entry.header().entry_type() == EntryType::Symlink {
                    let target = entry
                        .link_name()?
                        .ok_or_else(|| CacheError::Archive(format!("symlink without target: {}", rel.display())))?
                        .into_owned();
                    check_link_target(&rel, &target)?;
                }
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                if fs::symlink_metadata(&dest).is_ok() {
                    fs::remove_file(&dest)?;
                }
                entry.unpack(&dest)?;
            }
            other => {
                return Err(CacheError::Archive(format!(
                    "unsupported entry type {:?} for {}",
                    other,
                    rel.display()
                )));
            }
        }
        restored.push(rel);
    }

    debug!(files = restored.len(), anchor = %anchor.display(), "restored archive");
    Ok(restored)
}

/// A link at `link` (relative to the anchor) must resolve inside the anchor
fn check_link_target(link: &Path, target: &Path) -> Result<(), CacheError> {
    if target.is_absolute() {
        return Err(CacheError::PathTraversal(target.to_path_buf()));
    }
    let mut depth: i64 = link.components().count() as i64 - 1;
    for component in target.components() {
        match component {
            Component::ParentDir => depth -= 1,
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            _ => return Err(CacheError::PathTraversal(target.to_path_buf())),
        }
        if depth < 0 {
            return Err(CacheError::PathTraversal(target.to_path_buf()));
        }
    }
    Ok(())
}

/// Writes an archive to a temporary file and renames it into place.
///
/// Dropping an unfinished writer removes the temporary file.
#[derive(Debug)]
pub struct CacheWriter {
    temp: PathBuf,
    dest: PathBuf,
    persisted: bool,
}

impl CacheWriter {
    pub fn create(dest: &Path) -> Self {
        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = dest.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));
        Self {
            temp,
            dest: dest.to_path_buf(),
            persisted: false,
        }
    }

    /// Archive `files` and atomically move the result to the destination
    pub fn write(mut self, anchor: &Path, files: &[PathBuf]) -> Result<(), CacheError> {
        if let Some(parent) = self.dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.temp)?;
        let mut out = write_archive(BufWriter::new(file), anchor, files)?;
        out.flush()?;
        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        fs::rename(&self.temp, &self.dest)?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for CacheWriter {
    fn drop(&mut self) {
        if !self.persisted {
            let _ = fs::remove_file(&self.temp);
        }
    }
}

/// Reads an archive from disk
#[derive(Debug, Clone)]
pub struct CacheReader {
    path: PathBuf,
}

impl CacheReader {
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if !path.is_file() {
            return Err(CacheError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("archive not found: {}", path.display()),
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// SHA-256 of the archive bytes, used for integrity checks
    pub fn sha(&self) -> Result<String, CacheError> {
        let mut file = File::open(&self.path)?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher)?;
        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn restore(&self, anchor: &Path) -> Result<Vec<PathBuf>, CacheError> {
        let file = File::open(&self.path)?;
        restore_archive(BufReader::new(file), anchor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn paths(list: &[&str]) -> Vec<PathBuf> {
        list.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_archive_restores_identical_files() {
        let src = TempDir::new().unwrap();
        write(src.path(), "dist/index.js", "console.log(1)");
        write(src.path(), ".baton/build.log", "building\n");
        fs::create_dir_all(src.path().join("dist/empty")).unwrap();

        let files = paths(&["dist/index.js", ".baton/build.log", "dist/empty"]);
        let bytes = write_archive(Vec::new(), src.path(), &files).unwrap();

        let dest = TempDir::new().unwrap();
        let restored = restore_archive(bytes.as_slice(), dest.path()).unwrap();
        assert_eq!(restored.len(), 3);
        assert_eq!(
            fs::read_to_string(dest.path().join("dist/index.js")).unwrap(),
            "console.log(1)"
        );
        assert!(dest.path().join("dist/empty").is_dir());
    }

    #[test]
    fn test_archive_is_deterministic() {
        let src = TempDir::new().unwrap();
        write(src.path(), "b.txt", "b");
        write(src.path(), "a.txt", "a");

        let one = write_archive(Vec::new(), src.path(), &paths(&["b.txt", "a.txt"])).unwrap();
        let two = write_archive(Vec::new(), src.path(), &paths(&["a.txt", "b.txt"])).unwrap();
        assert_eq!(one, two);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_round_trip() {
        let src = TempDir::new().unwrap();
        write(src.path(), "dist/real.js", "x");
        std::os::unix::fs::symlink("real.js", src.path().join("dist/link.js")).unwrap();

        let bytes = write_archive(
            Vec::new(),
            src.path(),
            &paths(&["dist/real.js", "dist/link.js"]),
        )
        .unwrap();

        let dest = TempDir::new().unwrap();
        restore_archive(bytes.as_slice(), dest.path()).unwrap();
        let link = dest.path().join("dist/link.js");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("real.js"));
    }

    #[test]
    fn test_rejects_traversal() {
        let src = TempDir::new().unwrap();
        let err = write_archive(Vec::new(), src.path(), &paths(&["../outside"])).unwrap_err();
        assert!(matches!(err, CacheError::PathTraversal(_)));

        assert!(check_link_target(Path::new("dist/link"), Path::new("../a")).is_ok());
        assert!(check_link_target(Path::new("dist/link"), Path::new("../../a")).is_err());
        assert!(check_link_target(Path::new("link"), Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn test_writer_and_reader() {
        let src = TempDir::new().unwrap();
        write(src.path(), "out.txt", "hello");
        let dest = src.path().join("cache/abc.tar.zst");

        CacheWriter::create(&dest)
            .write(src.path(), &paths(&["out.txt"]))
            .unwrap();
        assert!(dest.is_file());

        let reader = CacheReader::open(&dest).unwrap();
        assert_eq!(reader.sha().unwrap().len(), 64);

        let target = TempDir::new().unwrap();
        let restored = reader.restore(target.path()).unwrap();
        assert_eq!(restored, paths(&["out.txt"]));
    }

    #[test]
    fn test_dropped_writer_leaves_no_temp_file() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("abc.tar.zst");
        let err = CacheWriter::create(&dest)
            .write(temp.path(), &paths(&["missing.txt"]))
            .unwrap_err();
        assert!(matches!(err, CacheError::Io(_)));
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
