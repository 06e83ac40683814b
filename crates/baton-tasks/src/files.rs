//! File discovery and content hashing

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::hash::HashError;

/// Directories never hashed or archived
pub const IGNORED_DIRS: &[&str] = &[".git", "node_modules", ".baton"];

/// Supplies `path -> content hash` maps for packages and global inputs
pub trait FileHasher: Send + Sync {
    /// Hash the files of a package.
    ///
    /// `inputs` selects files (every file when empty), `excludes` removes
    /// matches. Keys are package-relative unix paths.
    fn hash_package(
        &self,
        package_dir: &Path,
        inputs: &[String],
        excludes: &[String],
    ) -> Result<BTreeMap<String, String>, HashError>;

    /// Hash repository-level files matching `globs`. Keys are repo-relative.
    fn hash_globals(&self, root: &Path, globs: &[String]) -> Result<BTreeMap<String, String>, HashError>;
}

/// [`FileHasher`] that walks the filesystem and hashes contents with SHA-256
#[derive(Debug, Default, Clone)]
pub struct GlobFileHasher;

impl FileHasher for GlobFileHasher {
    #[instrument(skip_all, fields(package_dir = %package_dir.display(), inputs = inputs.len()))]
    fn hash_package(
        &self,
        package_dir: &Path,
        inputs: &[String],
        excludes: &[String],
    ) -> Result<BTreeMap<String, String>, HashError> {
        let (mut inclusions, mut exclusions) = split_globs(inputs);
        check_literals(package_dir, &inclusions)?;
        if inclusions.is_empty() {
            inclusions.push("**".to_string());
        }
        exclusions.extend(excludes.iter().cloned());

        let files = walk(package_dir, &inclusions, &exclusions, false)?;
        let hashes = hash_all(package_dir, files)?;
        debug!(files = hashes.len(), "hashed package files");
        Ok(hashes)
    }

    fn hash_globals(&self, root: &Path, globs: &[String]) -> Result<BTreeMap<String, String>, HashError> {
        if globs.is_empty() {
            return Ok(BTreeMap::new());
        }
        let (inclusions, exclusions) = split_globs(globs);
        check_literals(root, &inclusions)?;
        let files = walk(root, &inclusions, &exclusions, false)?;
        hash_all(root, files)
    }
}

/// Expand globs (with `!` exclusions) under `base` into base-relative paths
/// of files, symlinks and empty directories. Missing matches are not errors.
pub fn expand_globs(base: &Path, globs: &[String]) -> Result<Vec<PathBuf>, HashError> {
    let (inclusions, exclusions) = split_globs(globs);
    if inclusions.is_empty() || !base.exists() {
        return Ok(Vec::new());
    }
    walk(base, &inclusions, &exclusions, true)
}

/// Render a relative path with `/` separators
pub fn to_unix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn split_globs(globs: &[String]) -> (Vec<String>, Vec<String>) {
    let mut inclusions = Vec::new();
    let mut exclusions = Vec::new();
    for glob in globs {
        match glob.strip_prefix('!') {
            Some(excluded) => exclusions.push(excluded.to_string()),
            None => inclusions.push(glob.clone()),
        }
    }
    (inclusions, exclusions)
}

fn is_literal(pattern: &str) -> bool {
    !pattern.contains(['*', '?', '[', '{'])
}

fn check_literals(base: &Path, inclusions: &[String]) -> Result<(), HashError> {
    for pattern in inclusions.iter().filter(|p| is_literal(p)) {
        let path = base.join(pattern);
        if !path.exists() {
            return Err(HashError::MissingInput(path));
        }
    }
    Ok(())
}

fn build_set(base: &Path, patterns: &[String]) -> Result<GlobSet, HashError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let trimmed = pattern.trim_start_matches("./").trim_end_matches('/');
        builder.add(glob(trimmed)?);
        // A literal directory selects everything beneath it
        if is_literal(trimmed) && base.join(trimmed).is_dir() {
            builder.add(glob(&format!("{}/**", trimmed))?);
        }
    }
    builder.build().map_err(|e| HashError::Glob(e.to_string()))
}

fn glob(pattern: &str) -> Result<Glob, HashError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| HashError::Glob(e.to_string()))
}

fn walk(
    base: &Path,
    inclusions: &[String],
    exclusions: &[String],
    include_empty_dirs: bool,
) -> Result<Vec<PathBuf>, HashError> {
    let include = build_set(base, inclusions)?;
    let exclude = build_set(base, exclusions)?;

    let walker = WalkDir::new(base)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !(entry.file_type().is_dir()
                    && IGNORED_DIRS
                        .iter()
                        .any(|dir| entry.file_name() == std::ffi::OsStr::new(dir)))
        });

    let mut matched = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| HashError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
        if entry.depth() == 0 {
            continue;
        }
        let rel = match entry.path().strip_prefix(base) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => continue,
        };
        let unix = to_unix(&rel);
        if !include.is_match(&unix) || exclude.is_match(&unix) {
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_file() || file_type.is_symlink() {
            matched.push(rel);
        } else if include_empty_dirs && file_type.is_dir() && is_empty_dir(entry.path()) {
            matched.push(rel);
        }
    }
    Ok(matched)
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

fn hash_all(base: &Path, files: Vec<PathBuf>) -> Result<BTreeMap<String, String>, HashError> {
    let mut hashes = BTreeMap::new();
    for rel in files {
        let path = base.join(&rel);
        hashes.insert(to_unix(&rel), hash_file(&path)?);
    }
    Ok(hashes)
}

/// SHA-256 of a file's contents; symlinks hash their target path
pub fn hash_file(path: &Path) -> Result<String, HashError> {
    let meta = fs::symlink_metadata(path).map_err(HashError::Io)?;
    let mut hasher = Sha256::new();
    if meta.file_type().is_symlink() {
        let target = fs::read_link(path).map_err(HashError::Io)?;
        hasher.update(b"symlink:");
        hasher.update(to_unix(&target).as_bytes());
    } else {
        let mut file = fs::File::open(path).map_err(HashError::Io)?;
        io::copy(&mut file, &mut hasher).map_err(HashError::Io)?;
    }
    Ok(format!("{:x}", hasher.finalize()))
}
