use std::collections::HashSet;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::Classification;
use crate::error::AirError;

/// Directory used for assets without a usable AIR identifier.
pub const DEFAULT_DIR: &str = "default";

const FALLBACK_FILE_NAME: &str = "download";

/// Maps classifications to directories under `root` and hands out file paths
/// that collide neither with the filesystem nor with earlier paths of this run.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: Utf8PathBuf,
    reserved: HashSet<Utf8PathBuf>,
}

impl PathResolver {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self {
            root,
            reserved: HashSet::new(),
        }
    }

    /// Creates `root` if needed, checks it is writable and returns its absolute form.
    pub fn prepare_root(root: &Utf8Path) -> Result<Utf8PathBuf, AirError> {
        ensure_writable_dir(root)?;
        root.canonicalize_utf8()
            .map_err(|err| AirError::Filesystem(format!("resolve {root}: {err}")))
    }

    pub fn base_dir(&self, classification: Option<&Classification>) -> Utf8PathBuf {
        match classification {
            Some(classification) => self.root.join(&classification.asset_type),
            None => self.root.join(DEFAULT_DIR),
        }
    }

    pub fn resolve_base(
        &self,
        classification: Option<&Classification>,
    ) -> Result<Utf8PathBuf, AirError> {
        let dir = self.base_dir(classification);
        ensure_writable_dir(&dir)?;
        Ok(dir)
    }

    pub fn resolve_filename(&mut self, directory: &Utf8Path, desired: &str) -> Utf8PathBuf {
        let first = directory.join(desired);
        if self.is_free(&first) {
            self.reserved.insert(first.clone());
            return first;
        }

        let stem = first.file_stem().unwrap_or(desired).to_string();
        let extension = first.extension().map(str::to_string);
        let mut counter = 2u64;
        loop {
            let name = match &extension {
                Some(ext) => format!("{stem}__{counter}.{ext}"),
                None => format!("{stem}__{counter}"),
            };
            let candidate = directory.join(name);
            if self.is_free(&candidate) {
                self.reserved.insert(candidate.clone());
                return candidate;
            }
            counter += 1;
        }
    }

    fn is_free(&self, path: &Utf8Path) -> bool {
        !self.reserved.contains(path) && fs::symlink_metadata(path.as_std_path()).is_err()
    }
}

/// `<ecosystem>_<name>` for classified assets, the bare name otherwise.
pub fn target_file_name(classification: Option<&Classification>, probed: &str) -> String {
    let name = sanitize_file_name(probed);
    match classification {
        Some(classification) => format!("{}_{name}", classification.ecosystem),
        None => name,
    }
}

/// Keeps only the final path component of a server-supplied name.
pub fn sanitize_file_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if last.is_empty() || last == "." || last == ".." {
        FALLBACK_FILE_NAME.to_string()
    } else {
        last.to_string()
    }
}

pub fn ensure_writable_dir(path: &Utf8Path) -> Result<(), AirError> {
    let not_writable = |err: std::io::Error| AirError::NotWritable {
        path: path.as_std_path().to_path_buf(),
        message: err.to_string(),
    };
    fs::create_dir_all(path.as_std_path()).map_err(not_writable)?;
    // anonymous file, unlinked when dropped
    tempfile::tempfile_in(path.as_std_path()).map_err(not_writable)?;
    Ok(())
}
