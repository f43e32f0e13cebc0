//! Directory-backed cache: one file per key holding the binary image form.
//!
//! Writes go to a hidden temporary file first and are renamed into place, so
//! a concurrent reader sees either the old entry or the new one, never a torn
//! file. Reads keep the payload as a window into the buffer read from disk
//! rather than copying it again.

use super::Cache;
use crate::error::{CacheMiss, Result};
use crate::image::Image;
use crate::params::Params;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct FileCache {
    dir: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileCache {
    /// Use `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            tmp_counter: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the entry for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(file_name(key))
    }
}

/// Map a key to a file name: `[A-Za-z0-9_-]` and non-leading dots pass
/// through, everything else becomes `%XX`. The mapping is injective, so
/// distinct keys never share a file.
fn file_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, b) in key.bytes().enumerate() {
        let plain = b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || (b == b'.' && i > 0);
        if plain {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    if out.is_empty() {
        out.push('%');
    }
    out
}

impl Cache for FileCache {
    fn get(&self, key: &str, _params: &Params) -> Result<Image> {
        let bytes = match fs::read(self.path_for(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CacheMiss::new(key, "file").into());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Image::unmarshal_shared(Arc::from(bytes))?)
    }

    fn set(&self, key: &str, image: &Image, _params: &Params) -> Result<()> {
        let bytes = image.marshal()?;
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!(".tmp-{}-{}-{}", std::process::id(), n, file_name(key)));
        fs::write(&tmp, &bytes)?;
        if let Err(e) = fs::rename(&tmp, self.path_for(key)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}
