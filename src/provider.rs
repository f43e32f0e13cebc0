//! Source image providers: the bottom of every server chain.

use crate::cancel::CancelToken;
use crate::error::{ParamError, Result};
use crate::image::Image;
use crate::params::Params;
use crate::server::Server;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Format tag for a file extension.
pub fn format_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("jpeg"),
        "png" => Some("png"),
        "gif" => Some("gif"),
        "bmp" => Some("bmp"),
        "tif" | "tiff" => Some("tiff"),
        _ => None,
    }
}

/// Serves files below a root directory, addressed by `params["source"]`.
///
/// The source must be a relative path without `..`; its extension decides
/// the format. Every failure is reported as a parameter error on `"source"`.
pub struct FileProvider {
    root: PathBuf,
}

impl FileProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, source: &str) -> std::result::Result<PathBuf, ParamError> {
        let rel = Path::new(source);
        let safe = !source.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(ParamError::invalid(
                "source",
                format!("\"{source}\" is not a relative path"),
            ));
        }
        Ok(self.root.join(rel))
    }
}

impl Server for FileProvider {
    fn get(&self, params: &Params, cancel: &CancelToken) -> Result<Image> {
        let source = params.get_string("source")?;
        let path = self.resolve(source)?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(format_for_extension)
            .ok_or_else(|| {
                ParamError::invalid("source", format!("unknown format for \"{source}\""))
            })?;
        cancel.check()?;
        let data = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                ParamError::invalid("source", format!("\"{source}\" not found"))
            }
            _ => ParamError::invalid("source", format!("\"{source}\": {e}")),
        })?;
        debug!(%source, bytes = data.len(), "read source");
        Ok(Image::new(format, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ParamErrorKind};
    use tempfile::TempDir;

    fn provider() -> (TempDir, FileProvider) {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("photos")).unwrap();
        fs::write(tmp.path().join("photos/a.JPG"), b"jpeg bytes").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"text").unwrap();
        let provider = FileProvider::new(tmp.path());
        (tmp, provider)
    }

    fn get(provider: &FileProvider, source: &str) -> Result<Image> {
        provider.get(&Params::new().with("source", source), &CancelToken::new())
    }

    fn source_error(result: Result<Image>) -> String {
        match result {
            Err(Error::Param(e)) => {
                assert_eq!(e.param, "source");
                e.to_string()
            }
            other => panic!("expected source error, got {other:?}"),
        }
    }

    #[test]
    fn reads_file_with_format_from_extension() {
        let (_tmp, provider) = provider();
        let image = get(&provider, "photos/a.JPG").unwrap();
        assert_eq!(image.format(), "jpeg");
        assert_eq!(image.data(), b"jpeg bytes");
        assert!(get(&provider, "./photos/a.JPG").is_ok());
    }

    #[test]
    fn rejects_escaping_paths() {
        let (_tmp, provider) = provider();
        for bad in ["../etc/passwd.png", "/etc/passwd.png", "photos/../../x.png", ""] {
            assert!(source_error(get(&provider, bad)).contains("not a relative path"), "{bad}");
        }
    }

    #[test]
    fn missing_and_unknown_are_source_errors() {
        let (_tmp, provider) = provider();
        assert!(source_error(get(&provider, "photos/b.png")).contains("not found"));
        assert!(source_error(get(&provider, "notes.txt")).contains("unknown format"));
    }

    #[test]
    fn missing_parameter() {
        let (_tmp, provider) = provider();
        match provider.get(&Params::new(), &CancelToken::new()) {
            Err(Error::Param(e)) => assert_eq!(e.kind, ParamErrorKind::NotSet),
            other => panic!("unexpected {other:?}"),
        }
    }
}
