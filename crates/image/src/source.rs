//! Image sources that content can be copied from.

use std::path::{Path, PathBuf};

/// What the entity needs from any image it copies content out of.
///
/// Filesystem-backed images expose a locator (path or URL) and are read
/// through [`read_resource`]; memory-backed images hand over their bytes
/// directly by overriding [`ImageSource::read_bytes`].
pub trait ImageSource {
    /// Whether the image has content to copy.
    fn exists(&self) -> bool;

    /// External location of the image bytes, if it has one.
    fn locator(&self) -> Option<String>;

    /// Read the image bytes.
    fn read_bytes(&self) -> Option<Vec<u8>> {
        if !self.exists() {
            return None;
        }
        self.locator().and_then(|locator| read_resource(&locator))
    }
}

/// An image that lives as a file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileImage {
    path: PathBuf,
}

impl FileImage {
    /// Image backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Full path of the backing file.
    pub fn full_path(&self) -> &Path {
        &self.path
    }
}

impl ImageSource for FileImage {
    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn locator(&self) -> Option<String> {
        Some(self.path.to_string_lossy().into_owned())
    }

    fn read_bytes(&self) -> Option<Vec<u8>> {
        read_file(&self.path)
    }
}

/// True when `locator` names an http(s) resource rather than a path.
pub fn is_url(locator: &str) -> bool {
    let lower = locator.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Read all bytes from a filesystem path or http(s) URL.
///
/// Missing files, unreachable URLs and non-success responses yield `None`.
pub fn read_resource(locator: &str) -> Option<Vec<u8>> {
    if is_url(locator) {
        return fetch_url(locator);
    }

    read_file(Path::new(locator))
}

/// Read all bytes of the file at `path`, never treating it as a URL.
pub fn read_file(path: &Path) -> Option<Vec<u8>> {
    match std::fs::read(path) {
        Ok(data) => Some(data),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Could not read image file");
            None
        }
    }
}

#[cfg(feature = "remote")]
fn fetch_url(url: &str) -> Option<Vec<u8>> {
    let response = match reqwest::blocking::get(url) {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(url, error = %e, "Could not fetch image");
            return None;
        }
    };

    if !response.status().is_success() {
        tracing::debug!(url, status = %response.status(), "Image fetch returned an error status");
        return None;
    }

    match response.bytes() {
        Ok(bytes) => Some(bytes.to_vec()),
        Err(e) => {
            tracing::debug!(url, error = %e, "Could not read image response body");
            None
        }
    }
}

#[cfg(not(feature = "remote"))]
fn fetch_url(url: &str) -> Option<Vec<u8>> {
    tracing::debug!(url, "Remote sources are disabled (build with the `remote` feature)");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_url() {
        assert!(is_url("http://example.com/a.png"));
        assert!(is_url("HTTPS://example.com/a.png"));
        assert!(!is_url("/var/uploads/a.png"));
        assert!(!is_url("ftp://example.com/a.png"));
    }

    #[test]
    fn test_read_resource_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"GIF89a").unwrap();

        assert_eq!(read_resource(path.to_str().unwrap()), Some(b"GIF89a".to_vec()));
    }

    #[test]
    fn test_read_resource_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.png");
        assert!(read_resource(path.to_str().unwrap()).is_none());
    }

    #[test]
    fn test_file_image_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.png");
        let image = FileImage::new(&path);
        assert!(!image.exists());
        assert!(image.read_bytes().is_none());

        std::fs::write(&path, [0x89, 0x50]).unwrap();
        assert!(image.exists());
        assert_eq!(image.read_bytes(), Some(vec![0x89, 0x50]));
        assert_eq!(image.full_path(), path.as_path());
    }

    #[cfg(unix)]
    #[test]
    fn test_read_file_does_not_fetch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("http:").join("a.gif");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"GIF89a").unwrap();
        assert_eq!(read_file(&path), Some(b"GIF89a".to_vec()));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_image_with_non_utf8_path() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join(OsStr::from_bytes(b"up\xFFload.gif"));
        std::fs::write(&path, b"GIF89a\x01").unwrap();

        let image = FileImage::new(&path);
        assert!(image.exists());
        assert_eq!(image.read_bytes(), Some(b"GIF89a\x01".to_vec()));
    }

    #[test]
    fn test_unreachable_url() {
        assert!(read_resource("http://127.0.0.1:1/x.png").is_none());
    }

    /// Serve one canned HTTP response on a local port.
    #[cfg(feature = "remote")]
    fn serve_once(response: &'static [u8]) -> String {
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let _ = stream.write_all(response);
        });
        format!("http://{addr}/image.gif")
    }

    #[cfg(feature = "remote")]
    #[test]
    fn test_fetch_url_success() {
        let url = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 6\r\nConnection: close\r\n\r\nGIF89a");
        assert_eq!(read_resource(&url), Some(b"GIF89a".to_vec()));
    }

    #[cfg(feature = "remote")]
    #[test]
    fn test_fetch_url_error_status() {
        let url = serve_once(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        assert!(read_resource(&url).is_none());
    }
}
