//! Static-file collaborator: files, index documents, directory listings.

use std::path::Path;

use tracing::{debug, warn};

/// Outcome of a static resolution. The content type is this collaborator's
/// own determination; the dispatcher's html-only policy keys off it.
pub enum StaticReply {
    File { content_type: String, body: Vec<u8> },
    NotFound,
}

pub struct StaticFileServer;

impl StaticFileServer {
    pub fn new() -> Self {
        Self
    }

    /// Content type by file extension, `application/octet-stream` when
    /// nothing matches.
    pub fn content_type_for(path: &Path) -> String {
        mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }

    pub fn serve_file(&self, path: &Path) -> StaticReply {
        match std::fs::read(path) {
            Ok(body) => {
                let content_type = Self::content_type_for(path);
                debug!(path = %path.display(), content_type = %content_type, "serving static file");
                StaticReply::File { content_type, body }
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "static file unreadable");
                StaticReply::NotFound
            }
        }
    }

    /// Serve a directory: its index document when present, a generated
    /// listing otherwise. Listings are `text/html`, so the html-only
    /// policy admits them.
    pub fn serve_dir(&self, dir: &Path, request_path: &str) -> StaticReply {
        for index in ["index.html", "index.htm"] {
            let candidate = dir.join(index);
            if candidate.is_file() {
                return self.serve_file(&candidate);
            }
        }
        match self.listing(dir, request_path) {
            Ok(html) => StaticReply::File {
                content_type: "text/html; charset=utf-8".to_string(),
                body: html.into_bytes(),
            },
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "directory unreadable");
                StaticReply::NotFound
            }
        }
    }

    fn listing(&self, dir: &Path, request_path: &str) -> std::io::Result<String> {
        let mut entries: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_dir() {
                name.push('/');
            }
            entries.push(name);
        }
        entries.sort();

        let base = if request_path.ends_with('/') {
            request_path.to_string()
        } else {
            format!("{request_path}/")
        };
        let mut html = String::new();
        html.push_str("<!DOCTYPE HTML>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
        html.push_str(&format!("<title>Directory listing for {request_path}</title>\n"));
        html.push_str("</head>\n<body>\n");
        html.push_str(&format!("<h1>Directory listing for {request_path}</h1>\n<hr>\n<ul>\n"));
        for name in &entries {
            html.push_str(&format!("<li><a href=\"{base}{name}\">{name}</a></li>\n"));
        }
        html.push_str("</ul>\n<hr>\n</body>\n</html>\n");
        Ok(html)
    }
}

impl Default for StaticFileServer {
    fn default() -> Self {
        Self::new()
    }
}
