//! Hierarchical request-path resolution.
//!
//! Maps a normalized request path to a script, a static candidate, a
//! directory, or nothing, probing the filesystem in ending order. Script
//! bindings go into the shared path table on first resolution and stay for
//! the life of the process; negative results are never cached.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tracing::{debug, error, info, trace};

use weft_core::{SUPPORTED_ENDINGS, has_script_ending};
use weft_script::{EncodingSniffer, Interpreter, MarkupFormatter, ScriptUnit};

/// What a request path resolved to.
pub enum Resolution {
    Script(Arc<ScriptUnit>),
    StaticFile(PathBuf),
    Directory(PathBuf),
    NotFound,
}

/// Posix-style normalization: collapses `.`/`..` and duplicate slashes.
/// The result always starts with `/` and can never climb above it.
pub fn normalize_path(raw: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    let mut normalized = String::from("/");
    normalized.push_str(&parts.join("/"));
    normalized
}

pub struct PathResolver {
    root: PathBuf,
    table: RwLock<HashMap<String, Arc<ScriptUnit>>>,
    interpreter: Arc<dyn Interpreter>,
    formatter: Arc<dyn MarkupFormatter>,
    sniffer: Arc<dyn EncodingSniffer>,
}

impl PathResolver {
    pub fn new(
        root: PathBuf,
        interpreter: Arc<dyn Interpreter>,
        formatter: Arc<dyn MarkupFormatter>,
        sniffer: Arc<dyn EncodingSniffer>,
    ) -> Self {
        Self {
            root,
            table: RwLock::new(HashMap::new()),
            interpreter,
            formatter,
            sniffer,
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Number of script bindings made so far.
    pub fn script_count(&self) -> usize {
        self.table.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Resolve a request path.
    ///
    /// Probe order: each supported ending in declared order, then the bare
    /// candidate. The first existing regular file wins; it is bound as a
    /// script when it carries a script ending, and is a static candidate
    /// otherwise. Directories get an `index` script probe before falling
    /// back to static handling.
    pub fn resolve(&self, request_path: &str) -> Resolution {
        let normalized = normalize_path(request_path);

        if let Some(unit) = self
            .table
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&normalized)
        {
            debug!(path = %normalized, "path already bound");
            return Resolution::Script(unit.clone());
        }

        let relative = normalized.trim_start_matches('/');
        let candidate = if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        };

        for ending in SUPPORTED_ENDINGS.iter().copied().chain([""]) {
            let probe = PathBuf::from(format!("{}{}", candidate.display(), ending));
            trace!(probe = %probe.display(), "probing");
            if probe.is_file() {
                if has_script_ending(&probe) {
                    return self.bind(&normalized, probe);
                }
                return Resolution::StaticFile(probe);
            }
        }

        if candidate.is_dir() {
            for ending in SUPPORTED_ENDINGS {
                let index = candidate.join(format!("index{ending}"));
                if index.is_file() {
                    return self.bind(&normalized, index);
                }
            }
            return Resolution::Directory(candidate);
        }

        Resolution::NotFound
    }

    fn bind(&self, normalized: &str, file: PathBuf) -> Resolution {
        let unit = match ScriptUnit::new(
            file,
            self.interpreter.clone(),
            self.formatter.clone(),
            self.sniffer.as_ref(),
        ) {
            Ok(unit) => unit,
            Err(err) => {
                error!(path = %normalized, error = %err, "failed to bind script");
                return Resolution::NotFound;
            }
        };

        // Racing binders may both construct a unit; the table keeps the
        // first insert and both observe the same one.
        let unit = self
            .table
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .entry(normalized.to_string())
            .or_insert_with(|| Arc::new(unit))
            .clone();
        info!(path = %normalized, script = %unit.path().display(), "bound script");
        Resolution::Script(unit)
    }
}
