//! Per-strategy request dispatch.
//!
//! One dispatcher is built at startup and shared by every connection:
//!
//! - **Single** — one script answers every verb on every path; its header
//!   map is never transmitted, the raw output buffer is the body.
//! - **Multi** — an explicit set of scripts, each bound once to its own
//!   normalized path; same raw-body behavior. An unbound path is a
//!   deterministic 404, never a fault.
//! - **Hierarchical** — GET resolves through the path resolver and falls
//!   back to static serving under the tri-state policy; HEAD performs
//!   static resolution only; other verbs answer 501.
//!
//! Dispatch is synchronous — script runs block — and is driven from the
//! listener through `spawn_blocking`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info};

use weft_core::StaticPolicy;
use weft_script::{EncodingSniffer, Interpreter, MarkupFormatter, ScriptUnit};

use crate::resolve::{PathResolver, Resolution, normalize_path};
use crate::static_files::{StaticFileServer, StaticReply};

/// A response ready for the wire: status, headers in emission order, body.
#[derive(Debug, Clone, PartialEq)]
pub struct WireResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl WireResponse {
    fn reason(status: u16) -> &'static str {
        match status {
            404 => "Not Found",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            _ => "Error",
        }
    }

    /// A minimal HTML error page in the manner of the stock handlers.
    pub fn error_page(status: u16) -> Self {
        let reason = Self::reason(status);
        let body = format!(
            "<!DOCTYPE HTML>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
             <title>Error response</title>\n</head>\n<body>\n\
             <h1>Error response</h1>\n<p>Error code: {status}</p>\n\
             <p>Message: {reason}.</p>\n</body>\n</html>\n"
        );
        Self {
            status,
            headers: vec![(
                "Content-Type".to_string(),
                "text/html; charset=utf-8".to_string(),
            )],
            body: body.into_bytes(),
        }
    }
}

enum Strategy {
    Single {
        unit: Arc<ScriptUnit>,
    },
    Multi {
        table: HashMap<String, Arc<ScriptUnit>>,
    },
    Hierarchical {
        resolver: PathResolver,
        statics: StaticFileServer,
        policy: StaticPolicy,
    },
}

pub struct RequestDispatcher {
    strategy: Strategy,
}

impl RequestDispatcher {
    /// One script for everything, regardless of path or verb.
    pub fn single(unit: Arc<ScriptUnit>) -> Self {
        info!(script = %unit.path().display(), "single-script dispatch");
        Self { strategy: Strategy::Single { unit } }
    }

    /// A fixed set of scripts, each reachable under its own path.
    pub fn multi(units: Vec<Arc<ScriptUnit>>) -> Self {
        let mut table = HashMap::new();
        for unit in units {
            let key = normalize_path(&format!("/{}", unit.path().display()));
            info!(path = %key, script = %unit.path().display(), "bound script");
            table.insert(key, unit);
        }
        Self { strategy: Strategy::Multi { table } }
    }

    /// Serve a directory tree of scripts with static fallback.
    pub fn hierarchical(
        root: PathBuf,
        policy: StaticPolicy,
        interpreter: Arc<dyn Interpreter>,
        formatter: Arc<dyn MarkupFormatter>,
        sniffer: Arc<dyn EncodingSniffer>,
    ) -> Self {
        info!(root = %root.display(), policy = policy.label(), "hierarchical dispatch");
        Self {
            strategy: Strategy::Hierarchical {
                resolver: PathResolver::new(root, interpreter, formatter, sniffer),
                statics: StaticFileServer::new(),
                policy,
            },
        }
    }

    /// Number of scripts currently bound.
    pub fn script_count(&self) -> usize {
        match &self.strategy {
            Strategy::Single { .. } => 1,
            Strategy::Multi { table } => table.len(),
            Strategy::Hierarchical { resolver, .. } => resolver.script_count(),
        }
    }

    /// Handle one request. Blocking for the duration of any script run.
    pub fn dispatch(&self, method: &str, path: &str) -> WireResponse {
        match &self.strategy {
            Strategy::Single { unit } => Self::run_raw(unit),
            Strategy::Multi { table } => {
                let normalized = normalize_path(path);
                match table.get(&normalized) {
                    Some(unit) => Self::run_raw(unit),
                    None => {
                        debug!(path = %normalized, "no script bound for path");
                        WireResponse::error_page(404)
                    }
                }
            }
            Strategy::Hierarchical { resolver, statics, policy } => {
                Self::dispatch_hierarchical(resolver, statics, *policy, method, path)
            }
        }
    }

    /// Single/Multi: all verbs identical, script headers never transmitted.
    fn run_raw(unit: &ScriptUnit) -> WireResponse {
        match unit.execute() {
            Ok(output) => WireResponse { status: 200, headers: Vec::new(), body: output.body },
            Err(err) => {
                error!(script = %unit.path().display(), error = %err, "script request failed");
                WireResponse::error_page(500)
            }
        }
    }

    /// Hierarchical: script headers are transmitted as-is.
    fn run_scripted(unit: &ScriptUnit) -> WireResponse {
        match unit.execute() {
            Ok(output) => WireResponse { status: 200, headers: output.headers, body: output.body },
            Err(err) => {
                error!(script = %unit.path().display(), error = %err, "script request failed");
                WireResponse::error_page(500)
            }
        }
    }

    fn dispatch_hierarchical(
        resolver: &PathResolver,
        statics: &StaticFileServer,
        policy: StaticPolicy,
        method: &str,
        path: &str,
    ) -> WireResponse {
        match method {
            "GET" => match resolver.resolve(path) {
                Resolution::Script(unit) => Self::run_scripted(&unit),
                Resolution::StaticFile(file) => {
                    Self::static_response(policy, || statics.serve_file(&file))
                }
                Resolution::Directory(dir) => Self::static_response(policy, || {
                    statics.serve_dir(&dir, &normalize_path(path))
                }),
                Resolution::NotFound => {
                    debug!(path, "nothing to serve");
                    WireResponse::error_page(404)
                }
            },
            // HEAD goes to the static collaborator only; scripts are not
            // consulted. The listener strips the body.
            "HEAD" => {
                let normalized = normalize_path(path);
                let relative = normalized.trim_start_matches('/');
                let candidate = if relative.is_empty() {
                    resolver.root().clone()
                } else {
                    resolver.root().join(relative)
                };
                if candidate.is_file() {
                    Self::static_response(policy, || statics.serve_file(&candidate))
                } else if candidate.is_dir() {
                    Self::static_response(policy, || {
                        statics.serve_dir(&candidate, &normalized)
                    })
                } else {
                    WireResponse::error_page(404)
                }
            }
            other => {
                debug!(method = other, "verb not handled by hierarchical dispatch");
                WireResponse::error_page(501)
            }
        }
    }

    fn static_response(
        policy: StaticPolicy,
        serve: impl FnOnce() -> StaticReply,
    ) -> WireResponse {
        if policy == StaticPolicy::Disabled {
            return WireResponse::error_page(404);
        }
        match serve() {
            StaticReply::File { content_type, body } => {
                if policy == StaticPolicy::HtmlOnly && !content_type.starts_with("text/html") {
                    debug!(content_type = %content_type, "suppressed by html-only policy");
                    return WireResponse::error_page(404);
                }
                WireResponse {
                    status: 200,
                    headers: vec![("Content-Type".to_string(), content_type)],
                    body,
                }
            }
            StaticReply::NotFound => WireResponse::error_page(404),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_script::{ChardetngSniffer, HtmlFormatter, RhaiInterpreter};

    fn make_unit(path: PathBuf) -> Arc<ScriptUnit> {
        Arc::new(
            ScriptUnit::new(
                path,
                Arc::new(RhaiInterpreter::new()),
                Arc::new(HtmlFormatter),
                &ChardetngSniffer::new(),
            )
            .unwrap(),
        )
    }

    fn hierarchical(root: &std::path::Path, policy: StaticPolicy) -> RequestDispatcher {
        RequestDispatcher::hierarchical(
            root.to_path_buf(),
            policy,
            Arc::new(RhaiInterpreter::new()),
            Arc::new(HtmlFormatter),
            Arc::new(ChardetngSniffer::new()),
        )
    }

    #[test]
    fn single_answers_every_verb_and_path_with_the_raw_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("only.weft");
        std::fs::write(&path, r#"header("X-Hidden", "1"); write("payload");"#).unwrap();
        let dispatcher = RequestDispatcher::single(make_unit(path));

        for (method, path) in [("GET", "/"), ("POST", "/anything"), ("DELETE", "/x/y")] {
            let response = dispatcher.dispatch(method, path);
            assert_eq!(response.status, 200);
            assert_eq!(response.body, b"payload");
            // No header transmission in this strategy.
            assert!(response.headers.is_empty());
        }
    }

    #[test]
    fn multi_routes_by_normalized_path() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.weft");
        let b = dir.path().join("b.weft");
        std::fs::write(&a, r#"write("A");"#).unwrap();
        std::fs::write(&b, r#"write("B");"#).unwrap();
        let dispatcher = RequestDispatcher::multi(vec![make_unit(a.clone()), make_unit(b)]);

        let key = format!("/{}", a.display());
        let response = dispatcher.dispatch("GET", &key);
        assert_eq!(response.body, b"A");
        assert!(response.headers.is_empty());
    }

    #[test]
    fn multi_unbound_path_is_a_deterministic_404() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.weft");
        std::fs::write(&a, r#"write("A");"#).unwrap();
        let dispatcher = RequestDispatcher::multi(vec![make_unit(a)]);

        let response = dispatcher.dispatch("GET", "/unbound");
        assert_eq!(response.status, 404);
    }

    #[test]
    fn hierarchical_script_hit_carries_script_headers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("page.weft"),
            r#"header("X-Custom", "yes"); write("body");"#,
        )
        .unwrap();
        let dispatcher = hierarchical(dir.path(), StaticPolicy::All);

        let response = dispatcher.dispatch("GET", "/page");
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"body");
        assert!(response
            .headers
            .iter()
            .any(|(k, v)| k == "X-Custom" && v == "yes"));
        assert!(response
            .headers
            .iter()
            .any(|(k, v)| k == "Content-Type" && v == "text/html; charset=UTF-8"));
    }

    #[test]
    fn hierarchical_compile_failure_is_a_500_for_that_request_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.weft"), "write(").unwrap();
        std::fs::write(dir.path().join("good.weft"), r#"write("fine");"#).unwrap();
        let dispatcher = hierarchical(dir.path(), StaticPolicy::All);

        assert_eq!(dispatcher.dispatch("GET", "/bad").status, 500);
        let good = dispatcher.dispatch("GET", "/good");
        assert_eq!(good.status, 200);
        assert_eq!(good.body, b"fine");
    }

    #[test]
    fn static_policy_tri_state() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "plain").unwrap();
        std::fs::write(dir.path().join("page.html"), "<p>hi</p>").unwrap();

        let disabled = hierarchical(dir.path(), StaticPolicy::Disabled);
        assert_eq!(disabled.dispatch("GET", "/notes.txt").status, 404);
        assert_eq!(disabled.dispatch("GET", "/page.html").status, 404);

        let all = hierarchical(dir.path(), StaticPolicy::All);
        let txt = all.dispatch("GET", "/notes.txt");
        assert_eq!(txt.status, 200);
        assert_eq!(txt.body, b"plain");

        let html_only = hierarchical(dir.path(), StaticPolicy::HtmlOnly);
        assert_eq!(html_only.dispatch("GET", "/notes.txt").status, 404);
        let page = html_only.dispatch("GET", "/page.html");
        assert_eq!(page.status, 200);
        assert_eq!(page.body, b"<p>hi</p>");
    }

    #[test]
    fn html_only_admits_directory_listings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("files")).unwrap();
        std::fs::write(dir.path().join("files/data.bin"), [0u8; 4]).unwrap();

        let dispatcher = hierarchical(dir.path(), StaticPolicy::HtmlOnly);
        let listing = dispatcher.dispatch("GET", "/files");
        assert_eq!(listing.status, 200);
        assert!(String::from_utf8(listing.body).unwrap().contains("data.bin"));
        // The listed file itself stays gated.
        assert_eq!(dispatcher.dispatch("GET", "/files/data.bin").status, 404);
    }

    #[test]
    fn hierarchical_other_verbs_are_not_implemented() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = hierarchical(dir.path(), StaticPolicy::All);
        assert_eq!(dispatcher.dispatch("POST", "/").status, 501);
        assert_eq!(dispatcher.dispatch("PUT", "/x").status, 501);
    }

    #[test]
    fn head_resolves_statically_without_running_scripts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.html"), "<p>hi</p>").unwrap();
        std::fs::write(dir.path().join("page.weft"), r#"write("script");"#).unwrap();
        let dispatcher = hierarchical(dir.path(), StaticPolicy::All);

        let head = dispatcher.dispatch("HEAD", "/page.html");
        assert_eq!(head.status, 200);
        assert_eq!(head.body, b"<p>hi</p>");
        // The script was never bound.
        assert_eq!(dispatcher.script_count(), 0);
    }

    #[test]
    fn concurrent_first_bindings_stay_isolated() {
        let dir = tempfile::tempdir().unwrap();
        const N: usize = 8;
        for i in 0..N {
            std::fs::write(
                dir.path().join(format!("page{i}.weft")),
                format!(r#"write("page {i}");"#),
            )
            .unwrap();
        }
        let dispatcher = Arc::new(hierarchical(dir.path(), StaticPolicy::Disabled));

        let mut handles = Vec::new();
        for i in 0..N {
            let dispatcher = dispatcher.clone();
            handles.push(std::thread::spawn(move || {
                dispatcher.dispatch("GET", &format!("/page{i}"))
            }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            let response = handle.join().unwrap();
            assert_eq!(response.status, 200);
            assert_eq!(response.body, format!("page {i}").into_bytes());
        }
        assert_eq!(dispatcher.script_count(), N);
    }
}
