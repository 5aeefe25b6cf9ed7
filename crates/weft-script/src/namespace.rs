//! Per-run execution namespace.
//!
//! The capability object handed to a script for exactly one run. It owns
//! the output buffer, the response headers, the active text encoding, and
//! the cooperative-exit flag. A namespace is constructed immediately before
//! each run and discarded once headers and buffer are extracted — runs
//! never share one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use encoding_rs::{Encoding, UTF_8};
use tracing::{debug, trace, warn};

use crate::markup::{HtmlFormatter, MarkupFormatter, MarkupNode};

/// Header set every namespace starts from.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=UTF-8";

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

/// A value handed to `write`, dispatched by semantic kind.
#[derive(Debug, Clone)]
pub enum WriteValue {
    /// Plain text, encoded with the namespace's current encoding.
    Text(String),
    /// Parsed markup, serialized via the formatter.
    Markup(MarkupNode),
    /// Client-script code, serialized inside a script element.
    Script(String),
    /// Anything else: stringified, then handled as text.
    Other(String),
}

/// How a run ended. `Halted` (cooperative exit) is not an error — both
/// variants leave the accumulated headers and output intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Halted,
}

pub struct ExecutionNamespace {
    id: u64,
    script_name: String,
    encoding: &'static Encoding,
    formatter: Arc<dyn MarkupFormatter>,
    headers: Vec<(String, String)>,
    output: Vec<u8>,
    halted: bool,
}

impl std::fmt::Debug for ExecutionNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionNamespace")
            .field("id", &self.id)
            .field("script_name", &self.script_name)
            .field("encoding", &self.encoding.name())
            .field("headers", &self.headers)
            .field("output", &self.output)
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}

impl ExecutionNamespace {
    pub fn new(
        script_name: impl Into<String>,
        encoding: &'static Encoding,
        formatter: Arc<dyn MarkupFormatter>,
    ) -> Self {
        Self {
            id: NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed),
            script_name: script_name.into(),
            encoding,
            formatter,
            headers: vec![("Content-Type".to_string(), DEFAULT_CONTENT_TYPE.to_string())],
            output: Vec::new(),
            halted: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Append a value to the output buffer. Writes after `exit()` are
    /// dropped — a halted run flushes only what it already produced.
    pub fn write(&mut self, value: WriteValue, tag: Option<&str>) {
        if self.halted {
            trace!(run = self.id, "write after exit dropped");
            return;
        }
        match value {
            WriteValue::Text(text) | WriteValue::Other(text) => self.write_text(&text, tag),
            WriteValue::Markup(node) => {
                let node = match tag {
                    Some(tag) => self.formatter.wrap(node, tag),
                    None => node,
                };
                let serialized = self.formatter.serialize(&node);
                self.append(&serialized);
            }
            WriteValue::Script(code) => {
                let serialized = self.formatter.wrap_script(&code);
                self.append(&serialized);
            }
        }
    }

    /// Set a response header. Keys stay unique; a rewrite keeps the key's
    /// original position and takes the new value. No character validation
    /// is performed here — the wire layer decides what it can transmit.
    pub fn header(&mut self, key: &str, value: &str) {
        trace!(run = self.id, key, value, "header set");
        match self.headers.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.headers.push((key.to_string(), value.to_string())),
        }
    }

    /// Load an auxiliary resource. A stub by design: it always returns an
    /// empty result.
    pub fn load(&mut self, filename: &str, kind: Option<&str>) -> String {
        debug!(run = self.id, filename, kind, "load called (stub)");
        String::new()
    }

    /// Change a run setting. Only `encoding` is recognized; every other
    /// name is accepted silently and has no effect.
    pub fn set_setting(&mut self, name: &str, value: &str) {
        match name {
            "encoding" => match Encoding::for_label(value.as_bytes()) {
                Some(encoding) => {
                    debug!(run = self.id, encoding = encoding.name(), "encoding changed");
                    self.encoding = encoding;
                }
                None => {
                    warn!(
                        run = self.id,
                        label = value,
                        current = self.encoding.name(),
                        "unknown encoding label, keeping current encoding"
                    );
                }
            },
            other => debug!(run = self.id, setting = other, "unrecognized setting ignored"),
        }
    }

    /// Raise the cooperative-exit signal for this run.
    pub fn exit(&mut self) {
        debug!(run = self.id, script = %self.script_name, "script exiting");
        self.halted = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn into_parts(self) -> (Vec<(String, String)>, Vec<u8>) {
        (self.headers, self.output)
    }

    fn write_text(&mut self, text: &str, tag: Option<&str>) {
        match tag {
            // Literal string wrap, unlike the tree-level wrap for markup.
            Some(tag) => {
                let wrapped = format!("<{tag}>{text}</{tag}>");
                self.append(&wrapped);
            }
            None => self.append(text),
        }
    }

    fn append(&mut self, text: &str) {
        let (bytes, _, _) = self.encoding.encode(text);
        self.output.extend_from_slice(&bytes);
    }
}

impl Default for ExecutionNamespace {
    fn default() -> Self {
        Self::new("", UTF_8, Arc::new(HtmlFormatter))
    }
}
