//! ScriptUnit — one script file and its compiled-artifact cache.
//!
//! A unit owns the script's filesystem location, its sniffed source
//! encoding, and the fingerprint/artifact pair. Artifacts are expensive to
//! compile but cheap to reuse; the fingerprint (SHA-1 of the canonical
//! UTF-8 re-encoding of the source) decides when a recompile is due.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use sha1::{Digest, Sha1};
use tracing::{debug, info, warn};

use weft_core::{has_script_ending, preferred_ending};

use crate::encoding::EncodingSniffer;
use crate::error::{ScriptError, ScriptResult};
use crate::interpreter::{Artifact, Interpreter};
use crate::markup::MarkupFormatter;
use crate::namespace::{ExecutionNamespace, RunOutcome};

/// What one run produced: the final header map and the output buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutput {
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

struct CompiledState {
    fingerprint: Option<[u8; 20]>,
    artifact: Option<Artifact>,
}

pub struct ScriptUnit {
    path: PathBuf,
    encoding: &'static encoding_rs::Encoding,
    interpreter: Arc<dyn Interpreter>,
    formatter: Arc<dyn MarkupFormatter>,
    compiled: Mutex<CompiledState>,
    compile_count: AtomicU64,
}

impl ScriptUnit {
    /// Bind a script file. The source encoding is sniffed once, here.
    pub fn new(
        path: PathBuf,
        interpreter: Arc<dyn Interpreter>,
        formatter: Arc<dyn MarkupFormatter>,
        sniffer: &dyn EncodingSniffer,
    ) -> ScriptResult<Self> {
        if !has_script_ending(&path) {
            warn!(
                path = %path.display(),
                preferred = preferred_ending(),
                "script file does not carry a supported ending"
            );
        }
        let bytes = fs::read(&path)
            .map_err(|source| ScriptError::read(path.display().to_string(), source))?;
        let encoding = sniffer.sniff(&bytes);
        debug!(path = %path.display(), encoding = encoding.name(), "sniffed script encoding");
        Ok(Self {
            path,
            encoding,
            interpreter,
            formatter,
            compiled: Mutex::new(CompiledState { fingerprint: None, artifact: None }),
            compile_count: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn encoding_name(&self) -> &'static str {
        self.encoding.name()
    }

    /// Number of compiles performed so far. Unchanged source between two
    /// executes means an unchanged count.
    pub fn compile_count(&self) -> u64 {
        self.compile_count.load(Ordering::Relaxed)
    }

    /// Run the script once and return its headers and output.
    ///
    /// Re-reads the source on every call; a fingerprint match reuses the
    /// cached artifact, any mismatch (or absence) recompiles. The run
    /// itself happens against a namespace constructed fresh for this call.
    pub fn execute(&self) -> ScriptResult<ScriptOutput> {
        let name = self.path.display().to_string();

        let bytes = fs::read(&self.path).map_err(|source| ScriptError::read(&name, source))?;
        let source = self.encoding.decode(&bytes).0.into_owned();
        let fingerprint: [u8; 20] = Sha1::digest(source.as_bytes()).into();

        // The lock is held across compare-and-compile: concurrent executes
        // of this unit compile at most once per fingerprint.
        let artifact = {
            let mut state = self.compiled.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            match (&state.fingerprint, &state.artifact) {
                (Some(cached), Some(artifact)) if *cached == fingerprint => {
                    debug!(path = %name, fingerprint = %hex::encode(fingerprint), "reusing compiled artifact");
                    artifact.clone()
                }
                _ => {
                    let artifact = self.interpreter.compile(&name, &source)?;
                    self.compile_count.fetch_add(1, Ordering::Relaxed);
                    info!(path = %name, fingerprint = %hex::encode(fingerprint), "compiled script");
                    state.fingerprint = Some(fingerprint);
                    state.artifact = Some(artifact.clone());
                    artifact
                }
            }
        };

        let mut namespace = ExecutionNamespace::new(&name, self.encoding, self.formatter.clone());
        let outcome = self.interpreter.run(&name, &artifact, &mut namespace)?;
        if outcome == RunOutcome::Halted {
            debug!(path = %name, "script halted cooperatively");
        }

        let (headers, body) = namespace.into_parts();
        Ok(ScriptOutput { headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::ChardetngSniffer;
    use crate::engine::RhaiInterpreter;
    use crate::markup::HtmlFormatter;
    use crate::namespace::{DEFAULT_CONTENT_TYPE, WriteValue};
    use std::io::Write as _;

    /// Fake interpreter that "compiles" to the source text itself and
    /// echoes it on run, counting compiles.
    struct EchoInterpreter {
        compiles: AtomicU64,
    }

    impl EchoInterpreter {
        fn new() -> Self {
            Self { compiles: AtomicU64::new(0) }
        }
    }

    impl Interpreter for EchoInterpreter {
        fn compile(&self, _name: &str, source: &str) -> ScriptResult<Artifact> {
            self.compiles.fetch_add(1, Ordering::Relaxed);
            Ok(Artifact::new(source.to_string()))
        }

        fn run(
            &self,
            name: &str,
            artifact: &Artifact,
            namespace: &mut ExecutionNamespace,
        ) -> ScriptResult<RunOutcome> {
            let source = artifact
                .downcast_ref::<String>()
                .ok_or_else(|| ScriptError::execution(name, "bad artifact"))?;
            namespace.write(WriteValue::Text(source.clone()), None);
            namespace.header("X-Echo", "1");
            Ok(RunOutcome::Completed)
        }
    }

    fn write_script(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn unit_with(path: PathBuf, interpreter: Arc<dyn Interpreter>) -> ScriptUnit {
        ScriptUnit::new(
            path,
            interpreter,
            Arc::new(HtmlFormatter),
            &ChardetngSniffer::new(),
        )
        .unwrap()
    }

    #[test]
    fn unchanged_source_never_recompiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(&dir, "page.weft", "hello");
        let interp = Arc::new(EchoInterpreter::new());
        let unit = unit_with(path, interp.clone());

        let first = unit.execute().unwrap();
        let second = unit.execute().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.body, b"hello");
        assert_eq!(interp.compiles.load(Ordering::Relaxed), 1);
        assert_eq!(unit.compile_count(), 1);
    }

    #[test]
    fn source_change_forces_recompile() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(&dir, "page.weft", "before");
        let interp = Arc::new(EchoInterpreter::new());
        let unit = unit_with(path.clone(), interp.clone());

        assert_eq!(unit.execute().unwrap().body, b"before");
        std::fs::write(&path, "after").unwrap();
        assert_eq!(unit.execute().unwrap().body, b"after");
        assert_eq!(interp.compiles.load(Ordering::Relaxed), 2);
        assert_eq!(unit.compile_count(), 2);
    }

    #[test]
    fn runs_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(&dir, "page.weft", "once");
        let unit = unit_with(path, Arc::new(EchoInterpreter::new()));

        let first = unit.execute().unwrap();
        let second = unit.execute().unwrap();
        // Neither run observes the other's buffer or headers.
        assert_eq!(first.body, b"once");
        assert_eq!(second.body, b"once");
        assert_eq!(
            second.headers,
            vec![
                ("Content-Type".to_string(), DEFAULT_CONTENT_TYPE.to_string()),
                ("X-Echo".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(&dir, "page.weft", "x");
        let unit = unit_with(path.clone(), Arc::new(EchoInterpreter::new()));
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(unit.execute(), Err(ScriptError::Read { .. })));
    }

    #[test]
    fn rhai_end_to_end_exit_flushes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(&dir, "page.weft", r#"write("A"); exit(); write("B");"#);
        let unit = unit_with(path, Arc::new(RhaiInterpreter::new()));

        let output = unit.execute().unwrap();
        assert_eq!(output.body, b"A");
        assert_eq!(
            output.headers,
            vec![("Content-Type".to_string(), DEFAULT_CONTENT_TYPE.to_string())]
        );
    }

    #[test]
    fn rhai_compile_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(&dir, "bad.weft", "write(");
        let unit = unit_with(path, Arc::new(RhaiInterpreter::new()));
        assert!(matches!(unit.execute(), Err(ScriptError::Compile { .. })));
    }
}
