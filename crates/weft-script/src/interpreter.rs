//! The interpreter seam.
//!
//! `ScriptUnit` talks to the script-execution substrate only through this
//! trait: compile source text into an opaque artifact, then run the
//! artifact against an execution namespace. The shipped implementation is
//! [`RhaiInterpreter`](crate::engine::RhaiInterpreter); tests substitute
//! their own.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::ScriptResult;
use crate::namespace::{ExecutionNamespace, RunOutcome};

/// An opaque compiled script. Cheap to clone; the concrete type is owned
/// by whichever interpreter produced it.
#[derive(Clone)]
pub struct Artifact {
    inner: Arc<dyn Any + Send + Sync>,
}

impl Artifact {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self { inner: Arc::new(value) }
    }

    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Artifact(..)")
    }
}

/// Compiles and runs scripts.
///
/// `run` is synchronous and blocking for the duration of the script. It
/// returns `Completed` on normal termination or `Halted` on the
/// namespace's cooperative-exit signal; in both cases the namespace holds
/// whatever headers and output accumulated.
pub trait Interpreter: Send + Sync {
    fn compile(&self, name: &str, source: &str) -> ScriptResult<Artifact>;

    fn run(
        &self,
        name: &str,
        artifact: &Artifact,
        namespace: &mut ExecutionNamespace,
    ) -> ScriptResult<RunOutcome>;
}
