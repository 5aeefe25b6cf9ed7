//! weft-script — script units and their execution machinery.
//!
//! The pipeline for one request:
//!
//! ```text
//! ScriptUnit::execute()
//!   ├── read source, decode via sniffed encoding → canonical UTF-8
//!   ├── SHA-1 fingerprint → reuse or recompile the cached Artifact
//!   ├── build a fresh ExecutionNamespace (headers, buffer, encoding)
//!   └── Interpreter::run(artifact, namespace) → Completed | Halted
//! ```
//!
//! The interpreter substrate (Rhai) sits behind the [`Interpreter`] trait;
//! markup serialization and encoding detection sit behind their own traits
//! so tests can substitute all three.

pub mod encoding;
pub mod engine;
pub mod error;
pub mod interpreter;
pub mod markup;
pub mod namespace;
pub mod unit;

pub use encoding::{ChardetngSniffer, EncodingSniffer};
pub use engine::RhaiInterpreter;
pub use error::{ScriptError, ScriptResult};
pub use interpreter::{Artifact, Interpreter};
pub use markup::{HtmlFormatter, MarkupFormatter, MarkupNode};
pub use namespace::{DEFAULT_CONTENT_TYPE, ExecutionNamespace, RunOutcome, WriteValue};
pub use unit::{ScriptOutput, ScriptUnit};
