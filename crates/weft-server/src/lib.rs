//! weft-server — HTTP serving for weft scripts.
//!
//! Bridges inbound HTTP requests to script executions and static files:
//!
//! ```text
//! HTTP client
//!   │
//!   ▼
//! hyper listener (task per connection)
//!   │
//!   ├── RequestDispatcher (Single / Multi / Hierarchical)
//!   │     ├── PathResolver → ScriptTable → ScriptUnit::execute()
//!   │     └── StaticFileServer under the tri-state policy
//!   │
//!   ├── ResponseLogger (one line per response)
//!   ▼
//! HTTP response
//! ```

pub mod dispatch;
pub mod logger;
pub mod resolve;
pub mod server;
pub mod static_files;

pub use dispatch::{RequestDispatcher, WireResponse};
pub use resolve::{PathResolver, Resolution, normalize_path};
pub use server::{BoundServer, HttpServer};
pub use static_files::{StaticFileServer, StaticReply};
