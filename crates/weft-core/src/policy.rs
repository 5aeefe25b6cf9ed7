//! Static-serving policy and script endings.

use std::path::Path;

/// Endings recognized as weft scripts, in probe order.
/// The first entry is the preferred one.
pub const SUPPORTED_ENDINGS: [&str; 3] = [".weft", ".wefts", ".rhai"];

/// The recommended ending for weft scripts.
pub fn preferred_ending() -> &'static str {
    SUPPORTED_ENDINGS[0]
}

/// Whether a path names a weft script by its ending.
pub fn has_script_ending(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    SUPPORTED_ENDINGS.iter().any(|e| name.ends_with(e))
}

/// Gating of non-script file serving in the hierarchical strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticPolicy {
    /// Never serve non-script files.
    Disabled,
    /// Serve only files whose content type begins with `text/html`
    /// (directory listings included).
    HtmlOnly,
    /// Serve any file, with directory listings.
    All,
}

impl StaticPolicy {
    /// Derive the policy from the two CLI flags.
    ///
    /// Static serving is on by default; `--no-static-files` turns it off,
    /// and `--serve-html` re-admits HTML. `--serve-html` has no effect on
    /// its own, as HTML is already served by default.
    pub fn from_flags(no_static_files: bool, serve_html: bool) -> Self {
        if !no_static_files {
            StaticPolicy::All
        } else if serve_html {
            StaticPolicy::HtmlOnly
        } else {
            StaticPolicy::Disabled
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StaticPolicy::Disabled => "disabled",
            StaticPolicy::HtmlOnly => "html-only",
            StaticPolicy::All => "all",
        }
    }
}
