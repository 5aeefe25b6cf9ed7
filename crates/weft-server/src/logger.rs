//! Response logging.
//!
//! Every response produces exactly one line under the `weft::access`
//! target, carrying the request line, the numeric status, and the body
//! size. Severity follows the status class. Hyper itself does no
//! per-request logging, so no suppression is needed to keep the line
//! unique; connection-level failures log outside this target.

use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// 1xx/2xx → info, 3xx → warning, 4xx/5xx → error.
pub fn severity_for(status: u16) -> Severity {
    match status {
        100..=299 => Severity::Info,
        300..=399 => Severity::Warning,
        _ => Severity::Error,
    }
}

pub fn status_label(status: u16) -> &'static str {
    match status {
        100..=199 => "Info",
        200..=299 => "OK",
        300..=399 => "Redirect",
        400..=499 => "Client Error",
        _ => "Server Error",
    }
}

/// Emit the single access-log line for a finished response.
pub fn log_response(request_line: &str, status: u16, size: usize) {
    match severity_for(status) {
        Severity::Info => {
            info!(target: "weft::access", status, size, "{request_line} - {}", status_label(status));
        }
        Severity::Warning => {
            warn!(target: "weft::access", status, size, "{request_line} - {}", status_label(status));
        }
        Severity::Error => {
            error!(target: "weft::access", status, size, "{request_line} - {}", status_label(status));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn informational_and_success_are_info() {
        assert_eq!(severity_for(100), Severity::Info);
        assert_eq!(severity_for(200), Severity::Info);
        assert_eq!(severity_for(204), Severity::Info);
        assert_eq!(severity_for(299), Severity::Info);
    }

    #[test]
    fn redirects_are_warnings() {
        assert_eq!(severity_for(301), Severity::Warning);
        assert_eq!(severity_for(304), Severity::Warning);
    }

    #[test]
    fn client_and_server_errors_are_errors() {
        assert_eq!(severity_for(404), Severity::Error);
        assert_eq!(severity_for(500), Severity::Error);
        assert_eq!(severity_for(503), Severity::Error);
    }

    #[test]
    fn labels_follow_status_class() {
        assert_eq!(status_label(101), "Info");
        assert_eq!(status_label(200), "OK");
        assert_eq!(status_label(302), "Redirect");
        assert_eq!(status_label(404), "Client Error");
        assert_eq!(status_label(500), "Server Error");
    }
}
