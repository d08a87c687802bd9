//! Retryability classification for stage faults.
//!
//! Structured metadata (explicit flags, HTTP status codes, OS socket error
//! codes, timeout and rate-limit variants) always wins. Message substrings
//! are consulted only when a fault carries no structured signal at all.

use crate::error::{DossierError, GraphError, OracleError};

/// OS-level socket error names treated as transient.
const RETRYABLE_CODES: &[&str] = &[
    "ECONNRESET",
    "ECONNREFUSED",
    "ECONNABORTED",
    "ETIMEDOUT",
    "EPIPE",
    "ENETUNREACH",
    "EHOSTUNREACH",
    "EAI_AGAIN",
];

const RETRYABLE_PHRASES: &[&str] = &[
    "timeout",
    "timed out",
    "connection reset",
    "connection refused",
    "temporarily unavailable",
    "service unavailable",
    "rate limit",
    "too many requests",
    "try again",
];

/// Decide whether a fault is worth retrying.
pub fn classify(err: &DossierError) -> bool {
    match structured_signal(err) {
        Some(retryable) => retryable,
        None => message_signal(&err.to_string()),
    }
}

fn structured_signal(err: &DossierError) -> Option<bool> {
    match err {
        DossierError::Timeout { .. } => Some(true),
        DossierError::Research(fault) => {
            // The provider's own flag only speaks when no status or code does.
            let by_metadata = status_signal(fault.status).or_else(|| code_signal(fault.code.as_deref()));
            Some(by_metadata.unwrap_or(fault.retryable))
        }
        DossierError::Oracle(oracle) => match oracle {
            OracleError::Request { status, code, .. } => {
                status_signal(*status).or_else(|| code_signal(code.as_deref()))
            }
            OracleError::RateLimited { .. } => Some(true),
            OracleError::Auth(_) | OracleError::StructuredUnsupported(_) => Some(false),
            OracleError::InvalidResponse(_) => None,
        },
        DossierError::Graph(GraphError::NodeExecution { source, .. }) => {
            structured_signal(source)
        }
        DossierError::Suspension(_) | DossierError::Config(_) => Some(false),
        _ => None,
    }
}

fn status_signal(status: Option<u16>) -> Option<bool> {
    let status = status?;
    Some(matches!(status, 408 | 425 | 429) || (500..600).contains(&status))
}

fn code_signal(code: Option<&str>) -> Option<bool> {
    let code = code?;
    Some(RETRYABLE_CODES.iter().any(|c| c.eq_ignore_ascii_case(code)))
}

fn message_signal(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_PHRASES.iter().any(|p| lower.contains(p))
}

/// Find an OS socket error in `err` or its source chain and return its
/// conventional name (`ECONNRESET`, `EPIPE`, ...).
pub fn socket_error_code(err: &(dyn std::error::Error + 'static)) -> Option<&'static str> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(code) = e.downcast_ref::<std::io::Error>().and_then(|io| io_kind_code(io.kind())) {
            return Some(code);
        }
        current = e.source();
    }
    None
}

fn io_kind_code(kind: std::io::ErrorKind) -> Option<&'static str> {
    use std::io::ErrorKind::*;
    Some(match kind {
        ConnectionReset => "ECONNRESET",
        ConnectionRefused => "ECONNREFUSED",
        ConnectionAborted => "ECONNABORTED",
        TimedOut => "ETIMEDOUT",
        BrokenPipe => "EPIPE",
        NetworkUnreachable => "ENETUNREACH",
        HostUnreachable => "EHOSTUNREACH",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResearchError;

    #[test]
    fn timeout_is_retryable() {
        let err = DossierError::Timeout {
            stage: "research".into(),
            elapsed_ms: 30_000,
        };
        assert!(classify(&err));
    }

    #[test]
    fn server_errors_are_retryable() {
        for status in [500u16, 502, 503, 504, 429, 408] {
            let err: DossierError = OracleError::Request {
                message: "nope".into(),
                status: Some(status),
                code: None,
            }
            .into();
            assert!(classify(&err), "status {status}");
        }
    }

    #[test]
    fn client_errors_are_not_retryable() {
        for status in [400u16, 401, 403, 404, 422] {
            let err: DossierError = OracleError::Request {
                message: "service unavailable".into(),
                status: Some(status),
                code: None,
            }
            .into();
            // Status wins over the misleading message text.
            assert!(!classify(&err), "status {status}");
        }
    }

    #[test]
    fn socket_codes_are_consulted() {
        let reset: DossierError = OracleError::Request {
            message: "io".into(),
            status: None,
            code: Some("ECONNRESET".into()),
        }
        .into();
        assert!(classify(&reset));

        let other: DossierError = OracleError::Request {
            message: "timed out".into(),
            status: None,
            code: Some("EACCES".into()),
        }
        .into();
        assert!(!classify(&other));
    }

    #[test]
    fn research_flag_is_respected() {
        let err: DossierError = ResearchError::new("quota exhausted", false).into();
        assert!(!classify(&err));

        let err: DossierError = ResearchError::new("flaky", true).into();
        assert!(classify(&err));

        let err: DossierError = ResearchError::new("gateway", false).with_status(502).into();
        assert!(classify(&err));
    }

    #[test]
    fn research_status_overrides_flag() {
        for status in [401u16, 404] {
            let err: DossierError = ResearchError::new("lookup failed", true)
                .with_status(status)
                .into();
            assert!(!classify(&err), "status {status}");
        }

        let err: DossierError = ResearchError::new("socket", true)
            .with_code("EACCES")
            .into();
        assert!(!classify(&err));
    }

    #[test]
    fn falls_back_to_message_matching() {
        assert!(classify(&DossierError::Other("upstream timed out".into())));
        assert!(classify(&DossierError::Other("Connection reset by peer".into())));
        assert!(!classify(&DossierError::Other("missing field `status`".into())));
    }

    #[test]
    fn auth_and_rate_limit() {
        assert!(!classify(&OracleError::Auth("bad key".into()).into()));
        assert!(classify(
            &OracleError::RateLimited {
                retry_after_secs: Some(3)
            }
            .into()
        ));
    }

    #[test]
    fn node_execution_inherits_inner_signal() {
        let err: DossierError = GraphError::NodeExecution {
            node: "validator".into(),
            source: Box::new(OracleError::Auth("denied".into()).into()),
        }
        .into();
        assert!(!classify(&err));
    }

    #[derive(Debug)]
    struct Wrapped(std::io::Error);

    impl std::fmt::Display for Wrapped {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "transport failed")
        }
    }

    impl std::error::Error for Wrapped {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn socket_code_found_in_source_chain() {
        let err = Wrapped(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert_eq!(socket_error_code(&err), Some("ECONNRESET"));

        let err = Wrapped(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(socket_error_code(&err), None);
    }
}
