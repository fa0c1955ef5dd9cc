use std::fmt;

/// Failure classes surfaced by the gateway.
///
/// `Transport` covers both per-transfer I/O failures and multiplexer-global
/// failures (the latter is indistinguishable to a caller — every active
/// transfer fails identically). `AdmissionRejected` is the only synchronous
/// error: it is returned before a transfer is ever created. `Cancelled` is
/// delivered only during gateway shutdown.
#[derive(Debug, Clone)]
pub enum GatewayError {
    Transport(String),
    AdmissionRejected { expected_size: u64, limit: u64 },
    Cancelled,
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Transport(msg) => write!(f, "transport error: {msg}"),
            GatewayError::AdmissionRejected {
                expected_size,
                limit,
            } => write!(
                f,
                "too big file for downloading: size {expected_size}, but limit is {limit}"
            ),
            GatewayError::Cancelled => write!(f, "request cancelled: gateway is shutting down"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Transport(e.to_string())
    }
}

/// One or more errors attached to a single completion. A failed request
/// surfaces a one-entry list; kept as a list rather than a single error so
/// retry exhaustion could, in principle, report the whole history.
#[derive(Debug, Clone)]
pub struct ErrorList(Vec<GatewayError>);

impl ErrorList {
    pub fn single(error: GatewayError) -> Self {
        Self(vec![error])
    }

    pub fn errors(&self) -> &[GatewayError] {
        &self.0
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {}
