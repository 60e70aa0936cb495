use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::rpc_request::RpcError;
use thiserror::Error;

/// Failure taxonomy for the guardian core.
///
/// `NotFound` is deliberately absent: missing accounts and mints are
/// represented as `None` return values, not errors.
#[derive(Debug, Error)]
pub enum GuardianError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited by {0}")]
    RateLimited(String),

    #[error("remote rejected request: {0}")]
    RemoteRejected(String),

    #[error("unexpected response shape: {0}")]
    Parse(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("operation timed out after {0} ms")]
    Timeout(u64),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("all {attempts} attempts failed, last error: {last}")]
    AllAttemptsFailed { attempts: u32, last: String },

    #[error("all price sources failed for {symbol}, last error: {last}")]
    AllSourcesFailed { symbol: String, last: String },

    #[error("consensus not reached: {0}")]
    ConsensusMissing(String),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

/// How a failed RPC attempt should be handled by the failover loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// DNS, TCP, TLS, HTTP 5xx, local I/O. Retry on the next client.
    Transport,
    /// HTTP 429 or an explicit throttle reply. Retry after backoff.
    RateLimited,
    /// The remote understood the request and said no.
    Definitive,
}

/// Classify a Solana client error for the retry/failover loop.
pub fn classify_client_error(error: &ClientError) -> ErrorClass {
    match error.kind() {
        ClientErrorKind::Io(_) => ErrorClass::Transport,
        ClientErrorKind::Reqwest(e) => {
            if e.status().map(|s| s.as_u16()) == Some(429) {
                ErrorClass::RateLimited
            } else {
                ErrorClass::Transport
            }
        }
        ClientErrorKind::RpcError(rpc) => match rpc {
            RpcError::RpcRequestError(msg) => {
                if is_rate_limit_message(msg) {
                    ErrorClass::RateLimited
                } else {
                    ErrorClass::Transport
                }
            }
            RpcError::RpcResponseError { .. } => ErrorClass::Definitive,
            RpcError::ParseError(_) => ErrorClass::Transport,
            RpcError::ForUser(_) => ErrorClass::Definitive,
        },
        ClientErrorKind::SerdeJson(_) => ErrorClass::Transport,
        _ => ErrorClass::Definitive,
    }
}

fn is_rate_limit_message(msg: &str) -> bool {
    msg.contains("429") || msg.to_lowercase().contains("too many requests")
}

/// Map a definitive RPC failure to the taxonomy, picking out the cases the
/// caller must see verbatim.
pub fn surface_client_error(error: ClientError) -> GuardianError {
    let msg = error.to_string();
    if msg.to_lowercase().contains("insufficient funds")
        || msg.to_lowercase().contains("insufficient lamports")
    {
        return GuardianError::InsufficientFunds(msg);
    }
    match classify_client_error(&error) {
        ErrorClass::Transport => GuardianError::Transport(msg),
        ErrorClass::RateLimited => GuardianError::RateLimited(msg),
        ErrorClass::Definitive => GuardianError::RemoteRejected(msg),
    }
}

impl From<reqwest::Error> for GuardianError {
    fn from(e: reqwest::Error) -> Self {
        if e.status().map(|s| s.as_u16()) == Some(429) {
            GuardianError::RateLimited(e.to_string())
        } else if e.is_decode() {
            GuardianError::Parse(e.to_string())
        } else {
            GuardianError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for GuardianError {
    fn from(e: serde_json::Error) -> Self {
        GuardianError::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_client::rpc_request::RpcRequest;

    fn rpc_error(kind: ClientErrorKind) -> ClientError {
        ClientError::new_with_request(kind, RpcRequest::GetBalance)
    }

    #[test]
    fn test_definitive_rpc_response_error() {
        let err = rpc_error(ClientErrorKind::RpcError(RpcError::RpcResponseError {
            code: -32002,
            message: "Transaction simulation failed".to_string(),
            data: solana_client::rpc_request::RpcResponseErrorData::Empty,
        }));
        assert_eq!(classify_client_error(&err), ErrorClass::Definitive);
    }

    #[test]
    fn test_request_error_is_transport() {
        let err = rpc_error(ClientErrorKind::RpcError(RpcError::RpcRequestError(
            "connection reset".to_string(),
        )));
        assert_eq!(classify_client_error(&err), ErrorClass::Transport);
    }

    #[test]
    fn test_429_in_request_error_is_rate_limited() {
        let err = rpc_error(ClientErrorKind::RpcError(RpcError::RpcRequestError(
            "HTTP status client error (429 Too Many Requests)".to_string(),
        )));
        assert_eq!(classify_client_error(&err), ErrorClass::RateLimited);
    }

    #[test]
    fn test_insufficient_funds_surfaces_distinctly() {
        let err = rpc_error(ClientErrorKind::RpcError(RpcError::ForUser(
            "Insufficient funds for transaction".to_string(),
        )));
        match surface_client_error(err) {
            GuardianError::InsufficientFunds(_) => {}
            other => panic!("expected InsufficientFunds, got {other:?}"),
        }
    }
}
