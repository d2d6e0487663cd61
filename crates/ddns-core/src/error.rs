//! Error types for the DDNS updater
//!
//! Every outcome of a provider or resolver call is folded into [`Error`].
//! The engine never inspects messages: it reads [`Error::kind`] and picks
//! its policy from the returned [`ErrorKind`].

use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

/// Result type alias for DDNS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DDNS updater
#[derive(Error, Debug)]
pub enum Error {
    /// Vendor rejected the credentials
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Vendor flagged the account or host for abuse
    #[error("banned for abuse: {0}")]
    Abuse(String),

    /// Vendor asked us to slow down
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Vendor refused our user agent
    #[error("user agent is banned: {0}")]
    BannedUserAgent(String),

    /// Hostname does not exist at the vendor
    #[error("hostname does not exist: {0}")]
    HostnameNotExists(String),

    /// Feature requires a paid plan
    #[error("feature unavailable: {0}")]
    FeatureUnavailable(String),

    /// Request was rejected as invalid
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Vendor DNS backend failed
    #[error("dns server side error: {0}")]
    DnsServerSide(String),

    /// Vendor says the IP we sent is invalid
    #[error("malformed sent ip: {0}")]
    MalformedSentIp(String),

    /// Response carried an IP we could not parse
    #[error("malformed received ip: {0}")]
    MalformedReceivedIp(String),

    /// Vendor confirmed a different IP than the one sent
    #[error("sent ip {sent} to update but received {received}")]
    IpMismatch {
        /// IP address sent in the update request
        sent: IpAddr,
        /// IP address echoed back by the vendor
        received: IpAddr,
    },

    /// Record lookup came back empty
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// Declared domain is not a zone at the vendor
    #[error("zone not found: {0}")]
    ZoneNotFound(String),

    /// Lookup returned an unexpected number of results
    #[error("unexpected result count: {0}")]
    ResultCount(String),

    /// Response did not match any known shape
    #[error("unknown response: {0}")]
    UnknownResponse(String),

    /// Non-success HTTP status without a more specific classification
    #[error("bad HTTP status {status}: {body}")]
    BadHttpStatus {
        /// HTTP status code
        status: u16,
        /// Response body, normalized to a single line
        body: String,
    },

    /// Network failure or timeout
    #[error("transport error: {0}")]
    Transport(String),

    /// The cycle was cancelled or ran past its deadline
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Record store errors
    #[error("state store error: {0}")]
    StateStore(String),

    /// Public IP resolution errors
    #[error("IP source error: {0}")]
    IpSource(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Classification of an [`Error`], used as a policy input by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Auth,
    Abuse,
    RateLimited,
    BannedUserAgent,
    HostnameNotExists,
    FeatureUnavailable,
    BadRequest,
    DnsServerSide,
    MalformedSentIp,
    MalformedReceivedIp,
    IpMismatch,
    RecordNotFound,
    ZoneNotFound,
    ResultCount,
    UnknownResponse,
    Transport,
    Cancelled,
    Config,
    Store,
    Resolver,
    Internal,
}

impl ErrorKind {
    /// Kebab-case name of the classification
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Abuse => "abuse",
            ErrorKind::RateLimited => "rate-limited",
            ErrorKind::BannedUserAgent => "banned-user-agent",
            ErrorKind::HostnameNotExists => "hostname-not-exists",
            ErrorKind::FeatureUnavailable => "feature-unavailable",
            ErrorKind::BadRequest => "bad-request",
            ErrorKind::DnsServerSide => "dns-server-side",
            ErrorKind::MalformedSentIp => "malformed-sent-ip",
            ErrorKind::MalformedReceivedIp => "malformed-received-ip",
            ErrorKind::IpMismatch => "ip-mismatch",
            ErrorKind::RecordNotFound => "record-not-found",
            ErrorKind::ZoneNotFound => "zone-not-found",
            ErrorKind::ResultCount => "result-count",
            ErrorKind::UnknownResponse => "unknown-response",
            ErrorKind::Transport => "transport",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Config => "config",
            ErrorKind::Store => "store",
            ErrorKind::Resolver => "resolver",
            ErrorKind::Internal => "internal",
        }
    }

    /// Whether the next tick is expected to succeed without a config change
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::DnsServerSide
                | ErrorKind::Transport
                | ErrorKind::Cancelled
                | ErrorKind::Resolver
                | ErrorKind::Store
        )
    }

    /// Whether every cycle will keep failing until the configuration changes
    pub fn is_persistent(self) -> bool {
        matches!(
            self,
            ErrorKind::Auth
                | ErrorKind::Abuse
                | ErrorKind::RateLimited
                | ErrorKind::BannedUserAgent
                | ErrorKind::HostnameNotExists
                | ErrorKind::FeatureUnavailable
                | ErrorKind::BadRequest
                | ErrorKind::MalformedSentIp
                | ErrorKind::ZoneNotFound
                | ErrorKind::Config
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Auth(_) => ErrorKind::Auth,
            Error::Abuse(_) => ErrorKind::Abuse,
            Error::RateLimited(_) => ErrorKind::RateLimited,
            Error::BannedUserAgent(_) => ErrorKind::BannedUserAgent,
            Error::HostnameNotExists(_) => ErrorKind::HostnameNotExists,
            Error::FeatureUnavailable(_) => ErrorKind::FeatureUnavailable,
            Error::BadRequest(_) => ErrorKind::BadRequest,
            Error::DnsServerSide(_) => ErrorKind::DnsServerSide,
            Error::MalformedSentIp(_) => ErrorKind::MalformedSentIp,
            Error::MalformedReceivedIp(_) => ErrorKind::MalformedReceivedIp,
            Error::IpMismatch { .. } => ErrorKind::IpMismatch,
            Error::RecordNotFound(_) => ErrorKind::RecordNotFound,
            Error::ZoneNotFound(_) => ErrorKind::ZoneNotFound,
            Error::ResultCount(_) => ErrorKind::ResultCount,
            Error::UnknownResponse(_) => ErrorKind::UnknownResponse,
            Error::BadHttpStatus { status, .. } => match status {
                401 | 403 => ErrorKind::Auth,
                429 => ErrorKind::RateLimited,
                500..=599 => ErrorKind::DnsServerSide,
                _ => ErrorKind::UnknownResponse,
            },
            Error::Transport(_) => ErrorKind::Transport,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::Config(_) => ErrorKind::Config,
            Error::StateStore(_) | Error::Io(_) => ErrorKind::Store,
            Error::IpSource(_) => ErrorKind::Resolver,
            Error::Json(_) => ErrorKind::UnknownResponse,
            Error::Other(_) => ErrorKind::Internal,
        }
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a bad request error
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create a hostname-not-exists error
    pub fn hostname_not_exists(msg: impl Into<String>) -> Self {
        Self::HostnameNotExists(msg.into())
    }

    /// Create a record-not-found error
    pub fn record_not_found(msg: impl Into<String>) -> Self {
        Self::RecordNotFound(msg.into())
    }

    /// Create a zone-not-found error
    pub fn zone_not_found(msg: impl Into<String>) -> Self {
        Self::ZoneNotFound(msg.into())
    }

    /// Create a result count error
    pub fn result_count(msg: impl Into<String>) -> Self {
        Self::ResultCount(msg.into())
    }

    /// Create an unknown response error
    pub fn unknown_response(msg: impl Into<String>) -> Self {
        Self::UnknownResponse(msg.into())
    }

    /// Create a malformed received IP error
    pub fn malformed_received_ip(msg: impl Into<String>) -> Self {
        Self::MalformedReceivedIp(msg.into())
    }

    /// Create a status error from a non-success response
    pub fn bad_status(status: u16, body: impl Into<String>) -> Self {
        Self::BadHttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a cancellation error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create an IP source error
    pub fn ip_source(msg: impl Into<String>) -> Self {
        Self::IpSource(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Transport(format!("request timed out: {}", err.without_url()));
        }
        // Strip the URL, it may carry credentials in its query string.
        Self::Transport(err.without_url().to_string())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
