//! Configuration types for the DDNS updater
//!
//! A configuration is a list of declared records plus the global resolver,
//! store and engine settings. Records are immutable once loaded; every key
//! a record carries beyond the common fields lands in its credential map
//! and is interpreted by the provider adapter only.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Shortest allowed period between two update cycles
pub const MIN_PERIOD: Duration = Duration::from_secs(5);

/// Main DDNS configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DdnsConfig {
    /// Declared records
    pub records: Vec<RecordConfig>,

    /// Public IP resolution settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Record store configuration
    #[serde(default)]
    pub state_store: StateStoreConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl DdnsConfig {
    /// Create a new configuration with defaults
    pub fn new(records: Vec<RecordConfig>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.records.is_empty() {
            return Err(Error::config("No records configured"));
        }

        for record in &self.records {
            record.validate()?;
        }

        self.resolver.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// IP version a record is kept in sync with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IpVersion {
    /// IPv4 only, `A` records
    #[default]
    #[serde(rename = "ipv4", alias = "v4")]
    V4,
    /// IPv6 only, `AAAA` records
    #[serde(rename = "ipv6", alias = "v6")]
    V6,
    /// Whichever family the resolver produces first
    #[serde(rename = "ipv4 or ipv6", alias = "v4-or-v6")]
    V4OrV6,
}

impl IpVersion {
    /// Whether an address of this family satisfies the version
    pub fn accepts(self, ip: IpAddr) -> bool {
        match self {
            IpVersion::V4 => ip.is_ipv4(),
            IpVersion::V6 => ip.is_ipv6(),
            IpVersion::V4OrV6 => true,
        }
    }

    /// Unspecified address of the family, used when the provider picks the IP
    pub fn unspecified(self) -> IpAddr {
        match self {
            IpVersion::V6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            IpVersion::V4 | IpVersion::V4OrV6 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IpVersion::V4 => "ipv4",
            IpVersion::V6 => "ipv6",
            IpVersion::V4OrV6 => "ipv4 or ipv6",
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IpVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ipv4" | "v4" => Ok(IpVersion::V4),
            "ipv6" | "v6" => Ok(IpVersion::V6),
            "ipv4 or ipv6" | "v4-or-v6" => Ok(IpVersion::V4OrV6),
            other => Err(Error::config(format!("unknown ip version {other:?}"))),
        }
    }
}

/// Public IP resolution strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpStrategy {
    /// Ask a resolver that echoes the query source address
    Dns,
    /// Fetch an HTTPS echo endpoint
    Http,
    /// Enumerate local interface addresses
    Interface,
    /// Omit the IP and let the vendor use the request source address
    Provider,
}

impl IpStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            IpStrategy::Dns => "dns",
            IpStrategy::Http => "http",
            IpStrategy::Interface => "interface",
            IpStrategy::Provider => "provider",
        }
    }
}

impl fmt::Display for IpStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IpStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dns" => Ok(IpStrategy::Dns),
            "http" | "https" => Ok(IpStrategy::Http),
            "interface" => Ok(IpStrategy::Interface),
            "provider" => Ok(IpStrategy::Provider),
            other => Err(Error::config(format!(
                "unknown ip resolver strategy {other:?}, expected one of dns, http, interface, provider"
            ))),
        }
    }
}

/// IPv6 suffix used to synthesize a host address from the public prefix
///
/// Written as `<ipv6>/<bits>` where `bits` is the length of the suffix:
/// `::72ad:8fbb:a54e:bedd/64` keeps the upper 64 bits of the public address
/// and replaces the lower 64 bits with `72ad:8fbb:a54e:bedd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Suffix {
    addr: Ipv6Addr,
    bits: u8,
}

impl Ipv6Suffix {
    pub fn new(addr: Ipv6Addr, bits: u8) -> Result<Self> {
        if bits > 128 {
            return Err(Error::config(format!(
                "ipv6 suffix length {bits} exceeds 128 bits"
            )));
        }
        Ok(Self { addr, bits })
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Combine the prefix of `public` with the suffix bits
    pub fn apply(&self, public: Ipv6Addr) -> Ipv6Addr {
        if self.bits == 0 {
            return public;
        }
        let suffix_mask = if self.bits == 128 {
            u128::MAX
        } else {
            (1u128 << self.bits) - 1
        };
        let merged = (u128::from(public) & !suffix_mask) | (u128::from(self.addr) & suffix_mask);
        Ipv6Addr::from(merged)
    }

    /// Apply to any address; IPv4 addresses pass through unchanged
    pub fn apply_ip(&self, public: IpAddr) -> IpAddr {
        match public {
            IpAddr::V6(v6) => IpAddr::V6(self.apply(v6)),
            v4 => v4,
        }
    }
}

impl fmt::Display for Ipv6Suffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.bits)
    }
}

impl FromStr for Ipv6Suffix {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, bits) = s
            .split_once('/')
            .ok_or_else(|| Error::config(format!("ipv6 suffix {s:?} is missing its /bits")))?;
        let addr: Ipv6Addr = addr
            .parse()
            .map_err(|e| Error::config(format!("ipv6 suffix {s:?}: {e}")))?;
        let bits: u8 = bits
            .parse()
            .map_err(|e| Error::config(format!("ipv6 suffix {s:?}: {e}")))?;
        Self::new(addr, bits)
    }
}

impl Serialize for Ipv6Suffix {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ipv6Suffix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Declared DNS record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Provider name the record is updated through (e.g., "cloudflare")
    pub provider: String,

    /// Registrable domain name (e.g., "example.com")
    pub domain: String,

    /// Leaf label, `@` for the apex and `*` for a wildcard
    #[serde(default = "default_owner")]
    pub owner: String,

    /// IP family kept in sync
    #[serde(default)]
    pub ip_version: IpVersion,

    /// Optional IPv6 suffix applied to resolved IPv6 addresses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6_suffix: Option<Ipv6Suffix>,

    /// Hint for adapters with a proxy feature
    #[serde(default)]
    pub proxied: bool,

    /// Record TTL, vendor default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,

    /// Let the vendor use the request source address
    #[serde(default)]
    pub provider_ip: bool,

    /// Per-record override of the global strategy order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_strategy: Option<Vec<IpStrategy>>,

    /// Provider-scoped credentials and options
    #[serde(flatten)]
    pub credentials: Map<String, Value>,
}

fn default_owner() -> String {
    "@".to_string()
}

impl RecordConfig {
    /// Create a new record configuration for the apex of `domain`
    pub fn new(provider: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            domain: domain.into(),
            owner: default_owner(),
            ip_version: IpVersion::default(),
            ipv6_suffix: None,
            proxied: false,
            ttl: None,
            provider_ip: false,
            ip_strategy: None,
            credentials: Map::new(),
        }
    }

    /// Set the owner label
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Set the IP version
    pub fn with_ip_version(mut self, ip_version: IpVersion) -> Self {
        self.ip_version = ip_version;
        self
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Add a credential or provider option
    pub fn with_credential(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.credentials.insert(key.into(), value.into());
        self
    }

    /// Fully qualified name, the domain itself for the apex owner
    pub fn fqdn(&self) -> String {
        if self.owner == "@" {
            self.domain.clone()
        } else {
            format!("{}.{}", self.owner, self.domain)
        }
    }

    pub fn is_apex(&self) -> bool {
        self.owner == "@"
    }

    pub fn is_wildcard(&self) -> bool {
        self.owner == "*" || self.owner.starts_with("*.")
    }

    /// String credential, `None` when absent or empty
    pub fn credential(&self, key: &str) -> Option<&str> {
        match self.credentials.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    /// Boolean option, accepting JSON booleans and "true"/"false" strings
    pub fn credential_bool(&self, key: &str) -> Option<bool> {
        match self.credentials.get(key) {
            Some(Value::Bool(b)) => Some(*b),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
    }

    /// Identity used for logs, events and the store
    pub fn id(&self) -> RecordId {
        RecordId {
            provider: self.provider.clone(),
            domain: self.domain.clone(),
            owner: self.owner.clone(),
        }
    }

    /// Validate the fields shared by every provider
    pub fn validate(&self) -> Result<()> {
        if self.provider.is_empty() {
            return Err(Error::config(format!(
                "record {} has no provider",
                self.domain
            )));
        }
        validate_domain_name(&self.domain)?;
        validate_owner(&self.owner)?;
        if self.ipv6_suffix.is_some() && self.ip_version == IpVersion::V4 {
            return Err(Error::config(format!(
                "record {}: ipv6 suffix is set but ip version is ipv4",
                self.fqdn()
            )));
        }
        if let Some(strategies) = &self.ip_strategy {
            validate_strategies(strategies)?;
        }
        Ok(())
    }
}

/// Identity of a declared record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub provider: String,
    pub domain: String,
    pub owner: String,
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.owner == "@" {
            write!(f, "{} ({})", self.domain, self.provider)
        } else {
            write!(f, "{}.{} ({})", self.owner, self.domain, self.provider)
        }
    }
}

/// Public IP resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Strategies tried in order
    #[serde(default = "default_strategies")]
    pub strategies: Vec<IpStrategy>,

    /// Timeout for a single echo query (in seconds)
    #[serde(default = "default_resolver_timeout_secs")]
    pub timeout_secs: u64,

    /// Restrict interface enumeration to one interface name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
}

fn default_strategies() -> Vec<IpStrategy> {
    vec![IpStrategy::Dns, IpStrategy::Http]
}

fn default_resolver_timeout_secs() -> u64 {
    5
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            timeout_secs: default_resolver_timeout_secs(),
            interface: None,
        }
    }
}

impl ResolverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate the resolver configuration
    pub fn validate(&self) -> Result<()> {
        validate_strategies(&self.strategies)?;
        if self.timeout_secs == 0 {
            return Err(Error::config("resolver timeout must be > 0"));
        }
        Ok(())
    }
}

fn validate_strategies(strategies: &[IpStrategy]) -> Result<()> {
    if strategies.is_empty() {
        return Err(Error::config("ip resolver strategy list cannot be empty"));
    }
    for (i, strategy) in strategies.iter().enumerate() {
        if strategies[..i].contains(strategy) {
            return Err(Error::config(format!(
                "ip resolver strategy {strategy} is listed twice"
            )));
        }
    }
    Ok(())
}

/// State store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// JSON file store
    File {
        /// Path to the store file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,
}

impl StateStoreConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            StateStoreConfig::File { .. } => "file",
            StateStoreConfig::Memory => "memory",
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Period between two scheduled cycles (in seconds)
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,

    /// Timeout applied to every outbound HTTP request (in seconds)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Margin subtracted from the period to form the cycle deadline (in seconds)
    #[serde(default = "default_cycle_margin_secs")]
    pub cycle_margin_secs: u64,

    /// Maximum number of records updated concurrently, unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,

    /// Interval used to poll runtimes while shutting down (in milliseconds)
    #[serde(default = "default_shutdown_poll_ms")]
    pub shutdown_poll_ms: u64,

    /// Capacity of the event channel
    ///
    /// When full, new events are dropped with a warning log.
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            period_secs: default_period_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            cycle_margin_secs: default_cycle_margin_secs(),
            max_concurrency: None,
            shutdown_poll_ms: default_shutdown_poll_ms(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl EngineConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Deadline of one cycle: the period minus the margin, never below one second
    pub fn cycle_deadline(&self) -> Duration {
        let secs = self
            .period_secs
            .saturating_sub(self.cycle_margin_secs)
            .max(1);
        Duration::from_secs(secs)
    }

    pub fn shutdown_poll_interval(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_ms.max(1))
    }

    /// Validate the engine configuration
    pub fn validate(&self) -> Result<()> {
        if self.period() < MIN_PERIOD {
            return Err(Error::config(format!(
                "period must be at least {}s, got {}s",
                MIN_PERIOD.as_secs(),
                self.period_secs
            )));
        }
        if self.http_timeout_secs == 0 {
            return Err(Error::config("HTTP timeout must be > 0"));
        }
        if self.max_concurrency == Some(0) {
            return Err(Error::config("update concurrency must be > 0 when set"));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::config("event channel capacity must be > 0"));
        }
        Ok(())
    }
}

fn default_period_secs() -> u64 {
    300
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_cycle_margin_secs() -> u64 {
    1
}

fn default_shutdown_poll_ms() -> u64 {
    100
}

fn default_event_channel_capacity() -> usize {
    1000
}

/// Validate a domain name per RFC 1035 label rules
pub fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(Error::config("Domain name cannot be empty"));
    }

    // RFC 1035: 253 chars max
    if domain.len() > 253 {
        return Err(Error::config(format!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        )));
    }

    for label in domain.split('.') {
        validate_label(domain, label)?;
    }

    Ok(())
}

fn validate_owner(owner: &str) -> Result<()> {
    if owner.is_empty() {
        return Err(Error::config("Owner cannot be empty, use @ for the apex"));
    }
    if owner == "@" || owner == "*" {
        return Ok(());
    }
    let labels = owner.strip_prefix("*.").unwrap_or(owner);
    for label in labels.split('.') {
        validate_label(owner, label)?;
    }
    Ok(())
}

fn validate_label(name: &str, label: &str) -> Result<()> {
    if label.is_empty() {
        return Err(Error::config(format!("Name has empty label: '{}'", name)));
    }

    if label.len() > 63 {
        return Err(Error::config(format!(
            "Label too long: {} chars (max 63). Label: '{}'",
            label.len(),
            label
        )));
    }

    // Underscores appear in service labels, so they are let through
    if !label
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::config(format!(
            "Label contains invalid characters. Label: '{}'. \
            Valid: alphanumeric and hyphen only.",
            label
        )));
    }

    if label.starts_with('-') || label.ends_with('-') {
        return Err(Error::config(format!(
            "Label cannot start or end with hyphen. Label: '{}'",
            label
        )));
    }

    Ok(())
}
