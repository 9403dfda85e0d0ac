use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    MissingCredential(String),
    BadIPFormatting(String),
    BadCategory(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::MissingCredential(e) => write!(f, "Missing credential: {}", e),
            ConfigError::BadIPFormatting(e) => write!(f, "IP formatting error: {}", e),
            ConfigError::BadCategory(e) => write!(f, "Category error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::TomlError(err.to_string())
    }
}

/// Failures raised while talking to the media server or the origin provider.
///
/// Each variant carries its own recovery policy:
/// - `UpstreamUnavailable`: retried on the next cycle with backoff
/// - `AuthError`: fatal when raised by a session fetch
/// - `ClassificationUnavailable`: the session is allowed for this cycle
/// - `EnforcementFailed`: logged, the session stays processed
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorError {
    UpstreamUnavailable(String),
    AuthError(String),
    ClassificationUnavailable(String),
    EnforcementFailed(String),
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::UpstreamUnavailable(e) => write!(f, "Media server unavailable: {}", e),
            MonitorError::AuthError(e) => write!(f, "Credentials rejected: {}", e),
            MonitorError::ClassificationUnavailable(e) => {
                write!(f, "Classification unavailable: {}", e)
            }
            MonitorError::EnforcementFailed(e) => write!(f, "Enforcement failed: {}", e),
        }
    }
}

impl std::error::Error for MonitorError {}

#[derive(Debug)]
pub enum LedgerError {
    ConnectionFailed,
    WriteFailed,
    ReadFailed,
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::ConnectionFailed => write!(f, "Ledger connection failed"),
            LedgerError::WriteFailed => write!(f, "Ledger write failed"),
            LedgerError::ReadFailed => write!(f, "Ledger read failed"),
        }
    }
}

impl std::error::Error for LedgerError {}

#[derive(Debug)]
pub enum WebError {
    BindFailed(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindFailed(e) => write!(f, "Web server bind failed: {}", e),
        }
    }
}

impl std::error::Error for WebError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    MonitorError(MonitorError),
    LedgerError(LedgerError),
    WebError(WebError),
    InitializationFailed(String),
    TaskFailed(String),
}

impl ControllerError {
    /// Process exit code matching this failure.
    ///
    /// Rejected media server credentials at runtime exit with `2`, everything
    /// that prevents startup exits with `1`.
    pub fn exit_code(&self) -> i32 {
        match self {
            ControllerError::MonitorError(MonitorError::AuthError(_)) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::MonitorError(e) => write!(f, "Monitor error: {}", e),
            ControllerError::LedgerError(e) => write!(f, "Ledger error: {}", e),
            ControllerError::WebError(e) => write!(f, "Web error: {}", e),
            ControllerError::InitializationFailed(e) => write!(f, "Initialization failed: {}", e),
            ControllerError::TaskFailed(e) => write!(f, "Background task failed: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<MonitorError> for ControllerError {
    fn from(err: MonitorError) -> Self {
        ControllerError::MonitorError(err)
    }
}

impl From<LedgerError> for ControllerError {
    fn from(err: LedgerError) -> Self {
        ControllerError::LedgerError(err)
    }
}

impl From<WebError> for ControllerError {
    fn from(err: WebError) -> Self {
        ControllerError::WebError(err)
    }
}
