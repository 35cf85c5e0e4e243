use service_core::config::{self as core_config, env_or_default, parse_env};
use service_core::error::AppError;
use service_core::grpc::RetryConfig;
use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GRPC_PORT: u16 = 9090;
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_DOCS_PATH: &str = "./docs/auth_api.swagger.json";
pub const DEFAULT_GATEWAY_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_GATEWAY_DIAL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_GATEWAY_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub server: ServerConfig,
}

/// What happens to the sibling listener when one fails to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartupPolicy {
    /// Failures are logged; the other listener keeps serving.
    #[default]
    Independent,
    /// Any startup failure shuts the whole server down.
    AllOrNothing,
}

impl FromStr for StartupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "independent" => Ok(StartupPolicy::Independent),
            "all-or-nothing" | "all_or_nothing" => Ok(StartupPolicy::AllOrNothing),
            _ => Err(format!(
                "Invalid startup policy: {}. Expected 'independent' or 'all-or-nothing'",
                s
            )),
        }
    }
}

/// Listener settings owned by the lifecycle coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    pub grpc_port: u16,
    pub http_port: u16,
    pub docs_path: PathBuf,
    pub gateway_shutdown_timeout: Duration,
    /// How the gateway connects to the RPC listener. `max_retries == 0`
    /// means a single attempt.
    pub dial_retry: RetryConfig,
    /// Bound on each dial attempt, including the upstream readiness check.
    pub gateway_dial_timeout: Duration,
    pub gateway_request_timeout: Duration,
    pub grpc_reflection: bool,
    pub startup_policy: StartupPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            grpc_port: DEFAULT_GRPC_PORT,
            http_port: DEFAULT_HTTP_PORT,
            docs_path: PathBuf::from(DEFAULT_DOCS_PATH),
            gateway_shutdown_timeout: DEFAULT_GATEWAY_SHUTDOWN_TIMEOUT,
            dial_retry: RetryConfig::no_retry(),
            gateway_dial_timeout: DEFAULT_GATEWAY_DIAL_TIMEOUT,
            gateway_request_timeout: DEFAULT_GATEWAY_REQUEST_TIMEOUT,
            grpc_reflection: true,
            startup_policy: StartupPolicy::Independent,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let dial_retries: u32 = parse_env("GATEWAY_DIAL_RETRIES", 0)?;
        let config = ServerConfig {
            bind_address: parse_env("BIND_ADDRESS", IpAddr::V4(Ipv4Addr::UNSPECIFIED))?,
            grpc_port: parse_env("GRPC_PORT", DEFAULT_GRPC_PORT)?,
            http_port: parse_env("HTTP_PORT", DEFAULT_HTTP_PORT)?,
            docs_path: PathBuf::from(env_or_default("DOCS_PATH", DEFAULT_DOCS_PATH)),
            gateway_shutdown_timeout: Duration::from_secs(parse_env(
                "GATEWAY_SHUTDOWN_TIMEOUT_SECS",
                DEFAULT_GATEWAY_SHUTDOWN_TIMEOUT.as_secs(),
            )?),
            dial_retry: RetryConfig::with_max_retries(dial_retries),
            gateway_dial_timeout: Duration::from_millis(parse_env(
                "GATEWAY_DIAL_TIMEOUT_MS",
                DEFAULT_GATEWAY_DIAL_TIMEOUT.as_millis() as u64,
            )?),
            gateway_request_timeout: Duration::from_secs(parse_env(
                "GATEWAY_REQUEST_TIMEOUT_SECS",
                DEFAULT_GATEWAY_REQUEST_TIMEOUT.as_secs(),
            )?),
            grpc_reflection: parse_env("GRPC_REFLECTION", true)?,
            startup_policy: env_or_default("STARTUP_POLICY", "independent")
                .parse()
                .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.grpc_port != 0 && self.grpc_port == self.http_port {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "GRPC_PORT and HTTP_PORT must differ (both set to {})",
                self.grpc_port
            )));
        }
        if self.gateway_dial_timeout.is_zero() || self.gateway_request_timeout.is_zero() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "gateway dial and request timeouts must be non-zero"
            )));
        }
        Ok(())
    }

    /// Address the gateway dials to reach the RPC listener on `port`.
    ///
    /// A wildcard bind address is reached over loopback.
    pub fn rpc_endpoint(&self, port: u16) -> String {
        let host = match self.bind_address {
            ip if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            ip => ip,
        };
        match host {
            IpAddr::V4(v4) => format!("http://{}:{}", v4, port),
            IpAddr::V6(v6) => format!("http://[{}]:{}", v6, port),
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let log_level = env_or_default("LOG_LEVEL", &common.log_level);
        let otlp_endpoint = env::var("OTLP_ENDPOINT")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| common.otlp_endpoint.clone());

        Ok(AuthConfig {
            service_name: env_or_default("SERVICE_NAME", "auth-service"),
            service_version: env_or_default("SERVICE_VERSION", env!("CARGO_PKG_VERSION")),
            log_level,
            otlp_endpoint,
            server: ServerConfig::from_env()?,
            common,
        })
    }
}
