use std::collections::HashMap;

use anyhow::anyhow;
use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub balancer: BalancerConfig,
    #[serde(default)]
    pub upstreams: Vec<UpstreamConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 8080, worker_threads: Some(4) }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_addr")]
    pub addr: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self { addr: default_admin_addr() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { backend: StoreBackend::Memory, url: String::new(), command_timeout_ms: default_command_timeout() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_limited_routes")]
    pub routes: Vec<String>,
    /// Count with a single INCR+EXPIRE script instead of GET then INCR.
    #[serde(default)]
    pub atomic: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            routes: default_limited_routes(),
            atomic: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_auth_header")]
    pub header: String,
    #[serde(default = "default_bearer_prefix")]
    pub prefix: String,
    #[serde(default = "default_exclude_paths")]
    pub exclude_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: default_issuer(),
            header: default_auth_header(),
            prefix: default_bearer_prefix(),
            exclude_paths: default_exclude_paths(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_prefix")]
    pub prefix: String,
    #[serde(default = "default_lock_ttl")]
    pub default_ttl_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { prefix: default_lock_prefix(), default_ttl_secs: default_lock_ttl() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BalancerStrategy {
    #[default]
    HealthAware,
    Weighted,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BalancerConfig {
    #[serde(default)]
    pub strategy: BalancerStrategy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_admin_addr() -> String { "127.0.0.1:9188".to_string() }
fn default_command_timeout() -> u64 { 500 }
fn default_true() -> bool { true }
fn default_max_requests() -> u64 { 60 }
fn default_window_secs() -> u64 { 60 }
fn default_issuer() -> String { "eleme-springcloud".to_string() }
fn default_auth_header() -> String { "Authorization".to_string() }
fn default_bearer_prefix() -> String { "Bearer ".to_string() }
fn default_lock_prefix() -> String { "lock:".to_string() }
fn default_lock_ttl() -> u64 { 30 }

fn default_limited_routes() -> Vec<String> {
    ["/api/user/login", "/api/user/register", "/api/order/addUserOrder", "/api/payment"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_exclude_paths() -> Vec<String> {
    [
        "/api/user/login",
        "/api/user/register",
        "/api/captcha",
        "/api/business/getAll",
        "/api/business/getBusinessById",
        "/api/business/getBusinessByType",
        "/api/business/",
        "/api/food/getFoodById",
        "/api/food/getAllByIds",
        "/api/food/business/",
        "/api/notification/sendVerificationCode",
        "/actuator",
        "/health",
        "/swagger-ui",
        "/swagger-ui.html",
        "/swagger-resources",
        "/swagger-config",
        "/v3/api-docs",
        "/webjars",
        "/doc.html",
        "/favicon.ico",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// `CONFIG_PATH`, or `config.toml` in the working directory.
pub fn config_path() -> String {
    std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string())
}

/// Load from [`config_path`]. A missing file yields the defaults.
pub fn load_default() -> Result<AppConfig> {
    let path = config_path();
    if !std::path::Path::new(&path).exists() {
        return Ok(AppConfig::default());
    }
    load_from_file(&path)
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    pub fn load_and_validate() -> Result<Self> {
        let mut cfg = load_default()?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.server.normalize()?;
        // 若 TOML 中未提供 URL，则尝试从环境变量 REDIS_URL 填充
        self.store.normalize_from_env();
        self.auth.normalize_from_env();
        self.store.validate()?;
        self.rate_limit.validate()?;
        self.auth.validate()?;
        self.lock.validate()?;
        for up in &self.upstreams {
            if up.id.trim().is_empty() || up.address.trim().is_empty() {
                return Err(anyhow!("upstreams entries need both id and address"));
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl ServerConfig {
    fn normalize(&mut self) -> Result<()> {
        if self.host.trim().is_empty() {
            self.host = "127.0.0.1".to_string();
        }
        if self.port == 0 {
            return Err(anyhow!("server.port must be within 1..=65535"));
        }
        match self.worker_threads {
            Some(0) | None => self.worker_threads = Some(4),
            Some(_) => {}
        }
        Ok(())
    }
}

impl StoreConfig {
    pub fn normalize_from_env(&mut self) {
        if self.backend == StoreBackend::Redis && self.url.trim().is_empty() {
            if let Ok(url) = std::env::var("REDIS_URL") {
                self.url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.command_timeout_ms == 0 {
            return Err(anyhow!("store.command_timeout_ms must be positive"));
        }
        if self.backend != StoreBackend::Redis {
            return Ok(());
        }
        if self.url.trim().is_empty() {
            return Err(anyhow!("store.url is empty; set it in config.toml or REDIS_URL"));
        }
        let lower = self.url.to_lowercase();
        if !(lower.starts_with("redis://") || lower.starts_with("rediss://")) {
            return Err(anyhow!("store.url must start with redis:// or rediss://"));
        }
        Ok(())
    }
}

impl RateLimitConfig {
    fn validate(&self) -> Result<()> {
        if self.enabled && (self.max_requests == 0 || self.window_secs == 0) {
            return Err(anyhow!("rate_limit.max_requests and rate_limit.window_secs must be positive"));
        }
        Ok(())
    }
}

impl AuthConfig {
    pub fn normalize_from_env(&mut self) {
        if self.jwt_secret.trim().is_empty() {
            if let Ok(secret) = std::env::var("JWT_SECRET") {
                self.jwt_secret = secret;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.jwt_secret.trim().is_empty() {
            return Err(anyhow!("auth.jwt_secret is empty"));
        }
        if self.header.trim().is_empty() {
            return Err(anyhow!("auth.header is empty"));
        }
        Ok(())
    }
}

impl LockConfig {
    fn validate(&self) -> Result<()> {
        if self.default_ttl_secs == 0 {
            return Err(anyhow!("lock.default_ttl_secs must be positive"));
        }
        Ok(())
    }
}
