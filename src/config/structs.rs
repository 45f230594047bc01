use serde::{Deserialize, Serialize};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// 静态配置（从 TOML 加载，启动时使用）
///
/// - server: 服务器地址、端口、CPU 数量
/// - database: 数据库连接与重试配置
/// - logging: 日志配置
/// - attribution: 点击与宏参数写入策略
/// - dispatch: 广告平台回传（超时、API 地址、上下文缓存）
/// - retry: 失败回传的重试调度
/// - api: 管理接口与代理配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub attribution: AttributionConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl StaticConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// 优先级：ENV > config.toml > 默认值
    /// ENV 前缀：ATTR，分隔符：__
    /// 示例：ATTR__SERVER__PORT=9999
    pub fn load(path: &str) -> Self {
        use config::{Config, Environment, File};

        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("ATTR")
                    .separator("__")
                    .try_parsing(true),
            );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<StaticConfig>() {
                Ok(config) => {
                    if std::path::Path::new(path).exists() {
                        eprintln!("[INFO] Configuration loaded from: {}", path);
                    }
                    config
                }
                Err(e) => {
                    eprintln!("[ERROR] Failed to deserialize config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("[ERROR] Failed to build config: {}", e);
                Self::default()
            }
        }
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config)
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_cpu_count")]
    pub cpu_count: usize,
}

/// 数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

/// Click / macro write policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionConfig {
    /// Allow `record_click` to replace an existing click with a different context
    #[serde(default)]
    pub allow_click_overwrite: bool,
    /// Conditional-update attempts for a contended macro merge
    #[serde(default = "default_macro_merge_max_attempts")]
    pub macro_merge_max_attempts: u32,
}

/// Outbound dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Per-call timeout for platform requests
    #[serde(default = "default_dispatch_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_facebook_api_base")]
    pub facebook_api_base: String,
    #[serde(default = "default_facebook_api_version")]
    pub facebook_api_version: String,
    #[serde(default = "default_google_api_base")]
    pub google_api_base: String,
    /// TTL of the campaign context cache
    #[serde(default = "default_context_cache_ttl_secs")]
    pub context_cache_ttl_secs: u64,
}

/// 失败回传的重试调度配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_enabled")]
    pub enabled: bool,
    #[serde(default = "default_retry_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_retry_max_delay_secs")]
    pub max_delay_secs: u64,
    #[serde(default = "default_retry_batch_size")]
    pub batch_size: u64,
    /// Conversions older than this with no dispatch record are dispatched
    /// by the scheduler
    #[serde(default = "default_retry_unrecorded_grace_secs")]
    pub unrecorded_grace_secs: u64,
}

/// API 配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    /// Bearer token for `/api`; empty disables the admin API
    #[serde(default)]
    pub admin_token: String,
    /// Proxies whose X-Forwarded-For is trusted (IP or CIDR)
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

// ============================================================
// Default value functions for static config
// ============================================================

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_cpu_count() -> usize {
    num_cpus::get()
}

fn default_database_url() -> String {
    "attributor.db".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

fn default_macro_merge_max_attempts() -> u32 {
    8
}

fn default_dispatch_timeout_ms() -> u64 {
    5000
}

fn default_facebook_api_base() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_facebook_api_version() -> String {
    "v17.0".to_string()
}

fn default_google_api_base() -> String {
    "https://www.googleadservices.com".to_string()
}

fn default_context_cache_ttl_secs() -> u64 {
    60
}

fn default_retry_enabled() -> bool {
    true
}

fn default_retry_interval_secs() -> u64 {
    30
}

fn default_retry_max_attempts() -> u32 {
    5
}

fn default_retry_base_delay_secs() -> u64 {
    60
}

fn default_retry_max_delay_secs() -> u64 {
    3600
}

fn default_retry_batch_size() -> u64 {
    100
}

fn default_retry_unrecorded_grace_secs() -> u64 {
    300
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            cpu_count: default_cpu_count(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_database_pool_size(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            allow_click_overwrite: false,
            macro_merge_max_attempts: default_macro_merge_max_attempts(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_dispatch_timeout_ms(),
            facebook_api_base: default_facebook_api_base(),
            facebook_api_version: default_facebook_api_version(),
            google_api_base: default_google_api_base(),
            context_cache_ttl_secs: default_context_cache_ttl_secs(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_retry_enabled(),
            interval_secs: default_retry_interval_secs(),
            max_attempts: default_retry_max_attempts(),
            base_delay_secs: default_retry_base_delay_secs(),
            max_delay_secs: default_retry_max_delay_secs(),
            batch_size: default_retry_batch_size(),
            unrecorded_grace_secs: default_retry_unrecorded_grace_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_config_round_trips() {
        let sample = StaticConfig::generate_sample_config();
        assert!(sample.contains("[dispatch]"));
        assert!(sample.contains("[retry]"));

        let parsed: StaticConfig = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.server.port, 8080);
        assert_eq!(parsed.retry.max_attempts, 5);
        assert_eq!(parsed.dispatch.facebook_api_version, "v17.0");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: StaticConfig = toml::from_str(
            r#"
            [dispatch]
            timeout_ms = 1500

            [attribution]
            allow_click_overwrite = true
            "#,
        )
        .unwrap();

        assert_eq!(parsed.dispatch.timeout_ms, 1500);
        assert_eq!(parsed.dispatch.google_api_base, "https://www.googleadservices.com");
        assert!(parsed.attribution.allow_click_overwrite);
        assert_eq!(parsed.attribution.macro_merge_max_attempts, 8);
        assert!(parsed.api.admin_token.is_empty());
    }
}
