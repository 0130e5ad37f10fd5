/// Configuration loading.
///
/// Layered on the `config` crate the way the teacher does (`config::Config`
/// over a file source), generalized to a typed `AppConfig` because this
/// service's shape (key manager, per-chain list, alert sink) is richer than
/// the teacher's flat key lookups. A `once_cell::sync::OnceCell` holds the
/// resolved config as process-wide state, mirroring `get_global_config`.
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::collections::HashMap;

static GLOBAL_CONFIG: OnceCell<AppConfig> = OnceCell::new();

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub key_manager: KeyManagerConfig,
    pub storage: StorageConfig,
    pub chains: Vec<ChainConfig>,
    pub alert: AlertConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "key_type", rename_all = "lowercase")]
pub enum KeyManagerConfig {
    Local {
        hmac_key: String,
        /// chain_id -> hex-encoded ECDSA private key used to sign destination-chain txs
        signing_keys: HashMap<String, String>,
    },
    Aws {
        region: String,
        secret_name: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub dialect: Dialect,
    pub dsn: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Mysql,
    #[serde(alias = "sqlite3")]
    Sqlite3,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub id: String,
    pub name: String,
    pub provider: String,
    #[serde(default)]
    pub start_height: i64,
    pub confirm_num: i64,
    pub swap_agent_addr: String,
    #[serde(default)]
    pub explorer_url: String,
    #[serde(default = "default_max_track_retry")]
    pub max_track_retry: i64,
    #[serde(default = "default_fetch_interval")]
    pub observer_fetch_interval: u64,
}

fn default_max_track_retry() -> i64 {
    3
}

fn default_fetch_interval() -> u64 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    #[serde(default)]
    pub telegram_bot_token: String,
    #[serde(default)]
    pub telegram_chat_id: String,
    #[serde(default = "default_block_update_timeout")]
    pub block_update_timeout_secs: u64,
}

fn default_block_update_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LogConfig {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8090".to_string()
}

/// Entry-point CLI flags (spec.md §6).
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "xbridge-core")]
pub struct Cli {
    #[arg(long, value_enum, default_value = "local")]
    pub config_type: ConfigType,
    #[arg(long, default_value = "config.toml")]
    pub config_path: String,
    #[arg(long)]
    pub aws_region: Option<String>,
    #[arg(long)]
    pub aws_secret_key: Option<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum ConfigType {
    Local,
    Aws,
}

/// Load config for the given CLI invocation. Secret retrieval from AWS is
/// handled by the caller (main.rs) because it's async; this function only
/// reads the local file and merges environment overrides.
pub fn load_file_config(path: &str) -> Result<AppConfig, crate::error::BridgeError> {
    let raw = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(config::Environment::with_prefix("XBRIDGE").separator("__"))
        .build()
        .map_err(|e| crate::error::BridgeError::Config(format!("failed to build config: {e}")))?;

    raw.try_deserialize()
        .map_err(|e| crate::error::BridgeError::Config(format!("failed to deserialize config: {e}")))
}

pub fn init_global_config(config: AppConfig) -> Result<(), crate::error::BridgeError> {
    GLOBAL_CONFIG
        .set(config)
        .map_err(|_| crate::error::BridgeError::Config("config already initialized".to_string()))
}

pub fn get_global_config() -> &'static AppConfig {
    GLOBAL_CONFIG.get().unwrap_or_else(|| {
        eprintln!("FATAL: config not initialized - call init_global_config() first");
        std::process::exit(1);
    })
}

/// Resolve the HMAC key and per-chain signing keys, fetching them from AWS
/// Secrets Manager when the config says so (`util/config.go`'s key-manager
/// split, generalized).
pub async fn resolve_keys(cli: &Cli, cfg: &KeyManagerConfig) -> Result<ResolvedKeys, crate::error::BridgeError> {
    match cfg {
        KeyManagerConfig::Local { hmac_key, signing_keys } => Ok(ResolvedKeys {
            hmac_key: hmac_key.clone(),
            signing_keys: signing_keys.clone(),
        }),
        KeyManagerConfig::Aws { region, secret_name } => {
            let region = cli.aws_region.clone().unwrap_or_else(|| region.clone());
            let secret_name = cli.aws_secret_key.clone().unwrap_or_else(|| secret_name.clone());
            let shared_config = aws_config::from_env()
                .region(aws_config::Region::new(region))
                .load()
                .await;
            let client = aws_sdk_secretsmanager::Client::new(&shared_config);
            let resp = client
                .get_secret_value()
                .secret_id(secret_name)
                .send()
                .await
                .map_err(|e| crate::error::BridgeError::Config(format!("failed to fetch aws secret: {e}")))?;
            let payload = resp
                .secret_string()
                .ok_or_else(|| crate::error::BridgeError::Config("aws secret has no string payload".to_string()))?;

            let parsed: AwsSecretPayload = serde_json::from_str(payload)
                .map_err(|e| crate::error::BridgeError::Config(format!("malformed aws secret json: {e}")))?;

            Ok(ResolvedKeys {
                hmac_key: parsed.hmac_key,
                signing_keys: parsed.signing_keys,
            })
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct AwsSecretPayload {
    hmac_key: String,
    signing_keys: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedKeys {
    pub hmac_key: String,
    pub signing_keys: HashMap<String, String>,
}
