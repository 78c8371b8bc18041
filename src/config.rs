use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

#[cfg(feature = "config")]
use std::fs;

/// Environment type for configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Get environment from string
    pub fn from_str(env: &str) -> Self {
        match env.to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    /// Get environment name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "dev",
            Environment::Production => "prod",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub views: ViewConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub csrf: CsrfSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// View lookup, compilation and cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Core view root, searched first
    #[serde(default = "default_views_dir")]
    pub directory: String,
    /// Project view root, searched second
    #[serde(default)]
    pub project_directory: Option<String>,
    /// Directory whose `<package>/Views` subdirectories are searched last
    #[serde(default)]
    pub packages_directory: Option<String>,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    #[serde(default = "default_cache_dir")]
    pub cache_directory: String,
    /// Upper bound for `@while`, `@for` and `@do` iterations in a single loop
    #[serde(default = "default_max_loop_iterations")]
    pub max_loop_iterations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
    #[serde(default = "default_same_site")]
    pub same_site: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default = "default_exempt_routes")]
    pub exempt_routes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_csrf_exempt")]
    pub exempt_routes: Vec<String>,
    #[serde(default)]
    pub redirect_on_failure: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_views_dir() -> String {
    "views".to_string()
}
fn default_extension() -> String {
    "squehub.html".to_string()
}
fn default_cache_dir() -> String {
    "storage/cache/views".to_string()
}
fn default_max_loop_iterations() -> usize {
    10_000
}
fn default_true() -> bool {
    true
}
fn default_cookie_name() -> String {
    "squehub_session".to_string()
}
fn default_idle_timeout() -> u64 {
    900
}
fn default_same_site() -> String {
    "Lax".to_string()
}
fn default_exempt_routes() -> Vec<String> {
    Vec::new()
}
fn default_csrf_exempt() -> Vec<String> {
    vec!["/api/*".to_string()]
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            directory: default_views_dir(),
            project_directory: None,
            packages_directory: None,
            extension: default_extension(),
            cache_enabled: true,
            cache_directory: default_cache_dir(),
            max_loop_iterations: default_max_loop_iterations(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cookie_name: default_cookie_name(),
            idle_timeout: default_idle_timeout(),
            same_site: default_same_site(),
            secure: false,
            exempt_routes: default_exempt_routes(),
        }
    }
}

impl Default for CsrfSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            exempt_routes: default_csrf_exempt(),
            redirect_on_failure: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl AppConfig {
    /// Load `config.toml` and `config.<env>.toml` from the working directory
    #[cfg(feature = "config")]
    pub fn load() -> Result<Self> {
        Self::load_with_base_dir(".")
    }

    /// Load configuration from a specific base directory
    ///
    /// The environment file is merged over the base file at the TOML level,
    /// then `SQUEHUB_*` variables are applied on top.
    #[cfg(feature = "config")]
    pub fn load_with_base_dir<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        use serde_toml_merge::merge;

        let base_dir = base_dir.as_ref();
        let env = Self::detect_environment();

        let base_config_path = base_dir.join("config.toml");
        let mut merged_value = if base_config_path.exists() {
            Self::load_toml_value(&base_config_path)?
        } else {
            toml::Value::Table(toml::map::Map::new())
        };

        let env_config_path = base_dir.join(format!("config.{}.toml", env.as_str()));
        if env_config_path.exists() {
            log::debug!(
                "Loading environment-specific config from: {}",
                env_config_path.display()
            );
            let env_value = Self::load_toml_value(&env_config_path)?;
            merged_value = merge(merged_value, env_value).map_err(|e| {
                Error::config(format!("Failed to merge configuration files: {}", e))
            })?;
        }

        let json_value = serde_json::to_value(&merged_value).map_err(|e| {
            Error::config(format!("Failed to convert merged configuration: {}", e))
        })?;
        let mut config: AppConfig = serde_json::from_value(json_value).map_err(|e| {
            Error::config(format!("Failed to deserialize merged configuration: {}", e))
        })?;

        config.environment = env;
        config.apply_env_overrides()?;
        config.resolve_paths(base_dir);
        config.validate()?;

        log::info!(
            "Configuration loaded (environment: {})",
            config.environment.as_str()
        );
        Ok(config)
    }

    /// Load configuration from a single TOML file
    ///
    /// Relative view and cache paths are resolved against the file's directory.
    #[cfg(feature = "config")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let content = fs::read_to_string(path_ref).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}. Make sure the file exists and is readable.",
                path_ref.display(),
                e
            ))
        })?;

        let mut config: AppConfig = toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse config file '{}': {}. Check TOML syntax.",
                path_ref.display(),
                e
            ))
        })?;

        let parent = path_ref.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(parent);

        log::debug!("Loaded configuration from: {}", path_ref.display());
        Ok(config)
    }

    #[cfg(feature = "config")]
    fn load_toml_value(path: &Path) -> Result<toml::Value> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}. Make sure the file exists and is readable.",
                path.display(),
                e
            ))
        })?;

        toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse config file '{}': {}. Check TOML syntax.",
                path.display(),
                e
            ))
        })
    }

    /// Defaults with `SQUEHUB_*` environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = AppConfig::default();
        config.environment = Self::detect_environment();
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn detect_environment() -> Environment {
        env::var("SQUEHUB_ENV")
            .map(|env| Environment::from_str(&env))
            .unwrap_or_default()
    }

    /// Validate configuration for the current environment
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::config("Server port cannot be 0"));
        }
        if self.views.extension.trim_matches('.').is_empty() {
            return Err(Error::config("View extension cannot be empty"));
        }
        if self.views.max_loop_iterations == 0 {
            return Err(Error::config("views.max_loop_iterations must be positive"));
        }
        if self.session.cookie_name.is_empty() {
            return Err(Error::config("Session cookie name cannot be empty"));
        }

        if !Path::new(&self.views.directory).exists() {
            log::warn!("Views directory does not exist: {}", self.views.directory);
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(env) = env::var("SQUEHUB_ENV") {
            self.environment = Environment::from_str(&env);
        }
        if let Ok(host) = env::var("SQUEHUB_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("SQUEHUB_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| Error::config("Invalid SQUEHUB_PORT value"))?;
        }
        if let Ok(views_dir) = env::var("SQUEHUB_VIEWS_DIR") {
            self.views.directory = views_dir;
        }
        if let Ok(cache) = env::var("SQUEHUB_VIEW_CACHE") {
            self.views.cache_enabled = cache
                .parse()
                .map_err(|_| Error::config("Invalid SQUEHUB_VIEW_CACHE value"))?;
        }
        if let Ok(cache_dir) = env::var("SQUEHUB_CACHE_DIR") {
            self.views.cache_directory = cache_dir;
        }
        if let Ok(level) = env::var("SQUEHUB_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Make relative view and cache paths absolute against `base_dir`
    fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |value: &str| -> String {
            let path = PathBuf::from(value);
            if path.is_absolute() {
                value.to_string()
            } else {
                base_dir.join(path).to_string_lossy().into_owned()
            }
        };

        self.views.directory = resolve(&self.views.directory);
        self.views.cache_directory = resolve(&self.views.cache_directory);
        self.views.project_directory = self.views.project_directory.as_deref().map(resolve);
        self.views.packages_directory = self.views.packages_directory.as_deref().map(resolve);
    }

    /// Address string suitable for `Server::serve`
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
