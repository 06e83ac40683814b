//! Default configuration values

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "baton.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "baton.yaml";

/// Directory (per repo and per package) holding Baton state
pub const STATE_DIR: &str = ".baton";

/// Default local cache directory, relative to the repo root
pub const DEFAULT_CACHE_DIR: &str = ".baton/cache";

/// Default environment variable holding the remote cache token
pub const DEFAULT_TOKEN_ENV: &str = "BATON_TOKEN";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".baton.toml",
        ".baton.yaml",
    ]
}

/// Default task concurrency: available parallelism, never below 10
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .max(10)
}
