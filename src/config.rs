use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Longest draw cooldown accepted from config: one year.
pub const MAX_DRAW_COOLDOWN_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Parser, Debug)]
#[command(name = "photocard-market", about = "Photo-card marketplace backend")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub draw: DrawConfig,
    pub events: EventsConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

/// Points minigame tuning.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DrawConfig {
    pub cooldown_secs: u64,
    pub max_reward: i64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EventsConfig {
    /// Buffered events per subscriber before slow consumers start lagging
    pub capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 3600,
            max_reward: 100,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli)?;
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("market.db"));
        }

        if config.draw.max_reward < 0 {
            anyhow::bail!("draw.max_reward must not be negative");
        }
        if config.draw.cooldown_secs > MAX_DRAW_COOLDOWN_SECS {
            anyhow::bail!(
                "draw.cooldown_secs must be at most {}",
                MAX_DRAW_COOLDOWN_SECS
            );
        }
        if config.events.capacity == 0 {
            anyhow::bail!("events.capacity must be at least 1");
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> anyhow::Result<PathBuf> {
        match &cli.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::home_dir()
                .map(|home| home.join(".photocard-market"))
                .ok_or_else(|| anyhow::anyhow!("Could not determine home directory")),
        }
    }

    pub fn db_path(&self) -> Option<&PathBuf> {
        self.database.path.as_ref()
    }
}
