use clap::Parser;
use libra_config::Overrides;
use std::path::PathBuf;

/// Offline-first terminal reader for your e-book library.
#[derive(Debug, Parser)]
#[command(name = "libra-link", version, about)]
pub struct Cli {
    /// Read settings from this TOML file instead of the default location.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Where the database, session and imported books live.
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,
    /// Base URL of the libra-link server.
    #[arg(long, value_name = "URL")]
    pub api_base_url: Option<String>,
}
impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            config_file: self.config.clone(),
            data_dir: self.data_dir.clone(),
            api_base_url: self.api_base_url.clone(),
        }
    }
}
