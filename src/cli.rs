use clap::Parser;

use crate::config::Config;

/// Command line arguments; each overrides its environment counterpart
#[derive(Debug, Parser)]
#[command(name = "enrichd", about = "Resumable batch row-enrichment service")]
pub struct Cli {
    /// Directory of SQLite database files (overrides DATA_DIR)
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Listen address (overrides BIND_ADDR)
    #[arg(long)]
    pub bind: Option<String>,

    /// Log file directory (overrides LOG_DIR)
    #[arg(long)]
    pub log_dir: Option<String>,
}

impl Cli {
    pub fn apply(self, config: &mut Config) {
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(log_dir) = self.log_dir {
            config.log_dir = log_dir;
        }
    }
}
