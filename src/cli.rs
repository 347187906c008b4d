use clap::Parser;

use crate::config::Config;

#[derive(Parser, Debug, Clone, Default)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_NAME"),
    long_about = "Kills MySQL queries and transactions that run for too long"
)]
pub struct CliArguments {
    /// Force dry-run mode for every database
    #[arg(long)]
    pub safe_mode: bool,

    /// Print the effective configuration with secrets redacted and exit
    #[arg(long)]
    pub show_config: bool,

    /// Log level: TRACE, DEBUG, INFO, WARN, ERROR or FATAL
    #[arg(long = "log.level", alias = "log-level")]
    pub log_level: Option<String>,

    /// Log format: JSON or TEXT
    #[arg(long = "log.format", alias = "log-format")]
    pub log_format: Option<String>,

    /// Include source file and line in log output
    #[arg(long = "log.include_caller", alias = "log-include-caller")]
    pub log_include_caller: bool,
}

impl CliArguments {
    /// Flags only ever switch things on, so an absent flag keeps whatever the
    /// file or environment chose.
    pub fn apply(&self, config: &mut Config) {
        if self.safe_mode {
            config.safe_mode = true;
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.log.format = format.clone();
        }
        if self.log_include_caller {
            config.log.include_caller = true;
        }
    }
}
