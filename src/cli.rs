use crate::commands::{clouds, instance};
use crate::config::Settings;
use crate::errors::Result;
use clap::{Args, Parser, Subcommand};
use log::debug;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cloud-select")]
#[command(about = "Select compute instances across clouds by resource constraints")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every subcommand; each overrides the settings file
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Settings file (default ~/.cloud-select/settings.toml)
    #[arg(long, global = true, env = "CLOUD_SELECT_SETTINGS")]
    pub settings_file: Option<PathBuf>,

    /// Directory for cached catalogs
    #[arg(long, global = true)]
    pub cache_dir: Option<String>,

    /// Cache lifetime in hours, 0 disables the cache
    #[arg(long, global = true)]
    pub cache_expire: Option<u64>,

    /// Maximum results per cloud
    #[arg(long, global = true)]
    pub max_results: Option<usize>,

    /// Cloud to query (repeatable)
    #[arg(long = "cloud", global = true)]
    pub clouds: Vec<String>,

    /// Seconds to wait for all clouds, 0 waits forever
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Verbose logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Only log errors
    #[arg(long, global = true, conflicts_with = "debug")]
    pub quiet: bool,
}

impl GlobalArgs {
    /// Log filter for env_logger
    pub fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }

    pub fn apply(&self, settings: &mut Settings) {
        if let Some(dir) = &self.cache_dir {
            settings.cache_dir = Some(dir.clone());
        }
        if let Some(hours) = self.cache_expire {
            settings.cache_expire = hours;
        }
        if let Some(max) = self.max_results {
            settings.max_results = max;
        }
        if !self.clouds.is_empty() {
            settings.clouds = self.clouds.clone();
        }
        if let Some(secs) = self.timeout {
            settings.timeout_secs = secs;
        }
    }

    /// Settings file values with command line flags on top
    pub fn load_settings(&self) -> Result<Settings> {
        let mut settings = Settings::load(self.settings_file.as_deref())?;
        self.apply(&mut settings);
        settings.validate()?;
        debug!("Effective settings: {:?}", settings);
        Ok(settings)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Select instances matching resource constraints
    Instance(instance::InstanceArgs),
    /// List supported clouds
    Clouds,
}

pub async fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Instance(args) => {
            let settings = cli.global.load_settings()?;
            instance::handle_instance(args, settings).await
        }
        Commands::Clouds => clouds::handle_clouds(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_override_settings() {
        let cli = Cli::parse_from([
            "cloud-select",
            "--cloud",
            "google",
            "--max-results",
            "3",
            "--cache-expire",
            "0",
            "instance",
            "--cpu-min",
            "2",
        ]);

        let mut settings = Settings::default();
        cli.global.apply(&mut settings);

        assert_eq!(settings.clouds, vec!["google"]);
        assert_eq!(settings.max_results, 3);
        assert_eq!(settings.cache_expire, 0);
        assert_eq!(settings.timeout_secs, 60);
        assert_eq!(cli.global.log_level(), "info");
    }

    #[test]
    fn test_log_level() {
        let cli = Cli::parse_from(["cloud-select", "--debug", "clouds"]);
        assert_eq!(cli.global.log_level(), "debug");

        let cli = Cli::parse_from(["cloud-select", "clouds", "--quiet"]);
        assert_eq!(cli.global.log_level(), "error");

        assert!(Cli::try_parse_from(["cloud-select", "--debug", "--quiet", "clouds"]).is_err());
    }
}
