mod cmd;
mod util;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use figment::providers::{Data, Env, Format as _, Json, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::util::common_options::DeviceOptions;
use crate::util::logging::{setup_logging, LevelFilter};

/// Settings read from `.nvmprog.*` files and `NVMPROG_*` environment variables.
///
/// Command line options take precedence over everything configured here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Config {
    /// Family of the simulated device.
    pub family: String,
    /// Serial number of the simulated device.
    pub serial_number: String,
    /// Intel HEX file holding the flash contents of the simulated device.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<PathBuf>,
    /// Location of the persisted settings store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<PathBuf>,
    /// Log level used when neither `--log-level` nor `RUST_LOG` is given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LevelFilter>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            family: "nRF52".to_owned(),
            serial_number: "682000001".to_owned(),
            state: None,
            store: None,
            log_level: None,
        }
    }
}

#[derive(clap::Parser)]
#[clap(
    name = "nvmprog",
    about = "Read, erase and program the non-volatile memory of multi-core microcontrollers",
    version
)]
struct Cli {
    /// Location for log file
    #[clap(long, global = true, help_heading = "LOG CONFIGURATION")]
    log_file: Option<PathBuf>,
    /// Log level of messages printed to the terminal. Overrides `RUST_LOG`.
    #[clap(
        long,
        global = true,
        value_enum,
        ignore_case = true,
        help_heading = "LOG CONFIGURATION"
    )]
    log_level: Option<LevelFilter>,

    #[clap(flatten)]
    device: DeviceOptions,

    #[clap(subcommand)]
    subcommand: Subcommand,
}

impl Cli {
    fn run(self, config: Config) -> Result<()> {
        let options = self.device.load(&config)?;
        match self.subcommand {
            Subcommand::Info(cmd) => cmd.run(&options),
            Subcommand::Read(cmd) => cmd.run(&options),
            Subcommand::Write(cmd) => cmd.run(&options),
            Subcommand::Recover(cmd) => cmd.run(&options),
            Subcommand::Save(cmd) => cmd.run(&options),
            Subcommand::Settings(cmd) => cmd.run(&options),
            Subcommand::Mru(cmd) => cmd.run(&options),
        }
    }
}

#[derive(clap::Subcommand)]
enum Subcommand {
    /// Show the cores of the connected device and their protection
    Info(cmd::info::Cmd),
    /// Read the memory of all cores
    Read(cmd::read::Cmd),
    /// Program firmware files into the device
    Write(cmd::write::Cmd),
    /// Erase all cores, lifting readback protection
    Recover(cmd::recover::Cmd),
    /// Save the device memory as an Intel HEX file
    Save(cmd::save::Cmd),
    /// Show or change the persisted settings
    Settings(cmd::settings::Cmd),
    /// Show the most recently used firmware files
    Mru(cmd::mru::Cmd),
}

/// The default location of the settings store.
fn default_store_location() -> Result<PathBuf> {
    let project_dirs = directories::ProjectDirs::from("", "nvmprog", "nvmprog")
        .context("the application storage directory could not be determined")?;
    Ok(project_dirs.data_dir().join("store.json"))
}

fn load_config() -> Result<Config> {
    // Paths to search for the configuration file.
    let mut paths = vec![PathBuf::from(".")];
    if let Some(home) = directories::UserDirs::new().map(|user| user.home_dir().to_path_buf()) {
        paths.push(home);
    }

    load_config_from(&paths, Env::prefixed("NVMPROG_"))
}

/// Merges the defaults with the configuration files found in `paths`, then with `env`.
///
/// Files in earlier paths are overridden by files in later ones.
fn load_config_from(paths: &[impl AsRef<Path>], env: Env) -> Result<Config> {
    let default_config = serde_json::to_string_pretty(&Config::default())?;
    let mut figment = Figment::from(Data::<Json>::string(&default_config));
    for path in paths {
        let path = path.as_ref();
        figment = figment
            .merge(Toml::file(path.join(".nvmprog.toml")))
            .merge(Json::file(path.join(".nvmprog.json")))
            .merge(Yaml::file(path.join(".nvmprog.yaml")))
            .merge(Yaml::file(path.join(".nvmprog.yml")));
    }

    let config = figment.merge(env).extract::<Config>()?;

    Ok(config)
}

fn main() -> Result<()> {
    let config = load_config().context("Failed to load configuration.")?;

    // Parse the commandline options.
    let matches = Cli::parse();

    let log_path = matches.log_file.clone();
    let _logger_guard = setup_logging(log_path.as_deref(), matches.log_level.or(config.log_level))
        .context("Failed to set up logging.")?;

    matches.run(config)
}
