use colored::Colorize;

use crate::util::common_options::LoadedOptions;
use crate::util::logging;

/// Show or change the persisted settings
#[derive(clap::Parser)]
pub struct Cmd {
    /// Read the device memory whenever it is opened or recovered
    #[clap(long, value_name = "BOOL")]
    auto_read: Option<bool>,
    /// Reset the device after writing
    #[clap(long, value_name = "BOOL")]
    auto_reset: Option<bool>,
}

impl Cmd {
    pub fn run(self, options: &LoadedOptions) -> anyhow::Result<()> {
        let mut store = options.load_store()?;

        if self.auto_read.is_some() || self.auto_reset.is_some() {
            if let Some(auto_read) = self.auto_read {
                store.settings.auto_read = auto_read;
            }
            if let Some(auto_reset) = self.auto_reset {
                store.settings.auto_reset = auto_reset;
            }
            options.save_store(&store)?;
        }

        logging::println(format!(
            "{} {}",
            "Settings".green().bold(),
            options.store_path().display()
        ));
        logging::println(format!("{:>12} {}", "autoRead", store.settings.auto_read));
        logging::println(format!("{:>12} {}", "autoReset", store.settings.auto_reset));
        Ok(())
    }
}
