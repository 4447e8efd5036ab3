use std::rc::Rc;

use colored::Colorize;
use nvmprog::flashing::FlashProgress;

use crate::util::common_options::LoadedOptions;
use crate::util::flash::CliProgressBars;
use crate::util::logging;

/// Erase every core of the device
///
/// This also lifts the readback protection.
#[derive(clap::Parser)]
#[clap(verbatim_doc_comment)]
pub struct Cmd {
    /// Do not show progress bars
    #[clap(long)]
    disable_progressbars: bool,
}

impl Cmd {
    pub fn run(self, options: &LoadedOptions) -> anyhow::Result<()> {
        let store = options.load_store()?;
        let mut session = options.attach(store.settings)?;
        session.open_device()?;

        let bars = (!self.disable_progressbars).then(|| Rc::new(CliProgressBars::new()));
        if let Some(bars) = &bars {
            session.set_progress(CliProgressBars::flash_progress(bars));
        }

        let result = session.recover();
        session.set_progress(FlashProgress::empty());
        drop(bars);

        // Keep whatever was erased, even if a core failed.
        options.detach(session)?;
        result?;

        logging::eprintln(format!("   {} all cores erased", "Recovered".green().bold()));
        Ok(())
    }
}
