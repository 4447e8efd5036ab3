use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

use anyhow::Context;
use colored::Colorize;
use nvmprog::flashing::FlashProgress;

use crate::util::common_options::LoadedOptions;
use crate::util::flash::{print_report, CliProgressBars};
use crate::util::logging;

/// Program firmware files into the device
///
/// The files are merged, later files taking precedence where they overlap. Every core
/// receives the parts that fall into its ROM or UICR, in whole pages.
///
/// Writing requires the device to be erased or its memory to be read. If the memory has
/// not been read, it is read before writing. A protected device has to be recovered.
#[derive(clap::Parser)]
#[clap(verbatim_doc_comment)]
pub struct Cmd {
    /// Intel HEX files to write
    #[clap(required = true)]
    files: Vec<PathBuf>,
    /// Erase all cores before writing
    #[clap(long)]
    recover: bool,
    /// Do not show progress bars
    #[clap(long)]
    disable_progressbars: bool,
}

impl Cmd {
    pub fn run(self, options: &LoadedOptions) -> anyhow::Result<()> {
        let mut store = options.load_store()?;
        let mut session = options.attach(store.settings)?;

        for path in &self.files {
            session
                .load_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            store
                .mru_files
                .add(std::path::absolute(path).unwrap_or_else(|_| path.clone()));
        }
        options.save_store(&store)?;

        if let Some(mcuboot) = session.files().mcuboot_file_path() {
            tracing::info!("{} is an MCUboot image", mcuboot.display());
        }

        session.open_device()?;
        if !self.recover && !session.can_write() && !session.target().is_mem_loaded() {
            session.read()?;
        }
        if !self.recover && !session.can_write() {
            anyhow::bail!(
                "The device is readback protected or its state is unknown. Use --recover to erase it before writing."
            );
        }

        let bars = (!self.disable_progressbars).then(|| Rc::new(CliProgressBars::new()));
        if let Some(bars) = &bars {
            session.set_progress(CliProgressBars::flash_progress(bars));
        }

        let timer = Instant::now();
        let result = if self.recover {
            session.recover_and_write()
        } else {
            session.write()
        };
        session.set_progress(FlashProgress::empty());
        drop(bars);

        // The device may have been partially written, keep its state either way.
        options.detach(session)?;

        let report = match result {
            Ok(report) => report,
            Err(nvmprog::Error::ReopenFailed { report, source }) => {
                print_report(&report);
                return Err((*source).into());
            }
            Err(error) => return Err(error.into()),
        };
        print_report(&report);
        report.into_result()?;

        logging::eprintln(format!(
            "    {} in {:.02}s",
            "Finished".green().bold(),
            timer.elapsed().as_secs_f32(),
        ));
        Ok(())
    }
}
