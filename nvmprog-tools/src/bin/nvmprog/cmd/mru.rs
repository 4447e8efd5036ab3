use crate::util::common_options::LoadedOptions;
use crate::util::logging;

/// Show the most recently used firmware files, most recent first
#[derive(clap::Parser)]
pub struct Cmd {
    /// Forget all entries
    #[clap(long)]
    clear: bool,
}

impl Cmd {
    pub fn run(self, options: &LoadedOptions) -> anyhow::Result<()> {
        let mut store = options.load_store()?;

        if self.clear {
            store.mru_files.clear();
            options.save_store(&store)?;
            return Ok(());
        }

        if store.mru_files.is_empty() {
            logging::eprintln("No files have been written yet.");
        }
        for (i, path) in store.mru_files.iter().enumerate() {
            logging::println(format!("{:>2}. {}", i + 1, path.display()));
        }
        Ok(())
    }
}
