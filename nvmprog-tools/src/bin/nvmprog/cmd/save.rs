use std::path::PathBuf;

use crate::util::common_options::LoadedOptions;

/// Save the memory of every core as an Intel HEX file
///
/// Everything up to the end of the highest ROM is saved. If the settings do not read
/// the device automatically, it is read first.
#[derive(clap::Parser)]
#[clap(verbatim_doc_comment)]
pub struct Cmd {
    /// The file to write
    path: PathBuf,
}

impl Cmd {
    pub fn run(self, options: &LoadedOptions) -> anyhow::Result<()> {
        let store = options.load_store()?;
        let mut session = options.attach(store.settings)?;
        session.open_device()?;

        if !session.target().is_mem_loaded() {
            session.read()?;
        }
        if !session.target().is_mem_loaded() {
            tracing::warn!("The device is readback protected, saving an empty image");
        }
        session.save_as_file(&self.path)?;

        options.detach(session)?;
        Ok(())
    }
}
