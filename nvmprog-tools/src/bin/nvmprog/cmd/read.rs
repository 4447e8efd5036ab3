use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Context;
use nvmprog::memory::SparseMemoryMap;

use crate::util::common_options::LoadedOptions;
use crate::util::logging;

/// Read the memory of every core
///
/// Prints a hex dump of the merged memory of all cores. Runs of erased bytes are left
/// out. Nothing is read if any core is readback protected.
#[derive(clap::Parser)]
#[clap(verbatim_doc_comment)]
pub struct Cmd {
    /// File to write the hex dump to instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

impl Cmd {
    pub fn run(self, options: &LoadedOptions) -> anyhow::Result<()> {
        let store = options.load_store()?;
        let mut session = options.attach(store.settings)?;
        session.open_device()?;

        let dump = hex_dump(session.read()?);
        if !session.target().is_mem_loaded() {
            anyhow::bail!(
                "The device is readback protected. Run `nvmprog recover` to erase it first."
            );
        }

        match self.output {
            Some(path) => std::fs::write(&path, dump)
                .with_context(|| format!("Failed to write {}", path.display()))?,
            None => logging::println(dump.trim_end()),
        }

        options.detach(session)?;
        Ok(())
    }
}

/// Formats `memory` as lines of 16 bytes, each starting with its address.
fn hex_dump(memory: &SparseMemoryMap) -> String {
    let mut dump = String::new();
    for (address, data) in memory.blocks() {
        for (i, line) in data.chunks(16).enumerate() {
            let _ = write!(dump, "{:08X}:", address + (i * 16) as u64);
            for byte in line {
                let _ = write!(dump, " {byte:02X}");
            }
            dump.push('\n');
        }
    }
    dump
}
