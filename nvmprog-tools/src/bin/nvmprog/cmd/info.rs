use colored::Colorize;
use nvmprog::ProtectionStatus;

use crate::util::common_options::LoadedOptions;
use crate::util::logging;

#[derive(clap::Parser)]
pub struct Cmd {}

impl Cmd {
    pub fn run(self, options: &LoadedOptions) -> anyhow::Result<()> {
        let store = options.load_store()?;
        let mut session = options.attach(store.settings)?;
        let device = session.open_device()?.clone();

        logging::println(format!(
            "{} {}, serial number {} (probe {})",
            "Device".green().bold(),
            device.family,
            device.serial_number,
            device.probe_serial()
        ));

        for core in &device.cores {
            let protection = match core.protection_status {
                ProtectionStatus::None => "none".green(),
                ProtectionStatus::Protected => "protected".red(),
                ProtectionStatus::Unknown => "unknown".yellow(),
            };
            logging::println(format!(
                "{:>12} core {} at {}",
                core.name.bold(),
                core.core_number,
                device.core_address(core)
            ));
            logging::println(format!(
                "{:>12} {:#010X}..{:#010X} in pages of {:#X} bytes",
                "ROM",
                core.rom_base_addr,
                core.rom_end(),
                core.page_size
            ));
            logging::println(format!("{:>12} {:#010X}", "UICR", core.uicr_base_addr));
            logging::println(format!("{:>12} {protection}", "Protection"));
        }

        if session.target().is_mem_loaded() {
            let memory = session.target().memory_map();
            logging::println(format!(
                "{:>12} {} bytes in {} blocks",
                "Memory",
                memory.byte_len(),
                memory.len()
            ));
        }
        logging::println(format!(
            "{:>12} {}",
            "Writable",
            session.target().is_writable()
        ));

        options.detach(session)?;
        Ok(())
    }
}
