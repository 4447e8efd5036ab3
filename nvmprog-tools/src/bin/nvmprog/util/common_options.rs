//! Options shared by all subcommands: which device to talk to and where state is kept.

use std::path::{Path, PathBuf};

use nvmprog::config::{Registry, RegistryError, Settings, SettingsError, Store};
use nvmprog::flashing::{hex, FlashError};
use nvmprog::{DeviceFamily, FakeProbe, ProbeError, Session};

use crate::Config;

/// Errors while preparing a device or the settings store.
#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum OperationError {
    /// The device family could not be resolved.
    Family(#[from] RegistryError),

    /// The device state '{path}' could not be accessed.
    State {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The device state '{path}' is not a valid Intel HEX file.
    StateFormat { path: PathBuf, source: FlashError },

    /// Readback protection could not be enabled.
    Protection(#[from] ProbeError),

    /// The settings store could not be accessed.
    Store(#[from] SettingsError),

    /// The location of the settings store could not be determined.
    StoreLocation(#[source] anyhow::Error),
}

/// Selects the simulated device.
///
/// Anything not given here is taken from the configuration.
#[derive(clap::Parser, Debug, Default)]
pub struct DeviceOptions {
    /// Family of the device, e.g. `nRF53`
    #[clap(long, global = true, help_heading = "DEVICE CONFIGURATION")]
    family: Option<String>,
    /// Serial number of the device
    #[clap(long, global = true, help_heading = "DEVICE CONFIGURATION")]
    serial_number: Option<String>,
    /// Intel HEX file holding the flash contents of the simulated device.
    ///
    /// The file is read before and written after every command. Without it the device
    /// starts out erased and forgets everything when the command ends.
    #[clap(long, global = true, help_heading = "DEVICE CONFIGURATION")]
    state: Option<PathBuf>,
    /// Cores of the simulated device that start out readback protected
    #[clap(
        long,
        global = true,
        value_name = "CORE",
        help_heading = "DEVICE CONFIGURATION"
    )]
    protect: Vec<String>,
    /// Location of the settings store
    #[clap(long, global = true, help_heading = "DEVICE CONFIGURATION")]
    store: Option<PathBuf>,
}

impl DeviceOptions {
    /// Resolves the options against the configuration.
    pub fn load(self, config: &Config) -> Result<LoadedOptions, OperationError> {
        let registry = Registry::from_builtin_families()?;
        let family_name = self.family.as_deref().unwrap_or(&config.family);
        let family = registry.family(family_name)?.clone();

        let store = match self.store.or_else(|| config.store.clone()) {
            Some(store) => store,
            None => crate::default_store_location().map_err(OperationError::StoreLocation)?,
        };

        Ok(LoadedOptions {
            family,
            serial_number: self
                .serial_number
                .unwrap_or_else(|| config.serial_number.clone()),
            state: self.state.or_else(|| config.state.clone()),
            protect: self.protect,
            store,
        })
    }
}

/// [`DeviceOptions`] with every choice made.
#[derive(Debug)]
pub struct LoadedOptions {
    family: DeviceFamily,
    serial_number: String,
    state: Option<PathBuf>,
    protect: Vec<String>,
    store: PathBuf,
}

impl LoadedOptions {
    /// The family of the simulated device.
    pub fn family(&self) -> &DeviceFamily {
        &self.family
    }

    /// Where the settings store lives.
    pub fn store_path(&self) -> &Path {
        &self.store
    }

    pub fn load_store(&self) -> Result<Store, OperationError> {
        Ok(Store::load(&self.store)?)
    }

    pub fn save_store(&self, store: &Store) -> Result<(), OperationError> {
        Ok(store.save(&self.store)?)
    }

    /// Connects to the simulated device, restoring its flash from the state file.
    pub fn attach(&self, settings: Settings) -> Result<Session<FakeProbe>, OperationError> {
        let mut probe = FakeProbe::new(&self.serial_number, &self.family);

        if let Some(path) = self.state.as_deref() {
            match std::fs::read_to_string(path) {
                Ok(text) => {
                    let image = hex::decode(&text).map_err(|source| OperationError::StateFormat {
                        path: path.to_owned(),
                        source,
                    })?;
                    tracing::debug!(
                        "Restored {} bytes from {}",
                        image.byte_len(),
                        path.display()
                    );
                    probe.load_memory_image(&image);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!("No device state at {}, starting erased", path.display());
                }
                Err(source) => {
                    return Err(OperationError::State {
                        path: path.to_owned(),
                        source,
                    })
                }
            }
        }

        for core in &self.protect {
            probe.set_protected(core, true)?;
        }

        Ok(Session::new(probe, settings))
    }

    /// Disconnects from the simulated device, writing its flash to the state file.
    pub fn detach(&self, session: Session<FakeProbe>) -> Result<(), OperationError> {
        let Some(path) = self.state.as_deref() else {
            return Ok(());
        };

        let image = session.into_probe().memory_image();
        let text = hex::encode(&image).map_err(|source| OperationError::StateFormat {
            path: path.to_owned(),
            source,
        })?;
        std::fs::write(path, text).map_err(|source| OperationError::State {
            path: path.to_owned(),
            source,
        })?;
        tracing::debug!("Stored {} bytes in {}", image.byte_len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvmprog::memory::SparseMemoryMap;
    use nvmprog::ProbeDriver;
    use pretty_assertions::assert_eq;

    fn options(dir: &Path, family: &str) -> LoadedOptions {
        DeviceOptions {
            family: Some(family.to_owned()),
            state: Some(dir.join("device.hex")),
            store: Some(dir.join("store.json")),
            ..Default::default()
        }
        .load(&Config::default())
        .unwrap()
    }

    #[test]
    fn family_falls_back_to_the_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = DeviceOptions {
            store: Some(dir.path().join("store.json")),
            ..Default::default()
        }
        .load(&Config {
            family: "nrf53".to_owned(),
            ..Config::default()
        })
        .unwrap();

        assert_eq!(loaded.family().name, "nRF53");
        assert_eq!(loaded.store_path(), dir.path().join("store.json"));
    }

    #[test]
    fn unknown_family_is_an_error() {
        let result = DeviceOptions {
            family: Some("STM32".to_owned()),
            ..Default::default()
        }
        .load(&Config::default());

        assert!(matches!(result, Err(OperationError::Family(_))));
    }

    #[test]
    fn device_state_survives_detach_and_attach() {
        let dir = tempfile::tempdir().unwrap();
        let options = options(dir.path(), "nRF52");
        let image = SparseMemoryMap::from_ranges([(0x1000, vec![0x42; 32])]).unwrap();

        let mut session = options.attach(Settings::default()).unwrap();
        session.probe_mut().load_memory_image(&image);
        options.detach(session).unwrap();

        let mut session = options.attach(Settings::default()).unwrap();
        assert_eq!(session.probe_mut().read_memory("Application").unwrap(), image);
    }

    #[test]
    fn missing_state_starts_erased() {
        let dir = tempfile::tempdir().unwrap();
        let session = options(dir.path(), "nRF52")
            .attach(Settings::default())
            .unwrap();

        assert!(session.probe().memory_image().is_empty());
    }

    #[test]
    fn protected_cores_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = options(dir.path(), "nRF53");
        options.protect = vec!["Modem".to_owned()];

        assert!(matches!(
            options.attach(Settings::default()),
            Err(OperationError::Protection(ProbeError::CoreNotFound(_)))
        ));
    }
}
