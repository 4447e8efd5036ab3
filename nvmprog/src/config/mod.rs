//! Device family descriptions and persisted user settings.

pub mod registry;
pub mod settings;

pub use registry::{Registry, RegistryError};
pub use settings::{MruFiles, Settings, SettingsError, Store, MRU_CAPACITY};
