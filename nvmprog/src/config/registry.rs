//! Built-in device family descriptions.

use nvmprog_target::{DescriptionError, DeviceFamily};

/// The YAML descriptions compiled into the library.
const BUILTIN_FAMILIES: &[(&str, &str)] = &[
    ("nRF51", include_str!("../../targets/nRF51.yaml")),
    ("nRF52", include_str!("../../targets/nRF52.yaml")),
    ("nRF53", include_str!("../../targets/nRF53.yaml")),
    ("nRF91", include_str!("../../targets/nRF91.yaml")),
];

/// Error type for all errors which occur when working with the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The requested device family was not found.
    #[error("The requested device family '{0}' was not found.")]
    FamilyNotFound(String),
    /// A description could not be parsed.
    #[error("The description of '{name}' could not be parsed.")]
    Yaml {
        /// Name of the description.
        name: String,
        /// The parser error.
        #[source]
        source: serde_yaml::Error,
    },
    /// A description was parsed but is not usable.
    #[error("The description of '{name}' is invalid.")]
    Invalid {
        /// Name of the description.
        name: String,
        /// What is wrong with it.
        #[source]
        source: DescriptionError,
    },
}

/// Registry of all available device families.
#[derive(Debug, Clone)]
pub struct Registry {
    /// All the available families.
    families: Vec<DeviceFamily>,
}

impl Registry {
    /// Creates a registry with the families compiled into the library.
    pub fn from_builtin_families() -> Result<Self, RegistryError> {
        let mut registry = Self { families: vec![] };
        for (name, yaml) in BUILTIN_FAMILIES {
            registry.add_family_yaml(name, yaml)?;
        }
        Ok(registry)
    }

    /// Parses and adds a family description in YAML format.
    ///
    /// A family with the same name as an existing one replaces it.
    pub fn add_family_yaml(&mut self, name: &str, yaml: &str) -> Result<(), RegistryError> {
        let family: DeviceFamily =
            serde_yaml::from_str(yaml).map_err(|source| RegistryError::Yaml {
                name: name.to_owned(),
                source,
            })?;
        family.validate().map_err(|source| RegistryError::Invalid {
            name: name.to_owned(),
            source,
        })?;

        tracing::debug!(
            "Registered family {} with {} core(s)",
            family.name,
            family.cores.len()
        );
        self.families.retain(|f| f.name != family.name);
        self.families.push(family);
        Ok(())
    }

    /// All known families.
    pub fn families(&self) -> &[DeviceFamily] {
        &self.families
    }

    /// Looks up a family by name.
    ///
    /// The name is matched case-insensitively. A unique family whose name starts with
    /// `name` is accepted too, with a warning.
    pub fn family(&self, name: &str) -> Result<&DeviceFamily, RegistryError> {
        let wanted = name.to_ascii_lowercase();

        if let Some(family) = self
            .families
            .iter()
            .find(|f| f.name.to_ascii_lowercase() == wanted)
        {
            return Ok(family);
        }

        let mut candidates = self
            .families
            .iter()
            .filter(|f| f.name.to_ascii_lowercase().starts_with(&wanted));
        match (candidates.next(), candidates.next()) {
            (Some(family), None) => {
                tracing::warn!(
                    "Found family {} which matches given partial name {}. Consider specifying its full name.",
                    family.name,
                    name,
                );
                Ok(family)
            }
            _ => Err(RegistryError::FamilyNotFound(name.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn builtin_families_are_valid() {
        let registry = Registry::from_builtin_families().unwrap();
        let names: Vec<_> = registry.families().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["nRF51", "nRF52", "nRF53", "nRF91"]);
    }

    #[test]
    fn nrf53_has_application_then_network_core() {
        let registry = Registry::from_builtin_families().unwrap();
        let family = registry.family("nRF53").unwrap();

        let cores: Vec<_> = family.cores.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(cores, vec!["Application", "Network"]);
        assert_eq!(family.cores[1].rom_base_addr, 0x0100_0000);
        assert_eq!(family.cores[1].page_size, 0x800);
    }

    #[test_case("nRF52" => "nRF52"; "exact")]
    #[test_case("NRF91" => "nRF91"; "case insensitive")]
    #[test_case("nrf5" => panics)] // ambiguous prefix
    #[test_case("nrf9" => "nRF91"; "unique prefix")]
    fn lookup(name: &str) -> String {
        let registry = Registry::from_builtin_families().unwrap();
        registry.family(name).unwrap().name.clone()
    }

    #[test]
    fn unknown_family() {
        let registry = Registry::from_builtin_families().unwrap();
        assert!(matches!(
            registry.family("stm32"),
            Err(RegistryError::FamilyNotFound(_))
        ));
    }

    #[test]
    fn invalid_family_is_rejected() {
        let mut registry = Registry::from_builtin_families().unwrap();
        let yaml = "name: broken\ncores: []\n";
        assert!(matches!(
            registry.add_family_yaml("broken", yaml),
            Err(RegistryError::Invalid { .. })
        ));
    }
}
