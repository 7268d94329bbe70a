//! Driver registry

use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::RwLock;
use tessera_core::{TesseraError, TesseraResult};
use tracing::debug;

use crate::{BinaryDriver, Driver};

/// Name -> driver catalog
#[derive(Default)]
pub struct DriverRegistry {
    drivers: RwLock<IndexMap<String, Arc<dyn Driver>>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry, with the binary driver pre-registered
    pub fn global() -> &'static DriverRegistry {
        static GLOBAL: OnceLock<DriverRegistry> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let registry = DriverRegistry::new();
            registry
                .drivers
                .write()
                .insert(BinaryDriver::NAME.to_string(), Arc::new(BinaryDriver::default()));
            registry
        })
    }

    pub fn register(&self, driver: Arc<dyn Driver>) -> TesseraResult<()> {
        let mut drivers = self.drivers.write();
        let name = driver.name().to_string();
        if drivers.contains_key(&name) {
            return Err(TesseraError::DriverExists(name));
        }
        debug!("Registered driver {:?}", name);
        drivers.insert(name, driver);
        Ok(())
    }

    pub fn get(&self, name: &str) -> TesseraResult<Arc<dyn Driver>> {
        self.drivers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TesseraError::DriverNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.drivers.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BinaryConfig;

    #[test]
    fn test_global_has_binary() {
        let driver = DriverRegistry::global().get("binary").unwrap();
        assert_eq!(driver.name(), "binary");
    }

    #[test]
    fn test_duplicate_registration() {
        let registry = DriverRegistry::new();
        registry.register(Arc::new(BinaryDriver::default())).unwrap();
        let err = registry
            .register(Arc::new(BinaryDriver::new(BinaryConfig::compact())))
            .unwrap_err();
        assert!(matches!(err, TesseraError::DriverExists(ref n) if n == "binary"));
        assert_eq!(registry.names(), vec!["binary"]);
    }

    #[test]
    fn test_missing_driver() {
        assert!(matches!(
            DriverRegistry::new().get("nope"),
            Err(TesseraError::DriverNotFound(_))
        ));
    }
}
