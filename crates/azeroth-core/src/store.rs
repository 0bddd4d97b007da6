//! Хранилище путей установки (по ID игры)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Result;

/// Запоминает, куда установлена каждая игра.
///
/// Запись должна быть durable к моменту возврата из `save_path`:
/// оркестратор отправляет событие завершения только после неё.
pub trait PathStore: Send + Sync {
    fn save_path(&self, id: &str, path: &Path) -> Result<()>;
    fn get_path(&self, id: &str) -> Result<Option<PathBuf>>;
    fn remove_path(&self, id: &str) -> Result<()>;
    fn all_paths(&self) -> Result<BTreeMap<String, PathBuf>>;

    /// Источник, с которого пришла установка. Хранилище может его игнорировать
    fn save_source(&self, _id: &str, _source: &str) -> Result<()> {
        Ok(())
    }
}

/// Хранилище в памяти (тесты и headless режим)
#[derive(Debug, Default)]
pub struct MemoryPathStore {
    paths: Mutex<BTreeMap<String, PathBuf>>,
}

impl MemoryPathStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PathStore for MemoryPathStore {
    fn save_path(&self, id: &str, path: &Path) -> Result<()> {
        let mut paths = self.paths.lock().unwrap_or_else(|e| e.into_inner());
        paths.insert(id.to_string(), path.to_path_buf());
        Ok(())
    }

    fn get_path(&self, id: &str) -> Result<Option<PathBuf>> {
        let paths = self.paths.lock().unwrap_or_else(|e| e.into_inner());
        Ok(paths.get(id).cloned())
    }

    fn remove_path(&self, id: &str) -> Result<()> {
        let mut paths = self.paths.lock().unwrap_or_else(|e| e.into_inner());
        paths.remove(id);
        Ok(())
    }

    fn all_paths(&self) -> Result<BTreeMap<String, PathBuf>> {
        let paths = self.paths.lock().unwrap_or_else(|e| e.into_inner());
        Ok(paths.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryPathStore::new();
        store.save_path("wotlk", Path::new("/games/wotlk")).unwrap();
        assert_eq!(
            store.get_path("wotlk").unwrap(),
            Some(PathBuf::from("/games/wotlk"))
        );

        store.remove_path("wotlk").unwrap();
        assert!(store.get_path("wotlk").unwrap().is_none());
    }
}
