use azeroth_core::{LauncherError, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Раскладка директорий лаунчера
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    base: PathBuf,
}

impl AppPaths {
    /// Системная директория данных приложения
    pub fn from_system() -> Result<Self> {
        let dirs = ProjectDirs::from("org", "AzerothLegacy", "Launcher").ok_or_else(|| {
            LauncherError::Filesystem("Failed to determine app data directory".into())
        })?;
        Ok(Self::with_base(dirs.data_dir()))
    }

    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Создаём основные директории
    pub fn create_all(&self) -> Result<()> {
        fs::create_dir_all(&self.base)?;
        fs::create_dir_all(self.cache_dir())?;
        fs::create_dir_all(self.logs_dir())?;
        fs::create_dir_all(self.downloads_dir())?;
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.base.join("cache")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base.join("logs")
    }

    /// Куда ставить клиенты, если пользователь не выбрал папку
    pub fn downloads_dir(&self) -> PathBuf {
        self.base.join("games")
    }

    // Путь к базе данных
    pub fn database_path(&self) -> PathBuf {
        self.base.join("launcher.db")
    }

    /// Очищает старые логи лаунчера (старше указанного количества дней)
    pub fn cleanup_old_logs(&self, keep_days: u64) -> Result<usize> {
        let logs_path = self.logs_dir();
        if !logs_path.exists() {
            return Ok(0);
        }

        let now = SystemTime::now();
        let cutoff = Duration::from_secs(keep_days * 24 * 60 * 60);
        let mut deleted_count = 0;

        for entry in fs::read_dir(&logs_path)?.flatten() {
            let path = entry.path();
            let Some(filename) = path.file_name().map(|f| f.to_string_lossy().to_string()) else {
                continue;
            };
            if !(filename.starts_with("launcher_") && filename.ends_with(".log")) {
                continue;
            }

            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());

            if let Some(age) = age {
                if age > cutoff && fs::remove_file(&path).is_ok() {
                    log::debug!(
                        "Deleted old log file: {} (age: {} days)",
                        filename,
                        age.as_secs() / (24 * 60 * 60)
                    );
                    deleted_count += 1;
                }
            }
        }

        if deleted_count > 0 {
            log::info!(
                "Cleaned up {} old log files (older than {} days)",
                deleted_count,
                keep_days
            );
        }

        Ok(deleted_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_base() {
        let base = std::env::temp_dir().join(format!("azeroth_paths_{}", uuid::Uuid::new_v4()));
        let paths = AppPaths::with_base(&base);
        paths.create_all().unwrap();

        assert!(paths.logs_dir().is_dir());
        assert!(paths.cache_dir().is_dir());
        assert_eq!(paths.database_path(), base.join("launcher.db"));

        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn test_cleanup_only_touches_launcher_logs() {
        let base = std::env::temp_dir().join(format!("azeroth_paths_{}", uuid::Uuid::new_v4()));
        let paths = AppPaths::with_base(&base);
        paths.create_all().unwrap();

        let old_log = paths.logs_dir().join("launcher_1.log");
        let other = paths.logs_dir().join("notes.txt");
        fs::write(&old_log, "old").unwrap();
        fs::write(&other, "keep").unwrap();

        // 0 дней: любой лог старше "сейчас"
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(paths.cleanup_old_logs(0).unwrap(), 1);
        assert!(!old_log.exists());
        assert!(other.exists());

        let _ = fs::remove_dir_all(base);
    }
}
