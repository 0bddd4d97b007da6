use azeroth_core::Result;
use azeroth_db::Database;
use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::transport::{DownloadConfig, DownloadProfile};

/// Строка realmlist по умолчанию
pub const DEFAULT_REALMLIST: &str = "set realmlist logon.warmane.com";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    // Загрузки
    /// Куда по умолчанию ставить клиенты
    pub default_download_path: Option<PathBuf>,
    pub download_profile: DownloadProfile,
    /// Лимит скорости загрузки (bytes/sec), 0 = без лимита
    pub bandwidth_limit: u64,

    // Каталог
    /// Откуда обновлять каталог аддонов. None = только встроенный список
    pub catalog_url: Option<String>,

    // Клиент
    pub clear_cache_on_launch: bool,
    /// История строк realmlist
    pub saved_realmlists: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_download_path: None,
            download_profile: DownloadProfile::Default,
            bandwidth_limit: 0, // Без лимита
            catalog_url: None,
            clear_cache_on_launch: false,
            saved_realmlists: vec![DEFAULT_REALMLIST.to_string()],
        }
    }
}

impl Settings {
    /// Параметры загрузки из профиля и лимита
    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig::for_profile(self.download_profile).with_bandwidth_limit(self.bandwidth_limit)
    }

    /// Запомнить realmlist (без дублей)
    pub fn remember_realmlist(&mut self, content: &str) -> bool {
        let content = content.trim();
        if content.is_empty() || self.saved_realmlists.iter().any(|r| r == content) {
            return false;
        }
        self.saved_realmlists.push(content.to_string());
        true
    }

    pub fn forget_realmlist(&mut self, content: &str) -> bool {
        let before = self.saved_realmlists.len();
        self.saved_realmlists.retain(|r| r != content);
        self.saved_realmlists.len() != before
    }
}

/// Настройки в таблице `settings` (ключ -> строка)
#[derive(Debug, Clone)]
pub struct SettingsManager {
    db: Database,
}

impl SettingsManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Получить значение настройки
    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?1")?;

        match stmt.query_row([key], |row| row.get::<_, String>(0)) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Установить значение настройки
    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn clear_setting(&self, key: &str) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute("DELETE FROM settings WHERE key = ?1", [key])?;
        Ok(())
    }

    /// Получить все настройки
    pub fn get_all(&self) -> Result<Settings> {
        let default = Settings::default();

        Ok(Settings {
            default_download_path: self
                .get_setting("default_download_path")?
                .map(PathBuf::from)
                .or(default.default_download_path),

            download_profile: self
                .get_setting("download_profile")?
                .map(|s| DownloadProfile::parse(&s))
                .unwrap_or(default.download_profile),

            bandwidth_limit: self
                .get_setting("bandwidth_limit")?
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.bandwidth_limit),

            catalog_url: self.get_setting("catalog_url")?.or(default.catalog_url),

            clear_cache_on_launch: self
                .get_setting("clear_cache_on_launch")?
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.clear_cache_on_launch),

            saved_realmlists: self
                .get_setting("saved_realmlists")?
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or(default.saved_realmlists),
        })
    }

    /// Сохранить все настройки
    pub fn save_all(&self, settings: &Settings) -> Result<()> {
        match &settings.default_download_path {
            Some(path) => self.set_setting("default_download_path", &path.to_string_lossy())?,
            None => self.clear_setting("default_download_path")?,
        }

        self.set_setting("download_profile", settings.download_profile.as_str())?;
        self.set_setting("bandwidth_limit", &settings.bandwidth_limit.to_string())?;

        match &settings.catalog_url {
            Some(url) => self.set_setting("catalog_url", url)?,
            None => self.clear_setting("catalog_url")?,
        }

        self.set_setting(
            "clear_cache_on_launch",
            &settings.clear_cache_on_launch.to_string(),
        )?;
        self.set_setting(
            "saved_realmlists",
            &serde_json::to_string(&settings.saved_realmlists)?,
        )?;

        log::debug!("Settings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_manager() -> (SettingsManager, PathBuf) {
        let dir = std::env::temp_dir().join(format!("azeroth_settings_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let db = Database::init(dir.join("launcher.db")).unwrap();
        (SettingsManager::new(db), dir)
    }

    #[test]
    fn test_defaults_when_empty() {
        let (manager, dir) = temp_manager();
        assert_eq!(manager.get_all().unwrap(), Settings::default());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_round_trip_through_sqlite() {
        let (manager, dir) = temp_manager();

        let mut settings = Settings {
            default_download_path: Some(PathBuf::from("/games")),
            download_profile: DownloadProfile::Slow,
            bandwidth_limit: 512_000,
            catalog_url: Some("https://addons.example.com/catalog.json".to_string()),
            clear_cache_on_launch: true,
            ..Settings::default()
        };
        assert!(settings.remember_realmlist("set realmlist logon.example.org"));
        assert!(!settings.remember_realmlist(DEFAULT_REALMLIST));
        manager.save_all(&settings).unwrap();

        let loaded = manager.get_all().unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.download_config().bandwidth_limit, 512_000);

        settings.catalog_url = None;
        settings.default_download_path = None;
        manager.save_all(&settings).unwrap();
        let cleared = manager.get_all().unwrap();
        assert!(cleared.catalog_url.is_none());
        assert!(cleared.default_download_path.is_none());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_forget_realmlist() {
        let mut settings = Settings::default();
        assert!(settings.forget_realmlist(DEFAULT_REALMLIST));
        assert!(!settings.forget_realmlist(DEFAULT_REALMLIST));
        assert!(settings.saved_realmlists.is_empty());
    }
}
