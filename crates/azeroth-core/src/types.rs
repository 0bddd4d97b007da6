use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

// ========== Downloads ==========

/// Тип источника загрузки (стратегия транспорта)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DownloadKind {
    #[default]
    Http,
    Swarm,
}

impl DownloadKind {
    /// Определить тип по URI: magnet-ссылки идут через swarm, остальное через HTTP
    pub fn from_uri(uri: &str) -> Self {
        if uri.trim_start().to_ascii_lowercase().starts_with("magnet:") {
            DownloadKind::Swarm
        } else {
            DownloadKind::Http
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadKind::Http => "http",
            DownloadKind::Swarm => "swarm",
        }
    }
}

/// Что скачивать и куда. Неизменяемо в пределах одной попытки
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTarget {
    /// Логический ID (игра/ассет), под ним сохраняется путь установки
    pub id: String,
    /// Источники по приоритету: основной первым, затем зеркала
    pub sources: Vec<String>,
    pub kind: DownloadKind,
    pub destination_root: PathBuf,
    /// Распаковать архив после загрузки
    #[serde(default = "default_true")]
    pub extract: bool,
    /// SHA1 (40 hex) или SHA256 (64 hex)
    #[serde(default)]
    pub expected_hash: Option<String>,
}

fn default_true() -> bool {
    true
}

impl DownloadTarget {
    pub fn new(
        id: impl Into<String>,
        sources: Vec<String>,
        destination_root: impl Into<PathBuf>,
    ) -> Self {
        let kind = sources
            .first()
            .map(|s| DownloadKind::from_uri(s))
            .unwrap_or_default();
        Self {
            id: id.into(),
            sources,
            kind,
            destination_root: destination_root.into(),
            extract: true,
            expected_hash: None,
        }
    }

    pub fn without_extraction(mut self) -> Self {
        self.extract = false;
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.expected_hash = Some(hash.into());
        self
    }
}

/// Состояние конечного автомата загрузки
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    #[default]
    Idle,
    Resolving,
    InProgress,
    Completed,
    Cancelled,
    Failed,
}

impl DownloadState {
    /// Загрузка активна (можно отменить)
    pub fn is_active(&self) -> bool {
        matches!(self, DownloadState::Resolving | DownloadState::InProgress)
    }
}

impl std::fmt::Display for DownloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadState::Idle => write!(f, "idle"),
            DownloadState::Resolving => write!(f, "resolving"),
            DownloadState::InProgress => write!(f, "in_progress"),
            DownloadState::Completed => write!(f, "completed"),
            DownloadState::Cancelled => write!(f, "cancelled"),
            DownloadState::Failed => write!(f, "failed"),
        }
    }
}

/// Единственная живая сессия загрузки процесса
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSession {
    pub target: Option<DownloadTarget>,
    pub state: DownloadState,
    pub bytes_downloaded: u64,
    pub bytes_total: u64,
    pub transfer_rate_bps: u64,
    /// Только для swarm
    pub peer_count: Option<u32>,
    /// Пока установлено, числовой прогресс в UI не показывается
    pub status_message: Option<String>,
    pub active_source: Option<String>,
    pub final_path: Option<PathBuf>,
}

impl DownloadSession {
    /// Доля скачанного в диапазоне [0, 1]
    pub fn progress(&self) -> f64 {
        if self.bytes_total == 0 {
            return 0.0;
        }
        (self.bytes_downloaded as f64 / self.bytes_total as f64).clamp(0.0, 1.0)
    }
}

// ========== Add-ons ==========

/// Папка пакета как она лежит на диске, без группировки
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPackageEntry {
    pub folder_name: String,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl RawPackageEntry {
    /// Запись без дескриптора: заголовок совпадает с именем папки
    pub fn new(folder_name: impl Into<String>) -> Self {
        let folder_name = folder_name.into();
        Self {
            title: folder_name.clone(),
            folder_name,
            author: None,
            version: None,
            notes: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// Логический пакет: основная папка и её модули
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageGroup {
    pub primary: RawPackageEntry,
    pub modules: Vec<RawPackageEntry>,
}

impl PackageGroup {
    pub fn singleton(primary: RawPackageEntry) -> Self {
        Self {
            primary,
            modules: Vec::new(),
        }
    }

    /// Все папки группы: основная первой
    pub fn folder_names(&self) -> Vec<String> {
        std::iter::once(&self.primary)
            .chain(self.modules.iter())
            .map(|e| e.folder_name.clone())
            .collect()
    }
}

/// Запись внешнего каталога метаданных (только чтение)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub detail_url: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub game_version: Option<String>,
}

/// Готовая для UI запись установленного пакета
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPackage {
    pub folder_name: String,
    pub title: String,
    pub original_title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub detail_url: Option<String>,
    pub game_version: Option<String>,
    pub version: Option<String>,
    pub modules: Vec<RawPackageEntry>,
    /// Найдена ли запись в каталоге
    pub matched: bool,
}

impl DisplayPackage {
    /// Папки для удаления: основная и все модули
    pub fn folder_names(&self) -> Vec<String> {
        std::iter::once(self.folder_name.clone())
            .chain(self.modules.iter().map(|m| m.folder_name.clone()))
            .collect()
    }
}

// ========== Commands ==========

/// Ответ на команду UI: `{ success, message? }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn ok_with(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

impl<T> From<Result<T>> for CommandResult {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(_) => CommandResult::ok(),
            Err(e) => CommandResult::fail(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LauncherError;

    #[test]
    fn test_kind_from_uri() {
        assert_eq!(
            DownloadKind::from_uri("magnet:?xt=urn:btih:ABC"),
            DownloadKind::Swarm
        );
        assert_eq!(
            DownloadKind::from_uri("https://cdn.example.com/client.zip"),
            DownloadKind::Http
        );
    }

    #[test]
    fn test_target_infers_kind_from_first_source() {
        let target = DownloadTarget::new(
            "wotlk",
            vec!["magnet:?xt=urn:btih:ABC".into(), "https://mirror/x.zip".into()],
            "/games",
        );
        assert_eq!(target.kind, DownloadKind::Swarm);
        assert!(target.extract);
    }

    #[test]
    fn test_session_progress() {
        let mut session = DownloadSession::default();
        assert_eq!(session.progress(), 0.0);
        session.bytes_total = 200;
        session.bytes_downloaded = 50;
        assert!((session.progress() - 0.25).abs() < f64::EPSILON);
        session.bytes_downloaded = 500;
        assert_eq!(session.progress(), 1.0);
    }

    #[test]
    fn test_command_result_serialization() {
        let json = serde_json::to_string(&CommandResult::ok()).unwrap();
        assert_eq!(json, r#"{"success":true}"#);

        let failed: CommandResult = Err::<(), _>(LauncherError::AlreadyDownloading).into();
        assert!(!failed.success);
        assert!(failed.message.unwrap().contains("already in progress"));
    }

    #[test]
    fn test_display_package_folder_names() {
        let pkg = DisplayPackage {
            folder_name: "Recount".into(),
            title: "Recount".into(),
            original_title: "Recount".into(),
            author: None,
            description: None,
            image: None,
            detail_url: None,
            game_version: None,
            version: None,
            modules: vec![RawPackageEntry::new("Recount_Modes")],
            matched: false,
        };
        assert_eq!(pkg.folder_names(), vec!["Recount", "Recount_Modes"]);
    }
}
