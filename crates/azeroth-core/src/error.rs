use serde::Serialize;
use thiserror::Error;

/// Информация об ошибке с подсказкой для восстановления
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    /// Код ошибки для идентификации
    pub code: String,
    /// Человекочитаемое сообщение
    pub message: String,
    /// Подсказка для исправления
    pub recovery_hint: Option<String>,
    /// Технические детали (для логов)
    pub details: Option<String>,
    /// Имеет ли смысл кнопка "Повторить"
    pub retryable: bool,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            recovery_hint: None,
            details: None,
            retryable: false,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.recovery_hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Неудачная попытка загрузки с одного источника
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAttempt {
    pub source: String,
    pub error: String,
}

impl std::fmt::Display for SourceAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.source, self.error)
    }
}

fn format_attempts(attempts: &[SourceAttempt]) -> String {
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {code} for {url}")]
    HttpStatus { code: u16, url: String },

    #[error("Too many redirects (limit {limit}) for {url}")]
    TooManyRedirects { limit: usize, url: String },

    #[error("Unsupported source: {0}")]
    UnsupportedScheme(String),

    #[error("All download sources failed: {}", format_attempts(.attempts))]
    AllSourcesExhausted { attempts: Vec<SourceAttempt> },

    #[error("A download is already in progress")]
    AlreadyDownloading,

    #[error("Invalid download target: {0}")]
    InvalidTarget(String),

    #[error("Filesystem error: {0}")]
    Filesystem(String),

    #[error("Archive extraction error: {0}")]
    Extraction(String),

    #[error("File hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Operation cancelled")]
    OperationCancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Join error: {0}")]
    Join(String),
}

impl LauncherError {
    /// Можно ли попробовать следующий источник после этой ошибки
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LauncherError::Network(_)
                | LauncherError::HttpStatus { .. }
                | LauncherError::TooManyRedirects { .. }
                | LauncherError::Http(_)
                | LauncherError::UnsupportedScheme(_)
                | LauncherError::Timeout(_)
                | LauncherError::HashMismatch { .. }
        )
    }

    /// Возвращает информацию об ошибке с подсказкой для восстановления
    pub fn to_error_info(&self) -> ErrorInfo {
        let info = match self {
            LauncherError::Database(e) => ErrorInfo::new("DATABASE_ERROR", "Database error")
                .with_hint("Try restarting the launcher. If the error persists, delete the launcher.db file")
                .with_details(e.to_string()),
            LauncherError::Io(e) => {
                let hint = match e.kind() {
                    std::io::ErrorKind::PermissionDenied => {
                        "Check access permissions to the game folder. You may need to run the launcher as Administrator"
                    }
                    std::io::ErrorKind::NotFound => "File or folder not found",
                    _ => "Ensure the folder is accessible and not locked by another process",
                };
                ErrorInfo::new("IO_ERROR", format!("Filesystem error: {}", e.kind()))
                    .with_hint(hint)
                    .with_details(e.to_string())
            }
            LauncherError::Http(e) => {
                let (message, hint) = if e.is_timeout() {
                    ("Server timeout", "Check your internet connection and try again")
                } else if e.is_connect() {
                    (
                        "Failed to connect to server",
                        "Check your internet connection. The server might be temporarily unavailable",
                    )
                } else {
                    ("Network error", "Check your internet connection")
                };
                ErrorInfo::new("HTTP_ERROR", message)
                    .with_hint(hint)
                    .with_details(e.to_string())
            }
            LauncherError::Json(e) => ErrorInfo::new("JSON_ERROR", "Data processing error")
                .with_hint("The remote data format may have changed. Check for launcher updates")
                .with_details(e.to_string()),
            LauncherError::Zip(e) => ErrorInfo::new("ZIP_ERROR", "ZIP archive error")
                .with_hint("The archive may be corrupted. Try downloading it again")
                .with_details(e.to_string()),
            LauncherError::Network(msg) => ErrorInfo::new("NETWORK_ERROR", "Network error")
                .with_hint("Check your internet connection and try again")
                .with_details(msg.clone()),
            LauncherError::HttpStatus { code, url } => {
                ErrorInfo::new("HTTP_STATUS", format!("Server responded with HTTP {}", code))
                    .with_hint("The mirror may be offline or the file was moved. Try again later")
                    .with_details(url.clone())
            }
            LauncherError::TooManyRedirects { limit, url } => {
                ErrorInfo::new("TOO_MANY_REDIRECTS", "Too many redirects")
                    .with_hint("The download mirror is misconfigured. Try another download option")
                    .with_details(format!("limit {}: {}", limit, url))
            }
            LauncherError::UnsupportedScheme(msg) => {
                ErrorInfo::new("UNSUPPORTED_SOURCE", "Unsupported download source")
                    .with_details(msg.clone())
            }
            LauncherError::AllSourcesExhausted { attempts } => {
                ErrorInfo::new("ALL_SOURCES_FAILED", "All download sources failed")
                    .with_hint("Every mirror is unavailable right now. Try again later or pick another version")
                    .with_details(format_attempts(attempts))
            }
            LauncherError::AlreadyDownloading => {
                ErrorInfo::new("DOWNLOAD_IN_PROGRESS", "Download in progress")
                    .with_hint("Please wait for the current download to finish before starting another")
            }
            LauncherError::InvalidTarget(msg) => {
                ErrorInfo::new("INVALID_TARGET", "Invalid download target").with_details(msg.clone())
            }
            LauncherError::Filesystem(msg) => ErrorInfo::new("FILESYSTEM_ERROR", "Filesystem error")
                .with_hint("Check that the game folder exists and is writable")
                .with_details(msg.clone()),
            LauncherError::Extraction(msg) => {
                ErrorInfo::new("ARCHIVE_ERROR", "Archive extraction error")
                    .with_hint("The archive may be corrupted. Try downloading it again")
                    .with_details(msg.clone())
            }
            LauncherError::HashMismatch { expected, actual } => {
                ErrorInfo::new("HASH_MISMATCH", "File hash mismatch")
                    .with_hint("The file may have been corrupted during download. Try downloading again")
                    .with_details(format!("Expected: {}, got: {}", expected, actual))
            }
            LauncherError::OperationCancelled => ErrorInfo::new("CANCELLED", "Operation cancelled"),
            LauncherError::InvalidConfig(msg) => {
                ErrorInfo::new("INVALID_CONFIG", "Invalid configuration").with_details(msg.clone())
            }
            LauncherError::NotFound(msg) => {
                ErrorInfo::new("NOT_FOUND", "Resource not found").with_details(msg.clone())
            }
            LauncherError::ApiError(msg) => ErrorInfo::new("API_ERROR", "API error")
                .with_hint("The service may be temporarily unavailable. Try again later")
                .with_details(msg.clone()),
            LauncherError::Timeout(msg) => ErrorInfo::new("TIMEOUT", "Operation timed out")
                .with_hint("Please check your internet connection")
                .with_details(msg.clone()),
            LauncherError::Join(msg) => {
                ErrorInfo::new("TASK_ERROR", "Task execution error").with_details(msg.clone())
            }
        };
        ErrorInfo {
            retryable: self.is_retryable(),
            ..info
        }
    }
}

impl From<tokio::task::JoinError> for LauncherError {
    fn from(err: tokio::task::JoinError) -> Self {
        LauncherError::Join(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LauncherError>;

impl serde::Serialize for LauncherError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Сериализуем как ErrorInfo для более полной информации
        self.to_error_info().serialize(serializer)
    }
}
