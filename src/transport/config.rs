//! Параметры загрузки (профили default / fast / slow)

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Профиль сети, выбирается в настройках
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DownloadProfile {
    #[default]
    Default,
    Fast,
    Slow,
}

impl DownloadProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadProfile::Default => "default",
            DownloadProfile::Fast => "fast",
            DownloadProfile::Slow => "slow",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "fast" => DownloadProfile::Fast,
            "slow" => DownloadProfile::Slow,
            _ => DownloadProfile::Default,
        }
    }
}

/// Конфигурация загрузки
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Порог скорости (bytes/sec), ниже которого сеть считается медленной
    pub speed_threshold: u64,
    /// Время без прогресса на медленной сети до признания источника зависшим
    pub stall_timeout: Duration,
    /// Таймаут до получения заголовков ответа (на каждый переход)
    pub request_timeout: Duration,
    /// Таймаут соединения
    pub connect_timeout: Duration,
    /// Максимум HTTP-редиректов на один источник
    pub max_redirects: usize,
    /// Лимит на установку аддона из каталога
    pub install_timeout: Duration,
    /// Минимальный интервал между тиками прогресса
    pub progress_interval: Duration,
    /// Лимит скорости загрузки (bytes/sec), 0 = без лимита
    pub bandwidth_limit: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            speed_threshold: 10_000, // 10 KB/s
            stall_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            max_redirects: 10,
            install_timeout: Duration::from_secs(60),
            progress_interval: Duration::from_millis(100),
            bandwidth_limit: 0, // Без лимита
        }
    }
}

impl DownloadConfig {
    /// Конфигурация для быстрого соединения
    pub fn fast() -> Self {
        Self {
            speed_threshold: 100_000, // 100 KB/s
            stall_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// Конфигурация для медленного/нестабильного соединения
    pub fn slow() -> Self {
        Self {
            speed_threshold: 5_000, // 5 KB/s
            stall_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(30),
            ..Self::default()
        }
    }

    pub fn for_profile(profile: DownloadProfile) -> Self {
        match profile {
            DownloadProfile::Default => Self::default(),
            DownloadProfile::Fast => Self::fast(),
            DownloadProfile::Slow => Self::slow(),
        }
    }

    /// Установить лимит скорости загрузки
    pub fn with_bandwidth_limit(mut self, bytes_per_sec: u64) -> Self {
        self.bandwidth_limit = bytes_per_sec;
        self
    }
}
