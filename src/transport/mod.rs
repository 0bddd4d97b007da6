//! Транспорты загрузки
//!
//! - `http.rs` - HTTP(S) с ручной обработкой редиректов
//! - `swarm.rs` - magnet-ссылки через подключаемый swarm backend
//! - `config.rs` - DownloadConfig и профили
//! - `throttle.rs` - скорость, детектор зависания, ограничение полосы
//!
//! Транспорт ничего не знает о сессии загрузки: он только качает один
//! источник в `destination_root` и шлёт `TransportEvent` в канал.

pub mod config;
pub mod http;
pub mod swarm;
pub(crate) mod throttle;

pub use config::{DownloadConfig, DownloadProfile};
pub use http::HttpTransport;
pub use swarm::{MagnetLink, SwarmBackend, SwarmTransport};

use async_trait::async_trait;
use azeroth_core::{DownloadKind, Result};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Событие транспорта для оркестратора
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Источник ответил, данные пошли
    Connected { source: String },
    Progress {
        bytes_downloaded: u64,
        bytes_total: u64,
        transfer_rate_bps: u64,
        peer_count: Option<u32>,
    },
    /// Текстовый статус вместо числового прогресса
    Status { message: String },
}

pub type ProgressSink = mpsc::UnboundedSender<TransportEvent>;

/// Отправить событие; закрытый канал не ошибка для транспорта
pub(crate) fn emit(sink: &ProgressSink, event: TransportEvent) {
    let _ = sink.send(event);
}

/// Одна попытка загрузки с одного источника
pub struct FetchRequest<'a> {
    pub uri: &'a str,
    pub destination_root: &'a Path,
    pub events: &'a ProgressSink,
    pub cancel: &'a CancellationToken,
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> DownloadKind;

    /// Может ли транспорт обработать этот URI (по схеме)
    fn supports(&self, uri: &str) -> bool;

    /// Скачать источник. Возвращает путь к готовому файлу/директории.
    ///
    /// При любой ошибке, включая отмену, транспорт сам удаляет
    /// свои частичные файлы.
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<PathBuf>;
}

/// Схема URI в нижнем регистре (`https`, `magnet`, ...)
pub(crate) fn uri_scheme(uri: &str) -> Option<String> {
    let (scheme, _) = uri.trim().split_once(':')?;
    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
    {
        return None;
    }
    Some(scheme.to_ascii_lowercase())
}
