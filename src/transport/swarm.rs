//! Magnet-ссылки
//!
//! Сам swarm-протокол (трекеры, выбор кусков) живёт за трейтом
//! `SwarmBackend`. Без backend'а magnet-источник просто не поддержан,
//! и цепочка источников переходит к следующему.

use async_trait::async_trait;
use azeroth_core::{DownloadKind, LauncherError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{emit, uri_scheme, FetchRequest, ProgressSink, Transport, TransportEvent};
use crate::utils::sanitize_filename;

/// Разобранная magnet-ссылка
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    /// BTIH в верхнем регистре (40 hex или 32 base32)
    pub info_hash: String,
    pub display_name: Option<String>,
    pub trackers: Vec<String>,
}

impl MagnetLink {
    pub fn parse(uri: &str) -> Result<Self> {
        let trimmed = uri.trim();
        if uri_scheme(trimmed).as_deref() != Some("magnet") {
            return Err(LauncherError::UnsupportedScheme(format!(
                "Not a magnet link: {}",
                uri
            )));
        }
        let query = trimmed.split_once('?').map(|(_, q)| q).unwrap_or("");

        let mut info_hash = None;
        let mut display_name = None;
        let mut trackers = Vec::new();

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, raw) = pair.split_once('=').unwrap_or((pair, ""));
            let raw = raw.replace('+', " ");
            let value = urlencoding::decode(&raw)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| raw.clone());

            match key {
                "xt" => {
                    let lower = value.to_ascii_lowercase();
                    if let Some(hash) = lower.strip_prefix("urn:btih:") {
                        info_hash = Some(hash.to_ascii_uppercase());
                    }
                }
                "dn" => display_name = Some(value),
                "tr" => trackers.push(value),
                _ => {}
            }
        }

        let info_hash = info_hash.ok_or_else(|| {
            LauncherError::UnsupportedScheme(format!("Magnet link has no btih hash: {}", uri))
        })?;

        let valid = match info_hash.len() {
            40 => info_hash.chars().all(|c| c.is_ascii_hexdigit()),
            32 => info_hash
                .chars()
                .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)),
            _ => false,
        };
        if !valid {
            return Err(LauncherError::UnsupportedScheme(format!(
                "Invalid info hash in magnet link: {}",
                info_hash
            )));
        }

        Ok(Self {
            info_hash,
            display_name: display_name.filter(|n| !n.trim().is_empty()),
            trackers,
        })
    }

    /// Имя директории/файла, в которую backend кладёт содержимое
    pub fn output_name(&self) -> String {
        self.display_name
            .as_deref()
            .map(sanitize_filename)
            .filter(|n| !n.is_empty() && n != "." && n != "..")
            .unwrap_or_else(|| self.info_hash.clone())
    }
}

/// Реализация swarm-протокола. Сообщает `peer_count` в тиках прогресса.
/// `Connected` за backend'а шлёт сам транспорт
#[async_trait]
pub trait SwarmBackend: Send + Sync {
    async fn download(
        &self,
        magnet: &MagnetLink,
        destination_root: &Path,
        events: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PathBuf>;
}

#[derive(Clone, Default)]
pub struct SwarmTransport {
    backend: Option<Arc<dyn SwarmBackend>>,
}

impl SwarmTransport {
    pub fn new(backend: Option<Arc<dyn SwarmBackend>>) -> Self {
        Self { backend }
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }
}

#[async_trait]
impl Transport for SwarmTransport {
    fn kind(&self) -> DownloadKind {
        DownloadKind::Swarm
    }

    fn supports(&self, uri: &str) -> bool {
        uri_scheme(uri).as_deref() == Some("magnet")
    }

    async fn fetch(&self, request: FetchRequest<'_>) -> Result<PathBuf> {
        let magnet = MagnetLink::parse(request.uri)?;

        let backend = self.backend.as_ref().ok_or_else(|| {
            LauncherError::UnsupportedScheme(
                "No swarm backend configured for magnet links".to_string(),
            )
        })?;

        if request.cancel.is_cancelled() {
            return Err(LauncherError::OperationCancelled);
        }

        let output = request.destination_root.join(magnet.output_name());
        let existed_before = output.exists();

        log::info!(
            "Starting swarm download {} ({} trackers)",
            magnet.info_hash,
            magnet.trackers.len()
        );

        // Поток найден: сессия переходит в InProgress, статус "Trying source" снимается
        emit(
            request.events,
            TransportEvent::Connected {
                source: request.uri.to_string(),
            },
        );

        let result = backend
            .download(
                &magnet,
                request.destination_root,
                request.events,
                request.cancel,
            )
            .await;

        if let Err(e) = &result {
            log::warn!("Swarm download {} failed: {}", magnet.info_hash, e);
            // Убираем только то, что появилось во время этой попытки
            if !existed_before && output.exists() {
                let removed = if output.is_dir() {
                    tokio::fs::remove_dir_all(&output).await
                } else {
                    tokio::fs::remove_file(&output).await
                };
                if let Err(remove_err) = removed {
                    log::warn!("Failed to remove {}: {}", output.display(), remove_err);
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    const WOTLK_MAGNET: &str = "magnet:?xt=urn:btih:5B65D1928A3025A820B45E6DB2451AAAABC5347C&dn=World%20of%20Warcraft%203.3.5a&tr=udp%3a%2f%2ftracker.openbittorrent.com%3a80%2fannounce&tr=udp%3a%2f%2ftracker.opentrackr.org%3a1337%2fannounce";

    /// Backend, который пишет часть данных и ждёт отмены
    struct StuckBackend;

    #[async_trait]
    impl SwarmBackend for StuckBackend {
        async fn download(
            &self,
            magnet: &MagnetLink,
            destination_root: &Path,
            events: &ProgressSink,
            cancel: &CancellationToken,
        ) -> Result<PathBuf> {
            let dir = destination_root.join(magnet.output_name());
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(dir.join("Data.MPQ.part"), b"partial").await?;
            let _ = events.send(TransportEvent::Progress {
                bytes_downloaded: 7,
                bytes_total: 100,
                transfer_rate_bps: 7,
                peer_count: Some(3),
            });
            cancel.cancelled().await;
            Err(LauncherError::OperationCancelled)
        }
    }

    #[test]
    fn test_parse_magnet() {
        let magnet = MagnetLink::parse(WOTLK_MAGNET).unwrap();
        assert_eq!(magnet.info_hash, "5B65D1928A3025A820B45E6DB2451AAAABC5347C");
        assert_eq!(magnet.display_name.as_deref(), Some("World of Warcraft 3.3.5a"));
        assert_eq!(
            magnet.trackers,
            vec![
                "udp://tracker.openbittorrent.com:80/announce",
                "udp://tracker.opentrackr.org:1337/announce"
            ]
        );
    }

    #[test]
    fn test_parse_rejects_bad_hash() {
        assert!(MagnetLink::parse("magnet:?xt=urn:btih:XYZ").is_err());
        assert!(MagnetLink::parse("magnet:?dn=NoHash").is_err());
        assert!(MagnetLink::parse("https://example.com").is_err());
        // base32 форма допустима
        assert!(MagnetLink::parse("magnet:?xt=urn:btih:mfrggzdfmztwq2lknnwg23tpobyxe43u").is_ok());
    }

    #[tokio::test]
    async fn test_without_backend_is_unsupported() {
        let transport = SwarmTransport::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let root = std::env::temp_dir();
        let result = transport
            .fetch(FetchRequest {
                uri: WOTLK_MAGNET,
                destination_root: &root,
                events: &tx,
                cancel: &CancellationToken::new(),
            })
            .await;
        assert!(matches!(result, Err(LauncherError::UnsupportedScheme(_))));
    }

    #[tokio::test]
    async fn test_cancel_removes_backend_output() {
        let root = std::env::temp_dir().join(format!("azeroth_swarm_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&root).unwrap();

        let transport = SwarmTransport::new(Some(Arc::new(StuckBackend)));
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let task = {
            let root = root.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                transport
                    .fetch(FetchRequest {
                        uri: WOTLK_MAGNET,
                        destination_root: &root,
                        events: &tx,
                        cancel: &cancel,
                    })
                    .await
            })
        };

        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::Connected {
                source: WOTLK_MAGNET.to_string()
            })
        );
        match rx.recv().await {
            Some(TransportEvent::Progress { peer_count, .. }) => assert_eq!(peer_count, Some(3)),
            other => panic!("unexpected event {:?}", other),
        }
        cancel.cancel();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(LauncherError::OperationCancelled)));
        assert!(!root.join("World of Warcraft 3.3.5a").exists());

        let _ = std::fs::remove_dir_all(root);
    }
}
