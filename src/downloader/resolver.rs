//! Перебор источников загрузки по порядку

use azeroth_core::{DownloadTarget, LauncherError, Result, SourceAttempt};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::transport::{
    emit, DownloadConfig, FetchRequest, HttpTransport, ProgressSink, SwarmBackend, SwarmTransport,
    Transport, TransportEvent,
};
use crate::utils::verify_file_hash;

/// Результат успешного перебора
#[derive(Debug, Clone)]
pub struct ResolvedDownload {
    pub path: PathBuf,
    /// Источник, который сработал
    pub source: String,
    /// Неудачные попытки перед ним (только для логов)
    pub attempts: Vec<SourceAttempt>,
}

/// Пробует источники строго по одному, по порядку
#[derive(Clone)]
pub struct FallbackResolver {
    transports: Vec<Arc<dyn Transport>>,
}

impl FallbackResolver {
    pub fn new(transports: Vec<Arc<dyn Transport>>) -> Self {
        Self { transports }
    }

    /// HTTP + swarm (backend опционален)
    pub fn with_defaults(
        config: DownloadConfig,
        swarm_backend: Option<Arc<dyn SwarmBackend>>,
    ) -> Result<Self> {
        let swarm = SwarmTransport::new(swarm_backend);
        if !swarm.has_backend() {
            log::info!("No swarm backend configured, magnet sources will be skipped");
        }
        Ok(Self::new(vec![
            Arc::new(HttpTransport::new(config)?),
            Arc::new(swarm),
        ]))
    }

    fn transport_for(&self, uri: &str) -> Option<&Arc<dyn Transport>> {
        self.transports.iter().find(|t| t.supports(uri))
    }

    pub async fn resolve(
        &self,
        target: &DownloadTarget,
        events: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ResolvedDownload> {
        if target.sources.is_empty() {
            return Err(LauncherError::InvalidTarget(format!(
                "No download sources for {}",
                target.id
            )));
        }

        let total = target.sources.len();
        let mut attempts = Vec::new();

        log::info!("Downloading {} with {} source(s)", target.id, total);

        for (idx, source) in target.sources.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(LauncherError::OperationCancelled);
            }

            if idx > 0 {
                emit(
                    events,
                    TransportEvent::Status {
                        message: format!("Trying source {}/{}…", idx + 1, total),
                    },
                );
            }
            log::info!("Trying source #{}/{}: {}", idx + 1, total, source);

            match self.attempt(target, source, events, cancel).await {
                Ok(path) => {
                    if !attempts.is_empty() {
                        log::info!(
                            "{} succeeded via {} after {} failed source(s)",
                            target.id,
                            source,
                            attempts.len()
                        );
                    }
                    return Ok(ResolvedDownload {
                        path,
                        source: source.clone(),
                        attempts,
                    });
                }
                Err(LauncherError::OperationCancelled) => {
                    log::info!("Download of {} cancelled on source {}", target.id, source);
                    return Err(LauncherError::OperationCancelled);
                }
                Err(e) => {
                    log::warn!("Source {} failed: {}", source, e);
                    attempts.push(SourceAttempt {
                        source: source.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        log::error!("All {} source(s) failed for {}", total, target.id);
        Err(LauncherError::AllSourcesExhausted { attempts })
    }

    /// Одна попытка: транспорт по схеме + проверка хеша
    async fn attempt(
        &self,
        target: &DownloadTarget,
        source: &str,
        events: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let transport = self.transport_for(source).ok_or_else(|| {
            LauncherError::UnsupportedScheme(format!("No transport for {}", source))
        })?;

        let path = transport
            .fetch(FetchRequest {
                uri: source,
                destination_root: &target.destination_root,
                events,
                cancel,
            })
            .await?;

        if let Some(expected) = target.expected_hash.as_deref() {
            emit(
                events,
                TransportEvent::Status {
                    message: "Verifying download…".to_string(),
                },
            );

            let file = path.clone();
            let expected_owned = expected.to_string();
            let verified =
                tokio::task::spawn_blocking(move || verify_file_hash(&file, &expected_owned))
                    .await?;

            if let Err(e) = verified {
                log::error!("Hash mismatch for {} - file removed", path.display());
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e);
            }
            log::info!("Hash verified for {}", path.display());
        }

        Ok(path)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{temp_root, FakeTransport};
    use super::*;
    use tokio::sync::mpsc;

    fn resolver() -> FallbackResolver {
        FallbackResolver::new(vec![Arc::new(FakeTransport)])
    }

    #[tokio::test]
    async fn test_falls_through_to_first_working_source() {
        let root = temp_root();
        let target = DownloadTarget::new(
            "tbc",
            vec![
                "fake://fail/a".into(),
                "fake://fail/b".into(),
                "fake://ok/tbc.bin".into(),
            ],
            &root,
        )
        .without_extraction();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let resolved = resolver()
            .resolve(&target, &tx, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resolved.source, "fake://ok/tbc.bin");
        assert_eq!(resolved.path, root.join("tbc.bin"));
        assert_eq!(resolved.attempts.len(), 2);
        assert_eq!(resolved.attempts[0].source, "fake://fail/a");

        drop(tx);
        let mut statuses = Vec::new();
        while let Some(event) = rx.recv().await {
            if let TransportEvent::Status { message } = event {
                statuses.push(message);
            }
        }
        assert_eq!(statuses, vec!["Trying source 2/3…", "Trying source 3/3…"]);

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_exhaustion_lists_every_attempt() {
        let root = temp_root();
        let target = DownloadTarget::new(
            "classic",
            vec!["fake://fail/a".into(), "ftp://nowhere/b.zip".into()],
            &root,
        );

        let (tx, _rx) = mpsc::unbounded_channel();
        let err = resolver()
            .resolve(&target, &tx, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            LauncherError::AllSourcesExhausted { attempts } => {
                assert_eq!(attempts.len(), 2);
                assert!(attempts[1].error.contains("No transport"));
            }
            other => panic!("expected AllSourcesExhausted, got {:?}", other),
        }

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_cancel_stops_the_chain() {
        let root = temp_root();
        let target = DownloadTarget::new(
            "wotlk",
            vec!["fake://ok/a.bin".into(), "fake://ok/b.bin".into()],
            &root,
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (tx, _rx) = mpsc::unbounded_channel();
        let err = resolver().resolve(&target, &tx, &cancel).await.unwrap_err();
        assert!(matches!(err, LauncherError::OperationCancelled));
        assert!(!root.join("a.bin").exists());

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_hash_mismatch_falls_through() {
        let root = temp_root();
        let target = DownloadTarget::new("asset", vec!["fake://ok/a.bin".into()], &root)
            .with_hash("0000000000000000000000000000000000000000");

        let (tx, _rx) = mpsc::unbounded_channel();
        let err = resolver()
            .resolve(&target, &tx, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, LauncherError::AllSourcesExhausted { .. }));
        assert!(!root.join("a.bin").exists());

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_empty_sources_is_invalid_target() {
        let target = DownloadTarget::new("none", Vec::new(), std::env::temp_dir());
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = resolver()
            .resolve(&target, &tx, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::InvalidTarget(_)));
    }
}
