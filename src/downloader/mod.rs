//! Оркестратор загрузки игрового клиента
//!
//! # Архитектура
//!
//! - `resolver.rs` - перебор источников по порядку
//! - `extract.rs` - распаковка архива и блокировки корней
//! - `mod.rs` - DownloadManager: единственная сессия, события, отмена
//!
//! Жизненный цикл: `Idle → Resolving → InProgress → {Completed | Cancelled | Failed} → Idle`.
//! Транспорты шлют события в mpsc, менеджер применяет их к сессии и
//! рассылает `DownloadEvent` подписчикам через broadcast.

pub mod extract;
pub mod resolver;

pub use extract::{extract_archive, ArchiveFormat, ExtractedArchive, ExtractionLocks};
pub use resolver::{FallbackResolver, ResolvedDownload};

use azeroth_core::{
    DownloadSession, DownloadState, DownloadTarget, LauncherError, PathStore, Result,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::transport::{emit, ProgressSink, TransportEvent};
use extract::remove_path;

const EVENT_CAPACITY: usize = 256;

/// Событие для UI
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum DownloadEvent {
    Progress {
        bytes_downloaded: u64,
        bytes_total: u64,
        transfer_rate_bps: u64,
        peer_count: Option<u32>,
        progress: f64,
    },
    Status {
        message: String,
    },
    Complete {
        path: PathBuf,
    },
    Cancelled,
    Failed {
        message: String,
    },
}

impl DownloadEvent {
    /// Имя канала событий
    pub fn name(&self) -> &'static str {
        match self {
            DownloadEvent::Progress { .. } => "download-progress",
            DownloadEvent::Status { .. } => "download-status",
            DownloadEvent::Complete { .. } => "download-complete",
            DownloadEvent::Cancelled => "download-cancelled",
            DownloadEvent::Failed { .. } => "download-failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadEvent::Complete { .. } | DownloadEvent::Cancelled | DownloadEvent::Failed { .. }
        )
    }
}

/// Что создала успешная загрузка (для удаления при поздней отмене)
struct Artifact {
    final_path: PathBuf,
    source: String,
    created: Vec<PathBuf>,
}

#[derive(Default)]
struct ActiveDownload {
    session: DownloadSession,
    cancel: Option<CancellationToken>,
}

struct Inner {
    active: Mutex<ActiveDownload>,
    events: broadcast::Sender<DownloadEvent>,
    resolver: FallbackResolver,
    store: Arc<dyn PathStore>,
    locks: ExtractionLocks,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Менеджер единственной загрузки
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<Inner>,
}

impl DownloadManager {
    pub fn new(
        resolver: FallbackResolver,
        store: Arc<dyn PathStore>,
        locks: ExtractionLocks,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                active: Mutex::new(ActiveDownload::default()),
                events,
                resolver,
                store,
                locks,
                task: Mutex::new(None),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.inner.events.subscribe()
    }

    /// Снимок текущей сессии
    pub fn session(&self) -> DownloadSession {
        self.inner.lock_active().session.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.lock_active().session.state != DownloadState::Idle
    }

    /// Запустить загрузку. Возвращается сразу, дальше только события
    pub fn start(&self, target: DownloadTarget) -> Result<()> {
        let cancel = {
            let mut active = self.inner.lock_active();
            if active.session.state != DownloadState::Idle {
                log::warn!(
                    "Rejected download of {}: session is {}",
                    target.id,
                    active.session.state
                );
                return Err(LauncherError::AlreadyDownloading);
            }
            if target.sources.is_empty() {
                return Err(LauncherError::InvalidTarget(format!(
                    "No download sources for {}",
                    target.id
                )));
            }

            let cancel = CancellationToken::new();
            active.session = DownloadSession {
                target: Some(target.clone()),
                state: DownloadState::Resolving,
                ..Default::default()
            };
            active.cancel = Some(cancel.clone());
            cancel
        };

        log::info!(
            "Starting download {} ({} source(s), kind {})",
            target.id,
            target.sources.len(),
            target.kind.as_str()
        );

        let handle = tokio::spawn(self.inner.clone().run(target, cancel));
        *self.inner.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    /// Отменить активную загрузку. Повторный вызов ничего не делает
    pub fn cancel(&self) -> bool {
        let mut active = self.inner.lock_active();
        if !active.session.state.is_active() {
            return false;
        }
        active.session.state = DownloadState::Cancelled;
        if let Some(token) = &active.cancel {
            token.cancel();
        }
        log::info!("Download cancellation requested");
        true
    }

    /// Дождаться окончания задачи сессии
    pub async fn wait_idle(&self) {
        let handle = self
            .inner
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::error!("Download task panicked: {}", e);
                self.inner.reset();
            }
        }
    }
}

impl Inner {
    fn lock_active(&self) -> std::sync::MutexGuard<'_, ActiveDownload> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn broadcast(&self, event: DownloadEvent) {
        log::debug!("Emitting {}", event.name());
        // Нет подписчиков - не ошибка
        let _ = self.events.send(event);
    }

    fn reset(&self) {
        *self.lock_active() = ActiveDownload::default();
    }

    async fn run(self: Arc<Self>, target: DownloadTarget, cancel: CancellationToken) {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let work = self.clone().execute(target.clone(), tx, cancel.clone());
        tokio::pin!(work);

        let outcome = loop {
            tokio::select! {
                result = &mut work => break result,
                Some(event) = rx.recv() => self.apply(event),
            }
        };
        while let Ok(event) = rx.try_recv() {
            self.apply(event);
        }

        self.finish(&target, outcome).await;
    }

    async fn execute(
        self: Arc<Self>,
        target: DownloadTarget,
        events: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<Artifact> {
        let resolved = self.resolver.resolve(&target, &events, &cancel).await?;
        let downloaded = resolved.path;

        if target.extract && ArchiveFormat::detect(&downloaded).is_some() {
            emit(
                &events,
                TransportEvent::Status {
                    message: "Extracting archive…".to_string(),
                },
            );

            let extracted =
                match extract_archive(&downloaded, &target.destination_root, &self.locks, &cancel)
                    .await
                {
                    Ok(extracted) => extracted,
                    Err(e) => {
                        log::error!("Extraction of {} failed: {}", downloaded.display(), e);
                        remove_path(&downloaded).await;
                        return Err(match e {
                            LauncherError::OperationCancelled
                            | LauncherError::Extraction(_) => e,
                            other => LauncherError::Extraction(other.to_string()),
                        });
                    }
                };

            remove_path(&downloaded).await;

            return Ok(Artifact {
                final_path: extracted.final_path,
                source: resolved.source,
                created: extracted.entries,
            });
        }

        Ok(Artifact {
            final_path: downloaded.clone(),
            source: resolved.source,
            created: vec![downloaded],
        })
    }

    /// Применить событие транспорта к сессии
    fn apply(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { source } => {
                let mut active = self.lock_active();
                if active.session.state == DownloadState::Resolving {
                    active.session.state = DownloadState::InProgress;
                }
                log::info!("Connected to {}", source);
                active.session.active_source = Some(source);
                active.session.status_message = None;
            }
            TransportEvent::Progress {
                bytes_downloaded,
                bytes_total,
                transfer_rate_bps,
                peer_count,
            } => {
                let event = {
                    let mut active = self.lock_active();
                    let session = &mut active.session;
                    session.bytes_downloaded = bytes_downloaded;
                    session.bytes_total = bytes_total;
                    session.transfer_rate_bps = transfer_rate_bps;
                    session.peer_count = peer_count;

                    // Пока висит статус, числовой прогресс не показываем
                    if session.status_message.is_some()
                        || session.state == DownloadState::Cancelled
                    {
                        None
                    } else {
                        Some(DownloadEvent::Progress {
                            bytes_downloaded,
                            bytes_total,
                            transfer_rate_bps,
                            peer_count,
                            progress: session.progress(),
                        })
                    }
                };
                if let Some(event) = event {
                    self.broadcast(event);
                }
            }
            TransportEvent::Status { message } => {
                {
                    let mut active = self.lock_active();
                    if active.session.state == DownloadState::Cancelled {
                        return;
                    }
                    active.session.status_message = Some(message.clone());
                }
                log::info!("Download status: {}", message);
                self.broadcast(DownloadEvent::Status { message });
            }
        }
    }

    async fn finish(&self, target: &DownloadTarget, outcome: Result<Artifact>) {
        // Отмена побеждает одновременное завершение
        let cancelled = {
            let mut active = self.lock_active();
            let cancelled = active.session.state == DownloadState::Cancelled;
            if !cancelled && outcome.is_ok() {
                active.session.state = DownloadState::Completed;
            }
            cancelled
        };

        let event = match outcome {
            Ok(artifact) if cancelled => {
                log::info!("Download of {} cancelled after completion, cleaning up", target.id);
                for path in &artifact.created {
                    remove_path(path).await;
                }
                DownloadEvent::Cancelled
            }
            Ok(artifact) => match self.persist(target, &artifact).await {
                Ok(()) => {
                    log::info!(
                        "Download of {} completed: {}",
                        target.id,
                        artifact.final_path.display()
                    );
                    DownloadEvent::Complete {
                        path: artifact.final_path,
                    }
                }
                Err(e) => {
                    log::error!("Failed to record install path for {}: {}", target.id, e);
                    DownloadEvent::Failed {
                        message: e.to_string(),
                    }
                }
            },
            Err(_) if cancelled => DownloadEvent::Cancelled,
            Err(LauncherError::OperationCancelled) => DownloadEvent::Cancelled,
            Err(e) => {
                log::error!("Download of {} failed: {}", target.id, e);
                DownloadEvent::Failed {
                    message: e.to_string(),
                }
            }
        };

        self.reset();
        self.broadcast(event);
    }

    /// Записать путь установки до события завершения
    async fn persist(&self, target: &DownloadTarget, artifact: &Artifact) -> Result<()> {
        let store = self.store.clone();
        let id = target.id.clone();
        let path = artifact.final_path.clone();
        let source = artifact.source.clone();
        tokio::task::spawn_blocking(move || {
            store.save_path(&id, &path)?;
            store.save_source(&id, &source)
        })
        .await?
    }
}
