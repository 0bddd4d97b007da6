//! Установленные аддоны: список, удаление, установка из архива и из каталога

pub mod catalog;
pub mod grouping;
pub mod reconcile;
pub mod scanner;

pub use catalog::{is_installed, Catalog, CatalogPage, CatalogQuery, CatalogSort};
pub use grouping::group_packages;
pub use reconcile::{find_catalog_match, reconcile};
pub use scanner::scan_packages;

use azeroth_core::{CatalogEntry, CommandResult, DisplayPackage, LauncherError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::downloader::extract::remove_path;
use crate::downloader::{extract_archive, ArchiveFormat, ExtractedArchive, ExtractionLocks};
use crate::transport::{DownloadConfig, FetchRequest, HttpTransport, Transport};

pub struct AddonManager {
    catalog: Arc<Catalog>,
    locks: ExtractionLocks,
    http: HttpTransport,
    install_timeout: Duration,
}

impl AddonManager {
    pub fn new(catalog: Arc<Catalog>, locks: ExtractionLocks, config: DownloadConfig) -> Result<Self> {
        let install_timeout = config.install_timeout;
        Ok(Self {
            catalog,
            locks,
            http: HttpTransport::new(config)?,
            install_timeout,
        })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Скан -> группировка -> сопоставление с каталогом
    pub async fn list(&self, root: &Path) -> Vec<DisplayPackage> {
        if self.locks.is_locked(root) {
            // staging скрыт от сканера, видны только уже перенесённые папки
            log::info!("Scanning {} while an archive is being extracted into it", root.display());
        }

        let scan_root = root.to_path_buf();
        let entries = match tokio::task::spawn_blocking(move || scan_packages(&scan_root)).await {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("Addon scan task failed: {}", e);
                return Vec::new();
            }
        };

        let groups = group_packages(entries);
        let packages = reconcile(groups, &self.catalog.entries());
        log::debug!("Listed {} package(s) in {}", packages.len(), root.display());
        packages
    }

    /// Удалить одну папку аддона
    pub async fn delete_package(&self, root: &Path, folder_name: &str) -> Result<()> {
        let target = package_dir(root, folder_name)?;
        if !target.is_dir() {
            return Err(LauncherError::NotFound(format!(
                "Addon folder {} not found",
                folder_name
            )));
        }

        tokio::fs::remove_dir_all(&target).await.map_err(|e| {
            LauncherError::Filesystem(format!("Failed to delete {}: {}", target.display(), e))
        })?;
        log::info!("Deleted addon folder {}", target.display());
        Ok(())
    }

    /// Удалить папки по одной; ошибка одной не останавливает остальные
    pub async fn delete_packages(&self, root: &Path, folder_names: &[String]) -> Vec<CommandResult> {
        let mut results = Vec::with_capacity(folder_names.len());
        for folder_name in folder_names {
            let result = self.delete_package(root, folder_name).await;
            if let Err(e) = &result {
                log::warn!("Failed to delete addon {}: {}", folder_name, e);
            }
            results.push(result.into());
        }
        results
    }

    /// Распаковать архив пользователя в папку аддонов. Сам архив не трогаем
    pub async fn install_from_archive(&self, root: &Path, archive: &Path) -> Result<ExtractedArchive> {
        if !archive.is_file() {
            return Err(LauncherError::NotFound(format!(
                "Archive {} not found",
                archive.display()
            )));
        }

        tokio::fs::create_dir_all(root).await?;
        let extracted = extract_archive(archive, root, &self.locks, &CancellationToken::new()).await?;
        log::info!(
            "Installed {} into {}",
            archive.display(),
            extracted.final_path.display()
        );
        Ok(extracted)
    }

    /// Скачать аддон каталога и распаковать. Вся операция ограничена `install_timeout`;
    /// по таймауту работа отменяется и дожидается отката, корень остаётся как был
    pub async fn install_catalog_addon(
        &self,
        root: &Path,
        entry: &CatalogEntry,
    ) -> Result<ExtractedArchive> {
        let url = entry.download_url.as_deref().ok_or_else(|| {
            LauncherError::InvalidTarget(format!("{} has no download URL", entry.title))
        })?;

        let workdir = std::env::temp_dir().join(format!("azeroth-addon-{}", uuid::Uuid::new_v4()));
        let cancel = CancellationToken::new();

        let work = self.download_and_extract(url, root, &workdir, &cancel);
        tokio::pin!(work);

        let outcome = tokio::select! {
            result = &mut work => Ok(result),
            _ = tokio::time::sleep(self.install_timeout) => {
                // Ждём, пока загрузка и распаковка остановятся и откатятся
                cancel.cancel();
                Err(work.await)
            }
        };

        remove_path(&workdir).await;

        match outcome {
            Ok(result) => result,
            Err(late) => {
                // Распаковка успела закончиться в момент таймаута: убираем её
                if let Ok(extracted) = late {
                    extracted.remove().await;
                }
                log::error!(
                    "Install of {} timed out after {:?}",
                    entry.title,
                    self.install_timeout
                );
                Err(LauncherError::Timeout(format!(
                    "Installing {} took longer than {}s",
                    entry.title,
                    self.install_timeout.as_secs()
                )))
            }
        }
    }

    async fn download_and_extract(
        &self,
        url: &str,
        root: &Path,
        workdir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ExtractedArchive> {
        tokio::fs::create_dir_all(workdir).await?;

        // прогресс установки аддона никому не нужен
        let (events, _rx) = mpsc::unbounded_channel();
        let archive = self
            .http
            .fetch(FetchRequest {
                uri: url,
                destination_root: workdir,
                events: &events,
                cancel,
            })
            .await?;

        if ArchiveFormat::detect(&archive).is_none() {
            return Err(LauncherError::Extraction(format!(
                "{} is not a supported archive",
                url
            )));
        }

        tokio::fs::create_dir_all(root).await?;
        extract_archive(&archive, root, &self.locks, cancel).await
    }
}

/// Путь папки аддона; имя не может выходить за пределы корня
fn package_dir(root: &Path, folder_name: &str) -> Result<PathBuf> {
    let name = folder_name.trim();
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains(':')
    {
        return Err(LauncherError::InvalidConfig(format!(
            "Invalid addon folder name: {:?}",
            folder_name
        )));
    }
    Ok(root.join(name))
}

impl From<&ExtractedArchive> for CommandResult {
    fn from(extracted: &ExtractedArchive) -> Self {
        CommandResult::ok_with(format!("Installed to {}", extracted.final_path.display()))
    }
}
