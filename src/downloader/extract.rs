//! Распаковка архивов после загрузки
//!
//! Архив распаковывается в скрытую staging-директорию внутри корня
//! назначения и переносится на место переименованием. Сканер аддонов
//! скрытые директории пропускает, поэтому полураспакованное содержимое
//! никогда не попадает в список пакетов.

use azeroth_core::{LauncherError, Result};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub const STAGING_PREFIX: &str = ".azeroth-extract-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Определить формат по имени файла
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else {
            None
        }
    }
}

/// Корни, в которые сейчас идёт распаковка (со счётчиком распаковок)
#[derive(Debug, Clone, Default)]
pub struct ExtractionLocks {
    roots: Arc<Mutex<HashMap<PathBuf, usize>>>,
}

impl ExtractionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, root: &Path) -> ExtractionGuard {
        let mut roots = self.roots.lock().unwrap_or_else(|e| e.into_inner());
        *roots.entry(root.to_path_buf()).or_insert(0) += 1;
        ExtractionGuard {
            locks: self.clone(),
            root: root.to_path_buf(),
        }
    }

    pub fn is_locked(&self, root: &Path) -> bool {
        let roots = self.roots.lock().unwrap_or_else(|e| e.into_inner());
        roots.contains_key(root)
    }
}

/// Снимает блокировку корня при drop
pub struct ExtractionGuard {
    locks: ExtractionLocks,
    root: PathBuf,
}

impl Drop for ExtractionGuard {
    fn drop(&mut self) {
        let mut roots = self.locks.roots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = roots.get_mut(&self.root) {
            *count -= 1;
            if *count == 0 {
                roots.remove(&self.root);
            }
        }
    }
}

/// Что появилось в корне после распаковки
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArchive {
    /// Единственная верхняя директория архива, иначе сам корень
    pub final_path: PathBuf,
    /// Верхнеуровневые записи, перенесённые в корень
    pub entries: Vec<PathBuf>,
}

impl ExtractedArchive {
    /// Удалить всё, что было распаковано (отмена после коммита)
    pub async fn remove(&self) {
        for entry in &self.entries {
            remove_path(entry).await;
        }
    }
}

/// Удалить файл или директорию, ошибки только логируются
pub(crate) async fn remove_path(path: &Path) {
    let result = if path.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    if let Err(e) = result {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

/// Распаковать архив в `destination_root`
pub async fn extract_archive(
    archive: &Path,
    destination_root: &Path,
    locks: &ExtractionLocks,
    cancel: &CancellationToken,
) -> Result<ExtractedArchive> {
    let format = ArchiveFormat::detect(archive).ok_or_else(|| {
        LauncherError::Extraction(format!("Unsupported archive format: {}", archive.display()))
    })?;

    // Guard живёт в blocking-задаче: корень занят, пока идёт запись,
    // даже если ожидающий future уже брошен
    let guard = locks.acquire(destination_root);
    let archive = archive.to_path_buf();
    let root = destination_root.to_path_buf();
    let cancel = cancel.clone();

    log::info!("Extracting {} into {}", archive.display(), root.display());

    let extracted = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        let staging = root.join(format!("{}{}", STAGING_PREFIX, uuid::Uuid::new_v4()));
        fs::create_dir_all(&staging)?;

        let unpacked = match format {
            ArchiveFormat::Zip => unpack_zip(&archive, &staging, &cancel),
            ArchiveFormat::TarGz => unpack_tar_gz(&archive, &staging, &cancel),
        };

        let result = unpacked.and_then(|_| commit_staging(&staging, &root, &cancel));
        remove_dir_logged(&staging);
        result
    })
    .await??;

    log::info!(
        "Extracted {} top-level entr{} -> {}",
        extracted.entries.len(),
        if extracted.entries.len() == 1 { "y" } else { "ies" },
        extracted.final_path.display()
    );

    Ok(extracted)
}

fn unpack_zip(archive: &Path, staging: &Path, cancel: &CancellationToken) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| LauncherError::Extraction(format!("{}: {}", archive.display(), e)))?;

    for i in 0..zip.len() {
        if cancel.is_cancelled() {
            return Err(LauncherError::OperationCancelled);
        }

        let mut entry = zip
            .by_index(i)
            .map_err(|e| LauncherError::Extraction(format!("entry {}: {}", i, e)))?;
        let outpath = match entry.enclosed_name() {
            Some(path) => staging.join(path),
            None => {
                log::warn!("Skipping unsafe archive entry: {}", entry.name());
                continue;
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&outpath)?;
            std::io::copy(&mut entry, &mut outfile)
                .map_err(|e| LauncherError::Extraction(format!("{}: {}", entry.name(), e)))?;
        }
    }

    Ok(())
}

fn unpack_tar_gz(archive: &Path, staging: &Path, cancel: &CancellationToken) -> Result<()> {
    let file = File::open(archive)?;
    let gz = flate2::read::GzDecoder::new(file);
    let mut tar = tar::Archive::new(gz);

    let entries = tar
        .entries()
        .map_err(|e| LauncherError::Extraction(format!("{}: {}", archive.display(), e)))?;
    for entry in entries {
        if cancel.is_cancelled() {
            return Err(LauncherError::OperationCancelled);
        }
        let mut entry = entry.map_err(|e| LauncherError::Extraction(e.to_string()))?;
        // unpack_in отказывается писать за пределы staging
        entry
            .unpack_in(staging)
            .map_err(|e| LauncherError::Extraction(e.to_string()))?;
    }

    Ok(())
}

fn remove_dir_logged(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Failed to remove {}: {}", dir.display(), e);
        }
    }
}

fn remove_path_sync(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Перенести содержимое staging в корень (существующие записи заменяются)
fn commit_staging(
    staging: &Path,
    root: &Path,
    cancel: &CancellationToken,
) -> Result<ExtractedArchive> {
    let mut names: Vec<_> = fs::read_dir(staging)?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name())
        .collect();
    names.sort();

    if names.is_empty() {
        return Err(LauncherError::Extraction("Archive is empty".to_string()));
    }

    let entries = commit_entries(staging, root, &names, cancel)?;
    let final_path = match entries.as_slice() {
        [single] if single.is_dir() => single.clone(),
        _ => root.to_path_buf(),
    };

    Ok(ExtractedArchive {
        final_path,
        entries,
    })
}

/// Одна перенесённая запись и, если была, заменённая ею старая
struct Committed {
    target: PathBuf,
    replaced: Option<PathBuf>,
}

/// Перенос всё-или-ничего. Заменяемые записи сначала уезжают в скрытую
/// backup-директорию; при ошибке или отмене всё возвращается как было
fn commit_entries(
    staging: &Path,
    root: &Path,
    names: &[std::ffi::OsString],
    cancel: &CancellationToken,
) -> Result<Vec<PathBuf>> {
    let backup = root.join(format!("{}{}-old", STAGING_PREFIX, uuid::Uuid::new_v4()));
    let mut committed: Vec<Committed> = Vec::with_capacity(names.len());

    let result = (|| -> Result<()> {
        for name in names {
            if cancel.is_cancelled() {
                return Err(LauncherError::OperationCancelled);
            }

            let from = staging.join(name);
            let target = root.join(name);
            let replaced = if target.exists() {
                fs::create_dir_all(&backup)?;
                let moved = backup.join(name);
                fs::rename(&target, &moved)?;
                Some(moved)
            } else {
                None
            };

            if let Err(e) = fs::rename(&from, &target) {
                if let Some(moved) = &replaced {
                    if let Err(restore_err) = fs::rename(moved, &target) {
                        log::error!("Failed to restore {}: {}", target.display(), restore_err);
                    }
                }
                return Err(LauncherError::Io(e));
            }
            committed.push(Committed { target, replaced });
        }
        Ok(())
    })();

    if let Err(e) = result {
        log::warn!(
            "Commit into {} failed ({}), rolling back {} entr{}",
            root.display(),
            e,
            committed.len(),
            if committed.len() == 1 { "y" } else { "ies" }
        );
        for entry in committed.iter().rev() {
            if let Err(remove_err) = remove_path_sync(&entry.target) {
                log::error!("Failed to remove {}: {}", entry.target.display(), remove_err);
                continue;
            }
            if let Some(moved) = &entry.replaced {
                if let Err(restore_err) = fs::rename(moved, &entry.target) {
                    log::error!("Failed to restore {}: {}", entry.target.display(), restore_err);
                }
            }
        }
        remove_dir_logged(&backup);
        return Err(e);
    }

    remove_dir_logged(&backup);
    Ok(committed.into_iter().map(|c| c.target).collect())
}


#[cfg(test)]
mod tests {
    use super::test_support::write_zip;
    use super::*;

    fn temp_root() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("azeroth_extract_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(ArchiveFormat::detect(Path::new("a/WoW.ZIP")), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::detect(Path::new("x.tar.gz")), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::detect(Path::new("x.tgz")), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::detect(Path::new("Wow.exe")), None);
    }

    #[tokio::test]
    async fn test_single_top_level_dir_becomes_final_path() {
        let root = temp_root();
        let archive = root.join("client.zip");
        write_zip(
            &archive,
            &[("WoW 3.3.5a/Wow.exe", "mz"), ("WoW 3.3.5a/Data/common.MPQ", "mpq")],
        );

        let locks = ExtractionLocks::new();
        let extracted = extract_archive(&archive, &root, &locks, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(extracted.final_path, root.join("WoW 3.3.5a"));
        assert!(root.join("WoW 3.3.5a/Data/common.MPQ").is_file());
        assert!(!locks.is_locked(&root));

        // staging не остаётся
        let leftovers = fs::read_dir(&root)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(STAGING_PREFIX))
            .count();
        assert_eq!(leftovers, 0);

        let _ = fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_multiple_top_level_entries_use_root() {
        let root = temp_root();
        let archive = root.join("addon.zip");
        write_zip(
            &archive,
            &[("Recount/Recount.toc", "## Title: Recount"), ("Recount_Modes/x.lua", "")],
        );

        let extracted = extract_archive(
            &archive,
            &root,
            &ExtractionLocks::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(extracted.final_path, root);
        assert_eq!(
            extracted.entries,
            vec![root.join("Recount"), root.join("Recount_Modes")]
        );

        extracted.remove().await;
        assert!(!root.join("Recount").exists());

        let _ = fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_cancelled_extraction_leaves_nothing() {
        let root = temp_root();
        let archive = root.join("client.zip");
        write_zip(&archive, &[("Game/Wow.exe", "mz")]);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = extract_archive(&archive, &root, &ExtractionLocks::new(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, LauncherError::OperationCancelled));
        let names: Vec<_> = fs::read_dir(&root)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["client.zip"]);

        let _ = fs::remove_dir_all(root);
    }

    fn hidden_leftovers(root: &Path) -> usize {
        fs::read_dir(root)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(STAGING_PREFIX))
            .count()
    }

    #[test]
    fn test_failed_commit_restores_replaced_entries() {
        let root = temp_root();
        fs::create_dir_all(root.join("Recount")).unwrap();
        fs::write(root.join("Recount/old.lua"), "old").unwrap();

        let staging = root.join(".staging-test");
        fs::create_dir_all(staging.join("Recount")).unwrap();
        fs::write(staging.join("Recount/new.lua"), "new").unwrap();

        // Вторая запись пропала из staging: перенос падает после первой
        let names: Vec<std::ffi::OsString> = vec!["Recount".into(), "Recount_Modes".into()];
        let err = commit_entries(&staging, &root, &names, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, LauncherError::Io(_)));

        assert!(root.join("Recount/old.lua").is_file());
        assert!(!root.join("Recount/new.lua").exists());
        assert!(!root.join("Recount_Modes").exists());
        assert_eq!(hidden_leftovers(&root), 0);

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_commit_after_cancel_touches_nothing() {
        let root = temp_root();
        fs::write(root.join("Bagnon"), "user file").unwrap();
        let staging = root.join(".staging-test");
        fs::create_dir_all(staging.join("Bagnon")).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = commit_staging(&staging, &root, &cancel).unwrap_err();

        assert!(matches!(err, LauncherError::OperationCancelled));
        assert_eq!(fs::read_to_string(root.join("Bagnon")).unwrap(), "user file");
        assert!(staging.join("Bagnon").is_dir());

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_commit_replaces_existing_entries() {
        let root = temp_root();
        fs::create_dir_all(root.join("Bagnon")).unwrap();
        fs::write(root.join("Bagnon/old.lua"), "old").unwrap();
        let staging = root.join(".staging-test");
        fs::create_dir_all(staging.join("Bagnon")).unwrap();
        fs::write(staging.join("Bagnon/new.lua"), "new").unwrap();

        let extracted = commit_staging(&staging, &root, &CancellationToken::new()).unwrap();
        assert_eq!(extracted.final_path, root.join("Bagnon"));
        assert!(root.join("Bagnon/new.lua").is_file());
        assert!(!root.join("Bagnon/old.lua").exists());
        assert_eq!(hidden_leftovers(&root), 0);

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_overlapping_locks_release_on_last_guard() {
        let locks = ExtractionLocks::new();
        let root = Path::new("/games/wotlk/Interface/AddOns");

        let first = locks.acquire(root);
        let second = locks.acquire(root);
        drop(first);
        assert!(locks.is_locked(root));
        drop(second);
        assert!(!locks.is_locked(root));
    }

    #[tokio::test]
    async fn test_corrupted_archive_is_extraction_error() {
        let root = temp_root();
        let archive = root.join("broken.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();

        let err = extract_archive(
            &archive,
            &root,
            &ExtractionLocks::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LauncherError::Extraction(_)));

        let _ = fs::remove_dir_all(root);
    }
}
