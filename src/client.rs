//! Файлы установленного клиента: realmlist, кеш, исполняемый файл

use azeroth_core::{LauncherError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::settings::DEFAULT_REALMLIST;
use crate::utils::atomic_write;

const REALMLIST_FILE: &str = "realmlist.wtf";

/// Имена исполняемого файла клиента (в нижнем регистре)
const EXECUTABLE_NAMES: [&str; 3] = ["wow.exe", "wowclassic.exe", "wow-64.exe"];

/// Папка аддонов внутри клиента
pub fn addons_dir(game_root: &Path) -> PathBuf {
    game_root.join("Interface").join("AddOns")
}

/// Локали в `Data/` (`enUS`, `ruRU`, ...)
fn locale_dirs(game_root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(game_root.join("Data")) else {
        return Vec::new();
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|e| is_locale_name(&e.file_name().to_string_lossy()))
        .map(|e| e.path())
        .collect();
    dirs.sort();
    dirs
}

fn is_locale_name(name: &str) -> bool {
    let chars: Vec<char> = name.chars().collect();
    chars.len() == 4
        && chars[..2].iter().all(|c| c.is_ascii_lowercase())
        && chars[2..].iter().all(|c| c.is_ascii_uppercase())
}

/// Существующие файлы realmlist. Если ни одного нет - куда его создать
pub fn realmlist_paths(game_root: &Path) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = locale_dirs(game_root)
        .into_iter()
        .map(|dir| dir.join(REALMLIST_FILE))
        .collect();
    candidates.push(game_root.join(REALMLIST_FILE));

    let existing: Vec<PathBuf> = candidates.iter().filter(|p| p.is_file()).cloned().collect();
    if !existing.is_empty() {
        return existing;
    }

    // 3.x читает файл из папки локали, 1.x - из корня
    vec![candidates.swap_remove(0)]
}

/// Текущая строка realmlist; без файла - значение по умолчанию
pub fn read_realmlist(game_root: &Path) -> Result<String> {
    let path = realmlist_paths(game_root)
        .into_iter()
        .find(|p| p.is_file());

    let Some(path) = path else {
        return Ok(DEFAULT_REALMLIST.to_string());
    };

    let bytes = fs::read(&path)?;
    let content = String::from_utf8_lossy(&bytes);
    let line = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or(DEFAULT_REALMLIST);
    Ok(line.to_string())
}

/// Переписать realmlist во всех местах, где его читает клиент
pub fn update_realmlist(game_root: &Path, content: &str) -> Result<Vec<PathBuf>> {
    let content = content.trim();
    if !content.to_lowercase().starts_with("set realmlist ") {
        return Err(LauncherError::InvalidConfig(format!(
            "Realmlist must look like \"{}\", got {:?}",
            DEFAULT_REALMLIST, content
        )));
    }
    if !game_root.is_dir() {
        return Err(LauncherError::NotFound(format!(
            "Game folder {} not found",
            game_root.display()
        )));
    }

    let paths = realmlist_paths(game_root);
    for path in &paths {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        atomic_write(path, format!("{}\n", content).as_bytes()).map_err(|e| {
            LauncherError::Filesystem(format!("Failed to write {}: {}", path.display(), e))
        })?;
        log::info!("Realmlist updated: {}", path.display());
    }
    Ok(paths)
}

/// Удалить папку `Cache` клиента. false - её и не было
pub fn clear_game_cache(game_root: &Path) -> Result<bool> {
    let cache = game_root.join("Cache");
    if !cache.exists() {
        return Ok(false);
    }
    fs::remove_dir_all(&cache)?;
    log::info!("Cleared game cache at {}", cache.display());
    Ok(true)
}

/// Найти исполняемый файл клиента (корень и пара уровней вглубь)
pub fn find_executable(game_root: &Path) -> Option<PathBuf> {
    WalkDir::new(game_root)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .find(|e| {
            let name = e.file_name().to_string_lossy().to_lowercase();
            EXECUTABLE_NAMES.contains(&name.as_str())
        })
        .map(|e| e.into_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_game() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("azeroth_client_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_read_default_without_file() {
        let root = temp_game();
        assert_eq!(read_realmlist(&root).unwrap(), DEFAULT_REALMLIST);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_update_locale_realmlist() {
        let root = temp_game();
        fs::create_dir_all(root.join("Data/enUS")).unwrap();
        fs::create_dir_all(root.join("Data/patches")).unwrap();

        let written = update_realmlist(&root, "  set realmlist logon.example.org ").unwrap();
        assert_eq!(written, vec![root.join("Data/enUS/realmlist.wtf")]);
        assert_eq!(
            read_realmlist(&root).unwrap(),
            "set realmlist logon.example.org"
        );

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_update_rewrites_every_existing_copy() {
        let root = temp_game();
        fs::create_dir_all(root.join("Data/ruRU")).unwrap();
        fs::write(root.join("Data/ruRU/realmlist.wtf"), "set realmlist old\r\n").unwrap();
        fs::write(root.join("realmlist.wtf"), "set realmlist old").unwrap();

        let written = update_realmlist(&root, "set realmlist new.example.org").unwrap();
        assert_eq!(written.len(), 2);
        for path in written {
            assert_eq!(
                fs::read_to_string(path).unwrap(),
                "set realmlist new.example.org\n"
            );
        }

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_vanilla_layout_uses_root_file() {
        let root = temp_game();
        update_realmlist(&root, "set realmlist logon.twinstar.cz").unwrap();
        assert!(root.join("realmlist.wtf").is_file());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_rejects_garbage_realmlist() {
        let root = temp_game();
        let err = update_realmlist(&root, "rm -rf /").unwrap_err();
        assert!(matches!(err, LauncherError::InvalidConfig(_)));
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_clear_cache_and_find_executable() {
        let root = temp_game();
        fs::create_dir_all(root.join("Cache/WDB")).unwrap();
        fs::write(root.join("Wow.exe"), "MZ").unwrap();

        assert!(clear_game_cache(&root).unwrap());
        assert!(!root.join("Cache").exists());
        assert!(!clear_game_cache(&root).unwrap());

        assert_eq!(find_executable(&root), Some(root.join("Wow.exe")));
        assert_eq!(addons_dir(&root), root.join("Interface").join("AddOns"));

        let _ = fs::remove_dir_all(root);
    }
}
