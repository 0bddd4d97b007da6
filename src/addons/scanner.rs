//! Сканер установленных аддонов (только чтение)

use azeroth_core::RawPackageEntry;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Цветовые коды клиента: `|cAARRGGBB` и `|r`
static COLOR_CODES: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\|c[0-9A-Fa-f]{8}|\|r").ok());

/// Перечислить папки аддонов в `root`.
///
/// Файлы и скрытые директории (в т.ч. staging распаковки) пропускаются.
/// Отсутствующий или нечитаемый корень даёт пустой список.
pub fn scan_packages(root: &Path) -> Vec<RawPackageEntry> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Cannot read addons dir {}: {}", root.display(), e);
            return Vec::new();
        }
    };

    let mut packages: Vec<RawPackageEntry> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| {
            let folder_name = entry.file_name().to_string_lossy().to_string();
            if folder_name.starts_with('.') {
                return None;
            }
            Some(read_package(&entry.path(), folder_name))
        })
        .collect();

    packages.sort_by(|a, b| {
        a.folder_name
            .to_lowercase()
            .cmp(&b.folder_name.to_lowercase())
            .then_with(|| a.folder_name.cmp(&b.folder_name))
    });

    log::debug!("Found {} addon folder(s) in {}", packages.len(), root.display());
    packages
}

fn read_package(dir: &Path, folder_name: String) -> RawPackageEntry {
    let content = find_descriptor(dir, &folder_name).and_then(|toc| {
        fs::read(&toc)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .map_err(|e| log::debug!("Cannot read {}: {}", toc.display(), e))
            .ok()
    });

    match content {
        Some(content) => parse_toc(&content, &folder_name),
        None => RawPackageEntry::new(folder_name),
    }
}

/// `<folder>/<folder>.toc`, иначе первый `*.toc` по имени
fn find_descriptor(dir: &Path, folder_name: &str) -> Option<PathBuf> {
    let exact = dir.join(format!("{}.toc", folder_name));
    if exact.is_file() {
        return Some(exact);
    }

    let mut tocs: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("toc"))
                    .unwrap_or(false)
        })
        .collect();
    tocs.sort();
    tocs.into_iter().next()
}

/// Разобрать заголовок `.toc` (строки `## Key: Value`)
pub fn parse_toc(content: &str, folder_name: &str) -> RawPackageEntry {
    let mut entry = RawPackageEntry::new(folder_name);

    for line in content.lines() {
        let Some(meta) = line.trim().strip_prefix("##") else {
            continue;
        };
        let Some((key, value)) = meta.split_once(':') else {
            continue;
        };
        let value = strip_color_codes(value.trim());
        if value.is_empty() {
            continue;
        }

        match key.trim().to_ascii_lowercase().as_str() {
            "title" => entry.title = value,
            "author" => entry.author = Some(value),
            "version" => entry.version = Some(value),
            "notes" => entry.notes = Some(value),
            _ => {}
        }
    }

    entry
}

fn strip_color_codes(text: &str) -> String {
    match COLOR_CODES.as_ref() {
        Some(re) => re.replace_all(text, "").trim().to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("azeroth_scan_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_toc_strips_color_codes() {
        let toc = "\u{feff}## Interface: 30300\n## Title: |cffffd200Deadly Boss Mods|r |cff69ccf0Core|r\n## Author: Tandanu\n## Version: 4.52\n## Notes:   \n";
        let entry = parse_toc(toc, "DBM-Core");
        assert_eq!(entry.folder_name, "DBM-Core");
        assert_eq!(entry.title, "Deadly Boss Mods Core");
        assert_eq!(entry.author.as_deref(), Some("Tandanu"));
        assert_eq!(entry.version.as_deref(), Some("4.52"));
        assert_eq!(entry.notes, None);
    }

    #[test]
    fn test_missing_title_falls_back_to_folder() {
        let entry = parse_toc("## Interface: 30300\nRecount.lua\n", "Recount");
        assert_eq!(entry.title, "Recount");
    }

    #[test]
    fn test_scan_skips_files_and_hidden_dirs() {
        let root = temp_root();
        fs::create_dir_all(root.join("Recount")).unwrap();
        fs::write(root.join("Recount/Recount.toc"), "## Title: Recount").unwrap();
        fs::create_dir_all(root.join("atlasloot")).unwrap();
        fs::create_dir_all(root.join("Questie")).unwrap();
        fs::write(root.join("Questie/Questie-335.toc"), "## Title: |cFF00FF00Questie|r").unwrap();
        fs::create_dir_all(root.join(".azeroth-extract-123/Partial")).unwrap();
        fs::write(root.join("readme.txt"), "not an addon").unwrap();

        let found = scan_packages(&root);
        let names: Vec<_> = found.iter().map(|e| e.folder_name.as_str()).collect();
        assert_eq!(names, vec!["atlasloot", "Questie", "Recount"]);
        assert_eq!(found[1].title, "Questie");
        assert_eq!(found[0].title, "atlasloot");

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_missing_root_is_empty() {
        let missing = std::env::temp_dir().join(format!("azeroth_missing_{}", uuid::Uuid::new_v4()));
        assert!(scan_packages(&missing).is_empty());
    }
}
