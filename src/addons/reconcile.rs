//! Сопоставление установленных пакетов с каталогом

use azeroth_core::{CatalogEntry, DisplayPackage, PackageGroup};

/// Известные несовпадения имени папки и названия в каталоге
const TITLE_OVERRIDES: [(&str, &str); 4] = [
    ("DBM-Core", "Deadly Boss Mods"),
    ("AtlasLoot", "AtlasLoot Enhanced"),
    ("Recount", "Recount"),
    ("Questie", "Questie"),
];

/// Подстрочные совпадения только для названий длиннее этого
const MIN_FUZZY_LEN: usize = 3;

fn search_title(title: &str) -> &str {
    TITLE_OVERRIDES
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(title))
        .map(|(_, mapped)| *mapped)
        .unwrap_or(title)
}

/// Лучшая запись каталога для заголовка, по уровням:
/// точное совпадение, название каталога внутри заголовка, заголовок внутри названия каталога
pub fn find_catalog_match<'a>(title: &str, catalog: &'a [CatalogEntry]) -> Option<&'a CatalogEntry> {
    let wanted = search_title(title).to_lowercase();
    let wanted_len = wanted.chars().count();

    catalog
        .iter()
        .find(|entry| entry.title.to_lowercase() == wanted)
        .or_else(|| {
            catalog.iter().find(|entry| {
                entry.title.chars().count() > MIN_FUZZY_LEN
                    && wanted.contains(&entry.title.to_lowercase())
            })
        })
        .or_else(|| {
            if wanted_len <= MIN_FUZZY_LEN {
                return None;
            }
            catalog
                .iter()
                .find(|entry| entry.title.to_lowercase().contains(&wanted))
        })
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Группы -> записи для UI. Пакеты никогда не теряются
pub fn reconcile(groups: Vec<PackageGroup>, catalog: &[CatalogEntry]) -> Vec<DisplayPackage> {
    groups
        .into_iter()
        .map(|group| {
            let PackageGroup { primary, modules } = group;
            let meta = find_catalog_match(&primary.title, catalog);

            if let Some(meta) = meta {
                log::debug!("Matched {} -> {}", primary.folder_name, meta.title);
            }

            DisplayPackage {
                title: meta
                    .map(|m| m.title.clone())
                    .unwrap_or_else(|| primary.title.clone()),
                author: meta
                    .and_then(|m| non_empty(&m.author))
                    .or_else(|| primary.author.clone()),
                description: meta
                    .and_then(|m| non_empty(&m.description))
                    .or_else(|| primary.notes.clone()),
                image: meta.and_then(|m| m.image.clone()),
                detail_url: meta.and_then(|m| m.detail_url.clone()),
                game_version: meta.and_then(|m| m.game_version.clone()),
                matched: meta.is_some(),
                original_title: primary.title,
                version: primary.version,
                folder_name: primary.folder_name,
                modules,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use azeroth_core::RawPackageEntry;

    fn entry(title: &str) -> CatalogEntry {
        CatalogEntry {
            title: title.to_string(),
            author: "someone".to_string(),
            description: format!("{} description", title),
            image: None,
            detail_url: Some(format!("https://addons.example.com/{}", title)),
            download_url: None,
            game_version: Some("3.3.5a".to_string()),
        }
    }

    fn catalog() -> Vec<CatalogEntry> {
        vec![
            entry("AtlasLoot Enhanced"),
            entry("Deadly Boss Mods"),
            entry("Recount"),
            entry("Questie"),
            entry("Bagnon"),
        ]
    }

    #[test]
    fn test_override_maps_folder_to_catalog_title() {
        let groups = vec![PackageGroup::singleton(RawPackageEntry::new("AtlasLoot"))];
        let display = reconcile(groups, &catalog());
        assert_eq!(display[0].title, "AtlasLoot Enhanced");
        assert_eq!(display[0].original_title, "AtlasLoot");
        assert_eq!(display[0].folder_name, "AtlasLoot");
        assert!(display[0].matched);
    }

    #[test]
    fn test_unknown_package_keeps_folder_name() {
        let groups = vec![PackageGroup::singleton(
            RawPackageEntry::new("MyCustomAddon").with_title("MyCustomAddon"),
        )];
        let display = reconcile(groups, &catalog());
        assert_eq!(display.len(), 1);
        assert_eq!(display[0].title, "MyCustomAddon");
        assert!(!display[0].matched);
        assert!(display[0].detail_url.is_none());
    }

    #[test]
    fn test_override_is_case_insensitive() {
        let catalog = catalog();
        let found = find_catalog_match("dbm-core", &catalog).unwrap();
        assert_eq!(found.title, "Deadly Boss Mods");
    }

    #[test]
    fn test_exact_match_beats_substring() {
        let catalog = vec![entry("Bagnon Forever"), entry("Bagnon")];
        assert_eq!(find_catalog_match("bagnon", &catalog).unwrap().title, "Bagnon");
    }

    #[test]
    fn test_catalog_title_inside_folder_title() {
        let catalog = catalog();
        let found = find_catalog_match("Bagnon_GuildBank", &catalog).unwrap();
        assert_eq!(found.title, "Bagnon");
    }

    #[test]
    fn test_folder_title_inside_catalog_title() {
        let catalog = catalog();
        let found = find_catalog_match("Deadly Boss", &catalog).unwrap();
        assert_eq!(found.title, "Deadly Boss Mods");
    }

    #[test]
    fn test_short_titles_never_fuzzy_match() {
        let catalog = vec![entry("DBM"), entry("XPerl")];
        assert!(find_catalog_match("DB", &catalog).is_none());
        assert!(find_catalog_match("DBM Classic", &catalog).is_none());
    }

    #[test]
    fn test_toc_metadata_fills_gaps() {
        let mut primary = RawPackageEntry::new("Gatherer");
        primary.author = Some("Norganna".to_string());
        primary.notes = Some("Herb and ore tracker".to_string());
        primary.version = Some("3.1.14".to_string());

        let display = reconcile(vec![PackageGroup::singleton(primary)], &[]);
        assert_eq!(display[0].author.as_deref(), Some("Norganna"));
        assert_eq!(display[0].description.as_deref(), Some("Herb and ore tracker"));
        assert_eq!(display[0].version.as_deref(), Some("3.1.14"));
    }
}
