//! Каталог аддонов: встроенный список, обновление с сервера, поиск

use azeroth_core::{CatalogEntry, DisplayPackage, LauncherError, Result};
use azeroth_db::CatalogCache;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{LazyLock, RwLock};

use crate::utils::fetch_json;

/// Список, вшитый в бинарник
const BUNDLED_CATALOG: &str = include_str!("../../data/catalog.json");

/// Дата загрузки картинки в URL: `/2023/04/`
static IMAGE_DATE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"/(\d{4})/(\d{2})/").ok());

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogSort {
    /// Порядок каталога
    #[default]
    #[serde(rename = "popular")]
    Popular,
    #[serde(rename = "newest")]
    Newest,
    #[serde(rename = "a-z")]
    TitleAsc,
    #[serde(rename = "z-a")]
    TitleDesc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogQuery {
    pub search: String,
    pub sort: CatalogSort,
    /// С единицы
    pub page: usize,
    pub page_size: usize,
}

impl Default for CatalogQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            sort: CatalogSort::Popular,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPage {
    pub entries: Vec<CatalogEntry>,
    /// Всего совпадений до пагинации
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

/// Каталог метаданных. Движок его только читает
pub struct Catalog {
    entries: RwLock<Vec<CatalogEntry>>,
    cache: Option<CatalogCache>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
            cache: None,
        }
    }

    pub fn bundled_entries() -> Result<Vec<CatalogEntry>> {
        Ok(serde_json::from_str(BUNDLED_CATALOG)?)
    }

    /// Кеш последнего обновления, иначе встроенный список
    pub fn load(cache: CatalogCache) -> Result<Self> {
        let cached = match cache.load() {
            Ok(Some(snapshot)) => match serde_json::from_str::<Vec<CatalogEntry>>(&snapshot.body) {
                Ok(entries) if !entries.is_empty() => {
                    log::info!(
                        "Loaded {} catalog entries cached from {} at {}",
                        entries.len(),
                        snapshot.source_url,
                        snapshot.fetched_at
                    );
                    Some(entries)
                }
                Ok(_) => None,
                Err(e) => {
                    log::warn!("Cached catalog is corrupt, using bundled list: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                log::warn!("Failed to read catalog cache: {}", e);
                None
            }
        };

        let entries = match cached {
            Some(entries) => entries,
            None => Self::bundled_entries()?,
        };

        Ok(Self {
            entries: RwLock::new(entries),
            cache: Some(cache),
        })
    }

    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Загрузить каталог по `url`. При ошибке текущий список не меняется
    pub async fn refresh(&self, url: &str) -> Result<usize> {
        let fetched: Vec<CatalogEntry> = fetch_json(url).await?;
        if fetched.is_empty() {
            return Err(LauncherError::ApiError(format!(
                "Catalog at {} is empty",
                url
            )));
        }

        if let Some(cache) = self.cache.clone() {
            let body = serde_json::to_string(&fetched)?;
            let source = url.to_string();
            let stored = tokio::task::spawn_blocking(move || cache.store(&body, &source)).await?;
            if let Err(e) = stored {
                log::warn!("Failed to cache catalog: {}", e);
            }
        }

        let count = fetched.len();
        *self.entries.write().unwrap_or_else(|e| e.into_inner()) = fetched;
        log::info!("Catalog refreshed from {}: {} entries", url, count);
        Ok(count)
    }

    pub fn browse(&self, query: &CatalogQuery) -> CatalogPage {
        let needle = query.search.trim().to_lowercase();
        let mut matches: Vec<CatalogEntry> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|entry| {
                needle.is_empty()
                    || entry.title.to_lowercase().contains(&needle)
                    || entry.description.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();

        match query.sort {
            CatalogSort::Popular => {}
            CatalogSort::Newest => {
                matches.sort_by_key(|entry| std::cmp::Reverse(image_date(entry.image.as_deref())))
            }
            CatalogSort::TitleAsc => matches.sort_by(|a, b| compare_titles(&a.title, &b.title)),
            CatalogSort::TitleDesc => matches.sort_by(|a, b| compare_titles(&b.title, &a.title)),
        }

        let page_size = query.page_size.max(1);
        let page = query.page.max(1);
        let total = matches.len();
        let total_pages = total.div_ceil(page_size);

        let entries = matches
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();

        CatalogPage {
            entries,
            total,
            page,
            page_size,
            total_pages,
        }
    }
}

fn compare_titles(a: &str, b: &str) -> std::cmp::Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// `YYYYMM` из URL картинки, 0 если даты нет
fn image_date(url: Option<&str>) -> u32 {
    let (Some(url), Some(re)) = (url, IMAGE_DATE.as_ref()) else {
        return 0;
    };
    re.captures(url)
        .and_then(|caps| {
            let year: u32 = caps.get(1)?.as_str().parse().ok()?;
            let month: u32 = caps.get(2)?.as_str().parse().ok()?;
            Some(year * 100 + month)
        })
        .unwrap_or(0)
}

/// Установлен ли аддон каталога среди найденных пакетов
pub fn is_installed(entry: &CatalogEntry, installed: &[DisplayPackage]) -> bool {
    installed.iter().any(|package| {
        package.title.eq_ignore_ascii_case(&entry.title)
            || (entry.detail_url.is_some() && package.detail_url == entry.detail_url)
    })
}
