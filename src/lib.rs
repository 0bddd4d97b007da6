use chrono::Local;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};
use tokio::sync::broadcast;

// External workspace crates
pub use azeroth_core::{
    CatalogEntry, CommandResult, DisplayPackage, DownloadKind, DownloadSession, DownloadState,
    DownloadTarget, ErrorInfo, LauncherError, PackageGroup, PathStore, RawPackageEntry, Result,
};
use azeroth_db::{CatalogCache, Database, SqlitePathStore};

// Local modules
pub mod addons;
pub mod client;
pub mod downloader;
pub mod games;
pub mod paths;
pub mod settings;
pub mod transport;
pub mod utils;

use addons::{AddonManager, Catalog, CatalogPage, CatalogQuery};
use downloader::{DownloadEvent, DownloadManager, ExtractionLocks, FallbackResolver};
use games::GameId;
use paths::AppPaths;
use settings::{Settings, SettingsManager};
use transport::{DownloadConfig, SwarmBackend};

/// User-Agent для HTTP запросов
/// Формат: project/component/version
pub const USER_AGENT: &str = concat!("azeroth-legacy/launcher/", env!("CARGO_PKG_VERSION"));

/// Сколько дней хранить логи лаунчера
const LOG_RETENTION_DAYS: u64 = 7;

// ========== Logging ==========

/// Строка лога для UI консоли
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
}

// Канал строк лога для UI (подписчики через subscribe_logs)
static LOG_EVENTS: OnceLock<broadcast::Sender<LogEntry>> = OnceLock::new();

fn log_events() -> &'static broadcast::Sender<LogEntry> {
    LOG_EVENTS.get_or_init(|| broadcast::channel(512).0)
}

/// Подписаться на строки лога
pub fn subscribe_logs() -> broadcast::Receiver<LogEntry> {
    log_events().subscribe()
}

/// Writer для fern: пересылает разобранные строки в канал
struct LogForwarder;

impl Write for LogForwarder {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(log_line) = std::str::from_utf8(buf) {
            if let Some(entry) = parse_log_line(log_line.trim()) {
                let _ = log_events().send(entry);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Parse a fern log line into structured data
fn parse_log_line(line: &str) -> Option<LogEntry> {
    // Format: [2024-12-04 16:48:12.345 INFO target] message
    if !line.starts_with('[') {
        return None;
    }

    let close_bracket = line.find(']')?;
    let header = &line[1..close_bracket];
    let message = line[close_bracket + 1..].trim();

    let parts: Vec<&str> = header.splitn(4, ' ').collect();
    if parts.len() < 4 {
        return None;
    }

    Some(LogEntry {
        timestamp: format!("{} {}", parts[0], parts[1]),
        level: parts[2].to_string(),
        target: parts[3].to_string(),
        message: message.to_string(),
    })
}

/// Setup logging with file output for debugging release builds
pub fn setup_logging(logs_dir: &Path) {
    let _ = fs::create_dir_all(logs_dir);

    // One log file per launch
    let session_id = Local::now().timestamp();
    let log_file = logs_dir.join(format!("launcher_{}.log", session_id));

    let file_logger = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Debug)
        .level_for("hyper", log::LevelFilter::Warn)
        .level_for("hyper_util", log::LevelFilter::Warn)
        .level_for("reqwest", log::LevelFilter::Warn)
        .level_for("rustls", log::LevelFilter::Warn);

    let file_output: fern::Output = match fern::log_file(&log_file) {
        Ok(file) => file.into(),
        Err(_) => fern::Output::writer(Box::new(std::io::sink()), "\n"),
    };

    let ui_output = fern::Output::writer(Box::new(LogForwarder), "\n");

    // In debug mode: log to console + file + UI
    #[cfg(debug_assertions)]
    let logger = file_logger
        .chain(std::io::stdout())
        .chain(file_output)
        .chain(ui_output);

    #[cfg(not(debug_assertions))]
    let logger = file_logger.chain(file_output).chain(ui_output);

    if let Err(e) = logger.apply() {
        eprintln!("Failed to initialize logger: {}", e);
    }

    log::info!("=== Azeroth Legacy launcher started ===");
    log::info!("Session ID: {}", session_id);
    log::info!("Log file: {:?}", log_file);
}

// ========== Launcher ==========

/// Параметры запуска движка
#[derive(Default)]
pub struct LauncherOptions {
    /// Директория данных. None = системная
    pub base_dir: Option<PathBuf>,
    /// Реализация swarm-загрузок. Без неё magnet-источники пропускаются
    pub swarm_backend: Option<Arc<dyn SwarmBackend>>,
    /// Каталог вместо встроенного/кешированного
    pub catalog: Option<Vec<CatalogEntry>>,
    /// Параметры загрузки вместо взятых из настроек
    pub download_config: Option<DownloadConfig>,
    /// Настроить fern и почистить старые логи
    pub init_logging: bool,
}

/// Точка входа для UI процесса
pub struct Launcher {
    paths: AppPaths,
    settings: SettingsManager,
    store: Arc<SqlitePathStore>,
    downloads: DownloadManager,
    addons: AddonManager,
}

impl Launcher {
    pub fn new(options: LauncherOptions) -> Result<Self> {
        let paths = match options.base_dir {
            Some(base) => AppPaths::with_base(base),
            None => AppPaths::from_system()?,
        };
        paths.create_all()?;

        if options.init_logging {
            setup_logging(&paths.logs_dir());
            if let Err(e) = paths.cleanup_old_logs(LOG_RETENTION_DAYS) {
                log::warn!("Failed to cleanup old logs: {}", e);
            }
        }

        // Инициализация БД
        let db = Database::init(paths.database_path())?;
        let settings = SettingsManager::new(db.clone());
        let config = match options.download_config {
            Some(config) => config,
            None => settings.get_all()?.download_config(),
        };

        let store = Arc::new(SqlitePathStore::new(db.clone()));
        let locks = ExtractionLocks::new();
        let resolver = FallbackResolver::with_defaults(config.clone(), options.swarm_backend)?;
        let downloads = DownloadManager::new(resolver, store.clone(), locks.clone());

        let catalog = match options.catalog {
            Some(entries) => Catalog::new(entries),
            None => Catalog::load(CatalogCache::new(db))?,
        };
        let addons = AddonManager::new(Arc::new(catalog), locks, config)?;

        log::info!(
            "Launcher ready: data in {}, {} catalog entries",
            paths.base_dir().display(),
            addons.catalog().len()
        );

        Ok(Self {
            paths,
            settings,
            store,
            downloads,
            addons,
        })
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn downloads(&self) -> &DownloadManager {
        &self.downloads
    }

    // ---------- Downloads ----------

    /// Только подтверждение запуска; результат придёт событием
    pub fn start_download(&self, target: DownloadTarget) -> CommandResult {
        match self.downloads.start(target) {
            Ok(()) => CommandResult::ok(),
            Err(LauncherError::AlreadyDownloading) => CommandResult::fail(
                "A download is already in progress. Please wait for the current download to finish",
            ),
            Err(e) => CommandResult::fail(e.to_string()),
        }
    }

    /// Скачать клиент из реестра игр
    pub fn start_game_download(
        &self,
        game_id: &str,
        variant_index: usize,
        destination_root: Option<PathBuf>,
    ) -> CommandResult {
        let target = game_id.parse::<GameId>().and_then(|game| {
            let root = match destination_root {
                Some(root) => root,
                None => self.default_game_root(game)?,
            };
            game.download_target(variant_index, root)
        });

        match target {
            Ok(target) => self.start_download(target),
            Err(e) => CommandResult::fail(e.to_string()),
        }
    }

    fn default_game_root(&self, game: GameId) -> Result<PathBuf> {
        let base = self
            .settings
            .get_all()?
            .default_download_path
            .unwrap_or_else(|| self.paths.downloads_dir());
        Ok(base.join(game.as_str()))
    }

    pub fn cancel_download(&self) {
        self.downloads.cancel();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.downloads.subscribe()
    }

    pub fn download_session(&self) -> DownloadSession {
        self.downloads.session()
    }

    // ---------- Add-ons ----------

    pub async fn list_installed_packages(&self, root: &Path) -> Vec<DisplayPackage> {
        self.addons.list(root).await
    }

    pub async fn delete_package(&self, root: &Path, folder_name: &str) -> CommandResult {
        self.addons.delete_package(root, folder_name).await.into()
    }

    /// Каждая папка отдельно; ошибка одной не отменяет остальные
    pub async fn delete_packages(&self, root: &Path, folder_names: &[String]) -> Vec<CommandResult> {
        self.addons.delete_packages(root, folder_names).await
    }

    pub async fn install_from_archive(&self, root: &Path, archive: &Path) -> CommandResult {
        match self.addons.install_from_archive(root, archive).await {
            Ok(extracted) => (&extracted).into(),
            Err(e) => {
                log::error!("Install from {} failed: {}", archive.display(), e);
                CommandResult::fail(e.to_string())
            }
        }
    }

    pub async fn install_catalog_addon(&self, root: &Path, entry: &CatalogEntry) -> CommandResult {
        match self.addons.install_catalog_addon(root, entry).await {
            Ok(extracted) => (&extracted).into(),
            Err(e) => {
                log::error!("Install of {} failed: {}", entry.title, e);
                CommandResult::fail(e.to_string())
            }
        }
    }

    pub fn browse_catalog(&self, query: &CatalogQuery) -> CatalogPage {
        self.addons.catalog().browse(query)
    }

    /// Обновить каталог по адресу из настроек
    pub async fn refresh_catalog(&self) -> CommandResult {
        let url = match self.settings.get_all() {
            Ok(settings) => settings.catalog_url,
            Err(e) => return CommandResult::fail(e.to_string()),
        };
        let Some(url) = url else {
            return CommandResult::fail("No catalog URL configured");
        };

        match self.addons.catalog().refresh(&url).await {
            Ok(count) => CommandResult::ok_with(format!("Catalog updated: {} addons", count)),
            Err(e) => {
                log::warn!("Catalog refresh from {} failed: {}", url, e);
                CommandResult::fail(e.to_string())
            }
        }
    }

    // ---------- Game paths ----------

    pub fn game_path(&self, game_id: &str) -> Result<Option<PathBuf>> {
        self.store.get_path(game_id)
    }

    pub fn game_paths(&self) -> Result<BTreeMap<String, PathBuf>> {
        self.store.all_paths()
    }

    /// Запомнить уже установленный клиент
    pub fn set_game_path(&self, game_id: &str, path: &Path) -> CommandResult {
        if !path.is_dir() {
            return CommandResult::fail(format!("Folder {} does not exist", path.display()));
        }
        if client::find_executable(path).is_none() {
            log::warn!("No client executable found in {}", path.display());
        }
        self.store.save_path(game_id, path).into()
    }

    pub fn forget_game_path(&self, game_id: &str) -> CommandResult {
        self.store.remove_path(game_id).into()
    }

    // ---------- Client ----------

    pub fn read_realmlist(&self, game_root: &Path) -> Result<String> {
        client::read_realmlist(game_root)
    }

    /// Записать realmlist и запомнить строку в истории
    pub fn update_realmlist(&self, game_root: &Path, content: &str) -> CommandResult {
        if let Err(e) = client::update_realmlist(game_root, content) {
            log::error!("Realmlist update failed: {}", e);
            return CommandResult::fail(e.to_string());
        }

        let remembered = self.settings.get_all().and_then(|mut settings| {
            if settings.remember_realmlist(content) {
                self.settings.save_all(&settings)?;
            }
            Ok(())
        });
        if let Err(e) = remembered {
            log::warn!("Failed to save realmlist history: {}", e);
        }
        CommandResult::ok()
    }

    /// Подготовить клиент к запуску: путь к exe, при необходимости чистый кеш
    pub fn prepare_launch(&self, game_id: &str) -> Result<PathBuf> {
        let game_root = self.store.get_path(game_id)?.ok_or_else(|| {
            LauncherError::NotFound(format!("{} is not installed", game_id))
        })?;

        if self.settings.get_all()?.clear_cache_on_launch {
            client::clear_game_cache(&game_root)?;
        }

        client::find_executable(&game_root).ok_or_else(|| {
            LauncherError::NotFound(format!(
                "Client executable not found in {}",
                game_root.display()
            ))
        })
    }

    pub fn clear_game_cache(&self, game_root: &Path) -> CommandResult {
        match client::clear_game_cache(game_root) {
            Ok(true) => CommandResult::ok_with("Cache cleared"),
            Ok(false) => CommandResult::ok_with("Cache is already empty"),
            Err(e) => CommandResult::fail(e.to_string()),
        }
    }

    // ---------- Settings ----------

    pub fn settings(&self) -> Result<Settings> {
        self.settings.get_all()
    }

    /// Профиль загрузки и лимит скорости применяются при следующем запуске
    pub fn save_settings(&self, settings: &Settings) -> CommandResult {
        self.settings.save_all(settings).into()
    }
}
