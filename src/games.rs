//! Известные версии клиента и их источники загрузки
//!
//! Каждая игра имеет одну или несколько вариаций (например TBC 2.5.2 и 2.4.3),
//! у каждой вариации упорядоченный список источников: первый основной,
//! остальные запасные.

use azeroth_core::{DownloadTarget, LauncherError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Поддерживаемые клиенты
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameId {
    Classic,
    Tbc,
    Wotlk,
}

/// Одна загружаемая версия клиента
#[derive(Debug, Clone, Copy)]
pub struct GameVariant {
    pub label: &'static str,
    pub version: &'static str,
    pub sources: &'static [&'static str],
}

const CLASSIC_VARIANTS: &[GameVariant] = &[GameVariant {
    label: "1.12.1",
    version: "1.12.1",
    sources: &["http://cdn.twinstar-wow.com/WoW_Vanilla.zip"],
}];

const TBC_VARIANTS: &[GameVariant] = &[
    GameVariant {
        label: "2.5.2",
        version: "2.5.2",
        sources: &["https://cdn.wowlibrary.com/clients/WoWClassicTBC_2.5.2_408920-multi-win.zip"],
    },
    GameVariant {
        label: "2.4.3",
        version: "2.4.3",
        sources: &["https://cdn.wowlibrary.com/clients/TBC-2.4.3.8606-enGB-Repack.zip"],
    },
];

const WOTLK_VARIANTS: &[GameVariant] = &[GameVariant {
    label: "3.3.5a",
    version: "3.3.5a",
    sources: &["magnet:?xt=urn:btih:5B65D1928A3025A820B45E6DB2451AAAABC5347C&dn=World%20of%20Warcraft%203.3.5a&tr=udp%3a%2f%2ftracker.openbittorrent.com%3a80%2fannounce&tr=udp%3a%2f%2ftracker.opentrackr.org%3a1337%2fannounce"],
}];

impl GameId {
    pub const ALL: [GameId; 3] = [GameId::Classic, GameId::Tbc, GameId::Wotlk];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameId::Classic => "classic",
            GameId::Tbc => "tbc",
            GameId::Wotlk => "wotlk",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            GameId::Classic => "World of Warcraft Classic",
            GameId::Tbc => "The Burning Crusade",
            GameId::Wotlk => "Wrath of the Lich King",
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            GameId::Classic => "Classic",
            GameId::Tbc => "TBC",
            GameId::Wotlk => "WotLK",
        }
    }

    pub fn variants(&self) -> &'static [GameVariant] {
        match self {
            GameId::Classic => CLASSIC_VARIANTS,
            GameId::Tbc => TBC_VARIANTS,
            GameId::Wotlk => WOTLK_VARIANTS,
        }
    }

    /// Есть ли каталог аддонов для версии (у TBC 2.5.2 его нет)
    pub fn has_addon_catalog(&self, version: &str) -> bool {
        !(*self == GameId::Tbc && version == "2.5.2")
    }

    /// Цель загрузки для вариации `variant_index`
    pub fn download_target(
        &self,
        variant_index: usize,
        destination_root: impl AsRef<Path>,
    ) -> Result<DownloadTarget> {
        let variant = self.variants().get(variant_index).ok_or_else(|| {
            LauncherError::InvalidTarget(format!(
                "{} has no download option #{}",
                self.short_name(),
                variant_index
            ))
        })?;

        Ok(DownloadTarget::new(
            self.as_str(),
            variant.sources.iter().map(|s| s.to_string()).collect(),
            destination_root.as_ref(),
        ))
    }
}

impl std::fmt::Display for GameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for GameId {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "classic" | "vanilla" => Ok(GameId::Classic),
            "tbc" => Ok(GameId::Tbc),
            "wotlk" => Ok(GameId::Wotlk),
            _ => Err(LauncherError::NotFound(format!("Unknown game: {}", s))),
        }
    }
}

/// Описание игры для UI
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameInfo {
    pub id: GameId,
    pub name: &'static str,
    pub short_name: &'static str,
    pub downloads: Vec<GameDownloadInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDownloadInfo {
    pub label: &'static str,
    pub version: &'static str,
    /// `http` или `swarm` по первому источнику
    pub kind: &'static str,
}

pub fn supported_games() -> Vec<GameInfo> {
    GameId::ALL
        .iter()
        .map(|game| GameInfo {
            id: *game,
            name: game.display_name(),
            short_name: game.short_name(),
            downloads: game
                .variants()
                .iter()
                .map(|v| GameDownloadInfo {
                    label: v.label,
                    version: v.version,
                    kind: v
                        .sources
                        .first()
                        .map(|s| azeroth_core::DownloadKind::from_uri(s).as_str())
                        .unwrap_or("http"),
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use azeroth_core::DownloadKind;
    use std::path::PathBuf;

    #[test]
    fn test_tbc_variants_in_order() {
        let versions: Vec<_> = GameId::Tbc.variants().iter().map(|v| v.version).collect();
        assert_eq!(versions, vec!["2.5.2", "2.4.3"]);

        let target = GameId::Tbc.download_target(1, "/games/tbc").unwrap();
        assert_eq!(target.id, "tbc");
        assert_eq!(target.destination_root, PathBuf::from("/games/tbc"));
        assert!(target.sources[0].contains("2.4.3"));
        assert_eq!(target.kind, DownloadKind::Http);
        assert!(target.extract);
    }

    #[test]
    fn test_wotlk_is_swarm() {
        let target = GameId::Wotlk.download_target(0, "/games/wotlk").unwrap();
        assert_eq!(target.kind, DownloadKind::Swarm);
        assert!(crate::transport::MagnetLink::parse(&target.sources[0]).is_ok());
    }

    #[test]
    fn test_unknown_variant() {
        let err = GameId::Classic.download_target(3, "/games").unwrap_err();
        assert!(matches!(err, LauncherError::InvalidTarget(_)));
    }

    #[test]
    fn test_parse_game_id() {
        assert_eq!("WotLK".parse::<GameId>().unwrap(), GameId::Wotlk);
        assert_eq!("vanilla".parse::<GameId>().unwrap(), GameId::Classic);
        assert!("cata".parse::<GameId>().is_err());
    }

    #[test]
    fn test_addon_catalog_availability() {
        assert!(!GameId::Tbc.has_addon_catalog("2.5.2"));
        assert!(GameId::Tbc.has_addon_catalog("2.4.3"));
        assert!(GameId::Wotlk.has_addon_catalog("3.3.5a"));
    }

    #[test]
    fn test_supported_games_json() {
        let json = serde_json::to_value(supported_games()).unwrap();
        assert_eq!(json[2]["id"], "wotlk");
        assert_eq!(json[2]["downloads"][0]["kind"], "swarm");
        assert_eq!(json[1]["shortName"], "TBC");
    }
}
