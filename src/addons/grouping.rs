//! Группировка папок аддонов в логические пакеты
//!
//! Два прохода:
//! 1. `Recount` + `Recount_Modes` - явные модули родителя (`имя_` / `имя-`)
//! 2. `DBM-Core` + `DBM-PvP` - общий префикс до первого `-` или `_`
//!
//! Работаем по индексам, поэтому одинаковые имена не склеиваются
//! и каждая запись попадает ровно в одну группу.

use azeroth_core::{PackageGroup, RawPackageEntry};

/// Минимальная длина префикса во втором проходе
const MIN_PREFIX_LEN: usize = 3;

/// Разделители второго прохода, в порядке приоритета
const SEPARATORS: [char; 2] = ['-', '_'];

/// Ключевые слова "главного" модуля кластера
const PRIMARY_KEYWORDS: [&str; 4] = ["core", "base", "common", "main"];

fn has_child_prefix(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .map(|rest| rest.starts_with('_') || rest.starts_with('-'))
        .unwrap_or(false)
}

pub fn group_packages(entries: Vec<RawPackageEntry>) -> Vec<PackageGroup> {
    let mut items = entries;
    // sort_by_key стабилен: равные длины сохраняют исходный порядок
    items.sort_by_key(|e| e.folder_name.chars().count());

    let mut processed = vec![false; items.len()];
    let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();

    // Проход 1: родитель и его явные модули
    for parent in 0..items.len() {
        if processed[parent] {
            continue;
        }

        let children: Vec<usize> = (0..items.len())
            .filter(|&other| {
                other != parent
                    && !processed[other]
                    && has_child_prefix(&items[other].folder_name, &items[parent].folder_name)
            })
            .collect();

        if !children.is_empty() {
            processed[parent] = true;
            for &child in &children {
                processed[child] = true;
            }
            groups.push((parent, children));
        }
    }

    // Проход 2: общий префикс среди оставшихся
    let remaining: Vec<usize> = (0..items.len()).filter(|&i| !processed[i]).collect();

    for &idx in &remaining {
        if processed[idx] {
            continue;
        }

        let cluster_for = |prefix: &str, processed: &[bool]| -> Vec<usize> {
            remaining
                .iter()
                .copied()
                .filter(|&other| {
                    !processed[other] && has_child_prefix(&items[other].folder_name, prefix)
                })
                .collect()
        };

        let name = &items[idx].folder_name;
        let cluster = SEPARATORS.iter().find_map(|&sep| {
            let pos = name.find(sep)?;
            if name[..pos].chars().count() < MIN_PREFIX_LEN {
                return None;
            }
            let cluster = cluster_for(&name[..pos], &processed);
            (cluster.len() > 1).then_some(cluster)
        });

        match cluster {
            Some(cluster) => {
                let primary = cluster
                    .iter()
                    .copied()
                    .find(|&member| {
                        let lower = items[member].folder_name.to_lowercase();
                        PRIMARY_KEYWORDS.iter().any(|k| lower.contains(k))
                    })
                    .unwrap_or(cluster[0]);

                for &member in &cluster {
                    processed[member] = true;
                }
                let modules = cluster.into_iter().filter(|&m| m != primary).collect();
                groups.push((primary, modules));
            }
            None => {
                processed[idx] = true;
                groups.push((idx, Vec::new()));
            }
        }
    }

    let mut slots: Vec<Option<RawPackageEntry>> = items.into_iter().map(Some).collect();
    groups
        .into_iter()
        .filter_map(|(primary, modules)| {
            let primary = slots[primary].take()?;
            let modules = modules.into_iter().filter_map(|m| slots[m].take()).collect();
            Some(PackageGroup { primary, modules })
        })
        .collect()
}
