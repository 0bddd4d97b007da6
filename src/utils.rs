use azeroth_core::{LauncherError, Result};
use reqwest::Client;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Вычисление SHA1 хеша файла
pub fn calculate_sha1<P: AsRef<Path>>(path: P) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buffer = [0; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Вычисление SHA256 хеша файла
pub fn calculate_sha256<P: AsRef<Path>>(path: P) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Хеш файла в том же алгоритме, что и ожидаемый (40 символов = SHA1, иначе SHA256)
pub fn file_hash_like<P: AsRef<Path>>(path: P, expected: &str) -> Result<String> {
    if expected.trim().len() == 40 {
        calculate_sha1(path)
    } else {
        calculate_sha256(path)
    }
}

/// Верификация файла по хешу
pub fn verify_file_hash<P: AsRef<Path>>(path: P, expected: &str) -> Result<()> {
    let actual = file_hash_like(&path, expected)?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(LauncherError::HashMismatch {
            expected: expected.trim().to_string(),
            actual,
        })
    }
}

/// Форматирование размера файла в человекочитаемый вид
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Sanitize имени файла (удаление опасных символов)
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect()
}

/// Безопасное атомарное сохранение файла
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let tmp_path = path.with_extension("tmp");

    let mut file = File::create(&tmp_path)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(tmp_path, path)?;
    Ok(())
}

/// Загрузить JSON с повторами (экспоненциальная задержка, только на 5xx и сетевые ошибки)
pub async fn fetch_json<T: serde::de::DeserializeOwned>(url: &str) -> Result<T> {
    fetch_json_with_retries(url, 4, 2000).await
}

pub(crate) async fn fetch_json_with_retries<T: serde::de::DeserializeOwned>(
    url: &str,
    max_retries: u32,
    base_delay_ms: u64,
) -> Result<T> {
    let client = Client::builder()
        .user_agent(crate::USER_AGENT)
        .timeout(std::time::Duration::from_secs(30))
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()
        .map_err(|e| {
            log::error!("Failed to build HTTP client: {}", e);
            LauncherError::ApiError(format!("Failed to build client: {}", e))
        })?;

    let mut last_error = None;

    for attempt in 0..max_retries {
        if attempt > 0 {
            let delay = base_delay_ms * (1 << (attempt - 1));
            log::debug!(
                "Retrying {} after {}ms (attempt {}/{})",
                url,
                delay,
                attempt + 1,
                max_retries
            );
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }

        let response = match client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                log::warn!(
                    "Network error fetching {} (attempt {}/{}): {}",
                    url,
                    attempt + 1,
                    max_retries,
                    e
                );
                last_error = Some(LauncherError::ApiError(format!("Failed to connect: {}", e)));
                continue;
            }
        };

        let status = response.status();
        if !status.is_success() {
            log::error!("HTTP {} for {}", status, url);

            if status.is_server_error() {
                last_error = Some(LauncherError::ApiError(format!("HTTP {}: {}", status, url)));
                continue;
            } else {
                return Err(LauncherError::ApiError(format!("HTTP {}: {}", status, url)));
            }
        }

        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                log::error!("Failed to read response body from {}: {}", url, e);
                last_error = Some(LauncherError::ApiError(format!(
                    "Failed to read response: {}",
                    e
                )));
                continue;
            }
        };

        return match serde_json::from_str(&text) {
            Ok(data) => {
                log::debug!("Successfully fetched and parsed JSON from {}", url);
                Ok(data)
            }
            Err(e) => {
                log::error!("Failed to parse JSON from {}: {}", url, e);
                Err(LauncherError::Json(e))
            }
        };
    }

    log::error!("All {} retry attempts failed for {}", max_retries, url);
    Err(last_error.unwrap_or_else(|| LauncherError::ApiError(format!("Failed to fetch {}", url))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1_048_576), "1.00 MB");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize_filename("WoW 3.3.5a.zip"), "WoW 3.3.5a.zip");
    }

    #[test]
    fn test_verify_file_hash() {
        let path = std::env::temp_dir().join(format!("azeroth_hash_{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"abc").unwrap();

        // SHA1("abc") и SHA256("abc")
        verify_file_hash(&path, "a9993e364706816aba3e25717850c26c9cd0d89d").unwrap();
        verify_file_hash(
            &path,
            "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD",
        )
        .unwrap();

        let err = verify_file_hash(&path, "0000000000000000000000000000000000000000").unwrap_err();
        assert!(matches!(err, LauncherError::HashMismatch { .. }));

        let _ = std::fs::remove_file(path);
    }
}
