//! HTTP(S) транспорт
//!
//! Редиректы обрабатываются вручную (клиент собран с `Policy::none()`),
//! чтобы финальный не-2xx статус всегда доходил до вызывающего как
//! `HttpStatus`, а не терялся внутри reqwest.

use async_trait::async_trait;
use azeroth_core::{DownloadKind, LauncherError, Result};
use futures::StreamExt;
use reqwest::{header, Client, Response, StatusCode, Url};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::config::DownloadConfig;
use super::throttle::{RateLimiter, TransferMeter};
use super::{emit, uri_scheme, FetchRequest, ProgressSink, Transport, TransportEvent};
use crate::utils::sanitize_filename;

const FALLBACK_FILE_NAME: &str = "download.bin";

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    config: DownloadConfig,
}

impl HttpTransport {
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::USER_AGENT)
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                LauncherError::InvalidConfig(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Выполнить GET, пройдя цепочку редиректов. Возвращает ответ 2xx и его URL
    async fn open(&self, uri: &str, cancel: &CancellationToken) -> Result<(Response, Url)> {
        let mut current = Url::parse(uri.trim())
            .map_err(|e| LauncherError::UnsupportedScheme(format!("{}: {}", uri, e)))?;

        for hop in 0..=self.config.max_redirects {
            let request = self.client.get(current.clone()).send();
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LauncherError::OperationCancelled),
                result = tokio::time::timeout(self.config.request_timeout, request) => match result {
                    Ok(Ok(response)) => response,
                    Ok(Err(e)) => {
                        return Err(LauncherError::Network(format!("Connection failed: {}", e)))
                    }
                    Err(_) => {
                        return Err(LauncherError::Network(format!(
                            "No response from {} within {}s",
                            current,
                            self.config.request_timeout.as_secs()
                        )))
                    }
                },
            };

            let status = response.status();
            if is_followed_redirect(status) {
                if hop == self.config.max_redirects {
                    return Err(LauncherError::TooManyRedirects {
                        limit: self.config.max_redirects,
                        url: uri.to_string(),
                    });
                }

                let next = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|location| current.join(location).ok())
                    .ok_or_else(|| LauncherError::HttpStatus {
                        code: status.as_u16(),
                        url: current.to_string(),
                    })?;

                log::debug!("HTTP {} redirect: {} -> {}", status.as_u16(), current, next);
                current = next;
                continue;
            }

            if !status.is_success() {
                log::error!("HTTP {} for URL: {}", status, current);
                return Err(LauncherError::HttpStatus {
                    code: status.as_u16(),
                    url: current.to_string(),
                });
            }

            return Ok((response, current));
        }

        Err(LauncherError::TooManyRedirects {
            limit: self.config.max_redirects,
            url: uri.to_string(),
        })
    }

    /// Записать тело ответа в `.part` файл. Возвращает количество байт
    async fn stream_to_part(
        &self,
        response: Response,
        part_path: &Path,
        events: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let total_size = response.content_length().unwrap_or(0);
        let mut file = tokio::fs::File::create(part_path).await.map_err(|e| {
            log::error!("Failed to create file {}: {}", part_path.display(), e);
            LauncherError::Io(e)
        })?;

        let mut stream = response.bytes_stream();
        let mut meter = TransferMeter::new(total_size, &self.config);
        let mut rate_limiter = RateLimiter::new(self.config.bandwidth_limit);

        loop {
            let timeout = meter.chunk_timeout();
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LauncherError::OperationCancelled),
                next = tokio::time::timeout(timeout, stream.next()) => next,
            };

            let chunk = match next {
                Err(_) => {
                    log::warn!(
                        "Download stalled - no progress for {} seconds (downloaded {} bytes)",
                        timeout.as_secs(),
                        meter.downloaded()
                    );
                    return Err(LauncherError::Network(format!(
                        "Download stalled: no progress for {} seconds",
                        timeout.as_secs()
                    )));
                }
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => {
                    log::error!("Stream error: {}", e);
                    return Err(LauncherError::Network(format!("Stream error: {}", e)));
                }
                Ok(None) => break,
            };

            // Полоса ограничена - пишем chunk порциями, ничего не теряя
            let mut offset = 0;
            while offset < chunk.len() {
                if cancel.is_cancelled() {
                    return Err(LauncherError::OperationCancelled);
                }
                let allowed = rate_limiter.acquire(chunk.len() - offset).await;
                file.write_all(&chunk[offset..offset + allowed]).await?;
                offset += allowed;
            }

            meter.record(chunk.len() as u64);
            if let Some(tick) = meter.tick() {
                emit(events, tick);
            }
        }

        if cancel.is_cancelled() {
            return Err(LauncherError::OperationCancelled);
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let downloaded = meter.downloaded();
        if total_size > 0 && downloaded < total_size {
            log::warn!("Download incomplete ({}/{} bytes)", downloaded, total_size);
            return Err(LauncherError::Network(format!(
                "Download incomplete: {}/{} bytes",
                downloaded, total_size
            )));
        }

        emit(events, meter.finish());

        Ok(downloaded)
    }
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// Имя файла из последнего непустого сегмента пути URL
pub(crate) fn file_name_from_url(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| {
            urlencoding::decode(s)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| s.to_string())
        })
        .unwrap_or_default();

    let name = sanitize_filename(segment.trim());
    if name.is_empty() || name == "." || name == ".." {
        FALLBACK_FILE_NAME.to_string()
    } else {
        name
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn kind(&self) -> DownloadKind {
        DownloadKind::Http
    }

    fn supports(&self, uri: &str) -> bool {
        matches!(uri_scheme(uri).as_deref(), Some("http") | Some("https"))
    }

    async fn fetch(&self, request: FetchRequest<'_>) -> Result<PathBuf> {
        let FetchRequest {
            uri,
            destination_root,
            events,
            cancel,
        } = request;

        if cancel.is_cancelled() {
            return Err(LauncherError::OperationCancelled);
        }

        let (response, final_url) = self.open(uri, cancel).await?;

        tokio::fs::create_dir_all(destination_root).await?;
        let file_name = file_name_from_url(&final_url);
        let destination = destination_root.join(&file_name);
        let part_path = destination_root.join(format!("{}.part", file_name));

        log::info!("Downloading {} from {}", file_name, final_url);
        emit(
            events,
            TransportEvent::Connected {
                source: uri.to_string(),
            },
        );

        let start_time = Instant::now();
        let downloaded = match self
            .stream_to_part(response, &part_path, events, cancel)
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                // Частичный файл никогда не переживает неудачную попытку
                if let Err(remove_err) = tokio::fs::remove_file(&part_path).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        log::warn!(
                            "Failed to remove partial file {}: {}",
                            part_path.display(),
                            remove_err
                        );
                    }
                }
                if matches!(e, LauncherError::OperationCancelled) {
                    log::info!("Download of {} cancelled", file_name);
                }
                return Err(e);
            }
        };

        if destination.is_file() {
            tokio::fs::remove_file(&destination).await?;
        }
        if let Err(e) = tokio::fs::rename(&part_path, &destination).await {
            log::error!(
                "Failed to rename {} to {}: {}",
                part_path.display(),
                destination.display(),
                e
            );
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(LauncherError::Io(e));
        }

        let duration = start_time.elapsed();
        log::info!(
            "Downloaded '{}' ({}) in {:.1}s",
            file_name,
            crate::utils::format_bytes(downloaded),
            duration.as_secs_f64()
        );

        Ok(destination)
    }
}
