use std::time::{Duration, Instant};

use super::config::DownloadConfig;
use super::TransportEvent;

/// Сглаживание скорости: alpha EMA
const RATE_ALPHA: f64 = 0.3;
/// Выборки короче этого дают шум
const MIN_SAMPLE: Duration = Duration::from_millis(100);
/// Потолок скорости, всё что выше считаем мусором
const MAX_RATE_BPS: f64 = 1_000_000_000.0;

/// Телеметрия одного потока: байты, скорость, таймаут ожидания
/// следующего chunk'а и троттлинг тиков прогресса
pub(crate) struct TransferMeter {
    downloaded: u64,
    total: u64,
    rate_bps: f64,
    sample_bytes: u64,
    sample_started: Instant,
    last_tick: Instant,
    tick_interval: Duration,
    slow_threshold_bps: u64,
    slow_timeout: Duration,
}

impl TransferMeter {
    pub(crate) fn new(total: u64, config: &DownloadConfig) -> Self {
        let now = Instant::now();
        Self {
            downloaded: 0,
            total,
            rate_bps: 0.0,
            sample_bytes: 0,
            sample_started: now,
            last_tick: now,
            tick_interval: config.progress_interval,
            slow_threshold_bps: config.speed_threshold,
            slow_timeout: config.stall_timeout,
        }
    }

    pub(crate) fn downloaded(&self) -> u64 {
        self.downloaded
    }

    pub(crate) fn rate_bps(&self) -> u64 {
        self.rate_bps as u64
    }

    /// Учесть записанные байты
    pub(crate) fn record(&mut self, bytes: u64) {
        self.downloaded += bytes;

        let elapsed = self.sample_started.elapsed();
        if elapsed < MIN_SAMPLE {
            return;
        }

        let delta = self.downloaded.saturating_sub(self.sample_bytes);
        let sample = (delta as f64 / elapsed.as_secs_f64()).min(MAX_RATE_BPS);
        self.rate_bps = if self.rate_bps == 0.0 {
            sample
        } else {
            RATE_ALPHA * sample + (1.0 - RATE_ALPHA) * self.rate_bps
        };
        self.sample_bytes = self.downloaded;
        self.sample_started = Instant::now();
    }

    /// Сколько ждать следующий chunk: на быстрой сети зависание видно раньше
    pub(crate) fn chunk_timeout(&self) -> Duration {
        match self.rate_bps {
            r if r > 1_000_000.0 => Duration::from_secs(3),
            r if r > 100_000.0 => Duration::from_secs(5),
            r if r > self.slow_threshold_bps as f64 => Duration::from_secs(8),
            _ => self.slow_timeout,
        }
    }

    /// Тик прогресса, не чаще `tick_interval`
    pub(crate) fn tick(&mut self) -> Option<TransportEvent> {
        if self.last_tick.elapsed() < self.tick_interval {
            return None;
        }
        self.last_tick = Instant::now();
        Some(self.progress())
    }

    /// Финальный тик, всегда
    pub(crate) fn finish(&mut self) -> TransportEvent {
        self.last_tick = Instant::now();
        self.progress()
    }

    fn progress(&self) -> TransportEvent {
        TransportEvent::Progress {
            bytes_downloaded: self.downloaded,
            // Без Content-Length знаем только то, что уже пришло
            bytes_total: self.total.max(self.downloaded),
            transfer_rate_bps: self.rate_bps(),
            peer_count: None,
        }
    }
}

/// Rate limiter для bandwidth limiting (token bucket)
pub(crate) struct RateLimiter {
    /// Лимит bytes/sec (0 = без лимита)
    limit: u64,
    last_check: Instant,
    /// Накопленные "токены" (байты которые можно записать)
    tokens: f64,
}

impl RateLimiter {
    pub(crate) fn new(limit: u64) -> Self {
        Self {
            limit,
            last_check: Instant::now(),
            tokens: limit as f64,
        }
    }

    /// Ждать если нужно для соблюдения лимита, вернуть сколько байт можно записать
    pub(crate) async fn acquire(&mut self, requested: usize) -> usize {
        if self.limit == 0 || requested == 0 {
            return requested;
        }

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_check).as_secs_f64();
        self.last_check = now;

        self.tokens += elapsed * self.limit as f64;
        // Cap на 1 секунду burst
        self.tokens = self.tokens.min(self.limit as f64);

        if self.tokens >= requested as f64 {
            self.tokens -= requested as f64;
            requested
        } else if self.tokens >= 1.0 {
            let allowed = self.tokens as usize;
            self.tokens -= allowed as f64;
            allowed
        } else {
            // Нет токенов - ждём ровно столько, сколько стоит выданная порция
            let allowed = ((self.limit as f64 * 0.1) as usize).clamp(1, requested);
            let wait_time = allowed as f64 / self.limit as f64;
            tokio::time::sleep(Duration::from_secs_f64(wait_time)).await;
            self.last_check = Instant::now();
            self.tokens = 0.0;
            allowed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_timeout_follows_rate() {
        let config = DownloadConfig::default();
        let mut meter = TransferMeter::new(0, &config);

        // Пока скорость неизвестна - терпение из конфига
        assert_eq!(meter.chunk_timeout(), config.stall_timeout);

        meter.rate_bps = 1_000_000.0;
        assert_eq!(meter.chunk_timeout().as_secs(), 5);
        meter.rate_bps = 2_000_000.0;
        assert_eq!(meter.chunk_timeout().as_secs(), 3);
        meter.rate_bps = 50_000.0;
        assert_eq!(meter.chunk_timeout().as_secs(), 8);
    }

    #[test]
    fn test_rate_is_smoothed_and_capped() {
        let mut meter = TransferMeter::new(0, &DownloadConfig::default());
        meter.sample_started = Instant::now() - Duration::from_secs(1);
        meter.record(500_000);
        assert!((400_000..=500_000).contains(&meter.rate_bps()));

        let first = meter.rate_bps;
        meter.sample_started = Instant::now() - Duration::from_secs(1);
        meter.record(0);
        // EMA: падение до нуля сглажено
        assert!(meter.rate_bps > 0.0 && meter.rate_bps < first);

        meter.sample_started = Instant::now() - Duration::from_millis(100);
        meter.record(10_000_000_000);
        assert!(meter.rate_bps <= MAX_RATE_BPS);
    }

    #[test]
    fn test_ticks_are_throttled() {
        let config = DownloadConfig::default();
        let mut meter = TransferMeter::new(1_000, &config);
        meter.record(10);
        assert!(meter.tick().is_none());

        meter.last_tick = Instant::now() - config.progress_interval;
        match meter.tick() {
            Some(TransportEvent::Progress {
                bytes_downloaded,
                bytes_total,
                ..
            }) => {
                assert_eq!(bytes_downloaded, 10);
                assert_eq!(bytes_total, 1_000);
            }
            other => panic!("expected progress, got {:?}", other),
        }
        assert!(meter.tick().is_none());

        // Финальный тик не троттлится; без total берём скачанное
        let mut unknown = TransferMeter::new(0, &config);
        unknown.record(42);
        assert_eq!(
            unknown.finish(),
            TransportEvent::Progress {
                bytes_downloaded: 42,
                bytes_total: 42,
                transfer_rate_bps: 0,
                peer_count: None,
            }
        );
    }

    #[tokio::test]
    async fn test_rate_limiter_unlimited_passes_everything() {
        let mut limiter = RateLimiter::new(0);
        assert_eq!(limiter.acquire(65_536).await, 65_536);
    }

    #[tokio::test]
    async fn test_rate_limiter_never_grants_more_than_requested() {
        let mut limiter = RateLimiter::new(10_000);
        let mut total = 0;
        while total < 12_000 {
            let granted = limiter.acquire(12_000 - total).await;
            assert!(granted >= 1 && granted <= 12_000 - total);
            total += granted;
        }
        assert_eq!(total, 12_000);
    }
}
