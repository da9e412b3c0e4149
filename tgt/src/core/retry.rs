use rand::random_range;
use std::future::Future;
use tokio::time::{sleep, Duration, Instant};

const DEFAULT_TOTAL_BUDGET: Duration = Duration::from_secs(60);
const DEFAULT_PER_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(30);
const DEFAULT_JITTER_FRAC: f32 = 0.5;
const DEFAULT_MAX_RETRIES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,    // transient: connection reset/refused, timeouts, 5xx
    NonRetryable, // 4xx and logic errors
}

pub struct RetryConfig {
    pub total_budget: Duration,
    pub per_attempt_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub jitter_frac: f32,
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            total_budget: DEFAULT_TOTAL_BUDGET,
            per_attempt_timeout: DEFAULT_PER_ATTEMPT_TIMEOUT,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
            jitter_frac: DEFAULT_JITTER_FRAC,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryConfig {
    /// Notification delivery: best-effort, short backoff.
    pub fn notif() -> Self {
        Self {
            total_budget: Duration::from_secs(20),
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(4),
            ..Default::default()
        }
    }

    /// Cluster join at startup: keep knocking for a while.
    pub fn join() -> Self {
        Self {
            total_budget: Duration::from_secs(30),
            backoff_base: Duration::from_millis(500),
            ..Default::default()
        }
    }
}

fn jitter(d: Duration, frac: f32) -> Duration {
    let ms = d.as_millis() as i64;
    let delta = (ms as f32 * frac) as i64;
    if delta == 0 {
        return d;
    }
    let j = random_range(-delta..=delta);
    Duration::from_millis((ms + j).max(0) as u64)
}

pub async fn retry_timeboxed<E, F, Fut, C, T>(
    cfg: &RetryConfig,
    mut op: F,
    classify: C,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryClass,
{
    let deadline = Instant::now() + cfg.total_budget;
    let mut backoff = cfg.backoff_base;
    let mut attempts: u32 = 0;

    loop {
        match op().await {
            Ok(res) => return Ok(res),
            Err(e) => {
                attempts += 1;
                if classify(&e) == RetryClass::NonRetryable || attempts > cfg.max_retries {
                    return Err(e);
                }
                let now = Instant::now();
                if now >= deadline {
                    return Err(e);
                }
                let sleep_dur = jitter(backoff.min(cfg.backoff_max), cfg.jitter_frac);
                let remaining = deadline.saturating_duration_since(now);
                if sleep_dur > remaining {
                    return Err(e);
                }
                sleep(sleep_dur).await;
                backoff = (backoff * 2).min(cfg.backoff_max);
            }
        }
    }
}

pub fn classify_reqwest(err: &reqwest::Error) -> RetryClass {
    // covers connection-reset, connection-refused, and request timeouts
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        return RetryClass::Retryable;
    }
    RetryClass::NonRetryable
}
