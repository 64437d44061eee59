//! Resilient page retrieval.
//!
//! The [`Navigator`] turns a logical target (`/scholar?q=...`) into a page
//! body. Each attempt is classified; the outcome decides between returning,
//! aborting, escalating the timeout, rotating the session, or cooling down
//! after an access-denied response. Two buckets with independent providers
//! and state serve the two endpoint families: author/listing pages under
//! `/citations?` use the secondary bucket and the rest use the premium
//! bucket. An exhausted secondary request gets one last run through the
//! premium bucket.

use crate::error::{Result, ScholarError};
use crate::proxy::SessionProvider;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Default Google Scholar URL
pub const DEFAULT_SCHOLAR_URL: &str = "https://scholar.google.com";

/// Default per-attempt timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default retry budget per bucket
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Class names that mark a DOS-prevention page
const DOS_CLASSES: &[&str] = &["rc-doscaptcha-body"];

/// Element ids that mark an interactive challenge
const CAPTCHA_IDS: &[&str] = &["gs_captcha_ccl", "recaptcha", "captcha-form"];

/// Classification of a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbuseSignal {
    Clean,
    /// Interactive challenge, needs a human
    SoftBlock,
    /// DOS-prevention page, retrying makes it worse
    HardBlock,
}

/// Classify a body by its marker substrings
pub fn classify(body: &str) -> AbuseSignal {
    if DOS_CLASSES
        .iter()
        .any(|cls| body.contains(&format!("class=\"{}\"", cls)))
    {
        return AbuseSignal::HardBlock;
    }
    if CAPTCHA_IDS
        .iter()
        .any(|id| body.contains(&format!("id=\"{}\"", id)))
    {
        return AbuseSignal::SoftBlock;
    }
    AbuseSignal::Clean
}

/// Endpoint family a target belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetClass {
    Premium,
    Secondary,
}

impl TargetClass {
    pub fn classify(target: &str) -> Self {
        if target.contains("citations?") {
            TargetClass::Secondary
        } else {
            TargetClass::Premium
        }
    }
}

/// Retry state of one bucket.
///
/// `attempts` and `timeout` are copied from the most recent fetch sequence;
/// every sequence counts its own budget. The block fields are shared by all
/// fetches on the bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievalState {
    /// Timeout reached by the last fetch sequence
    pub timeout: Duration,
    /// Counted attempts of the last fetch sequence
    pub attempts: u32,
    /// A 403 was seen since the last success or path change
    pub blocked_recently: bool,
    /// 403s seen since the last success or path change
    pub consecutive_blocks: u32,
}

impl RetrievalState {
    fn record(&mut self, attempts: u32, timeout: Duration) {
        self.attempts = attempts;
        self.timeout = timeout;
    }

    fn clear_blocks(&mut self) {
        self.blocked_recently = false;
        self.consecutive_blocks = 0;
    }

    fn reset(&mut self, base_timeout: Duration) {
        self.record(0, base_timeout);
        self.clear_blocks();
    }
}

/// Delays applied between attempts.
///
/// The cooldown after a repeated 403 is drawn from
/// `[cooldown_min, cooldown_max]` and multiplied by
/// `cooldown_growth^(blocks - 2)`, capped at `cooldown_max_factor`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    pub cooldown_min: Duration,
    pub cooldown_max: Duration,
    pub cooldown_growth: f64,
    pub cooldown_max_factor: f64,
    /// Timeouts escalate up to this multiple of the base timeout
    pub timeout_ceiling_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            jitter_min: Duration::from_secs(1),
            jitter_max: Duration::from_secs(2),
            cooldown_min: Duration::from_secs(60),
            cooldown_max: Duration::from_secs(120),
            cooldown_growth: 1.5,
            cooldown_max_factor: 4.0,
            timeout_ceiling_factor: 3,
        }
    }
}

fn random_between(min: Duration, max: Duration) -> Duration {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    let lo = lo.as_millis() as u64;
    let hi = hi.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}

impl RetryPolicy {
    /// Delay inserted before every attempt
    pub fn jitter(&self) -> Duration {
        random_between(self.jitter_min, self.jitter_max)
    }

    /// Wait before retrying after the `blocks`-th consecutive 403
    pub fn cooldown(&self, blocks: u32) -> Duration {
        let exponent = blocks.saturating_sub(2) as i32;
        let factor = self
            .cooldown_growth
            .powi(exponent)
            .clamp(1.0, self.cooldown_max_factor.max(1.0));
        random_between(self.cooldown_min, self.cooldown_max).mul_f64(factor)
    }
}

/// Construction options for a [`Navigator`]
#[derive(Debug, Clone)]
pub struct NavigatorOptions {
    /// Scheme and host every target is resolved against (mirror sites, tests)
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub policy: RetryPolicy,
}

impl Default for NavigatorOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SCHOLAR_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            policy: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Settings {
    timeout: Duration,
    max_retries: u32,
}

struct Bucket {
    class: TargetClass,
    provider: RwLock<Arc<SessionProvider>>,
    state: Mutex<RetrievalState>,
}

impl Bucket {
    fn new(class: TargetClass, provider: SessionProvider) -> Self {
        Self {
            class,
            provider: RwLock::new(Arc::new(provider)),
            state: Mutex::new(RetrievalState::default()),
        }
    }

    fn provider(&self) -> Arc<SessionProvider> {
        self.provider
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn state(&self) -> MutexGuard<'_, RetrievalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn replace_provider(&self, provider: SessionProvider, base_timeout: Duration) {
        *self.provider.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(provider);
        self.state().reset(base_timeout);
    }
}

/// Outcome of one fetch sequence on one bucket
enum Sequence {
    Done(String),
    Exhausted(u32),
}

/// What a single attempt produced
enum Attempt {
    Response { status: StatusCode, body: String },
    TimedOut,
    Failed(reqwest::Error),
}

/// The retrieval engine. Share it as `Arc<Navigator>`.
pub struct Navigator {
    base_url: String,
    policy: RetryPolicy,
    settings: RwLock<Settings>,
    premium: Bucket,
    secondary: Bucket,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}

impl Navigator {
    pub fn new() -> Self {
        Self::with_options(NavigatorOptions::default())
    }

    pub fn with_options(options: NavigatorOptions) -> Self {
        Self {
            base_url: options.base_url.trim_end_matches('/').to_string(),
            policy: options.policy,
            settings: RwLock::new(Settings {
                timeout: options.timeout,
                max_retries: options.max_retries,
            }),
            premium: Bucket::new(TargetClass::Premium, SessionProvider::new()),
            secondary: Bucket::new(TargetClass::Secondary, SessionProvider::new()),
        }
    }

    fn settings(&self) -> Settings {
        *self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.settings().timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.settings().max_retries
    }

    /// Set the base timeout in milliseconds. Negative values are ignored.
    pub fn set_timeout(&self, millis: i64) {
        if millis < 0 {
            debug!(millis, "Ignoring negative timeout");
            return;
        }
        self.settings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .timeout = Duration::from_millis(millis as u64);
    }

    /// Set the retry budget per bucket
    pub fn set_retries(&self, count: i64) -> Result<()> {
        let count = u32::try_from(count).map_err(|_| {
            ScholarError::Config(format!("num_retries must not be negative, got {}", count))
        })?;
        self.settings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .max_retries = count;
        Ok(())
    }

    /// Adopt new providers. Without `secondary` the listing bucket goes direct.
    pub fn use_proxy(&self, primary: SessionProvider, secondary: Option<SessionProvider>) {
        let base = self.timeout();
        self.premium.replace_provider(primary, base);
        self.secondary
            .replace_provider(secondary.unwrap_or_default(), base);
        info!("Installed new session providers");
    }

    pub fn provider(&self, class: TargetClass) -> Arc<SessionProvider> {
        self.bucket(class).provider()
    }

    /// Snapshot of a bucket's retry state
    pub fn retrieval_state(&self, class: TargetClass) -> RetrievalState {
        self.bucket(class).state().clone()
    }

    fn bucket(&self, class: TargetClass) -> &Bucket {
        match class {
            TargetClass::Premium => &self.premium,
            TargetClass::Secondary => &self.secondary,
        }
    }

    /// Resolve a relative target against the base URL
    pub fn absolute_url(&self, target: &str) -> Result<Url> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| ScholarError::Config(format!("Invalid base URL: {}", e)))?;
        base.join(target)
            .map_err(|e| ScholarError::Config(format!("Invalid target '{}': {}", target, e)))
    }

    /// Fetch `target` and return its body with non-breaking spaces normalized.
    pub async fn fetch(&self, target: &str) -> Result<String> {
        let body = self.get_page(target).await?;
        Ok(body.replace('\u{a0}', " "))
    }

    /// Fetch `target` through the retry loop and return the raw body.
    pub async fn get_page(&self, target: &str) -> Result<String> {
        let url = self.absolute_url(target)?;
        let class = TargetClass::classify(target);

        let first = self.run_sequence(self.bucket(class), &url).await?;
        let attempts = match first {
            Sequence::Done(body) => return Ok(body),
            Sequence::Exhausted(attempts) => attempts,
        };

        if class == TargetClass::Secondary {
            warn!(url = %url, attempts, "Secondary bucket exhausted, retrying through premium");
            match self.run_sequence(&self.premium, &url).await? {
                Sequence::Done(body) => return Ok(body),
                Sequence::Exhausted(more) => {
                    return Err(ScholarError::RetrievalExhausted {
                        url: url.to_string(),
                        attempts: attempts + more,
                    })
                }
            }
        }

        Err(ScholarError::RetrievalExhausted {
            url: url.to_string(),
            attempts,
        })
    }

    fn base_timeout(&self, provider: &SessionProvider) -> Duration {
        let configured = self.timeout();
        provider
            .recommended_timeout()
            .map_or(configured, |t| t.max(configured))
    }

    async fn run_sequence(&self, bucket: &Bucket, url: &Url) -> Result<Sequence> {
        let provider = bucket.provider();
        let base_timeout = self.base_timeout(&provider);
        let ceiling = base_timeout * self.policy.timeout_ceiling_factor;
        let max_retries = self.max_retries();
        let mut client = provider.client()?;
        let mut attempts = 0u32;
        let mut timeout = base_timeout;

        loop {
            bucket.state().record(attempts, timeout);
            if attempts >= max_retries {
                return Ok(Sequence::Exhausted(attempts));
            }

            tokio::time::sleep(self.policy.jitter()).await;
            debug!(url = %url, bucket = ?bucket.class, attempt = attempts + 1, timeout_ms = timeout.as_millis() as u64, "Fetching page");

            match attempt(&client, url, timeout).await {
                Attempt::Response { status, body } => {
                    let signal = classify(&body);
                    if signal == AbuseSignal::HardBlock {
                        warn!(url = %url, "DOS prevention page detected, aborting");
                        return Err(ScholarError::AbuseDetected {
                            url: url.to_string(),
                        });
                    }
                    if status == StatusCode::OK && signal == AbuseSignal::Clean {
                        let mut state = bucket.state();
                        state.record(attempts, timeout);
                        state.clear_blocks();
                        return Ok(Sequence::Done(body));
                    }
                    if status == StatusCode::NOT_FOUND {
                        info!(url = %url, "Got a 404 error, retrying with the same session");
                        attempts += 1;
                        continue;
                    }
                    if signal == AbuseSignal::SoftBlock {
                        warn!(url = %url, "Got a CAPTCHA request");
                        return Err(ScholarError::CaptchaRequired {
                            url: url.to_string(),
                        });
                    }
                    if status == StatusCode::FORBIDDEN {
                        let rotated = self.after_forbidden(bucket, &provider, url).await;
                        bucket.state().blocked_recently = true;
                        timeout = base_timeout;
                        attempts += 1;
                        match rotated {
                            Ok(next) => client = next,
                            Err(e) => {
                                warn!(error = %e, "No other connections possible");
                                bucket.state().record(attempts, timeout);
                                return Ok(Sequence::Exhausted(attempts));
                            }
                        }
                        continue;
                    }
                    info!(url = %url, status = status.as_u16(), "Unexpected status");
                }
                Attempt::TimedOut => {
                    if timeout < ceiling {
                        info!(url = %url, timeout_ms = timeout.as_millis() as u64, "Timeout, increasing it and retrying within the same session");
                        timeout += base_timeout;
                        continue;
                    }
                    info!(url = %url, "Timeout at ceiling");
                }
                Attempt::Failed(e) => {
                    info!(url = %url, error = %e, "Exception while fetching page");
                }
            }

            attempts += 1;
            info!(url = %url, tries = attempts, "Try failed, switching session");
            match provider.rotate() {
                Ok(next) => {
                    client = next;
                    timeout = base_timeout;
                }
                Err(e) => {
                    warn!(error = %e, "No other connections possible");
                    bucket.state().record(attempts, timeout);
                    return Ok(Sequence::Exhausted(attempts));
                }
            }
        }
    }

    /// First 403 since the last success rotates at once; later ones cool down first.
    async fn after_forbidden(
        &self,
        bucket: &Bucket,
        provider: &SessionProvider,
        url: &Url,
    ) -> Result<Client> {
        let (blocked, blocks) = {
            let mut state = bucket.state();
            state.consecutive_blocks += 1;
            (state.blocked_recently, state.consecutive_blocks)
        };

        if blocked {
            let wait = self.policy.cooldown(blocks);
            warn!(url = %url, blocks, wait_secs = wait.as_secs_f64(), "Access denied again, cooling down");
            tokio::time::sleep(wait).await;
        } else {
            warn!(url = %url, "Access denied (403), retrying immediately with another session");
        }

        provider.rotate()
    }
}

async fn attempt(client: &Client, url: &Url, timeout: Duration) -> Attempt {
    let response = match client.get(url.clone()).timeout(timeout).send().await {
        Ok(response) => response,
        Err(e) if e.is_timeout() => return Attempt::TimedOut,
        Err(e) => return Attempt::Failed(e),
    };
    let status = response.status();
    match response.text().await {
        Ok(body) => Attempt::Response { status, body },
        Err(e) if e.is_timeout() => Attempt::TimedOut,
        Err(e) => Attempt::Failed(e),
    }
}
