//! Cookie persistence for Google Scholar sessions.
//!
//! Cookies exported from a browser that already passed a CAPTCHA make
//! automated sessions look established. [`CookieManager`] stores them as a
//! JSON array; [`seed_jar`] turns them into the jar every client built by a
//! [`SessionProvider`](crate::proxy::SessionProvider) starts from.

use crate::error::{ScholarError, Result};
use reqwest::cookie::Jar;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use url::Url;

/// Default cookie file path: `~/.scholarly_cookies.json`
fn default_cookie_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(".scholarly_cookies.json"))
        .ok_or_else(|| ScholarError::Config("Cannot determine home directory".to_string()))
}

/// Cookie entry matching the browser devtools export format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, alias = "httpOnly")]
    pub http_only: bool,
    #[serde(default, alias = "expirationDate")]
    pub expires: Option<f64>,
}

impl Cookie {
    /// `Set-Cookie` style line understood by [`Jar::add_cookie_str`]
    fn to_set_cookie(&self) -> String {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        let mut line = format!(
            "{}={}; Domain={}; Path={}",
            self.name, self.value, self.domain, path
        );
        if self.secure {
            line.push_str("; Secure");
        }
        if self.http_only {
            line.push_str("; HttpOnly");
        }
        line
    }

    /// Origin the cookie belongs to, used as the jar lookup key
    fn origin(&self) -> Option<Url> {
        let host = self.domain.trim_start_matches('.');
        if host.is_empty() {
            return None;
        }
        Url::parse(&format!("https://{}/", host)).ok()
    }
}

/// Build a fresh cookie jar containing `cookies`.
///
/// Cookies with an unusable domain are skipped.
pub fn seed_jar(cookies: &[Cookie]) -> Jar {
    let jar = Jar::default();
    let mut seeded = 0usize;
    for cookie in cookies {
        match cookie.origin() {
            Some(origin) => {
                jar.add_cookie_str(&cookie.to_set_cookie(), &origin);
                seeded += 1;
            }
            None => debug!(name = %cookie.name, "Skipping cookie without domain"),
        }
    }
    debug!(seeded, "Seeded cookie jar");
    jar
}

/// Cookie manager for loading and saving cookies
pub struct CookieManager {
    path: PathBuf,
}

impl CookieManager {
    /// Create a new CookieManager with default path
    pub fn new() -> Result<Self> {
        Ok(Self {
            path: default_cookie_path()?,
        })
    }

    /// Create a new CookieManager with custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Get the cookie file path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load cookies from file.
    ///
    /// Returns empty vec if file doesn't exist or is invalid
    pub fn load(&self) -> Vec<Cookie> {
        if !self.path.exists() {
            debug!("Cookie file not found: {:?}", self.path);
            return Vec::new();
        }

        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<Vec<Cookie>>(&content) {
                Ok(cookies) => {
                    info!("Loaded {} cookies from {:?}", cookies.len(), self.path);
                    cookies
                }
                Err(e) => {
                    warn!("Failed to parse cookies: {}", e);
                    Vec::new()
                }
            },
            Err(e) => {
                warn!("Failed to read cookie file: {}", e);
                Vec::new()
            }
        }
    }

    /// Load only the cookies scoped to a Google domain
    pub fn load_google(&self) -> Vec<Cookie> {
        self.load()
            .into_iter()
            .filter(|c| c.domain.contains("google"))
            .collect()
    }

    /// Save cookies to file
    pub fn save(&self, cookies: &[Cookie]) -> Result<()> {
        let content = serde_json::to_string_pretty(cookies)?;
        std::fs::write(&self.path, content)?;
        info!("Saved {} cookies to {:?}", cookies.len(), self.path);
        Ok(())
    }

    /// Clear stored cookies
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            info!("Cleared cookies at {:?}", self.path);
        }
        Ok(())
    }
}

impl Default for CookieManager {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self {
            path: PathBuf::from(".scholarly_cookies.json"),
        })
    }
}
