//! Cookie mirror storage tier
//!
//! Every write becomes a first-party cookie scoped to `/`, flagged `Secure`
//! and `SameSite=Strict`. A lifetime turns into an `expires` attribute; no
//! lifetime makes a session cookie. Expired cookies read as absent.
//!
//! The jar can be mirrored to a JSON file so cookies outlive the process.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::StorageTier;
use crate::clock::Clock;
use crate::error::Result;

/// A single stored cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// `None` for session cookies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

impl Cookie {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }

    /// Render the cookie the way it is written by the tracker.
    ///
    /// `name=value; expires=Tue, 01 Jan 2030 00:00:00 GMT; path=/; Secure; SameSite=Strict`
    pub fn to_set_cookie_string(&self) -> String {
        let expires = match self.expires {
            Some(at) => format!("; expires={}", at.format("%a, %d %b %Y %H:%M:%S GMT")),
            None => String::new(),
        };
        format!(
            "{}={}{}; path=/; Secure; SameSite=Strict",
            self.name, self.value, expires
        )
    }
}

/// Cookie store with per-entry expiry
pub struct CookieJar {
    cookies: Mutex<Vec<Cookie>>,
    clock: Arc<dyn Clock>,
    path: Option<PathBuf>,
}

impl CookieJar {
    /// Create an empty, purely in-memory jar
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            cookies: Mutex::new(Vec::new()),
            clock,
            path: None,
        }
    }

    /// Open a jar mirrored to `path`, loading any cookies already there
    pub fn open(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        let cookies = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            Vec::new()
        };

        Ok(Self {
            cookies: Mutex::new(cookies),
            clock,
            path: Some(path.to_path_buf()),
        })
    }

    /// Seed a jar from a `document.cookie` style line (`a=1; b=2`).
    ///
    /// Parsed cookies are session cookies. Fragments without `=` are skipped.
    pub fn parse_header(header: &str, clock: Arc<dyn Clock>) -> Self {
        let cookies = header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                if name.is_empty() {
                    return None;
                }
                Some(Cookie {
                    name: name.to_string(),
                    value: value.to_string(),
                    expires: None,
                })
            })
            .collect();

        Self {
            cookies: Mutex::new(cookies),
            clock,
            path: None,
        }
    }

    /// Live cookies as a `document.cookie` style line
    pub fn header(&self) -> String {
        let now = self.clock.now();
        self.cookies
            .lock()
            .unwrap()
            .iter()
            .filter(|c| !c.is_expired(now))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// The cookie string last written for `name`, if it is still live
    pub fn set_cookie_header(&self, name: &str) -> Option<String> {
        self.cookie(name).map(|c| c.to_set_cookie_string())
    }

    /// Look up a live cookie by name
    pub fn cookie(&self, name: &str) -> Option<Cookie> {
        let now = self.clock.now();
        self.cookies
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.name == name && !c.is_expired(now))
            .cloned()
    }

    fn save(&self, cookies: &[Cookie]) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let now = self.clock.now();
        let live: Vec<&Cookie> = cookies.iter().filter(|c| !c.is_expired(now)).collect();
        std::fs::write(path, serde_json::to_string_pretty(&live)?)?;
        Ok(())
    }
}

impl StorageTier for CookieJar {
    fn name(&self) -> &'static str {
        "cookie"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cookie(key).map(|c| c.value))
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires = ttl
            .filter(|ttl| *ttl > Duration::zero())
            .map(|ttl| self.clock.now() + ttl);
        let cookie = Cookie {
            name: key.to_string(),
            value: value.to_string(),
            expires,
        };
        tracing::trace!(cookie = %cookie.to_set_cookie_string(), "Writing cookie");

        let mut cookies = self.cookies.lock().unwrap();
        match cookies.iter_mut().find(|c| c.name == key) {
            Some(existing) => *existing = cookie,
            None => cookies.push(cookie),
        }
        self.save(&cookies)
    }
}
