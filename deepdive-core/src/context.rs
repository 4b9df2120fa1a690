//! Page environment supplied by the host
//!
//! The embedding host describes the page being instrumented. The lookups here
//! are plain tables: viewport width to device class, user agent to browser
//! family, URL query to campaign parameters.

use chrono::FixedOffset;
use url::Url;

/// Campaign parameters copied from the page URL when present
pub const UTM_PARAMS: [&str; 6] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_id",
    "utm_term",
    "utm_content",
];

/// Browser families, checked in order against the user agent
const BROWSERS: &[(&str, &[&str])] = &[
    ("Firefox", &["Firefox"]),
    ("Opera", &["Opera", "OPR"]),
    ("Chrome", &["Chrome"]),
    ("Safari", &["Safari"]),
    ("IE", &["MSIE", "Trident"]),
];

/// Description of the page the tracker runs in
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    /// Full page URL including the query string
    pub url: String,
    /// Document title
    pub title: String,
    /// Referring URL, empty for direct traffic
    pub referrer: String,
    /// Preferred language tag (e.g. `en-US`)
    pub language: String,
    /// User agent string
    pub user_agent: String,
    /// Inner width of the viewport in CSS pixels
    pub viewport_width: Option<u32>,
    pub screen_width: u32,
    pub screen_height: u32,
    /// Offset used for local timestamps; the system zone when `None`
    pub utc_offset: Option<FixedOffset>,
}

impl PageContext {
    /// `desktop` above 992px, `tablet` above 768px, `mobile` otherwise
    pub fn device_type(&self) -> &'static str {
        match self.viewport_width.unwrap_or(0) {
            w if w > 992 => "desktop",
            w if w > 768 => "tablet",
            _ => "mobile",
        }
    }

    pub fn screen_resolution(&self) -> String {
        format!("{}x{}", self.screen_width, self.screen_height)
    }

    /// First browser family whose marker appears in the user agent
    pub fn browser(&self) -> &'static str {
        BROWSERS
            .iter()
            .find(|(_, markers)| markers.iter().any(|m| self.user_agent.contains(m)))
            .map(|(name, _)| *name)
            .unwrap_or("Other")
    }

    /// Referrer, or `direct` when there is none
    pub fn referrer_or_direct(&self) -> &str {
        if self.referrer.is_empty() {
            "direct"
        } else {
            &self.referrer
        }
    }

    /// First value of a query parameter on the page URL
    pub fn query_param(&self, name: &str) -> Option<String> {
        let url = Url::parse(&self.url).ok()?;
        let value = url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned());
        value
    }

    /// UTM parameters present on the page URL, in canonical order
    pub fn utm_params(&self) -> Vec<(&'static str, String)> {
        UTM_PARAMS
            .iter()
            .filter_map(|key| self.query_param(key).map(|value| (*key, value)))
            .collect()
    }
}
