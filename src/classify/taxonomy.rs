//! The curated bucket taxonomy. This is reference data: replacing it (via
//! `taxonomy_path` in the config) must not require touching the classifier.
//! Bump `version` whenever buckets or keywords change so stored rows get
//! reclassified on the next start.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

pub const OTHER_BUCKET: &str = "Other";

/// A bucket and the lowercase fragments that select it. Declaration order is
/// the tie-break when a topic matches several buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRule {
    pub name: String,
    pub keywords: Vec<String>,
}

/// Whole-word fallbacks tried only when no keyword rule matched. They cover
/// short tokens that would misfire as plain substrings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackRule {
    pub bucket: String,
    pub words: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub version: String,
    pub buckets: Vec<BucketRule>,
    #[serde(default)]
    pub fallbacks: Vec<FallbackRule>,
}

fn rule(name: &str, keywords: &[&str]) -> BucketRule {
    BucketRule {
        name: name.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
}

fn fallback(bucket: &str, words: &[&str]) -> FallbackRule {
    FallbackRule {
        bucket: bucket.to_string(),
        words: words.iter().map(|w| w.to_string()).collect(),
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self {
            version: "2024.2".to_string(),
            buckets: vec![
                rule(
                    "Safety",
                    &["smoke", "water leak", "leak sensor", "carbon monoxide", "gas leak", "flood", "freeze warning"],
                ),
                rule(
                    "Security & Alarm",
                    &["alarm", "security", "intrusion", "burglar", "alarmo", "door lock", "smart lock", "keypad"],
                ),
                rule("Cameras", &["camera", "frigate", "doorbell", "snapshot", "nvr", "cctv"]),
                rule(
                    "Lighting",
                    &["light", "lamp", "dimmer", "brightness", "bulb", "illuminance", "wled", "adaptive lighting"],
                ),
                rule(
                    "Climate",
                    &["climate", "thermostat", "hvac", "heating", "cooling", "temperature", "humidity", "air conditioner", "radiator", "ceiling fan"],
                ),
                rule(
                    "Presence & Motion",
                    &["motion", "occupancy", "presence", "device tracker", "arrive", "arrival", "away mode", "zone"],
                ),
                rule("Covers & Blinds", &["window cover", "blind", "shutter", "curtain", "awning", "garage door", "roller"]),
                rule(
                    "Energy",
                    &["energy", "solar", "battery", "electricity", "tariff", "ev charg", "power consumption", "load shedding"],
                ),
                rule(
                    "Appliances",
                    &["washing machine", "washer", "dryer", "dishwasher", "vacuum", "roborock", "appliance", "fridge", "oven", "coffee"],
                ),
                rule(
                    "Media",
                    &["media", "speaker", "sonos", "spotify", "chromecast", "television", "music", "volume", "plex"],
                ),
                rule(
                    "Voice & AI",
                    &["assist", "voice", "conversation", "llm", "openai", "chatgpt", "ollama", "gemini", "wake word", "text-to-speech"],
                ),
                rule(
                    "Notifications",
                    &["notify", "notification", "actionable", "telegram", "reminder", "announce", "alert"],
                ),
                rule(
                    "Remotes & Buttons",
                    &["remote", "button", "zigbee2mqtt", "z2m", "zha", "deconz", "aqara", "ikea", "tradfri", "switch"],
                ),
                rule(
                    "Scheduling",
                    &["calendar", "schedule", "timer", "sunrise", "sunset", "holiday", "bedtime", "wake up"],
                ),
                rule("Garden", &["irrigation", "sprinkler", "plant", "garden", "watering", "lawn", "pool"]),
                rule(
                    "System & Maintenance",
                    &["backup", "update", "restart", "unavailable", "offline", "z-wave", "zwave", "low battery", "watchdog"],
                ),
            ],
            fallbacks: vec![
                fallback("Security & Alarm", &["arm", "armed", "disarm", "siren", "lock", "unlock"]),
                fallback("Safety", &["co", "co2", "fire", "leak", "gas"]),
                fallback("Lighting", &["lux", "rgb", "scene", "led", "hue"]),
                fallback("Voice & AI", &["ai", "gpt", "genai", "tts", "stt"]),
            ],
        }
    }
}

impl Taxonomy {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let taxonomy: Taxonomy = toml::from_str(&content)?;
        taxonomy.validate()?;
        Ok(taxonomy)
    }

    /// Loads `path` when given, otherwise the built-in taxonomy.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Bucket names in declaration order, with `Other` last.
    pub fn bucket_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.buckets.iter().map(|b| b.name.as_str()).collect();
        if !names.iter().any(|n| n.eq_ignore_ascii_case(OTHER_BUCKET)) {
            names.push(OTHER_BUCKET);
        }
        names
    }

    /// Fallback rules may only point at declared buckets, and bucket names must be unique.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(AppError::Config("taxonomy version must not be empty".into()));
        }
        for (i, bucket) in self.buckets.iter().enumerate() {
            if bucket.name.trim().is_empty() {
                return Err(AppError::Config(format!("taxonomy bucket #{i} has no name")));
            }
            if self.buckets[..i]
                .iter()
                .any(|other| other.name.eq_ignore_ascii_case(&bucket.name))
            {
                return Err(AppError::Config(format!("duplicate taxonomy bucket {:?}", bucket.name)));
            }
        }
        for fb in &self.fallbacks {
            if !self.bucket_names().iter().any(|n| n.eq_ignore_ascii_case(&fb.bucket)) {
                return Err(AppError::Config(format!(
                    "fallback refers to unknown bucket {:?}",
                    fb.bucket
                )));
            }
        }
        Ok(())
    }
}
