//! Layered settings loading.
//!
//! Compiled defaults, then the user's JSON file overlaid key by key, then
//! `TVCOMET_*` environment variables, then validation. Inside the file,
//! objects merge recursively, arrays and scalars replace, and `null` keeps
//! the value underneath.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{CometSettings, LogLevel};

/// `~/.tvcomet/settings.json`.
pub fn settings_path() -> PathBuf {
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
    home.join(".tvcomet").join("settings.json")
}

/// Load from the default path with the process environment.
pub fn load_settings() -> Result<CometSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` with the process environment. A missing file is fine.
pub fn load_settings_from_path(path: &Path) -> Result<CometSettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

/// Load from `path`, looking variables up through `env`.
pub fn load_with_env<F>(path: &Path, env: F) -> Result<CometSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut document = serde_json::to_value(CometSettings::default())?;
    if let Some(layer) = read_layer(path)? {
        document = deep_merge(document, layer);
    }
    let mut settings: CometSettings = serde_json::from_value(document)?;
    apply_overrides(&mut settings, env);
    settings.validate()?;
    Ok(settings)
}

/// Parse the user file, or `None` when it does not exist.
fn read_layer(path: &Path) -> Result<Option<Value>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(None);
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_owned(),
                source,
            });
        }
    };
    debug!(path = %path.display(), "overlaying settings file");
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| SettingsError::Parse {
            path: path.to_owned(),
            source,
        })
}

/// Overlay `layer` onto `base`.
pub fn deep_merge(base: Value, layer: Value) -> Value {
    let (mut base, layer) = match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => (base, layer),
        (_, layer) => return layer,
    };
    for (key, value) in layer.into_iter().filter(|(_, v)| !v.is_null()) {
        let merged = match base.remove(&key) {
            Some(below) => deep_merge(below, value),
            None => value,
        };
        let _ = base.insert(key, merged);
    }
    Value::Object(base)
}

type Apply = fn(&mut CometSettings, &str) -> bool;

/// Environment variables and how each one is applied. An entry returns
/// `false` when the value does not parse.
const OVERRIDES: &[(&str, Apply)] = &[
    ("TVCOMET_BASE_URL", |s, v| {
        s.client.base_url = v.to_owned();
        true
    }),
    ("TVCOMET_SUBPROTOCOL", |s, v| {
        v.clone_into(&mut s.client.subprotocol);
        v.clone_into(&mut s.server.subprotocol);
        true
    }),
    ("TVCOMET_HOST", |s, v| {
        s.server.host = v.to_owned();
        true
    }),
    ("TVCOMET_PORT", |s, v| {
        parse_u16_range(v, 0, u16::MAX).map(|port| s.server.port = port).is_some()
    }),
    ("TVCOMET_RELOAD_CEILING", |s, v| {
        parse_ceiling(v).map(|c| s.client.reload_ceiling = c).is_some()
    }),
    ("TVCOMET_FORCE_POLL", |s, v| {
        parse_bool(v).map(|force| s.client.websocket = !force).is_some()
    }),
    ("TVCOMET_LOG_LEVEL", |s, v| {
        LogLevel::parse(v).map(|level| s.logging.level = level).is_some()
    }),
];

/// Apply `TVCOMET_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut CometSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides looked up through `env`.
///
/// Empty values are skipped. Unparsable ones are logged and leave the
/// setting unchanged.
pub fn apply_overrides<F>(settings: &mut CometSettings, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    for (name, apply) in OVERRIDES {
        let Some(value) = env(*name).filter(|v| !v.is_empty()) else {
            continue;
        };
        if apply(settings, &value) {
            debug!(var = *name, "settings override applied");
        } else {
            warn!(var = *name, %value, "ignoring unparsable settings override");
        }
    }
}

/// `true/1/yes/on` or `false/0/no/off`, any case.
pub fn parse_bool(val: &str) -> Option<bool> {
    let val = val.trim();
    if ["true", "1", "yes", "on"].iter().any(|t| val.eq_ignore_ascii_case(t)) {
        Some(true)
    } else if ["false", "0", "no", "off"].iter().any(|f| val.eq_ignore_ascii_case(f)) {
        Some(false)
    } else {
        None
    }
}

/// A `u16` inside `min..=max`.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    val.trim().parse::<u16>().ok().filter(|n| (min..=max).contains(n))
}

/// A reload ceiling: a count up to 1000, or `none`/`off` for no ceiling.
pub fn parse_ceiling(val: &str) -> Option<Option<u32>> {
    let val = val.trim();
    if val.eq_ignore_ascii_case("none") || val.eq_ignore_ascii_case("off") {
        return Some(None);
    }
    val.parse::<u32>().ok().filter(|n| *n <= 1000).map(Some)
}
