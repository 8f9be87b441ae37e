// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! INI configuration loader.
//!
//! ```ini
//! [Receiver]
//! hw_family = gen12lp
//! dispatch_mode = batched
//! residency_budget = 268435456
//!
//! [Wait]
//! enable_timeout = true
//! timeout_us = 500000
//! poll_spin_count = 16
//!
//! [Debug]
//! events_debug = false
//! profiling = true
//! ```

use std::path::{Path, PathBuf};

use ini::Ini;
use log::{debug, info, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::settings::{DispatchMode, HwFamily, Settings};

const CONFIG_FILE_NAME: &str = "vela.ini";

/// Locate the vela config file.
pub fn find_config_path() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var("VELA_CONFIG") {
        let path = PathBuf::from(explicit);
        if path.exists() {
            return Some(path);
        }
    }

    // XDG_CONFIG_HOME
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(&xdg).join("vela").join(CONFIG_FILE_NAME);
        if path.exists() {
            return Some(path);
        }
    }

    // ~/.config/vela/vela.ini
    if let Ok(home) = std::env::var("HOME") {
        let path = PathBuf::from(&home)
            .join(".config")
            .join("vela")
            .join(CONFIG_FILE_NAME);
        if path.exists() {
            return Some(path);
        }
    }

    None
}

/// Load settings, falling back to defaults when the file is missing or broken.
pub fn load_config(path: Option<&Path>) -> Settings {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                warn!("Config file not found: {}", p.display());
                return Settings::default();
            }
            p.to_path_buf()
        }
        None => match find_config_path() {
            Some(p) => p,
            None => {
                info!("No vela config found, using defaults");
                return Settings::default();
            }
        },
    };

    match try_load_config(&config_path) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("Failed to load config {}: {}", config_path.display(), e);
            Settings::default()
        }
    }
}

/// Load settings from a specific file, reporting read and parse failures.
pub fn try_load_config(path: &Path) -> RuntimeResult<Settings> {
    info!("Loading config from: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    load_config_from_str(&text)
}

/// Parse settings from INI text.
pub fn load_config_from_str(text: &str) -> RuntimeResult<Settings> {
    let conf = Ini::load_from_str(text).map_err(|e| RuntimeError::Config(e.to_string()))?;
    let mut settings = Settings::default();

    // [Receiver]
    if let Some(section) = conf.section(Some("Receiver")) {
        if let Some(family) = section.get("hw_family") {
            settings.hw_family = HwFamily::from_name(family).ok_or_else(|| {
                RuntimeError::Config(format!("unknown hw_family '{}'", family.trim()))
            })?;
            debug!("Hardware family: {}", settings.hw_family);
        }
        if let Some(mode) = section.get("dispatch_mode") {
            settings.dispatch_mode = DispatchMode::from_str_or_default(mode);
            debug!("Dispatch mode: {:?}", settings.dispatch_mode);
        }
        if let Some(budget) = section.get("residency_budget") {
            settings.residency_budget = budget.trim().parse().unwrap_or_else(|_| {
                warn!("Invalid residency_budget '{}', keeping default", budget.trim());
                settings.residency_budget
            });
            debug!("Residency budget: 0x{:X}", settings.residency_budget);
        }
    }

    // [Wait]
    if let Some(section) = conf.section(Some("Wait")) {
        if let Some(enable) = section.get("enable_timeout") {
            settings.enable_timeout = parse_bool(enable);
        }
        if let Some(timeout) = section.get("timeout_us") {
            settings.wait_timeout_us = timeout.trim().parse().unwrap_or_else(|_| {
                warn!("Invalid timeout_us '{}', keeping default", timeout.trim());
                settings.wait_timeout_us
            });
        }
        if let Some(spins) = section.get("poll_spin_count") {
            settings.poll_spin_count = spins.trim().parse().unwrap_or_else(|_| {
                warn!("Invalid poll_spin_count '{}', keeping default", spins.trim());
                settings.poll_spin_count
            });
        }
    }

    // [Debug]
    if let Some(section) = conf.section(Some("Debug")) {
        if let Some(events) = section.get("events_debug") {
            settings.events_debug = parse_bool(events);
        }
        if let Some(profiling) = section.get("profiling") {
            settings.profiling = parse_bool(profiling);
        }
    }

    Ok(settings)
}

fn parse_bool(value: &str) -> bool {
    value.trim() == "true" || value.trim() == "1"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let settings = load_config_from_str("").unwrap();
        assert_eq!(settings.hw_family, HwFamily::Gen12Lp);
        assert_eq!(settings.dispatch_mode, DispatchMode::Immediate);
        assert!(settings.enable_timeout);
    }

    #[test]
    fn test_all_sections() {
        let text = "\
[Receiver]
hw_family = gen9
dispatch_mode = batched
residency_budget = 65536

[Wait]
enable_timeout = 0
timeout_us = 250
poll_spin_count = 4

[Debug]
events_debug = true
profiling = 1
";
        let settings = load_config_from_str(text).unwrap();
        assert_eq!(settings.hw_family, HwFamily::Gen9);
        assert_eq!(settings.dispatch_mode, DispatchMode::Batched);
        assert_eq!(settings.residency_budget, 0x10000);
        assert!(!settings.enable_timeout);
        assert_eq!(settings.wait_timeout_us, 250);
        assert_eq!(settings.poll_spin_count, 4);
        assert!(settings.events_debug);
        assert!(settings.profiling);
    }

    #[test]
    fn test_unknown_family_is_config_error() {
        let err = load_config_from_str("[Receiver]\nhw_family = gen4\n").unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[test]
    fn test_bad_number_keeps_default() {
        let settings = load_config_from_str("[Wait]\ntimeout_us = soon\n").unwrap();
        assert_eq!(settings.wait_timeout_us, Settings::default().wait_timeout_us);
    }

    #[test]
    fn test_bad_residency_budget_keeps_default() {
        let settings = load_config_from_str("[Receiver]\nresidency_budget = lots\n").unwrap();
        assert_eq!(settings.residency_budget, Settings::default().residency_budget);

        let disabled = load_config_from_str("[Receiver]\nresidency_budget = 0\n").unwrap();
        assert_eq!(disabled.residency_budget, 0);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let settings = load_config(Some(Path::new("/nonexistent/vela.ini")));
        assert_eq!(settings.poll_spin_count, Settings::default().poll_spin_count);
    }

    #[test]
    fn test_try_load_missing_file_is_io_error() {
        let err = try_load_config(Path::new("/nonexistent/vela.ini")).unwrap_err();
        assert!(matches!(err, RuntimeError::Io(_)));
    }
}
