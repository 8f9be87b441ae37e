// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;

/// Runtime settings, populated from the config INI.
#[derive(Debug, Clone)]
pub struct Settings {
    // Receiver
    pub hw_family: HwFamily,
    pub dispatch_mode: DispatchMode,
    /// Resident bytes above which a flush first evicts completed allocations.
    /// Zero disables the check.
    pub residency_budget: usize,

    // Wait
    pub enable_timeout: bool,
    pub wait_timeout_us: i64,
    pub poll_spin_count: u32,

    // Debug
    pub events_debug: bool,
    pub profiling: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hw_family: HwFamily::Gen12Lp,
            dispatch_mode: DispatchMode::Immediate,
            residency_budget: 256 << 20,
            enable_timeout: true,
            wait_timeout_us: 1_000_000,
            poll_spin_count: 16,
            events_debug: false,
            profiling: false,
        }
    }
}

/// How `flush_task` hands batches to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Every flush is submitted at once.
    Immediate,
    /// Flushes are queued until `flush_batched_submissions` or a wait forces them out.
    Batched,
}

impl DispatchMode {
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "0" | "immediate" => Self::Immediate,
            "1" | "batched" => Self::Batched,
            other => {
                log::warn!("settings: unknown dispatch mode '{}', using immediate", other);
                Self::Immediate
            }
        }
    }
}

/// Hardware generation a command stream receiver is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HwFamily {
    Gen9,
    Gen11,
    Gen12Lp,
}

impl HwFamily {
    pub const ALL: [HwFamily; 3] = [Self::Gen9, Self::Gen11, Self::Gen12Lp];

    /// Parse a family name such as `gen12lp`. Returns `None` for unknown names.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "gen9" | "skl" => Some(Self::Gen9),
            "gen11" | "icl" => Some(Self::Gen11),
            "gen12lp" | "tgl" => Some(Self::Gen12Lp),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Gen9 => "gen9",
            Self::Gen11 => "gen11",
            Self::Gen12Lp => "gen12lp",
        }
    }
}

impl fmt::Display for HwFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
