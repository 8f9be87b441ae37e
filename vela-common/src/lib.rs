// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod config;
pub mod error;
pub mod settings;
pub mod types;

pub use error::{RuntimeError, RuntimeResult};
pub use settings::{DispatchMode, HwFamily, Settings};
pub use types::*;
