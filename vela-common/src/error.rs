// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Errors surfaced to callers of the runtime.
//!
//! Only setup-time failures are errors. Precondition violations inside the
//! submission engine are assertions, allocation failure is `None`, and wait
//! timeouts are a `false` return.

use thiserror::Error;

/// Errors returned while setting up a device or loading configuration.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("out of device memory (requested {size:#X} bytes)")]
    OutOfMemory { size: usize },

    #[error("no command stream receiver registered for hardware family '{0}'")]
    UnsupportedFamily(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for runtime setup operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_memory_message() {
        let err = RuntimeError::OutOfMemory { size: 0x2000 };
        assert_eq!(err.to_string(), "out of device memory (requested 0x2000 bytes)");
    }

    #[test]
    fn test_io_error_converts() {
        fn read() -> RuntimeResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))?;
            Ok(())
        }
        assert!(matches!(read(), Err(RuntimeError::Io(_))));
    }
}
