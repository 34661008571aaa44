// This file is part of gittuf-link
// <https://github.com/gittuf-link/gittuf-link>
//
// Copyright (C) 2025-2026 The gittuf-link Team <dev@gittuf-link.org>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License version 3 or
// later as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Environment gates for operations that can damage repository state.
//!
//! Commands that rewrite or discard trust state are only honored when the
//! corresponding variable is set, so they cannot be reached by accident
//! from scripts or CI.

use std::env;

use thiserror::Error;

/// Enables developer-only operations.
pub const DEV_MODE_ENV: &str = "GITTUF_DEV";

/// Enables evaluation-only operations.
pub const EVAL_MODE_ENV: &str = "GITTUF_EVAL";

#[derive(Debug, Error)]
#[error("operation requires {0}=1")]
pub struct NotEnabled(pub &'static str);

fn enabled(var: &str) -> bool {
    matches!(env::var(var).as_deref(), Ok("1") | Ok("true"))
}

pub fn dev_mode() -> bool {
    enabled(DEV_MODE_ENV)
}

pub fn eval_mode() -> bool {
    enabled(EVAL_MODE_ENV)
}

/// Guard for developer-only entry points.
pub fn require_dev_mode() -> Result<(), NotEnabled> {
    if dev_mode() {
        Ok(())
    } else {
        Err(NotEnabled(DEV_MODE_ENV))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env vars are process-global; exercise both gates in one test to avoid
    // racing the parallel test runner.
    #[test]
    fn gates_follow_environment() {
        env::remove_var(DEV_MODE_ENV);
        assert!(!dev_mode());
        assert!(require_dev_mode().is_err());

        env::set_var(DEV_MODE_ENV, "1");
        assert!(dev_mode());
        assert!(require_dev_mode().is_ok());
        env::remove_var(DEV_MODE_ENV);

        env::remove_var(EVAL_MODE_ENV);
        assert!(!eval_mode());
        env::set_var(EVAL_MODE_ENV, "true");
        assert!(eval_mode());
        env::remove_var(EVAL_MODE_ENV);
    }
}
