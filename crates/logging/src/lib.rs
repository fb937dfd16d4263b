#![deny(missing_docs)]

//! # Overview
//!
//! `xcp_logging` owns one piece of logging policy: turning a stacked
//! `-q`/`-v` verbosity delta into a [`tracing::Level`]. It performs no
//! I/O of its own.
//!
//! # Design
//!
//! Following the teacher's `logging`/`logging-sink` split, this crate is
//! the pure mapping half; `xcp-cli::init_tracing` is the sink half that
//! actually installs a `tracing-subscriber` `fmt` layer with an
//! `EnvFilter` fallback (`XCP_LOG`).
//!
//! # Invariants
//!
//! - The default delta (`0`) always maps to [`tracing::Level::INFO`].
//! - Each `-v` raises one step (`INFO → DEBUG → TRACE`), each `-q` lowers
//!   one step (`INFO → WARN → ERROR`); deltas past either end saturate
//!   rather than wrapping or panicking.

use tracing::Level;

/// Maps a stacked `-v`/`-q` delta (positive = more verbose, negative =
/// quieter) onto a [`tracing::Level`], saturating at [`Level::TRACE`] and
/// [`Level::ERROR`].
#[must_use]
pub fn level_for_verbosity(delta: i32) -> Level {
    const LEVELS: [Level; 5] = [
        Level::ERROR,
        Level::WARN,
        Level::INFO,
        Level::DEBUG,
        Level::TRACE,
    ];
    // INFO sits at index 2; clamp the shifted index into the table.
    let index = (2 + delta).clamp(0, LEVELS.len() as i32 - 1) as usize;
    LEVELS[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delta_is_info() {
        assert_eq!(level_for_verbosity(0), Level::INFO);
    }

    #[test]
    fn single_verbose_flag_is_debug() {
        assert_eq!(level_for_verbosity(1), Level::DEBUG);
    }

    #[test]
    fn two_verbose_flags_is_trace() {
        assert_eq!(level_for_verbosity(2), Level::TRACE);
    }

    #[test]
    fn verbosity_saturates_at_trace() {
        assert_eq!(level_for_verbosity(50), Level::TRACE);
    }

    #[test]
    fn single_quiet_flag_is_warn() {
        assert_eq!(level_for_verbosity(-1), Level::WARN);
    }

    #[test]
    fn two_quiet_flags_is_error() {
        assert_eq!(level_for_verbosity(-2), Level::ERROR);
    }

    #[test]
    fn quietness_saturates_at_error() {
        assert_eq!(level_for_verbosity(-50), Level::ERROR);
    }
}
