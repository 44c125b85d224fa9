//! Central configuration constants for relocation passes and their
//! environment-style invocation boundary.

/// Export directory for a pass. Set by the parent when it spawns a nested pass.
pub const ENV_TARGET_DIR: &str = "RELOC_TARGET_DIR";

/// When `true`, a pass does not dispatch its linked libraries.
pub const ENV_SKIP_LIBRARIES: &str = "RELOC_SKIP_LIBRARIES";

/// Original location a relocated library copy resolves its relative references against.
pub const ENV_SOURCE_ORIGIN: &str = "RELOC_SOURCE_ORIGIN";

/// Enables debug logging, forwarded to nested passes.
pub const ENV_DEBUG: &str = "RELOC_DEBUG";

/// Default nesting limit for in-process library dispatch.
pub const DEFAULT_MAX_LIBRARY_DEPTH: usize = 8;

/// Minimum allowed nesting limit.
pub const MIN_LIBRARY_DEPTH: usize = 1;

/// Maximum allowed nesting limit.
pub const MAX_LIBRARY_DEPTH: usize = 64;

/// Extension of the per-pass diagnostic log written next to the output project.
pub const LOG_FILE_EXTENSION: &str = "log";

/// Exit code of a pack that saved its output but could not transfer every file.
pub const EXIT_TRANSFER_FAILED: i32 = 2;

/// Convenience function to clamp a depth value into allowed range.
pub fn clamp_depth(v: usize) -> usize {
    v.clamp(MIN_LIBRARY_DEPTH, MAX_LIBRARY_DEPTH)
}

/// Values that switch an environment flag off. Any other set value switches
/// it on, the same reading clap's `FalseyValueParser` gives `--skip-libraries`.
pub const FALSEY_VALUES: [&str; 7] = ["", "n", "no", "f", "false", "off", "0"];

/// Interprets an environment-style flag value. Unset or falsey is off.
pub fn flag_enabled(value: Option<&str>) -> bool {
    match value {
        None => false,
        Some(v) => !FALSEY_VALUES.contains(&v.trim().to_ascii_lowercase().as_str()),
    }
}

/// Reads an environment flag through [`flag_enabled`].
pub fn env_flag(name: &str) -> bool {
    flag_enabled(std::env::var(name).ok().as_deref())
}
