//! Gatekeeping for command lines before they reach the process boundary.
//!
//! A command line is accepted only when its first token is one of the
//! allow-listed tools and it carries none of the shell metacharacters used for
//! chaining, piping, substitution or redirection.

use tracing::warn;

use crate::app::error::AppError;

pub const ALLOWED_COMMANDS: [&str; 6] = ["settings", "wm", "am", "pm", "dumpsys", "getprop"];

pub const DANGEROUS_CHARS: [char; 7] = [';', '&', '|', '`', '$', '<', '>'];

pub fn is_allowed_prefix(token: &str) -> bool {
    ALLOWED_COMMANDS.contains(&token)
}

pub fn contains_dangerous_chars(raw: &str) -> bool {
    raw.chars().any(|ch| DANGEROUS_CHARS.contains(&ch))
}

/// Like [`validate`], but says why a command was refused.
pub fn check(raw: &str) -> Result<(), AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("Command is empty", ""));
    }
    if contains_dangerous_chars(raw) {
        warn!(command = %raw, "command contains dangerous characters");
        return Err(AppError::validation(
            format!("Command contains dangerous characters: {raw}"),
            "",
        ));
    }
    let prefix = trimmed.split_whitespace().next().unwrap_or_default();
    if !is_allowed_prefix(prefix) {
        warn!(prefix = %prefix, "command not in allowed list");
        return Err(AppError::validation(
            format!("Command not in allowed list: {prefix}"),
            "",
        ));
    }
    Ok(())
}

pub fn validate(raw: &str) -> bool {
    check(raw).is_ok()
}

/// Strips metacharacters and surrounding whitespace. This is a second pass
/// after [`validate`], never a replacement for it.
pub fn sanitize(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|ch| !DANGEROUS_CHARS.contains(ch))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_vocabulary_commands() {
        for command in [
            "wm size 1280x720",
            "wm density reset",
            "am kill-all",
            "am force-stop com.example.game",
            "pm grant com.example android.permission.WRITE_SECURE_SETTINGS",
            "dumpsys package com.example",
            "getprop ro.build.version.release",
            "settings put global window_animation_scale 0.5",
            "  settings get secure android_id  ",
        ] {
            assert!(validate(command), "expected {command:?} to be accepted");
        }
    }

    #[test]
    fn rejects_empty_and_blank() {
        assert!(!validate(""));
        assert!(!validate("   \t\n"));
    }

    #[test]
    fn rejects_prefixes_outside_allow_list() {
        for command in ["echo test", "rm -rf /sdcard", "sh -c id", "appops set x y allow", "wmsize", "WM size"] {
            assert!(!validate(command), "expected {command:?} to be rejected");
        }
    }

    #[test]
    fn rejects_every_dangerous_char_regardless_of_prefix() {
        for ch in DANGEROUS_CHARS {
            let command = format!("wm size 1080x1920{ch}reboot");
            assert!(!validate(&command), "expected {command:?} to be rejected");
            let leading = format!("{ch}settings get secure android_id");
            assert!(!validate(&leading));
        }
        assert!(!validate("getprop $(id)"));
        assert!(!validate("dumpsys package x > /sdcard/out"));
    }

    #[test]
    fn check_reports_the_reason() {
        let err = check("echo hi").expect_err("expected rejection");
        assert_eq!(err.code, "ERR_VALIDATION");
        assert!(err.error.contains("echo"));
        let err = check("wm size; reboot").expect_err("expected rejection");
        assert!(err.error.contains("dangerous"));
    }

    #[test]
    fn sanitize_strips_metacharacters_and_trims() {
        assert_eq!(sanitize("  wm size  "), "wm size");
        assert_eq!(sanitize("wm size;reboot|x`y`$z<a>b&"), "wm sizerebootxyzab");
    }
}
