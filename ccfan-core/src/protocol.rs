//! ComputerController serial command protocol
//!
//! Newline-terminated ASCII commands. The firmware answers `identity` with a
//! few lines of text followed by a line reading `OK`. Duty commands are
//! fire-and-forget.

use crate::types::Duty;

/// Line delimiter for outbound commands
pub const LINE_DELIMITER: &str = "\n";

/// Identity query
pub const IDENTITY_QUERY: &str = "identity";

/// Line terminating a command response
pub const TERMINAL_MARKER: &str = "OK";

/// Verb of the GPU fan duty command
pub const DUTY_VERB: &str = "gpufan";

/// Encode the duty command for the given duty, without the line delimiter
pub fn duty_command(duty: Duty) -> String {
    format!("{} {}", DUTY_VERB, duty.percent())
}

/// Check a collected identity response for the expected marker
///
/// Lines are joined with `\n` before the search, so the marker may sit
/// anywhere in the response.
pub fn identity_confirmed(lines: &[String], marker: &str) -> bool {
    lines.join("\n").contains(marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duty_command_format() {
        assert_eq!(duty_command(Duty::OFF), "gpufan 0");
        assert_eq!(duty_command(Duty::clamped(37)), "gpufan 37");
        assert_eq!(duty_command(Duty::FULL), "gpufan 100");
    }

    #[test]
    fn test_duty_command_never_out_of_range() {
        assert_eq!(duty_command(Duty::clamped(-5)), "gpufan 0");
        assert_eq!(duty_command(Duty::clamped(150)), "gpufan 100");
    }

    #[test]
    fn test_identity_confirmed() {
        let lines = vec!["ComputerController v1.2".to_string(), "OK".to_string()];
        assert!(identity_confirmed(&lines, "ComputerController"));

        let lines = vec!["garbage".to_string(), "OK".to_string()];
        assert!(!identity_confirmed(&lines, "ComputerController"));

        assert!(!identity_confirmed(&[], "ComputerController"));
    }
}
