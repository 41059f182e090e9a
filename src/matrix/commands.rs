//! Blackbird command strings and reply parsing.
//!
//! Commands are short ASCII strings terminated by `.` (or `;` for the model
//! query). Replies are `\r\n` separated text lines; routing replies have the
//! form `Output 02 Switch To In 03!`.

use crate::device_info::{MAX_INPUTS, MAX_OUTPUTS};

pub const POWER_ON: &str = "PowerON.";
pub const POWER_OFF: &str = "PowerOFF.";
/// Full status: power line followed by one routing line per output.
pub const STATUS: &str = "Status.";
/// Video routing status only.
pub const VIDEO_STATUS: &str = "VideoStatus.";
pub const MODEL: &str = "/*Type;";

/// Present in the full status reply while the matrix is powered on.
pub const POWER_ON_MARKER: &str = "Power ON!";
pub const POWER_OFF_MARKER: &str = "Power OFF!";
/// Reply sent by the matrix when it rejects a command.
pub const ERROR_MARKER: &str = "Command Error!";

/// Route `input` to `output`, e.g. `3V2.` sends input 3 to output 2.
pub fn route(output: u8, input: u8) -> String {
    format!("{}V{}.", input, output)
}

/// Parse a routing command back into `(output, input)`.
pub fn parse_route(command: &str) -> Option<(u8, u8)> {
    let body = command.strip_suffix('.')?;
    let (input, output) = body.split_once('V')?;
    let input = input.parse().ok()?;
    let output = output.parse().ok()?;
    Some((output, input))
}

/// Format one routing status line.
pub fn route_line(output: u8, input: u8) -> String {
    format!("Output {:02} Switch To In {:02}!", output, input)
}

/// Parse a single routing status line into `(output, input)`.
///
/// Numbers outside 1..=8 are rejected.
pub fn parse_route_line(line: &str) -> Option<(u8, u8)> {
    let body = line.trim().strip_prefix("Output ")?.strip_suffix('!')?;
    let (output, input) = body.split_once(" Switch To In ")?;
    let output: u8 = output.trim().parse().ok()?;
    let input: u8 = input.trim().parse().ok()?;

    if !(1..=MAX_OUTPUTS).contains(&output) || !(1..=MAX_INPUTS).contains(&input) {
        return None;
    }
    Some((output, input))
}

/// Every valid routing line in a reply, in reply order.
pub fn parse_routes(reply: &str) -> Vec<(u8, u8)> {
    reply.lines().filter_map(parse_route_line).collect()
}

/// Whether a status reply reports the matrix as powered on.
pub fn reports_power_on(reply: &str) -> bool {
    reply.contains(POWER_ON_MARKER)
}

pub fn is_error_reply(reply: &str) -> bool {
    reply.contains(ERROR_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_command_format() {
        assert_eq!(route(2, 3), "3V2.");
        assert_eq!(parse_route("3V2."), Some((2, 3)));
        assert_eq!(parse_route("PowerON."), None);
        assert_eq!(parse_route("3V2"), None);
    }

    #[test]
    fn test_parse_route_line() {
        assert_eq!(parse_route_line("Output 02 Switch To In 03!"), Some((2, 3)));
        assert_eq!(parse_route_line("  Output 8 Switch To In 1!\r"), Some((8, 1)));
        assert_eq!(parse_route_line("Output 09 Switch To In 03!"), None);
        assert_eq!(parse_route_line("Output 02 Switch To In 00!"), None);
        assert_eq!(parse_route_line("Power ON!"), None);
    }

    #[test]
    fn test_parse_routes_skips_unrelated_lines() {
        let reply = "Power ON!\r\nOutput 01 Switch To In 04!\r\ngarbage\r\nOutput 05 Switch To In 02!\r\n";
        assert_eq!(parse_routes(reply), vec![(1, 4), (5, 2)]);
    }

    #[test]
    fn test_power_marker() {
        assert!(reports_power_on("Model 27842\r\nPower ON!\r\n"));
        assert!(!reports_power_on("Power OFF!"));
        assert!(!reports_power_on(""));
    }
}
