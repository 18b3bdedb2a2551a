//! GRBL error and alarm code descriptions
//!
//! Codes arrive as text after the `error:` / `ALARM:` prefix. Numeric codes
//! from GRBL 1.1 are described; anything else is reported verbatim.

/// Description of a numeric GRBL error code
pub fn decode_error(code: u8) -> Option<&'static str> {
    let text = match code {
        1 => "Expected command letter",
        2 => "Bad number format",
        3 => "Invalid '$' statement",
        4 => "Negative value",
        5 => "Homing not enabled",
        6 => "Step pulse too short",
        7 => "EEPROM read failed, defaults restored",
        8 => "'$' command requires idle state",
        9 => "G-code locked out during alarm or jog",
        10 => "Soft limits require homing",
        11 => "Line length exceeded",
        12 => "Step rate exceeds maximum",
        13 => "Safety door open",
        14 => "Startup line too long",
        15 => "Jog target exceeds travel",
        16 => "Invalid jog command",
        17 => "Laser mode requires PWM output",
        20 => "Unsupported G-code command",
        21 => "Modal group violation",
        22 => "Undefined feed rate",
        23 => "Command requires integer value",
        24 => "Multiple commands need axis words",
        25 => "Repeated G-code word",
        26 => "Missing axis words",
        27 => "Invalid line number",
        28 => "Missing P or L value",
        29 => "Unsupported work coordinate system",
        30 => "G53 requires G0 or G1",
        31 => "Unused axis words",
        32 => "Arc has no axis words in plane",
        33 => "Invalid motion target",
        34 => "Arc radius error",
        35 => "Arc missing offset word",
        36 => "Unused G-code words",
        37 => "Tool length offset axis mismatch",
        38 => "Tool number exceeds maximum",
        _ => return None,
    };
    Some(text)
}

/// Description of a numeric GRBL alarm code
pub fn decode_alarm(code: u8) -> Option<&'static str> {
    let text = match code {
        1 => "Hard limit triggered, re-home",
        2 => "Soft limit exceeded",
        3 => "Reset while in motion, re-home",
        4 => "Probe not in expected initial state",
        5 => "Probe did not make contact",
        6 => "Homing reset",
        7 => "Homing interrupted by safety door",
        8 => "Homing failed to clear limit switch",
        9 => "Homing could not find limit switch",
        10 => "Homing dual-axis switch fault",
        _ => return None,
    };
    Some(text)
}

/// Human-readable description of a textual error code
pub fn describe_error(code: &str) -> String {
    describe(code, decode_error, "error")
}

/// Human-readable description of a textual alarm code
pub fn describe_alarm(code: &str) -> String {
    describe(code, decode_alarm, "alarm")
}

fn describe(code: &str, table: fn(u8) -> Option<&'static str>, kind: &str) -> String {
    code.trim()
        .parse::<u8>()
        .ok()
        .and_then(table)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Unknown {} code: {}", kind, code.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(decode_error(9), Some("G-code locked out during alarm or jog"));
        assert_eq!(decode_alarm(1), Some("Hard limit triggered, re-home"));
        assert_eq!(decode_error(99), None);
    }

    #[test]
    fn test_textual_codes() {
        assert_eq!(describe_error("2"), "Bad number format");
        assert_eq!(describe_alarm(" 9 "), "Homing could not find limit switch");
        assert_eq!(describe_error("Bad"), "Unknown error code: Bad");
        assert_eq!(describe_alarm("42"), "Unknown alarm code: 42");
    }
}
