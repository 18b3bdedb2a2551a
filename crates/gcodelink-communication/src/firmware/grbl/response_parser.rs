//! GRBL response classification
//!
//! Every non-blank controller line maps to exactly one [`ControllerResponse`].
//! Classification is by exact match or prefix and is case-sensitive.

use super::error_decoder::{describe_alarm, describe_error};
use serde::Serialize;
use std::fmt;

/// Classified controller line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ControllerResponse {
    /// `ok`: the in-flight command completed
    Ack,
    /// `error:<code>`: the in-flight command was rejected
    Error(String),
    /// `ALARM:<code>`: the controller locked up
    Alarm(String),
    /// `Grbl ...` startup banner
    Banner(String),
    /// Status reports, feedback messages, settings, anything else
    Info(String),
}

impl ControllerResponse {
    /// Whether this response frees the in-flight command slot
    pub fn completes_command(&self) -> bool {
        matches!(self, Self::Ack | Self::Error(_))
    }

    /// Decoded description for error and alarm responses
    pub fn description(&self) -> Option<String> {
        match self {
            Self::Error(code) => Some(describe_error(code)),
            Self::Alarm(code) => Some(describe_alarm(code)),
            _ => None,
        }
    }
}

impl fmt::Display for ControllerResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack => write!(f, "ok"),
            Self::Error(code) => write!(f, "error:{}", code),
            Self::Alarm(code) => write!(f, "ALARM:{}", code),
            Self::Banner(text) | Self::Info(text) => write!(f, "{}", text),
        }
    }
}

/// Stateless GRBL response parser
#[derive(Debug, Clone, Copy, Default)]
pub struct GrblResponseParser;

impl GrblResponseParser {
    /// Create a new parser
    pub fn new() -> Self {
        Self
    }

    /// Classify one controller line, `None` for blank input
    pub fn parse(&self, line: &str) -> Option<ControllerResponse> {
        let line = line.trim();

        if line.is_empty() {
            return None;
        }

        if line == "ok" {
            return Some(ControllerResponse::Ack);
        }

        if let Some(code) = line.strip_prefix("error:") {
            return Some(ControllerResponse::Error(code.trim().to_string()));
        }

        if let Some(code) = line.strip_prefix("ALARM:") {
            return Some(ControllerResponse::Alarm(code.trim().to_string()));
        }

        if line.starts_with("Grbl") {
            return Some(ControllerResponse::Banner(line.to_string()));
        }

        Some(ControllerResponse::Info(line.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_wire_form() {
        assert_eq!(ControllerResponse::Ack.to_string(), "ok");
        assert_eq!(ControllerResponse::Error("20".into()).to_string(), "error:20");
        assert_eq!(ControllerResponse::Alarm("1".into()).to_string(), "ALARM:1");
    }

    #[test]
    fn test_completes_command() {
        assert!(ControllerResponse::Ack.completes_command());
        assert!(ControllerResponse::Error("1".into()).completes_command());
        assert!(!ControllerResponse::Alarm("1".into()).completes_command());
        assert!(!ControllerResponse::Info("<Idle>".into()).completes_command());
    }
}
