use gcodelink_communication::firmware::grbl::response_parser::*;

#[test]
fn test_parse_ok() {
    let parser = GrblResponseParser::new();
    assert_eq!(parser.parse("ok"), Some(ControllerResponse::Ack));
    assert_eq!(parser.parse("  ok  "), Some(ControllerResponse::Ack));
}

#[test]
fn test_ok_must_be_exact() {
    let parser = GrblResponseParser::new();
    assert_eq!(
        parser.parse("okay"),
        Some(ControllerResponse::Info("okay".to_string()))
    );
    assert_eq!(
        parser.parse("OK"),
        Some(ControllerResponse::Info("OK".to_string()))
    );
}

#[test]
fn test_parse_error() {
    let parser = GrblResponseParser::new();
    assert_eq!(
        parser.parse("error:1"),
        Some(ControllerResponse::Error("1".to_string()))
    );
    assert_eq!(
        parser.parse("error:Bad number"),
        Some(ControllerResponse::Error("Bad number".to_string()))
    );
}

#[test]
fn test_parse_alarm() {
    let parser = GrblResponseParser::new();
    assert_eq!(
        parser.parse("ALARM:9"),
        Some(ControllerResponse::Alarm("9".to_string()))
    );
    // Lowercase is not an alarm
    assert!(matches!(
        parser.parse("alarm:9"),
        Some(ControllerResponse::Info(_))
    ));
}

#[test]
fn test_parse_banner() {
    let parser = GrblResponseParser::new();
    assert_eq!(
        parser.parse("Grbl 1.1h ['$' for help]"),
        Some(ControllerResponse::Banner("Grbl 1.1h ['$' for help]".to_string()))
    );
}

#[test]
fn test_parse_info() {
    let parser = GrblResponseParser::new();
    assert_eq!(
        parser.parse("<Idle|MPos:0.000,0.000,0.000|FS:0,0>"),
        Some(ControllerResponse::Info(
            "<Idle|MPos:0.000,0.000,0.000|FS:0,0>".to_string()
        ))
    );
    assert!(matches!(
        parser.parse("[MSG:'$H'|'$X' to unlock]"),
        Some(ControllerResponse::Info(_))
    ));
}

#[test]
fn test_blank_lines() {
    let parser = GrblResponseParser::new();
    assert_eq!(parser.parse(""), None);
    assert_eq!(parser.parse(" \t "), None);
}

#[test]
fn test_descriptions() {
    let parser = GrblResponseParser::new();
    let error = parser.parse("error:20").unwrap();
    assert_eq!(error.description().as_deref(), Some("Unsupported G-code command"));
    let alarm = parser.parse("ALARM:1").unwrap();
    assert_eq!(alarm.description().as_deref(), Some("Hard limit triggered, re-home"));
    assert_eq!(ControllerResponse::Ack.description(), None);
}
