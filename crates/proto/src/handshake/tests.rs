use super::*;

#[test]
fn default_line_formats_as_stdio_postcard() {
	let line = HandshakeConfig::default().line();
	assert_eq!(line.to_string(), "1|1|stdio|-|postcard");
}

#[test]
fn line_parses_with_trailing_newline() {
	let line: HandshakeLine = "1|1|stdio|-|postcard\n".parse().expect("parse");
	assert_eq!(line, HandshakeConfig::default().line());
	HandshakeConfig::default().validate(&line).expect("valid");
}

#[test]
fn stray_output_is_malformed() {
	let err = "hello from a plugin".parse::<HandshakeLine>().unwrap_err();
	assert!(matches!(err, HandshakeError::Malformed(_)));
	let err = "1|x|stdio|-|postcard".parse::<HandshakeLine>().unwrap_err();
	assert!(matches!(err, HandshakeError::Malformed(_)));
}

#[test]
fn version_mismatch_is_reported() {
	let line: HandshakeLine = "1|2|stdio|-|postcard".parse().expect("parse");
	let err = HandshakeConfig::default().validate(&line).unwrap_err();
	assert_eq!(
		err,
		HandshakeError::AppVersion {
			expected: 1,
			got: 2
		}
	);

	let line: HandshakeLine = "2|1|stdio|-|postcard".parse().expect("parse");
	assert_eq!(
		HandshakeConfig::default().validate(&line),
		Err(HandshakeError::CoreVersion(2))
	);
}

#[test]
fn foreign_transport_is_rejected() {
	let line: HandshakeLine = "1|1|tcp|127.0.0.1:1234|grpc".parse().expect("parse");
	assert_eq!(
		HandshakeConfig::default().validate(&line),
		Err(HandshakeError::Network("tcp".into()))
	);
}

#[test]
fn cookie_must_match_exactly() {
	let config = HandshakeConfig::default();
	assert!(config.cookie_matches(Some("hello")));
	assert!(!config.cookie_matches(Some("Hello")));
	assert!(!config.cookie_matches(None));
}

#[test]
fn version_list_is_searched() {
	let config = HandshakeConfig::default();
	assert!(config.offered(Some("1")));
	assert!(config.offered(Some("3, 1")));
	assert!(config.offered(None));
	assert!(!config.offered(Some("2,3")));
	assert!(!config.offered(Some("")));
}

#[test]
fn child_env_carries_cookie_and_version() {
	let env = HandshakeConfig::default().child_env();
	assert_eq!(env[0], ("BASIC_PLUGIN", "hello".to_owned()));
	assert_eq!(env[1], ("PLUGIN_PROTOCOL_VERSIONS", "1".to_owned()));
}
