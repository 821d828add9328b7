use base::{StdoutLogger, init_stdout_logger_with_level, parse_level};
use log::{LevelFilter, Log};

#[test]
fn test_parse_level_names() {
    assert_eq!(parse_level("off"), Some(LevelFilter::Off));
    assert_eq!(parse_level("OFF"), Some(LevelFilter::Off));
    assert_eq!(parse_level("error"), Some(LevelFilter::Error));
    assert_eq!(parse_level("WARN"), Some(LevelFilter::Warn));
    assert_eq!(parse_level(" Info "), Some(LevelFilter::Info));
    assert_eq!(parse_level("debug"), Some(LevelFilter::Debug));
    assert_eq!(parse_level("trace"), Some(LevelFilter::Trace));
    assert_eq!(parse_level("verbose"), None);
    assert_eq!(parse_level(""), None);
}

#[test]
fn test_format_line_layout() {
    let record = log::RecordBuilder::new()
        .level(log::Level::Warn)
        .target("test")
        .file(Some("capture.rs"))
        .line(Some(42))
        .args(format_args!("stream off failed"))
        .build();

    let line = StdoutLogger::format(&record);

    assert!(line.contains(" [WARN] [thread:"), "{line}");
    assert!(line.ends_with("capture.rs:42 - stream off failed"), "{line}");
}

#[test]
fn test_format_without_location() {
    let record = log::RecordBuilder::new()
        .level(log::Level::Info)
        .args(format_args!("hello"))
        .build();

    let line = StdoutLogger::format(&record);

    assert!(line.ends_with("unknown:0 - hello"), "{line}");
}

#[test]
fn test_init_sets_max_level_once() {
    init_stdout_logger_with_level(LevelFilter::Warn);
    assert_eq!(log::max_level(), LevelFilter::Warn);

    // a second install is ignored
    init_stdout_logger_with_level(LevelFilter::Trace);
    assert_eq!(log::max_level(), LevelFilter::Warn);

    let logger = StdoutLogger;
    let info = log::MetadataBuilder::new().level(log::Level::Info).build();
    let error = log::MetadataBuilder::new().level(log::Level::Error).build();
    assert!(!logger.enabled(&info));
    assert!(logger.enabled(&error));
    logger.flush();
}
