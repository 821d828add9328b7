use base::log;
use video::{
    CaptureConfig, CaptureReport, CaptureTask, DEFAULT_CONFIG_FILE, FrameRecord, StreamList,
    VideoError,
};

// environment variable selecting the log level
const LOG_ENV: &str = "CAPTURE_LOG";

fn usage(program: &str) {
    println!("Usage: {} [config-file]", program);
    println!();
    println!("Captures the first stream described in config-file (default: {DEFAULT_CONFIG_FILE})");
    println!("and writes its raw frames to the stream's output file.");
    println!("Set {LOG_ENV}=off|error|warn|info|debug|trace to change verbosity.");
}

fn log_progress(frame: &FrameRecord) {
    log::debug!(
        "frame {} from buffer {} ({} bytes)",
        frame.sequence,
        frame.index,
        frame.bytes_used
    );
}

async fn run(config_path: &str) -> Result<CaptureReport, VideoError> {
    let streams = StreamList::load(config_path)?;
    for ignored in &streams.streams()[1..] {
        log::warn!(
            "only the first stream is captured; ignoring \"{}\"",
            ignored.device_path
        );
    }

    let mut task = CaptureTask::spawn(streams.first().clone(), CaptureConfig::default());
    while let Some(frame) = task.recv().await {
        log_progress(&frame);
    }
    task.join().await
}

#[tokio::main]
async fn main() {
    match std::env::var(LOG_ENV).ok().and_then(|level| base::parse_level(&level)) {
        Some(level) => base::init_stdout_logger_with_level(level),
        None => base::init_stdout_logger(),
    }

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 2 || args.get(1).is_some_and(|a| a == "-h" || a == "--help") {
        usage(args.first().map(|s| s.as_str()).unwrap_or("capture"));
        std::process::exit(if args.len() > 2 { 2 } else { 0 });
    }
    let config_path = args.get(1).map(|s| s.as_str()).unwrap_or(DEFAULT_CONFIG_FILE);

    let code = match run(config_path).await {
        Ok(report) => {
            log::info!("done: {} frames, {} bytes", report.frames, report.bytes);
            0
        }
        Err(error) => {
            log::error!("capture failed ({} error): {}", error.class(), error);
            error.class().exit_code()
        }
    };
    log::logger().flush();
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        base::log::{Level, LevelFilter, Log, Metadata, Record},
        std::{sync::Mutex, time::Duration},
    };

    static LEVELS: Mutex<Vec<Level>> = Mutex::new(Vec::new());

    struct RecordingLogger;

    impl Log for RecordingLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= log::max_level()
        }

        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                LEVELS.lock().unwrap().push(record.level());
            }
        }

        fn flush(&self) {}
    }

    static LOGGER: RecordingLogger = RecordingLogger;

    #[test]
    fn test_progress_is_debug_only() {
        log::set_logger(&LOGGER).unwrap();
        let frame = FrameRecord {
            index: 2,
            bytes_used: 4096,
            sequence: 7,
            timestamp: Duration::from_millis(233),
        };

        log::set_max_level(LevelFilter::Info);
        log_progress(&frame);
        assert!(LEVELS.lock().unwrap().is_empty());

        log::set_max_level(LevelFilter::Debug);
        log_progress(&frame);
        assert_eq!(*LEVELS.lock().unwrap(), vec![Level::Debug]);
    }
}
