use {
    log::{LevelFilter, Log, Metadata, Record},
    std::sync::Mutex,
    video::{CaptureConfig, FrameRecord, capture, videoin::fake::FakeDevice},
};

static LINES: Mutex<Vec<String>> = Mutex::new(Vec::new());

struct RecordingLogger;

impl Log for RecordingLogger {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        LINES.lock().unwrap().push(record.args().to_string());
    }

    fn flush(&self) {}
}

static LOGGER: RecordingLogger = RecordingLogger;

#[test]
fn test_run_reports_device_and_buffer_details() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Debug);

    let device = FakeDevice::new(64).with_frames(1, 64);
    capture(
        device,
        Vec::new(),
        1,
        &CaptureConfig::default().with_buffer_count(2),
        &mut |_: &FrameRecord| {},
    )
    .unwrap();

    let lines = LINES.lock().unwrap();
    let has = |needle: &str| lines.iter().any(|line| line.contains(needle));
    assert!(has("device_caps  : 0x04000001"), "{lines:#?}");
    assert!(has("extendedmode : 0x00000000"), "{lines:#?}");
    assert!(has("readbuffers  : 0x00000000"), "{lines:#?}");
    assert!(
        has("bytesused[0] / flags[0x00000000] / field[1] / sequence[0] / memory[1]"),
        "{lines:#?}"
    );
    assert!(
        has("timestamp 0.000000 / timecode type[0] | flags[0x0] | frames[0] | [00:00:00]"),
        "{lines:#?}"
    );
    assert!(has("DQBUF-0 / 64 bytes"), "{lines:#?}");
}
