use {
    crate::VideoError,
    serde::Deserialize,
    std::{fs, path::Path, time::Duration},
};

/// Config file read when no path is given on the command line.
pub const DEFAULT_CONFIG_FILE: &str = "cfg-capture.json";

/// Most streams a config file may describe. Only the first one is captured.
pub const MAX_STREAMS: usize = 2;

pub const MAX_PATH_LEN: usize = 4096;
pub const MAX_FORMAT_LEN: usize = 31;

const STREAMS_CLASS: &str = "STREAMS";

/// One capture source and where its frames go.
///
/// `pixel_format`, `width` and `height` are reported in diagnostics but never
/// applied to the device; capture always uses the device's current format.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamDescriptor {
    #[serde(rename = "device")]
    pub device_path: String,
    #[serde(rename = "format", default)]
    pub pixel_format: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(rename = "output")]
    pub output_path: String,
    #[serde(rename = "frames")]
    pub frame_count: u32,
}

impl StreamDescriptor {
    pub fn new(device_path: impl Into<String>, output_path: impl Into<String>, frame_count: u32) -> Self {
        Self {
            device_path: device_path.into(),
            pixel_format: String::new(),
            width: 0,
            height: 0,
            output_path: output_path.into(),
            frame_count,
        }
    }

    pub fn validate(&self) -> Result<(), VideoError> {
        check_path("device", &self.device_path)?;
        check_path("output", &self.output_path)?;
        if self.pixel_format.len() > MAX_FORMAT_LEN {
            return Err(VideoError::Config(format!(
                "format \"{}\" longer than {} bytes",
                self.pixel_format, MAX_FORMAT_LEN
            )));
        }
        Ok(())
    }
}

fn check_path(field: &str, value: &str) -> Result<(), VideoError> {
    if value.is_empty() {
        return Err(VideoError::Config(format!("\"{field}\" must not be empty")));
    }
    if value.len() > MAX_PATH_LEN {
        return Err(VideoError::Config(format!(
            "\"{field}\" longer than {MAX_PATH_LEN} bytes"
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StreamFile {
    class: Option<String>,
    streams: Vec<StreamDescriptor>,
}

/// Ordered stream descriptors loaded from a config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamList {
    streams: Vec<StreamDescriptor>,
}

impl StreamList {
    /// Read and validate a stream list from a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, VideoError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            VideoError::Config(format!("failed to read \"{}\": {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, VideoError> {
        let file: StreamFile = serde_json::from_str(json)?;
        if let Some(class) = &file.class {
            if class != STREAMS_CLASS {
                return Err(VideoError::Config(format!(
                    "unexpected class \"{class}\", expected \"{STREAMS_CLASS}\""
                )));
            }
        }
        if file.streams.is_empty() {
            return Err(VideoError::Config("no streams configured".to_string()));
        }
        if file.streams.len() > MAX_STREAMS {
            return Err(VideoError::Config(format!(
                "{} streams configured, at most {} supported",
                file.streams.len(),
                MAX_STREAMS
            )));
        }
        for stream in &file.streams {
            stream.validate()?;
        }

        log::info!("{} streams:", file.streams.len());
        for stream in &file.streams {
            log::info!(
                "    \"{}\" | \"{}\" | {}x{} | \"{}\" x{}",
                stream.device_path,
                stream.pixel_format,
                stream.width,
                stream.height,
                stream.output_path,
                stream.frame_count
            );
        }

        Ok(Self {
            streams: file.streams,
        })
    }

    /// The stream that gets captured. Later entries are never driven.
    pub fn first(&self) -> &StreamDescriptor {
        &self.streams[0]
    }

    pub fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

/// Capture-loop tuning shared by every stream.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    buffer_count: u32,
    timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffer_count: 4,
            timeout: Duration::from_secs(2),
        }
    }
}

impl CaptureConfig {
    /// Set the number of kernel buffers in the pool, at least 1.
    pub fn with_buffer_count(mut self, buffer_count: u32) -> Self {
        self.buffer_count = buffer_count.max(1);
        self
    }

    /// Set how long to wait for each frame before giving up.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn buffer_count(&self) -> u32 {
        self.buffer_count
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
