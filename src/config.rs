use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BoothConfig {
    pub camera: CameraConfig,
    pub control: ControlConfig,
    pub storage: StorageConfig,
    pub printer: PrinterConfig,
    pub upload: UploadConfig,
    pub tags: TagsConfig,
    pub messages: MessagesConfig,
}

/// Camera backends available at startup
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CameraDriverKind {
    Dummy,
    Gstreamer,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Camera backend
    #[serde(default = "default_camera_driver")]
    pub driver: CameraDriverKind,

    /// Device node for the hardware driver
    #[serde(default = "default_camera_device")]
    pub device: String,

    /// Preview resolution (width, height)
    #[serde(default = "default_preview_resolution")]
    pub preview_resolution: (u32, u32),

    /// Full capture resolution (width, height)
    #[serde(default = "default_capture_resolution")]
    pub capture_resolution: (u32, u32),

    /// Static JPEG served as preview by the dummy driver
    #[serde(default = "default_dummy_preview_path")]
    pub dummy_preview_path: String,

    /// Static JPEG used as the full capture by the dummy driver
    #[serde(default = "default_dummy_capture_path")]
    pub dummy_capture_path: String,

    /// Simulated shutter latency of the dummy driver
    #[serde(default = "default_dummy_capture_delay_ms")]
    pub dummy_capture_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ControlConfig {
    #[serde(default = "default_initial_countdown_secs")]
    pub initial_countdown_secs: u64,

    #[serde(default = "default_midphoto_countdown_secs")]
    pub midphoto_countdown_secs: u64,

    #[serde(default = "default_montage_display_secs")]
    pub montage_display_secs: u64,

    /// Seconds a started-but-untouched session may wait for the first press
    #[serde(default = "default_idle_secs")]
    pub idle_secs: u64,

    /// Number of finished sessions kept for the idle screen
    #[serde(default = "default_idle_previews_cnt")]
    pub idle_previews_cnt: usize,

    /// Main loop rate
    #[serde(default = "default_tick_fps")]
    pub tick_fps: u32,

    /// The first session of a run is the setup session and never times out
    #[serde(default = "default_exempt_setup_session_from_idle")]
    pub exempt_setup_session_from_idle: bool,

    /// Final part of each countdown during which the look-at-camera cue blinks
    #[serde(default = "default_look_at_camera_secs")]
    pub look_at_camera_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Root directory holding one directory per session id
    #[serde(default = "default_event_dir")]
    pub event_dir: String,

    /// Marker file written into a session directory after a successful upload
    #[serde(default = "default_upload_stamp_name")]
    pub upload_stamp_name: String,

    /// Size of the `_medium` image (width, height)
    #[serde(default = "default_medium_size")]
    pub medium_size: (u32, u32),

    /// Size of the `_prev` image (width, height)
    #[serde(default = "default_preview_size")]
    pub preview_size: (u32, u32),
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PrinterDriverKind {
    Null,
    Thermal,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PrinterConfig {
    #[serde(default = "default_printer_driver")]
    pub driver: PrinterDriverKind,

    /// Serial device of the thermal printer
    #[serde(default = "default_printer_device")]
    pub device: String,

    /// Printable dot width
    #[serde(default = "default_printer_max_width")]
    pub max_width: u32,

    /// Header printed at the top of every session slip
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub end_text: String,

    #[serde(default = "default_print_date")]
    pub print_date: bool,

    /// How many of the last session images end up on the slip
    #[serde(default = "default_print_last_img_cnt")]
    pub print_last_img_cnt: usize,

    /// Print the public URL once a session upload has finished
    #[serde(default)]
    pub print_upload_url: bool,

    /// Where the null printer drops its output
    #[serde(default = "default_null_output_dir")]
    pub null_output_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UploadDriverKind {
    None,
    Atende,
    Dropbox,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_upload_driver")]
    pub driver: UploadDriverKind,

    /// Re-enqueue sessions without an upload stamp at startup
    #[serde(default = "default_retry_pending")]
    pub retry_pending: bool,

    #[serde(default = "default_upload_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_title_prefix")]
    pub title_prefix: String,

    #[serde(default)]
    pub api_endpoint: String,

    #[serde(default)]
    pub api_token: String,

    #[serde(default)]
    pub category_id: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub dropbox_token: String,

    #[serde(default = "default_dropbox_root")]
    pub dropbox_root: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TagsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_tags_count")]
    pub count: usize,

    #[serde(default)]
    pub list: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MessagesConfig {
    #[serde(default = "default_start_pushbutton")]
    pub start_pushbutton: String,

    /// Text shown after capture 1..=4
    #[serde(default = "default_after_capture")]
    pub after_capture: Vec<String>,

    /// Newline separated texts rotated during the montage
    #[serde(default = "default_during_merge")]
    pub during_merge: String,

    #[serde(default = "default_look_at_camera")]
    pub look_at_camera: String,
}

impl ControlConfig {
    pub fn initial_countdown(&self) -> Duration {
        Duration::from_secs(self.initial_countdown_secs)
    }

    pub fn midphoto_countdown(&self) -> Duration {
        Duration::from_secs(self.midphoto_countdown_secs)
    }

    pub fn montage_display(&self) -> Duration {
        Duration::from_secs(self.montage_display_secs)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }

    pub fn look_at_camera(&self) -> Duration {
        Duration::from_secs(self.look_at_camera_secs)
    }

    /// Never zero, whatever the configured rate
    pub fn tick_interval(&self) -> Duration {
        let millis = 1000 / self.tick_fps.clamp(1, MAX_TICK_FPS) as u64;
        Duration::from_millis(millis.max(1))
    }
}

impl StorageConfig {
    pub fn event_root(&self) -> PathBuf {
        PathBuf::from(&self.event_dir)
    }
}

impl MessagesConfig {
    pub fn after_capture_text(&self, photo_count: u8) -> &str {
        self.after_capture
            .get(photo_count.saturating_sub(1) as usize)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn during_merge_lines(&self) -> Vec<String> {
        self.during_merge
            .trim()
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    }
}

impl BoothConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("photobooth.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.driver", "dummy")?
            .set_default("camera.device", default_camera_device())?
            .set_default(
                "camera.preview_resolution",
                vec![default_preview_resolution().0, default_preview_resolution().1],
            )?
            .set_default(
                "camera.capture_resolution",
                vec![default_capture_resolution().0, default_capture_resolution().1],
            )?
            .set_default("camera.dummy_preview_path", default_dummy_preview_path())?
            .set_default("camera.dummy_capture_path", default_dummy_capture_path())?
            .set_default(
                "camera.dummy_capture_delay_ms",
                default_dummy_capture_delay_ms(),
            )?
            .set_default(
                "control.initial_countdown_secs",
                default_initial_countdown_secs(),
            )?
            .set_default(
                "control.midphoto_countdown_secs",
                default_midphoto_countdown_secs(),
            )?
            .set_default(
                "control.montage_display_secs",
                default_montage_display_secs(),
            )?
            .set_default("control.idle_secs", default_idle_secs())?
            .set_default(
                "control.idle_previews_cnt",
                default_idle_previews_cnt() as i64,
            )?
            .set_default("control.tick_fps", default_tick_fps())?
            .set_default(
                "control.exempt_setup_session_from_idle",
                default_exempt_setup_session_from_idle(),
            )?
            .set_default("control.look_at_camera_secs", default_look_at_camera_secs())?
            .set_default("storage.event_dir", default_event_dir())?
            .set_default("storage.upload_stamp_name", default_upload_stamp_name())?
            .set_default(
                "storage.medium_size",
                vec![default_medium_size().0, default_medium_size().1],
            )?
            .set_default(
                "storage.preview_size",
                vec![default_preview_size().0, default_preview_size().1],
            )?
            .set_default("printer.driver", "null")?
            .set_default("printer.device", default_printer_device())?
            .set_default("printer.max_width", default_printer_max_width())?
            .set_default("printer.print_date", default_print_date())?
            .set_default(
                "printer.print_last_img_cnt",
                default_print_last_img_cnt() as i64,
            )?
            .set_default("printer.null_output_dir", default_null_output_dir())?
            .set_default("upload.driver", "none")?
            .set_default("upload.retry_pending", default_retry_pending())?
            .set_default("upload.timeout_secs", default_upload_timeout_secs())?
            .set_default("upload.title_prefix", default_title_prefix())?
            .set_default("upload.dropbox_root", default_dropbox_root())?
            .set_default("tags.enabled", false)?
            .set_default("tags.count", default_tags_count() as i64)?
            .set_default("tags.list", Vec::<String>::new())?
            .set_default("messages.start_pushbutton", default_start_pushbutton())?
            .set_default("messages.after_capture", default_after_capture())?
            .set_default("messages.during_merge", default_during_merge())?
            .set_default("messages.look_at_camera", default_look_at_camera())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with PHOTOBOOTH_ prefix
            .add_source(Environment::with_prefix("PHOTOBOOTH").separator("__"))
            .build()?;

        let config: BoothConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.preview_resolution.0 == 0 || self.camera.preview_resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera preview resolution must be greater than 0".to_string(),
            ));
        }

        if self.control.initial_countdown_secs == 0 || self.control.midphoto_countdown_secs == 0 {
            return Err(ConfigError::Message(
                "Countdown durations must be greater than 0".to_string(),
            ));
        }

        if self.control.montage_display_secs == 0 {
            return Err(ConfigError::Message(
                "Montage display duration must be greater than 0".to_string(),
            ));
        }

        if self.control.tick_fps == 0 || self.control.tick_fps > MAX_TICK_FPS {
            return Err(ConfigError::Message(format!(
                "Control tick_fps must be between 1 and {}",
                MAX_TICK_FPS
            )));
        }

        if self.control.idle_previews_cnt == 0 {
            return Err(ConfigError::Message(
                "idle_previews_cnt must be greater than 0".to_string(),
            ));
        }

        let sizes = [self.storage.medium_size, self.storage.preview_size];
        if sizes.iter().any(|(w, h)| *w == 0 || *h == 0) {
            return Err(ConfigError::Message(
                "Storage image sizes must be greater than 0".to_string(),
            ));
        }

        if self.storage.upload_stamp_name.trim().is_empty() {
            return Err(ConfigError::Message(
                "Upload stamp name must not be empty".to_string(),
            ));
        }

        if self.printer.max_width == 0 {
            return Err(ConfigError::Message(
                "Printer max_width must be greater than 0".to_string(),
            ));
        }

        if self.tags.enabled && self.tags.count > self.tags.list.len() {
            return Err(ConfigError::Message(format!(
                "Cannot draw {} tags from a list of {}",
                self.tags.count,
                self.tags.list.len()
            )));
        }

        match self.upload.driver {
            UploadDriverKind::Atende if self.upload.api_endpoint.is_empty() => {
                return Err(ConfigError::Message(
                    "Atende upload requires upload.api_endpoint".to_string(),
                ));
            }
            UploadDriverKind::Dropbox if self.upload.dropbox_token.is_empty() => {
                return Err(ConfigError::Message(
                    "Dropbox upload requires upload.dropbox_token".to_string(),
                ));
            }
            _ => {}
        }

        Ok(())
    }
}

impl Default for BoothConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                driver: default_camera_driver(),
                device: default_camera_device(),
                preview_resolution: default_preview_resolution(),
                capture_resolution: default_capture_resolution(),
                dummy_preview_path: default_dummy_preview_path(),
                dummy_capture_path: default_dummy_capture_path(),
                dummy_capture_delay_ms: default_dummy_capture_delay_ms(),
            },
            control: ControlConfig {
                initial_countdown_secs: default_initial_countdown_secs(),
                midphoto_countdown_secs: default_midphoto_countdown_secs(),
                montage_display_secs: default_montage_display_secs(),
                idle_secs: default_idle_secs(),
                idle_previews_cnt: default_idle_previews_cnt(),
                tick_fps: default_tick_fps(),
                exempt_setup_session_from_idle: default_exempt_setup_session_from_idle(),
                look_at_camera_secs: default_look_at_camera_secs(),
            },
            storage: StorageConfig {
                event_dir: default_event_dir(),
                upload_stamp_name: default_upload_stamp_name(),
                medium_size: default_medium_size(),
                preview_size: default_preview_size(),
            },
            printer: PrinterConfig {
                driver: default_printer_driver(),
                device: default_printer_device(),
                max_width: default_printer_max_width(),
                name: String::new(),
                url: String::new(),
                end_text: String::new(),
                print_date: default_print_date(),
                print_last_img_cnt: default_print_last_img_cnt(),
                print_upload_url: false,
                null_output_dir: default_null_output_dir(),
            },
            upload: UploadConfig {
                driver: default_upload_driver(),
                retry_pending: default_retry_pending(),
                timeout_secs: default_upload_timeout_secs(),
                title_prefix: default_title_prefix(),
                api_endpoint: String::new(),
                api_token: String::new(),
                category_id: String::new(),
                description: String::new(),
                dropbox_token: String::new(),
                dropbox_root: default_dropbox_root(),
            },
            tags: TagsConfig {
                enabled: false,
                count: default_tags_count(),
                list: Vec::new(),
            },
            messages: MessagesConfig {
                start_pushbutton: default_start_pushbutton(),
                after_capture: default_after_capture(),
                during_merge: default_during_merge(),
                look_at_camera: default_look_at_camera(),
            },
        }
    }
}

// Default value functions
fn default_camera_driver() -> CameraDriverKind {
    CameraDriverKind::Dummy
}
fn default_camera_device() -> String {
    "/dev/video0".to_string()
}
fn default_preview_resolution() -> (u32, u32) {
    (640, 424)
}
fn default_capture_resolution() -> (u32, u32) {
    (3000, 2000)
}
fn default_dummy_preview_path() -> String {
    "dev/dummy-preview.jpg".to_string()
}
fn default_dummy_capture_path() -> String {
    "dev/dummy-capture.jpg".to_string()
}
fn default_dummy_capture_delay_ms() -> u64 {
    500
}

fn default_initial_countdown_secs() -> u64 {
    3
}
fn default_midphoto_countdown_secs() -> u64 {
    3
}
fn default_montage_display_secs() -> u64 {
    5
}
fn default_idle_secs() -> u64 {
    30
}
fn default_idle_previews_cnt() -> usize {
    4
}
/// One tick per millisecond at most
const MAX_TICK_FPS: u32 = 1000;

fn default_tick_fps() -> u32 {
    30
}
fn default_exempt_setup_session_from_idle() -> bool {
    true
}
fn default_look_at_camera_secs() -> u64 {
    2
}

fn default_event_dir() -> String {
    "./events".to_string()
}
fn default_upload_stamp_name() -> String {
    "upload.done".to_string()
}
fn default_medium_size() -> (u32, u32) {
    (640, 424)
}
fn default_preview_size() -> (u32, u32) {
    (160, 106)
}

fn default_printer_driver() -> PrinterDriverKind {
    PrinterDriverKind::Null
}
fn default_printer_device() -> String {
    "/dev/ttyAMA0".to_string()
}
fn default_printer_max_width() -> u32 {
    384
}
fn default_print_date() -> bool {
    true
}
fn default_print_last_img_cnt() -> usize {
    1
}
fn default_null_output_dir() -> String {
    "./prints".to_string()
}

fn default_upload_driver() -> UploadDriverKind {
    UploadDriverKind::None
}
fn default_retry_pending() -> bool {
    true
}
fn default_upload_timeout_secs() -> u64 {
    60
}
fn default_title_prefix() -> String {
    "Session ".to_string()
}
fn default_dropbox_root() -> String {
    "/photobooth".to_string()
}

fn default_tags_count() -> usize {
    2
}

fn default_start_pushbutton() -> String {
    "Push the button to start!".to_string()
}
fn default_after_capture() -> Vec<String> {
    vec![
        "Nice one!".to_string(),
        "Halfway there".to_string(),
        "One more to go".to_string(),
        "Done! Building your montage".to_string(),
    ]
}
fn default_during_merge() -> String {
    "Mixing the pixels...\nAdding some sparkle...\nAlmost ready...".to_string()
}
fn default_look_at_camera() -> String {
    "Look at the camera!".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = BoothConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.control.initial_countdown(), Duration::from_secs(3));
        assert_eq!(config.camera.driver, CameraDriverKind::Dummy);
        assert!(config.control.exempt_setup_session_from_idle);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[control]\nidle_secs = 90\n\n[printer]\ndriver = \"thermal\"\nmax_width = 576\n"
        )
        .unwrap();

        let config = BoothConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.control.idle_secs, 90);
        assert_eq!(config.control.initial_countdown_secs, 3);
        assert_eq!(config.printer.driver, PrinterDriverKind::Thermal);
        assert_eq!(config.printer.max_width, 576);
        assert_eq!(config.upload.driver, UploadDriverKind::None);
    }

    #[test]
    fn test_config_validation() {
        let mut config = BoothConfig::default();
        config.control.tick_fps = 0;
        assert!(config.validate().is_err());

        config.control.tick_fps = 2000;
        assert!(config.validate().is_err());

        config.control.tick_fps = 30;
        config.tags.enabled = true;
        config.tags.count = 3;
        config.tags.list = vec!["a".to_string()];
        assert!(config.validate().is_err());

        config.tags.enabled = false;
        config.upload.driver = UploadDriverKind::Atende;
        assert!(config.validate().is_err());

        config.upload.api_endpoint = "https://example.invalid".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tick_interval_is_never_zero() {
        let mut control = BoothConfig::default().control;
        for (fps, millis) in [(0, 1000), (30, 33), (1000, 1), (1001, 1), (u32::MAX, 1)] {
            control.tick_fps = fps;
            assert_eq!(control.tick_interval(), Duration::from_millis(millis), "{}", fps);
        }
    }

    #[test]
    fn test_messages_helpers() {
        let config = BoothConfig::default();
        assert_eq!(config.messages.after_capture_text(1), "Nice one!");
        assert_eq!(config.messages.after_capture_text(9), "");
        assert_eq!(config.messages.during_merge_lines().len(), 3);
    }

    #[test]
    fn test_default_config_serializes_to_toml() {
        let text = toml::to_string_pretty(&BoothConfig::default()).unwrap();
        assert!(text.contains("[control]"));
        assert!(text.contains("idle_secs = 30"));
    }
}
