pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

/// Label shown for any track without a resolved identity.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Ranked match diagnostics are cut to this many entries.
pub const MAX_DIAGNOSTICS: usize = 20;

/// Max frames ByteTrack keeps a lost track before dropping its id (~1 second at 30 fps).
pub const TRACKER_MAX_LOST: usize = 30;

/// FPS is recomputed once per this many processed frames.
pub const FPS_WINDOW_FRAMES: usize = 30;

/// Pause between camera reads after a failed read.
pub const CAMERA_RETRY_BACKOFF_MS: u64 = 500;

/// Pause when no frame has been published yet.
pub const NO_FRAME_SLEEP_MS: u64 = 10;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
