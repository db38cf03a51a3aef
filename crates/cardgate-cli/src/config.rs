use std::path::PathBuf;

/// Runtime configuration, loaded from `CARDGATE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the user database workbook (default: user_database.xlsx).
    pub db_path: PathBuf,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Largest Euclidean distance accepted as the same face.
    pub match_tolerance: f32,
    /// Frames discarded after opening the camera while exposure settles.
    pub warmup_frames: usize,
    /// Where snapshots of failed matches are kept.
    pub fraud_dir: PathBuf,
    /// Where the latest registration photo is written.
    pub registration_dir: PathBuf,
    /// Where the latest access photo is written.
    pub access_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; missing or unparsable values fall
    /// back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str, default: &str| {
            lookup(key)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default))
        };

        Self {
            db_path: path("CARDGATE_DB_PATH", "user_database.xlsx"),
            camera_device: lookup("CARDGATE_CAMERA_DEVICE")
                .unwrap_or_else(|| "/dev/video0".to_string()),
            model_dir: lookup("CARDGATE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(cardgate_core::default_model_dir),
            match_tolerance: parsed(&lookup, "CARDGATE_MATCH_TOLERANCE")
                .unwrap_or(cardgate_core::DEFAULT_MATCH_TOLERANCE),
            warmup_frames: parsed(&lookup, "CARDGATE_WARMUP_FRAMES").unwrap_or(4),
            fraud_dir: path("CARDGATE_FRAUD_DIR", "fraud"),
            registration_dir: path("CARDGATE_REGISTRATION_DIR", "registration_photos"),
            access_dir: path("CARDGATE_ACCESS_DIR", "access_photos"),
        }
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}
