//! Persisted barcode-label dimensions.
//!
//! One JSON file under the engine data dir. A missing file yields the
//! defaults; a corrupt file is an error so bad input is surfaced instead
//! of silently replaced.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const LABEL_PREFS_FILE: &str = "label_prefs.json";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelDimensions {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl Default for LabelDimensions {
    fn default() -> Self {
        Self {
            width_mm: 50.0,
            height_mm: 25.0,
        }
    }
}

impl LabelDimensions {
    pub fn validate(&self) -> Result<(), String> {
        if !self.width_mm.is_finite() || self.width_mm <= 0.0 {
            return Err(format!("label width must be positive, got {}", self.width_mm));
        }
        if !self.height_mm.is_finite() || self.height_mm <= 0.0 {
            return Err(format!(
                "label height must be positive, got {}",
                self.height_mm
            ));
        }
        Ok(())
    }
}

pub fn prefs_path(data_dir: &Path) -> PathBuf {
    data_dir.join(LABEL_PREFS_FILE)
}

pub fn load_label_dimensions(data_dir: &Path) -> Result<LabelDimensions, String> {
    let path = prefs_path(data_dir);
    match fs::read_to_string(&path) {
        Ok(raw) => serde_json::from_str::<LabelDimensions>(&raw)
            .map_err(|err| format!("parse {}: {err}", path.display())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(LabelDimensions::default()),
        Err(err) => Err(format!("read {}: {err}", path.display())),
    }
}

pub fn store_label_dimensions(
    data_dir: &Path,
    dimensions: LabelDimensions,
) -> Result<(), String> {
    dimensions.validate()?;
    let path = prefs_path(data_dir);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("create directory {}: {err}", parent.display()))?;
    }
    let encoded = serde_json::to_string_pretty(&dimensions)
        .map_err(|err| format!("encode {}: {err}", path.display()))?;
    fs::write(&path, encoded).map_err(|err| format!("write {}: {err}", path.display()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = temp_dir_path("missing");
        let dims = load_label_dimensions(&dir).unwrap();
        assert_eq!(dims, LabelDimensions::default());
    }

    #[test]
    fn store_then_load_round_trips() {
        let dir = temp_dir_path("round-trip");
        let dims = LabelDimensions {
            width_mm: 62.0,
            height_mm: 29.0,
        };
        store_label_dimensions(&dir, dims).unwrap();
        assert_eq!(load_label_dimensions(&dir).unwrap(), dims);
        cleanup_dir(&dir);
    }

    #[test]
    fn store_rejects_non_positive_dimensions() {
        let dir = temp_dir_path("invalid");
        let err = store_label_dimensions(
            &dir,
            LabelDimensions {
                width_mm: 0.0,
                height_mm: 25.0,
            },
        )
        .unwrap_err();
        assert!(err.contains("width"));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = temp_dir_path("corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(prefs_path(&dir), "not json").unwrap();
        let err = load_label_dimensions(&dir).unwrap_err();
        assert!(err.starts_with("parse "));
        cleanup_dir(&dir);
    }

    fn temp_dir_path(tag: &str) -> std::path::PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|value| value.as_nanos())
            .unwrap_or(0);
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let pid = std::process::id();
        std::env::temp_dir().join(format!("labdesk-label-prefs-{tag}-{pid}-{nanos}-{seq}"))
    }

    fn cleanup_dir(path: &Path) {
        let _ = std::fs::remove_dir_all(path);
    }
}
