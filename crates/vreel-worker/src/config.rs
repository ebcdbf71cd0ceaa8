//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;
use vreel_models::EncodingConfig;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root under which each job gets its own temporary directory
    pub work_dir: PathBuf,
    /// Whole-job time budget
    pub job_timeout: Duration,
    /// Per-render FFmpeg timeout in seconds, if any
    pub ffmpeg_timeout: Option<u64>,
    /// Also copy `<id>_edited.<ext>` into the destination directory
    pub keep_intermediate: bool,
    /// Container extension for both renders
    pub output_ext: String,
    /// Font file used for captions that do not name one
    pub font_file: Option<PathBuf>,
    /// Codec settings shared by both renders
    pub encoding: EncodingConfig,
    /// Port for the Prometheus exporter, if enabled
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("vreel"),
            job_timeout: Duration::from_secs(3600), // 1 hour
            ffmpeg_timeout: None,
            keep_intermediate: false,
            output_ext: "mp4".to_string(),
            font_file: None,
            encoding: EncodingConfig::default(),
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset or unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            work_dir: non_empty("VREEL_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            job_timeout: Duration::from_secs(
                non_empty("VREEL_JOB_TIMEOUT")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            ffmpeg_timeout: non_empty("VREEL_FFMPEG_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .filter(|&secs: &u64| secs > 0),
            keep_intermediate: non_empty("VREEL_KEEP_INTERMEDIATE")
                .map(|v| parse_bool(&v))
                .unwrap_or(false),
            output_ext: non_empty("VREEL_OUTPUT_EXT")
                .map(|v| v.trim_start_matches('.').to_string())
                .unwrap_or(defaults.output_ext),
            font_file: non_empty("VREEL_FONT_FILE").map(PathBuf::from),
            encoding: encoding_from(&non_empty, defaults.encoding),
            metrics_port: non_empty("VREEL_METRICS_PORT").and_then(|s| s.parse().ok()),
        }
    }
}

/// Apply `VREEL_CRF` and `VREEL_USE_NVENC` on top of `base`.
fn encoding_from(
    var: &impl Fn(&str) -> Option<String>,
    base: EncodingConfig,
) -> EncodingConfig {
    let mut encoding = base;
    if let Some(crf) = var("VREEL_CRF")
        .and_then(|s| s.parse::<u8>().ok())
        .filter(|&crf| crf <= 51)
    {
        encoding = encoding.with_crf(crf);
    }
    if var("VREEL_USE_NVENC").is_some_and(|v| parse_bool(&v)) {
        encoding = encoding.with_nvenc();
    }
    encoding
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::from_lookup(lookup(&[]));
        assert_eq!(config.job_timeout, Duration::from_secs(3600));
        assert_eq!(config.output_ext, "mp4");
        assert!(!config.keep_intermediate);
        assert!(config.ffmpeg_timeout.is_none());
        assert!(config.work_dir.ends_with("vreel"));
        assert_eq!(config.encoding, EncodingConfig::default());
    }

    #[test]
    fn test_encoding_overrides() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("VREEL_CRF", "23"),
            ("VREEL_USE_NVENC", "yes"),
        ]));
        assert_eq!(config.encoding.crf, 23);
        assert!(config.encoding.use_nvenc);
        assert_eq!(config.encoding.codec, "h264_nvenc");

        let config = WorkerConfig::from_lookup(lookup(&[("VREEL_CRF", "80")]));
        assert_eq!(config.encoding.crf, EncodingConfig::default().crf);
        assert!(!config.encoding.use_nvenc);
    }

    #[test]
    fn test_overrides() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("VREEL_WORK_DIR", "/data/work"),
            ("VREEL_JOB_TIMEOUT", "120"),
            ("VREEL_FFMPEG_TIMEOUT", "60"),
            ("VREEL_KEEP_INTERMEDIATE", "TRUE"),
            ("VREEL_OUTPUT_EXT", ".mov"),
            ("VREEL_FONT_FILE", "/fonts/Arial.ttf"),
            ("VREEL_METRICS_PORT", "9100"),
        ]));
        assert_eq!(config.work_dir, PathBuf::from("/data/work"));
        assert_eq!(config.job_timeout, Duration::from_secs(120));
        assert_eq!(config.ffmpeg_timeout, Some(60));
        assert!(config.keep_intermediate);
        assert_eq!(config.output_ext, "mov");
        assert_eq!(config.font_file, Some(PathBuf::from("/fonts/Arial.ttf")));
        assert_eq!(config.metrics_port, Some(9100));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("VREEL_JOB_TIMEOUT", "soon"),
            ("VREEL_FFMPEG_TIMEOUT", "0"),
            ("VREEL_METRICS_PORT", "99999"),
            ("VREEL_WORK_DIR", "  "),
        ]));
        assert_eq!(config.job_timeout, Duration::from_secs(3600));
        assert!(config.ffmpeg_timeout.is_none());
        assert!(config.metrics_port.is_none());
        assert!(config.work_dir.ends_with("vreel"));
    }
}
