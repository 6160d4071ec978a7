use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::ingest::CameraConfig;
use crate::overlay::OverlayStyle;
use crate::processor::ProcessorConfig;
use crate::tally::{RelevantCategories, RushThreshold, VehicleCategory, DEFAULT_RUSH_THRESHOLD};

const DEFAULT_BACKEND: &str = "tract";
const DEFAULT_MODEL_PATH: &str = "models/yolo11l.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_IOU: f32 = 0.7;
const DEFAULT_FONT_PATH: &str = "assets/fonts/DejaVuSans.ttf";
const DEFAULT_FONT_SCALE: f32 = 26.0;
const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;

#[derive(Debug, Deserialize, Default)]
struct TrafficConfigFile {
    rush_threshold: Option<u32>,
    relevant_classes: Option<Vec<String>>,
    detector: Option<DetectorConfigFile>,
    overlay: Option<OverlayConfigFile>,
    camera: Option<CameraConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence: Option<f32>,
    iou: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    font_path: Option<PathBuf>,
    font_scale: Option<f32>,
    boxes_only: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct TrafficConfig {
    pub rush_threshold: u32,
    pub relevant_classes: Vec<String>,
    pub detector: DetectorSettings,
    pub overlay: OverlaySettings,
    pub camera: CameraSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// `stub` or `tract`.
    pub backend: String,
    pub model_path: PathBuf,
    /// Square model input edge in pixels.
    pub input_size: u32,
    pub confidence: f32,
    pub iou: f32,
}

#[derive(Debug, Clone)]
pub struct OverlaySettings {
    pub font_path: PathBuf,
    pub font_scale: f32,
    /// Draw boxes without any text; the font is not loaded.
    pub boxes_only: bool,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self::from_file(TrafficConfigFile::default())
    }
}

impl TrafficConfig {
    /// Defaults, then the JSON file named by `TRAFFIC_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TRAFFIC_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: TrafficConfigFile) -> Self {
        let rush_threshold = file.rush_threshold.unwrap_or(DEFAULT_RUSH_THRESHOLD);
        let relevant_classes = file.relevant_classes.unwrap_or_else(|| {
            VehicleCategory::ALL
                .iter()
                .map(|c| c.label().to_string())
                .collect()
        });
        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file
                .backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            model_path: detector_file
                .model_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            input_size: detector_file.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            confidence: detector_file.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            iou: detector_file.iou.unwrap_or(DEFAULT_IOU),
        };
        let overlay_file = file.overlay.unwrap_or_default();
        let overlay = OverlaySettings {
            font_path: overlay_file
                .font_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FONT_PATH)),
            font_scale: overlay_file.font_scale.unwrap_or(DEFAULT_FONT_SCALE),
            boxes_only: overlay_file.boxes_only.unwrap_or(false),
        };
        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            device: camera_file
                .device
                .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
            target_fps: camera_file.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
        };
        Self {
            rush_threshold,
            relevant_classes,
            detector,
            overlay,
            camera,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(threshold) = std::env::var("TRAFFIC_RUSH_THRESHOLD") {
            self.rush_threshold = threshold.trim().parse().map_err(|_| {
                anyhow!("TRAFFIC_RUSH_THRESHOLD must be a positive integer")
            })?;
        }
        if let Ok(classes) = std::env::var("TRAFFIC_RELEVANT_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.relevant_classes = parsed;
            }
        }
        if let Ok(path) = std::env::var("TRAFFIC_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("TRAFFIC_FONT_PATH") {
            if !path.trim().is_empty() {
                self.overlay.font_path = PathBuf::from(path);
            }
        }
        if let Ok(flag) = std::env::var("TRAFFIC_BOXES_ONLY") {
            self.overlay.boxes_only = parse_flag(&flag)
                .ok_or_else(|| anyhow!("TRAFFIC_BOXES_ONLY must be true or false"))?;
        }
        if let Ok(backend) = std::env::var("TRAFFIC_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        Ok(())
    }

    /// Check every field. Call again after applying CLI overrides.
    pub fn validate(&mut self) -> Result<()> {
        RushThreshold::new(self.rush_threshold)?;

        self.relevant_classes = self
            .relevant_classes
            .iter()
            .map(|class| class.trim().to_string())
            .collect();
        RelevantCategories::from_labels(&self.relevant_classes)?;

        self.detector.backend = self.detector.backend.to_lowercase();
        if !(0.0..=1.0).contains(&self.detector.confidence) {
            return Err(anyhow!("detector confidence must be within 0..=1"));
        }
        if !(0.0..=1.0).contains(&self.detector.iou) {
            return Err(anyhow!("detector iou must be within 0..=1"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input_size must be greater than zero"));
        }
        if self.overlay.font_scale.is_nan() || self.overlay.font_scale <= 0.0 {
            return Err(anyhow!("overlay font_scale must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        Ok(())
    }

    pub fn processor_config(&self) -> Result<ProcessorConfig> {
        Ok(ProcessorConfig {
            threshold: RushThreshold::new(self.rush_threshold)?,
            relevant: RelevantCategories::from_labels(&self.relevant_classes)?,
        })
    }

    /// Font to load for overlay text; `None` when only boxes are drawn.
    pub fn overlay_font(&self) -> Option<&Path> {
        if self.overlay.boxes_only {
            None
        } else {
            Some(&self.overlay.font_path)
        }
    }

    pub fn overlay_style(&self) -> OverlayStyle {
        OverlayStyle {
            font_scale: self.overlay.font_scale,
            ..OverlayStyle::default()
        }
    }

    /// Camera settings for `device`, or the configured device if `None`.
    pub fn camera_config(&self, device: Option<&str>) -> CameraConfig {
        CameraConfig {
            device: device.unwrap_or(&self.camera.device).to_string(),
            target_fps: self.camera.target_fps,
            width: self.camera.width,
            height: self.camera.height,
        }
    }
}

fn read_config_file(path: &Path) -> Result<TrafficConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() -> Result<()> {
        let mut cfg = TrafficConfig::default();
        cfg.validate()?;
        assert_eq!(cfg.rush_threshold, 10);
        assert_eq!(
            cfg.relevant_classes,
            vec!["car", "truck", "bus", "motorcycle", "bicycle"]
        );
        assert_eq!(cfg.detector.backend, "tract");
        assert_eq!(cfg.detector.iou, 0.7);
        assert_eq!(cfg.overlay.font_scale, 26.0);
        assert!(!cfg.overlay.boxes_only);
        assert_eq!(
            cfg.overlay_font(),
            Some(Path::new("assets/fonts/DejaVuSans.ttf"))
        );

        let processor = cfg.processor_config()?;
        assert_eq!(processor.threshold.get(), 10);
        assert_eq!(processor.relevant, RelevantCategories::all());
        Ok(())
    }

    #[test]
    fn boxes_only_skips_the_font() {
        let mut cfg = TrafficConfig::default();
        cfg.overlay.boxes_only = true;
        assert_eq!(cfg.overlay_font(), None);
    }

    #[test]
    fn parse_flag_accepts_common_spellings() {
        assert_eq!(parse_flag(" TRUE "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn split_csv_drops_blanks() {
        assert_eq!(split_csv(" car, ,bus ,"), vec!["car", "bus"]);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = TrafficConfig::default();
        cfg.rush_threshold = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = TrafficConfig::default();
        cfg.relevant_classes = vec!["car".into(), "tram".into()];
        assert!(cfg.validate().is_err());

        let mut cfg = TrafficConfig::default();
        cfg.relevant_classes.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = TrafficConfig::default();
        cfg.detector.iou = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = TrafficConfig::default();
        cfg.detector.input_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn camera_config_prefers_explicit_device() {
        let cfg = TrafficConfig::default();
        assert_eq!(cfg.camera_config(None).device, "/dev/video0");
        assert_eq!(cfg.camera_config(Some("stub://cam")).device, "stub://cam");
    }
}
