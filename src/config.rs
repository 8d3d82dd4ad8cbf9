use anyhow::{Context, Result};
use image::Rgb;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Model configuration stored next to the network as `cfg.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub dataset: DatasetConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    pub img_prop: ImageProperties,
    pub img_means: Vec<f32>,
    pub img_stds: Vec<f32>,
    #[serde(default)]
    pub labels: BTreeMap<u32, String>,
    /// Class id to color, components in BGR order.
    pub color_map: BTreeMap<u32, Vec<u8>>,
}

/// Network input size.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ImageProperties {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_depth")]
    pub depth: u32,
}

fn default_depth() -> u32 {
    3
}

impl ModelConfig {
    pub const FILE_NAME: &'static str = "cfg.yaml";

    /// Largest class id accepted in `color_map`. The palette is a dense table indexed by id.
    pub const MAX_CLASS_ID: u32 = u16::MAX as u32;

    /// Loads `cfg.yaml` from a model directory.
    pub fn load(model_dir: &Path) -> Result<Self> {
        Self::from_file(&model_dir.join(Self::FILE_NAME))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model configuration: {:?}", path))?;
        let config = Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid model configuration: {:?}", path))?;
        tracing::debug!(
            "Loaded model configuration from {:?}: {} classes, input {}x{}",
            path,
            config.dataset.color_map.len(),
            config.dataset.img_prop.width,
            config.dataset.img_prop.height
        );
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: ModelConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let dataset = &self.dataset;
        let prop = dataset.img_prop;

        if prop.width == 0 || prop.height == 0 {
            anyhow::bail!("img_prop must have a non-zero width and height");
        }
        if prop.depth != 3 {
            anyhow::bail!("Only 3-channel inputs are supported, img_prop.depth is {}", prop.depth);
        }
        if dataset.img_means.len() != prop.depth as usize || dataset.img_stds.len() != prop.depth as usize {
            anyhow::bail!(
                "img_means and img_stds need {} values each, got {} and {}",
                prop.depth,
                dataset.img_means.len(),
                dataset.img_stds.len()
            );
        }
        if dataset.img_stds.iter().any(|std| *std == 0.0) {
            anyhow::bail!("img_stds must not contain zero");
        }
        if dataset.color_map.is_empty() {
            anyhow::bail!("color_map is empty");
        }
        for (id, color) in &dataset.color_map {
            if *id > Self::MAX_CLASS_ID {
                anyhow::bail!("color_map class id {} is above the limit of {}", id, Self::MAX_CLASS_ID);
            }
            if color.len() != 3 {
                anyhow::bail!("color_map entry {} has {} components, expected 3", id, color.len());
            }
        }

        Ok(())
    }

    pub fn num_classes(&self) -> usize {
        self.dataset.color_map.len()
    }

    /// RGB color of a class, if the color map has one.
    pub fn color(&self, id: u32) -> Option<Rgb<u8>> {
        self.dataset
            .color_map
            .get(&id)
            .map(|bgr| Rgb([bgr[2], bgr[1], bgr[0]]))
    }

    pub fn palette(&self) -> Palette {
        let size = self
            .dataset
            .color_map
            .keys()
            .next_back()
            .map_or(0, |max| *max as usize + 1);

        let mut colors = vec![Palette::UNKNOWN; size];
        for id in self.dataset.color_map.keys() {
            if let Some(color) = self.color(*id) {
                colors[*id as usize] = color;
            }
        }

        Palette { colors }
    }
}

/// Class id to RGB lookup table.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    colors: Vec<Rgb<u8>>,
}

impl Palette {
    /// Color for ids the model configuration does not know about.
    pub const UNKNOWN: Rgb<u8> = Rgb([0, 0, 0]);

    pub fn new(colors: Vec<Rgb<u8>>) -> Self {
        Self { colors }
    }

    pub fn lookup(&self, id: u32) -> Rgb<u8> {
        self.colors.get(id as usize).copied().unwrap_or(Self::UNKNOWN)
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CFG: &str = r#"
name: example
dataset:
  img_prop:
    width: 512
    height: 256
    depth: 3
  img_means: [0.485, 0.456, 0.406]
  img_stds: [0.229, 0.224, 0.225]
  labels:
    0: road
    1: car
    3: sky
  color_map:
    0: [128, 64, 128]
    1: [142, 0, 0]
    3: [180, 130, 70]
"#;

    #[test]
    fn test_parse_model_config() {
        let config = ModelConfig::from_yaml_str(CFG).unwrap();
        assert_eq!(config.dataset.img_prop.width, 512);
        assert_eq!(config.dataset.img_prop.height, 256);
        assert_eq!(config.num_classes(), 3);
        assert_eq!(config.dataset.labels.get(&3).map(String::as_str), Some("sky"));
    }

    #[test]
    fn test_color_map_is_bgr() {
        let config = ModelConfig::from_yaml_str(CFG).unwrap();
        assert_eq!(config.color(1), Some(Rgb([0, 0, 142])));
        assert_eq!(config.color(2), None);
    }

    #[test]
    fn test_palette_fills_gaps_with_unknown() {
        let palette = ModelConfig::from_yaml_str(CFG).unwrap().palette();
        assert_eq!(palette.len(), 4);
        assert_eq!(palette.lookup(0), Rgb([128, 64, 128]));
        assert_eq!(palette.lookup(2), Palette::UNKNOWN);
        assert_eq!(palette.lookup(3), Rgb([70, 130, 180]));
        assert_eq!(palette.lookup(200), Palette::UNKNOWN);
    }

    #[test]
    fn test_depth_defaults_to_three() {
        let cfg = CFG.replace("    depth: 3\n", "");
        let config = ModelConfig::from_yaml_str(&cfg).unwrap();
        assert_eq!(config.dataset.img_prop.depth, 3);
    }

    #[test]
    fn test_rejects_mismatched_normalization() {
        let cfg = CFG.replace("[0.229, 0.224, 0.225]", "[0.229, 0.224]");
        assert!(ModelConfig::from_yaml_str(&cfg).is_err());
    }

    #[test]
    fn test_rejects_zero_std() {
        let cfg = CFG.replace("[0.229, 0.224, 0.225]", "[0.229, 0.0, 0.225]");
        assert!(ModelConfig::from_yaml_str(&cfg).is_err());
    }

    #[test]
    fn test_rejects_short_color() {
        let cfg = CFG.replace("[142, 0, 0]", "[142, 0]");
        assert!(ModelConfig::from_yaml_str(&cfg).is_err());
    }

    #[test]
    fn test_rejects_huge_class_id() {
        let cfg = CFG.replace("    3: [180, 130, 70]", "    4294967295: [180, 130, 70]");
        let err = ModelConfig::from_yaml_str(&cfg).unwrap_err();
        assert!(err.to_string().contains("4294967295"));
    }

    #[test]
    fn test_largest_class_id_builds_palette() {
        let cfg = CFG.replace("    3: [180, 130, 70]", "    65535: [180, 130, 70]");
        let palette = ModelConfig::from_yaml_str(&cfg).unwrap().palette();
        assert_eq!(palette.len(), 65536);
        assert_eq!(palette.lookup(65535), Rgb([70, 130, 180]));
    }

    #[test]
    fn test_load_from_model_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ModelConfig::FILE_NAME), CFG).unwrap();

        let config = ModelConfig::load(dir.path()).unwrap();
        assert_eq!(config.num_classes(), 3);

        let missing = tempfile::tempdir().unwrap();
        assert!(ModelConfig::load(missing.path()).is_err());
    }
}
