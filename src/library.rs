//! The asset library: category directories scanned once, then shared read-only.
//!
//! # Layout
//!
//! ```text
//! assets/
//!   animals/cat.png          deformable mask, optional cat.wav / cat.mp3
//!   people/anna.jpg
//!   Male/round_glasses.png   rigid overlay (category listed in config)
//! ```
//!
//! Mask assets are identified as `{category}_{index}` and overlays as
//! `{category}_{index}_overlay`, where `index` counts image files in sorted
//! order. Assets that fail to load are skipped; categories left empty are not
//! exposed.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::asset::{AnchorRule, Asset, AssetBuilder, AssetKind, AssetPreprocessor};
use crate::capability::{is_sidecar, CapabilityProvider};
use crate::codec::encode_png_base64;
use crate::config::{AssetConfig, Config};
use crate::error::Result;

/// A named, ordered, non-empty group of assets.
#[derive(Debug, Clone)]
pub struct Category {
    name: String,
    assets: Vec<Arc<Asset>>,
}

impl Category {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn assets(&self) -> &[Arc<Asset>] {
        &self.assets
    }
}

/// Listing entry for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSummary {
    pub id: String,
    pub name: String,
    pub category: String,
    pub kind: AssetKind,
    pub has_sound: bool,
    pub sound_file: Option<String>,
    /// Base64 PNG.
    pub thumbnail: String,
}

impl AssetSummary {
    pub fn from_asset(asset: &Asset) -> Result<Self> {
        Ok(Self {
            id: asset.id().to_string(),
            name: asset.name().to_string(),
            category: asset.category().to_string(),
            kind: asset.kind(),
            has_sound: asset.sound().is_some(),
            sound_file: asset
                .sound()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned()),
            thumbnail: encode_png_base64(asset.thumbnail())?,
        })
    }
}

#[derive(Serialize)]
struct CacheRef<'a> {
    categories: Vec<(&'a str, Vec<&'a Asset>)>,
}

#[derive(Deserialize)]
struct CacheOwned {
    categories: Vec<(String, Vec<Asset>)>,
}

/// Prepared assets grouped by category.
#[derive(Debug, Clone, Default)]
pub struct AssetLibrary {
    categories: Vec<Category>,
    by_id: HashMap<String, Arc<Asset>>,
}

struct ScanJob {
    category: String,
    id: String,
    path: PathBuf,
    rigid: bool,
}

impl AssetLibrary {
    /// Group assets by category, keeping first-seen order of categories and
    /// assets alike.
    pub fn from_assets<I>(assets: I) -> Self
    where
        I: IntoIterator<Item = Asset>,
    {
        let mut categories: Vec<Category> = Vec::new();
        for asset in assets {
            let asset = Arc::new(asset);
            match categories.iter_mut().find(|c| c.name == asset.category()) {
                Some(category) => category.assets.push(asset),
                None => categories.push(Category {
                    name: asset.category().to_string(),
                    assets: vec![asset],
                }),
            }
        }
        Self::from_categories(categories)
    }

    fn from_categories(categories: Vec<Category>) -> Self {
        let categories: Vec<Category> = categories
            .into_iter()
            .filter(|c| !c.assets.is_empty())
            .collect();
        let by_id = categories
            .iter()
            .flat_map(|c| c.assets.iter())
            .map(|a| (a.id().to_string(), Arc::clone(a)))
            .collect();
        Self { categories, by_id }
    }

    /// Scan `root` for category directories and preprocess every image in
    /// parallel.
    pub fn scan<P: AsRef<Path>>(
        root: P,
        config: &Config,
        capabilities: &dyn CapabilityProvider,
    ) -> Result<Self> {
        let root = root.as_ref();
        let mut dirs: Vec<(String, PathBuf)> = std::fs::read_dir(root)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter_map(|path| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                Some((name, path))
            })
            .collect();
        dirs.sort();

        let mut jobs = Vec::new();
        for (name, dir) in &dirs {
            let rigid = config.assets.overlay_categories.iter().any(|c| c == name);
            let files = list_images(dir, &config.assets)?;
            debug!(category = %name, files = files.len(), rigid, "scanning category");
            for (idx, path) in files.into_iter().enumerate() {
                let id = if rigid {
                    format!("{}_{}_overlay", name, idx)
                } else {
                    format!("{}_{}", name, idx)
                };
                jobs.push(ScanJob {
                    category: name.clone(),
                    id,
                    path,
                    rigid,
                });
            }
        }

        let preprocessor = AssetPreprocessor::new(config);
        let loaded: Vec<Option<Asset>> = jobs
            .par_iter()
            .map(|job| match load_one(job, &preprocessor, config, capabilities) {
                Ok(asset) => {
                    debug!(id = asset.id(), "prepared asset");
                    Some(asset)
                }
                Err(e) => {
                    warn!(path = %job.path.display(), error = %e, "skipping asset");
                    None
                }
            })
            .collect();

        let library = Self::from_assets(loaded.into_iter().flatten());
        info!(
            "Loaded {} assets in {} categories from {}",
            library.len(),
            library.categories.len(),
            root.display()
        );
        Ok(library)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Names of the non-empty categories, in library order.
    pub fn category_names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Listing for one category; unknown categories list nothing.
    pub fn summaries(&self, category: &str) -> Result<Vec<AssetSummary>> {
        self.category(category)
            .map(|c| c.assets.iter().map(|a| AssetSummary::from_asset(a)).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    pub fn get(&self, id: &str) -> Option<Arc<Asset>> {
        self.by_id.get(id).cloned()
    }

    /// Save the prepared library. Paths ending in `.bz2` are compressed.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let cache = CacheRef {
            categories: self
                .categories
                .iter()
                .map(|c| (c.name.as_str(), c.assets.iter().map(|a| a.as_ref()).collect()))
                .collect(),
        };

        let writer = BufWriter::new(File::create(path)?);
        if is_bz2(path) {
            let mut encoder = BzEncoder::new(writer, Compression::best());
            bincode::serialize_into(&mut encoder, &cache)?;
            encoder.finish()?.flush()?;
        } else {
            let mut writer = writer;
            bincode::serialize_into(&mut writer, &cache)?;
            writer.flush()?;
        }
        info!("Saved {} assets to {}", self.len(), path.display());
        Ok(())
    }

    /// Load a library written by [`AssetLibrary::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut bytes = Vec::new();
        if is_bz2(path) {
            BzDecoder::new(reader).read_to_end(&mut bytes)?;
        } else {
            let mut reader = reader;
            reader.read_to_end(&mut bytes)?;
        }
        let cache: CacheOwned = bincode::deserialize(&bytes)?;

        let categories = cache
            .categories
            .into_iter()
            .map(|(name, assets)| Category {
                name,
                assets: assets.into_iter().map(Arc::new).collect(),
            })
            .collect();
        let library = Self::from_categories(categories);
        info!("Loaded {} cached assets from {}", library.len(), path.display());
        Ok(library)
    }
}

fn is_bz2(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "bz2")
}

/// Image files directly inside `dir`, sorted by file name.
fn list_images(dir: &Path, config: &AssetConfig) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && !is_sidecar(path))
        .filter(|path| {
            path.extension()
                .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
                .is_some_and(|ext| config.image_extensions.iter().any(|e| *e == ext))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// First same-stem audio file, in configured extension order.
pub fn find_sound(image_path: &Path, audio_extensions: &[String]) -> Option<PathBuf> {
    audio_extensions
        .iter()
        .map(|ext| image_path.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

fn load_one(
    job: &ScanJob,
    preprocessor: &AssetPreprocessor<'_>,
    config: &Config,
    capabilities: &dyn CapabilityProvider,
) -> Result<Asset> {
    let name = job
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| job.id.clone());
    let builder = AssetBuilder::new(job.id.clone())
        .name(name)
        .sound(find_sound(&job.path, &config.assets.audio_extensions));

    let image = image::open(&job.path)?;
    if job.rigid {
        let stem = job
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        preprocessor.prepare_overlay(
            builder.anchor(AnchorRule::from_file_stem(&stem)),
            &job.category,
            image.to_rgba8(),
        )
    } else {
        let detector = capabilities.detector(&job.path)?;
        let segmenter = capabilities.segmenter(&job.path)?;
        preprocessor.prepare_mask(
            builder,
            &job.category,
            &image.to_rgb8(),
            detector.as_ref(),
            segmenter.as_ref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    use crate::types::PointSet;

    fn mask_asset(id: &str, category: &str) -> Asset {
        AssetBuilder::new(id)
            .category(category)
            .image(RgbaImage::from_pixel(50, 50, Rgba([1, 2, 3, 255])))
            .landmarks(PointSet::from(vec![(10, 10), (40, 10), (25, 40)]))
            .build()
            .unwrap()
    }

    #[test]
    fn groups_in_first_seen_order() {
        let library = AssetLibrary::from_assets(vec![
            mask_asset("b_0", "b"),
            mask_asset("a_0", "a"),
            mask_asset("b_1", "b"),
        ]);
        assert_eq!(library.category_names(), vec!["b", "a"]);
        assert_eq!(library.category("b").unwrap().assets().len(), 2);
        assert_eq!(library.get("b_1").unwrap().category(), "b");
        assert!(library.get("c_0").is_none());
    }

    #[test]
    fn summaries_carry_thumbnails() {
        let library = AssetLibrary::from_assets(vec![mask_asset("a_0", "a")]);
        let summaries = library.summaries("a").unwrap();
        assert_eq!(summaries.len(), 1);
        assert!(!summaries[0].has_sound);
        assert!(!summaries[0].thumbnail.is_empty());
        assert!(library.summaries("missing").unwrap().is_empty());
    }

    #[test]
    fn cache_round_trip_plain_and_compressed() {
        let library =
            AssetLibrary::from_assets(vec![mask_asset("a_0", "a"), mask_asset("b_0", "b")]);
        let dir = tempfile::tempdir().unwrap();
        for name in ["lib.bin", "lib.bin.bz2"] {
            let path = dir.path().join(name);
            library.save(&path).unwrap();
            let loaded = AssetLibrary::load(&path).unwrap();
            assert_eq!(loaded.category_names(), library.category_names());
            assert_eq!(*loaded.get("b_0").unwrap(), *library.get("b_0").unwrap());
        }
    }

    #[test]
    fn sound_lookup_prefers_first_extension() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("cat.png");
        let exts = vec!["wav".to_string(), "mp3".to_string()];
        assert!(find_sound(&image, &exts).is_none());

        std::fs::write(dir.path().join("cat.mp3"), b"").unwrap();
        assert_eq!(find_sound(&image, &exts), Some(dir.path().join("cat.mp3")));
        std::fs::write(dir.path().join("cat.wav"), b"").unwrap();
        assert_eq!(find_sound(&image, &exts), Some(dir.path().join("cat.wav")));
    }
}
