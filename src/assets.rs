use std::future::Future;
use std::path::PathBuf;

use log::{info, warn};

use crate::environment::{EnvironmentMap, EnvironmentSlot, Mapping};
use crate::error::{LoadError, LoadResult};
use crate::typeface::Typeface;

/// Somewhere the two scene assets can be fetched from.
pub trait AssetSource {
    fn fetch(&self, location: &str) -> impl Future<Output = LoadResult<Vec<u8>>>;
}

/// Reads assets from the local filesystem, relative to `root`.
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    root: Option<PathBuf>,
}

impl FileSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, location: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(location),
            None => PathBuf::from(location),
        }
    }
}

impl AssetSource for FileSource {
    async fn fetch(&self, location: &str) -> LoadResult<Vec<u8>> {
        if location.starts_with("http://") || location.starts_with("https://") {
            return Err(LoadError::Fetch {
                location: location.to_string(),
                reason: "remote locations are only fetched by the browser build".to_string(),
            });
        }
        std::fs::read(self.resolve(location)).map_err(|source| LoadError::Io {
            location: location.to_string(),
            source,
        })
    }
}

/// Fetches and decodes the HDR environment, mapped for equirectangular
/// reflections.
pub async fn load_environment<S: AssetSource>(source: &S, location: &str) -> LoadResult<EnvironmentMap> {
    let bytes = source.fetch(location).await?;
    let map = EnvironmentMap::from_hdr_bytes(&bytes)?;
    Ok(map.with_mapping(Mapping::EquirectangularReflection))
}

/// Loads the environment into `slot`. A failure leaves the slot empty and is
/// only logged.
pub async fn install_environment<S: AssetSource>(source: &S, location: &str, slot: &EnvironmentSlot) -> bool {
    match load_environment(source, location).await {
        Ok(map) => {
            info!("environment {location} loaded ({}x{})", map.width, map.height);
            slot.install(map);
            true
        }
        Err(err) => {
            warn!("environment {location} unavailable: {err}");
            false
        }
    }
}

pub async fn load_typeface<S: AssetSource>(source: &S, location: &str) -> LoadResult<Typeface> {
    let bytes = source.fetch(location).await?;
    let face = Typeface::from_json_slice(&bytes)?;
    info!(
        "typeface {:?} loaded with {} glyphs",
        face.family_name,
        face.glyph_count()
    );
    Ok(face)
}
