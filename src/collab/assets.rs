//! Fixed assets: intro clip, outro clip and caption font
//!
//! Each asset is either a local path or an HTTP(S) URL. Remote assets are
//! downloaded once into the user cache directory and reused afterwards;
//! within a process the resolved paths are computed once and shared
//! read-only by every request.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use crate::error::{CheerError, Result, Service};

/// Where the fixed assets come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub intro: String,
    pub outro: String,
    pub font: String,
    /// Download cache (defaults to `<cache dir>/cheerclip/assets`)
    pub cache_dir: Option<PathBuf>,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            intro: "https://github.com/DECK6/cheervideo/raw/main/intro.mp4".to_string(),
            outro: "https://github.com/DECK6/cheervideo/raw/main/outro.mp4".to_string(),
            font: "https://github.com/orioncactus/pretendard/blob/main/packages/pretendard/dist/public/static/Pretendard-Bold.otf?raw=true".to_string(),
            cache_dir: None,
        }
    }
}

impl AssetConfig {
    /// Use local files for everything
    #[must_use]
    pub fn local(intro: &Path, outro: &Path, font: &Path) -> Self {
        Self {
            intro: intro.display().to_string(),
            outro: outro.display().to_string(),
            font: font.display().to_string(),
            cache_dir: None,
        }
    }

    fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("cheerclip")
                .join("assets")
        })
    }
}

/// Local copies of the fixed assets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPaths {
    pub intro: PathBuf,
    pub outro: PathBuf,
    pub font: PathBuf,
}

/// How an asset location is interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Remote(Url),
    Local(PathBuf),
}

fn classify(location: &str) -> Source {
    match Url::parse(location) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Source::Remote(url),
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_or_else(|()| Source::Local(PathBuf::from(location)), Source::Local),
        _ => Source::Local(PathBuf::from(location)),
    }
}

/// Cache file name for a URL: `<role>-<last path segment>`
fn cache_name(role: &str, url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .filter(|s| !s.is_empty())
        .unwrap_or("asset");
    format!("{role}-{last}")
}

fn fetch_error(message: impl Into<String>) -> CheerError {
    CheerError::collaborator(Service::AssetFetch, message)
}

/// Resolves the fixed assets once per process
#[derive(Debug)]
pub struct AssetStore {
    config: AssetConfig,
    resolved: OnceCell<AssetPaths>,
}

impl AssetStore {
    #[must_use]
    pub fn new(config: AssetConfig) -> Self {
        Self {
            config,
            resolved: OnceCell::new(),
        }
    }

    /// Local paths of intro, outro and font, fetching them on first use
    pub async fn paths(&self) -> Result<&AssetPaths> {
        self.resolved.get_or_try_init(|| self.resolve_all()).await
    }

    async fn resolve_all(&self) -> Result<AssetPaths> {
        let cache = self.config.resolved_cache_dir();
        let needs_client = [&self.config.intro, &self.config.outro, &self.config.font]
            .iter()
            .any(|l| matches!(classify(l), Source::Remote(_)));

        let client = if needs_client {
            tokio::fs::create_dir_all(&cache)
                .await
                .map_err(|e| fetch_error(format!("cannot create {}: {e}", cache.display())))?;
            Some(
                reqwest::Client::builder()
                    .timeout(Duration::from_secs(120))
                    .build()
                    .map_err(|e| fetch_error(e.to_string()))?,
            )
        } else {
            None
        };

        let paths = AssetPaths {
            intro: resolve("intro", &self.config.intro, &cache, client.as_ref()).await?,
            outro: resolve("outro", &self.config.outro, &cache, client.as_ref()).await?,
            font: resolve("font", &self.config.font, &cache, client.as_ref()).await?,
        };
        info!("Assets ready in {}", cache.display());
        Ok(paths)
    }
}

async fn resolve(role: &str, location: &str, cache: &Path, client: Option<&reqwest::Client>) -> Result<PathBuf> {
    match classify(location) {
        Source::Local(path) => {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                Ok(path)
            } else {
                Err(fetch_error(format!("{role} not found at {}", path.display())))
            }
        }
        Source::Remote(url) => {
            let target = cache.join(cache_name(role, &url));
            if tokio::fs::try_exists(&target).await.unwrap_or(false) {
                debug!("Using cached {role} at {}", target.display());
                return Ok(target);
            }
            let client = client.ok_or_else(|| fetch_error("no HTTP client for remote asset"))?;
            download(client, &url, cache, &target).await?;
            Ok(target)
        }
    }
}

async fn download(client: &reqwest::Client, url: &Url, cache: &Path, target: &Path) -> Result<()> {
    info!("Downloading {}", url);
    let mut response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| fetch_error(format!("{url}: {e}")))?;
    if !response.status().is_success() {
        return Err(fetch_error(format!("{url} returned {}", response.status())));
    }

    // Write next to the target and rename so a partial download is never cached
    let staged = tempfile::NamedTempFile::new_in(cache)?;
    let mut file = tokio::fs::File::create(staged.path()).await?;
    let mut written = 0_usize;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| fetch_error(format!("{url}: {e}")))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len();
    }
    file.flush().await?;
    drop(file);

    staged
        .persist(target)
        .map_err(|e| fetch_error(format!("cannot store {}: {e}", target.display())))?;
    debug!("Stored {written} bytes at {}", target.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations_are_classified() {
        assert!(matches!(
            classify("https://github.com/DECK6/cheervideo/raw/main/intro.mp4"),
            Source::Remote(_)
        ));
        assert_eq!(classify("/srv/intro.mp4"), Source::Local(PathBuf::from("/srv/intro.mp4")));
        assert_eq!(classify("assets/intro.mp4"), Source::Local(PathBuf::from("assets/intro.mp4")));
        assert_eq!(classify("file:///srv/outro.mp4"), Source::Local(PathBuf::from("/srv/outro.mp4")));
    }

    #[test]
    fn cache_names_ignore_query() {
        let config = AssetConfig::default();
        let Source::Remote(font) = classify(&config.font) else {
            panic!("font should be remote");
        };
        assert_eq!(cache_name("font", &font), "font-Pretendard-Bold.otf");
    }

    #[tokio::test]
    async fn local_assets_resolve_once() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["intro.mp4", "outro.mp4", "font.ttf"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let store = AssetStore::new(AssetConfig::local(
            &dir.path().join("intro.mp4"),
            &dir.path().join("outro.mp4"),
            &dir.path().join("font.ttf"),
        ));

        let first = store.paths().await.unwrap().clone();
        assert_eq!(first.font, dir.path().join("font.ttf"));

        std::fs::remove_file(dir.path().join("intro.mp4")).unwrap();
        assert_eq!(store.paths().await.unwrap(), &first);
    }

    #[tokio::test]
    async fn missing_local_asset_is_a_fetch_error() {
        let store = AssetStore::new(AssetConfig::local(
            Path::new("/nonexistent/intro.mp4"),
            Path::new("/nonexistent/outro.mp4"),
            Path::new("/nonexistent/font.ttf"),
        ));
        let err = store.paths().await.unwrap_err();
        assert_eq!(err.service(), Some(Service::AssetFetch));
    }
}
