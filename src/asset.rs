//! Loading of uploaded images (custom backgrounds and logos)
//!
//! Loads are the pipeline's suspension points, so the loader is an async trait
//! and tests can inject slow or failing implementations.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;

use crate::error::AssetError;
use crate::qr::AssetRef;

#[async_trait]
pub trait AssetLoader: Send + Sync {
    async fn load(&self, asset: &AssetRef) -> Result<DynamicImage, AssetError>;
}

/// Decodes `data:` URLs in memory and reads paths from disk
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAssetLoader;

#[async_trait]
impl AssetLoader for DefaultAssetLoader {
    async fn load(&self, asset: &AssetRef) -> Result<DynamicImage, AssetError> {
        let fail = |reason: String| AssetError::LoadFailed {
            asset: asset.to_string(),
            reason,
        };

        let bytes = match asset {
            AssetRef::DataUrl(url) => decode_data_url(url).map_err(fail)?,
            AssetRef::Path(path) => tokio::fs::read(path).await.map_err(|e| fail(e.to_string()))?,
        };

        image::load_from_memory(&bytes).map_err(|e| fail(e.to_string()))
    }
}

/// Extracts the payload of a base64 `data:` URL.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>, String> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| "not a data URL".to_string())?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| "data URL has no payload".to_string())?;
    if !meta.ends_with(";base64") {
        return Err("only base64 data URLs are supported".into());
    }
    STANDARD.decode(payload.trim()).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_data_url() -> String {
        let img = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(bytes))
    }

    #[tokio::test]
    async fn loads_png_data_url() {
        let img = DefaultAssetLoader
            .load(&AssetRef::DataUrl(png_data_url()))
            .await
            .unwrap();
        assert_eq!((img.width(), img.height()), (4, 4));
    }

    #[tokio::test]
    async fn garbage_fails_with_load_failed() {
        let result = DefaultAssetLoader
            .load(&AssetRef::DataUrl("data:image/png;base64,bm90IGFuIGltYWdl".into()))
            .await;
        assert!(matches!(result, Err(AssetError::LoadFailed { .. })));

        let missing = DefaultAssetLoader
            .load(&AssetRef::Path("/definitely/not/here.png".into()))
            .await;
        assert!(missing.is_err());
    }

    #[test]
    fn rejects_non_base64_data_urls() {
        assert!(decode_data_url("data:text/plain,hello").is_err());
        assert!(decode_data_url("https://example.com/logo.png").is_err());
    }
}
