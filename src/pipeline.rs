//! Render pipeline: background → modules → gradient remap → logo
//!
//! Image loads are the only suspension points. Preview renders carry a
//! generation token; after every load the pass checks whether a newer request
//! has been issued and, if so, abandons itself without touching the preview.

use std::sync::Arc;

use image::{DynamicImage, RgbaImage};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::asset::AssetLoader;
use crate::color::Color;
use crate::encoder::Encoder;
use crate::error::RenderError;
use crate::qr::{AssetRef, QrSpec, QrStyle};
use crate::render::{self, Layout};

/// Finished pixel buffer together with the spec that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pub pixels: RgbaImage,
    pub spec: QrSpec,
    pub layout: Layout,
}

impl RenderedImage {
    pub fn size(&self) -> u32 {
        self.pixels.width()
    }

    pub fn to_dynamic(&self) -> DynamicImage {
        DynamicImage::ImageRgba8(self.pixels.clone())
    }
}

/// What the preview consumer sees
#[derive(Debug, Clone, Default)]
pub struct Preview {
    /// Token of the most recently issued preview request
    pub generation: u64,
    /// `None` until a render succeeds, and again after the current one fails
    pub image: Option<Arc<RenderedImage>>,
}

pub struct Renderer {
    encoder: Arc<dyn Encoder>,
    assets: Arc<dyn AssetLoader>,
    size: u32,
    preview: watch::Sender<Preview>,
}

impl Renderer {
    pub const DEFAULT_SIZE: u32 = 300;
    pub const MIN_SIZE: u32 = 64;
    pub const MAX_SIZE: u32 = 2048;

    pub fn new(encoder: Arc<dyn Encoder>, assets: Arc<dyn AssetLoader>) -> Self {
        // The sender keeps working without receivers; consumers subscribe later
        let (preview, _) = watch::channel(Preview::default());
        Self {
            encoder,
            assets,
            size: Self::DEFAULT_SIZE,
            preview,
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size.clamp(Self::MIN_SIZE, Self::MAX_SIZE);
        self
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// One independent render pass. Does not touch the preview.
    pub async fn render(&self, spec: &QrSpec) -> Result<RenderedImage, RenderError> {
        self.run(spec, None).await
    }

    /// Renders `spec` as the new preview, superseding any pass still in flight.
    ///
    /// Returns [`RenderError::Superseded`] if another `refresh` was issued
    /// before this one finished; in that case the preview is left to the
    /// newer request.
    pub async fn refresh(&self, spec: QrSpec) -> Result<Arc<RenderedImage>, RenderError> {
        let token = self.issue();
        debug!(token, "preview render issued");

        match self.run(&spec, Some(token)).await {
            Ok(image) => {
                let image = Arc::new(image);
                if self.publish(token, Some(image.clone())) {
                    Ok(image)
                } else {
                    Err(RenderError::Superseded)
                }
            }
            Err(RenderError::Superseded) => Err(RenderError::Superseded),
            Err(err) => {
                // No stale image may stand in for a failed render
                self.publish(token, None);
                Err(err)
            }
        }
    }

    pub fn latest(&self) -> Option<Arc<RenderedImage>> {
        self.preview.borrow().image.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Preview> {
        self.preview.subscribe()
    }

    fn issue(&self) -> u64 {
        let mut token = 0;
        self.preview.send_modify(|preview| {
            preview.generation += 1;
            token = preview.generation;
        });
        token
    }

    fn checkpoint(&self, token: Option<u64>) -> Result<(), RenderError> {
        match token {
            Some(token) if self.preview.borrow().generation != token => {
                debug!(token, "stale render abandoned");
                Err(RenderError::Superseded)
            }
            _ => Ok(()),
        }
    }

    fn publish(&self, token: u64, image: Option<Arc<RenderedImage>>) -> bool {
        self.preview.send_if_modified(|preview| {
            if preview.generation != token {
                return false;
            }
            preview.image = image;
            true
        })
    }

    async fn load(&self, asset: &AssetRef, role: &'static str) -> Option<DynamicImage> {
        match self.assets.load(asset).await {
            Ok(image) => Some(image),
            Err(err) => {
                warn!(role, error = %err, "asset load failed, continuing without it");
                None
            }
        }
    }

    async fn run(&self, spec: &QrSpec, token: Option<u64>) -> Result<RenderedImage, RenderError> {
        spec.validate()?;
        let style = &spec.style;

        let matrix = self.encoder.encode(&spec.content, style.error_correction_level)?;
        let layout = Layout::new(self.size, matrix.width());
        debug!(modules = matrix.width(), size = self.size, "encoded");

        // Background
        let gradient = style
            .use_gradient
            .then(|| render::fill_gradient(self.size, style.gradient_colors));
        let custom = match &style.custom_background {
            Some(asset) => self.load(asset, "background").await,
            None => None,
        };
        self.checkpoint(token)?;

        let mut canvas = match (&custom, &gradient) {
            (Some(image), _) => render::fill_cover(self.size, image, style.background_color),
            (None, Some(gradient)) => gradient.clone(),
            (None, None) => render::fill_solid(self.size, style.background_color),
        };

        // Modules. Under a gradient the dark modules are drawn alone as a black
        // placeholder, recolored per pixel, and only then given light modules,
        // so a dark background color is never mistaken for a dark module.
        let light = custom.is_none().then_some(style.background_color);
        let layer = match &gradient {
            Some(gradient) => {
                let placeholder =
                    render::draw_modules(&matrix, &layout, style.shape, Color::BLACK, None);
                let mask = render::dark_mask(&placeholder);
                let mut layer = render::apply_gradient_to_mask(placeholder, &mask, gradient);
                if let Some(light) = light {
                    render::fill_transparent(&mut layer, light);
                }
                layer
            }
            None => render::draw_modules(&matrix, &layout, style.shape, style.foreground_color, light),
        };
        render::composite(&mut canvas, &layer);

        // Logo goes last: its clearing square is drawn over the final background
        if let Some(asset) = &style.logo {
            let logo = self.load(asset, "logo").await;
            self.checkpoint(token)?;
            if let Some(logo) = logo {
                render::overlay_logo(&mut canvas, &logo, style.logo_size, clearing_color(style));
            }
        }

        Ok(RenderedImage {
            pixels: canvas,
            spec: spec.clone(),
            layout,
        })
    }
}

fn clearing_color(style: &QrStyle) -> Color {
    if style.background_color.is_opaque() {
        style.background_color
    } else {
        Color::WHITE
    }
}
