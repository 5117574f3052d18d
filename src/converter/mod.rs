//! Render backends.
//!
//! [`RenderBackend`] rasterizes SVG through resvg and renders Markdown to a
//! paginated PDF through svg2pdf. The system font database is loaded once and
//! shared by every request; trees, canvases and PDFs are built per request.

pub mod pdf;
pub mod raster;

pub use pdf::RenderedPdf;

use crate::markdown::{layout_document, parse_blocks};
use crate::options::{PageDimensionsMm, SvgOptions};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use usvg::fontdb;

/// Preferred faces for the generic families used by rendered documents.
const SANS_CANDIDATES: &[&str] = &[
    "DejaVu Sans",
    "Liberation Sans",
    "Noto Sans",
    "Arial",
    "Helvetica",
];
const MONO_CANDIDATES: &[&str] = &[
    "DejaVu Sans Mono",
    "Liberation Mono",
    "Noto Sans Mono",
    "Courier New",
    "Menlo",
];

/// The two conversions the HTTP layer delegates.
#[cfg_attr(test, mockall::automock)]
pub trait ConversionBackend: Send + Sync {
    /// Renders SVG source to PNG or JPEG bytes at exactly the requested size.
    ///
    /// # Arguments
    ///
    /// * `svg` - SVG document text; a missing default namespace is added
    /// * `options` - Output format, width, height and JPEG quality
    ///
    /// # Errors
    ///
    /// Returns an error if the SVG cannot be parsed, has no positive size, or
    /// the canvas cannot be allocated or encoded.
    fn rasterize_svg(&self, svg: &str, options: &SvgOptions) -> Result<Vec<u8>>;

    /// Renders Markdown source to a PDF with pages of the given size.
    ///
    /// # Returns
    ///
    /// The PDF bytes and the number of pages written.
    fn render_markdown(&self, markdown: &str, page: PageDimensionsMm) -> Result<RenderedPdf>;
}

/// In-process renderer backed by resvg and svg2pdf.
#[derive(Clone)]
pub struct RenderBackend {
    fontdb: Arc<fontdb::Database>,
}

impl RenderBackend {
    /// Creates a backend using the fonts installed on this machine.
    pub fn new() -> Self {
        Self::with_fonts(load_system_fonts())
    }

    pub fn with_fonts(fontdb: fontdb::Database) -> Self {
        Self {
            fontdb: Arc::new(fontdb),
        }
    }

    pub fn font_count(&self) -> usize {
        self.fontdb.len()
    }

    fn parse_svg(&self, svg: &str) -> Result<usvg::Tree> {
        let mut options = usvg::Options::default();
        options.fontdb = self.fontdb.clone();
        options.font_family = "sans-serif".to_string();
        usvg::Tree::from_str(svg, &options).context("Failed to parse SVG content")
    }
}

impl Default for RenderBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionBackend for RenderBackend {
    fn rasterize_svg(&self, svg: &str, options: &SvgOptions) -> Result<Vec<u8>> {
        let svg = raster::ensure_namespace(svg);
        let tree = self.parse_svg(&svg)?;
        raster::rasterize(&tree, options)
    }

    fn render_markdown(&self, markdown: &str, page: PageDimensionsMm) -> Result<RenderedPdf> {
        let layout = layout_document(&parse_blocks(markdown), page);
        let pages = layout.paginate();

        let trees = pages
            .iter()
            .enumerate()
            .map(|(index, laid_out)| {
                self.parse_svg(&pdf::page_svg(&layout, laid_out))
                    .with_context(|| format!("Failed to build page {}", index + 1))
            })
            .collect::<Result<Vec<_>>>()?;

        let bytes = pdf::assemble(&trees, page)?;
        Ok(RenderedPdf {
            bytes,
            pages: trees.len(),
        })
    }
}

/// Loads installed fonts and binds the generic sans-serif and monospace
/// families to faces that exist.
pub fn load_system_fonts() -> fontdb::Database {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    if let Some(family) = first_available(&db, SANS_CANDIDATES) {
        db.set_sans_serif_family(family);
    }
    if let Some(family) = first_available(&db, MONO_CANDIDATES) {
        db.set_monospace_family(family);
    }

    if db.is_empty() {
        warn!("No system fonts found; text will not be rendered");
    } else {
        info!(faces = db.len(), "Loaded system fonts");
    }
    db
}

fn first_available<'a>(db: &fontdb::Database, candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find(|candidate| {
        db.faces()
            .any(|face| face.families.iter().any(|(name, _)| name == candidate))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{ImageFormat, PageSize};

    fn backend() -> RenderBackend {
        RenderBackend::with_fonts(fontdb::Database::new())
    }

    fn options(format: ImageFormat, width: u32, height: u32) -> SvgOptions {
        SvgOptions {
            format,
            width,
            height,
            quality: None,
        }
    }

    #[test]
    fn test_rasterize_png_at_requested_size() {
        let svg = r#"<svg viewBox="0 0 100 50"><rect width="100" height="50" fill="red"/></svg>"#;
        let png = backend()
            .rasterize_svg(svg, &options(ImageFormat::Png, 200, 100))
            .unwrap();

        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 100));
    }

    #[test]
    fn test_rasterize_stretches_non_uniformly() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"><rect width="10" height="10" fill="#00FF00"/></svg>"##;
        let png = backend()
            .rasterize_svg(svg, &options(ImageFormat::Png, 300, 20))
            .unwrap();

        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(299, 19).0, [0, 255, 0, 255]);
        assert_eq!(decoded.get_pixel(0, 0).0, [0, 255, 0, 255]);
    }

    #[test]
    fn test_jpeg_has_white_background() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"></svg>"#;
        let jpeg = backend()
            .rasterize_svg(svg, &options(ImageFormat::Jpeg, 16, 16))
            .unwrap();

        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap().to_rgb8();
        let [r, g, b] = decoded.get_pixel(8, 8).0;
        assert!(r > 250 && g > 250 && b > 250);
    }

    #[test]
    fn test_invalid_svg() {
        let result = backend().rasterize_svg("not an svg", &options(ImageFormat::Png, 10, 10));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_dimensions() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="0" height="0"></svg>"#;
        let result = backend().rasterize_svg(svg, &options(ImageFormat::Png, 10, 10));
        assert!(result.is_err());
    }

    #[test]
    fn test_render_markdown_single_page() {
        let rendered = backend()
            .render_markdown("# Title\n\nBody text.", PageSize::A4.dimensions().unwrap())
            .unwrap();

        assert_eq!(rendered.pages, 1);
        assert!(rendered.bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_render_markdown_paginates() {
        let doc = "A paragraph long enough to matter.\n\n".repeat(300);
        let page = PageSize::A5.dimensions().unwrap();
        let rendered = backend().render_markdown(&doc, page).unwrap();

        assert!(rendered.pages > 1);
        let text = String::from_utf8_lossy(&rendered.bytes);
        assert!(text.contains(&format!("/Count {}", rendered.pages)));
    }

    #[test]
    fn test_render_empty_markdown_is_one_blank_page() {
        let page = PageSize::Letter.dimensions().unwrap();
        let rendered = backend().render_markdown("", page).unwrap();
        assert_eq!(rendered.pages, 1);
    }
}
