//! SVG to PNG/JPEG rasterization via resvg.

use crate::dimensions::root_svg_tag;
use crate::options::{ImageFormat, SvgOptions};
use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use once_cell::sync::Lazy;
use regex::Regex;
use resvg::tiny_skia::{Color, Pixmap, Transform};
use std::borrow::Cow;
use tracing::debug;

pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

static RE_DEFAULT_XMLNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\sxmlns\s*=").unwrap());

/// Adds the SVG namespace to the root element when it is missing.
///
/// Browsers render namespace-less SVG inline but refuse it as an image, and
/// usvg refuses it outright.
pub fn ensure_namespace(svg: &str) -> Cow<'_, str> {
    let Some(tag) = root_svg_tag(svg) else {
        return Cow::Borrowed(svg);
    };
    if RE_DEFAULT_XMLNS.is_match(&svg[tag.clone()]) {
        return Cow::Borrowed(svg);
    }

    let insert_at = tag.start + "<svg".len();
    let mut out = String::with_capacity(svg.len() + SVG_NAMESPACE.len() + 10);
    out.push_str(&svg[..insert_at]);
    out.push_str(" xmlns=\"");
    out.push_str(SVG_NAMESPACE);
    out.push('"');
    out.push_str(&svg[insert_at..]);
    Cow::Owned(out)
}

/// Draws the tree stretched onto a canvas of exactly the requested size and
/// encodes it.
pub fn rasterize(tree: &usvg::Tree, options: &SvgOptions) -> Result<Vec<u8>> {
    let size = tree.size();
    if size.width() <= 0.0 || size.height() <= 0.0 {
        anyhow::bail!("Invalid SVG dimensions: {}x{}", size.width(), size.height());
    }

    let mut pixmap = Pixmap::new(options.width, options.height).with_context(|| {
        format!(
            "Failed to allocate a {}x{} canvas",
            options.width, options.height
        )
    })?;

    // JPEG has no alpha channel.
    if options.format == ImageFormat::Jpeg {
        pixmap.fill(Color::WHITE);
    }

    let transform = Transform::from_scale(
        options.width as f32 / size.width(),
        options.height as f32 / size.height(),
    );
    resvg::render(tree, transform, &mut pixmap.as_mut());

    let encoded = match options.format {
        ImageFormat::Png => pixmap.encode_png().context("Failed to encode PNG")?,
        ImageFormat::Jpeg => encode_jpeg(&pixmap, options.jpeg_quality())?,
    };

    debug!(
        format = %options.format,
        width = options.width,
        height = options.height,
        bytes = encoded.len(),
        "Rasterized SVG"
    );
    Ok(encoded)
}

/// Encodes an opaque pixmap. Premultiplied and straight RGB agree once every
/// pixel has full alpha.
fn encode_jpeg(pixmap: &Pixmap, quality: u8) -> Result<Vec<u8>> {
    let rgb: Vec<u8> = pixmap
        .data()
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(&rgb, pixmap.width(), pixmap.height(), ExtendedColorType::Rgb8)
        .context("Failed to encode JPEG")?;
    Ok(out)
}
