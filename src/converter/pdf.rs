//! Markdown to paginated PDF.
//!
//! Each laid-out page is written as a standalone SVG document, converted to
//! a PDF form XObject by svg2pdf, and placed full-bleed on its own page.

use crate::estimate::PAGE_MARGIN_PX;
use crate::markdown::layout::{PlacedText, Shape, TextStyle};
use crate::markdown::{DocumentLayout, LaidOutPage};
use crate::options::PageDimensionsMm;
use anyhow::{Context, Result};
use pdf_writer::{Content, Finish, Name, Pdf, Rect, Ref};
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::debug;

use super::raster::SVG_NAMESPACE;

const PT_PER_MM: f32 = 72.0 / 25.4;
const SANS_FAMILY: &str = "sans-serif";
const MONO_FAMILY: &str = "monospace";

/// A finished PDF with its authoritative page count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPdf {
    pub bytes: Vec<u8>,
    pub pages: usize,
}

/// Writes one page of the layout as an SVG document sized in CSS pixels.
pub fn page_svg(layout: &DocumentLayout, page: &LaidOutPage<'_>) -> String {
    let width = layout.page_width_px();
    let height = layout.page_height_px();
    let mut svg = String::with_capacity(4096);

    let _ = write!(
        svg,
        r#"<svg xmlns="{SVG_NAMESPACE}" width="{width:.2}" height="{height:.2}" viewBox="0 0 {width:.2} {height:.2}">"#
    );
    let _ = write!(
        svg,
        r##"<rect width="{width:.2}" height="{height:.2}" fill="#FFFFFF"/>"##
    );

    for (offset, row) in &page.rows {
        let top = PAGE_MARGIN_PX + offset;
        for shape in &row.shapes {
            write_shape(&mut svg, shape, PAGE_MARGIN_PX, top);
        }
        for text in &row.texts {
            write_text(&mut svg, text, PAGE_MARGIN_PX, top);
        }
    }

    svg.push_str("</svg>");
    svg
}

fn write_shape(svg: &mut String, shape: &Shape, left: f64, top: f64) {
    let _ = match shape {
        Shape::Rect {
            x,
            y,
            width,
            height,
            fill,
        } => write!(
            svg,
            r#"<rect x="{:.2}" y="{:.2}" width="{width:.2}" height="{height:.2}" fill="{fill}"/>"#,
            left + x,
            top + y,
        ),
        Shape::Line {
            x1,
            y1,
            x2,
            y2,
            width,
            color,
        } => write!(
            svg,
            r#"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="{color}" stroke-width="{width:.2}"/>"#,
            left + x1,
            top + y1,
            left + x2,
            top + y2,
        ),
    };
}

fn write_text(svg: &mut String, text: &PlacedText, left: f64, top: f64) {
    let TextStyle {
        size,
        bold,
        italic,
        mono,
        strike,
        color,
    } = text.style;

    let _ = write!(
        svg,
        r#"<text x="{:.2}" y="{:.2}" font-family="{}" font-size="{size:.2}" fill="{color}" xml:space="preserve""#,
        left + text.x,
        top + text.baseline,
        if mono { MONO_FAMILY } else { SANS_FAMILY },
    );
    if bold {
        svg.push_str(r#" font-weight="bold""#);
    }
    if italic {
        svg.push_str(r#" font-style="italic""#);
    }
    if strike {
        svg.push_str(r#" text-decoration="line-through""#);
    }
    svg.push('>');
    escape_into(svg, &text.text);
    svg.push_str("</text>");
}

/// XML-escapes text, dropping control characters XML cannot carry.
fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
}

/// Places each tree on its own page of the given physical size.
///
/// svg2pdf emits every tree as a unit-square form XObject; the page content
/// stream scales it up to the media box.
pub fn assemble(trees: &[usvg::Tree], page: PageDimensionsMm) -> Result<Vec<u8>> {
    let width = page.width as f32 * PT_PER_MM;
    let height = page.height as f32 * PT_PER_MM;

    let mut alloc = Ref::new(1);
    let catalog_id = alloc.bump();
    let page_tree_id = alloc.bump();

    let mut pdf = Pdf::new();
    let mut page_ids = Vec::with_capacity(trees.len());
    let mut chunks = Vec::with_capacity(trees.len());

    for (index, tree) in trees.iter().enumerate() {
        let (chunk, svg_ref) = svg2pdf::to_chunk(tree, svg2pdf::ConversionOptions::default());

        let mut remapped = HashMap::new();
        let chunk = chunk.renumber(|old| *remapped.entry(old).or_insert_with(|| alloc.bump()));
        let svg_id = remapped
            .get(&svg_ref)
            .copied()
            .with_context(|| format!("Page {} produced no drawable content", index + 1))?;

        let page_id = alloc.bump();
        let content_id = alloc.bump();
        let name = format!("P{}", index + 1);

        let mut pdf_page = pdf.page(page_id);
        pdf_page.media_box(Rect::new(0.0, 0.0, width, height));
        pdf_page.parent(page_tree_id);
        pdf_page.contents(content_id);
        pdf_page
            .resources()
            .x_objects()
            .pair(Name(name.as_bytes()), svg_id);
        pdf_page.finish();

        let mut content = Content::new();
        content.save_state();
        content.transform([width, 0.0, 0.0, height, 0.0, 0.0]);
        content.x_object(Name(name.as_bytes()));
        content.restore_state();
        pdf.stream(content_id, &content.finish());

        page_ids.push(page_id);
        chunks.push(chunk);
    }

    pdf.catalog(catalog_id).pages(page_tree_id);
    pdf.pages(page_tree_id)
        .kids(page_ids.iter().copied())
        .count(page_ids.len() as i32);

    for chunk in &chunks {
        pdf.extend(chunk);
    }

    let bytes = pdf.finish();
    debug!(pages = page_ids.len(), bytes = bytes.len(), "Assembled PDF");
    Ok(bytes)
}
