//! Presentation-layer state and its transitions.
//!
//! [`SessionState`] is changed only through [`reduce`], which takes the
//! current state and one [`Event`] and returns the next state. Side effects
//! (reading files, network calls, acquiring previews) happen outside and are
//! reported back as events.

use crate::aspect::{AspectState, SizeEdit};
use crate::client::Upload;
use crate::dimensions::extract_svg_dimensions;
use crate::error::CONVERSION_FAILED_MESSAGE;
use crate::estimate::{estimate_from_layout, estimate_from_source, EstimateSource, PageEstimate};
use crate::markdown::{layout_document, parse_blocks, to_html};
use crate::options::{ImageFormat, MarkdownOptions, PageDimensionsMm, PageSize, SvgOptions};
use crate::result::{ConversionResult, ResultData};
use crate::validate::{FileCategory, UploadError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Quality preselected in the JPEG slider.
pub const DEFAULT_SESSION_QUALITY: u8 = 85;

/// Width shortcuts offered next to the width input.
pub const WIDTH_PRESETS: [u32; 3] = [640, 1280, 1920];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Svg,
    Markdown,
}

impl Tab {
    pub fn category(&self) -> FileCategory {
        match self {
            Tab::Svg => FileCategory::Svg,
            Tab::Markdown => FileCategory::Markdown,
        }
    }
}

/// Raster settings shown on the SVG tab.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvgSettings {
    pub format: ImageFormat,
    pub size: AspectState,
    pub quality: u8,
}

impl Default for SvgSettings {
    fn default() -> Self {
        Self {
            format: ImageFormat::Png,
            size: AspectState::default(),
            quality: DEFAULT_SESSION_QUALITY,
        }
    }
}

impl SvgSettings {
    pub fn options(&self) -> SvgOptions {
        SvgOptions {
            format: self.format,
            width: self.size.width,
            height: self.size.height,
            quality: Some(self.quality),
        }
    }
}

/// What a conversion of the current state would submit.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingRequest {
    Svg(SvgOptions),
    Markdown(MarkdownOptions),
}

#[derive(Debug, Default)]
pub struct SessionState {
    pub tab: Tab,
    pub file: Option<Upload>,
    pub svg: SvgSettings,
    pub markdown: MarkdownOptions,
    /// Rendered preview of the selected Markdown file.
    pub html: Option<String>,
    pub estimate: PageEstimate,
    pub estimate_source: Option<EstimateSource>,
    pub busy: bool,
    pub result: Option<ResultData>,
    pub error: Option<String>,
    pub preview: Option<PreviewHandle>,
}

impl SessionState {
    /// The request a convert action would send, if one is possible now.
    pub fn pending_request(&self) -> Option<PendingRequest> {
        self.file.as_ref()?;
        match self.tab {
            Tab::Svg if self.svg.size.is_valid() => Some(PendingRequest::Svg(self.svg.options())),
            Tab::Svg => None,
            Tab::Markdown => Some(PendingRequest::Markdown(self.markdown)),
        }
    }

    /// Page size used for layout previews; missing custom sides fall back
    /// to A4.
    pub fn preview_page(&self) -> PageDimensionsMm {
        self.markdown.page_size.dimensions().unwrap_or(PageDimensionsMm {
            width: f64::from(self.markdown.width.unwrap_or(210)),
            height: f64::from(self.markdown.height.unwrap_or(297)),
        })
    }
}

#[derive(Debug)]
pub enum Event {
    TabSelected(Tab),
    /// A file that already passed upload validation, with its preview.
    FileSelected {
        upload: Upload,
        preview: PreviewHandle,
    },
    FileRejected(UploadError),
    WidthChanged(i64),
    HeightChanged(i64),
    WidthPreset(u32),
    LockToggled,
    FormatChanged(ImageFormat),
    QualityChanged(u8),
    PageSizeChanged(PageSize),
    CustomWidthChanged(u32),
    CustomHeightChanged(u32),
    /// Content height of the laid-out preview, margins excluded.
    LayoutMeasured { content_height_px: f64 },
    ConversionStarted,
    ConversionFinished(ConversionResult),
    /// The request itself failed (transport, unreadable response).
    ConversionFailed(String),
}

/// Applies one event.
pub fn reduce(state: SessionState, event: Event) -> SessionState {
    match event {
        Event::TabSelected(tab) => SessionState {
            tab,
            file: None,
            html: None,
            estimate: PageEstimate::ONE,
            estimate_source: None,
            result: None,
            error: None,
            preview: None,
            ..state
        },

        Event::FileSelected { upload, preview } => select_file(state, upload, preview),

        Event::FileRejected(err) => SessionState {
            error: Some(err.to_string()),
            ..state
        },

        Event::WidthChanged(raw) => resize(state, SizeEdit::Width(raw)),
        Event::HeightChanged(raw) => resize(state, SizeEdit::Height(raw)),
        Event::WidthPreset(width) => resize(state, SizeEdit::Width(i64::from(width))),
        Event::LockToggled => resize(state, SizeEdit::ToggleLock),

        Event::FormatChanged(format) => SessionState {
            svg: SvgSettings { format, ..state.svg },
            ..state
        },
        Event::QualityChanged(quality) => SessionState {
            svg: SvgSettings {
                quality: quality.clamp(1, 100),
                ..state.svg
            },
            ..state
        },

        Event::PageSizeChanged(page_size) => {
            let markdown = match page_size.dimensions() {
                Some(_) => MarkdownOptions::named(page_size),
                None => MarkdownOptions {
                    page_size,
                    ..state.markdown
                },
            };
            remeasure(SessionState { markdown, ..state })
        }
        Event::CustomWidthChanged(width) => {
            let markdown = MarkdownOptions {
                page_size: PageSize::Custom,
                width: (width > 0).then_some(width),
                ..state.markdown
            };
            remeasure(SessionState { markdown, ..state })
        }
        Event::CustomHeightChanged(height) => {
            let markdown = MarkdownOptions {
                page_size: PageSize::Custom,
                height: (height > 0).then_some(height),
                ..state.markdown
            };
            remeasure(SessionState { markdown, ..state })
        }

        Event::LayoutMeasured { content_height_px } => {
            if state.html.is_none() {
                return state;
            }
            let estimate = estimate_from_layout(content_height_px, state.preview_page());
            SessionState {
                estimate,
                estimate_source: Some(EstimateSource::PostRender),
                ..state
            }
        }

        Event::ConversionStarted => {
            if state.busy || state.pending_request().is_none() {
                debug!(busy = state.busy, "Ignoring conversion request");
                return state;
            }
            SessionState {
                busy: true,
                result: None,
                error: None,
                ..state
            }
        }

        Event::ConversionFinished(result) => match (result.success, result.data) {
            (true, Some(data)) => SessionState {
                busy: false,
                result: Some(data),
                error: None,
                ..state
            },
            (_, _) => SessionState {
                busy: false,
                result: None,
                error: Some(
                    result
                        .error
                        .unwrap_or_else(|| CONVERSION_FAILED_MESSAGE.to_string()),
                ),
                ..state
            },
        },

        Event::ConversionFailed(message) => SessionState {
            busy: false,
            error: Some(message),
            ..state
        },
    }
}

fn resize(state: SessionState, edit: SizeEdit) -> SessionState {
    SessionState {
        svg: SvgSettings {
            size: state.svg.size.apply(edit),
            ..state.svg
        },
        ..state
    }
}

fn select_file(state: SessionState, upload: Upload, preview: PreviewHandle) -> SessionState {
    let mut next = SessionState {
        error: None,
        result: None,
        html: None,
        preview: Some(preview),
        ..state
    };

    let name = upload.name.to_lowercase();
    match next.tab {
        Tab::Svg if name.ends_with(".svg") => {
            // Without a recoverable size the previous dimensions stay.
            if let Some(dims) = extract_svg_dimensions(&upload.text()) {
                next.svg.size = next.svg.size.apply(SizeEdit::Reseed(dims));
            }
        }
        Tab::Markdown if name.ends_with(".md") || name.ends_with(".markdown") => {
            let text = upload.text();
            next.html = Some(to_html(&text));
            next.estimate = estimate_from_source(&text);
            next.estimate_source = Some(EstimateSource::PreRender);
        }
        _ => {}
    }

    next.file = Some(upload);
    next
}

/// Refines the page estimate by laying out the loaded Markdown at the
/// current page size.
fn remeasure(state: SessionState) -> SessionState {
    let (Some(_), Some(file)) = (&state.html, &state.file) else {
        return state;
    };
    let page = state.preview_page();
    let height = layout_document(&parse_blocks(&file.text()), page).content_height();
    reduce(
        state,
        Event::LayoutMeasured {
            content_height_px: height,
        },
    )
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    live: Mutex<HashSet<u64>>,
}

/// Tracks outstanding previews so none outlives its selection.
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    inner: Arc<RegistryInner>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> PreviewHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut live) = self.inner.live.lock() {
            live.insert(id);
        }
        PreviewHandle {
            id,
            registry: self.inner.clone(),
        }
    }

    pub fn live_count(&self) -> usize {
        self.inner.live.lock().map(|live| live.len()).unwrap_or(0)
    }

    pub fn is_live(&self, id: u64) -> bool {
        self.inner
            .live
            .lock()
            .map(|live| live.contains(&id))
            .unwrap_or(false)
    }
}

/// A preview resource, released when dropped.
#[derive(Debug)]
pub struct PreviewHandle {
    id: u64,
    registry: Arc<RegistryInner>,
}

impl PreviewHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        if let Ok(mut live) = self.registry.live.lock() {
            live.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn svg_upload(svg: &str) -> Upload {
        Upload::new("logo.svg", "image/svg+xml", svg.as_bytes().to_vec())
    }

    fn md_upload(text: &str) -> Upload {
        Upload::new("notes.md", "text/markdown", text.as_bytes().to_vec())
    }

    fn select(state: SessionState, upload: Upload, registry: &PreviewRegistry) -> SessionState {
        reduce(
            state,
            Event::FileSelected {
                upload,
                preview: registry.acquire(),
            },
        )
    }

    #[test]
    fn test_defaults() {
        let state = SessionState::default();
        assert_eq!(state.tab, Tab::Svg);
        assert_eq!(state.svg.options(), SvgOptions {
            format: ImageFormat::Png,
            width: 1920,
            height: 1080,
            quality: Some(85),
        });
        assert!(state.svg.size.locked);
        assert_eq!(state.markdown.page_size, PageSize::A4);
        assert_eq!(state.preview_page(), PageDimensionsMm { width: 210.0, height: 297.0 });
        assert_eq!(state.estimate, PageEstimate::ONE);
    }

    #[test]
    fn test_svg_selection_reseeds_size_and_ratio() {
        let registry = PreviewRegistry::new();
        let state = select(
            SessionState::default(),
            svg_upload(r#"<svg viewBox="0 0 300 150"></svg>"#),
            &registry,
        );
        assert_eq!((state.svg.size.width, state.svg.size.height), (300, 150));

        let state = reduce(state, Event::WidthChanged(600));
        assert_eq!(state.svg.size.height, 300);
    }

    #[test]
    fn test_svg_without_size_keeps_previous_dimensions() {
        let registry = PreviewRegistry::new();
        let state = reduce(SessionState::default(), Event::WidthChanged(800));
        let before = state.svg.size;

        let state = select(state, svg_upload(r#"<svg width="50%"></svg>"#), &registry);
        assert_eq!(state.svg.size, before);
        assert!(state.file.is_some());
    }

    #[test]
    fn test_width_preset_respects_lock() {
        let state = reduce(SessionState::default(), Event::WidthPreset(1280));
        assert_eq!((state.svg.size.width, state.svg.size.height), (1280, 720));

        let state = reduce(state, Event::LockToggled);
        let state = reduce(state, Event::WidthPreset(640));
        assert_eq!((state.svg.size.width, state.svg.size.height), (640, 720));
    }

    #[test]
    fn test_markdown_selection_uses_pre_render_estimate() {
        let registry = PreviewRegistry::new();
        let state = reduce(SessionState::default(), Event::TabSelected(Tab::Markdown));
        let state = select(state, md_upload("# Title\n\nBody text."), &registry);

        assert!(state.html.as_deref().unwrap().contains("<h1>Title</h1>"));
        assert_eq!(state.estimate.get(), 1);
        assert_eq!(state.estimate_source, Some(EstimateSource::PreRender));
    }

    #[test]
    fn test_layout_measurement_refines_estimate() {
        let registry = PreviewRegistry::new();
        let state = reduce(SessionState::default(), Event::TabSelected(Tab::Markdown));
        let state = select(state, md_upload("text"), &registry);

        let state = reduce(state, Event::LayoutMeasured { content_height_px: 3000.0 });
        assert_eq!(state.estimate.get(), 3);
        assert_eq!(state.estimate_source, Some(EstimateSource::PostRender));
    }

    #[test]
    fn test_measurement_without_content_is_ignored() {
        let state = reduce(
            SessionState::default(),
            Event::LayoutMeasured { content_height_px: 9000.0 },
        );
        assert_eq!(state.estimate, PageEstimate::ONE);
        assert_eq!(state.estimate_source, None);
    }

    #[test]
    fn test_page_size_change_loads_table_and_remeasures() {
        let registry = PreviewRegistry::new();
        let state = reduce(SessionState::default(), Event::TabSelected(Tab::Markdown));
        let doc = "Some paragraph text that wraps.\n\n".repeat(120);
        let state = select(state, md_upload(&doc), &registry);

        let a4 = reduce(state, Event::PageSizeChanged(PageSize::A4));
        assert_eq!(a4.estimate_source, Some(EstimateSource::PostRender));
        let a4_pages = a4.estimate;

        let a5 = reduce(a4, Event::PageSizeChanged(PageSize::A5));
        assert_eq!(a5.markdown.width, Some(148));
        assert_eq!(a5.markdown.height, Some(210));
        assert!(a5.estimate > a4_pages);
    }

    #[test]
    fn test_custom_dimension_switches_to_custom() {
        let state = reduce(SessionState::default(), Event::CustomWidthChanged(100));
        assert_eq!(state.markdown.page_size, PageSize::Custom);
        assert_eq!(state.markdown.width, Some(100));
        assert_eq!(state.markdown.height, Some(297));

        let state = reduce(state, Event::PageSizeChanged(PageSize::Letter));
        assert_eq!(state.markdown.width, Some(216));
        assert_eq!(state.markdown.height, Some(279));
    }

    #[test]
    fn test_tab_switch_clears_selection_and_releases_preview() {
        let registry = PreviewRegistry::new();
        let state = select(SessionState::default(), svg_upload("<svg/>"), &registry);
        let state = reduce(state, Event::FileRejected(UploadError::TooLarge { limit_bytes: 1 }));
        assert_eq!(registry.live_count(), 1);

        let state = reduce(state, Event::TabSelected(Tab::Markdown));
        assert!(state.file.is_none());
        assert!(state.error.is_none());
        assert!(state.preview.is_none());
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_new_selection_releases_previous_preview() {
        let registry = PreviewRegistry::new();
        let state = select(SessionState::default(), svg_upload("<svg/>"), &registry);
        let first = state.preview.as_ref().unwrap().id();

        let state = select(state, svg_upload("<svg/>"), &registry);
        assert!(!registry.is_live(first));
        assert_eq!(registry.live_count(), 1);

        drop(state);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_rejection_keeps_previous_file() {
        let registry = PreviewRegistry::new();
        let state = select(SessionState::default(), svg_upload("<svg/>"), &registry);
        let state = reduce(
            state,
            Event::FileRejected(UploadError::UnsupportedType { name: "a.png".into() }),
        );
        assert_eq!(state.error.as_deref(), Some("Unsupported file type"));
        assert!(state.file.is_some());
    }

    #[test]
    fn test_only_one_conversion_at_a_time() {
        let registry = PreviewRegistry::new();
        let state = reduce(SessionState::default(), Event::ConversionStarted);
        assert!(!state.busy, "nothing selected");

        let state = select(state, svg_upload("<svg/>"), &registry);
        let state = reduce(state, Event::ConversionStarted);
        assert!(state.busy);

        let state = reduce(state, Event::ConversionStarted);
        assert!(state.busy);

        let data = ResultData::inline(b"png", "image/png", "logo_1x1.png".into(), None);
        let state = reduce(state, Event::ConversionFinished(ConversionResult::ok(data.clone())));
        assert!(!state.busy);
        assert_eq!(state.result, Some(data));
    }

    #[test]
    fn test_failed_result_sets_error() {
        let registry = PreviewRegistry::new();
        let state = select(SessionState::default(), svg_upload("<svg/>"), &registry);
        let state = reduce(state, Event::ConversionStarted);

        let state = reduce(
            state,
            Event::ConversionFinished(ConversionResult {
                success: false,
                data: None,
                error: None,
            }),
        );
        assert!(!state.busy);
        assert_eq!(state.error.as_deref(), Some(CONVERSION_FAILED_MESSAGE));

        let state = reduce(state, Event::ConversionStarted);
        let state = reduce(state, Event::ConversionFailed("connection refused".into()));
        assert!(!state.busy);
        assert_eq!(state.error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_invalid_size_blocks_svg_request() {
        let registry = PreviewRegistry::new();
        let state = select(SessionState::default(), svg_upload("<svg/>"), &registry);
        let state = reduce(state, Event::WidthChanged(0));
        assert_eq!(state.pending_request(), None);
    }
}
