//! HTTP surface: `POST /convert/svg`, `POST /convert/markdown`, `GET /health`.
//!
//! Handlers parse the multipart form, validate options, and run the render on
//! the blocking pool under a concurrency semaphore. Every response body is a
//! [`ConversionResult`].

use crate::config::ServerConfig;
use crate::converter::ConversionBackend;
use crate::error::{ConvertError, Result};
use crate::job::{ConversionJob, ConversionKind};
use crate::options::{
    parse_leading_int, parse_positive, ImageFormat, MarkdownOptions, PageSize, SvgOptions,
};
use crate::result::{image_filename, pdf_filename, ConversionResult, ResultData};
use crate::telemetry::record_conversion_telemetry;
use crate::validate::{validate_upload, FileCategory, UploadError};
use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// Shared state for every request.
pub struct AppState {
    backend: Arc<dyn ConversionBackend>,
    permits: Arc<Semaphore>,
    config: ServerConfig,
}

impl AppState {
    pub fn new(backend: Arc<dyn ConversionBackend>, config: ServerConfig) -> Self {
        Self {
            backend,
            permits: Arc::new(Semaphore::new(config.render_concurrency.max(1))),
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.body_limit();
    Router::new()
        .route("/health", get(health))
        .route("/convert/svg", post(convert_svg))
        .route("/convert/markdown", post(convert_markdown))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(Arc::new(state))
}

/// Serves until `shutdown` resolves, then drains in-flight requests.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on {}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn convert_svg(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> (StatusCode, Json<ConversionResult>) {
    respond(ConversionKind::Svg, handle_svg(&state, multipart).await)
}

async fn convert_markdown(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> (StatusCode, Json<ConversionResult>) {
    respond(ConversionKind::Markdown, handle_markdown(&state, multipart).await)
}

async fn handle_svg(
    state: &AppState,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<ResultData> {
    let form = UploadForm::read(multipart, state).await?;
    let file = form.file.as_ref().ok_or(ConvertError::MissingFile)?;

    let (Some(width), Some(height)) = (
        parse_positive(form.field("width")),
        parse_positive(form.field("height")),
    ) else {
        return Err(ConvertError::MissingDimensions);
    };

    let format = match form.field("format").map(str::trim) {
        Some(raw) if !raw.is_empty() => raw.parse::<ImageFormat>()?,
        _ => ImageFormat::Png,
    };
    let quality = form
        .field("quality")
        .and_then(parse_leading_int)
        .filter(|q| *q > 0)
        .map(|q| q.min(100) as u8);

    let max = state.config.max_raster_dimension;
    if width > max || height > max {
        return Err(ConvertError::DimensionTooLarge { width, height, max });
    }

    file.validate(FileCategory::Svg, state)?;

    let options = SvgOptions {
        format,
        width,
        height,
        quality,
    };
    let svg = String::from_utf8_lossy(&file.bytes).into_owned();
    let (bytes, _) = run_job(state, ConversionKind::Svg, file, move |backend| {
        backend.rasterize_svg(&svg, &options).map(|bytes| (bytes, None))
    })
    .await?;

    Ok(ResultData::inline(
        &bytes,
        format.mime_type(),
        image_filename(file.name.as_deref(), width, height, format.extension()),
        None,
    ))
}

async fn handle_markdown(
    state: &AppState,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<ResultData> {
    let form = UploadForm::read(multipart, state).await?;
    let file = form.file.as_ref().ok_or(ConvertError::MissingFile)?;

    let page_size = match form.field("pageSize").map(str::trim) {
        Some(raw) if !raw.is_empty() => raw.parse::<PageSize>()?,
        _ => PageSize::A4,
    };
    let options = MarkdownOptions {
        page_size,
        width: parse_positive(form.field("width")),
        height: parse_positive(form.field("height")),
    };
    let page = options.page_dimensions()?;

    file.validate(FileCategory::Markdown, state)?;

    let markdown = String::from_utf8_lossy(&file.bytes).into_owned();
    let (bytes, pages) = run_job(state, ConversionKind::Markdown, file, move |backend| {
        backend
            .render_markdown(&markdown, page)
            .map(|pdf| (pdf.bytes, Some(pdf.pages)))
    })
    .await?;

    Ok(ResultData::inline(
        &bytes,
        "application/pdf",
        pdf_filename(file.name.as_deref()),
        pages,
    ))
}

type JobOutput = (Vec<u8>, Option<usize>);

/// Runs one render on the blocking pool and records its job telemetry.
async fn run_job<F>(
    state: &AppState,
    kind: ConversionKind,
    file: &FilePart,
    work: F,
) -> Result<JobOutput>
where
    F: FnOnce(&dyn ConversionBackend) -> anyhow::Result<JobOutput> + Send + 'static,
{
    let mut job = ConversionJob::new(kind, file.name.clone(), file.bytes.len());

    let permit = state
        .permits
        .clone()
        .acquire_owned()
        .await
        .map_err(|e| ConvertError::Render(e.into()))?;

    job.start_processing();
    info!(job_id = %job.job_id, kind = %kind, input_bytes = job.input_bytes, "Processing conversion");

    let backend = state.backend.clone();
    // The permit lives as long as the render, even if the request is dropped.
    let outcome = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        work(backend.as_ref())
    })
    .await
    .map_err(anyhow::Error::from)
    .and_then(|result| result);

    match outcome {
        Ok((bytes, pages)) => {
            job.mark_complete(bytes.len(), pages);
            record_conversion_telemetry(&job);
            Ok((bytes, pages))
        }
        Err(err) => {
            job.mark_failed(format!("{:#}", err));
            record_conversion_telemetry(&job);
            Err(ConvertError::Render(err))
        }
    }
}

fn respond(
    kind: ConversionKind,
    result: Result<ResultData>,
) -> (StatusCode, Json<ConversionResult>) {
    match result {
        Ok(data) => (StatusCode::OK, Json(ConversionResult::ok(data))),
        Err(err) => {
            let status = err.status();
            if status.is_server_error() {
                error!(kind = %kind, error = %err, "Conversion failed");
            } else {
                warn!(kind = %kind, status = status.as_u16(), error = %err, "Conversion request refused");
            }
            (status, Json(ConversionResult::failure(err.user_message())))
        }
    }
}

struct FilePart {
    name: Option<String>,
    mime: Option<String>,
    bytes: Bytes,
}

impl FilePart {
    fn validate(&self, category: FileCategory, state: &AppState) -> Result<()> {
        validate_upload(
            category,
            self.name.as_deref().unwrap_or_default(),
            self.mime.as_deref().unwrap_or_default(),
            self.bytes.len() as u64,
            &state.config.limits,
        )?;
        Ok(())
    }
}

#[derive(Default)]
struct UploadForm {
    file: Option<FilePart>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    async fn read(
        multipart: std::result::Result<Multipart, MultipartRejection>,
        state: &AppState,
    ) -> Result<Self> {
        let mut multipart = multipart.map_err(|e| ConvertError::Malformed(e.body_text()))?;
        let mut form = UploadForm::default();

        let too_large = |status: StatusCode| {
            (status == StatusCode::PAYLOAD_TOO_LARGE).then(|| {
                ConvertError::Rejected(UploadError::TooLarge {
                    limit_bytes: state.config.limits.largest(),
                })
            })
        };

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => {
                    return Err(too_large(e.status())
                        .unwrap_or_else(|| ConvertError::Malformed(e.body_text())))
                }
            };
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if name == "file" {
                let file_name = field.file_name().map(str::to_string);
                let mime = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    too_large(e.status()).unwrap_or_else(|| ConvertError::Malformed(e.body_text()))
                })?;
                form.file = Some(FilePart {
                    name: file_name,
                    mime,
                    bytes,
                });
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ConvertError::Malformed(e.body_text()))?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{MockConversionBackend, RenderedPdf};
    use crate::error::CONVERSION_FAILED_MESSAGE;
    use pretty_assertions::assert_eq;
    use reqwest::multipart::{Form, Part};

    const SVG: &str = r#"<svg viewBox="0 0 100 50"><rect width="100" height="50"/></svg>"#;

    async fn spawn(backend: MockConversionBackend) -> String {
        let state = AppState::new(Arc::new(backend), ServerConfig::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn file_part(body: &str, name: &str, mime: &str) -> Part {
        Part::bytes(body.as_bytes().to_vec())
            .file_name(name.to_string())
            .mime_str(mime)
            .unwrap()
    }

    fn svg_form() -> Form {
        Form::new().part("file", file_part(SVG, "logo.svg", "image/svg+xml"))
    }

    async fn post(base: &str, path: &str, form: Form) -> (StatusCode, ConversionResult) {
        let response = reqwest::Client::new()
            .post(format!("{base}{path}"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
        (status, response.json().await.unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let base = spawn(MockConversionBackend::new()).await;
        let body: serde_json::Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, serde_json::json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_svg_success_builds_filename_and_data_uri() {
        let mut backend = MockConversionBackend::new();
        backend
            .expect_rasterize_svg()
            .withf(|svg, options| {
                svg.starts_with("<svg viewBox")
                    && options.width == 200
                    && options.height == 100
                    && options.format == ImageFormat::Jpeg
                    && options.quality == Some(70)
            })
            .times(1)
            .returning(|_, _| Ok(vec![0xFF, 0xD8, 0xFF]));
        let base = spawn(backend).await;

        let form = svg_form()
            .text("format", "jpeg")
            .text("width", "200")
            .text("height", "100px")
            .text("quality", "70");
        let (status, result) = post(&base, "/convert/svg", form).await;

        assert_eq!(status, StatusCode::OK);
        let data = result.data.unwrap();
        assert_eq!(data.filename, "logo_200x100.jpg");
        assert_eq!(data.size, 3);
        assert_eq!(data.mime_type(), Some("image/jpeg"));
    }

    #[tokio::test]
    async fn test_missing_file_is_bad_request() {
        let base = spawn(MockConversionBackend::new()).await;
        let form = Form::new().text("width", "10").text("height", "10");
        let (status, result) = post(&base, "/convert/svg", form).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("No file was provided"));
    }

    #[tokio::test]
    async fn test_missing_or_zero_dimensions_are_bad_request() {
        let base = spawn(MockConversionBackend::new()).await;
        for (width, height) in [("", "100"), ("0", "100"), ("abc", "100"), ("200", "-1")] {
            let form = svg_form().text("width", width).text("height", height);
            let (status, result) = post(&base, "/convert/svg", form).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{width}x{height}");
            assert_eq!(
                result.error.as_deref(),
                Some("Please specify both width and height")
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_format_is_bad_request() {
        let base = spawn(MockConversionBackend::new()).await;
        let form = svg_form()
            .text("format", "gif")
            .text("width", "10")
            .text("height", "10");
        let (status, _) = post(&base, "/convert/svg", form).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_raster_never_reaches_backend() {
        let mut backend = MockConversionBackend::new();
        backend.expect_rasterize_svg().never();
        let base = spawn(backend).await;

        let form = svg_form().text("width", "10001").text("height", "10");
        let (status, _) = post(&base, "/convert/svg", form).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_render_failure_is_generic_500() {
        let mut backend = MockConversionBackend::new();
        backend
            .expect_rasterize_svg()
            .returning(|_, _| Err(anyhow::anyhow!("pixmap allocation failed")));
        let base = spawn(backend).await;

        let form = svg_form().text("width", "10").text("height", "10");
        let (status, result) = post(&base, "/convert/svg", form).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            result,
            ConversionResult::failure(CONVERSION_FAILED_MESSAGE)
        );
    }

    #[tokio::test]
    async fn test_unsupported_type_is_application_error() {
        let mut backend = MockConversionBackend::new();
        backend.expect_rasterize_svg().never();
        let base = spawn(backend).await;

        let form = Form::new()
            .part("file", file_part(SVG, "logo.png", "image/png"))
            .text("width", "10")
            .text("height", "10");
        let (status, result) = post(&base, "/convert/svg", form).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(result, ConversionResult::failure("Unsupported file type"));
    }

    #[tokio::test]
    async fn test_untyped_file_part_is_accepted() {
        let mut backend = MockConversionBackend::new();
        backend
            .expect_rasterize_svg()
            .times(1)
            .returning(|_, _| Ok(vec![1, 2, 3]));
        let base = spawn(backend).await;

        let form = Form::new()
            .part("file", file_part(SVG, "logo.svg", "application/octet-stream"))
            .text("width", "10")
            .text("height", "10");
        let (status, result) = post(&base, "/convert/svg", form).await;

        assert_eq!(status, StatusCode::OK);
        assert!(result.success, "{:?}", result.error);
    }

    #[tokio::test]
    async fn test_permit_held_until_render_finishes() {
        let mut backend = MockConversionBackend::new();
        backend.expect_rasterize_svg().returning(|_, _| {
            std::thread::sleep(std::time::Duration::from_millis(300));
            Ok(vec![1])
        });
        let config = ServerConfig {
            render_concurrency: 1,
            ..ServerConfig::default()
        };
        let state = Arc::new(AppState::new(Arc::new(backend), config));

        let task_state = state.clone();
        let request = tokio::spawn(async move {
            let file = FilePart {
                name: Some("logo.svg".into()),
                mime: None,
                bytes: Bytes::from_static(SVG.as_bytes()),
            };
            let options = SvgOptions {
                format: ImageFormat::Png,
                width: 1,
                height: 1,
                quality: None,
            };
            run_job(&task_state, ConversionKind::Svg, &file, move |backend| {
                backend.rasterize_svg(SVG, &options).map(|bytes| (bytes, None))
            })
            .await
        });

        // Drop the request while the render is still running.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        request.abort();
        let _ = request.await;
        assert_eq!(state.permits.available_permits(), 0);

        tokio::time::sleep(std::time::Duration::from_millis(600)).await;
        assert_eq!(state.permits.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_markdown_named_size_ignores_width_and_height() {
        let mut backend = MockConversionBackend::new();
        backend
            .expect_render_markdown()
            .withf(|markdown, page| {
                markdown.trim() == "# Title" && page.width == 297.0 && page.height == 420.0
            })
            .times(1)
            .returning(|_, _| {
                Ok(RenderedPdf {
                    bytes: b"%PDF-1.7".to_vec(),
                    pages: 2,
                })
            });
        let base = spawn(backend).await;

        let form = Form::new()
            .part("file", file_part("# Title", "README.md", "text/markdown"))
            .text("pageSize", "A3")
            .text("width", "1")
            .text("height", "1");
        let (status, result) = post(&base, "/convert/markdown", form).await;

        assert_eq!(status, StatusCode::OK);
        let data = result.data.unwrap();
        assert_eq!(data.filename, "README.pdf");
        assert_eq!(data.pages, Some(2));
        assert_eq!(data.decode().unwrap(), b"%PDF-1.7".to_vec());
    }

    #[tokio::test]
    async fn test_markdown_custom_size_requires_both_dimensions() {
        let base = spawn(MockConversionBackend::new()).await;
        let form = Form::new()
            .part("file", file_part("text", "notes.md", "text/markdown"))
            .text("pageSize", "custom")
            .text("width", "100");
        let (status, result) = post(&base, "/convert/markdown", form).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            result.error.as_deref(),
            Some("Please specify both width and height for a custom page size")
        );
    }

    #[tokio::test]
    async fn test_markdown_defaults_to_a4() {
        let mut backend = MockConversionBackend::new();
        backend
            .expect_render_markdown()
            .withf(|_, page| page.width == 210.0 && page.height == 297.0)
            .returning(|_, _| {
                Ok(RenderedPdf {
                    bytes: b"%PDF".to_vec(),
                    pages: 1,
                })
            });
        let base = spawn(backend).await;

        let form = Form::new().part("file", file_part("text", "notes.md", "text/plain"));
        let (status, _) = post(&base, "/convert/markdown", form).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_page_size_is_bad_request() {
        let base = spawn(MockConversionBackend::new()).await;
        let form = Form::new()
            .part("file", file_part("text", "notes.md", "text/markdown"))
            .text("pageSize", "A9");
        let (status, _) = post(&base, "/convert/markdown", form).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
