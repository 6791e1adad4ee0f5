//! PDF page rasterization via Google PDFium.
//!
//! Scanned rolls carry no usable text layer, so every page is rendered to a
//! PNG and sent through visual recognition. `PdfiumRasterizer` is stateless
//! (`Send + Sync`); each operation loads a fresh `Pdfium` handle because the
//! upstream type is `!Send`, and the OS caches the underlying dlopen so
//! repeat loads are near-free.

use std::io::Cursor;

use image::ImageOutputFormat;
use pdfium_render::prelude::*;
use thiserror::Error;
use tracing::{debug, warn};

/// Maximum dimension (width or height) for rendered page images. Guards
/// against OOM on absurd page sizes or DPI settings.
const MAX_DIMENSION_PX: u32 = 4096;

/// PDF points per inch.
const POINTS_PER_INCH: f32 = 72.0;

#[derive(Error, Debug)]
pub enum RasterizeError {
    #[error("Failed to load PDF: {0}")]
    Load(String),

    #[error("PDF is password protected")]
    Encrypted,

    #[error("Failed to render page {page}: {reason}")]
    Page { page: usize, reason: String },

    #[error("Image encoding failed: {0}")]
    Encode(String),
}

/// Renders document pages to PNG bytes.
pub trait PageRasterizer: Send + Sync {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, RasterizeError>;

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, RasterizeError>;
}

/// PDFium-backed rasterizer.
pub struct PdfiumRasterizer;

impl PdfiumRasterizer {
    /// Create a rasterizer, verifying the PDFium library loads (fail-fast).
    pub fn new() -> Result<Self, RasterizeError> {
        let _ = load_pdfium()?;
        Ok(Self)
    }
}

/// Load the PDFium dynamic library.
///
/// Discovery order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path to library file)
/// 2. Alongside the running executable
/// 3. System library search paths
fn load_pdfium() -> Result<Pdfium, RasterizeError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path)
            .map_err(|e| RasterizeError::Load(format!("Failed to load PDFium from {path}: {e}")))?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                debug!(dir = %exe_dir.display(), "loaded PDFium from executable directory");
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        RasterizeError::Load(format!(
            "PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

fn map_load_error(e: PdfiumError) -> RasterizeError {
    let msg = format!("{e}").to_lowercase();
    if msg.contains("password") || msg.contains("encrypt") {
        RasterizeError::Encrypted
    } else {
        RasterizeError::Load(format!("{e}"))
    }
}

/// Pixel dimensions for rendering, clamped to `[1, MAX_DIMENSION_PX]` with
/// aspect ratio preserved when capping.
fn compute_render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let max_dim = raw_w.max(raw_h);
    if max_dim > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / max_dim;
        let w = ((raw_w * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        let h = ((raw_h * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, RasterizeError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        Ok(document.pages().len() as usize)
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, RasterizeError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;

        let pages = document.pages();

        let page_index = u16::try_from(page_number).map_err(|_| RasterizeError::Page {
            page: page_number,
            reason: format!("Page index {page_number} exceeds u16 maximum"),
        })?;

        let page = pages.get(page_index).map_err(|_| RasterizeError::Page {
            page: page_number,
            reason: format!(
                "Page {page_number} out of range (document has {} pages)",
                pages.len()
            ),
        })?;

        let width_points = page.width().value;
        let height_points = page.height().value;
        let (target_w, target_h) = compute_render_dimensions(width_points, height_points, dpi);

        let uncapped_w = (width_points * dpi as f32 / POINTS_PER_INCH) as u32;
        let uncapped_h = (height_points * dpi as f32 / POINTS_PER_INCH) as u32;
        if target_w != uncapped_w || target_h != uncapped_h {
            warn!(
                page = page_number,
                raw_width = uncapped_w,
                raw_height = uncapped_h,
                capped_width = target_w,
                capped_height = target_h,
                "page dimensions capped to {MAX_DIMENSION_PX}px",
            );
        }

        let config = PdfRenderConfig::new()
            .set_target_width(target_w as i32)
            .set_maximum_height(target_h as i32);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| RasterizeError::Page {
                page: page_number,
                reason: format!("Rendering failed: {e}"),
            })?;

        let mut cursor = Cursor::new(Vec::new());
        bitmap
            .as_image()
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .map_err(|e| RasterizeError::Encode(format!("PNG encoding failed: {e}")))?;

        let png_bytes = cursor.into_inner();
        debug!(
            page = page_number,
            width = target_w,
            height = target_h,
            png_size = png_bytes.len(),
            "rendered page to PNG"
        );
        Ok(png_bytes)
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Marker bytes a test PDF can start with to make the mock fail.
pub const MOCK_POISON: &[u8] = b"POISON";

/// Mock rasterizer returning a minimal PNG for each valid page. Documents
/// whose bytes start with [`MOCK_POISON`] fail to load.
pub struct MockRasterizer {
    page_count: usize,
}

impl MockRasterizer {
    pub fn new(page_count: usize) -> Self {
        Self { page_count }
    }
}

impl PageRasterizer for MockRasterizer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, RasterizeError> {
        if pdf_bytes.starts_with(MOCK_POISON) {
            return Err(RasterizeError::Load("corrupt document".into()));
        }
        Ok(self.page_count)
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        _dpi: u32,
    ) -> Result<Vec<u8>, RasterizeError> {
        if pdf_bytes.starts_with(MOCK_POISON) {
            return Err(RasterizeError::Load("corrupt document".into()));
        }
        if page_number >= self.page_count {
            return Err(RasterizeError::Page {
                page: page_number,
                reason: format!("out of range (mock has {} pages)", self.page_count),
            });
        }
        Ok(minimal_png())
    }
}

/// Minimal valid 1x1 white pixel PNG.
pub fn minimal_png() -> Vec<u8> {
    vec![
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
        0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR chunk
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, // 1x1
        0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, // 8-bit RGB
        0xDE, // IHDR CRC
        0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, // IDAT chunk
        0x08, 0xD7, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, // compressed
        0x00, 0x02, 0x00, 0x01, 0xE2, 0x21, 0xBC, 0x33, // IDAT CRC
        0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, // IEND chunk
        0xAE, 0x42, 0x60, 0x82, // IEND CRC
    ]
}
