//! Pipeline orchestrator and entry points.
//!
//! [`Pipeline`] runs one document through the state machine in
//! [`RunState`]:
//!
//! ```text
//! Idle → HealthChecking → Recognizing → Assembling → Extracting → Done
//! ```
//!
//! - **HealthChecking** fails the run with `ServiceUnavailable` before any
//!   page is touched.
//! - **Recognizing** loads the progress record, then walks pages in order.
//!   Pages already recorded are skipped without rendering. Each newly
//!   recognized page is put into the store and saved before the next page
//!   starts, so a crash loses at most the page in flight.
//! - An interrupt while recognizing saves progress and skips straight to
//!   assembly; the run then ends in `PartiallyComplete`.
//! - An interrupt while extracting lets the current crop finish and skips
//!   the rest; the run also ends in `PartiallyComplete`.
//! - **Assembling** and **Extracting** always run on whatever pages are in
//!   the store.
//!
//! The raster staging area lives for the duration of [`Pipeline::run`] and is
//! removed on every exit path.

use crate::config::OcrConfig;
use crate::error::{PageError, PdfOcrError};
use crate::observer::{NoopObserver, PipelineObserver};
use crate::output::{FailedPage, RunReport, RunState};
use crate::pipeline::assemble::assemble;
use crate::pipeline::clean::{LayoutOutputCleaner, OutputCleaner};
use crate::pipeline::extract::extract_images;
use crate::pipeline::geometry::GeometryBounds;
use crate::pipeline::input;
use crate::pipeline::recognize::{HttpOcrService, OcrService, Recognizer};
use crate::pipeline::render::{PageRasterizer, PdfiumRasterizer};
use crate::pipeline::stage::RasterStage;
use crate::block::PageResult;
use crate::progress::{JsonFileBackend, ProgressBackend, ProgressStore};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// One document's run through the pipeline.
pub struct Pipeline<S, R, B, C = LayoutOutputCleaner>
where
    S: OcrService,
    R: PageRasterizer,
    B: ProgressBackend,
    C: OutputCleaner,
{
    recognizer: Recognizer<S, C>,
    rasterizer: Arc<R>,
    store: ProgressStore<B>,
    geometry: GeometryBounds,
    dpi: u32,
    stem: String,
    out_dir: PathBuf,
    observer: Arc<dyn PipelineObserver>,
    state: RunState,
}

impl<S, R, B, C> Pipeline<S, R, B, C>
where
    S: OcrService,
    R: PageRasterizer,
    B: ProgressBackend,
    C: OutputCleaner,
{
    /// Wire a pipeline for the PDF at `pdf_path` (used for naming only; the
    /// rasterizer decides what is actually read).
    pub fn new(
        recognizer: Recognizer<S, C>,
        rasterizer: R,
        backend: B,
        pdf_path: &Path,
        out_dir: impl Into<PathBuf>,
        config: &OcrConfig,
    ) -> Result<Self, PdfOcrError> {
        Ok(Self {
            recognizer,
            rasterizer: Arc::new(rasterizer),
            store: ProgressStore::new(backend, input::document_name(pdf_path)),
            geometry: config.geometry()?,
            dpi: config.dpi,
            stem: input::document_stem(pdf_path),
            out_dir: out_dir.into(),
            observer: config
                .observer
                .clone()
                .unwrap_or_else(|| Arc::new(NoopObserver)),
            state: RunState::Idle,
        })
    }

    /// The state reached so far; terminal once [`Pipeline::run`] returns.
    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn store(&self) -> &ProgressStore<B> {
        &self.store
    }

    fn transition(&mut self, next: RunState) {
        debug!("State: {:?} → {:?}", self.state, next);
        self.state = next;
    }

    fn abort(&mut self, e: PdfOcrError) -> PdfOcrError {
        error!("Run aborted: {}", e);
        self.transition(RunState::Aborted);
        e
    }

    /// Run to completion, or until `shutdown` resolves while pages are being
    /// recognized or figures extracted.
    ///
    /// Returns `Err` only for fatal errors: output directory or markdown not
    /// writable, PDF unreadable, service not ready. Page and crop failures
    /// are listed in the report.
    pub async fn run(
        &mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<RunReport, PdfOcrError> {
        let start = Instant::now();
        let mut report = RunReport::default();
        tokio::pin!(shutdown);

        if let Err(source) = tokio::fs::create_dir_all(&self.out_dir).await {
            let e = PdfOcrError::OutputWriteFailed {
                path: self.out_dir.clone(),
                source,
            };
            return Err(self.abort(e));
        }

        // ── Health ───────────────────────────────────────────────────────
        self.transition(RunState::HealthChecking);
        if let Err(e) = self.recognizer.health_check().await {
            return Err(self.abort(e));
        }

        // ── Recognize ────────────────────────────────────────────────────
        self.transition(RunState::Recognizing);
        report.resumed_pages = self.store.load();

        let rasterizer = Arc::clone(&self.rasterizer);
        let total = match tokio::task::spawn_blocking(move || rasterizer.page_count()).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(self.abort(e)),
            Err(join) => {
                let e = PdfOcrError::Internal(format!("page count task failed: {join}"));
                return Err(self.abort(e));
            }
        };
        report.total_pages = total;

        let stage = match RasterStage::new() {
            Ok(stage) => Some(Arc::new(stage)),
            Err(e) => {
                warn!("No raster staging area ({}); pages will be rendered twice", e);
                None
            }
        };

        let already_done = (1..=total).filter(|p| self.store.contains(*p)).count();
        info!(
            "Recognizing {} pages ({} already recognized)",
            total, already_done
        );
        self.observer.on_run_start(total, already_done);

        let mut interrupted = false;
        for page in 1..=total {
            if self.store.contains(page) {
                info!("Skipping page {} (already recognized)", page);
                self.observer.on_page_skipped(page);
                continue;
            }

            self.observer.on_page_start(page, total);
            report.recognition_calls += 1;

            let outcome = tokio::select! {
                biased;
                _ = &mut shutdown => None,
                result = self.recognize_page(page, stage.clone()) => Some(result),
            };

            match outcome {
                None => {
                    warn!("Interrupted during page {}, saving progress", page);
                    interrupted = true;
                    break;
                }
                Some(Ok(blocks)) => {
                    let count = blocks.len();
                    self.store.put(page, blocks);
                    self.persist();
                    report.newly_recognized += 1;
                    self.observer.on_page_complete(page, total, count);
                }
                Some(Err(e)) => {
                    warn!("Page {} recognition failed, skipping: {}", page, e);
                    self.observer.on_page_error(page, total, &e.to_string());
                    report.failed_pages.push(FailedPage {
                        page,
                        error: e.to_string(),
                    });
                }
            }
        }
        if interrupted {
            self.persist();
        }
        report.recognized_pages = self.store.len();
        info!("Recognition finished: {} pages recognized", self.store.len());

        // ── Assemble ─────────────────────────────────────────────────────
        self.transition(RunState::Assembling);
        let doc = assemble(&self.stem, self.store.pages());

        if self.store.is_empty() {
            info!("No recognized pages, no markdown written");
        } else {
            let md_path = self.out_dir.join(format!("{}.md", self.stem));
            if let Err(e) = write_atomic(&md_path, &doc.markdown).await {
                return Err(self.abort(e));
            }
            info!("Markdown saved: {}", md_path.display());
            report.markdown_path = Some(md_path);
        }

        // ── Extract ──────────────────────────────────────────────────────
        self.transition(RunState::Extracting);
        if !doc.crops.is_empty() {
            let rasterizer = Arc::clone(&self.rasterizer);
            let stage = stage.clone();
            let out_dir = self.out_dir.clone();
            let dpi = self.dpi;
            let crops = doc.crops;
            let cancel = Arc::new(AtomicBool::new(false));
            let task_cancel = Arc::clone(&cancel);

            let mut task = tokio::task::spawn_blocking(move || {
                extract_images(
                    rasterizer.as_ref(),
                    stage.as_deref(),
                    &crops,
                    &out_dir,
                    dpi,
                    &task_cancel,
                )
            });

            // `shutdown` has already completed if recognition was interrupted.
            let mut joined = None;
            if !interrupted {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        warn!("Interrupted during image extraction, skipping remaining images");
                        cancel.store(true, Ordering::SeqCst);
                        interrupted = true;
                    }
                    result = &mut task => joined = Some(result),
                }
            }
            let joined = match joined {
                Some(result) => result,
                None => task.await,
            };

            match joined {
                Ok(summary) => {
                    report.images_written = summary.written;
                    report.image_failures =
                        summary.failures.iter().map(|e| e.to_string()).collect();
                }
                Err(join) => {
                    error!("Image extraction task failed: {}", join);
                    report
                        .image_failures
                        .push(format!("extraction task failed: {join}"));
                }
            }
        }

        drop(stage);
        self.transition(if interrupted {
            RunState::PartiallyComplete
        } else {
            RunState::Done
        });

        report.state = self.state;
        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Run {:?}: {}/{} pages recognized ({} new, {} failed), {} images, {}ms",
            report.state,
            report.recognized_pages,
            report.total_pages,
            report.newly_recognized,
            report.failed_pages.len(),
            report.images_written.len(),
            report.duration_ms
        );
        self.observer.on_run_complete(&report);

        Ok(report)
    }

    /// Render, size, stage and recognize one page.
    async fn recognize_page(
        &self,
        page: usize,
        stage: Option<Arc<RasterStage>>,
    ) -> Result<PageResult, PageError> {
        let rasterizer = Arc::clone(&self.rasterizer);
        let dpi = self.dpi;
        let image = tokio::task::spawn_blocking(move || rasterizer.rasterize(page, dpi))
            .await
            .map_err(|e| PageError::RenderFailed {
                page,
                detail: format!("render task failed: {e}"),
            })??;

        let target = self.geometry.normalize(image.height(), image.width());
        debug!(
            "Page {}: {}x{} → {}x{}",
            page,
            image.width(),
            image.height(),
            target.1,
            target.0
        );

        if let Some(stage) = &stage {
            stage.put(page, &image);
        }

        let observer = Arc::clone(&self.observer);
        self.recognizer
            .recognize(page, &image, target, move |fragment| {
                observer.on_fragment(page, fragment)
            })
            .await
    }

    /// Save the store; a failure is logged and the run continues.
    fn persist(&self) {
        if let Err(e) = self.store.save() {
            error!("Failed to save progress: {}", e);
        }
    }
}

/// Write via a sibling temp file and rename, so readers never see a
/// half-written file.
async fn write_atomic(path: &Path, contents: &str) -> Result<(), PdfOcrError> {
    let write_err = |source| PdfOcrError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)
}

// ── Entry points ─────────────────────────────────────────────────────────

/// Recognize `pdf_path` into `out_dir`, stopping early on Ctrl-C.
///
/// Progress is kept beside the PDF (or at `config.progress_path`), so calling
/// this again after an interruption or a partial failure only sends the
/// missing pages.
///
/// # Example
/// ```rust,no_run
/// use pdfocr::{convert, OcrConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = OcrConfig::builder().api_base("http://localhost:5123").build()?;
/// let report = convert("paper.pdf", "out/", &config).await?;
/// println!("{} of {} pages recognized", report.recognized_pages, report.total_pages);
/// # Ok(())
/// # }
/// ```
pub async fn convert(
    pdf_path: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    config: &OcrConfig,
) -> Result<RunReport, PdfOcrError> {
    convert_until(pdf_path, out_dir, config, ctrl_c()).await
}

/// Like [`convert`], but stops recognizing when `shutdown` resolves.
pub async fn convert_until(
    pdf_path: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    config: &OcrConfig,
    shutdown: impl Future<Output = ()>,
) -> Result<RunReport, PdfOcrError> {
    let pdf = input::validate_pdf(pdf_path)?;
    info!("Starting OCR run: {}", pdf.display());

    let service = HttpOcrService::from_config(config)?;
    let rasterizer = PdfiumRasterizer::new(
        &pdf,
        config.password.clone(),
        config.max_render_dimension,
    );
    let backend = match &config.progress_path {
        Some(path) => JsonFileBackend::new(path),
        None => JsonFileBackend::beside(&pdf),
    };
    debug!("Progress file: {}", backend.path().display());

    let mut pipeline = Pipeline::new(
        Recognizer::new(service, config),
        rasterizer,
        backend,
        &pdf,
        out_dir.as_ref(),
        config,
    )?;
    pipeline.run(shutdown).await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    pdf_path: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    config: &OcrConfig,
) -> Result<RunReport, PdfOcrError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PdfOcrError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(pdf_path, out_dir, config))
}

/// Resolves on Ctrl-C. If the handler cannot be installed it never resolves.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
