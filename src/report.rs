//! Report orchestration: validate, prefetch photos, lay out, encode, publish.

use std::sync::Arc;

use bytes::Bytes;
use time::{Date, OffsetDateTime};
use tracing::{debug, info, instrument};

use crate::agency::{self, AgencyDirectory, MemoryAgencyDirectory};
use crate::config::ReportConfig;
use crate::error::ReportError;
use crate::layout::{LayoutEngine, REPORT_TITLE};
use crate::model::{InspectionRecord, InspectionReport};
use crate::pdf::{self, PdfOptions};
use crate::prefetch::prefetch;
use crate::resolver::ImageResolver;
use crate::storage::{ObjectStore, PDF_CONTENT_TYPE, report_key};

/// Output of a single render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedReport {
    pub bytes: Bytes,
    pub page_count: usize,
    pub images_resolved: usize,
}

/// Where a generated report was published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedReport {
    pub bucket: String,
    pub key: String,
    pub byte_len: usize,
    pub page_count: usize,
}

pub struct ReportGenerator {
    config: ReportConfig,
    resolver: ImageResolver,
    store: Arc<dyn ObjectStore>,
    agencies: Arc<dyn AgencyDirectory>,
    pdf_options: PdfOptions,
    generated_on: Option<Date>,
}

#[derive(Clone, Default)]
pub struct ReportGeneratorBuilder {
    config: ReportConfig,
    store: Option<Arc<dyn ObjectStore>>,
    agencies: Option<Arc<dyn AgencyDirectory>>,
    http: Option<reqwest::Client>,
    generated_on: Option<Date>,
}

impl ReportGeneratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ReportConfig) -> Self {
        self.config = config;
        self
    }

    /// Store used both to read `s3://` photos and to publish reports.
    pub fn object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn agency_directory(mut self, agencies: Arc<dyn AgencyDirectory>) -> Self {
        self.agencies = Some(agencies);
        self
    }

    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Pins the footer date instead of reading the clock at render time.
    pub fn generated_on(mut self, date: Date) -> Self {
        self.generated_on = Some(date);
        self
    }

    pub fn build(self) -> Result<ReportGenerator, ReportError> {
        self.config.validate()?;
        let store = self.store.ok_or_else(|| {
            ReportError::Configuration("an object store is required".to_string())
        })?;
        let http = match self.http {
            Some(client) => client,
            None => reqwest::Client::builder()
                .user_agent(self.config.user_agent.as_str())
                .build()
                .map_err(|err| {
                    ReportError::Configuration(format!("failed to build http client: {err}"))
                })?,
        };
        let agencies = self
            .agencies
            .unwrap_or_else(|| Arc::new(MemoryAgencyDirectory::new()));
        let resolver = ImageResolver::new(store.clone(), http, self.config.fetch_timeout);
        Ok(ReportGenerator {
            config: self.config,
            resolver,
            store,
            agencies,
            pdf_options: PdfOptions {
                title: Some(REPORT_TITLE.to_string()),
                ..PdfOptions::default()
            },
            generated_on: self.generated_on,
        })
    }
}

impl ReportGenerator {
    pub fn builder() -> ReportGeneratorBuilder {
        ReportGeneratorBuilder::new()
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Renders one report. Photos that cannot be fetched are left out; every
    /// other failure is fatal. The whole call is bounded by the configured
    /// render deadline.
    pub async fn render(
        &self,
        report: &InspectionReport,
        agency_name: &str,
    ) -> Result<RenderedReport, ReportError> {
        report.validate()?;
        debug!(
            rooms = report.rooms.len(),
            elements = report.element_count(),
            "rendering report"
        );
        let deadline = self.config.render_deadline;
        tokio::time::timeout(deadline, self.render_validated(report, agency_name))
            .await
            .map_err(|_| ReportError::Deadline(deadline))?
    }

    async fn render_validated(
        &self,
        report: &InspectionReport,
        agency_name: &str,
    ) -> Result<RenderedReport, ReportError> {
        let geometry = self.config.geometry;
        let images = prefetch(&self.resolver, report, geometry.max_images_per_element).await;
        let images_resolved = images.len();

        let report = report.clone();
        let agency_name = agency_name.to_string();
        let options = self.pdf_options.clone();
        let generated_on = self
            .generated_on
            .unwrap_or_else(|| OffsetDateTime::now_utc().date());

        // Layout and encoding are CPU-bound.
        let (bytes, page_count) = tokio::task::spawn_blocking(move || {
            let document =
                LayoutEngine::new(geometry).layout(&report, &agency_name, &images, generated_on);
            let bytes = pdf::encode(&document, &images, &options)?;
            Ok::<_, ReportError>((bytes, document.page_count()))
        })
        .await
        .map_err(|err| ReportError::encode(format!("render task failed: {err}")))??;

        info!(
            pages = page_count,
            bytes = bytes.len(),
            images_resolved,
            "report rendered"
        );
        Ok(RenderedReport {
            bytes: Bytes::from(bytes),
            page_count,
            images_resolved,
        })
    }

    /// Full pipeline for a completed inspection: agency lookup, render and
    /// upload. Records whose status is not `DONE` are skipped with `Ok(None)`.
    #[instrument(skip_all, fields(inspection_id = %record.inspection_id))]
    pub async fn generate(
        &self,
        record: &InspectionRecord,
    ) -> Result<Option<GeneratedReport>, ReportError> {
        if !record.is_done() {
            info!(status = ?record.status, "inspection not done, skipping report");
            return Ok(None);
        }

        let agency_name = agency::display_name(self.agencies.as_ref(), &record.agency_id).await;
        info!(
            agency_id = %record.agency_id,
            agency_name = %agency_name,
            "generating report"
        );
        let rendered = self.render(&record.report, &agency_name).await?;

        let bucket = self.config.bucket.clone();
        let key = report_key(&record.agency_id, &record.property_id, &record.inspection_id);
        let byte_len = rendered.bytes.len();
        self.store
            .put_object(&bucket, &key, rendered.bytes, PDF_CONTENT_TYPE)
            .await?;
        info!(bucket = %bucket, key = %key, bytes = byte_len, "report stored");

        Ok(Some(GeneratedReport {
            bucket,
            key,
            byte_len,
            page_count: rendered.page_count,
        }))
    }

    /// Time-limited download URL for a previously generated report.
    pub async fn report_url(
        &self,
        agency_id: &str,
        property_id: &str,
        inspection_id: &str,
    ) -> Result<String, ReportError> {
        let bucket = &self.config.bucket;
        let key = report_key(agency_id, property_id, inspection_id);
        if !self.store.head_object(bucket, &key).await? {
            return Err(ReportError::NotFound { key });
        }
        Ok(self
            .store
            .presign_get(bucket, &key, self.config.url_expiry)
            .await?)
    }
}
