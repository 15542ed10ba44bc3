//! Renders property-inspection walkthroughs into paginated PDF reports.
//!
//! A report is produced in four stages: photos referenced by the inspection
//! are fetched concurrently into an [`ImageCache`], the [`LayoutEngine`] turns
//! rooms and elements into positioned draw instructions with deterministic
//! page breaks, and the PDF encoder serializes the resulting [`Document`].
//! [`ReportGenerator`] drives the whole pipeline and publishes the output
//! through an [`ObjectStore`].

mod agency;
mod canvas;
mod config;
mod error;
mod inspect;
mod layout;
mod model;
mod pdf;
mod prefetch;
mod report;
mod resolver;
mod storage;
pub mod telemetry;
mod text;
mod types;

pub use agency::{AgencyDirectory, MemoryAgencyDirectory, UNKNOWN_AGENCY, display_name};
pub use canvas::{Canvas, Command, Document, Page};
pub use config::{DEFAULT_BUCKET, LogFormat, LoggingSettings, ReportConfig};
pub use error::{ReportError, StoreError};
pub use inspect::{InspectError, InspectErrorCode, InspectReport, inspect_pdf_bytes, inspect_pdf_path};
pub use layout::{
    Geometry, LAYOUT_MARKER, LayoutEngine, REPORT_TITLE, format_long_date, format_numeric_date,
};
pub use model::{
    Element, ElementState, InspectionRecord, InspectionReport, InspectionStatus, Room, StateStyle,
};
pub use pdf::{PdfOptions, encode as encode_pdf, write_document as write_pdf};
pub use prefetch::{CachedImage, ImageCache, needed_references, prefetch};
pub use report::{GeneratedReport, RenderedReport, ReportGenerator, ReportGeneratorBuilder};
pub use resolver::{ImageReference, ImageResolver};
pub use storage::{
    FsObjectStore, MemoryObjectStore, ObjectStore, PDF_CONTENT_TYPE, StoredObject, report_key,
};
pub use text::{Font, measure_text_width, wrap_text};
pub use types::{Color, Margins, Pt, Rect, Size};
