//! Typed settings: built-in defaults, optionally overlaid by a TOML file,
//! then by CLI flags in the binary.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::level_filters::LevelFilter;

use crate::error::ReportError;
use crate::layout::Geometry;
use crate::types::{Margins, Pt, Size};

pub const DEFAULT_BUCKET: &str = "inspection-reports";
const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_RENDER_DEADLINE_SECS: u64 = 60;
const DEFAULT_URL_EXPIRY_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct ReportConfig {
    pub geometry: Geometry,
    /// Bound on each individual image fetch.
    pub fetch_timeout: Duration,
    /// Bound on a whole render, prefetch included.
    pub render_deadline: Duration,
    /// Destination bucket for generated reports.
    pub bucket: String,
    pub url_expiry: Duration,
    pub user_agent: String,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Compact,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            geometry: Geometry::default(),
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            render_deadline: Duration::from_secs(DEFAULT_RENDER_DEADLINE_SECS),
            bucket: DEFAULT_BUCKET.to_string(),
            url_expiry: Duration::from_secs(DEFAULT_URL_EXPIRY_SECS),
            user_agent: concat!("inspection-report/", env!("CARGO_PKG_VERSION")).to_string(),
            logging: LoggingSettings::default(),
        }
    }
}

impl ReportConfig {
    /// Parses a TOML document; absent keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ReportError> {
        let raw: RawConfig = toml::from_str(raw)
            .map_err(|err| ReportError::Configuration(err.to_string()))?;
        let config = build_config(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ReportError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            ReportError::Configuration(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ReportError> {
        self.geometry.validate()?;
        if self.geometry.max_images_per_element == 0 {
            return invalid("images.max_per_element", "must be at least 1");
        }
        if self.fetch_timeout.is_zero() {
            return invalid("fetch_timeout_ms", "must be positive");
        }
        if self.render_deadline.is_zero() {
            return invalid("render_deadline_secs", "must be positive");
        }
        if self.url_expiry.is_zero() {
            return invalid("url_expiry_secs", "must be positive");
        }
        if self.bucket.trim().is_empty() {
            return invalid("bucket", "must not be empty");
        }
        Ok(())
    }
}

fn invalid<T>(key: &str, reason: &str) -> Result<T, ReportError> {
    Err(ReportError::Configuration(format!("`{key}` {reason}")))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    bucket: Option<String>,
    fetch_timeout_ms: Option<u64>,
    render_deadline_secs: Option<u64>,
    url_expiry_secs: Option<u64>,
    user_agent: Option<String>,
    page: RawPage,
    images: RawImages,
    logging: RawLogging,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawPage {
    size: Option<String>,
    margin: Option<f32>,
    room_break_at: Option<f32>,
    element_break_at: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawImages {
    cell_width: Option<f32>,
    cell_height: Option<f32>,
    gutter: Option<f32>,
    row_gutter: Option<f32>,
    grid_top_gap: Option<f32>,
    trailing_gap: Option<f32>,
    max_per_element: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawLogging {
    level: Option<String>,
    format: Option<LogFormat>,
}

fn build_config(raw: RawConfig) -> Result<ReportConfig, ReportError> {
    let defaults = ReportConfig::default();
    Ok(ReportConfig {
        geometry: build_geometry(raw.page, raw.images)?,
        fetch_timeout: raw
            .fetch_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.fetch_timeout),
        render_deadline: raw
            .render_deadline_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.render_deadline),
        bucket: raw.bucket.unwrap_or(defaults.bucket),
        url_expiry: raw
            .url_expiry_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.url_expiry),
        user_agent: raw.user_agent.unwrap_or(defaults.user_agent),
        logging: build_logging(raw.logging)?,
    })
}

fn build_geometry(page: RawPage, images: RawImages) -> Result<Geometry, ReportError> {
    let defaults = Geometry::default();
    let page_size = match page.size.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("a4") => Size::a4(),
        Some("letter") => Size::letter(),
        Some(other) => return invalid("page.size", &format!("`{other}` is not a4 or letter")),
    };
    let pt = |value: Option<f32>, default: Pt| value.map(Pt::from_f32).unwrap_or(default);
    let cell = Size {
        width: pt(images.cell_width, defaults.image_cell.width),
        height: pt(images.cell_height, defaults.image_cell.height),
    };
    Ok(Geometry {
        page_size,
        margins: page.margin.map(Margins::all).unwrap_or(defaults.margins),
        room_break_at: pt(page.room_break_at, defaults.room_break_at),
        element_break_at: pt(page.element_break_at, defaults.element_break_at),
        image_cell: cell,
        image_gutter: pt(images.gutter, defaults.image_gutter),
        row_gutter: pt(images.row_gutter, defaults.row_gutter),
        grid_top_gap: pt(images.grid_top_gap, defaults.grid_top_gap),
        grid_trailing_gap: pt(images.trailing_gap, defaults.grid_trailing_gap),
        max_images_per_element: images
            .max_per_element
            .unwrap_or(defaults.max_images_per_element),
    })
}

fn build_logging(raw: RawLogging) -> Result<LoggingSettings, ReportError> {
    let level = match raw.level {
        Some(level) => LevelFilter::from_str(level.trim())
            .map_err(|_| ReportError::Configuration(format!("unknown log level `{level}`")))?,
        None => LevelFilter::INFO,
    };
    Ok(LoggingSettings {
        level,
        format: raw.format.unwrap_or_default(),
    })
}
