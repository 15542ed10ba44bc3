use lopdf::Document as LoDocument;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InspectErrorCode {
    ParseFailed,
    EncryptedUnsupported,
    NoPages,
    Io,
}

impl InspectErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectErrorCode::ParseFailed => "PDF_PARSE_FAILED",
            InspectErrorCode::EncryptedUnsupported => "PDF_ENCRYPTED_UNSUPPORTED",
            InspectErrorCode::NoPages => "PDF_EMPTY_OR_NO_PAGES",
            InspectErrorCode::Io => "PDF_IO_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {message}", .code.as_str())]
pub struct InspectError {
    pub code: InspectErrorCode,
    pub message: String,
}

/// What a produced report looks like once parsed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectReport {
    pub pdf_version: String,
    pub page_count: usize,
    pub file_size_bytes: usize,
    pub title: Option<String>,
}

pub fn inspect_pdf_bytes(bytes: &[u8]) -> Result<InspectReport, InspectError> {
    let pdf = LoDocument::load_mem(bytes).map_err(|err| InspectError {
        code: InspectErrorCode::ParseFailed,
        message: err.to_string(),
    })?;

    if pdf.is_encrypted() {
        return Err(InspectError {
            code: InspectErrorCode::EncryptedUnsupported,
            message: "encrypted pdf is not supported".to_string(),
        });
    }
    let report = InspectReport {
        pdf_version: pdf.version.clone(),
        page_count: pdf.get_pages().len(),
        file_size_bytes: bytes.len(),
        title: document_title(&pdf),
    };
    if report.page_count == 0 {
        return Err(InspectError {
            code: InspectErrorCode::NoPages,
            message: "pdf has no pages".to_string(),
        });
    }
    Ok(report)
}

pub fn inspect_pdf_path(path: &Path) -> Result<InspectReport, InspectError> {
    let data = std::fs::read(path).map_err(|err| InspectError {
        code: InspectErrorCode::Io,
        message: err.to_string(),
    })?;
    inspect_pdf_bytes(&data)
}

fn document_title(pdf: &LoDocument) -> Option<String> {
    let info = pdf.trailer.get(b"Info").ok()?.as_reference().ok()?;
    let title = pdf.get_dictionary(info).ok()?.get(b"Title").ok()?;
    let raw = title.as_str().ok()?;
    // WinAnsi is a superset of Latin-1 for the characters reports use.
    Some(raw.iter().map(|&b| b as char).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Command, Document, Page};
    use crate::pdf::{PdfOptions, encode};
    use crate::prefetch::ImageCache;
    use crate::types::{Pt, Size};

    fn report_bytes(pages: usize, title: Option<&str>) -> Vec<u8> {
        let doc = Document {
            page_size: Size::a4(),
            pages: (0..pages)
                .map(|n| Page {
                    commands: vec![Command::DrawString {
                        x: Pt::from_i32(50),
                        y: Pt::from_i32(50),
                        text: format!("page {n}"),
                    }],
                })
                .collect(),
        };
        let options = PdfOptions {
            title: title.map(str::to_string),
            ..PdfOptions::default()
        };
        encode(&doc, &ImageCache::new(), &options).expect("encode")
    }

    #[test]
    fn inspects_encoder_output() {
        let bytes = report_bytes(3, Some("Rapport d'Inspection"));
        let report = inspect_pdf_bytes(&bytes).expect("inspect");
        assert_eq!(report.pdf_version, "1.7");
        assert_eq!(report.page_count, 3);
        assert_eq!(report.file_size_bytes, bytes.len());
        assert_eq!(report.title.as_deref(), Some("Rapport d'Inspection"));
    }

    #[test]
    fn inspect_reports_parse_failures() {
        let err = inspect_pdf_bytes(b"not a pdf").expect_err("invalid pdf");
        assert_eq!(err.code, InspectErrorCode::ParseFailed);
        assert!(err.to_string().starts_with("PDF_PARSE_FAILED: "));
    }

    #[test]
    fn inspect_path_reads_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, report_bytes(1, None)).expect("write");
        let report = inspect_pdf_path(&path).expect("inspect");
        assert_eq!(report.page_count, 1);
        assert_eq!(report.title, None);

        let err = inspect_pdf_path(&dir.path().join("missing.pdf")).expect_err("missing");
        assert_eq!(err.code, InspectErrorCode::Io);
    }
}
