use std::collections::HashMap;
use std::io::{self, Write};

use fixed::types::I32F32;
use image::GenericImageView;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::canvas::{Command, Document, Page};
use crate::error::ReportError;
use crate::prefetch::{CachedImage, ImageCache};
use crate::text::Font;
use crate::types::{Color, Pt};

const PDF_HEADER: &[u8] = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n";

const PDF_CATALOG_ID: usize = 1;
const PDF_PAGES_ID: usize = 2;
const PDF_RESOURCES_ID: usize = 3;

#[derive(Debug, Clone)]
pub struct PdfOptions {
    pub title: Option<String>,
    pub producer: String,
    // When true, identical image bytes referenced under different names are
    // embedded once and shared through a single XObject.
    pub reuse_xobjects: bool,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            title: None,
            producer: concat!("inspection-report ", env!("CARGO_PKG_VERSION")).to_string(),
            reuse_xobjects: true,
        }
    }
}

/// Serializes a laid-out document. The output carries no timestamps, so the
/// same document, images and options always give the same bytes.
pub fn encode(
    document: &Document,
    images: &ImageCache,
    options: &PdfOptions,
) -> Result<Vec<u8>, ReportError> {
    let mut out = Vec::new();
    write_document(document, images, options, &mut out)?;
    Ok(out)
}

pub fn write_document<W: Write>(
    document: &Document,
    images: &ImageCache,
    options: &PdfOptions,
    writer: &mut W,
) -> Result<usize, ReportError> {
    let sources = collect_image_sources(document);
    let mut pdf = PdfWriter::new(writer)?;

    let fonts = pdf.write_fonts()?;
    let (xobjects, image_names) = pdf.write_images(&sources, images, options.reuse_xobjects)?;

    let page_height = document.page_size.height;
    let media_box = format!(
        "[0 0 {} {}]",
        fmt_pt(document.page_size.width),
        fmt_pt(page_height)
    );
    let mut kids = Vec::with_capacity(document.pages.len());
    for page in &document.pages {
        let content = render_page(page, page_height, &image_names)?;
        let content_id = pdf.alloc_id();
        pdf.write_stream(content_id, "", content.as_bytes())?;
        let page_id = pdf.alloc_id();
        pdf.write_object(
            page_id,
            &format!(
                "<< /Type /Page /Parent {} 0 R /MediaBox {} /Resources {} 0 R /Contents {} 0 R >>",
                PDF_PAGES_ID, media_box, PDF_RESOURCES_ID, content_id
            ),
        )?;
        kids.push(page_id);
    }

    let kids_refs = kids
        .iter()
        .map(|id| format!("{} 0 R", id))
        .collect::<Vec<_>>()
        .join(" ");
    pdf.write_object(
        PDF_PAGES_ID,
        &format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids_refs, kids.len()),
    )?;

    let mut resources = format!(
        "<< /ProcSet [/PDF /Text /ImageB /ImageC] /Font {}",
        resource_dict(&fonts)
    );
    if !xobjects.is_empty() {
        resources.push_str(&format!(" /XObject {}", resource_dict(&xobjects)));
    }
    resources.push_str(" >>");
    pdf.write_object(PDF_RESOURCES_ID, &resources)?;

    let info_id = pdf.alloc_id();
    pdf.write_object(info_id, &info_object(options))?;

    let mut catalog = format!("<< /Type /Catalog /Pages {} 0 R", PDF_PAGES_ID);
    if options.title.is_some() {
        catalog.push_str(" /ViewerPreferences << /DisplayDocTitle true >>");
    }
    catalog.push_str(" >>");
    pdf.write_object(PDF_CATALOG_ID, &catalog)?;

    let total_bytes = pdf.finish(info_id)?;
    debug!(
        pages = kids.len(),
        images = xobjects.len(),
        bytes = total_bytes,
        "pdf encoded"
    );
    Ok(total_bytes)
}

struct PdfWriter<'a, W: Write> {
    writer: &'a mut W,
    offset: usize,
    offsets: Vec<usize>, // index by object id; 0 is the free object.
    next_id: usize,
}

impl<'a, W: Write> PdfWriter<'a, W> {
    fn new(writer: &'a mut W) -> io::Result<Self> {
        let mut offset = 0;
        write_bytes(writer, PDF_HEADER, &mut offset)?;
        Ok(Self {
            writer,
            offset,
            offsets: vec![0; PDF_RESOURCES_ID + 1],
            next_id: PDF_RESOURCES_ID + 1,
        })
    }

    fn alloc_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record_offset(&mut self, obj_id: usize) {
        if self.offsets.len() <= obj_id {
            self.offsets.resize(obj_id + 1, 0);
        }
        self.offsets[obj_id] = self.offset;
    }

    fn write_object(&mut self, obj_id: usize, body: &str) -> io::Result<()> {
        self.record_offset(obj_id);
        write_bytes(self.writer, format!("{} 0 obj\n", obj_id).as_bytes(), &mut self.offset)?;
        write_bytes(self.writer, body.as_bytes(), &mut self.offset)?;
        write_bytes(self.writer, b"\nendobj\n", &mut self.offset)
    }

    /// Writes a stream object; `entries` are extra dictionary entries.
    fn write_stream(&mut self, obj_id: usize, entries: &str, data: &[u8]) -> io::Result<()> {
        self.record_offset(obj_id);
        let dict = if entries.is_empty() {
            format!("<< /Length {} >>", data.len())
        } else {
            format!("<< {} /Length {} >>", entries, data.len())
        };
        write_bytes(
            self.writer,
            format!("{} 0 obj\n{}\nstream\n", obj_id, dict).as_bytes(),
            &mut self.offset,
        )?;
        write_bytes(self.writer, data, &mut self.offset)?;
        write_bytes(self.writer, b"\nendstream\nendobj\n", &mut self.offset)
    }

    fn write_fonts(&mut self) -> io::Result<Vec<(String, usize)>> {
        let mut resources = Vec::with_capacity(Font::ALL.len());
        for font in Font::ALL {
            let id = self.alloc_id();
            self.write_object(id, &font_object(font))?;
            resources.push((font.resource_name().to_string(), id));
        }
        Ok(resources)
    }

    /// Embeds every referenced image once, in first-appearance order, and
    /// returns the XObject resources plus the reference to resource name map.
    fn write_images(
        &mut self,
        sources: &[&str],
        images: &ImageCache,
        reuse_xobjects: bool,
    ) -> Result<(Vec<(String, usize)>, HashMap<String, String>), ReportError> {
        let mut unique: Vec<(&str, &CachedImage)> = Vec::new();
        let mut name_map = HashMap::new();
        let mut content_map: HashMap<[u8; 32], String> = HashMap::new();

        for &source in sources {
            let cached = images.get(source).ok_or_else(|| {
                ReportError::encode(format!("image {source} was drawn but never resolved"))
            })?;
            if reuse_xobjects {
                let digest: [u8; 32] = Sha256::digest(&cached.data).into();
                if let Some(name) = content_map.get(&digest) {
                    name_map.insert(source.to_string(), name.clone());
                    continue;
                }
                content_map.insert(digest, format!("Im{}", unique.len() + 1));
            }
            name_map.insert(source.to_string(), format!("Im{}", unique.len() + 1));
            unique.push((source, cached));
        }

        let decoded: Vec<ImageData> = unique
            .par_iter()
            .map(|(source, cached)| {
                decode_image_bytes(&cached.data).map_err(|err| ReportError::UnsupportedImage {
                    reference: source.to_string(),
                    message: err.to_string(),
                })
            })
            .collect::<Result<_, _>>()?;

        let mut resources = Vec::with_capacity(decoded.len());
        for (index, image) in decoded.iter().enumerate() {
            let smask_id = match image.alpha.as_deref() {
                Some(alpha) => {
                    let id = self.alloc_id();
                    self.write_stream(id, &image_smask_entries(image), alpha)?;
                    Some(id)
                }
                None => None,
            };
            let obj_id = self.alloc_id();
            self.write_stream(obj_id, &image_entries(image, smask_id), &image.data)?;
            resources.push((format!("Im{}", index + 1), obj_id));
        }
        Ok((resources, name_map))
    }

    fn finish(self, info_id: usize) -> io::Result<usize> {
        let Self {
            writer,
            mut offset,
            offsets,
            next_id,
        } = self;
        let total_objects = next_id.saturating_sub(1);
        let xref_start = offset;
        write_bytes(
            writer,
            format!("xref\n0 {}\n", total_objects + 1).as_bytes(),
            &mut offset,
        )?;
        write_bytes(writer, b"0000000000 65535 f \n", &mut offset)?;
        for id in 1..=total_objects {
            let obj_offset = offsets.get(id).copied().unwrap_or(0);
            write_bytes(
                writer,
                format!("{:010} 00000 n \n", obj_offset).as_bytes(),
                &mut offset,
            )?;
        }
        let trailer = format!(
            "trailer\n<< /Size {} /Root {} 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF",
            total_objects + 1,
            PDF_CATALOG_ID,
            info_id,
            xref_start
        );
        write_bytes(writer, trailer.as_bytes(), &mut offset)?;
        Ok(offset)
    }
}

fn write_bytes<W: Write>(writer: &mut W, data: &[u8], offset: &mut usize) -> io::Result<()> {
    writer.write_all(data)?;
    *offset += data.len();
    Ok(())
}

fn collect_image_sources(document: &Document) -> Vec<&str> {
    let mut seen = std::collections::HashSet::new();
    let mut sources = Vec::new();
    for page in &document.pages {
        for cmd in &page.commands {
            if let Command::DrawImage { resource_id, .. } = cmd {
                if seen.insert(resource_id.as_str()) {
                    sources.push(resource_id.as_str());
                }
            }
        }
    }
    sources
}

fn render_page(
    page: &Page,
    page_height: Pt,
    image_names: &HashMap<String, String>,
) -> Result<String, ReportError> {
    let mut out = String::new();
    let mut current_font = Font::Helvetica;
    let mut current_font_size = Pt::from_f32(12.0);

    for cmd in &page.commands {
        match cmd {
            Command::Meta { .. } => {}
            Command::SetFillColor(color) => out.push_str(&color_to_pdf_fill(*color)),
            Command::SetStrokeColor(color) => out.push_str(&color_to_pdf_stroke(*color)),
            Command::SetLineWidth(width) => {
                out.push_str(&format!("{} w\n", fmt_pt(*width)));
            }
            Command::SetFont(font) => current_font = *font,
            Command::SetFontSize(size) => current_font_size = *size,
            Command::MoveTo { x, y } => {
                out.push_str(&format!("{} {} m\n", fmt_pt(*x), fmt_pt(page_height - *y)));
            }
            Command::LineTo { x, y } => {
                out.push_str(&format!("{} {} l\n", fmt_pt(*x), fmt_pt(page_height - *y)));
            }
            Command::Stroke => out.push_str("S\n"),
            Command::DrawString { x, y, text } => {
                let encoded = encode_winansi_pdf_string(text);
                if encoded.replaced > 0 {
                    debug!(
                        font = current_font.base_name(),
                        replaced = encoded.replaced,
                        "characters outside WinAnsi replaced"
                    );
                }
                out.push_str("BT\n");
                out.push_str(&format!(
                    "/{} {} Tf\n",
                    current_font.resource_name(),
                    fmt_pt(current_font_size)
                ));
                out.push_str(&format!(
                    "{} {} Td\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - current_font_size)
                ));
                out.push_str(&format!("({}) Tj\n", encoded.text));
                out.push_str("ET\n");
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                let name = image_names.get(resource_id).ok_or_else(|| {
                    ReportError::encode(format!("no image resource for {resource_id}"))
                })?;
                let draw_y = page_height - *y - *height;
                out.push_str("q\n");
                out.push_str(&format!(
                    "{} 0 0 {} {} {} cm\n",
                    fmt_pt(*width),
                    fmt_pt(*height),
                    fmt_pt(*x),
                    fmt_pt(draw_y)
                ));
                out.push_str(&format!("/{} Do\n", name));
                out.push_str("Q\n");
            }
        }
    }
    Ok(out)
}

struct ImageData {
    width: u32,
    height: u32,
    color_space: &'static str,
    filter: &'static str,
    data: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

/// JPEG passes through untouched; anything else is re-encoded as RGB with
/// an optional soft mask.
fn decode_image_bytes(data: &[u8]) -> Result<ImageData, image::ImageError> {
    let format = image::guess_format(data)?;
    let decoded = image::load_from_memory_with_format(data, format)?;
    let (width, height) = decoded.dimensions();

    // Baseline gray and RGB JPEGs embed as-is. Anything else (CMYK, YCCK)
    // goes through the decoder's RGB conversion below.
    if format == image::ImageFormat::Jpeg {
        let color_space = match jpeg_components(data) {
            Some(1) => Some("/DeviceGray"),
            Some(3) => Some("/DeviceRGB"),
            _ => None,
        };
        if let Some(color_space) = color_space {
            return Ok(ImageData {
                width,
                height,
                color_space,
                filter: "/DCTDecode",
                data: data.to_vec(),
                alpha: None,
            });
        }
    }

    let rgba = decoded.to_rgba8();
    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    let mut alpha = Vec::with_capacity(width as usize * height as usize);
    let mut has_alpha = false;
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        if a != 255 {
            has_alpha = true;
        }
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }

    Ok(ImageData {
        width,
        height,
        color_space: "/DeviceRGB",
        filter: "/FlateDecode",
        data: flate_compress(&rgb)?,
        alpha: if has_alpha {
            Some(flate_compress(&alpha)?)
        } else {
            None
        },
    })
}

/// Component count declared by the first start-of-frame segment.
fn jpeg_components(data: &[u8]) -> Option<u8> {
    if !data.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
            return data.get(pos + 9).copied();
        }
        let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        pos += 2 + length;
    }
    None
}

fn flate_compress(data: &[u8]) -> io::Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn image_entries(image: &ImageData, smask_id: Option<usize>) -> String {
    let smask = smask_id
        .map(|id| format!(" /SMask {} 0 R", id))
        .unwrap_or_default();
    format!(
        "/Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {} /BitsPerComponent 8 /Filter {}{}",
        image.width, image.height, image.color_space, image.filter, smask
    )
}

fn image_smask_entries(image: &ImageData) -> String {
    format!(
        "/Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceGray /BitsPerComponent 8 /Filter /FlateDecode",
        image.width, image.height
    )
}

fn font_object(font: Font) -> String {
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
        font.base_name()
    )
}

fn resource_dict(entries: &[(String, usize)]) -> String {
    let entries = entries
        .iter()
        .map(|(resource, id)| format!("/{} {} 0 R", resource, id))
        .collect::<Vec<_>>();
    format!("<< {} >>", entries.join(" "))
}

fn info_object(options: &PdfOptions) -> String {
    let mut entries = Vec::new();
    if let Some(title) = options.title.as_deref() {
        entries.push(format!("/Title ({})", encode_winansi_pdf_string(title).text));
    }
    entries.push(format!(
        "/Producer ({})",
        encode_winansi_pdf_string(&options.producer).text
    ));
    format!("<< {} >>", entries.join(" "))
}

struct WinAnsiEncoded {
    text: String,
    replaced: usize,
}

fn encode_winansi_pdf_string(input: &str) -> WinAnsiEncoded {
    let mut out = String::new();
    let mut replaced = 0usize;
    for ch in input.chars() {
        let byte = match ch {
            '\u{0000}'..='\u{007F}' => ch as u8,
            '\u{00A0}'..='\u{00FF}' => ch as u8,
            // WinAnsi extensions (cp1252)
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{0192}' => 0x83,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2020}' => 0x86,
            '\u{2021}' => 0x87,
            '\u{02C6}' => 0x88,
            '\u{2030}' => 0x89,
            '\u{0160}' => 0x8A,
            '\u{2039}' => 0x8B,
            '\u{0152}' => 0x8C,
            '\u{017D}' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{02DC}' => 0x98,
            '\u{2122}' => 0x99,
            '\u{0161}' => 0x9A,
            '\u{203A}' => 0x9B,
            '\u{0153}' => 0x9C,
            '\u{017E}' => 0x9E,
            '\u{0178}' => 0x9F,
            _ => {
                replaced += 1;
                b'?'
            }
        };

        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b if b < 0x20 || b >= 0x7f => out.push_str(&format!("\\{:03o}", b)),
            b => out.push(b as char),
        }
    }

    WinAnsiEncoded {
        text: out,
        replaced,
    }
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let fixed = I32F32::from_num(value);
    let scaled = (fixed * I32F32::from_num(1000)).round();
    let milli: i64 = scaled.to_num();
    format_milli(milli)
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
        while s.ends_with('0') {
            s.pop();
        }
        s
    }
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

fn color_to_pdf_fill(color: Color) -> String {
    format!(
        "{} {} {} rg\n",
        fmt(clamp_unit(color.r)),
        fmt(clamp_unit(color.g)),
        fmt(clamp_unit(color.b))
    )
}

fn color_to_pdf_stroke(color: Color) -> String {
    format!(
        "{} {} {} RG\n",
        fmt(clamp_unit(color.r)),
        fmt(clamp_unit(color.g)),
        fmt(clamp_unit(color.b))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Page;
    use crate::types::Size;
    use bytes::Bytes;
    use std::io::Cursor;

    fn one_page_document(commands: Vec<Command>) -> Document {
        Document {
            page_size: Size::a4(),
            pages: vec![Page { commands }],
        }
    }

    fn count_token(bytes: &[u8], token: &[u8]) -> usize {
        if token.is_empty() || bytes.len() < token.len() {
            return 0;
        }
        bytes.windows(token.len()).filter(|w| *w == token).count()
    }

    fn encoded_image(img: image::DynamicImage, format: image::ImageFormat) -> Bytes {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).expect("encode image");
        Bytes::from(out.into_inner())
    }

    fn png(width: u32, height: u32) -> Bytes {
        encoded_image(
            image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
                width,
                height,
                image::Rgb([10, 120, 200]),
            )),
            image::ImageFormat::Png,
        )
    }

    fn draw_image(resource_id: &str) -> Command {
        Command::DrawImage {
            x: Pt::from_i32(50),
            y: Pt::from_i32(100),
            width: Pt::from_i32(120),
            height: Pt::from_i32(90),
            resource_id: resource_id.to_string(),
        }
    }

    fn draw_string(text: &str) -> Command {
        Command::DrawString {
            x: Pt::from_i32(50),
            y: Pt::from_i32(50),
            text: text.to_string(),
        }
    }

    #[test]
    fn writes_a_complete_pdf_skeleton() {
        let doc = Document {
            page_size: Size::a4(),
            pages: vec![Page::default(), Page::default()],
        };
        let bytes = encode(&doc, &ImageCache::new(), &PdfOptions::default()).expect("pdf");
        assert!(bytes.starts_with(b"%PDF-1.7\n"));
        assert!(bytes.ends_with(b"%%EOF"));
        assert_eq!(count_token(&bytes, b"/Type /Page /Parent"), 2);
        assert_eq!(count_token(&bytes, b"/Count 2"), 1);
        assert_eq!(count_token(&bytes, b"/BaseFont /Helvetica "), 1);
        assert_eq!(count_token(&bytes, b"/BaseFont /Helvetica-Bold "), 1);
        assert_eq!(count_token(&bytes, b"/BaseFont /Helvetica-Oblique "), 1);
        assert_eq!(count_token(&bytes, b"/MediaBox [0 0 595.28 841.89]"), 2);
    }

    #[test]
    fn text_is_placed_from_the_top_edge() {
        let doc = one_page_document(vec![
            Command::SetFont(Font::HelveticaBold),
            Command::SetFontSize(Pt::from_i32(16)),
            draw_string("1. Salon"),
        ]);
        let bytes = encode(&doc, &ImageCache::new(), &PdfOptions::default()).expect("pdf");
        assert_eq!(count_token(&bytes, b"/F2 16 Tf\n50 775.89 Td\n(1. Salon) Tj"), 1);
    }

    #[test]
    fn text_uses_winansi_escapes() {
        let doc = one_page_document(vec![draw_string("Reçu (févr.) \\ ✓")]);
        let bytes = encode(&doc, &ImageCache::new(), &PdfOptions::default()).expect("pdf");
        assert_eq!(
            count_token(&bytes, b"(Re\\347u \\(f\\351vr.\\) \\\\ ?) Tj"),
            1
        );
    }

    #[test]
    fn state_colors_become_fill_operators() {
        let doc = one_page_document(vec![
            Command::SetFillColor(Color::hex(0x3b82f6)),
            draw_string("Bon"),
            Command::SetStrokeColor(Color::BLACK),
        ]);
        let bytes = encode(&doc, &ImageCache::new(), &PdfOptions::default()).expect("pdf");
        assert_eq!(count_token(&bytes, b"0.231 0.51 0.965 rg\n"), 1);
        assert_eq!(count_token(&bytes, b"0 0 0 RG\n"), 1);
        assert_eq!(count_token(&bytes, b"(Bon) Tj"), 1);
    }

    #[test]
    fn markers_never_reach_the_output() {
        let doc = one_page_document(vec![Command::Meta {
            key: "layout".to_string(),
            value: "room 1".to_string(),
        }]);
        let bytes = encode(&doc, &ImageCache::new(), &PdfOptions::default()).expect("pdf");
        assert_eq!(count_token(&bytes, b"room 1"), 0);
        assert_eq!(count_token(&bytes, b"<< /Length 0 >>"), 1);
    }

    #[test]
    fn identical_image_bytes_share_one_xobject() {
        let mut images = ImageCache::new();
        let data = png(8, 6);
        images.insert("s3://photos/a.png", data.clone());
        images.insert("https://cdn.example.com/a.png", data);
        let doc = one_page_document(vec![
            draw_image("s3://photos/a.png"),
            draw_image("https://cdn.example.com/a.png"),
            draw_image("s3://photos/a.png"),
        ]);
        let bytes = encode(&doc, &images, &PdfOptions::default()).expect("pdf");
        assert_eq!(count_token(&bytes, b"/Subtype /Image"), 1);
        assert_eq!(count_token(&bytes, b"/Im1 Do"), 3);
        assert_eq!(count_token(&bytes, b"120 0 0 90 50 651.89 cm"), 3);

        let options = PdfOptions {
            reuse_xobjects: false,
            ..PdfOptions::default()
        };
        let bytes = encode(&doc, &images, &options).expect("pdf");
        assert_eq!(count_token(&bytes, b"/Subtype /Image"), 2);
    }

    #[test]
    fn jpeg_passes_through_and_alpha_gets_a_soft_mask() {
        let jpeg = encoded_image(
            image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
                16,
                16,
                image::Rgb([200, 30, 30]),
            )),
            image::ImageFormat::Jpeg,
        );
        let translucent = encoded_image(
            image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
                4,
                4,
                image::Rgba([0, 0, 0, 128]),
            )),
            image::ImageFormat::Png,
        );
        let mut images = ImageCache::new();
        images.insert("s3://p/photo.jpg", jpeg.clone());
        images.insert("s3://p/overlay.png", translucent);
        let doc = one_page_document(vec![
            draw_image("s3://p/photo.jpg"),
            draw_image("s3://p/overlay.png"),
        ]);
        let bytes = encode(&doc, &images, &PdfOptions::default()).expect("pdf");
        assert_eq!(count_token(&bytes, b"/Filter /DCTDecode"), 1);
        assert_eq!(count_token(&bytes, &jpeg), 1);
        assert_eq!(count_token(&bytes, b"/SMask "), 1);
        assert_eq!(count_token(&bytes, b"/ColorSpace /DeviceGray"), 1);
    }

    #[test]
    fn jpeg_component_count_comes_from_the_frame_header() {
        let rgb = encoded_image(
            image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(8, 8, image::Rgb([1, 2, 3]))),
            image::ImageFormat::Jpeg,
        );
        let gray = encoded_image(
            image::DynamicImage::ImageLuma8(image::GrayImage::from_pixel(8, 8, image::Luma([9]))),
            image::ImageFormat::Jpeg,
        );
        assert_eq!(jpeg_components(&rgb), Some(3));
        assert_eq!(jpeg_components(&gray), Some(1));

        // SOI, an empty APP14 segment, then a progressive 4-component frame.
        let cmyk = [
            0xFF, 0xD8, 0xFF, 0xEE, 0x00, 0x02, 0xFF, 0xC2, 0x00, 0x14, 0x08, 0x00, 0x10, 0x00,
            0x10, 0x04,
        ];
        assert_eq!(jpeg_components(&cmyk), Some(4));
        assert_eq!(jpeg_components(b"\x89PNG"), None);
        assert_eq!(jpeg_components(&[0xFF, 0xD8, 0xFF]), None);
    }

    #[test]
    fn grayscale_jpeg_keeps_a_gray_color_space() {
        let gray = encoded_image(
            image::DynamicImage::ImageLuma8(image::GrayImage::from_pixel(8, 8, image::Luma([90]))),
            image::ImageFormat::Jpeg,
        );
        let mut images = ImageCache::new();
        images.insert("s3://p/gray.jpg", gray);
        let doc = one_page_document(vec![draw_image("s3://p/gray.jpg")]);
        let bytes = encode(&doc, &images, &PdfOptions::default()).expect("pdf");
        assert_eq!(count_token(&bytes, b"/ColorSpace /DeviceGray /BitsPerComponent 8 /Filter /DCTDecode"), 1);
    }

    #[test]
    fn undecodable_images_fail_the_encode() {
        let mut images = ImageCache::new();
        images.insert("s3://p/broken.png", Bytes::from_static(b"\x89PNG\r\n\x1a\ntruncated"));
        let doc = one_page_document(vec![draw_image("s3://p/broken.png")]);
        let err = encode(&doc, &images, &PdfOptions::default()).expect_err("corrupt image");
        match err {
            ReportError::UnsupportedImage { reference, .. } => {
                assert_eq!(reference, "s3://p/broken.png")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn drawing_an_unresolved_image_is_an_encode_error() {
        let doc = one_page_document(vec![draw_image("s3://p/never-fetched.png")]);
        let err = encode(&doc, &ImageCache::new(), &PdfOptions::default()).expect_err("missing");
        assert!(matches!(err, ReportError::Encode(_)));
    }

    #[test]
    fn output_is_deterministic_and_parseable() {
        let mut images = ImageCache::new();
        images.insert("s3://p/a.png", png(20, 10));
        let doc = Document {
            page_size: Size::a4(),
            pages: vec![
                Page {
                    commands: vec![draw_string("Rapport d'Inspection"), draw_image("s3://p/a.png")],
                },
                Page {
                    commands: vec![draw_string("Rapport genere automatiquement le 19/10/2026")],
                },
            ],
        };
        let options = PdfOptions {
            title: Some("Rapport d'Inspection".to_string()),
            ..PdfOptions::default()
        };
        let first = encode(&doc, &images, &options).expect("pdf");
        let second = encode(&doc, &images, &options).expect("pdf");
        assert_eq!(first, second);

        let parsed = lopdf::Document::load_mem(&first).expect("lopdf parses output");
        assert_eq!(parsed.get_pages().len(), 2);
        assert_eq!(count_token(&first, b"/Title (Rapport d'Inspection)"), 1);
    }

    #[test]
    fn format_milli_trims_trailing_zeros() {
        assert_eq!(format_milli(0), "0");
        assert_eq!(format_milli(841_890), "841.89");
        assert_eq!(format_milli(-1_500), "-1.5");
        assert_eq!(format_milli(12_000), "12");
    }
}
