//! Single-pass paginator: walks rooms, then elements, then photos in input
//! order and records positioned draw instructions on a [`Canvas`].
//!
//! Page breaks happen only before a room heading or an element row, with two
//! thresholds. The room threshold sits higher on the page than the element
//! threshold so a heading is never stranded at the bottom without its first
//! element. An element (row, description and photo grid) is measured before
//! it is drawn and moves to the next page as a whole when it would cross the
//! bottom margin. Only an element taller than a full page is split.

use time::{Date, UtcOffset};

use crate::canvas::{Canvas, Document};
use crate::error::ReportError;
use crate::model::{Element, InspectionReport, Room};
use crate::prefetch::{CachedImage, ImageCache};
use crate::text::{Font, measure_text_width, wrap_text};
use crate::types::{Color, Margins, Pt, Rect, Size};

/// Key of the non-rendered pagination markers.
pub const LAYOUT_MARKER: &str = "layout";

pub const REPORT_TITLE: &str = "Rapport d'Inspection";

const LINE_FACTOR: f32 = 1.2;
const HEADING_COLOR: Color = Color::hex(0x1e40af);
const FOOTER_COLOR: Color = Color::hex(0x666666);

const TITLE_SIZE: i32 = 24;
const AGENCY_SIZE: i32 = 14;
const DATE_SIZE: i32 = 12;
const ROOM_SIZE: i32 = 16;
const ROOM_DESCRIPTION_SIZE: i32 = 10;
const ELEMENT_SIZE: i32 = 12;
const ELEMENT_DESCRIPTION_SIZE: i32 = 10;
const FOOTER_SIZE: i32 = 8;

const AFTER_TITLE: i32 = 8;
const AFTER_AGENCY: i32 = 4;
const AFTER_DATE: i32 = 16;
const AFTER_RULE: i32 = 16;
const AFTER_ROOM_HEADING: i32 = 4;
const AFTER_ROOM_DESCRIPTION: i32 = 8;
const AFTER_ELEMENT_ROW: i32 = 2;
const AFTER_ELEMENT_DESCRIPTION: i32 = 4;
const AFTER_ELEMENT: i32 = 8;
const AFTER_ROOM: i32 = 12;
const BEFORE_FOOTER: i32 = 30;

/// Fixed page geometry. Vertical positions are measured from the top edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub page_size: Size,
    pub margins: Margins,
    /// A room heading starting below this line moves to a new page.
    pub room_break_at: Pt,
    /// An element row starting below this line moves to a new page.
    pub element_break_at: Pt,
    pub image_cell: Size,
    pub image_gutter: Pt,
    pub row_gutter: Pt,
    pub grid_top_gap: Pt,
    pub grid_trailing_gap: Pt,
    pub max_images_per_element: usize,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            page_size: Size::a4(),
            margins: Margins::all(50.0),
            room_break_at: Pt::from_i32(680),
            element_break_at: Pt::from_i32(700),
            image_cell: Size::new(120.0, 90.0),
            image_gutter: Pt::from_i32(10),
            row_gutter: Pt::from_i32(10),
            grid_top_gap: Pt::from_i32(4),
            grid_trailing_gap: Pt::from_i32(15),
            max_images_per_element: 4,
        }
    }
}

impl Geometry {
    pub fn content_left(&self) -> Pt {
        self.margins.left
    }

    pub fn content_right(&self) -> Pt {
        self.page_size.width - self.margins.right
    }

    pub fn content_top(&self) -> Pt {
        self.margins.top
    }

    pub fn content_bottom(&self) -> Pt {
        self.page_size.height - self.margins.bottom
    }

    pub fn usable_width(&self) -> Pt {
        self.content_right() - self.content_left()
    }

    pub fn validate(&self) -> Result<(), ReportError> {
        let margins = &self.margins;
        for (name, value) in [
            ("margin", margins.top.min(margins.right).min(margins.bottom).min(margins.left)),
            ("image_gutter", self.image_gutter),
            ("row_gutter", self.row_gutter),
            ("grid_top_gap", self.grid_top_gap),
            ("grid_trailing_gap", self.grid_trailing_gap),
        ] {
            if value < Pt::ZERO {
                return Err(ReportError::Configuration(format!(
                    "{name} must not be negative"
                )));
            }
        }
        let top = self.content_top();
        let bottom = self.content_bottom();
        if self.usable_width() <= Pt::ZERO || bottom <= top {
            return Err(ReportError::Configuration(
                "margins leave no room for content".to_string(),
            ));
        }
        for (name, value) in [
            ("room_break_at", self.room_break_at),
            ("element_break_at", self.element_break_at),
        ] {
            if value <= top || value >= bottom {
                return Err(ReportError::Configuration(format!(
                    "{name} must lie between the top and bottom margins"
                )));
            }
        }
        if self.room_break_at >= self.element_break_at {
            return Err(ReportError::Configuration(
                "room_break_at must sit above element_break_at".to_string(),
            ));
        }
        if self.image_cell.width <= Pt::ZERO
            || self.image_cell.height <= Pt::ZERO
            || self.image_cell.width > self.usable_width()
            || self.image_cell.height > bottom - top
        {
            return Err(ReportError::Configuration(
                "image cell must fit inside the content area".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct LayoutEngine {
    geometry: Geometry,
}

impl LayoutEngine {
    pub fn new(geometry: Geometry) -> Self {
        Self { geometry }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Lays the report out. Pure: identical inputs give identical documents.
    /// `generated_on` feeds the footer line.
    pub fn layout(
        &self,
        report: &InspectionReport,
        agency_name: &str,
        images: &ImageCache,
        generated_on: Date,
    ) -> Document {
        let mut pager = Pager::new(&self.geometry);

        // Dates at the edge of the representable range keep their own offset.
        let inspected_on = report
            .date
            .checked_to_offset(UtcOffset::UTC)
            .unwrap_or(report.date)
            .date();
        pager.centered_line(Font::HelveticaBold, TITLE_SIZE, Color::BLACK, REPORT_TITLE);
        pager.gap(AFTER_TITLE);
        pager.centered_line(
            Font::Helvetica,
            AGENCY_SIZE,
            Color::BLACK,
            &format!("Agence: {agency_name}"),
        );
        pager.gap(AFTER_AGENCY);
        pager.centered_line(
            Font::Helvetica,
            DATE_SIZE,
            Color::BLACK,
            &format!("Date: {}", format_long_date(inspected_on)),
        );
        pager.gap(AFTER_DATE);
        pager.rule();
        pager.gap(AFTER_RULE);

        for (room_index, room) in report.rooms.iter().enumerate() {
            self.layout_room(&mut pager, room_index + 1, room, images);
        }

        pager.gap(BEFORE_FOOTER);
        pager.keep_on_page(line_height(FOOTER_SIZE));
        pager.centered_line(
            Font::Helvetica,
            FOOTER_SIZE,
            FOOTER_COLOR,
            &format!(
                "Rapport genere automatiquement le {}",
                format_numeric_date(generated_on)
            ),
        );

        pager.canvas.finish()
    }

    fn layout_room(&self, pager: &mut Pager<'_>, number: usize, room: &Room, images: &ImageCache) {
        let mut opening = line_height(ROOM_SIZE) + Pt::from_i32(AFTER_ROOM_HEADING);
        if let Some(description) = room.description() {
            opening += self.wrapped_height(Font::HelveticaOblique, ROOM_DESCRIPTION_SIZE, description)
                + Pt::from_i32(AFTER_ROOM_DESCRIPTION);
        }
        if let Some(first) = room.elements.first() {
            opening += self.element_extent(first, self.resolved(first, images).len());
        }
        pager.keep_together(opening, self.geometry.room_break_at);

        pager.canvas.meta(LAYOUT_MARKER, format!("room {number}"));
        pager.line(
            Font::HelveticaBold,
            ROOM_SIZE,
            HEADING_COLOR,
            &format!("{number}. {}", room.name),
        );
        pager.gap(AFTER_ROOM_HEADING);

        if let Some(description) = room.description() {
            pager.wrapped(
                Font::HelveticaOblique,
                ROOM_DESCRIPTION_SIZE,
                Color::BLACK,
                description,
            );
            pager.gap(AFTER_ROOM_DESCRIPTION);
        }

        for (element_index, element) in room.elements.iter().enumerate() {
            let resolved = self.resolved(element, images);
            pager.keep_together(
                self.element_extent(element, resolved.len()),
                self.geometry.element_break_at,
            );
            pager.canvas.meta(
                LAYOUT_MARKER,
                format!("room {number} element {}", element_index + 1),
            );
            self.layout_element(pager, element, &resolved);
        }

        pager.gap(AFTER_ROOM);
    }

    fn resolved<'a>(&self, element: &'a Element, images: &'a ImageCache) -> Vec<(&'a str, &'a CachedImage)> {
        element
            .rendered_references(self.geometry.max_images_per_element)
            .filter_map(|reference| images.get(reference).map(|image| (reference, image)))
            .collect()
    }

    /// Height from the top of the element row to the bottom of its last
    /// drawn line or photo row.
    fn element_extent(&self, element: &Element, image_count: usize) -> Pt {
        let mut extent = line_height(ELEMENT_SIZE);
        let description = element.description();
        if description.is_none() && image_count == 0 {
            return extent;
        }
        extent += Pt::from_i32(AFTER_ELEMENT_ROW);
        if let Some(description) = description {
            extent += self.wrapped_height(Font::Helvetica, ELEMENT_DESCRIPTION_SIZE, description);
            if image_count > 0 {
                extent += Pt::from_i32(AFTER_ELEMENT_DESCRIPTION);
            }
        }
        if image_count > 0 {
            let cell = self.geometry.image_cell.height;
            let rows = image_count.div_ceil(self.grid_columns());
            extent += self.geometry.grid_top_gap + cell;
            for _ in 1..rows {
                extent += self.geometry.row_gutter + cell;
            }
        }
        extent
    }

    fn wrapped_height(&self, font: Font, size: i32, text: &str) -> Pt {
        wrap_text(font, Pt::from_i32(size), text, self.geometry.usable_width())
            .iter()
            .map(|_| line_height(size))
            .sum()
    }

    /// Cells per grid row, at least one and never more than the per-element cap.
    fn grid_columns(&self) -> usize {
        let geometry = &self.geometry;
        let step = geometry.image_cell.width + geometry.image_gutter;
        let limit = geometry.max_images_per_element.max(1);
        let mut columns = 1;
        let mut right = geometry.content_left() + geometry.image_cell.width;
        while columns < limit && right + step <= geometry.content_right() {
            columns += 1;
            right += step;
        }
        columns
    }

    fn layout_element(&self, pager: &mut Pager<'_>, element: &Element, resolved: &[(&str, &CachedImage)]) {
        let size = Pt::from_i32(ELEMENT_SIZE);
        let style = element.state.style();
        let mut x = self.geometry.content_left();
        for (font, color, text) in [
            (Font::HelveticaBold, Color::BLACK, element.name.as_str()),
            (Font::Helvetica, Color::BLACK, " - "),
            (Font::Helvetica, style.color, style.label),
        ] {
            pager.canvas.set_font(font, size);
            pager.canvas.set_fill_color(color);
            pager.canvas.draw_string(x, pager.y, text);
            x += measure_text_width(font, size, text);
        }
        pager.canvas.set_fill_color(Color::BLACK);
        pager.y += line_height(ELEMENT_SIZE);
        pager.gap(AFTER_ELEMENT_ROW);

        if let Some(description) = element.description() {
            pager.wrapped(
                Font::Helvetica,
                ELEMENT_DESCRIPTION_SIZE,
                Color::BLACK,
                description,
            );
            pager.gap(AFTER_ELEMENT_DESCRIPTION);
        }

        if !resolved.is_empty() {
            self.layout_grid(pager, resolved);
        }

        pager.gap(AFTER_ELEMENT);
    }

    // The bottom-margin checks below only fire for an element taller than a
    // whole page; anything smaller was already moved by `keep_together`.
    fn layout_grid(&self, pager: &mut Pager<'_>, resolved: &[(&str, &CachedImage)]) {
        let geometry = &self.geometry;
        let cell = geometry.image_cell;
        let left = geometry.content_left();
        let columns = self.grid_columns();

        let mut row_top = pager.y + geometry.grid_top_gap;
        if row_top + cell.height > geometry.content_bottom() {
            pager.new_page();
            row_top = pager.y;
        }
        let mut x = left;
        for (index, (reference, image)) in resolved.iter().enumerate() {
            if index > 0 && index % columns == 0 {
                x = left;
                row_top = row_top + cell.height + geometry.row_gutter;
                if row_top + cell.height > geometry.content_bottom() {
                    pager.new_page();
                    row_top = pager.y;
                }
            }
            let slot = Rect {
                x,
                y: row_top,
                width: cell.width,
                height: cell.height,
            };
            let placed = fit_inside(slot, image.pixel_size);
            pager
                .canvas
                .draw_image(placed.x, placed.y, placed.width, placed.height, *reference);
            x = x + cell.width + geometry.image_gutter;
        }
        pager.y = row_top + cell.height + geometry.grid_trailing_gap;
    }
}

/// Vertical cursor over the canvas being recorded.
struct Pager<'g> {
    canvas: Canvas,
    geometry: &'g Geometry,
    y: Pt,
}

impl<'g> Pager<'g> {
    fn new(geometry: &'g Geometry) -> Self {
        Self {
            canvas: Canvas::new(geometry.page_size),
            geometry,
            y: geometry.content_top(),
        }
    }

    fn new_page(&mut self) {
        self.canvas.show_page();
        self.y = self.geometry.content_top();
    }

    fn gap(&mut self, amount: i32) {
        self.y += Pt::from_i32(amount);
    }

    /// Moves a block of `extent` to a new page when the cursor is past
    /// `break_at`, or when the block would cross the bottom margin but fits
    /// on an empty page.
    fn keep_together(&mut self, extent: Pt, break_at: Pt) {
        let top = self.geometry.content_top();
        let bottom = self.geometry.content_bottom();
        let crosses = self.y + extent > bottom && top + extent <= bottom;
        if self.y > top && (self.y > break_at || crosses) {
            self.new_page();
        }
    }

    /// Starts a new page when `height` would not fit above the bottom margin.
    fn keep_on_page(&mut self, height: Pt) {
        if self.y > self.geometry.content_top()
            && self.y + height > self.geometry.content_bottom()
        {
            self.new_page();
        }
    }

    fn line(&mut self, font: Font, size: i32, color: Color, text: &str) {
        self.draw_line_at(self.geometry.content_left(), font, size, color, text);
    }

    fn centered_line(&mut self, font: Font, size: i32, color: Color, text: &str) {
        let width = measure_text_width(font, Pt::from_i32(size), text);
        let x = self.geometry.content_left() + (self.geometry.usable_width() - width).max(Pt::ZERO) / 2;
        self.draw_line_at(x, font, size, color, text);
    }

    fn wrapped(&mut self, font: Font, size: i32, color: Color, text: &str) {
        let lines = wrap_text(font, Pt::from_i32(size), text, self.geometry.usable_width());
        for line in lines {
            self.keep_on_page(line_height(size));
            self.line(font, size, color, &line);
        }
    }

    fn draw_line_at(&mut self, x: Pt, font: Font, size: i32, color: Color, text: &str) {
        self.canvas.set_font(font, Pt::from_i32(size));
        self.canvas.set_fill_color(color);
        self.canvas.draw_string(x, self.y, text);
        self.y += line_height(size);
    }

    fn rule(&mut self) {
        self.canvas.set_stroke_color(Color::BLACK);
        self.canvas.set_line_width(Pt::from_i32(1));
        self.canvas.move_to(self.geometry.content_left(), self.y);
        self.canvas.line_to(self.geometry.content_right(), self.y);
        self.canvas.stroke();
    }
}

fn line_height(size: i32) -> Pt {
    Pt::from_i32(size) * LINE_FACTOR
}

/// Largest rectangle with the image's aspect ratio that fits `slot`,
/// centered in it. Unknown dimensions fill the slot.
fn fit_inside(slot: Rect, pixel_size: Option<(u32, u32)>) -> Rect {
    let Some((width_px, height_px)) = pixel_size else {
        return slot;
    };
    let scale = (slot.width.to_f32() / width_px as f32).min(slot.height.to_f32() / height_px as f32);
    let width = Pt::from_f32(width_px as f32 * scale).min(slot.width);
    let height = Pt::from_f32(height_px as f32 * scale).min(slot.height);
    Rect {
        x: slot.x + (slot.width - width) / 2,
        y: slot.y + (slot.height - height) / 2,
        width,
        height,
    }
}

const MONTHS_FR: [&str; 12] = [
    "janvier",
    "février",
    "mars",
    "avril",
    "mai",
    "juin",
    "juillet",
    "août",
    "septembre",
    "octobre",
    "novembre",
    "décembre",
];

/// `14 mars 2026`
pub fn format_long_date(date: Date) -> String {
    format!(
        "{:02} {} {}",
        date.day(),
        MONTHS_FR[u8::from(date.month()) as usize - 1],
        date.year()
    )
}

/// `14/03/2026`
pub fn format_numeric_date(date: Date) -> String {
    format!(
        "{:02}/{:02}/{}",
        date.day(),
        u8::from(date.month()),
        date.year()
    )
}
