use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::ReportError;
use crate::types::Color;

/// Condition of an inspected element. The set is closed: any other value
/// fails decoding before layout starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementState {
    New,
    Good,
    Bad,
    Broken,
}

impl ElementState {
    pub fn style(self) -> StateStyle {
        match self {
            ElementState::New => StateStyle {
                label: "Neuf",
                color: Color::hex(0x22c55e),
            },
            ElementState::Good => StateStyle {
                label: "Bon",
                color: Color::hex(0x3b82f6),
            },
            ElementState::Bad => StateStyle {
                label: "Mauvais",
                color: Color::hex(0xf97316),
            },
            ElementState::Broken => StateStyle {
                label: "Casse",
                color: Color::hex(0xef4444),
            },
        }
    }
}

/// Display label and color for an element state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateStyle {
    pub label: &'static str,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Element {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub state: ElementState,
    #[serde(default)]
    pub images: Vec<String>,
}

impl Element {
    pub fn new(name: impl Into<String>, state: ElementState) -> Self {
        Self {
            name: name.into(),
            description: None,
            state,
            images: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_images<I, S>(mut self, images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.images = images.into_iter().map(Into::into).collect();
        self
    }

    pub fn description(&self) -> Option<&str> {
        non_blank(self.description.as_deref())
    }

    /// The references that may appear on the page, in input order.
    pub fn rendered_references(&self, max: usize) -> impl Iterator<Item = &str> {
        self.images.iter().take(max).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Room {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub elements: Vec<Element>,
}

impl Room {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            elements: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_element(mut self, element: Element) -> Self {
        self.elements.push(element);
        self
    }

    pub fn description(&self) -> Option<&str> {
        non_blank(self.description.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InspectionReport {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub date: OffsetDateTime,
    #[serde(default)]
    pub rooms: Vec<Room>,
}

impl InspectionReport {
    pub fn new(date: OffsetDateTime) -> Self {
        Self {
            date,
            rooms: Vec::new(),
        }
    }

    pub fn with_room(mut self, room: Room) -> Self {
        self.rooms.push(room);
        self
    }

    /// Rejects records whose required text fields are blank. Positions in
    /// messages are 1-based, matching the printed room numbers.
    pub fn validate(&self) -> Result<(), ReportError> {
        for (room_index, room) in self.rooms.iter().enumerate() {
            if room.name.trim().is_empty() {
                return Err(ReportError::invalid_input(format!(
                    "room {} has no name",
                    room_index + 1
                )));
            }
            for (element_index, element) in room.elements.iter().enumerate() {
                if element.name.trim().is_empty() {
                    return Err(ReportError::invalid_input(format!(
                        "room {} element {} has no name",
                        room_index + 1,
                        element_index + 1
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn element_count(&self) -> usize {
        self.rooms.iter().map(|room| room.elements.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InspectionStatus {
    Done,
    Other(String),
}

impl From<String> for InspectionStatus {
    fn from(value: String) -> Self {
        if value == "DONE" {
            InspectionStatus::Done
        } else {
            InspectionStatus::Other(value)
        }
    }
}

impl<'de> Deserialize<'de> for InspectionStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(InspectionStatus::from)
    }
}

/// An inspection as delivered by the transport: identifiers plus content.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionRecord {
    pub inspection_id: String,
    pub property_id: String,
    pub agency_id: String,
    pub status: InspectionStatus,
    #[serde(flatten)]
    pub report: InspectionReport,
}

impl InspectionRecord {
    pub fn from_json(data: &[u8]) -> Result<Self, ReportError> {
        let record: InspectionRecord = serde_json::from_slice(data)?;
        for (label, value) in [
            ("inspectionId", &record.inspection_id),
            ("propertyId", &record.property_id),
            ("agencyId", &record.agency_id),
        ] {
            if value.trim().is_empty() {
                return Err(ReportError::invalid_input(format!("{label} is empty")));
            }
        }
        Ok(record)
    }

    pub fn is_done(&self) -> bool {
        self.status == InspectionStatus::Done
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<OffsetDateTime, D::Error> {
    use serde::de::Error;

    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Millis(millis) => {
            OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
                .map_err(D::Error::custom)
        }
        RawTimestamp::Text(text) => OffsetDateTime::parse(&text, &Rfc3339).map_err(|err| {
            D::Error::custom(format!("invalid timestamp `{text}`: {err}"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const RECORD: &str = r#"{
        "inspectionId": "insp-1",
        "propertyId": "prop-9",
        "agencyId": "agency-3",
        "status": "DONE",
        "date": "2026-03-14T09:30:00Z",
        "rooms": [
            {
                "name": "Cuisine",
                "description": "Au rez-de-chaussee",
                "elements": [
                    { "name": "Evier", "state": "GOOD", "images": ["s3://photos/a.jpg"] },
                    { "name": "Four", "description": "", "state": "BROKEN" }
                ]
            }
        ]
    }"#;

    #[test]
    fn decodes_transport_record() {
        let record = InspectionRecord::from_json(RECORD.as_bytes()).expect("record");
        assert!(record.is_done());
        assert_eq!(record.agency_id, "agency-3");
        assert_eq!(record.report.date, datetime!(2026-03-14 09:30 UTC));
        let room = &record.report.rooms[0];
        assert_eq!(room.description(), Some("Au rez-de-chaussee"));
        assert_eq!(room.elements[0].state, ElementState::Good);
        assert_eq!(room.elements[1].description(), None);
        assert!(room.elements[1].images.is_empty());
    }

    #[test]
    fn accepts_epoch_millisecond_dates() {
        let json = RECORD.replace("\"2026-03-14T09:30:00Z\"", "1773480600000");
        let record = InspectionRecord::from_json(json.as_bytes()).expect("record");
        assert_eq!(record.report.date, datetime!(2026-03-14 09:30 UTC));
    }

    #[test]
    fn other_statuses_are_kept_verbatim() {
        let json = RECORD.replace("\"DONE\"", "\"IN_PROGRESS\"");
        let record = InspectionRecord::from_json(json.as_bytes()).expect("record");
        assert_eq!(
            record.status,
            InspectionStatus::Other("IN_PROGRESS".to_string())
        );
        assert!(!record.is_done());
    }

    #[test]
    fn unknown_state_is_rejected() {
        let json = RECORD.replace("\"BROKEN\"", "\"DUSTY\"");
        let err = InspectionRecord::from_json(json.as_bytes()).expect_err("closed state set");
        assert!(matches!(err, ReportError::Decode(_)));
    }

    #[test]
    fn missing_room_name_is_rejected() {
        let json = RECORD.replace("\"name\": \"Cuisine\",", "");
        assert!(InspectionRecord::from_json(json.as_bytes()).is_err());
    }

    #[test]
    fn blank_names_fail_validation() {
        let report = InspectionReport::new(datetime!(2026-01-01 0:00 UTC))
            .with_room(Room::new("Salon").with_element(Element::new("Porte", ElementState::New)))
            .with_room(Room::new("Chambre").with_element(Element::new("  ", ElementState::Bad)));
        let err = report.validate().expect_err("blank element name");
        assert_eq!(
            err.to_string(),
            "invalid inspection input: room 2 element 1 has no name"
        );

        let report = InspectionReport::new(datetime!(2026-01-01 0:00 UTC)).with_room(Room::new(""));
        assert!(report.validate().is_err());
    }

    #[test]
    fn empty_identifiers_are_rejected() {
        let json = RECORD.replace("\"prop-9\"", "\"\"");
        let err = InspectionRecord::from_json(json.as_bytes()).expect_err("empty id");
        assert!(err.to_string().contains("propertyId"));
    }

    #[test]
    fn state_styles_match_the_display_table() {
        let good = ElementState::Good.style();
        assert_eq!(good.label, "Bon");
        assert_eq!(good.color, Color::from_hex("#3b82f6").expect("hex"));
        assert_eq!(ElementState::New.style().label, "Neuf");
        assert_eq!(ElementState::Bad.style().label, "Mauvais");
        assert_eq!(ElementState::Broken.style().label, "Casse");
        assert_eq!(ElementState::Broken.style(), ElementState::Broken.style());
    }

    #[test]
    fn only_the_first_four_references_are_rendered() {
        let element = Element::new("Mur", ElementState::Bad)
            .with_images(["a", "b", "c", "d", "e", "f"]);
        let refs: Vec<&str> = element.rendered_references(4).collect();
        assert_eq!(refs, vec!["a", "b", "c", "d"]);
    }
}
