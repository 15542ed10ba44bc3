use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use httpmock::prelude::*;
use inspection_report::{
    InspectionRecord, MemoryAgencyDirectory, MemoryObjectStore, ReportError, ReportGenerator,
    inspect_pdf_bytes,
};
use serde_json::json;
use time::macros::date;

const REPORT_KEY: &str = "inspections/agency-1/prop-2/insp-3.pdf";

fn png(shade: u8) -> Bytes {
    let img = image::RgbImage::from_pixel(32, 24, image::Rgb([shade, 64, 255 - shade]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    Bytes::from(out.into_inner())
}

fn count_token(bytes: &[u8], token: &[u8]) -> usize {
    bytes.windows(token.len()).filter(|w| *w == token).count()
}

fn record(rooms: serde_json::Value) -> InspectionRecord {
    let raw = json!({
        "inspectionId": "insp-3",
        "propertyId": "prop-2",
        "agencyId": "agency-1",
        "status": "DONE",
        "date": "2026-03-14T09:30:00Z",
        "rooms": rooms,
    });
    InspectionRecord::from_json(raw.to_string().as_bytes()).expect("record")
}

fn generator(
    store: Arc<MemoryObjectStore>,
    agencies: MemoryAgencyDirectory,
) -> ReportGenerator {
    ReportGenerator::builder()
        .object_store(store)
        .agency_directory(Arc::new(agencies))
        .generated_on(date!(2026 - 03 - 15))
        .build()
        .expect("generator")
}

async fn stored_report(store: &MemoryObjectStore) -> Bytes {
    store
        .object("inspection-reports", REPORT_KEY)
        .await
        .expect("report stored")
        .body
}

#[tokio::test]
async fn single_element_report_has_one_page_and_colored_label() {
    let store = Arc::new(MemoryObjectStore::new());
    let agencies = MemoryAgencyDirectory::from_iter([("agency-1", "Agence du Port")]);
    let generator = generator(store.clone(), agencies);

    let record = record(json!([
        { "name": "Salon", "elements": [ { "name": "Porte", "state": "GOOD" } ] }
    ]));
    let generated = generator
        .generate(&record)
        .await
        .expect("generate")
        .expect("done inspection");
    assert_eq!(generated.page_count, 1);

    let pdf = stored_report(&store).await;
    assert_eq!(inspect_pdf_bytes(&pdf).expect("inspect").page_count, 1);
    assert_eq!(count_token(&pdf, b"(Agence: Agence du Port) Tj"), 1);
    assert_eq!(count_token(&pdf, b"(Date: 14 mars 2026) Tj"), 1);
    assert_eq!(count_token(&pdf, b"0.231 0.51 0.965 rg\n"), 1);
    assert_eq!(count_token(&pdf, b"(Bon) Tj"), 1);
    assert_eq!(count_token(&pdf, b"/Subtype /Image"), 0);
    assert_eq!(
        count_token(&pdf, b"(Rapport genere automatiquement le 15/03/2026) Tj"),
        1
    );
}

#[tokio::test]
async fn thirty_elements_span_two_pages() {
    let store = Arc::new(MemoryObjectStore::new());
    let generator = generator(store.clone(), MemoryAgencyDirectory::new());
    let elements: Vec<_> = (1..=30)
        .map(|n| json!({ "name": format!("Element {n}"), "state": "NEW" }))
        .collect();
    let record = record(json!([{ "name": "Chambre", "elements": elements }]));

    let generated = generator.generate(&record).await.expect("generate").expect("done");
    assert_eq!(generated.page_count, 2);
    let pdf = stored_report(&store).await;
    assert_eq!(inspect_pdf_bytes(&pdf).expect("inspect").page_count, 2);
    assert_eq!(count_token(&pdf, b"(Neuf) Tj"), 30);
}

#[tokio::test]
async fn photo_grid_caps_at_four_and_skips_unavailable_photos() {
    let server = MockServer::start_async().await;
    let served = server
        .mock_async(|when, then| {
            when.method(GET).path("/photos/d.png");
            then.status(200).body(png(200).to_vec());
        })
        .await;
    let beyond_cap = server
        .mock_async(|when, then| {
            when.method(GET).path("/photos/e.png");
            then.status(404);
        })
        .await;

    let store = Arc::new(MemoryObjectStore::new());
    for (key, shade) in [("a.png", 10), ("b.png", 60), ("c.png", 110), ("f.png", 160)] {
        store.insert("photos", key, png(shade)).await;
    }
    let generator = generator(store.clone(), MemoryAgencyDirectory::new());
    let record = record(json!([{
        "name": "Cuisine",
        "elements": [{
            "name": "Plan de travail",
            "state": "BAD",
            "images": [
                "s3://photos/a.png",
                "s3://photos/b.png",
                "s3://photos/c.png",
                server.url("/photos/d.png"),
                server.url("/photos/e.png"),
                "s3://photos/f.png",
            ],
        }],
    }]));

    generator.generate(&record).await.expect("generate");
    served.assert_async().await;
    assert_eq!(beyond_cap.hits_async().await, 0);

    let pdf = stored_report(&store).await;
    assert_eq!(count_token(&pdf, b"/Subtype /Image"), 4);
    assert_eq!(count_token(&pdf, b" Do\n"), 4);
    assert_eq!(count_token(&pdf, b"(Mauvais) Tj"), 1);
}

#[tokio::test]
async fn unreachable_photos_never_fail_the_report() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/broken.png");
            then.status(500);
        })
        .await;
    let store = Arc::new(MemoryObjectStore::new());
    let generator = generator(store.clone(), MemoryAgencyDirectory::new());
    let record = record(json!([{
        "name": "Entree",
        "description": "Acces principal",
        "elements": [{
            "name": "Sonnette",
            "state": "BROKEN",
            "description": "Ne fonctionne plus",
            "images": [server.url("/broken.png"), "s3://photos/missing.png", "ftp://x/y.png"],
        }],
    }]));

    let generated = generator.generate(&record).await.expect("generate").expect("done");
    assert_eq!(generated.page_count, 1);
    let pdf = stored_report(&store).await;
    assert_eq!(count_token(&pdf, b"/Subtype /Image"), 0);
    assert_eq!(count_token(&pdf, b"(Casse) Tj"), 1);
}

#[tokio::test]
async fn unknown_agency_uses_placeholder_name() {
    let store = Arc::new(MemoryObjectStore::new());
    let generator = generator(store.clone(), MemoryAgencyDirectory::new());
    let record = record(json!([
        { "name": "Salon", "elements": [ { "name": "Mur", "state": "GOOD" } ] }
    ]));
    generator.generate(&record).await.expect("generate");
    let pdf = stored_report(&store).await;
    assert_eq!(count_token(&pdf, b"(Agence: Agence inconnue) Tj"), 1);
}

#[tokio::test]
async fn regenerating_produces_identical_bytes() {
    let store = Arc::new(MemoryObjectStore::new());
    store.insert("photos", "a.png", png(90)).await;
    let generator = generator(store.clone(), MemoryAgencyDirectory::new());
    let record = record(json!([{
        "name": "Salon",
        "elements": [{ "name": "Mur", "state": "GOOD", "images": ["s3://photos/a.png"] }],
    }]));

    generator.generate(&record).await.expect("generate");
    let first = stored_report(&store).await;
    generator.generate(&record).await.expect("generate");
    let second = stored_report(&store).await;
    assert_eq!(first, second);
}

#[test]
fn unknown_states_are_rejected_at_decode_time() {
    let raw = json!({
        "inspectionId": "insp-3",
        "propertyId": "prop-2",
        "agencyId": "agency-1",
        "status": "DONE",
        "date": 1_773_480_600_000_i64,
        "rooms": [{ "name": "Salon", "elements": [{ "name": "Mur", "state": "DAMAGED" }] }],
    });
    let err = InspectionRecord::from_json(raw.to_string().as_bytes()).expect_err("unknown state");
    assert!(matches!(err, ReportError::Decode(_)));
}
