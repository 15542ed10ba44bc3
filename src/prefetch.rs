use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use futures::future::join_all;
use tracing::info;

use crate::model::InspectionReport;
use crate::resolver::ImageResolver;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedImage {
    pub data: Bytes,
    /// Pixel dimensions when the header could be read.
    pub pixel_size: Option<(u32, u32)>,
}

/// Resolved image content keyed by the original reference string. Built once
/// per report and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ImageCache {
    entries: HashMap<String, CachedImage>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores resolved content. Empty payloads are dropped so that layout
    /// treats them exactly like unavailable images.
    pub fn insert(&mut self, reference: impl Into<String>, data: Bytes) {
        if data.is_empty() {
            return;
        }
        let pixel_size = imagesize::blob_size(&data)
            .ok()
            .and_then(|size| Some((u32::try_from(size.width).ok()?, u32::try_from(size.height).ok()?)))
            .filter(|(w, h)| *w > 0 && *h > 0);
        self.entries
            .insert(reference.into(), CachedImage { data, pixel_size });
    }

    pub fn get(&self, reference: &str) -> Option<&CachedImage> {
        self.entries.get(reference)
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.entries.contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Distinct references the report can display, in first-seen order: at most
/// `max_per_element` from each element.
pub fn needed_references(report: &InspectionReport, max_per_element: usize) -> Vec<&str> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for room in &report.rooms {
        for element in &room.elements {
            for reference in element.rendered_references(max_per_element) {
                if seen.insert(reference) {
                    out.push(reference);
                }
            }
        }
    }
    out
}

/// Resolves every needed reference concurrently and waits for all of them
/// to settle. Failed references are absent from the returned cache.
pub async fn prefetch(
    resolver: &ImageResolver,
    report: &InspectionReport,
    max_per_element: usize,
) -> ImageCache {
    let references = needed_references(report, max_per_element);
    let requested = references.len();
    let fetches = references.into_iter().map(|reference| async move {
        let data = resolver.resolve(reference).await;
        (reference, data)
    });

    let mut cache = ImageCache::new();
    for (reference, data) in join_all(fetches).await {
        if let Some(data) = data {
            cache.insert(reference, data);
        }
    }
    info!(
        requested,
        resolved = cache.len(),
        "image prefetch complete"
    );
    cache
}
