use super::{Fingerprint, InstalledChart, ScanEvent, scan};
use crate::context::Context;
use crate::error::Result;
use crate::models::ChartMeta;
use futures::TryStreamExt;
use std::collections::BTreeMap;
use std::path::PathBuf;
use time::OffsetDateTime;
use tracing::instrument;

/// Everything a full scan found, keyed by [`Fingerprint`] digest.
///
/// Never authoritative: it's a snapshot of the library at `scanned_at` and
/// is rebuilt by scanning again.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LibraryIndex {
    #[cfg_attr(feature = "serde", serde(with = "time::serde::timestamp"))]
    pub scanned_at: OffsetDateTime,
    pub charts: BTreeMap<String, InstalledChart>,
    /// Packages whose fingerprint was already taken by an earlier one.
    pub duplicates: Vec<InstalledChart>,
    pub skipped: Vec<PathBuf>,
}
impl LibraryIndex {
    fn new(scanned_at: OffsetDateTime) -> Self {
        Self { scanned_at, charts: BTreeMap::new(), duplicates: Vec::new(), skipped: Vec::new() }
    }

    fn insert(&mut self, chart: InstalledChart) {
        if self.charts.contains_key(&chart.fingerprint.digest) {
            tracing::debug!(path = %chart.path.display(), fingerprint = %chart.fingerprint, "Duplicate chart");
            self.duplicates.push(chart);
        } else {
            self.charts.insert(chart.fingerprint.digest.clone(), chart);
        }
    }

    pub fn is_installed(&self, meta: &ChartMeta) -> bool {
        self.charts.contains_key(&Fingerprint::new(meta).digest)
    }

    pub fn get(&self, meta: &ChartMeta) -> Option<&InstalledChart> {
        self.charts.get(&Fingerprint::new(meta).digest)
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }

    /// Charts in digest order.
    pub fn iter(&self) -> impl Iterator<Item = &InstalledChart> {
        self.charts.values()
    }
}

/// Runs a full [`scan`] and collects it.
#[instrument(skip_all, fields(library = %ctx.library))]
pub async fn index(ctx: &Context) -> Result<LibraryIndex> {
    let mut index = LibraryIndex::new(OffsetDateTime::now_utc());
    let mut events = std::pin::pin!(scan(ctx));
    while let Some(event) = events.try_next().await? {
        match event {
            ScanEvent::Found(chart) => index.insert(*chart),
            ScanEvent::Skipped(path) => index.skipped.push(path),
            ScanEvent::Started | ScanEvent::Complete(_) => {},
        }
    }
    tracing::info!(charts = index.len(), duplicates = index.duplicates.len(), skipped = index.skipped.len(), "Indexed library");
    Ok(index)
}
