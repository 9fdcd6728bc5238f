//! Join of metadata with frequency counts, and top-N selection.

use crate::counter::FrequencyTable;
use crate::models::MetadataRecord;

/// Attach each record's canonical id and post count (0 if absent).
pub fn enrich(table: &FrequencyTable, record: &mut MetadataRecord) {
    let paper_id = record.canonical_id();
    record.tweet_count = Some(paper_id.as_ref().map_or(0, |id| table.get(id)));
    record.paper_id = paper_id;
}

/// Enrich `records`, sort by count descending and keep the first `n`.
///
/// The sort is stable, so equal counts keep their input order.
pub fn rank_top(
    table: &FrequencyTable,
    mut records: Vec<MetadataRecord>,
    n: usize,
) -> Vec<MetadataRecord> {
    for record in &mut records {
        enrich(table, record);
    }
    records.sort_by(|a, b| b.tweet_count.cmp(&a.tweet_count));
    records.truncate(n);
    records
}
