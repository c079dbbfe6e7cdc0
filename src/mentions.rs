use crate::models::{MentionRecord, PullRequestItem};

/// Merges per-member "this pull request mentions me" search results into
/// one record per distinct item URL.
///
/// Records are kept in first-seen order and owned by the collector; the
/// only mutation after insertion is appending to a record's mention list
/// (get-or-insert, no aliasing). The stored item snapshot is the one from
/// the first sighting; later sightings never overwrite it.
#[derive(Debug, Default)]
pub struct MentionCollector {
    records: Vec<MentionRecord>,
}

impl MentionCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one member's search results into the collection.
    ///
    /// Members are processed in caller-supplied order, which fixes both
    /// the first-seen snapshot per item and the order mentions accumulate.
    /// Duplicate items within one member's results append the member
    /// twice; member names are taken as given and never deduplicated.
    pub fn add(&mut self, member: &str, items: Vec<PullRequestItem>) {
        for item in items {
            match self.records.iter_mut().find(|r| r.item.url == item.url) {
                Some(record) => record.mentioned.push(member.to_string()),
                None => self.records.push(MentionRecord {
                    item,
                    mentioned: vec![member.to_string()],
                }),
            }
        }
    }

    /// Collected records, in first-seen order.
    pub fn records(&self) -> &[MentionRecord] {
        &self.records
    }

    pub fn get(&self, url: &str) -> Option<&MentionRecord> {
        self.records.iter().find(|r| r.item.url == url)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
