//! Projection of raw member records into the export shape.

use crate::schemas::{MemberRecord, NormalizedRecord};

/// Map one raw record to its flat form. Never fails.
pub fn normalize(record: &MemberRecord) -> NormalizedRecord {
    NormalizedRecord {
        id: record.id,
        first_name: record.first_name.clone(),
        last_name: record.last_name.clone(),
        username: record.username.clone(),
        phone: record.phone.clone(),
        is_bot: record.is_bot.unwrap_or(false),
    }
}

/// Normalize a whole listing, keeping retrieval order.
pub fn normalize_all(records: &[MemberRecord]) -> Vec<NormalizedRecord> {
    records.iter().map(normalize).collect()
}
