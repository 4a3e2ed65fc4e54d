//! Read-only filtering of recipient collections.

use serde::{Deserialize, Serialize};

use crate::recipient::RecipientRecord;
use crate::status::EconomicStatus;
use crate::types::DbId;

/// Criteria for narrowing a recipient collection.
///
/// Every criterion that is set must match (AND). The free-text search
/// matches case-insensitively as a substring of the head-of-household name,
/// the district name, or the village name (OR across those fields). A blank
/// search is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipientFilter {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub district_id: Option<DbId>,
    #[serde(default)]
    pub aid_type_id: Option<DbId>,
    #[serde(default)]
    pub status: Option<EconomicStatus>,
}

impl RecipientFilter {
    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn district(mut self, id: DbId) -> Self {
        self.district_id = Some(id);
        self
    }

    pub fn aid_type(mut self, id: DbId) -> Self {
        self.aid_type_id = Some(id);
        self
    }

    pub fn status(mut self, status: EconomicStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// `true` when no criterion would exclude anything.
    pub fn is_empty(&self) -> bool {
        self.needle().is_none()
            && self.district_id.is_none()
            && self.aid_type_id.is_none()
            && self.status.is_none()
    }

    /// Whether a single record satisfies every criterion.
    pub fn matches(&self, record: &RecipientRecord) -> bool {
        self.matches_with(record, self.needle().as_deref())
    }

    fn matches_with(&self, record: &RecipientRecord, needle: Option<&str>) -> bool {
        if let Some(needle) = needle {
            let hit = [&record.head_name, &record.district_name, &record.village]
                .iter()
                .any(|field| field.to_lowercase().contains(needle));
            if !hit {
                return false;
            }
        }
        if self.district_id.is_some_and(|id| id != record.district_id) {
            return false;
        }
        if self.aid_type_id.is_some_and(|id| id != record.aid_type_id) {
            return false;
        }
        // Unknown status never satisfies a status criterion.
        if let Some(wanted) = self.status {
            if record.economic_status() != Some(wanted) {
                return false;
            }
        }
        true
    }

    /// Lowercased, trimmed search text, or `None` if blank.
    fn needle(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }
}

/// Records matching `filter`, in input order.
pub fn filter_records(records: &[RecipientRecord], filter: &RecipientFilter) -> Vec<RecipientRecord> {
    if filter.is_empty() {
        return records.to_vec();
    }
    let needle = filter.needle();
    records
        .iter()
        .filter(|r| filter.matches_with(r, needle.as_deref()))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: DbId, name: &str, district: &str, village: &str, income: &str) -> RecipientRecord {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "nama_kepala_keluarga": name,
            "jumlah_anggota_keluarga": 3,
            "kecamatan": if district == "Bojonegoro" { 1 } else { 2 },
            "kecamatan_nama": district,
            "nama_desa": village,
            "alamat": "-",
            "jenis_bantuan": id % 2 + 1,
            "jenis_bantuan_nama": "BPNT",
            "pendapatan_per_bulan": income,
            "latitude": null,
            "longitude": null,
            "photos": [],
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap()
    }

    fn fixture() -> Vec<RecipientRecord> {
        vec![
            record(1, "Sutrisno", "Bojonegoro", "Kadipaten", "800000"),
            record(2, "Siti Aminah", "Kapas", "Bendo", "1500000"),
            record(3, "Bambang", "Kapas", "Tanjungharjo", "2500000"),
            record(4, "Wahyuni", "Dander", "Ngulanan", "garbage"),
        ]
    }

    fn ids(records: &[RecipientRecord]) -> Vec<DbId> {
        records.iter().map(|r| r.id).collect()
    }

    #[test]
    fn empty_filter_returns_everything_in_order() {
        let all = fixture();
        assert_eq!(ids(&filter_records(&all, &RecipientFilter::default())), vec![1, 2, 3, 4]);
        let blank = RecipientFilter::default().search("   ");
        assert!(blank.is_empty());
        assert_eq!(filter_records(&all, &blank).len(), 4);
    }

    #[test]
    fn search_matches_district_case_insensitively() {
        let hits = filter_records(&fixture(), &RecipientFilter::default().search("bojonegoro"));
        assert_eq!(ids(&hits), vec![1]);
    }

    #[test]
    fn search_covers_name_and_village() {
        let all = fixture();
        assert_eq!(ids(&filter_records(&all, &RecipientFilter::default().search("AMINAH"))), vec![2]);
        assert_eq!(ids(&filter_records(&all, &RecipientFilter::default().search("harjo"))), vec![3]);
        assert!(filter_records(&all, &RecipientFilter::default().search("surabaya")).is_empty());
    }

    #[test]
    fn criteria_combine_with_and() {
        let all = fixture();
        let f = RecipientFilter::default().search("kapas").district(2).aid_type(2);
        // id 3 -> aid type 3 % 2 + 1 = 2
        assert_eq!(ids(&filter_records(&all, &f)), vec![3]);
    }

    #[test]
    fn status_filter_uses_derived_status() {
        let all = fixture();
        let f = RecipientFilter::default().status(EconomicStatus::Poor);
        assert_eq!(ids(&filter_records(&all, &f)), vec![2]);
        let f = RecipientFilter::default().status(EconomicStatus::Vulnerable);
        assert_eq!(ids(&filter_records(&all, &f)), vec![3]);
    }

    #[test]
    fn unknown_status_never_matches_status_filter() {
        let all = fixture();
        for status in EconomicStatus::ALL {
            let hits = filter_records(&all, &RecipientFilter::default().status(status));
            assert!(!ids(&hits).contains(&4));
        }
    }
}
