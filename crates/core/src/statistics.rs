//! Aggregate statistics.
//!
//! [`Statistics`] mirrors the server's `/penerima-bantuan/statistics/`
//! payload. [`StatusBreakdown`] is computed locally from whatever records
//! the client currently holds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::recipient::RecipientRecord;
use crate::status::EconomicStatus;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Server-side statistics payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusShare {
    pub total: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusShares {
    #[serde(rename = "sangat_miskin")]
    pub severely_poor: StatusShare,
    #[serde(rename = "miskin")]
    pub poor: StatusShare,
    #[serde(rename = "rentan_miskin")]
    pub vulnerable: StatusShare,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LocationCoverage {
    #[serde(rename = "total_dengan_koordinat")]
    pub with_coordinates: u64,
    #[serde(rename = "total_kecamatan")]
    pub districts: u64,
    #[serde(rename = "total_desa")]
    pub villages: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DistrictDistribution {
    #[serde(rename = "nama")]
    pub name: String,
    pub total: u64,
    #[serde(rename = "sangat_miskin")]
    pub severely_poor: u64,
    #[serde(rename = "miskin")]
    pub poor: u64,
    #[serde(rename = "rentan_miskin")]
    pub vulnerable: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AidTypeDistribution {
    #[serde(rename = "nama")]
    pub name: String,
    pub total: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VillageDistribution {
    #[serde(rename = "nama_desa")]
    pub village: String,
    #[serde(rename = "kecamatan")]
    pub district: String,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MonthlyTrend {
    #[serde(rename = "bulan")]
    pub month: String,
    pub total: u64,
    #[serde(rename = "sangat_miskin")]
    pub severely_poor: u64,
    #[serde(rename = "miskin")]
    pub poor: u64,
    #[serde(rename = "rentan_miskin")]
    pub vulnerable: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct YearlyTrend {
    #[serde(rename = "tahun")]
    pub year: i32,
    pub total: u64,
    #[serde(rename = "total_anggota")]
    pub family_members: u64,
    #[serde(rename = "rata_rata_pendapatan")]
    pub average_income: f64,
}

/// Dashboard statistics computed by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Statistics {
    #[serde(rename = "total_penerima")]
    pub total_recipients: u64,
    #[serde(rename = "total_anggota_keluarga")]
    pub total_family_members: u64,
    #[serde(rename = "rata_rata_pendapatan")]
    pub average_income: f64,
    #[serde(rename = "total_pendapatan")]
    pub total_income: f64,
    #[serde(rename = "status_ekonomi")]
    pub status: StatusShares,
    #[serde(rename = "lokasi")]
    pub location: LocationCoverage,
    #[serde(rename = "distribusi_kecamatan", default)]
    pub by_district: Vec<DistrictDistribution>,
    #[serde(rename = "distribusi_jenis_bantuan", default)]
    pub by_aid_type: Vec<AidTypeDistribution>,
    #[serde(rename = "distribusi_desa_teratas", default)]
    pub top_villages: Vec<VillageDistribution>,
    #[serde(rename = "trend_bulanan", default)]
    pub monthly: Vec<MonthlyTrend>,
    #[serde(rename = "trend_tahunan", default)]
    pub yearly: Vec<YearlyTrend>,
}

// ---------------------------------------------------------------------------
// Local breakdown
// ---------------------------------------------------------------------------

/// Counts derived from an in-memory record collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusBreakdown {
    pub total: usize,
    pub family_members: u64,
    pub with_coordinates: usize,
    pub by_status: BTreeMap<EconomicStatus, usize>,
    /// Records whose income could not be classified.
    pub unknown_status: usize,
    pub by_district: BTreeMap<DbId, usize>,
}

impl StatusBreakdown {
    pub fn from_records(records: &[RecipientRecord]) -> Self {
        let mut out = Self {
            total: records.len(),
            ..Self::default()
        };
        for record in records {
            out.family_members += u64::from(record.family_members);
            if record.map_position().is_some() {
                out.with_coordinates += 1;
            }
            match record.economic_status() {
                Some(status) => *out.by_status.entry(status).or_default() += 1,
                None => out.unknown_status += 1,
            }
            *out.by_district.entry(record.district_id).or_default() += 1;
        }
        out
    }

    pub fn count(&self, status: EconomicStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}
