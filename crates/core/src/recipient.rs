//! Recipient records, reference tables, and write DTOs.
//!
//! Field names on the wire follow the aid API; Rust names are English.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::coordinates::{pair_coordinates, Coordinates};
use crate::error::CoreError;
use crate::status::{classify, parse_income, EconomicStatus};
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Entity structs (API resources)
// ---------------------------------------------------------------------------

/// A row from the `kecamatan` (district) lookup table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictRef {
    pub id: DbId,
    #[serde(rename = "nama")]
    pub name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `jenis_bantuan` (aid type) lookup table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AidTypeRef {
    pub id: DbId,
    #[serde(rename = "nama")]
    pub name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A photo attached to a recipient record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: DbId,
    #[serde(rename = "penerima_bantuan")]
    pub recipient_id: DbId,
    pub file_path: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A household receiving social aid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipientRecord {
    pub id: DbId,
    #[serde(rename = "nama_kepala_keluarga")]
    pub head_name: String,
    #[serde(rename = "jumlah_anggota_keluarga")]
    pub family_members: u32,
    #[serde(rename = "kecamatan")]
    pub district_id: DbId,
    #[serde(rename = "kecamatan_nama")]
    pub district_name: String,
    #[serde(rename = "nama_desa")]
    pub village: String,
    #[serde(rename = "alamat")]
    pub address: String,
    #[serde(rename = "jenis_bantuan")]
    pub aid_type_id: DbId,
    #[serde(rename = "jenis_bantuan_nama")]
    pub aid_type_name: String,
    /// Kept as transmitted; parse with [`RecipientRecord::income`].
    #[serde(rename = "pendapatan_per_bulan")]
    pub monthly_income: String,
    #[serde(default)]
    pub latitude: Option<String>,
    #[serde(default)]
    pub longitude: Option<String>,
    #[serde(default)]
    pub photos: Vec<Photo>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl RecipientRecord {
    /// Monthly income as an exact decimal.
    pub fn income(&self) -> Result<Decimal, CoreError> {
        parse_income(&self.monthly_income)
    }

    /// Derived economic status, or `None` when the income is unparsable.
    pub fn economic_status(&self) -> Option<EconomicStatus> {
        self.income().ok().map(classify)
    }

    /// Paired coordinates; see [`pair_coordinates`].
    pub fn coordinates(&self) -> Result<Option<Coordinates>, CoreError> {
        pair_coordinates(
            self.id,
            self.latitude.as_deref(),
            self.longitude.as_deref(),
        )
    }

    /// Coordinates for mapping purposes: malformed pairs count as absent.
    pub fn map_position(&self) -> Option<Coordinates> {
        self.coordinates().ok().flatten()
    }
}

// ---------------------------------------------------------------------------
// DTOs (request payloads)
// ---------------------------------------------------------------------------

/// Body for creating or replacing a recipient record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipientPayload {
    #[serde(rename = "nama_kepala_keluarga")]
    pub head_name: String,
    #[serde(rename = "jumlah_anggota_keluarga")]
    pub family_members: u32,
    #[serde(rename = "kecamatan")]
    pub district_id: DbId,
    #[serde(rename = "nama_desa")]
    pub village: String,
    #[serde(rename = "alamat")]
    pub address: String,
    #[serde(rename = "jenis_bantuan")]
    pub aid_type_id: DbId,
    #[serde(rename = "pendapatan_per_bulan")]
    pub monthly_income: Decimal,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl RecipientPayload {
    /// Prefill an edit form from an existing record.
    ///
    /// Unparsable income becomes zero and malformed coordinates are cleared,
    /// so the form starts from values the API will accept.
    pub fn from_record(record: &RecipientRecord) -> Self {
        let position = record.map_position();
        Self {
            head_name: record.head_name.clone(),
            family_members: record.family_members,
            district_id: record.district_id,
            village: record.village.clone(),
            address: record.address.clone(),
            aid_type_id: record.aid_type_id,
            monthly_income: record.income().unwrap_or(Decimal::ZERO),
            latitude: position.map(|p| p.lat),
            longitude: position.map(|p| p.lng),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
