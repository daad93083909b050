#[cfg(test)]
mod tests;

use chrono::NaiveDateTime;
use sqlx::FromRow;

/// One row of the `entries` table
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct StoredEntry {
    pub seq: i64,
    pub id: String,
    pub raw_text: String,
    /// JSON object of string values
    pub metadata: String,
    /// Little-endian `f32` components
    pub vector: Vec<u8>,
    pub dimension: i64,
    pub indexed_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewStoredEntry {
    pub id: String,
    pub raw_text: String,
    pub metadata: String,
    pub vector: Vec<u8>,
    pub dimension: i64,
    pub indexed_at: NaiveDateTime,
}

impl StoredEntry {
    /// Decode the vector blob, or `None` if it does not hold `dimension` floats
    #[inline]
    pub fn decode_vector(&self) -> Option<Vec<f32>> {
        let vector = decode_vector(&self.vector)?;
        (i64::try_from(vector.len()).ok() == Some(self.dimension)).then_some(vector)
    }
}

#[inline]
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|value| value.to_le_bytes()).collect()
}

#[inline]
pub fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }

    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}
