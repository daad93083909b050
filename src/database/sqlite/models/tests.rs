use chrono::Utc;

use super::*;

#[test]
fn vector_blob_is_little_endian() {
    let bytes = encode_vector(&[1.0, -2.5]);
    assert_eq!(bytes.len(), 8);
    assert_eq!(&bytes[0..4], &1.0_f32.to_le_bytes());
    assert_eq!(decode_vector(&bytes), Some(vec![1.0, -2.5]));
}

#[test]
fn truncated_blob_is_rejected() {
    assert_eq!(decode_vector(&[0, 0, 128]), None);
    assert_eq!(decode_vector(&[]), Some(Vec::new()));
}

#[test]
fn stored_dimension_must_match_blob() {
    let mut entry = StoredEntry {
        seq: 1,
        id: "alpha.pdf".to_string(),
        raw_text: "The sky is blue.".to_string(),
        metadata: "{}".to_string(),
        vector: encode_vector(&[0.1, 0.2, 0.3]),
        dimension: 3,
        indexed_at: Utc::now().naive_utc(),
    };
    assert_eq!(entry.decode_vector(), Some(vec![0.1, 0.2, 0.3]));

    entry.dimension = 4;
    assert_eq!(entry.decode_vector(), None);
}
