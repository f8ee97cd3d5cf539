use std::collections::BTreeMap;

use super::ClaimRecord;

/// Parses a stored bucket. Any structural problem rejects the whole value.
pub fn decode_bucket(raw: &str) -> Result<Vec<ClaimRecord>, serde_json::Error> {
    serde_json::from_str(raw)
}

/// Collapses duplicate landmark entries down to one record each, keeping the
/// first-seen order of landmarks.
pub fn reconcile(records: Vec<ClaimRecord>) -> Vec<ClaimRecord> {
    let mut out: Vec<ClaimRecord> = Vec::with_capacity(records.len());
    let mut index: BTreeMap<String, usize> = BTreeMap::new();
    for record in records {
        match index.get(&record.landmark_id) {
            Some(&slot) => {
                if supersedes(&record, &out[slot]) {
                    out[slot] = record;
                }
            }
            None => {
                index.insert(record.landmark_id.clone(), out.len());
                out.push(record);
            }
        }
    }
    out
}

/// On-chain beats local; between equals the later `claimed_at` wins and ties
/// keep the record already held.
fn supersedes(candidate: &ClaimRecord, held: &ClaimRecord) -> bool {
    (candidate.on_chain, candidate.claimed_at) > (held.on_chain, held.claimed_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: &str, secs: i64, on_chain: bool) -> ClaimRecord {
        ClaimRecord {
            landmark_id: id.into(),
            claimed_at: Utc.timestamp_opt(secs, 0).unwrap(),
            token_id: format!("tok-{id}-{secs}"),
            tx_hash: on_chain.then(|| format!("0x{secs:x}")),
            on_chain,
        }
    }

    #[test]
    fn on_chain_wins_over_newer_local() {
        let merged = reconcile(vec![record("eiffel", 100, true), record("eiffel", 200, false)]);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].on_chain);
        assert_eq!(merged[0].claimed_at.timestamp(), 100);

        let merged = reconcile(vec![record("eiffel", 200, false), record("eiffel", 100, true)]);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].on_chain);
    }

    #[test]
    fn newest_local_wins_when_none_on_chain() {
        let merged = reconcile(vec![
            record("eiffel", 300, false),
            record("eiffel", 100, false),
            record("eiffel", 200, false),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].claimed_at.timestamp(), 300);
    }

    #[test]
    fn equal_records_keep_the_first() {
        let mut second = record("eiffel", 100, false);
        second.token_id = "second".into();
        let merged = reconcile(vec![record("eiffel", 100, false), second]);
        assert_eq!(merged[0].token_id, "tok-eiffel-100");
    }

    #[test]
    fn order_of_first_appearance_is_kept() {
        let merged = reconcile(vec![
            record("b", 1, false),
            record("a", 2, false),
            record("b", 3, false),
        ]);
        let ids: Vec<&str> = merged.iter().map(|r| r.landmark_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn decode_tolerates_missing_optional_fields() {
        let raw = r#"[{"landmarkId":"eiffel","claimedAt":"2024-05-01T12:30:00.000Z","tokenId":"1714566600000-abc"}]"#;
        let records = decode_bucket(raw).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tx_hash, None);
        assert!(!records[0].on_chain);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_bucket("").is_err());
        assert!(decode_bucket("{not json").is_err());
        assert!(decode_bucket(r#"{"landmarkId":"x"}"#).is_err());
        assert!(decode_bucket(r#"[{"landmarkId":"x","claimedAt":"yesterday","tokenId":"t"}]"#).is_err());
    }
}
