/// Key layout for the Fjall partitions
///
/// - `snapshots`: snapshot:{name} -> task map blob (JSON)
/// - `metadata`: meta:{key} -> value (string)

pub const SNAPSHOTS_PARTITION: &str = "snapshots";
pub const METADATA_PARTITION: &str = "metadata";

/// Name of the single task-map snapshot
pub const TASK_MAP: &str = "tasks";

/// Metadata key recording the unix time of the last save
pub const META_LAST_SAVE: &str = "last_save";

/// Encode a snapshot key: snapshot:{name}
pub fn encode_snapshot_key(name: &str) -> Vec<u8> {
    format!("snapshot:{}", name).into_bytes()
}

/// Encode a metadata key: meta:{key}
pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_key_encoding() {
        assert_eq!(encode_snapshot_key(TASK_MAP), b"snapshot:tasks");
    }

    #[test]
    fn test_meta_key_encoding() {
        assert_eq!(encode_meta_key(META_LAST_SAVE), b"meta:last_save");
    }
}
