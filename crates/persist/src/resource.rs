use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};

use crate::depot::{Depot, DepotError};

/// Current envelope schema version.
pub const RESOURCE_SCHEMA_VERSION: u32 = 1;

/// A value that can be stored in a depot.
pub trait Resource: Serialize + DeserializeOwned {
    /// Tag stored in the envelope and checked on load.
    const KIND: &'static str;
    /// File extension (without the dot) used for this resource type.
    const EXTENSION: &'static str;
}

#[derive(Debug, Serialize, Deserialize)]
struct ResourceEnvelope {
    schema_version: u32,
    kind: String,
    sha256: String,
    payload: Vec<u8>,
}

/// Load and verify a resource.
pub fn load_resource<T: Resource>(depot: &dyn Depot, path: &str) -> Result<T, DepotError> {
    let data = depot.read(path)?;
    if is_json_path(path) {
        return Ok(serde_json::from_slice(&data)?);
    }

    let envelope: ResourceEnvelope = cbor_deserialize(&zstd_decompress(&data)?)?;
    if envelope.schema_version != RESOURCE_SCHEMA_VERSION {
        return Err(DepotError::SchemaMismatch {
            file_version: envelope.schema_version,
            expected_version: RESOURCE_SCHEMA_VERSION,
        });
    }
    if envelope.kind != T::KIND {
        return Err(DepotError::KindMismatch {
            path: path.to_string(),
            expected: T::KIND,
            actual: envelope.kind,
        });
    }
    let actual = sha256_hex(&envelope.payload);
    if actual != envelope.sha256 {
        return Err(DepotError::IntegrityMismatch {
            path: path.to_string(),
            expected: envelope.sha256,
            actual,
        });
    }

    tracing::trace!(path, kind = T::KIND, bytes = data.len(), "loaded resource");
    cbor_deserialize(&envelope.payload)
}

/// Serialize and store a resource. Existing files are overwritten.
pub fn save_resource<T: Resource>(depot: &dyn Depot, value: &T, path: &str) -> Result<(), DepotError> {
    if is_json_path(path) {
        let data = serde_json::to_vec_pretty(value)?;
        return depot.write(path, &data);
    }

    let payload = cbor_serialize(value)?;
    let envelope = ResourceEnvelope {
        schema_version: RESOURCE_SCHEMA_VERSION,
        kind: T::KIND.to_string(),
        sha256: sha256_hex(&payload),
        payload,
    };
    let compressed = zstd_compress(&cbor_serialize(&envelope)?)?;
    tracing::trace!(path, kind = T::KIND, bytes = compressed.len(), "saving resource");
    depot.write(path, &compressed)
}

fn is_json_path(path: &str) -> bool {
    path.ends_with(".json")
}

fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, DepotError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| DepotError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn cbor_deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<T, DepotError> {
    ciborium::from_reader(data).map_err(|e| DepotError::CborDecode(e.to_string()))
}

fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, DepotError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, DepotError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryDepot;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
        weight: f32,
    }

    impl Resource for Note {
        const KIND: &'static str = "note";
        const EXTENSION: &'static str = "note";
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Other {
        text: String,
    }

    impl Resource for Other {
        const KIND: &'static str = "other";
        const EXTENSION: &'static str = "other";
    }

    fn note() -> Note {
        Note {
            text: "hello".into(),
            weight: 2.5,
        }
    }

    #[test]
    fn binary_save_and_load() {
        let depot = MemoryDepot::new();
        save_resource(&depot, &note(), "notes/a.note").unwrap();
        let loaded: Note = load_resource(&depot, "notes/a.note").unwrap();
        assert_eq!(loaded, note());
    }

    #[test]
    fn json_paths_are_plain_json() {
        let depot = MemoryDepot::new();
        save_resource(&depot, &note(), "notes/a.json").unwrap();
        let text = String::from_utf8(depot.read("notes/a.json").unwrap()).unwrap();
        assert!(text.contains("\"hello\""));
        let loaded: Note = load_resource(&depot, "notes/a.json").unwrap();
        assert_eq!(loaded, note());
    }

    #[test]
    fn kind_mismatch_fails_closed() {
        let depot = MemoryDepot::new();
        save_resource(&depot, &note(), "notes/a.note").unwrap();
        match load_resource::<Other>(&depot, "notes/a.note") {
            Err(DepotError::KindMismatch { expected, actual, .. }) => {
                assert_eq!(expected, "other");
                assert_eq!(actual, "note");
            }
            other => panic!("expected KindMismatch, got {other:?}"),
        }
    }

    #[test]
    fn tampered_payload_fails_integrity() {
        let depot = MemoryDepot::new();
        let payload = cbor_serialize(&note()).unwrap();
        let envelope = ResourceEnvelope {
            schema_version: RESOURCE_SCHEMA_VERSION,
            kind: Note::KIND.into(),
            sha256: "0000".into(),
            payload,
        };
        let data = zstd_compress(&cbor_serialize(&envelope).unwrap()).unwrap();
        depot.write("notes/bad.note", &data).unwrap();
        assert!(matches!(
            load_resource::<Note>(&depot, "notes/bad.note"),
            Err(DepotError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn schema_mismatch_fails_closed() {
        let depot = MemoryDepot::new();
        let payload = cbor_serialize(&note()).unwrap();
        let envelope = ResourceEnvelope {
            schema_version: 999,
            kind: Note::KIND.into(),
            sha256: sha256_hex(&payload),
            payload,
        };
        let data = zstd_compress(&cbor_serialize(&envelope).unwrap()).unwrap();
        depot.write("notes/old.note", &data).unwrap();
        match load_resource::<Note>(&depot, "notes/old.note") {
            Err(DepotError::SchemaMismatch {
                file_version,
                expected_version,
            }) => {
                assert_eq!(file_version, 999);
                assert_eq!(expected_version, RESOURCE_SCHEMA_VERSION);
            }
            other => panic!("expected SchemaMismatch, got {other:?}"),
        }
    }

    #[test]
    fn missing_resource_is_not_found() {
        let depot = MemoryDepot::new();
        assert!(matches!(
            load_resource::<Note>(&depot, "nope.note"),
            Err(DepotError::NotFound(_))
        ));
    }
}
