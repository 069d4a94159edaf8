// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bundle splitting and reassembly.
//!
//! The de-identification service bounds its request size, so oversized
//! Bundles are partitioned into chunks, pseudonymized chunk by chunk, and
//! reassembled. The first pseudonymized chunk becomes the base of the
//! output: it carries the service-assigned Bundle-level fields (replacement
//! `id`, `meta.security` tags) that a field-by-field merge would lose.
//!
//! Under-threshold Bundles take the same path with a single chunk, so both
//! sides of the threshold produce identically-shaped results.

use serde_json::{json, Value};
use thiserror::Error;

/// Approximate serialized cost of the chunk wrapper object.
pub const CHUNK_OVERHEAD_BYTES: usize = 200;

/// Bundle types that carry a `total` field (FHIR R4 invariant bdl-1).
const TOTAL_BEARING_TYPES: [&str; 2] = ["searchset", "history"];

#[derive(Debug, Error)]
pub enum BundleError {
    #[error(
        "resource {resource_type}/{resource_id} is {size} bytes \
         (~{} MiB), too large for the {threshold} byte split threshold; \
         raise services.dimp.bundle_split_threshold_mb, raise the service's \
         request limit, or shrink the resource at the source",
        .size / (1024 * 1024)
    )]
    OversizedResource {
        resource_type: String,
        resource_id: String,
        size: usize,
        threshold: usize,
    },
    #[error("cannot partition a bundle with no entries")]
    CannotPartitionEmpty,
    #[error("reassembly requires at least one pseudonymized chunk")]
    NothingToReassemble,
}

/// Bundle-level fields captured before partitioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleMetadata {
    pub id: String,
    pub bundle_type: String,
    pub timestamp: Option<String>,
}

impl BundleMetadata {
    pub fn of(bundle: &Value) -> Self {
        Self {
            id: bundle
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("bundle")
                .to_string(),
            bundle_type: bundle
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("collection")
                .to_string(),
            timestamp: bundle
                .get("timestamp")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

/// One partition of the original entries, wrapped as a sendable Bundle.
#[derive(Debug, Clone)]
pub struct BundleChunk {
    pub chunk_id: String,
    pub index: usize,
    pub total_chunks: usize,
    pub metadata: BundleMetadata,
    pub bundle: Value,
    pub estimated_size: usize,
}

/// Reassembly result.
#[derive(Debug, Clone)]
pub struct ReassembledBundle {
    pub bundle: Value,
    /// True iff the original was split into more than one chunk.
    pub was_reassembled: bool,
}

/// Byte length of the compact JSON encoding.
///
/// Serializing a `Value` only fails on non-string map keys, which JSON input
/// cannot produce; the fallback is never taken in practice.
pub fn encoded_size(value: &Value) -> usize {
    serde_json::to_vec(value).map(|b| b.len()).unwrap_or(usize::MAX)
}

/// Whether a bundle exceeds the split threshold.
pub fn should_split(bundle: &Value, threshold: usize) -> bool {
    encoded_size(bundle) > threshold
}

/// Partition a Bundle's entries into chunks no larger than `threshold`.
///
/// Order-preserving and greedy: entries are packed into the current chunk
/// until the next one would overflow it. A single entry that cannot fit in
/// any chunk is an error — entries are never split.
///
/// Below the threshold this returns one chunk carrying all entries, so the
/// caller has a single data path.
pub fn split_bundle(bundle: &Value, threshold: usize) -> Result<Vec<BundleChunk>, BundleError> {
    let metadata = BundleMetadata::of(bundle);
    let entries = bundle
        .get("entry")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if !should_split(bundle, threshold) {
        let chunk = build_chunk(&metadata, 0, 1, entries);
        return Ok(vec![chunk]);
    }

    if entries.is_empty() {
        return Err(BundleError::CannotPartitionEmpty);
    }

    let mut partitions: Vec<Vec<Value>> = Vec::new();
    let mut current: Vec<Value> = Vec::new();
    let mut current_size = CHUNK_OVERHEAD_BYTES;

    for entry in entries {
        let entry_size = encoded_size(&entry);
        if entry_size + CHUNK_OVERHEAD_BYTES > threshold {
            let resource = entry.get("resource").unwrap_or(&Value::Null);
            return Err(BundleError::OversizedResource {
                resource_type: resource
                    .get("resourceType")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                resource_id: resource
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                size: entry_size,
                threshold,
            });
        }
        if current_size + entry_size > threshold && !current.is_empty() {
            partitions.push(std::mem::take(&mut current));
            current_size = CHUNK_OVERHEAD_BYTES;
        }
        current_size += entry_size;
        current.push(entry);
    }
    if !current.is_empty() {
        partitions.push(current);
    }

    let total_chunks = partitions.len();
    Ok(partitions
        .into_iter()
        .enumerate()
        .map(|(i, partition)| build_chunk(&metadata, i, total_chunks, partition))
        .collect())
}

fn build_chunk(
    metadata: &BundleMetadata,
    index: usize,
    total_chunks: usize,
    entries: Vec<Value>,
) -> BundleChunk {
    let chunk_id = format!("{}-chunk-{index}", metadata.id);
    let mut bundle = json!({
        "resourceType": "Bundle",
        "id": chunk_id,
        "type": metadata.bundle_type,
    });
    if let Some(ts) = &metadata.timestamp {
        bundle["timestamp"] = Value::String(ts.clone());
    }
    if TOTAL_BEARING_TYPES.contains(&metadata.bundle_type.as_str()) {
        bundle["total"] = Value::from(entries.len());
    }
    bundle["entry"] = Value::Array(entries);

    let estimated_size = encoded_size(&bundle);
    BundleChunk {
        chunk_id,
        index,
        total_chunks,
        metadata: metadata.clone(),
        bundle,
        estimated_size,
    }
}

/// Rebuild one Bundle from the pseudonymized chunk responses, in original
/// chunk order.
///
/// The first response is the base — its `id`, `meta.security`, and any other
/// service-applied Bundle-level fields survive as-is. The remaining
/// responses contribute only their entries. `type` and `timestamp` are
/// re-asserted from the original metadata in case the service touched them;
/// `total` is present only for the bundle types FHIR allows it on.
pub fn reassemble(
    metadata: &BundleMetadata,
    responses: Vec<Value>,
) -> Result<ReassembledBundle, BundleError> {
    let was_reassembled = responses.len() > 1;
    let mut iter = responses.into_iter();
    let mut base = iter.next().ok_or(BundleError::NothingToReassemble)?;

    let mut entries = base
        .get("entry")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for response in iter {
        if let Some(more) = response.get("entry").and_then(Value::as_array) {
            entries.extend(more.iter().cloned());
        }
    }

    base["type"] = Value::String(metadata.bundle_type.clone());
    match &metadata.timestamp {
        Some(ts) => base["timestamp"] = Value::String(ts.clone()),
        None => {
            if let Some(obj) = base.as_object_mut() {
                obj.remove("timestamp");
            }
        }
    }
    if TOTAL_BEARING_TYPES.contains(&metadata.bundle_type.as_str()) {
        base["total"] = Value::from(entries.len());
    } else if let Some(obj) = base.as_object_mut() {
        obj.remove("total");
    }
    base["entry"] = Value::Array(entries);

    Ok(ReassembledBundle {
        bundle: base,
        was_reassembled,
    })
}

#[cfg(test)]
#[path = "bundle_tests.rs"]
mod tests;
