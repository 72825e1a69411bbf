//! In-process object store with multipart semantics
//!
//! Behaves like an S3-compatible store closely enough to exercise the
//! orchestrator: ULID upload ids, content-derived eTags, minimum part size
//! checks at completion, and strict validation of the completion list. Faults
//! can be injected per operation or per part, and a store built with
//! [`MemoryStore::recording`] keeps a log of every call it receives.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use partwise_core::*;
use tracing::debug;

use crate::store::{ObjectStore, S3_MIN_PART_SIZE};

/// Store operation, used to target faults and count calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Initiate,
    UploadPart,
    Complete,
    Abort,
    Put,
}

/// A call the store received, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Initiate {
        key: ObjectKey,
    },
    UploadPart {
        key: ObjectKey,
        upload_id: UploadId,
        part_number: u32,
        size: u64,
    },
    Complete {
        key: ObjectKey,
        upload_id: UploadId,
        parts: Vec<u32>,
    },
    Abort {
        key: ObjectKey,
        upload_id: UploadId,
    },
    Put {
        key: ObjectKey,
        size: u64,
    },
}

impl StoreCall {
    pub fn op(&self) -> StoreOp {
        match self {
            StoreCall::Initiate { .. } => StoreOp::Initiate,
            StoreCall::UploadPart { .. } => StoreOp::UploadPart,
            StoreCall::Complete { .. } => StoreOp::Complete,
            StoreCall::Abort { .. } => StoreOp::Abort,
            StoreCall::Put { .. } => StoreOp::Put,
        }
    }
}

/// Injected failure
#[derive(Debug, Clone)]
pub struct Fault {
    pub op: StoreOp,
    /// Restrict an `UploadPart` fault to one part number
    pub part_number: Option<u32>,
    pub transient: bool,
    /// How many matching calls fail before the fault clears
    pub times: u32,
}

impl Fault {
    /// Permanent failure of every call to `op`
    pub fn permanent(op: StoreOp) -> Self {
        Fault {
            op,
            part_number: None,
            transient: false,
            times: u32::MAX,
        }
    }

    /// `times` transient failures of `op`, then success
    pub fn transient(op: StoreOp, times: u32) -> Self {
        Fault {
            op,
            part_number: None,
            transient: true,
            times,
        }
    }

    pub fn on_part(mut self, part_number: u32) -> Self {
        self.part_number = Some(part_number);
        self
    }

    fn matches(&self, op: StoreOp, part_number: Option<u32>) -> bool {
        self.times > 0
            && self.op == op
            && (self.part_number.is_none() || self.part_number == part_number)
    }

    fn to_error(&self, op: StoreOp) -> StoreError {
        if self.transient {
            StoreError::Transient(format!("injected transient fault on {:?}", op))
        } else {
            StoreError::Rejected(format!("injected fault on {:?}", op))
        }
    }
}

/// An assembled object
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub e_tag: ETag,
    pub parts: u32,
}

struct PendingUpload {
    key: ObjectKey,
    parts: BTreeMap<u32, (ETag, Bytes)>,
}

#[derive(Default)]
struct Inner {
    uploads: HashMap<UploadId, PendingUpload>,
    objects: BTreeMap<ObjectKey, StoredObject>,
    calls: Vec<StoreCall>,
    faults: Vec<Fault>,
}

impl Inner {
    fn record(&mut self, recording: bool, call: StoreCall) {
        if recording {
            self.calls.push(call);
        }
    }

    /// Consume one matching fault, if any is armed
    fn trip(&mut self, op: StoreOp, part_number: Option<u32>) -> StoreResult<()> {
        if let Some(fault) = self.faults.iter_mut().find(|f| f.matches(op, part_number)) {
            fault.times = fault.times.saturating_sub(1);
            return Err(fault.to_error(op));
        }
        Ok(())
    }
}

/// In-memory multipart object store
pub struct MemoryStore {
    inner: Mutex<Inner>,
    min_part_size: u64,
    recording: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Store enforcing the S3 minimum part size
    pub fn new() -> Self {
        Self::with_min_part_size(S3_MIN_PART_SIZE)
    }

    /// Store with a custom minimum part size, handy for small test inputs
    pub fn with_min_part_size(min_part_size: u64) -> Self {
        MemoryStore {
            inner: Mutex::new(Inner::default()),
            min_part_size,
            recording: false,
        }
    }

    /// Keep a log of every call. The log is never trimmed, so this is for
    /// tests and benches, not a long-running server.
    pub fn recording(mut self) -> Self {
        self.recording = true;
        self
    }

    /// Arm a fault
    pub fn inject(&self, fault: Fault) {
        self.lock().faults.push(fault);
    }

    /// Every call received so far; empty unless the store is recording
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, op: StoreOp) -> usize {
        self.lock().calls.iter().filter(|c| c.op() == op).count()
    }

    /// Read back an assembled object
    pub fn object(&self, key: &ObjectKey) -> Option<StoredObject> {
        self.lock().objects.get(key).cloned()
    }

    /// Uploads initiated but neither completed nor aborted
    pub fn pending_uploads(&self) -> usize {
        self.lock().uploads.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn object_e_tag(data: &[u8]) -> ETag {
        ETag::new(format!("\"{}\"", blake3::hash(data).to_hex()))
    }

    fn multipart_e_tag(part_tags: &[&ETag]) -> ETag {
        let mut hasher = blake3::Hasher::new();
        for tag in part_tags {
            hasher.update(tag.as_str().as_bytes());
        }
        ETag::new(format!("\"{}-{}\"", hasher.finalize().to_hex(), part_tags.len()))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn min_part_size(&self) -> u64 {
        self.min_part_size
    }

    async fn initiate_multipart_upload(&self, key: &ObjectKey) -> StoreResult<UploadId> {
        let mut inner = self.lock();
        inner.record(
            self.recording,
            StoreCall::Initiate { key: key.clone() },
        );
        inner.trip(StoreOp::Initiate, None)?;

        let upload_id = UploadId::new(ulid::Ulid::new().to_string());
        inner.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.clone(),
                parts: BTreeMap::new(),
            },
        );
        debug!(key = %key, upload_id = %upload_id, "Memory store opened upload");
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &ObjectKey,
        upload_id: &UploadId,
        part_number: PartNumber,
        data: Bytes,
    ) -> StoreResult<ETag> {
        let mut inner = self.lock();
        inner.record(
            self.recording,
            StoreCall::UploadPart {
                key: key.clone(),
                upload_id: upload_id.clone(),
                part_number: part_number.get(),
                size: data.len() as u64,
            },
        );
        inner.trip(StoreOp::UploadPart, Some(part_number.get()))?;

        let upload = inner
            .uploads
            .get_mut(upload_id)
            .filter(|u| &u.key == key)
            .ok_or_else(|| StoreError::NotFound(format!("NoSuchUpload: {}", upload_id)))?;

        let e_tag = Self::object_e_tag(&data);
        // Re-uploading a part number replaces the earlier part
        upload.parts.insert(part_number.get(), (e_tag.clone(), data));
        Ok(e_tag)
    }

    async fn complete_multipart_upload(
        &self,
        key: &ObjectKey,
        upload_id: &UploadId,
        parts: &[CompletedPart],
    ) -> StoreResult<ObjectReference> {
        let mut inner = self.lock();
        inner.record(
            self.recording,
            StoreCall::Complete {
                key: key.clone(),
                upload_id: upload_id.clone(),
                parts: parts.iter().map(|p| p.part_number.get()).collect(),
            },
        );
        inner.trip(StoreOp::Complete, None)?;

        let upload = inner
            .uploads
            .get(upload_id)
            .filter(|u| &u.key == key)
            .ok_or_else(|| StoreError::NotFound(format!("NoSuchUpload: {}", upload_id)))?;

        if parts.is_empty() {
            return Err(StoreError::Rejected(
                "MalformedXML: completion lists no parts".to_string(),
            ));
        }

        if parts
            .windows(2)
            .any(|w| w[0].part_number >= w[1].part_number)
        {
            return Err(StoreError::Rejected(
                "InvalidPartOrder: parts must be listed in ascending order".to_string(),
            ));
        }

        let mut chunks = Vec::with_capacity(parts.len());
        let mut tags = Vec::with_capacity(parts.len());
        for (index, part) in parts.iter().enumerate() {
            let (e_tag, data) = upload.parts.get(&part.part_number.get()).ok_or_else(|| {
                StoreError::Rejected(format!("InvalidPart: part {} was not uploaded", part.part_number))
            })?;
            if e_tag != &part.e_tag {
                return Err(StoreError::Rejected(format!(
                    "InvalidPart: eTag mismatch for part {}",
                    part.part_number
                )));
            }
            let is_last = index + 1 == parts.len();
            if !is_last && (data.len() as u64) < self.min_part_size {
                return Err(StoreError::Rejected(format!(
                    "EntityTooSmall: part {} is {} bytes, minimum is {}",
                    part.part_number,
                    data.len(),
                    self.min_part_size
                )));
            }
            chunks.push(data.clone());
            tags.push(e_tag);
        }

        let e_tag = Self::multipart_e_tag(&tags);
        let mut assembled = BytesMut::with_capacity(chunks.iter().map(Bytes::len).sum());
        for chunk in &chunks {
            assembled.extend_from_slice(chunk);
        }
        let data = assembled.freeze();
        let size = data.len() as u64;
        let part_count = parts.len() as u32;

        inner.uploads.remove(upload_id);
        inner.objects.insert(
            key.clone(),
            StoredObject {
                data,
                e_tag: e_tag.clone(),
                parts: part_count,
            },
        );

        Ok(ObjectReference {
            key: key.clone(),
            e_tag: Some(e_tag),
            size,
            parts: part_count,
            version_id: None,
        })
    }

    async fn abort_multipart_upload(&self, key: &ObjectKey, upload_id: &UploadId) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.record(
            self.recording,
            StoreCall::Abort {
                key: key.clone(),
                upload_id: upload_id.clone(),
            },
        );
        inner.trip(StoreOp::Abort, None)?;

        let known = inner
            .uploads
            .get(upload_id)
            .is_some_and(|upload| &upload.key == key);
        if !known {
            return Err(StoreError::NotFound(format!("NoSuchUpload: {}", upload_id)));
        }

        inner.uploads.remove(upload_id);
        Ok(())
    }

    async fn put_object(&self, key: &ObjectKey, data: Bytes) -> StoreResult<ObjectReference> {
        let mut inner = self.lock();
        inner.record(
            self.recording,
            StoreCall::Put {
                key: key.clone(),
                size: data.len() as u64,
            },
        );
        inner.trip(StoreOp::Put, None)?;

        let e_tag = Self::object_e_tag(&data);
        let size = data.len() as u64;
        inner.objects.insert(
            key.clone(),
            StoredObject {
                data,
                e_tag: e_tag.clone(),
                parts: 0,
            },
        );

        Ok(ObjectReference {
            key: key.clone(),
            e_tag: Some(e_tag),
            size,
            parts: 0,
            version_id: None,
        })
    }
}
