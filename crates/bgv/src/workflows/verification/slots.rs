use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::RecordKind;
use super::errors::{SlotError, ValidationError};
use super::form::FormPayload;

/// Built-in upload targets for address verification. All are mandatory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSlot {
    IdProofOne,
    IdProofTwo,
    HouseImageOne,
    HouseImageTwo,
    Signature,
    Selfie,
}

impl AddressSlot {
    pub const ALL: [AddressSlot; 6] = [
        AddressSlot::IdProofOne,
        AddressSlot::IdProofTwo,
        AddressSlot::HouseImageOne,
        AddressSlot::HouseImageTwo,
        AddressSlot::Signature,
        AddressSlot::Selfie,
    ];

    pub const fn key(self) -> &'static str {
        match self {
            AddressSlot::IdProofOne => "id_proof_one",
            AddressSlot::IdProofTwo => "id_proof_two",
            AddressSlot::HouseImageOne => "house_image_one",
            AddressSlot::HouseImageTwo => "house_image_two",
            AddressSlot::Signature => "signature",
            AddressSlot::Selfie => "selfie",
        }
    }
}

/// Built-in upload targets for document collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollectionSlot {
    Aadhaar,
    Pan,
    DegreeMarksheet,
    AddressProof,
    Passport,
    PassportDeclaration,
    RelievingLetter,
    PaySlip,
    OfferLetter,
    Cv,
    Signature,
}

impl CollectionSlot {
    pub const ALL: [CollectionSlot; 11] = [
        CollectionSlot::Aadhaar,
        CollectionSlot::Pan,
        CollectionSlot::DegreeMarksheet,
        CollectionSlot::AddressProof,
        CollectionSlot::Passport,
        CollectionSlot::PassportDeclaration,
        CollectionSlot::RelievingLetter,
        CollectionSlot::PaySlip,
        CollectionSlot::OfferLetter,
        CollectionSlot::Cv,
        CollectionSlot::Signature,
    ];

    pub const fn key(self) -> &'static str {
        match self {
            CollectionSlot::Aadhaar => "aadhaar",
            CollectionSlot::Pan => "pan",
            CollectionSlot::DegreeMarksheet => "degreeMarksheet",
            CollectionSlot::AddressProof => "addressProof",
            CollectionSlot::Passport => "passport",
            CollectionSlot::PassportDeclaration => "passportDeclaration",
            CollectionSlot::RelievingLetter => "relievingLetter",
            CollectionSlot::PaySlip => "paySlip",
            CollectionSlot::OfferLetter => "offerLetter",
            CollectionSlot::Cv => "cv",
            CollectionSlot::Signature => "signature",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            CollectionSlot::Aadhaar => "Aadhaar Card",
            CollectionSlot::Pan => "PAN Card",
            CollectionSlot::DegreeMarksheet => "Degree / Marksheet",
            CollectionSlot::AddressProof => "Address Proof",
            CollectionSlot::Passport => "Passport",
            CollectionSlot::PassportDeclaration => "Passport Declaration",
            CollectionSlot::RelievingLetter => "Relieving Letter",
            CollectionSlot::PaySlip => "Pay Slip",
            CollectionSlot::OfferLetter => "Offer Letter",
            CollectionSlot::Cv => "CV",
            CollectionSlot::Signature => "Signature",
        }
    }

    const fn employment_only(self) -> bool {
        matches!(
            self,
            CollectionSlot::RelievingLetter | CollectionSlot::PaySlip | CollectionSlot::OfferLetter
        )
    }

    const fn optional(self) -> bool {
        matches!(
            self,
            CollectionSlot::Passport | CollectionSlot::PassportDeclaration
        )
    }
}

/// Closed key set: a built-in slot of either kind, or a company-defined custom slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotKey {
    Address(AddressSlot),
    Collection(CollectionSlot),
    Custom(String),
}

impl SlotKey {
    /// Resolve a wire key against a record kind and the company's enabled custom types.
    pub fn parse(
        kind: RecordKind,
        raw: &str,
        custom: &[CustomDocumentType],
    ) -> Result<Self, SlotError> {
        let raw = raw.trim();
        let builtin = match kind {
            RecordKind::AddressVerification => AddressSlot::ALL
                .iter()
                .find(|slot| slot.key() == raw)
                .map(|slot| SlotKey::Address(*slot)),
            RecordKind::DocumentCollection => CollectionSlot::ALL
                .iter()
                .find(|slot| slot.key() == raw)
                .map(|slot| SlotKey::Collection(*slot)),
        };
        if let Some(slot) = builtin {
            return Ok(slot);
        }

        let enabled_custom = kind == RecordKind::DocumentCollection
            && custom
                .iter()
                .any(|doc_type| doc_type.enabled && doc_type.key == raw);
        if enabled_custom {
            Ok(SlotKey::Custom(raw.to_string()))
        } else {
            Err(SlotError::InvalidSlot {
                slot_key: raw.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SlotKey::Address(slot) => slot.key(),
            SlotKey::Collection(slot) => slot.key(),
            SlotKey::Custom(key) => key,
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored file descriptor for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpload {
    pub slot_key: String,
    pub original_name: String,
    pub storage_key: String,
    pub url: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// One current upload per slot. Built-in slots are enum keyed; custom slots live apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSet {
    #[serde(default)]
    pub address: BTreeMap<AddressSlot, DocumentUpload>,
    #[serde(default)]
    pub collection: BTreeMap<CollectionSlot, DocumentUpload>,
    #[serde(default)]
    pub custom: BTreeMap<String, DocumentUpload>,
}

impl DocumentSet {
    pub fn get(&self, slot: &SlotKey) -> Option<&DocumentUpload> {
        match slot {
            SlotKey::Address(key) => self.address.get(key),
            SlotKey::Collection(key) => self.collection.get(key),
            SlotKey::Custom(key) => self.custom.get(key),
        }
    }

    /// Place `upload` into `slot`, handing back whatever it displaced.
    pub fn replace(&mut self, slot: &SlotKey, upload: DocumentUpload) -> Option<DocumentUpload> {
        match slot {
            SlotKey::Address(key) => self.address.insert(*key, upload),
            SlotKey::Collection(key) => self.collection.insert(*key, upload),
            SlotKey::Custom(key) => self.custom.insert(key.clone(), upload),
        }
    }

    pub fn clear(&mut self, slot: &SlotKey) -> Option<DocumentUpload> {
        match slot {
            SlotKey::Address(key) => self.address.remove(key),
            SlotKey::Collection(key) => self.collection.remove(key),
            SlotKey::Custom(key) => self.custom.remove(key),
        }
    }

    pub fn uploaded_keys(&self) -> Vec<String> {
        self.iter().map(|upload| upload.slot_key.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DocumentUpload> {
        self.address
            .values()
            .chain(self.collection.values())
            .chain(self.custom.values())
    }

    pub fn is_empty(&self) -> bool {
        self.address.is_empty() && self.collection.is_empty() && self.custom.is_empty()
    }
}

/// Company-defined extra document type for document collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomDocumentType {
    pub key: String,
    pub label: String,
    pub enabled: bool,
    #[serde(default)]
    pub required: bool,
}

/// Derive a camelCase machine key from a free-form label.
pub fn derive_custom_key(label: &str) -> Result<String, ValidationError> {
    let words: Vec<String> = label
        .trim()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_ascii_lowercase)
        .collect();

    let mut key = String::new();
    for (index, word) in words.iter().enumerate() {
        if index == 0 {
            key.push_str(word);
            continue;
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            key.push(first.to_ascii_uppercase());
            key.extend(chars);
        }
    }

    if key.is_empty() {
        return Err(ValidationError::single(
            "label",
            "must contain at least one letter or digit",
        ));
    }
    Ok(key)
}

/// Add a custom type to a company catalogue, rejecting key collisions.
pub fn add_custom_type(
    existing: &[CustomDocumentType],
    label: &str,
    required: bool,
) -> Result<Vec<CustomDocumentType>, DocumentTypeError> {
    let key = derive_custom_key(label)?;
    let collides_builtin = CollectionSlot::ALL
        .iter()
        .any(|slot| slot.key().eq_ignore_ascii_case(&key));
    let collides_custom = existing
        .iter()
        .any(|doc_type| doc_type.key.eq_ignore_ascii_case(&key));
    if collides_builtin || collides_custom {
        return Err(SlotError::DuplicateSlotKey { key }.into());
    }

    let mut updated = existing.to_vec();
    updated.push(CustomDocumentType {
        key,
        label: label.trim().to_string(),
        enabled: true,
        required,
    });
    Ok(updated)
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentTypeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Slot(#[from] SlotError),
}

/// Slots that must hold a file before final submission.
pub fn required_slots(
    kind: RecordKind,
    form: Option<&FormPayload>,
    custom: &[CustomDocumentType],
) -> Vec<SlotKey> {
    match kind {
        RecordKind::AddressVerification => {
            AddressSlot::ALL.iter().copied().map(SlotKey::Address).collect()
        }
        RecordKind::DocumentCollection => {
            let employed = form.map(FormPayload::employment_count).unwrap_or(0) > 0;
            CollectionSlot::ALL
                .iter()
                .copied()
                .filter(|slot| !slot.optional())
                .filter(|slot| employed || !slot.employment_only())
                .map(SlotKey::Collection)
                .chain(
                    custom
                        .iter()
                        .filter(|doc_type| doc_type.enabled && doc_type.required)
                        .map(|doc_type| SlotKey::Custom(doc_type.key.clone())),
                )
                .collect()
        }
    }
}

/// Every slot a record of `kind` accepts, required or not.
pub fn accepted_slots(kind: RecordKind, custom: &[CustomDocumentType]) -> Vec<SlotKey> {
    match kind {
        RecordKind::AddressVerification => {
            AddressSlot::ALL.iter().copied().map(SlotKey::Address).collect()
        }
        RecordKind::DocumentCollection => CollectionSlot::ALL
            .iter()
            .copied()
            .map(SlotKey::Collection)
            .chain(
                custom
                    .iter()
                    .filter(|doc_type| doc_type.enabled)
                    .map(|doc_type| SlotKey::Custom(doc_type.key.clone())),
            )
            .collect(),
    }
}

pub fn missing_slots(required: &[SlotKey], documents: &DocumentSet) -> Vec<String> {
    required
        .iter()
        .filter(|slot| documents.get(slot).is_none())
        .map(|slot| slot.as_str().to_string())
        .collect()
}

/// Size and MIME allow-list applied to every upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPolicy {
    max_bytes: u64,
    allowed: Vec<mime::Mime>,
}

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

impl UploadPolicy {
    pub fn new(max_bytes: u64, allowed: Vec<mime::Mime>) -> Self {
        Self { max_bytes, allowed }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn check(&self, content_type: &str, size_bytes: u64) -> Result<mime::Mime, SlotError> {
        if size_bytes > self.max_bytes {
            return Err(SlotError::FileTooLarge {
                size_bytes,
                max_bytes: self.max_bytes,
            });
        }

        let parsed: mime::Mime =
            content_type
                .trim()
                .parse()
                .map_err(|_| SlotError::UnsupportedType {
                    content_type: content_type.to_string(),
                })?;
        let accepted = self.allowed.iter().any(|allowed| {
            allowed.type_() == parsed.type_()
                && (allowed.subtype() == mime::STAR || allowed.subtype() == parsed.subtype())
        });
        if accepted {
            Ok(parsed)
        } else {
            Err(SlotError::UnsupportedType {
                content_type: parsed.essence_str().to_string(),
            })
        }
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_UPLOAD_BYTES,
            vec![mime::IMAGE_JPEG, mime::IMAGE_PNG, mime::APPLICATION_PDF],
        )
    }
}

/// Incoming file for one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub slot_key: String,
    pub original_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    /// Content type from the client, falling back to a guess from the file name.
    pub fn new(
        slot_key: impl Into<String>,
        original_name: impl Into<String>,
        content_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        let original_name = original_name.into();
        let content_type = content_type
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| {
                mime_guess::from_path(&original_name)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            });
        Self {
            slot_key: slot_key.into(),
            original_name,
            content_type,
            bytes,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Storage key unique per upload so a replacement never overwrites the previous object.
pub fn storage_key_for(kind: RecordKind, record_id: &str, slot: &SlotKey, name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "{}/{}/{}/{}-{}",
        kind.path_segment(),
        record_id,
        slot.as_str(),
        uuid::Uuid::new_v4().simple(),
        sanitized
    )
}
