use dhub_dataset::DatasetError;
use dhub_element::ElementError;
use dhub_gc::GcError;
use dhub_store::StoreError;
use serde::Serialize;
use thiserror::Error;

/// Transport-neutral classification of every DataHub failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Forbidden,
    RangeExceeded,
    SizeExceeded,
    /// Stored state does not match what it should be: a partial
    /// copy-on-write fan-out or corrupt blob bytes.
    Inconsistent,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::RangeExceeded => "range_exceeded",
            Self::SizeExceeded => "size_exceeded",
            Self::Inconsistent => "inconsistent",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("element error: {0}")]
    Element(#[from] ElementError),

    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("gc error: {0}")]
    Gc(#[from] GcError),
}

impl HubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Validation,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Store(e) => store_kind(e),
            Self::Element(e) => element_kind(e),
            Self::Dataset(e) => dataset_kind(e),
            Self::Gc(e) => gc_kind(e),
        }
    }
}

pub type HubResult<T> = Result<T, HubError>;

fn store_kind(e: &StoreError) -> ErrorKind {
    match e {
        StoreError::NotFound(_) => ErrorKind::NotFound,
        StoreError::SizeExceeded { .. } => ErrorKind::SizeExceeded,
        StoreError::InvalidBatch(_) => ErrorKind::Validation,
        StoreError::HashMismatch { .. } | StoreError::CorruptBlob { .. } => ErrorKind::Inconsistent,
        StoreError::Serialization(_) | StoreError::Io(_) | StoreError::Backend(_) => {
            ErrorKind::Internal
        }
    }
}

fn element_kind(e: &ElementError) -> ErrorKind {
    match e {
        ElementError::Validation(_) => ErrorKind::Validation,
        ElementError::NotFound(_) | ElementError::NotFoundMany(_) => ErrorKind::NotFound,
        ElementError::AlreadyExists(_) => ErrorKind::Conflict,
        ElementError::Forbidden(_) => ErrorKind::Forbidden,
        ElementError::RangeExceeded { .. } => ErrorKind::RangeExceeded,
        ElementError::PartialFanOut { .. } => ErrorKind::Inconsistent,
        ElementError::Store(e) => store_kind(e),
        ElementError::Backend(_) => ErrorKind::Internal,
    }
}

fn dataset_kind(e: &DatasetError) -> ErrorKind {
    match e {
        DatasetError::Validation(_) => ErrorKind::Validation,
        DatasetError::Conflict(_) => ErrorKind::Conflict,
        DatasetError::NotFound(_) => ErrorKind::NotFound,
        DatasetError::Forbidden(_) => ErrorKind::Forbidden,
        DatasetError::Element(e) => element_kind(e),
        DatasetError::Serialization(_) | DatasetError::Backend(_) => ErrorKind::Internal,
    }
}

fn gc_kind(e: &GcError) -> ErrorKind {
    match e {
        GcError::Store(e) => store_kind(e),
        GcError::Element(e) => element_kind(e),
        GcError::Stopped | GcError::Spawn(_) | GcError::Backend(_) => ErrorKind::Internal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dhub_types::{BlobId, DatasetId, ElementId};

    #[test]
    fn nested_errors_keep_their_kind() {
        let missing = StoreError::NotFound(BlobId::from_hash([0; 32]));
        let wrapped = DatasetError::Element(ElementError::Store(missing));
        assert_eq!(HubError::from(wrapped).kind(), ErrorKind::NotFound);

        let too_big = StoreError::SizeExceeded { size: 11, limit: 10 };
        assert_eq!(
            HubError::from(ElementError::Store(too_big)).kind(),
            ErrorKind::SizeExceeded
        );
    }

    #[test]
    fn fan_out_and_corruption_are_inconsistent() {
        let partial = ElementError::PartialFanOut {
            element: ElementId::new(),
            missing: vec![DatasetId::new()],
        };
        assert_eq!(HubError::from(partial).kind(), ErrorKind::Inconsistent);

        let corrupt = StoreError::CorruptBlob {
            id: BlobId::from_hash([1; 32]),
            reason: "short read".into(),
        };
        assert_eq!(HubError::from(corrupt).kind(), ErrorKind::Inconsistent);
    }

    #[test]
    fn direct_kinds() {
        assert_eq!(HubError::Config("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(
            HubError::from(DatasetError::Conflict("alice/cats".into())).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            HubError::from(ElementError::RangeExceeded { requested: 101, limit: 100 }).kind(),
            ErrorKind::RangeExceeded
        );
        assert_eq!(HubError::from(GcError::Stopped).kind(), ErrorKind::Internal);
    }

    #[test]
    fn kind_renders_snake_case() {
        assert_eq!(ErrorKind::RangeExceeded.to_string(), "range_exceeded");
        assert_eq!(
            serde_json::to_value(ErrorKind::NotFound).unwrap(),
            serde_json::json!("not_found")
        );
    }
}
