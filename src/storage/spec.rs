use crate::foundation::core::Shape5;
use crate::storage::dtype::ElementType;

/// Open descriptor for reading an existing chunked array.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ReadSpec {
    /// Backend path of the array.
    pub path: String,
}

impl ReadSpec {
    /// Descriptor for the array at `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Open descriptor for creating a chunked array.
///
/// Opening a `WriteSpec` has create-and-delete-existing semantics: any array
/// already present at `path` is removed first.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct WriteSpec {
    /// Backend path of the array.
    pub path: String,
    /// Declared array extents.
    pub shape: Shape5,
    /// Backend chunk extents.
    pub chunk_shape: Shape5,
    /// Element type of the array.
    pub dtype: ElementType,
}

impl WriteSpec {
    /// Descriptor for a new array at `path`.
    pub fn new(path: impl Into<String>, shape: Shape5, chunk_shape: Shape5, dtype: ElementType) -> Self {
        Self {
            path: path.into(),
            shape,
            chunk_shape,
            dtype,
        }
    }

    /// On-disk encoded element type for the backend's metadata.
    pub fn encoded_dtype(&self) -> &'static str {
        self.dtype.encoded()
    }
}
