use crate::foundation::error::{TessellaError, TessellaResult};

/// Element types supported by plate compositions.
///
/// One composition carries a single element type shared by all sources,
/// levels, and channels; it is discovered from the first source and enforced
/// against the rest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// Unsigned 8-bit integer.
    U8,
    /// Unsigned 16-bit integer.
    U16,
    /// Unsigned 32-bit integer.
    U32,
    /// Unsigned 64-bit integer.
    U64,
    /// Signed 8-bit integer.
    I8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// Signed 64-bit integer.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
}

impl ElementType {
    /// All supported element types, in dispatch-code order.
    pub const ALL: [ElementType; 10] = [
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::F32,
        Self::F64,
    ];

    /// Canonical element-type name (`"uint8"`, `"float32"`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Self::U8 => "uint8",
            Self::U16 => "uint16",
            Self::U32 => "uint32",
            Self::U64 => "uint64",
            Self::I8 => "int8",
            Self::I16 => "int16",
            Self::I32 => "int32",
            Self::I64 => "int64",
            Self::F32 => "float32",
            Self::F64 => "float64",
        }
    }

    /// Width of one element in bytes.
    pub fn width(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }

    /// Small dispatch code for descriptor compatibility.
    pub fn code(self) -> u16 {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
            Self::I8 => 16,
            Self::I16 => 32,
            Self::I32 => 64,
            Self::I64 => 128,
            Self::F32 => 256,
            Self::F64 => 512,
        }
    }

    /// On-disk encoded form in zarr v2 notation (`"<u1"`, `"<f8"`, ...).
    pub fn encoded(self) -> &'static str {
        match self {
            Self::U8 => "<u1",
            Self::U16 => "<u2",
            Self::U32 => "<u4",
            Self::U64 => "<u8",
            Self::I8 => "<i1",
            Self::I16 => "<i2",
            Self::I32 => "<i4",
            Self::I64 => "<i8",
            Self::F32 => "<f4",
            Self::F64 => "<f8",
        }
    }

    /// Canonicalize an element-type name.
    ///
    /// Accepts canonical names and zarr v2 encoded forms.
    pub fn parse(name: &str) -> TessellaResult<Self> {
        for t in Self::ALL {
            if name == t.name() || name == t.encoded() {
                return Ok(t);
            }
        }
        Err(TessellaError::io(format!(
            "unsupported element type '{name}'"
        )))
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/storage/dtype.rs"]
mod tests;
