/// Crate-wide result alias.
pub type TessellaResult<T> = Result<T, TessellaError>;

/// Error taxonomy of the compositor.
///
/// Precondition failures from [`crate::PyramidCompositor::write_chunk`] never
/// mutate the materialization cache; failures inside
/// [`crate::PyramidCompositor::set_composition`] clear all internal state.
#[derive(thiserror::Error, Debug)]
pub enum TessellaError {
    /// A chunk write was requested before `set_composition` or after
    /// `reset_composition`.
    #[error("no composition is set")]
    NotConfigured,

    /// The requested level is not part of the discovered level set.
    #[error("level {level} is not part of the composition")]
    UnknownLevel {
        /// Requested pyramid level.
        level: u32,
    },

    /// The requested channel is outside the composition's channel range.
    #[error("channel {channel} is outside [0, {channels})")]
    UnknownChannel {
        /// Requested channel.
        channel: u32,
        /// Number of channels in the composition.
        channels: u64,
    },

    /// A chunk coordinate lies outside the plate extent at that level.
    #[error("{axis} chunk index {index} is outside the plate's {chunks} chunk(s)")]
    OutOfRange {
        /// Axis name (`"y"` or `"x"`).
        axis: &'static str,
        /// Requested chunk index.
        index: u64,
        /// Number of chunks along the axis.
        chunks: u64,
    },

    /// A composition-map path does not resolve or its sidecar is missing.
    #[error("source '{path}' is unavailable: {reason}")]
    SourceUnavailable {
        /// Path that failed to resolve.
        path: String,
        /// Backend-provided failure detail.
        reason: String,
    },

    /// Unit pyramids disagree on element type.
    #[error("element type mismatch: '{path}' is {found}, composition is {expected}")]
    TypeMismatch {
        /// Element type of the authoritative (first) source.
        expected: String,
        /// Element type of the disagreeing source.
        found: String,
        /// Source that disagrees.
        path: String,
    },

    /// Unit pyramids disagree on level set or tile shape, or the composition
    /// grid is not rectangularly dense.
    #[error("geometry mismatch: {0}")]
    GeometryMismatch(String),

    /// The array backend returned an error from read/write/create/delete.
    #[error("storage error: {0}")]
    Io(String),

    /// Descriptor, attribute, or group-marker emission failed.
    #[error("sidecar error: {0}")]
    Sidecar(String),

    /// Any other error, preserved with its source chain.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TessellaError {
    pub(crate) fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub(crate) fn geometry(msg: impl Into<String>) -> Self {
        Self::GeometryMismatch(msg.into())
    }

    pub(crate) fn sidecar(msg: impl Into<String>) -> Self {
        Self::Sidecar(msg.into())
    }

    pub(crate) fn source_unavailable(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
