use thiserror::Error;

/// The closed set of failure kinds the engine reports.
///
/// Every fallible operation returns one of these by value; there is no
/// error state stored on the dataset and no panicking path. Conditions
/// under which an operation still completed usefully are not errors at
/// all — see [`Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IcsError {
    #[error("illegal parameter")]
    IllParameter,
    #[error("the region of interest does not fit inside the image")]
    IllegalRoi,
    #[error("the data has too many dimensions")]
    TooManyDims,
    #[error("unknown data type")]
    UnknownDataType,
    #[error("unknown compression method")]
    UnknownCompression,
    #[error("this operation is not valid on the dataset in its current mode")]
    NotValidAction,
    #[error("no layout has been set for the dataset")]
    NoLayout,
    #[error("there is no data attached to write")]
    MissingData,
    #[error("a data source is already attached to the dataset")]
    DuplicateData,
    #[error("no SCIL_TYPE string exists for this data type and dimensionality")]
    NoScilType,
    #[error("the output buffer is too small")]
    BufferTooSmall,
    #[error("the buffer length is not a multiple of the sample size")]
    BitsVsSizeConflict,
    #[error("unexpected end of stream")]
    EndOfStream,
    #[error("corrupted data stream")]
    CorruptedStream,
    #[error("block operations are not possible on this compression method")]
    BlockNotAllowed,
    #[error("failed to compress the data")]
    CompressionProblem,
    #[error("failed to decompress the data")]
    DecompressionProblem,
    #[error("failed to open the header file")]
    FOpenIcs,
    #[error("failed to read the header file")]
    FReadIcs,
    #[error("failed to write the header file")]
    FWriteIcs,
    #[error("failed to close the header file")]
    FCloseIcs,
    #[error("failed to open the image data file")]
    FOpenIds,
    #[error("failed to read the image data file")]
    FReadIds,
    #[error("failed to write the image data file")]
    FWriteIds,
    #[error("failed to close the image data file")]
    FCloseIds,
    #[error("failed to move the header file to a temporary name")]
    FTempMoveIcs,
    #[error("failed to copy the image data from the temporary file")]
    FCopyIds,
}

/// Non-fatal conditions: the operation completed and the dataset stays
/// valid, but the caller should know.
///
/// Keeping these out of [`IcsError`] keeps the abort channel clean — a
/// `?` on an engine call can never silently swallow one of these, and a
/// warning can never short-circuit an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The attached buffer's length disagrees with the layout. The
    /// buffer was attached anyway.
    SizeConflict,
    /// The destination buffer was larger than the data; the tail is
    /// untouched.
    OutputNotFilled,
}

pub type IcsResult<T = ()> = Result<T, IcsError>;
