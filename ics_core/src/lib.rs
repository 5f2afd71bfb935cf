pub mod byteorder;
pub mod codec;
pub mod dtype;
pub mod error;
pub mod format;
pub mod walker;

pub use byteorder::ByteOrder;
pub use codec::{BodyRead, BodyWrite, Whence};
pub use dtype::DataType;
pub use error::{IcsError, IcsResult, Notice};
pub use format::{
    Compression, Dimension, FileMode, Imel, Version, MAX_DIM, MAX_IMEL_SIZE,
};
pub use walker::LineWalker;
