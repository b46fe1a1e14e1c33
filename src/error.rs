use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum J2kError {
    #[error("Destination too small")]
    DestinationTooSmall = 1,
    #[error("Truncated packet")]
    TruncatedPacket = 2,
    #[error("Invalid packet header")]
    InvalidPacketHeader = 3,
    #[error("Too many coding passes")]
    TooManyPasses = 4,
    #[error("Too many bit-planes")]
    TooManyBitplanes = 5,
    #[error("Invalid code-block size")]
    InvalidCodeBlockSize = 6,
    #[error("Invalid argument")]
    InvalidArgument = 7,
    #[error("Segmentation symbol mismatch")]
    SegmentationSymbolMismatch = 8,
    #[error("Code-block data overflow")]
    CodeBlockDataOverflow = 9,
    #[error("Invalid progression order")]
    InvalidProgressionOrder = 10,
}
