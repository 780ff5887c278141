pub mod blocks;
pub mod completion;
pub mod config;
pub mod event;
pub mod extraction;
pub mod status;

pub use blocks::{Block, blocks_to_text, text_to_blocks};
pub use completion::{CompletionRequest, CompletionResponse, Fingerprint, Message, Role, Usage};
pub use config::PipelineConfig;
pub use event::{PageEvent, Payload, SignatureHeaders};
pub use extraction::{ExtractionError, ExtractionResult, Merchant, Offer};
pub use status::PageStatus;
