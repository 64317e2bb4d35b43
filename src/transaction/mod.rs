/// Spend builder for constructing unsigned transactions
pub mod builder;
/// Broadcast of signed transactions
pub mod sender;
/// Signing collaborator
pub mod signer;

pub use builder::{FeeOption, SpendBuilder, SpendError, SpendRequest, SpendTarget};
pub use sender::TransactionSender;
pub use signer::{HexPayloadSigner, TransactionSigner};
