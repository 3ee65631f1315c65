pub mod entities;

pub use entities::{ReasonCode, TokenTransaction, TransactionKind, UserTokenBalance};
