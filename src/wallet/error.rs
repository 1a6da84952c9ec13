use crate::crypto::CryptoError;
use crate::currency::AddressError;
use crate::transaction::builder::TxBuildError;

/// Every failure a wallet operation can report.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    // ── Facade state ──
    #[error("wallet is not initialized")]
    NotInitialized,
    #[error("wallet is already initialized")]
    AlreadyInitialized,
    #[error("wallet is in the wrong state for this operation")]
    WrongState,
    #[error("wrong password")]
    WrongPassword,
    #[error("operation cancelled")]
    OperationCancelled,

    // ── Transaction construction ──
    #[error("mixin count is out of range")]
    WrongMixin,
    #[error("not enough outputs on the node to mix with")]
    MixinTooLow,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("wrong amount")]
    WrongAmount,
    #[error("fee is below the network minimum")]
    FeeTooSmall,
    #[error("bad destination address")]
    BadAddress,
    #[error("destination amount is zero")]
    ZeroDestination,
    #[error("sum of destination amounts overflows")]
    SumOverflow,
    #[error("payment id has wrong format")]
    WrongPaymentId,
    #[error("transaction is too big")]
    TransactionSizeTooBig,
    #[error("operation is not available for tracking wallets")]
    TrackingWalletOnly,

    // ── Deposits ──
    #[error("deposit does not exist")]
    DepositDoesNotExist,
    #[error("deposit is locked")]
    DepositLocked,
    #[error("deposit is already spent")]
    DepositAlreadySpent,
    #[error("deposit term is too small")]
    DepositTermTooSmall,
    #[error("deposit term is too big")]
    DepositTermTooBig,
    #[error("deposit amount is too small")]
    DepositAmountTooSmall,

    // ── Queries and proofs ──
    #[error("transaction cannot be cancelled")]
    TxCancelImpossible,
    #[error("transfer cannot be found")]
    TxTransferImpossible,
    #[error("transaction key not found")]
    KeyNotFound,
    #[error("proof generation failed: {0}")]
    ProofGenerationFailed(String),

    // ── Collaborators and internals ──
    #[error("internal wallet error: {0}")]
    InternalWalletError(String),
    #[error("node error: {0}")]
    Node(String),
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl From<TxBuildError> for WalletError {
    fn from(e: TxBuildError) -> Self {
        match e {
            TxBuildError::AmountOverflow => WalletError::SumOverflow,
            TxBuildError::OutputsExceedInputs { .. } => WalletError::InsufficientFunds,
            other => WalletError::InternalWalletError(other.to_string()),
        }
    }
}

impl From<CryptoError> for WalletError {
    fn from(e: CryptoError) -> Self {
        WalletError::InternalWalletError(e.to_string())
    }
}

impl From<AddressError> for WalletError {
    fn from(_: AddressError) -> Self {
        WalletError::BadAddress
    }
}

impl From<bincode::error::EncodeError> for WalletError {
    fn from(e: bincode::error::EncodeError) -> Self {
        WalletError::Persistence(format!("serialize failed: {}", e))
    }
}

impl From<bincode::error::DecodeError> for WalletError {
    fn from(e: bincode::error::DecodeError) -> Self {
        WalletError::Persistence(format!("deserialize failed: {}", e))
    }
}
