pub mod keys;
pub mod signature;
pub mod stealth;

pub use keys::{CryptoError, KeyDerivation, KeyImage, KeyPair, PublicKey, SecretKey};
pub use signature::Signature;
