//! Authentication: password hashing, signed tokens and the request extractor.

pub mod extract;
pub mod password;
pub mod tokens;

pub use extract::CurrentUser;
pub use password::{hash_password, verify_password};
pub use tokens::{TokenError, TokenPurpose, TokenSigner, decode_uid, encode_uid};
