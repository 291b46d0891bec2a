pub mod jwt;
pub mod password;

pub use jwt::{hash_token, AccessClaims, JwtKeys, RefreshClaims};
pub use password::{hash_password, verify_password, Argon2PasswordVerifier, PasswordVerifier};
