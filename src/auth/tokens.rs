//! Signed tokens: e-mail activation, password reset and API sessions.
//!
//! One-time tokens have the form `<timestamp base36>-<digest>`, where the
//! timestamp counts seconds since 2001-01-01 and the digest is an HMAC over
//! the user state the token is bound to. Changing that state (verifying the
//! account, changing the password) invalidates outstanding tokens.

use crate::types::{User, UserId};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Why a token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid token")]
    Invalid,
    #[error("token expired")]
    Expired,
}

/// What a one-time token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    Activation,
    PasswordReset,
}

impl TokenPurpose {
    fn salt(&self) -> &'static str {
        match self {
            TokenPurpose::Activation => "task-tracker.activation",
            TokenPurpose::PasswordReset => "task-tracker.password-reset",
        }
    }

    /// User state the token is bound to.
    fn state(&self, user: &User) -> String {
        match self {
            TokenPurpose::Activation => format!(
                "{}{}{}",
                user.id, user.is_verified as u8, user.is_active as u8
            ),
            TokenPurpose::PasswordReset => {
                format!("{}{}{}", user.id, user.password_hash, user.email)
            }
        }
    }
}

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn from_base36(s: &str) -> Option<u64> {
    if s.is_empty() || s.len() > 13 {
        return None;
    }
    u64::from_str_radix(s, 36).ok()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Encode a user id for use in a URL.
pub fn encode_uid(user_id: UserId) -> String {
    URL_SAFE_NO_PAD.encode(user_id.to_string())
}

/// Decode a URL user id; `None` when it is not a valid encoding.
pub fn decode_uid(uidb64: &str) -> Option<UserId> {
    let bytes = URL_SAFE_NO_PAD.decode(uidb64.trim_end_matches('=')).ok()?;
    std::str::from_utf8(&bytes).ok()?.parse().ok()
}

/// Issues and checks tokens with a server secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    /// Lifetime of one-time tokens, in seconds.
    one_time_timeout: i64,
    /// Lifetime of session tokens, in seconds.
    session_ttl: i64,
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>, one_time_timeout: i64, session_ttl: i64) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            one_time_timeout,
            session_ttl,
        }
    }

    fn mac(&self, salt: &str, message: &str) -> HmacSha256 {
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC can take key of any size"),
        };
        mac.update(salt.as_bytes());
        mac.update(b"|");
        mac.update(message.as_bytes());
        mac
    }

    fn digest(&self, purpose: TokenPurpose, user: &User, ts: u64) -> String {
        let message = format!("{}{}", purpose.state(user), ts);
        let full = hex::encode(self.mac(purpose.salt(), &message).finalize().into_bytes());
        // Every other character keeps URLs short.
        full.chars().step_by(2).collect()
    }

    /// Make a one-time token for `user`.
    pub fn make_token(&self, purpose: TokenPurpose, user: &User, now: DateTime<Utc>) -> String {
        let ts = (now - epoch()).num_seconds().max(0) as u64;
        format!("{}-{}", to_base36(ts), self.digest(purpose, user, ts))
    }

    /// Check a one-time token against the user's current state.
    pub fn check_token(
        &self,
        purpose: TokenPurpose,
        user: &User,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<(), TokenError> {
        let (ts_b36, digest) = token.split_once('-').ok_or(TokenError::Malformed)?;
        let ts = from_base36(ts_b36).ok_or(TokenError::Malformed)?;

        let expected = self.digest(purpose, user, ts);
        if !constant_time_eq(expected.as_bytes(), digest.as_bytes()) {
            return Err(TokenError::Invalid);
        }

        let age = (now - epoch()).num_seconds() - ts as i64;
        if age > self.one_time_timeout {
            return Err(TokenError::Expired);
        }
        Ok(())
    }

    /// Make a bearer session token: `<user id>.<expiry ms>.<signature>`.
    pub fn make_session(&self, user: &User, now: DateTime<Utc>) -> String {
        let expires = now.timestamp_millis() + self.session_ttl * 1000;
        let sig = self.session_signature(user, expires);
        format!("{}.{}.{}", user.id, expires, sig)
    }

    /// User id named by a session token, before the signature is checked.
    pub fn session_user_id(token: &str) -> Option<UserId> {
        token.split('.').next()?.parse().ok()
    }

    /// Verify a session token for the given user.
    pub fn check_session(&self, user: &User, token: &str, now: DateTime<Utc>) -> Result<(), TokenError> {
        let mut parts = token.split('.');
        let (Some(uid), Some(expires), Some(sig), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };
        let uid: UserId = uid.parse().map_err(|_| TokenError::Malformed)?;
        let expires: i64 = expires.parse().map_err(|_| TokenError::Malformed)?;
        if uid != user.id {
            return Err(TokenError::Invalid);
        }

        let expected = self.session_signature(user, expires);
        if !constant_time_eq(expected.as_bytes(), sig.as_bytes()) {
            return Err(TokenError::Invalid);
        }
        if now.timestamp_millis() > expires {
            return Err(TokenError::Expired);
        }
        Ok(())
    }

    /// Sessions are bound to the password hash, so a password change logs out everywhere.
    fn session_signature(&self, user: &User, expires: i64) -> String {
        let message = format!("{}:{}:{}", user.id, expires, user.password_hash);
        hex::encode(self.mac("task-tracker.session", &message).finalize().into_bytes())
    }

    pub fn session_ttl(&self) -> i64 {
        self.session_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user() -> User {
        User {
            id: 42,
            email: "ann@example.com".into(),
            password_hash: "$argon2id$hash".into(),
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            is_moderator: false,
            is_employee: true,
            is_watcher: false,
            is_supervisor: false,
            is_verified: false,
            supervisor_id: None,
            bio: None,
            timezone: None,
            date_joined: 0,
            updated_at: 0,
        }
    }

    fn signer() -> TokenSigner {
        TokenSigner::new("test-secret", 259_200, 3600)
    }

    #[test]
    fn test_base36_round_trip() {
        for n in [0u64, 1, 35, 36, 1_000_000, 799_999_999] {
            assert_eq!(from_base36(&to_base36(n)), Some(n));
        }
        assert_eq!(to_base36(36), "10");
        assert_eq!(from_base36(""), None);
        assert_eq!(from_base36("!"), None);
    }

    #[test]
    fn test_uid_encoding() {
        let encoded = encode_uid(42);
        assert_eq!(decode_uid(&encoded), Some(42));
        assert_eq!(decode_uid("***"), None);
        assert_eq!(decode_uid(&URL_SAFE_NO_PAD.encode("abc")), None);
    }

    #[test]
    fn test_activation_token_valid_for_user() {
        let now = Utc::now();
        let u = user();
        let token = signer().make_token(TokenPurpose::Activation, &u, now);
        assert!(signer().check_token(TokenPurpose::Activation, &u, &token, now).is_ok());
    }

    #[test]
    fn test_activation_token_fails_after_verification() {
        let now = Utc::now();
        let mut u = user();
        let token = signer().make_token(TokenPurpose::Activation, &u, now);
        u.is_verified = true;
        assert_eq!(
            signer().check_token(TokenPurpose::Activation, &u, &token, now),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn test_token_rejects_other_user_and_purpose() {
        let now = Utc::now();
        let u = user();
        let token = signer().make_token(TokenPurpose::Activation, &u, now);
        let mut other = user();
        other.id = 43;
        assert!(signer().check_token(TokenPurpose::Activation, &other, &token, now).is_err());
        assert!(signer().check_token(TokenPurpose::PasswordReset, &u, &token, now).is_err());
    }

    #[test]
    fn test_token_tampered_or_malformed() {
        let now = Utc::now();
        let u = user();
        let token = signer().make_token(TokenPurpose::Activation, &u, now);
        let mut tampered = token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'a' { 'b' } else { 'a' });
        assert_eq!(
            signer().check_token(TokenPurpose::Activation, &u, &tampered, now),
            Err(TokenError::Invalid)
        );
        assert_eq!(
            signer().check_token(TokenPurpose::Activation, &u, "garbage", now),
            Err(TokenError::Malformed)
        );
        let other_secret = TokenSigner::new("other", 259_200, 3600);
        assert!(other_secret.check_token(TokenPurpose::Activation, &u, &token, now).is_err());
    }

    #[test]
    fn test_token_expires() {
        let issued = Utc::now();
        let u = user();
        let token = signer().make_token(TokenPurpose::Activation, &u, issued);
        let later = issued + Duration::seconds(259_200 + 5);
        assert_eq!(
            signer().check_token(TokenPurpose::Activation, &u, &token, later),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_reset_token_invalidated_by_password_change() {
        let now = Utc::now();
        let mut u = user();
        let token = signer().make_token(TokenPurpose::PasswordReset, &u, now);
        assert!(signer().check_token(TokenPurpose::PasswordReset, &u, &token, now).is_ok());
        u.password_hash = "$argon2id$new".into();
        assert!(signer().check_token(TokenPurpose::PasswordReset, &u, &token, now).is_err());
    }

    #[test]
    fn test_session_token() {
        let now = Utc::now();
        let u = user();
        let token = signer().make_session(&u, now);
        assert_eq!(TokenSigner::session_user_id(&token), Some(42));
        assert!(signer().check_session(&u, &token, now).is_ok());
        assert_eq!(
            signer().check_session(&u, &token, now + Duration::seconds(3601)),
            Err(TokenError::Expired)
        );

        let mut changed = user();
        changed.password_hash = "$argon2id$other".into();
        assert_eq!(
            signer().check_session(&changed, &token, now),
            Err(TokenError::Invalid)
        );
        assert_eq!(
            signer().check_session(&u, "42.x", now),
            Err(TokenError::Malformed)
        );
    }
}
