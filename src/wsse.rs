//! WSSE `UsernameToken` request signing for the remote profile API.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use sha2::{Digest, Sha256};

use crate::Result;

const NONCE_ALPHABET: &[u8] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ+/=";
const NONCE_LEN: usize = 32;
const CREATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const X_WSSE: &str = "x-wsse";

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub secret: Option<String>,
}

impl Credentials {
    pub fn new(username: Option<String>, secret: Option<String>) -> Self {
        Self { username, secret }
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_none() || self.secret.is_none()
    }
}

// Keep the secret out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Fresh header set for one request: new nonce, current time.
pub fn headers(credentials: &Credentials) -> Result<HeaderMap> {
    sign(credentials, Utc::now(), &nonce())
}

/// Signed header set for a given timestamp and nonce.
///
/// Missing username or secret yields an empty header set.
pub fn sign(
    credentials: &Credentials,
    created: DateTime<Utc>,
    nonce: &str,
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let (username, secret) = match (&credentials.username, &credentials.secret)
    {
        (Some(username), Some(secret)) => (username, secret),
        _ => return Ok(headers),
    };

    let created = created.format(CREATED_FORMAT).to_string();
    let digest = password_digest(nonce, &created, secret);

    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_static("WSSE profile=\"UsernameToken\""),
    );
    headers.insert(
        X_WSSE,
        HeaderValue::from_str(&format!(
            "UsernameToken Username=\"{}\", PasswordDigest=\"{}\", Nonce=\"{}\", Created=\"{}\"",
            username, digest, nonce, created
        ))?,
    );
    Ok(headers)
}

pub fn password_digest(nonce: &str, created: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce.as_bytes());
    hasher.update(created.as_bytes());
    hasher.update(secret.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}

fn nonce() -> String {
    let raw: Vec<u8> = std::iter::repeat_with(|| {
        NONCE_ALPHABET[fastrand::usize(..NONCE_ALPHABET.len())]
    })
    .take(NONCE_LEN)
    .collect();
    BASE64_STANDARD.encode(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn credentials() -> Credentials {
        Credentials::new(Some("alice".to_owned()), Some("s3cret".to_owned()))
    }

    #[test]
    fn anonymous_credentials_give_no_headers() {
        let created = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
        let only_user = Credentials::new(Some("alice".to_owned()), None);
        assert!(sign(&only_user, created, "n").unwrap().is_empty());
        assert!(sign(&Credentials::default(), created, "n")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn signs_with_given_nonce_and_time() {
        let created = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
        let headers = sign(&credentials(), created, "bm9uY2U=").unwrap();

        assert_eq!(
            headers[AUTHORIZATION].to_str().unwrap(),
            "WSSE profile=\"UsernameToken\""
        );
        let digest = password_digest("bm9uY2U=", "2020-01-02T03:04:05Z", "s3cret");
        let expected = format!(
            "UsernameToken Username=\"alice\", PasswordDigest=\"{}\", Nonce=\"bm9uY2U=\", Created=\"2020-01-02T03:04:05Z\"",
            digest
        );
        assert_eq!(headers[X_WSSE].to_str().unwrap(), expected);
    }

    #[test]
    fn signing_is_deterministic() {
        let created = Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap();
        let a = sign(&credentials(), created, "abc").unwrap();
        let b = sign(&credentials(), created, "abc").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn digest_is_base64_sha256() {
        let digest = password_digest("n", "c", "s");
        let raw = BASE64_STANDARD.decode(digest).unwrap();
        assert_eq!(raw.len(), 32);
    }

    #[test]
    fn nonce_is_base64_of_alphabet_chars() {
        let n = nonce();
        let raw = BASE64_STANDARD.decode(&n).unwrap();
        assert_eq!(raw.len(), NONCE_LEN);
        assert!(raw.iter().all(|b| NONCE_ALPHABET.contains(b)));
        assert_ne!(n, nonce());
    }

    #[test]
    fn debug_hides_secret() {
        let rendered = format!("{:?}", credentials());
        assert!(!rendered.contains("s3cret"));
    }
}
