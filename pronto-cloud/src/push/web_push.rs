//! Web Push delivery
//!
//! - payload encryption: RFC 8291 `aes128gcm` (ECDH P-256, HKDF-SHA256, AES-128-GCM)
//! - application server identity: RFC 8292 VAPID (`ES256` JWT)
//!
//! ```text
//! body = salt(16) ‖ rs(u32 BE) ‖ idlen(1) ‖ as_public(65) ‖ AES-GCM(plaintext ‖ 0x02)
//! ```

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use ring::rand::{SecureRandom, SystemRandom};
use ring::{aead, agreement, hkdf, signature};
use serde::Serialize;
use shared::models::PushSubscription;
use std::time::Duration;
use thiserror::Error;

use super::registry::decode_b64url;
use super::transport::{DeliveryError, PushTransport};
use crate::config::VapidConfig;

/// Record size advertised in the header; the whole message is a single record
const RECORD_SIZE: u32 = 4096;

/// Padding delimiter for the last (only) record
const LAST_RECORD_DELIMITER: u8 = 0x02;

/// AES-GCM tag plus the delimiter byte
const RECORD_OVERHEAD: usize = 16 + 1;

/// Largest plaintext that fits in one record
pub const MAX_PLAINTEXT_LEN: usize = RECORD_SIZE as usize - RECORD_OVERHEAD;

const SALT_LEN: usize = 16;
const P256_PUBLIC_LEN: usize = 65;
const AUTH_SECRET_LEN: usize = 16;

/// VAPID token lifetime (push services reject more than 24h)
const VAPID_EXPIRY_SECS: i64 = 12 * 60 * 60;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum WebPushError {
    #[error("invalid VAPID key: {0}")]
    InvalidVapidKey(String),

    #[error("invalid subscription key: {0}")]
    InvalidSubscriptionKey(String),

    #[error("payload of {0} bytes exceeds one record")]
    PayloadTooLarge(usize),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("encryption failed")]
    Crypto,

    #[error("VAPID signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

impl From<ring::error::Unspecified> for WebPushError {
    fn from(_: ring::error::Unspecified) -> Self {
        WebPushError::Crypto
    }
}

/// HKDF output length marker for ring
struct Len(usize);

impl hkdf::KeyType for Len {
    fn len(&self) -> usize {
        self.0
    }
}

fn hkdf_expand(prk: &hkdf::Prk, info: &[&[u8]], out: &mut [u8]) -> Result<(), WebPushError> {
    prk.expand(info, Len(out.len()))?.fill(out)?;
    Ok(())
}

/// Content encryption key and nonce for one message
pub(crate) struct ContentKey {
    pub cek: [u8; 16],
    pub nonce: [u8; 12],
}

/// RFC 8291 §3.3/3.4 key schedule, shared by sender and receiver
pub(crate) fn derive_content_key(
    ecdh_secret: &[u8],
    auth_secret: &[u8],
    ua_public: &[u8],
    as_public: &[u8],
    salt: &[u8],
) -> Result<ContentKey, WebPushError> {
    // PRK_key = HKDF-Extract(auth_secret, ecdh_secret)
    let prk_key = hkdf::Salt::new(hkdf::HKDF_SHA256, auth_secret).extract(ecdh_secret);
    let mut ikm = [0u8; 32];
    hkdf_expand(
        &prk_key,
        &[&b"WebPush: info\0"[..], ua_public, as_public],
        &mut ikm,
    )?;

    // PRK = HKDF-Extract(salt, IKM)
    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, salt).extract(&ikm);
    let mut key = ContentKey {
        cek: [0u8; 16],
        nonce: [0u8; 12],
    };
    hkdf_expand(
        &prk,
        &[&b"Content-Encoding: aes128gcm\0"[..]],
        &mut key.cek,
    )?;
    hkdf_expand(&prk, &[&b"Content-Encoding: nonce\0"[..]], &mut key.nonce)?;
    Ok(key)
}

/// Encrypt `plaintext` for the user agent holding `ua_public` / `auth_secret`
pub fn encrypt(
    ua_public: &[u8],
    auth_secret: &[u8],
    plaintext: &[u8],
    rng: &dyn SecureRandom,
) -> Result<Vec<u8>, WebPushError> {
    if ua_public.len() != P256_PUBLIC_LEN {
        return Err(WebPushError::InvalidSubscriptionKey(format!(
            "p256dh must be {P256_PUBLIC_LEN} bytes, got {}",
            ua_public.len()
        )));
    }
    if auth_secret.len() != AUTH_SECRET_LEN {
        return Err(WebPushError::InvalidSubscriptionKey(format!(
            "auth must be {AUTH_SECRET_LEN} bytes, got {}",
            auth_secret.len()
        )));
    }
    if plaintext.len() > MAX_PLAINTEXT_LEN {
        return Err(WebPushError::PayloadTooLarge(plaintext.len()));
    }

    let as_private = agreement::EphemeralPrivateKey::generate(&agreement::ECDH_P256, rng)?;
    let as_public = as_private.compute_public_key()?;
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt)?;

    let ua_key = agreement::UnparsedPublicKey::new(&agreement::ECDH_P256, ua_public);
    let ecdh_secret = agreement::agree_ephemeral(as_private, &ua_key, |secret| secret.to_vec())?;

    let key = derive_content_key(
        &ecdh_secret,
        auth_secret,
        ua_public,
        as_public.as_ref(),
        &salt,
    )?;

    let sealing = aead::LessSafeKey::new(aead::UnboundKey::new(&aead::AES_128_GCM, &key.cek)?);
    let mut record = Vec::with_capacity(plaintext.len() + RECORD_OVERHEAD);
    record.extend_from_slice(plaintext);
    record.push(LAST_RECORD_DELIMITER);
    sealing.seal_in_place_append_tag(
        aead::Nonce::assume_unique_for_key(key.nonce),
        aead::Aad::empty(),
        &mut record,
    )?;

    let mut body = Vec::with_capacity(SALT_LEN + 4 + 1 + P256_PUBLIC_LEN + record.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    body.push(P256_PUBLIC_LEN as u8);
    body.extend_from_slice(as_public.as_ref());
    body.extend_from_slice(&record);
    Ok(body)
}

#[derive(Serialize)]
struct VapidClaims<'a> {
    aud: &'a str,
    exp: i64,
    sub: &'a str,
}

/// Application server identity (RFC 8292)
#[derive(Clone)]
pub struct VapidKeys {
    encoding_key: EncodingKey,
    /// Uncompressed P-256 point, base64url
    public_key: String,
    subject: String,
}

impl std::fmt::Debug for VapidKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidKeys")
            .field("public_key", &self.public_key)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl VapidKeys {
    /// Load the PKCS#8 signing key; the public key is derived from it and,
    /// when configured, must match `config.public_key`.
    pub fn from_config(config: &VapidConfig) -> Result<Self, WebPushError> {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let pem = pem::parse(config.private_key_pem.as_bytes())
            .map_err(|e| WebPushError::InvalidVapidKey(format!("PEM parse error: {e}")))?;
        if pem.tag() != "PRIVATE KEY" {
            return Err(WebPushError::InvalidVapidKey(format!(
                "expected PKCS#8 PRIVATE KEY, got {}",
                pem.tag()
            )));
        }
        let der = pem.into_contents();

        let rng = SystemRandom::new();
        let key_pair = signature::EcdsaKeyPair::from_pkcs8(
            &signature::ECDSA_P256_SHA256_FIXED_SIGNING,
            &der,
            &rng,
        )
        .map_err(|e| WebPushError::InvalidVapidKey(format!("not a P-256 key: {e}")))?;
        let public_key = URL_SAFE_NO_PAD.encode(signature::KeyPair::public_key(&key_pair));

        if let Some(configured) = config.public_key.as_deref()
            && configured.trim().trim_end_matches('=') != public_key
        {
            return Err(WebPushError::InvalidVapidKey(
                "VAPID_PUBLIC_KEY does not match the private key".into(),
            ));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_ec_der(&der),
            public_key,
            subject: config.subject.clone(),
        })
    }

    /// Base64url public key handed to browsers as `applicationServerKey`
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// `Authorization` header value for a request to `endpoint`
    pub fn authorization(&self, endpoint: &str, now_secs: i64) -> Result<String, WebPushError> {
        let url = reqwest::Url::parse(endpoint)
            .map_err(|e| WebPushError::InvalidEndpoint(e.to_string()))?;
        let audience = url.origin().ascii_serialization();
        let claims = VapidClaims {
            aud: &audience,
            exp: now_secs + VAPID_EXPIRY_SECS,
            sub: &self.subject,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::ES256),
            &claims,
            &self.encoding_key,
        )?;
        Ok(format!("vapid t={token}, k={}", self.public_key))
    }
}

/// Map a push service response status onto the delivery outcome
pub fn classify_status(status: reqwest::StatusCode) -> Result<(), DeliveryError> {
    if status.is_success() {
        return Ok(());
    }
    let reason = format!("push service responded {status}");
    match status.as_u16() {
        // The subscription itself is gone
        404 | 410 => Err(DeliveryError::Permanent(reason)),
        // Our VAPID identity or payload was refused; every device fails alike
        401 | 403 | 413 => {
            tracing::error!(status = %status, "Push service rejected our request, check VAPID keys and payload size");
            Err(DeliveryError::Transient(reason))
        }
        _ => Err(DeliveryError::Transient(reason)),
    }
}

/// Real Web Push delivery over HTTPS
pub struct WebPushTransport {
    client: reqwest::Client,
    vapid: VapidKeys,
    ttl_secs: u32,
    rng: SystemRandom,
}

impl WebPushTransport {
    pub fn new(vapid: VapidKeys, ttl_secs: u32) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            vapid,
            ttl_secs,
            rng: SystemRandom::new(),
        })
    }

    fn prepare(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
    ) -> Result<(Vec<u8>, String), WebPushError> {
        let ua_public = decode_b64url(&subscription.p256dh)
            .map_err(|e| WebPushError::InvalidSubscriptionKey(format!("p256dh: {e}")))?;
        let auth = decode_b64url(&subscription.auth)
            .map_err(|e| WebPushError::InvalidSubscriptionKey(format!("auth: {e}")))?;
        let body = encrypt(&ua_public, &auth, payload, &self.rng)?;
        let authorization = self
            .vapid
            .authorization(&subscription.endpoint, chrono::Utc::now().timestamp())?;
        Ok((body, authorization))
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
    ) -> Result<(), DeliveryError> {
        let (body, authorization) = self
            .prepare(subscription, payload)
            .map_err(|e| match e {
                // Retrying cannot fix a bad key or endpoint
                WebPushError::InvalidSubscriptionKey(_) | WebPushError::InvalidEndpoint(_) => {
                    DeliveryError::Permanent(e.to_string())
                }
                _ => DeliveryError::Transient(e.to_string()),
            })?;

        let response = self
            .client
            .post(&subscription.endpoint)
            .header("TTL", self.ttl_secs.to_string())
            .header("Content-Encoding", "aes128gcm")
            .header("Content-Type", "application/octet-stream")
            .header("Urgency", "high")
            .header("Authorization", authorization)
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(e.to_string()))?;

        classify_status(response.status())
    }
}
