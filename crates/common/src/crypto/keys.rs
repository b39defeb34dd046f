use std::fmt;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey as P256PublicKey, SecretKey as P256SecretKey};
use rand_core::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, Zeroizing};

/// Size of an uncompressed SEC1 P-256 point in bytes (0x04 || x || y)
pub const PUBLIC_KEY_SIZE: usize = 65;
/// Size of a P-256 private scalar in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;

const JWK_KTY: &str = "EC";
const JWK_CRV: &str = "P-256";
const JWK_KEY_OPS: [&str; 2] = ["deriveKey", "deriveBits"];

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Public half of an ECDH P-256 key pair
///
/// Serialized everywhere as the base64 (standard alphabet) encoding of the
/// 65-byte uncompressed point, which is what link pages publish and what
/// ephemeral keys embed in message blobs.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(P256PublicKey);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_base64()).finish()
    }
}

impl From<P256PublicKey> for PublicKey {
    fn from(key: P256PublicKey) -> Self {
        PublicKey(key)
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = KeyError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(KeyError::InvalidPublicKey(format!(
                "expected {} bytes, got {}",
                PUBLIC_KEY_SIZE,
                bytes.len()
            )));
        }
        let key = P256PublicKey::from_sec1_bytes(bytes)
            .map_err(|_| KeyError::InvalidPublicKey("point is not on P-256".to_string()))?;
        Ok(PublicKey(key))
    }
}

impl PublicKey {
    /// Parse a public key from base64 of the raw uncompressed point
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let bytes = STANDARD.decode(encoded.trim())?;
        Self::try_from(bytes.as_slice())
    }

    /// Uncompressed SEC1 encoding of the point
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        let point = self.0.to_encoded_point(false);
        let mut out = [0u8; PUBLIC_KEY_SIZE];
        out.copy_from_slice(point.as_bytes());
        out
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    pub(crate) fn inner(&self) -> &P256PublicKey {
        &self.0
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        PublicKey::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Private half of an ECDH P-256 key pair
///
/// Never leaves the device except passphrase-wrapped (see
/// [`wrap_private_key`](super::wrap_private_key)) or vault-encrypted. It
/// serializes as its [`PortablePrivateKey`] so that any record holding it can
/// be persisted as JSON.
#[derive(Clone)]
pub struct PrivateKey(P256SecretKey);

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public", &self.public())
            .finish_non_exhaustive()
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bytes() == other.0.to_bytes()
    }
}

impl Eq for PrivateKey {}

impl PrivateKey {
    /// Generate a new random private key using the OS RNG
    pub fn generate() -> Self {
        PrivateKey(P256SecretKey::random(&mut OsRng))
    }

    /// Build a private key from its raw 32-byte scalar
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != PRIVATE_KEY_SIZE {
            return Err(KeyError::InvalidPrivateKey(format!(
                "expected {} bytes, got {}",
                PRIVATE_KEY_SIZE,
                bytes.len()
            )));
        }
        let key = P256SecretKey::from_slice(bytes)
            .map_err(|_| KeyError::InvalidPrivateKey("scalar out of range".to_string()))?;
        Ok(PrivateKey(key))
    }

    pub fn to_bytes(&self) -> Zeroizing<[u8; PRIVATE_KEY_SIZE]> {
        let mut out = Zeroizing::new([0u8; PRIVATE_KEY_SIZE]);
        out.copy_from_slice(&self.0.to_bytes());
        out
    }

    /// Derive the matching public key
    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.public_key())
    }

    /// Export into the JWK-shaped portable record
    pub fn to_portable(&self) -> PortablePrivateKey {
        let point = self.0.public_key().to_encoded_point(false);
        // uncompressed points always carry both coordinates
        let (x, y) = match (point.x(), point.y()) {
            (Some(x), Some(y)) => (URL_SAFE_NO_PAD.encode(x), URL_SAFE_NO_PAD.encode(y)),
            _ => (String::new(), String::new()),
        };
        let d = self.to_bytes();
        PortablePrivateKey {
            kty: JWK_KTY.to_string(),
            crv: JWK_CRV.to_string(),
            x,
            y,
            d: URL_SAFE_NO_PAD.encode(&d[..]),
            ext: true,
            key_ops: JWK_KEY_OPS.iter().map(|op| op.to_string()).collect(),
        }
    }

    /// Import from the JWK-shaped portable record
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `kty` or `crv` name anything other than an EC P-256 key
    /// - `d` is not a valid scalar
    /// - `x`/`y` do not match the public point derived from `d`
    pub fn from_portable(portable: &PortablePrivateKey) -> Result<Self, KeyError> {
        if portable.kty != JWK_KTY || portable.crv != JWK_CRV {
            return Err(KeyError::InvalidPrivateKey(format!(
                "unsupported key type {}/{}",
                portable.kty, portable.crv
            )));
        }
        let d = Zeroizing::new(URL_SAFE_NO_PAD.decode(&portable.d)?);
        let key = Self::from_bytes(&d)?;

        let expected = key.to_portable();
        if expected.x != portable.x || expected.y != portable.y {
            return Err(KeyError::InvalidPrivateKey(
                "public coordinates do not match private scalar".to_string(),
            ));
        }
        Ok(key)
    }

    pub(crate) fn inner(&self) -> &P256SecretKey {
        &self.0
    }
}

impl Serialize for PrivateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_portable().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let portable = PortablePrivateKey::deserialize(deserializer)?;
        PrivateKey::from_portable(&portable).map_err(serde::de::Error::custom)
    }
}

/// JWK-shaped export of a private key
///
/// Carries the algorithm parameters (`kty`, `crv`) alongside the key
/// material so a wrapped or persisted key can be re-imported without
/// out-of-band knowledge of what it is. Coordinates and scalar are base64url
/// without padding.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortablePrivateKey {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub y: String,
    pub d: String,
    #[serde(default = "default_ext")]
    pub ext: bool,
    #[serde(default)]
    pub key_ops: Vec<String>,
}

fn default_ext() -> bool {
    true
}

impl fmt::Debug for PortablePrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortablePrivateKey")
            .field("kty", &self.kty)
            .field("crv", &self.crv)
            .field("x", &self.x)
            .field("y", &self.y)
            .finish_non_exhaustive()
    }
}

impl Drop for PortablePrivateKey {
    fn drop(&mut self) {
        self.d.zeroize();
    }
}

/// An ECDH P-256 key pair as stored and passed between modules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self::from_private(PrivateKey::generate())
    }

    pub fn from_private(private_key: PrivateKey) -> Self {
        Self {
            public_key: private_key.public(),
            private_key,
        }
    }
}

/// Create a fresh ECDH P-256 key pair
pub fn generate_key_pair() -> KeyPair {
    KeyPair::generate()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_public_key_base64_roundtrip() {
        let pair = generate_key_pair();
        let encoded = pair.public_key.to_base64();
        assert_eq!(STANDARD.decode(&encoded).unwrap().len(), PUBLIC_KEY_SIZE);
        assert_eq!(STANDARD.decode(&encoded).unwrap()[0], 0x04);

        let recovered = PublicKey::from_base64(&encoded).unwrap();
        assert_eq!(pair.public_key, recovered);
    }

    #[test]
    fn test_public_key_rejects_bad_input() {
        assert!(PublicKey::from_base64("not base64!").is_err());
        assert!(PublicKey::try_from([4u8; 33].as_slice()).is_err());

        // right length, but not a point on the curve
        let mut bogus = [0xFFu8; PUBLIC_KEY_SIZE];
        bogus[0] = 0x04;
        assert!(PublicKey::try_from(bogus.as_slice()).is_err());
    }

    #[test]
    fn test_portable_roundtrip() {
        let key = PrivateKey::generate();
        let portable = key.to_portable();
        assert_eq!(portable.kty, "EC");
        assert_eq!(portable.crv, "P-256");
        assert_eq!(portable.key_ops, vec!["deriveKey", "deriveBits"]);

        let recovered = PrivateKey::from_portable(&portable).unwrap();
        assert_eq!(key, recovered);
        assert_eq!(key.public(), recovered.public());
    }

    #[test]
    fn test_portable_rejects_mismatched_coordinates() {
        let key = PrivateKey::generate();
        let other = PrivateKey::generate();
        let mut portable = key.to_portable();
        portable.x = other.to_portable().x.clone();
        assert!(PrivateKey::from_portable(&portable).is_err());
    }

    #[test]
    fn test_portable_rejects_wrong_curve() {
        let mut portable = PrivateKey::generate().to_portable();
        portable.crv = "P-384".to_string();
        assert!(PrivateKey::from_portable(&portable).is_err());
    }

    #[test]
    fn test_key_pair_json_roundtrip() {
        let pair = generate_key_pair();
        let json = serde_json::to_value(&pair).unwrap();
        assert!(json["publicKey"].is_string());
        assert_eq!(json["privateKey"]["crv"], "P-256");

        let recovered: KeyPair = serde_json::from_value(json).unwrap();
        assert_eq!(pair, recovered);
    }

    #[test]
    fn test_debug_does_not_leak_scalar() {
        let key = PrivateKey::generate();
        let portable = key.to_portable();
        let debug = format!("{:?} {:?}", key, portable);
        assert!(!debug.contains(&portable.d));
    }
}
