//! Typed-data signing for off-chain orders.
//!
//! Payloads hash field-by-field into 32-byte words under a type string, and the
//! struct hash is bound to a domain (protocol name, version, chain id, contract
//! address) before signing. Signatures are Ed25519 and carry the signer's public
//! key; the signer's address is derived from that key.
//!
//! Verification sits behind [`SignatureVerifier`] so settlement code only ever
//! sees `(domain, payload, signature) -> address`.

use crate::d18;
use crate::types::Address;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub const DOMAIN_NAME: &str = "PolynomialPerpetualFutures";
pub const DOMAIN_VERSION: &str = "1";
pub const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

pub type Word = [u8; 32];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SigningError {
    #[error("Invalid public key encoding")]
    InvalidPublicKey,

    #[error("Invalid signature encoding")]
    InvalidSignatureEncoding,

    #[error("Signature verification failed")]
    VerificationFailed,

    #[error("Field {0} does not fit a 32-byte word")]
    ValueOutOfRange(&'static str),
}

pub fn hash(bytes: &[u8]) -> Word {
    Sha256::digest(bytes).into()
}

pub fn word_u64(value: u64) -> Word {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

// two's complement, sign extended to 256 bits
pub fn word_i128(value: i128) -> Word {
    let mut word = if value < 0 { [0xffu8; 32] } else { [0u8; 32] };
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn word_bool(value: bool) -> Word {
    word_u64(value as u64)
}

// D18 quantities are signed as their raw integer
pub fn word_decimal(field: &'static str, value: Decimal) -> Result<Word, SigningError> {
    d18::to_raw(value)
        .map(word_i128)
        .ok_or(SigningError::ValueOutOfRange(field))
}

/// Something that can be hashed as a typed-data struct.
pub trait TypedData {
    const TYPE_STRING: &'static str;

    fn encode_fields(&self) -> Result<Vec<Word>, SigningError>;

    fn type_hash() -> Word {
        hash(Self::TYPE_STRING.as_bytes())
    }

    fn struct_hash(&self) -> Result<Word, SigningError> {
        let mut hasher = Sha256::new();
        hasher.update(Self::type_hash());
        for word in self.encode_fields()? {
            hasher.update(word);
        }
        Ok(hasher.finalize().into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl Eip712Domain {
    pub fn new(chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            name: DOMAIN_NAME.to_string(),
            version: DOMAIN_VERSION.to_string(),
            chain_id,
            verifying_contract,
        }
    }

    pub fn separator(&self) -> Word {
        let mut hasher = Sha256::new();
        hasher.update(hash(DOMAIN_TYPE.as_bytes()));
        hasher.update(hash(self.name.as_bytes()));
        hasher.update(hash(self.version.as_bytes()));
        hasher.update(word_u64(self.chain_id));
        hasher.update(self.verifying_contract.to_word());
        hasher.finalize().into()
    }

    // sha256(0x19 0x01 ‖ separator ‖ structHash)
    pub fn digest(&self, struct_hash: &Word) -> Word {
        let mut hasher = Sha256::new();
        hasher.update([0x19u8, 0x01u8]);
        hasher.update(self.separator());
        hasher.update(struct_hash);
        hasher.finalize().into()
    }
}

/// Hex encoded Ed25519 signature plus the key that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSignature {
    pub public_key: String,
    pub signature: String,
}

pub trait SignatureVerifier: fmt::Debug {
    /// Returns the signer's address when `signature` is valid for `struct_hash`
    /// under `domain`.
    fn recover(
        &self,
        domain: &Eip712Domain,
        struct_hash: &Word,
        signature: &OrderSignature,
    ) -> Result<Address, SigningError>;
}

pub fn recover_signer<T: TypedData>(
    verifier: &dyn SignatureVerifier,
    domain: &Eip712Domain,
    payload: &T,
    signature: &OrderSignature,
) -> Result<Address, SigningError> {
    let struct_hash = payload.struct_hash()?;
    verifier.recover(domain, &struct_hash, signature)
}

pub fn address_of(key: &VerifyingKey) -> Address {
    let digest = hash(key.as_bytes());
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[12..]);
    Address(bytes)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn recover(
        &self,
        domain: &Eip712Domain,
        struct_hash: &Word,
        signature: &OrderSignature,
    ) -> Result<Address, SigningError> {
        let key_bytes: [u8; 32] = hex::decode(&signature.public_key)
            .map_err(|_| SigningError::InvalidPublicKey)?
            .try_into()
            .map_err(|_| SigningError::InvalidPublicKey)?;
        let sig_bytes: [u8; 64] = hex::decode(&signature.signature)
            .map_err(|_| SigningError::InvalidSignatureEncoding)?
            .try_into()
            .map_err(|_| SigningError::InvalidSignatureEncoding)?;

        let verifying_key =
            VerifyingKey::from_bytes(&key_bytes).map_err(|_| SigningError::InvalidPublicKey)?;
        let sig = Signature::from_bytes(&sig_bytes);

        verifying_key
            .verify(&domain.digest(struct_hash), &sig)
            .map_err(|_| SigningError::VerificationFailed)?;
        Ok(address_of(&verifying_key))
    }
}

/// Client side key holder. Used by tests and the simulator to produce orders.
pub struct OrderSigner {
    key: SigningKey,
}

impl OrderSigner {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn address(&self) -> Address {
        address_of(&self.key.verifying_key())
    }

    pub fn sign<T: TypedData>(&self, domain: &Eip712Domain, payload: &T) -> Result<OrderSignature, SigningError> {
        let digest = domain.digest(&payload.struct_hash()?);
        let signature = self.key.sign(&digest);
        Ok(OrderSignature {
            public_key: hex::encode(self.key.verifying_key().to_bytes()),
            signature: hex::encode(signature.to_bytes()),
        })
    }
}

impl fmt::Debug for OrderSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrderSigner({})", self.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct Ping {
        account: u64,
        nonce: u64,
        amount: Decimal,
    }

    impl TypedData for Ping {
        const TYPE_STRING: &'static str = "Ping(uint128 account,uint256 nonce,int128 amount)";

        fn encode_fields(&self) -> Result<Vec<Word>, SigningError> {
            Ok(vec![
                word_u64(self.account),
                word_u64(self.nonce),
                word_decimal("amount", self.amount)?,
            ])
        }
    }

    fn domain() -> Eip712Domain {
        Eip712Domain::new(13370, Address::from_label("perps-market"))
    }

    fn ping() -> Ping {
        Ping {
            account: 2,
            nonce: 7,
            amount: dec!(-1.5),
        }
    }

    #[test]
    fn sign_and_recover() {
        let signer = OrderSigner::from_seed([7u8; 32]);
        let sig = signer.sign(&domain(), &ping()).unwrap();
        let recovered = recover_signer(&Ed25519Verifier, &domain(), &ping(), &sig).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn tampered_payload_fails() {
        let signer = OrderSigner::from_seed([7u8; 32]);
        let sig = signer.sign(&domain(), &ping()).unwrap();
        let mut other = ping();
        other.nonce = 8;
        assert_eq!(
            recover_signer(&Ed25519Verifier, &domain(), &other, &sig),
            Err(SigningError::VerificationFailed)
        );
    }

    #[test]
    fn signature_is_bound_to_domain() {
        let signer = OrderSigner::from_seed([9u8; 32]);
        let sig = signer.sign(&domain(), &ping()).unwrap();
        let other_chain = Eip712Domain::new(1, Address::from_label("perps-market"));
        assert_eq!(
            recover_signer(&Ed25519Verifier, &other_chain, &ping(), &sig),
            Err(SigningError::VerificationFailed)
        );
    }

    #[test]
    fn malformed_encodings() {
        let signer = OrderSigner::from_seed([1u8; 32]);
        let mut sig = signer.sign(&domain(), &ping()).unwrap();
        sig.signature = "zz".to_string();
        assert_eq!(
            recover_signer(&Ed25519Verifier, &domain(), &ping(), &sig),
            Err(SigningError::InvalidSignatureEncoding)
        );
        sig.public_key = "00".to_string();
        assert_eq!(
            recover_signer(&Ed25519Verifier, &domain(), &ping(), &sig),
            Err(SigningError::InvalidPublicKey)
        );
    }

    #[test]
    fn word_encodings() {
        assert_eq!(word_u64(1)[31], 1);
        assert_eq!(word_i128(-1), [0xffu8; 32]);
        assert_eq!(word_bool(true), word_u64(1));
        // 1.0 is 10^18 raw
        assert_eq!(word_decimal("x", dec!(1)).unwrap(), word_i128(1_000_000_000_000_000_000));
    }

    #[test]
    fn distinct_signers_distinct_addresses() {
        let a = OrderSigner::from_seed([1u8; 32]);
        let b = OrderSigner::from_seed([2u8; 32]);
        assert_ne!(a.address(), b.address());
    }
}
