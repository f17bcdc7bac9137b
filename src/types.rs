use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use bitcoin::hashes::{sha256, Hash as _};
use once_cell::sync::OnceCell;
use secp256k1::{
    ecdsa::Signature as Secp256k1Signature, All, Message, PublicKey, Secp256k1, SecretKey,
};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::serde_utils::SliceHex;

pub fn secp256k1_instance() -> &'static Secp256k1<All> {
    static INSTANCE: OnceCell<Secp256k1<All>> = OnceCell::new();
    INSTANCE.get_or_init(Secp256k1::new)
}

#[serde_as]
#[derive(Copy, Clone, Serialize, Deserialize, Hash, Eq, PartialEq, Ord, PartialOrd, Default)]
pub struct Hash256(#[serde_as(as = "SliceHex")] [u8; 32]);

impl From<[u8; 32]> for Hash256 {
    fn from(value: [u8; 32]) -> Self {
        Self(value)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Hash256 {
    pub fn into_inner(self) -> [u8; 32] {
        self.0
    }
}

impl fmt::LowerHex for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            write!(f, "0x")?;
        }
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Hash256({:#x})", self)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Hash256 {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_start_matches("0x");
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(anyhow!("invalid hash length"));
        }
        let mut data = [0u8; 32];
        data.copy_from_slice(&bytes);
        Ok(Hash256(data))
    }
}

/// The secret whose sha256 digest is a payment hash. Only the final hop (and
/// a settled control tower record) ever holds one.
#[serde_as]
#[derive(Copy, Clone, Serialize, Deserialize, Hash, Eq, PartialEq, Default)]
pub struct Preimage(#[serde_as(as = "SliceHex")] [u8; 32]);

impl Preimage {
    pub fn hash(&self) -> Hash256 {
        Hash256::from(sha256::Hash::hash(&self.0).to_byte_array())
    }
}

impl From<[u8; 32]> for Preimage {
    fn from(value: [u8; 32]) -> Self {
        Self(value)
    }
}

impl AsRef<[u8]> for Preimage {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Preimage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Preimage(0x{})", hex::encode(self.0))
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Privkey(pub SecretKey);

impl From<SecretKey> for Privkey {
    fn from(sk: SecretKey) -> Self {
        Self(sk)
    }
}

impl Privkey {
    pub fn from_slice(key: &[u8]) -> Self {
        SecretKey::from_slice(key)
            .expect("invalid secret key")
            .into()
    }

    pub fn pubkey(&self) -> Pubkey {
        Pubkey::from(self.0.public_key(secp256k1_instance()))
    }

    pub fn sign(&self, message: [u8; 32]) -> EcdsaSignature {
        let message = Message::from_digest(message);
        let sig = secp256k1_instance().sign_ecdsa(&message, &self.0);
        EcdsaSignature::from(sig)
    }
}

impl fmt::Debug for Privkey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Privkey(<hidden>)")
    }
}

/// A 33-byte compressed public key: the vertex identity of a node in the
/// channel graph.
#[derive(Copy, Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pubkey(pub PublicKey);

impl From<PublicKey> for Pubkey {
    fn from(pk: PublicKey) -> Pubkey {
        Pubkey(pk)
    }
}

impl From<Pubkey> for PublicKey {
    fn from(pk: Pubkey) -> Self {
        pk.0
    }
}

impl Pubkey {
    pub fn serialize(&self) -> [u8; 33] {
        self.0.serialize()
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.serialize()))
    }
}

#[derive(Copy, Clone, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct EcdsaSignature(pub Secp256k1Signature);

impl EcdsaSignature {
    pub fn verify(&self, pubkey: &Pubkey, message: &[u8; 32]) -> bool {
        let message = Message::from_digest(*message);
        secp256k1_instance()
            .verify_ecdsa(&message, &self.0, &pubkey.0)
            .is_ok()
    }
}

impl From<Secp256k1Signature> for EcdsaSignature {
    fn from(sig: Secp256k1Signature) -> Self {
        Self(sig)
    }
}

/// 64-bit wire encoding of a channel id: 24-bit funding block height, 24-bit
/// transaction index within the block, 16-bit output index within the
/// transaction.
#[derive(Copy, Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShortChannelId {
    pub block_height: u32,
    pub tx_index: u32,
    pub output_index: u16,
}

impl ShortChannelId {
    pub fn new(block_height: u32, tx_index: u32, output_index: u16) -> Self {
        Self {
            block_height,
            tx_index,
            output_index,
        }
    }

    pub fn from_u64(value: u64) -> Self {
        Self {
            block_height: ((value >> 40) & 0xff_ffff) as u32,
            tx_index: ((value >> 16) & 0xff_ffff) as u32,
            output_index: (value & 0xffff) as u16,
        }
    }

    pub fn to_u64(&self) -> u64 {
        ((self.block_height as u64) << 40)
            | ((self.tx_index as u64) << 16)
            | self.output_index as u64
    }
}

impl fmt::Display for ShortChannelId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.block_height, self.tx_index, self.output_index
        )
    }
}

/// Fee rate in satoshi per 1000 weight units.
#[derive(
    Copy, Clone, Debug, Default, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct FeeRatePerKw(pub u64);

impl FeeRatePerKw {
    pub fn fee_for_weight(&self, weight: u64) -> u64 {
        self.0 * weight / 1000
    }
}

impl fmt::Display for FeeRatePerKw {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} sat/kw", self.0)
    }
}

/// Canonical serialization used for signing digests. Gossip messages are
/// signed over the sha256 of this encoding with the signature field unset.
pub(crate) fn deterministically_serialize<T: Serialize>(v: &T) -> Vec<u8> {
    serde_json::to_vec_pretty(v).expect("serialize value")
}

pub(crate) fn deterministically_hash<T: Serialize>(v: &T) -> [u8; 32] {
    sha256::Hash::hash(&deterministically_serialize(v)).to_byte_array()
}

/// A directed channel policy as it travels in gossip and inside onion
/// failure messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelUpdate {
    /// Signature by the node publishing this policy. May be empty while the
    /// message is being constructed.
    pub signature: Option<EcdsaSignature>,
    pub chain_hash: Hash256,
    pub channel_id: u64,
    pub timestamp: u64,
    pub message_flags: u8,
    pub channel_flags: u8,
    pub time_lock_delta: u16,
    pub htlc_minimum_msat: u64,
    pub htlc_maximum_msat: u64,
    pub fee_base_msat: u64,
    pub fee_proportional_millionths: u64,
}

impl ChannelUpdate {
    pub fn message_to_sign(&self) -> [u8; 32] {
        let unsigned = ChannelUpdate {
            signature: None,
            ..self.clone()
        };
        deterministically_hash(&unsigned)
    }

    pub fn sign(&mut self, private_key: &Privkey) {
        self.signature = Some(private_key.sign(self.message_to_sign()));
    }

    pub fn verify(&self, pubkey: &Pubkey) -> bool {
        match &self.signature {
            Some(sig) => sig.verify(pubkey, &self.message_to_sign()),
            None => false,
        }
    }
}

/// Onion-level failure reported for a payment attempt, after decryption.
/// The variants mirror the wire taxonomy; several carry the channel update
/// the failing node attached to justify its view of the edge.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureMessage {
    UnknownPaymentHash,
    IncorrectPaymentAmount,
    FinalIncorrectCltvExpiry,
    FinalIncorrectHtlcAmount,
    FinalExpiryTooSoon,
    InvalidRealm,
    InvalidOnionVersion,
    InvalidOnionHmac,
    InvalidOnionKey,
    ExpiryTooSoon { update: ChannelUpdate },
    AmountBelowMinimum { htlc_msat: u64, update: ChannelUpdate },
    FeeInsufficient { htlc_msat: u64, update: ChannelUpdate },
    IncorrectCltvExpiry { cltv_expiry: u32, update: ChannelUpdate },
    ChannelDisabled { update: ChannelUpdate },
    TemporaryChannelFailure { update: Option<ChannelUpdate> },
    UnknownNextPeer,
    TemporaryNodeFailure,
    PermanentNodeFailure,
    RequiredNodeFeatureMissing,
    RequiredChannelFeatureMissing,
    ExpiryTooFar,
    PermanentChannelFailure,
}

impl FailureMessage {
    pub fn code_name(&self) -> &'static str {
        match self {
            FailureMessage::UnknownPaymentHash => "UnknownPaymentHash",
            FailureMessage::IncorrectPaymentAmount => "IncorrectPaymentAmount",
            FailureMessage::FinalIncorrectCltvExpiry => "FinalIncorrectCltvExpiry",
            FailureMessage::FinalIncorrectHtlcAmount => "FinalIncorrectHtlcAmount",
            FailureMessage::FinalExpiryTooSoon => "FinalExpiryTooSoon",
            FailureMessage::InvalidRealm => "InvalidRealm",
            FailureMessage::InvalidOnionVersion => "InvalidOnionVersion",
            FailureMessage::InvalidOnionHmac => "InvalidOnionHmac",
            FailureMessage::InvalidOnionKey => "InvalidOnionKey",
            FailureMessage::ExpiryTooSoon { .. } => "ExpiryTooSoon",
            FailureMessage::AmountBelowMinimum { .. } => "AmountBelowMinimum",
            FailureMessage::FeeInsufficient { .. } => "FeeInsufficient",
            FailureMessage::IncorrectCltvExpiry { .. } => "IncorrectCltvExpiry",
            FailureMessage::ChannelDisabled { .. } => "ChannelDisabled",
            FailureMessage::TemporaryChannelFailure { .. } => "TemporaryChannelFailure",
            FailureMessage::UnknownNextPeer => "UnknownNextPeer",
            FailureMessage::TemporaryNodeFailure => "TemporaryNodeFailure",
            FailureMessage::PermanentNodeFailure => "PermanentNodeFailure",
            FailureMessage::RequiredNodeFeatureMissing => "RequiredNodeFeatureMissing",
            FailureMessage::RequiredChannelFeatureMissing => "RequiredChannelFeatureMissing",
            FailureMessage::ExpiryTooFar => "ExpiryTooFar",
            FailureMessage::PermanentChannelFailure => "PermanentChannelFailure",
        }
    }
}

impl fmt::Display for FailureMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.code_name())
    }
}

/// A decrypted forwarding failure: which vertex reported it and what it said.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardingError {
    pub error_source: Pubkey,
    pub failure: FailureMessage,
}

impl fmt::Display for ForwardingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} reported by {}", self.failure, self.error_source)
    }
}

/// Fully wrapped sphinx packet, ready for inclusion in an htlc add message.
#[derive(Debug, Clone, PartialEq)]
pub struct OnionPacket(pub Vec<u8>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_channel_id_round_trip() {
        let id = ShortChannelId::new(600_000, 1024, 7);
        assert_eq!(ShortChannelId::from_u64(id.to_u64()), id);
        assert_eq!(id.to_string(), "600000:1024:7");

        let max = ShortChannelId::new(0xff_ffff, 0xff_ffff, 0xffff);
        assert_eq!(ShortChannelId::from_u64(max.to_u64()), max);
    }

    #[test]
    fn test_preimage_hash() {
        let preimage = Preimage::from([42u8; 32]);
        let hash = preimage.hash();
        assert_eq!(hash, preimage.hash());
        assert_ne!(hash, Preimage::from([43u8; 32]).hash());
    }

    #[test]
    fn test_channel_update_signing() {
        let key = Privkey::from_slice(&[0xcd; 32]);
        let mut update = ChannelUpdate {
            signature: None,
            chain_hash: Hash256::default(),
            channel_id: ShortChannelId::new(100, 1, 0).to_u64(),
            timestamp: 1_700_000_000,
            message_flags: 1,
            channel_flags: 0,
            time_lock_delta: 144,
            htlc_minimum_msat: 1_000,
            htlc_maximum_msat: 100_000_000,
            fee_base_msat: 1_000,
            fee_proportional_millionths: 100,
        };
        update.sign(&key);
        assert!(update.verify(&key.pubkey()));

        let other = Privkey::from_slice(&[0xab; 32]);
        assert!(!update.verify(&other.pubkey()));

        let mut tampered = update.clone();
        tampered.fee_base_msat += 1;
        assert!(!tampered.verify(&key.pubkey()));
    }

    #[test]
    fn test_hash256_hex_round_trip() {
        let hash: Hash256 = [7u8; 32].into();
        let parsed: Hash256 = hash.to_string().parse().unwrap();
        assert_eq!(hash, parsed);
    }
}
