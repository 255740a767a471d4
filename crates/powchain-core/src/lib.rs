use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod chain;
pub mod constants;
pub mod error;
pub mod mine;

pub use chain::{Chain, ChainConfig};
pub use error::{MiningError, ValidationError};
pub use mine::{CancelToken, MiningReport, MiningStrategy};

use constants::{GENESIS_FROM, GENESIS_TO, HASH_SIZE};

/// A SHA-256 digest. Displayed and serialized as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash(pub [u8; HASH_SIZE]);

impl Hash {
    /// Sentinel previous-hash of the genesis block and of unlinked candidates.
    pub const ZERO: Self = Self([0u8; HASH_SIZE]);

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut out = [0u8; HASH_SIZE];
        hex::decode_to_slice(s, &mut out)?;
        Ok(Self(out))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}..)", &self.to_hex()[..12])
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash::from_hex(&s).map_err(de::Error::custom)
    }
}

/// A transfer record. Carried as opaque payload: no field is checked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    from: String,
    to: String,
    amount: i64,
}

impl Transaction {
    pub fn new(from: impl Into<String>, to: impl Into<String>, amount: i64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            amount,
        }
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Length-prefixed encoding, so that e.g. ("ab", "c") and ("a", "bc") never collide.
    pub fn hash_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + self.from.len() + 8 + self.to.len() + 8);
        bytes.extend_from_slice(&(self.from.len() as u64).to_le_bytes());
        bytes.extend_from_slice(self.from.as_bytes());
        bytes.extend_from_slice(&(self.to.len() as u64).to_le_bytes());
        bytes.extend_from_slice(self.to.as_bytes());
        bytes.extend_from_slice(&self.amount.to_le_bytes());
        bytes
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: Hash,
    pub nonce: u64,
    pub hash: Hash,
}

impl Block {
    /// Build an unmined block stamped with the current time. The hash is
    /// computed for nonce 0.
    pub fn new(index: u64, transactions: Vec<Transaction>, previous_hash: Hash) -> Self {
        Self::with_timestamp(index, current_timestamp(), transactions, previous_hash)
    }

    pub fn with_timestamp(
        index: u64,
        timestamp: u64,
        transactions: Vec<Transaction>,
        previous_hash: Hash,
    ) -> Self {
        let mut block = Self {
            index,
            timestamp,
            transactions,
            previous_hash,
            nonce: 0,
            hash: Hash::ZERO,
        };
        block.hash = block.calculate_hash();
        block
    }

    /// The first block of every chain. It is never mined, so its hash carries
    /// no proof-of-work.
    pub fn genesis() -> Self {
        Self::new(
            0,
            vec![Transaction::new(GENESIS_FROM, GENESIS_TO, 0)],
            Hash::ZERO,
        )
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// Hasher state over every field except the nonce, which is always fed last.
    pub(crate) fn hash_prefix(&self) -> Sha256 {
        let mut hasher = Sha256::new();
        hasher.update(self.index.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update((self.transactions.len() as u64).to_le_bytes());
        for tx in &self.transactions {
            hasher.update(tx.hash_bytes());
        }
        hasher.update(self.previous_hash.as_bytes());
        hasher
    }

    pub fn calculate_hash(&self) -> Hash {
        hash_with_nonce(&self.hash_prefix(), self.nonce)
    }

    /// Whether the stored hash still matches the block's current contents.
    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        pow::meets_difficulty(&self.hash, difficulty)
    }

    /// Blocking proof-of-work: bump the nonce until the hash carries
    /// `max(difficulty, MIN_DIFFICULTY)` leading zero hex digits. Returns the
    /// number of nonce increments it took.
    ///
    /// There is no attempt cap. See [`mine::mine_block`] for the cancellable
    /// and parallel variants.
    pub fn mine(&mut self, difficulty: u32) -> u64 {
        let prefix = self.hash_prefix();
        // previous_hash may have changed since construction
        self.hash = hash_with_nonce(&prefix, self.nonce);
        let mut attempts = 0u64;
        while !pow::meets_difficulty(&self.hash, difficulty) {
            self.nonce = self.nonce.wrapping_add(1);
            self.hash = hash_with_nonce(&prefix, self.nonce);
            attempts += 1;
        }
        attempts
    }
}

pub(crate) fn hash_with_nonce(prefix: &Sha256, nonce: u64) -> Hash {
    let digest = prefix.clone().chain_update(nonce.to_le_bytes()).finalize();
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(&digest[..]);
    Hash(out)
}

/// Milliseconds since the Unix epoch; 0 if the clock reads earlier than that.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

pub mod pow {
    use super::Hash;
    use crate::constants::MIN_DIFFICULTY;

    pub fn effective_difficulty(difficulty: u32) -> u32 {
        difficulty.max(MIN_DIFFICULTY)
    }

    pub fn count_leading_zero_bits(hash: &Hash) -> u32 {
        let mut total = 0u32;
        for b in hash.as_bytes() {
            if *b == 0 {
                total += 8;
            } else {
                total += b.leading_zeros();
                break;
            }
        }
        total
    }

    /// Each leading '0' hex character is four leading zero bits.
    pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
        count_leading_zero_bits(hash) >= effective_difficulty(difficulty).saturating_mul(4)
    }
}
