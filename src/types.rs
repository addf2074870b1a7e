// 1.0: all the primitives live here. nothing in the engine works without these types.
// IDs, addresses, prices, sizes, timestamps. each is a newtype so the compiler catches type mixups.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::iter::Sum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarketId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub u64);

// collateral type id. 0 is always the USD stable collateral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollateralId(pub u32);

impl CollateralId {
    pub const USD: CollateralId = CollateralId(0);
}

// oracle feed id. markets and collateral types point at one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedId(pub u32);

// 1.1: 20-byte actor address. owners, relayers, keepers and signers all use this.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    // deterministic address for actors that never sign anything (owner, keepers)
    pub fn from_label(label: &str) -> Self {
        let digest = Sha256::digest(label.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[12..]);
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    // right aligned in a 32-byte word, the way typed data encodes addresses
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

// 1.2: bytes32 tracking code attached to orders for attribution
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TrackingCode(pub [u8; 32]);

impl TrackingCode {
    pub const NONE: TrackingCode = TrackingCode([0u8; 32]);

    // utf8 bytes, right padded with zeros. anything past 32 bytes is cut.
    pub fn from_text(text: &str) -> Self {
        let mut bytes = [0u8; 32];
        let raw = text.as_bytes();
        let len = raw.len().min(32);
        bytes[..len].copy_from_slice(&raw[..len]);
        Self(bytes)
    }

    pub fn as_text(&self) -> String {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(32);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl fmt::Debug for TrackingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrackingCode({:?})", self.as_text())
    }
}

// Long = profit when price goes up. Short = profit when price goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

// 1.3: signed size: positive = long, negative = short. core to all position math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignedSize(Decimal);

impl SignedSize {
    pub fn new(size: Decimal) -> Self {
        Self(size)
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn abs(&self) -> Decimal {
        self.0.abs()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_long(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn side(&self) -> Option<Side> {
        if self.is_long() {
            Some(Side::Long)
        } else if self.is_short() {
            Some(Side::Short)
        } else {
            None
        }
    }

    pub fn add(&self, delta: Decimal) -> Self {
        Self(self.0 + delta)
    }
}

impl fmt::Display for SignedSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.4: price in quote currency per unit of base. must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn new_unchecked(value: Decimal) -> Self {
        debug_assert!(value > Decimal::ZERO);
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.5: quote currency amount. collateral, margin, pnl, fees, interest all use this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Quote(Decimal);

impl Quote {
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn add(&self, other: Quote) -> Self {
        Self(self.0 + other.0)
    }

    pub fn sub(&self, other: Quote) -> Self {
        Self(self.0 - other.0)
    }

}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialOrd for Quote {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quote {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl Sum for Quote {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, q| acc.add(q))
    }
}

impl<'a> Sum<&'a Quote> for Quote {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, q| acc.add(*q))
    }
}

// 1.6: basis points. 100 bps = 1%, 10000 = 100%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bps(u32);

impl Bps {
    pub const MAX: Bps = Bps(10_000);

    pub fn new(bps: u32) -> Self {
        Self(bps)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn as_fraction(&self) -> Decimal {
        Decimal::new(self.0 as i64, 4)
    }

    // 10000 - bps, the multiplier left after a discount
    pub fn complement(&self) -> Decimal {
        Decimal::from(Self::MAX.0.saturating_sub(self.0))
    }
}

// 1.7: unix seconds. every accrual (funding, rollover, locks) counts whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> i64 {
        self.0
    }

    // saturates at the ends of the range. signed payloads carry arbitrary timestamps.
    pub fn plus(&self, secs: i64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    // seconds from self to later, never negative
    pub fn seconds_until(&self, later: Timestamp) -> i64 {
        later.0.saturating_sub(self.0).max(0)
    }

    pub fn to_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp(self.0, 0)
    }

    // raw seconds when outside chrono's range
    pub fn to_rfc3339(&self) -> String {
        self.to_datetime()
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| self.0.to_string())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn signed_size_operations() {
        let long = SignedSize::new(dec!(10));
        assert!(long.is_long());
        assert_eq!(long.abs(), dec!(10));
        assert_eq!(long.side(), Some(Side::Long));

        let short = SignedSize::new(dec!(-10));
        assert!(short.is_short());
        assert_eq!(short.value(), dec!(-10));
        assert_eq!(short.add(dec!(10)).side(), None);
    }

    #[test]
    fn bps_conversion() {
        assert_eq!(Bps::new(100).as_fraction(), dec!(0.01));
        assert_eq!(Bps::new(500).complement(), dec!(9500));
        // discounts above 100% clamp to nothing left
        assert_eq!(Bps::new(12_000).complement(), Decimal::ZERO);
    }

    #[test]
    fn address_labels_are_stable() {
        let a = Address::from_label("keeper");
        assert_eq!(a, Address::from_label("keeper"));
        assert_ne!(a, Address::from_label("relayer"));
        assert!(!a.is_zero());
        assert!(a.to_string().starts_with("0x"));
        assert_eq!(&a.to_word()[12..], &a.0);
    }

    #[test]
    fn tracking_code_round_trip() {
        let code = TrackingCode::from_text("polynomial");
        assert_eq!(code.as_text(), "polynomial");
        assert_eq!(TrackingCode::NONE.as_text(), "");
    }

    #[test]
    fn timestamp_arithmetic() {
        let t = Timestamp::from_secs(1_000);
        assert_eq!(t.plus(60).as_secs(), 1_060);
        assert_eq!(t.seconds_until(Timestamp::from_secs(1_500)), 500);
        assert_eq!(Timestamp::from_secs(1_500).seconds_until(t), 0);
        assert_eq!(Timestamp::from_secs(0).to_rfc3339(), "1970-01-01T00:00:00+00:00");
    }

    #[test]
    fn timestamp_arithmetic_saturates() {
        let end = Timestamp::from_secs(i64::MAX);
        assert_eq!(end.plus(120), end);
        assert_eq!(Timestamp::from_secs(i64::MIN).plus(-1).as_secs(), i64::MIN);
        assert_eq!(Timestamp::from_secs(i64::MIN).seconds_until(end), i64::MAX);
        assert_eq!(end.to_rfc3339(), i64::MAX.to_string());
    }
}
