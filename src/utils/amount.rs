//! Exact native amounts.
//!
//! Every balance, fee and transfer value the engine touches is an integer count of the
//! currency's smallest unit. Amounts travel as decimal strings on the wire and in the
//! persisted snapshot and are held as arbitrary-precision integers in memory, so no
//! arithmetic ever goes through floating point.

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;

/// Error returned when a string is not a valid integer amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid native amount: {0:?}")]
pub struct AmountParseError(pub String);

/// Signed amount in the smallest indivisible unit of a currency.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NativeAmount(BigInt);

impl NativeAmount {
	pub fn zero() -> Self {
		Self(BigInt::zero())
	}

	pub fn is_zero(&self) -> bool {
		self.0.is_zero()
	}

	pub fn is_positive(&self) -> bool {
		self.0.is_positive()
	}

	pub fn is_negative(&self) -> bool {
		self.0.is_negative()
	}

	/// Absolute value, used when rendering signed ledger entries.
	pub fn abs(&self) -> Self {
		Self(self.0.abs())
	}
}

impl FromStr for NativeAmount {
	type Err = AmountParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let digits = s.strip_prefix('-').unwrap_or(s);
		if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
			return Err(AmountParseError(s.to_string()));
		}
		BigInt::parse_bytes(s.as_bytes(), 10)
			.map(Self)
			.ok_or_else(|| AmountParseError(s.to_string()))
	}
}

impl fmt::Display for NativeAmount {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.0, f)
	}
}

impl From<u64> for NativeAmount {
	fn from(value: u64) -> Self {
		Self(BigInt::from(value))
	}
}

impl From<i64> for NativeAmount {
	fn from(value: i64) -> Self {
		Self(BigInt::from(value))
	}
}

impl Serialize for NativeAmount {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(&self.0)
	}
}

impl<'de> Deserialize<'de> for NativeAmount {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		raw.parse().map_err(serde::de::Error::custom)
	}
}

impl Add<&NativeAmount> for &NativeAmount {
	type Output = NativeAmount;

	fn add(self, rhs: &NativeAmount) -> NativeAmount {
		NativeAmount(&self.0 + &rhs.0)
	}
}

impl Add for NativeAmount {
	type Output = NativeAmount;

	fn add(self, rhs: NativeAmount) -> NativeAmount {
		NativeAmount(self.0 + rhs.0)
	}
}

impl Sub<&NativeAmount> for &NativeAmount {
	type Output = NativeAmount;

	fn sub(self, rhs: &NativeAmount) -> NativeAmount {
		NativeAmount(&self.0 - &rhs.0)
	}
}

impl Sub for NativeAmount {
	type Output = NativeAmount;

	fn sub(self, rhs: NativeAmount) -> NativeAmount {
		NativeAmount(self.0 - rhs.0)
	}
}

impl AddAssign<&NativeAmount> for NativeAmount {
	fn add_assign(&mut self, rhs: &NativeAmount) {
		self.0 += &rhs.0;
	}
}

impl<'a> Sum<&'a NativeAmount> for NativeAmount {
	fn sum<I: Iterator<Item = &'a NativeAmount>>(iter: I) -> Self {
		iter.fold(NativeAmount::zero(), |acc, amount| &acc + amount)
	}
}

impl Sum for NativeAmount {
	fn sum<I: Iterator<Item = NativeAmount>>(iter: I) -> Self {
		iter.fold(NativeAmount::zero(), |acc, amount| acc + amount)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn amount(s: &str) -> NativeAmount {
		s.parse().unwrap()
	}

	#[test]
	fn parses_integer_strings() {
		assert_eq!(amount("0"), NativeAmount::zero());
		assert_eq!(amount("-200").to_string(), "-200");
		assert_eq!(
			amount("340282366920938463463374607431768211457").to_string(),
			"340282366920938463463374607431768211457"
		);
	}

	#[test]
	fn rejects_non_integer_strings() {
		for bad in ["", "-", "1.5", " 1", "1_000", "+5", "abc", "1e3"] {
			assert!(bad.parse::<NativeAmount>().is_err(), "accepted {bad:?}");
		}
	}

	#[test]
	fn arithmetic_is_exact() {
		let big = amount("99999999999999999999999999");
		let sum = &big + &amount("1");
		assert_eq!(sum.to_string(), "100000000000000000000000000");
		assert_eq!((&amount("300") - &amount("500")).to_string(), "-200");

		let total: NativeAmount = [amount("700"), amount("500")].iter().sum();
		assert_eq!(total, amount("1200"));
	}

	#[test]
	fn serializes_as_decimal_string() {
		let json = serde_json::to_string(&amount("-42")).unwrap();
		assert_eq!(json, "\"-42\"");

		let parsed: NativeAmount = serde_json::from_str("\"600000\"").unwrap();
		assert_eq!(parsed, NativeAmount::from(600_000u64));

		assert!(serde_json::from_str::<NativeAmount>("600000").is_err());
		assert!(serde_json::from_str::<NativeAmount>("\"6.5\"").is_err());
	}
}
