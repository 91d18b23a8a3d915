//! Value objects shared by carts and orders.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Product identifier (SKU).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a new product ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the product ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Money amount in minor currency units, avoiding floating point issues.
///
/// The payment provider is also addressed in minor units, so the value is
/// passed through unchanged when a session is created.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money {
    cents: i64,
}

impl Money {
    /// Creates a new amount from minor units (e.g. 2500 = 25.00).
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new amount from whole major units.
    pub fn from_major(units: i64) -> Self {
        Self { cents: units * 100 }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in minor units.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents * i64::from(quantity),
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents + rhs.cents,
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents += rhs.cents;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// Where an order is shipped.
///
/// The address travels through the payment provider as session metadata,
/// so it has a flat string-map form as well.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub details: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, alias = "postal_code", skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

impl ShippingAddress {
    /// Checks that the fields needed to deliver are present.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.details.trim().is_empty() {
            return Err(DomainError::InvalidAddress("details must not be empty".into()));
        }
        if self.city.trim().is_empty() {
            return Err(DomainError::InvalidAddress("city must not be empty".into()));
        }
        Ok(())
    }

    /// Flattens the address into provider metadata entries.
    pub fn to_metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        metadata.insert("details".to_string(), self.details.clone());
        metadata.insert("city".to_string(), self.city.clone());
        if let Some(phone) = &self.phone {
            metadata.insert("phone".to_string(), phone.clone());
        }
        if let Some(postal_code) = &self.postal_code {
            metadata.insert("postal_code".to_string(), postal_code.clone());
        }
        metadata
    }

    /// Rebuilds an address from provider metadata.
    ///
    /// Missing keys become empty; the address was validated when the session
    /// was created and payment has already been taken by the time this runs.
    pub fn from_metadata(metadata: &BTreeMap<String, String>) -> Self {
        Self {
            details: metadata.get("details").cloned().unwrap_or_default(),
            city: metadata.get("city").cloned().unwrap_or_default(),
            phone: metadata.get("phone").cloned(),
            postal_code: metadata.get("postal_code").cloned(),
        }
    }
}
