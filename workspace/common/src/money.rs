//! Immutable monetary amount bound to an ISO 4217 currency.
//!
//! Amounts are kept as `rust_decimal::Decimal`; the `rusty_money` ISO table is
//! used to validate currency codes and to render amounts for humans.

use std::fmt;
use std::ops::Neg;

use rust_decimal::Decimal;
use rusty_money::{iso, Money as IsoMoney};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by money arithmetic and construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The currency code is not in the ISO 4217 table.
    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    /// Two amounts in different currencies were combined.
    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },
}

/// A monetary amount in a single currency.
///
/// Instances are immutable; arithmetic returns new values and refuses to mix
/// currencies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "MoneyRepr", into = "MoneyRepr")]
pub struct Money {
    amount: Decimal,
    currency_code: String,
}

#[derive(Serialize, Deserialize)]
struct MoneyRepr {
    amount: Decimal,
    currency_code: String,
}

impl TryFrom<MoneyRepr> for Money {
    type Error = MoneyError;

    fn try_from(repr: MoneyRepr) -> Result<Self, Self::Error> {
        Money::new(repr.amount, &repr.currency_code)
    }
}

impl From<Money> for MoneyRepr {
    fn from(money: Money) -> Self {
        MoneyRepr {
            amount: money.amount,
            currency_code: money.currency_code,
        }
    }
}

impl Money {
    /// Creates a new amount, validating the currency code.
    pub fn new(amount: Decimal, currency_code: &str) -> Result<Self, MoneyError> {
        let code = currency_code.trim().to_ascii_uppercase();
        if iso::find(&code).is_none() {
            return Err(MoneyError::UnknownCurrency(currency_code.to_string()));
        }
        Ok(Self {
            amount,
            currency_code: code,
        })
    }

    /// Zero in the given currency.
    pub fn zero(currency_code: &str) -> Result<Self, MoneyError> {
        Self::new(Decimal::ZERO, currency_code)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency_code(&self) -> &str {
        &self.currency_code
    }

    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Adds two amounts of the same currency.
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(Money {
            amount: self.amount + other.amount,
            currency_code: self.currency_code.clone(),
        })
    }

    /// Subtracts `other` from `self`; both must share a currency.
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(Money {
            amount: self.amount - other.amount,
            currency_code: self.currency_code.clone(),
        })
    }

    /// Sums amounts into `currency_code`, failing on the first foreign currency.
    pub fn sum<'a, I>(currency_code: &str, items: I) -> Result<Money, MoneyError>
    where
        I: IntoIterator<Item = &'a Money>,
    {
        items
            .into_iter()
            .try_fold(Money::zero(currency_code)?, |acc, item| acc.checked_add(item))
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency_code != other.currency_code {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency_code.clone(),
                right: other.currency_code.clone(),
            });
        }
        Ok(())
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Self::Output {
        Money {
            amount: -self.amount,
            currency_code: self.currency_code,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match iso::find(&self.currency_code) {
            Some(currency) => write!(f, "{}", IsoMoney::from_decimal(self.amount, currency)),
            None => write!(f, "{} {}", self.amount, self.currency_code),
        }
    }
}
