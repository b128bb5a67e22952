//! Currency-tagged prices.
//!
//! Costs travel as strings such as `"$0.01"` or `"0.25 USD"` and are held as
//! an integer number of micro-units (1e-6 of the currency) so that budget
//! checks never compare floats.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

const MICROS_PER_UNIT: u64 = 1_000_000;
const MAX_FRACTION_DIGITS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cost {
    currency: String,
    micros: u64,
}

impl Cost {
    pub fn from_micros(currency: impl Into<String>, micros: u64) -> Self {
        Self {
            currency: currency.into(),
            micros,
        }
    }

    pub fn zero(currency: impl Into<String>) -> Self {
        Self::from_micros(currency, 0)
    }

    /// Currency symbol or code; empty when the amount was given bare.
    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn micros(&self) -> u64 {
        self.micros
    }

    /// True when this price is payable under `budget`.
    ///
    /// Amounts in different currencies are never comparable; a bare amount
    /// takes on the other side's currency.
    pub fn fits_within(&self, budget: &Cost) -> bool {
        let same_currency = self.currency.is_empty()
            || budget.currency.is_empty()
            || self.currency.eq_ignore_ascii_case(&budget.currency);
        same_currency && self.micros <= budget.micros
    }

    fn format_amount(&self) -> String {
        let whole = self.micros / MICROS_PER_UNIT;
        let fraction = format!("{:06}", self.micros % MICROS_PER_UNIT);
        let trimmed = fraction.trim_end_matches('0');
        let shown = if trimmed.len() < 2 {
            &fraction[..2]
        } else {
            trimmed
        };
        format!("{whole}.{shown}")
    }
}

impl std::fmt::Display for Cost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let amount = self.format_amount();
        if self.currency.is_empty() {
            write!(f, "{amount}")
        } else if self.currency.chars().any(char::is_alphanumeric) {
            write!(f, "{amount} {}", self.currency)
        } else {
            write!(f, "{}{amount}", self.currency)
        }
    }
}

impl FromStr for Cost {
    type Err = ProtocolError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ProtocolError::InvalidCost {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let s = input.trim();
        let start = s
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .ok_or_else(|| invalid("no amount"))?;
        let prefix = s[..start].trim();
        let rest = &s[start..];
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..end];
        let suffix = rest[end..].trim();

        if prefix.contains('-') {
            return Err(invalid("negative amount"));
        }
        if !prefix.is_empty() && !suffix.is_empty() {
            return Err(invalid("currency given twice"));
        }

        let micros = parse_micros(number).map_err(|reason| invalid(&reason))?;
        let currency = if prefix.is_empty() { suffix } else { prefix };
        Ok(Self::from_micros(currency, micros))
    }
}

impl TryFrom<String> for Cost {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cost> for String {
    fn from(cost: Cost) -> Self {
        cost.to_string()
    }
}

fn parse_micros(number: &str) -> Result<u64, String> {
    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err("no digits".into());
    }
    if frac_part.contains('.') {
        return Err("more than one decimal point".into());
    }
    if frac_part.len() > MAX_FRACTION_DIGITS {
        return Err(format!("more than {MAX_FRACTION_DIGITS} decimal places"));
    }

    let whole: u64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().map_err(|e| format!("{e}"))?
    };
    let fraction: u64 = if frac_part.is_empty() {
        0
    } else {
        format!("{frac_part:0<6}").parse().map_err(|e| format!("{e}"))?
    };

    whole
        .checked_mul(MICROS_PER_UNIT)
        .and_then(|w| w.checked_add(fraction))
        .ok_or_else(|| "amount too large".to_string())
}
