//! Primitive types shared by evaluators, the registry and the runtime.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable prefix of every policy rejection reason.
///
/// Callers can pattern-match on it; transport errors never carry it.
pub const REJECTION_PREFIX: &str = "firewall rejected";

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    hex::decode(digits).map_err(|e| Error::Parse(format!("invalid hex '{s}': {e}")))
}

/// A 20-byte account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = decode_hex(s)?;
        let array: [u8; 20] = bytes.try_into().map_err(|b: Vec<u8>| {
            Error::Parse(format!("address must be 20 bytes, got {}", b.len()))
        })?;
        Ok(Self(array))
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A 4-byte function selector (the first four bytes of calldata).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Selector(pub [u8; 4]);

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = decode_hex(s)?;
        let array: [u8; 4] = bytes.try_into().map_err(|b: Vec<u8>| {
            Error::Parse(format!("selector must be 4 bytes, got {}", b.len()))
        })?;
        Ok(Self(array))
    }
}

impl TryFrom<String> for Selector {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Selector> for String {
    fn from(sel: Selector) -> Self {
        sel.to_string()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Raw calldata, hex encoded on the wire (`0x` for empty).
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Calldata(pub Vec<u8>);

impl Calldata {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The function selector, if the calldata is long enough to hold one.
    pub fn selector(&self) -> Option<Selector> {
        let head: [u8; 4] = self.0.get(..4)?.try_into().ok()?;
        Some(Selector(head))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for Calldata {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        decode_hex(s).map(Self)
    }
}

impl TryFrom<String> for Calldata {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Calldata> for String {
    fn from(data: Calldata) -> Self {
        data.to_string()
    }
}

impl fmt::Display for Calldata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for Calldata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Serde adapter carrying a wei amount as a decimal string.
///
/// Accepts decimal strings, `0x` hex strings and bare JSON integers on input.
pub mod wei {
    use serde::{Deserialize, Deserializer, Serializer, de};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(u128::from(n)),
            Raw::Text(s) => parse(&s).map_err(de::Error::custom),
        }
    }

    pub fn parse(s: &str) -> Result<u128, String> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(0);
        }
        match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) if hex.is_empty() => Ok(0),
            Some(hex) => {
                u128::from_str_radix(hex, 16).map_err(|e| format!("invalid wei '{s}': {e}"))
            }
            None => s.parse().map_err(|e| format!("invalid wei '{s}': {e}")),
        }
    }
}

/// A proposed call, immutable once submitted for approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    #[serde(default)]
    pub data: Calldata,
    #[serde(default, with = "wei")]
    pub value: u128,
}

impl TransactionRequest {
    pub fn new(from: Address, to: Address) -> Self {
        Self {
            from,
            to,
            data: Calldata::default(),
            value: 0,
        }
    }

    pub fn with_data(mut self, data: Calldata) -> Self {
        self.data = data;
        self
    }

    pub fn with_value(mut self, value: u128) -> Self {
        self.value = value;
        self
    }
}

/// The kinds of policy the firewall knows how to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Allowlist,
    Combined,
    ApprovedCalls,
    Fixed,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Allowlist => "allowlist",
            Self::Combined => "combined",
            Self::ApprovedCalls => "approved_calls",
            Self::Fixed => "fixed",
        };
        f.write_str(name)
    }
}

/// Opaque handle naming a policy instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyRef {
    pub address: Address,
    pub kind: PolicyKind,
}

impl fmt::Display for PolicyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} policy {}", self.kind, self.address)
    }
}

/// Evaluation context for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationContext {
    /// The protected target whose policies are being evaluated.
    pub consumer: Address,
}

impl EvaluationContext {
    pub fn for_request(request: &TransactionRequest) -> Self {
        Self {
            consumer: request.to,
        }
    }
}

/// Result of evaluating a request against a consumer's policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Deny on behalf of the given policy, with a reason carrying the stable prefix.
    pub fn denied_by(policy: &PolicyRef) -> Self {
        Decision::Deny {
            reason: format!("{REJECTION_PREFIX}: {policy} denied call"),
        }
    }
}
