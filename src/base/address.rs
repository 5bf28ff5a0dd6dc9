use serde_derive::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::error::Error;
use std::fmt;
use std::str::FromStr;

/// IEEE 64-bit long address of a lamp endpoint.
///
/// Displayed as eight colon separated hex bytes, in the order the bytes
/// appear on the wire, e.g. `5d:23:38:fe:ff:f8:e2:44`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LampAddress([u8; 8]);

impl LampAddress {
    pub const fn new(bytes: [u8; 8]) -> LampAddress {
        LampAddress(bytes)
    }

    pub fn bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub fn value(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }
}

impl From<u64> for LampAddress {
    fn from(v: u64) -> Self {
        LampAddress(v.to_be_bytes())
    }
}

impl fmt::Display for LampAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AddressError {
    WrongLength(usize),
    InvalidByte(String),
}

impl Error for AddressError {}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::WrongLength(n) => {
                write!(f, "Long address must have 8 bytes, got {}", n)
            }
            AddressError::InvalidByte(b) => write!(f, "Invalid address byte '{}'", b),
        }
    }
}

impl FromStr for LampAddress {
    type Err = AddressError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // Accept both "5d:23:..." and a plain 16 digit hex string
        let parts: Vec<&str> = if s.contains(':') {
            s.split(':').collect()
        } else if s.len() == 16 && s.is_ascii() {
            (0..8).map(|i| &s[i * 2..i * 2 + 2]).collect()
        } else {
            return Err(AddressError::WrongLength(s.len() / 2));
        };
        if parts.len() != 8 {
            return Err(AddressError::WrongLength(parts.len()));
        }
        let mut bytes = [0u8; 8];
        for (b, p) in bytes.iter_mut().zip(parts) {
            *b = u8::from_str_radix(p, 16).map_err(|_| AddressError::InvalidByte(p.to_string()))?;
        }
        Ok(LampAddress(bytes))
    }
}

impl TryFrom<String> for LampAddress {
    type Error = AddressError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<LampAddress> for String {
    fn from(a: LampAddress) -> Self {
        a.to_string()
    }
}

#[test]
fn long_address_test() {
    let a: LampAddress = "5d:23:38:fe:ff:f8:e2:44".parse().unwrap();
    assert_eq!(a.bytes(), &[0x5d, 0x23, 0x38, 0xfe, 0xff, 0xf8, 0xe2, 0x44]);
    assert_eq!(a.to_string(), "5d:23:38:fe:ff:f8:e2:44");

    let b: LampAddress = "5d2338fefff8e244".parse().unwrap();
    assert_eq!(a, b);
    assert_eq!(LampAddress::from(b.value()), a);

    assert_eq!(
        "5d:23:38".parse::<LampAddress>(),
        Err(AddressError::WrongLength(3))
    );
    assert_eq!(
        "5d:23:38:fe:ff:f8:e2:4g".parse::<LampAddress>(),
        Err(AddressError::InvalidByte("4g".to_string()))
    );
}
