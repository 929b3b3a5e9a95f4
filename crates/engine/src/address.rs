//! Addresses and memory identities

use std::fmt;

/// Location in the engine's address space
///
/// The null address is 0. Addresses are plain integers; whether one points
/// at live memory is for the engine to decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(u64);

impl Address {
    pub const NULL: Address = Address(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Address `bytes` further on
    pub const fn offset(self, bytes: usize) -> Self {
        Self(self.0 + bytes as u64)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for Address {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Identity of a container's element storage
///
/// Two identities compare equal as long as the element buffer has neither
/// moved nor been reallocated. A change means every element address taken
/// before is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryIdentity {
    pub base: Address,
    pub capacity: usize,
}

impl MemoryIdentity {
    pub const EMPTY: MemoryIdentity = MemoryIdentity {
        base: Address::NULL,
        capacity: 0,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_offset() {
        let a = Address::new(0x1000);
        assert_eq!(a.offset(16).get(), 0x1010);
        assert!(!a.is_null());
        assert!(Address::NULL.is_null());
        assert_eq!(a.to_string(), "0x1000");
    }
}
