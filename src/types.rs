//! Small value types shared by the API, the command records and the
//! collaborator ports.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Caller-supplied token echoed back in the terminal event.
pub type UserData = u64;

/// Caller-assigned read/write request identifier.  Echoed, never checked
/// for uniqueness.
pub type RequestId = u32;

/// RFCOMM server channel number.
pub type Scn = u8;

/// Service record handle in the local discovery database.
pub type RecordHandle = u32;

/// Largest read or write carried by a single command record.
pub const MAX_PAYLOAD: usize = 990;

/// Most UUIDs a discovery request can carry.
pub const MAX_DISCOVERY_UUIDS: usize = 8;

/// Raw value reported for "no underlying port".
pub const INVALID_PORT: u16 = 0xFFFF;

/// Fixed-capacity payload buffer used by read/write records and events.
pub type Payload = heapless::Vec<u8, MAX_PAYLOAD>;

// ── Peer address ──────────────────────────────────────────────

/// 48-bit peer device address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BdAddr(pub [u8; 6]);

impl fmt::Debug for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

// ── Underlying transport port ─────────────────────────────────

/// Identifier the transport assigns to an open or listening port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortId(pub u16);

impl PortId {
    pub const fn raw(self) -> u16 {
        self.0
    }
}

// ── Connection parameters ─────────────────────────────────────

/// Security requirements requested for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SecMask(pub u16);

impl SecMask {
    pub const NONE: Self = Self(0x0000);
    pub const AUTHORIZE: Self = Self(0x0001);
    pub const AUTHENTICATE: Self = Self(0x0012);
    pub const ENCRYPT: Self = Self(0x0024);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Link role requested for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkRole {
    #[default]
    Master,
    Slave,
}

/// Service class UUID used to filter discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceUuid(pub u128);

impl ServiceUuid {
    const BASE: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

    /// Expand a 16-bit assigned number against the base UUID.
    pub const fn from_u16(short: u16) -> Self {
        Self(Self::BASE | ((short as u128) << 96))
    }

    pub const SERIAL_PORT: Self = Self::from_u16(0x1101);
}

// ── Power management vocabulary ──────────────────────────────

/// Power-management policy identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PmId(pub u8);

impl PmId {
    /// Removes the binding; the initial state is ignored.
    pub const CLEAR: Self = Self(0);
    /// Catch-all policy.
    pub const ALL: Self = Self(0xFF);

    pub const fn is_clear(self) -> bool {
        self.0 == Self::CLEAR.0
    }
}

/// Connection state reported to the power policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Open,
    Close,
    AppOpen,
    AppClose,
    ScoOpen,
    ScoClose,
    Idle,
    Busy,
}
