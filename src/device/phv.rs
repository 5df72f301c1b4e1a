//! Packet header vector.
//!
//! The PHV is the per-packet working set that flows through the stage: 224
//! fixed-width containers, each either valid (written by the parser or an
//! earlier action) or invalid.
//!
//! # Container Layout
//!
//! | Ids | Width | Groups |
//! |-----|-------|--------|
//! | 0..64 | 32-bit | 0-3 |
//! | 64..128 | 8-bit | 4-7 |
//! | 128..224 | 16-bit | 8-13 |
//!
//! A container is addressed either by its flat id or by `(group, index)`
//! with 16 containers per group.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Number of PHV containers.
pub const PHV_CONTAINERS: usize = 224;

/// Containers per group.
pub const GROUP_SIZE: usize = 16;

/// First 8-bit container.
pub const FIRST_BYTE_CONTAINER: u8 = 64;

/// First 16-bit container.
pub const FIRST_HALF_CONTAINER: u8 = 128;

/// Container width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerWidth {
    W8,
    W16,
    W32,
}

impl ContainerWidth {
    /// Width in bits.
    #[inline]
    pub fn bits(self) -> u32 {
        match self {
            ContainerWidth::W8 => 8,
            ContainerWidth::W16 => 16,
            ContainerWidth::W32 => 32,
        }
    }

    /// Width in bytes.
    #[inline]
    pub fn bytes(self) -> usize {
        (self.bits() / 8) as usize
    }

    /// All-ones value of this width.
    #[inline]
    pub fn mask(self) -> u32 {
        match self {
            ContainerWidth::W32 => u32::MAX,
            w => (1u32 << w.bits()) - 1,
        }
    }
}

/// Flat container id (0..224).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(u8);

impl ContainerId {
    /// Create an id, `None` if outside the PHV.
    pub fn new(id: u16) -> Option<Self> {
        if (id as usize) < PHV_CONTAINERS {
            Some(Self(id as u8))
        } else {
            None
        }
    }

    /// Create an id from `(group, index)`.
    pub fn from_group(group: u8, index: u8) -> Option<Self> {
        if (index as usize) >= GROUP_SIZE {
            return None;
        }
        Self::new(group as u16 * GROUP_SIZE as u16 + index as u16)
    }

    /// Flat id.
    #[inline]
    pub fn id(self) -> u8 {
        self.0
    }

    /// Group number.
    #[inline]
    pub fn group(self) -> u8 {
        self.0 / GROUP_SIZE as u8
    }

    /// Index within the group.
    #[inline]
    pub fn index(self) -> u8 {
        self.0 % GROUP_SIZE as u8
    }

    /// Fixed width of the container.
    pub fn width(self) -> ContainerWidth {
        match self.0 {
            id if id < FIRST_BYTE_CONTAINER => ContainerWidth::W32,
            id if id < FIRST_HALF_CONTAINER => ContainerWidth::W8,
            _ => ContainerWidth::W16,
        }
    }

    /// Position among containers of the same width.
    pub fn slot(self) -> u8 {
        match self.width() {
            ContainerWidth::W32 => self.0,
            ContainerWidth::W8 => self.0 - FIRST_BYTE_CONTAINER,
            ContainerWidth::W16 => self.0 - FIRST_HALF_CONTAINER,
        }
    }

    /// Id of the `slot`-th container of a width.
    pub fn from_slot(width: ContainerWidth, slot: u8) -> Option<Self> {
        let (base, count) = match width {
            ContainerWidth::W32 => (0u16, 64u16),
            ContainerWidth::W8 => (FIRST_BYTE_CONTAINER as u16, 64),
            ContainerWidth::W16 => (FIRST_HALF_CONTAINER as u16, 96),
        };
        if (slot as u16) < count {
            Self::new(base + slot as u16)
        } else {
            None
        }
    }

    /// Iterate over every container id.
    pub fn all() -> impl Iterator<Item = ContainerId> {
        (0..PHV_CONTAINERS as u16).map(|id| ContainerId(id as u8))
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.width() {
            ContainerWidth::W8 => "B",
            ContainerWidth::W16 => "H",
            ContainerWidth::W32 => "W",
        };
        write!(f, "{}{}", prefix, self.slot())
    }
}

impl FromStr for ContainerId {
    type Err = PhvError;

    /// Parse `W3` / `B5` / `H12` or a flat id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || PhvError::BadName(s.to_string());
        let width = match s.chars().next() {
            Some('W') | Some('w') => ContainerWidth::W32,
            Some('B') | Some('b') => ContainerWidth::W8,
            Some('H') | Some('h') => ContainerWidth::W16,
            _ => {
                let id: u16 = s.parse().map_err(|_| bad())?;
                return Self::new(id).ok_or(PhvError::NoSuchContainer(id));
            }
        };
        let slot: u8 = s[1..].parse().map_err(|_| bad())?;
        Self::from_slot(width, slot).ok_or_else(bad)
    }
}

/// One PHV container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhvContainer {
    width: ContainerWidth,
    value: u32,
    valid: bool,
}

impl PhvContainer {
    fn new(width: ContainerWidth) -> Self {
        Self { width, value: 0, valid: false }
    }

    /// Container width.
    #[inline]
    pub fn width(&self) -> ContainerWidth {
        self.width
    }

    /// Raw value (0 when invalid).
    #[inline]
    pub fn raw(&self) -> u32 {
        self.value
    }

    /// Whether the container holds a defined value.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Value if valid.
    #[inline]
    pub fn value(&self) -> Option<u32> {
        self.valid.then_some(self.value)
    }
}

/// Pipeline direction the PHV belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Ingress,
    Egress,
}

/// Error writing a PHV container.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PhvError {
    /// Container id outside the PHV.
    #[error("container {0} does not exist")]
    NoSuchContainer(u16),
    /// Name is not a container.
    #[error("'{0}' is not a container name")]
    BadName(String),
    /// Value does not fit the container.
    #[error("value 0x{value:X} does not fit {bits}-bit container {container}")]
    ValueTooWide { container: ContainerId, value: u32, bits: u32 },
}

/// Packet header vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phv {
    containers: Vec<PhvContainer>,
    direction: Direction,
}

impl Phv {
    /// Create a PHV with every container invalid.
    pub fn new(direction: Direction) -> Self {
        let containers = ContainerId::all().map(|id| PhvContainer::new(id.width())).collect();
        Self { containers, direction }
    }

    /// Ingress PHV.
    #[inline]
    pub fn ingress() -> Self {
        Self::new(Direction::Ingress)
    }

    /// Egress PHV.
    #[inline]
    pub fn egress() -> Self {
        Self::new(Direction::Egress)
    }

    /// Pipeline direction.
    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Access a container.
    #[inline]
    pub fn get(&self, id: ContainerId) -> &PhvContainer {
        &self.containers[id.id() as usize]
    }

    /// Access a container by `(group, index)`.
    pub fn get_grouped(&self, group: u8, index: u8) -> Option<&PhvContainer> {
        ContainerId::from_group(group, index).map(|id| self.get(id))
    }

    /// Value of a container if valid.
    #[inline]
    pub fn value(&self, id: ContainerId) -> Option<u32> {
        self.get(id).value()
    }

    /// Write a value and mark the container valid.
    pub fn set(&mut self, id: ContainerId, value: u32) -> Result<(), PhvError> {
        let container = &mut self.containers[id.id() as usize];
        if value & !container.width.mask() != 0 {
            return Err(PhvError::ValueTooWide { container: id, value, bits: container.width.bits() });
        }
        container.value = value;
        container.valid = true;
        Ok(())
    }

    /// Write a value by flat id.
    pub fn set_id(&mut self, id: u16, value: u32) -> Result<(), PhvError> {
        let id = ContainerId::new(id).ok_or(PhvError::NoSuchContainer(id))?;
        self.set(id, value)
    }

    /// Mark a container invalid.
    pub fn invalidate(&mut self, id: ContainerId) {
        let container = &mut self.containers[id.id() as usize];
        container.value = 0;
        container.valid = false;
    }

    /// Write an action result, truncated to the container width.
    pub(crate) fn write_result(&mut self, id: ContainerId, value: u32, valid: bool) {
        let container = &mut self.containers[id.id() as usize];
        if valid {
            container.value = value & container.width.mask();
            container.valid = true;
        } else {
            container.value = 0;
            container.valid = false;
        }
    }

    /// Byte `b` of a container (0 = least significant), `None` if invalid
    /// or past the container width.
    pub fn byte(&self, id: ContainerId, b: u8) -> Option<u8> {
        let container = self.get(id);
        if (b as usize) >= container.width.bytes() {
            return None;
        }
        container.value().map(|v| (v >> (8 * b as u32)) as u8)
    }

    /// Validity bitmap, bit `id` set when container `id` is valid.
    pub fn validity(&self) -> [u64; 4] {
        let mut bits = [0u64; 4];
        for (i, c) in self.containers.iter().enumerate() {
            if c.valid {
                bits[i / 64] |= 1 << (i % 64);
            }
        }
        bits
    }

    /// Iterate over valid containers.
    pub fn valid_containers(&self) -> impl Iterator<Item = (ContainerId, u32)> + '_ {
        ContainerId::all().filter_map(move |id| self.value(id).map(|v| (id, v)))
    }
}
