//! Scalar layouts: carriers, byte order and the predefined value layouts.

use std::sync::Arc;

use memseg_common::{Result, error::Error, verify_arg};

use crate::layout::MemoryLayout;

/// The scalar type a value layout reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Carrier {
    Bool,
    Byte,
    /// A UTF-16 code unit.
    Char,
    Short,
    Int,
    Float,
    Long,
    Double,
    /// A native pointer.
    Address,
}

impl Carrier {
    /// Natural size of the carrier in bytes.
    pub const fn byte_size(self) -> u64 {
        match self {
            Carrier::Bool | Carrier::Byte => 1,
            Carrier::Char | Carrier::Short => 2,
            Carrier::Int | Carrier::Float => 4,
            Carrier::Long | Carrier::Double => 8,
            Carrier::Address => std::mem::size_of::<usize>() as u64,
        }
    }

    /// Single-letter descriptor used by the layout notation.
    pub const fn descriptor(self) -> char {
        match self {
            Carrier::Bool => 'z',
            Carrier::Byte => 'b',
            Carrier::Char => 'c',
            Carrier::Short => 's',
            Carrier::Int => 'i',
            Carrier::Float => 'f',
            Carrier::Long => 'j',
            Carrier::Double => 'd',
            Carrier::Address => 'a',
        }
    }

    pub const fn is_floating_point(self) -> bool {
        matches!(self, Carrier::Float | Carrier::Double)
    }
}

/// Byte order of a multi-byte value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// Byte order of the host.
    #[cfg(target_endian = "little")]
    pub const NATIVE: ByteOrder = ByteOrder::LittleEndian;
    #[cfg(target_endian = "big")]
    pub const NATIVE: ByteOrder = ByteOrder::BigEndian;

    #[inline]
    pub fn is_native(self) -> bool {
        self == Self::NATIVE
    }
}

/// A layout for a single scalar or pointer value.
///
/// Value layouts whose carrier is [`Carrier::Address`] are address layouts: they
/// describe pointers, and may carry a target layout describing the pointee.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueLayout {
    carrier: Carrier,
    order: ByteOrder,
    byte_alignment: u64,
    name: Option<Arc<str>>,
    target: Option<Arc<MemoryLayout>>,
}

impl ValueLayout {
    /// A value layout of the given carrier in native byte order and with
    /// natural alignment.
    pub const fn of(carrier: Carrier) -> ValueLayout {
        ValueLayout {
            carrier,
            order: ByteOrder::NATIVE,
            byte_alignment: carrier.byte_size(),
            name: None,
            target: None,
        }
    }

    const fn unaligned(carrier: Carrier) -> ValueLayout {
        ValueLayout {
            carrier,
            order: ByteOrder::NATIVE,
            byte_alignment: 1,
            name: None,
            target: None,
        }
    }

    #[inline]
    pub fn carrier(&self) -> Carrier {
        self.carrier
    }

    #[inline]
    pub fn order(&self) -> ByteOrder {
        self.order
    }

    #[inline]
    pub fn byte_size(&self) -> u64 {
        self.carrier.byte_size()
    }

    #[inline]
    pub fn byte_alignment(&self) -> u64 {
        self.byte_alignment
    }

    #[inline]
    pub fn has_natural_alignment(&self) -> bool {
        self.byte_alignment == self.carrier.byte_size()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[inline]
    pub fn is_address(&self) -> bool {
        self.carrier == Carrier::Address
    }

    /// The layout of the memory an address layout points to, if declared.
    pub fn target_layout(&self) -> Option<&MemoryLayout> {
        self.target.as_deref()
    }

    pub fn with_name(&self, name: impl Into<Arc<str>>) -> ValueLayout {
        ValueLayout {
            name: Some(name.into()),
            ..self.clone()
        }
    }

    pub fn without_name(&self) -> ValueLayout {
        ValueLayout {
            name: None,
            ..self.clone()
        }
    }

    pub fn with_order(&self, order: ByteOrder) -> ValueLayout {
        ValueLayout {
            order,
            ..self.clone()
        }
    }

    /// Returns a copy of this layout with the given alignment, which may be
    /// stricter or weaker than the natural one.
    pub fn with_byte_alignment(&self, byte_alignment: u64) -> Result<ValueLayout> {
        verify_arg!(byte_alignment, byte_alignment.is_power_of_two());
        Ok(ValueLayout {
            byte_alignment,
            ..self.clone()
        })
    }

    /// Returns an address layout that declares `target` as its pointee.
    ///
    /// Reading an address through the returned layout yields a segment sized
    /// to `target`, so the pointer can be dereferenced without a separate
    /// reinterpretation step.
    ///
    /// # Safety
    ///
    /// Every address read through the returned layout (directly, or through a
    /// dereference path element) must point to at least `target.byte_size()`
    /// bytes that stay valid and suitably aligned for as long as the derived
    /// segment is used. The library cannot check this.
    pub unsafe fn with_target_layout(&self, target: MemoryLayout) -> Result<ValueLayout> {
        if !self.is_address() {
            return Err(Error::invalid_arg(
                "target",
                format!("{self} is not an address layout"),
            ));
        }
        Ok(ValueLayout {
            target: Some(Arc::new(target)),
            ..self.clone()
        })
    }

    pub fn without_target_layout(&self) -> ValueLayout {
        ValueLayout {
            target: None,
            ..self.clone()
        }
    }
}

impl std::fmt::Display for ValueLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.has_natural_alignment() {
            write!(f, "{}%", self.byte_alignment)?;
        }
        let descriptor = match self.order {
            ByteOrder::LittleEndian => self.carrier.descriptor(),
            ByteOrder::BigEndian => self.carrier.descriptor().to_ascii_uppercase(),
        };
        write!(f, "{descriptor}{}", self.byte_size())?;
        if let Some(target) = &self.target {
            write!(f, ":{target}")?;
        }
        if let Some(name) = &self.name {
            write!(f, "({name})")?;
        }
        Ok(())
    }
}

pub const BOOLEAN: ValueLayout = ValueLayout::of(Carrier::Bool);
pub const BYTE: ValueLayout = ValueLayout::of(Carrier::Byte);
pub const CHAR: ValueLayout = ValueLayout::of(Carrier::Char);
pub const SHORT: ValueLayout = ValueLayout::of(Carrier::Short);
pub const INT: ValueLayout = ValueLayout::of(Carrier::Int);
pub const FLOAT: ValueLayout = ValueLayout::of(Carrier::Float);
pub const LONG: ValueLayout = ValueLayout::of(Carrier::Long);
pub const DOUBLE: ValueLayout = ValueLayout::of(Carrier::Double);
pub const ADDRESS: ValueLayout = ValueLayout::of(Carrier::Address);

pub const CHAR_UNALIGNED: ValueLayout = ValueLayout::unaligned(Carrier::Char);
pub const SHORT_UNALIGNED: ValueLayout = ValueLayout::unaligned(Carrier::Short);
pub const INT_UNALIGNED: ValueLayout = ValueLayout::unaligned(Carrier::Int);
pub const FLOAT_UNALIGNED: ValueLayout = ValueLayout::unaligned(Carrier::Float);
pub const LONG_UNALIGNED: ValueLayout = ValueLayout::unaligned(Carrier::Long);
pub const DOUBLE_UNALIGNED: ValueLayout = ValueLayout::unaligned(Carrier::Double);
pub const ADDRESS_UNALIGNED: ValueLayout = ValueLayout::unaligned(Carrier::Address);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_sizes() {
        assert_eq!(BOOLEAN.byte_size(), 1);
        assert_eq!(CHAR.byte_size(), 2);
        assert_eq!(INT.byte_alignment(), 4);
        assert_eq!(DOUBLE.byte_size(), 8);
        assert_eq!(ADDRESS.byte_size(), std::mem::size_of::<usize>() as u64);
        assert_eq!(LONG_UNALIGNED.byte_alignment(), 1);
        assert!(!LONG_UNALIGNED.has_natural_alignment());
    }

    #[test]
    fn test_derived_layouts_do_not_mutate() {
        let named = INT.with_name("x");
        assert_eq!(named.name(), Some("x"));
        assert_eq!(INT.name(), None);
        assert_ne!(named, INT);
        assert_eq!(named.without_name(), INT);

        let be = INT.with_order(ByteOrder::BigEndian);
        assert_eq!(be.order(), ByteOrder::BigEndian);
        assert_eq!(INT.order(), ByteOrder::NATIVE);
    }

    #[test]
    fn test_with_byte_alignment() {
        assert_eq!(INT.with_byte_alignment(16).unwrap().byte_alignment(), 16);
        assert_eq!(INT.with_byte_alignment(1).unwrap(), INT_UNALIGNED);
        assert!(INT.with_byte_alignment(3).is_err());
        assert!(INT.with_byte_alignment(0).is_err());
    }

    #[test]
    fn test_target_layout() {
        let target = MemoryLayout::from(INT);
        let ptr = unsafe { ADDRESS.with_target_layout(target.clone()) }.unwrap();
        assert_eq!(ptr.target_layout(), Some(&target));
        assert_eq!(ptr.byte_size(), ADDRESS.byte_size());
        assert_ne!(ptr, ADDRESS);
        assert_eq!(ptr.without_target_layout(), ADDRESS);
        assert!(unsafe { INT.with_target_layout(target) }.is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(LONG.with_order(ByteOrder::LittleEndian).to_string(), "j8");
        assert_eq!(INT.with_order(ByteOrder::BigEndian).to_string(), "I4");
        assert_eq!(
            SHORT_UNALIGNED
                .with_order(ByteOrder::LittleEndian)
                .with_name("s")
                .to_string(),
            "1%s2(s)"
        );
    }
}
