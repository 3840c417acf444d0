//! Rust types that can be read from and written to segments through value
//! layouts.

use bytemuck::Pod;
use memseg_common::{Result, align::is_aligned_u64, error::Error};
use memseg_layout::{Carrier, ValueLayout};

use crate::scope::Scope;
use crate::segment::{MemorySegment, SegmentKind};

mod private {
    pub trait Sealed {}
}

/// A Rust type matching one layout [`Carrier`].
///
/// Values are exchanged with memory as native-order bytes; the segment
/// swaps them when the layout's byte order is not the host's.
pub trait ValueCarrier: private::Sealed + Sized {
    const CARRIER: Carrier;

    #[doc(hidden)]
    fn decode(bytes: &[u8], layout: &ValueLayout) -> Result<Self>;

    #[doc(hidden)]
    fn encode(&self, out: &mut [u8]) -> Result<()>;
}

macro_rules! pod_carrier {
    ($($ty:ty => $carrier:ident),* $(,)?) => {
        $(
            impl private::Sealed for $ty {}

            impl ValueCarrier for $ty {
                const CARRIER: Carrier = Carrier::$carrier;

                #[inline]
                fn decode(bytes: &[u8], _layout: &ValueLayout) -> Result<Self> {
                    Ok(bytemuck::pod_read_unaligned(bytes))
                }

                #[inline]
                fn encode(&self, out: &mut [u8]) -> Result<()> {
                    out.copy_from_slice(bytemuck::bytes_of(self));
                    Ok(())
                }
            }
        )*
    };
}

pod_carrier! {
    i8 => Byte,
    u8 => Byte,
    u16 => Char,
    i16 => Short,
    i32 => Int,
    f32 => Float,
    i64 => Long,
    f64 => Double,
}

impl private::Sealed for bool {}

impl ValueCarrier for bool {
    const CARRIER: Carrier = Carrier::Bool;

    fn decode(bytes: &[u8], _layout: &ValueLayout) -> Result<Self> {
        Ok(bytes[0] != 0)
    }

    fn encode(&self, out: &mut [u8]) -> Result<()> {
        out[0] = *self as u8;
        Ok(())
    }
}

impl private::Sealed for MemorySegment {}

/// Addresses read from memory become native segments of the global scope.
/// Their size is that of the layout's target layout, or zero without one.
impl ValueCarrier for MemorySegment {
    const CARRIER: Carrier = Carrier::Address;

    fn decode(bytes: &[u8], layout: &ValueLayout) -> Result<Self> {
        let address = bytemuck::pod_read_unaligned::<usize>(bytes) as u64;
        let (size, alignment) = layout
            .target_layout()
            .map_or((0, 1), |target| (target.byte_size(), target.byte_alignment()));
        if !is_aligned_u64(address, alignment) {
            return Err(Error::misaligned(address, alignment));
        }
        Ok(MemorySegment::native(
            SegmentKind::Native,
            address,
            size,
            false,
            Scope::global(),
        ))
    }

    fn encode(&self, out: &mut [u8]) -> Result<()> {
        if self.kind() == SegmentKind::Heap {
            return Err(Error::invalid_arg(
                "value",
                "a heap segment has no native address",
            ));
        }
        let address = usize::try_from(self.address())
            .map_err(|_| Error::invalid_arg("value", "address exceeds the pointer width"))?;
        out.copy_from_slice(bytemuck::bytes_of(&address));
        Ok(())
    }
}

/// Fails unless `T` is the Rust type for the layout's carrier.
pub(crate) fn check_carrier<T: ValueCarrier>(layout: &ValueLayout) -> Result<()> {
    if T::CARRIER == layout.carrier() {
        Ok(())
    } else {
        Err(Error::invalid_arg(
            "layout",
            format!(
                "{layout} carries {:?}, not {}",
                layout.carrier(),
                std::any::type_name::<T>()
            ),
        ))
    }
}

/// Element size for array copies; zero-sized types are rejected.
pub(crate) fn pod_size<T: Pod>() -> Result<usize> {
    match std::mem::size_of::<T>() {
        0 => Err(Error::invalid_arg(
            "T",
            format!("{} has no size", std::any::type_name::<T>()),
        )),
        size => Ok(size),
    }
}
