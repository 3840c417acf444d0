pub type Result<T> = std::result::Result<T, crate::error::Error>;

#[macro_export]
macro_rules! verify_arg {
    ($name:expr, $expr:expr) => {{
        let result = $expr;
        $crate::result::verify_arg(result, stringify!($name), stringify!($expr))?;
    }};
}

#[inline]
pub fn verify_arg(predicate: bool, name: &str, condition: &str) -> Result<()> {
    if predicate {
        Ok(())
    } else {
        invalid_arg(name, condition)
    }
}

#[cold]
pub fn invalid_arg(name: &str, condition: &str) -> Result<()> {
    Err(crate::error::ErrorKind::InvalidArgument {
        name: name.to_string(),
        message: condition.to_string(),
    }
    .into())
}

/// Validates an allocation request: `byte_alignment` must be a non-zero power
/// of two and `byte_size` must fit the platform's address space.
pub fn verify_allocation(byte_size: u64, byte_alignment: u64) -> Result<()> {
    verify_arg!(byte_alignment, byte_alignment.is_power_of_two());
    verify_arg!(byte_size, byte_size <= isize::MAX as u64);
    Ok(())
}
