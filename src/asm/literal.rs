//! Numeric literals.
//!
//! Accepted forms: decimal `42`, hex `0x2A`, binary `0b101010`, and octal
//! with a leading zero `052`. Literals are unsigned.

use thiserror::Error;

/// Errors from [`parse_literal`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiteralError {
    #[error("not a number")]
    Invalid,

    #[error("value does not fit in {bits} bits")]
    OutOfRange { bits: u32 },
}

/// Parse a literal into any unsigned integer type that fits it.
pub fn parse_literal<T>(text: &str) -> Result<T, LiteralError>
where
    T: TryFrom<u32>,
{
    let (digits, radix) = if let Some(hex) = strip_prefix_ci(text, "0x") {
        (hex, 16)
    } else if let Some(bin) = strip_prefix_ci(text, "0b") {
        (bin, 2)
    } else if text.len() > 1 && text.starts_with('0') {
        (&text[1..], 8)
    } else {
        (text, 10)
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(LiteralError::Invalid);
    }

    let bits = (std::mem::size_of::<T>() * 8) as u32;
    let value = u32::from_str_radix(digits, radix)
        .map_err(|_| LiteralError::OutOfRange { bits })?;
    T::try_from(value).map_err(|_| LiteralError::OutOfRange { bits })
}

/// True if `text` starts like a number rather than a name.
pub fn looks_numeric(text: &str) -> bool {
    text.starts_with(|c: char| c.is_ascii_digit())
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    match text.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => Some(&text[prefix.len()..]),
        _ => None,
    }
}
