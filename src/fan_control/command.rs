//! Inbound command payloads.

use thiserror::Error;

/// Longest duty payload accepted, in bytes.
pub const MAX_DUTY_PAYLOAD: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("payload of {0} bytes is too long")]
    TooLong(usize),
    #[error("bad duty {0:?}")]
    Malformed(String),
    #[error("duty {0} is above 100")]
    OutOfRange(u64),
}

/// Parse a duty-set payload into a percentage.
///
/// An empty payload means 0. Otherwise the payload is an unsigned integer in
/// decimal, `0x` hexadecimal or leading-`0` octal notation, optionally
/// preceded by whitespace and `+`, with nothing after the digits.
pub fn parse_duty(payload: &[u8]) -> Result<u8, CommandError> {
    if payload.len() > MAX_DUTY_PAYLOAD {
        return Err(CommandError::TooLong(payload.len()));
    }
    if payload.is_empty() {
        return Ok(0);
    }
    let text = std::str::from_utf8(payload)
        .map_err(|_| CommandError::Malformed(String::from_utf8_lossy(payload).into_owned()))?;
    parse_percent(text)
}

/// Parse a percentage given on the command line, with the same notation as
/// [`parse_duty`] but no length limit and no empty default.
pub fn parse_percent(text: &str) -> Result<u8, CommandError> {
    let malformed = || CommandError::Malformed(text.to_string());
    let value = parse_unsigned(text).ok_or_else(malformed)?;
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= 100)
        .ok_or(CommandError::OutOfRange(value))
}

fn parse_unsigned(text: &str) -> Option<u64> {
    let digits = text.trim_start();
    let digits = digits.strip_prefix('+').unwrap_or(digits);
    let (radix, digits) = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };
    if digits.is_empty() {
        return None;
    }
    digits.chars().try_fold(0u64, |acc, c| {
        let d = c.to_digit(radix)?;
        // saturate so huge values report as out of range, not malformed
        Some(acc.saturating_mul(u64::from(radix)).saturating_add(u64::from(d)))
    })
}

/// Whether a shutdown notice asks for shutdown. Only an empty payload or one
/// whose first byte is `'0'` cancels it.
pub fn shutdown_active(payload: &[u8]) -> bool {
    !matches!(payload.first(), None | Some(b'0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal() {
        assert_eq!(parse_duty(b"45"), Ok(45));
        assert_eq!(parse_duty(b"100"), Ok(100));
        assert_eq!(parse_duty(b"0"), Ok(0));
        assert_eq!(parse_duty(b" +7"), Ok(7));
    }

    #[test]
    fn test_empty_means_zero() {
        assert_eq!(parse_duty(b""), Ok(0));
    }

    #[test]
    fn test_other_radixes() {
        assert_eq!(parse_duty(b"0x1e"), Ok(30));
        assert_eq!(parse_duty(b"0X64"), Ok(100));
        assert_eq!(parse_duty(b"050"), Ok(40));
        assert_eq!(parse_duty(b"00"), Ok(0));
    }

    #[test]
    fn test_rejects() {
        assert_eq!(parse_duty(b"101"), Err(CommandError::OutOfRange(101)));
        assert_eq!(parse_duty(b"99999999999"), Err(CommandError::TooLong(11)));
        assert!(matches!(parse_duty(b"45%"), Err(CommandError::Malformed(_))));
        assert!(matches!(parse_duty(b"45 "), Err(CommandError::Malformed(_))));
        assert!(matches!(parse_duty(b"-5"), Err(CommandError::Malformed(_))));
        assert!(matches!(parse_duty(b"0x"), Err(CommandError::Malformed(_))));
        assert!(matches!(parse_duty(b"08"), Err(CommandError::Malformed(_))));
        assert!(matches!(parse_duty(b"abc"), Err(CommandError::Malformed(_))));
        assert!(matches!(parse_duty(b"   "), Err(CommandError::Malformed(_))));
        assert!(matches!(parse_duty(&[0xff, 0xfe]), Err(CommandError::Malformed(_))));
    }

    #[test]
    fn test_command_line_has_no_length_limit() {
        assert_eq!(parse_percent("000000000000045"), Ok(37));
        assert!(matches!(
            parse_percent("18446744073709551616"),
            Err(CommandError::OutOfRange(u64::MAX))
        ));
        assert!(parse_percent("").is_err());
    }

    #[test]
    fn test_shutdown_payloads() {
        assert!(!shutdown_active(b""));
        assert!(!shutdown_active(b"0"));
        assert!(!shutdown_active(b"0 please"));
        assert!(shutdown_active(b"1"));
        assert!(shutdown_active(b" 0"));
        assert!(shutdown_active(b"false"));
    }
}
