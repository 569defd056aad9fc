// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

pub use nom::bytes::streaming::{tag, take, take_till};
pub use nom::character::streaming::{crlf, digit1};
pub use nom::error::ErrorKind;
pub use nom::{AsChar, Err, IResult, InputTakeAtPosition};

// consumes one or more literal spaces
pub fn space1(input: &[u8]) -> IResult<&[u8], &[u8]> {
    input.split_at_position1(
        |item| {
            let c = item.as_char();
            c != ' '
        },
        ErrorKind::Space,
    )
}

// consumes zero or more literal spaces
pub fn space0(input: &[u8]) -> IResult<&[u8], &[u8]> {
    input.split_at_position(|item| {
        let c = item.as_char();
        c != ' '
    })
}

// consumes digits with an optional leading minus sign
pub fn signed_digit1(input: &[u8]) -> IResult<&[u8], &[u8]> {
    input.split_at_position1(
        |item| {
            let c = item.as_char();
            !c.is_ascii_digit() && c != '-'
        },
        ErrorKind::Digit,
    )
}

// parses a binary-safe key of bounded length. `None` signals that no key
// was present at the cursor.
pub fn key(input: &[u8], max_len: usize) -> IResult<&[u8], Option<&[u8]>> {
    let (i, key) = take_till(|b| (b == b' ' || b == b'\r'))(input).map_err(|e| {
        if let nom::Err::Incomplete(_) = e {
            if input.len() > max_len {
                nom::Err::Failure((input, ErrorKind::Tag))
            } else {
                e
            }
        } else {
            e
        }
    })?;
    if key.len() > max_len {
        return Err(nom::Err::Failure((input, ErrorKind::Tag)));
    }
    if key.is_empty() {
        Ok((input, None))
    } else {
        Ok((i, Some(key)))
    }
}

pub fn parse_u64(input: &[u8]) -> IResult<&[u8], u64> {
    let (input, digits) = digit1(input)?;
    match common::strings::parse_u64(digits) {
        Some(value) => Ok((input, value)),
        None => Err(nom::Err::Failure((input, ErrorKind::Tag))),
    }
}

pub fn parse_u32(input: &[u8]) -> IResult<&[u8], u32> {
    let (input, digits) = digit1(input)?;
    match common::strings::parse_u32(digits) {
        Some(value) => Ok((input, value)),
        None => Err(nom::Err::Failure((input, ErrorKind::Tag))),
    }
}

pub fn parse_usize(input: &[u8]) -> IResult<&[u8], usize> {
    let (input, value) = parse_u64(input)?;
    Ok((input, value as usize))
}

pub fn parse_i64(input: &[u8]) -> IResult<&[u8], i64> {
    let (input, digits) = signed_digit1(input)?;
    match common::strings::parse_i64(digits) {
        Some(value) => Ok((input, value)),
        None => Err(nom::Err::Failure((input, ErrorKind::Tag))),
    }
}
