pub fn string_upto_null_terminator(bytes: &[u8]) -> nom::IResult<&[u8], String> {
    let (bytes, name_bytes) = match nom::bytes::complete::take_until::<
        &str,
        &[u8],
        nom::error::Error<&[u8]>,
    >("\0")(bytes)
    {
        Ok((bytes, name_bytes)) => (bytes, name_bytes),
        Err(_) => return Ok((&[], String::from_utf8(bytes.to_vec()).unwrap())),
    };
    let name = String::from_utf8(name_bytes.to_vec()).unwrap();
    Ok((&bytes[1..], name))
}

pub fn string_upto_null_terminator_many(bytes: &[u8]) -> nom::IResult<&[u8], Vec<String>> {
    let mut strings = Vec::new();
    let mut remaining_bytes = bytes;
    loop {
        let (bytes, name) = string_upto_null_terminator(remaining_bytes)?;
        strings.push(name);
        if bytes.is_empty() {
            break;
        }
        remaining_bytes = bytes;
    }
    Ok((&[], strings))
}

pub fn version_string(version: u32) -> String {
    format!(
        "{}.{}.{}",
        (version >> 16) & 0xff,
        (version >> 8) & 0xff,
        version & 0xff
    )
}

pub fn reverse_version_string(version: &str) -> u32 {
    let mut parts = version.splitn(3, '.');
    let major: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let minor: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let patch: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    ((major & 0xff) << 16) | ((minor & 0xff) << 8) | (patch & 0xff)
}

pub fn read_uleb(bytes: &[u8]) -> nom::IResult<&[u8], u64> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    let mut idx = 0usize;
    loop {
        if idx >= bytes.len() {
            return Err(nom::Err::Error(nom::error::Error::new(
                bytes,
                nom::error::ErrorKind::Eof,
            )));
        }
        let byte = bytes[idx];
        idx += 1;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok((&bytes[idx..], result))
}

pub fn read_uleb_many(bytes: &[u8]) -> nom::IResult<&[u8], Vec<u64>> {
    let mut values = Vec::new();
    let mut remaining = bytes;
    while !remaining.is_empty() {
        let (next, value) = read_uleb(remaining)?;
        values.push(value);
        remaining = next;
    }
    Ok((remaining, values))
}

pub fn read_sleb(bytes: &[u8]) -> nom::IResult<&[u8], i64> {
    let mut result: i64 = 0;
    let mut shift = 0u32;
    let mut idx = 0usize;
    let mut byte;
    loop {
        if idx >= bytes.len() {
            return Err(nom::Err::Error(nom::error::Error::new(
                bytes,
                nom::error::ErrorKind::Eof,
            )));
        }
        byte = bytes[idx];
        idx += 1;
        result |= ((byte & 0x7f) as i64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            break;
        }
    }
    if shift < 64 && (byte & 0x40) != 0 {
        result |= -1i64 << shift;
    }
    Ok((&bytes[idx..], result))
}
