use byteorder::{BigEndian, ByteOrder};
use shc_common::error::{Error, ErrorKind, ProtocolErrorKind, Result};
use shc_proto::ResponseStatus;

/// Interprets a single-byte outcome record the way `DELETE`, `EVICT`, `TOUCH`,
/// `CHECK` and the `MIGRATION_*` commands do (§4.5): `OK` succeeds, anything else
/// (including an explicit `ERR` status) fails.
pub fn expect_ok(record: &[u8]) -> Result<()> {
    match status_byte(record)? {
        ResponseStatus::Ok => Ok(()),
        _ => Err(unexpected_status()),
    }
}

/// Interprets `SET`/`ADD`'s outcome byte: `OK` means the key was newly written,
/// `EXISTS` means a prior value was overwritten. Returns `true` when the key
/// already existed.
pub fn set_outcome(record: &[u8]) -> Result<bool> {
    match status_byte(record)? {
        ResponseStatus::Ok => Ok(false),
        ResponseStatus::Exists => Ok(true),
        _ => Err(unexpected_status()),
    }
}

/// Interprets `EXISTS`'s outcome byte.
pub fn exists_outcome(record: &[u8]) -> Result<bool> {
    match status_byte(record)? {
        ResponseStatus::Yes => Ok(true),
        ResponseStatus::No => Ok(false),
        _ => Err(unexpected_status()),
    }
}

/// Result of parsing a `GET_INDEX` response body (§4.5). `truncated` is set when
/// the body ended before the `klen == 0` terminator; `entries` still holds
/// whatever was fully parsed before that point.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct IndexEntries {
    pub entries: Vec<(Vec<u8>, u32)>,
    pub truncated: bool,
}

/// Parses a `GET_INDEX` response body: a sequence of `(klen_be32, key, vlen_be32)`
/// tuples terminated by a zero `klen`. Items parsed before a truncation are
/// retained rather than discarded.
pub fn parse_index(record: &[u8]) -> IndexEntries {
    let mut result = IndexEntries::default();
    let mut offset = 0usize;

    loop {
        if offset + 4 > record.len() {
            result.truncated = true;
            return result;
        }
        let klen = BigEndian::read_u32(&record[offset..offset + 4]) as usize;
        offset += 4;
        if klen == 0 {
            return result;
        }
        if offset + klen + 4 > record.len() {
            result.truncated = true;
            return result;
        }
        let key = record[offset..offset + klen].to_vec();
        offset += klen;
        let vlen = BigEndian::read_u32(&record[offset..offset + 4]);
        offset += 4;
        result.entries.push((key, vlen));
    }
}

fn status_byte(record: &[u8]) -> Result<ResponseStatus> {
    record.first().copied().and_then(ResponseStatus::from_byte).ok_or_else(unexpected_status)
}

fn unexpected_status() -> Error {
    Error::Fatal(ErrorKind::Protocol(ProtocolErrorKind::UnexpectedByte))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expect_ok_accepts_ok_byte() {
        assert!(expect_ok(&[0x00]).is_ok());
    }

    #[test]
    fn expect_ok_rejects_err_byte() {
        assert!(expect_ok(&[0xFF]).is_err());
    }

    #[test]
    fn set_outcome_distinguishes_created_and_overwritten() {
        assert_eq!(set_outcome(&[0x00]).unwrap(), false);
        assert_eq!(set_outcome(&[0x02]).unwrap(), true);
        assert!(set_outcome(&[0xFF]).is_err());
    }

    #[test]
    fn exists_outcome_reads_yes_no() {
        assert_eq!(exists_outcome(&[0x01]).unwrap(), true);
        assert_eq!(exists_outcome(&[0xFE]).unwrap(), false);
    }

    #[test]
    fn parse_index_reads_entries_until_terminator() {
        let mut body = Vec::new();
        body.extend_from_slice(&3u32.to_be_bytes());
        body.extend_from_slice(b"key");
        body.extend_from_slice(&7u32.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes());

        let result = parse_index(&body);
        assert!(!result.truncated);
        assert_eq!(result.entries, vec![(b"key".to_vec(), 7)]);
    }

    #[test]
    fn parse_index_keeps_entries_parsed_before_truncation() {
        let mut body = Vec::new();
        body.extend_from_slice(&3u32.to_be_bytes());
        body.extend_from_slice(b"key");
        body.extend_from_slice(&7u32.to_be_bytes());
        body.extend_from_slice(&2u32.to_be_bytes());
        body.push(b'a'); // truncated: declares a 2-byte key but supplies only one byte

        let result = parse_index(&body);
        assert!(result.truncated);
        assert_eq!(result.entries, vec![(b"key".to_vec(), 7)]);
    }
}
