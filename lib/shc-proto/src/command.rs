/// Protocol command alphabet (§3). Bit-exact: these values are the wire
/// representation, not an internal enumeration choice.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Command {
    Get,
    Set,
    Delete,
    Evict,
    GetAsync,
    GetOffset,
    Add,
    Exists,
    Touch,
    MigrationAbort,
    MigrationBegin,
    MigrationEnd,
    Check,
    Stats,
    GetIndex,
    IndexResponse,
    /// Reserved replica-gossip sub-protocol, out of scope (§3 expansion note):
    /// decoded without error but no request-layer helper targets it.
    Replica(u8),
    Noop,
    Response,
}

impl Command {
    #[inline]
    pub fn from_byte(byte: u8) -> Option<Command> {
        Some(match byte {
            0x01 => Command::Get,
            0x02 => Command::Set,
            0x03 => Command::Delete,
            0x04 => Command::Evict,
            0x05 => Command::GetAsync,
            0x06 => Command::GetOffset,
            0x07 => Command::Add,
            0x08 => Command::Exists,
            0x09 => Command::Touch,
            0x21 => Command::MigrationAbort,
            0x22 => Command::MigrationBegin,
            0x23 => Command::MigrationEnd,
            0x31 => Command::Check,
            0x32 => Command::Stats,
            0x41 => Command::GetIndex,
            0x42 => Command::IndexResponse,
            0xA0..=0xA3 => Command::Replica(byte),
            0x90 => Command::Noop,
            0x99 => Command::Response,
            _ => return None,
        })
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        match self {
            Command::Get => 0x01,
            Command::Set => 0x02,
            Command::Delete => 0x03,
            Command::Evict => 0x04,
            Command::GetAsync => 0x05,
            Command::GetOffset => 0x06,
            Command::Add => 0x07,
            Command::Exists => 0x08,
            Command::Touch => 0x09,
            Command::MigrationAbort => 0x21,
            Command::MigrationBegin => 0x22,
            Command::MigrationEnd => 0x23,
            Command::Check => 0x31,
            Command::Stats => 0x32,
            Command::GetIndex => 0x41,
            Command::IndexResponse => 0x42,
            Command::Replica(byte) => byte,
            Command::Noop => 0x90,
            Command::Response => 0x99,
        }
    }
}

/// Single-byte response status codes (§3).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ResponseStatus {
    Ok,
    Yes,
    Exists,
    No,
    Err,
}

impl ResponseStatus {
    #[inline]
    pub fn from_byte(byte: u8) -> Option<ResponseStatus> {
        Some(match byte {
            0x00 => ResponseStatus::Ok,
            0x01 => ResponseStatus::Yes,
            0x02 => ResponseStatus::Exists,
            0xFE => ResponseStatus::No,
            0xFF => ResponseStatus::Err,
            _ => return None,
        })
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        match self {
            ResponseStatus::Ok => 0x00,
            ResponseStatus::Yes => 0x01,
            ResponseStatus::Exists => 0x02,
            ResponseStatus::No => 0xFE,
            ResponseStatus::Err => 0xFF,
        }
    }
}
