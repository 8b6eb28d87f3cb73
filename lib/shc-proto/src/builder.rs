use crate::command::Command;
use crate::message::{magic_bytes, SigMode, EOM, EOR, MAX_CHUNK, RSEP, SIG_HDR_F0, SIG_HDR_F1};
use shc_auth::Authenticator;

/// Serializes `(sig_mode, cmd, records)` into exactly one message (§4.3). Pure: never
/// touches a socket. Panics if `sig_mode` requests authentication without a `secret`
/// — that's a caller bug, not a runtime condition (mirrors the codebase's own
/// size-invariant panics in cryptographic helpers).
pub fn build<R: AsRef<[u8]>>(
    secret: Option<&[u8]>,
    sig_mode: SigMode,
    cmd: Command,
    records: &[R],
) -> Vec<u8> {
    assert!(
        sig_mode == SigMode::None || secret.is_some(),
        "sig_mode {:?} requires a secret",
        sig_mode
    );

    let mut out = Vec::new();
    out.extend_from_slice(&magic_bytes());

    if secret.is_some() {
        let hdr = if sig_mode == SigMode::PerChunk { SIG_HDR_F1 } else { SIG_HDR_F0 };
        out.push(hdr);
    }

    let cmd_offset = out.len();
    out.push(cmd.to_byte());

    let mut auth = secret.map(Authenticator::new);

    if sig_mode == SigMode::PerChunk {
        let hash = auth.as_mut().expect("secret checked above");
        hash.update(&out[cmd_offset..]);
        out.extend_from_slice(&hash.digest());
    }

    if records.is_empty() {
        out.extend_from_slice(&EOR);
    } else {
        for (index, record) in records.iter().enumerate() {
            let payload = record.as_ref();

            if index > 0 {
                out.push(RSEP);
                if sig_mode == SigMode::PerChunk {
                    sign_last_three(&mut out, auth.as_mut().unwrap());
                }
            }

            if payload.is_empty() {
                out.extend_from_slice(&EOR);
            } else {
                let mut remaining = payload;
                while !remaining.is_empty() {
                    let take = remaining.len().min(MAX_CHUNK);
                    let (chunk, rest) = remaining.split_at(take);

                    let chunk_offset = out.len();
                    out.extend_from_slice(&(take as u16).to_be_bytes());
                    out.extend_from_slice(chunk);

                    if sig_mode == SigMode::PerChunk {
                        let hash = auth.as_mut().unwrap();
                        hash.update(&out[chunk_offset..]);
                        out.extend_from_slice(&hash.digest());
                    }

                    remaining = rest;
                }
                out.extend_from_slice(&EOR);
            }
        }
    }

    out.push(EOM);

    if let Some(hash) = auth.as_mut() {
        match sig_mode {
            SigMode::PerChunk => sign_last_three(&mut out, hash),
            SigMode::Whole => {
                hash.update(&out[cmd_offset..]);
                out.extend_from_slice(&hash.digest());
            }
            SigMode::None => unreachable!("secret implies sig_mode != None"),
        }
    }

    out
}

/// Feeds the last three bytes of `out` into `hash` and appends the resulting digest.
/// This is the "sign `fbuf_used(out) - 3, 3`" quirk from §9: the trailing `EOR` plus
/// the byte that follows it (`RSEP` or `EOM`), signed together after the fact rather
/// than when `EOR` itself was written. Byte-exact behavior — do not "fix" this.
fn sign_last_three(out: &mut Vec<u8>, hash: &mut Authenticator) {
    let tail_start = out.len() - 3;
    hash.update(&out[tail_start..].to_vec());
    out.extend_from_slice(&hash.digest());
}
