//! Binary encoding for ops, logs, and the logbook file.
//!
//! Op record layout (all integers little-endian):
//!
//! ```text
//! kind        u8
//! timestamp   i64
//! prev        32 bytes (zero hash for a root op)
//! author_id   32 bytes
//! payload_len u32
//! payload     payload_len bytes (canonical CBOR)
//! sig_len     u16
//! signature   sig_len bytes
//! ```
//!
//! The signature covers every byte before `sig_len`. A log serializes as
//! a length-prefixed block: op count + op records, child count + child
//! blocks, recursively. The logbook file is a `QFBL` magic + version
//! header followed by the author-log blocks.
//!
//! Round-trips are byte-exact; hashes and signatures depend on it.

use quarry_core::canonical::{from_canonical_slice, to_canonical_vec};
use quarry_core::crypto::{Hash, Signature};
use quarry_core::ident::AuthorId;

use crate::error::{OplogError, Result};
use crate::log::Log;
use crate::op::{Op, OpKind, OpPayload};

/// Magic bytes opening a logbook file.
pub const BOOK_MAGIC: [u8; 4] = *b"QFBL";

/// The logbook format version this build reads and writes.
pub const BOOK_VERSION: u16 = 1;

/// Encode the portion of an op that its signature covers.
pub fn signed_message_bytes(op: &Op) -> Result<Vec<u8>> {
    let payload = encode_payload(&op.payload)?;
    let mut buf = Vec::with_capacity(77 + payload.len());
    buf.push(op.kind().to_u8());
    buf.extend_from_slice(&op.timestamp.to_le_bytes());
    buf.extend_from_slice(op.prev.unwrap_or(Hash::ZERO).as_bytes());
    buf.extend_from_slice(op.author_id.as_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Encode a complete op record.
pub fn encode_op(op: &Op) -> Result<Vec<u8>> {
    let mut buf = signed_message_bytes(op)?;
    let sig = op.signature.as_bytes();
    buf.extend_from_slice(&(sig.len() as u16).to_le_bytes());
    buf.extend_from_slice(sig);
    Ok(buf)
}

/// Decode one op record from the front of `bytes`.
///
/// Returns the op and the number of bytes consumed.
pub fn decode_op(bytes: &[u8]) -> Result<(Op, usize)> {
    let mut r = Reader::new(bytes);

    let kind_byte = r.u8()?;
    let kind = OpKind::from_u8(kind_byte)
        .ok_or_else(|| OplogError::Malformed(format!("unknown op kind {kind_byte:#04x}")))?;
    let timestamp = r.i64()?;
    let prev_bytes = r.array32()?;
    let prev = if prev_bytes == [0u8; 32] {
        None
    } else {
        Some(Hash::from_bytes(prev_bytes))
    };
    let author_id = AuthorId::from_bytes(r.array32()?);

    let payload_len = r.u32()? as usize;
    let payload_bytes = r.take(payload_len)?;
    let payload = decode_payload(kind, payload_bytes)?;

    let sig_len = r.u16()? as usize;
    if sig_len != 64 {
        return Err(OplogError::Malformed(format!(
            "signature length {sig_len}, expected 64"
        )));
    }
    let sig_bytes: [u8; 64] = r
        .take(sig_len)?
        .try_into()
        .map_err(|_| OplogError::Malformed("truncated signature".into()))?;

    Ok((
        Op {
            timestamp,
            prev,
            author_id,
            payload,
            signature: Signature::from_bytes(sig_bytes),
        },
        r.consumed(),
    ))
}

fn encode_payload(payload: &OpPayload) -> Result<Vec<u8>> {
    let bytes = match payload {
        OpPayload::Init(p) => to_canonical_vec(p)?,
        OpPayload::Commit(p) => to_canonical_vec(p)?,
        OpPayload::Rename(p) => to_canonical_vec(p)?,
        OpPayload::Link(p) => to_canonical_vec(p)?,
        OpPayload::KeyRotation(p) => to_canonical_vec(p)?,
        OpPayload::Acl(p) => to_canonical_vec(p)?,
        OpPayload::Delete | OpPayload::Publish | OpPayload::Unpublish | OpPayload::Unlink => {
            Vec::new()
        }
    };
    Ok(bytes)
}

fn decode_payload(kind: OpKind, bytes: &[u8]) -> Result<OpPayload> {
    let payload = match kind {
        OpKind::Init => OpPayload::Init(from_canonical_slice(bytes)?),
        OpKind::Commit => OpPayload::Commit(from_canonical_slice(bytes)?),
        OpKind::Rename => OpPayload::Rename(from_canonical_slice(bytes)?),
        OpKind::Link => OpPayload::Link(from_canonical_slice(bytes)?),
        OpKind::KeyRotation => OpPayload::KeyRotation(from_canonical_slice(bytes)?),
        OpKind::Acl => OpPayload::Acl(from_canonical_slice(bytes)?),
        OpKind::Delete => OpPayload::Delete,
        OpKind::Publish => OpPayload::Publish,
        OpKind::Unpublish => OpPayload::Unpublish,
        OpKind::Unlink => OpPayload::Unlink,
    };
    Ok(payload)
}

/// Encode a log tree as a length-prefixed block.
pub fn encode_log(log: &Log) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    body.extend_from_slice(&(log.ops.len() as u32).to_le_bytes());
    for op in &log.ops {
        body.extend_from_slice(&encode_op(op)?);
    }
    body.extend_from_slice(&(log.logs.len() as u32).to_le_bytes());
    for child in &log.logs {
        body.extend_from_slice(&encode_log(child)?);
    }

    let mut buf = Vec::with_capacity(4 + body.len());
    buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Decode one log block from the front of `bytes`.
///
/// Returns the log and the number of bytes consumed.
pub fn decode_log(bytes: &[u8]) -> Result<(Log, usize)> {
    let mut r = Reader::new(bytes);
    let body_len = r.u32()? as usize;
    let body = r.take(body_len)?;

    let mut br = Reader::new(body);
    let op_count = br.u32()? as usize;
    let mut ops = Vec::with_capacity(op_count.min(1024));
    for _ in 0..op_count {
        let (op, used) = decode_op(br.rest())?;
        br.take(used)?;
        ops.push(op);
    }

    let child_count = br.u32()? as usize;
    let mut logs = Vec::with_capacity(child_count.min(1024));
    for _ in 0..child_count {
        let (child, used) = decode_log(br.rest())?;
        br.take(used)?;
        logs.push(child);
    }

    if !br.rest().is_empty() {
        return Err(OplogError::Malformed("trailing bytes in log block".into()));
    }

    Ok((Log { ops, logs }, r.consumed()))
}

/// Encode a full logbook: header + author-log blocks.
pub fn encode_book(logs: &[Log]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&BOOK_MAGIC);
    buf.extend_from_slice(&BOOK_VERSION.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // reserved
    buf.extend_from_slice(&(logs.len() as u32).to_le_bytes());
    for log in logs {
        buf.extend_from_slice(&encode_log(log)?);
    }
    Ok(buf)
}

/// Decode a full logbook file.
pub fn decode_book(bytes: &[u8]) -> Result<Vec<Log>> {
    let mut r = Reader::new(bytes);

    let magic = r.take(4)?;
    if magic != BOOK_MAGIC {
        return Err(OplogError::Corrupt("bad logbook magic".into()));
    }
    let version = r.u16()?;
    if version != BOOK_VERSION {
        return Err(OplogError::UnsupportedVersion(version));
    }
    let _reserved = r.u16()?;

    let count = r.u32()? as usize;
    let mut logs = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let (log, used) = decode_log(r.rest())?;
        r.take(used)?;
        logs.push(log);
    }

    if !r.rest().is_empty() {
        return Err(OplogError::Malformed("trailing bytes in logbook".into()));
    }

    Ok(logs)
}

/// Bounds-checked little-endian reader.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn consumed(&self) -> usize {
        self.pos
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(OplogError::Malformed("unexpected end of input".into()));
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i64(&mut self) -> Result<i64> {
        let b = self.take(8)?;
        let arr: [u8; 8] = b.try_into().expect("slice length checked");
        Ok(i64::from_le_bytes(arr))
    }

    fn array32(&mut self) -> Result<[u8; 32]> {
        let b = self.take(32)?;
        Ok(b.try_into().expect("slice length checked"))
    }
}
