//! The `SHD1` delta payload format.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! magic        4 bytes   "SHD1"
//! source hash  32 bytes  blake3 of the binary the delta applies to
//! output len   u64
//! ops          repeated until end of payload:
//!   0x01 COPY   offset u64, len u64   copy bytes from the source
//!   0x02 INSERT len u64, bytes        append literal bytes
//! ```
//!
//! Applying a delta to any source other than the one it was made from is
//! rejected before any op runs.

use crate::{PatchError, PatchResult};

/// Payload magic.
pub const DELTA_MAGIC: &[u8; 4] = b"SHD1";

const OP_COPY: u8 = 0x01;
const OP_INSERT: u8 = 0x02;
const HEADER_LEN: usize = 4 + 32 + 8;

/// One delta operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOp {
    /// Copy `len` bytes starting at `offset` in the source.
    Copy {
        /// Source offset.
        offset: u64,
        /// Byte count.
        len: u64,
    },
    /// Append literal bytes.
    Insert(Vec<u8>),
}

/// A decoded delta payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    source_hash: [u8; 32],
    output_len: u64,
    ops: Vec<DeltaOp>,
}

impl Delta {
    /// Build a delta that turns `source` into `target`.
    ///
    /// The delta keeps the common prefix and suffix as copies and inserts
    /// whatever differs between them.
    #[must_use]
    pub fn between(source: &[u8], target: &[u8]) -> Self {
        let prefix = source
            .iter()
            .zip(target)
            .take_while(|(a, b)| a == b)
            .count();
        let max_suffix = source.len().min(target.len()).saturating_sub(prefix);
        let suffix = source
            .iter()
            .rev()
            .zip(target.iter().rev())
            .take(max_suffix)
            .take_while(|(a, b)| a == b)
            .count();

        let mut ops = Vec::new();
        if prefix > 0 {
            ops.push(DeltaOp::Copy {
                offset: 0,
                len: prefix as u64,
            });
        }
        let middle_end = target.len().saturating_sub(suffix);
        if middle_end > prefix {
            ops.push(DeltaOp::Insert(target[prefix..middle_end].to_vec()));
        }
        if suffix > 0 {
            ops.push(DeltaOp::Copy {
                offset: source.len().saturating_sub(suffix) as u64,
                len: suffix as u64,
            });
        }

        Self {
            source_hash: *blake3::hash(source).as_bytes(),
            output_len: target.len() as u64,
            ops,
        }
    }

    /// Decode a payload.
    ///
    /// # Errors
    ///
    /// Returns `PatchError::MalformedDelta` for a bad magic, truncated data or
    /// an unknown op, and `PatchError::OutOfBounds` when the declared output
    /// length is more than the ops can produce.
    pub fn parse(payload: &[u8]) -> PatchResult<Self> {
        let mut reader = Reader::new(payload);
        if reader.take(4)? != DELTA_MAGIC {
            return Err(PatchError::MalformedDelta("bad magic".into()));
        }
        let mut source_hash = [0u8; 32];
        source_hash.copy_from_slice(reader.take(32)?);
        let output_len = reader.u64()?;

        let mut ops = Vec::new();
        while !reader.is_empty() {
            match reader.byte()? {
                OP_COPY => {
                    let offset = reader.u64()?;
                    let len = reader.u64()?;
                    ops.push(DeltaOp::Copy { offset, len });
                },
                OP_INSERT => {
                    let len = usize::try_from(reader.u64()?).map_err(|_| {
                        PatchError::MalformedDelta("insert length exceeds address space".into())
                    })?;
                    ops.push(DeltaOp::Insert(reader.take(len)?.to_vec()));
                },
                other => {
                    return Err(PatchError::MalformedDelta(format!("unknown op 0x{other:02x}")));
                },
            }
        }

        if let Some(produced) = produced_len(&ops)
            && output_len > produced
        {
            return Err(PatchError::OutOfBounds(format!(
                "declared output length {output_len} exceeds the {produced} bytes the ops produce"
            )));
        }

        Ok(Self {
            source_hash,
            output_len,
            ops,
        })
    }

    /// Encode to the payload format.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(DELTA_MAGIC);
        out.extend_from_slice(&self.source_hash);
        out.extend_from_slice(&self.output_len.to_le_bytes());
        for op in &self.ops {
            match op {
                DeltaOp::Copy { offset, len } => {
                    out.push(OP_COPY);
                    out.extend_from_slice(&offset.to_le_bytes());
                    out.extend_from_slice(&len.to_le_bytes());
                },
                DeltaOp::Insert(bytes) => {
                    out.push(OP_INSERT);
                    out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
                    out.extend_from_slice(bytes);
                },
            }
        }
        out
    }

    /// Hex blake3 of the expected source.
    #[must_use]
    pub fn source_hash(&self) -> String {
        blake3::Hash::from_bytes(self.source_hash).to_hex().to_string()
    }

    /// Declared output length.
    #[must_use]
    pub fn output_len(&self) -> u64 {
        self.output_len
    }

    /// The operations in order.
    #[must_use]
    pub fn ops(&self) -> &[DeltaOp] {
        &self.ops
    }

    /// Apply the delta to `source`.
    ///
    /// # Errors
    ///
    /// Returns `PatchError::SourceMismatch` if `source` is not the binary the
    /// delta was made from, and `PatchError::OutOfBounds` if an op reads past
    /// the source or the output does not come out at the declared length.
    pub fn apply(&self, source: &[u8]) -> PatchResult<Vec<u8>> {
        let actual = blake3::hash(source);
        if actual.as_bytes() != &self.source_hash {
            return Err(PatchError::SourceMismatch {
                expected: self.source_hash(),
                actual: actual.to_hex().to_string(),
            });
        }

        let output_len = usize::try_from(self.output_len)
            .map_err(|_| PatchError::OutOfBounds("output length exceeds address space".into()))?;
        // Capacity is bounded by the inputs, never by the declared length.
        let inserted: usize = self
            .ops
            .iter()
            .map(|op| match op {
                DeltaOp::Insert(bytes) => bytes.len(),
                DeltaOp::Copy { .. } => 0,
            })
            .fold(0, usize::saturating_add);
        let mut out = Vec::with_capacity(output_len.min(source.len().saturating_add(inserted)));

        for op in &self.ops {
            let chunk: &[u8] = match op {
                DeltaOp::Copy { offset, len } => {
                    let start = usize::try_from(*offset).ok();
                    let end = start.zip(usize::try_from(*len).ok()).and_then(|(s, l)| s.checked_add(l));
                    match (start, end) {
                        (Some(start), Some(end)) if end <= source.len() => &source[start..end],
                        _ => {
                            return Err(PatchError::OutOfBounds(format!(
                                "copy {len} bytes at {offset} from a {} byte source",
                                source.len()
                            )));
                        },
                    }
                },
                DeltaOp::Insert(bytes) => bytes,
            };
            let new_len = out.len().checked_add(chunk.len());
            if new_len.is_none_or(|n| n > output_len) {
                return Err(PatchError::OutOfBounds(format!(
                    "output exceeds declared length {output_len}"
                )));
            }
            out.extend_from_slice(chunk);
        }

        if out.len() != output_len {
            return Err(PatchError::OutOfBounds(format!(
                "output is {} bytes, expected {output_len}",
                out.len()
            )));
        }
        Ok(out)
    }
}

/// Total bytes the ops claim to produce, `None` past `u64::MAX`.
fn produced_len(ops: &[DeltaOp]) -> Option<u64> {
    ops.iter().try_fold(0u64, |total, op| match op {
        DeltaOp::Copy { len, .. } => total.checked_add(*len),
        DeltaOp::Insert(bytes) => total.checked_add(u64::try_from(bytes.len()).ok()?),
    })
}

struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn take(&mut self, n: usize) -> PatchResult<&'a [u8]> {
        if self.data.len() < n {
            return Err(PatchError::MalformedDelta(format!(
                "truncated payload: needed {n} bytes, {} left",
                self.data.len()
            )));
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn byte(&mut self) -> PatchResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u64(&mut self) -> PatchResult<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn between_produces_minimal_ops() {
        let source = b"hello brave world";
        let target = b"hello new world!";
        let delta = Delta::between(source, target);
        assert_eq!(delta.apply(source).unwrap(), target);
        assert!(matches!(delta.ops()[0], DeltaOp::Copy { offset: 0, len: 6 }));

        let parsed = Delta::parse(&delta.encode()).unwrap();
        assert_eq!(parsed, delta);
    }

    #[test]
    fn identical_inputs_are_a_single_copy() {
        let delta = Delta::between(b"same", b"same");
        assert_eq!(delta.ops(), &[DeltaOp::Copy { offset: 0, len: 4 }]);
    }

    #[test]
    fn wrong_source_is_rejected() {
        let delta = Delta::between(b"original", b"patched");
        let err = delta.apply(b"something else").unwrap_err();
        assert!(matches!(err, PatchError::SourceMismatch { .. }));
    }

    #[test]
    fn bad_payloads_are_malformed() {
        assert!(matches!(Delta::parse(b"NOPE"), Err(PatchError::MalformedDelta(_))));
        assert!(matches!(Delta::parse(b"SHD1\x00"), Err(PatchError::MalformedDelta(_))));

        let mut payload = Delta::between(b"a", b"b").encode();
        payload.push(0x7f);
        assert!(matches!(Delta::parse(&payload), Err(PatchError::MalformedDelta(_))));
    }

    #[test]
    fn declared_length_beyond_ops_is_rejected() {
        let mut payload = Delta::between(b"abc", b"abcd").encode();
        payload[36..44].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(Delta::parse(&payload), Err(PatchError::OutOfBounds(_))));
    }

    #[test]
    fn out_of_range_copy_is_rejected() {
        let source = b"tiny";
        let mut delta = Delta::between(source, b"tiny");
        delta.ops = vec![DeltaOp::Copy { offset: 2, len: 10 }];
        delta.output_len = 10;
        assert!(matches!(delta.apply(source), Err(PatchError::OutOfBounds(_))));
    }
}
