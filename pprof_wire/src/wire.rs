//! Tag/length wire reader.
//!
//! [`Reader`] walks a protobuf-encoded buffer one field at a time. Nothing is
//! copied: length-delimited payloads are returned as sub-slices of the input.

use crate::{DecodeError, Result};

const MAX_VARINT_LEN: usize = 10;

/// Encoding of a single field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
}

/// Payload of a decoded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value<'a> {
    Varint(u64),
    Fixed64(u64),
    Bytes(&'a [u8]),
    Fixed32(u32),
}

impl Value<'_> {
    pub fn wire_type(&self) -> WireType {
        match self {
            Value::Varint(_) => WireType::Varint,
            Value::Fixed64(_) => WireType::Fixed64,
            Value::Bytes(_) => WireType::LengthDelimited,
            Value::Fixed32(_) => WireType::Fixed32,
        }
    }
}

/// A single field read from a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    /// Field number from the tag.
    pub number: u32,
    /// Decoded payload.
    pub value: Value<'a>,
    /// Offset within the reader's buffer: the payload start for
    /// length-delimited fields, the tag start otherwise.
    pub offset: usize,
}

impl<'a> Field<'a> {
    /// The payload of a varint field.
    pub fn varint(&self) -> Result<u64> {
        match self.value {
            Value::Varint(v) => Ok(v),
            other => Err(self.unexpected(other, "varint")),
        }
    }

    /// The payload of a varint field, reinterpreted as a two's complement `int64`.
    pub fn int64(&self) -> Result<i64> {
        self.varint().map(|v| v as i64)
    }

    /// The payload of a length-delimited field.
    pub fn bytes(&self) -> Result<&'a [u8]> {
        match self.value {
            Value::Bytes(b) => Ok(b),
            other => Err(self.unexpected(other, "length-delimited")),
        }
    }

    /// Calls `f` for every varint carried by a repeated numeric field.
    ///
    /// Encoders may write repeated scalars either as one field per value or
    /// as a single length-delimited packed array. Both forms are accepted.
    pub fn for_each_varint<E>(
        &self,
        mut f: impl FnMut(u64) -> std::result::Result<(), E>,
    ) -> std::result::Result<(), E>
    where
        E: From<DecodeError>,
    {
        match self.value {
            Value::Varint(v) => f(v),
            Value::Bytes(packed) => {
                let mut reader = Reader::new(packed);
                while !reader.is_empty() {
                    f(reader.read_varint()?)?;
                }
                Ok(())
            }
            other => Err(self.unexpected(other, "varint or packed varints").into()),
        }
    }

    fn unexpected(&self, found: Value<'_>, expected: &'static str) -> DecodeError {
        DecodeError::UnexpectedWireType {
            field: self.number,
            found: found.wire_type(),
            expected,
        }
    }
}

/// Sequential reader over an encoded message.
///
/// The reader is also an [`Iterator`] over fields; iteration stops after the
/// first error.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset into the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Whether all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Read one base-128 varint.
    pub fn read_varint(&mut self) -> Result<u64> {
        let start = self.pos;
        let mut value = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let Some(&byte) = self.buf.get(self.pos) else {
                return Err(DecodeError::UnexpectedEof { offset: self.pos });
            };
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte < 0x80 {
                return Ok(value);
            }
        }
        Err(DecodeError::VarintOverflow { offset: start })
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(DecodeError::UnexpectedEof {
                offset: self.buf.len(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Read the next field, or `None` at the end of the buffer.
    pub fn read_field(&mut self) -> Result<Option<Field<'a>>> {
        if self.is_empty() {
            return Ok(None);
        }

        let tag_offset = self.pos;
        let key = self.read_varint()?;
        let number = key >> 3;
        let number = match u32::try_from(number) {
            Ok(n) if n != 0 => n,
            _ => {
                return Err(DecodeError::InvalidFieldNumber {
                    number,
                    offset: tag_offset,
                });
            }
        };

        let value = match key & 0x7 {
            0 => Value::Varint(self.read_varint()?),
            1 => {
                let bytes = self.take(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Value::Fixed64(u64::from_le_bytes(raw))
            }
            2 => {
                let len_offset = self.pos;
                let len = self.read_varint()?;
                let remaining = self.remaining();
                let len = match usize::try_from(len) {
                    Ok(l) if l <= remaining => l,
                    _ => {
                        return Err(DecodeError::LengthOutOfBounds {
                            offset: len_offset,
                            len,
                            remaining,
                        });
                    }
                };
                let offset = self.pos;
                return Ok(Some(Field {
                    number,
                    value: Value::Bytes(self.take(len)?),
                    offset,
                }));
            }
            5 => {
                let bytes = self.take(4)?;
                let mut raw = [0u8; 4];
                raw.copy_from_slice(bytes);
                Value::Fixed32(u32::from_le_bytes(raw))
            }
            other => {
                return Err(DecodeError::UnsupportedWireType {
                    field: number,
                    wire_type: other as u8,
                });
            }
        };

        Ok(Some(Field {
            number,
            value,
            offset: tag_offset,
        }))
    }
}

impl<'a> Iterator for Reader<'a> {
    type Item = Result<Field<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_field() {
            Ok(field) => field.map(Ok),
            Err(e) => {
                self.pos = self.buf.len();
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn put_varint(out: &mut Vec<u8>, mut value: u64) {
        while value >= 0x80 {
            out.push((value as u8) | 0x80);
            value >>= 7;
        }
        out.push(value as u8);
    }

    pub(crate) fn put_key(out: &mut Vec<u8>, field: u32, wire_type: u8) {
        put_varint(out, (u64::from(field) << 3) | u64::from(wire_type));
    }

    pub(crate) fn put_bytes(out: &mut Vec<u8>, field: u32, bytes: &[u8]) {
        put_key(out, field, 2);
        put_varint(out, bytes.len() as u64);
        out.extend_from_slice(bytes);
    }

    #[test]
    fn reads_multi_byte_varint() {
        let mut buf = Vec::new();
        put_varint(&mut buf, 300);
        put_varint(&mut buf, u64::MAX);
        let mut reader = Reader::new(&buf);

        assert_eq!(reader.read_varint().unwrap(), 300);
        assert_eq!(reader.read_varint().unwrap(), u64::MAX);
        assert!(reader.is_empty());
    }

    #[test]
    fn truncated_varint_fails() {
        let mut reader = Reader::new(&[0x80, 0x80]);
        assert!(matches!(
            reader.read_varint(),
            Err(DecodeError::UnexpectedEof { offset: 2 })
        ));
    }

    #[test]
    fn overlong_varint_fails() {
        let buf = [0xffu8; 11];
        let mut reader = Reader::new(&buf);
        assert!(matches!(
            reader.read_varint(),
            Err(DecodeError::VarintOverflow { offset: 0 })
        ));
    }

    #[test]
    fn reads_fields_of_every_wire_type() {
        let mut buf = Vec::new();
        put_key(&mut buf, 1, 0);
        put_varint(&mut buf, 42);
        put_key(&mut buf, 2, 1);
        buf.extend_from_slice(&7u64.to_le_bytes());
        put_bytes(&mut buf, 3, b"main");
        put_key(&mut buf, 4, 5);
        buf.extend_from_slice(&9u32.to_le_bytes());

        let fields: Vec<_> = Reader::new(&buf).collect::<Result<_>>().unwrap();

        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0].number, 1);
        assert_eq!(fields[0].value, Value::Varint(42));
        assert_eq!(fields[1].value, Value::Fixed64(7));
        assert_eq!(fields[2].value, Value::Bytes(b"main"));
        assert_eq!(&buf[fields[2].offset..fields[2].offset + 4], b"main");
        assert_eq!(fields[3].value, Value::Fixed32(9));
    }

    #[test]
    fn length_past_end_fails() {
        let mut buf = Vec::new();
        put_key(&mut buf, 6, 2);
        put_varint(&mut buf, 100);
        buf.extend_from_slice(b"short");

        let result: Result<Vec<_>> = Reader::new(&buf).collect();
        assert!(matches!(
            result,
            Err(DecodeError::LengthOutOfBounds {
                len: 100,
                remaining: 5,
                ..
            })
        ));
    }

    #[test]
    fn group_wire_type_is_rejected() {
        let mut buf = Vec::new();
        put_key(&mut buf, 2, 3);

        let result: Result<Vec<_>> = Reader::new(&buf).collect();
        assert!(matches!(
            result,
            Err(DecodeError::UnsupportedWireType {
                field: 2,
                wire_type: 3
            })
        ));
    }

    #[test]
    fn field_number_zero_is_rejected() {
        let result: Result<Vec<_>> = Reader::new(&[0x00, 0x01]).collect();
        assert!(matches!(
            result,
            Err(DecodeError::InvalidFieldNumber { number: 0, offset: 0 })
        ));
    }

    #[test]
    fn iteration_stops_after_error() {
        let mut reader = Reader::new(&[0x0b]);
        assert!(matches!(reader.next(), Some(Err(_))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn repeated_varints_accept_scalar_and_packed() {
        let mut buf = Vec::new();
        put_key(&mut buf, 1, 0);
        put_varint(&mut buf, 5);
        let mut packed = Vec::new();
        put_varint(&mut packed, 6);
        put_varint(&mut packed, 700);
        put_bytes(&mut buf, 1, &packed);

        let mut seen = Vec::new();
        for field in Reader::new(&buf) {
            field
                .unwrap()
                .for_each_varint(|v| {
                    seen.push(v);
                    Ok::<_, DecodeError>(())
                })
                .unwrap();
        }

        assert_eq!(seen, vec![5, 6, 700]);
    }

    #[test]
    fn truncated_packed_array_fails() {
        let field = Field {
            number: 2,
            value: Value::Bytes(&[0x96]),
            offset: 0,
        };
        assert!(field.for_each_varint(|_| Ok::<_, DecodeError>(())).is_err());
    }

    #[test]
    fn wrong_wire_type_is_reported() {
        let field = Field {
            number: 4,
            value: Value::Fixed32(1),
            offset: 0,
        };
        assert!(matches!(
            field.varint(),
            Err(DecodeError::UnexpectedWireType {
                field: 4,
                found: WireType::Fixed32,
                ..
            })
        ));
    }
}
