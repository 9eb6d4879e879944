//! Core wire-level and record-level types.

use crate::error::{Error, Result};

/// Byte ordering of a multi-byte primitive or bit field.
///
/// `Big` writes the most significant byte first. For bit fields wider
/// than eight bits, `Little` reverses the byte order of the filled byte
/// window while preserving MSB-first bit order within each byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    BigEndian,
    LittleEndian,
}

/// Bit numbering used when packing a [`BitSet`] into bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BitOrder {
    /// Bit 0 of the set is the most significant bit of the first byte.
    MsbFirst,
    /// Bit 0 of the set is the least significant bit of the first byte.
    LsbFirst,
}

/// The whitelist of charsets that text bindings may declare.
///
/// Anything outside this list is rejected with [`Error::BadCharset`]
/// when the template is built, never at decode time.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Charset {
    Ascii,
    Utf8,
    Iso8859_1,
    Utf16Be,
    Utf16Le,
}

impl Charset {
    /// Look up a charset by its conventional name.
    ///
    /// Matching is case-insensitive and accepts the common aliases
    /// (`US-ASCII`, `LATIN1`).
    pub fn for_name(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "ASCII" | "US-ASCII" => Ok(Charset::Ascii),
            "UTF-8" | "UTF8" => Ok(Charset::Utf8),
            "ISO-8859-1" | "LATIN1" => Ok(Charset::Iso8859_1),
            "UTF-16BE" => Ok(Charset::Utf16Be),
            "UTF-16LE" => Ok(Charset::Utf16Le),
            _ => Err(Error::BadCharset(name.to_string())),
        }
    }

    /// The conventional name of this charset.
    pub fn name(self) -> &'static str {
        match self {
            Charset::Ascii => "US-ASCII",
            Charset::Utf8 => "UTF-8",
            Charset::Iso8859_1 => "ISO-8859-1",
            Charset::Utf16Be => "UTF-16BE",
            Charset::Utf16Le => "UTF-16LE",
        }
    }

    /// Decode raw bytes into a string under this charset.
    pub fn decode(self, bytes: &[u8]) -> Result<String> {
        match self {
            Charset::Ascii => {
                if bytes.iter().any(|b| *b > 0x7F) {
                    return Err(Error::BadCharset(self.name().to_string()));
                }

                Ok(bytes.iter().map(|b| *b as char).collect())
            }
            Charset::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|_| Error::BadCharset(self.name().to_string())),
            Charset::Iso8859_1 => Ok(bytes.iter().map(|b| *b as char).collect()),
            Charset::Utf16Be | Charset::Utf16Le => {
                if bytes.len() % 2 != 0 {
                    return Err(Error::BadCharset(self.name().to_string()));
                }

                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| {
                        if self == Charset::Utf16Be {
                            u16::from_be_bytes([pair[0], pair[1]])
                        } else {
                            u16::from_le_bytes([pair[0], pair[1]])
                        }
                    })
                    .collect();

                String::from_utf16(&units).map_err(|_| Error::BadCharset(self.name().to_string()))
            }
        }
    }

    /// Encode a string into raw bytes under this charset.
    pub fn encode(self, text: &str) -> Result<Vec<u8>> {
        match self {
            Charset::Ascii => {
                if !text.is_ascii() {
                    return Err(Error::BadCharset(self.name().to_string()));
                }

                Ok(text.bytes().collect())
            }
            Charset::Utf8 => Ok(text.as_bytes().to_vec()),
            Charset::Iso8859_1 => text
                .chars()
                .map(|c| {
                    let code = c as u32;
                    if code > 0xFF {
                        Err(Error::BadCharset(self.name().to_string()))
                    } else {
                        Ok(code as u8)
                    }
                })
                .collect(),
            Charset::Utf16Be | Charset::Utf16Le => {
                let mut out = Vec::with_capacity(text.len() * 2);
                for unit in text.encode_utf16() {
                    let pair = if self == Charset::Utf16Be {
                        unit.to_be_bytes()
                    } else {
                        unit.to_le_bytes()
                    };
                    out.extend_from_slice(&pair);
                }

                Ok(out)
            }
        }
    }
}

/// A dynamically-sized packed bit container.
///
/// Backs the raw-bitset field binding. Bits are indexed from zero; the
/// mapping between bit index and wire position is chosen by the
/// [`BitOrder`] given at pack/unpack time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitSet {
    bits: Vec<bool>,
}

impl BitSet {
    /// Create a set of `len` cleared bits.
    pub fn new(len: usize) -> Self {
        Self {
            bits: vec![false; len],
        }
    }

    /// Number of bits in the set.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Whether the set holds no bits at all.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Read one bit. Out-of-range indices read as clear.
    pub fn get(&self, index: usize) -> bool {
        self.bits.get(index).copied().unwrap_or(false)
    }

    /// Write one bit. Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, value: bool) {
        if let Some(slot) = self.bits.get_mut(index) {
            *slot = value;
        }
    }

    /// Unpack `len` bits from a byte window.
    pub fn from_bytes(bytes: &[u8], len: usize, order: BitOrder) -> Self {
        let mut set = BitSet::new(len);
        for index in 0..len {
            let (byte, bit) = (index / 8, index % 8);
            let mask = match order {
                BitOrder::MsbFirst => 0x80 >> bit,
                BitOrder::LsbFirst => 1 << bit,
            };
            if bytes.get(byte).map(|b| b & mask != 0).unwrap_or(false) {
                set.set(index, true);
            }
        }

        set
    }

    /// Pack the set into its byte window, zero-padding the final byte.
    pub fn to_bytes(&self, order: BitOrder) -> Vec<u8> {
        let mut bytes = vec![0u8; (self.len() + 7) / 8];
        for (index, bit) in self.bits.iter().enumerate() {
            if *bit {
                let mask = match order {
                    BitOrder::MsbFirst => 0x80 >> (index % 8),
                    BitOrder::LsbFirst => 1 << (index % 8),
                };
                bytes[index / 8] |= mask;
            }
        }

        bytes
    }
}

/// A value held by a record field.
///
/// This is the engine's entire value space: every codec decodes into it
/// and encodes out of it, and the expression evaluator computes over it.
/// A field whose bind condition did not hold stays `Null`.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Bits(BitSet),
    Record(Record),
    List(Vec<Value>),
}

impl Value {
    /// Human-readable name of the value's shape, for error reporting.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Bits(_) => "bits",
            Value::Record(_) => "record",
            Value::List(_) => "list",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Coerce to an unsigned integer, if the value has one.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) if *v >= 0 => Some(*v as u64),
            Value::Bool(b) => Some(*b as u64),
            _ => None,
        }
    }

    /// Coerce to a signed integer, if the value has one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) if *v <= i64::MAX as u64 => Some(*v as i64),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Coerce to a float. Integers widen losslessly up to 2^53.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Length of the value's natural element space, if it has one.
    ///
    /// Strings count characters, byte arrays count bytes, bit sets count
    /// bits, lists count elements. Exposed to expressions as the `size`
    /// pseudo-property.
    pub fn size(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.chars().count()),
            Value::Bytes(b) => Some(b.len()),
            Value::Bits(b) => Some(b.len()),
            Value::List(l) => Some(l.len()),
            _ => None,
        }
    }
}

/// A message record under construction or composition.
///
/// Fields keep their insertion order, which the driver guarantees is the
/// template's step declaration order.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    type_name: String,
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Create an empty record of the named type.
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            fields: Vec::new(),
        }
    }

    /// The record's type name, used for encode-side choice selection.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Fetch a field value. Absent fields read as `None`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Assign a field, replacing any previous value under the same name.
    pub fn set(&mut self, name: &str, value: Value) {
        if let Some(slot) = self
            .fields
            .iter_mut()
            .find(|(field, _)| field == name)
        {
            slot.1 = value;
        } else {
            self.fields.push((name.to_string(), value));
        }
    }

    /// Iterate fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charset_lookup() {
        assert_eq!(Charset::Utf8, Charset::for_name("utf-8").unwrap());
        assert_eq!(Charset::Ascii, Charset::for_name("US-ASCII").unwrap());
        assert_eq!(Charset::Iso8859_1, Charset::for_name("latin1").unwrap());
        Charset::for_name("EBCDIC").unwrap_err();
    }

    #[test]
    fn ascii_rejects_high_bytes() {
        Charset::Ascii.decode(&[0x41, 0xFF]).unwrap_err();
        Charset::Ascii.encode("héllo").unwrap_err();
    }

    #[test]
    fn latin1_roundtrip() {
        let bytes = [0x41, 0xE9, 0xFF];
        let text = Charset::Iso8859_1.decode(&bytes).unwrap();
        assert_eq!("Aéÿ", text);
        assert_eq!(bytes.to_vec(), Charset::Iso8859_1.encode(&text).unwrap());
    }

    #[test]
    fn utf16_roundtrip() {
        let text = "héllo";
        let be = Charset::Utf16Be.encode(text).unwrap();
        let le = Charset::Utf16Le.encode(text).unwrap();
        assert_eq!(text, Charset::Utf16Be.decode(&be).unwrap());
        assert_eq!(text, Charset::Utf16Le.decode(&le).unwrap());
        assert_eq!(be[0], le[1]);
        assert_eq!(be[1], le[0]);
    }

    #[test]
    fn bitset_msb_first() {
        let set = BitSet::from_bytes(&[0b1010_0000], 4, BitOrder::MsbFirst);
        assert!(set.get(0));
        assert!(!set.get(1));
        assert!(set.get(2));
        assert!(!set.get(3));
        assert_eq!(vec![0b1010_0000], set.to_bytes(BitOrder::MsbFirst));
    }

    #[test]
    fn bitset_lsb_first() {
        let set = BitSet::from_bytes(&[0b0000_0101], 4, BitOrder::LsbFirst);
        assert!(set.get(0));
        assert!(!set.get(1));
        assert!(set.get(2));
        assert_eq!(vec![0b0000_0101], set.to_bytes(BitOrder::LsbFirst));
    }

    #[test]
    fn record_field_order_and_replace() {
        let mut record = Record::new("Frame");
        record.set("a", Value::Int(1));
        record.set("b", Value::Int(2));
        record.set("a", Value::Int(3));

        let names: Vec<&str> = record.fields().map(|(name, _)| name).collect();
        assert_eq!(vec!["a", "b"], names);
        assert_eq!(Some(&Value::Int(3)), record.get("a"));
    }
}
