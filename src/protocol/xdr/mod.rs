//! XDR is a standard for the description and encoding of data.
//! It is useful for transferring data between different computer
//! architectures, and it is the wire format of every ONC RPC message
//! and of the credentials and verifiers that travel with them.
//!
//! <https://datatracker.ietf.org/doc/html/rfc4506>
//!
//! Its Rust-specific implementation is presented below.
//! Where appropriate, the standard types of the XDR language have
//! been replaced by similar types of the Rust language. For example,
//! the 32-bit `int` type was replaced by the `i32` type, and the
//! `opaque<>` type was replaced by `[u8]`/`Vec<u8>`.
//!
//! Values implement [`Serialize`] and [`Deserialize`]; a call or reply is
//! assembled in a fresh [`Packer`] and read back through a fresh
//! [`Unpacker`]. Neither is ever shared between calls.

use std::io::{Read, Write};

use byteorder::BigEndian;
use byteorder::{ReadBytesExt, WriteBytesExt};
use num_traits::{FromPrimitive, ToPrimitive};

mod buffer;
mod error;
pub mod rpc;
pub mod rpcsec_gss;
mod utils;

pub use buffer::{Packer, Unpacker};
pub use error::{Error, Result};

/// XDR assumes big endian encoding.
pub type XDREndian = BigEndian;

pub trait Serialize {
    /// Serializes the implementing type to the provided writer.
    ///
    /// ## Parameters
    /// * `dest` - Where will the value be serialized to.
    fn serialize<W: Write>(&self, dest: &mut W) -> Result<()>;
}

pub trait Deserialize {
    /// Deserializes data from the provided reader into the implementing type.
    ///
    /// ## Parameters
    /// * `src` - From where the value will be deserialized.
    fn deserialize<R: Read>(&mut self, src: &mut R) -> Result<()>;
}

/// Deserialization based on the [Default] trait of the type T.
pub fn deserialize<T>(src: &mut impl Read) -> Result<T>
where
    T: Deserialize + Default,
{
    let mut val = T::default();
    val.deserialize(src)?;

    Ok(val)
}

/// Serializes `value` into a new byte vector.
pub fn to_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    value.serialize(&mut buf)?;
    Ok(buf)
}

/// Decodes a complete value from `data`, rejecting trailing bytes.
pub fn from_bytes<T: Deserialize + Default>(data: &[u8]) -> Result<T> {
    let mut src = Unpacker::new(data);
    let val = src.unpack::<T>()?;
    src.done()?;
    Ok(val)
}

/// Marker trait for XDR `enum` type serialization.
pub trait SerializeEnum: ToPrimitive {}

/// Enumerations have the same representation as signed integers.
impl<T: SerializeEnum> Serialize for T {
    fn serialize<W: Write>(&self, dest: &mut W) -> Result<()> {
        if let Some(val) = self.to_i32() {
            dest.write_i32::<XDREndian>(val)?;
            return Ok(());
        }
        Err(utils::corrupt("enum value does not fit in i32"))
    }
}

/// Marker trait for XDR `enum` type deserialization.
pub trait DeserializeEnum: FromPrimitive {}

/// Enumerations have the same representation as signed integers.
impl<T: DeserializeEnum> Deserialize for T {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> Result<()> {
        let val = src.read_i32::<XDREndian>()?;
        if let Some(val) = FromPrimitive::from_i32(val) {
            *self = val;
            return Ok(());
        }

        Err(utils::corrupt(format!("invalid enum value {val}")))
    }
}

/// XDR `bool` type serialization implementation.
///
/// ```text
/// bool identifier;
/// ```
///
/// This is equivalent to:
///
/// ```text
///  enum { FALSE = 0, TRUE = 1 } identifier;
/// ```
impl Serialize for bool {
    fn serialize<W: Write>(&self, dest: &mut W) -> Result<()> {
        dest.write_u32::<XDREndian>(u32::from(*self))?;
        Ok(())
    }
}

/// XDR `bool` type deserialization implementation.
///
/// Anything other than 0 or 1 is rejected.
impl Deserialize for bool {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> Result<()> {
        match src.read_u32::<XDREndian>()? {
            0 => *self = false,
            1 => *self = true,
            other => return Err(utils::corrupt(format!("invalid bool value {other}"))),
        }
        Ok(())
    }
}

/// Implements a fixed-width numeric XDR type on top of `byteorder`.
macro_rules! xdr_number {
    ($t:ty, $xdr:literal, $write:ident, $read:ident) => {
        #[doc = concat!("XDR `", $xdr, "` type serialization implementation.")]
        impl Serialize for $t {
            fn serialize<W: Write>(&self, dest: &mut W) -> Result<()> {
                dest.$write::<XDREndian>(*self)?;
                Ok(())
            }
        }

        #[doc = concat!("XDR `", $xdr, "` type deserialization implementation.")]
        impl Deserialize for $t {
            fn deserialize<R: Read>(&mut self, src: &mut R) -> Result<()> {
                *self = src.$read::<XDREndian>()?;
                Ok(())
            }
        }
    };
}

xdr_number!(i32, "int", write_i32, read_i32);
xdr_number!(u32, "unsigned int", write_u32, read_u32);
xdr_number!(i64, "hyper", write_i64, read_i64);
xdr_number!(u64, "unsigned hyper", write_u64, read_u64);
xdr_number!(f32, "float", write_f32, read_f32);
xdr_number!(f64, "double", write_f64, read_f64);

/// XDR Fixed-Length Opaque Data serialization implementation.
///
/// ```text
/// opaque identifier[n];
/// ```
impl<const N: usize> Serialize for [u8; N] {
    fn serialize<W: Write>(&self, dest: &mut W) -> Result<()> {
        dest.write_all(self)?;
        utils::write_padding(N, dest)
    }
}

/// XDR Fixed-Length Opaque Data deserialization implementation.
impl<const N: usize> Deserialize for [u8; N] {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> Result<()> {
        src.read_exact(self)?;
        utils::read_padding(N, src)
    }
}

/// Object lengths in XDR are always serialized as [u32]. This wrapper
/// type provides a way to serialize the [usize] type common to Rust as [u32].
#[derive(Default)]
pub(crate) struct UsizeAsU32(pub usize);

/// Try to convert [usize] to [u32] and serialize.
impl Serialize for UsizeAsU32 {
    fn serialize<W: Write>(&self, dest: &mut W) -> Result<()> {
        let Some(val) = self.0.to_u32() else {
            return Err(Error::InvalidLength { len: self.0 });
        };

        val.serialize(dest)
    }
}

/// Try to deserialize [u32] and convert to [usize].
impl Deserialize for UsizeAsU32 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> Result<()> {
        let raw = deserialize::<u32>(src)?;
        let Some(val) = raw.to_usize() else {
            return Err(Error::InvalidLength { len: usize::MAX });
        };

        self.0 = val;
        Ok(())
    }
}

/// XDR Variable-Length Opaque Data serialization implementation.
impl Serialize for [u8] {
    fn serialize<W: Write>(&self, dest: &mut W) -> Result<()> {
        UsizeAsU32(self.len()).serialize(dest)?;
        dest.write_all(self)?;
        utils::write_padding(self.len(), dest)
    }
}

/// XDR Variable-Length Opaque Data deserialization implementation.
impl Deserialize for Vec<u8> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> Result<()> {
        let length = deserialize::<UsizeAsU32>(src)?.0;
        *self = utils::read_bytes(length, src)?;
        utils::read_padding(length, src)
    }
}

/// XDR String serialization implementation.
impl Serialize for str {
    fn serialize<W: Write>(&self, dest: &mut W) -> Result<()> {
        self.as_bytes().serialize(dest)
    }
}

impl Serialize for String {
    fn serialize<W: Write>(&self, dest: &mut W) -> Result<()> {
        self.as_str().serialize(dest)
    }
}

/// XDR String deserialization implementation.
///
/// Fails with [`Error::EncodingError`] if the bytes are not valid UTF-8.
impl Deserialize for String {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> Result<()> {
        self.clear();
        let bytes = deserialize::<Vec<u8>>(src)?;
        *self = String::from_utf8(bytes).map_err(|_| Error::EncodingError)?;
        Ok(())
    }
}

/// XDR Fixed-Length Array serialization implementation.
///
/// ```text
/// type-name identifier[n];
/// ```
impl<const N: usize, T: Serialize> Serialize for [T; N] {
    fn serialize<W: Write>(&self, dest: &mut W) -> Result<()> {
        for i in self {
            i.serialize(dest)?;
        }

        Ok(())
    }
}

/// XDR Fixed-Length Array deserialization implementation.
impl<const N: usize, T: Deserialize> Deserialize for [T; N] {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> Result<()> {
        for i in self {
            i.deserialize(src)?;
        }

        Ok(())
    }
}

/// XDR Variable-Length Array serialization implementation.
///
/// Serialized as a 4-byte count followed by that many elements.
impl<T: Serialize> Serialize for [T] {
    fn serialize<W: Write>(&self, dest: &mut W) -> Result<()> {
        UsizeAsU32(self.len()).serialize(dest)?;
        for i in self {
            i.serialize(dest)?;
        }

        Ok(())
    }
}

impl<T> Serialize for Vec<T>
where
    [T]: Serialize,
{
    fn serialize<W: Write>(&self, dest: &mut W) -> Result<()> {
        self.as_slice().serialize(dest)
    }
}

/// XDR Variable-Length Array deserialization implementation.
impl<T: Deserialize + Default> Deserialize for Vec<T> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> Result<()> {
        let length = deserialize::<UsizeAsU32>(src)?.0;
        self.clear();
        self.reserve(length.min(utils::MAX_PREALLOC / utils::ALIGNMENT));
        for _ in 0..length {
            self.push(deserialize::<T>(src)?);
        }
        Ok(())
    }
}

/// Macro for implementing XDR serialization and deserialization for structs.
///
/// This macro simplifies implementation of the XDR trait for struct types
/// by serializing or deserializing each field in sequence.
#[macro_export]
macro_rules! SerializeStruct {
    (
        $t:ident,
        $($element:ident),*
    ) => {
        impl Serialize for $t {
            fn serialize<W: Write>(&self, dest: &mut W) -> $crate::xdr::Result<()> {
                $(self.$element.serialize(dest)?;)*
                Ok(())
            }
        }
    };
}

#[macro_export]
macro_rules! DeserializeStruct {
    (
        $t:ident,
        $($element:ident),*
    ) => {
        impl Deserialize for $t {
            fn deserialize<R: Read>(&mut self, src: &mut R) -> $crate::xdr::Result<()> {
                $(self.$element.deserialize(src)?;)*
                Ok(())
            }
        }
    };
}

// XDR Optional-Data serialization implementation.
impl<T: Serialize> Serialize for Option<T> {
    fn serialize<W: Write>(&self, dest: &mut W) -> Result<()> {
        match self {
            Some(data) => {
                true.serialize(dest)?;
                data.serialize(dest)
            }
            None => false.serialize(dest),
        }
    }
}

// XDR Optional-Data deserialization implementation.
impl<T: Deserialize + Default> Deserialize for Option<T> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> Result<()> {
        if deserialize::<bool>(src)? {
            *self = Some(deserialize::<T>(src)?);
        } else {
            *self = None;
        }

        Ok(())
    }
}

// Re-export public types for use in other modules
pub use crate::DeserializeStruct;
pub use crate::SerializeStruct;
