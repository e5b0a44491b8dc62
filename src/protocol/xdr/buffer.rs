//! Single-use XDR buffers.
//!
//! A [`Packer`] only ever appends; an [`Unpacker`] walks a borrowed byte slice
//! with a cursor that never passes its end. One of each is created per call
//! and per reply, so no cursor state is ever shared between calls.

use std::io::{Read, Write};

use super::{utils, Deserialize, Error, Result, Serialize, UsizeAsU32};

/// Write side of an XDR buffer.
#[derive(Debug, Default, Clone)]
pub struct Packer {
    buf: Vec<u8>,
}

impl Packer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity) }
    }

    /// Appends any serializable value.
    pub fn pack<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut self.buf)
    }

    pub fn pack_uint(&mut self, value: u32) -> Result<()> {
        self.pack(&value)
    }

    pub fn pack_int(&mut self, value: i32) -> Result<()> {
        self.pack(&value)
    }

    pub fn pack_uhyper(&mut self, value: u64) -> Result<()> {
        self.pack(&value)
    }

    pub fn pack_hyper(&mut self, value: i64) -> Result<()> {
        self.pack(&value)
    }

    pub fn pack_bool(&mut self, value: bool) -> Result<()> {
        self.pack(&value)
    }

    pub fn pack_float(&mut self, value: f32) -> Result<()> {
        self.pack(&value)
    }

    pub fn pack_double(&mut self, value: f64) -> Result<()> {
        self.pack(&value)
    }

    /// Writes exactly `n` bytes of `data`, then pads to a 4-byte boundary.
    ///
    /// Short input is zero-filled up to `n`; longer input is cut at `n`.
    pub fn pack_fixed_opaque(&mut self, n: usize, data: &[u8]) -> Result<()> {
        if u32::try_from(n).is_err() {
            return Err(Error::InvalidLength { len: n });
        }
        let take = data.len().min(n);
        self.buf.write_all(&data[..take])?;
        self.buf.resize(self.buf.len() + (n - take), 0);
        utils::write_padding(n, &mut self.buf)
    }

    /// Writes a length prefix followed by the padded bytes.
    pub fn pack_var_opaque(&mut self, data: &[u8]) -> Result<()> {
        self.pack(data)
    }

    pub fn pack_string(&mut self, value: &str) -> Result<()> {
        self.pack(value)
    }

    /// Same as [`Packer::pack_string`] for bytes not yet known to be UTF-8.
    pub fn pack_string_bytes(&mut self, value: &[u8]) -> Result<()> {
        let value = std::str::from_utf8(value).map_err(|_| Error::EncodingError)?;
        self.pack_string(value)
    }

    /// Counted array: element count, then each element via `pack_item`.
    pub fn pack_array<T>(
        &mut self,
        items: &[T],
        mut pack_item: impl FnMut(&mut Packer, &T) -> Result<()>,
    ) -> Result<()> {
        self.pack(&UsizeAsU32(items.len()))?;
        for item in items {
            pack_item(self, item)?;
        }
        Ok(())
    }

    /// Linked-list encoding: a `1` flag before every element, a `0` flag at the end.
    pub fn pack_list<T>(
        &mut self,
        items: &[T],
        mut pack_item: impl FnMut(&mut Packer, &T) -> Result<()>,
    ) -> Result<()> {
        for item in items {
            self.pack_uint(1)?;
            pack_item(self, item)?;
        }
        self.pack_uint(0)
    }

    /// Appends bytes that are already XDR encoded.
    pub fn append(&mut self, encoded: &[u8]) {
        self.buf.extend_from_slice(encoded);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Read side of an XDR buffer.
#[derive(Debug, Clone)]
pub struct Unpacker<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Unpacker<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not consumed yet.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Consumes and returns everything left in the buffer.
    pub fn take_remaining(&mut self) -> &'a [u8] {
        let rest = self.remaining();
        self.pos = self.data.len();
        rest
    }

    /// Bytes consumed so far.
    pub fn consumed(&self) -> &'a [u8] {
        &self.data[..self.pos]
    }

    pub fn unpack<T: Deserialize + Default>(&mut self) -> Result<T> {
        super::deserialize(self)
    }

    pub fn unpack_uint(&mut self) -> Result<u32> {
        self.unpack()
    }

    pub fn unpack_int(&mut self) -> Result<i32> {
        self.unpack()
    }

    pub fn unpack_uhyper(&mut self) -> Result<u64> {
        self.unpack()
    }

    /// Reads the unsigned wire value and reinterprets it as two's complement.
    pub fn unpack_hyper(&mut self) -> Result<i64> {
        Ok(self.unpack_uhyper()? as i64)
    }

    pub fn unpack_bool(&mut self) -> Result<bool> {
        self.unpack()
    }

    pub fn unpack_float(&mut self) -> Result<f32> {
        self.unpack()
    }

    pub fn unpack_double(&mut self) -> Result<f64> {
        self.unpack()
    }

    pub fn unpack_fixed_opaque(&mut self, n: usize) -> Result<Vec<u8>> {
        let padded = n
            .checked_add(utils::padding_len(n))
            .ok_or(Error::InvalidLength { len: n })?;
        if self.remaining().len() < padded {
            return Err(Error::TruncatedInput);
        }
        let data = self.remaining()[..n].to_vec();
        if self.remaining()[n..padded].iter().any(|b| *b != 0) {
            return Err(utils::corrupt("non-zero padding"));
        }
        self.pos += padded;
        Ok(data)
    }

    pub fn unpack_var_opaque(&mut self) -> Result<Vec<u8>> {
        self.unpack()
    }

    pub fn unpack_string(&mut self) -> Result<String> {
        self.unpack()
    }

    pub fn unpack_array<T>(
        &mut self,
        mut unpack_item: impl FnMut(&mut Unpacker<'a>) -> Result<T>,
    ) -> Result<Vec<T>> {
        let count = self.unpack::<UsizeAsU32>()?.0;
        let mut items = Vec::with_capacity(count.min(self.remaining().len() / utils::ALIGNMENT));
        for _ in 0..count {
            items.push(unpack_item(self)?);
        }
        Ok(items)
    }

    pub fn unpack_list<T>(
        &mut self,
        mut unpack_item: impl FnMut(&mut Unpacker<'a>) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        loop {
            match self.unpack_uint()? {
                0 => return Ok(items),
                1 => items.push(unpack_item(self)?),
                flag => return Err(utils::corrupt(format!("invalid list continuation flag {flag}"))),
            }
        }
    }

    /// Fails if any bytes were left unread.
    pub fn done(&self) -> Result<()> {
        match self.remaining().len() {
            0 => Ok(()),
            remaining => Err(Error::TrailingData { remaining }),
        }
    }
}

impl Read for Unpacker<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let rest = self.remaining();
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }
}
