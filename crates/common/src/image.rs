//! The ELLE program container: decoding and encoding of `.elle` files.
//!
//! Layout, all multi-byte integers big-endian:
//! ```text
//! "ELLE"
//! u8 nameLength (<= 127), name bytes
//! u8 functionCount (<= 127)
//! functionCount x { u8 nameLength, name, i64 id, i64 argCount, i64 codeSize, code }
//! i64 stringCount
//! stringCount x { i64 id, i64 length, bytes }
//! "ELLE"
//! ```
//!
//! A [`ProgramImage`] is the container as read, before verification. Entries
//! keep their file order so that re-encoding reproduces the input exactly.

use std::collections::BTreeSet;

use crate::error::LoadError;

/// Opening and closing magic of every program file.
pub const EYECATCHER: [u8; 4] = *b"ELLE";

/// Longest program or function name.
pub const MAX_NAME_LEN: usize = 127;

/// Largest function table.
pub const MAX_FUNCTIONS: usize = 127;

/// One function entry of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionImage {
    pub name: String,
    /// Index in the dense function table.
    pub id: usize,
    /// Declared argument count.
    pub arg_count: usize,
    /// Raw bytecode, operands big-endian.
    pub code: Vec<u8>,
}

/// One string table entry of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringImage {
    pub id: usize,
    pub bytes: Vec<u8>,
}

/// An undecoded-but-well-formed program container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage {
    pub name: String,
    /// Functions in file order. IDs are dense and unique.
    pub functions: Vec<FunctionImage>,
    /// Strings in file order. IDs are dense and unique.
    pub strings: Vec<StringImage>,
}

impl ProgramImage {
    /// The function entry with the given ID.
    pub fn function(&self, id: usize) -> Option<&FunctionImage> {
        self.functions.iter().find(|f| f.id == id)
    }

    /// Decode a container. Checks framing and table consistency only; code is
    /// not inspected.
    pub fn decode(bytes: &[u8]) -> Result<Self, LoadError> {
        let mut r = Reader { bytes, pos: 0 };

        r.eyecatcher()?;
        let name = r.name()?;

        let function_count = r.u8()?;
        if function_count as usize > MAX_FUNCTIONS {
            return Err(LoadError::TooManyFunctions {
                count: function_count,
            });
        }
        let function_count = function_count as usize;

        let mut functions = Vec::with_capacity(function_count);
        let mut seen = BTreeSet::new();
        for _ in 0..function_count {
            let fn_name = r.name()?;
            let id_at = r.pos;
            let id = r.i64()?;
            if id < 0 || id as u64 >= function_count as u64 {
                return Err(LoadError::FunctionIdOutOfRange {
                    at: id_at,
                    id,
                    count: function_count,
                });
            }
            let id = id as usize;
            if !seen.insert(id) {
                return Err(LoadError::DuplicateFunction { at: id_at, id });
            }
            let arg_count = r.size("argCount")?;
            let code_size = r.size("codeSize")?;
            let code = r.take(code_size)?.to_vec();
            functions.push(FunctionImage {
                name: fn_name,
                id,
                arg_count,
                code,
            });
        }

        let count_at = r.pos;
        let string_count = r.i64()?;
        if string_count < 0 {
            return Err(LoadError::NegativeField {
                at: count_at,
                field: "stringCount",
                value: string_count,
            });
        }
        let mut strings = Vec::new();
        let mut seen = BTreeSet::new();
        for _ in 0..string_count {
            let id_at = r.pos;
            let id = r.i64()?;
            if id < 0 || id >= string_count {
                return Err(LoadError::StringIdOutOfRange {
                    at: id_at,
                    id,
                    count: string_count,
                });
            }
            let id = id as usize;
            if !seen.insert(id) {
                return Err(LoadError::DuplicateString { at: id_at, id });
            }
            let len = r.size("string length")?;
            let bytes = r.take(len)?.to_vec();
            strings.push(StringImage { id, bytes });
        }

        r.eyecatcher()?;
        let rest = bytes.len() - r.pos;
        if rest != 0 {
            return Err(LoadError::TrailingBytes { count: rest });
        }

        Ok(Self {
            name,
            functions,
            strings,
        })
    }

    /// Encode the container. Entries are written in their current order.
    /// Names and the function count must be within `MAX_NAME_LEN` and
    /// `MAX_FUNCTIONS`; [`crate::ProgramBuilder::build`] enforces both.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&EYECATCHER);
        put_name(&mut out, &self.name);
        out.push(self.functions.len() as u8);
        for f in &self.functions {
            put_name(&mut out, &f.name);
            out.extend_from_slice(&(f.id as i64).to_be_bytes());
            out.extend_from_slice(&(f.arg_count as i64).to_be_bytes());
            out.extend_from_slice(&(f.code.len() as i64).to_be_bytes());
            out.extend_from_slice(&f.code);
        }
        out.extend_from_slice(&(self.strings.len() as i64).to_be_bytes());
        for s in &self.strings {
            out.extend_from_slice(&(s.id as i64).to_be_bytes());
            out.extend_from_slice(&(s.bytes.len() as i64).to_be_bytes());
            out.extend_from_slice(&s.bytes);
        }
        out.extend_from_slice(&EYECATCHER);
        out
    }
}

fn put_name(out: &mut Vec<u8>, name: &str) {
    out.push(name.len() as u8);
    out.extend_from_slice(name.as_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], LoadError> {
        let remaining = self.bytes.len() - self.pos;
        if n > remaining {
            return Err(LoadError::Truncated {
                at: self.pos,
                needed: n - remaining,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, LoadError> {
        Ok(self.take(1)?[0])
    }

    fn i64(&mut self) -> Result<i64, LoadError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(i64::from_be_bytes(raw))
    }

    /// A non-negative i64 used as a length or count.
    fn size(&mut self, field: &'static str) -> Result<usize, LoadError> {
        let at = self.pos;
        let value = self.i64()?;
        usize::try_from(value).map_err(|_| LoadError::NegativeField { at, field, value })
    }

    fn name(&mut self) -> Result<String, LoadError> {
        let at = self.pos;
        let len = self.u8()?;
        if len as usize > MAX_NAME_LEN {
            return Err(LoadError::NameTooLong { at, len });
        }
        let raw = self.take(len as usize)?;
        String::from_utf8(raw.to_vec()).map_err(|_| LoadError::InvalidName { at })
    }

    fn eyecatcher(&mut self) -> Result<(), LoadError> {
        let at = self.pos;
        if self.take(EYECATCHER.len())? != EYECATCHER {
            return Err(LoadError::BadEyecatcher { at });
        }
        Ok(())
    }
}
