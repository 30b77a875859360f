//! SPIR-V word stream handling.
//!
//! A module is a 5-word header (magic, version, generator, id bound,
//! schema) followed by instructions. The first word of each instruction
//! packs its length in words into the high 16 bits and its opcode into the
//! low 16 bits.

/// SPIR-V magic number, first word of every module.
pub const MAGIC: u32 = 0x0723_0203;

/// Number of header words.
pub const HEADER_WORDS: usize = 5;

const OP_SOURCE_CONTINUED: u16 = 2;
const OP_SOURCE: u16 = 3;
const OP_SOURCE_EXTENSION: u16 = 4;
const OP_NAME: u16 = 5;
const OP_MEMBER_NAME: u16 = 6;
const OP_STRING: u16 = 7;
const OP_LINE: u16 = 8;
const OP_NO_LINE: u16 = 317;
const OP_MODULE_PROCESSED: u16 = 330;

const DEBUG_OPCODES: [u16; 9] = [
    OP_SOURCE_CONTINUED,
    OP_SOURCE,
    OP_SOURCE_EXTENSION,
    OP_NAME,
    OP_MEMBER_NAME,
    OP_STRING,
    OP_LINE,
    OP_NO_LINE,
    OP_MODULE_PROCESSED,
];

/// A malformed SPIR-V word stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpirvError {
    /// The module is shorter than its header.
    #[error("module of {words} words is shorter than the SPIR-V header")]
    TooShort {
        /// Module length in words.
        words: usize,
    },

    /// The first word is not the SPIR-V magic number.
    #[error("bad SPIR-V magic number {found:#010x}")]
    BadMagic {
        /// The word found instead.
        found: u32,
    },

    /// An instruction declares a length of zero words.
    #[error("instruction at word {offset} has zero length")]
    ZeroLength {
        /// Word offset of the instruction.
        offset: usize,
    },

    /// An instruction runs past the end of the module.
    #[error("instruction at word {offset} (opcode {opcode}) runs past the end of the module")]
    Truncated {
        /// Word offset of the instruction.
        offset: usize,
        /// The instruction's opcode.
        opcode: u16,
    },

    /// A binary's byte length is not a whole number of words.
    #[error("binary of {bytes} bytes is not a whole number of words")]
    Unaligned {
        /// Binary length in bytes.
        bytes: usize,
    },
}

/// Checks the header and returns the module's version word.
pub fn check_header(words: &[u32]) -> Result<u32, SpirvError> {
    if words.len() < HEADER_WORDS {
        return Err(SpirvError::TooShort { words: words.len() });
    }
    if words[0] != MAGIC {
        return Err(SpirvError::BadMagic { found: words[0] });
    }
    Ok(words[1])
}

/// Returns a copy of `words` without source, name and line debug
/// instructions.
///
/// The header is kept as is. Every instruction is length-checked, so a
/// malformed module is rejected rather than partially copied.
pub fn strip_debug_info(words: &[u32]) -> Result<Vec<u32>, SpirvError> {
    check_header(words)?;

    let mut out = Vec::with_capacity(words.len());
    out.extend_from_slice(&words[..HEADER_WORDS]);

    let mut offset = HEADER_WORDS;
    while offset < words.len() {
        let first = words[offset];
        let length = (first >> 16) as usize;
        let opcode = (first & 0xffff) as u16;
        if length == 0 {
            return Err(SpirvError::ZeroLength { offset });
        }
        let end = offset + length;
        if end > words.len() {
            return Err(SpirvError::Truncated { offset, opcode });
        }
        if !DEBUG_OPCODES.contains(&opcode) {
            out.extend_from_slice(&words[offset..end]);
        }
        offset = end;
    }
    Ok(out)
}

/// Decodes a binary as written by the SPIR-V tools.
///
/// Tools write modules in their host byte order; a module whose magic
/// number reads byte-swapped is swapped back.
pub fn words_from_bytes(bytes: &[u8]) -> Result<Vec<u32>, SpirvError> {
    if bytes.len() % 4 != 0 {
        return Err(SpirvError::Unaligned { bytes: bytes.len() });
    }
    let mut words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    if words.first() == Some(&MAGIC.swap_bytes()) {
        for w in &mut words {
            *w = w.swap_bytes();
        }
    }
    Ok(words)
}

/// Encodes words in native byte order.
pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_ne_bytes()).collect()
}
