//! Instruction decoder.
//!
//! Walks a method's code bytes front to back and cuts them into [`Tuple`]s.
//! Fixed-length instructions take their operand count from the
//! [`OperandTable`]; the dynamic ones (`tableswitch`, `lookupswitch` and the
//! `wide` prefix) are measured from their payload. An opcode with no table
//! entry is fatal for the method.

use super::opcodes::{OperandLength, OperandTable, IINC, LOOKUPSWITCH, TABLESWITCH, WIDE};
use super::Tuple;
use crate::core::error::{CompileError, CompileResult};

/// Decodes flat bytecode into instruction tuples.
pub struct Decoder<'t, T: OperandTable> {
    table: &'t T,
}

impl<'t, T: OperandTable> Decoder<'t, T> {
    pub fn new(table: &'t T) -> Self {
        Self { table }
    }

    /// Decode a whole method body.
    pub fn decode(&self, code: &[u8]) -> CompileResult<Vec<Tuple>> {
        let mut tuples = Vec::new();
        let mut pc = 0usize;

        while pc < code.len() {
            let address = pc as u32;
            let opcode = code[pc];
            let len = match self.table.operand_length(opcode) {
                Some(OperandLength::Fixed(n)) => n as usize,
                Some(OperandLength::Dynamic) => Self::dynamic_length(code, pc)?,
                None => return Err(CompileError::UnknownOpcode { opcode, address }),
            };

            let end = pc + 1 + len;
            if end > code.len() {
                return Err(CompileError::TruncatedInstruction { opcode, address });
            }

            let tuple = Tuple::new(address, opcode, code[pc + 1..end].to_vec());
            log::trace!("decoded {}", tuple);
            tuples.push(tuple);
            pc = end;
        }

        log::debug!("Decoded {} instructions from {} bytes", tuples.len(), code.len());
        Ok(tuples)
    }

    /// Operand byte count of a variable-length instruction at `pc`.
    fn dynamic_length(code: &[u8], pc: usize) -> CompileResult<usize> {
        let opcode = code[pc];
        let address = pc as u32;
        let truncated = CompileError::TruncatedInstruction { opcode, address };

        match opcode {
            TABLESWITCH => {
                let pad = Tuple::switch_padding(address);
                let base = pc + 1 + pad;
                let low = read_i32(code, base + 4).ok_or(truncated.clone())?;
                let high = read_i32(code, base + 8).ok_or(truncated.clone())?;
                if high < low {
                    return Err(truncated);
                }
                let entries = (high as i64 - low as i64 + 1) as usize;
                Ok(pad + 12 + entries * 4)
            }
            LOOKUPSWITCH => {
                let pad = Tuple::switch_padding(address);
                let base = pc + 1 + pad;
                let pairs = read_i32(code, base + 4).ok_or(truncated.clone())?;
                if pairs < 0 {
                    return Err(truncated);
                }
                Ok(pad + 8 + pairs as usize * 8)
            }
            WIDE => match code.get(pc + 1) {
                Some(&IINC) => Ok(5),
                Some(_) => Ok(3),
                None => Err(truncated),
            },
            _ => Err(CompileError::UnknownOpcode { opcode, address }),
        }
    }
}

fn read_i32(code: &[u8], at: usize) -> Option<i32> {
    let bytes = code.get(at..at + 4)?;
    Some(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::opcodes::*;

    fn decode(code: &[u8]) -> CompileResult<Vec<Tuple>> {
        Decoder::new(&StandardOperandTable).decode(code)
    }

    #[test]
    fn test_fixed_length_decoding() {
        let code = [ICONST_1, BIPUSH, 7, IADD, SIPUSH, 0x01, 0x00, IRETURN];
        let tuples = decode(&code).unwrap();

        let addresses: Vec<u32> = tuples.iter().map(|t| t.address).collect();
        assert_eq!(addresses, vec![0, 1, 3, 4, 7]);
        assert_eq!(tuples[1].operands, vec![7]);
        assert_eq!(tuples[3].i16_operand(0), 256);
        assert!(tuples.iter().all(|t| !t.is_leader));
    }

    #[test]
    fn test_unknown_opcode_is_fatal() {
        let err = decode(&[ICONST_0, 0xcb]).unwrap_err();
        assert_eq!(err, CompileError::UnknownOpcode { opcode: 0xcb, address: 1 });
    }

    #[test]
    fn test_truncated_operands() {
        let err = decode(&[SIPUSH, 0x01]).unwrap_err();
        assert_eq!(err, CompileError::TruncatedInstruction { opcode: SIPUSH, address: 0 });
    }

    #[test]
    fn test_lookupswitch_length() {
        // iload_0 at 0, lookupswitch at 1 (2 padding bytes), one pair
        let mut code = vec![ILOAD_0, LOOKUPSWITCH, 0, 0];
        for word in [19i32, 1, 5, 21] {
            code.extend_from_slice(&word.to_be_bytes());
        }
        code.extend_from_slice(&[ICONST_0, IRETURN, ICONST_1, IRETURN]);

        let tuples = decode(&code).unwrap();
        assert_eq!(tuples.len(), 6);
        assert_eq!(tuples[1].operands.len(), 2 + 16);
        assert_eq!(tuples[2].address, 20);
        assert_eq!(tuples[1].jump_targets(), vec![20, 22]);
    }

    #[test]
    fn test_wide_lengths() {
        let code = [WIDE, ILOAD, 0x01, 0x00, WIDE, IINC, 0x00, 0x05, 0x00, 0x01, RETURN];
        let tuples = decode(&code).unwrap();
        assert_eq!(tuples.len(), 3);
        assert_eq!(tuples[0].operands.len(), 3);
        assert_eq!(tuples[1].operands.len(), 5);
        assert_eq!(tuples[2].address, 10);
    }
}
