#[cfg(test)]
mod tests {
    use crate::virtual_machine::isa::{OPCODE_COUNT, Opcode, OperandKind};
    use std::collections::HashSet;

    struct Entry {
        name: &'static str,
        tag: u8,
        mnemonic: &'static str,
        operands: &'static [&'static str],
    }

    macro_rules! collect_isa {
        (
            $( $(#[$doc:meta])* $name:ident = $opcode:literal, $mnemonic:literal => [ $( $field:ident : $kind:ident ),* $(,)? ] ),* $(,)?
        ) => {
            vec![ $( Entry {
                name: stringify!($name),
                tag: $opcode,
                mnemonic: $mnemonic,
                operands: &[ $( stringify!($kind) ),* ],
            }, )* ]
        };
    }

    fn table() -> Vec<Entry> {
        crate::for_each_instruction!(collect_isa)
    }

    #[test]
    fn tags_are_dense_from_zero() {
        let table = table();
        for (index, entry) in table.iter().enumerate() {
            assert_eq!(entry.tag as usize, index, "{} is out of order", entry.name);
        }
        assert_eq!(table.len(), OPCODE_COUNT as usize);
    }

    #[test]
    fn mnemonics_are_unique_lowercase_words() {
        let mut seen = HashSet::new();
        for entry in table() {
            assert!(seen.insert(entry.mnemonic), "duplicate mnemonic {}", entry.mnemonic);
            assert!(
                entry.mnemonic.chars().all(|c| c.is_ascii_lowercase()),
                "{} is not a lowercase word",
                entry.mnemonic
            );
        }
    }

    #[test]
    fn at_most_one_operand() {
        for entry in table() {
            assert!(entry.operands.len() <= 1, "{} takes too many operands", entry.name);
        }
    }

    #[test]
    fn table_matches_generated_code() {
        for entry in table() {
            let opcode = Opcode::try_from(entry.tag).unwrap();
            assert_eq!(opcode.mnemonic(), entry.mnemonic);
            assert_eq!(Opcode::from_mnemonic(entry.mnemonic), Some(opcode));
            let kind = match entry.operands {
                [] => None,
                ["Imm"] => Some(OperandKind::Imm),
                ["Int"] => Some(OperandKind::Int),
                ["Addr"] => Some(OperandKind::Addr),
                other => panic!("unexpected operand list {other:?}"),
            };
            assert_eq!(opcode.operand(), kind);
        }
    }
}
