//! Integer semantics shared by the interpreter and compiled code.

use elle_common::Opcode;

/// Two-operand arithmetic. Results wrap on overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub fn from_opcode(opcode: Opcode) -> Option<Self> {
        match opcode {
            Opcode::Add => Some(BinaryOp::Add),
            Opcode::Sub => Some(BinaryOp::Sub),
            Opcode::Mul => Some(BinaryOp::Mul),
            Opcode::Div => Some(BinaryOp::Div),
            Opcode::Mod => Some(BinaryOp::Mod),
            _ => None,
        }
    }

    /// `left OP right`, or `None` for a zero divisor.
    pub fn apply(self, left: i64, right: i64) -> Option<i64> {
        match self {
            BinaryOp::Add => Some(left.wrapping_add(right)),
            BinaryOp::Sub => Some(left.wrapping_sub(right)),
            BinaryOp::Mul => Some(left.wrapping_mul(right)),
            BinaryOp::Div => (right != 0).then(|| left.wrapping_div(right)),
            BinaryOp::Mod => (right != 0).then(|| left.wrapping_rem(right)),
        }
    }
}

/// Conditional jump predicate on `(left, right)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Equal,
    Less,
    Greater,
}

impl Condition {
    pub fn from_opcode(opcode: Opcode) -> Option<Self> {
        match opcode {
            Opcode::Jmpe => Some(Condition::Equal),
            Opcode::Jmpl => Some(Condition::Less),
            Opcode::Jmpg => Some(Condition::Greater),
            _ => None,
        }
    }

    pub fn holds(self, left: i64, right: i64) -> bool {
        match self {
            Condition::Equal => left == right,
            Condition::Less => left < right,
            Condition::Greater => left > right,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operand_order_is_left_then_right() {
        assert_eq!(BinaryOp::Sub.apply(10, 3), Some(7));
        assert_eq!(BinaryOp::Div.apply(10, 3), Some(3));
        assert_eq!(BinaryOp::Mod.apply(10, 3), Some(1));
        assert!(Condition::Less.holds(1, 2));
        assert!(!Condition::Greater.holds(1, 2));
    }

    #[test]
    fn zero_divisor() {
        assert_eq!(BinaryOp::Div.apply(1, 0), None);
        assert_eq!(BinaryOp::Mod.apply(1, 0), None);
    }

    #[test]
    fn overflow_wraps() {
        assert_eq!(BinaryOp::Add.apply(i64::MAX, 1), Some(i64::MIN));
        assert_eq!(BinaryOp::Div.apply(i64::MIN, -1), Some(i64::MIN));
        assert_eq!(BinaryOp::Mod.apply(i64::MIN, -1), Some(0));
    }

    #[test]
    fn negative_division_truncates() {
        assert_eq!(BinaryOp::Div.apply(-7, 2), Some(-3));
        assert_eq!(BinaryOp::Mod.apply(-7, 2), Some(-1));
    }
}
