//! Hard limits on verified code.

use crate::error::VerifyError;

/// Number of local slots a single frame may use.
pub const MAX_LOCAL_SLOTS: usize = 65_536;

/// Check a PUSH_LOCAL / POP_LOCAL index. `index` is already known to be
/// non-negative.
pub fn check_local_index(function: &str, at: usize, index: i64) -> Result<usize, VerifyError> {
    match usize::try_from(index) {
        Ok(slot) if slot < MAX_LOCAL_SLOTS => Ok(slot),
        _ => Err(VerifyError::TooManyLocals {
            function: function.to_string(),
            at,
            index,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_slot_passes() {
        assert_eq!(check_local_index("f", 0, 65_535), Ok(65_535));
    }

    #[test]
    fn slot_past_limit() {
        assert!(matches!(
            check_local_index("f", 9, 65_536),
            Err(VerifyError::TooManyLocals { at: 9, index: 65_536, .. })
        ));
    }
}
