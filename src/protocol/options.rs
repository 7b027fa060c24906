use bitflags::bitflags;

bitflags! {
    /// Options for batched `misc` calls.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MiscOptions: u32 {
        /// Skip the server's update (write-ahead) log.
        const NO_UPDATE_LOG = 1;
    }
}

bitflags! {
    /// Locking options for `ext` calls.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ExtOptions: u32 {
        const LOCK_RECORD = 1;
        const LOCK_GLOBAL = 2;
    }
}

bitflags! {
    /// Bits OR-ed into a condition's operator code.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct ConditionFlags: u32 {
        const NEGATE = 1 << 24;
        const NO_INDEX = 1 << 25;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_flags_combine() {
        let opts = ExtOptions::LOCK_RECORD | ExtOptions::LOCK_GLOBAL;
        assert_eq!(opts.bits(), 3);
        assert_eq!(ExtOptions::default().bits(), 0);
    }

    #[test]
    fn condition_flags_stay_clear_of_operator_codes() {
        let flags = ConditionFlags::NEGATE | ConditionFlags::NO_INDEX;
        assert_eq!(flags.bits() & 0xff, 0);
        assert_eq!(flags.bits() | 13, (1 << 24) | (1 << 25) | 13);
    }
}
