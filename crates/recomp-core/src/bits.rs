//! Bit layout for the group `info` word.
//!
//! Normative layout (see design notes): bit30 isNode, bit29 hasObjectKey,
//! bit28 hasAux, bit27 mark, bit26 containsMark, bits 0-25 nodeCount. This
//! layout must be preserved bit-for-bit; anything reading/writing `info`
//! should go through these helpers rather than poking bits ad hoc.

pub const BIT_IS_NODE: u32 = 1 << 30;
pub const BIT_HAS_OBJECT_KEY: u32 = 1 << 29;
pub const BIT_HAS_AUX: u32 = 1 << 28;
pub const BIT_MARK: u32 = 1 << 27;
pub const BIT_CONTAINS_MARK: u32 = 1 << 26;
pub const NODE_COUNT_MASK: u32 = (1 << 26) - 1;
pub const NODE_COUNT_MAX: u32 = NODE_COUNT_MASK;

#[inline]
pub fn is_node(info: u32) -> bool {
    info & BIT_IS_NODE != 0
}

#[inline]
pub fn has_object_key(info: u32) -> bool {
    info & BIT_HAS_OBJECT_KEY != 0
}

#[inline]
pub fn has_aux(info: u32) -> bool {
    info & BIT_HAS_AUX != 0
}

#[inline]
pub fn mark(info: u32) -> bool {
    info & BIT_MARK != 0
}

#[inline]
pub fn contains_mark(info: u32) -> bool {
    info & BIT_CONTAINS_MARK != 0
}

#[inline]
pub fn node_count(info: u32) -> u32 {
    info & NODE_COUNT_MASK
}

#[inline]
pub fn set_node_count(info: u32, count: u32) -> u32 {
    debug_assert!(count <= NODE_COUNT_MAX, "node count overflowed 26 bits");
    (info & !NODE_COUNT_MASK) | (count & NODE_COUNT_MASK)
}

#[inline]
pub fn set_is_node(info: u32, value: bool) -> u32 {
    set_flag(info, BIT_IS_NODE, value)
}

#[inline]
pub fn set_has_object_key(info: u32, value: bool) -> u32 {
    set_flag(info, BIT_HAS_OBJECT_KEY, value)
}

#[inline]
pub fn set_has_aux(info: u32, value: bool) -> u32 {
    set_flag(info, BIT_HAS_AUX, value)
}

#[inline]
pub fn set_mark(info: u32, value: bool) -> u32 {
    set_flag(info, BIT_MARK, value)
}

#[inline]
pub fn set_contains_mark(info: u32, value: bool) -> u32 {
    set_flag(info, BIT_CONTAINS_MARK, value)
}

#[inline]
fn set_flag(info: u32, bit: u32, value: bool) -> u32 {
    if value {
        info | bit
    } else {
        info & !bit
    }
}

/// Number of reserved slot cells a group owns given its flags (popcount of
/// the three "has a reserved cell" bits: isNode, hasObjectKey, hasAux).
#[inline]
pub fn reserved_slot_count(info: u32) -> usize {
    (is_node(info) as usize) + (has_object_key(info) as usize) + (has_aux(info) as usize)
}

/// Offset of the `hasAux` reserved cell within a group's reserved-slot run,
/// i.e. past the node slot (if any) and the object-key slot (if any).
#[inline]
pub fn aux_slot_offset(info: u32) -> usize {
    (is_node(info) as usize) + (has_object_key(info) as usize)
}

pub fn pack(
    is_node: bool,
    has_object_key: bool,
    has_aux: bool,
    mark: bool,
    contains_mark: bool,
    node_count: u32,
) -> u32 {
    let mut info = 0u32;
    info = set_flag(info, BIT_IS_NODE, is_node);
    info = set_flag(info, BIT_HAS_OBJECT_KEY, has_object_key);
    info = set_flag(info, BIT_HAS_AUX, has_aux);
    info = set_flag(info, BIT_MARK, mark);
    info = set_flag(info, BIT_CONTAINS_MARK, contains_mark);
    set_node_count(info, node_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_flag_independently() {
        let info = pack(true, false, true, false, true, 12345);
        assert!(is_node(info));
        assert!(!has_object_key(info));
        assert!(has_aux(info));
        assert!(!mark(info));
        assert!(contains_mark(info));
        assert_eq!(node_count(info), 12345);
    }

    #[test]
    fn set_node_count_never_disturbs_flags() {
        let info = pack(true, true, true, true, true, 0);
        let info = set_node_count(info, 42);
        assert!(is_node(info));
        assert!(has_object_key(info));
        assert!(has_aux(info));
        assert!(mark(info));
        assert!(contains_mark(info));
        assert_eq!(node_count(info), 42);
    }

    #[test]
    fn reserved_slot_count_is_popcount_of_flag_bits() {
        assert_eq!(reserved_slot_count(pack(false, false, false, false, false, 0)), 0);
        assert_eq!(reserved_slot_count(pack(true, false, false, false, false, 0)), 1);
        assert_eq!(reserved_slot_count(pack(true, true, true, false, false, 0)), 3);
    }
}
