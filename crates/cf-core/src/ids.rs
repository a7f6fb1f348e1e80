use core::fmt;
use core::num::NonZeroU32;

/// Declares a compact arena identifier.
///
/// - `u32` keeps memory small
/// - `NonZero` enables `Option<Id>` to be pointer-optimized
/// - one distinct type per arena, so a node id can never index the loop-context table
macro_rules! compact_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Create an id from a 0-based arena slot by storing slot+1.
            pub fn from_index(index: u32) -> Self {
                Self(NonZeroU32::new(index + 1).expect("index+1 is nonzero"))
            }

            /// Recover the 0-based arena slot.
            pub fn index(self) -> u32 {
                self.0.get() - 1
            }

            /// Arena slot as a `usize`, for indexing vectors.
            pub fn slot(self) -> usize {
                self.index() as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.index())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.index())
            }
        }
    };
}

compact_id!(
    /// Identifier of a node slot in a graph arena (filled or reserved).
    NodeId,
    "n"
);

compact_id!(
    /// Identifier of a recorded loop context.
    LoopContextId,
    "ctx"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round_trip_index() {
        for i in [0_u32, 1, 2, 42, 10_000] {
            assert_eq!(NodeId::from_index(i).index(), i);
            assert_eq!(LoopContextId::from_index(i).slot(), i as usize);
        }
    }

    #[test]
    fn option_id_is_small() {
        assert_eq!(
            core::mem::size_of::<NodeId>(),
            core::mem::size_of::<Option<NodeId>>()
        );
    }

    #[test]
    fn display_uses_prefix() {
        assert_eq!(NodeId::from_index(7).to_string(), "n7");
        assert_eq!(LoopContextId::from_index(0).to_string(), "ctx0");
        assert_eq!(format!("{:?}", NodeId::from_index(3)), "NodeId(3)");
    }
}
