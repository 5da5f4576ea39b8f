//! Handles into the per-method tables owned by a `BoundFactory`.
//!
//! All handles are dense `u32` indices. They serialize as bare numbers, so a
//! method read from JSON refers to its labels and locals by position in the
//! method's `labels`/`locals` lists.

use serde::{Deserialize, Serialize};

macro_rules! bound_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

bound_id!(
    /// A jump target. Declared by `BoundStatement::Label`.
    LabelId
);
bound_id!(
    /// A method-local variable.
    LocalId
);
bound_id!(
    /// A field of the synthesized state machine class.
    FieldId
);
bound_id!(
    /// A synthesized method (`MoveNext`, `Dispose`, finally helpers, ...).
    MethodId
);
