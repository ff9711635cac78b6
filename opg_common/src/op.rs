/// Derives binary arithmetic operator traits for single-field tuple structs, e.g.
/// `op!(binary Money, Add, add)` implements `Add for Money`.
#[macro_export]
macro_rules! op {
    (binary $t:ty, $trait:ident, $method:ident) => {
        impl $trait for $t {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self::Output {
                Self(self.0.$method(rhs.0))
            }
        }
    };
}
