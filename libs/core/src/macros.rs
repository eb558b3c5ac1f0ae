//! Macros for joining the dispatch hierarchy.

/// Implements [`Typed`](crate::Typed) for a message or error type.
///
/// `typed!(Child: Parent)` declares `Parent` as a direct supertype of `Child`.
/// The child must implement `Into<Parent>` so that a handler registered for the
/// parent can receive it. Several parents may be listed.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug)]
/// struct Animal { name: String }
/// typed!(Animal);
///
/// #[derive(Debug)]
/// struct Dog { name: String }
/// typed!(Dog: Animal);
///
/// impl From<Dog> for Animal {
///     fn from(dog: Dog) -> Self {
///         Animal { name: dog.name }
///     }
/// }
/// ```
#[macro_export]
macro_rules! typed {
    ($ty:ty : $($parent:ty),+ $(,)?) => {
        impl $crate::Typed for $ty {
            fn supertypes() -> ::std::vec::Vec<$crate::Supertype> {
                ::std::vec![$($crate::Supertype::of::<$ty, $parent>()),+]
            }
        }
    };
    ($($ty:ty),+ $(,)?) => {
        $(impl $crate::Typed for $ty {})+
    };
}
