//! Explicit type hierarchy for messages and errors.
//!
//! Rust has no subtyping between concrete types, so the hierarchy used by
//! dispatch and exception matching is declared: a type implements [`Typed`] and
//! lists its direct supertypes. A supertype link carries an upcast function so a
//! handler declared for the parent can receive the child value.

use std::any::{type_name, Any, TypeId};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Type-erased owned value.
pub type AnyBox = Box<dyn Any + Send>;

/// Converts a boxed child value into a boxed parent value.
///
/// Returns the input unchanged when it is not the expected child type.
pub(crate) type Upcast = fn(AnyBox) -> Result<AnyBox, AnyBox>;

/// A type that participates in the dispatch hierarchy.
///
/// Usually implemented with [`typed!`](crate::typed).
pub trait Typed: Any + Send + fmt::Debug {
    /// Direct supertypes of this type.
    fn supertypes() -> Vec<Supertype> {
        Vec::new()
    }
}

/// A direct supertype link from a child type to a parent type.
#[derive(Clone, Copy)]
pub struct Supertype {
    key: TypeKey,
    upcast: Upcast,
}

impl Supertype {
    /// Declares `P` as a direct supertype of `C`.
    pub fn of<C, P>() -> Self
    where
        C: Typed + Into<P>,
        P: Typed,
    {
        Self {
            key: TypeKey::of::<P>(),
            upcast: upcast_into::<C, P>,
        }
    }

    /// The parent type.
    pub fn key(&self) -> TypeKey {
        self.key
    }
}

impl fmt::Debug for Supertype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Supertype").field(&self.key).finish()
    }
}

fn upcast_into<C, P>(value: AnyBox) -> Result<AnyBox, AnyBox>
where
    C: Typed + Into<P>,
    P: Typed,
{
    let child = value.downcast::<C>()?;
    Ok(Box::new((*child).into()))
}

/// Root of every hierarchy. Only reachable through catch-all registrations.
#[derive(Debug)]
pub(crate) struct CatchAll;

impl Typed for CatchAll {}

/// Stable identifier of a [`Typed`] type.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
    supertypes: fn() -> Vec<Supertype>,
}

impl TypeKey {
    /// Key for `T`.
    pub fn of<T: Typed>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            supertypes: T::supertypes,
        }
    }

    /// The catch-all key every type is a subtype of.
    pub(crate) fn catch_all() -> Self {
        Self::of::<CatchAll>()
    }

    /// Fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Underlying `TypeId`.
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Direct supertypes as declared by the type.
    pub fn direct_supertypes(&self) -> Vec<Supertype> {
        (self.supertypes)()
    }

    /// Returns true when `self` is `other` or transitively declares it as a supertype.
    pub fn is_subtype_of(&self, other: &TypeKey) -> bool {
        self.upcast_path(other).is_some()
    }

    /// Shortest chain of upcasts from `self` to `target`.
    pub(crate) fn upcast_path(&self, target: &TypeKey) -> Option<Vec<Upcast>> {
        if self == target || *target == Self::catch_all() {
            return Some(Vec::new());
        }

        let mut seen = HashSet::from([self.id]);
        let mut queue = VecDeque::from([(*self, Vec::new())]);

        while let Some((key, path)) = queue.pop_front() {
            for parent in key.direct_supertypes() {
                let mut next: Vec<Upcast> = path.clone();
                next.push(parent.upcast);
                if parent.key == *target {
                    return Some(next);
                }
                if seen.insert(parent.key.id) {
                    queue.push_back((parent.key, next));
                }
            }
        }

        None
    }
}

/// Applies an upcast chain produced by [`TypeKey::upcast_path`].
pub(crate) fn apply_upcasts(path: &[Upcast], value: AnyBox) -> Result<AnyBox, AnyBox> {
    path.iter().try_fold(value, |value, upcast| upcast(value))
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Object-safe view of a [`Typed`] value travelling through a mailbox.
pub trait ErasedMessage: Send + fmt::Debug {
    /// Concrete type of the value.
    fn type_key(&self) -> TypeKey;

    /// Converts into an owned `Any` for downcasting and upcasting.
    fn into_any(self: Box<Self>) -> AnyBox;

    /// Borrowed `Any` view.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Typed> ErasedMessage for T {
    fn type_key(&self) -> TypeKey {
        TypeKey::of::<T>()
    }

    fn into_any(self: Box<Self>) -> AnyBox {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn ErasedMessage {
    /// Returns true if the concrete type is `T`.
    pub fn is<T: Typed>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Borrows the value as `T` if that is its concrete type.
    pub fn downcast_ref<T: Typed>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Takes the value as `T` if that is its concrete type.
    pub fn downcast<T: Typed>(self: Box<Self>) -> Result<T, AnyBox> {
        self.into_any().downcast::<T>().map(|value| *value)
    }
}
