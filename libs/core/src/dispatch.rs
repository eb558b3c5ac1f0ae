//! Per-type handler tables and message routing.

use tracing::trace;

use crate::context::Context;
use crate::failure::Failure;
use crate::message::BoxedMessage;
use crate::specificity::order_most_specific_first;
use crate::typing::{apply_upcasts, AnyBox, TypeKey};

/// Erased handler: receives the message already upcast to the declared type.
pub(crate) type HandlerFn<A> =
    Box<dyn Fn(&mut A, AnyBox, &mut Context<'_, A>) -> Result<(), Failure> + Send + Sync>;

pub(crate) struct HandlerEntry<A> {
    pub(crate) key: TypeKey,
    pub(crate) name: String,
    pub(crate) invoke: HandlerFn<A>,
}

/// Outcome of routing one message.
#[derive(Debug)]
pub enum Dispatch {
    /// The handler declared for this type ran.
    Handled(TypeKey),
    /// No declared type matched; the message is handed back.
    Unhandled(BoxedMessage),
}

/// Handlers of one actor type, most specific first. Immutable once built.
pub struct HandlerTable<A> {
    entries: Vec<HandlerEntry<A>>,
}

impl<A> HandlerTable<A> {
    /// Orders declared entries. Duplicates must already be rejected.
    pub(crate) fn from_declared(entries: Vec<HandlerEntry<A>>) -> Self {
        Self {
            entries: order_most_specific_first(entries, |e| e.key),
        }
    }

    /// Declared message types in dispatch order.
    pub fn keys(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.entries.iter().map(|e| e.key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if some handler accepts messages of type `key`.
    pub fn handles(&self, key: &TypeKey) -> bool {
        self.entries.iter().any(|e| key.is_subtype_of(&e.key))
    }

    /// The declared type that would receive a message of type `key`.
    pub fn resolve(&self, key: &TypeKey) -> Option<TypeKey> {
        self.entries
            .iter()
            .find(|e| key.is_subtype_of(&e.key))
            .map(|e| e.key)
    }

    /// Invokes the first handler whose type is a supertype-or-equal of the
    /// message's concrete type.
    pub fn dispatch(
        &self,
        actor: &mut A,
        message: BoxedMessage,
        ctx: &mut Context<'_, A>,
    ) -> Result<Dispatch, Failure> {
        let runtime_type = message.type_key();
        let route = self
            .entries
            .iter()
            .find_map(|e| runtime_type.upcast_path(&e.key).map(|path| (e, path)));

        let Some((entry, path)) = route else {
            return Ok(Dispatch::Unhandled(message));
        };

        trace!(message = %runtime_type, handler = %entry.name, "Dispatching");

        let body = apply_upcasts(&path, message.into_any()).map_err(|_| {
            Failure::severe(format!(
                "cannot convert {runtime_type} into {} for handler '{}'",
                entry.key, entry.name
            ))
        })?;
        (entry.invoke)(actor, body, ctx)?;
        Ok(Dispatch::Handled(entry.key))
    }
}

impl<A> std::fmt::Debug for HandlerTable<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (&e.name, e.key)))
            .finish()
    }
}
