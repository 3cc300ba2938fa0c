#![deny(clippy::all)]
#![deny(warnings)]

//! The append-only command/response registry.
//!
//! Klipper does not use fixed wire ids: the host and MCU agree on a mapping
//! from `"name format"` strings to small integer ids during the `identify`
//! handshake, and the id is simply the registration's insertion index. A
//! registry entry with `handler = None` is a *response* descriptor (MCU to
//! host); one with `Some(handler)` is a *command* the host can invoke.
//!
//! Dispatch uses a function pointer plus an explicit `'static`-shaped
//! context parameter rather than a boxed closure, so the whole registry is
//! usable without an allocator.

use crate::cursor::BytesCursor;
use crate::Error;

/// One registered command or response.
#[derive(Clone, Copy)]
pub struct Entry<C> {
    name: &'static str,
    format: &'static str,
    handler: Option<fn(&mut C, &mut BytesCursor) -> Result<(), Error>>,
}

impl<C> Entry<C> {
    /// The bare command/response name, e.g. `"get_clock"`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The format string, e.g. `"oid=%c clock=%u"` (empty if argument-less).
    pub fn format(&self) -> &'static str {
        self.format
    }

    /// `true` if this entry is dispatchable (a command, not a response).
    pub fn is_command(&self) -> bool {
        self.handler.is_some()
    }

    /// The raw handler function pointer, if this entry is a command. Lets a
    /// caller that already holds `&mut C` (and so cannot also hold `&self`
    /// on the registry for the duration of the call) copy the pointer out
    /// first and invoke it separately from [`CommandRegistry::dispatch`].
    pub fn handler(&self) -> Option<fn(&mut C, &mut BytesCursor) -> Result<(), Error>> {
        self.handler
    }
}

/// Append-only registry of commands and responses, keyed by `u16` insertion
/// index. `N` bounds the maximum number of distinct entries.
pub struct CommandRegistry<C, const N: usize> {
    entries: heapless::Vec<Entry<C>, N>,
    frozen: bool,
}

impl<C, const N: usize> Default for CommandRegistry<C, N> {
    fn default() -> Self {
        Self {
            entries: heapless::Vec::new(),
            frozen: false,
        }
    }
}

impl<C, const N: usize> CommandRegistry<C, N> {
    /// Creates an empty, writable registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a response descriptor (no handler). Idempotent by name:
    /// re-registering an existing name returns its original id.
    pub fn register_response(&mut self, name: &'static str, format: &'static str) -> Result<u16, Error> {
        self.register_inner(name, format, None)
    }

    /// Registers a command and its handler. Idempotent by name.
    pub fn register_command(
        &mut self,
        name: &'static str,
        format: &'static str,
        handler: fn(&mut C, &mut BytesCursor) -> Result<(), Error>,
    ) -> Result<u16, Error> {
        self.register_inner(name, format, Some(handler))
    }

    fn register_inner(
        &mut self,
        name: &'static str,
        format: &'static str,
        handler: Option<fn(&mut C, &mut BytesCursor) -> Result<(), Error>>,
    ) -> Result<u16, Error> {
        if let Some(id) = self.id_for_name(name) {
            return Ok(id);
        }
        if self.frozen {
            return Err(Error::HandlerRejected);
        }
        let id = self.entries.len() as u16;
        self.entries
            .push(Entry { name, format, handler })
            .map_err(|_| Error::BufferTooSmall)?;
        Ok(id)
    }

    /// Forbids further registration. Called once bootstrap/init completes,
    /// per the "init phase then ready phase" discipline.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// `true` once [`CommandRegistry::freeze`] has been called.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Looks up an id by name, if registered.
    pub fn id_for_name(&self, name: &str) -> Option<u16> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .map(|i| i as u16)
    }

    /// Looks up an entry by id.
    pub fn entry(&self, id: u16) -> Option<&Entry<C>> {
        self.entries.get(id as usize)
    }

    /// Iterates all entries in registration order, paired with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Entry<C>)> {
        self.entries.iter().enumerate().map(|(i, e)| (i as u16, e))
    }

    /// Invokes the handler registered for `id` against `ctx` and `cursor`.
    ///
    /// Returns [`Error::UnknownCommand`] for an id never assigned, or one
    /// whose entry is a response descriptor (no handler).
    pub fn dispatch(&self, id: u16, ctx: &mut C, cursor: &mut BytesCursor) -> Result<(), Error> {
        let entry = self.entry(id).ok_or(Error::UnknownCommand)?;
        let handler = entry.handler.ok_or(Error::UnknownCommand)?;
        handler(ctx, cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_ctx: &mut u32, _cursor: &mut BytesCursor) -> Result<(), Error> {
        Ok(())
    }

    #[test]
    fn bootstrap_order_is_preserved() {
        let mut reg: CommandRegistry<u32, 8> = CommandRegistry::new();
        let identify_response = reg.register_response("identify_response", "offset=%u data=%*s").unwrap();
        let identify = reg.register_command("identify", "offset=%u count=%c", noop).unwrap();
        assert_eq!(identify_response, 0);
        assert_eq!(identify, 1);
    }

    #[test]
    fn registration_is_idempotent_by_name() {
        let mut reg: CommandRegistry<u32, 8> = CommandRegistry::new();
        let a = reg.register_command("get_clock", "", noop).unwrap();
        let b = reg.register_command("get_clock", "", noop).unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.iter().count(), 1);
    }

    #[test]
    fn dispatch_invokes_registered_handler() {
        fn bump(ctx: &mut u32, _cursor: &mut BytesCursor) -> Result<(), Error> {
            *ctx += 1;
            Ok(())
        }
        let mut reg: CommandRegistry<u32, 8> = CommandRegistry::new();
        let id = reg.register_command("emergency_stop", "", bump).unwrap();
        let mut ctx = 0u32;
        let mut cursor = BytesCursor::new(&[]);
        reg.dispatch(id, &mut ctx, &mut cursor).unwrap();
        assert_eq!(ctx, 1);
    }

    #[test]
    fn dispatch_unknown_id_errors() {
        let reg: CommandRegistry<u32, 8> = CommandRegistry::new();
        let mut ctx = 0u32;
        let mut cursor = BytesCursor::new(&[]);
        assert_eq!(reg.dispatch(42, &mut ctx, &mut cursor), Err(Error::UnknownCommand));
    }

    #[test]
    fn dispatch_on_response_entry_errors() {
        let mut reg: CommandRegistry<u32, 8> = CommandRegistry::new();
        let id = reg.register_response("clock", "clock=%u").unwrap();
        let mut ctx = 0u32;
        let mut cursor = BytesCursor::new(&[]);
        assert_eq!(reg.dispatch(id, &mut ctx, &mut cursor), Err(Error::UnknownCommand));
    }

    #[test]
    fn frozen_registry_rejects_new_names() {
        let mut reg: CommandRegistry<u32, 8> = CommandRegistry::new();
        reg.register_command("get_clock", "", noop).unwrap();
        reg.freeze();
        assert_eq!(reg.register_command("get_uptime", "", noop), Err(Error::HandlerRejected));
        // re-registering an already-known name still succeeds even when frozen.
        assert_eq!(reg.register_command("get_clock", "", noop).unwrap(), 0);
    }
}
