//! Capability descriptors, the ordered registry holding them, and the
//! advertisement written at the start of a v2 conversation.
//!
//! A capability is a name plus an advertise behaviour. Capabilities that can
//! be invoked with `command=<name>` additionally carry a command behaviour.
//! The registry is built once and never mutated; its order is the
//! advertisement order.

use std::collections::HashSet;
use std::fmt;
use std::io::Write;

use crate::context::ServeContext;
use crate::errors::ServeError;
use crate::ls_refs::ls_refs;
use crate::pkt::{write_flush, write_pkt_line};
use crate::request::RequestKeys;

/// Outcome of asking a capability whether it should be advertised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advertisement {
    Hidden,
    Bare,
    Value(String),
}

impl Advertisement {
    pub fn is_advertised(&self) -> bool {
        !matches!(self, Advertisement::Hidden)
    }
}

pub type AdvertiseFn = dyn Fn(&ServeContext<'_>) -> Advertisement + Send + Sync;

/// Runs a command. It owns the response, including the closing flush.
pub type CommandFn = dyn Fn(&ServeContext<'_>, &RequestKeys, &[String], &mut dyn Write) -> Result<(), ServeError>
    + Send
    + Sync;

pub struct Capability {
    name: &'static str,
    advertise: Box<AdvertiseFn>,
    command: Option<Box<CommandFn>>,
}

impl Capability {
    pub fn new(
        name: &'static str,
        advertise: impl Fn(&ServeContext<'_>) -> Advertisement + Send + Sync + 'static,
    ) -> Self {
        Capability { name, advertise: Box::new(advertise), command: None }
    }

    /// A capability that is always advertised without a value.
    pub fn always(name: &'static str) -> Self {
        Capability::new(name, |_| Advertisement::Bare)
    }

    pub fn with_command(
        mut self,
        command: impl Fn(&ServeContext<'_>, &RequestKeys, &[String], &mut dyn Write) -> Result<(), ServeError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.command = Some(Box::new(command));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn advertise(&self, ctx: &ServeContext<'_>) -> Advertisement {
        (self.advertise)(ctx)
    }

    pub fn is_command(&self) -> bool {
        self.command.is_some()
    }

    pub fn execute(
        &self,
        ctx: &ServeContext<'_>,
        keys: &RequestKeys,
        args: &[String],
        out: &mut dyn Write,
    ) -> Result<(), ServeError> {
        match &self.command {
            Some(command) => command(ctx, keys, args, out),
            None => Err(ServeError::InvalidCommand(self.name.to_owned())),
        }
    }

    /// `key` names this capability exactly or as `name=value`.
    pub fn matches(&self, key: &str) -> bool {
        key.strip_prefix(self.name)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('='))
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("command", &self.is_command())
            .finish()
    }
}

#[derive(Debug)]
pub struct CapabilityRegistry {
    capabilities: Vec<Capability>,
}

impl CapabilityRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// `agent`, `stateless-rpc` and `ls-refs`, in that order.
    pub fn standard() -> Self {
        CapabilityRegistry {
            capabilities: vec![
                Capability::new("agent", |ctx| {
                    Advertisement::Value(sanitize_agent(ctx.agent()))
                }),
                Capability::always("stateless-rpc"),
                Capability::always("ls-refs").with_command(ls_refs),
            ],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter()
    }

    /// First capability in declaration order that `key` refers to.
    pub fn get(&self, key: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.matches(key))
    }

    /// `key` refers to a registered capability that is currently advertised.
    pub fn is_valid_capability(&self, ctx: &ServeContext<'_>, key: &str) -> bool {
        self.get(key).is_some_and(|c| c.advertise(ctx).is_advertised())
    }

    /// Writes one line per advertised capability, then a flush.
    pub fn advertise<W: Write + ?Sized>(
        &self,
        ctx: &ServeContext<'_>,
        out: &mut W,
    ) -> Result<(), ServeError> {
        let mut line = String::new();
        for capability in &self.capabilities {
            line.clear();
            match capability.advertise(ctx) {
                Advertisement::Hidden => continue,
                Advertisement::Bare => line.push_str(capability.name),
                Advertisement::Value(value) => {
                    line.push_str(capability.name);
                    if !value.is_empty() {
                        line.push('=');
                        line.push_str(&value);
                    }
                }
            }
            line.push('\n');
            write_pkt_line(out, line.as_bytes())?;
        }
        write_flush(out)
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    capabilities: Vec<Capability>,
}

impl RegistryBuilder {
    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn build(self) -> Result<CapabilityRegistry, ServeError> {
        let mut seen = HashSet::new();
        for capability in &self.capabilities {
            if capability.name.is_empty() || capability.name.contains('=') {
                return Err(ServeError::Registry(format!(
                    "invalid capability name '{}'",
                    capability.name
                )));
            }
            if !seen.insert(capability.name) {
                return Err(ServeError::Registry(format!(
                    "capability '{}' registered twice",
                    capability.name
                )));
            }
        }
        Ok(CapabilityRegistry { capabilities: self.capabilities })
    }
}

/// Replaces bytes that would break a capability line (controls, spaces,
/// non-ASCII) with `.`.
pub fn sanitize_agent(agent: &str) -> String {
    agent
        .bytes()
        .map(|b| if b <= 0x20 || b >= 0x7f { '.' } else { b as char })
        .collect()
}
