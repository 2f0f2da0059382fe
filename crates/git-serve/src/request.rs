//! One request/response cycle: collect capability keys until the delimiter,
//! collect command arguments until the flush, then dispatch.

use std::io::{Read, Write};
use std::time::Instant;

use metrics::{counter, histogram};

use crate::capability::{Capability, CapabilityRegistry};
use crate::context::ServeContext;
use crate::errors::ServeError;
use crate::pkt::{Packet, PacketReader};

/// Keys accepted from the capability section of a request, in arrival order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RequestKeys(Vec<String>);

impl RequestKeys {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Value the client sent for `capability`: the text after `=`, or an
    /// empty string for a bare key.
    pub fn find(&self, capability: &str) -> Option<&str> {
        self.0.iter().find_map(|key| {
            let rest = key.strip_prefix(capability)?;
            match rest.strip_prefix('=') {
                Some(value) => Some(value),
                None if rest.is_empty() => Some(rest),
                None => None,
            }
        })
    }

    pub fn contains(&self, capability: &str) -> bool {
        self.find(capability).is_some()
    }
}

impl From<Vec<String>> for RequestKeys {
    fn from(keys: Vec<String>) -> Self {
        RequestKeys(keys)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    /// The client sent an empty request and wants to hang up.
    Disconnect,
    Served { command: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Keys,
    Args,
}

struct Request<'r> {
    keys: RequestKeys,
    args: Vec<String>,
    command: Option<&'r Capability>,
}

impl<'r> Request<'r> {
    fn accept_key(
        &mut self,
        ctx: &ServeContext<'_>,
        registry: &'r CapabilityRegistry,
        key: String,
    ) -> Result<(), ServeError> {
        if let Some(name) = key.strip_prefix("command=") {
            let command = registry
                .get(name)
                .filter(|c| c.is_command() && c.advertise(ctx).is_advertised())
                .ok_or_else(|| ServeError::InvalidCommand(name.to_owned()))?;
            if self.command.is_some() {
                return Err(ServeError::CommandAlreadyRequested);
            }
            self.command = Some(command);
            self.keys.0.push(key);
        } else if registry.is_valid_capability(ctx, &key) {
            self.keys.0.push(key);
        } else {
            tracing::trace!(%key, "ignoring unrecognized capability");
        }
        Ok(())
    }
}

fn read_request<'r, R: Read>(
    ctx: &ServeContext<'_>,
    registry: &'r CapabilityRegistry,
    reader: &mut PacketReader<R>,
) -> Result<Request<'r>, ServeError> {
    let mut request = Request { keys: RequestKeys::default(), args: Vec::new(), command: None };
    let mut section = Section::Keys;
    loop {
        match (section, reader.read()?) {
            (_, Packet::Eof) => return Err(ServeError::UnexpectedEof),
            (_, Packet::Flush) => return Ok(request),
            (Section::Keys, Packet::Delimiter) => section = Section::Args,
            (Section::Args, Packet::Delimiter) => {
                return Err(ServeError::Protocol("unexpected delimiter in command arguments".into()));
            }
            (Section::Keys, Packet::Line(key)) => request.accept_key(ctx, registry, key)?,
            (Section::Args, Packet::Line(arg)) => request.args.push(arg),
        }
    }
}

/// Reads one request and runs the command it names.
pub fn process_request<R: Read>(
    ctx: &ServeContext<'_>,
    registry: &CapabilityRegistry,
    reader: &mut PacketReader<R>,
    out: &mut dyn Write,
) -> Result<Cycle, ServeError> {
    let request = read_request(ctx, registry, reader)?;

    if request.keys.is_empty() && request.args.is_empty() {
        return Ok(Cycle::Disconnect);
    }

    let command = request.command.ok_or(ServeError::NoCommand)?;
    let name = command.name();
    tracing::debug!(command = name, keys = request.keys.len(), args = request.args.len(), "dispatching command");

    let start = Instant::now();
    command.execute(ctx, &request.keys, &request.args, out)?;
    counter!("git_serve.commands", "command" => name).increment(1);
    histogram!("git_serve.command_ms", "command" => name).record(start.elapsed().as_millis() as f64);

    Ok(Cycle::Served { command: name })
}
