//! Main serve loop for protocol version 2.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityRegistry;
use crate::context::ServeContext;
use crate::errors::ServeError;
use crate::pkt::{PacketReader, write_pkt_line};
use crate::request::{Cycle, process_request};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServeOptions {
    /// Send the advertisement and stop without reading a request.
    #[serde(default)]
    pub advertise_capabilities: bool,
    /// Serve exactly one request; the transport has no persistent connection.
    #[serde(default)]
    pub stateless_rpc: bool,
}

/// Drives one connection to completion.
///
/// Any error is fatal for the connection: nothing is written after it and
/// the caller is expected to tear the transport down.
pub fn serve<R: Read, W: Write>(
    ctx: &ServeContext<'_>,
    registry: &CapabilityRegistry,
    options: ServeOptions,
    input: R,
    mut output: W,
) -> Result<(), ServeError> {
    if options.advertise_capabilities || !options.stateless_rpc {
        write_pkt_line(&mut output, b"version 2\n")?;
        registry.advertise(ctx, &mut output)?;
        output.flush()?;

        if options.advertise_capabilities {
            return Ok(());
        }
    }

    let mut reader = PacketReader::new(input);
    if options.stateless_rpc {
        let cycle = process_request(ctx, registry, &mut reader, &mut output)?;
        output.flush()?;
        tracing::debug!(?cycle, "stateless request done");
        return Ok(());
    }

    let mut served = 0usize;
    loop {
        match process_request(ctx, registry, &mut reader, &mut output)? {
            Cycle::Disconnect => break,
            Cycle::Served { .. } => {
                served += 1;
                output.flush()?;
            }
        }
    }
    tracing::debug!(served, "client disconnected");
    Ok(())
}
