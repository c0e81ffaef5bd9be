#![deny(missing_docs)]

//! This crate shares one serial port with any number of TCP clients.
//!
//! The server owns the serial device and a listening socket, and watches both
//! together with every connected client in a single readiness loop.
//!
//! Bytes from a client are written to the serial port verbatim, and that client becomes
//! the *focused* client.
//! Bytes from the serial port go to the focused client only, or to every client
//! when broadcast mode is enabled.
//!
//! There is no framing of any kind on the wire, so the server cannot know which client
//! a reply belongs to. It assumes the most recent writer is waiting for it.
//!
//! Next to the server, two small collaborators are provided:
//! a [`logger`] which timestamps every line the server emits and writes it to a file,
//! and a [`client`] which can write commands and read until a prompt shows up.

/// The command line interface.
pub mod cli;

/// Relates to config files.
pub mod config;

/// Possible errors in this library.
pub mod error;

/// Logging/tracing setup.
pub mod logging;

/// Events the server emits.
pub mod events;

/// Things the server watches: the listener, the serial device, and connections.
pub mod endpoint;

/// Waiting for readiness on many endpoints at once.
pub mod multiplexer;

/// Serial port driver.
pub mod serial;

/// A connected client as seen by the server.
pub mod peer;

/// Bookkeeping of connected clients.
pub mod registry;

/// Decides where bytes go.
pub mod routing;

/// The server loop and its lifecycle.
pub mod server;

/// A client for talking to the server.
pub mod client;

/// Timestamps lines coming from the server and stores them.
pub mod logger;
