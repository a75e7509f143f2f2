// Library root
// -----------
// This crate exposes the uploader as a library; the binary (`main.rs`)
// wires it to the real environment and the terminal.
//
// Module responsibilities:
// - `config`: environment variables, execution mode, forwarded headers.
// - `logging`: the injected `Logger` handle.
// - `api`: the workspace capability (`WorkspaceClient`, `Connector`) and
//   its blocking HTTP implementation.
// - `auth`: credential resolution (`ClientFactory`).
// - `volume`: catalog/schema/volume addressing.
// - `upload` / `listing`: the two workflows built on a resolved handle.
// - `ui`: the interactive menu.
pub mod api;
pub mod auth;
pub mod config;
pub mod listing;
pub mod logging;
pub mod ui;
pub mod upload;
pub mod volume;

#[cfg(test)]
mod test_support;
