//! MCP tool surface
//!
//! `RelayServer` exposes the ~70 browser operations over rmcp. Each group
//! lives in its own module contributing a router block; handlers stay thin:
//! they parse arguments, call into the relay core, and return a payload
//! object for the middleware to envelope.

mod ax;
mod capture;
mod dialogs;
mod downloads;
mod extract;
mod files;
mod forms;
mod interact;
mod navigation;
mod observe;
mod popups;
mod scripting;
mod session;
mod support;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::model::{ServerCapabilities, ServerInfo};
use rmcp::{ServerHandler, tool_handler};

use crate::relay::Relay;

const SERVER_INSTRUCTIONS: &str = "browser-relay drives a real Chrome/Chromium browser over CDP. \
Start with browser.goto, then browser.snapshot or browser.list to read the page; interact via \
elementId (from browser.list), uid (from browser.take_snapshot), or CSS selectors. Every response \
carries a domVersion; cached elementIds and uids go stale when it advances, so re-capture after \
navigation or mutation. Responses are size-bounded: when truncated=true, retry with the retryWith \
parameters. Dialogs, downloads, popups, console messages, and network requests are captured in the \
background and queried by id.";

#[derive(Clone)]
pub struct RelayServer {
    relay: Relay,
    tool_router: ToolRouter<Self>,
}

impl RelayServer {
    pub fn new(relay: Relay) -> Self {
        Self {
            relay,
            tool_router: Self::session_router()
                + Self::navigation_router()
                + Self::capture_router()
                + Self::interact_router()
                + Self::ax_router()
                + Self::dialogs_router()
                + Self::downloads_router()
                + Self::popups_router()
                + Self::observe_router()
                + Self::scripting_router()
                + Self::forms_router()
                + Self::files_router()
                + Self::extract_router(),
        }
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }
}

#[tool_handler]
impl ServerHandler for RelayServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
            ..Default::default()
        }
    }
}
